use serde_json::Value;
use tickguard_core::{ApiRequest, RequestExecutor};

use crate::cli::GetArgs;
use crate::error::CliError;

pub async fn run(args: &GetArgs, executor: &RequestExecutor) -> Result<Value, CliError> {
    let request = args
        .query
        .iter()
        .fold(ApiRequest::get(args.path.as_str()), |request, (name, value)| {
            request.with_query(name.as_str(), value)
        });

    let options = executor.default_options();
    Ok(executor.execute_json::<Value>(&request, &options).await?)
}
