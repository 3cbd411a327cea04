use serde_json::{json, Value};
use tickguard_core::{classify, HttpError, HttpResponse, RawFailure};

use crate::cli::ClassifyArgs;
use crate::error::CliError;

use super::millis;

pub fn run(args: &ClassifyArgs) -> Result<Value, CliError> {
    let failure = if args.status == 0 {
        RawFailure::Transport(HttpError::connect("no response received"))
    } else {
        let mut response = HttpResponse::new(args.status, args.body.as_str());
        if let Some(retry_after) = &args.retry_after {
            response = response.with_header("retry-after", retry_after.as_str());
        }
        RawFailure::Response(response)
    };

    let classified = classify(&failure);
    Ok(json!({
        "classified": serde_json::to_value(&classified)?,
        "user_facing": serde_json::to_value(classified.user_facing())?,
        "retry_after_ms": classified.retry_after().map(millis),
    }))
}
