use serde_json::{json, Value};
use tickguard_core::{CredentialPair, RequestExecutor};
use tracing::info;

use crate::cli::{LoginArgs, SessionArgs};
use crate::error::CliError;

pub fn login(args: &LoginArgs, executor: &RequestExecutor) -> Result<Value, CliError> {
    let Some(path) = &executor.config().credentials_path else {
        return Err(CliError::Command(String::from(
            "login needs --credentials or TICKGUARD_CREDENTIALS_PATH to persist the session",
        )));
    };

    executor.auth().sign_in(CredentialPair::new(
        args.access_token.as_str(),
        args.refresh_token.as_str(),
    ))?;
    info!(path = %path.display(), "credentials stored");
    Ok(json!({ "authenticated": true, "credentials_path": path }))
}

pub fn logout(executor: &RequestExecutor) -> Result<Value, CliError> {
    let was_authenticated = executor.auth().is_authenticated();
    executor.auth().sign_out()?;
    Ok(json!({ "authenticated": false, "was_authenticated": was_authenticated }))
}

pub async fn show(args: &SessionArgs, executor: &RequestExecutor) -> Result<Value, CliError> {
    if args.renew {
        executor.auth().renew().await?;
    }

    Ok(json!({
        "authenticated": executor.auth().is_authenticated(),
        "renewed": args.renew,
        "credentials_path": executor.config().credentials_path,
    }))
}
