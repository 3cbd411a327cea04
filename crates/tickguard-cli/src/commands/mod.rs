mod classify;
mod get;
mod notify;
mod session;
mod sync;

use std::time::Duration;

use serde_json::Value;
use tickguard_core::{ClientConfig, RequestExecutor};

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    match &cli.command {
        Command::Get(args) => get::run(args, &executor(cli)?).await,
        Command::Classify(args) => classify::run(args),
        Command::Login(args) => session::login(args, &executor(cli)?),
        Command::Logout => session::logout(&executor(cli)?),
        Command::Session(args) => session::show(args, &executor(cli)?).await,
        Command::Sync(args) => sync::run(args, executor(cli)?).await,
        Command::Notify(args) => notify::run(args).await,
    }
}

/// Environment first, then command-line flags on top.
pub fn config(cli: &Cli) -> Result<ClientConfig, CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url.as_str())?;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config = config.with_timeout_ms(timeout_ms);
    }
    if let Some(max_attempts) = cli.max_attempts {
        config = config.with_max_attempts(max_attempts)?;
    }
    if let Some(path) = &cli.credentials {
        config = config.with_credentials_path(path);
    }
    Ok(config)
}

fn executor(cli: &Cli) -> Result<RequestExecutor, CliError> {
    Ok(RequestExecutor::from_config(config(cli)?))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
