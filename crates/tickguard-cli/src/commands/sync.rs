use std::sync::Arc;

use serde_json::{json, Value};
use tickguard_core::{BackgroundChannel, BackgroundReply, CacheSync, RequestExecutor};

use crate::cli::SyncArgs;
use crate::error::CliError;

pub async fn run(args: &SyncArgs, executor: RequestExecutor) -> Result<Value, CliError> {
    let handler = args.market_paths.iter().fold(
        args.signal_paths
            .iter()
            .fold(CacheSync::new(Arc::new(executor)), |sync, path| {
                sync.with_signal_path(path.as_str())
            }),
        |sync, path| sync.with_market_path(path.as_str()),
    );

    let sender = BackgroundChannel::spawn(Arc::new(handler));
    match sender.send_wire(&args.message).await? {
        BackgroundReply::Version(version) => Ok(json!({ "reply": "version", "version": version })),
        BackgroundReply::Activated => Ok(json!({ "reply": "activated" })),
        BackgroundReply::Synced => Ok(json!({
            "reply": "synced",
            "signal_paths": args.signal_paths,
            "market_paths": args.market_paths,
        })),
        BackgroundReply::SyncFailed(error) => Err(CliError::Request(error)),
    }
}
