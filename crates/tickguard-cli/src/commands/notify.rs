use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tickguard_core::notify::NotificationRequest;
use tickguard_core::{NotificationQueue, NotificationSurface, QueueConfig, RecordingSurface};

use crate::cli::NotifyArgs;
use crate::error::CliError;

/// How long a queued notification may wait for the prompt to resolve.
const PROMPT_WAIT: Duration = Duration::from_secs(1);

pub async fn run(args: &NotifyArgs) -> Result<Value, CliError> {
    let surface = Arc::new(RecordingSurface::with_events(args.permission.into()));
    surface.answer_prompt_with(args.answer.into());
    let queue = NotificationQueue::new(
        Arc::clone(&surface) as Arc<dyn NotificationSurface>,
        QueueConfig::default(),
    );

    let mut request = NotificationRequest::new(args.title.as_str(), args.body.as_str());
    if let Some(tag) = &args.tag {
        request = request.with_tag(tag.as_str());
    }
    let outcome = queue.send(request).await;

    // Elapsed only means the prompt left the request queued.
    let _ = tokio::time::timeout(PROMPT_WAIT, async {
        while queue.pending_len() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    let shown: Vec<Value> = surface
        .shown()
        .into_iter()
        .map(|record| {
            json!({
                "id": record.notification.id,
                "title": record.notification.request.title,
                "body": record.notification.request.body,
                "tag": record.notification.request.dedup_tag,
                "require_interaction": record.notification.request.require_interaction,
            })
        })
        .collect();

    Ok(json!({
        "outcome": serde_json::to_value(outcome)?,
        "permission": serde_json::to_value(queue.permission())?,
        "prompts": surface.prompts(),
        "pending": queue.pending_len(),
        "shown": shown,
    }))
}
