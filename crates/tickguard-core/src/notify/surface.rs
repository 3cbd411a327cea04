use std::future::Future;
use std::pin::Pin;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;

use super::request::DisplayedNotification;

/// Notification permission as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// The platform has no notification capability. Terminal.
    Unsupported,
    /// The user has not decided yet.
    Default,
    /// Refused for the rest of the session. Terminal.
    Denied,
    Granted,
}

impl Permission {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Unsupported | Self::Denied)
    }
}

pub type PermissionFuture<'a> = Pin<Box<dyn Future<Output = Permission> + Send + 'a>>;

/// Platform notification capability.
pub trait NotificationSurface: Send + Sync {
    fn permission(&self) -> Permission;

    /// Prompts the user; resolves with the resulting permission.
    fn request_permission<'a>(&'a self) -> PermissionFuture<'a>;

    /// Displays a notification. A tagged notification replaces any visible
    /// one with the same tag.
    fn show(&self, notification: &DisplayedNotification);

    fn close(&self, id: &str);

    /// Push stream of permission changes, when the platform offers one.
    /// Without it, changes are discovered by polling [`NotificationSurface::permission`].
    fn permission_events(&self) -> Option<watch::Receiver<Permission>> {
        None
    }
}

/// Record of one `show` call.
#[derive(Debug, Clone)]
pub struct ShownRecord {
    pub at: Instant,
    pub notification: DisplayedNotification,
}

#[derive(Debug)]
struct RecordingState {
    permission: Permission,
    prompt_outcome: Permission,
    prompts: usize,
    shown: Vec<ShownRecord>,
    closed: Vec<String>,
}

/// In-memory surface that records everything it is asked to do.
///
/// Permission changes made through [`RecordingSurface::set_permission`]
/// behave like a user flipping a browser setting.
#[derive(Debug)]
pub struct RecordingSurface {
    state: Mutex<RecordingState>,
    events: Option<watch::Sender<Permission>>,
}

impl RecordingSurface {
    /// Surface without push events; the queue has to poll it.
    pub fn new(permission: Permission) -> Self {
        Self {
            state: Mutex::new(RecordingState {
                permission,
                prompt_outcome: permission,
                prompts: 0,
                shown: Vec::new(),
                closed: Vec::new(),
            }),
            events: None,
        }
    }

    /// Surface that publishes permission changes.
    pub fn with_events(permission: Permission) -> Self {
        let (sender, _) = watch::channel(permission);
        Self {
            events: Some(sender),
            ..Self::new(permission)
        }
    }

    /// What the next permission prompt resolves to.
    pub fn answer_prompt_with(&self, outcome: Permission) {
        self.state.lock().prompt_outcome = outcome;
    }

    pub fn set_permission(&self, permission: Permission) {
        self.state.lock().permission = permission;
        if let Some(events) = &self.events {
            events.send_replace(permission);
        }
    }

    pub fn prompts(&self) -> usize {
        self.state.lock().prompts
    }

    pub fn shown(&self) -> Vec<ShownRecord> {
        self.state.lock().shown.clone()
    }

    pub fn shown_titles(&self) -> Vec<String> {
        self.state
            .lock()
            .shown
            .iter()
            .map(|record| record.notification.request.title.clone())
            .collect()
    }

    pub fn closed(&self) -> Vec<String> {
        self.state.lock().closed.clone()
    }

    /// Shown notifications that have not been closed.
    pub fn visible(&self) -> Vec<DisplayedNotification> {
        let state = self.state.lock();
        state
            .shown
            .iter()
            .filter(|record| !state.closed.contains(&record.notification.id))
            .map(|record| record.notification.clone())
            .collect()
    }
}

impl NotificationSurface for RecordingSurface {
    fn permission(&self) -> Permission {
        self.state.lock().permission
    }

    fn request_permission<'a>(&'a self) -> PermissionFuture<'a> {
        Box::pin(async move {
            let outcome = {
                let mut state = self.state.lock();
                state.prompts += 1;
                if state.permission == Permission::Default {
                    state.permission = state.prompt_outcome;
                }
                state.permission
            };
            if let Some(events) = &self.events {
                events.send_replace(outcome);
            }
            outcome
        })
    }

    fn show(&self, notification: &DisplayedNotification) {
        self.state.lock().shown.push(ShownRecord {
            at: Instant::now(),
            notification: notification.clone(),
        });
    }

    fn close(&self, id: &str) {
        self.state.lock().closed.push(id.to_owned());
    }

    fn permission_events(&self) -> Option<watch::Receiver<Permission>> {
        self.events.as_ref().map(watch::Sender::subscribe)
    }
}
