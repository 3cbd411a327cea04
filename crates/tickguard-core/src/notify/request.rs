use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_ICON: &str = "/icons/icon-192x192.png";
pub const DEFAULT_BADGE: &str = "/icons/badge-72x72.png";

/// Button offered on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub id: String,
    pub label: String,
}

impl NotificationAction {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Something to show the user, queued until permission allows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// Notifications sharing a tag replace each other instead of stacking.
    pub dedup_tag: Option<String>,
    pub payload: Value,
    pub actions: Vec<NotificationAction>,
    /// Keeps the notification up until the user acts on it.
    pub require_interaction: bool,
}

impl NotificationRequest {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            icon: String::from(DEFAULT_ICON),
            badge: String::from(DEFAULT_BADGE),
            dedup_tag: None,
            payload: Value::Null,
            actions: Vec::new(),
            require_interaction: false,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.dedup_tag = Some(tag.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_action(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.actions.push(NotificationAction::new(id, label));
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn requiring_interaction(mut self) -> Self {
        self.require_interaction = true;
        self
    }
}

/// A request as handed to the surface, with its assigned identity.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayedNotification {
    pub id: String,
    pub request: NotificationRequest,
    pub shown_at: OffsetDateTime,
}

impl DisplayedNotification {
    pub fn from_request(request: NotificationRequest) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            request,
            shown_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn tag(&self) -> Option<&str> {
        self.request.dedup_tag.as_deref()
    }
}
