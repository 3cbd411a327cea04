//! Failure classification.
//!
//! Every failed backend call is reduced to a [`ClassifiedError`] before it
//! reaches application code. The mapping is a pure function of the raw
//! failure: the HTTP status when a response exists, otherwise the transport
//! error. User-facing wording lives in a static template table so it can be
//! audited and tested independently of the mapping.
//!
//! | Status | Kind | Retryable |
//! |--------|------|-----------|
//! | none (transport) | `Network` (status 0) | yes |
//! | 401 | `Auth` | no |
//! | 403 | `Forbidden` | no |
//! | 404 | `NotFound` | no |
//! | 408 | `Network` | yes |
//! | 422 | `Validation` | no |
//! | 429 | `RateLimited` | yes |
//! | 500 | `ServerError` | yes |
//! | 503 | `Unavailable` | yes |
//! | 504 | `Unavailable` | yes |
//! | other | `Unknown` | no |

use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::http_client::{HttpError, HttpResponse};

/// Failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Auth,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    ServerError,
    Unavailable,
    Unknown,
}

impl ErrorKind {
    pub const ALL: [Self; 9] = [
        Self::Network,
        Self::Auth,
        Self::Forbidden,
        Self::NotFound,
        Self::Validation,
        Self::RateLimited,
        Self::ServerError,
        Self::Unavailable,
        Self::Unknown,
    ];

    /// Kind for an HTTP status that came back from the server.
    pub const fn for_status(status: u16) -> Self {
        match status {
            0 | 408 => Self::Network,
            401 => Self::Auth,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            422 => Self::Validation,
            429 => Self::RateLimited,
            500 => Self::ServerError,
            503 | 504 => Self::Unavailable,
            _ => Self::Unknown,
        }
    }

    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::RateLimited | Self::ServerError | Self::Unavailable
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::Unavailable => "unavailable",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How loudly a failure should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Action a user can take in response to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SuggestedAction {
    pub id: &'static str,
    pub label: &'static str,
}

const fn action(id: &'static str, label: &'static str) -> SuggestedAction {
    SuggestedAction { id, label }
}

const RETRY: SuggestedAction = action("retry", "Try again");
const RETRY_LATER: SuggestedAction = action("retry_later", "Retry after a short delay");
const CHECK_CONNECTION: SuggestedAction = action("check_connection", "Check your connection");
const SIGN_IN: SuggestedAction = action("sign_in", "Sign in again");
const GO_BACK: SuggestedAction = action("go_back", "Go back");
const CONTACT_SUPPORT: SuggestedAction = action("contact_support", "Contact support");
const FIX_INPUT: SuggestedAction = action("fix_input", "Review the highlighted fields");

/// User-facing wording attached to a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub kind: ErrorKind,
    pub title: &'static str,
    pub message: &'static str,
    pub severity: Severity,
    pub actions: &'static [SuggestedAction],
}

/// Indexed by `ErrorKind::ALL` order.
pub const TEMPLATES: [Template; 9] = [
    Template {
        kind: ErrorKind::Network,
        title: "Connection problem",
        message: "Unable to reach the server. Check your internet connection and try again.",
        severity: Severity::Warning,
        actions: &[RETRY, CHECK_CONNECTION],
    },
    Template {
        kind: ErrorKind::Auth,
        title: "Session expired",
        message: "Your session has expired. Please sign in again.",
        severity: Severity::Error,
        actions: &[SIGN_IN],
    },
    Template {
        kind: ErrorKind::Forbidden,
        title: "Access denied",
        message: "You do not have permission to perform this action.",
        severity: Severity::Error,
        actions: &[GO_BACK, CONTACT_SUPPORT],
    },
    Template {
        kind: ErrorKind::NotFound,
        title: "Not found",
        message: "The requested resource could not be found.",
        severity: Severity::Warning,
        actions: &[GO_BACK],
    },
    Template {
        kind: ErrorKind::Validation,
        title: "Invalid input",
        message: "Some of the submitted data is invalid.",
        severity: Severity::Warning,
        actions: &[FIX_INPUT],
    },
    Template {
        kind: ErrorKind::RateLimited,
        title: "Too many requests",
        message: "You are sending requests too quickly. Please wait a moment and try again.",
        severity: Severity::Warning,
        actions: &[RETRY_LATER],
    },
    Template {
        kind: ErrorKind::ServerError,
        title: "Server error",
        message: "The server encountered an error. Please try again later.",
        severity: Severity::Error,
        actions: &[RETRY, CONTACT_SUPPORT],
    },
    Template {
        kind: ErrorKind::Unavailable,
        title: "Service unavailable",
        message: "The service is temporarily unavailable. Please try again shortly.",
        severity: Severity::Error,
        actions: &[RETRY_LATER],
    },
    Template {
        kind: ErrorKind::Unknown,
        title: "Unexpected error",
        message: "An unexpected error occurred.",
        severity: Severity::Error,
        actions: &[RETRY, CONTACT_SUPPORT],
    },
];

pub fn template(kind: ErrorKind) -> &'static Template {
    let index = ErrorKind::ALL
        .iter()
        .position(|candidate| *candidate == kind)
        .unwrap_or(ErrorKind::ALL.len() - 1);
    &TEMPLATES[index]
}

/// Unclassified failure as produced by a transport or a response decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFailure {
    /// The server answered with a non-success status.
    Response(HttpResponse),
    /// No response: connection refused, DNS failure, timeout.
    Transport(HttpError),
    /// Anything else, e.g. a body that failed to decode.
    Other { message: String },
}

impl RawFailure {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<HttpError> for RawFailure {
    fn from(error: HttpError) -> Self {
        Self::Transport(error)
    }
}

impl From<HttpResponse> for RawFailure {
    fn from(response: HttpResponse) -> Self {
        Self::Response(response)
    }
}

/// Normalized, user-presentable failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    status_code: u16,
    kind: ErrorKind,
    user_title: String,
    user_message: String,
    severity: Severity,
    retryable: bool,
    suggested_actions: Vec<SuggestedAction>,
    #[serde(skip)]
    retry_after: Option<Duration>,
}

/// The shape handed to presentation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserFacingError {
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub actions: Vec<SuggestedAction>,
}

impl ClassifiedError {
    fn from_template(kind: ErrorKind, status_code: u16, message: Option<String>) -> Self {
        let template = template(kind);
        Self {
            status_code,
            kind,
            user_title: template.title.to_owned(),
            user_message: message.unwrap_or_else(|| template.message.to_owned()),
            severity: template.severity,
            retryable: kind.is_retryable(),
            suggested_actions: template.actions.to_vec(),
            retry_after: None,
        }
    }

    pub const fn status_code(&self) -> u16 {
        self.status_code
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn user_title(&self) -> &str {
        &self.user_title
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub const fn severity(&self) -> Severity {
        self.severity
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub fn suggested_actions(&self) -> &[SuggestedAction] {
        &self.suggested_actions
    }

    /// Server-requested wait (`Retry-After`), when one was given.
    pub const fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub fn user_facing(&self) -> UserFacingError {
        UserFacingError {
            title: self.user_title.clone(),
            message: self.user_message.clone(),
            severity: self.severity,
            actions: self.suggested_actions.clone(),
        }
    }
}

impl Display for ClassifiedError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{} {}]: {}",
            self.user_title, self.kind, self.status_code, self.user_message
        )
    }
}

impl std::error::Error for ClassifiedError {}

/// Classifies any raw failure. Total: never panics, always yields one error.
pub fn classify(failure: &RawFailure) -> ClassifiedError {
    match failure {
        RawFailure::Transport(error) => {
            let message = error
                .is_timeout()
                .then(|| String::from("The request timed out. Check your connection and try again."));
            ClassifiedError::from_template(ErrorKind::Network, 0, message)
        }
        RawFailure::Other { message } => {
            ClassifiedError::from_template(ErrorKind::Unknown, 0, Some(message.clone()))
        }
        RawFailure::Response(response) => classify_response(response),
    }
}

fn classify_response(response: &HttpResponse) -> ClassifiedError {
    let kind = ErrorKind::for_status(response.status);
    let message = match kind {
        ErrorKind::Validation => validation_message(&response.body),
        ErrorKind::Unknown => Some(
            server_message(&response.body)
                .unwrap_or_else(|| format!("HTTP {}", response.status)),
        ),
        _ => None,
    };

    let mut error = ClassifiedError::from_template(kind, response.status, message);
    if matches!(kind, ErrorKind::RateLimited | ErrorKind::Unavailable) {
        error.retry_after = response
            .header("retry-after")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
    }
    error
}

/// `detail`/`message` from a JSON error body, else the raw body.
fn server_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        for field in ["detail", "message", "error"] {
            if let Some(text) = value.get(field).and_then(Value::as_str) {
                return Some(text.to_owned());
            }
        }
    }

    Some(trimmed.to_owned())
}

/// Joins field-level validation messages, each prefixed by its field path.
fn validation_message(body: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(body).ok()?;

    let entries: Vec<String> = match value.get("detail") {
        Some(Value::String(text)) => return Some(text.clone()),
        Some(Value::Array(items)) => items.iter().filter_map(detail_entry).collect(),
        _ => value
            .get("errors")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(field_entry).collect())
            .unwrap_or_default(),
    };

    if entries.is_empty() {
        None
    } else {
        Some(entries.join("; "))
    }
}

/// `{ "loc": ["body", "order", "qty"], "msg": "..." }`
fn detail_entry(item: &Value) -> Option<String> {
    let message = item.get("msg").and_then(Value::as_str)?;
    let path: Vec<String> = item
        .get("loc")
        .and_then(Value::as_array)
        .map(|segments| {
            segments
                .iter()
                .enumerate()
                .filter(|(index, segment)| {
                    !(*index == 0
                        && matches!(segment.as_str(), Some("body" | "query" | "path")))
                })
                .map(|(_, segment)| match segment {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    Some(prefixed(&path.join("."), message))
}

/// `{ "field": "qty", "message": "..." }`
fn field_entry(item: &Value) -> Option<String> {
    let message = item.get("message").and_then(Value::as_str)?;
    let field = item.get("field").and_then(Value::as_str).unwrap_or_default();
    Some(prefixed(field, message))
}

fn prefixed(path: &str, message: &str) -> String {
    if path.is_empty() {
        message.to_owned()
    } else {
        format!("{path}: {message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> RawFailure {
        RawFailure::Response(HttpResponse::new(status, body))
    }

    #[test]
    fn status_table_maps_to_exact_kinds() {
        let cases = [
            (401, ErrorKind::Auth),
            (403, ErrorKind::Forbidden),
            (404, ErrorKind::NotFound),
            (422, ErrorKind::Validation),
            (429, ErrorKind::RateLimited),
            (500, ErrorKind::ServerError),
            (503, ErrorKind::Unavailable),
            (418, ErrorKind::Unknown),
            (502, ErrorKind::Unknown),
        ];

        for (status, kind) in cases {
            let error = classify(&response(status, ""));
            assert_eq!(error.kind(), kind, "status {status}");
            assert_eq!(error.status_code(), status);
        }
    }

    #[test]
    fn missing_response_is_network_with_status_zero() {
        let error = classify(&RawFailure::Transport(HttpError::connect("connection refused")));
        assert_eq!(error.kind(), ErrorKind::Network);
        assert_eq!(error.status_code(), 0);
        assert!(error.retryable());

        let timeout = classify(&RawFailure::Transport(HttpError::timeout("elapsed")));
        assert_eq!(timeout.kind(), ErrorKind::Network);
        assert!(timeout.user_message().contains("timed out"));
    }

    #[test]
    fn timeout_statuses_are_retryable() {
        let request_timeout = classify(&response(408, ""));
        let gateway_timeout = classify(&response(504, ""));

        assert_eq!(request_timeout.kind(), ErrorKind::Network);
        assert_eq!(request_timeout.status_code(), 408);
        assert!(request_timeout.retryable());
        assert_eq!(gateway_timeout.kind(), ErrorKind::Unavailable);
        assert!(gateway_timeout.retryable());
    }

    #[test]
    fn retryable_holds_exactly_for_transient_kinds() {
        for kind in ErrorKind::ALL {
            let expected = matches!(
                kind,
                ErrorKind::Network
                    | ErrorKind::RateLimited
                    | ErrorKind::ServerError
                    | ErrorKind::Unavailable
            );
            assert_eq!(kind.is_retryable(), expected, "{kind}");
        }
    }

    #[test]
    fn template_table_is_ordered_by_kind() {
        for kind in ErrorKind::ALL {
            assert_eq!(template(kind).kind, kind);
            assert!(!template(kind).actions.is_empty());
        }
        assert_eq!(template(ErrorKind::Auth).actions[0].id, "sign_in");
        assert_eq!(template(ErrorKind::RateLimited).actions[0].id, "retry_later");
    }

    #[test]
    fn unknown_preserves_server_message_verbatim() {
        let from_json = classify(&response(409, r#"{"detail":"Order already filled"}"#));
        assert_eq!(from_json.kind(), ErrorKind::Unknown);
        assert_eq!(from_json.user_message(), "Order already filled");

        let from_text = classify(&response(418, "short and stout"));
        assert_eq!(from_text.user_message(), "short and stout");

        let other = classify(&RawFailure::other("expected value at line 1 column 1"));
        assert_eq!(other.kind(), ErrorKind::Unknown);
        assert_eq!(other.status_code(), 0);
        assert_eq!(other.user_message(), "expected value at line 1 column 1");
    }

    #[test]
    fn validation_concatenates_field_messages_with_paths() {
        let body = r#"{"detail":[
            {"loc":["body","quantity"],"msg":"must be greater than 0"},
            {"loc":["body","order","symbol"],"msg":"field required"},
            {"msg":"stop price below limit"}
        ]}"#;

        let error = classify(&response(422, body));

        assert_eq!(error.kind(), ErrorKind::Validation);
        assert!(!error.retryable());
        assert_eq!(
            error.user_message(),
            "quantity: must be greater than 0; order.symbol: field required; stop price below limit"
        );
    }

    #[test]
    fn validation_accepts_errors_array_and_falls_back_to_template() {
        let body = r#"{"errors":[{"field":"email","message":"is invalid"}]}"#;
        assert_eq!(classify(&response(422, body)).user_message(), "email: is invalid");

        let fallback = classify(&response(422, "not json"));
        assert_eq!(fallback.user_message(), template(ErrorKind::Validation).message);
    }

    #[test]
    fn rate_limit_reads_retry_after_header() {
        let raw = RawFailure::Response(HttpResponse::new(429, "").with_header("Retry-After", "5"));
        let error = classify(&raw);

        assert_eq!(error.retry_after(), Some(Duration::from_secs(5)));
        assert_eq!(classify(&response(429, "")).retry_after(), None);
    }

    #[test]
    fn user_facing_shape_serializes_without_status() {
        let error = classify(&response(401, ""));
        let json = serde_json::to_value(error.user_facing()).expect("serializable");

        assert_eq!(json["title"], "Session expired");
        assert_eq!(json["severity"], "error");
        assert_eq!(json["actions"][0]["id"], "sign_in");
        assert!(json.get("status_code").is_none());
    }
}
