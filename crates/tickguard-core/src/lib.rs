//! # Tickguard Core
//!
//! Client-side resilience layer for a trading-signals backend.
//!
//! ## Overview
//!
//! This crate wraps every backend call in one consistent policy:
//!
//! - **Error classification** of HTTP and transport failures into a fixed
//!   taxonomy with user-facing messages
//! - **Retry with exponential backoff** for transient failures
//! - **Single-flight session renewal** when the backend rejects credentials
//! - **TTL response cache** with prefix invalidation
//! - **Permission-gated notifications** delivered in order once allowed
//! - **Background channel** for sync and lifecycle messages
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`auth`] | Credential pair, persistence and single-flight renewal |
//! | [`background`] | Background message loop and cache sync handler |
//! | [`cache`] | In-memory TTL response cache |
//! | [`call`] | Tracked calls with `retry()` / `reset()` |
//! | [`classifier`] | Failure taxonomy and user-facing templates |
//! | [`config`] | Client configuration and env overrides |
//! | [`error`] | Library error types |
//! | [`executor`] | Retry loop, credential attachment, renewal replay |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`notify`] | Notification queue, surfaces and builders |
//! | [`retry`] | Backoff policies |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tickguard_core::{ApiRequest, ClientConfig, RequestExecutor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = RequestExecutor::from_config(ClientConfig::from_env()?);
//!     let options = executor.default_options();
//!
//!     match executor.execute_json::<serde_json::Value>(&ApiRequest::get("/signals"), &options).await {
//!         Ok(signals) => println!("{signals}"),
//!         Err(error) => eprintln!("{}: {}", error.user_title(), error.user_message()),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │  TrackedCall    │────▶│ Request Executor │
//! └─────────────────┘     └────────┬─────────┘
//!                                  │
//!          ┌───────────────────────┼───────────────────────┐
//!          ▼                       ▼                       ▼
//! ┌─────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │ Response Cache  │     │ Auth Coordinator │     │ HTTP Client      │
//! └─────────────────┘     └────────┬─────────┘     │ (reqwest/script) │
//!                                  │               └──────────────────┘
//!                                  ▼
//!                         ┌──────────────────┐
//!                         │ Credential Store │
//!                         └──────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Request failures never surface as raw transport errors. They are
//! classified:
//!
//! ```rust
//! use tickguard_core::{classify, ErrorKind, HttpResponse, RawFailure};
//!
//! let error = classify(&RawFailure::Response(HttpResponse::new(503, "")));
//! assert_eq!(error.kind(), ErrorKind::Unavailable);
//! assert!(error.retryable());
//! ```

pub mod auth;
pub mod background;
pub mod cache;
pub mod call;
pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod http_client;
pub mod notify;
pub mod retry;

// Session
pub use auth::{
    AuthCoordinator, CredentialPair, CredentialStore, FileCredentialStore, MemoryCredentialStore,
    SessionEvent,
};

// Background channel
pub use background::{
    BackgroundChannel, BackgroundMessage, BackgroundReply, BackgroundSender, BackgroundSync,
    CacheSync,
};

// Caching
pub use cache::{CacheMode, ResponseCache};

// Tracked calls
pub use call::{CallSnapshot, RetryState, TrackedCall};

// Classification
pub use classifier::{classify, ClassifiedError, ErrorKind, RawFailure, Severity, UserFacingError};

// Configuration
pub use config::ClientConfig;

// Error types
pub use error::{AuthError, BackgroundError, ConfigError, StoreError};

// Execution
pub use executor::{ApiRequest, CallError, ExecuteOptions, RequestExecutor};

// HTTP client types
pub use http_client::{
    HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient,
    ScriptedHttpClient,
};

// Notifications
pub use notify::{
    NotificationQueue, NotificationRequest, NotificationSurface, Permission, QueueConfig,
    RecordingSurface, SendOutcome,
};

// Retry logic
pub use retry::{Backoff, RetryPolicy};
