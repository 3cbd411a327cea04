//! Background message loop.
//!
//! Triggers that arrive while no view is active (periodic sync, update
//! activation, version probes) are posted to a [`BackgroundSender`] and
//! handled one at a time by a task started with [`BackgroundChannel::spawn`].
//! Every message gets exactly one [`BackgroundReply`].

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::classifier::ClassifiedError;
use crate::error::BackgroundError;
use crate::executor::{ApiRequest, RequestExecutor};

pub const SIGNALS_PREFIX: &str = "signals";
pub const MARKET_PREFIX: &str = "market";

const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackgroundMessage {
    SyncSignals,
    SyncMarketData,
    SkipWaiting,
    GetVersion,
}

impl BackgroundMessage {
    pub const ALL: [Self; 4] = [
        Self::SyncSignals,
        Self::SyncMarketData,
        Self::SkipWaiting,
        Self::GetVersion,
    ];

    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::SyncSignals => "SYNC_SIGNALS",
            Self::SyncMarketData => "SYNC_MARKET_DATA",
            Self::SkipWaiting => "SKIP_WAITING",
            Self::GetVersion => "GET_VERSION",
        }
    }
}

impl Display for BackgroundMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for BackgroundMessage {
    type Err = BackgroundError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        Self::ALL
            .into_iter()
            .find(|message| message.wire_name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| BackgroundError::UnknownMessage(value.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundReply {
    Version(String),
    Activated,
    Synced,
    SyncFailed(ClassifiedError),
}

pub type SyncFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ClassifiedError>> + Send + 'a>>;

/// Work performed for the sync messages.
pub trait BackgroundSync: Send + Sync {
    fn sync_signals(&self) -> SyncFuture<'_>;

    fn sync_market_data(&self) -> SyncFuture<'_>;
}

/// Sync handler that refreshes cached endpoints through the executor.
///
/// Each sync refetches the configured paths. Once all of them succeed, the
/// entries under `<prefix>:` are replaced by the fresh ones, stored as
/// `<prefix>:<path>`. A failed sync leaves the cache as it was.
pub struct CacheSync {
    executor: Arc<RequestExecutor>,
    signal_paths: Vec<String>,
    market_paths: Vec<String>,
}

impl CacheSync {
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        Self {
            executor,
            signal_paths: Vec::new(),
            market_paths: Vec::new(),
        }
    }

    pub fn with_signal_path(mut self, path: impl Into<String>) -> Self {
        self.signal_paths.push(path.into());
        self
    }

    pub fn with_market_path(mut self, path: impl Into<String>) -> Self {
        self.market_paths.push(path.into());
        self
    }

    pub fn cache_key(prefix: &str, path: &str) -> String {
        format!("{prefix}:{path}")
    }

    async fn refresh(&self, prefix: &str, paths: &[String]) -> Result<(), ClassifiedError> {
        let options = self.executor.default_options();
        let mut fresh = Vec::with_capacity(paths.len());
        for path in paths {
            let value: Value = self
                .executor
                .execute_json(&ApiRequest::get(path.as_str()), &options)
                .await?;
            fresh.push((Self::cache_key(prefix, path), value));
        }

        // cached data stays untouched unless every path was fetched
        let cache = self.executor.cache();
        let dropped = cache.invalidate_prefix(&format!("{prefix}:"));
        debug!(prefix, dropped, refreshed = fresh.len(), "replaced cached entries");
        let ttl = self.executor.config().cache_ttl;
        for (key, value) in fresh {
            cache.set_for(key, value, ttl);
        }
        Ok(())
    }
}

impl BackgroundSync for CacheSync {
    fn sync_signals(&self) -> SyncFuture<'_> {
        Box::pin(self.refresh(SIGNALS_PREFIX, &self.signal_paths))
    }

    fn sync_market_data(&self) -> SyncFuture<'_> {
        Box::pin(self.refresh(MARKET_PREFIX, &self.market_paths))
    }
}

struct Envelope {
    message: BackgroundMessage,
    reply: oneshot::Sender<BackgroundReply>,
}

/// Handle for posting messages to a running background loop.
#[derive(Debug, Clone)]
pub struct BackgroundSender {
    tx: mpsc::Sender<Envelope>,
}

impl BackgroundSender {
    /// Posts `message` and waits for its reply.
    pub async fn send(&self, message: BackgroundMessage) -> Result<BackgroundReply, BackgroundError> {
        let (reply, receiver) = oneshot::channel();
        self.tx
            .send(Envelope { message, reply })
            .await
            .map_err(|_| BackgroundError::Closed)?;
        receiver.await.map_err(|_| BackgroundError::Closed)
    }

    /// Parses a wire name such as `"SYNC_SIGNALS"` and posts it.
    pub async fn send_wire(&self, name: &str) -> Result<BackgroundReply, BackgroundError> {
        self.send(name.parse()?).await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct BackgroundChannel;

impl BackgroundChannel {
    /// Starts the message loop. It ends once every sender is dropped.
    pub fn spawn(handler: Arc<dyn BackgroundSync>) -> BackgroundSender {
        let (tx, mut rx) = mpsc::channel::<Envelope>(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(Envelope { message, reply }) = rx.recv().await {
                let outcome = handle(handler.as_ref(), message).await;
                if reply.send(outcome).is_err() {
                    debug!(%message, "background reply receiver dropped");
                }
            }
            debug!("background channel closed");
        });
        BackgroundSender { tx }
    }
}

async fn handle(handler: &dyn BackgroundSync, message: BackgroundMessage) -> BackgroundReply {
    info!(%message, "background message received");
    let synced = match message {
        BackgroundMessage::GetVersion => {
            return BackgroundReply::Version(env!("CARGO_PKG_VERSION").to_owned());
        }
        BackgroundMessage::SkipWaiting => return BackgroundReply::Activated,
        BackgroundMessage::SyncSignals => handler.sync_signals().await,
        BackgroundMessage::SyncMarketData => handler.sync_market_data().await,
    };

    match synced {
        Ok(()) => BackgroundReply::Synced,
        Err(error) => {
            warn!(%message, kind = %error.kind(), "background sync failed");
            BackgroundReply::SyncFailed(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::auth::{AuthCoordinator, MemoryCredentialStore};
    use crate::cache::ResponseCache;
    use crate::classifier::ErrorKind;
    use crate::config::ClientConfig;
    use crate::http_client::{HttpClient, HttpMethod, HttpResponse, ScriptedHttpClient};
    use crate::retry::RetryPolicy;

    fn executor(transport: &Arc<ScriptedHttpClient>) -> Arc<RequestExecutor> {
        let mut config = ClientConfig::default();
        config.retry = RetryPolicy::no_retry();
        let transport = Arc::clone(transport) as Arc<dyn HttpClient>;
        let auth = AuthCoordinator::new(
            Arc::clone(&transport),
            Arc::new(MemoryCredentialStore::new()),
            &config,
        );
        Arc::new(RequestExecutor::new(
            transport,
            auth,
            ResponseCache::new(),
            config,
        ))
    }

    #[test]
    fn messages_parse_from_wire_names() {
        assert_eq!(
            "SYNC_SIGNALS".parse::<BackgroundMessage>(),
            Ok(BackgroundMessage::SyncSignals)
        );
        assert_eq!(
            " get_version ".parse::<BackgroundMessage>(),
            Ok(BackgroundMessage::GetVersion)
        );
        assert_eq!(
            "REBOOT".parse::<BackgroundMessage>(),
            Err(BackgroundError::UnknownMessage(String::from("REBOOT")))
        );
        for message in BackgroundMessage::ALL {
            assert_eq!(message.to_string().parse::<BackgroundMessage>(), Ok(message));
        }
    }

    #[tokio::test]
    async fn version_and_activation_need_no_handler_work() {
        let transport = Arc::new(ScriptedHttpClient::new());
        let sender = BackgroundChannel::spawn(Arc::new(CacheSync::new(executor(&transport))));

        assert_eq!(
            sender.send(BackgroundMessage::GetVersion).await,
            Ok(BackgroundReply::Version(env!("CARGO_PKG_VERSION").to_owned()))
        );
        assert_eq!(
            sender.send_wire("SKIP_WAITING").await,
            Ok(BackgroundReply::Activated)
        );
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn signal_sync_replaces_cached_signals_only() {
        let transport = Arc::new(ScriptedHttpClient::new());
        transport.respond(
            HttpMethod::Get,
            "/signals/latest",
            HttpResponse::ok_json(r#"{"count":2}"#),
        );
        let executor = executor(&transport);
        let cache = executor.cache().clone();
        cache.set("signals:/signals/stale", json!(1), 60);
        cache.set("market:/market/status", json!("open"), 60);
        cache.set("signalsets:/mine", json!("kept"), 60);

        let sender = BackgroundChannel::spawn(Arc::new(
            CacheSync::new(Arc::clone(&executor)).with_signal_path("/signals/latest"),
        ));
        let reply = sender.send(BackgroundMessage::SyncSignals).await;

        assert_eq!(reply, Ok(BackgroundReply::Synced));
        assert_eq!(cache.get("signals:/signals/stale"), None);
        assert_eq!(cache.get("signals:/signals/latest"), Some(json!({"count": 2})));
        assert_eq!(cache.get("market:/market/status"), Some(json!("open")));
        assert_eq!(cache.get("signalsets:/mine"), Some(json!("kept")));
    }

    #[tokio::test]
    async fn failed_sync_replies_with_classification() {
        let transport = Arc::new(ScriptedHttpClient::new());
        transport
            .respond(HttpMethod::Get, "/market/hours", HttpResponse::ok_json(r#""9-16""#))
            .respond(HttpMethod::Get, "/market/status", HttpResponse::new(500, ""));
        let executor = executor(&transport);
        let cache = executor.cache().clone();
        cache.set("market:/market/status", json!("open"), 60);
        let sender = BackgroundChannel::spawn(Arc::new(
            CacheSync::new(executor)
                .with_market_path("/market/hours")
                .with_market_path("/market/status"),
        ));

        let reply = sender
            .send(BackgroundMessage::SyncMarketData)
            .await
            .expect("loop running");

        match reply {
            BackgroundReply::SyncFailed(error) => assert_eq!(error.kind(), ErrorKind::ServerError),
            other => panic!("unexpected reply {other:?}"),
        }
        // the last good data survives a failed sync
        assert_eq!(cache.get("market:/market/status"), Some(json!("open")));
        assert_eq!(cache.get("market:/market/hours"), None);
    }
}
