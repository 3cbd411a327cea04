use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::store::{CredentialPair, CredentialStore};
use crate::classifier::{classify, RawFailure};
use crate::config::ClientConfig;
use crate::error::{AuthError, StoreError};
use crate::http_client::{HttpClient, HttpRequest};

/// Path of the renewal endpoint, relative to the configured base url.
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Session lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    Renewed,
    /// Renewal failed; the credentials are gone and the application should
    /// return to its unauthenticated entry point.
    Expired,
    SignedOut,
}

type RenewalFuture = Shared<BoxFuture<'static, Result<CredentialPair, AuthError>>>;

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
}

struct Inner {
    transport: Arc<dyn HttpClient>,
    store: Arc<dyn CredentialStore>,
    refresh_url: String,
    timeout_ms: u64,
    credentials: Mutex<Option<CredentialPair>>,
    in_flight: Mutex<Option<RenewalFuture>>,
    events: broadcast::Sender<SessionEvent>,
    renewals: AtomicU64,
}

/// Empties the in-flight slot when the renewal task ends, including by panic.
struct InFlightSlot(Arc<Inner>);

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.in_flight.lock().take();
    }
}

/// Owner of the session credential pair.
///
/// Concurrent [`AuthCoordinator::renew`] calls coalesce into one network
/// request; every caller observes that request's outcome. The renewal runs
/// on its own task, so dropping the callers does not cancel it.
#[derive(Clone)]
pub struct AuthCoordinator {
    inner: Arc<Inner>,
}

impl AuthCoordinator {
    /// Builds a coordinator and resumes any session persisted in `store`.
    pub fn new(
        transport: Arc<dyn HttpClient>,
        store: Arc<dyn CredentialStore>,
        config: &ClientConfig,
    ) -> Self {
        let persisted = match store.load() {
            Ok(pair) => pair,
            Err(error) => {
                warn!(%error, "ignoring unreadable persisted credentials");
                None
            }
        };
        if persisted.is_some() {
            info!("resumed persisted session");
        }

        let (events, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(Inner {
                transport,
                store,
                refresh_url: config.url_for(REFRESH_PATH),
                timeout_ms: config.timeout_ms,
                credentials: Mutex::new(persisted),
                in_flight: Mutex::new(None),
                events,
                renewals: AtomicU64::new(0),
            }),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner
            .credentials
            .lock()
            .as_ref()
            .map(|pair| pair.access_token.clone())
    }

    pub fn credentials(&self) -> Option<CredentialPair> {
        self.inner.credentials.lock().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.credentials.lock().is_some()
    }

    /// Installs a freshly issued pair (after a login flow) and persists it.
    pub fn sign_in(&self, pair: CredentialPair) -> Result<(), StoreError> {
        self.inner.store.save(&pair)?;
        *self.inner.credentials.lock() = Some(pair);
        self.inner.emit(SessionEvent::SignedIn);
        info!("session started");
        Ok(())
    }

    /// Clears the pair from memory and from the store.
    pub fn sign_out(&self) -> Result<(), StoreError> {
        self.inner.credentials.lock().take();
        self.inner.store.clear()?;
        self.inner.emit(SessionEvent::SignedOut);
        info!("session ended");
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Number of renewal requests actually started.
    pub fn renewal_count(&self) -> u64 {
        self.inner.renewals.load(Ordering::SeqCst)
    }

    pub fn renewal_in_flight(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Exchanges the refresh token for a new pair.
    ///
    /// Joins the in-flight renewal if there is one. Exactly one network
    /// attempt is made per renewal; on failure the session is cleared and
    /// [`SessionEvent::Expired`] is broadcast.
    pub async fn renew(&self) -> Result<CredentialPair, AuthError> {
        let renewal = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(renewal) => {
                    debug!("joining in-flight token renewal");
                    renewal.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let task = tokio::spawn(async move {
                        let slot = InFlightSlot(Arc::clone(&inner));
                        let outcome = inner.renew_once().await;
                        drop(slot);
                        outcome
                    });
                    let renewal = async move { task.await.unwrap_or(Err(AuthError::Aborted)) }
                        .boxed()
                        .shared();
                    *slot = Some(renewal.clone());
                    renewal
                }
            }
        };

        renewal.await
    }
}

impl Inner {
    fn emit(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    async fn renew_once(&self) -> Result<CredentialPair, AuthError> {
        let current = self.credentials.lock().clone();
        let Some(current) = current else {
            self.expire();
            return Err(AuthError::NotAuthenticated);
        };

        self.renewals.fetch_add(1, Ordering::SeqCst);
        info!("renewing access token");

        let request = HttpRequest::post(&self.refresh_url)
            .with_json(&json!({ "refresh_token": current.refresh_token }))
            .with_timeout_ms(self.timeout_ms);

        let outcome = match self.transport.execute(request).await {
            Ok(response) if response.is_success() => {
                serde_json::from_str::<RefreshResponse>(&response.body)
                    .map(|body| CredentialPair {
                        access_token: body.access_token,
                        refresh_token: body.refresh_token.unwrap_or(current.refresh_token),
                    })
                    .map_err(|error| AuthError::MalformedResponse(error.to_string()))
            }
            Ok(response) => Err(AuthError::Rejected(classify(&RawFailure::Response(response)))),
            Err(error) => Err(AuthError::Rejected(classify(&RawFailure::Transport(error)))),
        };

        match outcome {
            Ok(pair) => {
                if let Err(error) = self.store.save(&pair) {
                    warn!(%error, "renewed credentials could not be persisted");
                }
                *self.credentials.lock() = Some(pair.clone());
                self.emit(SessionEvent::Renewed);
                info!("access token renewed");
                Ok(pair)
            }
            Err(error) => {
                warn!(%error, "token renewal failed; ending session");
                self.expire();
                Err(error)
            }
        }
    }

    fn expire(&self) {
        self.credentials.lock().take();
        if let Err(error) = self.store.clear() {
            warn!(%error, "failed to clear persisted credentials");
        }
        self.emit(SessionEvent::Expired);
    }
}
