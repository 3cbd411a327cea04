//! Stateful wrapper around one logical call.
//!
//! A [`TrackedCall`] remembers the arguments of its last execution so the
//! caller can `retry()` it, and owns at most one pending backoff timer:
//! starting a new execution or calling `reset()` cancels the previous one.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::classifier::ClassifiedError;
use crate::executor::{ApiRequest, CallError, ExecuteOptions, RequestExecutor};
use crate::http_client::HttpResponse;

/// Ephemeral per-execution retry bookkeeping.
#[derive(Debug, Clone)]
pub struct RetryState {
    pub attempt: u32,
    pub last_attempt_at: Instant,
    pub pending_args: ApiRequest,
}

/// Point-in-time view of a tracked call.
#[derive(Debug, Clone, Default)]
pub struct CallSnapshot {
    pub loading: bool,
    pub retry: Option<RetryState>,
    pub last_error: Option<ClassifiedError>,
}

#[derive(Debug, Default)]
struct CallState {
    generation: u64,
    cancel: CancellationToken,
    retry: Option<RetryState>,
    last_args: Option<ApiRequest>,
    last_error: Option<ClassifiedError>,
    loading: bool,
}

pub struct TrackedCall {
    executor: Arc<RequestExecutor>,
    options: ExecuteOptions,
    state: Arc<Mutex<CallState>>,
}

impl TrackedCall {
    pub fn new(executor: Arc<RequestExecutor>, options: ExecuteOptions) -> Self {
        Self {
            executor,
            options,
            state: Arc::new(Mutex::new(CallState::default())),
        }
    }

    /// Runs `request`, superseding any execution still pending on this call.
    pub async fn execute(&self, request: ApiRequest) -> Result<HttpResponse, CallError> {
        let (cancel, generation) = {
            let mut state = self.state.lock();
            state.cancel.cancel();
            state.cancel = CancellationToken::new();
            state.generation += 1;
            state.retry = Some(RetryState {
                attempt: 1,
                last_attempt_at: Instant::now(),
                pending_args: request.clone(),
            });
            state.last_args = Some(request.clone());
            state.last_error = None;
            state.loading = true;
            (state.cancel.clone(), state.generation)
        };

        let tracker = Arc::clone(&self.state);
        let outcome = self
            .executor
            .run(&request, &self.options, &cancel, move |attempt| {
                let mut state = tracker.lock();
                if state.generation != generation {
                    return;
                }
                if let Some(retry) = state.retry.as_mut() {
                    retry.attempt = attempt;
                    retry.last_attempt_at = Instant::now();
                }
            })
            .await;

        let mut state = self.state.lock();
        if state.generation == generation {
            state.loading = false;
            state.retry = None;
            state.last_error = match &outcome {
                Err(CallError::Failed(error)) => Some(error.clone()),
                _ => None,
            };
        }
        outcome
    }

    /// Re-runs the last captured request from attempt 1.
    pub async fn retry(&self) -> Result<HttpResponse, CallError> {
        let last = self.state.lock().last_args.clone();
        match last {
            Some(request) => self.execute(request).await,
            None => Err(CallError::NothingToRetry),
        }
    }

    /// Forgets all state and cancels any pending retry timer.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.cancel.cancel();
        state.generation += 1;
        state.retry = None;
        state.last_args = None;
        state.last_error = None;
        state.loading = false;
    }

    pub fn state(&self) -> CallSnapshot {
        let state = self.state.lock();
        CallSnapshot {
            loading: state.loading,
            retry: state.retry.clone(),
            last_error: state.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::auth::{AuthCoordinator, MemoryCredentialStore};
    use crate::cache::ResponseCache;
    use crate::classifier::ErrorKind;
    use crate::config::ClientConfig;
    use crate::http_client::{HttpClient, HttpMethod, ScriptedHttpClient};

    fn tracked(transport: &Arc<ScriptedHttpClient>) -> TrackedCall {
        let config = ClientConfig::default();
        let transport: Arc<dyn HttpClient> = Arc::clone(transport) as Arc<dyn HttpClient>;
        let auth = AuthCoordinator::new(
            Arc::clone(&transport),
            Arc::new(MemoryCredentialStore::new()),
            &config,
        );
        let executor = RequestExecutor::new(transport, auth, ResponseCache::new(), config);
        TrackedCall::new(Arc::new(executor), ExecuteOptions::default())
    }

    #[tokio::test]
    async fn retry_without_history_is_rejected() {
        let call = tracked(&Arc::new(ScriptedHttpClient::new()));
        assert_eq!(call.retry().await, Err(CallError::NothingToRetry));
    }

    #[tokio::test]
    async fn retry_replays_last_arguments_from_attempt_one() {
        let transport = Arc::new(ScriptedHttpClient::new());
        transport
            .respond(HttpMethod::Get, "/signals/AAPL", HttpResponse::new(404, ""))
            .respond(HttpMethod::Get, "/signals/AAPL", HttpResponse::ok_json("[]"));
        let call = tracked(&transport);

        let first = call.execute(ApiRequest::get("/signals/AAPL")).await;
        assert_eq!(
            first.expect_err("404").classified().map(ClassifiedError::kind),
            Some(ErrorKind::NotFound)
        );
        assert_eq!(
            call.state().last_error.map(|e| e.kind()),
            Some(ErrorKind::NotFound)
        );

        call.retry().await.expect("retry succeeds");
        let snapshot = call.state();
        assert!(snapshot.last_error.is_none());
        assert!(!snapshot.loading);
        assert_eq!(transport.count(HttpMethod::Get, "/signals/AAPL"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_cancels_pending_backoff() {
        let transport = Arc::new(ScriptedHttpClient::new());
        transport.respond(HttpMethod::Get, "/quotes", HttpResponse::new(503, ""));
        let call = Arc::new(tracked(&transport));

        let running = {
            let call = Arc::clone(&call);
            tokio::spawn(async move { call.execute(ApiRequest::get("/quotes")).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        let snapshot = call.state();
        assert!(snapshot.loading);
        assert_eq!(snapshot.retry.as_ref().map(|r| r.attempt), Some(1));

        call.reset();

        let outcome = running.await.expect("task joins");
        assert_eq!(outcome, Err(CallError::Cancelled));
        assert_eq!(transport.count(HttpMethod::Get, "/quotes"), 1);
        assert!(call.state().retry.is_none());
        assert_eq!(call.retry().await, Err(CallError::NothingToRetry));
    }

    #[tokio::test(start_paused = true)]
    async fn new_execution_supersedes_the_pending_one() {
        let transport = Arc::new(ScriptedHttpClient::new());
        transport.respond(HttpMethod::Get, "/quotes", HttpResponse::new(503, ""));
        transport.respond(HttpMethod::Get, "/portfolio", HttpResponse::ok_json("{}"));
        let call = Arc::new(tracked(&transport));

        let stale = {
            let call = Arc::clone(&call);
            tokio::spawn(async move { call.execute(ApiRequest::get("/quotes")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        call.execute(ApiRequest::get("/portfolio"))
            .await
            .expect("fresh execution succeeds");

        assert_eq!(stale.await.expect("task joins"), Err(CallError::Cancelled));
        assert_eq!(transport.count(HttpMethod::Get, "/quotes"), 1);
        assert!(!call.state().loading);
    }
}
