//! Request execution with retry, credential attachment and renewal replay.
//!
//! One call runs as a strictly sequential series of attempts:
//!
//! 1. attach `Authorization: Bearer <token>` when a session exists,
//! 2. send through the transport,
//! 3. classify any non-2xx response or transport error,
//! 4. on the first `Auth` failure renew the session and replay once (the
//!    replay does not consume an attempt),
//! 5. on a retryable failure with budget left, sleep `base * 2^(attempt-1)`
//!    and try again,
//! 6. otherwise resolve with the classified error.

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{AuthCoordinator, CredentialStore, FileCredentialStore, MemoryCredentialStore};
use crate::cache::{CacheMode, ResponseCache};
use crate::classifier::{classify, ClassifiedError, ErrorKind, RawFailure};
use crate::config::ClientConfig;
use crate::http_client::{
    HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient,
};
use crate::retry::RetryPolicy;

/// Backend call described relative to the configured base url.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Put, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Patch, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Path plus encoded query string.
    pub fn target(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(name),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", self.path)
    }
}

pub type SuccessObserver = Arc<dyn Fn(&HttpResponse) + Send + Sync>;
pub type FailureObserver = Arc<dyn Fn(&ClassifiedError) + Send + Sync>;

/// Per-call retry budget and observers.
#[derive(Clone, Default)]
pub struct ExecuteOptions {
    pub retry: RetryPolicy,
    pub on_success: Option<SuccessObserver>,
    pub on_error: Option<FailureObserver>,
}

impl Debug for ExecuteOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("retry", &self.retry)
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl ExecuteOptions {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            retry: RetryPolicy::new(max_attempts, base_delay),
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn on_success(mut self, observer: impl Fn(&HttpResponse) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(observer));
        self
    }

    pub fn on_error(mut self, observer: impl Fn(&ClassifiedError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(observer));
        self
    }
}

/// Outcome of a call that can be superseded or reset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error(transparent)]
    Failed(#[from] ClassifiedError),
    #[error("call was cancelled before it resolved")]
    Cancelled,
    #[error("no previous call to retry")]
    NothingToRetry,
}

impl CallError {
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Failed(error) => Some(error),
            Self::Cancelled | Self::NothingToRetry => None,
        }
    }
}

/// Shared executor: transport, session and response cache.
pub struct RequestExecutor {
    transport: Arc<dyn HttpClient>,
    auth: AuthCoordinator,
    cache: ResponseCache,
    config: ClientConfig,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn HttpClient>,
        auth: AuthCoordinator,
        cache: ResponseCache,
        config: ClientConfig,
    ) -> Self {
        Self {
            transport,
            auth,
            cache,
            config,
        }
    }

    /// Wires the reqwest transport and the configured credential store.
    pub fn from_config(config: ClientConfig) -> Self {
        let transport: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
        let store: Arc<dyn CredentialStore> = match &config.credentials_path {
            Some(path) => Arc::new(FileCredentialStore::new(path)),
            None => Arc::new(MemoryCredentialStore::new()),
        };
        let auth = AuthCoordinator::new(Arc::clone(&transport), store, &config);
        Self::new(transport, auth, ResponseCache::new(), config)
    }

    pub fn auth(&self) -> &AuthCoordinator {
        &self.auth
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Options carrying the configured retry policy.
    pub fn default_options(&self) -> ExecuteOptions {
        ExecuteOptions::default().with_retry(self.config.retry)
    }

    /// Runs `request` to completion. Failures are always classified.
    pub async fn execute(
        &self,
        request: &ApiRequest,
        options: &ExecuteOptions,
    ) -> Result<HttpResponse, ClassifiedError> {
        let never = CancellationToken::new();
        match self.run(request, options, &never, |_| {}).await {
            Ok(response) => Ok(response),
            Err(CallError::Failed(error)) => Err(error),
            Err(other) => Err(classify(&RawFailure::other(other.to_string()))),
        }
    }

    /// Runs `request` and decodes the JSON body.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        options: &ExecuteOptions,
    ) -> Result<T, ClassifiedError> {
        let response = self.execute(request, options).await?;
        decode(&response)
    }

    /// Cache-aware variant of [`RequestExecutor::execute_json`].
    ///
    /// `ttl` defaults to the configured cache TTL.
    pub async fn execute_cached(
        &self,
        key: &str,
        ttl: Option<Duration>,
        request: &ApiRequest,
        mode: CacheMode,
        options: &ExecuteOptions,
    ) -> Result<Value, ClassifiedError> {
        if mode == CacheMode::Use {
            if let Some(cached) = self.cache.get(key) {
                debug!(key, "cache hit");
                return Ok(cached);
            }
        }

        let value: Value = self.execute_json(request, options).await?;
        if mode != CacheMode::Bypass {
            self.cache
                .set_for(key, value.clone(), ttl.unwrap_or(self.config.cache_ttl));
        }
        Ok(value)
    }

    /// Attempt loop shared by [`RequestExecutor::execute`] and tracked calls.
    ///
    /// `on_attempt` observes the attempt number before each send.
    /// Cancelling `cancel` aborts a pending backoff wait and discards the
    /// outcome of an attempt already in flight.
    pub(crate) async fn run<F>(
        &self,
        request: &ApiRequest,
        options: &ExecuteOptions,
        cancel: &CancellationToken,
        mut on_attempt: F,
    ) -> Result<HttpResponse, CallError>
    where
        F: FnMut(u32) + Send,
    {
        let mut attempt: u32 = 1;
        let mut renewed = false;

        loop {
            on_attempt(attempt);
            let token = self.auth.access_token();
            let outcome = self.send(request, token.as_deref()).await;

            if cancel.is_cancelled() {
                debug!(path = %request.path, "discarding outcome of cancelled call");
                return Err(CallError::Cancelled);
            }

            let failure = match outcome {
                Ok(response) if response.is_success() => {
                    debug!(path = %request.path, attempt, status = response.status, "call succeeded");
                    if let Some(observer) = &options.on_success {
                        observer(&response);
                    }
                    return Ok(response);
                }
                Ok(response) => RawFailure::Response(response),
                Err(error) => RawFailure::Transport(error),
            };
            let error = classify(&failure);
            debug!(
                path = %request.path,
                attempt,
                kind = %error.kind(),
                status = error.status_code(),
                "call attempt failed"
            );

            if error.kind() == ErrorKind::Auth && !renewed {
                renewed = true;
                let current = self.auth.access_token();
                if current.is_some() && current != token {
                    debug!("credentials changed while the call was in flight; replaying");
                    continue;
                }
                match self.auth.renew().await {
                    Ok(_) => {
                        info!(path = %request.path, "session renewed; replaying call");
                        continue;
                    }
                    Err(auth_error) => {
                        warn!(error = %auth_error, "session expired");
                        return Err(Self::fail(error, options));
                    }
                }
            }

            if error.retryable() && options.retry.allows_another(attempt) {
                let delay = options.retry.wait_after(attempt, error.retry_after());
                warn!(
                    path = %request.path,
                    attempt,
                    kind = %error.kind(),
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "retrying after backoff"
                );

                tokio::select! {
                    () = cancel.cancelled() => return Err(CallError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
                continue;
            }

            return Err(Self::fail(error, options));
        }
    }

    fn fail(error: ClassifiedError, options: &ExecuteOptions) -> CallError {
        if let Some(observer) = &options.on_error {
            observer(&error);
        }
        CallError::Failed(error)
    }

    async fn send(&self, request: &ApiRequest, token: Option<&str>) -> Result<HttpResponse, HttpError> {
        let url = self.config.url_for(&request.target());
        let token = match token {
            Some(_) if !self.config.is_backend_url(&url) => {
                warn!(%url, "target is outside the backend; sending without credentials");
                None
            }
            token => token,
        };
        let mut http = HttpRequest::new(request.method, url).with_timeout_ms(self.config.timeout_ms);
        for (name, value) in &request.headers {
            http = http.with_header(name, value);
        }
        if let Some(body) = &request.body {
            http = http.with_json(body);
        }
        if let Some(token) = token {
            http = http.with_auth(&HttpAuth::BearerToken(token.to_owned()));
        }
        self.transport.execute(http).await
    }
}

fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ClassifiedError> {
    let body = if response.body.trim().is_empty() {
        "null"
    } else {
        response.body.as_str()
    };
    serde_json::from_str(body).map_err(|error| classify(&RawFailure::other(error.to_string())))
}
