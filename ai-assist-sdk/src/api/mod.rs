//! Resilient request layer
//!
//! `ApiClient` carries the application's generic API traffic. Every attempt
//! has a timeout; network errors, timeouts and 5xx responses are retried
//! with capped exponential backoff; CORS, quota and client errors fail
//! immediately. Writes made while offline, or whose retries end in a network
//! error, go to a durable `OfflineQueue` and are replayed in priority order
//! when connectivity returns.
//!
//! When the client itself concludes it is offline (a write ended in a
//! network error) it checks the base URL on the backoff schedule and marks
//! connectivity restored as soon as the server answers.
//!
//! Completion provider calls never go through this layer.

mod builder;
mod connectivity;
mod offline;
mod retry;
mod types;

pub use builder::{ApiClientBuilder, ApiClientConfig};
pub use connectivity::ConnectivityMonitor;
pub use offline::{OfflineOperation, OfflineQueue, Priority, ReplayFailure, MAX_REPLAY_ATTEMPTS};
pub use retry::RetryPolicy;
pub use types::{ApiResponse, HttpMethod, RequestOptions};

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use backoff::backoff::Backoff;
use log::{debug, info, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::error::mapping::map_http_error;
use crate::error::{ApiError, ApiErrorType, ErrorContext};
use crate::services::common::join_url;
use crate::storage::KeyValueStore;
use crate::util::{generate_request_id, sanitize_for_logging};

/// Consecutive failures after which the client reports unhealthy
const UNHEALTHY_AFTER_FAILURES: u32 = 3;

/// Result type for the request layer
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// What one offline queue drain did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Operations sent successfully and removed
    pub replayed: usize,

    /// Operations that failed and stay queued
    pub failed: usize,

    /// Operations removed after reaching the replay limit
    pub dropped: usize,

    /// Another drain was already running, nothing was done
    pub skipped: bool,
}

struct Inner {
    config: ApiClientConfig,
    http_client: Client,
    queue: OfflineQueue,
    monitor: ConnectivityMonitor,
    consecutive_failures: AtomicU32,
    processing: AtomicBool,
    reconnecting: AtomicBool,
}

/// Clears a flag when the guarded work ends, however it ends
struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// HTTP client for generic API traffic. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder::new(base_url)
    }

    pub(crate) fn from_parts(
        config: ApiClientConfig,
        http_client: Client,
        store: Arc<dyn KeyValueStore>,
        monitor: ConnectivityMonitor,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                http_client,
                queue: OfflineQueue::load(store),
                monitor,
                consecutive_failures: AtomicU32::new(0),
                processing: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
            }),
        }
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: Option<RequestOptions>,
    ) -> ApiResponse<T> {
        self.request(endpoint, Self::with_method(options, HttpMethod::Get)).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: Option<RequestOptions>,
    ) -> ApiResponse<T> {
        self.request(endpoint, Self::with_method(options, HttpMethod::Post)).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: Option<RequestOptions>,
    ) -> ApiResponse<T> {
        self.request(endpoint, Self::with_method(options, HttpMethod::Put)).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: Option<RequestOptions>,
    ) -> ApiResponse<T> {
        self.request(endpoint, Self::with_method(options, HttpMethod::Delete)).await
    }

    fn with_method(options: Option<RequestOptions>, method: HttpMethod) -> RequestOptions {
        RequestOptions {
            method,
            ..options.unwrap_or_default()
        }
    }

    /// Send a request with the method given in `options`
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> ApiResponse<T> {
        let method = options.method;

        if !self.inner.monitor.is_online() {
            if method.is_mutating() {
                return self.enqueue(endpoint, options).await;
            }
            return ApiResponse::failure(
                ApiError::network("Offline: read requests are not queued").with_context(
                    ErrorContext::new().method(method.as_str()).endpoint(endpoint),
                ),
            );
        }

        let policy = match options.retries {
            Some(retries) => self.inner.config.retry.with_retries(retries),
            None => self.inner.config.retry.clone(),
        };
        let request_id = generate_request_id();

        let result = policy
            .execute(|attempt| {
                debug!("{} {} (attempt {}, request {})", method, endpoint, attempt, request_id);
                self.send_once::<T>(endpoint, &options, &request_id)
            })
            .await;

        match result {
            Ok((status, data)) => {
                self.inner.consecutive_failures.store(0, Ordering::Relaxed);
                ApiResponse::success(status, data)
            }
            Err(error) => {
                self.inner.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                warn!("{} {} failed: {}", method, endpoint, error);

                if error.kind == ApiErrorType::NetworkError && method.is_mutating() {
                    if self.inner.monitor.set_online(false) {
                        self.spawn_reconnect_checks();
                    }
                    return self.enqueue(endpoint, options).await;
                }
                ApiResponse::failure(error)
            }
        }
    }

    async fn enqueue<T>(&self, endpoint: &str, options: RequestOptions) -> ApiResponse<T> {
        match self.inner.queue.enqueue(endpoint, options).await {
            Ok(operation) => {
                info!("Queued {} {} for replay", operation.options.method, operation.endpoint);
                ApiResponse::queued()
            }
            Err(error) => ApiResponse::failure(error),
        }
    }

    /// One HTTP exchange: status and decoded body, or a classified error
    async fn send_once<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        request_id: &str,
    ) -> ApiResult<(u16, Option<T>)> {
        let context = ErrorContext::new()
            .method(options.method.as_str())
            .endpoint(endpoint)
            .request_id(request_id);

        let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            join_url(&self.inner.config.base_url, endpoint)
        };

        let mut builder = self.inner.http_client.request(options.method.into(), &url);
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = options.timeout() {
            builder = builder.timeout(timeout);
        }
        if let (Some(body), true) = (&options.body, options.method.is_mutating()) {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::from(e).with_context(context.clone()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::from(e).with_context(context.clone()))?;

        if !status.is_success() {
            debug!("{} returned {}: {}", url, status, sanitize_for_logging(&body));
            return Err(map_http_error(status, &body, context));
        }

        if body.trim().is_empty() {
            return Ok((status.as_u16(), None));
        }

        let data = serde_json::from_str::<T>(&body).map_err(|e| {
            ApiError::unknown(format!("Failed to parse response: {}", e))
                .with_context(context.status_code(status.as_u16()))
        })?;
        Ok((status.as_u16(), Some(data)))
    }

    /// Replay queued operations in priority order.
    ///
    /// A drain already in progress makes this return immediately with
    /// `skipped` set. A network failure ends the drain early.
    pub async fn process_offline_queue(&self) -> ReplayReport {
        if self.inner.processing.swap(true, Ordering::AcqRel) {
            debug!("Offline queue drain already in progress");
            return ReplayReport {
                skipped: true,
                ..ReplayReport::default()
            };
        }
        let _guard = FlagGuard(&self.inner.processing);

        let mut report = ReplayReport::default();
        for operation in self.inner.queue.pending().await {
            if !self.inner.monitor.is_online() {
                debug!("Connectivity lost, pausing offline queue drain");
                break;
            }

            let request_id = generate_request_id();
            match self
                .send_once::<Value>(&operation.endpoint, &operation.options, &request_id)
                .await
            {
                Ok(_) => {
                    report.replayed += 1;
                    if let Err(e) = self.inner.queue.remove(&operation.id).await {
                        warn!("Failed to persist offline queue after replay: {}", e);
                    }
                }
                Err(error) => {
                    warn!(
                        "Replay of {} {} failed: {}",
                        operation.options.method, operation.endpoint, error
                    );
                    match self.inner.queue.record_failure(&operation.id).await {
                        Ok(ReplayFailure::Dropped) => report.dropped += 1,
                        Ok(_) => report.failed += 1,
                        Err(e) => {
                            report.failed += 1;
                            warn!("Failed to persist offline queue after replay failure: {}", e);
                        }
                    }

                    if error.kind == ApiErrorType::NetworkError {
                        break;
                    }
                }
            }
        }

        if report.replayed + report.failed + report.dropped > 0 {
            info!(
                "Offline queue drain: {} replayed, {} failed, {} dropped",
                report.replayed, report.failed, report.dropped
            );
        }
        report
    }

    /// Discard every queued operation
    pub async fn clear_offline_queue(&self) -> ApiResult<()> {
        self.inner.queue.clear().await
    }

    /// Snapshot of queued operations in replay order
    pub async fn pending_operations(&self) -> Vec<OfflineOperation> {
        self.inner.queue.pending().await
    }

    /// Online and fewer than three consecutive failed requests
    pub fn is_healthy(&self) -> bool {
        self.inner.monitor.is_online()
            && self.inner.consecutive_failures.load(Ordering::Relaxed) < UNHEALTHY_AFTER_FAILURES
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.inner.monitor
    }

    pub fn config(&self) -> &ApiClientConfig {
        &self.inner.config
    }

    /// Ask the base URL whether the server is reachable again.
    ///
    /// Any HTTP response counts, whatever its status. On success the monitor
    /// is set online and the failure streak is reset.
    pub async fn check_connectivity(&self) -> bool {
        match self
            .inner
            .http_client
            .head(&self.inner.config.base_url)
            .send()
            .await
        {
            Ok(response) => {
                debug!("{} answered {}, back online", self.inner.config.base_url, response.status());
                self.inner.consecutive_failures.store(0, Ordering::Relaxed);
                if self.inner.monitor.set_online(true) {
                    info!("Connectivity to {} restored", self.inner.config.base_url);
                }
                true
            }
            Err(e) => {
                debug!("{} still unreachable: {}", self.inner.config.base_url, e);
                false
            }
        }
    }

    /// Check the base URL on the backoff schedule until connectivity returns.
    ///
    /// Holds only a weak reference, so dropping the last client ends it. A
    /// check loop already running makes this a no-op.
    fn spawn_reconnect_checks(&self) {
        if self.inner.reconnecting.swap(true, Ordering::AcqRel) {
            return;
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let mut schedule = self.inner.config.retry.schedule();

        tokio::spawn(async move {
            while let Some(delay) = schedule.next_backoff() {
                tokio::time::sleep(delay).await;

                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let client = ApiClient { inner };

                if client.inner.monitor.is_online() || client.check_connectivity().await {
                    break;
                }
            }

            if let Some(inner) = weak.upgrade() {
                inner.reconnecting.store(false, Ordering::Release);
            }
        });
    }

    /// Drain the queue on every offline to online transition.
    ///
    /// The task holds a clone of the client and runs until aborted.
    pub fn spawn_replay_listener(&self) -> JoinHandle<()> {
        let client = self.clone();
        let mut changes = self.inner.monitor.subscribe();

        tokio::spawn(async move {
            let mut was_online = *changes.borrow_and_update();

            while changes.changed().await.is_ok() {
                let online = *changes.borrow_and_update();
                if online && !was_online {
                    info!("Connectivity restored, replaying offline queue");
                    client.process_offline_queue().await;
                }
                was_online = online;
            }
        })
    }
}
