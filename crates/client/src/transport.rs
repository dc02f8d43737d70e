//! Pooled HTTP transport with bounded, cancellable retries.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::Error;
use crate::request::Request;
use crate::retry::{self, RetryPolicy};

/// Status, headers and fully-read body of one HTTP response.
#[derive(Debug, Clone)]
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Sends requests through one shared connection pool.
///
/// Cloning is cheap and every clone uses the same pool.
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    http: Client,
    base_url: Arc<str>,
    auth_headers: Arc<HeaderMap>,
    retry: RetryPolicy,
    timeout: Duration,
    log_bodies: bool,
}

impl Transport {
    pub(crate) fn new(
        http: Client,
        base_url: impl Into<Arc<str>>,
        auth_headers: HeaderMap,
        retry: RetryPolicy,
        timeout: Duration,
        log_bodies: bool,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            auth_headers: Arc::new(auth_headers),
            retry,
            timeout,
            log_bodies,
        }
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `request`, retrying per the retry policy.
    ///
    /// Connection failures, 5xx and 429 are retried until attempts run out
    /// or the server asks for a wait beyond the policy's limit; the last
    /// response or error is then returned as-is for the caller to classify. Cancelling `cancel` aborts the in-flight attempt or the
    /// pending backoff with [`Error::Cancelled`].
    pub(crate) async fn send(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, Error> {
        let url = format!("{}{}", self.base_url, request.path());
        let timeout = request.timeout_override().unwrap_or(self.timeout);
        let max_attempts = self.retry.max_attempts();

        if self.log_bodies
            && let Some(body) = request.body()
        {
            debug!(body = %String::from_utf8_lossy(body), "request body");
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            debug!(
                method = %request.method(),
                url = %url,
                attempt,
                max_attempts,
                "sending request"
            );

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                outcome = self.attempt(request, &url, timeout) => outcome,
            };
            let retries_left = attempt < max_attempts;

            match outcome {
                Ok(raw) => {
                    debug!(
                        method = %request.method(),
                        url = %url,
                        attempt,
                        status = raw.status.as_u16(),
                        "received response"
                    );
                    if self.log_bodies {
                        debug!(body = %String::from_utf8_lossy(&raw.body), "response body");
                    }
                    if !(retries_left && RetryPolicy::is_retryable_status(raw.status)) {
                        return Ok(raw);
                    }
                    let requested = retry::server_delay(&raw.headers);
                    let Some(delay) = self.retry.delay_for(attempt - 1, requested) else {
                        warn!(
                            url = %url,
                            attempt,
                            status = raw.status.as_u16(),
                            requested_ms = ?requested.map(|d| d.as_millis()),
                            max_ms = %self.retry.max_server_delay.as_millis(),
                            "server asked to wait longer than allowed, not retrying"
                        );
                        return Ok(raw);
                    };
                    warn!(
                        url = %url,
                        attempt,
                        status = raw.status.as_u16(),
                        delay_ms = %delay.as_millis(),
                        "retryable response, will retry"
                    );
                    pause(delay, cancel).await?;
                }
                Err(err) => {
                    if !(retries_left && err.is_retryable()) {
                        warn!(
                            url = %url,
                            attempt,
                            error = %err,
                            retryable = err.is_retryable(),
                            "request failed"
                        );
                        return Err(err);
                    }
                    let delay = self.retry.backoff.delay_for(attempt - 1);
                    warn!(
                        url = %url,
                        attempt,
                        error = %err,
                        delay_ms = %delay.as_millis(),
                        "transport error, will retry"
                    );
                    pause(delay, cancel).await?;
                }
            }
        }
    }

    async fn attempt(
        &self,
        request: &Request,
        url: &str,
        timeout: Duration,
    ) -> Result<RawResponse, Error> {
        let mut builder = self
            .http
            .request(request.method().clone(), url)
            .headers(HeaderMap::clone(&self.auth_headers))
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .timeout(timeout);

        if !request.query_params().is_empty() {
            builder = builder.query(request.query_params());
        }
        if let Some(body) = request.body() {
            builder = builder
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(&e, timeout))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&e, timeout))?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

/// Sleep for `delay` unless `cancel` fires first.
async fn pause(delay: Duration, cancel: &CancellationToken) -> Result<(), Error> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Map a reqwest failure onto the error taxonomy.
///
/// Connect failures (including connect timeouts) are checked before the
/// general timeout so they stay retryable.
fn transport_error(err: &reqwest::Error, timeout: Duration) -> Error {
    if err.is_connect() {
        Error::Connection(err.to_string())
    } else if err.is_timeout() {
        Error::Timeout(timeout)
    } else if err.is_builder() {
        Error::Configuration(err.to_string())
    } else {
        Error::Connection(err.to_string())
    }
}
