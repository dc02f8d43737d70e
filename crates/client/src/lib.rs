//! Watchtower HTTP Client
//!
//! A Rust client for the Watchtower monitoring platform's REST API.
//!
//! Every endpoint goes through one pipeline: the configured credential is
//! attached, the request is sent over a shared connection pool with bounded
//! retries, and the response envelope is decoded or turned into a typed
//! [`Error`].
//!
//! # Quick Start
//!
//! ```no_run
//! use watchtower_client::{Request, WatchtowerClient};
//! use watchtower_core::ListOptions;
//!
//! #[derive(Debug, serde::Deserialize)]
//! struct Server {
//!     uuid: String,
//!     hostname: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), watchtower_client::Error> {
//!     let client = WatchtowerClient::builder("https://api.watchtower.example")
//!         .token("user-session-token")
//!         .build()?;
//!
//!     let request = Request::get("/v1/servers").list_options(&ListOptions::new().limit(50));
//!     let response = client.execute::<Vec<Server>>(request).await?;
//!
//!     for server in response.data.unwrap_or_default() {
//!         println!("{} {}", server.uuid, server.hostname);
//!     }
//!     if let Some(meta) = response.meta {
//!         println!("page {} of {}", meta.page, meta.total_pages);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! ```no_run
//! use std::time::Duration;
//! use watchtower_client::WatchtowerClient;
//!
//! let client = WatchtowerClient::builder("https://api.watchtower.example")
//!     .server_identity("6f1d2c3b-0000-4000-8000-000000000001", "agent-secret")
//!     .timeout(Duration::from_secs(10))
//!     .retry_count(5)
//!     .backoff(Duration::from_millis(250), Duration::from_secs(8))
//!     .build()
//!     .unwrap();
//! ```
//!
//! # Cancellation
//!
//! Every call has a `*_with_cancel` form that takes a
//! [`CancellationToken`]. Cancelling it aborts the in-flight request or the
//! backoff wait and the call returns [`Error::Cancelled`].

pub mod alerts;
mod auth;
mod config;
mod error;
mod request;
mod response;
mod retry;
mod transport;

pub use auth::{AuthMethod, Credentials};
pub use config::{AuthConfig, ClientConfig};
pub use error::Error;
pub use request::{Request, encode_segment};
pub use response::{ApiResponse, RawPayload, UNEXPECTED_FORMAT};
pub use retry::{BackoffStrategy, RetryPolicy};

pub use tokio_util::sync::CancellationToken;
pub use watchtower_core::{ListOptions, PaginationMeta, SortOrder};

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::transport::Transport;

const DEFAULT_USER_AGENT: &str = concat!("watchtower-client/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the Watchtower API.
///
/// Safe to share between tasks: clones share the same connection pool and
/// immutable configuration.
#[derive(Debug, Clone)]
pub struct WatchtowerClient {
    config: Arc<ClientConfig>,
    credentials: Arc<Credentials>,
    transport: Transport,
}

/// Builder for configuring a [`WatchtowerClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    config: ClientConfig,
    backoff: Option<BackoffStrategy>,
    client: Option<Client>,
}

impl ClientBuilder {
    /// Create a new builder with the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::from_config(ClientConfig::new(base_url))
    }

    /// Start from an existing configuration, e.g. one loaded from TOML.
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            backoff: None,
            client: None,
        }
    }

    /// Authenticate with a user session token.
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.auth.token = Some(SecretString::new(token.into()));
        self
    }

    /// Authenticate as a monitored server.
    #[must_use]
    pub fn server_identity(mut self, uuid: impl Into<String>, secret: impl Into<String>) -> Self {
        self.config.auth.server_uuid = Some(uuid.into());
        self.config.auth.server_secret = Some(SecretString::new(secret.into()));
        self
    }

    /// Authenticate as a probe runner.
    #[must_use]
    pub fn monitoring_key(mut self, key: impl Into<String>) -> Self {
        self.config.auth.monitoring_key = Some(SecretString::new(key.into()));
        self
    }

    /// Authenticate with an integration API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.auth.api_key = Some(SecretString::new(key.into()));
        self
    }

    /// Organization sent alongside the API key.
    #[must_use]
    pub fn organization_id(mut self, organization_id: impl Into<String>) -> Self {
        self.config.auth.organization_id = Some(organization_id.into());
        self
    }

    /// Permit building a client without any credentials.
    #[must_use]
    pub fn allow_anonymous(mut self, allow: bool) -> Self {
        self.config.auth.allow_anonymous = allow;
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the limit on establishing a connection. Connects that stall past
    /// it are retried.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set how many times a failed request is retried. `0` disables retries.
    #[must_use]
    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.config.retry_count = retry_count;
        self
    }

    /// Exponential backoff from `base` up to `ceiling`.
    #[must_use]
    pub fn backoff(mut self, base: Duration, ceiling: Duration) -> Self {
        self.config.backoff_base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        self.config.backoff_ceiling_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        self.backoff = None;
        self
    }

    /// Longest server-requested wait (`Retry-After` or rate-limit reset) to
    /// sit out. A longer request ends the retries and the 429/503 error is
    /// returned with its `retry_after`.
    #[must_use]
    pub fn max_retry_after(mut self, max: Duration) -> Self {
        self.config.max_retry_after_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Use a custom backoff curve instead of the exponential default.
    #[must_use]
    pub fn backoff_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = Some(strategy);
        self
    }

    /// Log request and response bodies at `debug` level.
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Use a custom reqwest Client.
    ///
    /// Useful for configuring TLS, proxies, or other advanced settings. The
    /// configured timeout is still applied to every request; the connect
    /// timeout is not, so set it on the supplied client.
    #[must_use]
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Validate the configuration and build the client.
    ///
    /// Credential problems are reported here rather than on the first
    /// request.
    pub fn build(self) -> Result<WatchtowerClient, Error> {
        let Self {
            mut config,
            backoff,
            client,
        } = self;

        let base_url = config.base_url.trim().trim_end_matches('/').to_owned();
        let parsed = reqwest::Url::parse(&base_url)
            .map_err(|e| Error::Configuration(format!("invalid base URL {base_url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Configuration(format!(
                "base URL must use http or https, got {:?}",
                parsed.scheme()
            )));
        }
        config.base_url = base_url;

        if config.timeout_ms == 0 {
            return Err(Error::Configuration("timeout must be greater than zero".into()));
        }
        if config.connect_timeout_ms == 0 {
            return Err(Error::Configuration(
                "connect timeout must be greater than zero".into(),
            ));
        }

        let credentials = Credentials::resolve(&config.auth)?;
        let auth_headers = credentials.headers()?;

        let mut retry = config.retry_policy();
        if let Some(strategy) = backoff {
            retry.backoff = strategy;
        }
        retry.backoff.validate().map_err(Error::Configuration)?;

        let client = match client {
            Some(c) => c,
            None => Client::builder()
                .user_agent(config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT))
                .connect_timeout(config.connect_timeout())
                .build()
                .map_err(|e| Error::Configuration(e.to_string()))?,
        };

        let transport = Transport::new(
            client,
            config.base_url.as_str(),
            auth_headers,
            retry,
            config.timeout(),
            config.debug,
        );

        Ok(WatchtowerClient {
            config: Arc::new(config),
            credentials: Arc::new(credentials),
            transport,
        })
    }
}

impl WatchtowerClient {
    /// Create a builder for the given base URL.
    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    /// Build a client straight from a configuration value.
    pub fn from_config(config: ClientConfig) -> Result<Self, Error> {
        ClientBuilder::from_config(config).build()
    }

    /// Get the base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    /// The configuration this client was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The authentication strategy selected at build time.
    pub fn auth_method(&self) -> AuthMethod {
        self.credentials.method()
    }

    /// Execute `request` and decode the envelope's `data` into `T`.
    ///
    /// Use [`serde::de::IgnoredAny`] for `T` when the payload is not needed.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: Request,
    ) -> Result<ApiResponse<T>, Error> {
        self.execute_with_cancel(request, &CancellationToken::new()).await
    }

    /// Like [`execute`](Self::execute), aborting when `cancel` fires.
    #[instrument(skip(self, request, cancel), fields(method = %request.method(), path = %request.path()))]
    pub async fn execute_with_cancel<T: DeserializeOwned>(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse<T>, Error> {
        let raw = self.transport.send(&request, cancel).await?;
        response::decode(&raw, request.path())
    }

    /// Execute `request` and return the body without JSON decoding.
    ///
    /// For endpoints that answer with CSV or other non-JSON content. Error
    /// statuses are still classified.
    pub async fn execute_raw(&self, request: Request) -> Result<RawPayload, Error> {
        self.execute_raw_with_cancel(request, &CancellationToken::new()).await
    }

    /// Like [`execute_raw`](Self::execute_raw), aborting when `cancel` fires.
    #[instrument(skip(self, request, cancel), fields(method = %request.method(), path = %request.path()))]
    pub async fn execute_raw_with_cancel(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<RawPayload, Error> {
        let raw = self.transport.send(&request, cancel).await?;
        response::decode_raw(raw, request.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ClientBuilder {
        WatchtowerClient::builder("http://localhost:8080/").token("tok")
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = builder().build().unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.config().base_url, "http://localhost:8080");
    }

    #[test]
    fn builder_selects_auth_method() {
        let client = WatchtowerClient::builder("http://localhost:8080")
            .monitoring_key("mk")
            .api_key("ak")
            .build()
            .unwrap();
        assert_eq!(client.auth_method(), AuthMethod::MonitoringKey);
    }

    #[test]
    fn missing_credentials_fail_at_build_time() {
        let err = WatchtowerClient::builder("http://localhost:8080")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let client = WatchtowerClient::builder("http://localhost:8080")
            .allow_anonymous(true)
            .build()
            .unwrap();
        assert_eq!(client.auth_method(), AuthMethod::Anonymous);
    }

    #[test]
    fn invalid_base_urls_are_rejected() {
        for url in ["not a url", "ftp://files.example.com", ""] {
            let err = WatchtowerClient::builder(url).token("t").build().unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{url}: {err:?}");
        }
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = builder().timeout(Duration::ZERO).build().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let err = builder().connect_timeout(Duration::ZERO).build().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn invalid_backoff_is_rejected() {
        let err = builder()
            .backoff(Duration::from_secs(10), Duration::from_secs(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn builder_settings_land_in_config() {
        let client = builder()
            .timeout(Duration::from_millis(1500))
            .connect_timeout(Duration::from_millis(400))
            .max_retry_after(Duration::from_secs(5))
            .retry_count(0)
            .debug(true)
            .user_agent("probe/2.0")
            .build()
            .unwrap();
        let config = client.config();
        assert_eq!(config.timeout(), Duration::from_millis(1500));
        assert_eq!(config.connect_timeout(), Duration::from_millis(400));
        assert_eq!(config.retry_policy().max_server_delay, Duration::from_secs(5));
        assert_eq!(config.retry_count, 0);
        assert!(config.debug);
        assert_eq!(config.user_agent.as_deref(), Some("probe/2.0"));
    }

    #[test]
    fn from_toml_config() {
        let config = ClientConfig::from_toml_str(
            r#"
            base_url = "https://api.example.com/"
            [auth]
            api_key = "ak"
            organization_id = "org-1"
            "#,
        )
        .unwrap();
        let client = WatchtowerClient::from_config(config).unwrap();
        assert_eq!(client.auth_method(), AuthMethod::ApiKey);
        assert_eq!(client.base_url(), "https://api.example.com");
    }

    #[test]
    fn client_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WatchtowerClient>();
    }
}
