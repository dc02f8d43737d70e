use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::Error;
use crate::retry::{BackoffStrategy, RetryPolicy};

/// Settings for a [`WatchtowerClient`](crate::WatchtowerClient).
///
/// Usually assembled with [`ClientBuilder`](crate::ClientBuilder), or loaded
/// from TOML:
///
/// ```
/// use watchtower_client::ClientConfig;
///
/// let config = ClientConfig::from_toml_str(r#"
///     base_url = "https://api.watchtower.example"
///     retry_count = 2
///
///     [auth]
///     monitoring_key = "mk-eu-west"
/// "#).unwrap();
/// assert_eq!(config.retry_count, 2);
/// assert_eq!(config.timeout_ms, 30_000);
/// ```
///
/// The client takes ownership of its configuration and never hands out a
/// mutable reference to it.
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    /// API root, e.g. `https://api.watchtower.example`.
    pub base_url: String,
    /// Credential fields. Exactly one strategy is picked from them.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Limit on establishing the TCP/TLS connection, in milliseconds. A
    /// connect that stalls past it is retried like a refused connection.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Retries after the first attempt.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Upper bound on the delay between retries, in milliseconds.
    #[serde(default = "default_backoff_ceiling_ms")]
    pub backoff_ceiling_ms: u64,
    /// Longest `Retry-After` or rate-limit reset the client waits out, in
    /// milliseconds. Longer requests end the retries.
    #[serde(default = "default_max_retry_after_ms")]
    pub max_retry_after_ms: u64,
    /// Log request and response bodies at `debug` level.
    #[serde(default)]
    pub debug: bool,
    /// Override for the `User-Agent` header.
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Every credential shape the API accepts.
///
/// Several may be filled in; see [`Credentials::resolve`](crate::Credentials::resolve)
/// for the order in which they are considered.
#[derive(Debug, Default, Deserialize)]
pub struct AuthConfig {
    /// User session token, sent as `Authorization: Bearer`.
    #[serde(default)]
    pub token: Option<SecretString>,
    /// Monitored-server UUID. Requires `server_secret`.
    #[serde(default)]
    pub server_uuid: Option<String>,
    #[serde(default)]
    pub server_secret: Option<SecretString>,
    /// Key used by regional probe runners.
    #[serde(default)]
    pub monitoring_key: Option<SecretString>,
    /// Key used by machine integrations.
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Organization the API key belongs to.
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Allow a client with no credentials at all.
    #[serde(default)]
    pub allow_anonymous: bool,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_retry_count() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_ceiling_ms() -> u64 {
    30_000
}

fn default_max_retry_after_ms() -> u64 {
    60_000
}

impl ClientConfig {
    /// Configuration with default timeouts and retries and no credentials.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth: AuthConfig::default(),
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            retry_count: default_retry_count(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_ceiling_ms: default_backoff_ceiling_ms(),
            max_retry_after_ms: default_max_retry_after_ms(),
            debug: false,
            user_agent: None,
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, Error> {
        toml::from_str(raw).map_err(|e| Error::Configuration(format!("invalid client config: {e}")))
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Connection-establishment timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Retry policy implied by the retry and backoff fields.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_count: self.retry_count,
            backoff: BackoffStrategy::exponential(
                Duration::from_millis(self.backoff_base_ms),
                Duration::from_millis(self.backoff_ceiling_ms),
            ),
            max_server_delay: Duration::from_millis(self.max_retry_after_ms),
        }
    }
}
