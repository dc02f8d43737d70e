//! Selection of the single authentication strategy a client uses.

use std::fmt;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use crate::Error;
use crate::config::AuthConfig;

pub const SERVER_UUID_HEADER: HeaderName = HeaderName::from_static("x-server-uuid");
pub const SERVER_SECRET_HEADER: HeaderName = HeaderName::from_static("x-server-secret");
pub const MONITORING_KEY_HEADER: HeaderName = HeaderName::from_static("x-monitoring-key");
pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");
pub const ORGANIZATION_ID_HEADER: HeaderName = HeaderName::from_static("x-organization-id");

/// The credential a client presents on every request.
///
/// Exactly one variant is active per client; its headers are never mixed
/// with another variant's.
#[derive(Debug)]
pub enum Credentials {
    /// `Authorization: Bearer <token>` for user sessions.
    Bearer(SecretString),
    /// `X-Server-UUID` and `X-Server-Secret` for monitored agents.
    ServerIdentity { uuid: String, secret: SecretString },
    /// `X-Monitoring-Key` for probe runners.
    MonitoringKey(SecretString),
    /// `X-API-Key`, plus `X-Organization-ID` when known.
    ApiKey {
        key: SecretString,
        organization_id: Option<String>,
    },
    /// No authentication headers.
    Anonymous,
}

/// Which [`Credentials`] variant is in use, without the secret material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Bearer,
    ServerIdentity,
    MonitoringKey,
    ApiKey,
    Anonymous,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bearer => "bearer",
            Self::ServerIdentity => "server-identity",
            Self::MonitoringKey => "monitoring-key",
            Self::ApiKey => "api-key",
            Self::Anonymous => "anonymous",
        };
        f.write_str(name)
    }
}

impl Credentials {
    /// Pick one strategy from the configured credential fields.
    ///
    /// When several are set the first of these wins:
    ///
    /// 1. bearer token
    /// 2. server identity (UUID and secret)
    /// 3. monitoring key
    /// 4. API key
    ///
    /// Blank values count as unset. A server UUID without a secret (or the
    /// reverse) is rejected whatever else is set. With nothing set, the
    /// result is [`Credentials::Anonymous`] if `allow_anonymous` is on and a
    /// configuration error otherwise.
    pub fn resolve(auth: &AuthConfig) -> Result<Self, Error> {
        let server_uuid = auth
            .server_uuid
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let server_secret = present(auth.server_secret.as_ref());

        let server_identity = match (server_uuid, server_secret) {
            (Some(uuid), Some(secret)) => Some((uuid.to_owned(), secret)),
            (None, None) => None,
            (Some(_), None) => {
                return Err(Error::Configuration(
                    "server_uuid is set but server_secret is missing".into(),
                ));
            }
            (None, Some(_)) => {
                return Err(Error::Configuration(
                    "server_secret is set but server_uuid is missing".into(),
                ));
            }
        };

        if let Some(token) = present(auth.token.as_ref()) {
            return Ok(Self::Bearer(token));
        }
        if let Some((uuid, secret)) = server_identity {
            return Ok(Self::ServerIdentity { uuid, secret });
        }
        if let Some(key) = present(auth.monitoring_key.as_ref()) {
            return Ok(Self::MonitoringKey(key));
        }
        if let Some(key) = present(auth.api_key.as_ref()) {
            let organization_id = auth
                .organization_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned);
            return Ok(Self::ApiKey {
                key,
                organization_id,
            });
        }
        if auth.allow_anonymous {
            return Ok(Self::Anonymous);
        }
        Err(Error::Configuration(
            "no credentials configured; set a token, server identity, monitoring key or API key, \
             or enable allow_anonymous"
                .into(),
        ))
    }

    pub fn method(&self) -> AuthMethod {
        match self {
            Self::Bearer(_) => AuthMethod::Bearer,
            Self::ServerIdentity { .. } => AuthMethod::ServerIdentity,
            Self::MonitoringKey(_) => AuthMethod::MonitoringKey,
            Self::ApiKey { .. } => AuthMethod::ApiKey,
            Self::Anonymous => AuthMethod::Anonymous,
        }
    }

    /// Headers for this strategy. Secret values are flagged sensitive so
    /// they are redacted from `Debug` output.
    pub fn headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        match self {
            Self::Bearer(token) => {
                headers.insert(
                    AUTHORIZATION,
                    secret_value(&format!("Bearer {}", token.expose_secret()), "token")?,
                );
            }
            Self::ServerIdentity { uuid, secret } => {
                headers.insert(SERVER_UUID_HEADER, plain_value(uuid, "server_uuid")?);
                headers.insert(
                    SERVER_SECRET_HEADER,
                    secret_value(secret.expose_secret(), "server_secret")?,
                );
            }
            Self::MonitoringKey(key) => {
                headers.insert(
                    MONITORING_KEY_HEADER,
                    secret_value(key.expose_secret(), "monitoring_key")?,
                );
            }
            Self::ApiKey {
                key,
                organization_id,
            } => {
                headers.insert(API_KEY_HEADER, secret_value(key.expose_secret(), "api_key")?);
                if let Some(org) = organization_id {
                    headers.insert(ORGANIZATION_ID_HEADER, plain_value(org, "organization_id")?);
                }
            }
            Self::Anonymous => {}
        }
        Ok(headers)
    }
}

fn present(secret: Option<&SecretString>) -> Option<SecretString> {
    secret
        .map(|s| s.expose_secret().trim())
        .filter(|s| !s.is_empty())
        .map(|s| SecretString::new(s.to_owned()))
}

fn plain_value(value: &str, field: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::Configuration(format!("{field} is not a valid header value")))
}

fn secret_value(value: &str, field: &str) -> Result<HeaderValue, Error> {
    let mut header = plain_value(value, field)?;
    header.set_sensitive(true);
    Ok(header)
}
