//! Error types for the Watchtower client.

use std::time::Duration;

use thiserror::Error;
use watchtower_core::FieldErrors;

/// Errors that can occur when using the Watchtower client.
///
/// Every failed call surfaces exactly one of these. API variants are chosen
/// from the HTTP status of the final response; the rest describe transport,
/// decoding and configuration failures.
#[derive(Debug, Error)]
pub enum Error {
    /// The request was rejected as invalid (HTTP 400 or 422).
    #[error("validation failed (HTTP {status}): {message}")]
    Validation {
        /// Either 400 or 422.
        status: u16,
        message: String,
        /// Per-field messages, empty when the server sent none.
        fields: FieldErrors,
        error_code: Option<String>,
        request_id: Option<String>,
    },

    /// Missing or rejected credentials (HTTP 401).
    #[error("unauthorized: {message}")]
    Unauthorized {
        message: String,
        request_id: Option<String>,
    },

    /// Credentials are valid but lack access (HTTP 403).
    #[error("forbidden: {message} ({path})")]
    Forbidden {
        message: String,
        /// Request path that was refused.
        path: String,
        request_id: Option<String>,
    },

    /// The addressed resource does not exist (HTTP 404).
    #[error("not found: {message} ({path})")]
    NotFound {
        message: String,
        /// Request path that was not found.
        path: String,
        request_id: Option<String>,
    },

    /// The request conflicts with current resource state (HTTP 409).
    #[error("conflict: {message} ({path})")]
    Conflict {
        message: String,
        /// Request path of the conflicting resource.
        path: String,
        request_id: Option<String>,
    },

    /// Too many requests (HTTP 429).
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        /// `X-RateLimit-Limit`.
        limit: Option<u64>,
        /// `X-RateLimit-Remaining`.
        remaining: Option<u64>,
        /// `X-RateLimit-Reset`, as sent by the server.
        reset: Option<u64>,
        /// Parsed `Retry-After`.
        retry_after: Option<Duration>,
        request_id: Option<String>,
    },

    /// The server failed to handle the request (HTTP 5xx other than 503).
    #[error("server error (HTTP {status}): {message}")]
    InternalServer {
        status: u16,
        message: String,
        error_code: Option<String>,
        request_id: Option<String>,
    },

    /// The server is temporarily unable to handle requests (HTTP 503).
    #[error("service unavailable: {message}")]
    ServiceUnavailable {
        message: String,
        /// Parsed `Retry-After`.
        retry_after: Option<Duration>,
        request_id: Option<String>,
    },

    /// A non-success status outside the known table.
    #[error("HTTP {status}: {message}")]
    UnexpectedStatus {
        status: u16,
        message: String,
        error_code: Option<String>,
        request_id: Option<String>,
    },

    /// A successful response whose body could not be decoded.
    #[error("failed to decode response (HTTP {status}): {message}")]
    Decode { status: u16, message: String },

    /// Network failure (connection refused or reset, connect timeout, etc.).
    #[error("connection error: {0}")]
    Connection(String),

    /// The request did not complete within its timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// The request body could not be serialized.
    #[error("failed to serialize request body: {0}")]
    Serialization(String),

    /// Client configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Returns `true` if the operation may succeed when repeated.
    ///
    /// Rate limiting, 5xx responses and connection failures are retryable.
    /// Timeouts and cancellations are not: the caller's budget is spent.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::InternalServer { .. }
                | Self::ServiceUnavailable { .. }
                | Self::Connection(_)
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }

    /// Returns `true` for HTTP 404. Wrappers use this to turn a missing
    /// resource into `None`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    pub fn is_internal_server_error(&self) -> bool {
        matches!(self, Self::InternalServer { .. })
    }

    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { .. })
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// HTTP status of the response that produced this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Validation { status, .. }
            | Self::InternalServer { status, .. }
            | Self::UnexpectedStatus { status, .. }
            | Self::Decode { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(401),
            Self::Forbidden { .. } => Some(403),
            Self::NotFound { .. } => Some(404),
            Self::Conflict { .. } => Some(409),
            Self::RateLimited { .. } => Some(429),
            Self::ServiceUnavailable { .. } => Some(503),
            Self::Connection(_)
            | Self::Timeout(_)
            | Self::Cancelled
            | Self::Serialization(_)
            | Self::Configuration(_) => None,
        }
    }

    /// Server-assigned request id, when one was reported.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Validation { request_id, .. }
            | Self::Unauthorized { request_id, .. }
            | Self::Forbidden { request_id, .. }
            | Self::NotFound { request_id, .. }
            | Self::Conflict { request_id, .. }
            | Self::RateLimited { request_id, .. }
            | Self::InternalServer { request_id, .. }
            | Self::ServiceUnavailable { request_id, .. }
            | Self::UnexpectedStatus { request_id, .. } => request_id.as_deref(),
            _ => None,
        }
    }

    /// Machine-readable error code from the error body, if any.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Validation { error_code, .. }
            | Self::InternalServer { error_code, .. }
            | Self::UnexpectedStatus { error_code, .. } => error_code.as_deref(),
            _ => None,
        }
    }

    /// How long the server asked the caller to wait before retrying.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } | Self::ServiceUnavailable { retry_after, .. } => {
                *retry_after
            }
            _ => None,
        }
    }

    /// Per-field validation messages. Empty for every other kind.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation { fields, .. } => Some(fields),
            _ => None,
        }
    }
}
