//! Success-envelope decoding and error classification.

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use serde::de::DeserializeOwned;
use watchtower_core::{Envelope, ErrorEnvelope, PaginationMeta};

use crate::Error;
use crate::retry::{
    self, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET, header_u64,
};
use crate::transport::RawResponse;

/// Message used when an error response has no readable body.
pub const UNEXPECTED_FORMAT: &str = "unexpected response format";

const REQUEST_ID_HEADER: &str = "x-request-id";

/// A decoded successful response.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    /// HTTP status (2xx).
    pub status: u16,
    /// Envelope `message`, if any.
    pub message: Option<String>,
    /// Decoded `data`. `None` for 204, an empty body, or absent/null data.
    pub data: Option<T>,
    /// Pagination metadata when the body carried a pagination block.
    pub meta: Option<PaginationMeta>,
    /// `X-Request-ID` response header.
    pub request_id: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn into_data(self) -> Option<T> {
        self.data
    }

    /// The decoded data, or a [`Error::Decode`] if the response had none.
    pub fn require_data(self) -> Result<T, Error> {
        let status = self.status;
        self.data.ok_or_else(|| Error::Decode {
            status,
            message: "response carried no data".into(),
        })
    }
}

/// A successful response returned without JSON decoding, e.g. a CSV export.
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub status: u16,
    /// `Content-Type` header as sent.
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Decode a response into `T`, or classify it as an error.
pub(crate) fn decode<T: DeserializeOwned>(
    raw: &RawResponse,
    path: &str,
) -> Result<ApiResponse<T>, Error> {
    if !raw.status.is_success() {
        return Err(classify(raw, path));
    }

    let status = raw.status.as_u16();
    let request_id = header_str(&raw.headers, REQUEST_ID_HEADER).map(str::to_owned);
    let empty = ApiResponse {
        status,
        message: None,
        data: None,
        meta: None,
        request_id,
    };

    if raw.status == StatusCode::NO_CONTENT || raw.body.trim_ascii().is_empty() {
        return Ok(empty);
    }

    let content_type = header_str(&raw.headers, CONTENT_TYPE.as_str());
    if !is_json(content_type) {
        return Err(Error::Decode {
            status,
            message: format!(
                "expected a JSON response, got {}; use execute_raw for non-JSON endpoints",
                content_type.unwrap_or("no content type")
            ),
        });
    }

    let envelope: Envelope = serde_json::from_slice(&raw.body).map_err(|e| Error::Decode {
        status,
        message: format!("invalid response envelope: {e}"),
    })?;
    let meta = envelope.pagination();
    let data = envelope
        .data
        .map(serde_json::from_value::<T>)
        .transpose()
        .map_err(|e| Error::Decode {
            status,
            message: format!("invalid response data: {e}"),
        })?;

    Ok(ApiResponse {
        message: envelope.message,
        data,
        meta,
        ..empty
    })
}

/// Return the body as-is on success, or classify it as an error.
pub(crate) fn decode_raw(raw: RawResponse, path: &str) -> Result<RawPayload, Error> {
    if !raw.status.is_success() {
        return Err(classify(&raw, path));
    }
    Ok(RawPayload {
        status: raw.status.as_u16(),
        content_type: header_str(&raw.headers, CONTENT_TYPE.as_str()).map(str::to_owned),
        body: raw.body,
    })
}

/// Build the typed error for a non-success response.
///
/// The error body is parsed when it is JSON; otherwise the message is
/// [`UNEXPECTED_FORMAT`]. The variant always follows the status code.
pub(crate) fn classify(raw: &RawResponse, path: &str) -> Error {
    let status = raw.status.as_u16();
    let envelope = if is_json(header_str(&raw.headers, CONTENT_TYPE.as_str())) {
        serde_json::from_slice::<ErrorEnvelope>(&raw.body).ok()
    } else {
        None
    };

    let message = match &envelope {
        Some(body) => body.description().unwrap_or_else(|| {
            raw.status
                .canonical_reason()
                .unwrap_or(UNEXPECTED_FORMAT)
                .to_owned()
        }),
        None => UNEXPECTED_FORMAT.to_owned(),
    };
    let (error_code, request_id, fields) = match envelope {
        Some(body) => {
            let fields = body.field_errors();
            (body.error_code, body.request_id, fields)
        }
        None => (None, None, Default::default()),
    };
    let request_id =
        request_id.or_else(|| header_str(&raw.headers, REQUEST_ID_HEADER).map(str::to_owned));
    let path = path.to_owned();

    match status {
        400 | 422 => Error::Validation {
            status,
            message,
            fields,
            error_code,
            request_id,
        },
        401 => Error::Unauthorized {
            message,
            request_id,
        },
        403 => Error::Forbidden {
            message,
            path,
            request_id,
        },
        404 => Error::NotFound {
            message,
            path,
            request_id,
        },
        409 => Error::Conflict {
            message,
            path,
            request_id,
        },
        429 => Error::RateLimited {
            message,
            limit: header_u64(&raw.headers, RATE_LIMIT_LIMIT),
            remaining: header_u64(&raw.headers, RATE_LIMIT_REMAINING),
            reset: header_u64(&raw.headers, RATE_LIMIT_RESET),
            retry_after: retry::retry_after(&raw.headers),
            request_id,
        },
        503 => Error::ServiceUnavailable {
            message,
            retry_after: retry::retry_after(&raw.headers),
            request_id,
        },
        500..=599 => Error::InternalServer {
            status,
            message,
            error_code,
            request_id,
        },
        _ => Error::UnexpectedStatus {
            status,
            message,
            error_code,
            request_id,
        },
    }
}

/// A missing content type is treated as JSON; anything else must mention
/// `json` (`application/json`, `application/problem+json`, ...).
fn is_json(content_type: Option<&str>) -> bool {
    content_type.is_none_or(|ct| ct.to_ascii_lowercase().contains("json"))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok().map(str::trim)
}
