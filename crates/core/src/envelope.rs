use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pagination::{PaginationMeta, WirePagination};

/// Field name to the validation messages reported for it.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// The standard wrapper around every successful API response.
///
/// ```json
/// { "status": "success", "message": "...", "data": ..., "meta": { "page": 1, ... } }
/// ```
///
/// `data` is kept as a raw [`Value`] because its shape depends on the
/// endpoint: absent, an object, an array, or a bare scalar on some legacy
/// routes. The pagination block is accepted under either `meta` or
/// `pagination`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Envelope {
    /// Status tag, normally `"success"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Optional human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Endpoint-specific payload. `null` and a missing key both read as `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Pagination block (current naming).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    /// Pagination block (legacy key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Value>,
}

impl Envelope {
    /// Canonical pagination metadata, if the envelope carries a recognizable
    /// pagination block.
    ///
    /// A `meta` object that has none of the known pagination fields (some
    /// endpoints use it for unrelated data) yields `None`.
    pub fn pagination(&self) -> Option<PaginationMeta> {
        [self.meta.as_ref(), self.pagination.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(|block| serde_json::from_value::<WirePagination>(block.clone()).ok())
            .find(WirePagination::has_known_fields)
            .map(PaginationMeta::from)
    }
}

/// Body returned with a non-2xx status.
///
/// ```json
/// { "status": "error", "message": "...", "error_code": "...", "error_type": "...",
///   "details": "...", "request_id": "...", "errors": { "name": ["is required"] } }
/// ```
///
/// `details` and `errors` are loosely typed on the wire; use
/// [`ErrorEnvelope::field_errors`] to read them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Machine-readable error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Free-form string, or an object of field errors on some endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Per-field validation errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
}

impl ErrorEnvelope {
    /// Best human-readable description available in the body.
    ///
    /// Falls back from `message` to a string `details` to `error_type`.
    pub fn description(&self) -> Option<String> {
        non_empty(self.message.as_deref())
            .or_else(|| non_empty(self.details.as_ref().and_then(Value::as_str)))
            .or_else(|| non_empty(self.error_type.as_deref()))
            .map(str::to_owned)
    }

    /// Per-field validation messages.
    ///
    /// Reads `errors` first, then `details` when it is structured. Accepted
    /// shapes are `{ "field": "msg" }`, `{ "field": ["msg", ...] }` and
    /// `[ { "field": "...", "message": "..." }, ... ]`. Anything else is
    /// ignored.
    pub fn field_errors(&self) -> FieldErrors {
        let mut out = FieldErrors::new();
        for source in [self.errors.as_ref(), self.details.as_ref()]
            .into_iter()
            .flatten()
        {
            collect_field_errors(source, &mut out);
            if !out.is_empty() {
                break;
            }
        }
        out
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

fn collect_field_errors(value: &Value, out: &mut FieldErrors) {
    match value {
        Value::Object(map) => {
            for (field, messages) in map {
                let messages = match messages {
                    Value::String(s) => vec![s.clone()],
                    Value::Array(items) => items
                        .iter()
                        .filter_map(|m| m.as_str().map(str::to_owned))
                        .collect(),
                    _ => continue,
                };
                if !messages.is_empty() {
                    out.entry(field.clone()).or_default().extend(messages);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                let field = item.get("field").and_then(Value::as_str);
                let message = item.get("message").and_then(Value::as_str);
                if let (Some(field), Some(message)) = (field, message) {
                    out.entry(field.to_owned())
                        .or_default()
                        .push(message.to_owned());
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_may_be_absent_null_object_array_or_scalar() {
        let cases = [
            json!({"status": "success"}),
            json!({"status": "success", "data": null}),
            json!({"status": "success", "data": {"id": "a1"}}),
            json!({"status": "success", "data": [1, 2, 3]}),
            json!({"status": "success", "data": "pong"}),
        ];
        let parsed: Vec<Envelope> = cases
            .into_iter()
            .map(|v| serde_json::from_value(v).unwrap())
            .collect();

        assert!(parsed[0].data.is_none());
        assert!(parsed[1].data.is_none());
        assert!(parsed[2].data.as_ref().unwrap().is_object());
        assert!(parsed[3].data.as_ref().unwrap().is_array());
        assert_eq!(parsed[4].data, Some(json!("pong")));
    }

    #[test]
    fn pagination_read_from_meta_or_legacy_key() {
        let current: Envelope = serde_json::from_value(json!({
            "data": [],
            "meta": {"page": 2, "limit": 10, "total_items": 25, "total_pages": 3}
        }))
        .unwrap();
        let legacy: Envelope = serde_json::from_value(json!({
            "data": [],
            "pagination": {"page": 2, "per_page": 10, "total": 25}
        }))
        .unwrap();

        assert_eq!(current.pagination(), legacy.pagination());
        assert_eq!(current.pagination().unwrap().total_pages, 3);
    }

    #[test]
    fn unrelated_meta_is_not_pagination() {
        let env: Envelope = serde_json::from_value(json!({
            "data": {"id": 1},
            "meta": {"api_version": "v1"}
        }))
        .unwrap();
        assert!(env.pagination().is_none());

        let env: Envelope = serde_json::from_value(json!({"meta": "not an object"})).unwrap();
        assert!(env.pagination().is_none());
    }

    #[test]
    fn pagination_alongside_object_payload() {
        let env: Envelope = serde_json::from_value(json!({
            "data": {"summary": {"open": 4}},
            "meta": {"page": 1, "limit": 50, "total_items": 4}
        }))
        .unwrap();
        let meta = env.pagination().unwrap();
        assert_eq!(meta.total_items, 4);
        assert_eq!(meta.total_pages, 1);
    }

    #[test]
    fn field_errors_from_map_of_lists_or_strings() {
        let env: ErrorEnvelope = serde_json::from_value(json!({
            "status": "error",
            "message": "validation failed",
            "errors": {"name": ["is required", "too short"], "severity": "unknown value"}
        }))
        .unwrap();
        let fields = env.field_errors();
        assert_eq!(fields["name"], vec!["is required", "too short"]);
        assert_eq!(fields["severity"], vec!["unknown value"]);
    }

    #[test]
    fn field_errors_from_list_in_details() {
        let env: ErrorEnvelope = serde_json::from_value(json!({
            "message": "bad request",
            "details": [
                {"field": "threshold", "message": "must be positive"},
                {"field": "threshold", "message": "must be an integer"}
            ]
        }))
        .unwrap();
        assert_eq!(
            env.field_errors()["threshold"],
            vec!["must be positive", "must be an integer"]
        );
    }

    #[test]
    fn description_falls_back_through_fields() {
        let env = ErrorEnvelope {
            details: Some(json!("server identity revoked")),
            error_type: Some("auth".into()),
            ..Default::default()
        };
        assert_eq!(env.description().as_deref(), Some("server identity revoked"));

        let env = ErrorEnvelope {
            message: Some("  ".into()),
            error_type: Some("conflict".into()),
            ..Default::default()
        };
        assert_eq!(env.description().as_deref(), Some("conflict"));

        assert!(ErrorEnvelope::default().description().is_none());
    }
}
