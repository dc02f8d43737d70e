use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Canonical pagination metadata, independent of which wire naming the
/// endpoint used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    /// Current page, 1-based.
    pub page: u64,
    /// Page size.
    pub limit: u64,
    /// Total number of items across all pages.
    pub total_items: u64,
    /// Total number of pages.
    pub total_pages: u64,
}

impl PaginationMeta {
    /// Returns `true` if a page after the current one exists.
    pub fn has_next_page(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Pagination block as it appears on the wire.
///
/// Two conventions are in use: `page`/`limit`/`total_items`/`total_pages`
/// and the older `page`/`per_page`/`total`. Each spelling is its own field
/// so a body that sends both never fails to parse.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WirePagination {
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub current_page: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub per_page: Option<u64>,
    #[serde(default)]
    pub page_size: Option<u64>,
    #[serde(default)]
    pub total_items: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub total_pages: Option<u64>,
}

impl WirePagination {
    /// Returns `true` if at least one recognized pagination field is set.
    pub fn has_known_fields(&self) -> bool {
        [
            self.page,
            self.current_page,
            self.limit,
            self.per_page,
            self.page_size,
            self.total_items,
            self.total,
            self.total_pages,
        ]
        .iter()
        .any(Option::is_some)
    }
}

impl From<WirePagination> for PaginationMeta {
    /// Missing `page` reads as 1. Missing `total_pages` is derived as
    /// `ceil(total_items / limit)`, or 0 when the limit is unknown.
    fn from(wire: WirePagination) -> Self {
        let page = wire.page.or(wire.current_page).unwrap_or(1).max(1);
        let limit = wire.limit.or(wire.per_page).or(wire.page_size).unwrap_or(0);
        let total_items = wire.total_items.or(wire.total).unwrap_or(0);
        let total_pages = wire.total_pages.unwrap_or_else(|| {
            if limit == 0 {
                0
            } else {
                total_items.div_ceil(limit)
            }
        });

        Self {
            page,
            limit,
            total_items,
            total_pages,
        }
    }
}

/// Sort direction for list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => f.write_str("asc"),
            Self::Desc => f.write_str("desc"),
        }
    }
}

/// Query options accepted by list endpoints.
///
/// Filters the client does not know about are passed through verbatim; the
/// server decides what is valid for a given endpoint.
///
/// # Example
///
/// ```
/// use watchtower_core::{ListOptions, SortOrder};
///
/// let opts = ListOptions::new()
///     .page(2)
///     .limit(25)
///     .status("open")
///     .sort("created_at", SortOrder::Desc);
///
/// let query = opts.to_query();
/// assert_eq!(query["page"], "2");
/// assert_eq!(query["order"], "desc");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Page number, 1-based. `0` means "server default" and is not sent.
    pub page: u32,
    /// Page size. `0` means "server default" and is not sent.
    pub limit: u32,
    /// Field to sort by.
    pub sort: Option<String>,
    /// Sort direction.
    pub order: Option<SortOrder>,
    /// Endpoint-specific filters, sent as-is.
    pub filters: BTreeMap<String, String>,
}

impl ListOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Sort by `field` in the given direction.
    #[must_use]
    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(field.into());
        self.order = Some(order);
        self
    }

    /// Add an arbitrary filter.
    #[must_use]
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn status(self, status: impl Into<String>) -> Self {
        self.filter("status", status)
    }

    #[must_use]
    pub fn severity(self, severity: impl Into<String>) -> Self {
        self.filter("severity", severity)
    }

    /// Restrict results to `[start, end]`, sent as RFC 3339 `start_date` and
    /// `end_date`.
    #[must_use]
    pub fn date_range(self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.filter(
            "start_date",
            start.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
        .filter("end_date", end.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    /// Convert to wire query parameters.
    ///
    /// Paging and sort keys take precedence over a filter of the same name.
    pub fn to_query(&self) -> BTreeMap<String, String> {
        let mut query = self.filters.clone();
        if self.page > 0 {
            query.insert("page".into(), self.page.to_string());
        }
        if self.limit > 0 {
            query.insert("limit".into(), self.limit.to_string());
        }
        if let Some(sort) = &self.sort {
            query.insert("sort".into(), sort.clone());
        }
        if let Some(order) = self.order {
            query.insert("order".into(), order.to_string());
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(v: serde_json::Value) -> PaginationMeta {
        serde_json::from_value::<WirePagination>(v).unwrap().into()
    }

    #[test]
    fn both_namings_normalize_identically() {
        let current = parse(serde_json::json!({
            "page": 2, "limit": 10, "total_items": 25, "total_pages": 3
        }));
        let legacy = parse(serde_json::json!({"page": 2, "per_page": 10, "total": 25}));

        let expected = PaginationMeta {
            page: 2,
            limit: 10,
            total_items: 25,
            total_pages: 3,
        };
        assert_eq!(current, expected);
        assert_eq!(legacy, expected);
    }

    #[test]
    fn explicit_total_pages_wins_over_derivation() {
        let meta = parse(serde_json::json!({"page": 1, "limit": 10, "total_items": 25, "total_pages": 7}));
        assert_eq!(meta.total_pages, 7);
    }

    #[test]
    fn missing_page_and_zero_limit() {
        let meta = parse(serde_json::json!({"total": 12}));
        assert_eq!(meta.page, 1);
        assert_eq!(meta.limit, 0);
        assert_eq!(meta.total_items, 12);
        assert_eq!(meta.total_pages, 0);
    }

    #[test]
    fn exact_multiple_does_not_round_up() {
        let meta = parse(serde_json::json!({"page": 1, "limit": 5, "total_items": 20}));
        assert_eq!(meta.total_pages, 4);
        assert!(meta.has_next_page());

        let last = PaginationMeta { page: 4, ..meta };
        assert!(!last.has_next_page());
    }

    #[test]
    fn empty_block_has_no_known_fields() {
        let wire: WirePagination = serde_json::from_value(serde_json::json!({"cursor": "x"})).unwrap();
        assert!(!wire.has_known_fields());
    }

    #[test]
    fn zero_page_and_limit_are_omitted() {
        let query = ListOptions::new().to_query();
        assert!(query.is_empty());

        let query = ListOptions::new().page(0).limit(0).status("open").to_query();
        assert!(!query.contains_key("page"));
        assert!(!query.contains_key("limit"));
        assert_eq!(query["status"], "open");
    }

    #[test]
    fn unknown_filters_pass_through() {
        let query = ListOptions::new()
            .page(1)
            .limit(25)
            .filter("hostname_prefix", "web-")
            .severity("critical")
            .to_query();
        assert_eq!(query["hostname_prefix"], "web-");
        assert_eq!(query["severity"], "critical");
        assert_eq!(query["page"], "1");
        assert_eq!(query["limit"], "25");
    }

    #[test]
    fn paging_keys_override_same_named_filters() {
        let query = ListOptions::new().filter("page", "9").page(3).to_query();
        assert_eq!(query["page"], "3");
    }

    #[test]
    fn date_range_is_rfc3339() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 31, 23, 59, 59).unwrap();
        let query = ListOptions::new().date_range(start, end).to_query();
        assert_eq!(query["start_date"], "2024-03-01T00:00:00Z");
        assert_eq!(query["end_date"], "2024-03-31T23:59:59Z");
    }

    #[test]
    fn sort_order_serializes_lowercase() {
        let query = ListOptions::new().sort("severity", SortOrder::Asc).to_query();
        assert_eq!(query["sort"], "severity");
        assert_eq!(query["order"], "asc");
    }
}
