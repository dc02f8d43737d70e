//! Wire types for the Watchtower monitoring API.
//!
//! Every endpoint wraps its payload in the same [`Envelope`], and every list
//! endpoint reports paging through a pagination block that comes in two
//! historical spellings. This crate holds those shapes and the
//! [`ListOptions`] -> query-string conversion so resource wrappers and the
//! request pipeline agree on them.

pub mod envelope;
pub mod pagination;

pub use envelope::{Envelope, ErrorEnvelope, FieldErrors};
pub use pagination::{ListOptions, PaginationMeta, SortOrder, WirePagination};
