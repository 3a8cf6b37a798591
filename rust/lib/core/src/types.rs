use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;

/// Hard upper bound for a single page.
pub const MAX_LIMIT: usize = 500;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_LIMIT: usize = 50;

/// The requested page size, defaulted and capped at [`MAX_LIMIT`].
pub fn page_limit(requested: Option<usize>) -> usize {
    requested.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
}

/// Result wrapper for list operations.
#[derive(Debug, Clone, Serialize)]
pub struct ListResult<T: Serialize> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Generate a new random ID (UUIDv4, no dashes).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string().replace('-', "")
}

/// Current UTC instant.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Get the current time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    to_rfc3339(&Utc::now())
}

/// Fixed-width RFC 3339 (microseconds, `Z` suffix), so indexed timestamp
/// columns sort lexically in time order.
pub fn to_rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Today's calendar date (UTC).
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
