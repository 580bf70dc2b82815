//! Timestamp utilities
//!
//! Timestamps are persisted as fixed-width RFC 3339 text (microsecond
//! precision, `Z` suffix) so that lexical order in SQLite matches
//! chronological order.

use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Current UTC timestamp, truncated to the stored (microsecond) precision
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Format a timestamp for storage
pub fn to_db_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
pub fn parse_db_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp '{}': {}", value, e)))
}
