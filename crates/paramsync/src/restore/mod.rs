//! Rolling parameters back using the store's audit history.

use chrono::{DateTime, Utc};

use crate::error::ParamSyncError;

pub mod history;
pub mod point_in_time;
pub mod single;

pub use history::ParameterHistory;
pub use point_in_time::{PointInTimeRestorer, RestoreReport};
pub use single::VersionRestorer;

/// Epoch values above this are taken as milliseconds. Seconds cross it in
/// the year 5138.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Parses a restore point given as epoch seconds, epoch milliseconds or an
/// RFC 3339 timestamp.
pub fn parse_restore_time(input: &str) -> Result<DateTime<Utc>, ParamSyncError> {
    let input = input.trim();
    if let Ok(epoch) = input.parse::<i64>() {
        let parsed = if epoch.abs() > MILLIS_THRESHOLD {
            DateTime::<Utc>::from_timestamp_millis(epoch)
        } else {
            DateTime::<Utc>::from_timestamp(epoch, 0)
        };
        return parsed.ok_or_else(|| {
            ParamSyncError::InvalidInput(format!("restore time {} is out of range", epoch))
        });
    }

    DateTime::parse_from_rfc3339(input)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ParamSyncError::InvalidInput(format!("invalid restore time '{}': {}", input, e)))
}

/// A restore may only touch names under one of the caller's namespaces.
pub(crate) fn check_authorized(name: &str, authorized: &[String]) -> Result<(), ParamSyncError> {
    if authorized.iter().any(|ns| name.starts_with(ns.as_str())) {
        return Ok(());
    }
    Err(ParamSyncError::namespace_violation(
        name,
        authorized.join(", "),
        "restore is limited to authorized namespaces",
    ))
}
