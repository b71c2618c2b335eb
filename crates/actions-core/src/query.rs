//! Query descriptor.
//!
//! Turns raw string filter parameters into exactly one of four mutually
//! exclusive query intents. Pure and synchronous; validation happens here,
//! before any store access.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound, TimeZone, Utc};
use std::collections::HashMap;

use crate::action::ActionStatus;
use crate::error::{ActionsError, Result};
use crate::keys;

// ---------------------------------------------------------------------------
// DatetimeRange
// ---------------------------------------------------------------------------

/// A closed timestamp range. Unspecified bounds default to the minimum and
/// maximum representable key timestamps (open bound).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatetimeRange {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl Default for DatetimeRange {
    fn default() -> Self {
        Self {
            since: keys::ts_min(),
            until: keys::ts_max(),
        }
    }
}

impl DatetimeRange {
    /// Parse a raw range value: `since`, `since,until`, or `,until`.
    ///
    /// An empty part is an open bound; more than two parts is rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(',').collect();
        if parts.len() > 2 {
            return Err(ActionsError::MalformedRange);
        }
        let mut range = Self::default();
        if let Some(part) = parts.first() {
            if !part.trim().is_empty() {
                range.since = parse_timestamp(part.trim())?;
            }
        }
        if let Some(part) = parts.get(1) {
            if !part.trim().is_empty() {
                range.until = parse_timestamp(part.trim())?;
            }
        }
        Ok(range)
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD[T ]HH:MM:SS` (UTC assumed), or a bare
/// `YYYY-MM-DD`. Anything else is a validation error. Sub-second precision
/// is discarded to match the stored second granularity.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc).trunc_subsecs(0));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
    }
    Err(ActionsError::InvalidTimestamp(raw.to_string()))
}

// ---------------------------------------------------------------------------
// ActionFilter
// ---------------------------------------------------------------------------

/// Exactly one query intent derived from caller-supplied filter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionFilter {
    None,
    ByStatus(ActionStatus),
    ByCreatedAt(DatetimeRange),
    ByCompletedAt(DatetimeRange),
}

impl ActionFilter {
    /// Validate raw query parameters into a single intent.
    ///
    /// At most one of `status`, `created_at`, and `completed_at` may be
    /// supplied; unrecognized parameters are ignored.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self> {
        let status = params.get("status");
        let created_at = params.get("created_at");
        let completed_at = params.get("completed_at");

        let supplied = [status, created_at, completed_at]
            .iter()
            .filter(|p| p.is_some())
            .count();
        if supplied > 1 {
            return Err(ActionsError::ConflictingFilters);
        }

        if let Some(raw) = status {
            if raw.contains(',') {
                return Err(ActionsError::MultipleStatusValues);
            }
            return Ok(Self::ByStatus(raw.trim().parse()?));
        }
        if let Some(raw) = created_at {
            return Ok(Self::ByCreatedAt(DatetimeRange::parse(raw)?));
        }
        if let Some(raw) = completed_at {
            return Ok(Self::ByCompletedAt(DatetimeRange::parse(raw)?));
        }
        Ok(Self::None)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
