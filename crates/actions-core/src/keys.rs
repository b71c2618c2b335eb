//! Composite sort-key builder.
//!
//! The backing store only supports an equality match on a partition prefix
//! plus a range condition on one byte-ordered key per table. To answer four
//! query shapes against one owner-partitioned dataset, every record is
//! projected into the primary table and three index tables, each under a
//! distinct composite sort key:
//!
//! | table        | sort key              | supports                      |
//! |--------------|-----------------------|-------------------------------|
//! | primary      | `action#<id>`         | point lookup by id            |
//! | created-at   | `<created_at>#<id>`   | range over creation time      |
//! | completed-at | `<completed_at>#<id>` | range over completion time    |
//! | status       | `<STATUS>#<id>`       | prefix match on exact status  |
//!
//! Appending the id breaks ties between records sharing a timestamp or
//! status, so every composite key is unique and totally ordered. Timestamps
//! are rendered fixed-width and zero-padded so lexicographic order equals
//! chronological order.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::action::ActionStatus;

/// Lexicographic floor for the id component: the nil UUID.
pub const ID_MIN: &str = "00000000-0000-0000-0000-000000000000";

/// Lexicographic ceiling for the id component. UUIDs render as lowercase
/// hex, so no real id can sort above this.
pub const ID_MAX: &str = "ffffffff-ffff-ffff-ffff-ffffffffffff";

const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Earliest instant representable in a sort key.
pub fn ts_min() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap()
}

/// Latest instant representable in a sort key (years stay four digits).
pub fn ts_max() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap()
}

/// Fixed-width UTC second representation, clamped to years 0001-9999.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.clamp(ts_min(), ts_max()).format(TS_FORMAT).to_string()
}

// ---------------------------------------------------------------------------
// Sort keys
// ---------------------------------------------------------------------------

pub fn primary_sort_key(id: Uuid) -> String {
    format!("action#{id}")
}

pub fn timestamp_sort_key(ts: DateTime<Utc>, id: Uuid) -> String {
    format!("{}#{id}", format_ts(ts))
}

pub fn status_sort_key(status: ActionStatus, id: Uuid) -> String {
    format!("{}#{id}", status.as_str())
}

// ---------------------------------------------------------------------------
// Range bounds
// ---------------------------------------------------------------------------

/// Sort-key bounds covering every primary record of one owner.
pub fn primary_range_bounds() -> (String, String) {
    (format!("action#{ID_MIN}"), format!("action#{ID_MAX}"))
}

/// Sort-key bounds for a timestamp range query.
///
/// The lower bound carries the minimum id and the upper bound the maximum,
/// so every record with `since <= ts <= until` is included regardless of
/// which id it carries, and no record outside the range leaks in through
/// id ordering.
pub fn timestamp_range_bounds(since: DateTime<Utc>, until: DateTime<Utc>) -> (String, String) {
    (
        format!("{}#{ID_MIN}", format_ts(since)),
        format!("{}#{ID_MAX}", format_ts(until)),
    )
}

/// Sort-key bounds for an exact-status prefix query.
pub fn status_range_bounds(status: ActionStatus) -> (String, String) {
    (
        format!("{}#{ID_MIN}", status.as_str()),
        format!("{}#{ID_MAX}", status.as_str()),
    )
}

// ---------------------------------------------------------------------------
// Store keys
// ---------------------------------------------------------------------------

/// Store key: 16 owner-UUID bytes followed by the sort-key bytes.
///
/// Byte order equals (owner, sort key) lexicographic order, and all keys of
/// one owner share a fixed 16-byte prefix, so a range between two store keys
/// built from the same owner never crosses into another partition.
pub fn store_key(owner: Uuid, sort_key: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + sort_key.len());
    key.extend_from_slice(owner.as_bytes());
    key.extend_from_slice(sort_key.as_bytes());
    key
}

/// The sort-key portion of a store key, for diagnostics.
pub fn sort_key_of(store_key: &[u8]) -> String {
    String::from_utf8_lossy(store_key.get(16..).unwrap_or_default()).into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
