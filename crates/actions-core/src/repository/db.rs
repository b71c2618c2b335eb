//! redb-backed Action repository.
//!
//! # Table design
//!
//! Four tables emulate one wide-column table with three local secondary
//! indexes. Every table keys on `owner-uuid bytes ++ sort-key bytes`
//! (see [`crate::keys`]) and stores the full JSON-encoded Action, the
//! ordered-KV rendition of an LSI with `ALL` projection:
//!
//! ```text
//! actions                  owner ++ "action#<id>"
//! actions_by_created_at    owner ++ "<created_at>#<id>"
//! actions_by_completed_at  owner ++ "<completed_at>#<id>"   (sparse)
//! actions_by_status        owner ++ "<STATUS>#<id>"
//! ```
//!
//! All projections of one action are written in a single transaction, so a
//! reader never observes a partially indexed record. Overwriting a record
//! removes the index entries its prior version held under sort keys the new
//! version no longer carries. The completed-at table only holds actions that
//! have actually completed.

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

use crate::action::{Action, ActionStatus};
use crate::config::Settings;
use crate::error::{ActionsError, Result};
use crate::keys;

use super::{ActionRepository, BatchWriteReport, FailedWrite, Listing, SkippedRecord};

const PRIMARY: TableDefinition<&[u8], &[u8]> = TableDefinition::new("actions");
const CREATED_AT_IDX: TableDefinition<&[u8], &[u8]> = TableDefinition::new("actions_by_created_at");
const COMPLETED_AT_IDX: TableDefinition<&[u8], &[u8]> =
    TableDefinition::new("actions_by_completed_at");
const STATUS_IDX: TableDefinition<&[u8], &[u8]> = TableDefinition::new("actions_by_status");

fn unavailable(e: impl std::fmt::Display) -> ActionsError {
    ActionsError::StoreUnavailable(e.to_string())
}

// ---------------------------------------------------------------------------
// RedbActionRepository
// ---------------------------------------------------------------------------

/// Persistent store for `Action` records.
pub struct RedbActionRepository {
    db: Database,
    retries: u32,
}

impl RedbActionRepository {
    /// Open or create the store at `settings.store_path`.
    ///
    /// Ensures all four tables exist before any reads.
    pub fn open(settings: &Settings) -> Result<Self> {
        let db = Database::create(&settings.store_path).map_err(unavailable)?;
        let wt = db.begin_write().map_err(unavailable)?;
        for table in [PRIMARY, CREATED_AT_IDX, COMPLETED_AT_IDX, STATUS_IDX] {
            wt.open_table(table).map_err(unavailable)?;
        }
        wt.commit().map_err(unavailable)?;
        Ok(Self {
            db,
            retries: settings.store_retries,
        })
    }

    /// Run `op`, retrying transient store failures up to the configured
    /// retry count. Validation and decode errors are never retried.
    fn with_retries<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0u32;
        loop {
            match op() {
                Err(ActionsError::StoreUnavailable(reason)) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(attempt, %reason, "retrying store operation");
                }
                other => return other,
            }
        }
    }

    /// Write one action's primary record and all index projections in a
    /// single transaction. Any index entries a prior version of the record
    /// left under superseded sort keys are removed in the same transaction.
    fn put_action(&self, action: &Action) -> Result<()> {
        let value = serde_json::to_vec(action)?;
        let owner = action.created_by;
        let primary_key = keys::store_key(owner, &keys::primary_sort_key(action.id));
        self.with_retries(|| {
            let wt = self.db.begin_write().map_err(unavailable)?;
            {
                let mut primary = wt.open_table(PRIMARY).map_err(unavailable)?;
                let prior = primary
                    .get(primary_key.as_slice())
                    .map_err(unavailable)?
                    .map(|g| g.value().to_vec());
                primary
                    .insert(primary_key.as_slice(), value.as_slice())
                    .map_err(unavailable)?;
                let prior = prior.and_then(|bytes| {
                    match serde_json::from_slice::<Action>(&bytes) {
                        Ok(a) => Some(a),
                        Err(e) => {
                            tracing::warn!(action_id = %action.id, error = %e,
                                "prior record is undecodable; cannot reconcile its index entries");
                            None
                        }
                    }
                });

                let mut created = wt.open_table(CREATED_AT_IDX).map_err(unavailable)?;
                let created_key =
                    keys::store_key(owner, &keys::timestamp_sort_key(action.created_at, action.id));
                if let Some(prior) = &prior {
                    if prior.created_at != action.created_at {
                        created
                            .remove(
                                keys::store_key(
                                    owner,
                                    &keys::timestamp_sort_key(prior.created_at, action.id),
                                )
                                .as_slice(),
                            )
                            .map_err(unavailable)?;
                    }
                }
                created
                    .insert(created_key.as_slice(), value.as_slice())
                    .map_err(unavailable)?;

                let mut completed = wt.open_table(COMPLETED_AT_IDX).map_err(unavailable)?;
                if let Some(prior_ts) = prior.as_ref().and_then(|p| p.completed_at) {
                    if action.completed_at != Some(prior_ts) {
                        completed
                            .remove(
                                keys::store_key(
                                    owner,
                                    &keys::timestamp_sort_key(prior_ts, action.id),
                                )
                                .as_slice(),
                            )
                            .map_err(unavailable)?;
                    }
                }
                if let Some(completed_at) = action.completed_at {
                    completed
                        .insert(
                            keys::store_key(
                                owner,
                                &keys::timestamp_sort_key(completed_at, action.id),
                            )
                            .as_slice(),
                            value.as_slice(),
                        )
                        .map_err(unavailable)?;
                }

                let mut status = wt.open_table(STATUS_IDX).map_err(unavailable)?;
                if let Some(prior) = &prior {
                    if prior.status != action.status {
                        status
                            .remove(
                                keys::store_key(
                                    owner,
                                    &keys::status_sort_key(prior.status, action.id),
                                )
                                .as_slice(),
                            )
                            .map_err(unavailable)?;
                    }
                }
                status
                    .insert(
                        keys::store_key(owner, &keys::status_sort_key(action.status, action.id))
                            .as_slice(),
                        value.as_slice(),
                    )
                    .map_err(unavailable)?;
            }
            wt.commit().map_err(unavailable)?;
            Ok(())
        })
    }

    /// Range scan one table between two sort keys of the same owner.
    ///
    /// Expired records are dropped; undecodable records are collected as
    /// partial-failure metadata instead of aborting the scan.
    fn read_range(
        &self,
        table: TableDefinition<&[u8], &[u8]>,
        owner: Uuid,
        lower_sort: &str,
        upper_sort: &str,
    ) -> Result<Listing> {
        let now = Utc::now();
        let lower = keys::store_key(owner, lower_sort);
        let upper = keys::store_key(owner, upper_sort);
        // An inverted range matches nothing; never hand the store a
        // backwards bound.
        if lower > upper {
            return Ok(Listing::default());
        }
        let rt = self.db.begin_read().map_err(unavailable)?;
        let table = rt.open_table(table).map_err(unavailable)?;

        let mut listing = Listing::default();
        for entry in table
            .range(lower.as_slice()..=upper.as_slice())
            .map_err(unavailable)?
        {
            let (k, v) = entry.map_err(unavailable)?;
            match serde_json::from_slice::<Action>(v.value()) {
                Ok(action) if action.is_live(now) => listing.actions.push(action),
                Ok(_) => {} // expired; physical deletion is the store's problem
                Err(e) => {
                    let sort_key = keys::sort_key_of(k.value());
                    tracing::warn!(%sort_key, error = %e, "skipping undecodable record");
                    listing.skipped.push(SkippedRecord {
                        sort_key,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(listing)
    }
}

impl ActionRepository for RedbActionRepository {
    fn store_actions(&self, actions: &[Action]) -> Result<BatchWriteReport> {
        let mut report = BatchWriteReport::default();
        for action in actions {
            match self.put_action(action) {
                Ok(()) => report.stored.push(action.id),
                Err(e) => {
                    tracing::warn!(action_id = %action.id, error = %e, "failed to store action");
                    report.failed.push(FailedWrite {
                        id: action.id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    fn get_action_by_id(&self, owner: Uuid, action_id: Uuid) -> Result<Option<Action>> {
        let key = keys::store_key(owner, &keys::primary_sort_key(action_id));
        self.with_retries(|| {
            let rt = self.db.begin_read().map_err(unavailable)?;
            let table = rt.open_table(PRIMARY).map_err(unavailable)?;
            let Some(guard) = table.get(key.as_slice()).map_err(unavailable)? else {
                return Ok(None);
            };
            // A single-record decode failure fails closed.
            let action: Action = serde_json::from_slice(guard.value())
                .map_err(|e| ActionsError::Decode(format!("action {action_id}: {e}")))?;
            Ok(action.is_live(Utc::now()).then_some(action))
        })
    }

    fn enumerate_for_owner(&self, owner: Uuid) -> Result<Listing> {
        let (lower, upper) = keys::primary_range_bounds();
        self.with_retries(|| self.read_range(PRIMARY, owner, &lower, &upper))
    }

    fn get_actions_by_status(&self, owner: Uuid, status: ActionStatus) -> Result<Listing> {
        let (lower, upper) = keys::status_range_bounds(status);
        self.with_retries(|| self.read_range(STATUS_IDX, owner, &lower, &upper))
    }

    fn get_actions_by_created_at(
        &self,
        owner: Uuid,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Listing> {
        let (lower, upper) = keys::timestamp_range_bounds(
            since.unwrap_or_else(keys::ts_min),
            until.unwrap_or_else(keys::ts_max),
        );
        self.with_retries(|| self.read_range(CREATED_AT_IDX, owner, &lower, &upper))
    }

    fn get_actions_by_completed_at(
        &self,
        owner: Uuid,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Listing> {
        let (lower, upper) = keys::timestamp_range_bounds(
            since.unwrap_or_else(keys::ts_min),
            until.unwrap_or_else(keys::ts_max),
        );
        self.with_retries(|| self.read_range(COMPLETED_AT_IDX, owner, &lower, &upper))
    }
}

// ---------------------------------------------------------------------------
// Tests — redb-specific behavior; the shared suite lives in the parent module
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, RedbActionRepository) {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            store_path: dir.path().join("test.redb"),
            ..Settings::default()
        };
        let repo = RedbActionRepository::open(&settings).unwrap();
        (dir, repo)
    }

    fn ttl() -> Duration {
        Settings::default().ttl()
    }

    #[test]
    fn reopen_preserves_records() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            store_path: dir.path().join("test.redb"),
            ..Settings::default()
        };
        let owner = Uuid::new_v4();
        let action = Action::new(owner, json!({"n": 1}), ttl()).unwrap();
        {
            let repo = RedbActionRepository::open(&settings).unwrap();
            repo.store_actions(std::slice::from_ref(&action)).unwrap();
        }
        let repo = RedbActionRepository::open(&settings).unwrap();
        assert_eq!(repo.get_action_by_id(owner, action.id).unwrap(), Some(action));
    }

    #[test]
    fn undecodable_record_is_reported_not_dropped() {
        let (_dir, repo) = open_tmp();
        let owner = Uuid::new_v4();
        let good = Action::new(owner, json!({"n": 1}), ttl()).unwrap();
        repo.store_actions(std::slice::from_ref(&good)).unwrap();

        // Plant a record that predates the current schema.
        let drifted = Uuid::new_v4();
        let key = keys::store_key(owner, &keys::primary_sort_key(drifted));
        let wt = repo.db.begin_write().unwrap();
        {
            let mut table = wt.open_table(PRIMARY).unwrap();
            table
                .insert(key.as_slice(), br#"{"legacy": true}"#.as_slice())
                .unwrap();
        }
        wt.commit().unwrap();

        let listing = repo.enumerate_for_owner(owner).unwrap();
        assert_eq!(listing.actions, vec![good]);
        assert_eq!(listing.skipped.len(), 1);
        assert_eq!(
            listing.skipped[0].sort_key,
            keys::primary_sort_key(drifted)
        );
    }

    #[test]
    fn undecodable_point_lookup_fails_closed() {
        let (_dir, repo) = open_tmp();
        let owner = Uuid::new_v4();
        let drifted = Uuid::new_v4();
        let key = keys::store_key(owner, &keys::primary_sort_key(drifted));
        let wt = repo.db.begin_write().unwrap();
        {
            let mut table = wt.open_table(PRIMARY).unwrap();
            table
                .insert(key.as_slice(), br#"{"legacy": true}"#.as_slice())
                .unwrap();
        }
        wt.commit().unwrap();

        let err = repo.get_action_by_id(owner, drifted).unwrap_err();
        assert!(matches!(err, ActionsError::Decode(_)));
    }

    #[test]
    fn every_projection_is_written() {
        let (_dir, repo) = open_tmp();
        let owner = Uuid::new_v4();
        let mut action = Action::new(owner, json!({"n": 1}), ttl()).unwrap();
        action
            .complete(ActionStatus::Succeeded, Utc::now())
            .unwrap();
        repo.store_actions(std::slice::from_ref(&action)).unwrap();

        let rt = repo.db.begin_read().unwrap();
        for (table, sort_key) in [
            (PRIMARY, keys::primary_sort_key(action.id)),
            (
                CREATED_AT_IDX,
                keys::timestamp_sort_key(action.created_at, action.id),
            ),
            (
                COMPLETED_AT_IDX,
                keys::timestamp_sort_key(action.completed_at.unwrap(), action.id),
            ),
            (STATUS_IDX, keys::status_sort_key(action.status, action.id)),
        ] {
            let t = rt.open_table(table).unwrap();
            let key = keys::store_key(owner, &sort_key);
            assert!(t.get(key.as_slice()).unwrap().is_some(), "{sort_key}");
        }
    }

    #[test]
    fn superseded_status_entry_is_removed() {
        let (_dir, repo) = open_tmp();
        let owner = Uuid::new_v4();
        let mut action = Action::new(owner, json!({"n": 1}), ttl()).unwrap();
        repo.store_actions(std::slice::from_ref(&action)).unwrap();
        action.complete(ActionStatus::Failed, Utc::now()).unwrap();
        repo.store_actions(std::slice::from_ref(&action)).unwrap();

        let rt = repo.db.begin_read().unwrap();
        let table = rt.open_table(STATUS_IDX).unwrap();
        let stale = keys::store_key(
            owner,
            &keys::status_sort_key(ActionStatus::Pending, action.id),
        );
        assert!(table.get(stale.as_slice()).unwrap().is_none());
        let current = keys::store_key(
            owner,
            &keys::status_sort_key(ActionStatus::Failed, action.id),
        );
        assert!(table.get(current.as_slice()).unwrap().is_some());
    }
}
