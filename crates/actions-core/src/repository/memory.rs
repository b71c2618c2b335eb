//! In-memory Action repository for test isolation.
//!
//! Mirrors the redb layout byte for byte: the same composite store keys,
//! the same JSON values, with four sorted maps standing in for the four
//! tables. Useful anywhere a test needs repository semantics without a
//! store file.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::action::{Action, ActionStatus};
use crate::error::{ActionsError, Result};
use crate::keys;

use super::{ActionRepository, BatchWriteReport, FailedWrite, Listing, SkippedRecord};

type Table = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Default)]
struct Tables {
    primary: Table,
    created_at: Table,
    completed_at: Table,
    status: Table,
}

#[derive(Default)]
pub struct MemoryActionRepository {
    tables: Mutex<Tables>,
}

impl MemoryActionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| ActionsError::StoreUnavailable("poisoned lock".to_string()))
    }
}

/// Scan a table between two sort keys of one owner, dropping expired
/// records and collecting undecodable ones as partial-failure metadata.
fn collect_range(table: &Table, owner: Uuid, lower_sort: &str, upper_sort: &str) -> Listing {
    let now = Utc::now();
    let lower = keys::store_key(owner, lower_sort);
    let upper = keys::store_key(owner, upper_sort);
    // An inverted range matches nothing, and BTreeMap::range panics on
    // backwards bounds.
    if lower > upper {
        return Listing::default();
    }

    let mut listing = Listing::default();
    for (k, v) in table.range(lower..=upper) {
        match serde_json::from_slice::<Action>(v) {
            Ok(action) if action.is_live(now) => listing.actions.push(action),
            Ok(_) => {}
            Err(e) => listing.skipped.push(SkippedRecord {
                sort_key: keys::sort_key_of(k),
                reason: e.to_string(),
            }),
        }
    }
    listing
}

impl ActionRepository for MemoryActionRepository {
    fn store_actions(&self, actions: &[Action]) -> Result<BatchWriteReport> {
        let mut tables = self.lock()?;
        let mut report = BatchWriteReport::default();
        for action in actions {
            let value = match serde_json::to_vec(action) {
                Ok(v) => v,
                Err(e) => {
                    report.failed.push(FailedWrite {
                        id: action.id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let owner = action.created_by;
            let primary_key = keys::store_key(owner, &keys::primary_sort_key(action.id));

            // A prior version of this record may sit in the index maps
            // under sort keys the new version no longer carries.
            let prior = tables
                .primary
                .get(&primary_key)
                .and_then(|bytes| serde_json::from_slice::<Action>(bytes).ok());
            if let Some(prior) = prior {
                if prior.created_at != action.created_at {
                    tables.created_at.remove(&keys::store_key(
                        owner,
                        &keys::timestamp_sort_key(prior.created_at, action.id),
                    ));
                }
                if let Some(prior_ts) = prior.completed_at {
                    if action.completed_at != Some(prior_ts) {
                        tables.completed_at.remove(&keys::store_key(
                            owner,
                            &keys::timestamp_sort_key(prior_ts, action.id),
                        ));
                    }
                }
                if prior.status != action.status {
                    tables.status.remove(&keys::store_key(
                        owner,
                        &keys::status_sort_key(prior.status, action.id),
                    ));
                }
            }

            tables.primary.insert(primary_key, value.clone());
            tables.created_at.insert(
                keys::store_key(owner, &keys::timestamp_sort_key(action.created_at, action.id)),
                value.clone(),
            );
            if let Some(completed_at) = action.completed_at {
                tables.completed_at.insert(
                    keys::store_key(owner, &keys::timestamp_sort_key(completed_at, action.id)),
                    value.clone(),
                );
            }
            tables.status.insert(
                keys::store_key(owner, &keys::status_sort_key(action.status, action.id)),
                value,
            );
            report.stored.push(action.id);
        }
        Ok(report)
    }

    fn get_action_by_id(&self, owner: Uuid, action_id: Uuid) -> Result<Option<Action>> {
        let tables = self.lock()?;
        let key = keys::store_key(owner, &keys::primary_sort_key(action_id));
        let Some(value) = tables.primary.get(&key) else {
            return Ok(None);
        };
        let action: Action = serde_json::from_slice(value)
            .map_err(|e| ActionsError::Decode(format!("action {action_id}: {e}")))?;
        Ok(action.is_live(Utc::now()).then_some(action))
    }

    fn enumerate_for_owner(&self, owner: Uuid) -> Result<Listing> {
        let tables = self.lock()?;
        let (lower, upper) = keys::primary_range_bounds();
        Ok(collect_range(&tables.primary, owner, &lower, &upper))
    }

    fn get_actions_by_status(&self, owner: Uuid, status: ActionStatus) -> Result<Listing> {
        let tables = self.lock()?;
        let (lower, upper) = keys::status_range_bounds(status);
        Ok(collect_range(&tables.status, owner, &lower, &upper))
    }

    fn get_actions_by_created_at(
        &self,
        owner: Uuid,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Listing> {
        let tables = self.lock()?;
        let (lower, upper) = keys::timestamp_range_bounds(
            since.unwrap_or_else(keys::ts_min),
            until.unwrap_or_else(keys::ts_max),
        );
        Ok(collect_range(&tables.created_at, owner, &lower, &upper))
    }

    fn get_actions_by_completed_at(
        &self,
        owner: Uuid,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Listing> {
        let tables = self.lock()?;
        let (lower, upper) = keys::timestamp_range_bounds(
            since.unwrap_or_else(keys::ts_min),
            until.unwrap_or_else(keys::ts_max),
        );
        Ok(collect_range(&tables.completed_at, owner, &lower, &upper))
    }
}
