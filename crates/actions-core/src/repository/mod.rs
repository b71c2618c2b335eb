//! Action repository.
//!
//! `ActionRepository` describes the six operations of the record store;
//! `RedbActionRepository` implements them against redb and
//! `MemoryActionRepository` against in-process sorted maps for test
//! isolation. Both share the composite-key layout in [`crate::keys`] and
//! apply the same soft-expiration filter on every read path.

pub mod db;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::action::{Action, ActionStatus};
use crate::error::Result;

pub use db::RedbActionRepository;
pub use memory::MemoryActionRepository;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// A stored record that failed to decode during a list query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub sort_key: String,
    pub reason: String,
}

/// Result of a list query: decoded actions in ascending sort-key order,
/// plus partial-failure metadata for records whose stored payload no longer
/// matches the schema. Schema drift never aborts a whole query, and is
/// never silently dropped either.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Listing {
    pub actions: Vec<Action>,
    pub skipped: Vec<SkippedRecord>,
}

/// A record that could not be written during a batch store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedWrite {
    pub id: Uuid,
    pub reason: String,
}

/// Outcome of a batch write. Each record's write is atomic; the batch as a
/// whole is not, so a failure partway leaves earlier records intact and is
/// reported here instead of being swallowed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchWriteReport {
    pub stored: Vec<Uuid>,
    pub failed: Vec<FailedWrite>,
}

impl BatchWriteReport {
    pub fn all_stored(&self) -> bool {
        self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ActionRepository
// ---------------------------------------------------------------------------

/// The six operations of the indexed Action repository. All reads are
/// scoped to one owner and exclude expired records regardless of whatever
/// garbage collection the backing store performs on its own.
pub trait ActionRepository: Send + Sync {
    /// Persist one or more actions, each with its primary record and all
    /// index projections written atomically.
    fn store_actions(&self, actions: &[Action]) -> Result<BatchWriteReport>;

    /// Point lookup. Absent and found-but-expired both return `None`.
    fn get_action_by_id(&self, owner: Uuid, action_id: Uuid) -> Result<Option<Action>>;

    /// All live records for the owner, primary-table order.
    fn enumerate_for_owner(&self, owner: Uuid) -> Result<Listing>;

    /// Prefix query on the status index for an exact status match.
    fn get_actions_by_status(&self, owner: Uuid, status: ActionStatus) -> Result<Listing>;

    /// Range query on the created-at index; unset bounds mean all-time.
    fn get_actions_by_created_at(
        &self,
        owner: Uuid,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Listing>;

    /// Range query on the completed-at index. Actions that never completed
    /// have no entry there and cannot match.
    fn get_actions_by_completed_at(
        &self,
        owner: Uuid,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Listing>;
}

// ---------------------------------------------------------------------------
// Tests — run the same behavioral suite against both implementations
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use chrono::Duration;
    use rand::Rng;
    use serde_json::json;
    use tempfile::TempDir;

    fn ttl() -> Duration {
        Duration::seconds(Settings::default().ttl().num_seconds())
    }

    fn action_for(owner: Uuid) -> Action {
        Action::new(owner, json!({"endpoint": "run"}), ttl()).unwrap()
    }

    fn action_with_status(owner: Uuid, status: ActionStatus) -> Action {
        let mut a = action_for(owner);
        a.status = status;
        a
    }

    /// An action whose `created_at` is a random live instant in the past.
    fn action_with_random_created_at(owner: Uuid) -> Action {
        // Stay clear of the expiry boundary so truncation can't tip a
        // freshly generated record over it mid-test.
        let offset = rand::thread_rng().gen_range(0..ttl().num_seconds() - 120);
        Action::new_at(
            owner,
            json!({"endpoint": "run"}),
            ttl(),
            Utc::now() - Duration::seconds(offset),
        )
        .unwrap()
    }

    /// An action backdated far enough that its expiry has already passed.
    fn expired_action(owner: Uuid) -> Action {
        Action::new_at(
            owner,
            json!({"endpoint": "run"}),
            ttl(),
            Utc::now() - ttl() * 2,
        )
        .unwrap()
    }

    fn ids(actions: &[Action]) -> std::collections::HashSet<Uuid> {
        actions.iter().map(|a| a.id).collect()
    }

    // -- behavioral suite ---------------------------------------------------

    fn round_trip_by_id(repo: &dyn ActionRepository) {
        let owner = Uuid::new_v4();
        let action = action_for(owner);
        let report = repo.store_actions(std::slice::from_ref(&action)).unwrap();
        assert!(report.all_stored());
        assert_eq!(report.stored, vec![action.id]);

        let found = repo.get_action_by_id(owner, action.id).unwrap();
        assert_eq!(found, Some(action));
    }

    fn absent_id_returns_none(repo: &dyn ActionRepository) {
        let owner = Uuid::new_v4();
        assert_eq!(repo.get_action_by_id(owner, Uuid::new_v4()).unwrap(), None);
    }

    fn wrong_owner_returns_none(repo: &dyn ActionRepository) {
        let action = action_for(Uuid::new_v4());
        repo.store_actions(std::slice::from_ref(&action)).unwrap();
        assert_eq!(
            repo.get_action_by_id(Uuid::new_v4(), action.id).unwrap(),
            None
        );
    }

    fn enumerate_returns_all_for_owner(repo: &dyn ActionRepository) {
        let owner = Uuid::new_v4();
        let actions: Vec<Action> = (0..3).map(|_| action_for(owner)).collect();
        repo.store_actions(&actions).unwrap();
        repo.store_actions(&[action_for(Uuid::new_v4())]).unwrap();

        let listing = repo.enumerate_for_owner(owner).unwrap();
        assert!(listing.skipped.is_empty());
        assert_eq!(ids(&listing.actions), ids(&actions));
    }

    fn fresh_owner_sees_nothing(repo: &dyn ActionRepository) {
        let owner = Uuid::new_v4();
        assert!(repo.enumerate_for_owner(owner).unwrap().actions.is_empty());
        assert!(repo
            .get_actions_by_status(owner, ActionStatus::Pending)
            .unwrap()
            .actions
            .is_empty());
        assert!(repo
            .get_actions_by_created_at(owner, None, None)
            .unwrap()
            .actions
            .is_empty());
        assert!(repo
            .get_actions_by_completed_at(owner, None, None)
            .unwrap()
            .actions
            .is_empty());
        assert_eq!(repo.get_action_by_id(owner, Uuid::new_v4()).unwrap(), None);
    }

    fn status_query_returns_exact_subset(repo: &dyn ActionRepository) {
        let owner = Uuid::new_v4();
        let actions = vec![
            action_with_status(owner, ActionStatus::Pending),
            action_with_status(owner, ActionStatus::Pending),
            action_with_status(owner, ActionStatus::Failed),
        ];
        repo.store_actions(&actions).unwrap();

        let pending = repo
            .get_actions_by_status(owner, ActionStatus::Pending)
            .unwrap();
        assert_eq!(ids(&pending.actions), ids(&actions[..2]));

        let succeeded = repo
            .get_actions_by_status(owner, ActionStatus::Succeeded)
            .unwrap();
        assert!(succeeded.actions.is_empty());
    }

    fn created_at_range_matches_filtering(repo: &dyn ActionRepository) {
        let owner = Uuid::new_v4();
        let actions: Vec<Action> = (0..8)
            .map(|_| action_with_random_created_at(owner))
            .collect();
        repo.store_actions(&actions).unwrap();

        let since = actions[2].created_at;
        let until = actions[5].created_at;
        let (since, until) = if since <= until {
            (since, until)
        } else {
            (until, since)
        };

        let cases: [(Option<DateTime<Utc>>, Option<DateTime<Utc>>); 4] = [
            (None, None),
            (Some(since), None),
            (None, Some(until)),
            (Some(since), Some(until)),
        ];
        for (lo, hi) in cases {
            let listing = repo.get_actions_by_created_at(owner, lo, hi).unwrap();
            let expected: std::collections::HashSet<Uuid> = actions
                .iter()
                .filter(|a| lo.map_or(true, |b| a.created_at >= b))
                .filter(|a| hi.map_or(true, |b| a.created_at <= b))
                .map(|a| a.id)
                .collect();
            assert_eq!(ids(&listing.actions), expected, "bounds {lo:?}..{hi:?}");
        }
    }

    fn created_at_results_are_ordered(repo: &dyn ActionRepository) {
        let owner = Uuid::new_v4();
        let actions: Vec<Action> = (0..6)
            .map(|_| action_with_random_created_at(owner))
            .collect();
        repo.store_actions(&actions).unwrap();

        let listing = repo.get_actions_by_created_at(owner, None, None).unwrap();
        let timestamps: Vec<_> = listing.actions.iter().map(|a| a.created_at).collect();
        let mut sorted = timestamps.clone();
        sorted.sort();
        assert_eq!(timestamps, sorted);
    }

    fn completed_at_index_is_sparse(repo: &dyn ActionRepository) {
        let owner = Uuid::new_v4();
        let untouched = action_for(owner);
        let mut completed = action_for(owner);
        completed
            .complete(ActionStatus::Succeeded, Utc::now())
            .unwrap();
        repo.store_actions(&[untouched.clone(), completed.clone()])
            .unwrap();

        let listing = repo.get_actions_by_completed_at(owner, None, None).unwrap();
        assert_eq!(ids(&listing.actions), ids(std::slice::from_ref(&completed)));
    }

    fn completed_at_range_bounds_apply(repo: &dyn ActionRepository) {
        let owner = Uuid::new_v4();
        let now = Utc::now();
        let mut early = action_for(owner);
        early
            .complete(ActionStatus::Succeeded, now - Duration::days(10))
            .unwrap();
        let mut late = action_for(owner);
        late.complete(ActionStatus::Failed, now - Duration::days(1))
            .unwrap();
        repo.store_actions(&[early.clone(), late.clone()]).unwrap();

        let listing = repo
            .get_actions_by_completed_at(owner, Some(now - Duration::days(5)), None)
            .unwrap();
        assert_eq!(ids(&listing.actions), ids(std::slice::from_ref(&late)));
    }

    fn expired_records_are_invisible_everywhere(repo: &dyn ActionRepository) {
        let owner = Uuid::new_v4();
        let mut stale = expired_action(owner);
        stale
            .complete(ActionStatus::Succeeded, Utc::now() - ttl() * 2)
            .unwrap();
        let report = repo.store_actions(std::slice::from_ref(&stale)).unwrap();
        assert!(report.all_stored(), "expired record still stores physically");

        assert_eq!(repo.get_action_by_id(owner, stale.id).unwrap(), None);
        assert!(repo.enumerate_for_owner(owner).unwrap().actions.is_empty());
        assert!(repo
            .get_actions_by_status(owner, stale.status)
            .unwrap()
            .actions
            .is_empty());
        assert!(repo
            .get_actions_by_created_at(owner, None, None)
            .unwrap()
            .actions
            .is_empty());
        assert!(repo
            .get_actions_by_completed_at(owner, None, None)
            .unwrap()
            .actions
            .is_empty());
    }

    fn inverted_range_returns_empty(repo: &dyn ActionRepository) {
        let owner = Uuid::new_v4();
        let action = action_for(owner);
        repo.store_actions(std::slice::from_ref(&action)).unwrap();

        let since = Some(action.created_at + Duration::days(1));
        let until = Some(action.created_at - Duration::days(1));
        let listing = repo.get_actions_by_created_at(owner, since, until).unwrap();
        assert!(listing.actions.is_empty());
        assert!(listing.skipped.is_empty());

        let listing = repo
            .get_actions_by_completed_at(owner, since, until)
            .unwrap();
        assert!(listing.actions.is_empty());
    }

    fn restoring_moves_index_entries(repo: &dyn ActionRepository) {
        let owner = Uuid::new_v4();
        let mut action = action_for(owner);
        repo.store_actions(std::slice::from_ref(&action)).unwrap();

        action.complete(ActionStatus::Failed, Utc::now()).unwrap();
        repo.store_actions(std::slice::from_ref(&action)).unwrap();

        let pending = repo
            .get_actions_by_status(owner, ActionStatus::Pending)
            .unwrap();
        assert!(pending.actions.is_empty(), "stale status entry survived");

        let failed = repo
            .get_actions_by_status(owner, ActionStatus::Failed)
            .unwrap();
        assert_eq!(failed.actions, vec![action.clone()]);

        let completed = repo.get_actions_by_completed_at(owner, None, None).unwrap();
        assert_eq!(completed.actions, vec![action.clone()]);

        assert_eq!(repo.get_action_by_id(owner, action.id).unwrap(), Some(action));
    }

    fn batch_write_reports_every_id(repo: &dyn ActionRepository) {
        let owner = Uuid::new_v4();
        let actions: Vec<Action> = (0..4).map(|_| action_for(owner)).collect();
        let report = repo.store_actions(&actions).unwrap();
        assert!(report.all_stored());
        assert_eq!(
            report.stored.iter().copied().collect::<std::collections::HashSet<_>>(),
            ids(&actions)
        );
    }

    fn all_cases(repo: &dyn ActionRepository) {
        round_trip_by_id(repo);
        absent_id_returns_none(repo);
        wrong_owner_returns_none(repo);
        enumerate_returns_all_for_owner(repo);
        fresh_owner_sees_nothing(repo);
        status_query_returns_exact_subset(repo);
        created_at_range_matches_filtering(repo);
        created_at_results_are_ordered(repo);
        completed_at_index_is_sparse(repo);
        completed_at_range_bounds_apply(repo);
        expired_records_are_invisible_everywhere(repo);
        inverted_range_returns_empty(repo);
        restoring_moves_index_entries(repo);
        batch_write_reports_every_id(repo);
    }

    #[test]
    fn redb_repository_behaves() {
        let dir = TempDir::new().unwrap();
        let settings = Settings {
            store_path: dir.path().join("actions.redb"),
            ..Settings::default()
        };
        let repo = RedbActionRepository::open(&settings).unwrap();
        all_cases(&repo);
    }

    #[test]
    fn memory_repository_behaves() {
        let repo = MemoryActionRepository::new();
        all_cases(&repo);
    }
}
