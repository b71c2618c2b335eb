//! Action data model.
//!
//! An `Action` is the unit of record: who created it, when, its lifecycle
//! status, and an opaque `details` payload the repository never interprets.
//! All timestamps are truncated to whole seconds at construction so their
//! fixed-width textual serialization is stable enough to appear inside
//! composite sort keys.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ActionsError, Result};

// ---------------------------------------------------------------------------
// ActionStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an action. New actions always start as `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Pending,
    Succeeded,
    Failed,
}

impl ActionStatus {
    pub fn all() -> &'static [ActionStatus] {
        &[
            ActionStatus::Pending,
            ActionStatus::Succeeded,
            ActionStatus::Failed,
        ]
    }

    /// The exact literal stored in the status sort key.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Pending => "PENDING",
            ActionStatus::Succeeded => "SUCCEEDED",
            ActionStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = ActionsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(ActionStatus::Pending),
            "SUCCEEDED" => Ok(ActionStatus::Succeeded),
            "FAILED" => Ok(ActionStatus::Failed),
            other => Err(ActionsError::InvalidStatus(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// The unit of record.
///
/// `id`, `created_at`, and `expires_at` are derived at construction and
/// immutable afterwards. `expires_at` is always `created_at + ttl`, never
/// caller-supplied, and drives soft deletion on every read path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: Uuid,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub status: ActionStatus,
    pub details: serde_json::Value,
}

impl Action {
    /// Create a new `Pending` action owned by `created_by`.
    ///
    /// A null `details` payload is rejected; everything else is opaque to
    /// the repository.
    pub fn new(created_by: Uuid, details: serde_json::Value, ttl: Duration) -> Result<Self> {
        Self::new_at(created_by, details, ttl, Utc::now())
    }

    /// Like [`Action::new`] but with a caller-supplied creation instant
    /// (backfill and tests). Truncation and expiry derivation are identical.
    pub fn new_at(
        created_by: Uuid,
        details: serde_json::Value,
        ttl: Duration,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        if details.is_null() {
            return Err(ActionsError::MissingDetails);
        }
        let created_at = created_at.trunc_subsecs(0);
        Ok(Self {
            id: Uuid::new_v4(),
            created_by,
            created_at,
            completed_at: None,
            expires_at: created_at + ttl,
            status: ActionStatus::Pending,
            details,
        })
    }

    /// Visible iff the expiry instant has not yet been reached.
    ///
    /// Store-side garbage collection is asynchronous and best-effort; every
    /// read path re-checks this instead of trusting physical deletion.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Record completion. `completed_at` is settable exactly once.
    pub fn complete(&mut self, status: ActionStatus, now: DateTime<Utc>) -> Result<()> {
        if self.completed_at.is_some() {
            return Err(ActionsError::AlreadyCompleted(self.id));
        }
        self.completed_at = Some(now.trunc_subsecs(0));
        self.status = status;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Identifier parsing
// ---------------------------------------------------------------------------

pub fn parse_owner(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ActionsError::InvalidOwner(raw.to_string()))
}

pub fn parse_action_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ActionsError::InvalidActionId(raw.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
