use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use uuid::Uuid;

use actions_core::action::{parse_action_id, parse_owner};
use actions_core::{Action, ActionFilter, ActionsError};

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the owner partition of a request. Auth is out of scope;
/// absent means the nil-UUID owner, matching the original deployment.
pub const OWNER_HEADER: &str = "x-owner-id";

fn owner_id(headers: &HeaderMap) -> Result<Uuid, AppError> {
    match headers.get(OWNER_HEADER) {
        None => Ok(Uuid::nil()),
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| AppError(ActionsError::InvalidOwner("<non-ascii>".into()).into()))?;
            Ok(parse_owner(raw)?)
        }
    }
}

/// GET /actions — enumerate the owner's actions through the query descriptor.
///
/// Filter validation happens before any store access; a conflicting or
/// malformed filter never reaches the repository.
pub async fn enumerate_actions(
    State(app): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let owner = owner_id(&headers)?;
    let filter = ActionFilter::from_params(&params)?;

    let repo = app.repo.clone();
    let listing = tokio::task::spawn_blocking(move || match filter {
        ActionFilter::None => repo.enumerate_for_owner(owner),
        ActionFilter::ByStatus(status) => repo.get_actions_by_status(owner, status),
        ActionFilter::ByCreatedAt(range) => {
            repo.get_actions_by_created_at(owner, Some(range.since), Some(range.until))
        }
        ActionFilter::ByCompletedAt(range) => {
            repo.get_actions_by_completed_at(owner, Some(range.since), Some(range.until))
        }
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    if !listing.skipped.is_empty() {
        tracing::warn!(
            owner = %owner,
            count = listing.skipped.len(),
            "enumeration skipped undecodable records"
        );
    }
    Ok(Json(serde_json::json!({
        "actions": listing.actions,
        "skipped_records": listing.skipped.len(),
    })))
}

#[derive(serde::Deserialize)]
pub struct CreateActionBody {
    pub details: Option<serde_json::Value>,
}

/// POST /actions — create a new `PENDING` action and echo it back.
pub async fn create_action(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateActionBody>,
) -> Result<Json<Action>, AppError> {
    let owner = owner_id(&headers)?;
    let details = body
        .details
        .filter(|d| !d.is_null())
        .ok_or(ActionsError::MissingDetails)?;
    let ttl = app.settings.ttl();

    let repo = app.repo.clone();
    let action = tokio::task::spawn_blocking(move || {
        let action = Action::new(owner, details, ttl)?;
        let report = repo.store_actions(std::slice::from_ref(&action))?;
        if let Some(failed) = report.failed.first() {
            return Err(ActionsError::StoreUnavailable(failed.reason.clone()));
        }
        Ok::<_, ActionsError>(action)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    tracing::info!(action_id = %action.id, owner = %owner, "created action");
    Ok(Json(action))
}

/// GET /actions/{action_id} — point lookup; expired records are absent.
pub async fn get_action(
    State(app): State<AppState>,
    headers: HeaderMap,
    Path(action_id): Path<String>,
) -> Result<Json<Action>, AppError> {
    let owner = owner_id(&headers)?;
    let id = parse_action_id(&action_id)?;

    let repo = app.repo.clone();
    let found = tokio::task::spawn_blocking(move || repo.get_action_by_id(owner, id))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    match found {
        Some(action) => Ok(Json(action)),
        None => {
            tracing::info!(owner = %owner, action_id = %id, "action not found");
            Err(AppError::not_found(format!(
                "action with id {id} was not found"
            )))
        }
    }
}

/// POST /actions/{action_id}/cancel — reserved; cancellation is not wired
/// to the repository yet.
pub async fn cancel_action(Path(action_id): Path<String>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "endpoint": "cancel", "action_id": action_id }))
}

/// DELETE /actions/{action_id} — reserved; explicit release is not wired
/// to the repository yet.
pub async fn release_action(Path(action_id): Path<String>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "endpoint": "release", "action_id": action_id }))
}
