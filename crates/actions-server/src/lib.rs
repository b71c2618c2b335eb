pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use actions_core::config::Settings;
use actions_core::RedbActionRepository;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::introspect::introspect))
        .route("/actions", get(routes::actions::enumerate_actions))
        .route("/actions", post(routes::actions::create_action))
        .route("/actions/{action_id}", get(routes::actions::get_action))
        .route(
            "/actions/{action_id}",
            delete(routes::actions::release_action),
        )
        .route(
            "/actions/{action_id}/cancel",
            post(routes::actions::cancel_action),
        )
        .fallback(fallback)
        .layer(cors)
        .with_state(app_state)
}

async fn fallback(uri: axum::http::Uri) -> impl IntoResponse {
    tracing::warn!(%uri, "unable to dispatch request");
    (
        StatusCode::NOT_FOUND,
        axum::Json(serde_json::json!({ "error": "no such route" })),
    )
}

/// Open the store and run the Actions API server until shutdown.
pub async fn serve(settings: Settings, port: u16) -> anyhow::Result<()> {
    let repo = RedbActionRepository::open(&settings)?;
    let state = AppState::new(Arc::new(repo), settings);
    let app = build_router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("actions API listening on http://localhost:{port}");

    axum::serve(listener, app).await?;
    Ok(())
}
