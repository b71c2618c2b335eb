use axum::Json;

/// GET / — service version and schema introspection.
pub async fn introspect() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "schema": "",
    }))
}
