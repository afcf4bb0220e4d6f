// handlers/mod.rs - HTTP handlers
//
// Public service endpoints live here; entity reads and the policy table have
// their own modules.
pub mod entity;
pub mod policy;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// GET / - service info
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let entities: Vec<&str> = state.policies.entities().collect();

    Json(json!({
        "success": true,
        "data": {
            "name": "BuildTrack API",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Whitelisted query API for construction project data",
            "storage": state.store.backend(),
            "entities": entities,
            "endpoints": {
                "home": "/",
                "health": "/health",
                "list": "/api/:entity",
                "explain": "/api/explain/:entity",
                "policies": "/api/policies[/:entity]",
            }
        }
    }))
}

/// GET /health - storage health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let backend = state.store.backend();

    match state.store.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "storage": backend
                }
            })),
        ),
        Err(e) => {
            tracing::error!("Storage health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": {
                        "code": "SERVICE_UNAVAILABLE",
                        "message": "storage unavailable"
                    },
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "storage": backend
                    }
                })),
            )
        }
    }
}
