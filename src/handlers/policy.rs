use axum::extract::{Path, State};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::query::QueryPolicy;

/// GET /api/policies - every entity policy
pub async fn policy_list(State(state): State<AppState>) -> ApiResult<Vec<QueryPolicy>> {
    Ok(ApiResponse::success(state.policies.iter().cloned().collect()))
}

/// GET /api/policies/:entity
pub async fn policy_show(
    State(state): State<AppState>,
    Path(entity): Path<String>,
) -> ApiResult<QueryPolicy> {
    let policy = state
        .policies
        .get(&entity)
        .ok_or_else(|| ApiError::unknown_entity(&entity))?;
    Ok(ApiResponse::success(policy.as_ref().clone()))
}
