use axum::extract::State;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::config::CONFIG;
use crate::database::Document;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, PaginatedResponse, ParsedQuery};
use crate::query::QueryBuilder;

/// GET /api/:entity - filtered, sorted, projected and paginated list
pub async fn list(
    State(state): State<AppState>,
    parsed: ParsedQuery,
) -> Result<PaginatedResponse<Document>, ApiError> {
    let collection = state
        .store
        .collection(&parsed.entity)
        .ok_or_else(|| ApiError::unknown_entity(&parsed.entity))?;

    let page = QueryBuilder::new(collection.as_ref(), &parsed.query, &parsed.policy)
        .log_drops(CONFIG.query.log_dropped_params)
        .slow_query_threshold_ms(CONFIG.database.slow_query_threshold_ms)
        .filter()
        .sort()
        .limit_fields()
        .paginate()
        .fetch_page()
        .await?;

    Ok(page.into())
}

/// GET /api/explain/:entity - the query a list request would run, without running it
pub async fn explain(State(state): State<AppState>, parsed: ParsedQuery) -> ApiResult<Value> {
    let collection = state
        .store
        .collection(&parsed.entity)
        .ok_or_else(|| ApiError::unknown_entity(&parsed.entity))?;

    let (spec, builder_dropped) = QueryBuilder::new(collection.as_ref(), &parsed.query, &parsed.policy)
        .log_drops(CONFIG.query.log_dropped_params)
        .filter()
        .sort()
        .limit_fields()
        .paginate()
        .into_parts();

    let mut dropped = parsed.dropped;
    dropped.extend(builder_dropped);

    Ok(ApiResponse::success(json!({
        "entity": parsed.entity,
        "query": parsed.query,
        "spec": spec,
        "dropped": dropped,
    })))
}
