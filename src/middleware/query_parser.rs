use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
};

use crate::app::AppState;
use crate::config::CONFIG;
use crate::error::ApiError;
use crate::query::query_where::QueryWhere;
use crate::query::raw::is_reserved;
use crate::query::{DroppedParam, QueryPolicy, RawQuery};

/// The request's entity, its policy and the sanitized query string.
///
/// Rejects with 404 when the path names an entity without a policy.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub entity: String,
    pub policy: Arc<QueryPolicy>,
    pub query: RawQuery,
    pub dropped: Vec<DroppedParam>,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for ParsedQuery {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Path(entity) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;

        let policy = state
            .policies
            .get(&entity)
            .ok_or_else(|| ApiError::unknown_entity(&entity))?;

        let raw = RawQuery::parse(parts.uri.query().unwrap_or(""));
        let (query, dropped) = sanitize_query(&raw, &policy);

        if CONFIG.query.log_dropped_params {
            for d in &dropped {
                tracing::debug!(entity = %entity, key = %d.key, reason = %d.reason, "dropped query parameter");
            }
        }

        Ok(Self { entity, policy, query, dropped })
    }
}

/// Keeps reserved keys verbatim, drops filter keys whose field or operator is
/// not whitelisted, and strips operator characters from the values that remain.
pub fn sanitize_query(raw: &RawQuery, policy: &QueryPolicy) -> (RawQuery, Vec<DroppedParam>) {
    let mut sanitized = RawQuery::new();
    let mut dropped = vec![];

    for (key, value) in raw.iter() {
        if is_reserved(key) {
            sanitized.insert_raw(key.to_string(), value.clone());
            continue;
        }
        match QueryWhere::check_key(key, policy) {
            Ok(_) => sanitized.insert_raw(key.to_string(), value.map_values(sanitize_value)),
            Err(reason) => dropped.push(DroppedParam::new(key, reason)),
        }
    }

    (sanitized, dropped)
}

/// Removes `$`, `{` and `}`.
pub fn sanitize_value(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '$' | '{' | '}')).collect()
}
