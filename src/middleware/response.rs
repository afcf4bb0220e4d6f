use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::query::{Page, PaginationMeta};

/// Wrapper for API responses that automatically adds success envelope
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a successful API response with 200 status
    pub fn success(data: T) -> Self {
        Self { data }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let data_value = match to_value(&self.data) {
            Ok(value) => value,
            Err(response) => return response,
        };

        let envelope = json!({
            "success": true,
            "data": data_value
        });

        (StatusCode::OK, Json(envelope)).into_response()
    }
}

/// A page of records: `{ "success": true, "data": [...], "pagination": {...} }`
#[derive(Debug)]
pub struct PaginatedResponse<T: Serialize> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T: Serialize> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, pagination: PaginationMeta) -> Self {
        Self { data, pagination }
    }
}

impl From<Page> for PaginatedResponse<crate::database::Document> {
    fn from(page: Page) -> Self {
        Self::new(page.data, page.pagination)
    }
}

impl<T: Serialize> IntoResponse for PaginatedResponse<T> {
    fn into_response(self) -> Response {
        let data_value = match to_value(&self.data) {
            Ok(value) => value,
            Err(response) => return response,
        };

        let envelope = json!({
            "success": true,
            "data": data_value,
            "pagination": self.pagination
        });

        (StatusCode::OK, Json(envelope)).into_response()
    }
}

fn to_value<T: Serialize>(data: &T) -> Result<Value, Response> {
    serde_json::to_value(data).map_err(|e| {
        tracing::error!("Failed to serialize response data: {}", e);
        crate::error::ApiError::internal_server_error("Failed to serialize response data").into_response()
    })
}

// Convenience type aliases
pub type ApiResult<T> = Result<ApiResponse<T>, crate::error::ApiError>;
