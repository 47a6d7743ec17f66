//! HTTP API handlers

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::source::SourceStatus;
use crate::transport::server::TransportState;

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Transport status: the source view plus connection bookkeeping
#[derive(serde::Serialize)]
pub struct TransportStatus {
    #[serde(flatten)]
    pub source: SourceStatus,
    pub streaming: bool,
    pub connections_total: u64,
}

/// Get source status
pub async fn get_status(
    State(state): State<Arc<TransportState>>,
) -> Json<ApiResponse<TransportStatus>> {
    Json(ApiResponse::ok(state.status()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_response_shape() {
        let body = serde_json::to_value(ApiResponse::ok(3u8)).unwrap();
        assert_eq!(body, serde_json::json!({ "success": true, "data": 3 }));
    }
}
