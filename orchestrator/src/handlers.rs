//! Handler模块

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use common::errors::AppError;
use common::models::AggregateResult;
use common::response::ApiResponse;

use crate::state::AppState;

/// 依次查询各计数服务并返回聚合结果
#[utoipa::path(
    get,
    path = "/orquestracao",
    tag = "orquestracao",
    responses(
        (status = 200, description = "聚合计数结果", body = AggregateResult),
        (status = 502, description = "某个计数服务不可用或返回无效响应")
    )
)]
pub async fn get_aggregate(
    State(state): State<AppState>,
) -> Result<Json<AggregateResult>, AppError> {
    let aggregate = state.orchestrator.get_aggregate().await?;
    Ok(Json(aggregate))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = ApiResponse<HealthResponse>)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let backends = state
        .orchestrator
        .sources()
        .iter()
        .map(|s| s.name.clone())
        .collect();

    Json(ApiResponse::ok_with_service(
        HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            backends,
        },
        state.config.service_name.clone(),
    ))
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    /// Counting backends in query order.
    pub backends: Vec<String>,
}
