//! Handler模块

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use common::errors::AppError;
use common::models::CountResult;
use common::response::ApiResponse;

use crate::service::CountingService;
use crate::state::AppState;

/// 返回当前计数
#[utoipa::path(
    get,
    path = "/contagem",
    tag = "contagem",
    responses(
        (status = 200, description = "当前计数", body = CountResult),
        (status = 500, description = "数据库查询失败")
    )
)]
pub async fn get_count(State(state): State<AppState>) -> Result<Json<CountResult>, AppError> {
    let service = CountingService::new(state.store, state.config.service_name);
    let count = service.get_count().await?;
    Ok(Json(count))
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
    Json(ApiResponse::ok_with_service(
        HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            database: state.store.dialect().to_string(),
        },
        state.config.service_name,
    ))
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    /// Backing store dialect.
    pub database: String,
}
