//! 计数编排服务
//!
//! 作为客户端请求的入口点，提供以下功能：
//! - 按固定顺序依次调用各数据库计数服务（Postgres → MySQL → SQL Server）
//! - 为每次下游调用创建追踪 span 并记录日志
//! - 聚合所有计数结果并附带时间戳返回

mod client;
mod handlers;
mod routes;
mod service;
mod sources;
mod state;
mod telemetry;

use std::sync::Arc;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use common::config::AppConfig;
use common::middleware::request_id::request_id_middleware;
use common::telemetry::init_tracing;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;

use crate::client::CountingClient;
use crate::service::Orchestrator;
use crate::telemetry::TracingTelemetry;

const SERVICE_NAME: &str = "orchestrator";
const DEFAULT_PORT: u16 = 8080;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "计数编排 API",
        version = "0.1.0",
        description = "聚合各数据库计数服务的结果"
    ),
    paths(
        handlers::get_aggregate,
        handlers::health_check,
    ),
    components(schemas(
        common::models::AggregateResult,
        common::models::CountResult,
        handlers::HealthResponse,
    )),
    tags(
        (name = "orquestracao", description = "编排端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME, DEFAULT_PORT);

    // 初始化日志追踪
    init_tracing(&config);

    let sources = sources::load_sources().context("加载计数服务地址失败")?;
    for source in &sources {
        info!(backend = %source.name, url = %source.url, "计数服务已配置");
    }

    // 创建应用状态
    let orchestrator = Orchestrator::new(
        CountingClient::new(reqwest::Client::new()),
        sources,
        Arc::new(TracingTelemetry),
    );
    let state = AppState::new(config.clone(), orchestrator);

    // 创建路由
    let app = create_router(state);

    // 启动服务
    let addr = config.bind_address();
    info!(service = SERVICE_NAME, address = %addr, "启动编排服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {addr}"))?;
    axum::serve(listener, app).await.context("服务启动失败")?;
    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
