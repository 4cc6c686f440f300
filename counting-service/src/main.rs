//! 计数服务
//!
//! 每个实例对应一个数据库（Postgres / MySQL / SQL Server），提供以下功能：
//! - 启动时等待数据库就绪并执行数据库迁移（迁移失败则以状态码 3 退出）
//! - 提供计数端点，返回当前记录数

mod handlers;
mod migrations;
mod routes;
mod service;
mod startup;
mod state;
mod store;

use std::process::ExitCode;

use axum::{middleware, routing::get, Json, Router};
use common::config::AppConfig;
use common::middleware::request_id::request_id_middleware;
use common::telemetry::init_tracing;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::OpenApi;

use crate::startup::{CountingSettings, StartupError};

const SERVICE_NAME: &str = "counting-service";
const DEFAULT_PORT: u16 = 8081;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "计数服务 API",
        version = "0.1.0",
        description = "返回数据库当前记录数"
    ),
    paths(
        handlers::get_count,
        handlers::health_check,
    ),
    components(schemas(
        common::models::CountResult,
        handlers::HealthResponse,
    )),
    tags(
        (name = "contagem", description = "计数端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> ExitCode {
    // 加载配置
    let mut config = AppConfig::load_with_service(SERVICE_NAME, DEFAULT_PORT);
    if let Some(name) = common::config::lookup("SERVICE_NAME") {
        config.service_name = name;
    }

    // 初始化日志追踪
    init_tracing(&config);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, exit_code = e.exit_code(), "服务启动失败");
            eprintln!("{SERVICE_NAME}: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(config: AppConfig) -> Result<(), StartupError> {
    let settings = CountingSettings::load()?;

    // 执行迁移并打开计数数据库
    let store = startup::prepare_store(&settings, &config).await?;

    // 创建应用状态
    let state = AppState::new(config.clone(), store);

    // 创建路由
    let app = create_router(state);

    // 启动服务
    let addr = config.bind_address();
    info!(service = %config.service_name, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
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
