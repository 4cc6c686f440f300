//! 路由模块

use axum::{routing::get, Router};

use crate::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orquestracao", get(handlers::get_aggregate))
        .route("/api/health", get(handlers::health_check))
}
