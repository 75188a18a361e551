//! API 路由模块

mod health;
mod quiz;

pub use health::health_routes;
pub use quiz::quiz_routes;

use axum::Router;

use crate::state::AppState;
use std::sync::Arc;

/// 创建所有 API 路由
pub fn create_api_routes(state: Arc<AppState>) -> Router {
    let body_limit = state.config.request_body_limit();
    Router::new()
        .merge(health_routes())
        .merge(quiz_routes(body_limit))
        .with_state(state)
}
