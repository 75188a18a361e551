//! 测验生成端点

use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::GenerateQuizRequest;
use crate::services::GenerationPlan;
use crate::state::AppState;

/// 生成测验
///
/// 校验失败时返回 500 + 错误信封；开始流式输出后状态码固定为 200，
/// 之后的失败以追加在文本末尾的错误信封表示。
async fn generate_quiz(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> AppResult<Response> {
    let body = body
        .map_err(|e| AppError::BadRequest(format!("Failed to read request body: {}", e)))?;
    let request: GenerateQuizRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?;

    let plan = GenerationPlan::from_request(request, state.config.max_file_bytes)?;
    let stream = state.generator.start(plan).map(Ok::<_, Infallible>);

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response())
}

/// 创建测验路由
pub fn quiz_routes(body_limit: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/generate-quiz", post(generate_quiz))
        .layer(DefaultBodyLimit::max(body_limit))
}
