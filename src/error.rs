//! 统一错误处理模块
//!
//! 定义应用级错误类型，并实现 axum 的 IntoResponse trait。
//! 所有错误响应都使用同一个信封：`{"error": "..."}`。

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::models::ErrorEnvelope;

/// 应用错误枚举
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 请求内容不合法（请求体格式、文件类型或大小）
    #[error("{0}")]
    BadRequest(String),
}

impl AppError {
    /// 客户端约定：流开始之前的任何失败都是 500 + 错误信封
    pub fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        error!("Request failed before streaming: status={}, error={}", status, self);

        (status, Json(ErrorEnvelope::new(self.to_string()))).into_response()
    }
}

/// 便捷类型别名
pub type AppResult<T> = Result<T, AppError>;
