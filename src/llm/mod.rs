//! LLM 模块
//!
//! 提供统一的多模态流式客户端，支持 OpenAI、Anthropic 和 Gemini API 格式。

mod anthropic;
mod client;
mod format;
mod gemini;
mod openai;
mod sse;
mod types;

pub use client::LlmClient;
pub use format::{default_base_url, detect_api_format, truncate, ApiFormat};
pub use types::*;
