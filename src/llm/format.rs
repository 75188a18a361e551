//! API 格式检测和 URL 构建工具

use serde::{Deserialize, Serialize};

/// API 格式枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiFormat {
    /// OpenAI Chat Completions API
    OpenAi,
    /// Anthropic Messages API
    Anthropic,
    /// Google Gemini generateContent API
    Gemini,
}

impl ApiFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiFormat::OpenAi => "openai",
            ApiFormat::Anthropic => "anthropic",
            ApiFormat::Gemini => "gemini",
        }
    }
}

/// 根据模型名称检测 API 格式
///
/// 规则：包含 "claude" 用 Anthropic，包含 "gemini" 用 Gemini，其余用 OpenAI
pub fn detect_api_format(model: &str) -> ApiFormat {
    let model = model.to_lowercase();
    if model.contains("claude") {
        ApiFormat::Anthropic
    } else if model.contains("gemini") {
        ApiFormat::Gemini
    } else {
        ApiFormat::OpenAi
    }
}

/// 修复 base_url
///
/// - 移除末尾斜杠
/// - 修复双斜杠（保留协议部分）
pub fn fix_base_url(base_url: &str) -> String {
    let mut url = base_url.trim_end_matches('/').to_string();

    if let Some(pos) = url.find("://") {
        let (protocol, rest) = url.split_at(pos + 3);
        let fixed_rest = rest.replace("//", "/");
        url = format!("{}{}", protocol, fixed_rest);
    }

    url
}

/// 构建 OpenAI Chat Completions 端点
pub fn build_openai_endpoint(base_url: &str) -> String {
    let url = fix_base_url(base_url);

    if url.ends_with("/chat/completions") {
        url
    } else if url.ends_with("/v1") {
        format!("{}/chat/completions", url)
    } else {
        format!("{}/v1/chat/completions", url)
    }
}

/// 构建 Anthropic Messages 端点
pub fn build_anthropic_endpoint(base_url: &str) -> String {
    let url = fix_base_url(base_url);

    if url.ends_with("/messages") {
        url
    } else if url.ends_with("/v1") {
        format!("{}/messages", url)
    } else {
        format!("{}/v1/messages", url)
    }
}

/// 构建 Gemini 流式端点（SSE 模式）
pub fn build_gemini_endpoint(base_url: &str, model: &str) -> String {
    let url = fix_base_url(base_url);
    let model = model.trim_start_matches("models/");

    if url.ends_with("/v1beta") || url.ends_with("/v1") {
        format!("{}/models/{}:streamGenerateContent?alt=sse", url, model)
    } else {
        format!("{}/v1beta/models/{}:streamGenerateContent?alt=sse", url, model)
    }
}

/// 各提供方的默认 base_url
pub fn default_base_url(format: ApiFormat) -> &'static str {
    match format {
        ApiFormat::OpenAi => "https://api.openai.com",
        ApiFormat::Anthropic => "https://api.anthropic.com",
        ApiFormat::Gemini => "https://generativelanguage.googleapis.com",
    }
}

/// 按字节截断日志内容，落在字符边界上
pub fn truncate(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
