//! 统一 LLM 客户端

use reqwest::Client;
use std::time::Duration;
use tracing::info;

use super::anthropic::stream_anthropic;
use super::format::{detect_api_format, ApiFormat};
use super::gemini::stream_gemini;
use super::openai::stream_openai;
use super::types::{ChatBackend, ChatMessage, ChatOptions, ChatStream, LlmError};

/// 统一 LLM 客户端
///
/// 支持 OpenAI、Anthropic 和 Gemini API 格式，根据模型名称自动选择
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    api_format: ApiFormat,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    ///
    /// `timeout` 是整个请求（含流式读取）的上限
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(LlmError::ConfigError("API Key is required".to_string()));
        }
        let model = model.into();
        if model.is_empty() {
            return Err(LlmError::ConfigError("Model name is required".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(LlmError::HttpError)?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into(),
            api_format: detect_api_format(&model),
            model,
        })
    }

    pub fn api_format(&self) -> ApiFormat {
        self.api_format
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl ChatBackend for LlmClient {
    fn model(&self) -> &str {
        &self.model
    }

    /// 流式聊天（按模型名选择 API 格式）
    fn stream_chat(&self, messages: Vec<ChatMessage>, options: ChatOptions) -> ChatStream {
        info!(
            "LLM request: model={}, api_format={:?}",
            self.model, self.api_format
        );

        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let model = self.model.clone();

        match self.api_format {
            ApiFormat::OpenAi => {
                stream_openai(client, api_key, &self.base_url, messages, model, options)
            }
            ApiFormat::Anthropic => {
                stream_anthropic(client, api_key, &self.base_url, messages, model, options)
            }
            ApiFormat::Gemini => {
                stream_gemini(client, api_key, &self.base_url, messages, model, options)
            }
        }
    }
}
