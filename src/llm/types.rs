//! LLM 类型定义

use futures::Stream;
use serde_json::Value;
use std::pin::Pin;

/// 内嵌文件附件（base64，不含 data URL 前缀）
#[derive(Debug, Clone)]
pub struct FileAttachment {
    pub name: String,
    pub mime_type: String,
    pub data: String,
}

impl FileAttachment {
    /// 还原为 data URL
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// 消息内容片段
#[derive(Debug, Clone)]
pub enum ContentPart {
    Text(String),
    File(FileAttachment),
}

/// 聊天消息
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// 角色：system, user, assistant
    pub role: String,
    pub parts: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            parts: vec![ContentPart::Text(content.into())],
        }
    }

    /// 带附件的用户消息，文字在前、文件在后
    pub fn user_with_file(content: impl Into<String>, file: FileAttachment) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![ContentPart::Text(content.into()), ContentPart::File(file)],
        }
    }

    /// 所有文本片段拼接
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text(text) => Some(text.as_str()),
                ContentPart::File(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 流式响应块
#[derive(Debug, Clone, Default)]
pub struct ChatChunk {
    /// 文本内容
    pub content: Option<String>,
    /// 完成原因
    pub finish_reason: Option<String>,
}

/// 聊天选项
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// 温度参数
    pub temperature: Option<f64>,
    /// 最大 token 数
    pub max_tokens: Option<u32>,
    /// 目标输出的 JSON Schema（支持的提供方会强制结构化输出）
    pub response_schema: Option<Value>,
}

/// 流式响应
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatChunk, LlmError>> + Send>>;

/// 可流式对话的模型后端
pub trait ChatBackend: Send + Sync {
    /// 模型名称
    fn model(&self) -> &str;

    fn stream_chat(&self, messages: Vec<ChatMessage>, options: ChatOptions) -> ChatStream;
}

/// LLM 错误类型
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// HTTP 请求错误
    #[error("HTTP 请求失败: {0}")]
    HttpError(#[from] reqwest::Error),

    /// API 返回错误
    #[error("API 错误 ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// JSON 解析错误
    #[error("JSON 解析失败: {0}")]
    JsonError(#[from] serde_json::Error),

    /// 流解析错误
    #[error("流解析错误: {0}")]
    StreamError(String),
}
