//! Anthropic Messages API 流式实现

use async_stream::try_stream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::format::{build_anthropic_endpoint, truncate};
use super::sse::SseBuffer;
use super::types::{ChatChunk, ChatMessage, ChatOptions, ChatStream, ContentPart, LlmError};

/// Anthropic 请求载荷
#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicBlock {
    Text { text: String },
    Document { source: DocumentSource },
}

#[derive(Serialize)]
struct DocumentSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: String,
    data: String,
}

/// Anthropic SSE 事件
#[derive(Deserialize, Debug)]
struct AnthropicEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<AnthropicDelta>,
    #[serde(default)]
    error: Option<AnthropicErrorBody>,
}

#[derive(Deserialize, Debug)]
struct AnthropicDelta {
    #[serde(rename = "type")]
    delta_type: Option<String>,
    text: Option<String>,
    stop_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct AnthropicErrorBody {
    message: String,
}

/// 分离系统消息，文档块放在文字之前
fn split_messages(messages: Vec<ChatMessage>) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system_content: Option<String> = None;
    let mut anthropic_messages = Vec::new();

    for msg in messages {
        if msg.role == "system" {
            system_content = Some(msg.text());
            continue;
        }

        let mut content: Vec<AnthropicBlock> = Vec::new();
        for part in msg.parts {
            match part {
                ContentPart::File(file) => content.insert(
                    0,
                    AnthropicBlock::Document {
                        source: DocumentSource {
                            source_type: "base64",
                            media_type: file.mime_type,
                            data: file.data,
                        },
                    },
                ),
                ContentPart::Text(text) => content.push(AnthropicBlock::Text { text }),
            }
        }
        anthropic_messages.push(AnthropicMessage {
            role: msg.role,
            content,
        });
    }

    (system_content, anthropic_messages)
}

/// 把一个事件转换为响应块
fn event_to_chunk(event: AnthropicEvent) -> Result<Option<ChatChunk>, LlmError> {
    match event.event_type.as_str() {
        "content_block_delta" => Ok(event
            .delta
            .filter(|d| d.delta_type.as_deref() == Some("text_delta"))
            .and_then(|d| d.text)
            .map(|text| ChatChunk {
                content: Some(text),
                finish_reason: None,
            })),
        "message_delta" => Ok(event
            .delta
            .and_then(|d| d.stop_reason)
            .map(|reason| ChatChunk {
                content: None,
                finish_reason: Some(reason),
            })),
        "error" => Err(LlmError::StreamError(
            event
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown stream error".to_string()),
        )),
        _ => Ok(None),
    }
}

/// 流式调用 Anthropic API
pub fn stream_anthropic(
    client: Client,
    api_key: String,
    base_url: &str,
    messages: Vec<ChatMessage>,
    model: String,
    options: ChatOptions,
) -> ChatStream {
    let endpoint = build_anthropic_endpoint(base_url);

    Box::pin(try_stream! {
        let (system, anthropic_messages) = split_messages(messages);

        let payload = AnthropicRequest {
            model: model.clone(),
            messages: anthropic_messages,
            system,
            stream: true,
            max_tokens: options.max_tokens.unwrap_or(8192),
            temperature: options.temperature,
        };

        debug!("Anthropic API request: endpoint={}, model={}", endpoint, model);

        let response = client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .header("x-api-key", api_key.as_str())
            .header("anthropic-version", "2023-06-01")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = response.text().await.unwrap_or_default();
            error!("Anthropic API error: status={}, body={}", status_code, truncate(&error_text, 500));
            Err::<(), _>(LlmError::ApiError {
                status: status_code,
                message: error_text,
            })?;
            return;
        }

        let mut buffer = SseBuffer::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            let bytes = chunk_result?;
            buffer.push(&bytes);

            while let Some(data) = buffer.next_data() {
                let event = match serde_json::from_str::<AnthropicEvent>(&data) {
                    Ok(event) => event,
                    Err(e) => {
                        debug!("Failed to parse Anthropic response: {}, data: {}", e, data);
                        continue;
                    }
                };
                if event.event_type == "message_stop" {
                    return;
                }
                if let Some(chunk) = event_to_chunk(event)? {
                    yield chunk;
                }
            }
        }
    })
}
