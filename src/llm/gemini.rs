//! Gemini streamGenerateContent API 流式实现
//!
//! PDF 以 inlineData 方式随用户消息发送；目标输出用 responseSchema 强制为题目数组。

use async_stream::try_stream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use super::format::{build_gemini_endpoint, truncate};
use super::sse::SseBuffer;
use super::types::{ChatChunk, ChatMessage, ChatOptions, ChatStream, ContentPart, LlmError};

/// Gemini 请求载荷
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

/// 请求与响应共用的内容容器
#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

/// 文本或内嵌数据片段（untagged 解码依赖变体顺序）
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

/// 流式响应块
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

fn to_parts(parts: Vec<ContentPart>) -> Vec<Part> {
    parts
        .into_iter()
        .map(|part| match part {
            ContentPart::Text(text) => Part::Text { text },
            ContentPart::File(file) => Part::InlineData {
                inline_data: InlineData {
                    mime_type: file.mime_type,
                    data: file.data,
                },
            },
        })
        .collect()
}

/// Gemini 的 Schema 类型名使用大写（STRING/ARRAY/OBJECT）
fn to_gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let value = match (key.as_str(), value) {
                        ("type", Value::String(t)) => Value::String(t.to_uppercase()),
                        _ => to_gemini_schema(value),
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(to_gemini_schema).collect()),
        other => other.clone(),
    }
}

fn build_request(messages: Vec<ChatMessage>, options: ChatOptions) -> GeminiRequest {
    let mut system_instruction = None;
    let mut contents = Vec::new();

    for msg in messages {
        if msg.role == "system" {
            system_instruction = Some(Content {
                role: None,
                parts: to_parts(msg.parts),
            });
            continue;
        }
        let role = if msg.role == "assistant" { "model" } else { "user" };
        contents.push(Content {
            role: Some(role.to_string()),
            parts: to_parts(msg.parts),
        });
    }

    let response_schema = options.response_schema.as_ref().map(to_gemini_schema);
    GeminiRequest {
        contents,
        system_instruction,
        generation_config: GenerationConfig {
            temperature: options.temperature,
            max_output_tokens: options.max_tokens,
            response_mime_type: response_schema.as_ref().map(|_| "application/json"),
            response_schema,
        },
    }
}

/// 把一块响应转换为 ChatChunk
fn chunk_from_response(chunk: GeminiStreamChunk) -> Result<Option<ChatChunk>, LlmError> {
    if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(LlmError::StreamError(format!("prompt blocked: {}", reason)));
    }

    let Some(candidate) = chunk.candidates.into_iter().next() else {
        return Ok(None);
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| match part {
                    Part::Text { text } => Some(text),
                    Part::InlineData { .. } => None,
                })
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() && candidate.finish_reason.is_none() {
        return Ok(None);
    }

    Ok(Some(ChatChunk {
        content: (!text.is_empty()).then_some(text),
        finish_reason: candidate.finish_reason,
    }))
}

/// 流式调用 Gemini API
pub fn stream_gemini(
    client: Client,
    api_key: String,
    base_url: &str,
    messages: Vec<ChatMessage>,
    model: String,
    options: ChatOptions,
) -> ChatStream {
    let endpoint = build_gemini_endpoint(base_url, &model);

    Box::pin(try_stream! {
        let payload = build_request(messages, options);

        debug!("Gemini API request: endpoint={}, model={}", endpoint, model);

        let response = client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key.as_str())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error: status={}, body={}", status_code, truncate(&error_text, 500));
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
                let chunk = match serde_json::from_str::<GeminiStreamChunk>(&data) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        debug!("Failed to parse Gemini response: {}, data: {}", e, data);
                        continue;
                    }
                };
                if let Some(chunk) = chunk_from_response(chunk)? {
                    yield chunk;
                }
            }
        }
    })
}
