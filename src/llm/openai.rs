//! OpenAI Chat Completions API 流式实现

use async_stream::try_stream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::format::{build_openai_endpoint, truncate};
use super::sse::SseBuffer;
use super::types::{ChatChunk, ChatMessage, ChatOptions, ChatStream, ContentPart, LlmError};

/// OpenAI 请求载荷
///
/// json_schema 结构化输出要求根为对象，而这里需要数组，所以只靠提示词约束格式。
#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: String,
    content: OpenAiContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAiPart {
    Text { text: String },
    File { file: OpenAiFile },
}

#[derive(Serialize)]
struct OpenAiFile {
    filename: String,
    file_data: String,
}

/// OpenAI SSE 响应块
#[derive(Deserialize, Debug)]
struct OpenAiStreamChunk {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize, Debug)]
struct OpenAiChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct OpenAiDelta {
    content: Option<String>,
}

fn to_openai_message(message: ChatMessage) -> OpenAiMessage {
    let has_file = message
        .parts
        .iter()
        .any(|part| matches!(part, ContentPart::File(_)));

    let content = if has_file {
        OpenAiContent::Parts(
            message
                .parts
                .into_iter()
                .map(|part| match part {
                    ContentPart::Text(text) => OpenAiPart::Text { text },
                    ContentPart::File(file) => OpenAiPart::File {
                        file: OpenAiFile {
                            file_data: file.to_data_url(),
                            filename: file.name,
                        },
                    },
                })
                .collect(),
        )
    } else {
        OpenAiContent::Text(message.text())
    };

    OpenAiMessage {
        role: message.role,
        content,
    }
}

/// 解析一条 SSE 数据；`[DONE]` 返回 None
fn parse_data(data: &str) -> Option<Option<ChatChunk>> {
    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<OpenAiStreamChunk>(data) {
        Ok(chunk) => Some(chunk.choices.into_iter().next().map(|choice| ChatChunk {
            content: choice.delta.content,
            finish_reason: choice.finish_reason,
        })),
        Err(e) => {
            debug!("Failed to parse OpenAI response: {}, data: {}", e, data);
            Some(None)
        }
    }
}

/// 流式调用 OpenAI API
pub fn stream_openai(
    client: Client,
    api_key: String,
    base_url: &str,
    messages: Vec<ChatMessage>,
    model: String,
    options: ChatOptions,
) -> ChatStream {
    let endpoint = build_openai_endpoint(base_url);

    Box::pin(try_stream! {
        let payload = OpenAiRequest {
            model: model.clone(),
            messages: messages.into_iter().map(to_openai_message).collect(),
            stream: true,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        debug!("OpenAI API request: endpoint={}, model={}", endpoint, model);

        let response = client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = response.text().await.unwrap_or_default();
            error!("OpenAI API error: status={}, body={}", status_code, truncate(&error_text, 500));
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
                match parse_data(&data) {
                    None => return,
                    Some(Some(chunk)) => {
                        yield chunk;
                    }
                    Some(None) => {}
                }
            }
        }
    })
}
