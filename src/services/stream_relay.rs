//! 流式转发
//!
//! 把模型输出的文本块原样写入 HTTP 响应体，同时喂给增量解码器跟踪进度。

use axum::body::Bytes;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::llm::{ChatStream, LlmError};
use crate::models::ErrorEnvelope;
use crate::quiz::{ArrayDecoder, DecodeError, DecodeEvent};

/// 响应预览保留的最大字节数
const PREVIEW_BYTES: usize = 300;

/// 转发错误
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("模型调用失败: {0}")]
    Llm(#[from] LlmError),

    #[error("生成超时（{}s）", .0.as_secs())]
    Timeout(Duration),

    #[error("测验校验失败: {0}")]
    Invalid(#[from] DecodeError),

    #[error("客户端已断开")]
    ClientDisconnected,
}

impl RelayError {
    /// 日志中使用的错误类型
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Llm(_) => "llm",
            RelayError::Timeout(_) => "timeout",
            RelayError::Invalid(_) => "validation",
            RelayError::ClientDisconnected => "client_disconnected",
        }
    }
}

/// 响应体写入端
///
/// 接收端是响应体；写入端被 drop 时响应体结束。
pub struct StreamWriter {
    tx: mpsc::Sender<Bytes>,
    chunks_written: usize,
    bytes_written: usize,
    preview: String,
}

impl StreamWriter {
    /// 创建写入端和对应的响应体流
    pub fn channel(capacity: usize) -> (Self, ReceiverStream<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        let writer = Self {
            tx,
            chunks_written: 0,
            bytes_written: 0,
            preview: String::new(),
        };
        (writer, ReceiverStream::new(rx))
    }

    /// 写入一段文本；接收端已关闭说明客户端断开
    pub async fn write(&mut self, text: String) -> Result<(), RelayError> {
        if self.preview.len() < PREVIEW_BYTES {
            self.preview.push_str(&text);
        }
        let len = text.len();
        self.tx
            .send(Bytes::from(text))
            .await
            .map_err(|_| RelayError::ClientDisconnected)?;
        self.chunks_written += 1;
        self.bytes_written += len;
        Ok(())
    }

    /// 写入终止错误信封，之后不应再写入任何内容
    pub async fn write_error(&mut self, message: &str) -> Result<(), RelayError> {
        self.write(ErrorEnvelope::new(message).to_json()).await
    }

    pub fn chunks_written(&self) -> usize {
        self.chunks_written
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    pub fn preview(&self) -> &str {
        &self.preview
    }

    /// 结束响应体
    pub fn close(self) {}
}

/// 转发模型流直到结束
///
/// 每个文本块原样写出；解码器只用于日志中的进度跟踪，最终校验由调用方完成。
pub async fn relay(
    mut stream: ChatStream,
    writer: &mut StreamWriter,
    decoder: &mut ArrayDecoder,
    request_id: &str,
) -> Result<(), RelayError> {
    while let Some(result) = stream.next().await {
        let chunk = result?;

        if let Some(reason) = &chunk.finish_reason {
            if is_truncation(reason) {
                warn!(
                    "Model output hit the token limit: request_id={}, finish_reason={}",
                    request_id, reason
                );
            } else {
                debug!("Model finished: request_id={}, finish_reason={}", request_id, reason);
            }
        }

        let Some(text) = chunk.content.filter(|t| !t.is_empty()) else {
            continue;
        };

        for event in decoder.feed(text.as_bytes()) {
            match event {
                DecodeEvent::Accepted(_) => {
                    debug!(
                        "Question ready: request_id={}, ready={}",
                        request_id,
                        decoder.accepted().len()
                    );
                }
                DecodeEvent::Rejected { index, error } => {
                    warn!(
                        "Question failed validation: request_id={}, index={}, error={}",
                        request_id, index, error
                    );
                }
            }
        }

        writer.write(text).await?;
    }

    Ok(())
}

/// 各提供方表示"输出被 token 上限截断"的结束原因
fn is_truncation(reason: &str) -> bool {
    reason.eq_ignore_ascii_case("max_tokens") || reason.eq_ignore_ascii_case("length")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatChunk;
    use futures::stream;

    fn chat_stream(items: Vec<Result<&'static str, LlmError>>) -> ChatStream {
        Box::pin(stream::iter(items.into_iter().map(|item| {
            item.map(|text| ChatChunk {
                content: Some(text.to_string()),
                finish_reason: None,
            })
        })))
    }

    async fn collect(body: ReceiverStream<Bytes>) -> String {
        let parts: Vec<Bytes> = body.collect().await;
        parts
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    const QUESTION: &str =
        r#"{"question":"Q","options":["a","b","c","d"],"answer":"B"}"#;

    #[tokio::test]
    async fn test_relay_forwards_chunks_unchanged() {
        let (mut writer, body) = StreamWriter::channel(16);
        let mut decoder = ArrayDecoder::new();
        let stream = chat_stream(vec![Ok("[{\"question\":\"Q\",\"opt"), Ok("ions\":[\"a\",\"b\",\"c\",\"d\"],\"answer\":\"B\"}]")]);

        relay(stream, &mut writer, &mut decoder, "test").await.unwrap();
        assert_eq!(writer.chunks_written(), 2);
        assert_eq!(decoder.accepted().len(), 1);
        writer.close();

        assert_eq!(collect(body).await, format!("[{}]", QUESTION));
    }

    #[tokio::test]
    async fn test_relay_stops_on_provider_error() {
        let (mut writer, body) = StreamWriter::channel(16);
        let mut decoder = ArrayDecoder::new();
        let stream = chat_stream(vec![
            Ok("[{\"question\""),
            Err(LlmError::StreamError("overloaded".to_string())),
            Ok("never sent"),
        ]);

        let err = relay(stream, &mut writer, &mut decoder, "test").await.unwrap_err();
        assert_eq!(err.kind(), "llm");
        writer.write_error("Failed").await.unwrap();
        writer.close();

        assert_eq!(collect(body).await, "[{\"question\"{\"error\":\"Failed\"}");
    }

    #[test]
    fn test_truncation_reasons() {
        assert!(is_truncation("MAX_TOKENS"));
        assert!(is_truncation("max_tokens"));
        assert!(is_truncation("length"));
        assert!(!is_truncation("STOP"));
        assert!(!is_truncation("end_turn"));
    }

    #[tokio::test]
    async fn test_relay_reads_finish_chunk_without_text() {
        let (mut writer, body) = StreamWriter::channel(16);
        let mut decoder = ArrayDecoder::new();
        let chunks: Vec<Result<ChatChunk, LlmError>> = vec![
            Ok(ChatChunk {
                content: Some("[]".to_string()),
                finish_reason: None,
            }),
            Ok(ChatChunk {
                content: None,
                finish_reason: Some("MAX_TOKENS".to_string()),
            }),
        ];
        let stream: ChatStream = Box::pin(stream::iter(chunks));

        relay(stream, &mut writer, &mut decoder, "test").await.unwrap();
        assert_eq!(writer.chunks_written(), 1);
        writer.close();
        assert_eq!(collect(body).await, "[]");
    }

    #[tokio::test]
    async fn test_write_after_receiver_dropped() {
        let (mut writer, body) = StreamWriter::channel(1);
        drop(body);
        let err = writer.write("x".to_string()).await.unwrap_err();
        assert!(matches!(err, RelayError::ClientDisconnected));
        assert_eq!(writer.bytes_written(), 0);
    }
}
