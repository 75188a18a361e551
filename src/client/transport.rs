//! 请求传输层

use axum::body::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

use crate::llm::truncate;
use crate::models::{ErrorEnvelope, GenerateQuizRequest};

use super::ClientError;

/// 响应字节流
pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

/// 提交生成请求并返回响应字节流
pub trait QuizTransport: Send + Sync {
    fn submit(&self, request: GenerateQuizRequest) -> BoxFuture<'_, Result<ByteStream, ClientError>>;
}

/// 通过 HTTP 调用测验服务
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    /// `server_url` 形如 `http://127.0.0.1:8765`
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/generate-quiz", server_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl QuizTransport for HttpTransport {
    fn submit(&self, request: GenerateQuizRequest) -> BoxFuture<'_, Result<ByteStream, ClientError>> {
        Box::pin(async move {
            info!("Submitting quiz request: endpoint={}", self.endpoint);

            let response = self.client.post(&self.endpoint).json(&request).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!(
                    "Quiz request rejected: status={}, body={}",
                    status,
                    truncate(&body, 500)
                );
                let message = serde_json::from_str::<ErrorEnvelope>(&body)
                    .map(|envelope| envelope.error)
                    .unwrap_or_else(|_| format!("HTTP {}", status));
                return Err(ClientError::Rejected(message));
            }

            Ok(response
                .bytes_stream()
                .map(|chunk| chunk.map_err(ClientError::from))
                .boxed())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_path() {
        let transport = HttpTransport::new("http://127.0.0.1:8765/", Duration::from_secs(5)).unwrap();
        assert_eq!(transport.endpoint(), "http://127.0.0.1:8765/api/generate-quiz");
    }
}
