//! 命令行客户端
//!
//! 上传前校验文件，提交到测验服务，并把流式响应增量解码为题目。

mod consumer;
mod session;
mod transport;
mod upload;

pub use consumer::{ConsumerState, Progress, QuizConsumer};
pub use session::QuizSession;
pub use transport::{ByteStream, HttpTransport, QuizTransport};
pub use upload::{
    format_file_size, select_files, title_from_file_name, validate_file, SelectedFile, UploadError,
    MAX_FILE_BYTES,
};

use crate::quiz::DecodeError;

/// 生成失败时展示给用户的消息
pub const GENERATION_FAILED_MESSAGE: &str = "Failed to generate quiz. Please try again.";

/// 客户端错误
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),

    /// 服务端返回的错误信封
    #[error("{0}")]
    Rejected(String),

    #[error("stream ended before the quiz was complete")]
    Incomplete,

    #[error("invalid quiz: {0}")]
    Invalid(DecodeError),

    #[error("没有可以重新生成的请求")]
    NothingToRegenerate,
}

impl ClientError {
    /// 展示给用户的错误文本
    ///
    /// 传输和校验失败只显示通用消息；服务端信封和文件校验错误原样显示。
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Http(_) | ClientError::Incomplete | ClientError::Invalid(_) => {
                GENERATION_FAILED_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_decode_details() {
        assert_eq!(ClientError::Incomplete.user_message(), GENERATION_FAILED_MESSAGE);
        let invalid = ClientError::Invalid(DecodeError::Incomplete);
        assert_eq!(invalid.user_message(), GENERATION_FAILED_MESSAGE);
        assert_ne!(invalid.to_string(), GENERATION_FAILED_MESSAGE);

        let rejected = ClientError::Rejected("Only PDF files are supported".to_string());
        assert_eq!(rejected.user_message(), "Only PDF files are supported");
    }
}
