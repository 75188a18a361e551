//! 测验会话：生成、重新生成与清空

use futures::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::GenerateQuizRequest;
use crate::quiz::{Difficulty, Language, Question};

use super::consumer::{ConsumerState, Progress, QuizConsumer};
use super::transport::QuizTransport;
use super::upload::{title_from_file_name, validate_file, SelectedFile};
use super::ClientError;

/// 一个文件对应的测验会话
pub struct QuizSession<T: QuizTransport> {
    transport: T,
    consumer: QuizConsumer,
    last_request: Option<GenerateQuizRequest>,
    file_name: Option<String>,
}

impl<T: QuizTransport> QuizSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            consumer: QuizConsumer::new(),
            last_request: None,
            file_name: None,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.consumer.snapshot()
    }

    pub fn shared_state(&self) -> Arc<RwLock<ConsumerState>> {
        self.consumer.shared_state()
    }

    /// 测验标题，由文件名得出
    pub fn title(&self) -> String {
        self.file_name
            .as_deref()
            .map(title_from_file_name)
            .unwrap_or_else(|| "Quiz".to_string())
    }

    /// 校验并上传文件，流式生成测验
    ///
    /// 每当有新题目就绪时调用 `on_progress`。
    pub async fn generate<F>(
        &mut self,
        file: &SelectedFile,
        difficulty: Difficulty,
        language: Language,
        on_progress: F,
    ) -> Result<Vec<Question>, ClientError>
    where
        F: FnMut(Progress),
    {
        validate_file(&file.name, &file.mime_type, file.bytes.len() as u64)?;

        self.file_name = Some(file.name.clone());
        let request = GenerateQuizRequest::new(file.encode(), difficulty, language);
        self.submit(request, on_progress).await
    }

    /// 用上一次的请求重新生成，结果整体替换
    pub async fn regenerate<F>(&mut self, on_progress: F) -> Result<Vec<Question>, ClientError>
    where
        F: FnMut(Progress),
    {
        let request = self
            .last_request
            .clone()
            .ok_or(ClientError::NothingToRegenerate)?;
        info!("Regenerating quiz");
        self.submit(request, on_progress).await
    }

    /// 清空文件和题目
    pub fn clear(&mut self) {
        self.consumer.reset();
        self.last_request = None;
        self.file_name = None;
    }

    async fn submit<F>(
        &mut self,
        request: GenerateQuizRequest,
        mut on_progress: F,
    ) -> Result<Vec<Question>, ClientError>
    where
        F: FnMut(Progress),
    {
        self.consumer.begin(request.difficulty());
        self.last_request = Some(request.clone());

        let mut stream = match self.transport.submit(request).await {
            Ok(stream) => stream,
            Err(e) => {
                self.consumer.on_failure(&e);
                return Err(e);
            }
        };

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    if self.consumer.on_bytes(&bytes) > 0 {
                        let progress = self.consumer.progress();
                        debug!("{}", progress);
                        on_progress(progress);
                    }
                }
                Err(e) => {
                    self.consumer.on_failure(&e);
                    return Err(e);
                }
            }
        }

        self.consumer.on_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::ByteStream;
    use axum::body::Bytes;
    use futures::future::BoxFuture;
    use futures::stream;
    use parking_lot::Mutex;

    /// 依次返回预设响应的传输层
    struct ScriptedTransport {
        responses: Mutex<Vec<Result<Vec<&'static str>, &'static str>>>,
        requests: Mutex<Vec<GenerateQuizRequest>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<Vec<&'static str>, &'static str>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl QuizTransport for ScriptedTransport {
        fn submit(&self, request: GenerateQuizRequest) -> BoxFuture<'_, Result<ByteStream, ClientError>> {
            self.requests.lock().push(request);
            let response = self.responses.lock().remove(0);
            Box::pin(async move {
                let chunks = response.map_err(|message| ClientError::Rejected(message.to_string()))?;
                let items: Vec<Result<Bytes, ClientError>> =
                    chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
                Ok(stream::iter(items).boxed())
            })
        }
    }

    const FIRST: &str = r#"[{"question":"First?","options":["a","b","c","d"],"answer":"A"}]"#;
    const SECOND: &str = r#"[{"question":"Second?","options":["e","f","g","h"],"answer":"D"},{"question":"Third?","options":["i","j","k","l"],"answer":"B"}]"#;

    fn pdf() -> SelectedFile {
        SelectedFile::new("organic_chemistry.pdf", "application/pdf", b"%PDF-1.4".to_vec())
    }

    #[tokio::test]
    async fn test_regenerate_twice_yields_independent_sets() {
        let transport = ScriptedTransport::new(vec![
            Ok(vec![&FIRST[..30], &FIRST[30..]]),
            Ok(vec![SECOND]),
            Ok(vec![FIRST]),
        ]);
        let mut session = QuizSession::new(transport);

        let mut updates = Vec::new();
        let first = session
            .generate(&pdf(), Difficulty::Hard, Language::Chinese, |p| updates.push(p))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(updates, [Progress { ready: 1, expected: 25 }]);
        assert_eq!(session.title(), "organic chemistry");

        let second = session.regenerate(|_| {}).await.unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].question, "Second?");
        assert_eq!(session.state().questions, second);

        let third = session.regenerate(|_| {}).await.unwrap();
        assert_eq!(third, first);
        assert!(session.state().ready);

        let requests = session.transport.requests.lock();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1].difficulty(), Difficulty::Hard);
        assert_eq!(requests[2].language(), Language::Chinese);
    }

    #[tokio::test]
    async fn test_rejected_request_sets_error() {
        let transport = ScriptedTransport::new(vec![Err("a.pdf is larger than 20MB")]);
        let mut session = QuizSession::new(transport);

        let err = session
            .generate(&pdf(), Difficulty::Easy, Language::English, |_| {})
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "a.pdf is larger than 20MB");
        let state = session.state();
        assert_eq!(state.error.as_deref(), Some("a.pdf is larger than 20MB"));
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn test_invalid_file_never_submitted() {
        let transport = ScriptedTransport::new(vec![]);
        let mut session = QuizSession::new(transport);

        let image = SelectedFile::new("cat.png", "image/png", vec![0; 16]);
        let err = session
            .generate(&image, Difficulty::Easy, Language::English, |_| {})
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "cat.png is not a PDF file");
        assert!(session.transport.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_clear_resets_session() {
        let transport = ScriptedTransport::new(vec![Ok(vec![FIRST])]);
        let mut session = QuizSession::new(transport);
        session
            .generate(&pdf(), Difficulty::Normal, Language::English, |_| {})
            .await
            .unwrap();

        session.clear();
        assert_eq!(session.state(), ConsumerState::default());
        assert_eq!(session.title(), "Quiz");
        assert!(matches!(
            session.regenerate(|_| {}).await,
            Err(ClientError::NothingToRegenerate)
        ));
    }
}
