//! 增量消费者
//!
//! 把响应字节逐段解码为题目数组，维护加载/错误/就绪状态。
//! 只有流正常结束且整个数组校验通过才进入就绪状态。

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::models::ErrorEnvelope;
use crate::quiz::{ArrayDecoder, DecodeError, DecodeEvent, Difficulty, Question};

use super::ClientError;

/// 消费者状态快照
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumerState {
    pub questions: Vec<Question>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub ready: bool,
}

/// 生成进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub ready: usize,
    pub expected: usize,
}

impl Progress {
    /// 百分比，收到第一道题之前为 0
    pub fn percent(&self) -> u8 {
        if self.ready == 0 || self.expected == 0 {
            return 0;
        }
        ((self.ready * 100) / self.expected).min(100) as u8
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} questions ready", self.ready, self.expected)
    }
}

/// 增量消费者
pub struct QuizConsumer {
    state: Arc<RwLock<ConsumerState>>,
    decoder: ArrayDecoder,
    raw: Vec<u8>,
    difficulty: Difficulty,
}

impl QuizConsumer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ConsumerState::default())),
            decoder: ArrayDecoder::new(),
            raw: Vec::new(),
            difficulty: Difficulty::default(),
        }
    }

    /// 共享状态，供展示层读取
    pub fn shared_state(&self) -> Arc<RwLock<ConsumerState>> {
        Arc::clone(&self.state)
    }

    pub fn snapshot(&self) -> ConsumerState {
        self.state.read().clone()
    }

    /// 开始新一次生成，丢弃上一次的全部结果
    pub fn begin(&mut self, difficulty: Difficulty) {
        self.decoder = ArrayDecoder::new();
        self.raw.clear();
        self.difficulty = difficulty;
        *self.state.write() = ConsumerState {
            is_loading: true,
            ..ConsumerState::default()
        };
    }

    /// 处理一段响应字节，返回新就绪的题目数
    pub fn on_bytes(&mut self, bytes: &[u8]) -> usize {
        self.raw.extend_from_slice(bytes);

        let accepted: Vec<Question> = self
            .decoder
            .feed(bytes)
            .into_iter()
            .filter_map(|event| match event {
                DecodeEvent::Accepted(question) => Some(question),
                DecodeEvent::Rejected { .. } => None,
            })
            .collect();

        let count = accepted.len();
        if count > 0 {
            self.state.write().questions.extend(accepted);
        }
        count
    }

    /// 当前进度；至少一道题就绪后预期数不小于已就绪数
    pub fn progress(&self) -> Progress {
        let ready = self.state.read().questions.len();
        let average = self.difficulty.expected_count() as usize;
        Progress {
            ready,
            expected: average.max(ready),
        }
    }

    /// 流结束：错误信封优先，否则严格校验整个数组
    pub fn on_end(&mut self) -> Result<Vec<Question>, ClientError> {
        let text = String::from_utf8_lossy(&self.raw);
        if let Some(envelope) = ErrorEnvelope::find_trailing(&text) {
            let error = ClientError::Rejected(envelope.error);
            self.fail(&error);
            return Err(error);
        }

        match self.decoder.finish() {
            Ok(questions) => {
                let mut state = self.state.write();
                state.questions = questions.clone();
                state.is_loading = false;
                state.error = None;
                state.ready = true;
                Ok(questions)
            }
            Err(DecodeError::Incomplete) => {
                let error = ClientError::Incomplete;
                self.fail(&error);
                Err(error)
            }
            Err(e) => {
                let error = ClientError::Invalid(e);
                self.fail(&error);
                Err(error)
            }
        }
    }

    /// 传输失败
    pub fn on_failure(&mut self, error: &ClientError) {
        self.fail(error);
    }

    /// 回到初始状态
    pub fn reset(&mut self) {
        self.decoder = ArrayDecoder::new();
        self.raw.clear();
        *self.state.write() = ConsumerState::default();
    }

    fn fail(&mut self, error: &ClientError) {
        warn!("Quiz generation failed: {}", error);
        *self.state.write() = ConsumerState {
            error: Some(error.user_message()),
            ..ConsumerState::default()
        };
    }
}

impl Default for QuizConsumer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GENERATION_FAILED_MESSAGE;

    fn question_json(i: usize) -> String {
        format!(
            r#"{{"question":"Question {}?","options":["a","b","c","d"],"answer":"C"}}"#,
            i
        )
    }

    fn array_json(n: usize) -> String {
        let items: Vec<String> = (0..n).map(question_json).collect();
        format!("[{}]", items.join(","))
    }

    #[test]
    fn test_hard_quiz_with_twenty_questions_becomes_ready() {
        let mut consumer = QuizConsumer::new();
        consumer.begin(Difficulty::Hard);
        assert!(consumer.snapshot().is_loading);
        assert_eq!(consumer.progress().percent(), 0);

        let body = array_json(20);
        for chunk in body.as_bytes().chunks(37) {
            consumer.on_bytes(chunk);
            let snapshot = consumer.snapshot();
            assert!(!snapshot.ready);
            assert!(snapshot.questions.len() <= 20);
        }

        let progress = consumer.progress();
        assert_eq!(progress, Progress { ready: 20, expected: 25 });
        assert_eq!(progress.to_string(), "20 of 25 questions ready");

        let questions = consumer.on_end().unwrap();
        assert_eq!(questions.len(), 20);
        let snapshot = consumer.snapshot();
        assert!(snapshot.ready);
        assert!(!snapshot.is_loading);
        assert_eq!(snapshot.questions.len(), 20);
        assert_eq!(snapshot.error, None);
    }

    #[test]
    fn test_partial_question_not_exposed() {
        let mut consumer = QuizConsumer::new();
        consumer.begin(Difficulty::Easy);
        let first = question_json(0);
        let second = question_json(1);

        assert_eq!(consumer.on_bytes(format!("[{},", first).as_bytes()), 1);
        assert_eq!(consumer.on_bytes(second[..30].as_bytes()), 0);
        assert_eq!(consumer.snapshot().questions.len(), 1);
        assert_eq!(consumer.progress(), Progress { ready: 1, expected: 7 });

        consumer.on_bytes(format!("{}]", &second[30..]).as_bytes());
        assert_eq!(consumer.snapshot().questions.len(), 2);
    }

    #[test]
    fn test_progress_expected_grows_with_ready() {
        let mut consumer = QuizConsumer::new();
        consumer.begin(Difficulty::Easy);
        consumer.on_bytes(array_json(9).as_bytes());
        assert_eq!(consumer.progress(), Progress { ready: 9, expected: 9 });
        assert_eq!(consumer.progress().percent(), 100);
    }

    #[test]
    fn test_error_envelope_clears_partial_questions() {
        let mut consumer = QuizConsumer::new();
        consumer.begin(Difficulty::Normal);
        consumer.on_bytes(format!("[{},{}", question_json(0), question_json(1)).as_bytes());
        assert_eq!(consumer.snapshot().questions.len(), 2);

        consumer.on_bytes(br#",{"question":"half"#);
        consumer.on_bytes(br#"{"error":"Failed to generate quiz. Please try again."}"#);

        let err = consumer.on_end().unwrap_err();
        assert_eq!(err.to_string(), "Failed to generate quiz. Please try again.");
        let snapshot = consumer.snapshot();
        assert!(snapshot.questions.is_empty());
        assert!(!snapshot.is_loading);
        assert!(!snapshot.ready);
        assert_eq!(
            snapshot.error.as_deref(),
            Some("Failed to generate quiz. Please try again.")
        );
    }

    #[test]
    fn test_stream_ending_early_is_an_error() {
        let mut consumer = QuizConsumer::new();
        consumer.begin(Difficulty::Normal);
        consumer.on_bytes(format!("[{}", question_json(0)).as_bytes());

        let err = consumer.on_end().unwrap_err();
        assert!(matches!(err, ClientError::Incomplete));
        let snapshot = consumer.snapshot();
        assert_eq!(snapshot.error.as_deref(), Some(GENERATION_FAILED_MESSAGE));
        assert!(snapshot.questions.is_empty());
        assert!(!snapshot.ready);
    }

    #[test]
    fn test_invalid_final_array_is_an_error() {
        let mut consumer = QuizConsumer::new();
        consumer.begin(Difficulty::Normal);
        consumer.on_bytes(br#"[{"question":"Q","options":["a","b"],"answer":"A"}]"#);

        assert!(matches!(consumer.on_end(), Err(ClientError::Invalid(_))));
        let snapshot = consumer.snapshot();
        assert!(snapshot.questions.is_empty());
        assert_eq!(snapshot.error.as_deref(), Some(GENERATION_FAILED_MESSAGE));
        assert!(!snapshot
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("options"));
    }
}
