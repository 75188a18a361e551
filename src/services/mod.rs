//! 服务层模块

mod prompt_service;
mod quiz_service;
mod stream_relay;

pub use prompt_service::PromptService;
pub use quiz_service::{GenerationPlan, QuizGenerator, QUIZ_FAILED_MESSAGE};
pub use stream_relay::{relay, RelayError, StreamWriter};
