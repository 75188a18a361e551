//! 测验核心模块
//!
//! 题目结构校验、难度/语言策略、增量数组解码和答题计分。

mod attempt;
pub mod decoder;
mod policy;
mod schema;

pub use attempt::QuizAttempt;
pub use decoder::{ArrayDecoder, DecodeError, DecodeEvent, DecoderState};
pub use policy::{question_count_range, resolve_language_name, Difficulty, Language};
pub use schema::{
    question_set_schema, validate_questions, AnswerLabel, Question, ValidationError, OPTION_COUNT,
};
