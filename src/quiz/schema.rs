//! 题目数据结构与校验
//!
//! 定义单道选择题的形状，并把任意 JSON 值校验、规整为 [`Question`]。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// 每道题固定的选项数量
pub const OPTION_COUNT: usize = 4;

/// 正确答案标签，A 对应第一个选项，依次类推
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerLabel {
    A,
    B,
    C,
    D,
}

impl AnswerLabel {
    pub const ALL: [AnswerLabel; OPTION_COUNT] =
        [AnswerLabel::A, AnswerLabel::B, AnswerLabel::C, AnswerLabel::D];

    /// 选项下标（0 起）
    pub fn index(self) -> usize {
        match self {
            AnswerLabel::A => 0,
            AnswerLabel::B => 1,
            AnswerLabel::C => 2,
            AnswerLabel::D => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnswerLabel::A => "A",
            AnswerLabel::B => "B",
            AnswerLabel::C => "C",
            AnswerLabel::D => "D",
        }
    }

    /// 严格解析，只接受大写的 A-D
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|label| label.as_str() == s)
    }
}

impl fmt::Display for AnswerLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一道选择题
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// 题干
    pub question: String,
    /// 四个选项，顺序决定 A/B/C/D
    pub options: Vec<String>,
    /// 正确答案
    pub answer: AnswerLabel,
}

impl Question {
    /// 从任意 JSON 值校验并构造题目
    ///
    /// 题干与选项会去掉首尾空白；多余的字段被忽略。
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let object = value
            .as_object()
            .ok_or_else(|| ValidationError::new("element", "quiz element must be an object"))?;

        let question = match object.get("question") {
            Some(Value::String(text)) => text.trim().to_string(),
            Some(_) => return Err(ValidationError::new("question", "question must be a string")),
            None => return Err(ValidationError::new("question", "question is required")),
        };
        if question.is_empty() {
            return Err(ValidationError::new("question", "question must not be empty"));
        }

        let options = match object.get("options") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(|s| s.trim().to_string()))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| {
                    ValidationError::new("options", "options must be an array of strings")
                })?,
            Some(_) => {
                return Err(ValidationError::new(
                    "options",
                    "options must be an array of strings",
                ))
            }
            None => return Err(ValidationError::new("options", "options is required")),
        };
        if options.len() != OPTION_COUNT {
            return Err(ValidationError::new(
                "options",
                format!("options must have length {}", OPTION_COUNT),
            ));
        }

        let answer = object
            .get("answer")
            .and_then(Value::as_str)
            .and_then(AnswerLabel::parse)
            .ok_or_else(|| ValidationError::new("answer", "answer must be one of A, B, C, D"))?;

        Ok(Self {
            question,
            options,
            answer,
        })
    }

    /// 正确选项的文本
    pub fn correct_option(&self) -> &str {
        &self.options[self.answer.index()]
    }

    pub fn is_correct(&self, label: AnswerLabel) -> bool {
        self.answer == label
    }
}

/// 对整个数组做严格校验
///
/// 任何一个元素不合法即整体失败，错误里带上元素下标。
pub fn validate_questions(value: &Value) -> Result<Vec<Question>, ValidationError> {
    let items = value
        .as_array()
        .ok_or_else(|| ValidationError::new("quiz", "quiz must be an array of questions"))?;
    if items.is_empty() {
        return Err(ValidationError::new(
            "quiz",
            "quiz must contain at least one question",
        ));
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| Question::from_value(item).map_err(|e| e.at_index(index)))
        .collect()
}

/// 发给模型的目标输出 JSON Schema（题目数组）
pub fn question_set_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "question": { "type": "string" },
                "options": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": OPTION_COUNT,
                    "maxItems": OPTION_COUNT,
                    "description": "Four possible answers to the question. Only one should be correct. They should all be of equal lengths."
                },
                "answer": {
                    "type": "string",
                    "enum": ["A", "B", "C", "D"],
                    "description": "The correct answer, where A is the first option, B is the second, and so on."
                }
            },
            "required": ["question", "options", "answer"]
        }
    })
}

/// 校验错误：哪个字段、违反了什么约束
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// 在数组中校验时的元素下标
    pub index: Option<usize>,
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            index: None,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "question {}: {}", index + 1, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        json!({
            "question": "What gas do plants absorb?",
            "options": ["Oxygen", "Carbon dioxide", "Nitrogen", "Helium"],
            "answer": "B"
        })
    }

    #[test]
    fn test_valid_question() {
        let q = Question::from_value(&sample()).unwrap();
        assert_eq!(q.options.len(), 4);
        assert_eq!(q.answer, AnswerLabel::B);
        assert_eq!(q.correct_option(), "Carbon dioxide");
    }

    #[test]
    fn test_round_trip_is_identical() {
        let q = Question::from_value(&sample()).unwrap();
        let text = serde_json::to_string(&q).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        let again = Question::from_value(&parsed).unwrap();
        assert_eq!(q, again);
    }

    #[test]
    fn test_normalizes_whitespace() {
        let value = json!({
            "question": "  Why?  ",
            "options": [" a", "b ", "c", "d"],
            "answer": "A",
            "explanation": "ignored"
        });
        let q = Question::from_value(&value).unwrap();
        assert_eq!(q.question, "Why?");
        assert_eq!(q.options[0], "a");
        assert_eq!(q.options[1], "b");
    }

    #[test]
    fn test_options_length_must_be_four() {
        for options in [json!([]), json!(["a", "b", "c"]), json!(["a", "b", "c", "d", "e"])] {
            let mut value = sample();
            value["options"] = options;
            let err = Question::from_value(&value).unwrap_err();
            assert_eq!(err.field, "options");
            assert_eq!(err.message, "options must have length 4");
        }
    }

    #[test]
    fn test_options_must_be_strings() {
        let mut value = sample();
        value["options"] = json!(["a", 2, "c", "d"]);
        let err = Question::from_value(&value).unwrap_err();
        assert_eq!(err.field, "options");
    }

    #[test]
    fn test_answer_must_be_label() {
        for answer in [json!("E"), json!("a"), json!(""), json!(1), Value::Null] {
            let mut value = sample();
            value["answer"] = answer;
            let err = Question::from_value(&value).unwrap_err();
            assert_eq!(err.field, "answer");
            assert_eq!(err.message, "answer must be one of A, B, C, D");
        }
    }

    #[test]
    fn test_non_object_element_names_element_field() {
        for value in [json!(42), json!("What is 2+2?"), json!(["a", "b"])] {
            let err = Question::from_value(&value).unwrap_err();
            assert_eq!(err.field, "element");
            assert_eq!(err.message, "quiz element must be an object");
        }
    }

    #[test]
    fn test_question_required_and_non_empty() {
        let mut value = sample();
        value["question"] = json!("   ");
        assert_eq!(Question::from_value(&value).unwrap_err().field, "question");

        let mut value = sample();
        value.as_object_mut().unwrap().remove("question");
        assert_eq!(Question::from_value(&value).unwrap_err().field, "question");
    }

    #[test]
    fn test_validate_questions_reports_index() {
        let mut bad = sample();
        bad["answer"] = json!("Z");
        let value = json!([sample(), bad]);
        let err = validate_questions(&value).unwrap_err();
        assert_eq!(err.index, Some(1));
        assert_eq!(err.field, "answer");
        assert_eq!(err.to_string(), "question 2: answer must be one of A, B, C, D");
    }

    #[test]
    fn test_validate_questions_rejects_empty_and_non_array() {
        assert!(validate_questions(&json!([])).is_err());
        assert!(validate_questions(&json!({"error": "x"})).is_err());
    }

    #[test]
    fn test_answer_label_index() {
        for (i, label) in AnswerLabel::ALL.iter().enumerate() {
            assert_eq!(label.index(), i);
            assert_eq!(AnswerLabel::from_index(i), Some(*label));
        }
        assert_eq!(AnswerLabel::from_index(4), None);
    }
}
