//! 增量 JSON 数组解码器
//!
//! 模型输出的是一个逐步增长的 JSON 数组文本。解码器是一个显式的字节级状态机：
//!
//! ```text
//! AwaitingArrayStart --'['--> AwaitingElement --'{'--> InsideElement
//!        ^        (其他字符回退)    ^    |                    |
//!        +-------------------------+   ']'             元素闭合
//!                                  |    v                    v
//!                                 ',' Complete <--']'-- AwaitingSeparatorOrEnd
//! ```
//!
//! `[` 之后的第一个非空白字符必须是 `{` 或 `]`，否则这个 `[` 属于前导文字
//! （例如 `Here are [1] questions:`），解码器回到等待数组开始。
//!
//! 每个元素一闭合就解析并按题目结构校验；仍在生成中的元素只缓存不解析。
//! 分块边界可以落在任意位置（包括字符串内部和多字节 UTF-8 字符中间），
//! 因为所有结构字符都是 ASCII，不会出现在多字节序列里。

use serde_json::Value;
use thiserror::Error;

use super::schema::{validate_questions, Question, ValidationError};

/// 解码器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// 等待数组开始的 `[`
    AwaitingArrayStart,
    /// 等待下一个元素（或空数组 / 尾随逗号后的 `]`）
    AwaitingElement,
    /// 正在读取一个元素
    InsideElement,
    /// 元素结束，等待 `,` 或 `]`
    AwaitingSeparatorOrEnd,
    /// 数组已闭合
    Complete,
    /// 遇到无法恢复的结构错误
    Failed,
}

/// 解码错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("unexpected character {found:?} at byte {offset}")]
    Unexpected { found: char, offset: usize },

    #[error("malformed JSON: {0}")]
    Malformed(String),

    #[error("{0}")]
    Invalid(#[from] ValidationError),

    #[error("stream ended before the quiz array was complete")]
    Incomplete,
}

/// 单个元素闭合时产生的事件
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEvent {
    /// 结构完整且通过校验
    Accepted(Question),
    /// 结构完整但不合法
    Rejected { index: usize, error: DecodeError },
}

/// 增量数组解码器
#[derive(Debug)]
pub struct ArrayDecoder {
    state: DecoderState,
    /// 当前元素的字节
    element: Vec<u8>,
    /// 从 `[` 到 `]` 的完整数组文本，结束时做整体校验
    array: Vec<u8>,
    depth: usize,
    /// 刚读到 `[`，还没确认它是数组的开始
    opening: bool,
    in_string: bool,
    escaped: bool,
    offset: usize,
    element_count: usize,
    accepted: Vec<Question>,
    rejected: usize,
    failure: Option<DecodeError>,
}

impl ArrayDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::AwaitingArrayStart,
            element: Vec::new(),
            array: Vec::new(),
            depth: 0,
            opening: false,
            in_string: false,
            escaped: false,
            offset: 0,
            element_count: 0,
            accepted: Vec::new(),
            rejected: 0,
            failure: None,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// 已通过校验的元素
    pub fn accepted(&self) -> &[Question] {
        &self.accepted
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected
    }

    pub fn is_complete(&self) -> bool {
        self.state == DecoderState::Complete
    }

    /// 喂入一块字节，返回这块数据里闭合的元素事件
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<DecodeEvent> {
        let mut events = Vec::new();
        for &byte in chunk {
            self.step(byte, &mut events);
            self.offset += 1;
        }
        events
    }

    fn step(&mut self, byte: u8, events: &mut Vec<DecodeEvent>) {
        match self.state {
            DecoderState::AwaitingArrayStart => {
                // 跳过前导噪声，比如 Markdown 代码块标记
                if byte == b'[' {
                    self.array.clear();
                    self.array.push(byte);
                    self.opening = true;
                    self.state = DecoderState::AwaitingElement;
                }
            }
            DecoderState::AwaitingElement => {
                if is_whitespace(byte) {
                    self.array.push(byte);
                    return;
                }
                if self.opening {
                    self.opening = false;
                    if byte != b'{' && byte != b']' {
                        self.state = DecoderState::AwaitingArrayStart;
                        self.step(byte, events);
                        return;
                    }
                }
                match byte {
                    b']' => {
                        self.array.push(byte);
                        self.state = DecoderState::Complete;
                    }
                    b',' => self.fail(byte),
                    _ => {
                        self.state = DecoderState::InsideElement;
                        self.element.clear();
                        self.depth = 0;
                        self.in_string = false;
                        self.escaped = false;
                        self.inside_element(byte, events);
                    }
                }
            }
            DecoderState::InsideElement => self.inside_element(byte, events),
            DecoderState::AwaitingSeparatorOrEnd => {
                if is_whitespace(byte) {
                    self.array.push(byte);
                    return;
                }
                match byte {
                    b',' => {
                        self.array.push(byte);
                        self.state = DecoderState::AwaitingElement;
                    }
                    b']' => {
                        self.array.push(byte);
                        self.state = DecoderState::Complete;
                    }
                    _ => self.fail(byte),
                }
            }
            // 数组之后的内容（如代码块结束标记）忽略
            DecoderState::Complete | DecoderState::Failed => {}
        }
    }

    fn inside_element(&mut self, byte: u8, events: &mut Vec<DecodeEvent>) {
        if self.in_string {
            self.push(byte);
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
                if self.depth == 0 {
                    self.close_element(events);
                    self.state = DecoderState::AwaitingSeparatorOrEnd;
                }
            }
            return;
        }

        match byte {
            b'"' => {
                self.push(byte);
                self.in_string = true;
            }
            b'{' | b'[' => {
                self.push(byte);
                self.depth += 1;
            }
            b'}' | b']' if self.depth > 0 => {
                self.push(byte);
                self.depth -= 1;
                if self.depth == 0 {
                    self.close_element(events);
                    self.state = DecoderState::AwaitingSeparatorOrEnd;
                }
            }
            // 顶层标量元素（数字、true 等）在分隔符处结束
            b',' | b']' | b'}' if self.depth == 0 => {
                self.close_element(events);
                self.state = DecoderState::AwaitingSeparatorOrEnd;
                self.step(byte, events);
            }
            _ if self.depth == 0 && is_whitespace(byte) => {
                self.close_element(events);
                self.state = DecoderState::AwaitingSeparatorOrEnd;
                self.array.push(byte);
            }
            _ => self.push(byte),
        }
    }

    fn push(&mut self, byte: u8) {
        self.element.push(byte);
        self.array.push(byte);
    }

    fn close_element(&mut self, events: &mut Vec<DecodeEvent>) {
        let index = self.element_count;
        self.element_count += 1;

        let parsed = serde_json::from_slice::<Value>(&self.element)
            .map_err(|e| DecodeError::Malformed(e.to_string()))
            .and_then(|value| {
                Question::from_value(&value).map_err(|e| DecodeError::Invalid(e.at_index(index)))
            });
        self.element.clear();

        match parsed {
            Ok(question) => {
                self.accepted.push(question.clone());
                events.push(DecodeEvent::Accepted(question));
            }
            Err(error) => {
                self.rejected += 1;
                events.push(DecodeEvent::Rejected { index, error });
            }
        }
    }

    fn fail(&mut self, byte: u8) {
        self.failure = Some(DecodeError::Unexpected {
            found: byte as char,
            offset: self.offset,
        });
        self.state = DecoderState::Failed;
    }

    /// 流结束：对完整数组做严格校验
    pub fn finish(&self) -> Result<Vec<Question>, DecodeError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        if self.state != DecoderState::Complete {
            return Err(DecodeError::Incomplete);
        }

        let value: Value = serde_json::from_slice(&self.array)
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;
        Ok(validate_questions(&value)?)
    }
}

impl Default for ArrayDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\n' | b'\r' | b'\t')
}

/// 一次性解码完整文本
pub fn decode_all(bytes: &[u8]) -> Result<Vec<Question>, DecodeError> {
    let mut decoder = ArrayDecoder::new();
    decoder.feed(bytes);
    decoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::AnswerLabel;

    fn question_json(n: usize) -> String {
        format!(
            r#"{{"question":"Q{n} {{with}} [brackets] and \"quotes\"","options":["a{n}","b","c","d"],"answer":"C"}}"#
        )
    }

    fn array_json(count: usize) -> String {
        let items: Vec<String> = (0..count).map(question_json).collect();
        format!("[{}]", items.join(","))
    }

    #[test]
    fn test_decode_whole_array() {
        let questions = decode_all(array_json(3).as_bytes()).unwrap();
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0].question, r#"Q0 {with} [brackets] and "quotes""#);
        assert_eq!(questions[2].answer, AnswerLabel::C);
    }

    #[test]
    fn test_every_split_point_yields_same_result() {
        let text = array_json(2);
        let bytes = text.as_bytes();
        for split in 0..=bytes.len() {
            let mut decoder = ArrayDecoder::new();
            decoder.feed(&bytes[..split]);
            decoder.feed(&bytes[split..]);
            let questions = decoder.finish().unwrap();
            assert_eq!(questions.len(), 2, "split at {}", split);
        }
    }

    #[test]
    fn test_byte_by_byte_emits_elements_as_they_close() {
        let text = array_json(3);
        let mut decoder = ArrayDecoder::new();
        let mut seen = Vec::new();
        for (offset, byte) in text.as_bytes().iter().enumerate() {
            for event in decoder.feed(std::slice::from_ref(byte)) {
                if let DecodeEvent::Accepted(q) = event {
                    seen.push((offset, q));
                }
            }
        }
        assert_eq!(seen.len(), 3);
        // 第一个元素在整个数组结束之前就已经可用
        assert!(seen[0].0 < text.len());
        assert!(decoder.is_complete());
    }

    #[test]
    fn test_multibyte_characters_split_across_chunks() {
        let text = r#"[{"question":"¿Qué es 光合作用?","options":["é","ü","中","ß"],"answer":"A"}]"#;
        let bytes = text.as_bytes();
        let mut decoder = ArrayDecoder::new();
        for chunk in bytes.chunks(3) {
            decoder.feed(chunk);
        }
        let questions = decoder.finish().unwrap();
        assert_eq!(questions[0].question, "¿Qué es 光合作用?");
        assert_eq!(questions[0].options[2], "中");
    }

    #[test]
    fn test_incomplete_element_is_held_back() {
        let full = array_json(2);
        let cut = full.len() - 20;
        let mut decoder = ArrayDecoder::new();
        decoder.feed(&full.as_bytes()[..cut]);
        assert_eq!(decoder.accepted().len(), 1);
        assert_eq!(decoder.state(), DecoderState::InsideElement);
        assert_eq!(decoder.finish().unwrap_err(), DecodeError::Incomplete);
    }

    #[test]
    fn test_invalid_element_is_rejected_and_fails_finish() {
        let text = r#"[{"question":"Q","options":["a","b","c"],"answer":"A"}]"#;
        let mut decoder = ArrayDecoder::new();
        let events = decoder.feed(text.as_bytes());
        assert!(matches!(events[0], DecodeEvent::Rejected { index: 0, .. }));
        assert_eq!(decoder.rejected_count(), 1);
        match decoder.finish().unwrap_err() {
            DecodeError::Invalid(e) => assert_eq!(e.field, "options"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_leading_fence_and_trailing_noise() {
        let text = format!("```json\n{}\n```", array_json(1));
        let mut decoder = ArrayDecoder::new();
        decoder.feed(text.as_bytes());
        assert!(decoder.is_complete());
        assert_eq!(decoder.finish().unwrap().len(), 1);
    }

    #[test]
    fn test_prose_with_brackets_before_array() {
        let text = format!("Here are [1] questions:\n{}", array_json(1));
        let questions = decode_all(text.as_bytes()).unwrap();
        assert_eq!(questions.len(), 1);

        let text = format!("Sure [see below] [ note ]:\n[[ {}", &array_json(2)[1..]);
        let mut decoder = ArrayDecoder::new();
        for chunk in text.as_bytes().chunks(5) {
            decoder.feed(chunk);
        }
        assert_eq!(decoder.rejected_count(), 0);
        assert_eq!(decoder.finish().unwrap().len(), 2);
    }

    #[test]
    fn test_unexpected_separator_fails() {
        let mut decoder = ArrayDecoder::new();
        decoder.feed(br#"[{"question":"Q","options":["a","b","c","d"],"answer":"A"} x"#);
        assert_eq!(decoder.state(), DecoderState::Failed);
        assert!(matches!(
            decoder.finish().unwrap_err(),
            DecodeError::Unexpected { found: 'x', .. }
        ));
    }

    #[test]
    fn test_scalar_element_is_rejected() {
        let mut decoder = ArrayDecoder::new();
        let text = format!("[{}, 42, true]", question_json(0));
        let events = decoder.feed(text.as_bytes());
        assert_eq!(events.len(), 3);
        assert_eq!(decoder.rejected_count(), 2);
        assert!(decoder.is_complete());
        match decoder.finish().unwrap_err() {
            DecodeError::Invalid(e) => {
                assert_eq!(e.index, Some(1));
                assert_eq!(e.field, "element");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_array_fails_validation() {
        assert!(matches!(
            decode_all(b"[ ]").unwrap_err(),
            DecodeError::Invalid(_)
        ));
    }
}
