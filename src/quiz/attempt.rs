//! 答题过程
//!
//! 在一套已就绪的题目上选择答案、前后翻题、提交计分和重置。

use super::policy::Difficulty;
use super::schema::{AnswerLabel, Question};

/// 一次答题
#[derive(Debug, Clone)]
pub struct QuizAttempt {
    questions: Vec<Question>,
    answers: Vec<Option<AnswerLabel>>,
    current: usize,
    score: Option<usize>,
}

impl QuizAttempt {
    pub fn new(questions: Vec<Question>) -> Self {
        let answers = vec![None; questions.len()];
        Self {
            questions,
            answers,
            current: 0,
            score: None,
        }
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    pub fn answer_for(&self, index: usize) -> Option<AnswerLabel> {
        self.answers.get(index).copied().flatten()
    }

    pub fn is_submitted(&self) -> bool {
        self.score.is_some()
    }

    pub fn score(&self) -> Option<usize> {
        self.score
    }

    /// 徽标上显示的难度，由题目数量推断
    pub fn difficulty(&self) -> Difficulty {
        Difficulty::infer_from_count(self.questions.len())
    }

    /// 为当前题选择答案，提交后忽略
    pub fn select(&mut self, label: AnswerLabel) {
        if self.is_submitted() {
            return;
        }
        if let Some(slot) = self.answers.get_mut(self.current) {
            *slot = Some(label);
        }
    }

    /// 下一题；已是最后一题时提交
    pub fn next(&mut self) {
        if self.current + 1 < self.questions.len() {
            self.current += 1;
        } else {
            self.submit();
        }
    }

    pub fn previous(&mut self) {
        self.current = self.current.saturating_sub(1);
    }

    /// 提交并计分，返回答对的题数
    pub fn submit(&mut self) -> usize {
        let correct = self
            .questions
            .iter()
            .zip(&self.answers)
            .filter(|(question, answer)| **answer == Some(question.answer))
            .count();
        self.score = Some(correct);
        correct
    }

    pub fn reset(&mut self) {
        self.answers = vec![None; self.questions.len()];
        self.current = 0;
        self.score = None;
    }
}
