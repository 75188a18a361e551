//! 难度与语言策略
//!
//! 纯函数映射：难度 → 题目数量范围 / 采样温度 / 出题风格，语言代码 → 显示名称。
//! 无法识别的输入一律回落到默认值（`normal` / `english`），不报错。

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 难度等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Normal, Difficulty::Hard];

    /// 宽松解析，缺省或无法识别时返回 `Normal`
    pub fn resolve(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("easy") => Difficulty::Easy,
            Some("hard") => Difficulty::Hard,
            _ => Difficulty::Normal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Normal => "normal",
            Difficulty::Hard => "hard",
        }
    }

    /// 允许的题目数量范围（闭区间）
    pub fn question_count_range(self) -> (u32, u32) {
        match self {
            Difficulty::Easy => (5, 10),
            Difficulty::Normal => (10, 20),
            Difficulty::Hard => (20, 30),
        }
    }

    /// 在范围内均匀随机选一个目标题数
    pub fn pick_question_count<R: Rng + ?Sized>(self, rng: &mut R) -> u32 {
        let (min, max) = self.question_count_range();
        rng.gen_range(min..=max)
    }

    /// 进度显示用的预期题数（范围中点）
    pub fn expected_count(self) -> u32 {
        let (min, max) = self.question_count_range();
        (min + max) / 2
    }

    /// 采样温度，难度越高越发散
    pub fn temperature(self) -> f64 {
        match self {
            Difficulty::Easy => 0.3,
            Difficulty::Normal => 0.5,
            Difficulty::Hard => 0.7,
        }
    }

    /// 出题风格说明，写进系统提示词
    pub fn style_guidance(self) -> &'static str {
        match self {
            Difficulty::Easy => "Ask straightforward recall questions about facts stated literally in the document. Distractors should be clearly wrong to a reader who has read the text.",
            Difficulty::Normal => "Mix recall questions with questions that require understanding how the key ideas relate. Distractors should be plausible.",
            Difficulty::Hard => "Ask questions that require synthesizing several concepts from different parts of the document, applying them to new situations, or reasoning about implications. Distractors should be subtle and plausible.",
        }
    }

    /// 根据题目数量推断难度（用于测验徽标）
    pub fn infer_from_count(count: usize) -> Self {
        if count <= 10 {
            Difficulty::Easy
        } else if count <= 20 {
            Difficulty::Normal
        } else {
            Difficulty::Hard
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 输出语言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Arabic,
    Spanish,
    French,
    German,
    Chinese,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::English,
        Language::Arabic,
        Language::Spanish,
        Language::French,
        Language::German,
        Language::Chinese,
    ];

    /// 宽松解析，缺省或无法识别时返回 `English`
    pub fn resolve(code: Option<&str>) -> Self {
        let code = code.map(|c| c.trim().to_ascii_lowercase());
        Self::ALL
            .into_iter()
            .find(|lang| Some(lang.code()) == code.as_deref())
            .unwrap_or_default()
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::English => "english",
            Language::Arabic => "arabic",
            Language::Spanish => "spanish",
            Language::French => "french",
            Language::German => "german",
            Language::Chinese => "chinese",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Arabic => "Arabic",
            Language::Spanish => "Spanish",
            Language::French => "French",
            Language::German => "German",
            Language::Chinese => "Chinese",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// 难度 → 题目数量范围
pub fn question_count_range(difficulty: Difficulty) -> (u32, u32) {
    difficulty.question_count_range()
}

/// 语言代码 → 显示名称
pub fn resolve_language_name(code: Option<&str>) -> &'static str {
    Language::resolve(code).display_name()
}
