//! REST API 请求/响应模型

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::quiz::{Difficulty, Language};

/// `data:<mime>[;param]*,<payload>` 前缀
static DATA_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data:(?P<mime>[^;,]*)(?P<params>(?:;[^;,]*)*),").expect("valid data URL regex")
});

/// 上传的文件（浏览器 FileReader.readAsDataURL 的结果）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    #[serde(rename = "type", default)]
    pub mime_type: String,
    pub data: String,
}

/// 拆开后的 data URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl<'a> {
    /// data URL 声明的媒体类型，裸 base64 时为 None
    pub mime_type: Option<&'a str>,
    pub is_base64: bool,
    pub payload: &'a str,
}

impl UploadedFile {
    /// 拆分 data URL；没有 `data:` 前缀时整个字符串视为 base64
    pub fn data_url(&self) -> DataUrl<'_> {
        match DATA_URL_RE.captures(&self.data) {
            Some(caps) => {
                let prefix_len = caps.get(0).map(|m| m.end()).unwrap_or(0);
                let mime = caps.name("mime").map(|m| m.as_str()).filter(|m| !m.is_empty());
                let is_base64 = caps
                    .name("params")
                    .map(|p| p.as_str().split(';').any(|param| param.eq_ignore_ascii_case("base64")))
                    .unwrap_or(false);
                DataUrl {
                    mime_type: mime,
                    is_base64,
                    payload: &self.data[prefix_len..],
                }
            }
            None => DataUrl {
                mime_type: None,
                is_base64: true,
                payload: self.data.trim(),
            },
        }
    }
}

/// 生成测验请求
///
/// `difficulty` 和 `language` 按原始 JSON 接收，无法识别的值回落到默认值而不是报错
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateQuizRequest {
    #[serde(default)]
    pub files: Vec<UploadedFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Value>,
}

impl GenerateQuizRequest {
    pub fn new(file: UploadedFile, difficulty: Difficulty, language: Language) -> Self {
        Self {
            files: vec![file],
            difficulty: Some(Value::String(difficulty.as_str().to_string())),
            language: Some(Value::String(language.code().to_string())),
        }
    }

    pub fn difficulty(&self) -> Difficulty {
        Difficulty::resolve(self.difficulty.as_ref().and_then(Value::as_str))
    }

    pub fn language(&self) -> Language {
        Language::resolve(self.language.as_ref().and_then(Value::as_str))
    }
}

/// 终止错误信封
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    /// 序列化为 JSON 字符串
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// 在流文本末尾查找错误信封
    ///
    /// 信封总是流的最后一段内容，所以从后往前尝试，要求从该位置到结尾恰好是一个信封对象。
    pub fn find_trailing(text: &str) -> Option<Self> {
        let trimmed = text.trim_end();
        trimmed
            .rmatch_indices('{')
            .find_map(|(idx, _)| serde_json::from_str::<Self>(&trimmed[idx..]).ok())
    }
}

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
