//! 应用配置管理
//!
//! 启动时从 `config.json` 加载配置，再用环境变量覆盖，之后作为不可变值
//! 传入各组件；运行期间没有全局可变配置。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AppError;
use crate::llm::{default_base_url, detect_api_format};

/// 默认配置文件路径：可执行文件同级目录下的 config.json
pub fn default_config_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.json")
}

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM API 密钥
    #[serde(default)]
    pub api_key: String,

    /// LLM API 基础 URL，留空则按模型选择提供方默认地址
    #[serde(default)]
    pub base_url: String,

    /// 模型名称
    #[serde(default = "default_model")]
    pub model: String,

    /// 最大输出 token 数
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// 单次生成的最长耗时（秒）
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,

    /// 上传文件大小上限（字节）
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,

    /// 监听地址
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// 请求日志目录，不设置则不记录
    #[serde(default)]
    pub request_log_dir: Option<PathBuf>,
}

fn default_model() -> String {
    "gemini-1.5-pro-latest".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_max_duration_secs() -> u64 {
    300
}

fn default_max_file_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_bind_addr() -> String {
    "127.0.0.1:8765".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            max_duration_secs: default_max_duration_secs(),
            max_file_bytes: default_max_file_bytes(),
            bind_addr: default_bind_addr(),
            request_log_dir: None,
        }
    }
}

impl AppConfig {
    /// 加载配置：文件（不存在则用默认值）+ 环境变量覆盖
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        let mut config = Self::from_file(&path)?.unwrap_or_default();
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// 从文件读取配置，文件不存在时返回 None
    fn from_file(path: &Path) -> Result<Option<Self>, AppError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("读取配置文件失败 {}: {}", path.display(), e))
        })?;
        let config = serde_json::from_str(&content).map_err(|e| {
            AppError::Config(format!("解析配置文件失败 {}: {}", path.display(), e))
        })?;
        Ok(Some(config))
    }

    /// 用环境变量覆盖配置
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("QUIZ_API_KEY").or_else(|| non_empty("GOOGLE_GENERATIVE_AI_API_KEY")) {
            self.api_key = key;
        }
        if let Some(base_url) = non_empty("QUIZ_BASE_URL") {
            self.base_url = base_url;
        }
        if let Some(model) = non_empty("QUIZ_MODEL") {
            self.model = model;
        }
        if let Some(bind) = non_empty("QUIZ_BIND") {
            self.bind_addr = bind;
        }
        if let Some(secs) = non_empty("QUIZ_MAX_DURATION_SECS").and_then(|v| v.parse().ok()) {
            self.max_duration_secs = secs;
        }
    }

    /// 实际使用的 base_url
    pub fn effective_base_url(&self) -> String {
        if self.base_url.trim().is_empty() {
            default_base_url(detect_api_format(&self.model)).to_string()
        } else {
            self.base_url.clone()
        }
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    /// 请求体上限：base64 膨胀 4/3，再留出 JSON 外壳的余量
    pub fn request_body_limit(&self) -> usize {
        self.max_file_bytes / 3 * 4 + 64 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.model, "gemini-1.5-pro-latest");
        assert_eq!(config.max_file_bytes, 20 * 1024 * 1024);
        assert_eq!(config.max_duration(), Duration::from_secs(300));
        assert_eq!(
            config.effective_base_url(),
            "https://generativelanguage.googleapis.com"
        );
        assert!(config.request_body_limit() > config.max_file_bytes);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GOOGLE_GENERATIVE_AI_API_KEY", "google-key"),
            ("QUIZ_MODEL", "gpt-4o"),
            ("QUIZ_BASE_URL", "  "),
            ("QUIZ_MAX_DURATION_SECS", "60"),
        ]);
        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api_key, "google-key");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.base_url, "");
        assert_eq!(config.max_duration_secs, 60);
        assert_eq!(config.effective_base_url(), "https://api.openai.com");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"api_key":"k","max_duration_secs":30}"#).unwrap();
        assert_eq!(config.api_key, "k");
        assert_eq!(config.max_duration_secs, 30);
        assert_eq!(config.bind_addr, "127.0.0.1:8765");
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("missing.json"))).unwrap();
        assert!(!config.model.is_empty());
    }
}
