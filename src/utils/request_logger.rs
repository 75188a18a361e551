//! 测验生成日志记录器
//!
//! 把每次生成请求（参数、耗时、结果）记录到 JSONL 文件，便于调试和分析。

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

use crate::llm::truncate;

/// 请求日志条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// 请求 ID
    pub request_id: String,
    /// 时间戳
    pub timestamp: DateTime<Utc>,
    /// 模型名称
    pub model: String,
    /// 上传的文件名
    pub file_name: String,
    /// 解码后的文件大小（字节）
    pub file_bytes: usize,
    pub difficulty: String,
    pub language: String,
    /// 要求的题目数量
    pub question_count: u32,
    /// 温度参数
    pub temperature: f64,
    /// 超时时间（秒）
    pub timeout: u64,
    /// 状态：pending / success / error
    pub status: String,
    /// 持续时间（毫秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// 转发给客户端的字节数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_length: Option<usize>,
    /// chunk 数量
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    /// 最终校验通过的题目数
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questions_generated: Option<usize>,
    /// 响应预览
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_preview: Option<String>,
    /// 错误类型
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// 错误信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// 请求开始时已知的信息
#[derive(Debug, Clone)]
pub struct RequestInfo<'a> {
    pub request_id: &'a str,
    pub model: &'a str,
    pub file_name: &'a str,
    pub file_bytes: usize,
    pub difficulty: &'a str,
    pub language: &'a str,
    pub question_count: u32,
    pub temperature: f64,
    pub timeout: u64,
}

/// 成功结束时的统计
#[derive(Debug, Clone, Default)]
pub struct ResponseStats {
    pub response_length: usize,
    pub chunk_count: usize,
    pub questions_generated: usize,
    pub preview: String,
}

/// 请求日志记录器
pub struct RequestLogger {
    log_path: PathBuf,
    max_entries: usize,
    file: Mutex<Option<File>>,
}

impl RequestLogger {
    /// 创建新的日志记录器，日志写入 `log_dir/quiz_requests.jsonl`
    pub fn new(log_dir: &Path) -> Self {
        // 确保目录存在
        let _ = fs::create_dir_all(log_dir);

        Self {
            log_path: log_dir.join("quiz_requests.jsonl"),
            max_entries: 1000,
            file: Mutex::new(None),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// 生成请求 ID
    pub fn generate_request_id() -> String {
        Uuid::new_v4().to_string()[..8].to_string()
    }

    /// 记录请求开始
    pub fn log_request(&self, info: RequestInfo<'_>) -> LogEntry {
        LogEntry {
            request_id: info.request_id.to_string(),
            timestamp: Utc::now(),
            model: info.model.to_string(),
            file_name: info.file_name.to_string(),
            file_bytes: info.file_bytes,
            difficulty: info.difficulty.to_string(),
            language: info.language.to_string(),
            question_count: info.question_count,
            temperature: info.temperature,
            timeout: info.timeout,
            status: "pending".to_string(),
            duration_ms: None,
            response_length: None,
            chunk_count: None,
            questions_generated: None,
            response_preview: None,
            error_type: None,
            error_message: None,
        }
    }

    /// 记录成功
    pub fn log_success(&self, mut entry: LogEntry, start_time: Instant, stats: ResponseStats) {
        entry.status = "success".to_string();
        entry.duration_ms = Some(start_time.elapsed().as_millis() as u64);
        entry.response_length = Some(stats.response_length);
        entry.chunk_count = Some(stats.chunk_count);
        entry.questions_generated = Some(stats.questions_generated);
        entry.response_preview = Some(truncate(&stats.preview, 300).to_string());
        self.write_entry(&entry);
    }

    /// 记录错误
    pub fn log_error(
        &self,
        mut entry: LogEntry,
        start_time: Instant,
        error_type: &str,
        error_message: &str,
    ) {
        entry.status = "error".to_string();
        entry.duration_ms = Some(start_time.elapsed().as_millis() as u64);
        entry.error_type = Some(error_type.to_string());
        entry.error_message = Some(truncate(error_message, 500).to_string());
        self.write_entry(&entry);
    }

    /// 写入日志条目
    fn write_entry(&self, entry: &LogEntry) {
        let mut file_guard = self.file.lock();

        // 懒加载文件
        if file_guard.is_none() {
            if let Ok(f) = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_path)
            {
                *file_guard = Some(f);
            }
        }

        if let Some(file) = file_guard.as_mut() {
            if let Ok(json) = serde_json::to_string(entry) {
                let _ = writeln!(file, "{}", json);
                let _ = file.flush();
            }
        }

        self.cleanup_if_needed(&mut file_guard);
    }

    /// 超过上限时只保留最近的条目
    fn cleanup_if_needed(&self, file_guard: &mut Option<File>) {
        let Ok(file) = File::open(&self.log_path) else {
            return;
        };
        let lines: Vec<String> = BufReader::new(file).lines().map_while(Result::ok).collect();
        if lines.len() <= self.max_entries {
            return;
        }

        let keep_lines = &lines[lines.len() - self.max_entries..];
        if let Ok(mut file) = File::create(&self.log_path) {
            for line in keep_lines {
                let _ = writeln!(file, "{}", line);
            }
        }
        // 文件被重建，下次写入重新打开
        *file_guard = None;
    }
}
