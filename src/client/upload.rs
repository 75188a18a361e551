//! 上传前的文件校验与编码

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;

use crate::models::UploadedFile;

/// 单个文件大小上限
pub const MAX_FILE_BYTES: u64 = 20 * 1024 * 1024;

const PDF_MIME: &str = "application/pdf";

/// 文件校验错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("{0} is not a PDF file")]
    NotPdf(String),

    #[error("{0} is larger than 20MB")]
    TooLarge(String),
}

/// 校验单个文件的类型和大小
pub fn validate_file(name: &str, mime_type: &str, size: u64) -> Result<(), UploadError> {
    if mime_type != PDF_MIME {
        return Err(UploadError::NotPdf(name.to_string()));
    }
    if size > MAX_FILE_BYTES {
        return Err(UploadError::TooLarge(name.to_string()));
    }
    Ok(())
}

/// 逐个校验，一个文件被拒绝不影响其他文件
pub fn select_files(files: Vec<SelectedFile>) -> (Vec<SelectedFile>, Vec<UploadError>) {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for file in files {
        match validate_file(&file.name, &file.mime_type, file.bytes.len() as u64) {
            Ok(()) => accepted.push(file),
            Err(e) => rejected.push(e),
        }
    }
    (accepted, rejected)
}

/// 用户选中的文件
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// 从磁盘读取；类型按扩展名判断
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, mime_from_extension(path), bytes))
    }

    /// 编码为 data URL 上传
    pub fn encode(&self) -> UploadedFile {
        UploadedFile {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            data: format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes)),
        }
    }
}

fn mime_from_extension(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("pdf") => PDF_MIME,
        _ => "application/octet-stream",
    }
}

/// 人类可读的文件大小
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

/// 由文件名得到测验标题
pub fn title_from_file_name(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let title = stem.replace(['_', '-'], " ");
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        "Quiz".to_string()
    } else {
        title
    }
}
