//! SSE 行缓冲
//!
//! 按字节缓冲，整行到齐后再做 UTF-8 解码，避免多字节字符被网络分块截断。

/// SSE 数据行缓冲区
#[derive(Debug, Default)]
pub struct SseBuffer {
    buffer: Vec<u8>,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// 取出下一条 `data:` 负载；缓冲区中没有完整行时返回 None
    pub fn next_data(&mut self) -> Option<String> {
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                return Some(data.trim_start().to_string());
            }
            // event:/id:/注释行忽略
        }
        None
    }
}
