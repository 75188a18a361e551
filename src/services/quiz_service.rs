//! 测验生成服务
//!
//! 校验上传请求得到生成计划，再在后台任务中调用模型并把输出流式转发给客户端。

use axum::body::Bytes;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, info_span, warn, Instrument};

use crate::error::{AppError, AppResult};
use crate::llm::{ChatBackend, ChatOptions, FileAttachment};
use crate::models::{GenerateQuizRequest, UploadedFile};
use crate::quiz::{question_set_schema, ArrayDecoder, Difficulty, Language};
use crate::utils::{RequestInfo, RequestLogger, ResponseStats};

use super::prompt_service::PromptService;
use super::stream_relay::{relay, RelayError, StreamWriter};

/// 生成失败时返回给客户端的消息，细节只写日志
pub const QUIZ_FAILED_MESSAGE: &str =
    "Failed to generate quiz. Please try again or contact support.";

const PDF_MIME: &str = "application/pdf";

/// 响应体缓冲的文本块数量
const RELAY_BUFFER: usize = 64;

/// 一次生成的全部输入
#[derive(Debug, Clone)]
pub struct GenerationPlan {
    pub request_id: String,
    /// base64 编码的 PDF
    pub file: FileAttachment,
    /// 解码后的字节数
    pub file_bytes: usize,
    pub difficulty: Difficulty,
    pub language: Language,
    /// 要求模型生成的题目数量
    pub question_count: u32,
}

impl GenerationPlan {
    /// 校验请求并确定题目数量
    pub fn from_request(request: GenerateQuizRequest, max_file_bytes: usize) -> AppResult<Self> {
        Self::from_request_with_rng(request, max_file_bytes, &mut rand::thread_rng())
    }

    pub fn from_request_with_rng<R: Rng + ?Sized>(
        request: GenerateQuizRequest,
        max_file_bytes: usize,
        rng: &mut R,
    ) -> AppResult<Self> {
        let difficulty = request.difficulty();
        let language = request.language();

        // 多个文件时只使用第一个
        let upload = request
            .files
            .into_iter()
            .next()
            .ok_or_else(|| AppError::BadRequest("No file uploaded".to_string()))?;
        let (data, file_bytes) = check_upload(&upload, max_file_bytes)?;

        Ok(Self {
            request_id: RequestLogger::generate_request_id(),
            file: FileAttachment {
                name: upload.name,
                mime_type: PDF_MIME.to_string(),
                data,
            },
            file_bytes,
            difficulty,
            language,
            question_count: difficulty.pick_question_count(rng),
        })
    }

    pub fn temperature(&self) -> f64 {
        self.difficulty.temperature()
    }
}

/// 检查文件类型与大小，返回纯 base64 数据和解码后的字节数
fn check_upload(file: &UploadedFile, max_file_bytes: usize) -> AppResult<(String, usize)> {
    let not_pdf = || AppError::BadRequest(format!("{} is not a PDF file", file.name));

    if !file.mime_type.is_empty() && file.mime_type != PDF_MIME {
        return Err(not_pdf());
    }

    let url = file.data_url();
    if url.mime_type.is_some_and(|mime| mime != PDF_MIME) {
        return Err(not_pdf());
    }
    if !url.is_base64 {
        return Err(AppError::BadRequest(format!(
            "{} must be base64 encoded",
            file.name
        )));
    }

    let decoded = STANDARD.decode(url.payload).map_err(|e| {
        AppError::BadRequest(format!("{} is not valid base64: {}", file.name, e))
    })?;
    if decoded.is_empty() {
        return Err(AppError::BadRequest(format!("{} is empty", file.name)));
    }
    if decoded.len() > max_file_bytes {
        return Err(AppError::BadRequest(format!(
            "{} is larger than {}MB",
            file.name,
            max_file_bytes / (1024 * 1024)
        )));
    }

    Ok((url.payload.to_string(), decoded.len()))
}

/// 测验生成器
#[derive(Clone)]
pub struct QuizGenerator {
    backend: Arc<dyn ChatBackend>,
    prompts: PromptService,
    max_duration: Duration,
    max_tokens: Option<u32>,
    logger: Option<Arc<RequestLogger>>,
}

impl QuizGenerator {
    pub fn new(backend: Arc<dyn ChatBackend>, max_duration: Duration) -> Self {
        Self {
            backend,
            prompts: PromptService::new(),
            max_duration,
            max_tokens: None,
            logger: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_request_logger(mut self, logger: Arc<RequestLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    /// 启动生成，返回响应体流
    ///
    /// 后台任务结束（正常完成、出错或客户端断开）时流随之结束。
    pub fn start(&self, plan: GenerationPlan) -> ReceiverStream<Bytes> {
        let (writer, body) = StreamWriter::channel(RELAY_BUFFER);
        let generator = self.clone();
        let span = info_span!("generate_quiz", request_id = %plan.request_id);
        tokio::spawn(
            async move {
                generator.run(plan, writer).await;
            }
            .instrument(span),
        );
        body
    }

    async fn run(self, plan: GenerationPlan, mut writer: StreamWriter) {
        let start_time = Instant::now();
        info!(
            "Generating quiz: request_id={}, file={}, bytes={}, difficulty={}, language={}, questions={}",
            plan.request_id,
            plan.file.name,
            plan.file_bytes,
            plan.difficulty,
            plan.language.display_name(),
            plan.question_count
        );

        let log_entry = self.logger.as_ref().map(|logger| {
            logger.log_request(RequestInfo {
                request_id: &plan.request_id,
                model: self.backend.model(),
                file_name: &plan.file.name,
                file_bytes: plan.file_bytes,
                difficulty: plan.difficulty.as_str(),
                language: plan.language.code(),
                question_count: plan.question_count,
                temperature: plan.temperature(),
                timeout: self.max_duration.as_secs(),
            })
        });

        let messages = self.prompts.build_quiz_messages(&plan);
        let options = ChatOptions {
            temperature: Some(plan.temperature()),
            max_tokens: self.max_tokens,
            response_schema: Some(question_set_schema()),
        };
        let stream = self.backend.stream_chat(messages, options);

        let mut decoder = ArrayDecoder::new();
        let relayed = tokio::time::timeout(
            self.max_duration,
            relay(stream, &mut writer, &mut decoder, &plan.request_id),
        )
        .await
        .unwrap_or(Err(RelayError::Timeout(self.max_duration)));
        let outcome = relayed.and_then(|()| decoder.finish().map_err(RelayError::from));

        match outcome {
            Ok(questions) => {
                info!(
                    "Quiz generated: request_id={}, questions={}, chunks={}, elapsed={:?}",
                    plan.request_id,
                    questions.len(),
                    writer.chunks_written(),
                    start_time.elapsed()
                );
                if let (Some(logger), Some(entry)) = (&self.logger, log_entry) {
                    logger.log_success(
                        entry,
                        start_time,
                        ResponseStats {
                            response_length: writer.bytes_written(),
                            chunk_count: writer.chunks_written(),
                            questions_generated: questions.len(),
                            preview: writer.preview().to_string(),
                        },
                    );
                }
            }
            Err(e) => {
                if matches!(e, RelayError::ClientDisconnected) {
                    info!("Client disconnected, generation aborted: request_id={}", plan.request_id);
                } else {
                    error!(
                        "Quiz generation failed: request_id={}, error={}",
                        plan.request_id, e
                    );
                    if writer.write_error(QUIZ_FAILED_MESSAGE).await.is_err() {
                        warn!(
                            "Client gone before error could be sent: request_id={}",
                            plan.request_id
                        );
                    }
                }
                if let (Some(logger), Some(entry)) = (&self.logger, log_entry) {
                    logger.log_error(entry, start_time, e.kind(), &e.to_string());
                }
            }
        }

        writer.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UploadedFile;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn request(name: &str, mime: &str, data: &str) -> GenerateQuizRequest {
        GenerateQuizRequest {
            files: vec![UploadedFile {
                name: name.to_string(),
                mime_type: mime.to_string(),
                data: data.to_string(),
            }],
            difficulty: Some(serde_json::json!("easy")),
            language: Some(serde_json::json!("french")),
        }
    }

    fn pdf_data_url(bytes: &[u8]) -> String {
        format!("data:application/pdf;base64,{}", STANDARD.encode(bytes))
    }

    #[test]
    fn test_plan_from_valid_request() {
        let mut rng = StdRng::seed_from_u64(7);
        let req = request("notes.pdf", "application/pdf", &pdf_data_url(b"%PDF-1.4 body"));
        let plan = GenerationPlan::from_request_with_rng(req, 1024, &mut rng).unwrap();

        assert_eq!(plan.file.name, "notes.pdf");
        assert_eq!(plan.file.mime_type, "application/pdf");
        assert_eq!(plan.file.data, STANDARD.encode(b"%PDF-1.4 body"));
        assert_eq!(plan.file_bytes, 13);
        assert_eq!(plan.difficulty, Difficulty::Easy);
        assert_eq!(plan.language, Language::French);
        assert!((5..=10).contains(&plan.question_count));
        assert_eq!(plan.temperature(), 0.3);
        assert_eq!(plan.request_id.len(), 8);
    }

    #[test]
    fn test_plan_accepts_raw_base64() {
        let req = request("notes.pdf", "", &STANDARD.encode(b"%PDF"));
        let plan = GenerationPlan::from_request(req, 1024).unwrap();
        assert_eq!(plan.file_bytes, 4);
    }

    #[test]
    fn test_plan_rejects_non_pdf() {
        let req = request("photo.png", "image/png", &pdf_data_url(b"png"));
        let err = GenerationPlan::from_request(req, 1024).unwrap_err();
        assert_eq!(err.to_string(), "photo.png is not a PDF file");

        let req = request("sneaky.pdf", "application/pdf", "data:image/png;base64,cG5n");
        let err = GenerationPlan::from_request(req, 1024).unwrap_err();
        assert_eq!(err.to_string(), "sneaky.pdf is not a PDF file");
    }

    #[test]
    fn test_plan_rejects_oversized_file() {
        let max = 20 * 1024 * 1024;
        let big = vec![0u8; max + 1];
        let req = request("big.pdf", "application/pdf", &pdf_data_url(&big));
        let err = GenerationPlan::from_request(req, max).unwrap_err();
        assert_eq!(err.to_string(), "big.pdf is larger than 20MB");
    }

    #[test]
    fn test_plan_rejects_missing_or_broken_file() {
        let req = GenerateQuizRequest::default();
        assert!(GenerationPlan::from_request(req, 1024).is_err());

        let req = request("a.pdf", "application/pdf", "data:application/pdf;base64,@@@");
        assert!(GenerationPlan::from_request(req, 1024)
            .unwrap_err()
            .to_string()
            .contains("not valid base64"));

        let req = request("a.pdf", "application/pdf", "data:application/pdf;base64,");
        assert_eq!(
            GenerationPlan::from_request(req, 1024).unwrap_err().to_string(),
            "a.pdf is empty"
        );
    }
}
