//! PDF Quiz - Rust Backend
//!
//! 使用 axum 框架构建的测验生成服务：上传 PDF，调用大模型流式生成选择题，
//! 并提供消费该流的命令行客户端。

use anyhow::{bail, Context};
use axum::Router;
use clap::Parser;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::{Cli, Commands, Generate, Serve};
use pdf_quiz::api::create_api_routes;
use pdf_quiz::client::{
    format_file_size, select_files, ClientError, ConsumerState, HttpTransport, Progress,
    QuizSession, QuizTransport, SelectedFile,
};
use pdf_quiz::config::AppConfig;
use pdf_quiz::llm::{ChatBackend, LlmClient};
use pdf_quiz::quiz::{
    question_count_range, resolve_language_name, AnswerLabel, Difficulty, Language, Question,
    QuizAttempt,
};
use pdf_quiz::services::QuizGenerator;
use pdf_quiz::state::create_shared_state;
use pdf_quiz::utils::RequestLogger;

type Input = Lines<BufReader<Stdin>>;

/// 在 Windows 上设置控制台代码页为 UTF-8
#[cfg(windows)]
fn setup_console_encoding() {
    unsafe {
        // 设置控制台输出代码页为 UTF-8 (65001)
        extern "system" {
            fn SetConsoleOutputCP(code_page: u32) -> i32;
            fn SetConsoleCP(code_page: u32) -> i32;
        }
        SetConsoleOutputCP(65001);
        SetConsoleCP(65001);
    }
}

#[cfg(not(windows))]
fn setup_console_encoding() {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 设置控制台编码
    setup_console_encoding();

    dotenv::dotenv().ok();

    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_quiz=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match Cli::parse().command {
        Commands::Serve(args) => serve(args).await,
        Commands::Generate(args) => generate(args).await,
    }
}

/// 启动 HTTP 服务
async fn serve(args: Serve) -> anyhow::Result<()> {
    info!("Starting PDF quiz service...");

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    // 模型客户端的超时略长于生成上限，由生成上限负责报错
    let client = LlmClient::new(
        config.api_key.clone(),
        config.effective_base_url(),
        config.model.clone(),
        config.max_duration() + Duration::from_secs(30),
    )
    .context("failed to create model client, set QUIZ_API_KEY or GOOGLE_GENERATIVE_AI_API_KEY")?;
    info!(
        "Model: {} ({}), base_url={}",
        client.model(),
        client.api_format().as_str(),
        client.base_url()
    );

    let mut generator = QuizGenerator::new(Arc::new(client), config.max_duration())
        .with_max_tokens(config.max_tokens);
    if let Some(dir) = &config.request_log_dir {
        info!("Request log directory: {}", dir.display());
        generator = generator.with_request_logger(Arc::new(RequestLogger::new(dir)));
    }

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.bind_addr))?;

    // 创建共享状态
    let state = create_shared_state(config, generator);

    // 配置 CORS（允许所有来源）
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 构建路由
    let app = Router::new()
        .merge(create_api_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    info!("Server listening on: {}", addr);

    // 启动服务器
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// 命令行生成测验
///
/// 交互模式下答完一轮后可以重新生成（`r`）或清空并换一个文件（`c`）。
async fn generate(args: Generate) -> anyhow::Result<()> {
    let difficulty = Difficulty::resolve(Some(&args.difficulty));
    let language = Language::resolve(Some(&args.language));
    let (min, max) = question_count_range(difficulty);

    let transport = HttpTransport::new(&args.server, Duration::from_secs(args.timeout_secs))?;
    let mut session = QuizSession::new(transport);
    let live = session.shared_state();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut file = load_file(&args.file).await?;
    loop {
        println!(
            "Generating a {} quiz ({}-{} questions) in {} from {} ({})",
            difficulty,
            min,
            max,
            resolve_language_name(Some(&args.language)),
            file.name,
            format_file_size(file.bytes.len() as u64)
        );
        let result = session
            .generate(&file, difficulty, language, |progress| {
                report_progress(&live, progress)
            })
            .await;
        let mut questions = finish(&session, result)?;

        loop {
            println!(
                "\n{} ({} questions, {})",
                session.title(),
                questions.len(),
                Difficulty::infer_from_count(questions.len())
            );

            if !args.interactive {
                for (i, question) in questions.iter().enumerate() {
                    print_question(i, question);
                    println!("   Answer: {}", question.answer);
                }
                return Ok(());
            }

            take_quiz(questions, &mut lines).await?;

            println!("\nr: regenerate, c: clear and pick another PDF, Enter: quit");
            let Some(line) = lines.next_line().await? else {
                return Ok(());
            };
            match line.trim().to_ascii_lowercase().as_str() {
                "r" => {
                    let result = session
                        .regenerate(|progress| report_progress(&live, progress))
                        .await;
                    questions = finish(&session, result)?;
                }
                "c" => break,
                _ => return Ok(()),
            }
        }

        session.clear();
        println!("PDF path:");
        let Some(path) = lines.next_line().await? else {
            return Ok(());
        };
        file = load_file(Path::new(path.trim())).await?;
    }
}

/// 读取文件并做上传前校验
async fn load_file(path: &Path) -> anyhow::Result<SelectedFile> {
    let file = SelectedFile::from_path(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let (mut accepted, rejected) = select_files(vec![file]);
    for error in &rejected {
        warn!("{}", error);
    }
    match accepted.pop() {
        Some(file) => Ok(file),
        None => bail!("no PDF to upload"),
    }
}

/// 打印进度和刚就绪的题目
fn report_progress(live: &RwLock<ConsumerState>, progress: Progress) {
    let state = live.read();
    match state.questions.last() {
        Some(question) => println!(
            "{} ({}%): {}",
            progress,
            progress.percent(),
            question.question
        ),
        None => println!("{} ({}%)", progress, progress.percent()),
    }
}

/// 失败时以会话记录的错误文本退出
fn finish<T: QuizTransport>(
    session: &QuizSession<T>,
    result: Result<Vec<Question>, ClientError>,
) -> anyhow::Result<Vec<Question>> {
    match result {
        Ok(questions) => Ok(questions),
        Err(e) => {
            let message = session.state().error.unwrap_or_else(|| e.user_message());
            bail!("{}", message)
        }
    }
}

fn print_question(index: usize, question: &Question) {
    println!("\n{}. {}", index + 1, question.question);
    for (label, option) in AnswerLabel::ALL.iter().zip(&question.options) {
        println!("   {}. {}", label, option);
    }
}

/// 在终端答题：输入 A-D 作答，`p` 返回上一题，最后一题作答后提交
async fn take_quiz(questions: Vec<Question>, lines: &mut Input) -> anyhow::Result<()> {
    let mut attempt = QuizAttempt::new(questions);

    while !attempt.is_submitted() {
        let index = attempt.current_index();
        let Some(question) = attempt.current_question() else {
            break;
        };
        print_question(index, question);
        if let Some(answer) = attempt.answer_for(index) {
            println!("   (current answer: {})", answer);
        }

        let Some(line) = lines.next_line().await? else {
            attempt.submit();
            break;
        };
        let input = line.trim().to_ascii_uppercase();
        if input == "P" {
            attempt.previous();
        } else if let Some(label) = AnswerLabel::parse(&input) {
            attempt.select(label);
            attempt.next();
        } else {
            println!("   Please answer with A, B, C or D (or p for the previous question)");
        }
    }

    let total = attempt.questions().len();
    let score = attempt.score().unwrap_or(0);
    println!(
        "\nScore: {} / {} ({} quiz)",
        score,
        total,
        attempt.difficulty()
    );
    for (i, question) in attempt.questions().iter().enumerate() {
        let given = attempt
            .answer_for(i)
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string());
        let correct = attempt
            .answer_for(i)
            .is_some_and(|answer| question.is_correct(answer));
        println!(
            "{} {}. {} (yours: {}, correct: {})",
            if correct { "✓" } else { "✗" },
            i + 1,
            question.question,
            given,
            question.answer
        );
    }
    Ok(())
}
