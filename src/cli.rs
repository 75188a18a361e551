//! 命令行参数

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pdf-quiz", about = "Turn a PDF into a multiple choice quiz", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the quiz generation service
    Serve(Serve),
    /// Generate a quiz from a PDF using a running service
    Generate(Generate),
}

#[derive(Debug, Args)]
pub struct Serve {
    /// Path to config.json (defaults to the file next to the executable)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to listen on, overrides the config file
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Debug, Args)]
pub struct Generate {
    /// The PDF to build the quiz from
    pub file: PathBuf,

    #[arg(long, default_value = "normal", help = "easy, normal or hard")]
    pub difficulty: String,

    #[arg(long, default_value = "english", help = "english, arabic, spanish, french, german or chinese")]
    pub language: String,

    #[arg(long, env = "QUIZ_SERVER", default_value = "http://127.0.0.1:8765")]
    pub server: String,

    /// Upper bound for the whole request in seconds
    #[arg(long, default_value_t = 330)]
    pub timeout_secs: u64,

    /// Answer the questions in the terminal after generation
    #[arg(long)]
    pub interactive: bool,
}
