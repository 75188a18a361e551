//! PDF Quiz
//!
//! 上传 PDF，调用大模型流式生成选择题。服务端见 [`api`] 与 [`services`]，
//! 消费该流的客户端见 [`client`]，题目校验、增量解码与答题计分见 [`quiz`]。

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod quiz;
pub mod services;
pub mod state;
pub mod utils;
