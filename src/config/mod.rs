//! 配置模块

mod app_config;

pub use app_config::{default_config_path, AppConfig};
