//! 应用状态管理
//!
//! 定义在请求处理器之间共享的状态。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::QuizGenerator;

/// 应用共享状态
///
/// 配置在启动时确定，之后只读
pub struct AppState {
    pub config: AppConfig,
    pub generator: QuizGenerator,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(config: AppConfig, generator: QuizGenerator) -> Self {
        Self { config, generator }
    }
}

/// 创建可共享的应用状态
pub fn create_shared_state(config: AppConfig, generator: QuizGenerator) -> Arc<AppState> {
    Arc::new(AppState::new(config, generator))
}
