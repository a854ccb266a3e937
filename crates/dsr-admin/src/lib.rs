//! # DSR管理模块
//!
//! 提供配置管理与日志初始化。

pub mod config;
pub mod logging;

pub use config::{
    AuthConfig, ConfigManager, ConfigValidator, DatabaseConfig, DsrConfig, ImportConfig, LoggingConfig,
    ReportsConfig, ServerConfig,
};
pub use logging::{init_logging, LogFormat};
