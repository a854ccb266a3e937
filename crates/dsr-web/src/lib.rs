//! # DSR Web API
//!
//! 基于 axum 的HTTP接口：登录认证、按角色与管辖范围的权限控制、行政单位与
//! 用户管理、病例与疫点管理、报告生成与下载、仪表盘以及病例导入。

pub mod admin;
pub mod auth;
pub mod cases;
pub mod error;
pub mod handlers;
pub mod import;
pub mod outbreaks;
pub mod policy;
pub mod reports;
pub mod server;
pub mod state;
pub mod store;

pub use auth::{hash_password, AuthService, Claims, CurrentUser};
pub use error::{ApiError, ApiResult};
pub use policy::{Action, Scope};
pub use server::{create_app, WebServer};
pub use state::{AppState, WebSettings};
pub use store::{ReportStore, StoredReport};
