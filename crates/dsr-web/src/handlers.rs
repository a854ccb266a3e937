//! 通用HTTP处理器与辅助类型

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;

/// 列表每页条数
pub const PER_PAGE: i64 = 20;

/// 分页参数，页码从1开始
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
}

impl PageParams {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }
}

/// 操作结果消息
pub fn message(text: impl Into<String>) -> Json<Value> {
    Json(json!({ "message": text.into() }))
}

/// 带新建记录ID的结果消息
pub fn created(id: i64, text: impl Into<String>) -> Json<Value> {
    Json(json!({ "id": id, "message": text.into() }))
}

/// 空字符串视为未填写
pub fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "DSR Web API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "auth": "/auth/login",
            "api": "/api/v1"
        }
    }))
}

/// 健康检查处理器
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.pool.health_check().await {
        Ok(()) => "ok".to_string(),
        Err(e) => {
            tracing::warn!("Database health check failed: {}", e);
            "unavailable".to_string()
        }
    };
    Json(json!({
        "status": if database == "ok" { "healthy" } else { "degraded" },
        "database": database,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
