//! API错误响应

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dsr_core::DsrError;
use serde_json::json;
use tracing::error;

/// 处理器的错误类型
///
/// 领域错误原样包装，认证失败单独成一类以返回401。
#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    Domain(DsrError),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Domain(err) => match err {
                DsrError::NotFound(_) => StatusCode::NOT_FOUND,
                DsrError::Validation(_) | DsrError::Import(_) => StatusCode::BAD_REQUEST,
                DsrError::Permission(_) => StatusCode::FORBIDDEN,
                DsrError::Conflict(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Domain(err) => err.code(),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Unauthorized(message) => message.clone(),
            ApiError::Domain(err) => err.to_string(),
        }
    }
}

impl From<DsrError> for ApiError {
    fn from(err: DsrError) -> Self {
        ApiError::Domain(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {:?}", self);
        }
        let body = json!({
            "error": self.code(),
            "message": self.message(),
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}
