//! 错误定义模块

use thiserror::Error;

/// 监测报告系统统一错误类型
///
/// 显示给最终用户的消息使用越南语，日志与内部诊断保持英文。
#[derive(Error, Debug)]
pub enum DsrError {
    #[error("Lỗi cấu hình: {0}")]
    Config(String),

    #[error("Lỗi cơ sở dữ liệu: {0}")]
    Database(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Permission(String),

    #[error("Không tìm thấy: {0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Lỗi import: {0}")]
    Import(String),

    #[error("Lỗi tạo báo cáo: {0}")]
    Report(String),

    #[error("Lỗi xử lý file Excel: {0}")]
    Spreadsheet(String),

    #[error("Lỗi IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lỗi tuần tự hoá: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lỗi hệ thống: {0}")]
    Internal(String),
}

impl DsrError {
    /// 简短的错误代码，供API响应使用
    pub fn code(&self) -> &'static str {
        match self {
            DsrError::Config(_) => "config_error",
            DsrError::Database(_) => "database_error",
            DsrError::Validation(_) => "validation_error",
            DsrError::Permission(_) => "permission_denied",
            DsrError::NotFound(_) => "not_found",
            DsrError::Conflict(_) => "conflict",
            DsrError::Import(_) => "import_error",
            DsrError::Report(_) => "report_error",
            DsrError::Spreadsheet(_) => "spreadsheet_error",
            DsrError::Io(_) => "io_error",
            DsrError::Serialization(_) => "serialization_error",
            DsrError::Internal(_) => "internal_error",
        }
    }
}

// 唯一约束与外键冲突单独映射，其余数据库错误统一归为Database
#[cfg(feature = "database")]
impl From<sqlx::Error> for DsrError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some("23505") => {
                    return DsrError::Conflict("Dữ liệu đã tồn tại (trùng lặp).".to_string())
                }
                Some("23503") => {
                    return DsrError::Conflict(
                        "Dữ liệu đang được tham chiếu hoặc tham chiếu không hợp lệ.".to_string(),
                    )
                }
                _ => {}
            }
        }
        if let sqlx::Error::RowNotFound = err {
            return DsrError::NotFound("bản ghi".to_string());
        }
        DsrError::Database(err.to_string())
    }
}

/// 统一结果类型
pub type Result<T> = std::result::Result<T, DsrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DsrError::Validation("Tên đơn vị không được để trống.".to_string());
        assert_eq!(err.to_string(), "Tên đơn vị không được để trống.");
        assert_eq!(err.code(), "validation_error");

        let err = DsrError::NotFound("ca bệnh 12".to_string());
        assert_eq!(err.to_string(), "Không tìm thấy: ca bệnh 12");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err: DsrError = io.into();
        assert_eq!(err.code(), "io_error");
    }
}
