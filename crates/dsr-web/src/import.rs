//! 病例Excel导入

use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Local;
use dsr_core::{DsrError, Result};
use dsr_import::Importer;
use tracing::{info, warn};

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::policy::Action;
use crate::state::AppState;

/// 上传表单中的文件字段名
pub const UPLOAD_FIELD: &str = "excel_file";

/// 只接受 .xlsx 文件
pub fn check_upload_name(file_name: Option<&str>) -> Result<()> {
    match file_name.map(str::trim) {
        None | Some("") => Err(DsrError::Validation("Không có file nào được chọn.".to_string())),
        Some(name) if name.to_lowercase().ends_with(".xlsx") => Ok(()),
        Some(_) => Err(DsrError::Validation("Chỉ chấp nhận file định dạng .xlsx".to_string())),
    }
}

/// 读取上传的文件内容
async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DsrError::Validation(format!("Dữ liệu tải lên không hợp lệ: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        check_upload_name(field.file_name())?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| DsrError::Validation(format!("Không đọc được file tải lên: {}", e)))?;
        if bytes.is_empty() {
            return Err(DsrError::Validation("Không có file nào được chọn.".to_string()));
        }
        return Ok(bytes.to_vec());
    }
    Err(DsrError::Validation("Không có file nào được chọn.".to_string()))
}

pub async fn import_cases(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::ImportCases)?;
    let bytes = read_upload(multipart).await.map_err(|e| {
        warn!("Rejected upload from {}: {}", current.user.username, e);
        e
    })?;
    info!("User {} uploaded {} bytes for case import", current.user.username, bytes.len());

    let today = Local::now().date_naive();
    let outcome = Importer::new(&state.pool)
        .import_cases(bytes, current.scope.commune_filter(), today)
        .await?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_name() {
        assert!(check_upload_name(Some("ca_benh.xlsx")).is_ok());
        assert!(check_upload_name(Some("CA_BENH.XLSX")).is_ok());
        assert!(check_upload_name(Some("ca_benh.xls")).is_err());
        assert!(check_upload_name(Some("  ")).is_err());
        assert!(check_upload_name(None).is_err());
    }
}
