//! 报告生成、下载与仪表盘

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Local;
use dsr_core::{AdminUnit, ReportPeriod, UnitLevel, UnitTree};
use dsr_reports::{CustomReportRequest, DashboardQuery, GeneratedReport, ReportKind};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::policy::{Action, Scope};
use crate::state::AppState;
use crate::store::{content_disposition, content_type, download_name, StoredReport};

const REPORT_CREATED: &str = "Tạo báo cáo thành công!";

/// 报告生成请求
#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub template: ReportKind,
    pub period: ReportPeriod,
}

/// 报告生成结果
#[derive(Debug, Serialize)]
pub struct ReportResponse {
    #[serde(flatten)]
    pub report: StoredReport,
    pub download_url: String,
    pub message: String,
}

async fn store_report(state: &AppState, report: &GeneratedReport) -> dsr_core::Result<ReportResponse> {
    let stored = state.reports.save(report).await?;
    Ok(ReportResponse {
        download_url: stored.download_path(),
        report: stored,
        message: REPORT_CREATED.to_string(),
    })
}

pub async fn generate_report(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<ReportRequest>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::GenerateReports)?;
    let unit_id = current.scope.unit().id;
    info!(
        "User {} requested {:?} report for unit {}",
        current.user.username, request.template, unit_id
    );

    let report = state
        .generator
        .generate(unit_id, request.template, request.period)
        .await?;
    Ok(Json(store_report(&state, &report).await?))
}

pub async fn custom_report(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<CustomReportRequest>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::CustomReport)?;
    let report = state.generator.custom(current.scope.unit().id, &request).await?;
    info!("User {} generated custom report {}", current.user.username, report.file_name);
    Ok(Json(store_report(&state, &report).await?))
}

/// 自定义报告可选的单位
#[derive(Debug, Serialize, PartialEq)]
pub struct UnitOption {
    pub id: i64,
    pub name: String,
    pub level: UnitLevel,
}

impl From<&AdminUnit> for UnitOption {
    fn from(unit: &AdminUnit) -> Self {
        Self {
            id: unit.id,
            name: unit.name.clone(),
            level: unit.level,
        }
    }
}

/// 范围内的片区与乡，片区在前
pub fn custom_report_units(tree: &UnitTree, scope: &Scope) -> Vec<UnitOption> {
    let mut options: Vec<UnitOption> = tree
        .units_at(UnitLevel::Region)
        .into_iter()
        .filter(|u| scope.covers(u.id))
        .map(UnitOption::from)
        .collect();
    options.extend(
        tree.units_at(UnitLevel::Commune)
            .into_iter()
            .filter(|u| scope.covers(u.id))
            .map(UnitOption::from),
    );
    options
}

pub async fn report_units(Extension(current): Extension<CurrentUser>) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::CustomReport)?;
    Ok(Json(custom_report_units(current.scope.tree(), &current.scope)))
}

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub name: Option<String>,
}

pub async fn download_report(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(file_id): Path<String>,
    Query(params): Query<DownloadParams>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::GenerateReports)?;
    let bytes = state.reports.load(&file_id).await?;
    let file_name = download_name(params.name.as_deref(), &file_id);
    info!("User {} downloaded report {}", current.user.username, file_id);

    Ok((
        [
            (header::CONTENT_TYPE, content_type(&file_id).to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&file_name)),
        ],
        bytes,
    ))
}

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::ViewDashboard)?;
    let today = Local::now().date_naive();
    let data = state
        .generator
        .dashboard(current.scope.unit().id, &query, today)
        .await?;
    Ok(Json(data))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dsr_core::UserRole;

    use super::*;

    fn unit(id: i64, name: &str, level: UnitLevel, parent_id: Option<i64>) -> AdminUnit {
        AdminUnit { id, name: name.to_string(), level, parent_id }
    }

    fn tree() -> Arc<UnitTree> {
        Arc::new(UnitTree::new(vec![
            unit(1, "An Giang", UnitLevel::Province, None),
            unit(2, "Khu vực Long Xuyên", UnitLevel::Region, Some(1)),
            unit(3, "Khu vực Châu Đốc", UnitLevel::Region, Some(1)),
            unit(10, "Mỹ Bình", UnitLevel::Commune, Some(2)),
            unit(11, "Vĩnh Mỹ", UnitLevel::Commune, Some(3)),
        ]))
    }

    #[test]
    fn test_custom_report_units() {
        let tree = tree();
        let province = Scope::resolve(UserRole::Province, Some(1), Arc::clone(&tree)).unwrap();
        let ids: Vec<i64> = custom_report_units(&tree, &province).iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![3, 2, 10, 11]);

        let region = Scope::resolve(UserRole::Region, Some(2), Arc::clone(&tree)).unwrap();
        let ids: Vec<i64> = custom_report_units(&tree, &region).iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![2, 10]);
    }

    #[test]
    fn test_report_request_shape() {
        let request: ReportRequest = serde_json::from_str(
            r#"{"template":"dengue_outbreak","period":{"kind":"month","year":2024,"month":3}}"#,
        )
        .unwrap();
        assert_eq!(request.template, ReportKind::DengueOutbreak);
        assert_eq!(request.period, ReportPeriod::Month { year: 2024, month: 3 });
    }
}
