//! 病例管理：列表、详情、增删改、导出与搜索

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{Local, NaiveDate};
use dsr_core::catalog::DIAGNOSES;
use dsr_core::{Case, CaseFilter, CaseInput, DsrError, OutbreakDisease, Result, UnitLevel, UnitTree};
use dsr_database::{DatabaseQueries, NewCase};
use dsr_reports::export_cases_xlsx;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::handlers::{blank_to_none, created, message, PageParams, PER_PAGE};
use crate::policy::{Action, Scope};
use crate::state::AppState;
use crate::store::{content_disposition, content_type};

/// 搜索未关联病例的最大返回数
pub const SEARCH_LIMIT: i64 = 50;

const REQUIRED_FIELDS: &str = "Vui lòng điền đầy đủ các trường bắt buộc (*).";

// ========== 查询 ==========

/// 病例列表查询参数
#[derive(Debug, Default, Deserialize)]
pub struct CaseListParams {
    pub onset_from: Option<NaiveDate>,
    pub onset_to: Option<NaiveDate>,
    pub import_from: Option<NaiveDate>,
    pub import_to: Option<NaiveDate>,
    pub diagnosis: Option<String>,
    pub name: Option<String>,
    pub hamlet: Option<String>,
    pub region_id: Option<i64>,
    pub commune_id: Option<i64>,
    pub page: Option<i64>,
}

/// 组合过滤条件；指定乡时忽略片区，两者都必须在管辖范围内
pub fn case_filter(scope: &Scope, params: CaseListParams) -> Result<CaseFilter> {
    let commune_ids = match (params.commune_id, params.region_id) {
        (Some(id), _) => {
            let unit = scope.tree().require(id)?;
            if unit.level != UnitLevel::Commune {
                return Err(DsrError::Validation(format!("'{}' không phải là xã.", unit.name)));
            }
            scope.require_for_unit(Action::ViewCases, id)?;
            Some(vec![id])
        }
        (None, Some(id)) => {
            scope.tree().require(id)?;
            scope.require_for_unit(Action::ViewCases, id)?;
            Some(scope.tree().commune_ids_under(id))
        }
        (None, None) => scope.commune_filter(),
    };

    Ok(CaseFilter {
        onset_from: params.onset_from,
        onset_to: params.onset_to,
        import_from: params.import_from,
        import_to: params.import_to,
        diagnosis: blank_to_none(params.diagnosis),
        name: blank_to_none(params.name),
        hamlet: blank_to_none(params.hamlet),
        commune_ids,
    })
}

/// 带乡名的病例
#[derive(Debug, Serialize)]
pub struct CaseView {
    #[serde(flatten)]
    pub case: Case,
    pub commune_name: Option<String>,
}

impl CaseView {
    pub fn new(case: Case, tree: &UnitTree) -> Self {
        let commune_name = tree.get(case.commune_id).map(|u| u.name.clone());
        Self { case, commune_name }
    }
}

pub async fn list_cases(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<CaseListParams>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::ViewCases)?;
    let page = PageParams { page: params.page }.page();
    let filter = case_filter(&current.scope, params)?;

    let result = DatabaseQueries::new(&state.pool)
        .list_cases(&filter, page, PER_PAGE)
        .await?;
    let tree = current.scope.tree();
    let total_pages = result.total_pages();

    Ok(Json(json!({
        "items": result.items.into_iter().map(|c| CaseView::new(c, tree)).collect::<Vec<_>>(),
        "total": result.total,
        "page": result.page,
        "per_page": result.per_page,
        "total_pages": total_pages,
    })))
}

/// 读取病例并确认在管辖范围内
async fn load_case(state: &AppState, scope: &Scope, action: Action, id: i64) -> Result<Case> {
    let case = DatabaseQueries::new(&state.pool)
        .get_case(id)
        .await?
        .ok_or_else(|| DsrError::NotFound("ca bệnh.".to_string()))?;
    scope.require_for_unit(action, case.commune_id)?;
    Ok(case)
}

pub async fn get_case(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let case = load_case(&state, &current.scope, Action::ViewCases, id).await?;
    Ok(Json(CaseView::new(case, current.scope.tree())))
}

// ========== 增删改 ==========

/// 新建或修改病例的请求
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaseRequest {
    pub patient_code: Option<String>,
    pub full_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<String>,
    pub address_detail: Option<String>,
    pub hamlet: Option<String>,
    pub onset_date: Option<NaiveDate>,
    pub diagnosis: Option<String>,
    pub admission_date: Option<NaiveDate>,
    pub discharge_date: Option<NaiveDate>,
    pub severity: Option<String>,
    pub status: Option<String>,
    pub commune_id: Option<i64>,
}

impl CaseRequest {
    /// 校验必填项与乡，返回清理后的病例数据
    pub fn into_input(self, tree: &UnitTree) -> Result<CaseInput> {
        let (Some(patient_code), Some(full_name), Some(onset_date), Some(diagnosis), Some(commune_id)) = (
            blank_to_none(self.patient_code),
            blank_to_none(self.full_name),
            self.onset_date,
            blank_to_none(self.diagnosis),
            self.commune_id,
        ) else {
            return Err(DsrError::Validation(REQUIRED_FIELDS.to_string()));
        };

        match tree.get(commune_id) {
            Some(unit) if unit.level == UnitLevel::Commune => {}
            _ => return Err(DsrError::Validation("Xã được chọn không hợp lệ.".to_string())),
        }

        if let (Some(admitted), Some(discharged)) = (self.admission_date, self.discharge_date) {
            if discharged < admitted {
                return Err(DsrError::Validation(
                    "Ngày ra viện không được trước ngày nhập viện.".to_string(),
                ));
            }
        }

        Ok(CaseInput {
            patient_code,
            full_name,
            birth_date: self.birth_date,
            sex: blank_to_none(self.sex),
            address_detail: blank_to_none(self.address_detail),
            hamlet: blank_to_none(self.hamlet),
            onset_date: Some(onset_date),
            diagnosis: Some(diagnosis),
            admission_date: self.admission_date,
            discharge_date: self.discharge_date,
            severity: blank_to_none(self.severity),
            status: blank_to_none(self.status),
            commune_id,
        })
    }
}

fn duplicate_case() -> DsrError {
    DsrError::Conflict(
        "Ca bệnh đã tồn tại (trùng Mã số, Ngày khởi phát và Chẩn đoán chính).".to_string(),
    )
}

pub async fn create_case(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<CaseRequest>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::EditCases)?;
    let input = request.into_input(current.scope.tree())?;
    current.scope.require_for_unit(Action::EditCases, input.commune_id)?;

    let queries = DatabaseQueries::new(&state.pool);
    if queries.case_identity_exists(&input.identity(), None).await? {
        return Err(duplicate_case().into());
    }

    let today = Local::now().date_naive();
    let id = queries.create_case(&NewCase::from_input(input.clone(), today)).await?;
    info!("User {} created case {} ({})", current.user.username, id, input.patient_code);
    Ok(created(id, format!("Đã thêm thành công ca bệnh: {}", input.full_name)))
}

pub async fn update_case(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(request): Json<CaseRequest>,
) -> ApiResult<impl IntoResponse> {
    load_case(&state, &current.scope, Action::EditCases, id).await?;
    let input = request.into_input(current.scope.tree())?;
    current.scope.require_for_unit(Action::EditCases, input.commune_id)?;

    let queries = DatabaseQueries::new(&state.pool);
    if queries.case_identity_exists(&input.identity(), Some(id)).await? {
        return Err(duplicate_case().into());
    }

    queries.update_case(id, &input).await?;
    info!("User {} updated case {}", current.user.username, id);
    Ok(message("Cập nhật ca bệnh thành công."))
}

pub async fn delete_case(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    load_case(&state, &current.scope, Action::EditCases, id).await?;
    DatabaseQueries::new(&state.pool).delete_case(id).await?;
    info!("User {} deleted case {}", current.user.username, id);
    Ok(message("Đã xóa ca bệnh."))
}

// ========== 导出与搜索 ==========

pub async fn export_cases(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<CaseListParams>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::ExportCases)?;
    let filter = case_filter(&current.scope, params)?;
    let cases = DatabaseQueries::new(&state.pool).cases_for_export(&filter).await?;
    info!("User {} exported {} cases", current.user.username, cases.len());

    let bytes = export_cases_xlsx(cases, current.scope.tree().clone()).await?;
    let file_name = format!("danh_sach_ca_benh_{}.xlsx", Local::now().format("%Y%m%d_%H%M%S"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type(&file_name).to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&file_name)),
        ],
        bytes,
    ))
}

/// 未关联病例搜索参数，`disease` 为疫点病种代码
#[derive(Debug, Deserialize)]
pub struct CaseSearchParams {
    pub q: Option<String>,
    pub disease: Option<String>,
}

pub async fn search_unassigned(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<CaseSearchParams>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::SearchCases)?;
    let Some(term) = blank_to_none(params.q) else {
        return Ok(Json(Vec::<CaseView>::new()));
    };
    let diagnosis = match blank_to_none(params.disease) {
        Some(code) => Some(
            OutbreakDisease::from_code(&code)
                .ok_or_else(|| DsrError::Validation(format!("Loại bệnh '{}' không hợp lệ.", code)))?
                .diagnosis(),
        ),
        None => None,
    };

    let communes = current.scope.commune_filter();
    let cases = DatabaseQueries::new(&state.pool)
        .search_unassigned_cases(communes.as_deref(), &term, diagnosis, SEARCH_LIMIT)
        .await?;
    let tree = current.scope.tree();
    Ok(Json(cases.into_iter().map(|c| CaseView::new(c, tree)).collect()))
}

/// 诊断选项：录入目录与范围内已出现的诊断
pub async fn diagnoses(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::ViewCases)?;
    let communes = current.scope.commune_filter();
    let recorded = DatabaseQueries::new(&state.pool)
        .distinct_diagnoses(communes.as_deref())
        .await?;
    Ok(Json(json!({
        "catalog": DIAGNOSES,
        "recorded": recorded,
    })))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dsr_core::{AdminUnit, UserRole};

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
            unit(12, "Mỹ Long", UnitLevel::Commune, Some(2)),
            unit(11, "Vĩnh Mỹ", UnitLevel::Commune, Some(3)),
        ]))
    }

    fn request() -> CaseRequest {
        CaseRequest {
            patient_code: Some(" BN001 ".to_string()),
            full_name: Some("Nguyễn Văn A".to_string()),
            onset_date: NaiveDate::from_ymd_opt(2024, 3, 10),
            diagnosis: Some("Sởi".to_string()),
            hamlet: Some("  ".to_string()),
            commune_id: Some(10),
            ..Default::default()
        }
    }

    #[test]
    fn test_case_request_validation() {
        let input = request().into_input(&tree()).unwrap();
        assert_eq!(input.patient_code, "BN001");
        assert_eq!(input.hamlet, None);
        assert_eq!(input.commune_id, 10);

        let missing = CaseRequest { full_name: Some(" ".to_string()), ..request() };
        assert!(matches!(missing.into_input(&tree()), Err(DsrError::Validation(m)) if m == REQUIRED_FIELDS));

        let region = CaseRequest { commune_id: Some(2), ..request() };
        assert!(region.into_input(&tree()).is_err());

        let dates = CaseRequest {
            admission_date: NaiveDate::from_ymd_opt(2024, 3, 12),
            discharge_date: NaiveDate::from_ymd_opt(2024, 3, 11),
            ..request()
        };
        assert!(dates.into_input(&tree()).is_err());
    }

    #[test]
    fn test_case_filter_scope() {
        let admin = Scope::resolve(UserRole::Admin, None, tree()).unwrap();
        let filter = case_filter(&admin, CaseListParams::default()).unwrap();
        assert!(filter.commune_ids.is_none());

        let filter = case_filter(&admin, CaseListParams { region_id: Some(2), ..Default::default() }).unwrap();
        assert_eq!(filter.commune_ids, Some(vec![10, 12]));

        let region = Scope::resolve(UserRole::Region, Some(2), tree()).unwrap();
        let filter = case_filter(&region, CaseListParams::default()).unwrap();
        assert_eq!(filter.commune_ids, Some(vec![10, 12]));

        let params = CaseListParams { region_id: Some(2), commune_id: Some(12), ..Default::default() };
        assert_eq!(case_filter(&region, params).unwrap().commune_ids, Some(vec![12]));

        let outside = CaseListParams { commune_id: Some(11), ..Default::default() };
        assert!(matches!(case_filter(&region, outside), Err(DsrError::Permission(_))));

        let not_commune = CaseListParams { commune_id: Some(3), ..Default::default() };
        assert!(matches!(case_filter(&admin, not_commune), Err(DsrError::Validation(_))));
    }
}
