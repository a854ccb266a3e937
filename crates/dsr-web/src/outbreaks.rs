//! 疫点管理
//!
//! 疫点可由首发病例直接创建；详情页给出同乡、同病种、发病日期在窗口内且尚未
//! 关联疫点的病例作为建议。

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{Duration, Local, NaiveDate};
use dsr_core::catalog::{DENGUE, HFMD};
use dsr_core::{
    Case, DsrError, Outbreak, OutbreakCriteria, OutbreakDisease, OutbreakFilter, OutbreakInput, OutbreakStatus,
    Result, UnitLevel, UnitTree,
};
use dsr_database::DatabaseQueries;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::auth::CurrentUser;
use crate::cases::CaseView;
use crate::error::ApiResult;
use crate::handlers::{blank_to_none, message, PageParams, PER_PAGE};
use crate::policy::{Action, Scope};
use crate::state::AppState;

/// 建议窗口：锚定日期前7天
pub const SUGGEST_DAYS_BEFORE: i64 = 7;
/// 建议窗口：锚定日期后14天
pub const SUGGEST_DAYS_AFTER: i64 = 14;

const OUTBREAK_NOT_FOUND: &str = "Không tìm thấy ổ dịch.";

// ========== 列表 ==========

#[derive(Debug, Default, Deserialize)]
pub struct OutbreakListParams {
    pub disease: Option<OutbreakDisease>,
    pub status: Option<OutbreakStatus>,
    pub detected_from: Option<NaiveDate>,
    pub detected_to: Option<NaiveDate>,
    pub commune_id: Option<i64>,
    pub page: Option<i64>,
}

pub fn outbreak_filter(scope: &Scope, params: &OutbreakListParams) -> Result<OutbreakFilter> {
    let commune_ids = match params.commune_id {
        Some(id) => {
            scope.require_for_unit(Action::ViewOutbreaks, id)?;
            Some(scope.tree().commune_ids_under(id))
        }
        None => scope.commune_filter(),
    };
    Ok(OutbreakFilter {
        disease: params.disease,
        status: params.status,
        detected_from: params.detected_from,
        detected_to: params.detected_to,
        commune_ids,
    })
}

/// 带乡名的疫点
#[derive(Debug, Serialize)]
pub struct OutbreakView {
    #[serde(flatten)]
    pub outbreak: Outbreak,
    pub commune_name: Option<String>,
}

impl OutbreakView {
    pub fn new(outbreak: Outbreak, tree: &UnitTree) -> Self {
        let commune_name = tree.get(outbreak.commune_id).map(|u| u.name.clone());
        Self { outbreak, commune_name }
    }
}

pub async fn list_outbreaks(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<OutbreakListParams>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::ViewOutbreaks)?;
    let filter = outbreak_filter(&current.scope, &params)?;
    let page = PageParams { page: params.page }.page();

    let result = DatabaseQueries::new(&state.pool)
        .list_outbreaks(&filter, page, PER_PAGE)
        .await?;
    let tree = current.scope.tree();
    let total_pages = result.total_pages();

    Ok(Json(json!({
        "items": result.items.into_iter().map(|o| OutbreakView::new(o, tree)).collect::<Vec<_>>(),
        "total": result.total,
        "page": result.page,
        "per_page": result.per_page,
        "total_pages": total_pages,
    })))
}

// ========== 新建 ==========

/// 诊断对应的疫点病种
pub fn disease_for_diagnosis(diagnosis: Option<&str>) -> Option<OutbreakDisease> {
    match diagnosis {
        Some(DENGUE) => Some(OutbreakDisease::Dengue),
        Some(HFMD) => Some(OutbreakDisease::Hfmd),
        _ => None,
    }
}

fn join_place(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// 由首发病例预填的新疫点
#[derive(Debug, Serialize, PartialEq)]
pub struct OutbreakPrefill {
    pub case_id: i64,
    pub disease: Option<OutbreakDisease>,
    pub detected_on: NaiveDate,
    pub commune_id: i64,
    pub commune_name: Option<String>,
    pub location: String,
}

impl OutbreakPrefill {
    pub fn from_case(case: &Case, tree: &UnitTree, today: NaiveDate) -> Self {
        let commune_name = tree.get(case.commune_id).map(|u| u.name.clone());
        let place = join_place(&[case.address_detail.as_deref(), commune_name.as_deref()]);
        Self {
            case_id: case.id,
            disease: disease_for_diagnosis(case.diagnosis.as_deref()),
            detected_on: today,
            commune_id: case.commune_id,
            location: format!("Ổ dịch tại {} (khởi phát từ BN {})", place, case.full_name),
            commune_name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PrefillParams {
    pub case_id: i64,
}

pub async fn prefill_outbreak(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<PrefillParams>,
) -> ApiResult<impl IntoResponse> {
    let case = DatabaseQueries::new(&state.pool)
        .get_case(params.case_id)
        .await?
        .ok_or_else(|| DsrError::NotFound("ca bệnh chỉ điểm.".to_string()))?;
    current.scope.require_for_unit(Action::CreateOutbreak, case.commune_id)?;
    let today = Local::now().date_naive();
    Ok(Json(OutbreakPrefill::from_case(&case, current.scope.tree(), today)))
}

/// 新建或修改疫点的请求
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutbreakRequest {
    pub disease: Option<OutbreakDisease>,
    pub detected_on: Option<NaiveDate>,
    pub resolved_on: Option<NaiveDate>,
    pub location: Option<String>,
    pub hamlet: Option<String>,
    pub commune_id: Option<i64>,
    pub hfmd_place: Option<String>,
    #[serde(default)]
    pub criteria: OutbreakCriteria,
    pub dengue_test_kind: Option<String>,
    pub case_count: Option<i32>,
    /// 首发病例，仅新建时使用
    pub index_case_id: Option<i64>,
}

impl OutbreakRequest {
    /// 校验并生成疫点数据；有首发病例时乡、地址与病例数取自病例
    pub fn into_input(self, tree: &UnitTree, index_case: Option<&Case>) -> Result<OutbreakInput> {
        let mut commune_id = self.commune_id;
        let mut disease = self.disease;
        let mut location = blank_to_none(self.location);
        let mut hamlet = blank_to_none(self.hamlet);
        let mut case_count = self.case_count.unwrap_or(0);

        if let Some(case) = index_case {
            commune_id = Some(case.commune_id);
            disease = disease.or_else(|| disease_for_diagnosis(case.diagnosis.as_deref()));
            let place = join_place(&[case.address_detail.as_deref(), case.hamlet.as_deref()]);
            location = Some(place).filter(|p| !p.is_empty()).or(location);
            hamlet = case.hamlet.clone().or(hamlet);
            case_count = case_count.max(1);
        }

        let (Some(disease), Some(detected_on), Some(commune_id)) = (disease, self.detected_on, commune_id) else {
            return Err(DsrError::Validation(
                "Loại bệnh, ngày phát hiện và xã là bắt buộc.".to_string(),
            ));
        };
        match tree.get(commune_id) {
            Some(unit) if unit.level == UnitLevel::Commune => {}
            _ => return Err(DsrError::Validation("Xã được chọn không hợp lệ.".to_string())),
        }
        if self.resolved_on.map_or(false, |r| r < detected_on) {
            return Err(DsrError::Validation(
                "Ngày xử lý không được trước ngày phát hiện.".to_string(),
            ));
        }
        if case_count < 0 {
            return Err(DsrError::Validation("Số ca mắc không hợp lệ.".to_string()));
        }

        Ok(OutbreakInput {
            disease,
            detected_on,
            resolved_on: self.resolved_on,
            location,
            hamlet,
            commune_id,
            hfmd_place: blank_to_none(self.hfmd_place),
            criteria: self.criteria,
            dengue_test_kind: blank_to_none(self.dengue_test_kind),
            case_count,
        })
    }
}

pub async fn create_outbreak(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<OutbreakRequest>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::CreateOutbreak)?;
    let queries = DatabaseQueries::new(&state.pool);

    let index_case = match request.index_case_id {
        Some(id) => {
            let case = queries
                .get_case(id)
                .await?
                .ok_or_else(|| DsrError::NotFound("ca bệnh chỉ điểm.".to_string()))?;
            current.scope.require_for_unit(Action::CreateOutbreak, case.commune_id)?;
            if case.outbreak_id.is_some() {
                return Err(DsrError::Conflict("Ca bệnh đã thuộc một ổ dịch khác.".to_string()).into());
            }
            Some(case)
        }
        None => None,
    };

    let input = request.into_input(current.scope.tree(), index_case.as_ref())?;
    current.scope.require_for_unit(Action::CreateOutbreak, input.commune_id)?;

    let id = queries.create_outbreak(&input, index_case.as_ref().map(|c| c.id)).await?;
    info!("User {} created outbreak {} ({})", current.user.username, id, input.disease);

    let mut messages = vec!["Đã thêm ổ dịch thành công."];
    if index_case.is_some() {
        messages.push("Đã tự động liên kết ca bệnh chỉ điểm vào ổ dịch.");
    }
    Ok(Json(json!({ "id": id, "message": messages.join(" ") })))
}

// ========== 详情与修改 ==========

/// 读取疫点并确认在管辖范围内
async fn load_outbreak(state: &AppState, scope: &Scope, action: Action, id: i64) -> Result<Outbreak> {
    let outbreak = DatabaseQueries::new(&state.pool)
        .get_outbreak(id)
        .await?
        .ok_or_else(|| DsrError::NotFound(OUTBREAK_NOT_FOUND.to_string()))?;
    scope.require_for_unit(action, outbreak.commune_id)?;
    Ok(outbreak)
}

/// 建议病例的发病日期窗口，锚定最早的已关联病例发病日期，没有时取发现日期
pub fn suggestion_window(outbreak: &Outbreak, linked: &[Case]) -> (NaiveDate, NaiveDate) {
    let anchor = linked
        .iter()
        .filter_map(|c| c.onset_date)
        .min()
        .unwrap_or(outbreak.detected_on);
    (
        anchor - Duration::days(SUGGEST_DAYS_BEFORE),
        anchor + Duration::days(SUGGEST_DAYS_AFTER),
    )
}

pub async fn get_outbreak(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let outbreak = load_outbreak(&state, &current.scope, Action::ManageOutbreak, id).await?;
    let queries = DatabaseQueries::new(&state.pool);
    let linked = queries.cases_of_outbreak(id).await?;
    let (from, to) = suggestion_window(&outbreak, &linked);
    let suggestions = queries
        .unassigned_cases(outbreak.commune_id, outbreak.disease.diagnosis(), from, to)
        .await?;

    let tree = current.scope.tree();
    Ok(Json(json!({
        "outbreak": OutbreakView::new(outbreak, tree),
        "cases": linked.into_iter().map(|c| CaseView::new(c, tree)).collect::<Vec<_>>(),
        "suggestions": suggestions.into_iter().map(|c| CaseView::new(c, tree)).collect::<Vec<_>>(),
        "suggestion_window": { "from": from, "to": to },
    })))
}

pub async fn update_outbreak(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(mut request): Json<OutbreakRequest>,
) -> ApiResult<impl IntoResponse> {
    let existing = load_outbreak(&state, &current.scope, Action::ManageOutbreak, id).await?;

    // 病种不可修改，只有管理员可以更换乡
    request.disease = Some(existing.disease);
    request.index_case_id = None;
    if !current.scope.is_admin() || request.commune_id.is_none() {
        request.commune_id = Some(existing.commune_id);
    }
    let input = request.into_input(current.scope.tree(), None)?;

    DatabaseQueries::new(&state.pool).update_outbreak(id, &input).await?;
    info!("User {} updated outbreak {}", current.user.username, id);
    Ok(message("Cập nhật ổ dịch thành công."))
}

pub async fn delete_outbreak(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let outbreak = DatabaseQueries::new(&state.pool)
        .get_outbreak(id)
        .await?
        .ok_or_else(|| DsrError::NotFound(OUTBREAK_NOT_FOUND.to_string()))?;
    current.scope.require(Action::DeleteOutbreak)?;
    if !current.scope.covers(outbreak.commune_id) {
        return Err(DsrError::Permission("Bạn không có quyền xóa ổ dịch này.".to_string()).into());
    }

    DatabaseQueries::new(&state.pool).delete_outbreak(id).await?;
    info!("User {} deleted outbreak {}", current.user.username, id);
    Ok(message("Đã xóa ổ dịch."))
}

// ========== 病例关联 ==========

#[derive(Debug, Deserialize)]
pub struct LinkCasesRequest {
    #[serde(default)]
    pub case_ids: Vec<i64>,
}

pub async fn link_cases(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(request): Json<LinkCasesRequest>,
) -> ApiResult<impl IntoResponse> {
    load_outbreak(&state, &current.scope, Action::ManageOutbreak, id).await?;
    let mut case_ids = request.case_ids;
    case_ids.sort_unstable();
    case_ids.dedup();
    if case_ids.is_empty() {
        return Err(DsrError::Validation("Chưa chọn ca bệnh nào để thêm.".to_string()).into());
    }

    let queries = DatabaseQueries::new(&state.pool);
    for case_id in &case_ids {
        let case = queries
            .get_case(*case_id)
            .await?
            .ok_or_else(|| DsrError::NotFound(format!("ca bệnh {}", case_id)))?;
        current.scope.require_for_unit(Action::ManageOutbreak, case.commune_id)?;
    }

    let linked = queries.link_cases(id, &case_ids).await?;
    info!("User {} linked {} cases to outbreak {}", current.user.username, linked, id);
    Ok(message(format!("Đã thêm {} ca bệnh vào ổ dịch.", linked)))
}

pub async fn unlink_case(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((id, case_id)): Path<(i64, i64)>,
) -> ApiResult<impl IntoResponse> {
    load_outbreak(&state, &current.scope, Action::ManageOutbreak, id).await?;
    DatabaseQueries::new(&state.pool).unlink_case(id, case_id).await?;
    info!("User {} unlinked case {} from outbreak {}", current.user.username, case_id, id);
    Ok(message("Đã gỡ ca bệnh khỏi ổ dịch."))
}
