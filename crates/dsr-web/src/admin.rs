//! 管理区：行政单位与用户管理

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use dsr_core::hierarchy::check_parent_level;
use dsr_core::{AdminUnit, DsrError, Result, UnitLevel, UnitTree, UserRole};
use dsr_database::{DatabaseQueries, NewUnit, NewUser};
use dsr_reports::{export_users_xlsx, UserExportRow};
use serde::Deserialize;
use tracing::info;

use crate::auth::{hash_password, validate_new_password, CurrentUser};
use crate::error::ApiResult;
use crate::handlers::{blank_to_none, created, message, PageParams, PER_PAGE};
use crate::policy::Action;
use crate::state::AppState;
use crate::store::{content_disposition, content_type};

// ========== 行政单位 ==========

#[derive(Debug, Deserialize)]
pub struct UnitListParams {
    pub level: Option<String>,
    pub page: Option<i64>,
}

/// 新建或修改单位的请求
#[derive(Debug, Clone, Deserialize)]
pub struct UnitRequest {
    pub name: String,
    pub level: UnitLevel,
    pub parent_id: Option<i64>,
}

/// 校验单位变更，`editing` 为被修改的单位ID
pub fn check_unit_request(tree: &UnitTree, editing: Option<i64>, request: &UnitRequest) -> Result<NewUnit> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(DsrError::Validation("Tên và Cấp đơn vị không được để trống.".to_string()));
    }

    let parent = match request.parent_id {
        Some(id) => Some(tree.require(id)?),
        None => None,
    };
    check_parent_level(request.level, parent)?;

    if let (Some(id), Some(parent)) = (editing, parent) {
        if tree.is_within(id, parent.id) {
            return Err(DsrError::Validation(
                "Không thể chọn chính đơn vị này hoặc đơn vị con của nó làm đơn vị cha.".to_string(),
            ));
        }
    }

    if request.level == UnitLevel::Province
        && tree
            .units_at(UnitLevel::Province)
            .iter()
            .any(|u| Some(u.id) != editing)
    {
        return Err(DsrError::Conflict("Hệ thống chỉ được có một đơn vị cấp Tỉnh.".to_string()));
    }

    let lowered = name.to_lowercase();
    let siblings: Vec<&AdminUnit> = match request.parent_id {
        Some(parent_id) => tree.children(parent_id),
        None => tree.root().into_iter().collect(),
    };
    if siblings
        .iter()
        .any(|u| Some(u.id) != editing && u.name.to_lowercase() == lowered)
    {
        return Err(DsrError::Conflict(format!(
            "Đơn vị '{}' đã tồn tại trong đơn vị cha được chọn.",
            name
        )));
    }

    let unit = NewUnit {
        name: name.to_string(),
        level: request.level,
        parent_id: request.parent_id,
    };

    // 修改级别后现有下级单位必须仍低于本单位
    if let Some(id) = editing {
        let updated = AdminUnit {
            id,
            name: unit.name.clone(),
            level: unit.level,
            parent_id: unit.parent_id,
        };
        for child in tree.children(id) {
            check_parent_level(child.level, Some(&updated))?;
        }
    }
    Ok(unit)
}

pub async fn list_units(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<UnitListParams>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::Administer)?;
    let level = match blank_to_none(params.level) {
        Some(label) => Some(
            UnitLevel::from_label(&label)
                .ok_or_else(|| DsrError::Validation(format!("Cấp đơn vị '{}' không hợp lệ.", label)))?,
        ),
        None => None,
    };
    let page = PageParams { page: params.page }.page();
    let units = DatabaseQueries::new(&state.pool)
        .list_units_paged(level, page, PER_PAGE)
        .await?;
    Ok(Json(units))
}

pub async fn create_unit(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<UnitRequest>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::Administer)?;
    let unit = check_unit_request(current.scope.tree(), None, &request)?;
    let id = DatabaseQueries::new(&state.pool).create_unit(&unit).await?;
    info!("Admin {} created unit {} ({})", current.user.username, id, unit.name);
    Ok(created(id, format!("Đã thêm thành công '{}: {}'.", unit.level, unit.name)))
}

pub async fn update_unit(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(request): Json<UnitRequest>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::Administer)?;
    let tree = current.scope.tree();
    tree.get(id)
        .ok_or_else(|| DsrError::NotFound("đơn vị.".to_string()))?;
    let unit = check_unit_request(tree, Some(id), &request)?;
    DatabaseQueries::new(&state.pool).update_unit(id, &unit).await?;
    info!("Admin {} updated unit {}", current.user.username, id);
    Ok(message("Cập nhật đơn vị thành công."))
}

pub async fn delete_unit(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::Administer)?;
    let queries = DatabaseQueries::new(&state.pool);
    queries
        .get_unit(id)
        .await?
        .ok_or_else(|| DsrError::NotFound("đơn vị.".to_string()))?;

    let dependents = queries.unit_dependents(id).await?;
    if dependents.children > 0 {
        return Err(DsrError::Conflict("Không thể xóa đơn vị vì vẫn còn các đơn vị con.".to_string()).into());
    }
    if !dependents.is_empty() {
        return Err(DsrError::Conflict(
            "Không thể xóa đơn vị vì đang có người dùng hoặc ca bệnh được gán.".to_string(),
        )
        .into());
    }

    queries.delete_unit(id).await?;
    info!("Admin {} deleted unit {}", current.user.username, id);
    Ok(message("Đã xóa đơn vị."))
}

// ========== 用户 ==========

#[derive(Debug, Deserialize)]
pub struct UserListParams {
    pub username: Option<String>,
    pub role: Option<String>,
    pub page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub unit_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub unit_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub new_password: String,
}

/// 非管理员角色由单位级别决定，管理员保持管理员
pub fn derived_role(current: UserRole, unit: &AdminUnit) -> UserRole {
    if current == UserRole::Admin {
        UserRole::Admin
    } else {
        UserRole::for_level(unit.level)
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(params): Query<UserListParams>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::Administer)?;
    let role = match blank_to_none(params.role) {
        Some(code) => Some(
            UserRole::from_code(&code)
                .ok_or_else(|| DsrError::Validation(format!("Quyền hạn '{}' không hợp lệ.", code)))?,
        ),
        None => None,
    };
    let page = PageParams { page: params.page }.page();
    let users = DatabaseQueries::new(&state.pool)
        .list_users(params.username.as_deref(), role, page, PER_PAGE)
        .await?;
    Ok(Json(users))
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::Administer)?;
    let username = request.username.trim().to_string();
    if username.is_empty() || request.password.is_empty() {
        return Err(DsrError::Validation("Vui lòng điền đầy đủ thông tin.".to_string()).into());
    }
    validate_new_password(&request.password)?;
    let unit = current.scope.tree().require(request.unit_id)?.clone();

    let queries = DatabaseQueries::new(&state.pool);
    if queries.get_user_by_username(&username).await?.is_some() {
        return Err(DsrError::Conflict("Tên đăng nhập đã tồn tại.".to_string()).into());
    }

    let user = NewUser {
        username: username.clone(),
        email: blank_to_none(request.email),
        password_hash: hash_password(&request.password)?,
        role: UserRole::for_level(unit.level),
        unit_id: Some(unit.id),
    };
    let id = queries.create_user(&user).await?;
    info!("Admin {} created user {} ({})", current.user.username, username, user.role);
    Ok(created(id, format!("Đã tạo thành công tài khoản '{}'.", username)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::Administer)?;
    let queries = DatabaseQueries::new(&state.pool);
    let user = queries
        .get_user(id)
        .await?
        .ok_or_else(|| DsrError::NotFound("người dùng.".to_string()))?;
    let unit = current.scope.tree().require(request.unit_id)?;

    let role = derived_role(user.role, unit);
    queries.update_user_unit(id, Some(unit.id), role).await?;
    info!("Admin {} moved user {} to unit {} ({})", current.user.username, id, unit.id, role);
    Ok(message("Cập nhật người dùng thành công."))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(request): Json<ResetPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::Administer)?;
    validate_new_password(&request.new_password)?;
    let queries = DatabaseQueries::new(&state.pool);
    let user = queries
        .get_user(id)
        .await?
        .ok_or_else(|| DsrError::NotFound("người dùng.".to_string()))?;

    queries
        .update_password(id, &hash_password(&request.new_password)?)
        .await?;
    info!("Admin {} reset password of {}", current.user.username, user.username);
    Ok(message(format!("Đã đặt lại mật khẩu cho '{}'.", user.username)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::Administer)?;
    if id == current.user.id {
        return Err(DsrError::Validation("Bạn không thể tự xóa chính mình.".to_string()).into());
    }
    let queries = DatabaseQueries::new(&state.pool);
    let user = queries
        .get_user(id)
        .await?
        .ok_or_else(|| DsrError::NotFound("người dùng.".to_string()))?;
    if user.role == UserRole::Admin && queries.count_admins().await? <= 1 {
        return Err(DsrError::Conflict("Không thể xóa tài khoản Admin cuối cùng.".to_string()).into());
    }

    queries.delete_user(id).await?;
    info!("Admin {} deleted user {}", current.user.username, user.username);
    Ok(message(format!("Đã xóa người dùng '{}'.", user.username)))
}

pub async fn export_users(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<impl IntoResponse> {
    current.scope.require(Action::Administer)?;
    let users: Vec<UserExportRow> = DatabaseQueries::new(&state.pool)
        .users_with_units()
        .await?
        .into_iter()
        .map(|u| UserExportRow {
            id: u.id,
            username: u.username,
            role: u.role,
            unit_name: u.unit_name,
            unit_level: u.unit_level,
        })
        .collect();
    if users.is_empty() {
        return Err(DsrError::NotFound("người dùng nào để xuất ra file.".to_string()).into());
    }

    let file_name = format!("DanhSachNguoiDung_{}.xlsx", chrono::Local::now().format("%Y%m%d"));
    let bytes = export_users_xlsx(users).await?;
    Ok((
        [
            (header::CONTENT_TYPE, content_type(&file_name).to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(&file_name)),
        ],
        bytes,
    ))
}
