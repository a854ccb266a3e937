//! 角色权限与数据范围

use std::sync::Arc;

use dsr_core::{AdminUnit, DsrError, Result, UnitTree, UserRole};

/// 需要授权的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// 单位、用户管理及用户导出
    Administer,
    ImportCases,
    /// 病例新增、修改、删除
    EditCases,
    ExportCases,
    SearchCases,
    ViewCases,
    ViewOutbreaks,
    CreateOutbreak,
    /// 查看详情、修改、关联与移除病例
    ManageOutbreak,
    DeleteOutbreak,
    GenerateReports,
    CustomReport,
    ViewDashboard,
}

impl Action {
    pub fn allows(&self, role: UserRole) -> bool {
        use UserRole::*;
        match self {
            Action::Administer => role == Admin,
            Action::ImportCases
            | Action::EditCases
            | Action::ExportCases
            | Action::SearchCases
            | Action::CreateOutbreak
            | Action::ManageOutbreak => matches!(role, Admin | Region),
            Action::DeleteOutbreak => matches!(role, Admin | Region | Commune),
            Action::CustomReport => matches!(role, Admin | Province | Region),
            Action::ViewCases | Action::ViewOutbreaks | Action::GenerateReports | Action::ViewDashboard => true,
        }
    }
}

fn forbidden() -> DsrError {
    DsrError::Permission("Bạn không có quyền truy cập chức năng này.".to_string())
}

fn out_of_scope() -> DsrError {
    DsrError::Permission("Bạn không có quyền truy cập dữ liệu của đơn vị này.".to_string())
}

/// 当前用户的数据范围：管理员为省级根单位，其余为所属单位
#[derive(Debug, Clone)]
pub struct Scope {
    role: UserRole,
    unit: AdminUnit,
    tree: Arc<UnitTree>,
}

impl Scope {
    pub fn new(role: UserRole, unit: AdminUnit, tree: Arc<UnitTree>) -> Self {
        Self { role, unit, tree }
    }

    /// 按用户解析范围单位
    pub fn resolve(role: UserRole, unit_id: Option<i64>, tree: Arc<UnitTree>) -> Result<Self> {
        let unit = match (role, unit_id) {
            (UserRole::Admin, _) => tree.root().cloned(),
            (_, Some(id)) => tree.get(id).cloned(),
            (_, None) => None,
        }
        .ok_or_else(|| {
            DsrError::Permission("Không tìm thấy thông tin đơn vị của bạn. Vui lòng đăng nhập lại.".to_string())
        })?;
        Ok(Self::new(role, unit, tree))
    }

    pub fn role(&self) -> UserRole {
        self.role
    }

    pub fn unit(&self) -> &AdminUnit {
        &self.unit
    }

    pub fn tree(&self) -> &UnitTree {
        &self.tree
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// 单位是否在管辖范围内
    pub fn covers(&self, unit_id: i64) -> bool {
        self.is_admin() || self.tree.is_within(self.unit.id, unit_id)
    }

    pub fn commune_ids(&self) -> Vec<i64> {
        self.tree.commune_ids_under(self.unit.id)
    }

    /// 查询用的乡过滤，管理员不限制
    pub fn commune_filter(&self) -> Option<Vec<i64>> {
        if self.is_admin() {
            None
        } else {
            Some(self.commune_ids())
        }
    }

    pub fn require(&self, action: Action) -> Result<()> {
        if action.allows(self.role) {
            Ok(())
        } else {
            Err(forbidden())
        }
    }

    /// 角色允许且单位在管辖范围内
    pub fn require_for_unit(&self, action: Action, unit_id: i64) -> Result<()> {
        self.require(action)?;
        if self.covers(unit_id) {
            Ok(())
        } else {
            Err(out_of_scope())
        }
    }
}
