//! 数据库模型

use chrono::NaiveDate;
use dsr_core::models::*;
use sqlx::FromRow;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库行政单位表
#[derive(Debug, FromRow)]
pub struct DbAdminUnit {
    pub id: i64,
    pub name: String,
    pub level: String, // 存储为越南语名称
    pub parent_id: Option<i64>,
}

impl From<DbAdminUnit> for AdminUnit {
    fn from(db_unit: DbAdminUnit) -> Self {
        let level = UnitLevel::from_label(&db_unit.level).unwrap_or_else(|| {
            tracing::warn!("Unknown unit level '{}' for unit {}", db_unit.level, db_unit.id);
            UnitLevel::Hamlet
        });
        AdminUnit {
            id: db_unit.id,
            name: db_unit.name,
            level,
            parent_id: db_unit.parent_id,
        }
    }
}

/// 数据库用户表
#[derive(Debug, FromRow)]
pub struct DbUser {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: String,
    pub unit_id: Option<i64>,
}

impl From<DbUser> for User {
    fn from(db_user: DbUser) -> Self {
        User {
            id: db_user.id,
            username: db_user.username,
            email: db_user.email,
            password_hash: db_user.password_hash,
            role: UserRole::from_code(&db_user.role).unwrap_or(UserRole::Commune), // 默认最低权限
            unit_id: db_user.unit_id,
        }
    }
}

/// 数据库病例表
#[derive(Debug, FromRow)]
pub struct DbCase {
    pub id: i64,
    pub patient_code: String,
    pub full_name: String,
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
    pub import_date: NaiveDate,
    pub commune_id: i64,
    pub outbreak_id: Option<i64>,
}

impl From<DbCase> for Case {
    fn from(db_case: DbCase) -> Self {
        Case {
            id: db_case.id,
            patient_code: db_case.patient_code,
            full_name: db_case.full_name,
            birth_date: db_case.birth_date,
            sex: db_case.sex,
            address_detail: db_case.address_detail,
            hamlet: db_case.hamlet,
            onset_date: db_case.onset_date,
            diagnosis: db_case.diagnosis,
            admission_date: db_case.admission_date,
            discharge_date: db_case.discharge_date,
            severity: db_case.severity,
            status: db_case.status,
            import_date: db_case.import_date,
            commune_id: db_case.commune_id,
            outbreak_id: db_case.outbreak_id,
        }
    }
}

/// 数据库疫点表
#[derive(Debug, FromRow)]
pub struct DbOutbreak {
    pub id: i64,
    pub disease: String,
    pub detected_on: NaiveDate,
    pub resolved_on: Option<NaiveDate>,
    pub location: Option<String>,
    pub hamlet: Option<String>,
    pub commune_id: i64,
    pub hfmd_place: Option<String>,
    pub two_cases_in_7_days: bool,
    pub severe_case: bool,
    pub lab_confirmed: bool,
    pub death: bool,
    pub dengue_test_kind: Option<String>,
    pub case_count: i32,
}

impl From<DbOutbreak> for Outbreak {
    fn from(db_outbreak: DbOutbreak) -> Self {
        Outbreak {
            id: db_outbreak.id,
            disease: OutbreakDisease::from_code(&db_outbreak.disease).unwrap_or(OutbreakDisease::Dengue),
            detected_on: db_outbreak.detected_on,
            resolved_on: db_outbreak.resolved_on,
            location: db_outbreak.location,
            hamlet: db_outbreak.hamlet,
            commune_id: db_outbreak.commune_id,
            hfmd_place: db_outbreak.hfmd_place,
            criteria: OutbreakCriteria {
                two_cases_in_7_days: db_outbreak.two_cases_in_7_days,
                severe_case: db_outbreak.severe_case,
                lab_confirmed: db_outbreak.lab_confirmed,
                death: db_outbreak.death,
            },
            dengue_test_kind: db_outbreak.dengue_test_kind,
            case_count: db_outbreak.case_count,
        }
    }
}

/// 用户及其所属单位（导出用户列表时使用）
#[derive(Debug, FromRow)]
pub struct DbUserWithUnit {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub unit_name: Option<String>,
    pub unit_level: Option<String>,
}

// 插入模型

/// 新行政单位插入模型
#[derive(Debug, Clone)]
pub struct NewUnit {
    pub name: String,
    pub level: UnitLevel,
    pub parent_id: Option<i64>,
}

/// 新用户插入模型
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: UserRole,
    pub unit_id: Option<i64>,
}

/// 新病例插入模型
#[derive(Debug, Clone)]
pub struct NewCase {
    pub input: CaseInput,
    pub import_date: NaiveDate,
    pub outbreak_id: Option<i64>,
}

impl NewCase {
    pub fn from_input(input: CaseInput, import_date: NaiveDate) -> Self {
        Self {
            input,
            import_date,
            outbreak_id: None,
        }
    }
}
