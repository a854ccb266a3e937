//! 核心数据模型定义

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::{DECEASED, DENGUE, HFMD};

/// 行政单位级别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnitLevel {
    #[serde(rename = "Tỉnh")]
    Province,
    #[serde(rename = "Khu vực")]
    Region,
    #[serde(rename = "Xã")]
    Commune,
    #[serde(rename = "Ấp")]
    Hamlet,
}

impl UnitLevel {
    pub const ALL: [UnitLevel; 4] = [
        UnitLevel::Province,
        UnitLevel::Region,
        UnitLevel::Commune,
        UnitLevel::Hamlet,
    ];

    /// 数据库与界面使用的越南语名称
    pub fn label(&self) -> &'static str {
        match self {
            UnitLevel::Province => "Tỉnh",
            UnitLevel::Region => "Khu vực",
            UnitLevel::Commune => "Xã",
            UnitLevel::Hamlet => "Ấp",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|level| level.label().eq_ignore_ascii_case(label) || level.label() == label)
    }

    /// 层级序号，数值越小级别越高
    pub fn rank(&self) -> u8 {
        match self {
            UnitLevel::Province => 0,
            UnitLevel::Region => 1,
            UnitLevel::Commune => 2,
            UnitLevel::Hamlet => 3,
        }
    }

    pub fn is_above(&self, other: UnitLevel) -> bool {
        self.rank() < other.rank()
    }

    /// 报表按哪一级子单位分行
    pub fn child_level(&self) -> Option<UnitLevel> {
        match self {
            UnitLevel::Region => Some(UnitLevel::Commune),
            UnitLevel::Commune => Some(UnitLevel::Hamlet),
            _ => None,
        }
    }

    /// 报表文号
    pub fn document_number(&self) -> &'static str {
        match self {
            UnitLevel::Province => "Số    /BC-KSBT",
            UnitLevel::Region => "Số    /BC-TTYT",
            UnitLevel::Commune => "Số    /BC-TYT",
            UnitLevel::Hamlet => "/BC",
        }
    }

    /// 报表签署人职务
    pub fn signer_title(&self) -> &'static str {
        match self {
            UnitLevel::Province | UnitLevel::Region => "GIÁM ĐỐC",
            UnitLevel::Commune => "TRƯỞNG TRẠM",
            UnitLevel::Hamlet => "THỦ TRƯỞNG ĐƠN VỊ",
        }
    }
}

impl fmt::Display for UnitLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 行政单位
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminUnit {
    pub id: i64,
    pub name: String,
    pub level: UnitLevel,
    pub parent_id: Option<i64>,
}

/// 用户角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum UserRole {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "tinh")]
    Province,
    #[serde(rename = "khuvuc")]
    Region,
    #[serde(rename = "xa")]
    Commune,
}

impl UserRole {
    pub fn code(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Province => "tinh",
            UserRole::Region => "khuvuc",
            UserRole::Commune => "xa",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "admin" => Some(UserRole::Admin),
            "tinh" => Some(UserRole::Province),
            "khuvuc" => Some(UserRole::Region),
            "xa" => Some(UserRole::Commune),
            _ => None,
        }
    }

    /// 非管理员用户的角色由所属单位级别决定
    pub fn for_level(level: UnitLevel) -> Self {
        match level {
            UnitLevel::Province => UserRole::Province,
            UnitLevel::Region => UserRole::Region,
            _ => UserRole::Commune,
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// 用户
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub unit_id: Option<i64>,
}

/// 病例记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Case {
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

impl Case {
    pub fn is_deceased(&self) -> bool {
        self.status.as_deref() == Some(DECEASED)
    }

    pub fn has_diagnosis(&self, diagnosis: &str) -> bool {
        self.diagnosis.as_deref() == Some(diagnosis)
    }

    pub fn onset_within(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.onset_date.map_or(false, |d| d >= start && d <= end)
    }

    /// 发病时年龄（年），按365.25天折算
    pub fn age_at_onset(&self) -> Option<f64> {
        let onset = self.onset_date?;
        let birth = self.birth_date?;
        Some((onset - birth).num_days() as f64 / 365.25)
    }
}

/// 病例数据（新建与更新共用）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CaseInput {
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
    pub commune_id: i64,
}

impl CaseInput {
    /// 唯一性三元组：患者编号、发病日期、主要诊断
    pub fn identity(&self) -> CaseIdentity {
        CaseIdentity::new(&self.patient_code, self.onset_date, self.diagnosis.as_deref())
    }
}

/// 病例唯一性键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaseIdentity {
    pub patient_code: String,
    pub onset_date: Option<NaiveDate>,
    pub diagnosis: Option<String>,
}

impl CaseIdentity {
    /// 编号与诊断去除首尾空白，空诊断视为无
    pub fn new(patient_code: &str, onset_date: Option<NaiveDate>, diagnosis: Option<&str>) -> Self {
        Self {
            patient_code: patient_code.trim().to_string(),
            onset_date,
            diagnosis: diagnosis.map(str::trim).filter(|d| !d.is_empty()).map(str::to_string),
        }
    }
}

impl From<&Case> for CaseIdentity {
    fn from(case: &Case) -> Self {
        Self::new(&case.patient_code, case.onset_date, case.diagnosis.as_deref())
    }
}

/// 疫点病种
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OutbreakDisease {
    #[serde(rename = "SXH")]
    Dengue,
    #[serde(rename = "TCM")]
    Hfmd,
}

impl OutbreakDisease {
    pub fn code(&self) -> &'static str {
        match self {
            OutbreakDisease::Dengue => "SXH",
            OutbreakDisease::Hfmd => "TCM",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "SXH" => Some(OutbreakDisease::Dengue),
            "TCM" => Some(OutbreakDisease::Hfmd),
            _ => None,
        }
    }

    /// 对应的病例主要诊断
    pub fn diagnosis(&self) -> &'static str {
        match self {
            OutbreakDisease::Dengue => DENGUE,
            OutbreakDisease::Hfmd => HFMD,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            OutbreakDisease::Dengue => "Sốt xuất huyết",
            OutbreakDisease::Hfmd => "Tay chân miệng",
        }
    }
}

impl fmt::Display for OutbreakDisease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// 疫点判定标准
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutbreakCriteria {
    /// 7天内出现2例及以上
    pub two_cases_in_7_days: bool,
    /// 出现重症病例
    pub severe_case: bool,
    /// 实验室确诊
    pub lab_confirmed: bool,
    /// 出现死亡病例
    pub death: bool,
}

/// 疫点（ổ dịch）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Outbreak {
    pub id: i64,
    pub disease: OutbreakDisease,
    pub detected_on: NaiveDate,
    pub resolved_on: Option<NaiveDate>,
    pub location: Option<String>,
    pub hamlet: Option<String>,
    pub commune_id: i64,
    /// 手足口病的发现场所（家庭、学校等）
    pub hfmd_place: Option<String>,
    pub criteria: OutbreakCriteria,
    pub dengue_test_kind: Option<String>,
    pub case_count: i32,
}

impl Outbreak {
    pub fn is_resolved(&self) -> bool {
        self.resolved_on.is_some()
    }

    /// 在 [start, end] 期间内处于活动状态
    pub fn active_during(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.detected_on <= end && self.resolved_on.map_or(true, |r| r >= start)
    }

    /// 截至某日仍未处理完毕
    pub fn open_at(&self, day: NaiveDate) -> bool {
        self.detected_on <= day && self.resolved_on.map_or(true, |r| r > day)
    }
}

/// 疫点数据（新建与更新共用）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutbreakInput {
    pub disease: OutbreakDisease,
    pub detected_on: NaiveDate,
    pub resolved_on: Option<NaiveDate>,
    pub location: Option<String>,
    pub hamlet: Option<String>,
    pub commune_id: i64,
    pub hfmd_place: Option<String>,
    #[serde(default)]
    pub criteria: OutbreakCriteria,
    pub dengue_test_kind: Option<String>,
    #[serde(default)]
    pub case_count: i32,
}

/// 病例列表过滤条件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseFilter {
    pub onset_from: Option<NaiveDate>,
    pub onset_to: Option<NaiveDate>,
    pub import_from: Option<NaiveDate>,
    pub import_to: Option<NaiveDate>,
    pub diagnosis: Option<String>,
    pub name: Option<String>,
    pub hamlet: Option<String>,
    /// 限定到这些乡级单位，None 表示不限制
    pub commune_ids: Option<Vec<i64>>,
}

/// 疫点状态过滤
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutbreakStatus {
    Resolved,
    Unresolved,
}

/// 疫点列表过滤条件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutbreakFilter {
    pub disease: Option<OutbreakDisease>,
    pub status: Option<OutbreakStatus>,
    pub detected_from: Option<NaiveDate>,
    pub detected_to: Option<NaiveDate>,
    pub commune_ids: Option<Vec<i64>>,
}

/// 分页结果
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> i64 {
        if self.per_page <= 0 {
            return 0;
        }
        (self.total + self.per_page - 1) / self.per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_case() -> Case {
        Case {
            id: 1,
            patient_code: "BN001".to_string(),
            full_name: "Nguyễn Văn A".to_string(),
            birth_date: NaiveDate::from_ymd_opt(2015, 3, 1),
            sex: Some("Nam".to_string()),
            address_detail: None,
            hamlet: Some("Ấp 1".to_string()),
            onset_date: NaiveDate::from_ymd_opt(2024, 3, 10),
            diagnosis: Some(DENGUE.to_string()),
            admission_date: None,
            discharge_date: None,
            severity: None,
            status: Some(DECEASED.to_string()),
            import_date: NaiveDate::from_ymd_opt(2024, 3, 12).unwrap(),
            commune_id: 10,
            outbreak_id: None,
        }
    }

    #[test]
    fn test_unit_level_labels() {
        assert_eq!(UnitLevel::from_label("Khu vực"), Some(UnitLevel::Region));
        assert_eq!(UnitLevel::from_label(" Xã "), Some(UnitLevel::Commune));
        assert_eq!(UnitLevel::from_label("Huyện"), None);
        assert!(UnitLevel::Province.is_above(UnitLevel::Commune));
        assert!(!UnitLevel::Hamlet.is_above(UnitLevel::Commune));
        assert_eq!(UnitLevel::Commune.child_level(), Some(UnitLevel::Hamlet));
        assert_eq!(UnitLevel::Province.child_level(), None);
    }

    #[test]
    fn test_role_for_level() {
        assert_eq!(UserRole::for_level(UnitLevel::Province), UserRole::Province);
        assert_eq!(UserRole::for_level(UnitLevel::Region), UserRole::Region);
        assert_eq!(UserRole::for_level(UnitLevel::Commune), UserRole::Commune);
        assert_eq!(UserRole::for_level(UnitLevel::Hamlet), UserRole::Commune);
        assert_eq!(UserRole::from_code("khuvuc"), Some(UserRole::Region));
    }

    #[test]
    fn test_case_helpers() {
        let case = sample_case();
        assert!(case.is_deceased());
        assert!(case.has_diagnosis(DENGUE));
        let age = case.age_at_onset().unwrap();
        assert!(age > 9.0 && age < 9.1);
        assert!(case.onset_within(
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
        ));
    }

    #[test]
    fn test_case_identity_ignores_surrounding_whitespace() {
        let mut stored = sample_case();
        stored.patient_code = " BN001 ".to_string();
        stored.diagnosis = Some(format!("  {} ", DENGUE));
        let onset = stored.onset_date;

        let identity = CaseIdentity::from(&stored);
        assert_eq!(identity, CaseIdentity::new("BN001", onset, Some(DENGUE)));
        assert_eq!(CaseIdentity::new("BN001", onset, Some("  ")).diagnosis, None);
    }

    #[test]
    fn test_outbreak_activity() {
        let outbreak = Outbreak {
            id: 1,
            disease: OutbreakDisease::Hfmd,
            detected_on: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            resolved_on: NaiveDate::from_ymd_opt(2024, 2, 20),
            location: None,
            hamlet: None,
            commune_id: 1,
            hfmd_place: Some("Trường học".to_string()),
            criteria: OutbreakCriteria::default(),
            dengue_test_kind: None,
            case_count: 2,
        };
        let d = |m, day| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
        assert!(outbreak.active_during(d(2, 15), d(2, 28)));
        assert!(!outbreak.active_during(d(2, 21), d(2, 28)));
        assert!(outbreak.open_at(d(2, 19)));
        assert!(!outbreak.open_at(d(2, 20)));
        assert_eq!(OutbreakDisease::from_code("tcm"), Some(OutbreakDisease::Hfmd));
    }
}
