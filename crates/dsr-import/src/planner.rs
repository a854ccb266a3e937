//! 病例导入计划
//!
//! 逐行校验解析结果：缺编号、缺乡名、乡名不存在或超出导入人管辖范围的行记为错误，
//! 与已有病例或文件中前面的行重复的跳过。

use std::collections::HashSet;

use dsr_core::utils::non_empty;
use dsr_core::{CaseIdentity, CaseInput, UnitLevel, UnitTree};
use serde::Serialize;

use crate::parser::RawCaseRow;

/// 行级错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub row: u32,
    pub error: String,
}

/// 校验后的导入计划
#[derive(Debug, Clone, Default)]
pub struct CaseImportPlan {
    pub to_insert: Vec<CaseInput>,
    /// 重复的行数
    pub duplicates: usize,
    pub errors: Vec<RowError>,
}

impl CaseImportPlan {
    /// `existing` 为库中已有的三元组，`allowed_communes` 为 None 时不限制乡
    pub fn build(
        rows: Vec<RawCaseRow>,
        tree: &UnitTree,
        existing: &HashSet<CaseIdentity>,
        allowed_communes: Option<&[i64]>,
    ) -> Self {
        let mut plan = CaseImportPlan::default();
        let mut seen: HashSet<CaseIdentity> = existing.clone();

        for row in rows {
            let row_number = row.row_number;
            let Some(patient_code) = non_empty(row.patient_code.clone()) else {
                plan.reject(row_number, "Thiếu Mã số bệnh nhân.".to_string());
                continue;
            };

            let identity = CaseIdentity::new(&patient_code, row.onset_date, row.diagnosis.as_deref());
            if seen.contains(&identity) {
                plan.duplicates += 1;
                continue;
            }

            let Some(commune_name) = non_empty(row.commune_name.clone()) else {
                plan.reject(row_number, "Thiếu tên xã.".to_string());
                continue;
            };
            let Some(commune) = tree.find_by_name(&commune_name, Some(UnitLevel::Commune)) else {
                plan.reject(row_number, format!("Tên xã '{}' không tồn tại.", commune_name));
                continue;
            };
            if allowed_communes.map_or(false, |ids| !ids.contains(&commune.id)) {
                plan.reject(
                    row_number,
                    "Bạn chỉ có quyền import dữ liệu cho xã thuộc phạm vi quản lý của mình.".to_string(),
                );
                continue;
            }

            seen.insert(identity);
            plan.to_insert.push(CaseInput {
                patient_code,
                full_name: row.full_name.unwrap_or_default(),
                birth_date: row.birth_date,
                sex: non_empty(row.sex),
                address_detail: non_empty(row.address_detail),
                hamlet: non_empty(row.hamlet),
                onset_date: row.onset_date,
                diagnosis: non_empty(row.diagnosis),
                admission_date: row.admission_date,
                discharge_date: row.discharge_date,
                severity: non_empty(row.severity),
                status: non_empty(row.status),
                commune_id: commune.id,
            });
        }
        plan
    }

    fn reject(&mut self, row: u32, error: String) {
        self.errors.push(RowError { row, error });
    }

    /// 未写入的行：重复行加错误行
    pub fn skipped(&self) -> usize {
        self.duplicates + self.errors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tests::d;
    use dsr_core::AdminUnit;

    fn tree() -> UnitTree {
        let unit = |id, name: &str, level, parent_id| AdminUnit {
            id,
            name: name.to_string(),
            level,
            parent_id,
        };
        UnitTree::new(vec![
            unit(1, "An Giang", UnitLevel::Province, None),
            unit(2, "Khu vực Long Xuyên", UnitLevel::Region, Some(1)),
            unit(10, "Mỹ Bình", UnitLevel::Commune, Some(2)),
            unit(11, "Bình Đức", UnitLevel::Commune, Some(2)),
            unit(20, "Ấp Đông", UnitLevel::Hamlet, Some(10)),
        ])
    }

    fn row(number: u32, code: &str, commune: &str, diagnosis: &str) -> RawCaseRow {
        RawCaseRow {
            row_number: number,
            patient_code: Some(code.to_string()).filter(|c| !c.is_empty()),
            full_name: Some("Trần Thị B".to_string()),
            commune_name: Some(commune.to_string()).filter(|c| !c.is_empty()),
            onset_date: Some(d(2024, 3, 5)),
            diagnosis: Some(diagnosis.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_plan_rejects_and_skips() {
        // 库中诊断带首尾空白
        let existing: HashSet<CaseIdentity> = [CaseIdentity::new("BN00 ", Some(d(2024, 3, 5)), Some(" Sởi  "))]
            .into_iter()
            .collect();

        let rows = vec![
            row(2, "BN01", "Mỹ Bình", "Sởi"),
            row(3, "", "Mỹ Bình", "Sởi"),
            row(4, "BN00", "Mỹ Bình", "Sởi"),
            row(5, "BN01", "mỹ bình", "Sởi"),
            row(6, "BN02", "", "Sởi"),
            row(7, "BN03", "Không Có", "Sởi"),
            row(8, "BN01", "Mỹ Bình", "Tay - chân - miệng"),
        ];
        let plan = CaseImportPlan::build(rows, &tree(), &existing, None);

        assert_eq!(plan.to_insert.len(), 2);
        assert_eq!(plan.to_insert[0].commune_id, 10);
        assert_eq!(plan.duplicates, 2);
        let error_rows: Vec<u32> = plan.errors.iter().map(|e| e.row).collect();
        assert_eq!(error_rows, vec![3, 6, 7]);
        assert_eq!(plan.errors[2].error, "Tên xã 'Không Có' không tồn tại.");
        assert_eq!(plan.skipped(), 5);
    }

    #[test]
    fn test_plan_restricts_communes() {
        let rows = vec![row(2, "BN01", "Mỹ Bình", "Sởi"), row(3, "BN02", "Bình Đức", "Sởi")];
        let plan = CaseImportPlan::build(rows, &tree(), &HashSet::new(), Some(&[11]));
        assert_eq!(plan.to_insert.len(), 1);
        assert_eq!(plan.to_insert[0].patient_code, "BN02");
        assert_eq!(plan.errors.len(), 1);
        assert_eq!(plan.errors[0].row, 2);
    }

    #[test]
    fn test_hamlet_is_not_a_commune() {
        let rows = vec![row(2, "BN01", "Ấp Đông", "Sởi")];
        let plan = CaseImportPlan::build(rows, &tree(), &HashSet::new(), None);
        assert!(plan.to_insert.is_empty());
        assert_eq!(plan.errors.len(), 1);
    }
}
