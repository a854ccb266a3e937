//! 导入执行：解析、校验后在单个事务内写入数据库

use chrono::NaiveDate;
use dsr_core::{DsrError, Result, UnitTree};
use dsr_database::{DatabasePool, DatabaseQueries, NewCase};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::parser::{parse_case_sheet, parse_unit_sheet};
use crate::planner::{CaseImportPlan, RowError};

/// 病例导入结果
#[derive(Debug, Clone, Serialize)]
pub struct CaseImportOutcome {
    pub inserted: usize,
    pub skipped: usize,
    pub errors: Vec<RowError>,
    pub message: String,
}

impl CaseImportOutcome {
    fn from_plan(plan: &CaseImportPlan, inserted: usize) -> Self {
        let skipped = plan.skipped();
        Self {
            inserted,
            skipped,
            errors: plan.errors.clone(),
            message: format!(
                "Hoàn thành! Đã thêm {} ca mới, bỏ qua {} ca trùng lặp hoặc có lỗi.",
                inserted, skipped
            ),
        }
    }
}

/// 单位树导入结果
#[derive(Debug, Clone, Serialize)]
pub struct UnitImportOutcome {
    pub inserted: usize,
    pub errors: Vec<String>,
}

/// 在阻塞线程池中解析工作簿
async fn parse_blocking<T, F>(bytes: Vec<u8>, parse: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&[u8]) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || parse(&bytes))
        .await
        .map_err(|e| DsrError::Internal(format!("import parse task failed: {}", e)))?
}

/// 病例与单位树导入器
pub struct Importer<'a> {
    pool: &'a DatabasePool,
}

impl<'a> Importer<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 导入病例文件
    ///
    /// `allowed_communes` 限定可导入的乡，None 表示不限制；`import_date` 记为录入日期。
    pub async fn import_cases(
        &self,
        bytes: Vec<u8>,
        allowed_communes: Option<Vec<i64>>,
        import_date: NaiveDate,
    ) -> Result<CaseImportOutcome> {
        let rows = parse_blocking(bytes, parse_case_sheet).await?;
        let queries = DatabaseQueries::new(self.pool);

        let mut codes: Vec<String> = rows
            .iter()
            .filter_map(|r| r.patient_code.as_ref().map(|c| c.trim().to_string()))
            .collect();
        codes.sort();
        codes.dedup();
        let existing = queries.existing_identities(&codes).await?;
        let tree = UnitTree::new(queries.list_units().await?);

        let plan = CaseImportPlan::build(rows, &tree, &existing, allowed_communes.as_deref());
        let cases: Vec<NewCase> = plan
            .to_insert
            .iter()
            .cloned()
            .map(|input| NewCase::from_input(input, import_date))
            .collect();

        let inserted = if cases.is_empty() {
            0
        } else {
            queries.insert_cases(&cases).await.map_err(|e| {
                error!("Case import rolled back: {}", e);
                e
            })?
        };

        if !plan.errors.is_empty() {
            warn!("Case import rejected {} rows", plan.errors.len());
        }
        info!(
            "Case import finished: {} inserted, {} duplicates, {} errors",
            inserted,
            plan.duplicates,
            plan.errors.len()
        );
        Ok(CaseImportOutcome::from_plan(&plan, inserted))
    }

    /// 导入单位树，`replace` 为真时先清空现有单位
    pub async fn import_units(&self, bytes: Vec<u8>, replace: bool) -> Result<UnitImportOutcome> {
        let (units, mut errors) = parse_blocking(bytes, parse_unit_sheet).await?;
        let rows: Vec<_> = units
            .into_iter()
            .map(|u| (u.name, u.level, u.parent_name))
            .collect();

        let queries = DatabaseQueries::new(self.pool);
        let (inserted, tree_errors) = queries.import_unit_tree(&rows, replace).await?;
        errors.extend(tree_errors);

        let tree = UnitTree::new(queries.list_units().await?);
        if let Err(e) = tree.validate() {
            warn!("Imported unit tree is not consistent: {}", e);
            errors.push(e.to_string());
        }

        info!("Unit import finished: {} inserted, {} errors", inserted, errors.len());
        Ok(UnitImportOutcome { inserted, errors })
    }
}
