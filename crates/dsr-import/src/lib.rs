//! # DSR导入模块
//!
//! 从Excel文件批量导入病例和行政区划树。

pub mod importer;
pub mod parser;
pub mod planner;

pub use importer::{CaseImportOutcome, Importer, UnitImportOutcome};
pub use parser::{parse_case_sheet, parse_unit_sheet, RawCaseRow, RawUnitRow, CASE_HEADERS};
pub use planner::{CaseImportPlan, RowError};
