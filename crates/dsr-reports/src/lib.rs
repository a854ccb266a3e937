//! # DSR Reports
//!
//! 报表引擎：按报告期汇总病例与疫点数据，生成传染病周/月报、登革热报告、
//! 疫点报告与自定义时间段报告的 Excel 工作簿，以及仪表盘统计。

pub(crate) mod layout;

pub mod communicable;
pub mod custom;
pub mod dashboard;
pub mod dengue;
pub mod export;
pub mod generator;
pub mod outbreak;

pub use communicable::{CommunicableAnalysis, CommunicableReport, CommunicableTable, DiseaseCounts};
pub use custom::{CustomReport, RowScope};
pub use dashboard::{top_diseases, weekly_comparison, DashboardData, DashboardRange, DiseaseCount, WeeklyComparison};
pub use dengue::{DengueAnalysis, DengueCounts, DengueReport};
pub use export::{export_cases, export_cases_xlsx, export_users, export_users_xlsx, UserExportRow, CASE_EXPORT_HEADERS};
pub use generator::{
    CustomReportRequest, DashboardQuery, GeneratedReport, ReportGenerator, ReportKind, ReportSettings,
};
pub use outbreak::{OutbreakCounts, OutbreakReport};
