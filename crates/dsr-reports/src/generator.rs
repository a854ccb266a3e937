//! 报告生成器
//!
//! 通过 [`ReportDataSource`] 取数，汇总后在阻塞线程池中渲染工作簿。

use std::io::{Cursor, Write};
use std::sync::Arc;

use chrono::NaiveDate;
use dsr_core::hierarchy::display_name;
use dsr_core::{
    AdminUnit, Case, DateRange, DsrError, OutbreakDisease, PeriodWindow, ReportDataSource, ReportPeriod, Result,
    UnitLevel, UnitTree,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::communicable::{merge_cases, CommunicableReport};
use crate::custom::{CustomReport, RowScope};
use crate::dashboard::{comparison_query_range, top_diseases, weekly_comparison, DashboardData, DashboardRange};
use crate::dengue::{is_dengue_case, DengueReport};
use crate::layout::SheetResult;
use crate::outbreak::OutbreakReport;

/// 报告抬头与正文使用的名称
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSettings {
    /// 省级单位的上级机关，如 "Sở Y tế An Giang"
    pub authority_name: String,
    /// 正文中省级单位的称呼
    pub province_display_name: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            authority_name: "Sở Y tế".to_string(),
            province_display_name: "toàn tỉnh".to_string(),
        }
    }
}

/// 报告模板
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Communicable,
    Dengue,
    DengueOutbreak,
    HfmdOutbreak,
    /// 打包全部报告
    All,
}

impl ReportKind {
    fn file_prefix(&self) -> &'static str {
        match self {
            ReportKind::Communicable => "BaoCao_BTN",
            ReportKind::Dengue => "BaoCao_SXH",
            ReportKind::DengueOutbreak => "BaoCao_ODich_SXH",
            ReportKind::HfmdOutbreak => "BaoCao_ODich_TCM",
            ReportKind::All => "TatCaBaoCao",
        }
    }

    /// 下载时显示的文件名，如 BaoCao_BTN_Thang_An Giang_2024_Thang3.xlsx
    pub fn file_name(&self, unit_name: &str, window: &PeriodWindow) -> String {
        match self {
            ReportKind::All => format!(
                "{}_{}_{}_{}.zip",
                self.file_prefix(),
                unit_name,
                window.year(),
                window.file_suffix()
            ),
            _ => {
                let monthly = if window.period.is_weekly() { "" } else { "_Thang" };
                format!(
                    "{}{}_{}_{}_{}.xlsx",
                    self.file_prefix(),
                    monthly,
                    unit_name,
                    window.year(),
                    window.file_suffix()
                )
            }
        }
    }
}

/// 自定义时间段报告请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomReportRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub unit_ids: Vec<i64>,
}

impl CustomReportRequest {
    pub fn file_name(&self) -> String {
        format!(
            "BaoCao_BTN_TuyChinh_{}-{}.xlsx",
            self.start.format("%Y%m%d"),
            self.end.format("%Y%m%d")
        )
    }
}

/// 仪表盘筛选条件，乡优先于片区
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardQuery {
    pub disease: Option<String>,
    pub region_id: Option<i64>,
    pub commune_id: Option<i64>,
    #[serde(default)]
    pub range: DashboardRange,
}

/// 生成好的文件
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl GeneratedReport {
    pub fn extension(&self) -> &'static str {
        if self.file_name.ends_with(".zip") {
            "zip"
        } else {
            "xlsx"
        }
    }
}

pub(crate) async fn render_blocking<F>(render: F) -> Result<Vec<u8>>
where
    F: FnOnce() -> SheetResult<Vec<u8>> + Send + 'static,
{
    tokio::task::spawn_blocking(render)
        .await
        .map_err(|e| DsrError::Internal(format!("report render task failed: {}", e)))?
        .map_err(|e| DsrError::Spreadsheet(e.to_string()))
}

fn zip_bundle(files: Vec<GeneratedReport>) -> Result<Vec<u8>> {
    let zip_error = |e: zip::result::ZipError| DsrError::Report(format!("Không thể nén báo cáo: {}", e));
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for file in files {
        writer.start_file(file.file_name, options).map_err(zip_error)?;
        writer.write_all(&file.bytes)?;
    }
    let cursor = writer.finish().map_err(zip_error)?;
    Ok(cursor.into_inner())
}

/// 报告生成器
pub struct ReportGenerator {
    source: Arc<dyn ReportDataSource>,
    settings: ReportSettings,
}

impl ReportGenerator {
    pub fn new(source: Arc<dyn ReportDataSource>, settings: ReportSettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> &ReportSettings {
        &self.settings
    }

    pub async fn load_tree(&self) -> Result<UnitTree> {
        Ok(UnitTree::new(self.source.units().await?))
    }

    /// 按模板生成单位 `unit_id` 在报告期内的报告
    pub async fn generate(&self, unit_id: i64, kind: ReportKind, period: ReportPeriod) -> Result<GeneratedReport> {
        let window = period.resolve()?;
        let tree = self.load_tree().await?;
        let unit = tree.require(unit_id)?.clone();
        info!(
            "Generating {:?} report for unit {} ({}), {}",
            kind,
            unit.id,
            unit.name,
            window.label()
        );

        let report = match kind {
            ReportKind::All => {
                let mut files = Vec::new();
                for part in [
                    ReportKind::Communicable,
                    ReportKind::Dengue,
                    ReportKind::DengueOutbreak,
                    ReportKind::HfmdOutbreak,
                ] {
                    files.push(self.render_single(&tree, &unit, part, window).await?);
                }
                let bytes = tokio::task::spawn_blocking(move || zip_bundle(files))
                    .await
                    .map_err(|e| DsrError::Internal(format!("report bundle task failed: {}", e)))??;
                GeneratedReport {
                    file_name: kind.file_name(&unit.name, &window),
                    bytes,
                }
            }
            _ => self.render_single(&tree, &unit, kind, window).await?,
        };

        info!("Report {} generated ({} bytes)", report.file_name, report.bytes.len());
        Ok(report)
    }

    async fn render_single(
        &self,
        tree: &UnitTree,
        unit: &AdminUnit,
        kind: ReportKind,
        window: PeriodWindow,
    ) -> Result<GeneratedReport> {
        let bytes = match kind {
            ReportKind::Communicable => {
                let report = self.communicable(tree, unit, window).await?;
                render_blocking(move || report.render()).await?
            }
            ReportKind::Dengue => {
                let report = self.dengue(tree, unit, window).await?;
                render_blocking(move || report.render()).await?
            }
            ReportKind::DengueOutbreak => {
                let report = self.outbreak(tree, unit, OutbreakDisease::Dengue, window).await?;
                render_blocking(move || report.render()).await?
            }
            ReportKind::HfmdOutbreak => {
                let report = self.outbreak(tree, unit, OutbreakDisease::Hfmd, window).await?;
                render_blocking(move || report.render()).await?
            }
            ReportKind::All => {
                return Err(DsrError::Internal("nested report bundle".to_string()));
            }
        };
        Ok(GeneratedReport {
            file_name: kind.file_name(&unit.name, &window),
            bytes,
        })
    }

    /// 本期、上期与年初以来的病例，加上本期补报的病例
    async fn period_cases(&self, commune_ids: &[i64], window: &PeriodWindow) -> Result<Vec<Case>> {
        let range = DateRange::new(window.query_start(), window.current.end)?;
        let by_onset = self.source.cases_by_onset(commune_ids, range).await?;
        let backfill = self
            .source
            .cases_by_import(commune_ids, window.current, window.current.start)
            .await?;
        debug!("Loaded {} cases by onset, {} backfill candidates", by_onset.len(), backfill.len());
        Ok(merge_cases(by_onset, backfill))
    }

    pub async fn communicable(&self, tree: &UnitTree, unit: &AdminUnit, window: PeriodWindow) -> Result<CommunicableReport> {
        let units = tree.reporting_units(unit.id)?;
        let commune_ids = tree.commune_ids_under(unit.id);
        let cases = self.period_cases(&commune_ids, &window).await?;
        let display = display_name(unit, &self.settings.province_display_name);

        let report = CommunicableReport::build(
            tree.clone(),
            unit,
            &units,
            cases,
            window,
            &self.settings.authority_name,
            &display,
        );
        info!(
            "Communicable report for {}: {} rows, {} detail cases",
            unit.name,
            report.table.rows.len(),
            report.detail_cases.len()
        );
        Ok(report)
    }

    pub async fn dengue(&self, tree: &UnitTree, unit: &AdminUnit, window: PeriodWindow) -> Result<DengueReport> {
        let units = tree.reporting_units(unit.id)?;
        let commune_ids = tree.commune_ids_under(unit.id);
        let range = DateRange::new(window.query_start(), window.current.end)?;
        let cases = self.source.cases_by_onset(&commune_ids, range).await?;

        let prior_year_cumulative = match window.prior_year_ytd() {
            Some(prior) => self
                .source
                .cases_by_onset(&commune_ids, prior)
                .await?
                .iter()
                .filter(|c| is_dengue_case(c))
                .count() as u32,
            None => 0,
        };

        let report = DengueReport::build(
            tree.clone(),
            unit,
            &units,
            cases,
            prior_year_cumulative,
            window,
            &self.settings.authority_name,
        );
        info!("Dengue report for {}: {} rows", unit.name, report.rows.len());
        Ok(report)
    }

    pub async fn outbreak(
        &self,
        tree: &UnitTree,
        unit: &AdminUnit,
        disease: OutbreakDisease,
        window: PeriodWindow,
    ) -> Result<OutbreakReport> {
        let units = tree.reporting_units(unit.id)?;
        let commune_ids = tree.commune_ids_under(unit.id);
        let outbreaks = self
            .source
            .outbreaks_overlapping(&commune_ids, disease, window.span_with_ytd())
            .await?;
        let ids: Vec<i64> = outbreaks.iter().map(|o| o.id).collect();
        let cases = if ids.is_empty() {
            Vec::new()
        } else {
            self.source.cases_for_outbreaks(&ids).await?
        };

        let report = OutbreakReport::build(
            tree.clone(),
            unit,
            &units,
            disease,
            outbreaks,
            cases,
            window,
            &self.settings.authority_name,
        );
        info!(
            "Outbreak report ({}) for {}: {} outbreaks active in period",
            disease.code(),
            unit.name,
            report.active.len()
        );
        Ok(report)
    }

    /// 自定义时间段报告；所选单位必须都在 `scope_unit_id` 管辖范围内
    pub async fn custom(&self, scope_unit_id: i64, request: &CustomReportRequest) -> Result<GeneratedReport> {
        if request.start > request.end {
            return Err(DsrError::Validation(
                "Ngày bắt đầu không được sau ngày kết thúc.".to_string(),
            ));
        }
        if request.unit_ids.is_empty() {
            return Err(DsrError::Validation(
                "Vui lòng chọn ít nhất một đơn vị.".to_string(),
            ));
        }

        let tree = self.load_tree().await?;
        let scope_unit = tree.require(scope_unit_id)?.clone();
        let mut selected = Vec::new();
        for id in &request.unit_ids {
            let unit = tree.require(*id)?;
            if !tree.is_within(scope_unit_id, unit.id) {
                return Err(DsrError::Permission(format!(
                    "Bạn không có quyền xem báo cáo của đơn vị '{}'.",
                    unit.name
                )));
            }
            selected.push((unit.clone(), RowScope::for_unit(&tree, unit)));
        }
        selected.sort_by(|(a, _), (b, _)| a.name.cmp(&b.name));

        let mut commune_ids: Vec<i64> = selected.iter().flat_map(|(_, scope)| scope.commune_ids()).collect();
        commune_ids.sort_unstable();
        commune_ids.dedup();

        let range = DateRange::new(request.start, request.end)?;
        let cases = self.source.cases_by_onset(&commune_ids, range).await?;
        info!(
            "Custom report for {}: {} units, {} cases, {}",
            scope_unit.name,
            selected.len(),
            cases.len(),
            range.subtitle()
        );

        let report = CustomReport::build(
            tree,
            &scope_unit,
            &selected,
            cases,
            range,
            &self.settings.authority_name,
        );
        let bytes = render_blocking(move || report.render()).await?;
        Ok(GeneratedReport {
            file_name: request.file_name(),
            bytes,
        })
    }

    /// 仪表盘数据；筛选的片区或乡必须在管辖范围内
    pub async fn dashboard(&self, scope_unit_id: i64, query: &DashboardQuery, today: NaiveDate) -> Result<DashboardData> {
        let tree = self.load_tree().await?;
        let scope_unit = tree.require(scope_unit_id)?;

        let focus = match (query.commune_id, query.region_id) {
            (Some(id), _) | (None, Some(id)) => tree.require(id)?,
            (None, None) => scope_unit,
        };
        if !tree.is_within(scope_unit_id, focus.id) {
            return Err(DsrError::Permission(format!(
                "Bạn không có quyền xem dữ liệu của đơn vị '{}'.",
                focus.name
            )));
        }

        let commune_ids = if focus.level == UnitLevel::Commune {
            vec![focus.id]
        } else {
            tree.commune_ids_under(focus.id)
        };
        let cases = if commune_ids.is_empty() {
            Vec::new()
        } else {
            self.source
                .cases_by_onset(&commune_ids, comparison_query_range(today)?)
                .await?
        };

        let disease = query.disease.as_deref().filter(|d| !d.is_empty() && *d != "Tất cả");
        let weekly = weekly_comparison(&cases, today, disease, &focus.name);
        let top = top_diseases(&cases, &query.range.dates(today));

        let mut diseases_in_scope: Vec<String> = cases.iter().filter_map(|c| c.diagnosis.clone()).collect();
        diseases_in_scope.sort();
        diseases_in_scope.dedup();

        Ok(DashboardData {
            weekly,
            range_label: query.range.label(today),
            top_diseases: top,
            diseases_in_scope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use calamine::Reader;
    use std::io::Read;
    use dsr_core::catalog::{DENGUE, HFMD};
    use dsr_core::{MemorySource, Outbreak, OutbreakCriteria};

    fn generator(cases: Vec<Case>, outbreaks: Vec<Outbreak>) -> ReportGenerator {
        let source = Arc::new(MemorySource::new(sample_units(), cases, outbreaks));
        ReportGenerator::new(
            source,
            ReportSettings {
                authority_name: "Sở Y tế An Giang".to_string(),
                province_display_name: "toàn tỉnh".to_string(),
            },
        )
    }

    #[test]
    fn test_file_names() {
        let week = ReportPeriod::Week { year: 2024, week: 12 }.resolve().unwrap();
        let month = ReportPeriod::Month { year: 2024, month: 3 }.resolve().unwrap();
        assert_eq!(
            ReportKind::Communicable.file_name("An Giang", &week),
            "BaoCao_BTN_An Giang_2024_Tuan12.xlsx"
        );
        assert_eq!(
            ReportKind::Dengue.file_name("An Giang", &month),
            "BaoCao_SXH_Thang_An Giang_2024_Thang3.xlsx"
        );
        assert_eq!(
            ReportKind::HfmdOutbreak.file_name("Mỹ Bình", &week),
            "BaoCao_ODich_TCM_Mỹ Bình_2024_Tuan12.xlsx"
        );
        assert_eq!(
            ReportKind::All.file_name("An Giang", &month),
            "TatCaBaoCao_An Giang_2024_Thang3.zip"
        );
        let custom = CustomReportRequest {
            start: d(2024, 1, 1),
            end: d(2024, 3, 31),
            unit_ids: vec![10],
        };
        assert_eq!(custom.file_name(), "BaoCao_BTN_TuyChinh_20240101-20240331.xlsx");
    }

    #[tokio::test]
    async fn test_communicable_includes_backfill() {
        let window = ReportPeriod::Week { year: 2024, week: 10 }.resolve().unwrap();
        let start = window.current.start;
        let cases = vec![
            case(1, DENGUE, 10, start, start),
            // 上月发病、本周录入
            case(2, DENGUE, 11, d(2024, 2, 1), start),
            case(3, HFMD, 12, d(2024, 1, 10), d(2024, 1, 11)),
        ];
        let generator = generator(cases, Vec::new());
        let tree = generator.load_tree().await.unwrap();
        let unit = tree.get(2).unwrap().clone();

        let report = generator.communicable(&tree, &unit, window).await.unwrap();
        let dengue = dsr_core::catalog::REPORTABLE_DISEASES
            .iter()
            .position(|d| *d == DENGUE)
            .unwrap();
        assert_eq!(report.table.totals[dengue].period_cases, 1);
        assert_eq!(report.table.totals[dengue].backfill_cases, 1);
        assert_eq!(report.table.totals[dengue].cumulative_cases, 2);
        // 片区 2 不含 Vĩnh Mỹ
        assert_eq!(report.detail_cases.len(), 2);
    }

    #[tokio::test]
    async fn test_dengue_prior_year_cumulative() {
        let window = ReportPeriod::Month { year: 2024, month: 3 }.resolve().unwrap();
        let cases = vec![
            case(1, DENGUE, 10, d(2024, 3, 5), d(2024, 3, 5)),
            case(2, DENGUE, 10, d(2023, 2, 5), d(2023, 2, 5)),
            case(3, DENGUE, 10, d(2023, 3, 30), d(2023, 3, 30)),
            case(4, DENGUE, 10, d(2023, 4, 2), d(2023, 4, 2)),
            case(5, HFMD, 10, d(2023, 2, 5), d(2023, 2, 5)),
        ];
        let generator = generator(cases, Vec::new());
        let tree = generator.load_tree().await.unwrap();
        let unit = tree.get(1).unwrap().clone();

        let report = generator.dengue(&tree, &unit, window).await.unwrap();
        let analysis = report.analysis.as_ref().unwrap();
        assert_eq!(analysis.cumulative, 1);
        assert_eq!(analysis.prior_year_cumulative, 2);
    }

    #[tokio::test]
    async fn test_outbreak_report_loads_linked_cases() {
        let window = ReportPeriod::Week { year: 2024, week: 18 }.resolve().unwrap();
        let outbreak = Outbreak {
            id: 5,
            disease: OutbreakDisease::Dengue,
            detected_on: window.current.start,
            resolved_on: None,
            location: Some("Tổ 3".to_string()),
            hamlet: None,
            commune_id: 12,
            hfmd_place: None,
            criteria: OutbreakCriteria::default(),
            dengue_test_kind: None,
            case_count: 1,
        };
        let mut linked = case(1, DENGUE, 12, window.current.start, window.current.start);
        linked.outbreak_id = Some(5);
        let generator = generator(vec![linked], vec![outbreak]);

        let tree = generator.load_tree().await.unwrap();
        let unit = tree.get(1).unwrap().clone();
        let report = generator
            .outbreak(&tree, &unit, OutbreakDisease::Dengue, window)
            .await
            .unwrap();
        assert_eq!(report.active.len(), 1);
        assert_eq!(report.active[0].1.len(), 1);
        assert_eq!(report.totals.linked_cases, 1);

        let hfmd = generator
            .outbreak(&tree, &unit, OutbreakDisease::Hfmd, window)
            .await
            .unwrap();
        assert!(hfmd.active.is_empty());
    }

    #[tokio::test]
    async fn test_outbreak_report_first_week_starting_in_prior_year() {
        // 2025年第1周为 2024-12-30..2025-01-05
        let window = ReportPeriod::Week { year: 2025, week: 1 }.resolve().unwrap();
        let outbreak = Outbreak {
            id: 7,
            disease: OutbreakDisease::Dengue,
            detected_on: d(2024, 12, 30),
            resolved_on: Some(d(2024, 12, 31)),
            location: None,
            hamlet: None,
            commune_id: 12,
            hfmd_place: None,
            criteria: OutbreakCriteria::default(),
            dengue_test_kind: None,
            case_count: 1,
        };
        let generator = generator(Vec::new(), vec![outbreak]);

        let tree = generator.load_tree().await.unwrap();
        let unit = tree.get(1).unwrap().clone();
        let report = generator
            .outbreak(&tree, &unit, OutbreakDisease::Dengue, window)
            .await
            .unwrap();
        assert_eq!(report.active.len(), 1);
        assert_eq!(report.totals.new_detected, 1);
        assert_eq!(report.totals.resolved, 1);
        assert_eq!(report.totals.active_at_end, 0);
        // 累计只算本年
        assert_eq!(report.totals.cumulative, 0);
    }

    #[tokio::test]
    async fn test_generate_single_workbook() {
        let window = ReportPeriod::Week { year: 2024, week: 10 }.resolve().unwrap();
        let start = window.current.start;
        let generator = generator(vec![case(1, DENGUE, 13, start, start)], Vec::new());

        let report = generator
            .generate(1, ReportKind::Dengue, ReportPeriod::Week { year: 2024, week: 10 })
            .await
            .unwrap();
        assert_eq!(report.file_name, "BaoCao_SXH_An Giang_2024_Tuan10.xlsx");
        assert_eq!(report.extension(), "xlsx");
        let mut book = open(&report.bytes);
        assert!(sheet_names(&mut book).contains(&"BaoCaoSXH".to_string()));
    }

    #[tokio::test]
    async fn test_generate_all_bundle() {
        let generator = generator(Vec::new(), Vec::new());
        let report = generator
            .generate(1, ReportKind::All, ReportPeriod::Month { year: 2024, month: 3 })
            .await
            .unwrap();
        assert_eq!(report.extension(), "zip");

        let mut archive = zip::ZipArchive::new(Cursor::new(report.bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "BaoCao_BTN_Thang_An Giang_2024_Thang3.xlsx",
                "BaoCao_ODich_SXH_Thang_An Giang_2024_Thang3.xlsx",
                "BaoCao_ODich_TCM_Thang_An Giang_2024_Thang3.xlsx",
                "BaoCao_SXH_Thang_An Giang_2024_Thang3.xlsx",
            ]
        );

        let mut entry = archive.by_name("BaoCao_BTN_Thang_An Giang_2024_Thang3.xlsx").unwrap();
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).unwrap();
        drop(entry);
        let mut book = open(&bytes);
        assert_eq!(book.sheet_names()[0], "BaoCaoBTN_TongHop");
    }

    #[tokio::test]
    async fn test_custom_report_validation() {
        let generator = generator(Vec::new(), Vec::new());
        let reversed = CustomReportRequest {
            start: d(2024, 3, 2),
            end: d(2024, 3, 1),
            unit_ids: vec![10],
        };
        assert!(matches!(
            generator.custom(1, &reversed).await,
            Err(DsrError::Validation(_))
        ));

        let empty = CustomReportRequest {
            start: d(2024, 3, 1),
            end: d(2024, 3, 31),
            unit_ids: Vec::new(),
        };
        assert!(matches!(generator.custom(1, &empty).await, Err(DsrError::Validation(_))));

        // 片区 2 不能选片区 3 下的乡
        let outside = CustomReportRequest {
            start: d(2024, 3, 1),
            end: d(2024, 3, 31),
            unit_ids: vec![12],
        };
        assert!(matches!(generator.custom(2, &outside).await, Err(DsrError::Permission(_))));
    }

    #[tokio::test]
    async fn test_custom_report_generated() {
        let generator = generator(vec![case(1, DENGUE, 12, d(2024, 3, 5), d(2024, 3, 5))], Vec::new());
        let request = CustomReportRequest {
            start: d(2024, 3, 1),
            end: d(2024, 3, 31),
            unit_ids: vec![3, 2],
        };
        let report = generator.custom(1, &request).await.unwrap();
        let mut book = open(&report.bytes);
        let summary = sheet(&mut book, "BaoCaoTuyChinh");
        // 按名称排序：Châu Đốc 在 Long Xuyên 之前
        assert_eq!(text(&summary, 11, 0), "Khu vực Châu Đốc");
        assert_eq!(number(&summary, 11, 5), 1.0);
        assert_eq!(text(&summary, 12, 0), "Khu vực Long Xuyên");
    }

    #[tokio::test]
    async fn test_dashboard_scope_and_filters() {
        let today = d(2024, 3, 15);
        let cases = vec![
            case(1, DENGUE, 10, d(2024, 3, 10), d(2024, 3, 10)),
            case(2, HFMD, 12, d(2024, 3, 11), d(2024, 3, 11)),
            case(3, DENGUE, 11, d(2023, 3, 11), d(2023, 3, 11)),
        ];
        let generator = generator(cases, Vec::new());

        let all = generator.dashboard(1, &DashboardQuery::default(), today).await.unwrap();
        assert_eq!(all.top_diseases.len(), 2);
        assert_eq!(all.diseases_in_scope, vec![DENGUE.to_string(), HFMD.to_string()]);
        assert_eq!(all.range_label, "30 ngày qua");

        let region = DashboardQuery {
            region_id: Some(2),
            disease: Some(DENGUE.to_string()),
            ..Default::default()
        };
        let data = generator.dashboard(1, &region, today).await.unwrap();
        assert_eq!(data.top_diseases.len(), 1);
        assert_eq!(data.weekly.title, format!("Diễn biến ca {} tại Khu vực Long Xuyên", DENGUE));
        let week_10 = data.weekly.points[9];
        assert_eq!(week_10.current, Some(1));
        assert_eq!(week_10.previous, 1);

        // 片区用户不能查看其他片区的乡
        let foreign = DashboardQuery {
            commune_id: Some(12),
            ..Default::default()
        };
        assert!(matches!(
            generator.dashboard(2, &foreign, today).await,
            Err(DsrError::Permission(_))
        ));
    }
}
