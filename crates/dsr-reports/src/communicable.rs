//! 传染病报告（BTN）
//!
//! 按报告单位 × 病种统计本期、补报与累计的发病数和死亡数，
//! 并生成评语与补报明细。

use std::collections::HashMap;
use std::ops::AddAssign;

use chrono::Datelike;
use dsr_core::catalog::REPORTABLE_DISEASES;
use dsr_core::{AdminUnit, Case, DateRange, PeriodWindow, ReportingUnits, UnitTree};
use rust_xlsxwriter::{Workbook, Worksheet};
use serde::Serialize;

use crate::layout::{
    draw_case_details_sheet, draw_comments, draw_standard_footer, draw_standard_header, draw_table_sheet,
    write_count, CellValue, FooterInfo, Formats, HeaderInfo, SheetResult, TABLE_HEADER_ROW,
};

pub const COMMUNICABLE_TITLE: &str = "BÁO CÁO BỆNH TRUYỀN NHIỄM";

/// 补报：发病日期早于本期开始，录入日期落在本期内
pub fn is_backfill(case: &Case, current: &DateRange) -> bool {
    case.onset_date.map_or(false, |onset| onset < current.start) && current.contains(case.import_date)
}

/// 合并两批病例，按ID去重，保持原顺序
pub fn merge_cases(primary: Vec<Case>, extra: Vec<Case>) -> Vec<Case> {
    let mut seen = std::collections::HashSet::new();
    primary
        .into_iter()
        .chain(extra)
        .filter(|c| seen.insert(c.id))
        .collect()
}

/// 单个病种的六项计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiseaseCounts {
    pub period_cases: u32,
    pub period_deaths: u32,
    pub backfill_cases: u32,
    pub backfill_deaths: u32,
    pub cumulative_cases: u32,
    pub cumulative_deaths: u32,
}

impl AddAssign for DiseaseCounts {
    fn add_assign(&mut self, other: Self) {
        self.period_cases += other.period_cases;
        self.period_deaths += other.period_deaths;
        self.backfill_cases += other.backfill_cases;
        self.backfill_deaths += other.backfill_deaths;
        self.cumulative_cases += other.cumulative_cases;
        self.cumulative_deaths += other.cumulative_deaths;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommunicableRow {
    pub unit: AdminUnit,
    /// 与 `REPORTABLE_DISEASES` 一一对应
    pub counts: Vec<DiseaseCounts>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommunicableTable {
    pub rows: Vec<CommunicableRow>,
    pub totals: Vec<DiseaseCounts>,
}

pub fn tally_communicable(units: &ReportingUnits, cases: &[Case], window: &PeriodWindow) -> CommunicableTable {
    let current = window.current;
    let ytd = window.ytd();
    let mut totals = vec![DiseaseCounts::default(); REPORTABLE_DISEASES.len()];

    let rows = units
        .units
        .iter()
        .map(|unit| {
            let unit_cases: Vec<&Case> = cases
                .iter()
                .filter(|c| units.matches(unit, c.commune_id, c.hamlet.as_deref()))
                .collect();

            let counts: Vec<DiseaseCounts> = REPORTABLE_DISEASES
                .iter()
                .map(|disease| {
                    let mut counts = DiseaseCounts::default();
                    for case in unit_cases.iter().filter(|c| c.has_diagnosis(disease)) {
                        let dead = case.is_deceased() as u32;
                        if current.contains_opt(case.onset_date) {
                            counts.period_cases += 1;
                            counts.period_deaths += dead;
                        }
                        // 表内补报只统计今年发病的
                        if is_backfill(case, &current) && case.onset_date.map_or(false, |d| d >= window.year_start) {
                            counts.backfill_cases += 1;
                            counts.backfill_deaths += dead;
                        }
                        if ytd.contains_opt(case.onset_date) {
                            counts.cumulative_cases += 1;
                            counts.cumulative_deaths += dead;
                        }
                    }
                    counts
                })
                .collect();

            for (total, count) in totals.iter_mut().zip(&counts) {
                *total += *count;
            }
            CommunicableRow { unit: unit.clone(), counts }
        })
        .collect();

    CommunicableTable { rows, totals }
}

/// 补报病例按病种、发病年份、发病周（或月）分组
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillGroup {
    pub disease: String,
    pub year: i32,
    pub period: u32,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopLocation {
    pub name: String,
    pub count: u32,
    pub disease: String,
}

/// 评语所需的汇总数据
#[derive(Debug, Clone, Default, Serialize)]
pub struct CommunicableAnalysis {
    pub total_new: u32,
    pub new_deaths: u32,
    pub total_backfill: u32,
    pub backfill_groups: Vec<BackfillGroup>,
    pub top_diseases: Vec<(String, u32)>,
    pub previous_total: Option<u32>,
    pub top_location: Option<TopLocation>,
}

/// 按次数降序、名称升序排列
fn ranked<K: Ord>(counts: HashMap<K, u32>) -> Vec<(K, u32)> {
    let mut ranked: Vec<(K, u32)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

pub fn analyze_communicable(cases: &[Case], window: &PeriodWindow, tree: &UnitTree) -> CommunicableAnalysis {
    let current = window.current;
    let new_cases: Vec<&Case> = cases.iter().filter(|c| current.contains_opt(c.onset_date)).collect();
    let backfill: Vec<&Case> = cases.iter().filter(|c| is_backfill(c, &current)).collect();

    let mut groups: HashMap<(String, i32, u32), u32> = HashMap::new();
    for case in &backfill {
        let (Some(diagnosis), Some(onset)) = (&case.diagnosis, case.onset_date) else {
            continue;
        };
        let (year, period) = if window.period.is_weekly() {
            let iso = onset.iso_week();
            (iso.year(), iso.week())
        } else {
            (onset.year(), onset.month())
        };
        *groups.entry((diagnosis.clone(), year, period)).or_default() += 1;
    }
    let backfill_groups = ranked(groups)
        .into_iter()
        .map(|((disease, year, period), count)| BackfillGroup { disease, year, period, count })
        .collect();

    let mut by_disease: HashMap<String, u32> = HashMap::new();
    for diagnosis in new_cases.iter().filter_map(|c| c.diagnosis.clone()) {
        *by_disease.entry(diagnosis).or_default() += 1;
    }
    let top_diseases = ranked(by_disease).into_iter().take(3).collect();

    let previous_total = window
        .previous
        .map(|prev| cases.iter().filter(|c| prev.contains_opt(c.onset_date)).count() as u32);

    // 新发与补报合计最多的乡，及其主要病种
    let mut by_location: HashMap<String, Vec<&Case>> = HashMap::new();
    for case in new_cases.iter().chain(backfill.iter()) {
        if let Some(unit) = tree.get(case.commune_id) {
            by_location.entry(unit.name.clone()).or_default().push(*case);
        }
    }
    let location_counts: HashMap<String, u32> =
        by_location.iter().map(|(name, list)| (name.clone(), list.len() as u32)).collect();
    let top_location = ranked(location_counts).into_iter().next().map(|(name, count)| {
        let mut diseases: HashMap<String, u32> = HashMap::new();
        for diagnosis in by_location[&name].iter().filter_map(|c| c.diagnosis.clone()) {
            *diseases.entry(diagnosis).or_default() += 1;
        }
        let disease = ranked(diseases)
            .into_iter()
            .next()
            .map(|(d, _)| d)
            .unwrap_or_else(|| "Không xác định".to_string());
        TopLocation { name, count, disease }
    });

    CommunicableAnalysis {
        total_new: new_cases.len() as u32,
        new_deaths: new_cases.iter().filter(|c| c.is_deceased()).count() as u32,
        total_backfill: backfill.len() as u32,
        backfill_groups,
        top_diseases,
        previous_total,
        top_location,
    }
}

pub fn communicable_comments(
    analysis: Option<&CommunicableAnalysis>,
    window: &PeriodWindow,
    display_name: &str,
) -> Vec<String> {
    let Some(analysis) = analysis else {
        return vec!["- Không có dữ liệu để tạo nhận xét.".to_string()];
    };
    let kind = window.kind_name().to_lowercase();
    let mut comments = vec![format!(
        "- Trong {} {}, toàn {} ghi nhận {} ca mắc mới và {} ca tử vong. Ngoài ra, đã ghi nhận bổ sung {} ca mắc từ các kỳ trước.",
        kind,
        window.number(),
        display_name,
        analysis.total_new,
        analysis.new_deaths,
        analysis.total_backfill
    )];

    if !analysis.top_diseases.is_empty() {
        let listed: Vec<String> = analysis
            .top_diseases
            .iter()
            .map(|(name, count)| format!("{} ({} ca)", name, count))
            .collect();
        comments.push(format!(
            "- 03 bệnh có số ca mắc mới cao nhất trong kỳ là: {}.",
            listed.join(", ")
        ));
    }

    if let Some(previous) = analysis.previous_total {
        let trend = match analysis.total_new.cmp(&previous) {
            std::cmp::Ordering::Greater => format!("tăng ({} so với {} ca)", analysis.total_new, previous),
            std::cmp::Ordering::Less => format!("giảm ({} so với {} ca)", analysis.total_new, previous),
            std::cmp::Ordering::Equal => "ổn định".to_string(),
        };
        comments.push(format!("- So với {} trước, số ca mắc mới thực tế có xu hướng {}.", kind, trend));
    }

    if analysis.total_backfill > 0 {
        comments.push(format!(
            "- Việc ghi nhận {} ca báo cáo bổ sung cho thấy có sự chậm trễ trong công tác giám sát, báo cáo tại tuyến dưới (xem sheet 'ChiTiet_CaBoSung' để có danh sách đầy đủ).",
            analysis.total_backfill
        ));
    }

    if let Some(top) = &analysis.top_location {
        comments.push(format!(
            "- {} là địa phương có tổng số ca ghi nhận (cả mới và bổ sung) cao nhất trong kỳ với {} ca, chủ yếu là bệnh {}.",
            top.name, top.count, top.disease
        ));
    }
    comments
}

/// 可直接渲染的传染病报告
#[derive(Debug, Clone)]
pub struct CommunicableReport {
    pub(crate) window: PeriodWindow,
    pub(crate) header: HeaderInfo,
    pub(crate) footer: FooterInfo,
    pub(crate) tree: UnitTree,
    pub table: CommunicableTable,
    pub analysis: Option<CommunicableAnalysis>,
    pub comments: Vec<String>,
    /// 本期新发与补报病例
    pub detail_cases: Vec<Case>,
}

impl CommunicableReport {
    pub(crate) fn build(
        tree: UnitTree,
        unit: &AdminUnit,
        units: &ReportingUnits,
        cases: Vec<Case>,
        window: PeriodWindow,
        authority_name: &str,
        display_name: &str,
    ) -> Self {
        let table = tally_communicable(units, &cases, &window);
        let analysis = (!units.is_empty()).then(|| analyze_communicable(&cases, &window, &tree));
        let comments = communicable_comments(analysis.as_ref(), &window, display_name);
        let detail_cases = cases
            .into_iter()
            .filter(|c| window.current.contains_opt(c.onset_date) || is_backfill(c, &window.current))
            .collect();

        let header = HeaderInfo::for_unit(&tree, unit, authority_name, COMMUNICABLE_TITLE, window.label())
            .with_date_range(window.current.subtitle());
        let footer = FooterInfo::for_unit(unit, window.current.end);

        Self {
            window,
            header,
            footer,
            tree,
            table,
            analysis,
            comments,
            detail_cases,
        }
    }

    pub fn render(&self) -> SheetResult<Vec<u8>> {
        let formats = Formats::new();
        let mut workbook = Workbook::new();

        workbook.push_worksheet(self.summary_sheet(&formats)?);

        let details_title = format!("DANH SÁCH CA BỆNH GHI NHẬN TRONG {}", self.window.label().to_uppercase());
        if let Some(sheet) = draw_case_details_sheet(&self.detail_cases, &self.tree, &details_title, &formats)? {
            workbook.push_worksheet(sheet);
        }
        if let Some(sheet) = self.backfill_sheet(&formats)? {
            workbook.push_worksheet(sheet);
        }

        workbook.save_to_buffer()
    }

    fn summary_sheet(&self, formats: &Formats) -> SheetResult<Worksheet> {
        let mut ws = Worksheet::new();
        ws.set_name("BaoCaoBTN_TongHop")?;
        let last_col = (1 + REPORTABLE_DISEASES.len() * 2) as u16;
        draw_standard_header(&mut ws, formats, &self.header, last_col)?;

        let header_row = TABLE_HEADER_ROW;
        ws.merge_range(header_row, 0, header_row + 1, 0, "Địa phương", &formats.header)?;
        ws.merge_range(header_row, 1, header_row + 1, 1, "Loại dịch", &formats.header)?;
        for (i, disease) in REPORTABLE_DISEASES.iter().enumerate() {
            let col = 2 + (i * 2) as u16;
            let width = (disease.chars().count() / 2).max(10) as f64;
            ws.set_column_width(col, width)?;
            ws.set_column_width(col + 1, width)?;
            ws.merge_range(header_row, col, header_row, col + 1, disease, &formats.header)?;
            ws.write_string_with_format(header_row + 1, col, "Mắc", &formats.header)?;
            ws.write_string_with_format(header_row + 1, col + 1, "Chết", &formats.header)?;
        }
        ws.set_column_width(0, 25)?;
        ws.set_column_width(1, 15)?;
        ws.set_row_height(header_row, 50)?;

        let labels = [self.window.short_code(), "BS", "CD"];
        let mut row = header_row + 2;
        for unit_row in &self.table.rows {
            ws.merge_range(row, 0, row + 2, 0, &unit_row.unit.name, &formats.row_label)?;
            for (i, label) in labels.iter().enumerate() {
                ws.write_string_with_format(row + i as u32, 1, *label, &formats.cell)?;
            }
            write_count_block(&mut ws, row, &unit_row.counts, formats, false)?;
            row += 3;
        }

        ws.merge_range(row, 0, row + 2, 0, "TỔNG CỘNG", &formats.total_label)?;
        for (i, label) in labels.iter().enumerate() {
            ws.write_string_with_format(row + i as u32, 1, *label, &formats.total_label)?;
        }
        write_count_block(&mut ws, row, &self.table.totals, formats, true)?;

        let note_row = row + 3;
        ws.write_string_with_format(note_row, 0, self.window.note_text(), &formats.note)?;
        let last_row = draw_comments(&mut ws, formats, note_row + 1, &self.comments, last_col)?;
        draw_standard_footer(&mut ws, formats, &self.footer, last_row, last_col)?;
        Ok(ws)
    }

    fn backfill_sheet(&self, formats: &Formats) -> SheetResult<Option<Worksheet>> {
        let Some(analysis) = &self.analysis else {
            return Ok(None);
        };
        if analysis.backfill_groups.is_empty() {
            return Ok(None);
        }
        let period_header = if self.window.period.is_weekly() { "Tuần KP" } else { "Tháng KP" };
        let headers = ["Tên bệnh", "Năm KP", period_header, "Số ca bổ sung"];
        let rows: Vec<Vec<CellValue>> = analysis
            .backfill_groups
            .iter()
            .map(|g| {
                vec![
                    CellValue::Text(g.disease.clone()),
                    CellValue::Number(g.year as f64),
                    CellValue::Number(g.period as f64),
                    CellValue::Number(g.count as f64),
                ]
            })
            .collect();
        let title = format!(
            "Chi tiết ca bệnh bổ sung ghi nhận trong {}",
            self.window.label().to_lowercase()
        );
        draw_table_sheet("ChiTiet_CaBoSung", &title, &headers, &rows, formats).map(Some)
    }
}

/// 三行（本期/补报/累计）× 病种两列（发病/死亡）
fn write_count_block(
    ws: &mut Worksheet,
    row: u32,
    counts: &[DiseaseCounts],
    formats: &Formats,
    total: bool,
) -> SheetResult {
    let format = if total { &formats.total_cell } else { &formats.cell };
    for (i, c) in counts.iter().enumerate() {
        let col = 2 + (i * 2) as u16;
        write_count(ws, row, col, c.period_cases, format)?;
        write_count(ws, row, col + 1, c.period_deaths, format)?;
        write_count(ws, row + 1, col, c.backfill_cases, format)?;
        write_count(ws, row + 1, col + 1, c.backfill_deaths, format)?;
        write_count(ws, row + 2, col, c.cumulative_cases, format)?;
        write_count(ws, row + 2, col + 1, c.cumulative_deaths, format)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use dsr_core::catalog::{DECEASED, DENGUE, HFMD};
    use dsr_core::ReportPeriod;

    fn week_10() -> PeriodWindow {
        // 2024年第10周：3月4日至3月10日
        ReportPeriod::Week { year: 2024, week: 10 }.resolve().unwrap()
    }

    #[test]
    fn test_backfill_predicate() {
        let window = week_10();
        let late = case(1, DENGUE, 10, d(2024, 2, 20), d(2024, 3, 5));
        assert!(is_backfill(&late, &window.current));
        let on_time = case(2, DENGUE, 10, d(2024, 3, 5), d(2024, 3, 5));
        assert!(!is_backfill(&on_time, &window.current));
        let imported_later = case(3, DENGUE, 10, d(2024, 2, 20), d(2024, 3, 11));
        assert!(!is_backfill(&imported_later, &window.current));
    }

    #[test]
    fn test_merge_cases_dedupes_by_id() {
        let a = case(1, DENGUE, 10, d(2024, 3, 5), d(2024, 3, 5));
        let b = case(2, HFMD, 10, d(2024, 3, 5), d(2024, 3, 5));
        let merged = merge_cases(vec![a.clone(), b], vec![a]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_tally_totals_match_rows() {
        let tree = sample_tree();
        let units = tree.reporting_units(2).unwrap();
        let window = week_10();

        let mut dead = case(1, DENGUE, 10, d(2024, 3, 6), d(2024, 3, 7));
        dead.status = Some(DECEASED.to_string());
        let cases = vec![
            dead,
            case(2, DENGUE, 11, d(2024, 3, 4), d(2024, 3, 4)),
            case(3, DENGUE, 11, d(2024, 2, 1), d(2024, 3, 8)),  // 补报
            case(4, HFMD, 10, d(2024, 1, 15), d(2024, 1, 16)),  // 仅累计
            case(5, DENGUE, 11, d(2023, 12, 1), d(2024, 3, 8)), // 去年发病，不计入表内补报
        ];
        let table = tally_communicable(&units, &cases, &window);
        assert_eq!(table.rows.len(), 2);

        let dengue = REPORTABLE_DISEASES.iter().position(|d| *d == DENGUE).unwrap();
        let hfmd = REPORTABLE_DISEASES.iter().position(|d| *d == HFMD).unwrap();

        let totals = table.totals[dengue];
        assert_eq!(totals.period_cases, 2);
        assert_eq!(totals.period_deaths, 1);
        assert_eq!(totals.backfill_cases, 1);
        assert_eq!(totals.cumulative_cases, 3);
        assert_eq!(table.totals[hfmd].cumulative_cases, 1);
        assert_eq!(table.totals[hfmd].period_cases, 0);

        for (i, total) in table.totals.iter().enumerate() {
            let mut sum = DiseaseCounts::default();
            for row in &table.rows {
                sum += row.counts[i];
            }
            assert_eq!(*total, sum);
        }
    }

    #[test]
    fn test_tally_groups_commune_report_by_hamlet() {
        let tree = sample_tree();
        let units = tree.reporting_units(10).unwrap();
        let window = week_10();
        let mut in_hamlet = case(1, HFMD, 10, d(2024, 3, 5), d(2024, 3, 5));
        in_hamlet.hamlet = Some("Ấp Đông".to_string());
        let no_hamlet = case(2, HFMD, 10, d(2024, 3, 5), d(2024, 3, 5));

        let table = tally_communicable(&units, &[in_hamlet, no_hamlet], &window);
        let hfmd = REPORTABLE_DISEASES.iter().position(|d| *d == HFMD).unwrap();
        assert_eq!(table.totals[hfmd].period_cases, 1);
        let dong = table.rows.iter().find(|r| r.unit.name == "Ấp Đông").unwrap();
        assert_eq!(dong.counts[hfmd].period_cases, 1);
    }

    #[test]
    fn test_analysis_and_comments() {
        let tree = sample_tree();
        let window = week_10();
        let cases = vec![
            case(1, DENGUE, 10, d(2024, 3, 5), d(2024, 3, 5)),
            case(2, DENGUE, 10, d(2024, 3, 6), d(2024, 3, 6)),
            case(3, HFMD, 11, d(2024, 3, 6), d(2024, 3, 6)),
            case(4, "Cúm", 11, d(2024, 3, 7), d(2024, 3, 7)),
            case(6, DENGUE, 10, d(2024, 2, 14), d(2024, 3, 8)), // 补报，发病在第7周
            case(7, HFMD, 11, d(2024, 2, 28), d(2024, 2, 28)),  // 上一周
        ];
        let analysis = analyze_communicable(&cases, &window, &tree);
        assert_eq!(analysis.total_new, 4);
        assert_eq!(analysis.total_backfill, 1);
        assert_eq!(analysis.previous_total, Some(1));
        assert_eq!(analysis.top_diseases[0], (DENGUE.to_string(), 2));
        assert_eq!(analysis.top_diseases.len(), 3);
        assert_eq!(
            analysis.backfill_groups,
            vec![BackfillGroup { disease: DENGUE.to_string(), year: 2024, period: 7, count: 1 }]
        );
        let top = analysis.top_location.clone().unwrap();
        assert_eq!(top.name, "Mỹ Bình");
        assert_eq!(top.count, 3);
        assert_eq!(top.disease, DENGUE);

        let comments = communicable_comments(Some(&analysis), &window, "tỉnh An Giang");
        assert_eq!(
            comments[0],
            "- Trong tuần 10, toàn tỉnh An Giang ghi nhận 4 ca mắc mới và 0 ca tử vong. Ngoài ra, đã ghi nhận bổ sung 1 ca mắc từ các kỳ trước."
        );
        assert!(comments[2].contains("xu hướng tăng (4 so với 1 ca)"));
        assert!(comments[3].contains("1 ca báo cáo bổ sung"));
        assert!(comments[4].starts_with("- Mỹ Bình là địa phương"));
    }

    #[test]
    fn test_first_week_skips_trend_sentence() {
        let tree = sample_tree();
        let window = ReportPeriod::Week { year: 2024, week: 1 }.resolve().unwrap();
        let cases = vec![case(1, DENGUE, 10, d(2024, 1, 2), d(2024, 1, 2))];
        let analysis = analyze_communicable(&cases, &window, &tree);
        assert!(analysis.previous_total.is_none());
        let comments = communicable_comments(Some(&analysis), &window, "tỉnh An Giang");
        assert!(!comments.iter().any(|c| c.contains("xu hướng")));

        let empty = communicable_comments(None, &window, "tỉnh An Giang");
        assert_eq!(empty, vec!["- Không có dữ liệu để tạo nhận xét.".to_string()]);
    }

    #[test]
    fn test_render_summary_sheet() {
        let tree = sample_tree();
        let unit = tree.get(2).unwrap().clone();
        let units = tree.reporting_units(2).unwrap();
        let window = week_10();
        let cases = vec![
            case(1, DENGUE, 11, d(2024, 3, 5), d(2024, 3, 5)),
            case(2, DENGUE, 10, d(2024, 2, 14), d(2024, 3, 8)),
        ];
        let report = CommunicableReport::build(tree, &unit, &units, cases, window, "Sở Y tế An Giang", "Long Xuyên");
        let bytes = report.render().unwrap();

        let mut book = open(&bytes);
        let names = sheet_names(&mut book);
        assert_eq!(names, vec!["BaoCaoBTN_TongHop", "ChiTiet_CaBenh", "ChiTiet_CaBoSung"]);

        let range = sheet(&mut book, "BaoCaoBTN_TongHop");
        assert_eq!(text(&range, 0, 0), "AN GIANG");
        assert_eq!(text(&range, 1, 0), "TRUNG TÂM Y TẾ LONG XUYÊN");
        assert_eq!(text(&range, 3, 0), "Số    /BC-TTYT");
        assert_eq!(text(&range, 5, 0), COMMUNICABLE_TITLE);
        assert_eq!(text(&range, 6, 0), "Tuần 10 năm 2024");
        assert_eq!(text(&range, 9, 2), "Tả");
        // 第一行单位为 Bình Đức（按名称排序）
        assert_eq!(text(&range, 11, 0), "Bình Đức");
        assert_eq!(text(&range, 11, 1), "TS");
        // Sốt xuất huyết Dengue 是第3个病种，位于第6、7列
        assert_eq!(number(&range, 11, 6), 1.0);
        assert_eq!(number(&range, 15, 6), 1.0); // Mỹ Bình 补报行
        assert_eq!(text(&range, 17, 0), "TỔNG CỘNG");
        assert_eq!(number(&range, 17, 6), 1.0);
        assert_eq!(number(&range, 18, 6), 1.0);

        let details = sheet(&mut book, "ChiTiet_CaBenh");
        assert_eq!(text(&details, 0, 0), "DANH SÁCH CA BỆNH GHI NHẬN TRONG TUẦN 10 NĂM 2024");
        assert_eq!(text(&details, 2, 0), "Họ và tên");
        assert_eq!(details.rows().count(), 5);

        let backfill = sheet(&mut book, "ChiTiet_CaBoSung");
        assert_eq!(text(&backfill, 2, 2), "Tuần KP");
        assert_eq!(number(&backfill, 3, 2), 7.0);
    }
}
