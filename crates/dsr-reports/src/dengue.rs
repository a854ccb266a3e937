//! 登革出血热报告（SXH）

use std::collections::HashMap;
use std::ops::AddAssign;

use chrono::Datelike;
use dsr_core::catalog::{is_dengue_diagnosis, SEVERE_DENGUE};
use dsr_core::utils::format_date;
use dsr_core::{AdminUnit, Case, PeriodWindow, ReportingUnits, UnitTree};
use rust_xlsxwriter::{Workbook, Worksheet};
use serde::Serialize;

use crate::layout::{
    column_letter, draw_case_details_sheet, draw_comments, draw_standard_footer, draw_standard_header, write_count,
    FooterInfo, Formats, HeaderInfo, SheetResult, TABLE_HEADER_ROW,
};

pub const DENGUE_TITLE: &str = "BÁO CÁO SỐ LIỆU MẮC CHẾT SỐT XUẤT HUYẾT DENGUE";

const LAST_COL: u16 = 11;

pub fn is_dengue_case(case: &Case) -> bool {
    case.diagnosis.as_deref().map_or(false, is_dengue_diagnosis)
}

fn is_severe(case: &Case) -> bool {
    case.severity.as_deref() == Some(SEVERE_DENGUE)
}

/// 出生日期缺失时不计入15岁以下
fn is_child(case: &Case) -> bool {
    case.age_at_onset().map_or(false, |age| age <= 15.0)
}

/// 一行的11项计数，顺序与表格列一致
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DengueCounts {
    pub mild_period: u32,
    pub mild_period_child: u32,
    pub mild_cumulative: u32,
    pub severe_period: u32,
    pub severe_period_child: u32,
    pub severe_cumulative: u32,
    pub total_period: u32,
    pub total_cumulative: u32,
    pub deaths_period: u32,
    pub deaths_period_child: u32,
    pub deaths_cumulative: u32,
}

impl DengueCounts {
    pub fn as_row(&self) -> [u32; 11] {
        [
            self.mild_period,
            self.mild_period_child,
            self.mild_cumulative,
            self.severe_period,
            self.severe_period_child,
            self.severe_cumulative,
            self.total_period,
            self.total_cumulative,
            self.deaths_period,
            self.deaths_period_child,
            self.deaths_cumulative,
        ]
    }

    fn add_case(&mut self, case: &Case, window: &PeriodWindow) {
        let in_period = window.current.contains_opt(case.onset_date);
        let cumulative = window.ytd().contains_opt(case.onset_date);
        let severe = is_severe(case);
        let child = is_child(case);
        let dead = case.is_deceased();

        if in_period {
            self.total_period += 1;
            if severe {
                self.severe_period += 1;
                self.severe_period_child += child as u32;
            } else {
                self.mild_period += 1;
                self.mild_period_child += child as u32;
            }
            if dead {
                self.deaths_period += 1;
                self.deaths_period_child += child as u32;
            }
        }
        if cumulative {
            self.total_cumulative += 1;
            if severe {
                self.severe_cumulative += 1;
            } else {
                self.mild_cumulative += 1;
            }
            self.deaths_cumulative += dead as u32;
        }
    }
}

impl AddAssign for DengueCounts {
    fn add_assign(&mut self, other: Self) {
        self.mild_period += other.mild_period;
        self.mild_period_child += other.mild_period_child;
        self.mild_cumulative += other.mild_cumulative;
        self.severe_period += other.severe_period;
        self.severe_period_child += other.severe_period_child;
        self.severe_cumulative += other.severe_cumulative;
        self.total_period += other.total_period;
        self.total_cumulative += other.total_cumulative;
        self.deaths_period += other.deaths_period;
        self.deaths_period_child += other.deaths_period_child;
        self.deaths_cumulative += other.deaths_cumulative;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DengueRow {
    pub unit: AdminUnit,
    pub counts: DengueCounts,
}

pub fn tally_dengue(units: &ReportingUnits, cases: &[Case], window: &PeriodWindow) -> Vec<DengueRow> {
    units
        .units
        .iter()
        .map(|unit| {
            let mut counts = DengueCounts::default();
            for case in cases
                .iter()
                .filter(|c| is_dengue_case(c) && units.matches(unit, c.commune_id, c.hamlet.as_deref()))
            {
                counts.add_case(case, window);
            }
            DengueRow { unit: unit.clone(), counts }
        })
        .collect()
}

/// 发病最多的乡（并列时全部列出）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopCommunes {
    pub names: Vec<String>,
    pub count: u32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DengueAnalysis {
    pub total_period: u32,
    pub mild_period: u32,
    pub severe_period: u32,
    pub deaths_period: u32,
    pub previous_total: Option<u32>,
    pub cumulative: u32,
    pub prior_year_cumulative: u32,
    pub top_communes: Option<TopCommunes>,
}

/// `cases` 为管辖范围内全部病例，`prior_year_cumulative` 为去年同期累计数
pub fn analyze_dengue(
    cases: &[Case],
    window: &PeriodWindow,
    tree: &UnitTree,
    prior_year_cumulative: u32,
) -> DengueAnalysis {
    let dengue: Vec<&Case> = cases.iter().filter(|c| is_dengue_case(c)).collect();
    let current: Vec<&Case> = dengue
        .iter()
        .copied()
        .filter(|c| window.current.contains_opt(c.onset_date))
        .collect();

    let mut by_commune: HashMap<String, u32> = HashMap::new();
    for case in &current {
        if let Some(unit) = tree.get(case.commune_id) {
            *by_commune.entry(unit.name.clone()).or_default() += 1;
        }
    }
    let top_communes = by_commune.values().max().copied().map(|count| {
        let mut names: Vec<String> = by_commune
            .iter()
            .filter(|(_, n)| **n == count)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        TopCommunes { names, count }
    });

    let ytd = window.ytd();
    DengueAnalysis {
        total_period: current.len() as u32,
        mild_period: current.iter().filter(|c| !is_severe(c)).count() as u32,
        severe_period: current.iter().filter(|c| is_severe(c)).count() as u32,
        deaths_period: current.iter().filter(|c| c.is_deceased()).count() as u32,
        previous_total: window
            .previous
            .map(|prev| dengue.iter().filter(|c| prev.contains_opt(c.onset_date)).count() as u32),
        cumulative: dengue.iter().filter(|c| ytd.contains_opt(c.onset_date)).count() as u32,
        prior_year_cumulative,
        top_communes,
    }
}

fn compare_text(current: u32, other: u32) -> String {
    match current.cmp(&other) {
        std::cmp::Ordering::Greater => format!("tăng {} ca", current - other),
        std::cmp::Ordering::Less => format!("giảm {} ca", other - current),
        std::cmp::Ordering::Equal => "bằng".to_string(),
    }
}

pub fn dengue_comments(analysis: Option<&DengueAnalysis>, window: &PeriodWindow) -> Vec<String> {
    let Some(data) = analysis else {
        return vec!["- Không có đủ dữ liệu để tạo nhận xét.".to_string()];
    };
    let kind = window.kind_name().to_lowercase();
    let number = window.number();
    let year = window.year();

    let mut comments = vec![format!(
        "- Trong {} {} ghi nhận {} ca mắc, trong đó SXHD và SXHD có dấu hiệu cảnh báo {} ca, SXHD nặng {} ca, tử vong {} ca.",
        kind, number, data.total_period, data.mild_period, data.severe_period, data.deaths_period
    )];

    if let (Some(previous), Some(prev_range)) = (data.previous_total, window.previous) {
        let prev_year = if window.period.is_weekly() { year } else { prev_range.start.year() };
        comments.push(format!(
            "- Số mắc SXHD trong {} thứ {} là {} ca {} so với {} {}/{} ({} ca).",
            kind,
            number,
            data.total_period,
            compare_text(data.total_period, previous),
            kind,
            window.previous_number,
            prev_year,
            previous
        ));
    }

    comments.push(format!(
        "- Số mắc SXHD tính đến ngày {} là {} ca {} so với cùng kỳ năm {} ({} ca).",
        format_date(window.current.end),
        data.cumulative,
        compare_text(data.cumulative, data.prior_year_cumulative),
        year - 1,
        data.prior_year_cumulative
    ));

    match &data.top_communes {
        Some(top) if top.count > 0 => comments.push(format!(
            "- Địa phương có số mắc SXHD cao nhất trong {} là: {} ({} ca).",
            kind,
            top.names.join(", "),
            top.count
        )),
        _ => comments.push(format!("- Trong {} không ghi nhận ca mắc SXHD nào.", kind)),
    }
    comments
}

/// 可直接渲染的登革报告
#[derive(Debug, Clone)]
pub struct DengueReport {
    pub(crate) window: PeriodWindow,
    pub(crate) header: HeaderInfo,
    pub(crate) footer: FooterInfo,
    pub(crate) tree: UnitTree,
    pub rows: Vec<DengueRow>,
    pub totals: DengueCounts,
    pub analysis: Option<DengueAnalysis>,
    pub comments: Vec<String>,
    pub detail_cases: Vec<Case>,
}

impl DengueReport {
    pub(crate) fn build(
        tree: UnitTree,
        unit: &AdminUnit,
        units: &ReportingUnits,
        cases: Vec<Case>,
        prior_year_cumulative: u32,
        window: PeriodWindow,
        authority_name: &str,
    ) -> Self {
        let rows = tally_dengue(units, &cases, &window);
        let mut totals = DengueCounts::default();
        for row in &rows {
            totals += row.counts;
        }

        let analysis = (!units.is_empty()).then(|| analyze_dengue(&cases, &window, &tree, prior_year_cumulative));
        let comments = dengue_comments(analysis.as_ref(), &window);
        let detail_cases = cases
            .into_iter()
            .filter(|c| is_dengue_case(c) && window.current.contains_opt(c.onset_date))
            .collect();

        let header = HeaderInfo::for_unit(&tree, unit, authority_name, DENGUE_TITLE, window.label())
            .with_date_range(window.current.subtitle());
        let footer = FooterInfo::for_unit(unit, window.current.end);

        Self {
            window,
            header,
            footer,
            tree,
            rows,
            totals,
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
        workbook.save_to_buffer()
    }

    fn summary_sheet(&self, formats: &Formats) -> SheetResult<Worksheet> {
        let mut ws = Worksheet::new();
        ws.set_name("BaoCaoSXH")?;
        draw_standard_header(&mut ws, formats, &self.header, LAST_COL)?;

        let h = TABLE_HEADER_ROW;
        ws.set_row_height(h, 50)?;
        ws.set_column_width(0, 25)?;
        for col in 1..=LAST_COL {
            ws.set_column_width(col, 11)?;
        }
        ws.merge_range(h, 0, h + 1, 0, "Địa phương", &formats.header)?;
        ws.merge_range(h, 1, h, 3, "SXH Dengue và SXH Dengue có dấu hiệu cảnh báo", &formats.header)?;
        ws.merge_range(h, 4, h, 6, "SXH Dengue nặng", &formats.header)?;
        ws.merge_range(h, 7, h + 1, 7, "Tổng cộng mắc", &formats.header)?;
        ws.merge_range(h, 8, h + 1, 8, "Cộng dồn mắc", &formats.header)?;
        ws.merge_range(h, 9, h, 11, "SỐ CHẾT", &formats.header)?;
        for (col, label) in [
            (1, "Tổng"),
            (2, "≤15T"),
            (3, "Cộng dồn"),
            (4, "Tổng"),
            (5, "≤15T"),
            (6, "Cộng dồn"),
            (9, "Tổng"),
            (10, "≤15T"),
            (11, "Cộng dồn"),
        ] {
            ws.write_string_with_format(h + 1, col, label, &formats.header)?;
        }

        let data_start = h + 2;
        for (i, row) in self.rows.iter().enumerate() {
            let r = data_start + i as u32;
            ws.write_string_with_format(r, 0, &row.unit.name, &formats.cell_left)?;
            for (offset, value) in row.counts.as_row().iter().enumerate() {
                write_count(&mut ws, r, 1 + offset as u16, *value, &formats.cell)?;
            }
        }

        let total_row = data_start + self.rows.len() as u32;
        ws.write_string_with_format(total_row, 0, "TỔNG CỘNG", &formats.total_label)?;
        for (offset, value) in self.totals.as_row().iter().enumerate() {
            let col = 1 + offset as u16;
            if self.rows.is_empty() {
                write_count(&mut ws, total_row, col, *value, &formats.total_cell)?;
            } else {
                let letter = column_letter(col);
                let formula = format!("=SUM({0}{1}:{0}{2})", letter, data_start + 1, total_row);
                ws.write_formula_with_format(total_row, col, formula.as_str(), &formats.total_cell)?;
            }
        }

        let last_row = draw_comments(&mut ws, formats, total_row + 1, &self.comments, LAST_COL)?;
        draw_standard_footer(&mut ws, formats, &self.footer, last_row, LAST_COL)?;
        Ok(ws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use dsr_core::catalog::{DECEASED, DENGUE, HFMD};
    use dsr_core::ReportPeriod;

    fn dengue_case(id: i64, commune: i64, onset: chrono::NaiveDate) -> Case {
        let mut c = case(id, DENGUE, commune, onset, onset);
        c.severity = Some("Sốt xuất huyết Dengue có dấu hiệu cảnh báo".to_string());
        c
    }

    #[test]
    fn test_tally_dengue_columns() {
        let tree = sample_tree();
        let units = tree.reporting_units(2).unwrap();
        let window = ReportPeriod::Month { year: 2024, month: 3 }.resolve().unwrap();

        let mut child = dengue_case(1, 10, d(2024, 3, 10));
        child.birth_date = Some(d(2015, 6, 1));
        let mut severe = dengue_case(2, 10, d(2024, 3, 12));
        severe.severity = Some(SEVERE_DENGUE.to_string());
        severe.status = Some(DECEASED.to_string());
        severe.birth_date = Some(d(1980, 1, 1));
        let earlier = dengue_case(3, 11, d(2024, 1, 20));
        let other = case(4, HFMD, 10, d(2024, 3, 10), d(2024, 3, 10));

        let rows = tally_dengue(&units, &[child, severe, earlier, other], &window);
        let my_binh = rows.iter().find(|r| r.unit.id == 10).unwrap().counts;
        assert_eq!(my_binh.mild_period, 1);
        assert_eq!(my_binh.mild_period_child, 1);
        assert_eq!(my_binh.severe_period, 1);
        assert_eq!(my_binh.severe_period_child, 0);
        assert_eq!(my_binh.total_period, 2);
        assert_eq!(my_binh.deaths_period, 1);
        assert_eq!(my_binh.deaths_cumulative, 1);

        let binh_duc = rows.iter().find(|r| r.unit.id == 11).unwrap().counts;
        assert_eq!(binh_duc.total_period, 0);
        assert_eq!(binh_duc.mild_cumulative, 1);
        assert_eq!(binh_duc.total_cumulative, 1);
    }

    #[test]
    fn test_missing_birth_date_still_counted_in_totals() {
        let tree = sample_tree();
        let units = tree.reporting_units(2).unwrap();
        let window = ReportPeriod::Month { year: 2024, month: 3 }.resolve().unwrap();
        let mild = dengue_case(1, 10, d(2024, 3, 2));
        let mut fatal = dengue_case(2, 10, d(2024, 3, 4));
        fatal.severity = Some(SEVERE_DENGUE.to_string());
        fatal.status = Some(DECEASED.to_string());
        let cases = vec![mild, fatal];
        assert!(cases.iter().all(|c| c.birth_date.is_none()));

        // 缺出生日期的病例计入各合计列，只是不进入15岁以下列
        let rows = tally_dengue(&units, &cases, &window);
        let counts = rows.iter().find(|r| r.unit.id == 10).unwrap().counts;
        assert_eq!(counts.mild_period, 1);
        assert_eq!(counts.severe_period, 1);
        assert_eq!(counts.deaths_period, 1);
        assert_eq!(counts.total_period, 2);
        assert_eq!(counts.total_cumulative, 2);
        assert_eq!(counts.mild_period_child, 0);
        assert_eq!(counts.severe_period_child, 0);
        assert_eq!(counts.deaths_period_child, 0);

        let analysis = analyze_dengue(&cases, &window, &tree, 0);
        assert_eq!(analysis.total_period, 2);
        assert_eq!(analysis.deaths_period, 1);
    }

    #[test]
    fn test_dengue_comments() {
        let tree = sample_tree();
        let window = ReportPeriod::Month { year: 2024, month: 1 }.resolve().unwrap();
        let cases = vec![
            dengue_case(1, 10, d(2024, 1, 3)),
            dengue_case(2, 11, d(2024, 1, 4)),
            dengue_case(3, 11, d(2023, 12, 20)),
        ];
        let analysis = analyze_dengue(&cases, &window, &tree, 5);
        assert_eq!(analysis.total_period, 2);
        assert_eq!(analysis.previous_total, Some(1));
        assert_eq!(analysis.cumulative, 2);
        let top = analysis.top_communes.clone().unwrap();
        assert_eq!(top.names, vec!["Bình Đức".to_string(), "Mỹ Bình".to_string()]);

        let comments = dengue_comments(Some(&analysis), &window);
        assert_eq!(
            comments[0],
            "- Trong tháng 1 ghi nhận 2 ca mắc, trong đó SXHD và SXHD có dấu hiệu cảnh báo 2 ca, SXHD nặng 0 ca, tử vong 0 ca."
        );
        assert_eq!(
            comments[1],
            "- Số mắc SXHD trong tháng thứ 1 là 2 ca tăng 1 ca so với tháng 12/2023 (1 ca)."
        );
        assert_eq!(
            comments[2],
            "- Số mắc SXHD tính đến ngày 31/01/2024 là 2 ca giảm 3 ca so với cùng kỳ năm 2023 (5 ca)."
        );
        assert_eq!(
            comments[3],
            "- Địa phương có số mắc SXHD cao nhất trong tháng là: Bình Đức, Mỹ Bình (1 ca)."
        );
    }

    #[test]
    fn test_no_cases_comment() {
        let tree = sample_tree();
        let window = ReportPeriod::Week { year: 2024, week: 1 }.resolve().unwrap();
        let analysis = analyze_dengue(&[], &window, &tree, 0);
        let comments = dengue_comments(Some(&analysis), &window);
        // 第1周没有上一期
        assert_eq!(comments.len(), 3);
        assert!(comments[1].contains("bằng so với cùng kỳ năm 2023"));
        assert_eq!(comments[2], "- Trong tuần không ghi nhận ca mắc SXHD nào.");
    }

    #[test]
    fn test_render_uses_sum_formulas() {
        let tree = sample_tree();
        let unit = tree.get(2).unwrap().clone();
        let units = tree.reporting_units(2).unwrap();
        let window = ReportPeriod::Month { year: 2024, month: 3 }.resolve().unwrap();
        let cases = vec![dengue_case(1, 10, d(2024, 3, 2)), dengue_case(2, 11, d(2024, 3, 3))];

        let report = DengueReport::build(tree, &unit, &units, cases, 0, window, "Sở Y tế An Giang");
        assert_eq!(report.totals.total_period, 2);
        let bytes = report.render().unwrap();

        let mut book = open(&bytes);
        assert_eq!(sheet_names(&mut book), vec!["BaoCaoSXH", "ChiTiet_CaBenh"]);
        let range = sheet(&mut book, "BaoCaoSXH");
        assert_eq!(text(&range, 5, 0), DENGUE_TITLE);
        assert_eq!(text(&range, 9, 1), "SXH Dengue và SXH Dengue có dấu hiệu cảnh báo");
        assert_eq!(text(&range, 10, 2), "≤15T");
        assert_eq!(text(&range, 11, 0), "Bình Đức");
        assert_eq!(number(&range, 11, 1), 1.0);
        assert_eq!(text(&range, 13, 0), "TỔNG CỘNG");

        let formulas = formulas(&mut book, "BaoCaoSXH");
        assert_eq!(formula_at(&formulas, 13, 1), "SUM(B12:B13)");
        assert_eq!(formula_at(&formulas, 13, 11), "SUM(L12:L13)");
    }
}
