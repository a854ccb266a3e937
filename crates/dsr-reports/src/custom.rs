//! 自定义时间段报告
//!
//! 每个选中的单位一行，统计发病日期落在区间内的各病种发病与死亡数。

use dsr_core::catalog::REPORTABLE_DISEASES;
use dsr_core::{AdminUnit, Case, DateRange, UnitLevel, UnitTree};
use rust_xlsxwriter::{Workbook, Worksheet};
use serde::Serialize;

use crate::communicable::COMMUNICABLE_TITLE;
use crate::layout::{
    column_letter, draw_case_details_sheet, draw_standard_footer, draw_standard_header, write_count, FooterInfo,
    Formats, HeaderInfo, SheetResult, TABLE_HEADER_ROW,
};

/// 一个选中单位覆盖的病例
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowScope {
    Communes(Vec<i64>),
    Hamlet { commune_id: i64, name: String },
}

impl RowScope {
    pub fn for_unit(tree: &UnitTree, unit: &AdminUnit) -> Self {
        match (unit.level, unit.parent_id) {
            (UnitLevel::Hamlet, Some(commune_id)) => RowScope::Hamlet {
                commune_id,
                name: unit.name.clone(),
            },
            _ => RowScope::Communes(tree.commune_ids_under(unit.id)),
        }
    }

    pub fn commune_ids(&self) -> Vec<i64> {
        match self {
            RowScope::Communes(ids) => ids.clone(),
            RowScope::Hamlet { commune_id, .. } => vec![*commune_id],
        }
    }

    pub fn covers(&self, case: &Case) -> bool {
        match self {
            RowScope::Communes(ids) => ids.contains(&case.commune_id),
            RowScope::Hamlet { commune_id, name } => {
                case.commune_id == *commune_id && case.hamlet.as_deref().map(str::trim) == Some(name.as_str())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaseDeathCount {
    pub cases: u32,
    pub deaths: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomRow {
    pub unit: AdminUnit,
    pub counts: Vec<CaseDeathCount>,
}

pub fn tally_custom(rows: &[(AdminUnit, RowScope)], cases: &[Case], range: &DateRange) -> Vec<CustomRow> {
    rows.iter()
        .map(|(unit, scope)| {
            let counts = REPORTABLE_DISEASES
                .iter()
                .map(|disease| {
                    let mut count = CaseDeathCount::default();
                    for case in cases.iter().filter(|c| {
                        c.has_diagnosis(disease) && range.contains_opt(c.onset_date) && scope.covers(c)
                    }) {
                        count.cases += 1;
                        count.deaths += case.is_deceased() as u32;
                    }
                    count
                })
                .collect();
            CustomRow { unit: unit.clone(), counts }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct CustomReport {
    pub range: DateRange,
    pub(crate) header: HeaderInfo,
    pub(crate) footer: FooterInfo,
    pub(crate) tree: UnitTree,
    pub rows: Vec<CustomRow>,
    pub totals: Vec<CaseDeathCount>,
    pub detail_cases: Vec<Case>,
}

impl CustomReport {
    pub(crate) fn build(
        tree: UnitTree,
        scope_unit: &AdminUnit,
        selected: &[(AdminUnit, RowScope)],
        cases: Vec<Case>,
        range: DateRange,
        authority_name: &str,
    ) -> Self {
        let rows = tally_custom(selected, &cases, &range);
        let mut totals = vec![CaseDeathCount::default(); REPORTABLE_DISEASES.len()];
        for row in &rows {
            for (total, count) in totals.iter_mut().zip(&row.counts) {
                total.cases += count.cases;
                total.deaths += count.deaths;
            }
        }
        let detail_cases = cases
            .into_iter()
            .filter(|c| range.contains_opt(c.onset_date) && selected.iter().any(|(_, s)| s.covers(c)))
            .collect();

        let header = HeaderInfo::for_unit(&tree, scope_unit, authority_name, COMMUNICABLE_TITLE, range.subtitle());
        let footer = FooterInfo::for_unit(scope_unit, range.end);
        Self {
            range,
            header,
            footer,
            tree,
            rows,
            totals,
            detail_cases,
        }
    }

    pub fn render(&self) -> SheetResult<Vec<u8>> {
        let formats = Formats::new();
        let mut workbook = Workbook::new();
        workbook.push_worksheet(self.summary_sheet(&formats)?);

        let title = format!("DANH SÁCH CA BỆNH {}", self.range.subtitle().to_uppercase());
        if let Some(sheet) = draw_case_details_sheet(&self.detail_cases, &self.tree, &title, &formats)? {
            workbook.push_worksheet(sheet);
        }
        workbook.save_to_buffer()
    }

    fn summary_sheet(&self, formats: &Formats) -> SheetResult<Worksheet> {
        let mut ws = Worksheet::new();
        ws.set_name("BaoCaoTuyChinh")?;
        let last_col = (REPORTABLE_DISEASES.len() * 2) as u16;
        draw_standard_header(&mut ws, formats, &self.header, last_col)?;

        let h = TABLE_HEADER_ROW;
        ws.set_row_height(h, 50)?;
        ws.set_column_width(0, 25)?;
        ws.merge_range(h, 0, h + 1, 0, "Địa phương", &formats.header)?;
        for (i, disease) in REPORTABLE_DISEASES.iter().enumerate() {
            let col = 1 + (i * 2) as u16;
            let width = (disease.chars().count() / 2).max(10) as f64;
            ws.set_column_width(col, width)?;
            ws.set_column_width(col + 1, width)?;
            ws.merge_range(h, col, h, col + 1, disease, &formats.header)?;
            ws.write_string_with_format(h + 1, col, "Mắc", &formats.header)?;
            ws.write_string_with_format(h + 1, col + 1, "Chết", &formats.header)?;
        }

        let data_start = h + 2;
        for (i, row) in self.rows.iter().enumerate() {
            let r = data_start + i as u32;
            ws.write_string_with_format(r, 0, &row.unit.name, &formats.row_label)?;
            for (j, count) in row.counts.iter().enumerate() {
                let col = 1 + (j * 2) as u16;
                write_count(&mut ws, r, col, count.cases, &formats.cell)?;
                write_count(&mut ws, r, col + 1, count.deaths, &formats.cell)?;
            }
        }

        let total_row = data_start + self.rows.len() as u32;
        ws.write_string_with_format(total_row, 0, "TỔNG CỘNG", &formats.total_label)?;
        for col in 1..=last_col {
            let letter = column_letter(col);
            let formula = format!("=SUM({0}{1}:{0}{2})", letter, data_start + 1, total_row);
            ws.write_formula_with_format(total_row, col, formula.as_str(), &formats.total_cell)?;
        }

        draw_standard_footer(&mut ws, formats, &self.footer, total_row, last_col)?;
        Ok(ws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use dsr_core::catalog::{DECEASED, DENGUE};

    #[test]
    fn test_region_row_aggregates_communes() {
        let tree = sample_tree();
        let region = tree.get(2).unwrap().clone();
        let commune = tree.get(12).unwrap().clone();
        let selected = vec![
            (region.clone(), RowScope::for_unit(&tree, &region)),
            (commune.clone(), RowScope::for_unit(&tree, &commune)),
        ];
        let range = DateRange::new(d(2024, 4, 1), d(2024, 4, 30)).unwrap();

        let mut dead = case(3, DENGUE, 12, d(2024, 4, 20), d(2024, 4, 21));
        dead.status = Some(DECEASED.to_string());
        let cases = vec![
            case(1, DENGUE, 10, d(2024, 4, 2), d(2024, 4, 2)),
            case(2, DENGUE, 11, d(2024, 4, 3), d(2024, 4, 3)),
            dead,
            case(4, DENGUE, 11, d(2024, 5, 1), d(2024, 5, 1)),
        ];
        let rows = tally_custom(&selected, &cases, &range);
        let dengue = REPORTABLE_DISEASES.iter().position(|d| *d == DENGUE).unwrap();
        assert_eq!(rows[0].counts[dengue], CaseDeathCount { cases: 2, deaths: 0 });
        assert_eq!(rows[1].counts[dengue], CaseDeathCount { cases: 1, deaths: 1 });
    }

    #[test]
    fn test_hamlet_scope() {
        let tree = sample_tree();
        let hamlet = tree.get(20).unwrap().clone();
        let scope = RowScope::for_unit(&tree, &hamlet);
        assert_eq!(scope.commune_ids(), vec![10]);
        let mut inside = case(1, DENGUE, 10, d(2024, 4, 2), d(2024, 4, 2));
        inside.hamlet = Some(" Ấp Đông ".to_string());
        assert!(scope.covers(&inside));
        let outside = case(2, DENGUE, 10, d(2024, 4, 2), d(2024, 4, 2));
        assert!(!scope.covers(&outside));
    }

    #[test]
    fn test_render_custom_report() {
        let tree = sample_tree();
        let province = tree.get(1).unwrap().clone();
        let commune = tree.get(13).unwrap().clone();
        let selected = vec![(commune.clone(), RowScope::for_unit(&tree, &commune))];
        let range = DateRange::new(d(2024, 4, 1), d(2024, 4, 30)).unwrap();
        let cases = vec![case(1, DENGUE, 13, d(2024, 4, 2), d(2024, 4, 2))];

        let report = CustomReport::build(tree, &province, &selected, cases, range, "Sở Y tế An Giang");
        let bytes = report.render().unwrap();
        let mut book = open(&bytes);
        assert_eq!(sheet_names(&mut book), vec!["BaoCaoTuyChinh", "ChiTiet_CaBenh"]);
        let summary = sheet(&mut book, "BaoCaoTuyChinh");
        assert_eq!(text(&summary, 6, 0), "Từ ngày 01/04/2024 đến ngày 30/04/2024");
        assert_eq!(text(&summary, 11, 0), "Đảo Xanh");
        assert_eq!(number(&summary, 11, 5), 1.0);
        let formulas = formulas(&mut book, "BaoCaoTuyChinh");
        assert_eq!(formula_at(&formulas, 12, 5), "SUM(F12:F12)");
    }
}
