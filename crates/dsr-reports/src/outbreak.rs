//! 疫点报告（SXH / TCM）
//!
//! 统计报告期内处于活动状态的疫点，并列出每个疫点的关联病例。

use std::collections::HashMap;
use std::ops::AddAssign;

use dsr_core::utils::format_date;
use dsr_core::{AdminUnit, Case, Outbreak, OutbreakDisease, PeriodWindow, ReportingUnits, UnitTree};
use rust_xlsxwriter::{Workbook, Worksheet};
use serde::Serialize;

use crate::layout::{
    draw_standard_footer, draw_standard_header, merge_or_write, write_count, FooterInfo, Formats, HeaderInfo,
    SheetResult, TABLE_HEADER_ROW,
};

/// 手足口病疫点的发现场所分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HfmdPlace {
    School,
    Community,
    Other,
}

pub fn classify_place(place: Option<&str>) -> HfmdPlace {
    let Some(place) = place else {
        return HfmdPlace::Other;
    };
    let lowered = place.to_lowercase();
    if ["trường", "nhà trẻ", "mầm non"].iter().any(|k| lowered.contains(k)) {
        HfmdPlace::School
    } else if ["gia đình", "cộng đồng", "hộ"].iter().any(|k| lowered.contains(k)) {
        HfmdPlace::Community
    } else {
        HfmdPlace::Other
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutbreakCounts {
    pub new_detected: u32,
    pub resolved: u32,
    pub active_at_end: u32,
    pub cumulative: u32,
    pub linked_cases: u32,
    pub two_cases_in_7_days: u32,
    pub severe_case: u32,
    pub lab_confirmed: u32,
    pub death: u32,
    pub school: u32,
    pub community: u32,
    pub other_place: u32,
}

impl OutbreakCounts {
    /// 表格中的数字列，按病种取不同的附加列
    pub fn columns(&self, disease: OutbreakDisease) -> Vec<u32> {
        let mut columns = vec![
            self.new_detected,
            self.resolved,
            self.active_at_end,
            self.cumulative,
            self.linked_cases,
        ];
        match disease {
            OutbreakDisease::Dengue => columns.extend([
                self.two_cases_in_7_days,
                self.severe_case,
                self.lab_confirmed,
                self.death,
            ]),
            OutbreakDisease::Hfmd => columns.extend([self.school, self.community, self.other_place]),
        }
        columns
    }
}

impl AddAssign for OutbreakCounts {
    fn add_assign(&mut self, other: Self) {
        self.new_detected += other.new_detected;
        self.resolved += other.resolved;
        self.active_at_end += other.active_at_end;
        self.cumulative += other.cumulative;
        self.linked_cases += other.linked_cases;
        self.two_cases_in_7_days += other.two_cases_in_7_days;
        self.severe_case += other.severe_case;
        self.lab_confirmed += other.lab_confirmed;
        self.death += other.death;
        self.school += other.school;
        self.community += other.community;
        self.other_place += other.other_place;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutbreakRow {
    pub unit: AdminUnit,
    pub counts: OutbreakCounts,
}

/// `outbreaks` 可以包含本期开始或年初以来的全部疫点，活动判断在此完成
pub fn tally_outbreaks(
    units: &ReportingUnits,
    outbreaks: &[Outbreak],
    cases: &[Case],
    window: &PeriodWindow,
) -> Vec<OutbreakRow> {
    let current = window.current;
    let ytd = window.ytd();

    let mut linked: HashMap<i64, u32> = HashMap::new();
    for outbreak_id in cases.iter().filter_map(|c| c.outbreak_id) {
        *linked.entry(outbreak_id).or_default() += 1;
    }

    units
        .units
        .iter()
        .map(|unit| {
            let mut counts = OutbreakCounts::default();
            for outbreak in outbreaks
                .iter()
                .filter(|o| units.matches(unit, o.commune_id, o.hamlet.as_deref()))
            {
                if ytd.contains(outbreak.detected_on) {
                    counts.cumulative += 1;
                }
                if !outbreak.active_during(current.start, current.end) {
                    continue;
                }
                counts.new_detected += current.contains(outbreak.detected_on) as u32;
                counts.resolved += current.contains_opt(outbreak.resolved_on) as u32;
                counts.active_at_end += outbreak.open_at(current.end) as u32;
                counts.linked_cases += linked.get(&outbreak.id).copied().unwrap_or(0);

                let criteria = outbreak.criteria;
                counts.two_cases_in_7_days += criteria.two_cases_in_7_days as u32;
                counts.severe_case += criteria.severe_case as u32;
                counts.lab_confirmed += criteria.lab_confirmed as u32;
                counts.death += criteria.death as u32;

                match classify_place(outbreak.hfmd_place.as_deref()) {
                    HfmdPlace::School => counts.school += 1,
                    HfmdPlace::Community => counts.community += 1,
                    HfmdPlace::Other => counts.other_place += 1,
                }
            }
            OutbreakRow { unit: unit.clone(), counts }
        })
        .collect()
}

pub fn outbreak_title(disease: OutbreakDisease) -> &'static str {
    match disease {
        OutbreakDisease::Dengue => "BÁO CÁO TÌNH HÌNH Ổ DỊCH SỐT XUẤT HUYẾT DENGUE",
        OutbreakDisease::Hfmd => "BÁO CÁO TÌNH HÌNH Ổ DỊCH TAY - CHÂN - MIỆNG",
    }
}

/// 疫点明细中的说明文字
pub fn outbreak_info(outbreak: &Outbreak) -> String {
    let info = format!(
        "Địa điểm: {}\nPhát hiện: {}",
        outbreak.location.as_deref().unwrap_or("Chưa xác định"),
        format_date(outbreak.detected_on)
    );
    match outbreak.disease {
        OutbreakDisease::Hfmd => {
            let kind = outbreak
                .hfmd_place
                .as_deref()
                .map(|p| format!("Ổ dịch {}", p))
                .unwrap_or_else(|| "Ổ dịch".to_string());
            format!("{}\n{}", kind, info)
        }
        OutbreakDisease::Dengue => info,
    }
}

/// 可直接渲染的疫点报告
#[derive(Debug, Clone)]
pub struct OutbreakReport {
    pub disease: OutbreakDisease,
    pub(crate) window: PeriodWindow,
    pub(crate) header: HeaderInfo,
    pub(crate) footer: FooterInfo,
    pub(crate) tree: UnitTree,
    pub rows: Vec<OutbreakRow>,
    pub totals: OutbreakCounts,
    /// 报告期内活动的疫点及其病例
    pub active: Vec<(Outbreak, Vec<Case>)>,
}

impl OutbreakReport {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn build(
        tree: UnitTree,
        unit: &AdminUnit,
        units: &ReportingUnits,
        disease: OutbreakDisease,
        outbreaks: Vec<Outbreak>,
        cases: Vec<Case>,
        window: PeriodWindow,
        authority_name: &str,
    ) -> Self {
        let rows = tally_outbreaks(units, &outbreaks, &cases, &window);
        let mut totals = OutbreakCounts::default();
        for row in &rows {
            totals += row.counts;
        }

        let mut by_outbreak: HashMap<i64, Vec<Case>> = HashMap::new();
        for case in cases {
            if let Some(id) = case.outbreak_id {
                by_outbreak.entry(id).or_default().push(case);
            }
        }
        let active = outbreaks
            .into_iter()
            .filter(|o| o.active_during(window.current.start, window.current.end))
            .map(|o| {
                let linked = by_outbreak.remove(&o.id).unwrap_or_default();
                (o, linked)
            })
            .collect();

        let header = HeaderInfo::for_unit(&tree, unit, authority_name, outbreak_title(disease), window.label())
            .with_date_range(window.current.subtitle());
        let footer = FooterInfo::for_unit(unit, window.current.end);

        Self {
            disease,
            window,
            header,
            footer,
            tree,
            rows,
            totals,
            active,
        }
    }

    pub fn render(&self) -> SheetResult<Vec<u8>> {
        let formats = Formats::new();
        let mut workbook = Workbook::new();
        workbook.push_worksheet(self.summary_sheet(&formats)?);
        if let Some(sheet) = self.cases_sheet(&formats)? {
            workbook.push_worksheet(sheet);
        }
        workbook.save_to_buffer()
    }

    fn extra_headers(&self) -> (&'static str, &'static [&'static str]) {
        match self.disease {
            OutbreakDisease::Dengue => (
                "Tiêu chí xác định ổ dịch",
                &["≥2 ca trong 7 ngày", "Có ca SXHD nặng", "Có xét nghiệm dương tính", "Có ca tử vong"],
            ),
            OutbreakDisease::Hfmd => (
                "Nơi phát hiện",
                &["Trường học/Nhà trẻ", "Hộ gia đình/Cộng đồng", "Khác"],
            ),
        }
    }

    fn summary_sheet(&self, formats: &Formats) -> SheetResult<Worksheet> {
        let mut ws = Worksheet::new();
        ws.set_name(format!("BaoCaoODich_{}", self.disease.code()))?;

        let base_headers = [
            "Ổ dịch mới phát hiện",
            "Ổ dịch đã xử lý xong",
            "Ổ dịch còn hoạt động",
            "Cộng dồn ổ dịch",
            "Số ca bệnh liên quan",
        ];
        let (group_title, extra) = self.extra_headers();
        let last_col = (base_headers.len() + extra.len()) as u16;
        draw_standard_header(&mut ws, formats, &self.header, last_col)?;

        let h = TABLE_HEADER_ROW;
        ws.set_row_height(h, 35)?;
        ws.set_row_height(h + 1, 50)?;
        ws.set_column_width(0, 25)?;
        ws.merge_range(h, 0, h + 1, 0, "Địa phương", &formats.header)?;
        for (i, title) in base_headers.iter().enumerate() {
            let col = 1 + i as u16;
            ws.set_column_width(col, 14)?;
            ws.merge_range(h, col, h + 1, col, title, &formats.header)?;
        }
        let extra_start = 1 + base_headers.len() as u16;
        merge_or_write(&mut ws, h, extra_start, h, last_col, group_title, &formats.header)?;
        for (i, title) in extra.iter().enumerate() {
            let col = extra_start + i as u16;
            ws.set_column_width(col, 14)?;
            ws.write_string_with_format(h + 1, col, *title, &formats.header)?;
        }

        let mut row = h + 2;
        for unit_row in &self.rows {
            ws.write_string_with_format(row, 0, &unit_row.unit.name, &formats.cell_left)?;
            for (i, value) in unit_row.counts.columns(self.disease).iter().enumerate() {
                write_count(&mut ws, row, 1 + i as u16, *value, &formats.cell)?;
            }
            row += 1;
        }
        ws.write_string_with_format(row, 0, "TỔNG CỘNG", &formats.total_label)?;
        for (i, value) in self.totals.columns(self.disease).iter().enumerate() {
            write_count(&mut ws, row, 1 + i as u16, *value, &formats.total_cell)?;
        }

        draw_standard_footer(&mut ws, formats, &self.footer, row, last_col)?;
        Ok(ws)
    }

    /// 按疫点列出病例，STT 与疫点信息跨该疫点的病例行合并
    fn cases_sheet(&self, formats: &Formats) -> SheetResult<Option<Worksheet>> {
        let with_cases: Vec<&(Outbreak, Vec<Case>)> =
            self.active.iter().filter(|(_, cases)| !cases.is_empty()).collect();
        if with_cases.is_empty() {
            return Ok(None);
        }

        let mut ws = Worksheet::new();
        ws.set_name("ChiTiet_ODich")?;
        let headers = [
            "STT",
            "Thông tin ổ dịch",
            "Họ và tên",
            "Ngày sinh",
            "Xã/Phường",
            "Ấp/Khu vực",
            "Địa chỉ chi tiết",
            "Ngày khởi phát",
            "Tình trạng",
        ];
        let last_col = (headers.len() - 1) as u16;
        let title = format!(
            "DANH SÁCH CA BỆNH THEO Ổ DỊCH {} TRONG {}",
            self.disease.display_name().to_uppercase(),
            self.window.label().to_uppercase()
        );
        merge_or_write(&mut ws, 0, 0, 0, last_col, &title, &formats.title)?;
        for (col, header) in headers.iter().enumerate() {
            ws.write_string_with_format(2, col as u16, *header, &formats.header)?;
        }

        let mut row = 3u32;
        for (index, (outbreak, cases)) in with_cases.iter().enumerate() {
            let span = cases.len() as u32;
            let last = row + span - 1;
            let stt = (index + 1).to_string();
            merge_or_write(&mut ws, row, 0, last, 0, &stt, &formats.cell_top_center)?;
            merge_or_write(&mut ws, row, 1, last, 1, &outbreak_info(outbreak), &formats.cell_left_wrap)?;

            for case in cases {
                let values = [
                    case.full_name.clone(),
                    dsr_core::utils::format_optional_date(case.birth_date),
                    self.tree.get(case.commune_id).map(|u| u.name.clone()).unwrap_or_default(),
                    case.hamlet.clone().unwrap_or_default(),
                    case.address_detail.clone().unwrap_or_default(),
                    dsr_core::utils::format_optional_date(case.onset_date),
                    case.status.clone().unwrap_or_default(),
                ];
                for (offset, value) in values.iter().enumerate() {
                    ws.write_string_with_format(row, 2 + offset as u16, value, &formats.cell_left)?;
                }
                row += 1;
            }
        }

        ws.set_column_width(0, 5)?;
        ws.set_column_width(1, 35)?;
        ws.set_column_width(2, 25)?;
        ws.set_column_width(3, 12)?;
        for col in 4..=6 {
            ws.set_column_width(col, 20)?;
        }
        ws.set_column_width(7, 15)?;
        ws.set_column_width(8, 15)?;
        Ok(Some(ws))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use dsr_core::catalog::{DENGUE, HFMD};
    use dsr_core::{OutbreakCriteria, ReportPeriod};

    fn outbreak(id: i64, disease: OutbreakDisease, commune_id: i64, detected: chrono::NaiveDate) -> Outbreak {
        Outbreak {
            id,
            disease,
            detected_on: detected,
            resolved_on: None,
            location: Some(format!("Điểm {}", id)),
            hamlet: None,
            commune_id,
            hfmd_place: None,
            criteria: OutbreakCriteria::default(),
            dengue_test_kind: None,
            case_count: 0,
        }
    }

    #[test]
    fn test_classify_place() {
        assert_eq!(classify_place(Some("Trường Mầm non Hoa Sen")), HfmdPlace::School);
        assert_eq!(classify_place(Some("Hộ gia đình")), HfmdPlace::Community);
        assert_eq!(classify_place(Some("Chợ")), HfmdPlace::Other);
        assert_eq!(classify_place(None), HfmdPlace::Other);
    }

    #[test]
    fn test_tally_outbreaks() {
        let tree = sample_tree();
        let units = tree.reporting_units(2).unwrap();
        // 2024年3月
        let window = ReportPeriod::Month { year: 2024, month: 3 }.resolve().unwrap();

        let mut fresh = outbreak(1, OutbreakDisease::Dengue, 10, d(2024, 3, 5));
        fresh.criteria.two_cases_in_7_days = true;
        let mut closed = outbreak(2, OutbreakDisease::Dengue, 10, d(2024, 2, 10));
        closed.resolved_on = Some(d(2024, 3, 2));
        closed.criteria.lab_confirmed = true;
        let mut old = outbreak(3, OutbreakDisease::Dengue, 11, d(2024, 1, 5));
        old.resolved_on = Some(d(2024, 1, 30));

        let mut linked = case(7, DENGUE, 10, d(2024, 3, 4), d(2024, 3, 4));
        linked.outbreak_id = Some(1);

        let rows = tally_outbreaks(&units, &[fresh, closed, old], &[linked], &window);
        let my_binh = rows.iter().find(|r| r.unit.id == 10).unwrap().counts;
        assert_eq!(my_binh.new_detected, 1);
        assert_eq!(my_binh.resolved, 1);
        assert_eq!(my_binh.active_at_end, 1);
        assert_eq!(my_binh.cumulative, 2);
        assert_eq!(my_binh.linked_cases, 1);
        assert_eq!(my_binh.two_cases_in_7_days, 1);
        assert_eq!(my_binh.lab_confirmed, 1);

        let binh_duc = rows.iter().find(|r| r.unit.id == 11).unwrap().counts;
        // 已在报告期前处理完毕，只计入累计
        assert_eq!(binh_duc.new_detected, 0);
        assert_eq!(binh_duc.active_at_end, 0);
        assert_eq!(binh_duc.cumulative, 1);
    }

    #[test]
    fn test_outbreak_info_text() {
        let mut o = outbreak(1, OutbreakDisease::Hfmd, 10, d(2024, 5, 2));
        o.hfmd_place = Some("Trường học".to_string());
        assert_eq!(outbreak_info(&o), "Ổ dịch Trường học\nĐịa điểm: Điểm 1\nPhát hiện: 02/05/2024");
        o.location = None;
        o.disease = OutbreakDisease::Dengue;
        assert_eq!(outbreak_info(&o), "Địa điểm: Chưa xác định\nPhát hiện: 02/05/2024");
    }

    #[test]
    fn test_render_hfmd_report() {
        let tree = sample_tree();
        let unit = tree.get(1).unwrap().clone();
        let units = tree.reporting_units(1).unwrap();
        let window = ReportPeriod::Week { year: 2024, week: 18 }.resolve().unwrap();

        let mut school = outbreak(1, OutbreakDisease::Hfmd, 12, window.current.start);
        school.hfmd_place = Some("Trường Mầm non".to_string());
        let mut a = case(1, HFMD, 12, window.current.start, window.current.start);
        a.outbreak_id = Some(1);
        let mut b = case(2, HFMD, 12, window.current.start, window.current.start);
        b.outbreak_id = Some(1);

        let report = OutbreakReport::build(
            tree,
            &unit,
            &units,
            OutbreakDisease::Hfmd,
            vec![school],
            vec![a, b],
            window,
            "Sở Y tế An Giang",
        );
        assert_eq!(report.totals.school, 1);
        assert_eq!(report.totals.linked_cases, 2);

        let bytes = report.render().unwrap();
        let mut book = open(&bytes);
        assert_eq!(sheet_names(&mut book), vec!["BaoCaoODich_TCM", "ChiTiet_ODich"]);

        let summary = sheet(&mut book, "BaoCaoODich_TCM");
        assert_eq!(text(&summary, 0, 0), "SỞ Y TẾ AN GIANG");
        assert_eq!(text(&summary, 5, 0), "BÁO CÁO TÌNH HÌNH Ổ DỊCH TAY - CHÂN - MIỆNG");
        assert_eq!(text(&summary, 9, 6), "Nơi phát hiện");
        assert_eq!(text(&summary, 10, 6), "Trường học/Nhà trẻ");

        let details = sheet(&mut book, "ChiTiet_ODich");
        assert_eq!(text(&details, 3, 0), "1");
        assert!(text(&details, 3, 1).starts_with("Ổ dịch Trường Mầm non"));
        assert_eq!(text(&details, 4, 4), "Vĩnh Mỹ");
    }
}
