//! 报表版式
//!
//! 所有报表共用的格式、标准表头、标准表尾以及明细工作表。

use chrono::{Datelike, NaiveDate};
use dsr_core::hierarchy::formatted_unit_name;
use dsr_core::utils::format_optional_date;
use dsr_core::{AdminUnit, Case, UnitTree};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, FormatUnderline, Worksheet, XlsxError};

pub(crate) type SheetResult<T = ()> = std::result::Result<T, XlsxError>;

const FONT: &str = "Times New Roman";
const HEADER_FILL: u32 = 0xDDEBF7;

/// 表头所在行（0起）
pub(crate) const TABLE_HEADER_ROW: u32 = 9;

/// 报表使用的全部单元格格式
#[derive(Debug, Clone)]
pub(crate) struct Formats {
    pub org: Format,
    pub org_bold: Format,
    pub motto: Format,
    pub motto_underline: Format,
    pub title: Format,
    pub subtitle: Format,
    pub header: Format,
    pub cell: Format,
    pub cell_left: Format,
    pub cell_left_wrap: Format,
    pub cell_top_center: Format,
    pub row_label: Format,
    pub total_label: Format,
    pub total_cell: Format,
    pub note: Format,
    pub remark_title: Format,
    pub comment: Format,
    pub sign_date: Format,
    pub sign_title: Format,
    pub recipients: Format,
}

impl Formats {
    pub fn new() -> Self {
        let base = Format::new().set_font_name(FONT).set_font_size(13);
        let centered = base
            .clone()
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter);
        let bordered = base.clone().set_border(FormatBorder::Thin);

        Self {
            org: centered.clone(),
            org_bold: centered.clone().set_bold(),
            motto: centered.clone().set_bold(),
            motto_underline: centered.clone().set_bold().set_underline(FormatUnderline::Single),
            title: centered.clone().set_bold().set_font_size(14),
            subtitle: centered.clone().set_italic(),
            header: bordered
                .clone()
                .set_bold()
                .set_text_wrap()
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
                .set_background_color(Color::RGB(HEADER_FILL)),
            cell: bordered
                .clone()
                .set_font_size(12)
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter),
            cell_left: bordered
                .clone()
                .set_font_size(12)
                .set_align(FormatAlign::Left)
                .set_align(FormatAlign::VerticalCenter),
            cell_left_wrap: bordered
                .clone()
                .set_font_size(12)
                .set_text_wrap()
                .set_align(FormatAlign::Left)
                .set_align(FormatAlign::Top),
            cell_top_center: bordered
                .clone()
                .set_font_size(12)
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::Top),
            row_label: bordered
                .clone()
                .set_bold()
                .set_text_wrap()
                .set_align(FormatAlign::Left)
                .set_align(FormatAlign::VerticalCenter),
            total_label: bordered
                .clone()
                .set_bold()
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
                .set_background_color(Color::RGB(HEADER_FILL)),
            total_cell: bordered
                .set_bold()
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter),
            note: base.clone().set_italic().set_font_size(12),
            remark_title: base.clone().set_bold().set_underline(FormatUnderline::Single),
            comment: base
                .clone()
                .set_text_wrap()
                .set_align(FormatAlign::Left)
                .set_align(FormatAlign::Top),
            sign_date: centered.clone().set_italic(),
            sign_title: centered.set_bold(),
            recipients: base.set_bold().set_italic().set_font_size(12),
        }
    }
}

impl Default for Formats {
    fn default() -> Self {
        Self::new()
    }
}

/// 合并区域；单个单元格时直接写入（xlsx 不允许合并单个单元格）
pub(crate) fn merge_or_write(
    ws: &mut Worksheet,
    first_row: u32,
    first_col: u16,
    last_row: u32,
    last_col: u16,
    text: &str,
    format: &Format,
) -> SheetResult {
    if first_row == last_row && first_col == last_col {
        ws.write_string_with_format(first_row, first_col, text, format)?;
    } else {
        ws.merge_range(first_row, first_col, last_row, last_col, text, format)?;
    }
    Ok(())
}

pub(crate) fn write_count(ws: &mut Worksheet, row: u32, col: u16, value: u32, format: &Format) -> SheetResult {
    ws.write_number_with_format(row, col, value as f64, format)?;
    Ok(())
}

/// 列号转字母（0 -> A）
pub(crate) fn column_letter(col: u16) -> String {
    let mut n = col as u32 + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// 标准表头所需信息
#[derive(Debug, Clone)]
pub(crate) struct HeaderInfo {
    pub parent_name: String,
    pub unit_name: String,
    pub document_number: String,
    pub title: String,
    pub period_label: String,
    pub date_range: Option<String>,
}

impl HeaderInfo {
    pub fn for_unit(tree: &UnitTree, unit: &AdminUnit, authority_name: &str, title: &str, period_label: String) -> Self {
        Self {
            parent_name: tree.parent_header_name(unit, authority_name),
            unit_name: formatted_unit_name(unit),
            document_number: unit.level.document_number().to_string(),
            title: title.to_string(),
            period_label,
            date_range: None,
        }
    }

    pub fn with_date_range(mut self, text: String) -> Self {
        self.date_range = Some(text);
        self
    }
}

/// 标准表尾所需信息
#[derive(Debug, Clone)]
pub(crate) struct FooterInfo {
    pub place: String,
    pub date: NaiveDate,
    pub signer_title: String,
}

impl FooterInfo {
    pub fn for_unit(unit: &AdminUnit, date: NaiveDate) -> Self {
        Self {
            place: unit.name.clone(),
            date,
            signer_title: unit.level.signer_title().to_string(),
        }
    }
}

/// 左侧机关名称与编号，右侧国号与标语，下方标题、报告期、日期区间
pub(crate) fn draw_standard_header(ws: &mut Worksheet, formats: &Formats, header: &HeaderInfo, last_col: u16) -> SheetResult {
    let left_end = 4.min(last_col);
    let right_start = (left_end + 2).min(last_col);

    merge_or_write(ws, 0, 0, 0, left_end, &header.parent_name, &formats.org)?;
    merge_or_write(ws, 1, 0, 1, left_end, &header.unit_name, &formats.org_bold)?;
    merge_or_write(ws, 3, 0, 3, left_end, &header.document_number, &formats.org)?;

    merge_or_write(ws, 0, right_start, 0, last_col, "CỘNG HOÀ XÃ HỘI CHỦ NGHĨA VIỆT NAM", &formats.motto)?;
    merge_or_write(ws, 1, right_start, 1, last_col, "Độc lập - Tự do - Hạnh phúc", &formats.motto_underline)?;

    merge_or_write(ws, 5, 0, 5, last_col, &header.title, &formats.title)?;
    merge_or_write(ws, 6, 0, 6, last_col, &header.period_label, &formats.subtitle)?;
    if let Some(range) = &header.date_range {
        merge_or_write(ws, 7, 0, 7, last_col, range, &formats.subtitle)?;
    }
    Ok(())
}

/// 落款：地点日期、签字人职务、报告人、接收单位
///
/// `base_row` 为正文最后使用的行，落款与正文之间空一行。
pub(crate) fn draw_standard_footer(
    ws: &mut Worksheet,
    formats: &Formats,
    footer: &FooterInfo,
    base_row: u32,
    last_col: u16,
) -> SheetResult<u32> {
    let sign_start = last_col.saturating_sub(5).max(1);
    let date_row = base_row + 2;
    let title_row = date_row + 1;
    let recipients_row = title_row + 6;

    let date_line = format!(
        "{}, ngày {} tháng {} năm {}",
        footer.place,
        footer.date.day(),
        footer.date.month(),
        footer.date.year()
    );
    merge_or_write(ws, date_row, sign_start, date_row, last_col, &date_line, &formats.sign_date)?;
    merge_or_write(ws, title_row, sign_start, title_row, last_col, &footer.signer_title, &formats.sign_title)?;

    // 报告人占A列起，避免与签字区重叠
    let reporter_end = 3.min(sign_start.saturating_sub(1));
    merge_or_write(ws, title_row, 0, title_row, reporter_end, "NGƯỜI BÁO CÁO", &formats.sign_title)?;

    ws.write_string_with_format(recipients_row, 0, "Nơi nhận:", &formats.recipients)?;
    Ok(recipients_row)
}

/// 写入“Nhận xét:”与评语，返回最后一行
pub(crate) fn draw_comments(
    ws: &mut Worksheet,
    formats: &Formats,
    start_row: u32,
    comments: &[String],
    last_col: u16,
) -> SheetResult<u32> {
    ws.write_string_with_format(start_row, 0, "Nhận xét:", &formats.remark_title)?;
    let mut row = start_row;
    for comment in comments {
        row += 1;
        merge_or_write(ws, row, 0, row, last_col, comment, &formats.comment)?;
        let lines = comment.chars().count() / 140 + 1;
        ws.set_row_height(row, 18.0 * lines as f64)?;
    }
    Ok(row)
}

/// 明细表的单元格值
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

impl CellValue {
    fn display_len(&self) -> usize {
        match self {
            CellValue::Text(text) => text.chars().count(),
            CellValue::Number(n) => n.to_string().len(),
            CellValue::Empty => 0,
        }
    }
}

impl From<String> for CellValue {
    fn from(text: String) -> Self {
        if text.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(text)
        }
    }
}

impl From<Option<String>> for CellValue {
    fn from(text: Option<String>) -> Self {
        text.map(CellValue::from).unwrap_or(CellValue::Empty)
    }
}

/// 标题 + 表头 + 数据行的明细工作表，列宽按内容自适应
///
/// 标题在第1行，表头在第3行，数据从第4行开始。
pub(crate) fn draw_table_sheet(
    name: &str,
    title: &str,
    headers: &[&str],
    rows: &[Vec<CellValue>],
    formats: &Formats,
) -> SheetResult<Worksheet> {
    let mut ws = Worksheet::new();
    ws.set_name(name)?;

    let last_col = headers.len().saturating_sub(1) as u16;
    merge_or_write(&mut ws, 0, 0, 0, last_col, title, &formats.title)?;

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for (col, header) in headers.iter().enumerate() {
        ws.write_string_with_format(2, col as u16, *header, &formats.header)?;
    }

    for (offset, row) in rows.iter().enumerate() {
        let row_idx = 3 + offset as u32;
        for (col, value) in row.iter().enumerate() {
            let col_idx = col as u16;
            match value {
                CellValue::Text(text) => {
                    ws.write_string_with_format(row_idx, col_idx, text, &formats.cell_left)?;
                }
                CellValue::Number(n) => {
                    ws.write_number_with_format(row_idx, col_idx, *n, &formats.cell)?;
                }
                CellValue::Empty => {
                    ws.write_blank(row_idx, col_idx, &formats.cell_left)?;
                }
            }
            if let Some(width) = widths.get_mut(col) {
                *width = (*width).max(value.display_len());
            }
        }
    }

    for (col, width) in widths.iter().enumerate() {
        ws.set_column_width(col as u16, (*width + 2) as f64)?;
    }
    Ok(ws)
}

/// 病例明细的列
pub(crate) const CASE_DETAIL_HEADERS: [&str; 8] = [
    "Họ và tên",
    "Ngày sinh",
    "Xã/Phường",
    "Ấp/Khu vực",
    "Địa chỉ chi tiết",
    "Chẩn đoán",
    "Ngày khởi phát",
    "Tình trạng",
];

pub(crate) fn case_detail_row(case: &Case, tree: &UnitTree) -> Vec<CellValue> {
    vec![
        CellValue::from(case.full_name.clone()),
        CellValue::from(format_optional_date(case.birth_date)),
        CellValue::from(tree.get(case.commune_id).map(|u| u.name.clone())),
        CellValue::from(case.hamlet.clone()),
        CellValue::from(case.address_detail.clone()),
        CellValue::from(case.diagnosis.clone()),
        CellValue::from(format_optional_date(case.onset_date)),
        CellValue::from(case.status.clone()),
    ]
}

/// “ChiTiet_CaBenh”工作表，无病例时不生成
pub(crate) fn draw_case_details_sheet(
    cases: &[Case],
    tree: &UnitTree,
    title: &str,
    formats: &Formats,
) -> SheetResult<Option<Worksheet>> {
    if cases.is_empty() {
        return Ok(None);
    }
    let rows: Vec<Vec<CellValue>> = cases.iter().map(|c| case_detail_row(c, tree)).collect();
    draw_table_sheet("ChiTiet_CaBenh", title, &CASE_DETAIL_HEADERS, &rows, formats).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(11), "L");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
    }

    #[test]
    fn test_merge_or_write_single_cell() {
        let formats = Formats::new();
        let mut ws = Worksheet::new();
        // 单元格合并会报错，这里应直接写入
        assert!(merge_or_write(&mut ws, 0, 0, 0, 0, "x", &formats.cell).is_ok());
        assert!(merge_or_write(&mut ws, 1, 0, 1, 3, "y", &formats.cell).is_ok());
    }

    #[test]
    fn test_cell_value_from_empty_text() {
        assert_eq!(CellValue::from(String::new()), CellValue::Empty);
        assert_eq!(CellValue::from(None::<String>), CellValue::Empty);
        assert_eq!(CellValue::from("A".to_string()), CellValue::Text("A".to_string()));
    }
}
