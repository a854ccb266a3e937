//! Excel 工作表解析
//!
//! 读取上传文件的第一个工作表，按表头名称取列。

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{Data, Range, Reader, Xlsx};
use chrono::NaiveDate;
use dsr_core::utils::{excel_serial_to_date, format_date, non_empty, parse_date_dayfirst};
use dsr_core::{DsrError, Result, UnitLevel};
use tracing::{debug, info};

/// 病例导入模板的列
pub const CASE_HEADERS: [&str; 13] = [
    "Mã số",
    "Họ tên",
    "Ngày sinh",
    "Giới tính",
    "Nơi ở hiện nay",
    "Xã",
    "Ấp",
    "Ngày khởi phát",
    "Ngày nhập viện/khám",
    "Ngày ra viện/chuyển viện/tử vong",
    "Chẩn đoán chính",
    "Phân độ bệnh",
    "Tình trạng hiện nay",
];

/// 可以缺省的列
const OPTIONAL_CASE_HEADERS: [&str; 1] = ["Ấp"];

/// 单位树导入的列
pub const UNIT_HEADERS: [&str; 3] = ["ten_don_vi", "cap_don_vi", "ten_don_vi_cha"];

/// 病例表中的一行，尚未校验
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCaseRow {
    /// 工作表行号，表头为第1行
    pub row_number: u32,
    pub patient_code: Option<String>,
    pub full_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<String>,
    pub address_detail: Option<String>,
    pub commune_name: Option<String>,
    pub hamlet: Option<String>,
    pub onset_date: Option<NaiveDate>,
    pub admission_date: Option<NaiveDate>,
    pub discharge_date: Option<NaiveDate>,
    pub diagnosis: Option<String>,
    pub severity: Option<String>,
    pub status: Option<String>,
}

/// 单位树表中的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUnitRow {
    pub row_number: u32,
    pub name: String,
    pub level: UnitLevel,
    pub parent_name: Option<String>,
}

fn spreadsheet_error(e: impl std::fmt::Display) -> DsrError {
    DsrError::Spreadsheet(e.to_string())
}

/// 打开工作簿并取第一个工作表
fn first_sheet(bytes: &[u8]) -> Result<Range<Data>> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec())).map_err(spreadsheet_error)?;
    workbook
        .worksheet_range_at(0)
        .ok_or_else(|| DsrError::Import("File Excel không có trang tính nào.".to_string()))?
        .map_err(spreadsheet_error)
}

pub fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        // 纯数字的患者编号按整数读取
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()).map(format_date)?,
    };
    non_empty(Some(text))
}

/// 日期单元格：Excel 日期、序列号或日在前的文本
pub fn cell_date(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()),
        Data::Float(f) => excel_serial_to_date(*f),
        Data::Int(i) => excel_serial_to_date(*i as f64),
        Data::String(s) | Data::DateTimeIso(s) => parse_date_dayfirst(s),
        _ => None,
    }
}

/// 表头行：列名到列下标
struct HeaderMap {
    columns: HashMap<String, usize>,
    first_row: u32,
}

impl HeaderMap {
    fn read(range: &Range<Data>) -> Option<Self> {
        let header = range.rows().next()?;
        let columns = header
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| cell_text(cell).map(|name| (name, i)))
            .collect();
        let first_row = range.start().map_or(0, |(row, _)| row);
        Some(Self { columns, first_row })
    }

    fn missing<'h>(&self, headers: &[&'h str], optional: &[&str]) -> Vec<&'h str> {
        headers
            .iter()
            .filter(|h| !optional.contains(*h) && !self.columns.contains_key(**h))
            .copied()
            .collect()
    }

    fn get<'r>(&self, row: &'r [Data], header: &str) -> Option<&'r Data> {
        self.columns.get(header).and_then(|i| row.get(*i))
    }

    fn text(&self, row: &[Data], header: &str) -> Option<String> {
        self.get(row, header).and_then(cell_text)
    }

    fn date(&self, row: &[Data], header: &str) -> Option<NaiveDate> {
        self.get(row, header).and_then(cell_date)
    }

    /// 数据行的工作表行号（1起）
    fn row_number(&self, index: usize) -> u32 {
        self.first_row + index as u32 + 1
    }
}

fn is_blank(row: &[Data]) -> bool {
    row.iter().all(|c| cell_text(c).is_none())
}

/// 解析病例导入文件
pub fn parse_case_sheet(bytes: &[u8]) -> Result<Vec<RawCaseRow>> {
    let range = first_sheet(bytes)?;
    let header = HeaderMap::read(&range)
        .ok_or_else(|| DsrError::Import("File Excel không có dữ liệu.".to_string()))?;

    let missing = header.missing(&CASE_HEADERS, &OPTIONAL_CASE_HEADERS);
    if !missing.is_empty() {
        return Err(DsrError::Import(format!(
            "Các cột sau không tồn tại: {}",
            missing.join(", ")
        )));
    }

    let rows: Vec<RawCaseRow> = range
        .rows()
        .enumerate()
        .skip(1)
        .filter(|(_, row)| !is_blank(row))
        .map(|(index, row)| RawCaseRow {
            row_number: header.row_number(index),
            patient_code: header.text(row, "Mã số"),
            full_name: header.text(row, "Họ tên"),
            birth_date: header.date(row, "Ngày sinh"),
            sex: header.text(row, "Giới tính"),
            address_detail: header.text(row, "Nơi ở hiện nay"),
            commune_name: header.text(row, "Xã"),
            hamlet: header.text(row, "Ấp"),
            onset_date: header.date(row, "Ngày khởi phát"),
            admission_date: header.date(row, "Ngày nhập viện/khám"),
            discharge_date: header.date(row, "Ngày ra viện/chuyển viện/tử vong"),
            diagnosis: header.text(row, "Chẩn đoán chính"),
            severity: header.text(row, "Phân độ bệnh"),
            status: header.text(row, "Tình trạng hiện nay"),
        })
        .collect();

    info!("Parsed {} case rows from uploaded sheet", rows.len());
    Ok(rows)
}

/// 解析单位树文件，按级别排序使上级单位先于下级
///
/// 返回可导入的行与无法识别级别的行的错误信息。
pub fn parse_unit_sheet(bytes: &[u8]) -> Result<(Vec<RawUnitRow>, Vec<String>)> {
    let range = first_sheet(bytes)?;
    let header = HeaderMap::read(&range)
        .ok_or_else(|| DsrError::Import("File Excel không có dữ liệu.".to_string()))?;

    let missing = header.missing(&UNIT_HEADERS, &["ten_don_vi_cha"]);
    if !missing.is_empty() {
        return Err(DsrError::Import(format!(
            "Các cột sau không tồn tại: {}",
            missing.join(", ")
        )));
    }

    let mut units = Vec::new();
    let mut errors = Vec::new();
    for (index, row) in range.rows().enumerate().skip(1) {
        if is_blank(row) {
            continue;
        }
        let row_number = header.row_number(index);
        let Some(name) = header.text(row, "ten_don_vi") else {
            errors.push(format!("Dòng {}: thiếu tên đơn vị.", row_number));
            continue;
        };
        let level_label = header.text(row, "cap_don_vi").unwrap_or_default();
        let Some(level) = UnitLevel::from_label(&level_label) else {
            errors.push(format!(
                "Dòng {}: cấp đơn vị '{}' không hợp lệ.",
                row_number, level_label
            ));
            continue;
        };
        units.push(RawUnitRow {
            row_number,
            name,
            level,
            parent_name: header.text(row, "ten_don_vi_cha"),
        });
    }

    // 稳定排序，同级保持文件中的顺序
    units.sort_by_key(|u| u.level.rank());
    debug!("Parsed {} unit rows, {} rejected", units.len(), errors.len());
    Ok((units, errors))
}
