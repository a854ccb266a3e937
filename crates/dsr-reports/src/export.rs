//! 列表导出（病例、用户）

use dsr_core::utils::format_optional_date;
use dsr_core::{Case, Result, UnitTree};
use rust_xlsxwriter::{Workbook, Worksheet};
use serde::Serialize;

use crate::generator::render_blocking;
use crate::layout::{CellValue, Formats, SheetResult};

/// 病例导出列，与导入模板的表头一致，可直接回导
pub const CASE_EXPORT_HEADERS: [&str; 14] = [
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
    "Ngày nhập liệu",
];

/// 用户导出的一行
#[derive(Debug, Clone, Serialize)]
pub struct UserExportRow {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub unit_name: Option<String>,
    pub unit_level: Option<String>,
}

/// 表头在第一行，数据紧随其后，列宽按内容自适应
fn plain_sheet(name: &str, headers: &[&str], rows: &[Vec<CellValue>], formats: &Formats) -> SheetResult<Worksheet> {
    let mut ws = Worksheet::new();
    ws.set_name(name)?;

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for (col, header) in headers.iter().enumerate() {
        ws.write_string_with_format(0, col as u16, *header, &formats.header)?;
    }
    for (i, row) in rows.iter().enumerate() {
        let r = 1 + i as u32;
        for (col, value) in row.iter().enumerate() {
            let c = col as u16;
            let len = match value {
                CellValue::Text(text) => {
                    ws.write_string(r, c, text)?;
                    text.chars().count()
                }
                CellValue::Number(n) => {
                    ws.write_number(r, c, *n)?;
                    n.to_string().len()
                }
                CellValue::Empty => 0,
            };
            if let Some(width) = widths.get_mut(col) {
                *width = (*width).max(len);
            }
        }
    }
    for (col, width) in widths.iter().enumerate() {
        ws.set_column_width(col as u16, (*width + 2) as f64)?;
    }
    Ok(ws)
}

pub fn export_cases(cases: &[Case], tree: &UnitTree) -> SheetResult<Vec<u8>> {
    let rows: Vec<Vec<CellValue>> = cases
        .iter()
        .map(|case| {
            vec![
                CellValue::from(case.patient_code.clone()),
                CellValue::from(case.full_name.clone()),
                CellValue::from(format_optional_date(case.birth_date)),
                CellValue::from(case.sex.clone()),
                CellValue::from(case.address_detail.clone()),
                CellValue::from(tree.get(case.commune_id).map(|u| u.name.clone())),
                CellValue::from(case.hamlet.clone()),
                CellValue::from(format_optional_date(case.onset_date)),
                CellValue::from(format_optional_date(case.admission_date)),
                CellValue::from(format_optional_date(case.discharge_date)),
                CellValue::from(case.diagnosis.clone()),
                CellValue::from(case.severity.clone()),
                CellValue::from(case.status.clone()),
                CellValue::from(format_optional_date(Some(case.import_date))),
            ]
        })
        .collect();

    let formats = Formats::new();
    let mut workbook = Workbook::new();
    workbook.push_worksheet(plain_sheet("DanhSachCaBenh", &CASE_EXPORT_HEADERS, &rows, &formats)?);
    workbook.save_to_buffer()
}

pub fn export_users(users: &[UserExportRow]) -> SheetResult<Vec<u8>> {
    let headers = ["ID", "Tên đăng nhập", "Quyền hạn", "Tên Đơn vị", "Cấp Đơn vị"];
    let not_available = || "N/A".to_string();
    let rows: Vec<Vec<CellValue>> = users
        .iter()
        .map(|user| {
            vec![
                CellValue::Number(user.id as f64),
                CellValue::Text(user.username.clone()),
                CellValue::Text(user.role.clone()),
                CellValue::Text(user.unit_name.clone().unwrap_or_else(not_available)),
                CellValue::Text(user.unit_level.clone().unwrap_or_else(not_available)),
            ]
        })
        .collect();

    let formats = Formats::new();
    let mut workbook = Workbook::new();
    workbook.push_worksheet(plain_sheet("DanhSachNguoiDung", &headers, &rows, &formats)?);
    workbook.save_to_buffer()
}

/// 在阻塞线程池中导出病例列表
pub async fn export_cases_xlsx(cases: Vec<Case>, tree: UnitTree) -> Result<Vec<u8>> {
    render_blocking(move || export_cases(&cases, &tree)).await
}

/// 在阻塞线程池中导出用户列表
pub async fn export_users_xlsx(users: Vec<UserExportRow>) -> Result<Vec<u8>> {
    render_blocking(move || export_users(&users)).await
}
