//! 通用工具函数

use chrono::{Datelike, Duration, NaiveDate};

/// 报表与界面统一的日期格式 dd/mm/yyyy
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

pub fn format_optional_date(date: Option<NaiveDate>) -> String {
    date.map(format_date).unwrap_or_default()
}

/// 解析日期，日在前
///
/// 支持 `dd/mm/yyyy`、`dd-mm-yyyy`、`dd.mm.yyyy`、ISO `yyyy-mm-dd`，
/// 以及带时间部分的写法（时间部分被忽略）。
pub fn parse_date_dayfirst(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    // 去掉时间部分
    let date_part = trimmed
        .split(|c: char| c == ' ' || c == 'T')
        .next()
        .unwrap_or(trimmed);

    const FORMATS: [&str; 5] = ["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d", "%Y/%m/%d"];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Excel 序列日期转换（1900日期系统，以1899-12-30为零点）
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// 某月最后一天
pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// 把日期平移到另一年份的同月同日，2月29日落到2月28日
pub fn same_day_in_year(date: NaiveDate, year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, date.month(), date.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), date.day() - 1))
}

/// 首字母大写（越南语名称用于句首）
pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// 空白字符串视为缺失
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_date_dayfirst() {
        assert_eq!(parse_date_dayfirst("05/03/2024"), Some(d(2024, 3, 5)));
        assert_eq!(parse_date_dayfirst("5-3-2024"), Some(d(2024, 3, 5)));
        assert_eq!(parse_date_dayfirst("2024-03-05"), Some(d(2024, 3, 5)));
        assert_eq!(parse_date_dayfirst("2024-03-05 00:00:00"), Some(d(2024, 3, 5)));
        assert_eq!(parse_date_dayfirst("   "), None);
        assert_eq!(parse_date_dayfirst("không rõ"), None);
    }

    #[test]
    fn test_excel_serial_to_date() {
        assert_eq!(excel_serial_to_date(45356.0), Some(d(2024, 3, 5)));
        assert_eq!(excel_serial_to_date(0.0), None);
    }

    #[test]
    fn test_month_helpers() {
        assert_eq!(last_day_of_month(2024, 2), Some(d(2024, 2, 29)));
        assert_eq!(last_day_of_month(2023, 12), Some(d(2023, 12, 31)));
        assert_eq!(same_day_in_year(d(2024, 2, 29), 2023), Some(d(2023, 2, 28)));
        assert_eq!(format_date(d(2024, 1, 7)), "07/01/2024");
    }

    #[test]
    fn test_text_helpers() {
        assert_eq!(capitalize_first("tỉnh An Giang"), "Tỉnh An Giang");
        assert_eq!(non_empty(Some("  ".to_string())), None);
        assert_eq!(non_empty(Some(" Ấp 1 ".to_string())), Some("Ấp 1".to_string()));
    }
}
