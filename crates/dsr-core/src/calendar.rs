//! 报告周历与报告期
//!
//! 第1周从1月1日当天或之前最近的周一开始，每周7天，最多53周。

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{DsrError, Result};
use crate::utils::{format_date, last_day_of_month, same_day_in_year};

/// 日期区间（闭区间）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(DsrError::Validation(
                "Ngày bắt đầu không được lớn hơn ngày kết thúc.".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }

    pub fn contains_opt(&self, day: Option<NaiveDate>) -> bool {
        day.map_or(false, |d| self.contains(d))
    }

    /// "Từ ngày dd/mm/yyyy đến ngày dd/mm/yyyy"
    pub fn subtitle(&self) -> String {
        format!(
            "Từ ngày {} đến ngày {}",
            format_date(self.start),
            format_date(self.end)
        )
    }
}

/// 报告周
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Week {
    pub number: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Week {
    pub fn range(&self) -> DateRange {
        DateRange { start: self.start, end: self.end }
    }
}

/// 某一年的报告周历
#[derive(Debug, Clone)]
pub struct WeekCalendar {
    year: i32,
    first_day: NaiveDate,
    weeks: Vec<Week>,
}

impl WeekCalendar {
    pub fn new(year: i32) -> Result<Self> {
        let jan_1 = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| DsrError::Validation(format!("Năm {} không hợp lệ.", year)))?;
        let first_day = jan_1 - Duration::days(jan_1.weekday().num_days_from_monday() as i64);

        let mut weeks = Vec::with_capacity(53);
        let mut start = first_day;
        for number in 1..=53 {
            let end = start + Duration::days(6);
            weeks.push(Week { number, start, end });
            start = end + Duration::days(1);
            if start.year() > year && weeks.len() >= 52 {
                break;
            }
        }

        Ok(Self { year, first_day, weeks })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first_day
    }

    pub fn weeks(&self) -> &[Week] {
        &self.weeks
    }

    pub fn week(&self, number: u32) -> Option<&Week> {
        self.weeks.iter().find(|w| w.number == number)
    }

    /// 从周历第一天到该周结束
    pub fn ytd_range(&self, number: u32) -> Option<DateRange> {
        self.week(number).map(|w| DateRange { start: self.first_day, end: w.end })
    }

    pub fn week_containing(&self, day: NaiveDate) -> Option<&Week> {
        self.weeks.iter().find(|w| w.start <= day && day <= w.end)
    }
}

/// 报告期（周或月）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportPeriod {
    Week { year: i32, week: u32 },
    Month { year: i32, month: u32 },
}

impl ReportPeriod {
    pub fn year(&self) -> i32 {
        match self {
            ReportPeriod::Week { year, .. } | ReportPeriod::Month { year, .. } => *year,
        }
    }

    pub fn number(&self) -> u32 {
        match self {
            ReportPeriod::Week { week, .. } => *week,
            ReportPeriod::Month { month, .. } => *month,
        }
    }

    pub fn is_weekly(&self) -> bool {
        matches!(self, ReportPeriod::Week { .. })
    }

    /// 解析出本期、上期与年初日期
    pub fn resolve(&self) -> Result<PeriodWindow> {
        let year = self.year();
        let year_start = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| DsrError::Validation(format!("Năm {} không hợp lệ.", year)))?;

        match *self {
            ReportPeriod::Week { week, .. } => {
                let calendar = WeekCalendar::new(year)?;
                let current = calendar
                    .week(week)
                    .ok_or_else(|| DsrError::Validation(format!("Không tìm thấy tuần {}.", week)))?
                    .range();
                let previous = week
                    .checked_sub(1)
                    .and_then(|n| calendar.week(n))
                    .map(Week::range);
                Ok(PeriodWindow {
                    period: *self,
                    current,
                    previous,
                    previous_number: week.saturating_sub(1),
                    year_start,
                })
            }
            ReportPeriod::Month { month, .. } => {
                let current = month_range(year, month)?;
                let (prev_month, prev_year) = if month > 1 { (month - 1, year) } else { (12, year - 1) };
                let previous = month_range(prev_year, prev_month)?;
                Ok(PeriodWindow {
                    period: *self,
                    current,
                    previous: Some(previous),
                    previous_number: prev_month,
                    year_start,
                })
            }
        }
    }
}

fn month_range(year: i32, month: u32) -> Result<DateRange> {
    let invalid = || DsrError::Validation(format!("Tháng {} không hợp lệ.", month));
    let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let end = last_day_of_month(year, month).ok_or_else(invalid)?;
    Ok(DateRange { start, end })
}

/// 已解析的报告期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodWindow {
    pub period: ReportPeriod,
    pub current: DateRange,
    /// 第1周没有上一期
    pub previous: Option<DateRange>,
    pub previous_number: u32,
    pub year_start: NaiveDate,
}

impl PeriodWindow {
    pub fn year(&self) -> i32 {
        self.period.year()
    }

    pub fn number(&self) -> u32 {
        self.period.number()
    }

    /// "Tuần" 或 "Tháng"
    pub fn kind_name(&self) -> &'static str {
        if self.period.is_weekly() {
            "Tuần"
        } else {
            "Tháng"
        }
    }

    /// "Tuần 12 năm 2024"
    pub fn label(&self) -> String {
        format!("{} {} năm {}", self.kind_name(), self.number(), self.year())
    }

    /// 本期行标签：周报 TS，月报 TM
    pub fn short_code(&self) -> &'static str {
        if self.period.is_weekly() {
            "TS"
        } else {
            "TM"
        }
    }

    pub fn note_text(&self) -> String {
        format!(
            "Ghi chú: {}: Tổng số ca mắc trong {}; BS: Bổ sung ca mắc; CD: Số ca mắc cộng dồn",
            self.short_code(),
            self.kind_name().to_lowercase()
        )
    }

    /// 文件名后缀，如 Tuan12 / Thang3
    pub fn file_suffix(&self) -> String {
        if self.period.is_weekly() {
            format!("Tuan{}", self.number())
        } else {
            format!("Thang{}", self.number())
        }
    }

    /// 年初到本期末
    pub fn ytd(&self) -> DateRange {
        DateRange { start: self.year_start, end: self.current.end }
    }

    /// 本期开始或年初（取较早者）到本期末
    pub fn span_with_ytd(&self) -> DateRange {
        DateRange { start: self.current.start.min(self.year_start), end: self.current.end }
    }

    /// 去年同期：去年1月1日到去年同月同日
    pub fn prior_year_ytd(&self) -> Option<DateRange> {
        let last_year = self.year() - 1;
        let start = NaiveDate::from_ymd_opt(last_year, 1, 1)?;
        // 第1周可能从上一年开始，此时期末仍在本年内
        let end = if self.current.end.year() > self.year() {
            NaiveDate::from_ymd_opt(last_year, 12, 31)?
        } else {
            same_day_in_year(self.current.end, last_year)?
        };
        Some(DateRange { start, end })
    }

    /// 数据查询的最早发病日期
    pub fn query_start(&self) -> NaiveDate {
        match self.previous {
            Some(prev) => prev.start.min(self.year_start),
            None => self.year_start.min(self.current.start),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_week_one_starts_on_monday_before_new_year() {
        // 2025-01-01 是周三
        let calendar = WeekCalendar::new(2025).unwrap();
        assert_eq!(calendar.first_day(), d(2024, 12, 30));
        let week1 = calendar.week(1).unwrap();
        assert_eq!(week1.start, d(2024, 12, 30));
        assert_eq!(week1.end, d(2025, 1, 5));
    }

    #[test]
    fn test_week_count() {
        // 2024-01-01 是周一
        let calendar = WeekCalendar::new(2024).unwrap();
        assert_eq!(calendar.first_day(), d(2024, 1, 1));
        assert_eq!(calendar.week(52).unwrap().end, d(2024, 12, 29));
        // 第53周的开始日仍在本年内
        assert_eq!(calendar.weeks().len(), 53);
        assert_eq!(calendar.week(53).unwrap().end, d(2025, 1, 5));
        assert!(calendar.week(54).is_none());

        // 2026-01-01 是周四
        let calendar = WeekCalendar::new(2026).unwrap();
        assert_eq!(calendar.weeks().len(), 53);
        assert_eq!(calendar.week(53).unwrap().end, d(2027, 1, 3));
    }

    #[test]
    fn test_ytd_and_lookup() {
        let calendar = WeekCalendar::new(2024).unwrap();
        let ytd = calendar.ytd_range(10).unwrap();
        assert_eq!(ytd.start, d(2024, 1, 1));
        assert_eq!(ytd.end, d(2024, 3, 10));
        assert_eq!(calendar.week_containing(d(2024, 3, 6)).unwrap().number, 10);
    }

    #[test]
    fn test_weekly_window() {
        let window = ReportPeriod::Week { year: 2024, week: 10 }.resolve().unwrap();
        assert_eq!(window.current.start, d(2024, 3, 4));
        assert_eq!(window.previous.unwrap().end, d(2024, 3, 3));
        assert_eq!(window.label(), "Tuần 10 năm 2024");
        assert_eq!(window.short_code(), "TS");
        assert_eq!(window.file_suffix(), "Tuan10");

        let first = ReportPeriod::Week { year: 2024, week: 1 }.resolve().unwrap();
        assert!(first.previous.is_none());

        // 2025年第1周从上一年开始
        let first = ReportPeriod::Week { year: 2025, week: 1 }.resolve().unwrap();
        assert_eq!(first.ytd().start, d(2025, 1, 1));
        assert_eq!(first.span_with_ytd().start, d(2024, 12, 30));
        assert_eq!(first.span_with_ytd().end, d(2025, 1, 5));
        assert_eq!(window.span_with_ytd(), window.ytd());

        assert!(ReportPeriod::Week { year: 2024, week: 60 }.resolve().is_err());
    }

    #[test]
    fn test_monthly_window_wraps_year() {
        let window = ReportPeriod::Month { year: 2024, month: 1 }.resolve().unwrap();
        let prev = window.previous.unwrap();
        assert_eq!(prev.start, d(2023, 12, 1));
        assert_eq!(prev.end, d(2023, 12, 31));
        assert_eq!(window.previous_number, 12);
        assert_eq!(window.note_text(), "Ghi chú: TM: Tổng số ca mắc trong tháng; BS: Bổ sung ca mắc; CD: Số ca mắc cộng dồn");

        let feb = ReportPeriod::Month { year: 2024, month: 2 }.resolve().unwrap();
        assert_eq!(feb.current.end, d(2024, 2, 29));
        let prior = feb.prior_year_ytd().unwrap();
        assert_eq!(prior.start, d(2023, 1, 1));
        assert_eq!(prior.end, d(2023, 2, 28));

        assert!(ReportPeriod::Month { year: 2024, month: 13 }.resolve().is_err());
    }

    #[test]
    fn test_date_range_validation() {
        assert!(DateRange::new(d(2024, 3, 2), d(2024, 3, 1)).is_err());
        let range = DateRange::new(d(2024, 3, 1), d(2024, 3, 31)).unwrap();
        assert!(range.contains(d(2024, 3, 31)));
        assert!(!range.contains_opt(None));
        assert_eq!(range.subtitle(), "Từ ngày 01/03/2024 đến ngày 31/03/2024");
    }
}
