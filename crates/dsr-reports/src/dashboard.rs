//! 仪表盘统计
//!
//! 按 ISO 周对比今年与去年的新发病例数，以及指定时间段内的高发病种。

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate};
use dsr_core::{Case, DateRange, DsrError, Result};
use serde::{Deserialize, Serialize};

/// 图表只展示前52周
pub const DASHBOARD_WEEKS: u32 = 52;

/// 高发病种统计的时间段
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum DashboardRange {
    #[serde(rename = "7d")]
    Last7Days,
    #[default]
    #[serde(rename = "30d")]
    Last30Days,
    #[serde(rename = "this_year")]
    ThisYear,
}

impl DashboardRange {
    pub fn from_code(code: &str) -> Self {
        match code {
            "7d" => DashboardRange::Last7Days,
            "this_year" => DashboardRange::ThisYear,
            _ => DashboardRange::Last30Days,
        }
    }

    pub fn dates(&self, today: NaiveDate) -> DateRange {
        let start = match self {
            DashboardRange::Last7Days => today - Duration::days(6),
            DashboardRange::Last30Days => today - Duration::days(29),
            DashboardRange::ThisYear => NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
        };
        DateRange { start, end: today }
    }

    pub fn label(&self, today: NaiveDate) -> String {
        match self {
            DashboardRange::Last7Days => "7 ngày qua".to_string(),
            DashboardRange::Last30Days => "30 ngày qua".to_string(),
            DashboardRange::ThisYear => format!("Năm {}", today.year()),
        }
    }
}

/// 一周的对比点，今年未到的周为空
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct WeekPoint {
    pub week: u32,
    pub current: Option<u32>,
    pub previous: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeeklyComparison {
    pub title: String,
    pub current_year: i32,
    pub previous_year: i32,
    pub points: Vec<WeekPoint>,
}

impl WeeklyComparison {
    /// 两年都没有病例
    pub fn is_empty(&self) -> bool {
        self.points.iter().all(|p| p.previous == 0 && p.current.unwrap_or(0) == 0)
    }
}

/// 取数区间：去年1月1日到今年12月31日
pub fn comparison_query_range(today: NaiveDate) -> Result<DateRange> {
    let start = NaiveDate::from_ymd_opt(today.year() - 1, 1, 1);
    let end = NaiveDate::from_ymd_opt(today.year(), 12, 31);
    match (start, end) {
        (Some(start), Some(end)) => DateRange::new(start, end),
        _ => Err(DsrError::Validation(format!("Năm không hợp lệ: {}", today.year()))),
    }
}

/// `cases` 已限定在所选地区；`disease` 为空时统计全部诊断
pub fn weekly_comparison(cases: &[Case], today: NaiveDate, disease: Option<&str>, location_name: &str) -> WeeklyComparison {
    let current_year = today.year();
    let previous_year = current_year - 1;
    // 年初年末的 ISO 周可能属于相邻年份
    let today_iso = today.iso_week();
    let current_week = if today_iso.year() == current_year {
        today_iso.week()
    } else if today.month() == 1 {
        0
    } else {
        DASHBOARD_WEEKS
    };

    let mut counts: HashMap<(i32, u32), u32> = HashMap::new();
    for case in cases {
        if disease.map_or(false, |d| !case.has_diagnosis(d)) {
            continue;
        }
        let Some(onset) = case.onset_date else { continue };
        // 只统计发病日历年属于这两年的病例，再按 ISO 周归组
        if onset.year() != current_year && onset.year() != previous_year {
            continue;
        }
        let iso = onset.iso_week();
        *counts.entry((iso.year(), iso.week())).or_insert(0) += 1;
    }

    let points = (1..=DASHBOARD_WEEKS)
        .map(|week| {
            let current = counts.get(&(current_year, week)).copied().unwrap_or(0);
            WeekPoint {
                week,
                current: (week <= current_week).then_some(current),
                previous: counts.get(&(previous_year, week)).copied().unwrap_or(0),
            }
        })
        .collect();

    let title = match disease {
        Some(d) => format!("Diễn biến ca {} tại {}", d, location_name),
        None => format!("Tổng số ca mắc mới theo tuần tại {}", location_name),
    };

    WeeklyComparison {
        title,
        current_year,
        previous_year,
        points,
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DiseaseCount {
    pub diagnosis: String,
    pub count: u32,
}

/// 按病例数降序排列的病种，病例数相同按名称排序
pub fn top_diseases(cases: &[Case], range: &DateRange) -> Vec<DiseaseCount> {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for case in cases.iter().filter(|c| range.contains_opt(c.onset_date)) {
        if let Some(diagnosis) = case.diagnosis.as_deref() {
            *counts.entry(diagnosis).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<DiseaseCount> = counts
        .into_iter()
        .map(|(diagnosis, count)| DiseaseCount {
            diagnosis: diagnosis.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.diagnosis.cmp(&b.diagnosis)));
    ranked
}

/// 仪表盘响应
#[derive(Debug, Clone, Serialize)]
pub struct DashboardData {
    pub weekly: WeeklyComparison,
    pub range_label: String,
    pub top_diseases: Vec<DiseaseCount>,
    pub diseases_in_scope: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use dsr_core::catalog::{DENGUE, HFMD};

    #[test]
    fn test_range_dates() {
        let today = d(2024, 3, 15);
        assert_eq!(DashboardRange::Last7Days.dates(today).start, d(2024, 3, 9));
        assert_eq!(DashboardRange::Last30Days.dates(today).start, d(2024, 2, 15));
        assert_eq!(DashboardRange::ThisYear.dates(today).start, d(2024, 1, 1));
        assert_eq!(DashboardRange::from_code("bogus"), DashboardRange::Last30Days);
        assert_eq!(DashboardRange::ThisYear.label(today), "Năm 2024");
    }

    #[test]
    fn test_weekly_comparison() {
        // 2024-03-15 属于第11周
        let today = d(2024, 3, 15);
        let cases = vec![
            case(1, DENGUE, 10, d(2024, 1, 3), d(2024, 1, 3)),
            case(2, DENGUE, 10, d(2024, 1, 4), d(2024, 1, 4)),
            case(3, HFMD, 10, d(2023, 1, 4), d(2023, 1, 4)),
            case(4, DENGUE, 10, d(2022, 1, 4), d(2022, 1, 4)),
        ];

        let all = weekly_comparison(&cases, today, None, "An Giang");
        assert_eq!(all.points.len(), 52);
        assert_eq!(all.points[0].current, Some(2));
        assert_eq!(all.points[0].previous, 1);
        assert_eq!(all.points[10].current, Some(0));
        assert_eq!(all.points[11].current, None);
        assert_eq!(all.title, "Tổng số ca mắc mới theo tuần tại An Giang");

        let dengue = weekly_comparison(&cases, today, Some(DENGUE), "An Giang");
        assert_eq!(dengue.points[0].previous, 0);
        assert!(dengue.title.starts_with("Diễn biến ca Sốt xuất huyết Dengue"));
        assert!(!dengue.is_empty());
    }

    #[test]
    fn test_weekly_comparison_at_year_edges() {
        // 2027-01-01 属于 ISO 2026-W53，本年尚无已过的周
        let new_year = weekly_comparison(&[], d(2027, 1, 1), None, "An Giang");
        assert_eq!(new_year.current_year, 2027);
        assert!(new_year.points.iter().all(|p| p.current.is_none()));

        // 2025-12-30 属于 ISO 2026-W01，第52周仍应显示
        let cases = vec![case(1, DENGUE, 10, d(2025, 12, 24), d(2025, 12, 24))];
        let year_end = weekly_comparison(&cases, d(2025, 12, 30), None, "An Giang");
        assert_eq!(year_end.current_year, 2025);
        assert_eq!(year_end.points[51].current, Some(1));
        assert!(year_end.points.iter().all(|p| p.current.is_some()));
    }

    #[test]
    fn test_top_diseases_sorted() {
        let range = DateRange::new(d(2024, 3, 1), d(2024, 3, 31)).unwrap();
        let cases = vec![
            case(1, HFMD, 10, d(2024, 3, 2), d(2024, 3, 2)),
            case(2, DENGUE, 10, d(2024, 3, 3), d(2024, 3, 3)),
            case(3, "Sởi", 10, d(2024, 3, 3), d(2024, 3, 3)),
            case(4, "Sởi", 10, d(2024, 3, 4), d(2024, 3, 4)),
            case(5, "Sởi", 10, d(2024, 4, 4), d(2024, 4, 4)),
        ];
        let top = top_diseases(&cases, &range);
        assert_eq!(top[0], DiseaseCount { diagnosis: "Sởi".to_string(), count: 2 });
        assert_eq!(top[1].diagnosis, DENGUE);
        assert_eq!(top[2].diagnosis, HFMD);
    }
}
