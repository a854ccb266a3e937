//! 报表数据源接口
//!
//! 报表引擎只通过该接口读取数据，生产环境由数据库实现，测试使用内存实现。

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::calendar::DateRange;
use crate::error::Result;
use crate::models::{AdminUnit, Case, Outbreak, OutbreakDisease};

#[async_trait]
pub trait ReportDataSource: Send + Sync {
    /// 全部行政单位
    async fn units(&self) -> Result<Vec<AdminUnit>>;

    /// 指定乡内发病日期落在区间内的病例
    async fn cases_by_onset(&self, commune_ids: &[i64], range: DateRange) -> Result<Vec<Case>>;

    /// 指定乡内录入日期落在区间内、且发病日期早于 `onset_before` 的病例
    async fn cases_by_import(
        &self,
        commune_ids: &[i64],
        range: DateRange,
        onset_before: NaiveDate,
    ) -> Result<Vec<Case>>;

    /// 与区间有交集的疫点：发现日期不晚于区间末，且未处理完或处理日期不早于区间初
    async fn outbreaks_overlapping(
        &self,
        commune_ids: &[i64],
        disease: OutbreakDisease,
        range: DateRange,
    ) -> Result<Vec<Outbreak>>;

    /// 关联到这些疫点的病例
    async fn cases_for_outbreaks(&self, outbreak_ids: &[i64]) -> Result<Vec<Case>>;
}

/// 内存数据源
#[derive(Debug, Default)]
pub struct MemorySource {
    units: RwLock<Vec<AdminUnit>>,
    cases: RwLock<Vec<Case>>,
    outbreaks: RwLock<Vec<Outbreak>>,
}

impl MemorySource {
    pub fn new(units: Vec<AdminUnit>, cases: Vec<Case>, outbreaks: Vec<Outbreak>) -> Self {
        Self {
            units: RwLock::new(units),
            cases: RwLock::new(cases),
            outbreaks: RwLock::new(outbreaks),
        }
    }

    pub async fn add_case(&self, case: Case) {
        self.cases.write().await.push(case);
    }

    pub async fn add_outbreak(&self, outbreak: Outbreak) {
        self.outbreaks.write().await.push(outbreak);
    }
}

#[async_trait]
impl ReportDataSource for MemorySource {
    async fn units(&self) -> Result<Vec<AdminUnit>> {
        Ok(self.units.read().await.clone())
    }

    async fn cases_by_onset(&self, commune_ids: &[i64], range: DateRange) -> Result<Vec<Case>> {
        let cases = self.cases.read().await;
        Ok(cases
            .iter()
            .filter(|c| commune_ids.contains(&c.commune_id) && range.contains_opt(c.onset_date))
            .cloned()
            .collect())
    }

    async fn cases_by_import(
        &self,
        commune_ids: &[i64],
        range: DateRange,
        onset_before: NaiveDate,
    ) -> Result<Vec<Case>> {
        let cases = self.cases.read().await;
        Ok(cases
            .iter()
            .filter(|c| commune_ids.contains(&c.commune_id))
            .filter(|c| range.contains(c.import_date))
            .filter(|c| c.onset_date.map_or(false, |d| d < onset_before))
            .cloned()
            .collect())
    }

    async fn outbreaks_overlapping(
        &self,
        commune_ids: &[i64],
        disease: OutbreakDisease,
        range: DateRange,
    ) -> Result<Vec<Outbreak>> {
        let outbreaks = self.outbreaks.read().await;
        Ok(outbreaks
            .iter()
            .filter(|o| commune_ids.contains(&o.commune_id) && o.disease == disease)
            .filter(|o| o.active_during(range.start, range.end))
            .cloned()
            .collect())
    }

    async fn cases_for_outbreaks(&self, outbreak_ids: &[i64]) -> Result<Vec<Case>> {
        let cases = self.cases.read().await;
        Ok(cases
            .iter()
            .filter(|c| c.outbreak_id.map_or(false, |id| outbreak_ids.contains(&id)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnitLevel;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn case(id: i64, commune_id: i64, onset: NaiveDate, imported: NaiveDate) -> Case {
        Case {
            id,
            patient_code: format!("BN{}", id),
            full_name: "Test".to_string(),
            birth_date: None,
            sex: None,
            address_detail: None,
            hamlet: None,
            onset_date: Some(onset),
            diagnosis: Some("Sởi".to_string()),
            admission_date: None,
            discharge_date: None,
            severity: None,
            status: None,
            import_date: imported,
            commune_id,
            outbreak_id: None,
        }
    }

    #[tokio::test]
    async fn test_memory_source_filters() {
        let source = MemorySource::new(
            vec![AdminUnit { id: 1, name: "An Giang".into(), level: UnitLevel::Province, parent_id: None }],
            vec![
                case(1, 10, d(3, 5), d(3, 5)),
                case(2, 10, d(2, 1), d(3, 6)),
                case(3, 11, d(3, 6), d(3, 6)),
            ],
            Vec::new(),
        );
        let week = DateRange::new(d(3, 4), d(3, 10)).unwrap();

        let by_onset = source.cases_by_onset(&[10], week).await.unwrap();
        assert_eq!(by_onset.len(), 1);
        assert_eq!(by_onset[0].id, 1);

        let backfill = source.cases_by_import(&[10, 11], week, week.start).await.unwrap();
        assert_eq!(backfill.len(), 1);
        assert_eq!(backfill[0].id, 2);

        assert_eq!(source.units().await.unwrap().len(), 1);
    }
}
