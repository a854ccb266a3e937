//! 报表数据源的数据库实现

use async_trait::async_trait;
use chrono::NaiveDate;
use dsr_core::{AdminUnit, Case, DateRange, Outbreak, OutbreakDisease, ReportDataSource, Result};

use crate::connection::DatabasePool;
use crate::models::{DbCase, DbOutbreak};
use crate::queries::DatabaseQueries;

#[async_trait]
impl ReportDataSource for DatabasePool {
    async fn units(&self) -> Result<Vec<AdminUnit>> {
        DatabaseQueries::new(self).list_units().await
    }

    async fn cases_by_onset(&self, commune_ids: &[i64], range: DateRange) -> Result<Vec<Case>> {
        if commune_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, DbCase>(r#"
            SELECT * FROM cases
            WHERE commune_id = ANY($1)
              AND onset_date BETWEEN $2 AND $3
            ORDER BY onset_date, id
        "#)
        .bind(commune_ids)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Case::from).collect())
    }

    async fn cases_by_import(
        &self,
        commune_ids: &[i64],
        range: DateRange,
        onset_before: NaiveDate,
    ) -> Result<Vec<Case>> {
        if commune_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, DbCase>(r#"
            SELECT * FROM cases
            WHERE commune_id = ANY($1)
              AND import_date BETWEEN $2 AND $3
              AND onset_date < $4
            ORDER BY onset_date, id
        "#)
        .bind(commune_ids)
        .bind(range.start)
        .bind(range.end)
        .bind(onset_before)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Case::from).collect())
    }

    async fn outbreaks_overlapping(
        &self,
        commune_ids: &[i64],
        disease: OutbreakDisease,
        range: DateRange,
    ) -> Result<Vec<Outbreak>> {
        if commune_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, DbOutbreak>(r#"
            SELECT * FROM outbreaks
            WHERE commune_id = ANY($1)
              AND disease = $2
              AND detected_on <= $4
              AND (resolved_on IS NULL OR resolved_on >= $3)
            ORDER BY detected_on, id
        "#)
        .bind(commune_ids)
        .bind(disease.code())
        .bind(range.start)
        .bind(range.end)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Outbreak::from).collect())
    }

    async fn cases_for_outbreaks(&self, outbreak_ids: &[i64]) -> Result<Vec<Case>> {
        if outbreak_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, DbCase>(
            "SELECT * FROM cases WHERE outbreak_id = ANY($1) ORDER BY onset_date NULLS LAST, id",
        )
        .bind(outbreak_ids)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Case::from).collect())
    }
}
