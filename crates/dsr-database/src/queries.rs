//! 数据库查询操作

use std::collections::HashSet;

use crate::connection::DatabasePool;
use crate::models::*;
use chrono::NaiveDate;
use dsr_core::{
    AdminUnit, Case, CaseFilter, CaseIdentity, CaseInput, DsrError, Outbreak, OutbreakFilter,
    OutbreakInput, OutbreakStatus, Page, Result, UnitLevel, User, UserRole,
};
use sqlx::{Postgres, QueryBuilder, Row};

/// 单位被引用情况
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitDependents {
    pub children: i64,
    pub users: i64,
    pub cases: i64,
}

impl UnitDependents {
    pub fn is_empty(&self) -> bool {
        self.children == 0 && self.users == 0 && self.cases == 0
    }
}

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 行政单位表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS admin_units (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                level VARCHAR(20) NOT NULL,
                parent_id BIGINT REFERENCES admin_units(id),
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| DsrError::Database(e.to_string()))?;

        // 用户表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                username VARCHAR(80) UNIQUE NOT NULL,
                email VARCHAR(120) UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'xa',
                unit_id BIGINT REFERENCES admin_units(id),
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| DsrError::Database(e.to_string()))?;

        // 疫点表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS outbreaks (
                id BIGSERIAL PRIMARY KEY,
                disease VARCHAR(10) NOT NULL,
                detected_on DATE NOT NULL,
                resolved_on DATE,
                location TEXT,
                hamlet VARCHAR(255),
                commune_id BIGINT NOT NULL REFERENCES admin_units(id),
                hfmd_place VARCHAR(100),
                two_cases_in_7_days BOOLEAN NOT NULL DEFAULT FALSE,
                severe_case BOOLEAN NOT NULL DEFAULT FALSE,
                lab_confirmed BOOLEAN NOT NULL DEFAULT FALSE,
                death BOOLEAN NOT NULL DEFAULT FALSE,
                dengue_test_kind VARCHAR(50),
                case_count INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| DsrError::Database(e.to_string()))?;

        // 病例表，(患者编号, 发病日期, 主要诊断) 唯一
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS cases (
                id BIGSERIAL PRIMARY KEY,
                patient_code VARCHAR(50) NOT NULL,
                full_name VARCHAR(255) NOT NULL,
                birth_date DATE,
                sex VARCHAR(10),
                address_detail TEXT,
                hamlet VARCHAR(255),
                onset_date DATE,
                diagnosis VARCHAR(255),
                admission_date DATE,
                discharge_date DATE,
                severity VARCHAR(100),
                status VARCHAR(100),
                import_date DATE NOT NULL DEFAULT CURRENT_DATE,
                commune_id BIGINT NOT NULL REFERENCES admin_units(id),
                outbreak_id BIGINT REFERENCES outbreaks(id) ON DELETE SET NULL,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                CONSTRAINT uq_case_identity UNIQUE (patient_code, onset_date, diagnosis)
            )
        "#).execute(pool).await.map_err(|e| DsrError::Database(e.to_string()))?;

        // 创建索引以优化查询性能
        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_admin_units_parent_id ON admin_units(parent_id)",
            "CREATE INDEX IF NOT EXISTS idx_admin_units_level ON admin_units(level)",
            "CREATE INDEX IF NOT EXISTS idx_users_unit_id ON users(unit_id)",
            "CREATE INDEX IF NOT EXISTS idx_cases_commune_id ON cases(commune_id)",
            "CREATE INDEX IF NOT EXISTS idx_cases_onset_date ON cases(onset_date)",
            "CREATE INDEX IF NOT EXISTS idx_cases_import_date ON cases(import_date)",
            "CREATE INDEX IF NOT EXISTS idx_cases_diagnosis ON cases(diagnosis)",
            "CREATE INDEX IF NOT EXISTS idx_cases_outbreak_id ON cases(outbreak_id)",
            "CREATE INDEX IF NOT EXISTS idx_outbreaks_commune_id ON outbreaks(commune_id)",
            "CREATE INDEX IF NOT EXISTS idx_outbreaks_detected_on ON outbreaks(detected_on)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(|e| DsrError::Database(e.to_string()))?;
        }

        tracing::info!("Database indexes created successfully");
        Ok(())
    }

    // ========== 行政单位相关操作 ==========

    /// 全部行政单位
    pub async fn list_units(&self) -> Result<Vec<AdminUnit>> {
        let rows = sqlx::query_as::<_, DbAdminUnit>(
            "SELECT id, name, level, parent_id FROM admin_units ORDER BY id",
        )
        .fetch_all(self.pool.pool())
        .await?;

        Ok(rows.into_iter().map(AdminUnit::from).collect())
    }

    /// 分页列出单位，可按级别过滤
    pub async fn list_units_paged(
        &self,
        level: Option<UnitLevel>,
        page: i64,
        per_page: i64,
    ) -> Result<Page<AdminUnit>> {
        let pool = self.pool.pool();
        let level = level.map(|l| l.label().to_string());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM admin_units WHERE ($1::VARCHAR IS NULL OR level = $1)",
        )
        .bind(&level)
        .fetch_one(pool)
        .await?;

        let rows = sqlx::query_as::<_, DbAdminUnit>(r#"
            SELECT id, name, level, parent_id FROM admin_units
            WHERE ($1::VARCHAR IS NULL OR level = $1)
            ORDER BY name, id
            LIMIT $2 OFFSET $3
        "#)
        .bind(&level)
        .bind(per_page)
        .bind((page - 1).max(0) * per_page)
        .fetch_all(pool)
        .await?;

        Ok(Page {
            items: rows.into_iter().map(AdminUnit::from).collect(),
            total,
            page,
            per_page,
        })
    }

    pub async fn get_unit(&self, id: i64) -> Result<Option<AdminUnit>> {
        let row = sqlx::query_as::<_, DbAdminUnit>(
            "SELECT id, name, level, parent_id FROM admin_units WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(row.map(AdminUnit::from))
    }

    /// 创建新单位
    pub async fn create_unit(&self, unit: &NewUnit) -> Result<i64> {
        sqlx::query(r#"
            INSERT INTO admin_units (name, level, parent_id)
            VALUES ($1, $2, $3)
            RETURNING id
        "#)
        .bind(unit.name.trim())
        .bind(unit.level.label())
        .bind(unit.parent_id)
        .fetch_one(self.pool.pool())
        .await
        .map(|row| row.get("id"))
        .map_err(DsrError::from)
    }

    pub async fn update_unit(&self, id: i64, unit: &NewUnit) -> Result<()> {
        let result = sqlx::query(
            "UPDATE admin_units SET name = $1, level = $2, parent_id = $3 WHERE id = $4",
        )
        .bind(unit.name.trim())
        .bind(unit.level.label())
        .bind(unit.parent_id)
        .bind(id)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DsrError::NotFound(format!("đơn vị hành chính {}", id)));
        }
        Ok(())
    }

    /// 统计引用该单位的下级单位、用户和病例
    pub async fn unit_dependents(&self, id: i64) -> Result<UnitDependents> {
        let row = sqlx::query(r#"
            SELECT
                (SELECT COUNT(*) FROM admin_units WHERE parent_id = $1) AS children,
                (SELECT COUNT(*) FROM users WHERE unit_id = $1) AS users,
                (SELECT COUNT(*) FROM cases WHERE commune_id = $1) AS cases
        "#)
        .bind(id)
        .fetch_one(self.pool.pool())
        .await?;

        Ok(UnitDependents {
            children: row.get("children"),
            users: row.get("users"),
            cases: row.get("cases"),
        })
    }

    pub async fn delete_unit(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM admin_units WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DsrError::NotFound(format!("đơn vị hành chính {}", id)));
        }
        Ok(())
    }

    /// 在一个事务内写入整棵单位树，`replace` 为真时先清空现有单位
    ///
    /// 单位必须按父先子后的顺序给出，父单位通过名称在已写入的单位中查找。
    pub async fn import_unit_tree(
        &self,
        rows: &[(String, UnitLevel, Option<String>)],
        replace: bool,
    ) -> Result<(usize, Vec<String>)> {
        let mut tx = self.pool.pool().begin().await?;

        if replace {
            sqlx::query("UPDATE users SET unit_id = NULL").execute(&mut *tx).await?;
            sqlx::query("DELETE FROM admin_units").execute(&mut *tx).await?;
        }

        let mut inserted: Vec<(String, i64)> = Vec::new();
        let mut errors = Vec::new();

        for (name, level, parent_name) in rows {
            let parent_id = match parent_name {
                None => None,
                Some(parent_name) => {
                    let key = parent_name.trim().to_lowercase();
                    let found = match inserted.iter().find(|(n, _)| *n == key) {
                        Some((_, id)) => Some(*id),
                        None => sqlx::query_scalar::<_, i64>(
                            "SELECT id FROM admin_units WHERE LOWER(name) = $1 ORDER BY id LIMIT 1",
                        )
                        .bind(&key)
                        .fetch_optional(&mut *tx)
                        .await?,
                    };
                    match found {
                        Some(id) => Some(id),
                        None => {
                            errors.push(format!(
                                "Không tìm thấy đơn vị cha '{}' cho đơn vị '{}'.",
                                parent_name, name
                            ));
                            continue;
                        }
                    }
                }
            };

            let id: i64 = sqlx::query_scalar(
                "INSERT INTO admin_units (name, level, parent_id) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(name.trim())
            .bind(level.label())
            .bind(parent_id)
            .fetch_one(&mut *tx)
            .await?;
            inserted.push((name.trim().to_lowercase(), id));
        }

        tx.commit().await?;
        tracing::info!("Imported {} admin units ({} errors)", inserted.len(), errors.len());
        Ok((inserted.len(), errors))
    }

    // ========== 用户相关操作 ==========

    /// 分页列出用户，可按用户名和角色过滤
    pub async fn list_users(
        &self,
        username: Option<&str>,
        role: Option<UserRole>,
        page: i64,
        per_page: i64,
    ) -> Result<Page<User>> {
        let pool = self.pool.pool();
        let pattern = username
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));
        let role = role.map(|r| r.code().to_string());

        let total: i64 = sqlx::query_scalar(r#"
            SELECT COUNT(*) FROM users
            WHERE ($1::VARCHAR IS NULL OR username ILIKE $1)
              AND ($2::VARCHAR IS NULL OR role = $2)
        "#)
        .bind(&pattern)
        .bind(&role)
        .fetch_one(pool)
        .await?;

        let rows = sqlx::query_as::<_, DbUser>(r#"
            SELECT id, username, email, password_hash, role, unit_id FROM users
            WHERE ($1::VARCHAR IS NULL OR username ILIKE $1)
              AND ($2::VARCHAR IS NULL OR role = $2)
            ORDER BY username
            LIMIT $3 OFFSET $4
        "#)
        .bind(&pattern)
        .bind(&role)
        .bind(per_page)
        .bind((page - 1).max(0) * per_page)
        .fetch_all(pool)
        .await?;

        Ok(Page {
            items: rows.into_iter().map(User::from).collect(),
            total,
            page,
            per_page,
        })
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, DbUser>(
            "SELECT id, username, email, password_hash, role, unit_id FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(row.map(User::from))
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, DbUser>(
            "SELECT id, username, email, password_hash, role, unit_id FROM users WHERE username = $1",
        )
        .bind(username.trim())
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(row.map(User::from))
    }

    /// 创建新用户，用户名重复时返回 Conflict
    pub async fn create_user(&self, user: &NewUser) -> Result<i64> {
        sqlx::query(r#"
            INSERT INTO users (username, email, password_hash, role, unit_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
        "#)
        .bind(user.username.trim())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.code())
        .bind(user.unit_id)
        .fetch_one(self.pool.pool())
        .await
        .map(|row| row.get("id"))
        .map_err(|e| match DsrError::from(e) {
            DsrError::Conflict(_) => DsrError::Conflict(format!(
                "Tên đăng nhập '{}' đã tồn tại.",
                user.username.trim()
            )),
            other => other,
        })
    }

    /// 更换所属单位并同步角色
    pub async fn update_user_unit(&self, id: i64, unit_id: Option<i64>, role: UserRole) -> Result<()> {
        let result = sqlx::query("UPDATE users SET unit_id = $1, role = $2 WHERE id = $3")
            .bind(unit_id)
            .bind(role.code())
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DsrError::NotFound(format!("người dùng {}", id)));
        }
        Ok(())
    }

    pub async fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DsrError::NotFound(format!("người dùng {}", id)));
        }
        Ok(())
    }

    pub async fn count_admins(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
            .fetch_one(self.pool.pool())
            .await?;
        Ok(count)
    }

    pub async fn delete_user(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DsrError::NotFound(format!("người dùng {}", id)));
        }
        Ok(())
    }

    /// 导出用的用户列表
    pub async fn users_with_units(&self) -> Result<Vec<DbUserWithUnit>> {
        let rows = sqlx::query_as::<_, DbUserWithUnit>(r#"
            SELECT u.id, u.username, u.role, a.name AS unit_name, a.level AS unit_level
            FROM users u
            LEFT JOIN admin_units a ON a.id = u.unit_id
            ORDER BY u.id
        "#)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(rows)
    }

    // ========== 病例相关操作 ==========

    /// 分页列出病例，按发病日期倒序
    pub async fn list_cases(&self, filter: &CaseFilter, page: i64, per_page: i64) -> Result<Page<Case>> {
        let pool = self.pool.pool();

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM cases");
        push_case_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM cases");
        push_case_filters(&mut select, filter);
        select
            .push(" ORDER BY onset_date DESC NULLS LAST, id DESC LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind((page - 1).max(0) * per_page);
        let rows: Vec<DbCase> = select.build_query_as().fetch_all(pool).await?;

        Ok(Page {
            items: rows.into_iter().map(Case::from).collect(),
            total,
            page,
            per_page,
        })
    }

    /// 导出用的完整病例列表
    pub async fn cases_for_export(&self, filter: &CaseFilter) -> Result<Vec<Case>> {
        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM cases");
        push_case_filters(&mut select, filter);
        select.push(" ORDER BY onset_date DESC NULLS LAST, id DESC");
        let rows: Vec<DbCase> = select.build_query_as().fetch_all(self.pool.pool()).await?;

        Ok(rows.into_iter().map(Case::from).collect())
    }

    pub async fn get_case(&self, id: i64) -> Result<Option<Case>> {
        let row = sqlx::query_as::<_, DbCase>("SELECT * FROM cases WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(row.map(Case::from))
    }

    /// 唯一性三元组是否已存在
    pub async fn case_identity_exists(&self, identity: &CaseIdentity, exclude_id: Option<i64>) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(r#"
            SELECT EXISTS (
                SELECT 1 FROM cases
                WHERE TRIM(patient_code) = $1
                  AND onset_date IS NOT DISTINCT FROM $2
                  AND NULLIF(TRIM(diagnosis), '') IS NOT DISTINCT FROM $3
                  AND ($4::BIGINT IS NULL OR id <> $4)
            )
        "#)
        .bind(&identity.patient_code)
        .bind(identity.onset_date)
        .bind(&identity.diagnosis)
        .bind(exclude_id)
        .fetch_one(self.pool.pool())
        .await?;

        Ok(exists)
    }

    /// 已存在的病例三元组，按患者编号批量查询
    pub async fn existing_identities(&self, patient_codes: &[String]) -> Result<HashSet<CaseIdentity>> {
        if patient_codes.is_empty() {
            return Ok(HashSet::new());
        }
        let rows = sqlx::query(
            "SELECT patient_code, onset_date, diagnosis FROM cases WHERE TRIM(patient_code) = ANY($1)",
        )
        .bind(patient_codes)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let diagnosis: Option<String> = row.get("diagnosis");
                CaseIdentity::new(
                    row.get::<String, _>("patient_code").as_str(),
                    row.get("onset_date"),
                    diagnosis.as_deref(),
                )
            })
            .collect())
    }

    /// 创建新病例
    pub async fn create_case(&self, case: &NewCase) -> Result<i64> {
        let mut tx = self.pool.pool().begin().await?;
        let id = insert_case(&mut tx, case).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// 在一个事务内批量写入病例
    pub async fn insert_cases(&self, cases: &[NewCase]) -> Result<usize> {
        let mut tx = self.pool.pool().begin().await?;
        for case in cases {
            insert_case(&mut tx, case).await?;
        }
        tx.commit().await?;
        Ok(cases.len())
    }

    pub async fn update_case(&self, id: i64, input: &CaseInput) -> Result<()> {
        let result = sqlx::query(r#"
            UPDATE cases SET
                patient_code = $1, full_name = $2, birth_date = $3, sex = $4,
                address_detail = $5, hamlet = $6, onset_date = $7, diagnosis = $8,
                admission_date = $9, discharge_date = $10, severity = $11, status = $12,
                commune_id = $13
            WHERE id = $14
        "#)
        .bind(input.patient_code.trim())
        .bind(input.full_name.trim())
        .bind(input.birth_date)
        .bind(&input.sex)
        .bind(&input.address_detail)
        .bind(&input.hamlet)
        .bind(input.onset_date)
        .bind(&input.diagnosis)
        .bind(input.admission_date)
        .bind(input.discharge_date)
        .bind(&input.severity)
        .bind(&input.status)
        .bind(input.commune_id)
        .bind(id)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DsrError::NotFound(format!("ca bệnh {}", id)));
        }
        Ok(())
    }

    pub async fn delete_case(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM cases WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DsrError::NotFound(format!("ca bệnh {}", id)));
        }
        Ok(())
    }

    /// 范围内出现过的诊断名称
    pub async fn distinct_diagnoses(&self, commune_ids: Option<&[i64]>) -> Result<Vec<String>> {
        let rows: Vec<String> = sqlx::query_scalar(r#"
            SELECT DISTINCT diagnosis FROM cases
            WHERE diagnosis IS NOT NULL
              AND ($1::BIGINT[] IS NULL OR commune_id = ANY($1))
            ORDER BY diagnosis
        "#)
        .bind(commune_ids)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(rows)
    }

    /// 按姓名或编号搜索尚未关联疫点的病例，可限定诊断
    pub async fn search_unassigned_cases(
        &self,
        commune_ids: Option<&[i64]>,
        term: &str,
        diagnosis: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Case>> {
        let pattern = format!("%{}%", term.trim());
        let rows = sqlx::query_as::<_, DbCase>(r#"
            SELECT * FROM cases
            WHERE outbreak_id IS NULL
              AND ($1::BIGINT[] IS NULL OR commune_id = ANY($1))
              AND (full_name ILIKE $2 OR patient_code ILIKE $2)
              AND ($3::VARCHAR IS NULL OR diagnosis = $3)
            ORDER BY onset_date DESC NULLS LAST, id DESC
            LIMIT $4
        "#)
        .bind(commune_ids)
        .bind(&pattern)
        .bind(diagnosis)
        .bind(limit)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(rows.into_iter().map(Case::from).collect())
    }

    /// 同一乡、同一病种、发病日期在窗口内且未关联疫点的病例
    pub async fn unassigned_cases(
        &self,
        commune_id: i64,
        diagnosis: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Case>> {
        let rows = sqlx::query_as::<_, DbCase>(r#"
            SELECT * FROM cases
            WHERE outbreak_id IS NULL
              AND commune_id = $1
              AND diagnosis = $2
              AND onset_date BETWEEN $3 AND $4
            ORDER BY onset_date, id
        "#)
        .bind(commune_id)
        .bind(diagnosis)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(rows.into_iter().map(Case::from).collect())
    }

    // ========== 疫点相关操作 ==========

    /// 分页列出疫点，按发现日期倒序
    pub async fn list_outbreaks(
        &self,
        filter: &OutbreakFilter,
        page: i64,
        per_page: i64,
    ) -> Result<Page<Outbreak>> {
        let pool = self.pool.pool();

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM outbreaks");
        push_outbreak_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM outbreaks");
        push_outbreak_filters(&mut select, filter);
        select
            .push(" ORDER BY detected_on DESC, id DESC LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind((page - 1).max(0) * per_page);
        let rows: Vec<DbOutbreak> = select.build_query_as().fetch_all(pool).await?;

        Ok(Page {
            items: rows.into_iter().map(Outbreak::from).collect(),
            total,
            page,
            per_page,
        })
    }

    pub async fn get_outbreak(&self, id: i64) -> Result<Option<Outbreak>> {
        let row = sqlx::query_as::<_, DbOutbreak>("SELECT * FROM outbreaks WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(row.map(Outbreak::from))
    }

    /// 创建疫点，并可同时关联首发病例
    pub async fn create_outbreak(&self, input: &OutbreakInput, index_case_id: Option<i64>) -> Result<i64> {
        let mut tx = self.pool.pool().begin().await?;

        let id: i64 = sqlx::query_scalar(r#"
            INSERT INTO outbreaks (
                disease, detected_on, resolved_on, location, hamlet, commune_id, hfmd_place,
                two_cases_in_7_days, severe_case, lab_confirmed, death, dengue_test_kind, case_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
        "#)
        .bind(input.disease.code())
        .bind(input.detected_on)
        .bind(input.resolved_on)
        .bind(&input.location)
        .bind(&input.hamlet)
        .bind(input.commune_id)
        .bind(&input.hfmd_place)
        .bind(input.criteria.two_cases_in_7_days)
        .bind(input.criteria.severe_case)
        .bind(input.criteria.lab_confirmed)
        .bind(input.criteria.death)
        .bind(&input.dengue_test_kind)
        .bind(input.case_count)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(case_id) = index_case_id {
            sqlx::query("UPDATE cases SET outbreak_id = $1 WHERE id = $2")
                .bind(id)
                .bind(case_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        tracing::info!("Created outbreak {} ({})", id, input.disease);
        Ok(id)
    }

    pub async fn update_outbreak(&self, id: i64, input: &OutbreakInput) -> Result<()> {
        let result = sqlx::query(r#"
            UPDATE outbreaks SET
                disease = $1, detected_on = $2, resolved_on = $3, location = $4, hamlet = $5,
                commune_id = $6, hfmd_place = $7, two_cases_in_7_days = $8, severe_case = $9,
                lab_confirmed = $10, death = $11, dengue_test_kind = $12, case_count = $13
            WHERE id = $14
        "#)
        .bind(input.disease.code())
        .bind(input.detected_on)
        .bind(input.resolved_on)
        .bind(&input.location)
        .bind(&input.hamlet)
        .bind(input.commune_id)
        .bind(&input.hfmd_place)
        .bind(input.criteria.two_cases_in_7_days)
        .bind(input.criteria.severe_case)
        .bind(input.criteria.lab_confirmed)
        .bind(input.criteria.death)
        .bind(&input.dengue_test_kind)
        .bind(input.case_count)
        .bind(id)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DsrError::NotFound(format!("ổ dịch {}", id)));
        }
        Ok(())
    }

    /// 删除疫点，关联病例的 outbreak_id 由外键置空
    pub async fn delete_outbreak(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM outbreaks WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DsrError::NotFound(format!("ổ dịch {}", id)));
        }
        Ok(())
    }

    pub async fn cases_of_outbreak(&self, outbreak_id: i64) -> Result<Vec<Case>> {
        let rows = sqlx::query_as::<_, DbCase>(
            "SELECT * FROM cases WHERE outbreak_id = $1 ORDER BY onset_date NULLS LAST, id",
        )
        .bind(outbreak_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(rows.into_iter().map(Case::from).collect())
    }

    /// 把病例关联到疫点，只处理尚未关联的病例，返回关联数量
    pub async fn link_cases(&self, outbreak_id: i64, case_ids: &[i64]) -> Result<u64> {
        let mut tx = self.pool.pool().begin().await?;
        let result = sqlx::query(
            "UPDATE cases SET outbreak_id = $1 WHERE id = ANY($2) AND outbreak_id IS NULL",
        )
        .bind(outbreak_id)
        .bind(case_ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(result.rows_affected())
    }

    pub async fn unlink_case(&self, outbreak_id: i64, case_id: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE cases SET outbreak_id = NULL WHERE id = $1 AND outbreak_id = $2",
        )
        .bind(case_id)
        .bind(outbreak_id)
        .execute(self.pool.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DsrError::NotFound(format!(
                "ca bệnh {} trong ổ dịch {}",
                case_id, outbreak_id
            )));
        }
        Ok(())
    }
}

async fn insert_case(tx: &mut sqlx::Transaction<'_, Postgres>, case: &NewCase) -> Result<i64> {
    let input = &case.input;
    let id: i64 = sqlx::query_scalar(r#"
        INSERT INTO cases (
            patient_code, full_name, birth_date, sex, address_detail, hamlet, onset_date,
            diagnosis, admission_date, discharge_date, severity, status, import_date,
            commune_id, outbreak_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        RETURNING id
    "#)
    .bind(input.patient_code.trim())
    .bind(input.full_name.trim())
    .bind(input.birth_date)
    .bind(&input.sex)
    .bind(&input.address_detail)
    .bind(&input.hamlet)
    .bind(input.onset_date)
    .bind(&input.diagnosis)
    .bind(input.admission_date)
    .bind(input.discharge_date)
    .bind(&input.severity)
    .bind(&input.status)
    .bind(case.import_date)
    .bind(input.commune_id)
    .bind(case.outbreak_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(id)
}

fn push_case_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &CaseFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(ids) = &filter.commune_ids {
        builder.push(" AND commune_id = ANY(").push_bind(ids.clone()).push(")");
    }
    if let Some(from) = filter.onset_from {
        builder.push(" AND onset_date >= ").push_bind(from);
    }
    if let Some(to) = filter.onset_to {
        builder.push(" AND onset_date <= ").push_bind(to);
    }
    if let Some(from) = filter.import_from {
        builder.push(" AND import_date >= ").push_bind(from);
    }
    if let Some(to) = filter.import_to {
        builder.push(" AND import_date <= ").push_bind(to);
    }
    if let Some(diagnosis) = ilike_pattern(filter.diagnosis.as_deref()) {
        builder.push(" AND diagnosis ILIKE ").push_bind(diagnosis);
    }
    if let Some(name) = ilike_pattern(filter.name.as_deref()) {
        builder.push(" AND full_name ILIKE ").push_bind(name);
    }
    if let Some(hamlet) = ilike_pattern(filter.hamlet.as_deref()) {
        builder.push(" AND hamlet ILIKE ").push_bind(hamlet);
    }
}

fn push_outbreak_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &OutbreakFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(ids) = &filter.commune_ids {
        builder.push(" AND commune_id = ANY(").push_bind(ids.clone()).push(")");
    }
    if let Some(disease) = filter.disease {
        builder.push(" AND disease = ").push_bind(disease.code());
    }
    match filter.status {
        Some(OutbreakStatus::Resolved) => {
            builder.push(" AND resolved_on IS NOT NULL");
        }
        Some(OutbreakStatus::Unresolved) => {
            builder.push(" AND resolved_on IS NULL");
        }
        None => {}
    }
    if let Some(from) = filter.detected_from {
        builder.push(" AND detected_on >= ").push_bind(from);
    }
    if let Some(to) = filter.detected_to {
        builder.push(" AND detected_on <= ").push_bind(to);
    }
}

fn ilike_pattern(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| format!("%{}%", v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_filter_sql() {
        let filter = CaseFilter {
            onset_from: NaiveDate::from_ymd_opt(2024, 1, 1),
            diagnosis: Some("Sốt".to_string()),
            name: Some("   ".to_string()),
            commune_ids: Some(vec![1, 2]),
            ..Default::default()
        };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM cases");
        push_case_filters(&mut builder, &filter);
        let sql = builder.sql();
        assert!(sql.contains("commune_id = ANY($1)"));
        assert!(sql.contains("onset_date >= $2"));
        assert!(sql.contains("diagnosis ILIKE $3"));
        // 空白姓名条件被忽略
        assert!(!sql.contains("full_name"));
    }

    #[test]
    fn test_outbreak_filter_sql() {
        let filter = OutbreakFilter {
            disease: Some(dsr_core::OutbreakDisease::Dengue),
            status: Some(OutbreakStatus::Unresolved),
            ..Default::default()
        };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM outbreaks");
        push_outbreak_filters(&mut builder, &filter);
        let sql = builder.sql();
        assert!(sql.contains("disease = $1"));
        assert!(sql.contains("resolved_on IS NULL"));
    }

    #[test]
    fn test_ilike_pattern() {
        assert_eq!(ilike_pattern(Some(" Ấp 1 ")), Some("%Ấp 1%".to_string()));
        assert_eq!(ilike_pattern(Some("")), None);
        assert_eq!(ilike_pattern(None), None);
    }

    #[test]
    fn test_unit_dependents() {
        assert!(UnitDependents::default().is_empty());
        assert!(!UnitDependents { children: 0, users: 1, cases: 0 }.is_empty());
    }
}
