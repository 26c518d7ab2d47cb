use chrono::{DateTime, Utc};
use rdip_core::error::AppError;
use rdip_core::models::{StoreStats, StoredAnalysis};
use rdip_core::traits::AnalysisStore;
use sqlx::SqlitePool;

/// Durable analysis cache in SQLite, keyed by URL hash.
#[derive(Clone)]
pub struct AnalysisRepository {
    pool: SqlitePool,
}

impl AnalysisRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Most recently updated entries, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<StoredAnalysis>, AppError> {
        let rows = sqlx::query_as::<_, AnalysisRow>(
            r#"
            SELECT url_hash, url, analysis, created_at, updated_at, access_count
            FROM analyses
            ORDER BY updated_at DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

fn db_error(e: sqlx::Error) -> AppError {
    AppError::DatabaseError(e.to_string())
}

impl AnalysisStore for AnalysisRepository {
    async fn load(&self, url_hash: &str) -> Result<Option<StoredAnalysis>, AppError> {
        let row = sqlx::query_as::<_, AnalysisRow>(
            r#"
            SELECT url_hash, url, analysis, created_at, updated_at, access_count
            FROM analyses
            WHERE url_hash = ?1
            "#,
        )
        .bind(url_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn upsert(
        &self,
        url_hash: &str,
        url: &str,
        analysis: &serde_json::Value,
    ) -> Result<(), AppError> {
        let payload = serde_json::to_string(analysis)?;
        sqlx::query(
            r#"
            INSERT INTO analyses (url_hash, url, analysis, created_at, updated_at, access_count)
            VALUES (?1, ?2, ?3, ?4, ?4, 1)
            ON CONFLICT (url_hash) DO UPDATE SET
                url = excluded.url,
                analysis = excluded.analysis,
                updated_at = excluded.updated_at,
                access_count = analyses.access_count + 1
            "#,
        )
        .bind(url_hash)
        .bind(url)
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn record_access(&self, url_hash: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE analyses
            SET access_count = access_count + 1, updated_at = ?2
            WHERE url_hash = ?1
            "#,
        )
        .bind(url_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn delete(&self, url_hash: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM analyses WHERE url_hash = ?1")
            .bind(url_hash)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self) -> Result<StoreStats, AppError> {
        let (entries, total_accesses): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(access_count), 0) FROM analyses",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(StoreStats {
            entries,
            total_accesses,
        })
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Cache database closed");
    }
}

// ---- Internal row type ----

#[derive(sqlx::FromRow)]
struct AnalysisRow {
    url_hash: String,
    url: String,
    analysis: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    access_count: i64,
}

impl TryFrom<AnalysisRow> for StoredAnalysis {
    type Error = AppError;

    fn try_from(row: AnalysisRow) -> Result<Self, AppError> {
        Ok(StoredAnalysis {
            url_hash: row.url_hash,
            url: row.url,
            analysis: serde_json::from_str(&row.analysis)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            access_count: row.access_count,
        })
    }
}
