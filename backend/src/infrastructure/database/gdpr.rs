use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, query_scalar, Pool, Postgres};

use crate::domain::gdpr::{expiration_from, GdprUserDataExtract};
use crate::infrastructure::error::{AppError, AppResult};

const EXTRACT_COLUMNS: &str =
    "id, user_id, author_user_id, date_created, date_processed, expiration_date";

/// Demandes d'export de données personnelles
#[async_trait]
pub trait GdprRepository: Send + Sync {
    async fn create_extract(
        &self,
        user_id: i64,
        author_user_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<GdprUserDataExtract>;
    async fn get_extract(&self, extract_id: i64) -> AppResult<GdprUserDataExtract>;
    async fn list_extracts(&self, limit: i64) -> AppResult<Vec<GdprUserDataExtract>>;
    /// Demande non expirée pour cet utilisateur, traitée ou non
    async fn find_active_for_user(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Option<GdprUserDataExtract>>;
    /// Demandes non traitées et non expirées, les plus anciennes d'abord
    async fn list_pending(&self, now: DateTime<Utc>, limit: i64)
        -> AppResult<Vec<GdprUserDataExtract>>;
    /// Marque la demande comme traitée ; `false` si elle l'était déjà
    async fn mark_processed(&self, extract_id: i64, at: DateTime<Utc>) -> AppResult<bool>;
    async fn list_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<GdprUserDataExtract>>;
    async fn delete_extract(&self, extract_id: i64) -> AppResult<()>;
    async fn list_ids(&self) -> AppResult<Vec<i64>>;
}

#[derive(Clone)]
pub struct PgGdprRepository {
    pool: Pool<Postgres>,
}

impl PgGdprRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GdprRepository for PgGdprRepository {
    async fn create_extract(
        &self,
        user_id: i64,
        author_user_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<GdprUserDataExtract> {
        let extract = query_as::<_, GdprUserDataExtract>(&format!(
            r#"
            INSERT INTO gdpr_user_data_extract (user_id, author_user_id, date_created, expiration_date)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            EXTRACT_COLUMNS
        ))
        .bind(user_id)
        .bind(author_user_id)
        .bind(now)
        .bind(expiration_from(now))
        .fetch_one(&self.pool)
        .await?;
        Ok(extract)
    }

    async fn get_extract(&self, extract_id: i64) -> AppResult<GdprUserDataExtract> {
        query_as::<_, GdprUserDataExtract>(&format!(
            "SELECT {} FROM gdpr_user_data_extract WHERE id = $1",
            EXTRACT_COLUMNS
        ))
        .bind(extract_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Extraction {}", extract_id)))
    }

    async fn list_extracts(&self, limit: i64) -> AppResult<Vec<GdprUserDataExtract>> {
        let extracts = query_as::<_, GdprUserDataExtract>(&format!(
            "SELECT {} FROM gdpr_user_data_extract ORDER BY id DESC LIMIT $1",
            EXTRACT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(extracts)
    }

    async fn find_active_for_user(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Option<GdprUserDataExtract>> {
        let extract = query_as::<_, GdprUserDataExtract>(&format!(
            "SELECT {} FROM gdpr_user_data_extract WHERE user_id = $1 AND expiration_date > $2 \
             ORDER BY id DESC LIMIT 1",
            EXTRACT_COLUMNS
        ))
        .bind(user_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(extract)
    }

    async fn list_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<GdprUserDataExtract>> {
        let extracts = query_as::<_, GdprUserDataExtract>(&format!(
            "SELECT {} FROM gdpr_user_data_extract \
             WHERE date_processed IS NULL AND expiration_date > $1 \
             ORDER BY date_created LIMIT $2",
            EXTRACT_COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(extracts)
    }

    async fn mark_processed(&self, extract_id: i64, at: DateTime<Utc>) -> AppResult<bool> {
        let result = query(
            "UPDATE gdpr_user_data_extract SET date_processed = $2 \
             WHERE id = $1 AND date_processed IS NULL",
        )
        .bind(extract_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<GdprUserDataExtract>> {
        let extracts = query_as::<_, GdprUserDataExtract>(&format!(
            "SELECT {} FROM gdpr_user_data_extract WHERE expiration_date <= $1 ORDER BY id",
            EXTRACT_COLUMNS
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(extracts)
    }

    async fn delete_extract(&self, extract_id: i64) -> AppResult<()> {
        query("DELETE FROM gdpr_user_data_extract WHERE id = $1")
            .bind(extract_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_ids(&self) -> AppResult<Vec<i64>> {
        let ids = query_scalar("SELECT id FROM gdpr_user_data_extract")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}
