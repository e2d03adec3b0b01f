use async_trait::async_trait;
use sqlx::{query_as, Pool, Postgres};

use crate::domain::offerer::{ApiKey, NewOfferer, NewVenue, Offerer, Venue};
use crate::infrastructure::error::{AppError, AppResult};

const OFFERER_COLUMNS: &str =
    "id, name, siren, validation_status, is_active, iban, bic, date_created";
const VENUE_COLUMNS: &str = "id, offerer_id, name, siret, comment, is_virtual, address, \
     postal_code, city, booking_email, iban, bic, date_created";

/// Structures, lieux et clés d'API
#[async_trait]
pub trait OffererRepository: Send + Sync {
    async fn get_offerer(&self, offerer_id: i64) -> AppResult<Offerer>;
    async fn find_offerer_by_siren(&self, siren: &str) -> AppResult<Option<Offerer>>;
    /// Crée la structure et son lieu numérique dans une même transaction
    async fn create_offerer(&self, new_offerer: &NewOfferer, digital_venue: &NewVenue)
        -> AppResult<(Offerer, Venue)>;

    async fn get_venue(&self, venue_id: i64) -> AppResult<Venue>;
    async fn list_venues(&self, offerer_id: i64) -> AppResult<Vec<Venue>>;
    async fn find_venue_by_siret(&self, siret: &str) -> AppResult<Option<Venue>>;
    async fn create_venue(&self, offerer_id: i64, new_venue: &NewVenue) -> AppResult<Venue>;

    async fn find_api_key(&self, prefix: &str) -> AppResult<Option<ApiKey>>;
    async fn create_api_key(&self, offerer_id: i64, prefix: &str, secret_hash: &str)
        -> AppResult<ApiKey>;
}

#[derive(Clone)]
pub struct PgOffererRepository {
    pool: Pool<Postgres>,
}

impl PgOffererRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

async fn insert_venue<'e, E>(executor: E, offerer_id: i64, new_venue: &NewVenue) -> AppResult<Venue>
where
    E: sqlx::PgExecutor<'e>,
{
    let venue = query_as::<_, Venue>(&format!(
        r#"
        INSERT INTO venue (
            offerer_id, name, siret, comment, is_virtual, address,
            postal_code, city, booking_email, iban, bic
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {}
        "#,
        VENUE_COLUMNS
    ))
    .bind(offerer_id)
    .bind(&new_venue.name)
    .bind(&new_venue.siret)
    .bind(&new_venue.comment)
    .bind(new_venue.is_virtual)
    .bind(&new_venue.address)
    .bind(&new_venue.postal_code)
    .bind(&new_venue.city)
    .bind(&new_venue.booking_email)
    .bind(&new_venue.iban)
    .bind(&new_venue.bic)
    .fetch_one(executor)
    .await?;
    Ok(venue)
}

#[async_trait]
impl OffererRepository for PgOffererRepository {
    async fn get_offerer(&self, offerer_id: i64) -> AppResult<Offerer> {
        query_as::<_, Offerer>(&format!("SELECT {} FROM offerer WHERE id = $1", OFFERER_COLUMNS))
            .bind(offerer_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Structure {}", offerer_id)))
    }

    async fn find_offerer_by_siren(&self, siren: &str) -> AppResult<Option<Offerer>> {
        let offerer = query_as::<_, Offerer>(&format!(
            "SELECT {} FROM offerer WHERE siren = $1",
            OFFERER_COLUMNS
        ))
        .bind(siren)
        .fetch_optional(&self.pool)
        .await?;
        Ok(offerer)
    }

    async fn create_offerer(
        &self,
        new_offerer: &NewOfferer,
        digital_venue: &NewVenue,
    ) -> AppResult<(Offerer, Venue)> {
        let mut tx = self.pool.begin().await?;

        let offerer = query_as::<_, Offerer>(&format!(
            r#"
            INSERT INTO offerer (name, siren, validation_status, is_active, iban, bic)
            VALUES ($1, $2, $3, TRUE, $4, $5)
            RETURNING {}
            "#,
            OFFERER_COLUMNS
        ))
        .bind(&new_offerer.name)
        .bind(&new_offerer.siren)
        .bind(new_offerer.validation_status)
        .bind(&new_offerer.iban)
        .bind(&new_offerer.bic)
        .fetch_one(&mut *tx)
        .await?;

        let venue = insert_venue(&mut *tx, offerer.id, digital_venue).await?;
        tx.commit().await?;

        Ok((offerer, venue))
    }

    async fn get_venue(&self, venue_id: i64) -> AppResult<Venue> {
        query_as::<_, Venue>(&format!("SELECT {} FROM venue WHERE id = $1", VENUE_COLUMNS))
            .bind(venue_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Lieu {}", venue_id)))
    }

    async fn list_venues(&self, offerer_id: i64) -> AppResult<Vec<Venue>> {
        let venues = query_as::<_, Venue>(&format!(
            "SELECT {} FROM venue WHERE offerer_id = $1 ORDER BY id",
            VENUE_COLUMNS
        ))
        .bind(offerer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(venues)
    }

    async fn find_venue_by_siret(&self, siret: &str) -> AppResult<Option<Venue>> {
        let venue = query_as::<_, Venue>(&format!(
            "SELECT {} FROM venue WHERE siret = $1",
            VENUE_COLUMNS
        ))
        .bind(siret)
        .fetch_optional(&self.pool)
        .await?;
        Ok(venue)
    }

    async fn create_venue(&self, offerer_id: i64, new_venue: &NewVenue) -> AppResult<Venue> {
        insert_venue(&self.pool, offerer_id, new_venue).await
    }

    async fn find_api_key(&self, prefix: &str) -> AppResult<Option<ApiKey>> {
        let api_key = query_as::<_, ApiKey>(
            "SELECT id, offerer_id, prefix, secret_hash, date_created FROM api_key WHERE prefix = $1",
        )
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?;
        Ok(api_key)
    }

    async fn create_api_key(
        &self,
        offerer_id: i64,
        prefix: &str,
        secret_hash: &str,
    ) -> AppResult<ApiKey> {
        let api_key = query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_key (offerer_id, prefix, secret_hash)
            VALUES ($1, $2, $3)
            RETURNING id, offerer_id, prefix, secret_hash, date_created
            "#,
        )
        .bind(offerer_id)
        .bind(prefix)
        .bind(secret_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(api_key)
    }
}
