use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, Pool, Postgres, QueryBuilder};

use crate::domain::provider::{Provider, VenueProvider};
use crate::infrastructure::error::{AppError, AppResult};

const VENUE_PROVIDER_COLUMNS: &str = "id, venue_id, provider_id, venue_id_at_offer_provider, \
     is_active, last_sync_date, last_sync_version, date_created";

/// Fournisseurs de stocks et leurs liens avec les lieux
#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn get_provider(&self, provider_id: i64) -> AppResult<Provider>;
    async fn get_venue_provider(&self, venue_provider_id: i64) -> AppResult<VenueProvider>;
    /// Liens actifs dont le fournisseur est actif, éventuellement restreints
    /// à un fournisseur
    async fn list_active_venue_providers(
        &self,
        provider_id: Option<i64>,
    ) -> AppResult<Vec<VenueProvider>>;
    async fn list_venue_providers_by_venue(&self, venue_id: i64) -> AppResult<Vec<VenueProvider>>;
    async fn create_venue_provider(
        &self,
        venue_id: i64,
        provider_id: i64,
        venue_id_at_offer_provider: &str,
    ) -> AppResult<VenueProvider>;
    async fn record_sync(
        &self,
        venue_provider_id: i64,
        at: DateTime<Utc>,
        version: Option<i64>,
    ) -> AppResult<()>;
}

#[derive(Clone)]
pub struct PgProviderRepository {
    pool: Pool<Postgres>,
}

impl PgProviderRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderRepository for PgProviderRepository {
    async fn get_provider(&self, provider_id: i64) -> AppResult<Provider> {
        query_as::<_, Provider>(
            "SELECT id, name, local_class, api_url, is_active, enabled_for_pro \
             FROM provider WHERE id = $1",
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Fournisseur {}", provider_id)))
    }

    async fn get_venue_provider(&self, venue_provider_id: i64) -> AppResult<VenueProvider> {
        query_as::<_, VenueProvider>(&format!(
            "SELECT {} FROM venue_provider WHERE id = $1",
            VENUE_PROVIDER_COLUMNS
        ))
        .bind(venue_provider_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lien lieu-fournisseur {}", venue_provider_id)))
    }

    async fn list_active_venue_providers(
        &self,
        provider_id: Option<i64>,
    ) -> AppResult<Vec<VenueProvider>> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT vp.id, vp.venue_id, vp.provider_id, vp.venue_id_at_offer_provider, \
             vp.is_active, vp.last_sync_date, vp.last_sync_version, vp.date_created \
             FROM venue_provider vp JOIN provider p ON p.id = vp.provider_id \
             WHERE vp.is_active AND p.is_active",
        );
        if let Some(provider_id) = provider_id {
            builder.push(" AND vp.provider_id = ").push_bind(provider_id);
        }
        builder.push(" ORDER BY vp.id");

        let venue_providers = builder
            .build_query_as::<VenueProvider>()
            .fetch_all(&self.pool)
            .await?;
        Ok(venue_providers)
    }

    async fn list_venue_providers_by_venue(&self, venue_id: i64) -> AppResult<Vec<VenueProvider>> {
        let venue_providers = query_as::<_, VenueProvider>(&format!(
            "SELECT {} FROM venue_provider WHERE venue_id = $1 ORDER BY id",
            VENUE_PROVIDER_COLUMNS
        ))
        .bind(venue_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(venue_providers)
    }

    async fn create_venue_provider(
        &self,
        venue_id: i64,
        provider_id: i64,
        venue_id_at_offer_provider: &str,
    ) -> AppResult<VenueProvider> {
        let venue_provider = query_as::<_, VenueProvider>(&format!(
            r#"
            INSERT INTO venue_provider (venue_id, provider_id, venue_id_at_offer_provider)
            VALUES ($1, $2, $3)
            RETURNING {}
            "#,
            VENUE_PROVIDER_COLUMNS
        ))
        .bind(venue_id)
        .bind(provider_id)
        .bind(venue_id_at_offer_provider)
        .fetch_one(&self.pool)
        .await?;
        Ok(venue_provider)
    }

    async fn record_sync(
        &self,
        venue_provider_id: i64,
        at: DateTime<Utc>,
        version: Option<i64>,
    ) -> AppResult<()> {
        query(
            "UPDATE venue_provider SET last_sync_date = $2, \
             last_sync_version = COALESCE($3, last_sync_version) WHERE id = $1",
        )
        .bind(venue_provider_id)
        .bind(at)
        .bind(version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
