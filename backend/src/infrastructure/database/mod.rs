//! # Accès PostgreSQL
//!
//! Chaque agrégat expose un trait de repository (`OffererRepository`,
//! `BookingRepository`...) implémenté sur PostgreSQL. Les services ne
//! manipulent que les traits, regroupés dans [`Repositories`].

pub mod bookings;
pub mod collective;
pub mod finance;
pub mod fraud;
pub mod gdpr;
pub mod offerers;
pub mod offers;
pub mod providers;
pub mod users;

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::info;

use crate::infrastructure::error::AppResult;

pub use bookings::{BookingRepository, BookingTransition, PgBookingRepository};
pub use collective::{CollectiveBookingTransition, CollectiveRepository, PgCollectiveRepository};
pub use finance::{FinanceRepository, PgFinanceRepository, RuleFilter};
pub use fraud::{FraudRepository, PgFraudRepository};
pub use gdpr::{GdprRepository, PgGdprRepository};
pub use offerers::{OffererRepository, PgOffererRepository};
pub use offers::{OfferRepository, PgOfferRepository};
pub use providers::{PgProviderRepository, ProviderRepository};
pub use users::{PgUserRepository, UserRepository};

/// Gestion de la connexion à la base de données
#[derive(Clone)]
pub struct Database {
    pub pool: Pool<Postgres>,
}

impl Database {
    /// Crée une nouvelle connexion à la base de données
    pub async fn new(database_url: &str, max_connections: u32) -> AppResult<Self> {
        info!("🔌 Connexion à la base de données PostgreSQL...");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!("✅ Connexion établie avec succès");

        Ok(Self { pool })
    }

    /// Applique les migrations du dossier `migrations/`
    pub async fn migrate(&self) -> AppResult<()> {
        info!("📦 Application des migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Ensemble des repositories utilisés par les services
#[derive(Clone)]
pub struct Repositories {
    pub offerers: Arc<dyn OffererRepository>,
    pub offers: Arc<dyn OfferRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub collective: Arc<dyn CollectiveRepository>,
    pub finance: Arc<dyn FinanceRepository>,
    pub providers: Arc<dyn ProviderRepository>,
    pub users: Arc<dyn UserRepository>,
    pub fraud: Arc<dyn FraudRepository>,
    pub gdpr: Arc<dyn GdprRepository>,
}

impl Repositories {
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            offerers: Arc::new(PgOffererRepository::new(pool.clone())),
            offers: Arc::new(PgOfferRepository::new(pool.clone())),
            bookings: Arc::new(PgBookingRepository::new(pool.clone())),
            collective: Arc::new(PgCollectiveRepository::new(pool.clone())),
            finance: Arc::new(PgFinanceRepository::new(pool.clone())),
            providers: Arc::new(PgProviderRepository::new(pool.clone())),
            users: Arc::new(PgUserRepository::new(pool.clone())),
            fraud: Arc::new(PgFraudRepository::new(pool.clone())),
            gdpr: Arc::new(PgGdprRepository::new(pool)),
        }
    }
}
