use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Type d'intégration d'un fournisseur de stocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderKind {
    /// API de stocks générique (libraires, disquaires)
    ProviderApi,
    /// Référentiel livres Titelive (même protocole que l'API générique)
    Titelive,
    /// Billetterie cinéma EMS
    Ems,
    /// Billetterie cinéma Boost
    Boost,
    /// Billetterie cinéma CGR
    Cgr,
}

impl ProviderKind {
    pub fn is_cinema(&self) -> bool {
        matches!(self, ProviderKind::Ems | ProviderKind::Boost | ProviderKind::Cgr)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Provider {
    pub id: i64,
    pub name: String,
    pub local_class: ProviderKind,
    pub api_url: Option<String>,
    pub is_active: bool,
    pub enabled_for_pro: bool,
}

/// Lien entre un lieu et un fournisseur de stocks
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VenueProvider {
    pub id: i64,
    pub venue_id: i64,
    pub provider_id: i64,
    pub venue_id_at_offer_provider: String,
    pub is_active: bool,
    pub last_sync_date: Option<DateTime<Utc>>,
    pub last_sync_version: Option<i64>,
    pub date_created: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewVenueProvider {
    pub provider_id: i64,
    pub venue_id_at_offer_provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Le fournisseur {0} est inactif")]
    InactiveProvider(i64),
    #[error("Le lien lieu-fournisseur {0} est inactif")]
    InactiveVenueProvider(i64),
    #[error("Le fournisseur {0} n'a pas d'URL d'API")]
    MissingApiUrl(i64),
}

/// Ligne de stock renvoyée par un fournisseur, avec ses identifiants
/// déterministes côté pass Culture
#[derive(Debug, Clone, PartialEq)]
pub struct StockDetail {
    pub products_provider_reference: String,
    pub offers_provider_reference: String,
    pub stocks_provider_reference: String,
    pub venue_reference: String,
    pub available_quantity: i32,
    pub price: Decimal,
}

impl StockDetail {
    /// Construit le détail d'une référence `ean` pour un lieu ; la référence
    /// de stock utilise le SIRET du lieu s'il existe
    pub fn new(
        ean: &str,
        venue_id: i64,
        venue_reference: &str,
        available_quantity: i32,
        price: Decimal,
    ) -> Self {
        Self {
            products_provider_reference: ean.to_string(),
            offers_provider_reference: format!("{}@{}", ean, venue_id),
            stocks_provider_reference: format!("{}@{}", ean, venue_reference),
            venue_reference: venue_reference.to_string(),
            available_quantity,
            price,
        }
    }
}

/// Compteurs retournés par une synchronisation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounters {
    pub new_offers: usize,
    pub new_stocks: usize,
    pub updated_stocks: usize,
}

impl std::ops::AddAssign for SyncCounters {
    fn add_assign(&mut self, other: Self) {
        self.new_offers += other.new_offers;
        self.new_stocks += other.new_stocks;
        self.updated_stocks += other.updated_stocks;
    }
}

/// Identifiant d'une offre de film : `{film}%{lieu}%EMS`
pub fn cinema_offer_reference(film_id: &str, venue_id: i64, kind: ProviderKind) -> String {
    let suffix = match kind {
        ProviderKind::Boost => "Boost",
        ProviderKind::Cgr => "CGR",
        _ => "EMS",
    };
    format!("{}%{}%{}", film_id, venue_id, suffix)
}

/// Identifiant d'un stock de séance : `{offre}#{séance}`
pub fn cinema_stock_reference(offer_reference: &str, session_id: &str) -> String {
    format!("{}#{}", offer_reference, session_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_detail_references_are_deterministic() {
        let detail = StockDetail::new("9782070612758", 12, "73282932000074", 3, Decimal::new(1250, 2));
        assert_eq!(detail.offers_provider_reference, "9782070612758@12");
        assert_eq!(detail.stocks_provider_reference, "9782070612758@73282932000074");
    }

    #[test]
    fn cinema_references() {
        let offer_ref = cinema_offer_reference("SHJRH", 42, ProviderKind::Ems);
        assert_eq!(offer_ref, "SHJRH%42%EMS");
        assert_eq!(cinema_stock_reference(&offer_ref, "999700079243"), "SHJRH%42%EMS#999700079243");
    }

    #[test]
    fn counters_add_up() {
        let mut total = SyncCounters::default();
        total += SyncCounters { new_offers: 1, new_stocks: 2, updated_stocks: 3 };
        total += SyncCounters { new_offers: 1, new_stocks: 0, updated_stocks: 1 };
        assert_eq!(total, SyncCounters { new_offers: 2, new_stocks: 2, updated_stocks: 4 });
    }
}
