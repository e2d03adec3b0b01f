use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Produit du référentiel (livre, disque...) identifié par son EAN
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub ean: String,
    pub name: String,
    pub subcategory_id: String,
    pub price: Option<Decimal>,
}

/// Offre culturelle proposée par un lieu
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Offer {
    pub id: i64,
    pub venue_id: i64,
    pub product_id: Option<i64>,
    pub name: String,
    pub subcategory_id: String,
    pub is_active: bool,
    pub is_event: bool,
    pub id_at_provider: Option<String>,
    pub last_provider_id: Option<i64>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOffer {
    pub venue_id: i64,
    pub product_id: Option<i64>,
    pub name: String,
    pub subcategory_id: String,
    pub is_event: bool,
    pub id_at_provider: Option<String>,
    pub last_provider_id: Option<i64>,
}

/// Catégorie de prix (tarif plein, réduit...) d'une offre événement
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PriceCategory {
    pub id: i64,
    pub offer_id: i64,
    pub label: String,
    pub price: Decimal,
}

/// Stock réservable d'une offre ; `quantity` à `None` signifie illimité
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Stock {
    pub id: i64,
    pub offer_id: i64,
    pub price: Decimal,
    pub quantity: Option<i32>,
    pub dn_booked_quantity: i32,
    pub beginning_datetime: Option<DateTime<Utc>>,
    pub booking_limit_datetime: Option<DateTime<Utc>>,
    pub price_category_id: Option<i64>,
    pub id_at_providers: Option<String>,
    pub raw_provider_quantity: Option<i32>,
    pub last_provider_id: Option<i64>,
    pub is_soft_deleted: bool,
    pub date_modified: DateTime<Utc>,
}

impl Stock {
    /// Quantité restante, `None` si le stock est illimité
    pub fn remaining_quantity(&self) -> Option<i32> {
        self.quantity.map(|quantity| quantity - self.dn_booked_quantity)
    }

    pub fn is_sold_out(&self) -> bool {
        self.is_soft_deleted || matches!(self.remaining_quantity(), Some(remaining) if remaining <= 0)
    }

    /// Libère les places d'une réservation annulée
    pub fn release(&mut self, quantity: i32) {
        self.dn_booked_quantity = (self.dn_booked_quantity - quantity).max(0);
    }
}

#[derive(Debug, Clone)]
pub struct NewStock {
    pub offer_id: i64,
    pub price: Decimal,
    pub quantity: Option<i32>,
    pub beginning_datetime: Option<DateTime<Utc>>,
    pub booking_limit_datetime: Option<DateTime<Utc>>,
    pub price_category_id: Option<i64>,
    pub id_at_providers: Option<String>,
    pub raw_provider_quantity: Option<i32>,
    pub last_provider_id: Option<i64>,
}

/// Mise à jour d'un stock synchronisé depuis un fournisseur
#[derive(Debug, Clone, PartialEq)]
pub struct StockUpdate {
    pub stock_id: i64,
    pub quantity: Option<i32>,
    pub raw_provider_quantity: Option<i32>,
    pub price: Decimal,
    pub beginning_datetime: Option<DateTime<Utc>>,
    pub price_category_id: Option<i64>,
    pub last_provider_id: Option<i64>,
}

/// Statistiques d'activité d'une structure
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct OffererStatistics {
    pub active_offers_count: i64,
    pub bookings_count: i64,
    pub used_bookings_count: i64,
    pub revenue: Decimal,
}
