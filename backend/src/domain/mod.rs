//! # Domain Models Module
//!
//! Entités métier du pass Culture et règles qui ne dépendent d'aucune
//! infrastructure (base de données, HTTP, stockage).
//!
//! ## Structure
//! - `offerer.rs` : structures, lieux et clés d'API
//! - `offer.rs` : produits, offres, stocks et catégories de prix
//! - `booking.rs` : réservations individuelles et leurs transitions
//! - `collective.rs` : offres et réservations collectives (scolaires)
//! - `finance.rs` : tarifs dérogatoires, barème, lots de virements
//! - `provider.rs` : fournisseurs de stocks et références externes
//! - `user.rs`, `fraud.rs` : utilisateurs, éligibilité et vérifications
//! - `gdpr.rs` : exports de données personnelles
//!
//! ## Conventions
//! - Identifiants `i64` (BIGSERIAL), montants `rust_decimal::Decimal` en euros,
//!   sauf dans les tables de finance (centimes `i64`)
//! - Les énumérations sont stockées en `VARCHAR`, en SCREAMING_SNAKE_CASE

pub mod booking;
pub mod categories;
pub mod collective;
pub mod finance;
pub mod fraud;
pub mod gdpr;
pub mod offer;
pub mod offerer;
pub mod provider;
pub mod user;

pub use booking::{Booking, BookingStatus};
pub use offer::{Offer, Stock};
pub use offerer::{Offerer, Venue};
pub use user::User;
