use actix_web::http::StatusCode;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::booking::CancellationReason;
use crate::infrastructure::error::AppError;

/// Offre destinée aux établissements scolaires
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CollectiveOffer {
    pub id: i64,
    pub venue_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub students: Vec<String>,
    pub date_created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CollectiveStock {
    pub id: i64,
    pub collective_offer_id: i64,
    pub beginning_datetime: DateTime<Utc>,
    pub booking_limit_datetime: DateTime<Utc>,
    /// Prix total de la prestation pour le groupe
    pub price: Decimal,
    pub number_of_tickets: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectiveBookingStatus {
    Pending,
    Confirmed,
    Used,
    Cancelled,
    Reimbursed,
}

/// Réservation d'une offre collective par un rédacteur d'établissement
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CollectiveBooking {
    pub id: i64,
    pub collective_stock_id: i64,
    pub collective_offer_id: i64,
    pub venue_id: i64,
    pub offerer_id: i64,
    pub educational_institution_id: i64,
    pub educational_redactor_email: String,
    pub price: Decimal,
    pub status: CollectiveBookingStatus,
    pub date_created: DateTime<Utc>,
    pub confirmation_limit_date: DateTime<Utc>,
    pub confirmation_date: Option<DateTime<Utc>>,
    pub date_used: Option<DateTime<Utc>>,
    pub cancellation_date: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<CancellationReason>,
    pub reimbursement_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectiveBookingError {
    #[error("collective booking already cancelled")]
    AlreadyCancelled,
    #[error("collective booking already used")]
    AlreadyUsed,
    #[error("collective booking already reimbursed")]
    AlreadyReimbursed,
}

impl From<CollectiveBookingError> for AppError {
    fn from(error: CollectiveBookingError) -> Self {
        match error {
            CollectiveBookingError::AlreadyCancelled => AppError::api(
                StatusCode::GONE,
                "booking",
                "Cette réservation est déjà annulée",
            ),
            CollectiveBookingError::AlreadyUsed => AppError::api(
                StatusCode::FORBIDDEN,
                "booking",
                "Cette réservation a déjà été utilisée et ne peut être annulée",
            ),
            CollectiveBookingError::AlreadyReimbursed => AppError::api(
                StatusCode::FORBIDDEN,
                "booking",
                "Cette réservation a déjà été remboursée et ne peut être annulée",
            ),
        }
    }
}

impl CollectiveBooking {
    /// Annulation à l'initiative du partenaire culturel
    pub fn cancel_by_offerer(&mut self, now: DateTime<Utc>) -> Result<(), CollectiveBookingError> {
        match self.status {
            CollectiveBookingStatus::Cancelled => Err(CollectiveBookingError::AlreadyCancelled),
            CollectiveBookingStatus::Used => Err(CollectiveBookingError::AlreadyUsed),
            CollectiveBookingStatus::Reimbursed => Err(CollectiveBookingError::AlreadyReimbursed),
            CollectiveBookingStatus::Pending | CollectiveBookingStatus::Confirmed => {
                self.status = CollectiveBookingStatus::Cancelled;
                self.cancellation_date = Some(now);
                self.cancellation_reason = Some(CancellationReason::Offerer);
                Ok(())
            }
        }
    }

    pub fn mark_as_reimbursed(&mut self, now: DateTime<Utc>) {
        self.status = CollectiveBookingStatus::Reimbursed;
        self.reimbursement_date = Some(now);
    }
}
