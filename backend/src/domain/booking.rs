use actix_web::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::offer::Stock;
use crate::infrastructure::error::AppError;

/// Délai avant l'événement en deçà duquel une réservation ne peut plus être annulée
pub const CONFIRMATION_DELAY_BEFORE_EVENT_HOURS: i64 = 48;
/// Délai après la réservation pendant lequel l'annulation reste possible
pub const CONFIRMATION_DELAY_AFTER_BOOKING_HOURS: i64 = 48;
/// Une contremarque d'événement n'est validable qu'à partir de 48h avant son début
pub const AUTO_USE_DELAY_BEFORE_EVENT_HOURS: i64 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Confirmed,
    Used,
    Cancelled,
    Reimbursed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancellationReason {
    Offerer,
    Beneficiary,
    Expired,
    Fraud,
    Backoffice,
}

/// Réservation individuelle d'un stock par un bénéficiaire
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: i64,
    pub token: String,
    pub user_id: i64,
    pub stock_id: i64,
    pub offer_id: i64,
    pub venue_id: i64,
    pub offerer_id: i64,
    pub quantity: i32,
    /// Prix unitaire au moment de la réservation
    pub amount: Decimal,
    pub status: BookingStatus,
    pub date_created: DateTime<Utc>,
    pub date_used: Option<DateTime<Utc>>,
    pub cancellation_date: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<CancellationReason>,
    pub cancellation_limit_date: Option<DateTime<Utc>>,
    pub reimbursement_date: Option<DateTime<Utc>>,
}

/// Transitions refusées sur une réservation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingError {
    #[error("booking already used")]
    AlreadyUsed,
    #[error("booking already cancelled")]
    AlreadyCancelled,
    #[error("booking already reimbursed")]
    AlreadyReimbursed,
    #[error("booking is not used yet")]
    NotUsed,
    #[error("event starts in more than 48 hours")]
    TooEarlyToUse,
    #[error("used booking cannot be cancelled")]
    CannotCancelUsed,
    #[error("reimbursed booking cannot be cancelled")]
    CannotCancelReimbursed,
}

impl From<BookingError> for AppError {
    fn from(error: BookingError) -> Self {
        match error {
            BookingError::AlreadyUsed => AppError::api(
                StatusCode::GONE,
                "booking",
                "Cette réservation a déjà été validée",
            ),
            BookingError::AlreadyCancelled => AppError::api(
                StatusCode::GONE,
                "booking_cancelled",
                "Cette réservation a été annulée",
            ),
            BookingError::AlreadyReimbursed => AppError::api(
                StatusCode::GONE,
                "payment",
                "Cette réservation a été remboursée",
            ),
            BookingError::NotUsed => AppError::api(
                StatusCode::GONE,
                "booking",
                "Cette contremarque n'a pas encore été validée",
            ),
            BookingError::TooEarlyToUse => AppError::api(
                StatusCode::FORBIDDEN,
                "booking",
                "Vous ne pouvez pas valider cette contremarque plus de 48h avant le début de l'évènement",
            ),
            BookingError::CannotCancelUsed => AppError::api(
                StatusCode::FORBIDDEN,
                "global",
                "Impossible d'annuler une réservation consommée",
            ),
            BookingError::CannotCancelReimbursed => AppError::api(
                StatusCode::FORBIDDEN,
                "global",
                "Impossible d'annuler une réservation remboursée",
            ),
        }
    }
}

/// Erreur renvoyée à l'annulation d'une contremarque déjà annulée
pub fn already_cancelled_on_cancel() -> AppError {
    AppError::api(
        StatusCode::GONE,
        "global",
        "Cette contremarque a déjà été annulée",
    )
}

impl Booking {
    /// Montant total de la réservation
    pub fn total_amount(&self) -> Decimal {
        self.amount * Decimal::from(self.quantity)
    }

    /// Vérifie qu'une contremarque peut être validée par le partenaire
    pub fn check_is_usable(
        &self,
        event_beginning: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        match self.status {
            BookingStatus::Used => return Err(BookingError::AlreadyUsed),
            BookingStatus::Cancelled => return Err(BookingError::AlreadyCancelled),
            BookingStatus::Reimbursed => return Err(BookingError::AlreadyReimbursed),
            BookingStatus::Confirmed => {}
        }
        if let Some(beginning) = event_beginning {
            if beginning > now + Duration::hours(AUTO_USE_DELAY_BEFORE_EVENT_HOURS) {
                return Err(BookingError::TooEarlyToUse);
            }
        }
        Ok(())
    }

    pub fn mark_as_used(
        &mut self,
        event_beginning: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        self.check_is_usable(event_beginning, now)?;
        self.status = BookingStatus::Used;
        self.date_used = Some(now);
        Ok(())
    }

    /// Annule la validation d'une contremarque
    pub fn mark_as_unused(&mut self) -> Result<(), BookingError> {
        match self.status {
            BookingStatus::Cancelled => Err(BookingError::AlreadyCancelled),
            BookingStatus::Reimbursed => Err(BookingError::AlreadyReimbursed),
            BookingStatus::Confirmed => Err(BookingError::NotUsed),
            BookingStatus::Used => {
                self.status = BookingStatus::Confirmed;
                self.date_used = None;
                Ok(())
            }
        }
    }

    /// Annule la réservation et libère les places du stock
    pub fn cancel(
        &mut self,
        stock: &mut Stock,
        reason: CancellationReason,
        now: DateTime<Utc>,
        cancel_even_if_used: bool,
    ) -> Result<(), BookingError> {
        match self.status {
            BookingStatus::Cancelled => return Err(BookingError::AlreadyCancelled),
            BookingStatus::Reimbursed => return Err(BookingError::CannotCancelReimbursed),
            BookingStatus::Used if !cancel_even_if_used => {
                return Err(BookingError::CannotCancelUsed)
            }
            _ => {}
        }
        self.status = BookingStatus::Cancelled;
        self.cancellation_date = Some(now);
        self.cancellation_reason = Some(reason);
        self.date_used = None;
        stock.release(self.quantity);
        Ok(())
    }

    pub fn mark_as_reimbursed(&mut self, now: DateTime<Utc>) {
        self.status = BookingStatus::Reimbursed;
        self.reimbursement_date = Some(now);
    }
}

/// Date limite d'annulation d'une réservation d'événement :
/// 48h après la réservation, sans dépasser 48h avant l'événement,
/// et jamais antérieure à la réservation elle-même.
pub fn compute_cancellation_limit_date(
    event_beginning: Option<DateTime<Utc>>,
    booking_date: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let beginning = event_beginning?;
    let before_event = beginning - Duration::hours(CONFIRMATION_DELAY_BEFORE_EVENT_HOURS);
    let after_booking = booking_date + Duration::hours(CONFIRMATION_DELAY_AFTER_BOOKING_HOURS);
    Some(before_event.min(after_booking).max(booking_date))
}

/// Normalise une contremarque saisie par un partenaire
pub fn normalize_token(token: &str) -> String {
    token.trim().to_uppercase()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub fn booking(status: BookingStatus) -> Booking {
        Booking {
            id: 1,
            token: "ABCDEF".to_string(),
            user_id: 1,
            stock_id: 1,
            offer_id: 1,
            venue_id: 1,
            offerer_id: 1,
            quantity: 1,
            amount: Decimal::new(1000, 2),
            status,
            date_created: Utc::now(),
            date_used: None,
            cancellation_date: None,
            cancellation_reason: None,
            cancellation_limit_date: None,
            reimbursement_date: None,
        }
    }

    fn stock(booked: i32) -> Stock {
        Stock {
            id: 1,
            offer_id: 1,
            price: Decimal::new(1000, 2),
            quantity: Some(10),
            dn_booked_quantity: booked,
            beginning_datetime: None,
            booking_limit_datetime: None,
            price_category_id: None,
            id_at_providers: None,
            raw_provider_quantity: None,
            last_provider_id: None,
            is_soft_deleted: false,
            date_modified: Utc::now(),
        }
    }

    #[test]
    fn cancel_releases_stock() {
        let mut b = booking(BookingStatus::Confirmed);
        b.quantity = 2;
        let mut s = stock(3);
        b.cancel(&mut s, CancellationReason::Offerer, Utc::now(), false).unwrap();
        assert_eq!(b.status, BookingStatus::Cancelled);
        assert_eq!(b.cancellation_reason, Some(CancellationReason::Offerer));
        assert_eq!(s.dn_booked_quantity, 1);
    }

    #[test]
    fn cancel_refuses_cancelled_used_and_reimbursed() {
        let now = Utc::now();
        let mut s = stock(1);
        assert_eq!(
            booking(BookingStatus::Cancelled).cancel(&mut s, CancellationReason::Offerer, now, false),
            Err(BookingError::AlreadyCancelled)
        );
        assert_eq!(
            booking(BookingStatus::Used).cancel(&mut s, CancellationReason::Offerer, now, false),
            Err(BookingError::CannotCancelUsed)
        );
        assert!(booking(BookingStatus::Used)
            .cancel(&mut s, CancellationReason::Fraud, now, true)
            .is_ok());
        assert_eq!(
            booking(BookingStatus::Reimbursed).cancel(&mut s, CancellationReason::Offerer, now, true),
            Err(BookingError::CannotCancelReimbursed)
        );
    }

    #[test]
    fn use_then_unuse() {
        let now = Utc::now();
        let mut b = booking(BookingStatus::Confirmed);
        assert_eq!(b.mark_as_unused(), Err(BookingError::NotUsed));
        b.mark_as_used(None, now).unwrap();
        assert_eq!(b.date_used, Some(now));
        assert_eq!(b.mark_as_used(None, now), Err(BookingError::AlreadyUsed));
        b.mark_as_unused().unwrap();
        assert_eq!(b.status, BookingStatus::Confirmed);
        assert!(b.date_used.is_none());
    }

    #[test]
    fn event_cannot_be_used_too_early() {
        let now = Utc::now();
        let mut b = booking(BookingStatus::Confirmed);
        assert_eq!(
            b.mark_as_used(Some(now + Duration::days(3)), now),
            Err(BookingError::TooEarlyToUse)
        );
        assert!(b.mark_as_used(Some(now + Duration::hours(47)), now).is_ok());
    }

    #[test]
    fn cancellation_limit_date_rules() {
        let booked = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        // Événement lointain : 48h après la réservation
        let far = Utc.with_ymd_and_hms(2024, 4, 1, 20, 0, 0).unwrap();
        assert_eq!(
            compute_cancellation_limit_date(Some(far), booked),
            Some(booked + Duration::hours(48))
        );
        // Événement dans 3 jours : 48h avant l'événement
        let soon = booked + Duration::hours(72);
        assert_eq!(
            compute_cancellation_limit_date(Some(soon), booked),
            Some(booked + Duration::hours(24))
        );
        // Événement imminent : jamais avant la date de réservation
        let imminent = booked + Duration::hours(10);
        assert_eq!(compute_cancellation_limit_date(Some(imminent), booked), Some(booked));
        assert_eq!(compute_cancellation_limit_date(None, booked), None);
    }

    #[test]
    fn booking_errors_map_to_gone_or_forbidden() {
        let gone: AppError = BookingError::AlreadyCancelled.into();
        assert_eq!(gone.status_code(), StatusCode::GONE);
        let forbidden: AppError = BookingError::CannotCancelUsed.into();
        assert_eq!(forbidden.status_code(), StatusCode::FORBIDDEN);
    }
}
