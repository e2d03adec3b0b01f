// core/booking_service.rs
use actix_web::http::StatusCode;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::booking::{
    already_cancelled_on_cancel, compute_cancellation_limit_date, normalize_token, Booking,
    BookingError, BookingStatus, CancellationReason,
};
use crate::domain::collective::{CollectiveBooking, CollectiveOffer, CollectiveStock};
use crate::infrastructure::database::Repositories;
use crate::infrastructure::error::{AppError, AppResult};
use crate::infrastructure::queue::SearchIndexQueue;

/// Offre collective accompagnée de son stock, s'il a déjà été défini
#[derive(Debug, Clone, Serialize)]
pub struct CollectiveOfferDetails {
    #[serde(flatten)]
    pub offer: CollectiveOffer,
    pub stock: Option<CollectiveStock>,
}

/// Réservation telle que présentée au partenaire qui scanne la contremarque
#[derive(Debug, Clone, Serialize)]
pub struct BookingDetails {
    pub booking_id: i64,
    pub token: String,
    pub offer_id: i64,
    pub offer_name: String,
    pub is_event: bool,
    pub event_beginning: Option<DateTime<Utc>>,
    pub venue_name: String,
    pub venue_address: Option<String>,
    pub user_email: String,
    pub user_name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub total_amount: Decimal,
    pub is_used: bool,
    pub cancellation_limit_date: Option<DateTime<Utc>>,
}

fn booking_not_found() -> AppError {
    AppError::api(
        StatusCode::NOT_FOUND,
        "global",
        "Cette contremarque n'a pas été trouvée",
    )
}

fn not_offerer_booking() -> AppError {
    AppError::api(
        StatusCode::FORBIDDEN,
        "user",
        "Vous n'avez pas les droits suffisants pour valider cette contremarque car cette réservation n'a pas été faite sur une offre de votre structure.",
    )
}

pub struct BookingService {
    repositories: Repositories,
    search_queue: SearchIndexQueue,
}

impl BookingService {
    pub fn new(repositories: Repositories, search_queue: SearchIndexQueue) -> Self {
        Self {
            repositories,
            search_queue,
        }
    }

    /// Retrouve une réservation de la structure à partir de sa contremarque
    async fn find_offerer_booking(&self, offerer_id: i64, token: &str) -> AppResult<Booking> {
        let booking = self
            .repositories
            .bookings
            .find_by_token(&normalize_token(token))
            .await?
            .ok_or_else(booking_not_found)?;
        if booking.offerer_id != offerer_id {
            return Err(not_offerer_booking());
        }
        Ok(booking)
    }

    /// Détail d'une contremarque encore validable
    pub async fn get_booking_by_token(&self, offerer_id: i64, token: &str) -> AppResult<BookingDetails> {
        let booking = self.find_offerer_booking(offerer_id, token).await?;
        let stock = self.repositories.offers.get_stock(booking.stock_id).await?;
        booking.check_is_usable(stock.beginning_datetime, Utc::now())?;

        let offer = self.repositories.offers.get_offer(booking.offer_id).await?;
        let venue = self.repositories.offerers.get_venue(booking.venue_id).await?;
        let user = self.repositories.users.get_user(booking.user_id).await?;

        Ok(BookingDetails {
            booking_id: booking.id,
            token: booking.token.clone(),
            offer_id: offer.id,
            offer_name: offer.name,
            is_event: offer.is_event,
            event_beginning: stock.beginning_datetime,
            venue_name: venue.name,
            venue_address: venue.address,
            user_email: user.email.clone(),
            user_name: user.full_name(),
            quantity: booking.quantity,
            price: booking.amount,
            total_amount: booking.total_amount(),
            is_used: booking.status == BookingStatus::Used,
            cancellation_limit_date: booking
                .cancellation_limit_date
                .or_else(|| compute_cancellation_limit_date(stock.beginning_datetime, booking.date_created)),
        })
    }

    /// Valide la contremarque
    pub async fn use_booking(&self, offerer_id: i64, token: &str) -> AppResult<Booking> {
        let booking = self.find_offerer_booking(offerer_id, token).await?;
        let now = Utc::now();
        let booking = self
            .repositories
            .bookings
            .apply_booking_transition(
                booking.id,
                Box::new(move |booking, stock| {
                    booking.mark_as_used(stock.beginning_datetime, now)?;
                    Ok(())
                }),
            )
            .await?;
        info!(booking_id = booking.id, "✅ Contremarque validée");
        Ok(booking)
    }

    /// Annule la validation d'une contremarque
    pub async fn keep_booking(&self, offerer_id: i64, token: &str) -> AppResult<Booking> {
        let booking = self.find_offerer_booking(offerer_id, token).await?;
        let booking = self
            .repositories
            .bookings
            .apply_booking_transition(
                booking.id,
                Box::new(|booking, _| {
                    booking.mark_as_unused()?;
                    Ok(())
                }),
            )
            .await?;
        info!(booking_id = booking.id, "↩️ Validation de la contremarque annulée");
        Ok(booking)
    }

    /// Annulation par le partenaire ; les places sont remises en vente
    pub async fn cancel_booking(&self, offerer_id: i64, token: &str) -> AppResult<Booking> {
        let booking = self.find_offerer_booking(offerer_id, token).await?;
        let now = Utc::now();
        let booking = self
            .repositories
            .bookings
            .apply_booking_transition(
                booking.id,
                Box::new(move |booking, stock| {
                    booking
                        .cancel(stock, CancellationReason::Offerer, now, false)
                        .map_err(|error| match error {
                            BookingError::AlreadyCancelled => already_cancelled_on_cancel(),
                            other => other.into(),
                        })
                }),
            )
            .await?;

        if let Err(e) = self.search_queue.enqueue_offer_ids(&[booking.offer_id]).await {
            warn!("⚠️ Réindexation de l'offre {} impossible: {}", booking.offer_id, e);
        }
        info!(booking_id = booking.id, "🚫 Réservation annulée par le partenaire");
        Ok(booking)
    }

    pub async fn list_collective_offers(
        &self,
        offerer_id: i64,
    ) -> AppResult<Vec<CollectiveOfferDetails>> {
        let offers = self.repositories.collective.list_offers_by_offerer(offerer_id).await?;
        let ids: Vec<i64> = offers.iter().map(|offer| offer.id).collect();
        let mut stocks = self.repositories.collective.list_stocks_by_offer_ids(&ids).await?;

        Ok(offers
            .into_iter()
            .map(|offer| {
                let stock = stocks
                    .iter()
                    .position(|stock| stock.collective_offer_id == offer.id)
                    .map(|index| stocks.swap_remove(index));
                CollectiveOfferDetails { offer, stock }
            })
            .collect())
    }

    /// Annulation d'une réservation collective par le partenaire
    pub async fn cancel_collective_booking(
        &self,
        offerer_id: i64,
        booking_id: i64,
    ) -> AppResult<CollectiveBooking> {
        let booking = self.repositories.collective.get_booking(booking_id).await?;
        if booking.offerer_id != offerer_id {
            return Err(AppError::api(
                StatusCode::FORBIDDEN,
                "global",
                "Cette réservation ne concerne pas une offre de votre structure",
            ));
        }

        let now = Utc::now();
        let booking = self
            .repositories
            .collective
            .apply_transition(
                booking_id,
                Box::new(move |booking| {
                    booking.cancel_by_offerer(now)?;
                    Ok(())
                }),
            )
            .await?;
        info!(collective_booking_id = booking.id, "🚫 Réservation collective annulée");
        Ok(booking)
    }
}
