use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{query, query_as, FromRow, Pool, Postgres};

use crate::domain::collective::{CollectiveBooking, CollectiveOffer, CollectiveStock};
use crate::domain::finance::{ReimbursableItem, ReimbursableKind};
use crate::infrastructure::error::{AppError, AppResult};

const COLLECTIVE_BOOKING_COLUMNS: &str = "id, collective_stock_id, collective_offer_id, venue_id, \
     offerer_id, educational_institution_id, educational_redactor_email, price, status, \
     date_created, confirmation_limit_date, confirmation_date, date_used, cancellation_date, \
     cancellation_reason, reimbursement_date";

pub type CollectiveBookingTransition =
    Box<dyn FnOnce(&mut CollectiveBooking) -> AppResult<()> + Send>;

/// Offres et réservations collectives
#[async_trait]
pub trait CollectiveRepository: Send + Sync {
    async fn list_offers_by_offerer(&self, offerer_id: i64) -> AppResult<Vec<CollectiveOffer>>;
    async fn list_stocks_by_offer_ids(&self, offer_ids: &[i64]) -> AppResult<Vec<CollectiveStock>>;
    async fn get_booking(&self, booking_id: i64) -> AppResult<CollectiveBooking>;
    async fn apply_transition(
        &self,
        booking_id: i64,
        transition: CollectiveBookingTransition,
    ) -> AppResult<CollectiveBooking>;
    async fn list_reimbursable(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<ReimbursableItem>>;
    async fn mark_reimbursed(&self, booking_ids: &[i64], at: DateTime<Utc>) -> AppResult<u64>;
}

#[derive(Clone)]
pub struct PgCollectiveRepository {
    pool: Pool<Postgres>,
}

impl PgCollectiveRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct ReimbursableCollectiveRow {
    booking_id: i64,
    offer_id: i64,
    offer_name: String,
    venue_id: i64,
    offerer_id: i64,
    price: Decimal,
    date_used: DateTime<Utc>,
}

#[async_trait]
impl CollectiveRepository for PgCollectiveRepository {
    async fn list_offers_by_offerer(&self, offerer_id: i64) -> AppResult<Vec<CollectiveOffer>> {
        let offers = query_as::<_, CollectiveOffer>(
            r#"
            SELECT co.id, co.venue_id, co.name, co.description, co.is_active, co.students,
                   co.date_created
            FROM collective_offer co
            JOIN venue v ON v.id = co.venue_id
            WHERE v.offerer_id = $1
            ORDER BY co.id
            "#,
        )
        .bind(offerer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(offers)
    }

    async fn list_stocks_by_offer_ids(&self, offer_ids: &[i64]) -> AppResult<Vec<CollectiveStock>> {
        let stocks = query_as::<_, CollectiveStock>(
            r#"
            SELECT id, collective_offer_id, beginning_datetime, booking_limit_datetime, price,
                   number_of_tickets
            FROM collective_stock
            WHERE collective_offer_id = ANY($1)
            "#,
        )
        .bind(offer_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(stocks)
    }

    async fn get_booking(&self, booking_id: i64) -> AppResult<CollectiveBooking> {
        query_as::<_, CollectiveBooking>(&format!(
            "SELECT {} FROM collective_booking WHERE id = $1",
            COLLECTIVE_BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Réservation collective {}", booking_id)))
    }

    async fn apply_transition(
        &self,
        booking_id: i64,
        transition: CollectiveBookingTransition,
    ) -> AppResult<CollectiveBooking> {
        let mut tx = self.pool.begin().await?;

        let mut booking = query_as::<_, CollectiveBooking>(&format!(
            "SELECT {} FROM collective_booking WHERE id = $1 FOR UPDATE",
            COLLECTIVE_BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Réservation collective {}", booking_id)))?;

        transition(&mut booking)?;

        query(
            r#"
            UPDATE collective_booking
            SET status = $2,
                cancellation_date = $3,
                cancellation_reason = $4,
                reimbursement_date = $5
            WHERE id = $1
            "#,
        )
        .bind(booking.id)
        .bind(booking.status)
        .bind(booking.cancellation_date)
        .bind(booking.cancellation_reason)
        .bind(booking.reimbursement_date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(booking)
    }

    async fn list_reimbursable(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<ReimbursableItem>> {
        let rows = query_as::<_, ReimbursableCollectiveRow>(
            r#"
            SELECT cb.id AS booking_id, cb.collective_offer_id AS offer_id,
                   co.name AS offer_name, cb.venue_id, cb.offerer_id, cb.price, cb.date_used
            FROM collective_booking cb
            JOIN collective_offer co ON co.id = cb.collective_offer_id
            WHERE cb.status = 'USED' AND cb.date_used < $1
            ORDER BY cb.date_used, cb.id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ReimbursableItem {
                kind: ReimbursableKind::Collective,
                booking_id: row.booking_id,
                token: None,
                offer_id: row.offer_id,
                offer_name: row.offer_name,
                venue_id: row.venue_id,
                offerer_id: row.offerer_id,
                subcategory_id: None,
                quantity: 1,
                unit_amount: row.price,
                date_used: row.date_used,
            })
            .collect())
    }

    async fn mark_reimbursed(&self, booking_ids: &[i64], at: DateTime<Utc>) -> AppResult<u64> {
        let result = query(
            "UPDATE collective_booking SET status = 'REIMBURSED', reimbursement_date = $2 \
             WHERE id = ANY($1) AND status = 'USED'",
        )
        .bind(booking_ids)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
