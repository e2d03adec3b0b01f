use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{query, query_as, FromRow, Pool, Postgres};

use crate::domain::booking::Booking;
use crate::domain::finance::{ReimbursableItem, ReimbursableKind};
use crate::domain::offer::Stock;
use crate::infrastructure::database::offers::STOCK_COLUMNS;
use crate::infrastructure::error::{AppError, AppResult};

const BOOKING_COLUMNS: &str = "id, token, user_id, stock_id, offer_id, venue_id, offerer_id, \
     quantity, amount, status, date_created, date_used, cancellation_date, cancellation_reason, \
     cancellation_limit_date, reimbursement_date";

/// Transition appliquée à une réservation et à son stock, verrouillés
/// le temps de la transaction. Une erreur annule la transaction.
pub type BookingTransition =
    Box<dyn FnOnce(&mut Booking, &mut Stock) -> AppResult<()> + Send>;

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn get_booking(&self, booking_id: i64) -> AppResult<Booking>;
    async fn find_by_token(&self, token: &str) -> AppResult<Option<Booking>>;
    async fn list_by_user(&self, user_id: i64) -> AppResult<Vec<Booking>>;

    async fn apply_booking_transition(
        &self,
        booking_id: i64,
        transition: BookingTransition,
    ) -> AppResult<Booking>;

    /// Réservations validées avant `cutoff` et pas encore remboursées
    async fn list_reimbursable(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<ReimbursableItem>>;
    async fn mark_reimbursed(&self, booking_ids: &[i64], at: DateTime<Utc>) -> AppResult<u64>;
}

#[derive(Clone)]
pub struct PgBookingRepository {
    pool: Pool<Postgres>,
}

impl PgBookingRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct ReimbursableBookingRow {
    booking_id: i64,
    token: String,
    offer_id: i64,
    offer_name: String,
    venue_id: i64,
    offerer_id: i64,
    subcategory_id: String,
    quantity: i32,
    unit_amount: Decimal,
    date_used: DateTime<Utc>,
}

impl From<ReimbursableBookingRow> for ReimbursableItem {
    fn from(row: ReimbursableBookingRow) -> Self {
        Self {
            kind: ReimbursableKind::Individual,
            booking_id: row.booking_id,
            token: Some(row.token),
            offer_id: row.offer_id,
            offer_name: row.offer_name,
            venue_id: row.venue_id,
            offerer_id: row.offerer_id,
            subcategory_id: Some(row.subcategory_id),
            quantity: row.quantity,
            unit_amount: row.unit_amount,
            date_used: row.date_used,
        }
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn get_booking(&self, booking_id: i64) -> AppResult<Booking> {
        query_as::<_, Booking>(&format!("SELECT {} FROM booking WHERE id = $1", BOOKING_COLUMNS))
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Réservation {}", booking_id)))
    }

    async fn find_by_token(&self, token: &str) -> AppResult<Option<Booking>> {
        let booking = query_as::<_, Booking>(&format!(
            "SELECT {} FROM booking WHERE token = $1",
            BOOKING_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(booking)
    }

    async fn list_by_user(&self, user_id: i64) -> AppResult<Vec<Booking>> {
        let bookings = query_as::<_, Booking>(&format!(
            "SELECT {} FROM booking WHERE user_id = $1 ORDER BY date_created",
            BOOKING_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn apply_booking_transition(
        &self,
        booking_id: i64,
        transition: BookingTransition,
    ) -> AppResult<Booking> {
        let mut tx = self.pool.begin().await?;

        let mut booking = query_as::<_, Booking>(&format!(
            "SELECT {} FROM booking WHERE id = $1 FOR UPDATE",
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Réservation {}", booking_id)))?;

        let mut stock = query_as::<_, Stock>(&format!(
            "SELECT {} FROM stock WHERE id = $1 FOR UPDATE",
            STOCK_COLUMNS
        ))
        .bind(booking.stock_id)
        .fetch_one(&mut *tx)
        .await?;

        // En cas d'erreur, la transaction est abandonnée (rollback au drop)
        transition(&mut booking, &mut stock)?;

        query(
            r#"
            UPDATE booking
            SET status = $2,
                date_used = $3,
                cancellation_date = $4,
                cancellation_reason = $5,
                reimbursement_date = $6
            WHERE id = $1
            "#,
        )
        .bind(booking.id)
        .bind(booking.status)
        .bind(booking.date_used)
        .bind(booking.cancellation_date)
        .bind(booking.cancellation_reason)
        .bind(booking.reimbursement_date)
        .execute(&mut *tx)
        .await?;

        query("UPDATE stock SET dn_booked_quantity = $2, date_modified = NOW() WHERE id = $1")
            .bind(stock.id)
            .bind(stock.dn_booked_quantity)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(booking)
    }

    async fn list_reimbursable(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<ReimbursableItem>> {
        let rows = query_as::<_, ReimbursableBookingRow>(
            r#"
            SELECT b.id AS booking_id, b.token, b.offer_id, o.name AS offer_name,
                   b.venue_id, b.offerer_id, o.subcategory_id, b.quantity,
                   b.amount AS unit_amount, b.date_used
            FROM booking b
            JOIN offer o ON o.id = b.offer_id
            WHERE b.status = 'USED' AND b.date_used < $1
            ORDER BY b.date_used, b.id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ReimbursableItem::from).collect())
    }

    async fn mark_reimbursed(&self, booking_ids: &[i64], at: DateTime<Utc>) -> AppResult<u64> {
        let result = query(
            "UPDATE booking SET status = 'REIMBURSED', reimbursement_date = $2 \
             WHERE id = ANY($1) AND status = 'USED'",
        )
        .bind(booking_ids)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
