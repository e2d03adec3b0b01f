use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{query, query_as, query_scalar, Pool, Postgres, QueryBuilder};

use crate::domain::finance::{
    CashflowBatch, CustomReimbursementRule, NewCustomRule, NewPayment, Payment, PaymentMessage,
};
use crate::infrastructure::error::{AppError, AppResult};

const RULE_COLUMNS: &str = "id, offerer_id, venue_id, offer_id, subcategories, rate, amount, \
     start_date, end_date, date_created";
const PAYMENT_COLUMNS: &str = "id, batch_id, booking_id, collective_booking_id, venue_id, \
     booking_total_cents, amount_cents, rate, rule_description, custom_rule_id, iban, bic, \
     recipient_siren, recipient_name, status, date_created";

/// Filtre de recherche des tarifs dérogatoires
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleFilter {
    pub offerer_id: Option<i64>,
    pub venue_id: Option<i64>,
    pub offer_id: Option<i64>,
}

/// Tarifs dérogatoires, lots de virements et paiements
#[async_trait]
pub trait FinanceRepository: Send + Sync {
    /// Tarifs correspondant au filtre, du plus récent au plus ancien
    async fn list_custom_rules(
        &self,
        filter: &RuleFilter,
        limit: Option<i64>,
    ) -> AppResult<Vec<CustomReimbursementRule>>;
    async fn get_custom_rule(&self, rule_id: i64) -> AppResult<CustomReimbursementRule>;
    async fn create_custom_rule(&self, rule: &NewCustomRule) -> AppResult<CustomReimbursementRule>;
    async fn update_rule_end_date(
        &self,
        rule_id: i64,
        end_date: DateTime<Utc>,
    ) -> AppResult<CustomReimbursementRule>;
    /// Tarifs encore actifs à `since` ou après
    async fn list_rules_active_since(
        &self,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<CustomReimbursementRule>>;

    /// Chiffre d'affaires déjà remboursé d'un lieu, en centimes, pour les
    /// réservations validées pendant l'année civile `year`
    async fn venue_yearly_revenue_cents(&self, venue_id: i64, year: i32) -> AppResult<i64>;

    /// Crée un lot numéroté `VIR<n>`
    async fn create_cashflow_batch(&self, cutoff: DateTime<Utc>) -> AppResult<CashflowBatch>;
    async fn save_payments(&self, batch_id: i64, payments: &[NewPayment]) -> AppResult<Vec<Payment>>;
    async fn mark_payments_sent(&self, payment_ids: &[i64]) -> AppResult<()>;
    async fn save_payment_message(
        &self,
        batch_id: i64,
        name: &str,
        checksum: &str,
    ) -> AppResult<PaymentMessage>;
}

#[derive(Clone)]
pub struct PgFinanceRepository {
    pool: Pool<Postgres>,
}

impl PgFinanceRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FinanceRepository for PgFinanceRepository {
    async fn list_custom_rules(
        &self,
        filter: &RuleFilter,
        limit: Option<i64>,
    ) -> AppResult<Vec<CustomReimbursementRule>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM custom_reimbursement_rule WHERE TRUE",
            RULE_COLUMNS
        ));
        if let Some(offerer_id) = filter.offerer_id {
            builder.push(" AND offerer_id = ").push_bind(offerer_id);
        }
        if let Some(venue_id) = filter.venue_id {
            builder.push(" AND venue_id = ").push_bind(venue_id);
        }
        if let Some(offer_id) = filter.offer_id {
            builder.push(" AND offer_id = ").push_bind(offer_id);
        }
        builder.push(" ORDER BY id DESC");
        if let Some(limit) = limit {
            builder.push(" LIMIT ").push_bind(limit);
        }

        let rules = builder
            .build_query_as::<CustomReimbursementRule>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rules)
    }

    async fn get_custom_rule(&self, rule_id: i64) -> AppResult<CustomReimbursementRule> {
        query_as::<_, CustomReimbursementRule>(&format!(
            "SELECT {} FROM custom_reimbursement_rule WHERE id = $1",
            RULE_COLUMNS
        ))
        .bind(rule_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tarif dérogatoire {}", rule_id)))
    }

    async fn create_custom_rule(&self, rule: &NewCustomRule) -> AppResult<CustomReimbursementRule> {
        let created = query_as::<_, CustomReimbursementRule>(&format!(
            r#"
            INSERT INTO custom_reimbursement_rule (
                offerer_id, venue_id, offer_id, subcategories, rate, amount, start_date, end_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            RULE_COLUMNS
        ))
        .bind(rule.offerer_id)
        .bind(rule.venue_id)
        .bind(rule.offer_id)
        .bind(&rule.subcategories)
        .bind(rule.rate())
        .bind(rule.amount)
        .bind(rule.start_datetime())
        .bind(rule.end_datetime())
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn update_rule_end_date(
        &self,
        rule_id: i64,
        end_date: DateTime<Utc>,
    ) -> AppResult<CustomReimbursementRule> {
        query_as::<_, CustomReimbursementRule>(&format!(
            "UPDATE custom_reimbursement_rule SET end_date = $2 WHERE id = $1 RETURNING {}",
            RULE_COLUMNS
        ))
        .bind(rule_id)
        .bind(end_date)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tarif dérogatoire {}", rule_id)))
    }

    async fn list_rules_active_since(
        &self,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<CustomReimbursementRule>> {
        let rules = query_as::<_, CustomReimbursementRule>(&format!(
            "SELECT {} FROM custom_reimbursement_rule WHERE end_date IS NULL OR end_date > $1",
            RULE_COLUMNS
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rules)
    }

    async fn venue_yearly_revenue_cents(&self, venue_id: i64, year: i32) -> AppResult<i64> {
        let revenue: i64 = query_scalar(
            r#"
            SELECT COALESCE(SUM(p.booking_total_cents), 0)::BIGINT
            FROM payment p
            JOIN booking b ON b.id = p.booking_id
            WHERE p.venue_id = $1
              AND p.status = 'SENT'
              AND EXTRACT(YEAR FROM b.date_used)::INT = $2
            "#,
        )
        .bind(venue_id)
        .bind(year)
        .fetch_one(&self.pool)
        .await?;
        Ok(revenue)
    }

    async fn create_cashflow_batch(&self, cutoff: DateTime<Utc>) -> AppResult<CashflowBatch> {
        let mut tx = self.pool.begin().await?;

        // Verrou de table : deux lots ne peuvent pas recevoir le même numéro
        query("LOCK TABLE cashflow_batch IN EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;
        let count: i64 = query_scalar("SELECT COUNT(*) FROM cashflow_batch")
            .fetch_one(&mut *tx)
            .await?;

        let batch = query_as::<_, CashflowBatch>(
            r#"
            INSERT INTO cashflow_batch (label, cutoff)
            VALUES ($1, $2)
            RETURNING id, label, cutoff, date_created
            "#,
        )
        .bind(format!("VIR{}", count + 1))
        .bind(cutoff)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(batch)
    }

    async fn save_payments(&self, batch_id: i64, payments: &[NewPayment]) -> AppResult<Vec<Payment>> {
        if payments.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;

        // Un paiement jamais envoyé (non traitable, ou lot interrompu) est
        // remplacé quand la réservation est reprise
        let booking_ids: Vec<i64> = payments.iter().filter_map(|p| p.booking_id).collect();
        let collective_ids: Vec<i64> = payments
            .iter()
            .filter_map(|p| p.collective_booking_id)
            .collect();
        query(
            "DELETE FROM payment WHERE status <> 'SENT' \
             AND (booking_id = ANY($1) OR collective_booking_id = ANY($2))",
        )
        .bind(&booking_ids)
        .bind(&collective_ids)
        .execute(&mut *tx)
        .await?;

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO payment (batch_id, booking_id, collective_booking_id, venue_id, \
             booking_total_cents, amount_cents, rate, rule_description, custom_rule_id, iban, bic, \
             recipient_siren, recipient_name, status) ",
        );
        builder.push_values(payments, |mut row, payment| {
            row.push_bind(batch_id)
                .push_bind(payment.booking_id)
                .push_bind(payment.collective_booking_id)
                .push_bind(payment.venue_id)
                .push_bind(payment.booking_total_cents)
                .push_bind(payment.amount_cents)
                .push_bind(payment.rate)
                .push_bind(&payment.rule_description)
                .push_bind(payment.custom_rule_id)
                .push_bind(&payment.iban)
                .push_bind(&payment.bic)
                .push_bind(&payment.recipient_siren)
                .push_bind(&payment.recipient_name)
                .push_bind(payment.status);
        });
        builder.push(" RETURNING ").push(PAYMENT_COLUMNS);

        let saved = builder.build_query_as::<Payment>().fetch_all(&mut *tx).await?;
        tx.commit().await?;
        Ok(saved)
    }

    async fn mark_payments_sent(&self, payment_ids: &[i64]) -> AppResult<()> {
        query("UPDATE payment SET status = 'SENT' WHERE id = ANY($1) AND status = 'PENDING'")
            .bind(payment_ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_payment_message(
        &self,
        batch_id: i64,
        name: &str,
        checksum: &str,
    ) -> AppResult<PaymentMessage> {
        let message = query_as::<_, PaymentMessage>(
            r#"
            INSERT INTO payment_message (batch_id, name, checksum)
            VALUES ($1, $2, $3)
            RETURNING id, batch_id, name, checksum, date_created
            "#,
        )
        .bind(batch_id)
        .bind(name)
        .bind(checksum)
        .fetch_one(&self.pool)
        .await?;
        Ok(message)
    }
}
