use async_trait::async_trait;
use sqlx::{query_as, Pool, Postgres};

use crate::domain::fraud::{
    BeneficiaryFraudCheck, BeneficiaryFraudResult, BeneficiaryFraudReview, FraudCheckStatus,
    NewFraudCheck, NewFraudReview,
};
use crate::infrastructure::error::AppResult;

const CHECK_COLUMNS: &str = "id, user_id, check_type, status, reason, reason_codes, \
     result_content, eligibility_type, date_created";
const REVIEW_COLUMNS: &str =
    "id, user_id, author_id, review, reason, eligibility_type, date_reviewed";

/// Vérifications, revues manuelles et verdicts de fraude
#[async_trait]
pub trait FraudRepository: Send + Sync {
    async fn list_checks(&self, user_id: i64) -> AppResult<Vec<BeneficiaryFraudCheck>>;
    async fn create_check(&self, check: &NewFraudCheck) -> AppResult<BeneficiaryFraudCheck>;
    async fn list_reviews(&self, user_id: i64) -> AppResult<Vec<BeneficiaryFraudReview>>;
    async fn create_review(&self, review: &NewFraudReview) -> AppResult<BeneficiaryFraudReview>;
    async fn get_result(&self, user_id: i64) -> AppResult<Option<BeneficiaryFraudResult>>;
    /// Remplace le verdict courant de l'utilisateur
    async fn save_result(
        &self,
        user_id: i64,
        status: FraudCheckStatus,
        reason: Option<String>,
        reason_codes: Vec<String>,
    ) -> AppResult<BeneficiaryFraudResult>;
}

#[derive(Clone)]
pub struct PgFraudRepository {
    pool: Pool<Postgres>,
}

impl PgFraudRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FraudRepository for PgFraudRepository {
    async fn list_checks(&self, user_id: i64) -> AppResult<Vec<BeneficiaryFraudCheck>> {
        let checks = query_as::<_, BeneficiaryFraudCheck>(&format!(
            "SELECT {} FROM beneficiary_fraud_check WHERE user_id = $1 ORDER BY date_created",
            CHECK_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(checks)
    }

    async fn create_check(&self, check: &NewFraudCheck) -> AppResult<BeneficiaryFraudCheck> {
        let created = query_as::<_, BeneficiaryFraudCheck>(&format!(
            r#"
            INSERT INTO beneficiary_fraud_check (
                user_id, check_type, status, reason, reason_codes, result_content, eligibility_type
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            CHECK_COLUMNS
        ))
        .bind(check.user_id)
        .bind(check.check_type)
        .bind(check.status)
        .bind(&check.reason)
        .bind(&check.reason_codes)
        .bind(&check.result_content)
        .bind(check.eligibility_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn list_reviews(&self, user_id: i64) -> AppResult<Vec<BeneficiaryFraudReview>> {
        let reviews = query_as::<_, BeneficiaryFraudReview>(&format!(
            "SELECT {} FROM beneficiary_fraud_review WHERE user_id = $1 ORDER BY date_reviewed",
            REVIEW_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(reviews)
    }

    async fn create_review(&self, review: &NewFraudReview) -> AppResult<BeneficiaryFraudReview> {
        let created = query_as::<_, BeneficiaryFraudReview>(&format!(
            r#"
            INSERT INTO beneficiary_fraud_review (user_id, author_id, review, reason, eligibility_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            REVIEW_COLUMNS
        ))
        .bind(review.user_id)
        .bind(review.author_id)
        .bind(review.review)
        .bind(&review.reason)
        .bind(review.eligibility_type)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn get_result(&self, user_id: i64) -> AppResult<Option<BeneficiaryFraudResult>> {
        let result = query_as::<_, BeneficiaryFraudResult>(
            "SELECT id, user_id, status, reason, reason_codes, date_created \
             FROM beneficiary_fraud_result WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(result)
    }

    async fn save_result(
        &self,
        user_id: i64,
        status: FraudCheckStatus,
        reason: Option<String>,
        reason_codes: Vec<String>,
    ) -> AppResult<BeneficiaryFraudResult> {
        let result = query_as::<_, BeneficiaryFraudResult>(
            r#"
            INSERT INTO beneficiary_fraud_result (user_id, status, reason, reason_codes)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET status = EXCLUDED.status,
                reason = EXCLUDED.reason,
                reason_codes = EXCLUDED.reason_codes,
                date_created = NOW()
            RETURNING id, user_id, status, reason, reason_codes, date_created
            "#,
        )
        .bind(user_id)
        .bind(status)
        .bind(reason)
        .bind(reason_codes)
        .fetch_one(&self.pool)
        .await?;
        Ok(result)
    }
}
