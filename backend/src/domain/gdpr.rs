use actix_web::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::booking::Booking;
use crate::domain::fraud::{BeneficiaryFraudCheck, BeneficiaryFraudReview};
use crate::domain::user::Deposit;
use crate::infrastructure::error::AppError;

/// Durée de mise à disposition d'un export
pub const EXTRACT_EXPIRATION_DAYS: i64 = 7;

/// Demande d'export des données personnelles d'un utilisateur
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GdprUserDataExtract {
    pub id: i64,
    pub user_id: i64,
    pub author_user_id: i64,
    pub date_created: DateTime<Utc>,
    pub date_processed: Option<DateTime<Utc>>,
    pub expiration_date: DateTime<Utc>,
}

impl GdprUserDataExtract {
    pub fn is_processed(&self) -> bool {
        self.date_processed.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date <= now
    }

    /// Clé de l'archive dans le stockage objet
    pub fn archive_key(&self) -> String {
        archive_key(self.id)
    }
}

pub fn archive_key(extract_id: i64) -> String {
    format!("gdpr-extracts/{}.zip", extract_id)
}

pub fn expiration_from(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::days(EXTRACT_EXPIRATION_DAYS)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GdprError {
    #[error("L'extraction {0} a déjà été traitée")]
    AlreadyProcessed(i64),
    #[error("Une extraction de données est déjà en cours pour cet utilisateur")]
    ExtractAlreadyRequested,
    #[error("L'extraction {0} a expiré")]
    Expired(i64),
    #[error("L'extraction {0} n'est pas encore disponible")]
    NotProcessed(i64),
    #[error("Le nombre maximal d'extractions quotidiennes est atteint")]
    DailyQuotaReached,
}

impl From<GdprError> for AppError {
    fn from(error: GdprError) -> Self {
        let message = error.to_string();
        match error {
            GdprError::AlreadyProcessed(_) => AppError::Conflict(message),
            GdprError::ExtractAlreadyRequested => {
                AppError::api(StatusCode::BAD_REQUEST, "user", message)
            }
            GdprError::Expired(_) => AppError::api(StatusCode::GONE, "extract", message),
            GdprError::NotProcessed(_) => AppError::api(StatusCode::NOT_FOUND, "extract", message),
            GdprError::DailyQuotaReached => AppError::ResourceExhausted(message),
        }
    }
}

/// Données personnelles exportées, sérialisées dans `<email>.json`
#[derive(Debug, Clone, Serialize)]
pub struct GdprDataContainer {
    pub generation_date: DateTime<Utc>,
    pub user: GdprUser,
    pub deposits: Vec<Deposit>,
    pub bookings: Vec<Booking>,
    pub fraud_checks: Vec<BeneficiaryFraudCheck>,
    pub fraud_reviews: Vec<BeneficiaryFraudReview>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GdprUser {
    pub id: i64,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<chrono::NaiveDate>,
    pub phone_number: Option<String>,
    pub roles: Vec<String>,
    pub is_active: bool,
    pub date_created: DateTime<Utc>,
}
