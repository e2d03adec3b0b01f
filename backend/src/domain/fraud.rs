//! Vérifications d'identité et de fraude des demandeurs du pass Culture.

use actix_web::http::StatusCode;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::user::{EligibilityType, User};
use crate::infrastructure::error::AppError;
use crate::utils::helpers::age_at;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudCheckType {
    Dms,
    Ubble,
    Educonnect,
    HonorStatement,
    PhoneValidation,
    ProfileCompletion,
    InternalReview,
}

impl FraudCheckType {
    /// Vérifications d'identité (par opposition aux étapes déclaratives)
    pub fn is_identity_check(&self) -> bool {
        matches!(self, FraudCheckType::Dms | FraudCheckType::Ubble | FraudCheckType::Educonnect)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudCheckStatus {
    Started,
    Pending,
    Ok,
    Ko,
    Suspicious,
    Canceled,
    Error,
}

/// Codes de motif des vérifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudReasonCode {
    AgeNotValid,
    NotEligible,
    DuplicateUser,
    DuplicateIdPieceNumber,
    NameIncorrectCharacters,
    MissingRequiredData,
}

impl FraudReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FraudReasonCode::AgeNotValid => "AGE_NOT_VALID",
            FraudReasonCode::NotEligible => "NOT_ELIGIBLE",
            FraudReasonCode::DuplicateUser => "DUPLICATE_USER",
            FraudReasonCode::DuplicateIdPieceNumber => "DUPLICATE_ID_PIECE_NUMBER",
            FraudReasonCode::NameIncorrectCharacters => "NAME_INCORRECT_CHARACTERS",
            FraudReasonCode::MissingRequiredData => "MISSING_REQUIRED_DATA",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BeneficiaryFraudCheck {
    pub id: i64,
    pub user_id: i64,
    pub check_type: FraudCheckType,
    pub status: FraudCheckStatus,
    pub reason: Option<String>,
    pub reason_codes: Vec<String>,
    pub result_content: Option<serde_json::Value>,
    pub eligibility_type: Option<EligibilityType>,
    pub date_created: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFraudCheck {
    pub user_id: i64,
    pub check_type: FraudCheckType,
    pub status: FraudCheckStatus,
    pub reason: Option<String>,
    pub reason_codes: Vec<String>,
    pub result_content: Option<serde_json::Value>,
    pub eligibility_type: Option<EligibilityType>,
}

/// Verdict agrégé sur un demandeur
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BeneficiaryFraudResult {
    pub id: i64,
    pub user_id: i64,
    pub status: FraudCheckStatus,
    pub reason: Option<String>,
    pub reason_codes: Vec<String>,
    pub date_created: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudReviewStatus {
    Ok,
    Ko,
    RedirectedToDms,
}

/// Revue manuelle d'un dossier par un agent
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BeneficiaryFraudReview {
    pub id: i64,
    pub user_id: i64,
    pub author_id: i64,
    pub review: FraudReviewStatus,
    pub reason: String,
    pub eligibility_type: Option<EligibilityType>,
    pub date_reviewed: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFraudReview {
    pub user_id: i64,
    pub author_id: i64,
    pub review: FraudReviewStatus,
    pub reason: String,
    pub eligibility_type: Option<EligibilityType>,
}

/// Octroi de crédit impossible lors d'une revue manuelle
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FraudError {
    #[error("Aucune éligibilité trouvée. Veuillez renseigner une éligibilité.")]
    NoEligibility,
    #[error("L'utilisateur bénéficie déjà d'un crédit non expiré du type '{0:?}'")]
    DepositAlreadyGranted(EligibilityType),
    #[error("La date de naissance de l'utilisateur est inconnue")]
    MissingBirthDate,
    #[error("Aucun crédit n'est prévu pour un utilisateur de {0} ans")]
    NoDepositForAge(i32),
    #[error("Le type de vérification {0:?} n'est pas un contrôle d'identité")]
    NotAnIdentityCheck(FraudCheckType),
}

impl From<FraudError> for AppError {
    fn from(error: FraudError) -> Self {
        let field = match error {
            FraudError::NotAnIdentityCheck(_) => "check_type",
            _ => "eligibility",
        };
        AppError::api(StatusCode::BAD_REQUEST, field, error.to_string())
    }
}

/// Identité extraite d'une vérification (pièce d'identité, Démarches Simplifiées...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityContent {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub id_piece_number: Option<String>,
}

/// Résultat d'une vérification élémentaire
#[derive(Debug, Clone, PartialEq)]
pub struct FraudItem {
    pub status: FraudCheckStatus,
    pub reason_code: Option<FraudReasonCode>,
    pub detail: String,
}

impl FraudItem {
    fn ok() -> Self {
        Self {
            status: FraudCheckStatus::Ok,
            reason_code: None,
            detail: String::new(),
        }
    }

    fn ko(reason_code: FraudReasonCode, detail: impl Into<String>) -> Self {
        Self {
            status: FraudCheckStatus::Ko,
            reason_code: Some(reason_code),
            detail: detail.into(),
        }
    }

    fn suspicious(reason_code: FraudReasonCode, detail: impl Into<String>) -> Self {
        Self {
            status: FraudCheckStatus::Suspicious,
            reason_code: Some(reason_code),
            detail: detail.into(),
        }
    }
}

/// Un nom valide ne contient que des lettres, espaces, apostrophes, tirets ou points
pub fn is_valid_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty()
        && trimmed.chars().any(char::is_alphabetic)
        && trimmed
            .chars()
            .all(|c| c.is_alphabetic() || matches!(c, ' ' | '\'' | '-' | '.' | '’'))
}

pub fn validate_name(content: &IdentityContent) -> FraudItem {
    let names = [content.first_name.as_deref(), content.last_name.as_deref()];
    if names.iter().any(|name| name.is_none()) {
        return FraudItem::ko(FraudReasonCode::MissingRequiredData, "Le prénom ou le nom est manquant");
    }
    for name in names.into_iter().flatten() {
        if !is_valid_name(name) {
            return FraudItem::suspicious(
                FraudReasonCode::NameIncorrectCharacters,
                format!("Le nom '{}' contient des caractères non autorisés", name),
            );
        }
    }
    FraudItem::ok()
}

/// Vérifie l'âge du demandeur ; la date de naissance de la pièce d'identité
/// prime sur la date déclarée
pub fn validate_age(
    content: &IdentityContent,
    user: &User,
    today: NaiveDate,
) -> (FraudItem, Option<EligibilityType>) {
    let Some(birth_date) = content.birth_date.or(user.birth_date) else {
        return (
            FraudItem::ko(FraudReasonCode::MissingRequiredData, "La date de naissance est manquante"),
            None,
        );
    };
    let age = age_at(birth_date, today);
    match EligibilityType::for_age(age) {
        Some(eligibility) => (FraudItem::ok(), Some(eligibility)),
        None => (
            FraudItem::ko(
                FraudReasonCode::AgeNotValid,
                format!("L'âge de l'utilisateur ({} ans) n'est pas éligible", age),
            ),
            None,
        ),
    }
}

/// Doublon : un autre bénéficiaire avec mêmes nom, prénom et date de naissance
pub fn validate_duplicates(duplicates: &[User], user_id: i64) -> FraudItem {
    let others: Vec<i64> = duplicates
        .iter()
        .filter(|other| other.id != user_id && other.is_beneficiary())
        .map(|other| other.id)
        .collect();
    if others.is_empty() {
        FraudItem::ok()
    } else {
        FraudItem::suspicious(
            FraudReasonCode::DuplicateUser,
            format!("Le compte est un doublon du compte {:?}", others),
        )
    }
}

/// Doublon de numéro de pièce d'identité
pub fn validate_id_piece_number(owner: Option<&User>, user_id: i64) -> FraudItem {
    match owner {
        Some(other) if other.id != user_id => FraudItem::suspicious(
            FraudReasonCode::DuplicateIdPieceNumber,
            format!("Le numéro de pièce d'identité est déjà utilisé par le compte {}", other.id),
        ),
        _ => FraudItem::ok(),
    }
}

/// Agrège les vérifications : le pire statut l'emporte
pub fn aggregate(items: &[FraudItem]) -> (FraudCheckStatus, Vec<String>, Option<String>) {
    let status = if items.iter().any(|item| item.status == FraudCheckStatus::Ko) {
        FraudCheckStatus::Ko
    } else if items.iter().any(|item| item.status == FraudCheckStatus::Suspicious) {
        FraudCheckStatus::Suspicious
    } else {
        FraudCheckStatus::Ok
    };
    let reason_codes = items
        .iter()
        .filter_map(|item| item.reason_code.map(|code| code.as_str().to_string()))
        .collect();
    let details: Vec<&str> = items
        .iter()
        .filter(|item| !item.detail.is_empty())
        .map(|item| item.detail.as_str())
        .collect();
    let reason = if details.is_empty() { None } else { Some(details.join(" ; ")) };
    (status, reason_codes, reason)
}
