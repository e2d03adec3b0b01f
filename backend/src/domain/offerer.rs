use actix_web::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::infrastructure::error::AppError;
use crate::utils::validation::{validate_postal_code, validate_siren, validate_siret};

/// Statut de validation d'une structure par l'équipe pass Culture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    New,
    Pending,
    Validated,
    Rejected,
}

/// Structure (entité juridique) proposant des offres culturelles
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Offerer {
    pub id: i64,
    pub name: String,
    pub siren: String,
    pub validation_status: ValidationStatus,
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub iban: Option<String>,
    #[serde(skip_serializing)]
    pub bic: Option<String>,
    pub date_created: DateTime<Utc>,
}

/// Données requises pour créer une structure
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewOfferer {
    #[validate(length(min = 1, max = 140, message = "Le nom de la structure est requis"))]
    pub name: String,
    #[validate(custom = "validate_siren")]
    pub siren: String,
    pub validation_status: ValidationStatus,
    pub iban: Option<String>,
    pub bic: Option<String>,
}

/// Lieu (physique ou numérique) rattaché à une structure
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Venue {
    pub id: i64,
    pub offerer_id: i64,
    pub name: String,
    pub siret: Option<String>,
    pub comment: Option<String>,
    pub is_virtual: bool,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub booking_email: Option<String>,
    #[serde(skip_serializing)]
    pub iban: Option<String>,
    #[serde(skip_serializing)]
    pub bic: Option<String>,
    pub date_created: DateTime<Utc>,
}

/// Coordonnées bancaires utilisées pour les virements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankAccount {
    pub iban: String,
    pub bic: String,
}

impl Venue {
    /// Un lieu avec SIRET est un point de valorisation : il peut porter un
    /// tarif dérogatoire et reçoit les remboursements de ses offres
    pub fn is_pricing_point(&self) -> bool {
        !self.is_virtual && self.siret.is_some()
    }

    /// Compte bancaire du lieu, ou à défaut celui de sa structure
    pub fn bank_account(&self, offerer: &Offerer) -> Option<BankAccount> {
        let from_pair = |iban: &Option<String>, bic: &Option<String>| match (iban, bic) {
            (Some(iban), Some(bic)) if !iban.is_empty() && !bic.is_empty() => Some(BankAccount {
                iban: iban.clone(),
                bic: bic.clone(),
            }),
            _ => None,
        };
        from_pair(&self.iban, &self.bic).or_else(|| from_pair(&offerer.iban, &offerer.bic))
    }
}

/// Données requises pour créer un lieu physique
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewVenue {
    #[validate(length(min = 1, max = 140, message = "Le nom du lieu est requis"))]
    pub name: String,
    #[validate(custom = "validate_siret")]
    pub siret: Option<String>,
    pub comment: Option<String>,
    #[serde(default)]
    pub is_virtual: bool,
    pub address: Option<String>,
    #[validate(custom = "validate_postal_code")]
    pub postal_code: Option<String>,
    pub city: Option<String>,
    #[validate(email(message = "L'adresse email de réservation est invalide"))]
    pub booking_email: Option<String>,
    pub iban: Option<String>,
    pub bic: Option<String>,
}

impl NewVenue {
    /// Lieu numérique créé automatiquement avec chaque structure
    pub fn digital() -> Self {
        Self {
            name: "Offre numérique".to_string(),
            siret: None,
            comment: None,
            is_virtual: true,
            address: None,
            postal_code: None,
            city: None,
            booking_email: None,
            iban: None,
            bic: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VenueError {
    #[error("Un lieu numérique ne peut pas avoir de SIRET")]
    VirtualVenueWithSiret,
    #[error("Cette structure a déjà un lieu numérique")]
    VirtualVenueAlreadyExists,
    #[error("Un lieu physique doit avoir soit un SIRET soit un commentaire")]
    MissingSiretOrComment,
    #[error("Un lieu ne peut pas avoir à la fois un SIRET et un commentaire")]
    SiretAndComment,
    #[error("Le code SIREN doit correspondre aux 9 premiers chiffres du SIRET")]
    SiretDoesNotMatchSiren,
    #[error("Un lieu physique doit avoir une adresse complète")]
    MissingAddress,
}

impl VenueError {
    /// Champ du formulaire concerné par l'erreur
    pub fn field(&self) -> &'static str {
        match self {
            VenueError::VirtualVenueWithSiret
            | VenueError::SiretDoesNotMatchSiren
            | VenueError::SiretAndComment => "siret",
            VenueError::VirtualVenueAlreadyExists => "is_virtual",
            VenueError::MissingSiretOrComment => "comment",
            VenueError::MissingAddress => "address",
        }
    }
}

impl From<VenueError> for AppError {
    fn from(error: VenueError) -> Self {
        AppError::api(StatusCode::BAD_REQUEST, error.field(), error.to_string())
    }
}

/// Vérifie les invariants d'un nouveau lieu au regard des lieux existants de
/// la structure
pub fn check_new_venue(
    offerer: &Offerer,
    existing_venues: &[Venue],
    new_venue: &NewVenue,
) -> Result<(), VenueError> {
    let has_siret = new_venue.siret.as_deref().map(|s| !s.is_empty()).unwrap_or(false);
    let has_comment = new_venue.comment.as_deref().map(|c| !c.trim().is_empty()).unwrap_or(false);

    if new_venue.is_virtual {
        if has_siret {
            return Err(VenueError::VirtualVenueWithSiret);
        }
        if existing_venues.iter().any(|venue| venue.is_virtual) {
            return Err(VenueError::VirtualVenueAlreadyExists);
        }
        return Ok(());
    }

    match (has_siret, has_comment) {
        (false, false) => return Err(VenueError::MissingSiretOrComment),
        (true, true) => return Err(VenueError::SiretAndComment),
        _ => {}
    }

    if let Some(siret) = new_venue.siret.as_deref().filter(|s| !s.is_empty()) {
        if !siret.starts_with(&offerer.siren) {
            return Err(VenueError::SiretDoesNotMatchSiren);
        }
    }

    let missing = |value: &Option<String>| value.as_deref().map(str::is_empty).unwrap_or(true);
    if missing(&new_venue.address) || missing(&new_venue.postal_code) || missing(&new_venue.city) {
        return Err(VenueError::MissingAddress);
    }

    Ok(())
}

/// Clé d'API d'une structure (le secret n'est conservé que sous forme hashée)
#[derive(Debug, Clone, FromRow)]
pub struct ApiKey {
    pub id: i64,
    pub offerer_id: i64,
    pub prefix: String,
    pub secret_hash: String,
    pub date_created: DateTime<Utc>,
}
