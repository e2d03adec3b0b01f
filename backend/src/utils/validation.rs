// utils/validation.rs
use validator::ValidationError;

use crate::infrastructure::error::{AppError, FieldErrors};

/// SIREN de La Poste, dont les SIRET ne respectent pas la clé de Luhn
const LA_POSTE_SIREN: &str = "356000000";

/// Somme de contrôle de Luhn sur une chaîne de chiffres
fn luhn_checksum_is_valid(digits: &str) -> bool {
    let mut sum = 0;
    for (index, c) in digits.chars().rev().enumerate() {
        let Some(mut digit) = c.to_digit(10) else {
            return false;
        };
        if index % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    sum % 10 == 0
}

fn is_digits(value: &str, expected_len: usize) -> bool {
    value.len() == expected_len && value.chars().all(|c| c.is_ascii_digit())
}

/// Un SIREN est composé de 9 chiffres et respecte la clé de Luhn
pub fn is_valid_siren(siren: &str) -> bool {
    is_digits(siren, 9) && luhn_checksum_is_valid(siren)
}

/// Un SIRET est composé de 14 chiffres ; La Poste utilise une somme multiple de 5
pub fn is_valid_siret(siret: &str) -> bool {
    if !is_digits(siret, 14) {
        return false;
    }
    if siret.starts_with(LA_POSTE_SIREN) {
        let sum: u32 = siret.chars().filter_map(|c| c.to_digit(10)).sum();
        return sum % 5 == 0;
    }
    luhn_checksum_is_valid(siret)
}

/// Validateur `validator` pour les champs SIREN
pub fn validate_siren(siren: &str) -> Result<(), ValidationError> {
    if is_valid_siren(siren) {
        Ok(())
    } else {
        let mut err = ValidationError::new("siren");
        err.message = Some("Le SIREN doit comporter 9 chiffres valides".into());
        Err(err)
    }
}

/// Validateur `validator` pour les champs SIRET
pub fn validate_siret(siret: &str) -> Result<(), ValidationError> {
    if is_valid_siret(siret) {
        Ok(())
    } else {
        let mut err = ValidationError::new("siret");
        err.message = Some("Le SIRET doit comporter 14 chiffres valides".into());
        Err(err)
    }
}

/// Validateur `validator` pour les codes postaux français (métropole et DOM)
pub fn validate_postal_code(postal_code: &str) -> Result<(), ValidationError> {
    let bytes = postal_code.as_bytes();
    // Corse : 2A / 2B
    let valid = is_digits(postal_code, 5)
        || (bytes.len() == 5
            && bytes[0] == b'2'
            && matches!(bytes[1], b'A' | b'B')
            && bytes[2..].iter().all(|b| b.is_ascii_digit()));
    if valid {
        Ok(())
    } else {
        let mut err = ValidationError::new("postal_code");
        err.message = Some("Ce code postal est invalide".into());
        Err(err)
    }
}

/// Accumulateur d'erreurs de formulaire, renvoyées en bloc au format `{"champ": [...]}`
#[derive(Debug, Default)]
pub struct FormErrors {
    errors: FieldErrors,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` s'il n'y a aucune erreur, sinon une erreur 400
    pub fn into_result(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::form(self.errors))
        }
    }
}
