use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::utils::helpers::{age_at, start_of_day};

/// Rôles d'un utilisateur, stockés sous forme de texte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Beneficiary,
    UnderageBeneficiary,
    Pro,
    Admin,
    Test,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Beneficiary => "BENEFICIARY",
            UserRole::UnderageBeneficiary => "UNDERAGE_BENEFICIARY",
            UserRole::Pro => "PRO",
            UserRole::Admin => "ADMIN",
            UserRole::Test => "TEST",
        }
    }
}

/// Représente un utilisateur (bénéficiaire, partenaire ou agent pass Culture)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub roles: Vec<String>,
    /// Hash du mot de passe (jamais exposé dans les APIs)
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub is_email_validated: bool,
    pub id_piece_number: Option<String>,
    pub phone_number: Option<String>,
    pub date_created: DateTime<Utc>,
}

impl User {
    pub fn has_role(&self, role: UserRole) -> bool {
        self.roles.iter().any(|r| r == role.as_str())
    }

    pub fn is_beneficiary(&self) -> bool {
        self.has_role(UserRole::Beneficiary) || self.has_role(UserRole::UnderageBeneficiary)
    }

    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }

    pub fn age(&self, today: NaiveDate) -> Option<i32> {
        self.birth_date.map(|birth_date| age_at(birth_date, today))
    }

    pub fn add_role(&mut self, role: UserRole) {
        if !self.has_role(role) {
            self.roles.push(role.as_str().to_string());
        }
    }
}

/// Données requises pour créer un utilisateur
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub roles: Vec<UserRole>,
    pub password_hash: Option<String>,
    pub is_email_validated: bool,
    pub id_piece_number: Option<String>,
    pub phone_number: Option<String>,
}

/// Éligibilité au pass Culture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EligibilityType {
    /// 15 à 17 ans
    Underage,
    /// 18 ans
    Age18,
}

impl EligibilityType {
    /// Éligibilité selon l'âge à une date donnée
    pub fn for_age(age: i32) -> Option<Self> {
        match age {
            15..=17 => Some(EligibilityType::Underage),
            18 => Some(EligibilityType::Age18),
            _ => None,
        }
    }

    pub fn role(&self) -> UserRole {
        match self {
            EligibilityType::Underage => UserRole::UnderageBeneficiary,
            EligibilityType::Age18 => UserRole::Beneficiary,
        }
    }
}

/// Montant du crédit octroyé selon l'âge
pub fn deposit_amount(age: i32) -> Option<Decimal> {
    match age {
        15 => Some(Decimal::from(20)),
        16 | 17 => Some(Decimal::from(30)),
        18 => Some(Decimal::from(300)),
        _ => None,
    }
}

/// Date d'expiration du crédit : 2 ans pour le crédit 18 ans, veille des
/// 18 ans pour le crédit jeune
pub fn deposit_expiration_date(
    eligibility: EligibilityType,
    birth_date: NaiveDate,
    granted_at: DateTime<Utc>,
) -> DateTime<Utc> {
    match eligibility {
        EligibilityType::Age18 => granted_at + Duration::days(2 * 365),
        EligibilityType::Underage => {
            let eighteenth = birth_date
                .with_year(birth_date.year() + 18)
                .unwrap_or(birth_date + Duration::days(18 * 365));
            start_of_day(eighteenth)
        }
    }
}

/// Crédit octroyé à un bénéficiaire
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Deposit {
    pub id: i64,
    pub user_id: i64,
    pub amount: Decimal,
    pub source: String,
    pub date_created: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDeposit {
    pub user_id: i64,
    pub amount: Decimal,
    pub source: String,
    pub expiration_date: DateTime<Utc>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn user(id: i64, email: &str) -> User {
        User {
            id,
            email: email.to_string(),
            first_name: Some("Jeanne".to_string()),
            last_name: Some("Doux".to_string()),
            birth_date: NaiveDate::from_ymd_opt(2006, 1, 15),
            roles: vec![],
            password_hash: None,
            is_active: true,
            is_email_validated: true,
            id_piece_number: None,
            phone_number: None,
            date_created: Utc::now(),
        }
    }

    #[test]
    fn eligibility_by_age() {
        assert_eq!(EligibilityType::for_age(14), None);
        assert_eq!(EligibilityType::for_age(15), Some(EligibilityType::Underage));
        assert_eq!(EligibilityType::for_age(18), Some(EligibilityType::Age18));
        assert_eq!(EligibilityType::for_age(19), None);
    }

    #[test]
    fn deposit_amounts() {
        assert_eq!(deposit_amount(15), Some(Decimal::from(20)));
        assert_eq!(deposit_amount(17), Some(Decimal::from(30)));
        assert_eq!(deposit_amount(18), Some(Decimal::from(300)));
        assert_eq!(deposit_amount(19), None);
    }

    #[test]
    fn underage_deposit_expires_at_eighteen() {
        let birth = NaiveDate::from_ymd_opt(2008, 4, 2).unwrap();
        let expiration = deposit_expiration_date(EligibilityType::Underage, birth, Utc::now());
        assert_eq!(expiration.date_naive(), NaiveDate::from_ymd_opt(2026, 4, 2).unwrap());
    }

    #[test]
    fn roles_are_not_duplicated() {
        let mut u = user(1, "jeanne@example.com");
        u.add_role(UserRole::Beneficiary);
        u.add_role(UserRole::Beneficiary);
        assert_eq!(u.roles, vec!["BENEFICIARY".to_string()]);
        assert!(u.is_beneficiary());
        assert_eq!(u.full_name(), "Jeanne Doux");
    }
}
