// core/user_service.rs
use chrono::{Datelike, NaiveDate, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::domain::fraud::{FraudCheckStatus, FraudCheckType, NewFraudCheck};
use crate::domain::user::{
    deposit_amount, deposit_expiration_date, EligibilityType, NewDeposit, NewUser, User, UserRole,
};
use crate::infrastructure::database::Repositories;
use crate::infrastructure::error::{AppError, AppResult};
use crate::utils::security::{generate_access_token, verify_access_token, verify_password, BackofficeClaims};

/// Session backoffice ouverte
#[derive(Debug, Clone, Serialize)]
pub struct AuthToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: User,
}

/// Étape d'inscription atteinte par un utilisateur de test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GeneratedSubscriptionStep {
    EmailValidated,
    PhoneValidated,
    Beneficiary,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GenerateUserRequest {
    #[validate(range(min = 15, max = 18, message = "L'âge doit être compris entre 15 et 18 ans"))]
    pub age: i32,
    pub step: GeneratedSubscriptionStep,
}

pub struct UserService {
    repositories: Repositories,
    jwt_secret: String,
    jwt_expiry_hours: i64,
}

impl UserService {
    pub fn new(repositories: Repositories, jwt_secret: String, jwt_expiry_hours: i64) -> Self {
        Self {
            repositories,
            jwt_secret,
            jwt_expiry_hours,
        }
    }

    /// Connexion d'un agent au backoffice
    pub async fn login(&self, email: &str, password: &str) -> AppResult<AuthToken> {
        let invalid = || AppError::Unauthorized("Identifiants incorrects".to_string());
        let user = self
            .repositories
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(invalid)?;
        let password_hash = user.password_hash.as_deref().ok_or_else(invalid)?;
        if !user.is_active || !verify_password(password, password_hash) {
            warn!(user_id = user.id, "🔒 Échec de connexion au backoffice");
            return Err(invalid());
        }
        if !user.has_role(UserRole::Admin) {
            return Err(AppError::Forbidden(
                "Accès réservé aux agents pass Culture".to_string(),
            ));
        }

        let access_token = generate_access_token(
            user.id,
            &user.email,
            user.roles.clone(),
            &self.jwt_secret,
            self.jwt_expiry_hours,
        )?;
        info!(user_id = user.id, "🔑 Connexion au backoffice");
        Ok(AuthToken {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt_expiry_hours * 3600,
            user,
        })
    }

    /// Vérifie un jeton de session et le rôle `ADMIN`
    pub fn authorize_admin(&self, token: &str) -> AppResult<BackofficeClaims> {
        let claims = verify_access_token(token, &self.jwt_secret)?;
        if !claims.roles.iter().any(|role| role == UserRole::Admin.as_str()) {
            return Err(AppError::Forbidden(
                "Accès réservé aux agents pass Culture".to_string(),
            ));
        }
        Ok(claims)
    }

    /// Crée un utilisateur de test à l'âge et à l'étape d'inscription demandés
    pub async fn generate_test_user(&self, request: &GenerateUserRequest) -> AppResult<User> {
        request.validate()?;
        let today = Utc::now().date_naive();
        let birth_date = birth_date_for_age(request.age, today);
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect::<String>()
            .to_lowercase();

        let new_user = NewUser {
            email: format!("test.{}.{}@passculture.gen", request.age, suffix),
            first_name: Some("Jeanne".to_string()),
            last_name: Some(format!("Test{}", suffix)),
            birth_date: Some(birth_date),
            roles: vec![UserRole::Test],
            password_hash: None,
            is_email_validated: true,
            id_piece_number: None,
            phone_number: match request.step {
                GeneratedSubscriptionStep::EmailValidated => None,
                _ => Some(format!("+3360{:07}", rand::thread_rng().gen_range(0..10_000_000))),
            },
        };
        let mut user = self.repositories.users.create_user(&new_user).await?;

        if request.step == GeneratedSubscriptionStep::Beneficiary {
            let eligibility = EligibilityType::for_age(request.age).ok_or_else(|| {
                AppError::BadRequest(format!("Âge non éligible: {}", request.age))
            })?;
            self.repositories
                .fraud
                .create_check(&NewFraudCheck {
                    user_id: user.id,
                    check_type: FraudCheckType::InternalReview,
                    status: FraudCheckStatus::Ok,
                    reason: Some("Utilisateur de test".to_string()),
                    reason_codes: vec![],
                    result_content: None,
                    eligibility_type: Some(eligibility),
                })
                .await?;
            let amount = deposit_amount(request.age).ok_or_else(|| {
                AppError::BadRequest(format!("Aucun crédit pour {} ans", request.age))
            })?;
            let now = Utc::now();
            self.repositories
                .users
                .create_deposit(&NewDeposit {
                    user_id: user.id,
                    amount,
                    source: "Utilisateur de test".to_string(),
                    expiration_date: deposit_expiration_date(eligibility, birth_date, now),
                })
                .await?;
            user.add_role(eligibility.role());
            self.repositories.users.update_roles(user.id, &user.roles).await?;
        }

        info!(user_id = user.id, age = request.age, step = ?request.step, "🧪 Utilisateur de test créé");
        Ok(user)
    }
}

/// Date de naissance donnant exactement `age` ans aujourd'hui
fn birth_date_for_age(age: i32, today: NaiveDate) -> NaiveDate {
    let year = today.year() - age;
    today
        .with_year(year)
        // 29 février d'une année non bissextile
        .or_else(|| NaiveDate::from_ymd_opt(year, 2, 28))
        .unwrap_or(today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::tests::user;
    use crate::infrastructure::memory::InMemoryStore;
    use crate::utils::helpers::age_at;
    use crate::utils::security::hash_password;
    use actix_web::http::StatusCode;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryStore>, UserService) {
        let store = InMemoryStore::new();
        let mut admin = user(100, "agent@passculture.app");
        admin.password_hash = Some(hash_password("s3cret!").unwrap());
        admin.add_role(UserRole::Admin);
        let mut pro = user(101, "pro@example.com");
        pro.password_hash = Some(hash_password("s3cret!").unwrap());
        pro.add_role(UserRole::Pro);
        store.state().users.extend([admin, pro]);
        let service = UserService::new(store.repositories(), "test-secret".to_string(), 2);
        (store, service)
    }

    #[tokio::test]
    async fn admin_login_issues_verifiable_token() {
        let (_, service) = setup();
        let token = service.login("agent@passculture.app", "s3cret!").await.unwrap();
        assert_eq!(token.expires_in, 7200);
        let claims = service.authorize_admin(&token.access_token).unwrap();
        assert_eq!(claims.sub, 100);

        let wrong = service.login("agent@passculture.app", "nope").await.unwrap_err();
        assert_eq!(wrong.status_code(), StatusCode::UNAUTHORIZED);
        let not_admin = service.login("pro@example.com", "s3cret!").await.unwrap_err();
        assert_eq!(not_admin.status_code(), StatusCode::FORBIDDEN);
        assert!(service.authorize_admin("garbage").is_err());
    }

    #[tokio::test]
    async fn generated_beneficiary_gets_deposit_and_role() {
        let (store, service) = setup();
        let generated = service
            .generate_test_user(&GenerateUserRequest {
                age: 17,
                step: GeneratedSubscriptionStep::Beneficiary,
            })
            .await
            .unwrap();

        assert!(generated.has_role(UserRole::Test));
        assert!(generated.has_role(UserRole::UnderageBeneficiary));
        assert_eq!(age_at(generated.birth_date.unwrap(), Utc::now().date_naive()), 17);
        let state = store.state();
        assert_eq!(state.deposits.len(), 1);
        assert_eq!(state.deposits[0].amount, Decimal::from(30));
        assert_eq!(state.fraud_checks[0].status, FraudCheckStatus::Ok);
    }

    #[tokio::test]
    async fn age_outside_range_is_rejected() {
        let (store, service) = setup();
        let error = service
            .generate_test_user(&GenerateUserRequest {
                age: 21,
                step: GeneratedSubscriptionStep::EmailValidated,
            })
            .await
            .unwrap_err();
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert!(error.field_errors().unwrap().contains_key("age"));
        assert_eq!(store.state().users.len(), 2);
    }

    #[test]
    fn birth_date_on_leap_day() {
        let leap_day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let birth = birth_date_for_age(18, leap_day);
        assert_eq!(age_at(birth, leap_day), 18);
    }
}
