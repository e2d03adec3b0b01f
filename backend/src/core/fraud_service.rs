// core/fraud_service.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::fraud::{
    aggregate, validate_age, validate_duplicates, validate_id_piece_number, validate_name,
    BeneficiaryFraudCheck, BeneficiaryFraudResult, BeneficiaryFraudReview, FraudCheckStatus,
    FraudCheckType, FraudError, FraudReviewStatus, IdentityContent, NewFraudCheck, NewFraudReview,
};
use crate::domain::user::{
    deposit_amount, deposit_expiration_date, Deposit, EligibilityType, NewDeposit, User,
};
use crate::infrastructure::database::Repositories;
use crate::infrastructure::error::AppResult;
use crate::utils::helpers::age_at;

/// Dossier de fraude d'un utilisateur, tel qu'affiché dans le backoffice
#[derive(Debug, Clone, Serialize)]
pub struct UserFraudDetails {
    pub user: User,
    pub result: Option<BeneficiaryFraudResult>,
    pub checks: Vec<BeneficiaryFraudCheck>,
    pub reviews: Vec<BeneficiaryFraudReview>,
    pub deposits: Vec<Deposit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRequest {
    pub review: FraudReviewStatus,
    pub reason: String,
    pub eligibility: Option<EligibilityType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub review: BeneficiaryFraudReview,
    pub deposit: Option<Deposit>,
}

pub struct FraudService {
    repositories: Repositories,
}

impl FraudService {
    pub fn new(repositories: Repositories) -> Self {
        Self { repositories }
    }

    pub async fn user_fraud_details(&self, user_id: i64) -> AppResult<UserFraudDetails> {
        let user = self.repositories.users.get_user(user_id).await?;
        Ok(UserFraudDetails {
            result: self.repositories.fraud.get_result(user_id).await?,
            checks: self.repositories.fraud.list_checks(user_id).await?,
            reviews: self.repositories.fraud.list_reviews(user_id).await?,
            deposits: self.repositories.users.list_deposits(user_id).await?,
            user,
        })
    }

    /// Contrôle d'identité : nom, âge, doublons de compte et de pièce
    /// d'identité. Le verdict remplace le précédent ; l'identité n'est
    /// reportée sur le compte que si tout est valide.
    pub async fn run_identity_check(
        &self,
        user_id: i64,
        check_type: FraudCheckType,
        content: &IdentityContent,
    ) -> AppResult<BeneficiaryFraudCheck> {
        if !check_type.is_identity_check() {
            return Err(FraudError::NotAnIdentityCheck(check_type).into());
        }
        let user = self.repositories.users.get_user(user_id).await?;
        let today = Utc::now().date_naive();

        let (age_item, eligibility) = validate_age(content, &user, today);
        let mut items = vec![validate_name(content), age_item];

        if let (Some(first_name), Some(last_name), Some(birth_date)) = (
            content.first_name.as_deref(),
            content.last_name.as_deref(),
            content.birth_date.or(user.birth_date),
        ) {
            let duplicates = self
                .repositories
                .users
                .find_by_identity(first_name, last_name, birth_date)
                .await?;
            items.push(validate_duplicates(&duplicates, user.id));
        }
        if let Some(number) = content.id_piece_number.as_deref() {
            let owner = self.repositories.users.find_by_id_piece_number(number).await?;
            items.push(validate_id_piece_number(owner.as_ref(), user.id));
        }

        let (status, reason_codes, reason) = aggregate(&items);
        let check = self
            .repositories
            .fraud
            .create_check(&NewFraudCheck {
                user_id,
                check_type,
                status,
                reason: reason.clone(),
                reason_codes: reason_codes.clone(),
                result_content: Some(serde_json::to_value(content)?),
                eligibility_type: eligibility,
            })
            .await?;
        self.repositories
            .fraud
            .save_result(user_id, status, reason, reason_codes)
            .await?;

        if status == FraudCheckStatus::Ok {
            self.repositories.users.update_identity(user_id, content).await?;
        } else {
            warn!(user_id, ?status, codes = ?check.reason_codes, "🚩 Contrôle d'identité non concluant");
        }
        info!(user_id, check_id = check.id, ?status, "🔍 Contrôle d'identité enregistré");
        Ok(check)
    }

    /// Revue manuelle d'un dossier ; une revue favorable octroie le crédit
    /// correspondant à l'éligibilité
    pub async fn review(&self, user_id: i64, author_id: i64, request: &ReviewRequest) -> AppResult<ReviewOutcome> {
        let user = self.repositories.users.get_user(user_id).await?;
        let now = Utc::now();

        let eligibility = match request.eligibility {
            Some(eligibility) => Some(eligibility),
            None => self.latest_eligibility(&user).await?,
        };

        // Le crédit est vérifié avant d'enregistrer la revue
        let deposit = if request.review == FraudReviewStatus::Ok {
            let eligibility = eligibility.ok_or(FraudError::NoEligibility)?;
            Some(self.deposit_for(&user, eligibility, author_id, now).await?)
        } else {
            None
        };

        let review = self
            .repositories
            .fraud
            .create_review(&NewFraudReview {
                user_id,
                author_id,
                review: request.review,
                reason: request.reason.clone(),
                eligibility_type: eligibility,
            })
            .await?;

        let deposit = match (deposit, eligibility) {
            (Some(new_deposit), Some(eligibility)) => {
                let deposit = self.repositories.users.create_deposit(&new_deposit).await?;
                let mut roles = user.roles.clone();
                let role = eligibility.role().as_str().to_string();
                if !roles.contains(&role) {
                    roles.push(role);
                }
                self.repositories.users.update_roles(user_id, &roles).await?;
                info!(user_id, amount = %deposit.amount, "🎁 Crédit octroyé après revue manuelle");
                Some(deposit)
            }
            _ => None,
        };

        let status = match request.review {
            FraudReviewStatus::Ok => FraudCheckStatus::Ok,
            FraudReviewStatus::Ko => FraudCheckStatus::Ko,
            FraudReviewStatus::RedirectedToDms => FraudCheckStatus::Pending,
        };
        self.repositories
            .fraud
            .save_result(user_id, status, Some(request.reason.clone()), vec![])
            .await?;
        info!(user_id, author_id, review = ?request.review, "📝 Revue manuelle enregistrée");
        Ok(ReviewOutcome { review, deposit })
    }

    async fn latest_eligibility(&self, user: &User) -> AppResult<Option<EligibilityType>> {
        let checks = self.repositories.fraud.list_checks(user.id).await?;
        let from_checks = checks
            .iter()
            .rev()
            .find_map(|check| check.eligibility_type);
        let from_age = user
            .age(Utc::now().date_naive())
            .and_then(EligibilityType::for_age);
        Ok(from_checks.or(from_age))
    }

    async fn deposit_for(
        &self,
        user: &User,
        eligibility: EligibilityType,
        author_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<NewDeposit> {
        let deposits = self.repositories.users.list_deposits(user.id).await?;
        if deposits.iter().any(|deposit| deposit.expiration_date > now) {
            return Err(FraudError::DepositAlreadyGranted(eligibility).into());
        }
        let birth_date = user.birth_date.ok_or(FraudError::MissingBirthDate)?;
        let age = age_at(birth_date, now.date_naive());
        let amount = match eligibility {
            EligibilityType::Age18 => deposit_amount(18),
            EligibilityType::Underage => deposit_amount(age),
        }
        .ok_or(FraudError::NoDepositForAge(age))?;
        Ok(NewDeposit {
            user_id: user.id,
            amount,
            source: format!("Revue manuelle par l'agent {}", author_id),
            expiration_date: deposit_expiration_date(eligibility, birth_date, now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::tests::user;
    use crate::domain::user::UserRole;
    use crate::infrastructure::memory::InMemoryStore;
    use actix_web::http::StatusCode;
    use chrono::{Datelike, NaiveDate};
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn born_years_ago(years: i32) -> NaiveDate {
        let today = Utc::now().date_naive();
        NaiveDate::from_ymd_opt(today.year() - years, 1, 1).unwrap()
    }

    fn setup(age: i32) -> (Arc<InMemoryStore>, FraudService) {
        let store = InMemoryStore::new();
        let mut u = user(1, "jeanne@example.com");
        u.birth_date = Some(born_years_ago(age));
        store.state().users.push(u);
        let service = FraudService::new(store.repositories());
        (store, service)
    }

    fn identity(first_name: &str, birth_date: NaiveDate, piece: &str) -> IdentityContent {
        IdentityContent {
            first_name: Some(first_name.to_string()),
            last_name: Some("Doux".to_string()),
            birth_date: Some(birth_date),
            id_piece_number: Some(piece.to_string()),
        }
    }

    #[tokio::test]
    async fn valid_identity_is_copied_to_the_account() {
        let (store, service) = setup(18);
        let check = service
            .run_identity_check(1, FraudCheckType::Ubble, &identity("Jeanne", born_years_ago(18), "ID123"))
            .await
            .unwrap();
        assert_eq!(check.status, FraudCheckStatus::Ok);
        assert_eq!(check.eligibility_type, Some(EligibilityType::Age18));
        assert_eq!(store.state().users[0].id_piece_number.as_deref(), Some("ID123"));
        assert_eq!(
            store.state().fraud_results[0].status,
            FraudCheckStatus::Ok
        );
    }

    #[tokio::test]
    async fn duplicate_id_piece_is_suspicious() {
        let (store, service) = setup(18);
        let mut other = user(2, "autre@example.com");
        other.id_piece_number = Some("ID123".to_string());
        store.state().users.push(other);

        let check = service
            .run_identity_check(1, FraudCheckType::Dms, &identity("Jeanne", born_years_ago(18), "ID123"))
            .await
            .unwrap();
        assert_eq!(check.status, FraudCheckStatus::Suspicious);
        assert_eq!(check.reason_codes, vec!["DUPLICATE_ID_PIECE_NUMBER".to_string()]);
        assert!(store.state().users[0].id_piece_number.is_none());
    }

    #[tokio::test]
    async fn declarative_steps_are_not_identity_checks() {
        let (store, service) = setup(18);
        let error = service
            .run_identity_check(1, FraudCheckType::PhoneValidation, &identity("Jeanne", born_years_ago(18), "ID123"))
            .await
            .unwrap_err();
        assert!(error.field_errors().unwrap().contains_key("check_type"));
        assert!(store.state().fraud_checks.is_empty());
    }

    #[tokio::test]
    async fn positive_review_grants_deposit_once() {
        let (store, service) = setup(18);
        let request = ReviewRequest {
            review: FraudReviewStatus::Ok,
            reason: "Pièce vérifiée".to_string(),
            eligibility: None,
        };

        let outcome = service.review(1, 99, &request).await.unwrap();
        assert_eq!(outcome.deposit.unwrap().amount, Decimal::from(300));
        assert!(store.state().users[0].has_role(UserRole::Beneficiary));

        let error = service.review(1, 99, &request).await.unwrap_err();
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert!(error.field_errors().unwrap().contains_key("eligibility"));
        assert_eq!(store.state().fraud_reviews.len(), 1);
    }

    #[tokio::test]
    async fn underage_review_uses_age_amount() {
        let (_, service) = setup(16);
        let outcome = service
            .review(
                1,
                99,
                &ReviewRequest {
                    review: FraudReviewStatus::Ok,
                    reason: "ok".to_string(),
                    eligibility: Some(EligibilityType::Underage),
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.deposit.unwrap().amount, Decimal::from(30));
    }

    #[tokio::test]
    async fn negative_review_records_ko_verdict() {
        let (store, service) = setup(30);
        let outcome = service
            .review(
                1,
                99,
                &ReviewRequest {
                    review: FraudReviewStatus::Ko,
                    reason: "Document falsifié".to_string(),
                    eligibility: None,
                },
            )
            .await
            .unwrap();
        assert!(outcome.deposit.is_none());
        let details = service.user_fraud_details(1).await.unwrap();
        assert_eq!(details.result.unwrap().status, FraudCheckStatus::Ko);
        assert_eq!(details.reviews.len(), 1);
        assert!(store.state().deposits.is_empty());
    }
}
