// core/reimbursement_service.rs
use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::domain::finance::{
    check_end_date_edit, CustomReimbursementRule, NewCustomRule, MAX_LISTED_RULES,
};
use crate::infrastructure::database::{Repositories, RuleFilter};
use crate::infrastructure::error::{AppError, AppResult};
use crate::utils::helpers::{start_of_day, tomorrow};
use crate::utils::validation::FormErrors;

/// Gestion des tarifs dérogatoires depuis le backoffice
pub struct ReimbursementService {
    repositories: Repositories,
}

impl ReimbursementService {
    pub fn new(repositories: Repositories) -> Self {
        Self { repositories }
    }

    /// Derniers tarifs créés correspondant au filtre
    pub async fn list_rules(&self, filter: &RuleFilter) -> AppResult<Vec<CustomReimbursementRule>> {
        self.repositories
            .finance
            .list_custom_rules(filter, Some(MAX_LISTED_RULES))
            .await
    }

    /// Crée un tarif dérogatoire après validation du formulaire
    ///
    /// Un tarif de lieu n'est possible que sur un point de valorisation, et
    /// ne doit recouvrir aucun tarif existant de la même cible.
    pub async fn create_rule(&self, request: &NewCustomRule) -> AppResult<CustomReimbursementRule> {
        request.check(tomorrow(Utc::now())).into_result()?;

        let mut errors = FormErrors::new();
        self.check_target(request, &mut errors).await?;

        let filter = RuleFilter {
            offerer_id: request.offerer_id,
            venue_id: request.venue_id,
            offer_id: request.offer_id,
        };
        let existing = self.repositories.finance.list_custom_rules(&filter, None).await?;
        let conflicts = request.conflicting_rules(&existing);
        if !conflicts.is_empty() {
            let ids = conflicts
                .iter()
                .map(|rule| rule.id.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            errors.add(
                "global",
                format!(
                    "Ce tarif dérogatoire est en conflit avec le(s) tarif(s) n°{} sur la même période",
                    ids
                ),
            );
        }
        errors.into_result()?;

        let rule = self.repositories.finance.create_custom_rule(request).await?;
        info!(rule_id = rule.id, "💶 Tarif dérogatoire créé");
        Ok(rule)
    }

    async fn check_target(&self, request: &NewCustomRule, errors: &mut FormErrors) -> AppResult<()> {
        if let Some(venue_id) = request.venue_id {
            match self.repositories.offerers.get_venue(venue_id).await {
                Ok(venue) if !venue.is_pricing_point() => errors.add(
                    "venue_id",
                    format!(
                        "Le lieu {} - {} doit être un point de valorisation.",
                        venue.id, venue.name
                    ),
                ),
                Ok(_) => {}
                Err(AppError::NotFound(_)) => errors.add("venue_id", "Ce lieu n'existe pas"),
                Err(e) => return Err(e),
            }
        }
        if let Some(offerer_id) = request.offerer_id {
            match self.repositories.offerers.get_offerer(offerer_id).await {
                Ok(_) => {}
                Err(AppError::NotFound(_)) => {
                    errors.add("offerer_id", "Cette structure n'existe pas")
                }
                Err(e) => return Err(e),
            }
        }
        if let Some(offer_id) = request.offer_id {
            match self.repositories.offers.get_offer(offer_id).await {
                Ok(_) => {}
                Err(AppError::NotFound(_)) => errors.add("offer_id", "Cette offre n'existe pas"),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Seule la date de fin est modifiable, une seule fois, et dans le futur
    pub async fn edit_end_date(
        &self,
        rule_id: i64,
        end_date: NaiveDate,
    ) -> AppResult<CustomReimbursementRule> {
        let rule = self.repositories.finance.get_custom_rule(rule_id).await?;
        check_end_date_edit(&rule, end_date, Utc::now().date_naive()).into_result()?;
        let rule = self
            .repositories
            .finance
            .update_rule_end_date(rule_id, start_of_day(end_date))
            .await?;
        info!(rule_id, %end_date, "💶 Date de fin du tarif dérogatoire modifiée");
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::offerer::tests::{offerer, physical_venue};
    use crate::domain::offerer::NewVenue;
    use crate::infrastructure::database::OffererRepository;
    use crate::infrastructure::memory::InMemoryStore;
    use actix_web::http::StatusCode;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn venue_rule(venue_id: i64, rate_percent: i64) -> NewCustomRule {
        let start = Utc::now().date_naive() + Duration::days(2);
        NewCustomRule {
            offerer_id: None,
            venue_id: Some(venue_id),
            offer_id: None,
            subcategories: vec![],
            rate_percent: Some(Decimal::from(rate_percent)),
            amount: None,
            start_date: start,
            end_date: None,
        }
    }

    async fn setup() -> (Arc<InMemoryStore>, ReimbursementService, i64, i64) {
        let store = InMemoryStore::new();
        store.state().offerers.push(offerer(1, "732829320"));
        let pricing_point = store
            .create_venue(1, &physical_venue("73282932000074"))
            .await
            .unwrap();
        let digital = store.create_venue(1, &NewVenue::digital()).await.unwrap();
        let service = ReimbursementService::new(store.repositories());
        (store, service, pricing_point.id, digital.id)
    }

    #[tokio::test]
    async fn rate_above_hundred_percent_is_rejected() {
        let (store, service, venue_id, _) = setup().await;
        let error = service.create_rule(&venue_rule(venue_id, 120)).await.unwrap_err();
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            error.field_errors().unwrap()["rate"],
            vec!["Doit contenir un nombre inférieur ou égal à 100".to_string()]
        );
        assert!(store.state().rules.is_empty());
    }

    #[tokio::test]
    async fn venue_rule_requires_pricing_point() {
        let (_, service, _, digital_id) = setup().await;
        let error = service.create_rule(&venue_rule(digital_id, 95)).await.unwrap_err();
        assert_eq!(
            error.field_errors().unwrap()["venue_id"],
            vec![format!(
                "Le lieu {} - Offre numérique doit être un point de valorisation.",
                digital_id
            )]
        );
    }

    #[tokio::test]
    async fn overlapping_rule_is_refused() {
        let (_, service, venue_id, _) = setup().await;
        let rule = service.create_rule(&venue_rule(venue_id, 95)).await.unwrap();
        assert_eq!(rule.rate, Some(Decimal::new(95, 2)));

        let error = service.create_rule(&venue_rule(venue_id, 90)).await.unwrap_err();
        assert!(error.field_errors().unwrap().contains_key("global"));
        assert_eq!(service.list_rules(&RuleFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn end_date_can_only_be_set_once() {
        let (_, service, venue_id, _) = setup().await;
        let rule = service.create_rule(&venue_rule(venue_id, 95)).await.unwrap();
        let end = Utc::now().date_naive() + Duration::days(30);

        let edited = service.edit_end_date(rule.id, end).await.unwrap();
        assert_eq!(edited.end_date, Some(start_of_day(end)));

        let error = service
            .edit_end_date(rule.id, end + Duration::days(1))
            .await
            .unwrap_err();
        assert!(error.field_errors().unwrap().contains_key("end_date"));
    }
}
