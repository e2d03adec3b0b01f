//! Implémentations en mémoire des repositories et des services
//! d'infrastructure, pour les tests des services et des routes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::domain::booking::{Booking, BookingStatus};
use crate::domain::collective::{
    CollectiveBooking, CollectiveBookingStatus, CollectiveOffer, CollectiveStock,
};
use crate::domain::finance::{
    CashflowBatch, CustomReimbursementRule, NewCustomRule, NewPayment, Payment, PaymentMessage,
    PaymentStatus, ReimbursableItem, ReimbursableKind,
};
use crate::domain::fraud::{
    BeneficiaryFraudCheck, BeneficiaryFraudResult, BeneficiaryFraudReview, FraudCheckStatus,
    IdentityContent, NewFraudCheck, NewFraudReview,
};
use crate::domain::gdpr::{expiration_from, GdprUserDataExtract};
use crate::domain::offer::{
    NewOffer, NewStock, Offer, OffererStatistics, PriceCategory, Product, Stock, StockUpdate,
};
use crate::domain::offerer::{ApiKey, NewOfferer, NewVenue, Offerer, Venue};
use crate::domain::provider::{Provider, VenueProvider};
use crate::domain::user::{Deposit, NewDeposit, NewUser, User};
use crate::infrastructure::cache::KeyValueCache;
use crate::infrastructure::connectors::finance_backend::{
    BankAccountPayload, FinanceBackend, FinanceBackendError, InvoicePayload,
};
use crate::infrastructure::database::{
    BookingRepository, BookingTransition, CollectiveBookingTransition, CollectiveRepository,
    FinanceRepository, FraudRepository, GdprRepository, OfferRepository, OffererRepository,
    ProviderRepository, Repositories, RuleFilter, UserRepository,
};
use crate::infrastructure::error::{AppError, AppResult};
use crate::infrastructure::mailer::{Email, EmailProvider};
use crate::infrastructure::storage::ObjectStorage;

/// Contenu de la base simulée ; les tests le remplissent directement
#[derive(Debug, Default)]
pub struct MemoryState {
    sequence: i64,
    pub offerers: Vec<Offerer>,
    pub venues: Vec<Venue>,
    pub api_keys: Vec<ApiKey>,
    pub products: Vec<Product>,
    pub offers: Vec<Offer>,
    pub stocks: Vec<Stock>,
    pub price_categories: Vec<PriceCategory>,
    pub bookings: Vec<Booking>,
    pub collective_offers: Vec<CollectiveOffer>,
    pub collective_stocks: Vec<CollectiveStock>,
    pub collective_bookings: Vec<CollectiveBooking>,
    pub rules: Vec<CustomReimbursementRule>,
    pub batches: Vec<CashflowBatch>,
    pub payments: Vec<Payment>,
    pub payment_messages: Vec<PaymentMessage>,
    pub providers: Vec<Provider>,
    pub venue_providers: Vec<VenueProvider>,
    pub users: Vec<User>,
    pub deposits: Vec<Deposit>,
    pub fraud_checks: Vec<BeneficiaryFraudCheck>,
    pub fraud_results: Vec<BeneficiaryFraudResult>,
    pub fraud_reviews: Vec<BeneficiaryFraudReview>,
    pub extracts: Vec<GdprUserDataExtract>,
    /// Nombre d'écritures groupées de stocks à faire échouer
    pub failing_stock_batches: usize,
}

impl MemoryState {
    /// Identifiant unique, partagé par toutes les tables
    pub fn next_id(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    pub fn repositories(self: &Arc<Self>) -> Repositories {
        Repositories {
            offerers: self.clone(),
            offers: self.clone(),
            bookings: self.clone(),
            collective: self.clone(),
            finance: self.clone(),
            providers: self.clone(),
            users: self.clone(),
            fraud: self.clone(),
            gdpr: self.clone(),
        }
    }
}

fn not_found(resource: &str, id: i64) -> AppError {
    AppError::NotFound(format!("{} {}", resource, id))
}

fn build_venue(id: i64, offerer_id: i64, new_venue: &NewVenue) -> Venue {
    Venue {
        id,
        offerer_id,
        name: new_venue.name.clone(),
        siret: new_venue.siret.clone(),
        comment: new_venue.comment.clone(),
        is_virtual: new_venue.is_virtual,
        address: new_venue.address.clone(),
        postal_code: new_venue.postal_code.clone(),
        city: new_venue.city.clone(),
        booking_email: new_venue.booking_email.clone(),
        iban: new_venue.iban.clone(),
        bic: new_venue.bic.clone(),
        date_created: Utc::now(),
    }
}

fn check_venue_constraints(state: &MemoryState, offerer_id: i64, new_venue: &NewVenue) -> AppResult<()> {
    if new_venue.is_virtual
        && state
            .venues
            .iter()
            .any(|venue| venue.offerer_id == offerer_id && venue.is_virtual)
    {
        return Err(AppError::Conflict("Unique constraint violation".to_string()));
    }
    if let Some(siret) = &new_venue.siret {
        if state.venues.iter().any(|venue| venue.siret.as_ref() == Some(siret)) {
            return Err(AppError::Conflict("Unique constraint violation".to_string()));
        }
    }
    Ok(())
}

#[async_trait]
impl OffererRepository for InMemoryStore {
    async fn get_offerer(&self, offerer_id: i64) -> AppResult<Offerer> {
        self.state()
            .offerers
            .iter()
            .find(|offerer| offerer.id == offerer_id)
            .cloned()
            .ok_or_else(|| not_found("Structure", offerer_id))
    }

    async fn find_offerer_by_siren(&self, siren: &str) -> AppResult<Option<Offerer>> {
        Ok(self
            .state()
            .offerers
            .iter()
            .find(|offerer| offerer.siren == siren)
            .cloned())
    }

    async fn create_offerer(
        &self,
        new_offerer: &NewOfferer,
        digital_venue: &NewVenue,
    ) -> AppResult<(Offerer, Venue)> {
        let mut state = self.state();
        if state.offerers.iter().any(|offerer| offerer.siren == new_offerer.siren) {
            return Err(AppError::Conflict("Unique constraint violation".to_string()));
        }
        let offerer = Offerer {
            id: state.next_id(),
            name: new_offerer.name.clone(),
            siren: new_offerer.siren.clone(),
            validation_status: new_offerer.validation_status,
            is_active: true,
            iban: new_offerer.iban.clone(),
            bic: new_offerer.bic.clone(),
            date_created: Utc::now(),
        };
        let venue_id = state.next_id();
        let venue = build_venue(venue_id, offerer.id, digital_venue);
        state.offerers.push(offerer.clone());
        state.venues.push(venue.clone());
        Ok((offerer, venue))
    }

    async fn get_venue(&self, venue_id: i64) -> AppResult<Venue> {
        self.state()
            .venues
            .iter()
            .find(|venue| venue.id == venue_id)
            .cloned()
            .ok_or_else(|| not_found("Lieu", venue_id))
    }

    async fn list_venues(&self, offerer_id: i64) -> AppResult<Vec<Venue>> {
        Ok(self
            .state()
            .venues
            .iter()
            .filter(|venue| venue.offerer_id == offerer_id)
            .cloned()
            .collect())
    }

    async fn find_venue_by_siret(&self, siret: &str) -> AppResult<Option<Venue>> {
        Ok(self
            .state()
            .venues
            .iter()
            .find(|venue| venue.siret.as_deref() == Some(siret))
            .cloned())
    }

    async fn create_venue(&self, offerer_id: i64, new_venue: &NewVenue) -> AppResult<Venue> {
        let mut state = self.state();
        check_venue_constraints(&state, offerer_id, new_venue)?;
        let id = state.next_id();
        let venue = build_venue(id, offerer_id, new_venue);
        state.venues.push(venue.clone());
        Ok(venue)
    }

    async fn find_api_key(&self, prefix: &str) -> AppResult<Option<ApiKey>> {
        Ok(self
            .state()
            .api_keys
            .iter()
            .find(|key| key.prefix == prefix)
            .cloned())
    }

    async fn create_api_key(
        &self,
        offerer_id: i64,
        prefix: &str,
        secret_hash: &str,
    ) -> AppResult<ApiKey> {
        let mut state = self.state();
        let key = ApiKey {
            id: state.next_id(),
            offerer_id,
            prefix: prefix.to_string(),
            secret_hash: secret_hash.to_string(),
            date_created: Utc::now(),
        };
        state.api_keys.push(key.clone());
        Ok(key)
    }
}

#[async_trait]
impl OfferRepository for InMemoryStore {
    async fn get_offer(&self, offer_id: i64) -> AppResult<Offer> {
        self.state()
            .offers
            .iter()
            .find(|offer| offer.id == offer_id)
            .cloned()
            .ok_or_else(|| not_found("Offre", offer_id))
    }

    async fn get_stock(&self, stock_id: i64) -> AppResult<Stock> {
        self.state()
            .stocks
            .iter()
            .find(|stock| stock.id == stock_id)
            .cloned()
            .ok_or_else(|| not_found("Stock", stock_id))
    }

    async fn find_products_by_eans(&self, eans: &[String]) -> AppResult<Vec<Product>> {
        Ok(self
            .state()
            .products
            .iter()
            .filter(|product| eans.contains(&product.ean))
            .cloned()
            .collect())
    }

    async fn find_offers_by_provider_references(
        &self,
        venue_id: i64,
        references: &[String],
    ) -> AppResult<Vec<Offer>> {
        Ok(self
            .state()
            .offers
            .iter()
            .filter(|offer| {
                offer.venue_id == venue_id
                    && offer
                        .id_at_provider
                        .as_ref()
                        .map(|reference| references.contains(reference))
                        .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn find_stocks_by_provider_references(
        &self,
        references: &[String],
    ) -> AppResult<Vec<Stock>> {
        Ok(self
            .state()
            .stocks
            .iter()
            .filter(|stock| {
                stock
                    .id_at_providers
                    .as_ref()
                    .map(|reference| references.contains(reference))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn create_offers(&self, offers: &[NewOffer]) -> AppResult<Vec<Offer>> {
        let mut state = self.state();
        let duplicate = offers.iter().any(|new_offer| {
            new_offer.id_at_provider.is_some()
                && state.offers.iter().any(|offer| {
                    offer.venue_id == new_offer.venue_id
                        && offer.id_at_provider == new_offer.id_at_provider
                })
        });
        if duplicate {
            return Err(AppError::Conflict("Unique constraint violation".to_string()));
        }

        let now = Utc::now();
        let mut created = Vec::with_capacity(offers.len());
        for new_offer in offers {
            let offer = Offer {
                id: state.next_id(),
                venue_id: new_offer.venue_id,
                product_id: new_offer.product_id,
                name: new_offer.name.clone(),
                subcategory_id: new_offer.subcategory_id.clone(),
                is_active: true,
                is_event: new_offer.is_event,
                id_at_provider: new_offer.id_at_provider.clone(),
                last_provider_id: new_offer.last_provider_id,
                date_created: now,
                date_updated: now,
            };
            state.offers.push(offer.clone());
            created.push(offer);
        }
        Ok(created)
    }

    async fn create_stocks(&self, stocks: &[NewStock]) -> AppResult<Vec<Stock>> {
        let mut state = self.state();
        if stocks.len() > 1 && state.failing_stock_batches > 0 {
            state.failing_stock_batches -= 1;
            return Err(AppError::InternalError("échec simulé du lot".to_string()));
        }
        let duplicate = stocks.iter().any(|new_stock| {
            new_stock.id_at_providers.is_some()
                && state
                    .stocks
                    .iter()
                    .any(|stock| stock.id_at_providers == new_stock.id_at_providers)
        });
        if duplicate {
            return Err(AppError::Conflict("Unique constraint violation".to_string()));
        }

        let mut created = Vec::with_capacity(stocks.len());
        for new_stock in stocks {
            let stock = Stock {
                id: state.next_id(),
                offer_id: new_stock.offer_id,
                price: new_stock.price,
                quantity: new_stock.quantity,
                dn_booked_quantity: 0,
                beginning_datetime: new_stock.beginning_datetime,
                booking_limit_datetime: new_stock.booking_limit_datetime,
                price_category_id: new_stock.price_category_id,
                id_at_providers: new_stock.id_at_providers.clone(),
                raw_provider_quantity: new_stock.raw_provider_quantity,
                last_provider_id: new_stock.last_provider_id,
                is_soft_deleted: false,
                date_modified: Utc::now(),
            };
            state.stocks.push(stock.clone());
            created.push(stock);
        }
        Ok(created)
    }

    async fn update_stocks(&self, updates: &[StockUpdate]) -> AppResult<()> {
        let mut state = self.state();
        for update in updates {
            let stock = state
                .stocks
                .iter_mut()
                .find(|stock| stock.id == update.stock_id)
                .ok_or_else(|| not_found("Stock", update.stock_id))?;
            stock.quantity = update.quantity;
            stock.raw_provider_quantity = update.raw_provider_quantity;
            stock.price = update.price;
            if update.beginning_datetime.is_some() {
                stock.beginning_datetime = update.beginning_datetime;
            }
            if update.price_category_id.is_some() {
                stock.price_category_id = update.price_category_id;
            }
            stock.last_provider_id = update.last_provider_id;
            stock.date_modified = Utc::now();
        }
        Ok(())
    }

    async fn find_or_create_price_category(
        &self,
        offer_id: i64,
        label: &str,
        price: Decimal,
    ) -> AppResult<PriceCategory> {
        let mut state = self.state();
        if let Some(category) = state.price_categories.iter().find(|category| {
            category.offer_id == offer_id && category.label == label && category.price == price
        }) {
            return Ok(category.clone());
        }
        let category = PriceCategory {
            id: state.next_id(),
            offer_id,
            label: label.to_string(),
            price,
        };
        state.price_categories.push(category.clone());
        Ok(category)
    }

    async fn offerer_statistics(&self, offerer_id: i64) -> AppResult<OffererStatistics> {
        let state = self.state();
        let venue_ids: Vec<i64> = state
            .venues
            .iter()
            .filter(|venue| venue.offerer_id == offerer_id)
            .map(|venue| venue.id)
            .collect();
        let active_offers_count = state
            .offers
            .iter()
            .filter(|offer| offer.is_active && venue_ids.contains(&offer.venue_id))
            .count() as i64;

        let bookings: Vec<&Booking> = state
            .bookings
            .iter()
            .filter(|booking| booking.offerer_id == offerer_id)
            .collect();
        let is_used = |booking: &&&Booking| {
            matches!(booking.status, BookingStatus::Used | BookingStatus::Reimbursed)
        };

        Ok(OffererStatistics {
            active_offers_count,
            bookings_count: bookings
                .iter()
                .filter(|booking| booking.status != BookingStatus::Cancelled)
                .count() as i64,
            used_bookings_count: bookings.iter().filter(is_used).count() as i64,
            revenue: bookings
                .iter()
                .filter(is_used)
                .map(|booking| booking.total_amount())
                .sum(),
        })
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn get_booking(&self, booking_id: i64) -> AppResult<Booking> {
        self.state()
            .bookings
            .iter()
            .find(|booking| booking.id == booking_id)
            .cloned()
            .ok_or_else(|| not_found("Réservation", booking_id))
    }

    async fn find_by_token(&self, token: &str) -> AppResult<Option<Booking>> {
        Ok(self
            .state()
            .bookings
            .iter()
            .find(|booking| booking.token == token)
            .cloned())
    }

    async fn list_by_user(&self, user_id: i64) -> AppResult<Vec<Booking>> {
        Ok(self
            .state()
            .bookings
            .iter()
            .filter(|booking| booking.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn apply_booking_transition(
        &self,
        booking_id: i64,
        transition: BookingTransition,
    ) -> AppResult<Booking> {
        let mut state = self.state();
        let booking_index = state
            .bookings
            .iter()
            .position(|booking| booking.id == booking_id)
            .ok_or_else(|| not_found("Réservation", booking_id))?;
        let stock_id = state.bookings[booking_index].stock_id;
        let stock_index = state
            .stocks
            .iter()
            .position(|stock| stock.id == stock_id)
            .ok_or_else(|| not_found("Stock", stock_id))?;

        // Les copies ne sont recopiées qu'en cas de succès
        let mut booking = state.bookings[booking_index].clone();
        let mut stock = state.stocks[stock_index].clone();
        transition(&mut booking, &mut stock)?;

        state.bookings[booking_index] = booking.clone();
        state.stocks[stock_index] = stock;
        Ok(booking)
    }

    async fn list_reimbursable(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<ReimbursableItem>> {
        let state = self.state();
        let mut items: Vec<ReimbursableItem> = state
            .bookings
            .iter()
            .filter(|booking| booking.status == BookingStatus::Used)
            .filter_map(|booking| {
                let date_used = booking.date_used.filter(|date| *date < cutoff)?;
                let offer = state.offers.iter().find(|offer| offer.id == booking.offer_id)?;
                Some(ReimbursableItem {
                    kind: ReimbursableKind::Individual,
                    booking_id: booking.id,
                    token: Some(booking.token.clone()),
                    offer_id: offer.id,
                    offer_name: offer.name.clone(),
                    venue_id: booking.venue_id,
                    offerer_id: booking.offerer_id,
                    subcategory_id: Some(offer.subcategory_id.clone()),
                    quantity: booking.quantity,
                    unit_amount: booking.amount,
                    date_used,
                })
            })
            .collect();
        items.sort_by_key(|item| (item.date_used, item.booking_id));
        Ok(items)
    }

    async fn mark_reimbursed(&self, booking_ids: &[i64], at: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state();
        let mut count = 0;
        for booking in state.bookings.iter_mut() {
            if booking_ids.contains(&booking.id) && booking.status == BookingStatus::Used {
                booking.mark_as_reimbursed(at);
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl CollectiveRepository for InMemoryStore {
    async fn list_offers_by_offerer(&self, offerer_id: i64) -> AppResult<Vec<CollectiveOffer>> {
        let state = self.state();
        Ok(state
            .collective_offers
            .iter()
            .filter(|offer| {
                state
                    .venues
                    .iter()
                    .any(|venue| venue.id == offer.venue_id && venue.offerer_id == offerer_id)
            })
            .cloned()
            .collect())
    }

    async fn list_stocks_by_offer_ids(&self, offer_ids: &[i64]) -> AppResult<Vec<CollectiveStock>> {
        Ok(self
            .state()
            .collective_stocks
            .iter()
            .filter(|stock| offer_ids.contains(&stock.collective_offer_id))
            .cloned()
            .collect())
    }

    async fn get_booking(&self, booking_id: i64) -> AppResult<CollectiveBooking> {
        self.state()
            .collective_bookings
            .iter()
            .find(|booking| booking.id == booking_id)
            .cloned()
            .ok_or_else(|| not_found("Réservation collective", booking_id))
    }

    async fn apply_transition(
        &self,
        booking_id: i64,
        transition: CollectiveBookingTransition,
    ) -> AppResult<CollectiveBooking> {
        let mut state = self.state();
        let booking = state
            .collective_bookings
            .iter_mut()
            .find(|booking| booking.id == booking_id)
            .ok_or_else(|| not_found("Réservation collective", booking_id))?;
        let mut updated = booking.clone();
        transition(&mut updated)?;
        *booking = updated.clone();
        Ok(updated)
    }

    async fn list_reimbursable(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<ReimbursableItem>> {
        let state = self.state();
        let mut items: Vec<ReimbursableItem> = state
            .collective_bookings
            .iter()
            .filter(|booking| booking.status == CollectiveBookingStatus::Used)
            .filter_map(|booking| {
                let date_used = booking.date_used.filter(|date| *date < cutoff)?;
                let offer = state
                    .collective_offers
                    .iter()
                    .find(|offer| offer.id == booking.collective_offer_id)?;
                Some(ReimbursableItem {
                    kind: ReimbursableKind::Collective,
                    booking_id: booking.id,
                    token: None,
                    offer_id: offer.id,
                    offer_name: offer.name.clone(),
                    venue_id: booking.venue_id,
                    offerer_id: booking.offerer_id,
                    subcategory_id: None,
                    quantity: 1,
                    unit_amount: booking.price,
                    date_used,
                })
            })
            .collect();
        items.sort_by_key(|item| (item.date_used, item.booking_id));
        Ok(items)
    }

    async fn mark_reimbursed(&self, booking_ids: &[i64], at: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state();
        let mut count = 0;
        for booking in state.collective_bookings.iter_mut() {
            if booking_ids.contains(&booking.id) && booking.status == CollectiveBookingStatus::Used
            {
                booking.mark_as_reimbursed(at);
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl FinanceRepository for InMemoryStore {
    async fn list_custom_rules(
        &self,
        filter: &RuleFilter,
        limit: Option<i64>,
    ) -> AppResult<Vec<CustomReimbursementRule>> {
        let mut rules: Vec<CustomReimbursementRule> = self
            .state()
            .rules
            .iter()
            .filter(|rule| filter.offerer_id.map_or(true, |id| rule.offerer_id == Some(id)))
            .filter(|rule| filter.venue_id.map_or(true, |id| rule.venue_id == Some(id)))
            .filter(|rule| filter.offer_id.map_or(true, |id| rule.offer_id == Some(id)))
            .cloned()
            .collect();
        rules.sort_by(|a, b| b.id.cmp(&a.id));
        if let Some(limit) = limit {
            rules.truncate(limit.max(0) as usize);
        }
        Ok(rules)
    }

    async fn get_custom_rule(&self, rule_id: i64) -> AppResult<CustomReimbursementRule> {
        self.state()
            .rules
            .iter()
            .find(|rule| rule.id == rule_id)
            .cloned()
            .ok_or_else(|| not_found("Tarif dérogatoire", rule_id))
    }

    async fn create_custom_rule(&self, rule: &NewCustomRule) -> AppResult<CustomReimbursementRule> {
        let mut state = self.state();
        let created = CustomReimbursementRule {
            id: state.next_id(),
            offerer_id: rule.offerer_id,
            venue_id: rule.venue_id,
            offer_id: rule.offer_id,
            subcategories: rule.subcategories.clone(),
            rate: rule.rate(),
            amount: rule.amount,
            start_date: rule.start_datetime(),
            end_date: rule.end_datetime(),
            date_created: Utc::now(),
        };
        state.rules.push(created.clone());
        Ok(created)
    }

    async fn update_rule_end_date(
        &self,
        rule_id: i64,
        end_date: DateTime<Utc>,
    ) -> AppResult<CustomReimbursementRule> {
        let mut state = self.state();
        let rule = state
            .rules
            .iter_mut()
            .find(|rule| rule.id == rule_id)
            .ok_or_else(|| not_found("Tarif dérogatoire", rule_id))?;
        rule.end_date = Some(end_date);
        Ok(rule.clone())
    }

    async fn list_rules_active_since(
        &self,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<CustomReimbursementRule>> {
        Ok(self
            .state()
            .rules
            .iter()
            .filter(|rule| rule.end_date.map_or(true, |end| end > since))
            .cloned()
            .collect())
    }

    async fn venue_yearly_revenue_cents(&self, venue_id: i64, year: i32) -> AppResult<i64> {
        let state = self.state();
        Ok(state
            .payments
            .iter()
            .filter(|payment| payment.venue_id == venue_id && payment.status == PaymentStatus::Sent)
            .filter(|payment| {
                state.bookings.iter().any(|booking| {
                    Some(booking.id) == payment.booking_id
                        && booking.date_used.map(|date| date.year()) == Some(year)
                })
            })
            .map(|payment| payment.booking_total_cents)
            .sum())
    }

    async fn create_cashflow_batch(&self, cutoff: DateTime<Utc>) -> AppResult<CashflowBatch> {
        let mut state = self.state();
        let batch = CashflowBatch {
            id: state.next_id(),
            label: format!("VIR{}", state.batches.len() + 1),
            cutoff,
            date_created: Utc::now(),
        };
        state.batches.push(batch.clone());
        Ok(batch)
    }

    async fn save_payments(&self, batch_id: i64, payments: &[NewPayment]) -> AppResult<Vec<Payment>> {
        let mut state = self.state();
        state.payments.retain(|payment| {
            payment.status == PaymentStatus::Sent
                || !payments.iter().any(|new_payment| {
                    (new_payment.booking_id.is_some() && payment.booking_id == new_payment.booking_id)
                        || (new_payment.collective_booking_id.is_some()
                            && payment.collective_booking_id == new_payment.collective_booking_id)
                })
        });
        let duplicate = payments.iter().any(|new_payment| {
            state.payments.iter().any(|payment| {
                (new_payment.booking_id.is_some() && payment.booking_id == new_payment.booking_id)
                    || (new_payment.collective_booking_id.is_some()
                        && payment.collective_booking_id == new_payment.collective_booking_id)
            })
        });
        if duplicate {
            return Err(AppError::Conflict("Unique constraint violation".to_string()));
        }

        let mut saved = Vec::with_capacity(payments.len());
        for new_payment in payments {
            let payment = Payment {
                id: state.next_id(),
                batch_id,
                booking_id: new_payment.booking_id,
                collective_booking_id: new_payment.collective_booking_id,
                venue_id: new_payment.venue_id,
                booking_total_cents: new_payment.booking_total_cents,
                amount_cents: new_payment.amount_cents,
                rate: new_payment.rate,
                rule_description: new_payment.rule_description.clone(),
                custom_rule_id: new_payment.custom_rule_id,
                iban: new_payment.iban.clone(),
                bic: new_payment.bic.clone(),
                recipient_siren: new_payment.recipient_siren.clone(),
                recipient_name: new_payment.recipient_name.clone(),
                status: new_payment.status,
                date_created: Utc::now(),
            };
            state.payments.push(payment.clone());
            saved.push(payment);
        }
        Ok(saved)
    }

    async fn mark_payments_sent(&self, payment_ids: &[i64]) -> AppResult<()> {
        for payment in self.state().payments.iter_mut() {
            if payment_ids.contains(&payment.id) {
                payment.status = PaymentStatus::Sent;
            }
        }
        Ok(())
    }

    async fn save_payment_message(
        &self,
        batch_id: i64,
        name: &str,
        checksum: &str,
    ) -> AppResult<PaymentMessage> {
        let mut state = self.state();
        if state.payment_messages.iter().any(|message| message.name == name) {
            return Err(AppError::Conflict("Unique constraint violation".to_string()));
        }
        let message = PaymentMessage {
            id: state.next_id(),
            batch_id,
            name: name.to_string(),
            checksum: checksum.to_string(),
            date_created: Utc::now(),
        };
        state.payment_messages.push(message.clone());
        Ok(message)
    }
}

#[async_trait]
impl ProviderRepository for InMemoryStore {
    async fn get_provider(&self, provider_id: i64) -> AppResult<Provider> {
        self.state()
            .providers
            .iter()
            .find(|provider| provider.id == provider_id)
            .cloned()
            .ok_or_else(|| not_found("Fournisseur", provider_id))
    }

    async fn get_venue_provider(&self, venue_provider_id: i64) -> AppResult<VenueProvider> {
        self.state()
            .venue_providers
            .iter()
            .find(|venue_provider| venue_provider.id == venue_provider_id)
            .cloned()
            .ok_or_else(|| not_found("Lien lieu-fournisseur", venue_provider_id))
    }

    async fn list_active_venue_providers(
        &self,
        provider_id: Option<i64>,
    ) -> AppResult<Vec<VenueProvider>> {
        let state = self.state();
        Ok(state
            .venue_providers
            .iter()
            .filter(|venue_provider| venue_provider.is_active)
            .filter(|venue_provider| provider_id.map_or(true, |id| venue_provider.provider_id == id))
            .filter(|venue_provider| {
                state
                    .providers
                    .iter()
                    .any(|provider| provider.id == venue_provider.provider_id && provider.is_active)
            })
            .cloned()
            .collect())
    }

    async fn list_venue_providers_by_venue(&self, venue_id: i64) -> AppResult<Vec<VenueProvider>> {
        Ok(self
            .state()
            .venue_providers
            .iter()
            .filter(|venue_provider| venue_provider.venue_id == venue_id)
            .cloned()
            .collect())
    }

    async fn create_venue_provider(
        &self,
        venue_id: i64,
        provider_id: i64,
        venue_id_at_offer_provider: &str,
    ) -> AppResult<VenueProvider> {
        let mut state = self.state();
        if state.venue_providers.iter().any(|venue_provider| {
            venue_provider.venue_id == venue_id
                && venue_provider.provider_id == provider_id
                && venue_provider.venue_id_at_offer_provider == venue_id_at_offer_provider
        }) {
            return Err(AppError::Conflict("Unique constraint violation".to_string()));
        }
        let venue_provider = VenueProvider {
            id: state.next_id(),
            venue_id,
            provider_id,
            venue_id_at_offer_provider: venue_id_at_offer_provider.to_string(),
            is_active: true,
            last_sync_date: None,
            last_sync_version: None,
            date_created: Utc::now(),
        };
        state.venue_providers.push(venue_provider.clone());
        Ok(venue_provider)
    }

    async fn record_sync(
        &self,
        venue_provider_id: i64,
        at: DateTime<Utc>,
        version: Option<i64>,
    ) -> AppResult<()> {
        let mut state = self.state();
        let venue_provider = state
            .venue_providers
            .iter_mut()
            .find(|venue_provider| venue_provider.id == venue_provider_id)
            .ok_or_else(|| not_found("Lien lieu-fournisseur", venue_provider_id))?;
        venue_provider.last_sync_date = Some(at);
        if version.is_some() {
            venue_provider.last_sync_version = version;
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn get_user(&self, user_id: i64) -> AppResult<User> {
        self.state()
            .users
            .iter()
            .find(|user| user.id == user_id)
            .cloned()
            .ok_or_else(|| not_found("Utilisateur", user_id))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self
            .state()
            .users
            .iter()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_user(&self, new_user: &NewUser) -> AppResult<User> {
        let mut state = self.state();
        if state
            .users
            .iter()
            .any(|user| user.email.eq_ignore_ascii_case(&new_user.email))
        {
            return Err(AppError::Conflict("Email déjà utilisé".to_string()));
        }
        let user = User {
            id: state.next_id(),
            email: new_user.email.clone(),
            first_name: new_user.first_name.clone(),
            last_name: new_user.last_name.clone(),
            birth_date: new_user.birth_date,
            roles: new_user
                .roles
                .iter()
                .map(|role| role.as_str().to_string())
                .collect(),
            password_hash: new_user.password_hash.clone(),
            is_active: true,
            is_email_validated: new_user.is_email_validated,
            id_piece_number: new_user.id_piece_number.clone(),
            phone_number: new_user.phone_number.clone(),
            date_created: Utc::now(),
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn update_roles(&self, user_id: i64, roles: &[String]) -> AppResult<()> {
        if let Some(user) = self.state().users.iter_mut().find(|user| user.id == user_id) {
            user.roles = roles.to_vec();
        }
        Ok(())
    }

    async fn update_identity(&self, user_id: i64, identity: &IdentityContent) -> AppResult<()> {
        if let Some(user) = self.state().users.iter_mut().find(|user| user.id == user_id) {
            if identity.first_name.is_some() {
                user.first_name = identity.first_name.clone();
            }
            if identity.last_name.is_some() {
                user.last_name = identity.last_name.clone();
            }
            if identity.birth_date.is_some() {
                user.birth_date = identity.birth_date;
            }
            if identity.id_piece_number.is_some() {
                user.id_piece_number = identity.id_piece_number.clone();
            }
        }
        Ok(())
    }

    async fn find_by_identity(
        &self,
        first_name: &str,
        last_name: &str,
        birth_date: NaiveDate,
    ) -> AppResult<Vec<User>> {
        let matches = |value: &Option<String>, expected: &str| {
            value
                .as_deref()
                .map(|value| value.to_lowercase() == expected.to_lowercase())
                .unwrap_or(false)
        };
        Ok(self
            .state()
            .users
            .iter()
            .filter(|user| {
                matches(&user.first_name, first_name)
                    && matches(&user.last_name, last_name)
                    && user.birth_date == Some(birth_date)
            })
            .cloned()
            .collect())
    }

    async fn find_by_id_piece_number(&self, id_piece_number: &str) -> AppResult<Option<User>> {
        Ok(self
            .state()
            .users
            .iter()
            .find(|user| user.id_piece_number.as_deref() == Some(id_piece_number))
            .cloned())
    }

    async fn list_deposits(&self, user_id: i64) -> AppResult<Vec<Deposit>> {
        Ok(self
            .state()
            .deposits
            .iter()
            .filter(|deposit| deposit.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_deposit(&self, deposit: &NewDeposit) -> AppResult<Deposit> {
        let mut state = self.state();
        let created = Deposit {
            id: state.next_id(),
            user_id: deposit.user_id,
            amount: deposit.amount,
            source: deposit.source.clone(),
            date_created: Utc::now(),
            expiration_date: deposit.expiration_date,
        };
        state.deposits.push(created.clone());
        Ok(created)
    }
}

#[async_trait]
impl FraudRepository for InMemoryStore {
    async fn list_checks(&self, user_id: i64) -> AppResult<Vec<BeneficiaryFraudCheck>> {
        Ok(self
            .state()
            .fraud_checks
            .iter()
            .filter(|check| check.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_check(&self, check: &NewFraudCheck) -> AppResult<BeneficiaryFraudCheck> {
        let mut state = self.state();
        let created = BeneficiaryFraudCheck {
            id: state.next_id(),
            user_id: check.user_id,
            check_type: check.check_type,
            status: check.status,
            reason: check.reason.clone(),
            reason_codes: check.reason_codes.clone(),
            result_content: check.result_content.clone(),
            eligibility_type: check.eligibility_type,
            date_created: Utc::now(),
        };
        state.fraud_checks.push(created.clone());
        Ok(created)
    }

    async fn list_reviews(&self, user_id: i64) -> AppResult<Vec<BeneficiaryFraudReview>> {
        Ok(self
            .state()
            .fraud_reviews
            .iter()
            .filter(|review| review.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_review(&self, review: &NewFraudReview) -> AppResult<BeneficiaryFraudReview> {
        let mut state = self.state();
        let created = BeneficiaryFraudReview {
            id: state.next_id(),
            user_id: review.user_id,
            author_id: review.author_id,
            review: review.review,
            reason: review.reason.clone(),
            eligibility_type: review.eligibility_type,
            date_reviewed: Utc::now(),
        };
        state.fraud_reviews.push(created.clone());
        Ok(created)
    }

    async fn get_result(&self, user_id: i64) -> AppResult<Option<BeneficiaryFraudResult>> {
        Ok(self
            .state()
            .fraud_results
            .iter()
            .find(|result| result.user_id == user_id)
            .cloned())
    }

    async fn save_result(
        &self,
        user_id: i64,
        status: FraudCheckStatus,
        reason: Option<String>,
        reason_codes: Vec<String>,
    ) -> AppResult<BeneficiaryFraudResult> {
        let mut state = self.state();
        if let Some(result) = state
            .fraud_results
            .iter_mut()
            .find(|result| result.user_id == user_id)
        {
            result.status = status;
            result.reason = reason;
            result.reason_codes = reason_codes;
            return Ok(result.clone());
        }
        let result = BeneficiaryFraudResult {
            id: state.next_id(),
            user_id,
            status,
            reason,
            reason_codes,
            date_created: Utc::now(),
        };
        state.fraud_results.push(result.clone());
        Ok(result)
    }
}

#[async_trait]
impl GdprRepository for InMemoryStore {
    async fn create_extract(
        &self,
        user_id: i64,
        author_user_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<GdprUserDataExtract> {
        let mut state = self.state();
        let extract = GdprUserDataExtract {
            id: state.next_id(),
            user_id,
            author_user_id,
            date_created: now,
            date_processed: None,
            expiration_date: expiration_from(now),
        };
        state.extracts.push(extract.clone());
        Ok(extract)
    }

    async fn get_extract(&self, extract_id: i64) -> AppResult<GdprUserDataExtract> {
        self.state()
            .extracts
            .iter()
            .find(|extract| extract.id == extract_id)
            .cloned()
            .ok_or_else(|| not_found("Extraction", extract_id))
    }

    async fn list_extracts(&self, limit: i64) -> AppResult<Vec<GdprUserDataExtract>> {
        let mut extracts = self.state().extracts.clone();
        extracts.sort_by(|a, b| b.date_created.cmp(&a.date_created).then(b.id.cmp(&a.id)));
        extracts.truncate(limit.max(0) as usize);
        Ok(extracts)
    }

    async fn find_active_for_user(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Option<GdprUserDataExtract>> {
        Ok(self
            .state()
            .extracts
            .iter()
            .find(|extract| extract.user_id == user_id && !extract.is_expired(now))
            .cloned())
    }

    async fn list_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<GdprUserDataExtract>> {
        let mut pending: Vec<GdprUserDataExtract> = self
            .state()
            .extracts
            .iter()
            .filter(|extract| !extract.is_processed() && !extract.is_expired(now))
            .cloned()
            .collect();
        pending.sort_by_key(|extract| (extract.date_created, extract.id));
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn mark_processed(&self, extract_id: i64, at: DateTime<Utc>) -> AppResult<bool> {
        let mut state = self.state();
        match state
            .extracts
            .iter_mut()
            .find(|extract| extract.id == extract_id && extract.date_processed.is_none())
        {
            Some(extract) => {
                extract.date_processed = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<GdprUserDataExtract>> {
        Ok(self
            .state()
            .extracts
            .iter()
            .filter(|extract| extract.is_expired(now))
            .cloned()
            .collect())
    }

    async fn delete_extract(&self, extract_id: i64) -> AppResult<()> {
        self.state().extracts.retain(|extract| extract.id != extract_id);
        Ok(())
    }

    async fn list_ids(&self) -> AppResult<Vec<i64>> {
        Ok(self.state().extracts.iter().map(|extract| extract.id).collect())
    }
}

/// Cache clé-valeur en mémoire ; les TTL sont mémorisés mais n'expirent pas
#[derive(Debug, Default)]
pub struct InMemoryCache {
    values: Mutex<HashMap<String, String>>,
    ttls: Mutex<HashMap<String, u64>>,
    sets: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl InMemoryCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_members(&self, key: &str) -> Vec<String> {
        self.sets
            .lock()
            .unwrap()
            .get(key)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn ttl(&self, key: &str) -> Option<u64> {
        self.ttls.lock().unwrap().get(key).copied()
    }
}

#[async_trait]
impl KeyValueCache for InMemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> AppResult<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        self.ttls.lock().unwrap().insert(key.to_string(), ttl_seconds);
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> AppResult<bool> {
        let mut values = self.values.lock().unwrap();
        if values.contains_key(key) {
            return Ok(false);
        }
        values.insert(key.to_string(), value.to_string());
        self.ttls.lock().unwrap().insert(key.to_string(), ttl_seconds);
        Ok(true)
    }

    async fn incr(&self, key: &str) -> AppResult<i64> {
        let mut values = self.values.lock().unwrap();
        let current: i64 = values
            .get(key)
            .and_then(|value| value.parse().ok())
            .unwrap_or(0);
        values.insert(key.to_string(), (current + 1).to_string());
        Ok(current + 1)
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> AppResult<()> {
        self.ttls.lock().unwrap().insert(key.to_string(), ttl_seconds);
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.values.lock().unwrap().remove(key);
        self.ttls.lock().unwrap().remove(key);
        self.sets.lock().unwrap().remove(key);
        Ok(())
    }

    async fn add_to_set(&self, key: &str, members: &[String]) -> AppResult<()> {
        self.sets
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .extend(members.iter().cloned());
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    failing_uploads: AtomicBool,
}

impl InMemoryStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Simule un stockage indisponible pour les dépôts suivants
    pub fn fail_uploads(&self, failing: bool) {
        self.failing_uploads.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn put(&self, key: &str, content: Vec<u8>, _content_type: &str) -> AppResult<()> {
        if self.failing_uploads.load(Ordering::SeqCst) {
            return Err(AppError::InfrastructureError(format!("Dépôt de {} impossible", key)));
        }
        self.objects.lock().unwrap().insert(key.to_string(), content);
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Fichier {}", key)))
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> AppResult<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Fournisseur d'email qui conserve les messages envoyés
#[derive(Debug, Default)]
pub struct RecordingEmailProvider {
    sent: Mutex<Vec<Email>>,
}

impl RecordingEmailProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailProvider for RecordingEmailProvider {
    async fn send(&self, email: &Email) -> AppResult<()> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingFinanceBackend {
    pub bank_accounts: Mutex<Vec<BankAccountPayload>>,
    pub invoices: Mutex<Vec<InvoicePayload>>,
}

impl RecordingFinanceBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl FinanceBackend for RecordingFinanceBackend {
    async fn push_bank_account(
        &self,
        payload: &BankAccountPayload,
    ) -> Result<String, FinanceBackendError> {
        self.bank_accounts.lock().unwrap().push(payload.clone());
        Ok(format!("BA-{}", payload.venue_id))
    }

    async fn push_invoice(&self, payload: &InvoicePayload) -> Result<String, FinanceBackendError> {
        self.invoices.lock().unwrap().push(payload.clone());
        Ok(format!("INV-{}", payload.reference))
    }
}
