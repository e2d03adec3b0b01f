// core/provider_sync_service.rs
use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::domain::categories::SEANCE_CINE;
use crate::domain::offer::{NewOffer, NewStock, Offer, Product, Stock, StockUpdate};
use crate::domain::offerer::Venue;
use crate::domain::provider::{
    cinema_offer_reference, cinema_stock_reference, Provider, ProviderError, StockDetail,
    SyncCounters, VenueProvider,
};
use crate::infrastructure::connectors::ems::EmsEvent;
use crate::infrastructure::connectors::{EmsClient, ProviderApiClient};
use crate::infrastructure::database::Repositories;
use crate::infrastructure::error::{AppError, AppResult};
use crate::infrastructure::queue::SearchIndexQueue;

/// Bilan d'une passe de synchronisation sur plusieurs lieux
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub venue_providers: usize,
    pub failures: usize,
    pub counters: SyncCounters,
}

pub struct ProviderSyncService {
    repositories: Repositories,
    search_queue: SearchIndexQueue,
    provider_api: ProviderApiClient,
    ems: EmsClient,
    timeout_seconds: u64,
}

impl ProviderSyncService {
    pub fn new(
        repositories: Repositories,
        search_queue: SearchIndexQueue,
        provider_api: ProviderApiClient,
        ems: EmsClient,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            repositories,
            search_queue,
            provider_api,
            ems,
            timeout_seconds,
        }
    }

    /// Synchronise tous les liens actifs, éventuellement d'un seul fournisseur
    ///
    /// L'échec d'un lieu est journalisé et n'interrompt pas les suivants.
    pub async fn synchronize_all(&self, provider_id: Option<i64>) -> AppResult<SyncReport> {
        let venue_providers = self
            .repositories
            .providers
            .list_active_venue_providers(provider_id)
            .await?;
        info!("🔄 Synchronisation de {} lien(s) lieu-fournisseur", venue_providers.len());

        let mut report = SyncReport {
            venue_providers: venue_providers.len(),
            ..SyncReport::default()
        };
        for venue_provider in venue_providers {
            match self.synchronize_venue_provider(venue_provider.id).await {
                Ok(counters) => report.counters += counters,
                Err(e) => {
                    error!(
                        venue_provider_id = venue_provider.id,
                        "❌ Synchronisation échouée: {}", e
                    );
                    report.failures += 1;
                }
            }
        }
        info!(
            new_offers = report.counters.new_offers,
            new_stocks = report.counters.new_stocks,
            updated_stocks = report.counters.updated_stocks,
            failures = report.failures,
            "✅ Synchronisation terminée"
        );
        Ok(report)
    }

    pub async fn synchronize_venue_provider(&self, venue_provider_id: i64) -> AppResult<SyncCounters> {
        let venue_provider = self
            .repositories
            .providers
            .get_venue_provider(venue_provider_id)
            .await?;
        let provider = self
            .repositories
            .providers
            .get_provider(venue_provider.provider_id)
            .await?;
        if !provider.is_active {
            return Err(AppError::BadRequest(
                ProviderError::InactiveProvider(provider.id).to_string(),
            ));
        }
        if !venue_provider.is_active {
            return Err(AppError::BadRequest(
                ProviderError::InactiveVenueProvider(venue_provider.id).to_string(),
            ));
        }
        let venue = self
            .repositories
            .offerers
            .get_venue(venue_provider.venue_id)
            .await?;

        let counters = if provider.local_class.is_cinema() {
            self.synchronize_cinema(&venue_provider, &provider, &venue).await?
        } else {
            let counters = self
                .synchronize_stock_provider(&venue_provider, &provider, &venue)
                .await?;
            self.repositories
                .providers
                .record_sync(venue_provider.id, Utc::now(), None)
                .await?;
            counters
        };
        debug!(
            venue_provider_id,
            provider = %provider.name,
            ?counters,
            "Lien lieu-fournisseur synchronisé"
        );
        Ok(counters)
    }

    async fn synchronize_stock_provider(
        &self,
        venue_provider: &VenueProvider,
        provider: &Provider,
        venue: &Venue,
    ) -> AppResult<SyncCounters> {
        let api_url = provider.api_url.as_deref().ok_or_else(|| {
            AppError::ConfigurationError(ProviderError::MissingApiUrl(provider.id).to_string())
        })?;
        let venue_reference = venue
            .siret
            .clone()
            .unwrap_or_else(|| venue_provider.venue_id_at_offer_provider.clone());
        let stocks = self
            .provider_api
            .get_all_stocks(api_url, &venue_reference)
            .await?;

        let details: Vec<StockDetail> = stocks
            .into_iter()
            .filter_map(|stock| {
                if stock.reference.trim().is_empty() || stock.available < 0 {
                    warn!(reference = %stock.reference, "⚠️ Stock fournisseur invalide ignoré");
                    return None;
                }
                Some(StockDetail::new(
                    &stock.reference,
                    venue.id,
                    &venue_reference,
                    stock.available,
                    stock.price,
                ))
            })
            .collect();
        self.synchronize_stocks(&details, venue, provider.id).await
    }

    /// Applique les stocks reçus d'un fournisseur de livres ou de disques
    ///
    /// Les références sans produit connu sont ignorées ; offres et stocks ne
    /// sont créés que si du stock est disponible.
    pub async fn synchronize_stocks(
        &self,
        details: &[StockDetail],
        venue: &Venue,
        provider_id: i64,
    ) -> AppResult<SyncCounters> {
        let mut counters = SyncCounters::default();
        if details.is_empty() {
            return Ok(counters);
        }

        let eans: Vec<String> = details
            .iter()
            .map(|detail| detail.products_provider_reference.clone())
            .collect();
        let products: HashMap<String, Product> = self
            .repositories
            .offers
            .find_products_by_eans(&eans)
            .await?
            .into_iter()
            .map(|product| (product.ean.clone(), product))
            .collect();
        let details: Vec<&StockDetail> = details
            .iter()
            .filter(|detail| products.contains_key(&detail.products_provider_reference))
            .collect();

        let offer_references: Vec<String> = details
            .iter()
            .map(|detail| detail.offers_provider_reference.clone())
            .collect();
        let mut offers = self.offers_by_reference(venue.id, &offer_references).await?;

        let mut seen = BTreeSet::new();
        let new_offers: Vec<NewOffer> = details
            .iter()
            .filter(|detail| detail.available_quantity > 0)
            .filter(|detail| !offers.contains_key(&detail.offers_provider_reference))
            .filter(|detail| seen.insert(detail.offers_provider_reference.clone()))
            .filter_map(|detail| {
                let product = products.get(&detail.products_provider_reference)?;
                Some(NewOffer {
                    venue_id: venue.id,
                    product_id: Some(product.id),
                    name: product.name.clone(),
                    subcategory_id: product.subcategory_id.clone(),
                    is_event: false,
                    id_at_provider: Some(detail.offers_provider_reference.clone()),
                    last_provider_id: Some(provider_id),
                })
            })
            .collect();
        let created_offers = self.insert_offers(&new_offers).await?;
        counters.new_offers = created_offers.len();
        let mut to_reindex: BTreeSet<i64> = created_offers.iter().map(|offer| offer.id).collect();
        for offer in created_offers {
            if let Some(reference) = offer.id_at_provider.clone() {
                offers.insert(reference, offer);
            }
        }

        let stock_references: Vec<String> = details
            .iter()
            .map(|detail| detail.stocks_provider_reference.clone())
            .collect();
        let stocks = self.stocks_by_reference(&stock_references).await?;

        let mut updates = Vec::new();
        let mut new_stocks = Vec::new();
        for detail in details {
            match stocks.get(&detail.stocks_provider_reference) {
                Some(stock) => {
                    let price = if detail.price.is_zero() {
                        stock.price
                    } else {
                        detail.price
                    };
                    let was_empty = stock.remaining_quantity().map(|q| q <= 0).unwrap_or(false);
                    if price != stock.price || was_empty != (detail.available_quantity <= 0) {
                        to_reindex.insert(stock.offer_id);
                    }
                    updates.push(StockUpdate {
                        stock_id: stock.id,
                        quantity: Some(detail.available_quantity + stock.dn_booked_quantity),
                        raw_provider_quantity: Some(detail.available_quantity),
                        price,
                        beginning_datetime: None,
                        price_category_id: stock.price_category_id,
                        last_provider_id: Some(provider_id),
                    });
                }
                None if detail.available_quantity > 0 => {
                    let Some(offer) = offers.get(&detail.offers_provider_reference) else {
                        continue;
                    };
                    let price = if detail.price.is_zero() {
                        products
                            .get(&detail.products_provider_reference)
                            .and_then(|product| product.price)
                            .unwrap_or(Decimal::ZERO)
                    } else {
                        detail.price
                    };
                    to_reindex.insert(offer.id);
                    new_stocks.push(NewStock {
                        offer_id: offer.id,
                        price,
                        quantity: Some(detail.available_quantity),
                        beginning_datetime: None,
                        booking_limit_datetime: None,
                        price_category_id: None,
                        id_at_providers: Some(detail.stocks_provider_reference.clone()),
                        raw_provider_quantity: Some(detail.available_quantity),
                        last_provider_id: Some(provider_id),
                    });
                }
                None => {}
            }
        }

        self.repositories.offers.update_stocks(&updates).await?;
        counters.updated_stocks = updates.len();
        counters.new_stocks = self.insert_stocks(&new_stocks).await?.len();

        self.reindex(to_reindex).await;
        Ok(counters)
    }

    /// Un film par offre, une séance par stock, une catégorie par tarif
    async fn synchronize_cinema(
        &self,
        venue_provider: &VenueProvider,
        provider: &Provider,
        venue: &Venue,
    ) -> AppResult<SyncCounters> {
        let client = match &provider.api_url {
            Some(url) => EmsClient::new(url, None, self.timeout_seconds)?,
            None => self.ems.clone(),
        };
        let schedules = client
            .get_schedules(venue_provider.last_sync_version.unwrap_or(0))
            .await?;

        let mut counters = SyncCounters::default();
        if let Some(site) = schedules.site(&venue_provider.venue_id_at_offer_provider) {
            counters = self
                .synchronize_events(&site.events, provider, venue)
                .await?;
        } else {
            debug!(
                site = %venue_provider.venue_id_at_offer_provider,
                "Aucune nouvelle séance pour ce cinéma"
            );
        }

        self.repositories
            .providers
            .record_sync(venue_provider.id, Utc::now(), Some(schedules.version))
            .await?;
        Ok(counters)
    }

    async fn synchronize_events(
        &self,
        events: &[EmsEvent],
        provider: &Provider,
        venue: &Venue,
    ) -> AppResult<SyncCounters> {
        let mut counters = SyncCounters::default();
        let reference = |event: &EmsEvent| cinema_offer_reference(&event.id, venue.id, provider.local_class);

        let offer_references: Vec<String> = events.iter().map(reference).collect();
        let mut offers = self.offers_by_reference(venue.id, &offer_references).await?;
        let new_offers: Vec<NewOffer> = events
            .iter()
            .filter(|event| !offers.contains_key(&reference(event)))
            .map(|event| NewOffer {
                venue_id: venue.id,
                product_id: None,
                name: event.title.clone(),
                subcategory_id: SEANCE_CINE.to_string(),
                is_event: true,
                id_at_provider: Some(reference(event)),
                last_provider_id: Some(provider.id),
            })
            .collect();
        let created_offers = self.insert_offers(&new_offers).await?;
        counters.new_offers = created_offers.len();
        for offer in created_offers {
            if let Some(reference) = offer.id_at_provider.clone() {
                offers.insert(reference, offer);
            }
        }

        let stock_references: Vec<String> = events
            .iter()
            .flat_map(|event| {
                let offer_reference = reference(event);
                event
                    .sessions
                    .iter()
                    .map(move |session| cinema_stock_reference(&offer_reference, &session.id))
            })
            .collect();
        let stocks = self.stocks_by_reference(&stock_references).await?;

        let mut to_reindex = BTreeSet::new();
        let mut updates = Vec::new();
        let mut new_stocks = Vec::new();
        for event in events {
            let offer_reference = reference(event);
            let Some(offer) = offers.get(&offer_reference) else {
                continue;
            };
            for session in &event.sessions {
                let Some(beginning) = session.beginning_datetime() else {
                    warn!(session = %session.id, date = %session.date, "⚠️ Séance sans date valide ignorée");
                    continue;
                };
                let category = self
                    .repositories
                    .offers
                    .find_or_create_price_category(
                        offer.id,
                        &price_category_label(session.pass_culture_price),
                        session.pass_culture_price,
                    )
                    .await?;
                let stock_reference = cinema_stock_reference(&offer_reference, &session.id);
                match stocks.get(&stock_reference) {
                    Some(stock) => {
                        if stock.price != session.pass_culture_price
                            || stock.beginning_datetime != Some(beginning)
                        {
                            to_reindex.insert(offer.id);
                        }
                        updates.push(StockUpdate {
                            stock_id: stock.id,
                            quantity: stock.quantity,
                            raw_provider_quantity: stock.raw_provider_quantity,
                            price: session.pass_culture_price,
                            beginning_datetime: Some(beginning),
                            price_category_id: Some(category.id),
                            last_provider_id: Some(provider.id),
                        });
                    }
                    None => {
                        to_reindex.insert(offer.id);
                        new_stocks.push(NewStock {
                            offer_id: offer.id,
                            price: session.pass_culture_price,
                            quantity: None,
                            beginning_datetime: Some(beginning),
                            booking_limit_datetime: Some(beginning),
                            price_category_id: Some(category.id),
                            id_at_providers: Some(stock_reference),
                            raw_provider_quantity: None,
                            last_provider_id: Some(provider.id),
                        });
                    }
                }
            }
        }

        self.repositories.offers.update_stocks(&updates).await?;
        counters.updated_stocks = updates.len();
        counters.new_stocks = self.insert_stocks(&new_stocks).await?.len();
        self.reindex(to_reindex).await;
        Ok(counters)
    }

    async fn offers_by_reference(
        &self,
        venue_id: i64,
        references: &[String],
    ) -> AppResult<HashMap<String, Offer>> {
        Ok(self
            .repositories
            .offers
            .find_offers_by_provider_references(venue_id, references)
            .await?
            .into_iter()
            .filter_map(|offer| Some((offer.id_at_provider.clone()?, offer)))
            .collect())
    }

    async fn stocks_by_reference(&self, references: &[String]) -> AppResult<HashMap<String, Stock>> {
        Ok(self
            .repositories
            .offers
            .find_stocks_by_provider_references(references)
            .await?
            .into_iter()
            .filter_map(|stock| Some((stock.id_at_providers.clone()?, stock)))
            .collect())
    }

    /// Insertion groupée, puis une à une si le lot échoue
    async fn insert_offers(&self, offers: &[NewOffer]) -> AppResult<Vec<Offer>> {
        if offers.is_empty() {
            return Ok(Vec::new());
        }
        match self.repositories.offers.create_offers(offers).await {
            Ok(created) => Ok(created),
            Err(e) => {
                warn!("⚠️ Lot de {} offre(s) refusé, reprise une à une: {}", offers.len(), e);
                let mut created = Vec::new();
                for offer in offers {
                    match self
                        .repositories
                        .offers
                        .create_offers(std::slice::from_ref(offer))
                        .await
                    {
                        Ok(mut one) => created.append(&mut one),
                        Err(e) => error!(reference = ?offer.id_at_provider, "❌ Offre ignorée: {}", e),
                    }
                }
                Ok(created)
            }
        }
    }

    /// Insertion groupée, puis une à une si le lot échoue
    async fn insert_stocks(&self, stocks: &[NewStock]) -> AppResult<Vec<Stock>> {
        if stocks.is_empty() {
            return Ok(Vec::new());
        }
        match self.repositories.offers.create_stocks(stocks).await {
            Ok(created) => Ok(created),
            Err(e) => {
                warn!("⚠️ Lot de {} stock(s) refusé, reprise un à un: {}", stocks.len(), e);
                let mut created = Vec::new();
                for stock in stocks {
                    match self
                        .repositories
                        .offers
                        .create_stocks(std::slice::from_ref(stock))
                        .await
                    {
                        Ok(mut one) => created.append(&mut one),
                        Err(e) => error!(reference = ?stock.id_at_providers, "❌ Stock ignoré: {}", e),
                    }
                }
                Ok(created)
            }
        }
    }

    async fn reindex(&self, offer_ids: BTreeSet<i64>) {
        let offer_ids: Vec<i64> = offer_ids.into_iter().collect();
        if let Err(e) = self.search_queue.enqueue_offer_ids(&offer_ids).await {
            warn!("⚠️ Réindexation de {} offre(s) impossible: {}", offer_ids.len(), e);
        }
    }
}

fn price_category_label(price: Decimal) -> String {
    format!("Tarif pass Culture {} €", price.normalize().to_string().replace('.', ","))
}
