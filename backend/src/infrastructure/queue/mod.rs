//! File d'attente de réindexation des offres dans le moteur de recherche.
//!
//! Les identifiants sont déposés dans un ensemble Redis, consommé par le
//! service d'indexation.

use std::sync::Arc;

use tracing::debug;

use crate::infrastructure::cache::KeyValueCache;
use crate::infrastructure::error::AppResult;

pub const OFFER_IDS_TO_INDEX_KEY: &str = "search:algolia:offer-ids";
pub const VENUE_IDS_TO_INDEX_KEY: &str = "search:algolia:venue-ids";

#[derive(Clone)]
pub struct SearchIndexQueue {
    cache: Arc<dyn KeyValueCache>,
}

impl SearchIndexQueue {
    pub fn new(cache: Arc<dyn KeyValueCache>) -> Self {
        Self { cache }
    }

    /// Demande la réindexation des offres
    pub async fn enqueue_offer_ids(&self, offer_ids: &[i64]) -> AppResult<()> {
        if offer_ids.is_empty() {
            return Ok(());
        }
        debug!("🔎 {} offre(s) à réindexer", offer_ids.len());
        let members: Vec<String> = offer_ids.iter().map(i64::to_string).collect();
        self.cache.add_to_set(OFFER_IDS_TO_INDEX_KEY, &members).await
    }

    pub async fn enqueue_venue_ids(&self, venue_ids: &[i64]) -> AppResult<()> {
        if venue_ids.is_empty() {
            return Ok(());
        }
        let members: Vec<String> = venue_ids.iter().map(i64::to_string).collect();
        self.cache.add_to_set(VENUE_IDS_TO_INDEX_KEY, &members).await
    }
}
