//! # API HTTP
//!
//! - `/v2/...` : API publique des partenaires, authentifiée par clé d'API
//! - `/backoffice/...` : outils des agents pass Culture (JWT, rôle `ADMIN`)
//! - `/health` : sonde de santé

pub mod routes;

use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};

use crate::core::{
    BookingService, FraudService, GdprService, OffererService, ReimbursementService, UserService,
};
use crate::infrastructure::connectors::SireneClient;
use crate::infrastructure::{KeyValueCache, ObjectStorage, Repositories, SearchIndexQueue};
use crate::utils::Config;

/// Services partagés par les workers actix
pub struct AppState {
    pub offerers: OffererService,
    pub bookings: BookingService,
    pub reimbursements: ReimbursementService,
    pub fraud: FraudService,
    pub gdpr: GdprService,
    pub users: UserService,
    /// Préfixe d'environnement des clés d'API générées
    pub api_key_prefix: String,
}

impl AppState {
    pub fn new(
        config: &Config,
        repositories: Repositories,
        cache: Arc<dyn KeyValueCache>,
        storage: Arc<dyn ObjectStorage>,
        sirene: Arc<SireneClient>,
    ) -> Self {
        let search_queue = SearchIndexQueue::new(cache.clone());
        Self {
            offerers: OffererService::new(repositories.clone(), sirene, search_queue.clone()),
            bookings: BookingService::new(repositories.clone(), search_queue),
            reimbursements: ReimbursementService::new(repositories.clone()),
            fraud: FraudService::new(repositories.clone()),
            gdpr: GdprService::new(
                repositories.clone(),
                storage,
                cache,
                config.gdpr_max_extract_per_day,
                config.gdpr_lock_timeout_seconds,
            ),
            users: UserService::new(
                repositories,
                config.jwt_secret.clone(),
                config.jwt_access_token_expiry_hours,
            ),
            api_key_prefix: config.run_mode.clone(),
        }
    }
}

/// Configure toutes les routes de l'API
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health_check)));
    routes::config(cfg);
}

/// Endpoint de santé pour les probes Kubernetes/Docker
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "name": crate::NAME,
        "version": crate::VERSION,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::infrastructure::memory::{InMemoryCache, InMemoryStorage, InMemoryStore};
    use actix_web::{test, App};

    /// État applicatif branché sur les implémentations en mémoire
    pub fn test_state(store: &Arc<InMemoryStore>) -> web::Data<AppState> {
        let config = Config::for_tests();
        let sirene = SireneClient::new("http://localhost", None, 1).unwrap();
        web::Data::new(AppState::new(
            &config,
            store.repositories(),
            InMemoryCache::new(),
            InMemoryStorage::new(),
            Arc::new(sirene),
        ))
    }

    #[actix_web::test]
    async fn health_reports_version() {
        let store = InMemoryStore::new();
        let app = test::init_service(App::new().app_data(test_state(&store)).configure(config)).await;
        let body: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], crate::VERSION);
    }
}
