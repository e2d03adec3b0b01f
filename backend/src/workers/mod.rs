//! # Workers Module
//!
//! Tâches de fond lancées avec le serveur HTTP (`ENABLE_WORKERS=true`) :
//! - `gdpr_worker.rs` : exports RGPD en attente et purge des archives
//! - `provider_sync_worker.rs` : synchronisation des stocks des fournisseurs
//!
//! Chaque worker est une boucle tokio qui journalise ses erreurs et
//! reprend au cycle suivant.

pub mod gdpr_worker;
pub mod provider_sync_worker;

pub use gdpr_worker::GdprWorker;
pub use provider_sync_worker::ProviderSyncWorker;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::core::{GdprService, ProviderSyncService};
use crate::utils::Config;

/// Démarre les workers en arrière-plan
pub fn spawn_workers(
    config: &Config,
    gdpr: Arc<GdprService>,
    provider_sync: Arc<ProviderSyncService>,
) -> Vec<JoinHandle<()>> {
    info!("🚀 Démarrage des workers background");
    vec![
        tokio::spawn(GdprWorker::new(gdpr, config.gdpr_worker_interval_seconds).start()),
        tokio::spawn(
            ProviderSyncWorker::new(provider_sync, config.provider_sync_interval_seconds).start(),
        ),
    ]
}
