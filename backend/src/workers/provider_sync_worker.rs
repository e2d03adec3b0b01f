// workers/provider_sync_worker.rs
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::core::ProviderSyncService;

/// Synchronise périodiquement les stocks de tous les liens lieu-fournisseur actifs
pub struct ProviderSyncWorker {
    service: Arc<ProviderSyncService>,
    interval: Duration,
}

impl ProviderSyncWorker {
    pub fn new(service: Arc<ProviderSyncService>, interval_seconds: u64) -> Self {
        Self {
            service,
            interval: Duration::from_secs(interval_seconds),
        }
    }

    pub async fn start(self) {
        info!("🔧 Worker de synchronisation des fournisseurs démarré (intervalle {:?})", self.interval);
        loop {
            match self.service.synchronize_all(None).await {
                Ok(report) if report.failures > 0 => {
                    warn!(failures = report.failures, "⚠️ Synchronisation partielle des fournisseurs");
                }
                Ok(_) => {}
                Err(e) => error!("❌ {}", e.log_with_context("synchronisation des fournisseurs")),
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
