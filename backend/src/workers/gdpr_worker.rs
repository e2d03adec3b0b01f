// workers/gdpr_worker.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, info};

use crate::core::GdprService;
use crate::infrastructure::error::AppResult;

/// Traite les demandes d'export RGPD en attente et purge les archives
/// expirées une fois par jour
pub struct GdprWorker {
    service: Arc<GdprService>,
    interval: Duration,
    last_clean: Option<NaiveDate>,
}

impl GdprWorker {
    pub fn new(service: Arc<GdprService>, interval_seconds: u64) -> Self {
        Self {
            service,
            interval: Duration::from_secs(interval_seconds),
            last_clean: None,
        }
    }

    pub async fn start(mut self) {
        info!("🔧 Worker RGPD démarré (intervalle {:?})", self.interval);
        loop {
            if let Err(e) = self.run_cycle(Utc::now()).await {
                error!("❌ {}", e.log_with_context("cycle RGPD"));
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Une demande traitée au plus par cycle, dans la limite du quota journalier
    async fn run_cycle(&mut self, now: DateTime<Utc>) -> AppResult<bool> {
        let processed = self.service.extract_next(now).await?;

        let today = now.date_naive();
        if self.last_clean != Some(today) {
            self.service.clean_gdpr_extracts().await?;
            self.last_clean = Some(today);
        }
        Ok(processed)
    }
}
