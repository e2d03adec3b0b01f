// core/gdpr_service.rs
use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::gdpr::{
    archive_key, GdprDataContainer, GdprError, GdprUser, GdprUserDataExtract,
};
use crate::infrastructure::cache::KeyValueCache;
use crate::infrastructure::database::Repositories;
use crate::infrastructure::error::AppResult;
use crate::infrastructure::storage::ObjectStorage;

pub const GDPR_EXTRACT_LOCK_KEY: &str = "gdpr:extract-data:lock";
pub const GDPR_EXTRACT_COUNTER_KEY: &str = "gdpr:extract-data:counter";
const GDPR_EXTRACT_PREFIX: &str = "gdpr-extracts/";
/// Candidats parmi lesquels l'extraction suivante est tirée au sort
const CANDIDATES_LIMIT: i64 = 10;
const LISTED_EXTRACTS_LIMIT: i64 = 100;

/// Bilan du nettoyage des exports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub expired: usize,
    pub orphans: usize,
}

/// Compteur quotidien des extractions, remis à zéro entre 00:00 et 00:10 UTC
struct DailyCounter<'a> {
    cache: &'a dyn KeyValueCache,
    max_value: i64,
}

impl DailyCounter<'_> {
    async fn reset_if_needed(&self, now: DateTime<Utc>) -> AppResult<()> {
        if now.hour() == 0 && now.minute() < 10 {
            debug!("Remise à zéro du compteur d'extractions");
            self.cache.delete(GDPR_EXTRACT_COUNTER_KEY).await?;
        }
        Ok(())
    }

    async fn is_full(&self) -> AppResult<bool> {
        let current = self
            .cache
            .get(GDPR_EXTRACT_COUNTER_KEY)
            .await?
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(0);
        Ok(current >= self.max_value)
    }

    async fn increment(&self) -> AppResult<()> {
        self.cache.incr(GDPR_EXTRACT_COUNTER_KEY).await.map(|_| ())
    }
}

pub struct GdprService {
    repositories: Repositories,
    storage: Arc<dyn ObjectStorage>,
    cache: Arc<dyn KeyValueCache>,
    max_extract_per_day: i64,
    lock_timeout_seconds: u64,
}

impl GdprService {
    pub fn new(
        repositories: Repositories,
        storage: Arc<dyn ObjectStorage>,
        cache: Arc<dyn KeyValueCache>,
        max_extract_per_day: i64,
        lock_timeout_seconds: u64,
    ) -> Self {
        Self {
            repositories,
            storage,
            cache,
            max_extract_per_day,
            lock_timeout_seconds,
        }
    }

    /// Demande d'export faite par un agent ; une seule demande active par
    /// utilisateur
    pub async fn request_extract(&self, user_id: i64, author_user_id: i64) -> AppResult<GdprUserDataExtract> {
        let now = Utc::now();
        self.repositories.users.get_user(user_id).await?;
        if let Some(active) = self
            .repositories
            .gdpr
            .find_active_for_user(user_id, now)
            .await?
        {
            if !active.is_processed() {
                return Err(GdprError::ExtractAlreadyRequested.into());
            }
        }
        let extract = self
            .repositories
            .gdpr
            .create_extract(user_id, author_user_id, now)
            .await?;
        info!(extract_id = extract.id, user_id, author_user_id, "📦 Export RGPD demandé");
        Ok(extract)
    }

    pub async fn list_extracts(&self) -> AppResult<Vec<GdprUserDataExtract>> {
        self.repositories.gdpr.list_extracts(LISTED_EXTRACTS_LIMIT).await
    }

    /// Archive d'un export traité et non expiré : `(nom de fichier, contenu)`
    pub async fn download_extract(&self, extract_id: i64) -> AppResult<(String, Vec<u8>)> {
        let extract = self.repositories.gdpr.get_extract(extract_id).await?;
        if extract.is_expired(Utc::now()) {
            return Err(GdprError::Expired(extract_id).into());
        }
        if !extract.is_processed() {
            return Err(GdprError::NotProcessed(extract_id).into());
        }
        let content = self.storage.get(&extract.archive_key()).await?;
        Ok((format!("{}.zip", extract.id), content))
    }

    /// Rassemble les données de l'utilisateur dans `<email>.json`, zippé et
    /// déposé sous `<id>.zip`
    pub async fn extract_beneficiary_data(&self, extract: &GdprUserDataExtract) -> AppResult<()> {
        if extract.is_processed() {
            return Err(GdprError::AlreadyProcessed(extract.id).into());
        }
        let now = Utc::now();
        let user = self.repositories.users.get_user(extract.user_id).await?;
        let container = GdprDataContainer {
            generation_date: now,
            user: GdprUser {
                id: user.id,
                email: user.email.clone(),
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
                birth_date: user.birth_date,
                phone_number: user.phone_number.clone(),
                roles: user.roles.clone(),
                is_active: user.is_active,
                date_created: user.date_created,
            },
            deposits: self.repositories.users.list_deposits(user.id).await?,
            bookings: self.repositories.bookings.list_by_user(user.id).await?,
            fraud_checks: self.repositories.fraud.list_checks(user.id).await?,
            fraud_reviews: self.repositories.fraud.list_reviews(user.id).await?,
        };
        let json = serde_json::to_string_pretty(&container)?;
        let archive = zip_single_file(&format!("{}.json", user.email), json.as_bytes())?;

        // La demande n'est marquée traitée qu'une fois l'archive déposée
        self.storage
            .put(&extract.archive_key(), archive, "application/zip")
            .await?;
        if !self.repositories.gdpr.mark_processed(extract.id, now).await? {
            warn!(extract_id = extract.id, "⚠️ Demande traitée entre-temps par un autre processus");
            return Err(GdprError::AlreadyProcessed(extract.id).into());
        }
        info!(extract_id = extract.id, user_id = user.id, "✅ Export RGPD généré");
        Ok(())
    }

    /// Traite au plus une demande ; `false` quand rien n'a été fait
    pub async fn extract_beneficiary_data_command(&self) -> AppResult<bool> {
        self.extract_next(Utc::now()).await
    }

    pub(crate) async fn extract_next(&self, now: DateTime<Utc>) -> AppResult<bool> {
        let counter = DailyCounter {
            cache: self.cache.as_ref(),
            max_value: self.max_extract_per_day,
        };
        counter.reset_if_needed(now).await?;

        if !self
            .cache
            .set_nx_ex(GDPR_EXTRACT_LOCK_KEY, "locked", self.lock_timeout_seconds)
            .await?
        {
            debug!("Extraction RGPD déjà en cours");
            return Ok(false);
        }

        let result = self.extract_random_candidate(&counter, now).await;
        if let Err(e) = self.cache.delete(GDPR_EXTRACT_LOCK_KEY).await {
            warn!("⚠️ Libération du verrou RGPD impossible: {}", e);
        }
        result
    }

    async fn extract_random_candidate(&self, counter: &DailyCounter<'_>, now: DateTime<Utc>) -> AppResult<bool> {
        if counter.is_full().await? {
            info!("{}", GdprError::DailyQuotaReached);
            return Ok(false);
        }
        let candidates = self
            .repositories
            .gdpr
            .list_pending(now, CANDIDATES_LIMIT)
            .await?;
        // Tirage au sort pour ne pas rester bloqué sur une demande en erreur
        let picked = {
            let mut rng = rand::thread_rng();
            candidates.choose(&mut rng).cloned()
        };
        let Some(extract) = picked else {
            return Ok(false);
        };
        self.extract_beneficiary_data(&extract).await?;
        counter.increment().await?;
        Ok(true)
    }

    /// Supprime les exports expirés et les archives sans demande associée
    pub async fn clean_gdpr_extracts(&self) -> AppResult<CleanReport> {
        let mut report = CleanReport::default();

        let known: BTreeSet<i64> = self.repositories.gdpr.list_ids().await?.into_iter().collect();
        for key in self.storage.list_keys(GDPR_EXTRACT_PREFIX).await? {
            let Some(extract_id) = extract_id_from_key(&key) else {
                continue;
            };
            if !known.contains(&extract_id) {
                self.storage.delete(&key).await?;
                report.orphans += 1;
            }
        }

        for extract in self.repositories.gdpr.list_expired(Utc::now()).await? {
            self.storage.delete(&archive_key(extract.id)).await?;
            self.repositories.gdpr.delete_extract(extract.id).await?;
            report.expired += 1;
        }
        info!(expired = report.expired, orphans = report.orphans, "🧹 Exports RGPD nettoyés");
        Ok(report)
    }
}

fn extract_id_from_key(key: &str) -> Option<i64> {
    Path::new(key).file_stem()?.to_str()?.parse().ok()
}

fn zip_single_file(name: &str, content: &[u8]) -> AppResult<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    writer.start_file(name, options)?;
    writer.write_all(content)?;
    Ok(writer.finish()?.into_inner())
}
