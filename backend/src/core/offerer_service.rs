// core/offerer_service.rs
use std::io::Read;
use std::sync::Arc;

use actix_web::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::domain::offer::OffererStatistics;
use crate::domain::offerer::{
    check_new_venue, ApiKey, NewOfferer, NewVenue, Offerer, ValidationStatus, Venue,
};
use crate::domain::provider::{NewVenueProvider, ProviderError, VenueProvider};
use crate::infrastructure::connectors::SireneClient;
use crate::infrastructure::database::Repositories;
use crate::infrastructure::error::{AppError, AppResult};
use crate::infrastructure::queue::SearchIndexQueue;
use crate::utils::security::{generate_api_key, sha256_hex, split_api_key};
use crate::utils::validation::is_valid_siren;

/// Ligne du fichier d'import des structures
#[derive(Debug, Clone, Deserialize)]
pub struct OffererImportRow {
    pub siren: String,
    pub name: String,
    pub siret: Option<String>,
    pub venue_name: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
}

impl OffererImportRow {
    fn venue(&self) -> Option<NewVenue> {
        let siret = self.siret.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some(NewVenue {
            name: self
                .venue_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| self.name.clone()),
            siret: Some(siret.to_string()),
            comment: None,
            is_virtual: false,
            address: self.address.clone(),
            postal_code: self.postal_code.clone(),
            city: self.city.clone(),
            booking_email: None,
            iban: None,
            bic: None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub offerers_created: usize,
    pub venues_created: usize,
    /// Erreurs par numéro de ligne (en-tête = ligne 1)
    pub errors: Vec<(usize, String)>,
}

/// Clé d'API nouvellement créée, dont la valeur n'est montrée qu'une fois
#[derive(Debug, Clone, Serialize)]
pub struct CreatedApiKey {
    pub id: i64,
    pub offerer_id: i64,
    pub value: String,
}

pub struct OffererService {
    repositories: Repositories,
    sirene: Arc<SireneClient>,
    search_queue: SearchIndexQueue,
}

impl OffererService {
    pub fn new(
        repositories: Repositories,
        sirene: Arc<SireneClient>,
        search_queue: SearchIndexQueue,
    ) -> Self {
        Self {
            repositories,
            sirene,
            search_queue,
        }
    }

    /// Crée une structure à partir des informations SIRENE de son SIREN
    pub async fn create_offerer_from_siren(&self, siren: &str) -> AppResult<(Offerer, Venue)> {
        if !is_valid_siren(siren) {
            return Err(AppError::api(
                StatusCode::BAD_REQUEST,
                "siren",
                "Le SIREN doit comporter 9 chiffres valides",
            ));
        }
        if self.repositories.offerers.find_offerer_by_siren(siren).await?.is_some() {
            return Err(AppError::api(
                StatusCode::BAD_REQUEST,
                "siren",
                "Une structure avec ce SIREN existe déjà",
            ));
        }

        let siren_info = self.sirene.get_siren(siren).await?;
        if !siren_info.active {
            return Err(AppError::api(
                StatusCode::BAD_REQUEST,
                "siren",
                "Cette entreprise n'est plus active",
            ));
        }

        let new_offerer = NewOfferer {
            name: siren_info.name,
            siren: siren.to_string(),
            validation_status: ValidationStatus::New,
            iban: None,
            bic: None,
        };
        let (offerer, venue) = self
            .repositories
            .offerers
            .create_offerer(&new_offerer, &NewVenue::digital())
            .await?;
        info!(offerer_id = offerer.id, siren = %offerer.siren, "🏢 Structure créée");
        Ok((offerer, venue))
    }

    /// Crée un lieu rattaché à la structure
    pub async fn create_venue(&self, offerer_id: i64, new_venue: &NewVenue) -> AppResult<Venue> {
        new_venue.validate()?;
        let offerer = self.repositories.offerers.get_offerer(offerer_id).await?;
        let existing = self.repositories.offerers.list_venues(offerer_id).await?;
        check_new_venue(&offerer, &existing, new_venue)?;

        if let Some(siret) = &new_venue.siret {
            if self.repositories.offerers.find_venue_by_siret(siret).await?.is_some() {
                return Err(AppError::api(
                    StatusCode::BAD_REQUEST,
                    "siret",
                    "Un lieu avec ce SIRET existe déjà",
                ));
            }
        }

        let venue = self
            .repositories
            .offerers
            .create_venue(offerer_id, new_venue)
            .await?;
        if let Err(e) = self.search_queue.enqueue_venue_ids(&[venue.id]).await {
            warn!("⚠️ Réindexation du lieu {} impossible: {}", venue.id, e);
        }
        info!(offerer_id, venue_id = venue.id, "📍 Lieu créé");
        Ok(venue)
    }

    /// Rattache un lieu de la structure à un fournisseur de stocks
    pub async fn link_venue_provider(
        &self,
        offerer_id: i64,
        venue_id: i64,
        request: &NewVenueProvider,
    ) -> AppResult<VenueProvider> {
        let venue = self.repositories.offerers.get_venue(venue_id).await?;
        if venue.offerer_id != offerer_id {
            return Err(AppError::api(
                StatusCode::FORBIDDEN,
                "global",
                "Vous n'avez pas accès à ce lieu",
            ));
        }

        let provider = self
            .repositories
            .providers
            .get_provider(request.provider_id)
            .await?;
        if !provider.is_active || !provider.enabled_for_pro {
            return Err(AppError::api(
                StatusCode::BAD_REQUEST,
                "provider",
                ProviderError::InactiveProvider(provider.id).to_string(),
            ));
        }

        let venue_reference = request
            .venue_id_at_offer_provider
            .clone()
            .filter(|reference| !reference.trim().is_empty())
            .or_else(|| venue.siret.clone())
            .unwrap_or_else(|| venue.id.to_string());

        let already_linked = self
            .repositories
            .providers
            .list_venue_providers_by_venue(venue.id)
            .await?
            .into_iter()
            .any(|existing| existing.provider_id == provider.id);
        if already_linked {
            return Err(AppError::api(
                StatusCode::BAD_REQUEST,
                "provider",
                "Ce lieu est déjà synchronisé avec ce fournisseur",
            ));
        }

        let venue_provider = self
            .repositories
            .providers
            .create_venue_provider(venue.id, provider.id, &venue_reference)
            .await?;
        info!(venue_id, provider_id = provider.id, "🔗 Lieu rattaché au fournisseur");
        Ok(venue_provider)
    }

    pub async fn generate_api_key(&self, offerer_id: i64, env_prefix: &str) -> AppResult<CreatedApiKey> {
        self.repositories.offerers.get_offerer(offerer_id).await?;
        let generated = generate_api_key(env_prefix);
        let key = self
            .repositories
            .offerers
            .create_api_key(offerer_id, &generated.prefix, &generated.secret_hash)
            .await?;
        Ok(CreatedApiKey {
            id: key.id,
            offerer_id,
            value: generated.clear_value,
        })
    }

    /// Retrouve la clé d'API correspondant à la valeur présentée
    pub async fn authenticate_api_key(&self, value: &str) -> AppResult<ApiKey> {
        let unauthorized = || AppError::Unauthorized("Clé d'API invalide".to_string());
        let (prefix, secret) = split_api_key(value).ok_or_else(unauthorized)?;
        let key = self
            .repositories
            .offerers
            .find_api_key(prefix)
            .await?
            .ok_or_else(unauthorized)?;
        if key.secret_hash != sha256_hex(secret.as_bytes()) {
            return Err(unauthorized());
        }
        Ok(key)
    }

    pub async fn statistics(&self, offerer_id: i64) -> AppResult<OffererStatistics> {
        self.repositories.offers.offerer_statistics(offerer_id).await
    }

    /// Importe des structures et leurs lieux depuis un CSV
    /// `siren,name,siret,venue_name,address,postal_code,city`.
    ///
    /// Les lignes invalides sont rapportées sans interrompre l'import ; en
    /// mode `dry_run` rien n'est écrit.
    pub async fn import_offerers<R: Read>(&self, reader: R, dry_run: bool) -> AppResult<ImportReport> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let rows = csv_reader
            .deserialize::<OffererImportRow>()
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = ImportReport::default();
        for (index, row) in rows.iter().enumerate() {
            let line = index + 2;
            match self.import_row(row, dry_run).await {
                Ok((offerer_created, venue_created)) => {
                    report.offerers_created += usize::from(offerer_created);
                    report.venues_created += usize::from(venue_created);
                }
                Err(e) => {
                    warn!("⚠️ Ligne {} ignorée: {}", line, e);
                    report.errors.push((line, error_message(&e)));
                }
            }
        }

        info!(
            dry_run,
            offerers = report.offerers_created,
            venues = report.venues_created,
            errors = report.errors.len(),
            "📥 Import des structures terminé"
        );
        Ok(report)
    }

    async fn import_row(&self, row: &OffererImportRow, dry_run: bool) -> AppResult<(bool, bool)> {
        let new_offerer = NewOfferer {
            name: row.name.clone(),
            siren: row.siren.clone(),
            validation_status: ValidationStatus::Validated,
            iban: None,
            bic: None,
        };
        new_offerer.validate()?;

        let existing = self
            .repositories
            .offerers
            .find_offerer_by_siren(&row.siren)
            .await?;
        let venue = row.venue();

        // Le lieu est vérifié avant toute écriture de la structure
        if let Some(venue) = &venue {
            venue.validate()?;
            if let Some(siret) = &venue.siret {
                if self.repositories.offerers.find_venue_by_siret(siret).await?.is_some() {
                    return match existing {
                        // Ligne déjà importée
                        Some(_) => Ok((false, false)),
                        None => Err(AppError::api(
                            StatusCode::BAD_REQUEST,
                            "siret",
                            "Un lieu avec ce SIRET existe déjà",
                        )),
                    };
                }
            }
            let (target, venues) = match &existing {
                Some(offerer) => (
                    offerer.clone(),
                    self.repositories.offerers.list_venues(offerer.id).await?,
                ),
                None => (pending_offerer(&new_offerer), Vec::new()),
            };
            check_new_venue(&target, &venues, venue)?;
        }

        let offerer_created = existing.is_none();
        if dry_run {
            return Ok((offerer_created, venue.is_some()));
        }

        let offerer = match existing {
            Some(offerer) => offerer,
            None => {
                self.repositories
                    .offerers
                    .create_offerer(&new_offerer, &NewVenue::digital())
                    .await?
                    .0
            }
        };
        if let Some(venue) = &venue {
            self.repositories.offerers.create_venue(offerer.id, venue).await?;
        }
        Ok((offerer_created, venue.is_some()))
    }
}

/// Structure non enregistrée, utilisée pour valider un import à blanc
fn pending_offerer(new_offerer: &NewOfferer) -> Offerer {
    Offerer {
        id: 0,
        name: new_offerer.name.clone(),
        siren: new_offerer.siren.clone(),
        validation_status: new_offerer.validation_status,
        is_active: true,
        iban: None,
        bic: None,
        date_created: chrono::Utc::now(),
    }
}

fn error_message(error: &AppError) -> String {
    match error.field_errors() {
        Some(errors) => errors
            .into_iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
            .collect::<Vec<_>>()
            .join("; "),
        None => error.to_string(),
    }
}
