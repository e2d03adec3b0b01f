//! Backend financier (Cegid) : synchronisation des coordonnées bancaires
//! des lieux et des factures de remboursement.
//!
//! L'API fonctionne par cookie de session obtenu via `POST /login`. Le
//! cookie est conservé dans Redis avec un TTL ; une réponse 401 force son
//! renouvellement puis la requête est rejouée une seule fois.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::infrastructure::cache::KeyValueCache;
use crate::infrastructure::connectors::http_client;
use crate::infrastructure::error::{AppError, AppResult};
use crate::utils::config::Config;

const COOKIE_CACHE_KEY: &str = "cache:finance-backend:cookie";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FinanceBackendError {
    #[error("Authentification refusée par le backend financier")]
    Unauthorized,
    #[error("Erreur du backend financier: {0}")]
    Api(String),
}

impl From<FinanceBackendError> for AppError {
    fn from(error: FinanceBackendError) -> Self {
        AppError::ConnectionError(error.to_string())
    }
}

impl From<AppError> for FinanceBackendError {
    fn from(error: AppError) -> Self {
        FinanceBackendError::Api(error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankAccountPayload {
    pub venue_id: i64,
    pub label: String,
    pub iban: String,
    pub bic: String,
}

/// Facture de remboursement d'un lieu pour un lot de virements
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoicePayload {
    pub reference: String,
    pub venue_id: i64,
    pub siret: Option<String>,
    pub amount_cents: i64,
    pub booking_count: usize,
    pub batch_label: String,
}

#[derive(Debug, Deserialize)]
struct CreatedResource {
    id: String,
}

#[async_trait]
pub trait FinanceBackend: Send + Sync {
    /// Crée ou met à jour les coordonnées bancaires d'un lieu ; renvoie
    /// l'identifiant côté backend
    async fn push_bank_account(
        &self,
        payload: &BankAccountPayload,
    ) -> Result<String, FinanceBackendError>;
    async fn push_invoice(&self, payload: &InvoicePayload) -> Result<String, FinanceBackendError>;
}

pub struct FinanceBackendClient {
    http_client: HttpClient,
    base_url: String,
    user: String,
    password: String,
    cache: Arc<dyn KeyValueCache>,
    cookie_ttl_seconds: u64,
}

impl FinanceBackendClient {
    pub fn new(config: &Config, cache: Arc<dyn KeyValueCache>) -> AppResult<Self> {
        Ok(Self {
            http_client: http_client(config.provider_api_timeout_seconds)?,
            base_url: super::base_url(&config.finance_backend_url),
            user: config.finance_backend_user.clone(),
            password: config.finance_backend_password.clone(),
            cache,
            cookie_ttl_seconds: config.finance_backend_cookie_ttl_seconds,
        })
    }

    /// Cookie de session, pris dans le cache sauf si `force_refresh`
    async fn session_cookie(&self, force_refresh: bool) -> Result<String, FinanceBackendError> {
        if !force_refresh {
            if let Some(cookie) = self.cache.get(COOKIE_CACHE_KEY).await? {
                return Ok(cookie);
            }
        }

        debug!("🔑 Connexion au backend financier");
        let response = self
            .http_client
            .post(format!("{}/login", self.base_url))
            .json(&serde_json::json!({ "user": self.user, "password": self.password }))
            .send()
            .await
            .map_err(|e| FinanceBackendError::Api(e.to_string()))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(FinanceBackendError::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(FinanceBackendError::Api(format!(
                "login HTTP {}",
                response.status().as_u16()
            )));
        }

        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(str::to_string)
            .ok_or_else(|| FinanceBackendError::Api("cookie de session absent".to_string()))?;

        self.cache
            .set_ex(COOKIE_CACHE_KEY, &cookie, self.cookie_ttl_seconds)
            .await?;
        Ok(cookie)
    }

    async fn post<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<String, FinanceBackendError> {
        let mut force_refresh = false;
        loop {
            let cookie = self.session_cookie(force_refresh).await?;
            let response = self
                .http_client
                .post(format!("{}/{}", self.base_url, path))
                .header(COOKIE, cookie)
                .json(body)
                .send()
                .await
                .map_err(|e| FinanceBackendError::Api(e.to_string()))?;

            match response.status() {
                StatusCode::UNAUTHORIZED if !force_refresh => {
                    warn!("⚠️ Cookie du backend financier expiré, renouvellement");
                    force_refresh = true;
                }
                StatusCode::UNAUTHORIZED => return Err(FinanceBackendError::Unauthorized),
                status if status.is_success() => {
                    let created: CreatedResource = response
                        .json()
                        .await
                        .map_err(|e| FinanceBackendError::Api(e.to_string()))?;
                    return Ok(created.id);
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(FinanceBackendError::Api(format!(
                        "{} HTTP {}: {}",
                        path,
                        status.as_u16(),
                        body
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl FinanceBackend for FinanceBackendClient {
    async fn push_bank_account(
        &self,
        payload: &BankAccountPayload,
    ) -> Result<String, FinanceBackendError> {
        let id = self.post("bank-accounts", payload).await?;
        info!("🏦 Coordonnées bancaires du lieu {} synchronisées ({})", payload.venue_id, id);
        Ok(id)
    }

    async fn push_invoice(&self, payload: &InvoicePayload) -> Result<String, FinanceBackendError> {
        let id = self.post("invoices", payload).await?;
        info!("🧾 Facture {} transmise ({})", payload.reference, id);
        Ok(id)
    }
}
