//! Clients des API tierces : SIRENE (INSEE), backend financier Cegid,
//! billetterie cinéma EMS et API de stocks des fournisseurs.

pub mod ems;
pub mod finance_backend;
pub mod provider_api;
pub mod sirene;

use std::time::Duration;

use reqwest::Client as HttpClient;

use crate::infrastructure::error::{AppError, AppResult};

pub use ems::{EmsClient, EmsSchedules};
pub use finance_backend::{FinanceBackend, FinanceBackendClient, FinanceBackendError};
pub use provider_api::{ProviderApiClient, ProviderApiError, ProviderStock};
pub use sirene::{SireneClient, SireneError, SirenInfo, SiretInfo};

/// Client HTTP partagé par les connecteurs, avec un timeout global
pub(crate) fn http_client(timeout_seconds: u64) -> AppResult<HttpClient> {
    HttpClient::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| AppError::ConfigurationError(format!("Client HTTP: {}", e)))
}

/// Retire le `/` final d'une URL de base
pub(crate) fn base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
