use reqwest::Client as HttpClient;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::infrastructure::connectors::http_client;
use crate::infrastructure::error::AppError;

/// Nombre de références demandées par page
pub const PROVIDER_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderApiError {
    #[error("Client HTTP invalide: {0}")]
    Client(String),
    #[error("Le fournisseur n'a pas répondu à temps")]
    Timeout,
    #[error("Fournisseur injoignable: {0}")]
    Connection(String),
    #[error("Le fournisseur a répondu HTTP {0}")]
    Status(u16),
    #[error("Réponse du fournisseur illisible: {0}")]
    InvalidPayload(String),
}

impl ProviderApiError {
    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ProviderApiError::Timeout
        } else if error.is_connect() {
            ProviderApiError::Connection(error.to_string())
        } else {
            ProviderApiError::InvalidPayload(error.to_string())
        }
    }
}

impl From<ProviderApiError> for AppError {
    fn from(error: ProviderApiError) -> Self {
        match error {
            ProviderApiError::Timeout => AppError::Timeout(error.to_string()),
            ProviderApiError::Client(message) => AppError::ConfigurationError(message),
            other => AppError::ConnectionError(other.to_string()),
        }
    }
}

/// Stock d'une référence (EAN) chez le fournisseur
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderStock {
    #[serde(rename = "ref")]
    pub reference: String,
    pub available: i32,
    #[serde(default)]
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
struct StocksPage {
    #[serde(default)]
    stocks: Vec<ProviderStock>,
}

/// Client de l'API de stocks générique (libraires, Titelive)
#[derive(Clone)]
pub struct ProviderApiClient {
    http_client: HttpClient,
    page_size: usize,
}

impl ProviderApiClient {
    pub fn new(timeout_seconds: u64) -> Result<Self, ProviderApiError> {
        Ok(Self {
            http_client: http_client(timeout_seconds)
                .map_err(|e| ProviderApiError::Client(e.to_string()))?,
            page_size: PROVIDER_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Une page de stocks, à partir de la référence qui suit `after`
    pub async fn get_stocks_page(
        &self,
        api_url: &str,
        venue_reference: &str,
        after: Option<&str>,
    ) -> Result<Vec<ProviderStock>, ProviderApiError> {
        let mut query = vec![("limit", self.page_size.to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }

        let response = self
            .http_client
            .get(format!(
                "{}/{}",
                super::base_url(api_url),
                urlencoding::encode(venue_reference)
            ))
            .query(&query)
            .send()
            .await
            .map_err(ProviderApiError::from_reqwest)?;

        if !response.status().is_success() {
            return Err(ProviderApiError::Status(response.status().as_u16()));
        }

        let page: StocksPage = response
            .json()
            .await
            .map_err(|e| ProviderApiError::InvalidPayload(e.to_string()))?;
        debug!("📚 {} stock(s) reçus pour {}", page.stocks.len(), venue_reference);
        Ok(page.stocks)
    }

    /// Parcourt toutes les pages jusqu'à une page incomplète
    pub async fn get_all_stocks(
        &self,
        api_url: &str,
        venue_reference: &str,
    ) -> Result<Vec<ProviderStock>, ProviderApiError> {
        let mut stocks = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let page = self
                .get_stocks_page(api_url, venue_reference, after.as_deref())
                .await?;
            let is_last = page.len() < self.page_size;
            after = page.last().map(|stock| stock.reference.clone());
            stocks.extend(page);
            if is_last || after.is_none() {
                break;
            }
        }
        Ok(stocks)
    }
}
