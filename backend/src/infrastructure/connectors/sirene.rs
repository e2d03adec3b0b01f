use actix_web::http::StatusCode;
use reqwest::{Client as HttpClient, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::infrastructure::connectors::http_client;
use crate::infrastructure::error::{AppError, AppResult};
use crate::utils::config::Config;
use crate::utils::validation::{is_valid_siren, is_valid_siret};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SireneError {
    /// Entreprise ayant demandé la non-diffusion de ses informations
    #[error("Les informations relatives à ce SIREN ou SIRET ne sont pas accessibles.")]
    NonPublicData,
    #[error("Ce SIREN ou SIRET n'existe pas.")]
    UnknownEntity,
    #[error("Trop de requêtes vers l'API SIRENE")]
    RateLimited,
    #[error("Erreur de l'API SIRENE: {0}")]
    Api(String),
}

impl From<SireneError> for AppError {
    fn from(error: SireneError) -> Self {
        match error {
            SireneError::NonPublicData | SireneError::UnknownEntity => {
                AppError::api(StatusCode::BAD_REQUEST, "siren", error.to_string())
            }
            SireneError::RateLimited => AppError::ResourceExhausted(error.to_string()),
            SireneError::Api(message) => AppError::ConnectionError(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SireneAddress {
    pub street: String,
    pub postal_code: String,
    pub city: String,
}

/// Unité légale (entreprise)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SirenInfo {
    pub siren: String,
    pub name: String,
    pub head_office_siret: Option<String>,
    pub ape_code: Option<String>,
    pub legal_category_code: Option<String>,
    pub address: Option<SireneAddress>,
    pub active: bool,
    pub diffusible: bool,
}

/// Établissement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiretInfo {
    pub siret: String,
    pub name: String,
    pub ape_code: Option<String>,
    pub address: Option<SireneAddress>,
    pub active: bool,
    pub diffusible: bool,
}

/// Client de l'API SIRENE de l'INSEE
#[derive(Clone)]
pub struct SireneClient {
    http_client: HttpClient,
    base_url: String,
    token: Option<String>,
}

impl SireneClient {
    pub fn new(base_url: &str, token: Option<String>, timeout_seconds: u64) -> AppResult<Self> {
        Ok(Self {
            http_client: http_client(timeout_seconds)?,
            base_url: super::base_url(base_url),
            token,
        })
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        Self::new(
            &config.sirene_api_url,
            config.sirene_api_token.clone(),
            config.provider_api_timeout_seconds,
        )
    }

    pub async fn get_siren(&self, siren: &str) -> Result<SirenInfo, SireneError> {
        if !is_valid_siren(siren) {
            return Err(SireneError::UnknownEntity);
        }
        let response = self.get(&format!("siren/{}", siren)).await?;
        let info: SirenInfo = response
            .json()
            .await
            .map_err(|e| SireneError::Api(format!("Réponse SIREN illisible: {}", e)))?;
        if !info.diffusible {
            return Err(SireneError::NonPublicData);
        }
        debug!("🏢 SIREN {} trouvé: {}", siren, info.name);
        Ok(info)
    }

    pub async fn get_siret(&self, siret: &str) -> Result<SiretInfo, SireneError> {
        if !is_valid_siret(siret) {
            return Err(SireneError::UnknownEntity);
        }
        let response = self.get(&format!("siret/{}", siret)).await?;
        let info: SiretInfo = response
            .json()
            .await
            .map_err(|e| SireneError::Api(format!("Réponse SIRET illisible: {}", e)))?;
        if !info.diffusible {
            return Err(SireneError::NonPublicData);
        }
        Ok(info)
    }

    async fn get(&self, path: &str) -> Result<Response, SireneError> {
        let mut request = self
            .http_client
            .get(format!("{}/{}", self.base_url, path));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SireneError::Api(e.to_string()))?;

        match response.status().as_u16() {
            200..=299 => Ok(response),
            403 => Err(SireneError::NonPublicData),
            404 => Err(SireneError::UnknownEntity),
            429 => {
                warn!("⚠️ Limite de requêtes SIRENE atteinte");
                Err(SireneError::RateLimited)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(SireneError::Api(format!("HTTP {}: {}", status, body)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> SireneClient {
        SireneClient::new(&server.uri(), Some("token".to_string()), 5).unwrap()
    }

    #[tokio::test]
    async fn get_siren_returns_legal_unit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/siren/123456782"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "siren": "123456782",
                "name": "LE PETIT RINTINTIN",
                "head_office_siret": "12345678200010",
                "ape_code": "47.61Z",
                "legal_category_code": "5710",
                "address": {
                    "street": "12 BIS AVENUE DU LIVRE",
                    "postal_code": "58400",
                    "city": "LA CHARITE-SUR-LOIRE"
                },
                "active": true,
                "diffusible": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let info = client(&server).get_siren("123456782").await.unwrap();
        assert_eq!(info.name, "LE PETIT RINTINTIN");
        assert_eq!(info.address.unwrap().postal_code, "58400");
    }

    #[tokio::test]
    async fn http_statuses_map_to_sirene_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/siren/123456782"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/siren/732829320"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/siren/356000000"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(
            client.get_siren("123456782").await,
            Err(SireneError::UnknownEntity)
        );
        assert_eq!(client.get_siren("732829320").await, Err(SireneError::RateLimited));
        assert_eq!(client.get_siren("356000000").await, Err(SireneError::NonPublicData));
    }

    #[tokio::test]
    async fn non_diffusible_entity_is_hidden() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/siret/12345678200010"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "siret": "12345678200010",
                "name": "[ND]",
                "ape_code": null,
                "address": null,
                "active": true,
                "diffusible": false
            })))
            .mount(&server)
            .await;

        assert_eq!(
            client(&server).get_siret("12345678200010").await,
            Err(SireneError::NonPublicData)
        );
    }

    #[tokio::test]
    async fn invalid_siren_is_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        assert_eq!(
            client(&server).get_siren("123456789").await,
            Err(SireneError::UnknownEntity)
        );
    }

    #[test]
    fn unknown_entity_becomes_field_error() {
        let error: AppError = SireneError::UnknownEntity.into();
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
        assert!(error.field_errors().unwrap().contains_key("siren"));
    }
}
