use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use reqwest::Client as HttpClient;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::infrastructure::connectors::http_client;
use crate::infrastructure::connectors::provider_api::ProviderApiError;
use crate::utils::config::Config;

/// Séances publiées par la billetterie depuis une version donnée
#[derive(Debug, Clone, Deserialize)]
pub struct EmsSchedules {
    pub version: i64,
    #[serde(default)]
    pub sites: Vec<EmsSite>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmsSite {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub events: Vec<EmsEvent>,
}

/// Film à l'affiche d'un cinéma
#[derive(Debug, Clone, Deserialize)]
pub struct EmsEvent {
    pub id: String,
    pub title: String,
    /// Durée en minutes
    pub duration: Option<i32>,
    #[serde(default)]
    pub sessions: Vec<EmsSession>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmsSession {
    pub id: String,
    /// `YYYYMMDDHHMM`
    pub date: String,
    pub pass_culture_price: Decimal,
}

impl EmsSession {
    pub fn beginning_datetime(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.date, "%Y%m%d%H%M")
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    }
}

impl EmsSchedules {
    /// Site correspondant à l'identifiant du cinéma chez le fournisseur
    pub fn site(&self, site_id: &str) -> Option<&EmsSite> {
        self.sites.iter().find(|site| site.id == site_id)
    }
}

#[derive(Clone)]
pub struct EmsClient {
    http_client: HttpClient,
    base_url: String,
    token: Option<String>,
}

impl EmsClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout_seconds: u64,
    ) -> Result<Self, ProviderApiError> {
        Ok(Self {
            http_client: http_client(timeout_seconds)
                .map_err(|e| ProviderApiError::Client(e.to_string()))?,
            base_url: super::base_url(base_url),
            token,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ProviderApiError> {
        Self::new(
            &config.ems_api_url,
            config.ems_api_token.clone(),
            config.provider_api_timeout_seconds,
        )
    }

    /// Séances modifiées depuis `version` (0 pour tout récupérer)
    pub async fn get_schedules(&self, version: i64) -> Result<EmsSchedules, ProviderApiError> {
        let mut request = self
            .http_client
            .get(format!("{}/schedules", self.base_url))
            .query(&[("version", version)]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(ProviderApiError::from_reqwest)?;
        if !response.status().is_success() {
            return Err(ProviderApiError::Status(response.status().as_u16()));
        }
        let schedules: EmsSchedules = response
            .json()
            .await
            .map_err(|e| ProviderApiError::InvalidPayload(e.to_string()))?;
        debug!(
            "🎬 Séances EMS version {} ({} site(s))",
            schedules.version,
            schedules.sites.len()
        );
        Ok(schedules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_schedules_since_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/schedules"))
            .and(query_param("version", "1679000000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "version": 1679500000,
                "sites": [{
                    "id": "9997",
                    "name": "Cinéma de la gare",
                    "events": [{
                        "id": "SHJRH",
                        "title": "Les Aventures de Tintin",
                        "duration": 107,
                        "sessions": [
                            {"id": "999700079243", "date": "202304221300", "pass_culture_price": 6.5}
                        ]
                    }]
                }]
            })))
            .mount(&server)
            .await;

        let client = EmsClient::new(&server.uri(), None, 5).unwrap();
        let schedules = client.get_schedules(1679000000).await.unwrap();
        assert_eq!(schedules.version, 1679500000);

        let session = &schedules.site("9997").unwrap().events[0].sessions[0];
        assert_eq!(session.pass_culture_price, Decimal::new(650, 2));
        let beginning = session.beginning_datetime().unwrap();
        assert_eq!((beginning.day(), beginning.hour()), (22, 13));
        assert!(schedules.site("1234").is_none());
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = EmsClient::new(&server.uri(), None, 5).unwrap();
        assert_eq!(
            client.get_schedules(0).await.unwrap_err(),
            ProviderApiError::Status(503)
        );
    }
}
