// utils/config.rs
use dotenv::dotenv;
use std::env;
use std::str::FromStr;

use crate::infrastructure::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct Config {
    // Environnement et serveur
    pub run_mode: String,
    pub server_host: String,
    pub server_port: u16,
    pub workers: usize,
    pub log_level: String,

    // Base de données
    pub database_url: String,
    pub database_max_connections: u32,

    // Sécurité
    pub jwt_secret: String,
    pub jwt_access_token_expiry_hours: i64,

    // Redis
    pub redis_url: String,
    pub redis_prefix: String,

    // Stockage objet (local ou S3/MinIO)
    pub storage_type: String,
    pub storage_local_path: String,
    pub s3_endpoint: Option<String>,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    pub s3_bucket: String,
    pub s3_region: String,

    // API Sirene (INSEE)
    pub sirene_api_url: String,
    pub sirene_api_token: Option<String>,

    // Backend finance (Cegid)
    pub finance_backend_enabled: bool,
    pub finance_backend_url: String,
    pub finance_backend_user: String,
    pub finance_backend_password: String,
    pub finance_backend_cookie_ttl_seconds: u64,

    // Fournisseurs
    pub provider_api_timeout_seconds: u64,
    pub ems_api_url: String,
    pub ems_api_token: Option<String>,

    // Email
    pub email_enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub email_from: String,
    pub finance_team_email: String,

    // Virements
    pub payment_debtor_name: String,
    pub payment_debtor_iban: String,
    pub payment_debtor_bic: String,
    pub output_directory: String,

    // RGPD
    pub gdpr_max_extract_per_day: i64,
    pub gdpr_lock_timeout_seconds: u64,

    // Workers
    pub enable_workers: bool,
    pub gdpr_worker_interval_seconds: u64,
    pub provider_sync_interval_seconds: u64,
}

/// Lit une variable d'environnement typée, avec valeur par défaut
fn parse_var<T: FromStr>(name: &str, default: &str) -> AppResult<T> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| AppError::ConfigurationError(format!("{} a une valeur invalide", name)))
}

fn string_var(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn required_var(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| {
        AppError::ConfigurationError(format!(
            "Variable d'environnement requise manquante: {}",
            name
        ))
    })
}

impl Config {
    /// Charger la configuration depuis les variables d'environnement
    pub fn from_env() -> AppResult<Self> {
        // Charger le fichier .env si présent
        let _ = dotenv().ok();

        let config = Config {
            run_mode: string_var("RUN_MODE", "development"),
            server_host: string_var("SERVER_HOST", "0.0.0.0"),
            server_port: parse_var("SERVER_PORT", "5001")?,
            workers: parse_var("WORKERS", "4")?,
            log_level: string_var("LOG_LEVEL", "info"),

            database_url: required_var("DATABASE_URL")?,
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", "20")?,

            jwt_secret: required_var("JWT_SECRET")?,
            jwt_access_token_expiry_hours: parse_var("JWT_ACCESS_TOKEN_EXPIRY_HOURS", "12")?,

            redis_url: required_var("REDIS_URL")?,
            redis_prefix: string_var("REDIS_PREFIX", "pcapi:"),

            storage_type: string_var("STORAGE_TYPE", "local"),
            storage_local_path: string_var("STORAGE_LOCAL_PATH", "./storage"),
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            s3_access_key: env::var("S3_ACCESS_KEY").ok(),
            s3_secret_key: env::var("S3_SECRET_KEY").ok(),
            s3_bucket: string_var("S3_BUCKET", "pass-culture"),
            s3_region: string_var("S3_REGION", "eu-west-3"),

            sirene_api_url: string_var("SIRENE_API_URL", "https://api.insee.fr/entreprises/sirene/V3.11"),
            sirene_api_token: env::var("SIRENE_API_TOKEN").ok(),

            finance_backend_enabled: parse_var("FINANCE_BACKEND_ENABLED", "false")?,
            finance_backend_url: string_var("FINANCE_BACKEND_URL", "http://localhost:8090"),
            finance_backend_user: string_var("FINANCE_BACKEND_USER", ""),
            finance_backend_password: string_var("FINANCE_BACKEND_PASSWORD", ""),
            finance_backend_cookie_ttl_seconds: parse_var("FINANCE_BACKEND_COOKIE_TTL_SECONDS", "1800")?,

            provider_api_timeout_seconds: parse_var("PROVIDER_API_TIMEOUT_SECONDS", "30")?,
            ems_api_url: string_var("EMS_API_URL", "https://ems.example.com/api"),
            ems_api_token: env::var("EMS_API_TOKEN").ok(),

            email_enabled: parse_var("EMAIL_ENABLED", "false")?,
            smtp_host: string_var("SMTP_HOST", "localhost"),
            smtp_port: parse_var("SMTP_PORT", "25")?,
            email_from: string_var("EMAIL_FROM", "support@passculture.app"),
            finance_team_email: string_var("FINANCE_TEAM_EMAIL", "finance@passculture.app"),

            payment_debtor_name: string_var("PAYMENT_DEBTOR_NAME", "pass Culture"),
            payment_debtor_iban: string_var("PAYMENT_DEBTOR_IBAN", ""),
            payment_debtor_bic: string_var("PAYMENT_DEBTOR_BIC", ""),
            output_directory: string_var("OUTPUT_DIRECTORY", "/tmp"),

            gdpr_max_extract_per_day: parse_var("GDPR_MAX_EXTRACT_PER_DAY", "50")?,
            gdpr_lock_timeout_seconds: parse_var("GDPR_LOCK_TIMEOUT_SECONDS", "1800")?,

            enable_workers: parse_var("ENABLE_WORKERS", "true")?,
            gdpr_worker_interval_seconds: parse_var("GDPR_WORKER_INTERVAL_SECONDS", "300")?,
            provider_sync_interval_seconds: parse_var("PROVIDER_SYNC_INTERVAL_SECONDS", "3600")?,
        };

        if config.jwt_secret.len() < 32 {
            tracing::warn!("⚠️  JWT_SECRET trop court (< 32 caractères) - risque de sécurité");
        }

        Ok(config)
    }

    /// Vérifier si on est en production
    pub fn is_production(&self) -> bool {
        self.run_mode == "production"
    }

    /// Configuration minimale pour les tests unitaires
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            run_mode: "testing".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 5001,
            workers: 1,
            log_level: "debug".to_string(),
            database_url: "postgres://localhost/pass_culture_test".to_string(),
            database_max_connections: 1,
            jwt_secret: "test-secret-with-at-least-32-characters!".to_string(),
            jwt_access_token_expiry_hours: 1,
            redis_url: "redis://localhost:6379".to_string(),
            redis_prefix: "test:".to_string(),
            storage_type: "local".to_string(),
            storage_local_path: "/tmp/pcapi-tests".to_string(),
            s3_endpoint: None,
            s3_access_key: None,
            s3_secret_key: None,
            s3_bucket: "test".to_string(),
            s3_region: "eu-west-3".to_string(),
            sirene_api_url: "http://localhost".to_string(),
            sirene_api_token: None,
            finance_backend_enabled: false,
            finance_backend_url: "http://localhost".to_string(),
            finance_backend_user: "user".to_string(),
            finance_backend_password: "password".to_string(),
            finance_backend_cookie_ttl_seconds: 60,
            provider_api_timeout_seconds: 5,
            ems_api_url: "http://localhost".to_string(),
            ems_api_token: None,
            email_enabled: false,
            smtp_host: "localhost".to_string(),
            smtp_port: 25,
            email_from: "support@example.com".to_string(),
            finance_team_email: "finance@example.com".to_string(),
            payment_debtor_name: "pass Culture".to_string(),
            payment_debtor_iban: "FR7630001007941234567890185".to_string(),
            payment_debtor_bic: "BDFEFRPPCCT".to_string(),
            output_directory: "/tmp".to_string(),
            gdpr_max_extract_per_day: 2,
            gdpr_lock_timeout_seconds: 60,
            enable_workers: false,
            gdpr_worker_interval_seconds: 60,
            provider_sync_interval_seconds: 60,
        }
    }
}
