use std::collections::BTreeMap;

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use validator::ValidationErrors;

/// Type de résultat standard pour l'application
pub type AppResult<T> = Result<T, AppError>;

/// Erreurs indexées par champ, au format des réponses de l'API pro :
/// `{"global": ["Cette contremarque a déjà été annulée"]}`
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Erreurs principales de l'application
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Erreur d'authentification (401 Unauthorized)
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Permissions insuffisantes (403 Forbidden)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Ressource non trouvée (404 Not Found)
    #[error("{0} not found")]
    NotFound(String),

    /// Conflit de ressources (409 Conflict)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Données invalides (400 Bad Request)
    #[error("Validation failed: {0}")]
    ValidationError(ValidationErrors),

    /// Requête mal formée (400 Bad Request)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Erreur métier renvoyée telle quelle au client, avec son code HTTP
    #[error("API error {status}: {errors:?}")]
    Api { status: u16, errors: FieldErrors },

    /// Erreur interne du serveur (500 Internal Server Error)
    #[error("Internal server error: {0}")]
    InternalError(String),

    /// Erreur de base de données (500 Internal Server Error)
    #[error("Database error: {0}")]
    DatabaseError(SqlxError),

    /// Erreur de sérialisation/désérialisation (500 Internal Server Error)
    #[error("Serialization error: {0}")]
    SerializationError(serde_json::Error),

    /// Erreur d'infrastructure (stockage, redis, smtp...) (500 Internal Server Error)
    #[error("Infrastructure error: {0}")]
    InfrastructureError(String),

    /// Erreur de configuration (500 Internal Server Error)
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Timeout d'opération (504 Gateway Timeout)
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Erreur de connexion à un service tiers (502 Bad Gateway)
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Resource épuisée (429 Too Many Requests)
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl AppError {
    /// Construit une erreur métier portant un seul message sur un seul champ
    pub fn api(status: StatusCode, field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        AppError::Api {
            status: status.as_u16(),
            errors,
        }
    }

    /// Construit une erreur de formulaire (400) à partir d'erreurs par champ
    pub fn form(errors: FieldErrors) -> Self {
        AppError::Api {
            status: StatusCode::BAD_REQUEST.as_u16(),
            errors,
        }
    }

    /// Convertit l'erreur en code HTTP approprié
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Api { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
            }
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InfrastructureError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::ConnectionError(_) => StatusCode::BAD_GATEWAY,
            AppError::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Convertit l'erreur en message utilisateur-friendly
    /// (à utiliser pour les réponses clients, pas pour le logging)
    pub fn user_friendly_message(&self) -> String {
        match self {
            AppError::Unauthorized(_) => {
                "Authentification échouée. Veuillez vérifier vos identifiants.".to_string()
            }
            AppError::Forbidden(_) => {
                "Vous n'avez pas les permissions nécessaires pour cette action.".to_string()
            }
            AppError::NotFound(resource) => format!("{} non trouvé", resource),
            AppError::Conflict(_) => {
                "Conflit: cette ressource existe déjà ou est en cours d'utilisation.".to_string()
            }
            AppError::ValidationError(_) | AppError::Api { .. } => {
                "Données invalides. Veuillez vérifier le format des champs.".to_string()
            }
            AppError::BadRequest(message) => message.clone(),
            AppError::Timeout(_) => {
                "L'opération a pris trop de temps. Veuillez réessayer plus tard.".to_string()
            }
            AppError::ResourceExhausted(_) => {
                "Trop de requêtes. Veuillez réessayer dans quelques minutes.".to_string()
            }
            AppError::InternalError(_)
            | AppError::DatabaseError(_)
            | AppError::SerializationError(_)
            | AppError::InfrastructureError(_)
            | AppError::ConfigurationError(_)
            | AppError::ConnectionError(_) => {
                "Une erreur interne est survenue. Notre équipe technique a été notifiée."
                    .to_string()
            }
        }
    }

    /// Erreurs par champ, pour les variantes qui en portent
    pub fn field_errors(&self) -> Option<FieldErrors> {
        match self {
            AppError::Api { errors, .. } => Some(errors.clone()),
            AppError::ValidationError(errors) => Some(validation_errors_to_fields(errors)),
            _ => None,
        }
    }

    /// Log l'erreur avec un contexte supplémentaire
    pub fn log_with_context(&self, context: &str) -> String {
        match self {
            AppError::DatabaseError(sqlx_error) => {
                format!("Database error [{}]: {}", context, sqlx_error)
            }
            AppError::ValidationError(errors) => {
                let details: Vec<String> = validation_errors_to_fields(errors)
                    .into_iter()
                    .map(|(field, messages)| format!("field '{}' - {}", field, messages.join(", ")))
                    .collect();
                format!("Validation error [{}]: {}", context, details.join(", "))
            }
            _ => format!("{} [{}]", self, context),
        }
    }
}

/// Aplatit les erreurs `validator` en `{"champ": ["message"]}`
pub fn validation_errors_to_fields(errors: &ValidationErrors) -> FieldErrors {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, field_errors)| {
            let messages = field_errors
                .iter()
                .map(|error| {
                    error
                        .message
                        .as_ref()
                        .map(|message| message.to_string())
                        .unwrap_or_else(|| error.code.to_string())
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = AppError::status_code(self);
        if status.is_server_error() {
            tracing::error!("❌ {}", self);
        }

        match self.field_errors() {
            Some(errors) => HttpResponse::build(status).json(errors),
            None => HttpResponse::build(status).json(ErrorResponse {
                error: self.user_friendly_message(),
                code: status.as_u16(),
            }),
        }
    }
}

/// Structure de réponse d'erreur standardisée
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

// Implémentations From pour les conversions automatiques

impl From<SqlxError> for AppError {
    fn from(error: SqlxError) -> Self {
        match &error {
            SqlxError::RowNotFound => AppError::NotFound("Ressource".to_string()),
            SqlxError::Database(db_error) => {
                if db_error.code().map(|code| code == "23505").unwrap_or(false) {
                    AppError::Conflict("Unique constraint violation".to_string())
                } else {
                    AppError::DatabaseError(error)
                }
            }
            _ => AppError::DatabaseError(error),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::InfrastructureError(format!("Migration error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::SerializationError(error)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::ValidationError(errors)
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        AppError::InfrastructureError(format!("IO error: {}", error))
    }
}

impl From<redis::RedisError> for AppError {
    fn from(error: redis::RedisError) -> Self {
        AppError::InfrastructureError(format!("Redis error: {}", error))
    }
}

impl From<csv::Error> for AppError {
    fn from(error: csv::Error) -> Self {
        AppError::BadRequest(format!("Fichier CSV invalide: {}", error))
    }
}

impl From<zip::result::ZipError> for AppError {
    fn from(error: zip::result::ZipError) -> Self {
        AppError::InfrastructureError(format!("Zip error: {}", error))
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(error: tokio::task::JoinError) -> Self {
        AppError::InternalError(format!("Task join error: {}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            AppError::Timeout("Request timeout".to_string())
        } else if error.is_connect() {
            AppError::ConnectionError("Connection failed".to_string())
        } else {
            AppError::InfrastructureError(format!("HTTP request error: {}", error))
        }
    }
}

// Helper functions pour créer des erreurs courantes
pub fn not_found<T: Into<String>>(resource: T) -> AppError {
    AppError::NotFound(resource.into())
}

pub fn internal_error<T: Into<String>>(message: T) -> AppError {
    AppError::InternalError(message.into())
}
