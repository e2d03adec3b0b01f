// utils/security.rs
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::infrastructure::error::{AppError, AppResult};

/// Claims JWT des sessions backoffice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackofficeClaims {
    pub sub: i64,           // User ID
    pub email: String,      // User email
    pub roles: Vec<String>, // Rôles au moment de la connexion
    pub exp: usize,         // Expiration timestamp
    pub iat: usize,         // Issued at timestamp
}

/// Générer un token d'accès backoffice
pub fn generate_access_token(
    user_id: i64,
    email: &str,
    roles: Vec<String>,
    secret: &str,
    expiry_hours: i64,
) -> AppResult<String> {
    let now = chrono::Utc::now();
    let expires_at = now + chrono::Duration::hours(expiry_hours);

    let claims = BackofficeClaims {
        sub: user_id,
        email: email.to_string(),
        roles,
        exp: expires_at.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalError(format!("Impossible de générer le token: {}", e)))
}

/// Vérifier un token d'accès
pub fn verify_access_token(token: &str, secret: &str) -> AppResult<BackofficeClaims> {
    decode::<BackofficeClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Token invalide ou expiré".to_string()))
}

/// Hasher un mot de passe avec Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::InternalError(format!("Erreur de hashage: {}", e)))
}

/// Vérifier un mot de passe contre son hash
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Empreinte SHA-256 en hexadécimal
pub fn sha256_hex(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    format!("{:x}", digest)
}

/// Clé d'API d'une structure : le préfixe est stocké en clair, le secret hashé.
/// La valeur complète `<prefix>_<secret>` n'est montrée qu'une fois.
#[derive(Debug, Clone)]
pub struct GeneratedApiKey {
    pub prefix: String,
    pub secret_hash: String,
    pub clear_value: String,
}

pub fn generate_api_key(env_prefix: &str) -> GeneratedApiKey {
    let random_prefix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    let secret: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect();
    let prefix = format!("{}_{}", env_prefix, random_prefix);

    GeneratedApiKey {
        clear_value: format!("{}_{}", prefix, secret),
        secret_hash: sha256_hex(secret.as_bytes()),
        prefix,
    }
}

/// Sépare une clé `<env>_<prefix>_<secret>` en (préfixe, secret)
pub fn split_api_key(value: &str) -> Option<(&str, &str)> {
    let position = value.rfind('_')?;
    let (prefix, secret) = value.split_at(position);
    let secret = &secret[1..];
    if prefix.is_empty() || secret.is_empty() {
        return None;
    }
    Some((prefix, secret))
}
