//! Stockage objet des fichiers générés (virements, exports RGPD).
//!
//! `S3Storage` en production (S3 ou MinIO), `LocalStorage` en développement.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::infrastructure::error::{AppError, AppResult};
use crate::utils::config::Config;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, key: &str, content: Vec<u8>, content_type: &str) -> AppResult<()>;
    async fn get(&self, key: &str) -> AppResult<Vec<u8>>;
    async fn exists(&self, key: &str) -> AppResult<bool>;
    async fn delete(&self, key: &str) -> AppResult<()>;
    /// Clés commençant par `prefix`
    async fn list_keys(&self, prefix: &str) -> AppResult<Vec<String>>;
}

/// Construit le stockage configuré par `STORAGE_TYPE`
pub async fn from_config(config: &Config) -> AppResult<std::sync::Arc<dyn ObjectStorage>> {
    match config.storage_type.as_str() {
        "s3" => Ok(std::sync::Arc::new(S3Storage::new(config).await?)),
        "local" => Ok(std::sync::Arc::new(LocalStorage::new(&config.storage_local_path))),
        other => Err(AppError::ConfigurationError(format!(
            "STORAGE_TYPE inconnu: {}",
            other
        ))),
    }
}

/// Stockage S3/MinIO
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(config: &Config) -> AppResult<Self> {
        info!("🔧 Initialisation du stockage S3 (bucket {})...", config.s3_bucket);

        let client = match (&config.s3_endpoint, &config.s3_access_key, &config.s3_secret_key) {
            (Some(endpoint), Some(access_key), Some(secret_key)) => {
                let credentials = Credentials::new(access_key, secret_key, None, None, "pcapi");
                let s3_config = aws_sdk_s3::config::Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(Region::new(config.s3_region.clone()))
                    .endpoint_url(endpoint)
                    .credentials_provider(credentials)
                    .force_path_style(true)
                    .build();
                Client::from_conf(s3_config)
            }
            _ => {
                let sdk_config = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(config.s3_region.clone()))
                    .load()
                    .await;
                Client::new(&sdk_config)
            }
        };

        info!("✅ Stockage S3 initialisé");
        Ok(Self {
            client,
            bucket: config.s3_bucket.clone(),
        })
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put(&self, key: &str, content: Vec<u8>, content_type: &str) -> AppResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| AppError::InfrastructureError(format!("S3 put {}: {}", key, e)))?;
        debug!("📤 Fichier {} déposé", key);
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let error = e.into_service_error();
                if error.is_no_such_key() {
                    AppError::NotFound(format!("Fichier {}", key))
                } else {
                    AppError::InfrastructureError(format!("S3 get {}: {}", key, error))
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| AppError::InfrastructureError(format!("S3 read {}: {}", key, e)))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let error = e.into_service_error();
                if error.is_not_found() {
                    Ok(false)
                } else {
                    Err(AppError::InfrastructureError(format!("S3 head {}: {}", key, error)))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::InfrastructureError(format!("S3 delete {}: {}", key, e)))?;
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> AppResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| AppError::InfrastructureError(format!("S3 list {}: {}", prefix, e)))?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }
}

/// Stockage sur disque, les clés étant des chemins relatifs à `root`
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path(&self, key: &str) -> AppResult<PathBuf> {
        if key.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(AppError::BadRequest(format!("Clé de stockage invalide: {}", key)));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn put(&self, key: &str, content: Vec<u8>, _content_type: &str) -> AppResult<()> {
        let path = self.path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        debug!("📤 Fichier {} écrit dans {}", key, path.display());
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Vec<u8>> {
        let path = self.path(key)?;
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("Fichier {}", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(tokio::fs::try_exists(self.path(key)?).await?)
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        match tokio::fs::remove_file(self.path(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_keys(&self, prefix: &str) -> AppResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut directories = vec![self.root.clone()];

        while let Some(directory) = directories.pop() {
            let mut entries = match tokio::fs::read_dir(&directory).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    directories.push(path);
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(&self.root) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_storage_round_trip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        storage
            .put("gdpr-extracts/1.zip", b"zip".to_vec(), "application/zip")
            .await
            .unwrap();
        storage
            .put("payments/VIR1/virement.xml", b"<xml/>".to_vec(), "application/xml")
            .await
            .unwrap();

        assert_eq!(storage.get("gdpr-extracts/1.zip").await.unwrap(), b"zip");
        assert!(storage.exists("payments/VIR1/virement.xml").await.unwrap());
        assert_eq!(
            storage.list_keys("gdpr-extracts/").await.unwrap(),
            vec!["gdpr-extracts/1.zip".to_string()]
        );

        storage.delete("gdpr-extracts/1.zip").await.unwrap();
        assert!(!storage.exists("gdpr-extracts/1.zip").await.unwrap());
        assert!(matches!(
            storage.get("gdpr-extracts/1.zip").await,
            Err(AppError::NotFound(_))
        ));
        // Suppression idempotente
        storage.delete("gdpr-extracts/1.zip").await.unwrap();
    }

    #[tokio::test]
    async fn local_storage_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        assert!(storage.put("../evil", vec![], "text/plain").await.is_err());
    }
}
