use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::info;

use crate::infrastructure::error::{AppError, AppResult};

/// Stockage clé-valeur partagé entre les instances (verrous, compteurs,
/// files d'indexation)
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;
    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> AppResult<()>;
    /// Pose la clé uniquement si elle n'existe pas ; `true` si elle a été posée
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> AppResult<bool>;
    async fn incr(&self, key: &str) -> AppResult<i64>;
    async fn expire(&self, key: &str, ttl_seconds: u64) -> AppResult<()>;
    async fn delete(&self, key: &str) -> AppResult<()>;
    async fn add_to_set(&self, key: &str, members: &[String]) -> AppResult<()>;
    async fn ping(&self) -> AppResult<()>;
}

/// Implémentation Redis ; toutes les clés sont préfixées
#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
    prefix: String,
}

impl RedisCache {
    pub async fn new(redis_url: &str, prefix: &str) -> AppResult<Self> {
        info!("🔧 Connexion à Redis...");
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::ConfigurationError(format!("REDIS_URL invalide: {}", e)))?;
        let connection = client.get_multiplexed_tokio_connection().await.map_err(|e| {
            AppError::ConnectionError(format!("Impossible de se connecter à Redis: {}", e))
        })?;
        info!("✅ Redis connecté");

        Ok(Self {
            connection,
            prefix: prefix.to_string(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl KeyValueCache for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut connection = self.connection.clone();
        let value: Option<String> = connection.get(self.key(key)).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> AppResult<()> {
        let mut connection = self.connection.clone();
        connection
            .set_ex::<_, _, ()>(self.key(key), value, ttl_seconds as usize)
            .await?;
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> AppResult<bool> {
        let mut connection = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut connection)
            .await?;
        Ok(reply.is_some())
    }

    async fn incr(&self, key: &str) -> AppResult<i64> {
        let mut connection = self.connection.clone();
        let value: i64 = connection.incr(self.key(key), 1).await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> AppResult<()> {
        let mut connection = self.connection.clone();
        connection
            .expire::<_, ()>(self.key(key), ttl_seconds as usize)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut connection = self.connection.clone();
        connection.del::<_, ()>(self.key(key)).await?;
        Ok(())
    }

    async fn add_to_set(&self, key: &str, members: &[String]) -> AppResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut connection = self.connection.clone();
        connection.sadd::<_, _, ()>(self.key(key), members).await?;
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        let mut connection = self.connection.clone();
        redis::cmd("PING").query_async::<_, String>(&mut connection).await?;
        Ok(())
    }
}
