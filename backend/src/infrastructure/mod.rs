// infrastructure/mod.rs
pub mod cache;
pub mod connectors;
pub mod database;
pub mod error;
pub mod mailer;
#[cfg(test)]
pub mod memory;
pub mod queue;
pub mod storage;

pub use cache::{KeyValueCache, RedisCache};
pub use database::{Database, Repositories};
pub use error::{AppError, AppResult};
pub use mailer::EmailProvider;
pub use queue::SearchIndexQueue;
pub use storage::ObjectStorage;
