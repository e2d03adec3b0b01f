// utils/mod.rs
pub mod config;
pub mod helpers;
pub mod security;
pub mod validation;

// Ré-exports pour faciliter l'import
pub use config::Config;
pub use validation::FormErrors;
