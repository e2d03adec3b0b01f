// core/mod.rs
pub mod booking_service;
pub mod fraud_service;
pub mod gdpr_service;
pub mod offerer_service;
pub mod payment_files;
pub mod payment_service;
pub mod provider_sync_service;
pub mod reimbursement_service;
pub mod user_service;

// Ré-exports pour faciliter l'import
pub use booking_service::BookingService;
pub use fraud_service::FraudService;
pub use gdpr_service::GdprService;
pub use offerer_service::OffererService;
pub use payment_service::{PaymentService, PaymentSettings};
pub use provider_sync_service::ProviderSyncService;
pub use reimbursement_service::ReimbursementService;
pub use user_service::UserService;
