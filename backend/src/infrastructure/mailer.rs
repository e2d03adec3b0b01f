use async_trait::async_trait;
use tracing::info;

use crate::infrastructure::error::AppResult;
#[cfg(feature = "email")]
use crate::infrastructure::error::AppError;
use crate::utils::config::Config;

/// Pièce jointe d'un email
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Email {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, email: &Email) -> AppResult<()>;
}

/// Fournisseur choisi selon `EMAIL_ENABLED`
pub fn from_config(config: &Config) -> std::sync::Arc<dyn EmailProvider> {
    #[cfg(feature = "email")]
    if config.email_enabled {
        return std::sync::Arc::new(SmtpEmailProvider::new(config));
    }
    let _ = config;
    std::sync::Arc::new(LogEmailProvider)
}

/// Implémentation pour les logs (développement)
pub struct LogEmailProvider;

#[async_trait]
impl EmailProvider for LogEmailProvider {
    async fn send(&self, email: &Email) -> AppResult<()> {
        info!(
            to = ?email.to,
            subject = %email.subject,
            attachments = email.attachments.len(),
            "📧 Email non envoyé (EMAIL_ENABLED=false)"
        );
        Ok(())
    }
}

#[cfg(feature = "email")]
pub struct SmtpEmailProvider {
    transport: lettre::AsyncSmtpTransport<lettre::Tokio1Executor>,
    from: String,
}

#[cfg(feature = "email")]
impl SmtpEmailProvider {
    pub fn new(config: &Config) -> Self {
        let transport =
            lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
                .build();
        Self {
            transport,
            from: config.email_from.clone(),
        }
    }

    fn build_message(&self, email: &Email) -> AppResult<lettre::Message> {
        use lettre::message::header::ContentType;
        use lettre::message::{Attachment as MailAttachment, MultiPart, SinglePart};

        let invalid = |e: lettre::address::AddressError| {
            AppError::ConfigurationError(format!("Adresse email invalide: {}", e))
        };

        let mut builder = lettre::Message::builder()
            .from(self.from.parse().map_err(invalid)?)
            .subject(&email.subject);
        for recipient in &email.to {
            builder = builder.to(recipient.parse().map_err(invalid)?);
        }

        let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(email.body.clone()));
        for attachment in &email.attachments {
            let content_type = ContentType::parse(&attachment.content_type)
                .map_err(|e| AppError::InternalError(format!("Content-Type invalide: {}", e)))?;
            multipart = multipart.singlepart(
                MailAttachment::new(attachment.filename.clone())
                    .body(attachment.content.clone(), content_type),
            );
        }

        builder
            .multipart(multipart)
            .map_err(|e| AppError::InternalError(format!("Email invalide: {}", e)))
    }
}

#[cfg(feature = "email")]
#[async_trait]
impl EmailProvider for SmtpEmailProvider {
    async fn send(&self, email: &Email) -> AppResult<()> {
        use lettre::AsyncTransport;

        let message = self.build_message(email)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::InfrastructureError(format!("SMTP: {}", e)))?;
        info!(to = ?email.to, subject = %email.subject, "📧 Email envoyé");
        Ok(())
    }
}
