use std::env;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pcapi::api::{self, AppState};
use pcapi::core::{
    GdprService, OffererService, PaymentService, PaymentSettings, ProviderSyncService,
};
use pcapi::infrastructure::connectors::{
    EmsClient, FinanceBackend, FinanceBackendClient, ProviderApiClient, SireneClient,
};
use pcapi::infrastructure::{
    mailer, storage, Database, KeyValueCache, ObjectStorage, RedisCache, Repositories,
    SearchIndexQueue,
};
use pcapi::utils::helpers::start_of_day;
use pcapi::{workers, Config};

#[derive(Parser)]
#[command(name = "pcapi", version, about = "Backend pass Culture")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serveur HTTP et workers background (par défaut)
    Serve,
    /// Génère le lot de virements des réservations validées avant `cutoff`
    GeneratePayments {
        /// Date de fin de période (exclue), au format AAAA-MM-JJ
        #[arg(long)]
        cutoff: NaiveDate,
        /// Enregistre le lot ; sinon les fichiers sont seulement écrits dans OUTPUT_DIRECTORY
        #[arg(long)]
        not_dry: bool,
    },
    /// Synchronise les stocks des fournisseurs
    SynchronizeProviders {
        #[arg(long)]
        provider_id: Option<i64>,
        #[arg(long, conflicts_with = "provider_id")]
        venue_provider_id: Option<i64>,
    },
    /// Importe des structures depuis un CSV
    ImportOfferers {
        #[arg(long)]
        filename: PathBuf,
        #[arg(long)]
        not_dry: bool,
    },
    /// Traite une demande d'export RGPD en attente
    ExtractGdprData,
    /// Supprime les exports RGPD expirés et les archives orphelines
    CleanGdprExtracts,
}

/// Dépendances partagées par le serveur et les commandes
struct Components {
    config: Config,
    repositories: Repositories,
    cache: Arc<dyn KeyValueCache>,
    storage: Arc<dyn ObjectStorage>,
}

impl Components {
    async fn connect(config: Config) -> anyhow::Result<Self> {
        let database = Database::new(&config.database_url, config.database_max_connections)
            .await
            .context("❌ Impossible de se connecter à la base de données")?;
        database.ping().await.context("❌ Base de données injoignable")?;
        database.migrate().await.context("❌ Échec des migrations")?;

        let cache = RedisCache::new(&config.redis_url, &config.redis_prefix)
            .await
            .context("❌ Impossible de se connecter à Redis")?;
        let cache: Arc<dyn KeyValueCache> = Arc::new(cache);
        cache.ping().await.context("❌ Redis injoignable")?;

        let storage = storage::from_config(&config)
            .await
            .context("❌ Impossible d'initialiser le stockage")?;

        Ok(Self {
            repositories: Repositories::postgres(database.pool),
            config,
            cache,
            storage,
        })
    }

    fn sirene(&self) -> anyhow::Result<Arc<SireneClient>> {
        Ok(Arc::new(SireneClient::from_config(&self.config)?))
    }

    fn gdpr_service(&self) -> GdprService {
        GdprService::new(
            self.repositories.clone(),
            self.storage.clone(),
            self.cache.clone(),
            self.config.gdpr_max_extract_per_day,
            self.config.gdpr_lock_timeout_seconds,
        )
    }

    fn provider_sync_service(&self) -> anyhow::Result<ProviderSyncService> {
        Ok(ProviderSyncService::new(
            self.repositories.clone(),
            SearchIndexQueue::new(self.cache.clone()),
            ProviderApiClient::new(self.config.provider_api_timeout_seconds)?,
            EmsClient::from_config(&self.config)?,
            self.config.provider_api_timeout_seconds,
        ))
    }

    fn payment_service(&self) -> anyhow::Result<PaymentService> {
        let finance_backend: Option<Arc<dyn FinanceBackend>> = if self.config.finance_backend_enabled {
            Some(Arc::new(FinanceBackendClient::new(&self.config, self.cache.clone())?))
        } else {
            None
        };
        Ok(PaymentService::new(
            self.repositories.clone(),
            self.storage.clone(),
            mailer::from_config(&self.config),
            finance_backend,
            PaymentSettings::from_config(&self.config),
        ))
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    let config = Config::from_env().context("❌ Impossible de charger la configuration")?;
    info!("🔧 Mode: {}", config.run_mode);
    if config.is_production() && config.jwt_secret.len() < 32 {
        bail!("❌ JWT_SECRET doit comporter au moins 32 caractères en production");
    }
    let components = Components::connect(config).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(components).await?,
        Command::GeneratePayments { cutoff, not_dry } => {
            let report = components
                .payment_service()?
                .generate_payments(start_of_day(cutoff), !not_dry)
                .await?;
            info!(
                batch = report.batch_label.as_deref().unwrap_or("-"),
                payments = report.payments_count,
                not_processable = report.not_processable_count,
                total_cents = report.total_cents,
                files = ?report.files,
                "✅ Génération des virements terminée"
            );
        }
        Command::SynchronizeProviders {
            provider_id,
            venue_provider_id,
        } => {
            let service = components.provider_sync_service()?;
            match venue_provider_id {
                Some(id) => {
                    let counters = service.synchronize_venue_provider(id).await?;
                    info!(venue_provider_id = id, ?counters, "✅ Lien synchronisé");
                }
                None => {
                    let report = service.synchronize_all(provider_id).await?;
                    if report.failures > 0 {
                        warn!(failures = report.failures, "⚠️ Certains liens n'ont pas pu être synchronisés");
                    }
                }
            }
        }
        Command::ImportOfferers { filename, not_dry } => {
            let file = File::open(&filename)
                .with_context(|| format!("❌ Lecture impossible de {}", filename.display()))?;
            let service = OffererService::new(
                components.repositories.clone(),
                components.sirene()?,
                SearchIndexQueue::new(components.cache.clone()),
            );
            let report = service.import_offerers(file, !not_dry).await?;
            for (line, error) in &report.errors {
                warn!(line, "⚠️ Ligne ignorée: {}", error);
            }
            info!(
                offerers = report.offerers_created,
                venues = report.venues_created,
                dry_run = !not_dry,
                "✅ Import des structures terminé"
            );
        }
        Command::ExtractGdprData => {
            let processed = components.gdpr_service().extract_beneficiary_data_command().await?;
            info!(processed, "✅ Extraction RGPD terminée");
        }
        Command::CleanGdprExtracts => {
            components.gdpr_service().clean_gdpr_extracts().await?;
        }
    }
    Ok(())
}

async fn serve(components: Components) -> anyhow::Result<()> {
    let config = components.config.clone();
    let app_state = web::Data::new(AppState::new(
        &config,
        components.repositories.clone(),
        components.cache.clone(),
        components.storage.clone(),
        components.sirene()?,
    ));

    if config.enable_workers {
        workers::spawn_workers(
            &config,
            Arc::new(components.gdpr_service()),
            Arc::new(components.provider_sync_service()?),
        );
    } else {
        warn!("⏸️ Workers background désactivés (ENABLE_WORKERS=false)");
    }

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(app_state.clone())
            .configure(api::config)
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.workers)
    .shutdown_timeout(10);

    info!("✅ Backend démarré avec succès!");
    info!("🔗 API disponible sur http://{}:{}", config.server_host, config.server_port);

    server.run().await?;
    Ok(())
}

/// Configure le tracing pour le logging structuré
fn setup_tracing() {
    let log_level = env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".into())
        .parse()
        .unwrap_or(tracing::Level::INFO);

    let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "json".into());

    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(log_level.into()),
        )
        .with(if log_format == "json" {
            Box::new(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(true),
            ) as Box<dyn tracing_subscriber::Layer<_> + Send + Sync>
        } else {
            Box::new(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_line_number(true)
                    .with_file(true),
            ) as Box<dyn tracing_subscriber::Layer<_> + Send + Sync>
        });

    subscriber.init();
}
