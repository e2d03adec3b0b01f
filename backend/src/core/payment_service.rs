// core/payment_service.rs
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::core::payment_files::{
    details_csv, sepa_transfer_xml, CreditTransfer, Debtor, ReimbursementDetail,
};
use crate::domain::finance::{
    compute_reimbursement, CustomReimbursementRule, NewPayment, PaymentStatus, ReimbursableItem,
    ReimbursableKind,
};
use crate::domain::offerer::{Offerer, Venue};
use crate::infrastructure::connectors::finance_backend::{BankAccountPayload, InvoicePayload};
use crate::infrastructure::connectors::FinanceBackend;
use crate::infrastructure::database::Repositories;
use crate::infrastructure::error::{not_found, AppResult};
use crate::infrastructure::mailer::{Attachment, Email, EmailProvider};
use crate::infrastructure::storage::ObjectStorage;
use crate::utils::config::Config;
use crate::utils::helpers::format_cents;
use crate::utils::security::sha256_hex;

/// Paramètres des virements, tirés de la configuration
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub debtor: Debtor,
    pub output_directory: String,
    pub finance_team_email: String,
}

impl PaymentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            debtor: Debtor {
                name: config.payment_debtor_name.clone(),
                iban: config.payment_debtor_iban.clone(),
                bic: config.payment_debtor_bic.clone(),
            },
            output_directory: config.output_directory.clone(),
            finance_team_email: config.finance_team_email.clone(),
        }
    }
}

/// Bilan d'une génération de virements
#[derive(Debug, Clone, Default, Serialize)]
pub struct PaymentReport {
    pub dry_run: bool,
    pub batch_label: Option<String>,
    pub payments_count: usize,
    pub not_processable_count: usize,
    pub skipped_count: usize,
    pub total_cents: i64,
    pub files: Vec<String>,
}

struct VenueContext {
    venue: Venue,
    offerer: Offerer,
}

/// Paiement calculé, pas encore enregistré
struct PlannedPayment {
    kind: ReimbursableKind,
    booking_id: i64,
    payment: NewPayment,
    detail: ReimbursementDetail,
}

pub struct PaymentService {
    repositories: Repositories,
    storage: Arc<dyn ObjectStorage>,
    mailer: Arc<dyn EmailProvider>,
    finance_backend: Option<Arc<dyn FinanceBackend>>,
    settings: PaymentSettings,
}

impl PaymentService {
    pub fn new(
        repositories: Repositories,
        storage: Arc<dyn ObjectStorage>,
        mailer: Arc<dyn EmailProvider>,
        finance_backend: Option<Arc<dyn FinanceBackend>>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            repositories,
            storage,
            mailer,
            finance_backend,
            settings,
        }
    }

    /// Génère le lot de virements des réservations validées avant `cutoff`
    ///
    /// En `dry_run`, les fichiers sont seulement écrits dans
    /// `OUTPUT_DIRECTORY` et rien n'est enregistré.
    pub async fn generate_payments(&self, cutoff: DateTime<Utc>, dry_run: bool) -> AppResult<PaymentReport> {
        info!(%cutoff, dry_run, "💶 Génération des virements");

        let mut items = self.repositories.bookings.list_reimbursable(cutoff).await?;
        items.extend(self.repositories.collective.list_reimbursable(cutoff).await?);
        items.sort_by_key(|item| (item.date_used, item.booking_id));

        let mut report = PaymentReport {
            dry_run,
            ..PaymentReport::default()
        };
        if items.is_empty() {
            info!("Aucune réservation à rembourser");
            return Ok(report);
        }

        let since = items.iter().map(|item| item.date_used).min().unwrap_or(cutoff);
        let rules = self.repositories.finance.list_rules_active_since(since).await?;

        let mut contexts: HashMap<i64, VenueContext> = HashMap::new();
        let mut revenues: HashMap<(i64, i32), i64> = HashMap::new();
        let mut planned = Vec::with_capacity(items.len());
        for item in &items {
            match self
                .plan_payment(item, &rules, &mut contexts, &mut revenues)
                .await
            {
                Ok(payment) => planned.push(payment),
                Err(e) => {
                    error!(booking_id = item.booking_id, "❌ Réservation ignorée: {}", e);
                    report.skipped_count += 1;
                }
            }
        }

        report.payments_count = planned.len();
        report.not_processable_count = planned
            .iter()
            .filter(|p| p.payment.status == PaymentStatus::NotProcessable)
            .count();
        report.total_cents = planned
            .iter()
            .filter(|p| p.payment.status == PaymentStatus::Pending)
            .map(|p| p.payment.amount_cents)
            .sum();

        if dry_run {
            let label = format!("dry-run-{}", cutoff.format("%Y%m%d"));
            let (csv_content, xml_content) = self.build_files(&label, &planned)?;
            let directory = Path::new(&self.settings.output_directory);
            let csv_path = directory.join(format!("remboursements_{}.csv", label));
            let xml_path = directory.join(format!("virements_{}.xml", label));
            tokio::fs::write(&csv_path, csv_content).await?;
            tokio::fs::write(&xml_path, xml_content).await?;
            report.files = vec![
                csv_path.display().to_string(),
                xml_path.display().to_string(),
            ];
            info!(files = ?report.files, "📝 Fichiers de simulation écrits");
            return Ok(report);
        }

        // Les fichiers sont déposés avant tout enregistrement : un dépôt en
        // échec laisse les réservations à reprendre au lancement suivant
        let batch = self.repositories.finance.create_cashflow_batch(cutoff).await?;
        let (csv_content, xml_content) = self.build_files(&batch.label, &planned)?;
        let checksum = sha256_hex(xml_content.as_bytes());
        let csv_name = format!("remboursements_{}.csv", batch.label);
        let xml_name = format!("virements_{}.xml", batch.label);
        let csv_key = format!("payments/{}/{}", batch.label, csv_name);
        let xml_key = format!("payments/{}/{}", batch.label, xml_name);
        self.storage
            .put(&csv_key, csv_content.clone(), "text/csv")
            .await?;
        self.storage
            .put(&xml_key, xml_content.clone().into_bytes(), "application/xml")
            .await?;

        let new_payments: Vec<NewPayment> = planned.iter().map(|p| p.payment.clone()).collect();
        let payments = self
            .repositories
            .finance
            .save_payments(batch.id, &new_payments)
            .await?;
        self.repositories
            .finance
            .save_payment_message(batch.id, &xml_name, &checksum)
            .await?;

        let sent_ids: Vec<i64> = payments
            .iter()
            .filter(|payment| payment.status == PaymentStatus::Pending)
            .map(|payment| payment.id)
            .collect();
        self.repositories.finance.mark_payments_sent(&sent_ids).await?;

        let now = Utc::now();
        let processable = |kind: ReimbursableKind| -> Vec<i64> {
            planned
                .iter()
                .filter(|p| p.kind == kind && p.payment.status == PaymentStatus::Pending)
                .map(|p| p.booking_id)
                .collect()
        };
        let reimbursed = self
            .repositories
            .bookings
            .mark_reimbursed(&processable(ReimbursableKind::Individual), now)
            .await?;
        let reimbursed_collective = self
            .repositories
            .collective
            .mark_reimbursed(&processable(ReimbursableKind::Collective), now)
            .await?;
        info!(
            batch = %batch.label,
            reimbursed,
            reimbursed_collective,
            checksum = %checksum,
            "✅ Lot de virements enregistré"
        );

        let email = Email {
            to: vec![self.settings.finance_team_email.clone()],
            subject: format!("Virements pass Culture {}", batch.label),
            body: format!(
                "Lot {} ({} paiement(s), {} €).\nEmpreinte SHA-256 du fichier de virement : {}",
                batch.label,
                sent_ids.len(),
                format_cents(report.total_cents),
                checksum
            ),
            attachments: vec![
                Attachment {
                    filename: csv_name,
                    content_type: "text/csv".to_string(),
                    content: csv_content,
                },
                Attachment {
                    filename: xml_name,
                    content_type: "application/xml".to_string(),
                    content: xml_content.into_bytes(),
                },
            ],
        };
        if let Err(e) = self.mailer.send(&email).await {
            warn!("⚠️ Envoi des fichiers de virement impossible: {}", e);
        }

        self.push_to_finance_backend(&batch.label, &planned, &contexts).await;

        report.batch_label = Some(batch.label);
        report.files = vec![csv_key, xml_key];
        Ok(report)
    }

    /// Calcule le paiement d'une réservation ; le chiffre d'affaires du lieu
    /// est cumulé au fil du lot, par année de validation
    async fn plan_payment(
        &self,
        item: &ReimbursableItem,
        rules: &[CustomReimbursementRule],
        contexts: &mut HashMap<i64, VenueContext>,
        revenues: &mut HashMap<(i64, i32), i64>,
    ) -> AppResult<PlannedPayment> {
        if !contexts.contains_key(&item.venue_id) {
            let venue = self.repositories.offerers.get_venue(item.venue_id).await?;
            let offerer = self.repositories.offerers.get_offerer(venue.offerer_id).await?;
            contexts.insert(item.venue_id, VenueContext { venue, offerer });
        }
        let revenue_key = (item.venue_id, item.date_used.year());
        if !revenues.contains_key(&revenue_key) {
            let revenue = self
                .repositories
                .finance
                .venue_yearly_revenue_cents(item.venue_id, revenue_key.1)
                .await?;
            revenues.insert(revenue_key, revenue);
        }

        let total_cents = item.total_cents();
        let revenue = revenues.entry(revenue_key).or_insert(0);
        if item.kind == ReimbursableKind::Individual {
            *revenue += total_cents;
        }
        let reimbursement = compute_reimbursement(item, rules, *revenue);

        let context = contexts
            .get(&item.venue_id)
            .ok_or_else(|| not_found(format!("Lieu {}", item.venue_id)))?;
        let bank_account = context.venue.bank_account(&context.offerer);
        let status = if bank_account.is_some() {
            PaymentStatus::Pending
        } else {
            PaymentStatus::NotProcessable
        };

        let (booking_id, collective_booking_id) = match item.kind {
            ReimbursableKind::Individual => (Some(item.booking_id), None),
            ReimbursableKind::Collective => (None, Some(item.booking_id)),
        };
        let payment = NewPayment {
            booking_id,
            collective_booking_id,
            venue_id: item.venue_id,
            booking_total_cents: total_cents,
            amount_cents: reimbursement.amount_cents,
            rate: reimbursement.rate,
            rule_description: reimbursement.rule_description.clone(),
            custom_rule_id: reimbursement.custom_rule_id,
            iban: bank_account.as_ref().map(|account| account.iban.clone()),
            bic: bank_account.as_ref().map(|account| account.bic.clone()),
            recipient_siren: context.offerer.siren.clone(),
            recipient_name: context.offerer.name.clone(),
            status,
        };
        let detail = ReimbursementDetail {
            offerer_id: context.offerer.id,
            offerer_siren: context.offerer.siren.clone(),
            venue_id: context.venue.id,
            venue_name: context.venue.name.clone(),
            venue_siret: context.venue.siret.clone(),
            offer_name: item.offer_name.clone(),
            token: item.token.clone(),
            date_used: item.date_used,
            booking_amount_cents: total_cents,
            rule_description: reimbursement.rule_description,
            reimbursed_amount_cents: reimbursement.amount_cents,
            offer_type: match item.kind {
                ReimbursableKind::Individual => "offre grand public",
                ReimbursableKind::Collective => "offre EAC",
            },
        };

        Ok(PlannedPayment {
            kind: item.kind,
            booking_id: item.booking_id,
            payment,
            detail,
        })
    }

    /// Détail CSV de tous les paiements et virement XML des paiements traitables
    fn build_files(&self, label: &str, planned: &[PlannedPayment]) -> AppResult<(Vec<u8>, String)> {
        let details: Vec<ReimbursementDetail> = planned
            .iter()
            .filter(|p| p.payment.status == PaymentStatus::Pending)
            .map(|p| p.detail.clone())
            .collect();
        let csv_content = details_csv(&details)?;

        let transfers: Vec<CreditTransfer> = group_by_venue(planned)
            .into_iter()
            .filter_map(|(venue_id, payments)| {
                let first = payments.first()?;
                let amount_cents: i64 = payments.iter().map(|p| p.payment.amount_cents).sum();
                if amount_cents <= 0 {
                    return None;
                }
                Some(CreditTransfer {
                    end_to_end_id: format!("{}-{}", label, venue_id),
                    creditor_name: first.detail.venue_name.clone(),
                    iban: first.payment.iban.clone()?,
                    bic: first.payment.bic.clone()?,
                    amount_cents,
                    remittance_information: format!("pass Culture {} lieu {}", label, venue_id),
                })
            })
            .collect();
        let xml_content = sepa_transfer_xml(
            &format!("passCulture-{}", label),
            &self.settings.debtor,
            &transfers,
            Utc::now(),
        );
        Ok((csv_content, xml_content))
    }

    /// Transmet coordonnées bancaires et factures au backend financier ; les
    /// erreurs n'interrompent pas le lot
    async fn push_to_finance_backend(
        &self,
        batch_label: &str,
        planned: &[PlannedPayment],
        contexts: &HashMap<i64, VenueContext>,
    ) {
        let Some(backend) = &self.finance_backend else {
            return;
        };
        for (venue_id, payments) in group_by_venue(planned) {
            let Some(context) = contexts.get(&venue_id) else {
                continue;
            };
            let Some(account) = context.venue.bank_account(&context.offerer) else {
                continue;
            };
            let bank_account = BankAccountPayload {
                venue_id,
                label: context.venue.name.clone(),
                iban: account.iban,
                bic: account.bic,
            };
            if let Err(e) = backend.push_bank_account(&bank_account).await {
                warn!(venue_id, "⚠️ Coordonnées bancaires non transmises: {}", e);
                continue;
            }
            let invoice = InvoicePayload {
                reference: format!("{}-{}", batch_label, venue_id),
                venue_id,
                siret: context.venue.siret.clone(),
                amount_cents: payments.iter().map(|p| p.payment.amount_cents).sum(),
                booking_count: payments.len(),
                batch_label: batch_label.to_string(),
            };
            match backend.push_invoice(&invoice).await {
                Ok(id) => info!(venue_id, invoice_id = %id, "🧾 Facture transmise"),
                Err(e) => warn!(venue_id, "⚠️ Facture non transmise: {}", e),
            }
        }
    }
}

/// Paiements traitables regroupés par lieu
fn group_by_venue(planned: &[PlannedPayment]) -> BTreeMap<i64, Vec<&PlannedPayment>> {
    let mut groups: BTreeMap<i64, Vec<&PlannedPayment>> = BTreeMap::new();
    for payment in planned
        .iter()
        .filter(|p| p.payment.status == PaymentStatus::Pending)
    {
        groups.entry(payment.payment.venue_id).or_default().push(payment);
    }
    groups
}
