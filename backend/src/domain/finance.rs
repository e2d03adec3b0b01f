//! Règles de remboursement des réservations et lots de virements.
//!
//! Le montant remboursé d'une réservation validée provient :
//! - d'un tarif dérogatoire actif et pertinent (offre, puis lieu, puis structure),
//! - à défaut, du barème standard, dégressif selon le chiffre d'affaires
//!   annuel du lieu.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::categories::{self, ReimbursementRuleKind};
use crate::utils::helpers::{start_of_day, to_cents};
use crate::utils::validation::FormErrors;

/// Nombre maximal de tarifs dérogatoires listés dans le backoffice
pub const MAX_LISTED_RULES: i64 = 25;

/// Seuils du barème standard, en centimes de chiffre d'affaires annuel
pub const REVENUE_THRESHOLD_20K: i64 = 20_000_00;
pub const REVENUE_THRESHOLD_40K: i64 = 40_000_00;
pub const REVENUE_THRESHOLD_150K: i64 = 150_000_00;

/// Tarif dérogatoire : taux (structure, lieu) ou montant unitaire (offre)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomReimbursementRule {
    pub id: i64,
    pub offerer_id: Option<i64>,
    pub venue_id: Option<i64>,
    pub offer_id: Option<i64>,
    /// Sous-catégories concernées ; vide = toutes
    pub subcategories: Vec<String>,
    /// Taux entre 0 et 1
    pub rate: Option<Decimal>,
    /// Montant remboursé par unité réservée, en centimes
    pub amount: Option<i64>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub date_created: DateTime<Utc>,
}

/// Cible d'un tarif dérogatoire, par ordre de priorité
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RuleTarget {
    Offer(i64),
    Venue(i64),
    Offerer(i64),
}

impl CustomReimbursementRule {
    pub fn target(&self) -> Option<RuleTarget> {
        match (self.offer_id, self.venue_id, self.offerer_id) {
            (Some(id), None, None) => Some(RuleTarget::Offer(id)),
            (None, Some(id), None) => Some(RuleTarget::Venue(id)),
            (None, None, Some(id)) => Some(RuleTarget::Offerer(id)),
            _ => None,
        }
    }

    /// Actif si `start_date <= date < end_date`
    pub fn is_active(&self, date: DateTime<Utc>) -> bool {
        self.start_date <= date && self.end_date.map(|end| date < end).unwrap_or(true)
    }

    pub fn is_relevant(&self, item: &ReimbursableItem) -> bool {
        let target_matches = match self.target() {
            Some(RuleTarget::Offer(id)) => item.offer_id == id,
            Some(RuleTarget::Venue(id)) => item.venue_id == id,
            Some(RuleTarget::Offerer(id)) => item.offerer_id == id,
            None => false,
        };
        let subcategory_matches = self.subcategories.is_empty()
            || item
                .subcategory_id
                .as_ref()
                .map(|id| self.subcategories.contains(id))
                .unwrap_or(false);
        target_matches && subcategory_matches
    }

    /// Montant remboursé en centimes
    pub fn apply(&self, item: &ReimbursableItem) -> i64 {
        if let Some(amount) = self.amount {
            return amount * i64::from(item.quantity);
        }
        let rate = self.rate.unwrap_or(Decimal::ZERO);
        (Decimal::from(item.total_cents()) * rate)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .unwrap_or(0)
    }

    pub fn description(&self) -> String {
        match (self.amount, self.rate) {
            (Some(amount), _) => format!(
                "Tarif dérogatoire n°{} : {} € par unité",
                self.id,
                crate::utils::helpers::format_cents(amount)
            ),
            (None, Some(rate)) => format!(
                "Tarif dérogatoire n°{} : {}%",
                self.id,
                (rate * Decimal::from(100)).normalize()
            ),
            (None, None) => format!("Tarif dérogatoire n°{}", self.id),
        }
    }

    fn overlaps(&self, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> bool {
        let self_end_after_start = self.end_date.map(|e| e > start).unwrap_or(true);
        let end_after_self_start = end.map(|e| e > self.start_date).unwrap_or(true);
        self_end_after_start && end_after_self_start
    }
}

/// Demande de création d'un tarif dérogatoire
#[derive(Debug, Clone, Deserialize)]
pub struct NewCustomRule {
    pub offerer_id: Option<i64>,
    pub venue_id: Option<i64>,
    pub offer_id: Option<i64>,
    #[serde(default)]
    pub subcategories: Vec<String>,
    /// Taux saisi en pourcentage (ex : 95.5)
    pub rate_percent: Option<Decimal>,
    /// Montant unitaire en centimes
    pub amount: Option<i64>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl NewCustomRule {
    pub fn rate(&self) -> Option<Decimal> {
        self.rate_percent.map(|percent| percent / Decimal::from(100))
    }

    pub fn start_datetime(&self) -> DateTime<Utc> {
        start_of_day(self.start_date)
    }

    pub fn end_datetime(&self) -> Option<DateTime<Utc>> {
        self.end_date.map(start_of_day)
    }

    /// Vérifie la cohérence du formulaire ; `tomorrow` est la première date de
    /// début autorisée
    pub fn check(&self, tomorrow: NaiveDate) -> FormErrors {
        let mut errors = FormErrors::new();

        let targets = [self.offer_id, self.venue_id, self.offerer_id]
            .iter()
            .filter(|id| id.is_some())
            .count();
        if self.venue_id.is_some() && self.offerer_id.is_some() {
            errors.add(
                "venue_id",
                "Un tarif dérogatoire ne peut pas concerner un partenaire culturel et une entité juridique en même temps",
            );
        } else if targets != 1 {
            errors.add(
                "offerer_id",
                "Un tarif dérogatoire doit concerner une offre, un lieu ou une structure (un seul)",
            );
        }

        match (self.rate_percent, self.amount) {
            (Some(_), Some(_)) | (None, None) => errors.add(
                "rate",
                "Un tarif dérogatoire doit avoir un taux ou un montant (mais pas les deux)",
            ),
            (Some(rate), None) => {
                if rate < Decimal::ZERO {
                    errors.add("rate", "Doit contenir un nombre positif");
                } else if rate > Decimal::from(100) {
                    errors.add("rate", "Doit contenir un nombre inférieur ou égal à 100");
                }
                if self.offer_id.is_some() {
                    errors.add("rate", "Un taux ne peut concerner qu'une structure ou un lieu");
                }
            }
            (None, Some(amount)) => {
                if amount < 0 {
                    errors.add("amount", "Doit contenir un nombre positif");
                }
                if self.offer_id.is_none() {
                    errors.add("amount", "Un montant ne peut concerner qu'une offre");
                }
            }
        }

        if self.start_date < tomorrow {
            errors.add("start_date", "Ne peut pas commencer avant demain");
        }
        if let Some(end_date) = self.end_date {
            if self.start_date >= end_date {
                errors.add("start_date", "Ne peut pas être postérieure à la date de fin");
            }
        }

        for subcategory_id in &self.subcategories {
            if !categories::exists(subcategory_id) {
                errors.add(
                    "subcategories",
                    format!("Sous-catégorie inconnue : {}", subcategory_id),
                );
            }
        }

        errors
    }

    /// Tarifs existants sur la même cible, dont la période et les
    /// sous-catégories recouvrent celles de la demande
    pub fn conflicting_rules<'a>(
        &self,
        existing: &'a [CustomReimbursementRule],
    ) -> Vec<&'a CustomReimbursementRule> {
        let start = self.start_datetime();
        let end = self.end_datetime();
        existing
            .iter()
            .filter(|rule| {
                rule.offer_id == self.offer_id
                    && rule.venue_id == self.venue_id
                    && rule.offerer_id == self.offerer_id
            })
            .filter(|rule| {
                rule.subcategories.is_empty()
                    || self.subcategories.is_empty()
                    || rule.subcategories.iter().any(|s| self.subcategories.contains(s))
            })
            .filter(|rule| rule.overlaps(start, end))
            .collect()
    }
}

/// Vérifie la modification de la date de fin d'un tarif existant
pub fn check_end_date_edit(
    rule: &CustomReimbursementRule,
    new_end_date: NaiveDate,
    today: NaiveDate,
) -> FormErrors {
    let mut errors = FormErrors::new();
    if rule.end_date.is_some() {
        errors.add(
            "end_date",
            "Il n'est pas possible de modifier la date de fin lorsque celle-ci est déjà définie.",
        );
    } else if new_end_date <= today {
        errors.add("end_date", "La date de fin doit être postérieure à la date du jour.");
    } else if start_of_day(new_end_date) <= rule.start_date {
        errors.add("end_date", "La date de fin doit être postérieure à la date de début.");
    }
    errors
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReimbursableKind {
    Individual,
    Collective,
}

/// Réservation validée, vue sous l'angle du remboursement
#[derive(Debug, Clone, Serialize)]
pub struct ReimbursableItem {
    pub kind: ReimbursableKind,
    pub booking_id: i64,
    pub token: Option<String>,
    pub offer_id: i64,
    pub offer_name: String,
    pub venue_id: i64,
    pub offerer_id: i64,
    pub subcategory_id: Option<String>,
    pub quantity: i32,
    pub unit_amount: Decimal,
    pub date_used: DateTime<Utc>,
}

impl ReimbursableItem {
    pub fn total_cents(&self) -> i64 {
        to_cents(self.unit_amount * Decimal::from(self.quantity))
    }
}

/// Résultat du calcul de remboursement d'une réservation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reimbursement {
    pub amount_cents: i64,
    pub rate: Option<Decimal>,
    pub rule_description: String,
    pub custom_rule_id: Option<i64>,
}

/// Taux du barème standard, selon le chiffre d'affaires annuel du lieu
/// (réservation en cours incluse)
pub fn standard_rate(kind: ReimbursementRuleKind, yearly_revenue_cents: i64) -> (Decimal, &'static str) {
    match kind {
        ReimbursementRuleKind::NotReimbursed => (
            Decimal::ZERO,
            "Pas de remboursement pour les offres numériques",
        ),
        ReimbursementRuleKind::Book if yearly_revenue_cents > REVENUE_THRESHOLD_20K => (
            Decimal::new(95, 2),
            "Remboursement à 95% au-delà de 20 000 € pour les livres",
        ),
        ReimbursementRuleKind::Book => (
            Decimal::ONE,
            "Remboursement total pour les offres physiques",
        ),
        ReimbursementRuleKind::Standard => {
            if yearly_revenue_cents <= REVENUE_THRESHOLD_20K {
                (Decimal::ONE, "Remboursement total pour les offres physiques")
            } else if yearly_revenue_cents <= REVENUE_THRESHOLD_40K {
                (
                    Decimal::new(95, 2),
                    "Remboursement à 95% entre 20 000 € et 40 000 € par lieu et par an",
                )
            } else if yearly_revenue_cents <= REVENUE_THRESHOLD_150K {
                (
                    Decimal::new(92, 2),
                    "Remboursement à 92% entre 40 000 € et 150 000 € par lieu et par an",
                )
            } else {
                (
                    Decimal::new(90, 2),
                    "Remboursement à 90% au-delà de 150 000 € par lieu et par an",
                )
            }
        }
    }
}

/// Calcule le remboursement d'une réservation
///
/// # Arguments
/// * `item` - La réservation validée
/// * `custom_rules` - Les tarifs dérogatoires candidats (lieu, structure, offre)
/// * `yearly_revenue_cents` - Le chiffre d'affaires annuel du lieu, réservation incluse
pub fn compute_reimbursement(
    item: &ReimbursableItem,
    custom_rules: &[CustomReimbursementRule],
    yearly_revenue_cents: i64,
) -> Reimbursement {
    if item.kind == ReimbursableKind::Collective {
        return Reimbursement {
            amount_cents: item.total_cents(),
            rate: Some(Decimal::ONE),
            rule_description: "Remboursement total pour les offres éducationnelles".to_string(),
            custom_rule_id: None,
        };
    }

    let custom_rule = custom_rules
        .iter()
        .filter(|rule| rule.is_active(item.date_used) && rule.is_relevant(item))
        .min_by_key(|rule| rule.target());
    if let Some(rule) = custom_rule {
        return Reimbursement {
            amount_cents: rule.apply(item),
            rate: rule.rate,
            rule_description: rule.description(),
            custom_rule_id: Some(rule.id),
        };
    }

    let kind = item
        .subcategory_id
        .as_deref()
        .and_then(categories::find)
        .map(|subcategory| subcategory.reimbursement_rule)
        .unwrap_or(ReimbursementRuleKind::Standard);
    let (rate, description) = standard_rate(kind, yearly_revenue_cents);
    let amount_cents = (Decimal::from(item.total_cents()) * rate)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0);

    Reimbursement {
        amount_cents,
        rate: Some(rate),
        rule_description: description.to_string(),
        custom_rule_id: None,
    }
}

/// Lot de virements généré pour une date de coupure
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CashflowBatch {
    pub id: i64,
    pub label: String,
    pub cutoff: DateTime<Utc>,
    pub date_created: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    NotProcessable,
    Sent,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: i64,
    pub batch_id: i64,
    pub booking_id: Option<i64>,
    pub collective_booking_id: Option<i64>,
    pub venue_id: i64,
    /// Montant de la réservation, utilisé pour le chiffre d'affaires du lieu
    pub booking_total_cents: i64,
    pub amount_cents: i64,
    pub rate: Option<Decimal>,
    pub rule_description: String,
    pub custom_rule_id: Option<i64>,
    pub iban: Option<String>,
    pub bic: Option<String>,
    pub recipient_siren: String,
    pub recipient_name: String,
    pub status: PaymentStatus,
    pub date_created: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub booking_id: Option<i64>,
    pub collective_booking_id: Option<i64>,
    pub venue_id: i64,
    /// Montant de la réservation, utilisé pour le chiffre d'affaires du lieu
    pub booking_total_cents: i64,
    pub amount_cents: i64,
    pub rate: Option<Decimal>,
    pub rule_description: String,
    pub custom_rule_id: Option<i64>,
    pub iban: Option<String>,
    pub bic: Option<String>,
    pub recipient_siren: String,
    pub recipient_name: String,
    pub status: PaymentStatus,
}

/// Fichier de virement transmis à la banque, avec son empreinte
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentMessage {
    pub id: i64,
    pub batch_id: i64,
    pub name: String,
    pub checksum: String,
    pub date_created: DateTime<Utc>,
}
