//! Fichiers produits par un lot de virements : détail des remboursements
//! (CSV `;`) et ordre de virement SEPA (XML pain.001.001.03).

use chrono::{DateTime, Utc};

use crate::infrastructure::error::{AppError, AppResult};
use crate::utils::helpers::format_cents;

pub const DETAILS_CSV_HEADERS: [&str; 12] = [
    "Identifiant de la structure",
    "SIREN de la structure",
    "Identifiant du lieu",
    "Nom du lieu",
    "SIRET du lieu",
    "Nom de l'offre",
    "Contremarque",
    "Date de validation de la réservation",
    "Montant de la réservation",
    "Barème",
    "Montant remboursé",
    "Type d'offre",
];

/// Une ligne du détail des remboursements
#[derive(Debug, Clone)]
pub struct ReimbursementDetail {
    pub offerer_id: i64,
    pub offerer_siren: String,
    pub venue_id: i64,
    pub venue_name: String,
    pub venue_siret: Option<String>,
    pub offer_name: String,
    pub token: Option<String>,
    pub date_used: DateTime<Utc>,
    pub booking_amount_cents: i64,
    pub rule_description: String,
    pub reimbursed_amount_cents: i64,
    pub offer_type: &'static str,
}

pub fn details_csv(rows: &[ReimbursementDetail]) -> AppResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(Vec::new());
    writer.write_record(DETAILS_CSV_HEADERS)?;
    for row in rows {
        writer.write_record([
            row.offerer_id.to_string(),
            row.offerer_siren.clone(),
            row.venue_id.to_string(),
            row.venue_name.clone(),
            row.venue_siret.clone().unwrap_or_default(),
            row.offer_name.clone(),
            row.token.clone().unwrap_or_default(),
            row.date_used.format("%Y-%m-%d %H:%M:%S").to_string(),
            format_cents(row.booking_amount_cents),
            row.rule_description.clone(),
            format_cents(row.reimbursed_amount_cents),
            row.offer_type.to_string(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::InternalError(format!("Écriture du CSV impossible: {}", e)))
}

/// Compte débité (pass Culture)
#[derive(Debug, Clone)]
pub struct Debtor {
    pub name: String,
    pub iban: String,
    pub bic: String,
}

/// Virement vers le compte d'un lieu
#[derive(Debug, Clone)]
pub struct CreditTransfer {
    pub end_to_end_id: String,
    pub creditor_name: String,
    pub iban: String,
    pub bic: String,
    pub amount_cents: i64,
    pub remittance_information: String,
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Montant au format SEPA : `1234.50`
fn sepa_amount(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

/// Ordre de virement groupé, un virement par lieu
pub fn sepa_transfer_xml(
    message_id: &str,
    debtor: &Debtor,
    transfers: &[CreditTransfer],
    created_at: DateTime<Utc>,
) -> String {
    let total_cents: i64 = transfers.iter().map(|transfer| transfer.amount_cents).sum();
    let created = created_at.format("%Y-%m-%dT%H:%M:%S").to_string();
    let execution_date = created_at.format("%Y-%m-%d").to_string();

    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(
        "<Document xmlns=\"urn:iso:std:iso:20022:tech:xsd:pain.001.001.03\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\n",
    );
    xml.push_str("  <CstmrCdtTrfInitn>\n");
    xml.push_str("    <GrpHdr>\n");
    xml.push_str(&format!("      <MsgId>{}</MsgId>\n", escape_xml(message_id)));
    xml.push_str(&format!("      <CreDtTm>{}</CreDtTm>\n", created));
    xml.push_str(&format!("      <NbOfTxs>{}</NbOfTxs>\n", transfers.len()));
    xml.push_str(&format!("      <CtrlSum>{}</CtrlSum>\n", sepa_amount(total_cents)));
    xml.push_str(&format!(
        "      <InitgPty><Nm>{}</Nm></InitgPty>\n",
        escape_xml(&debtor.name)
    ));
    xml.push_str("    </GrpHdr>\n");
    xml.push_str("    <PmtInf>\n");
    xml.push_str(&format!("      <PmtInfId>{}</PmtInfId>\n", escape_xml(message_id)));
    xml.push_str("      <PmtMtd>TRF</PmtMtd>\n");
    xml.push_str(&format!("      <NbOfTxs>{}</NbOfTxs>\n", transfers.len()));
    xml.push_str(&format!("      <CtrlSum>{}</CtrlSum>\n", sepa_amount(total_cents)));
    xml.push_str("      <PmtTpInf><SvcLvl><Cd>SEPA</Cd></SvcLvl></PmtTpInf>\n");
    xml.push_str(&format!("      <ReqdExctnDt>{}</ReqdExctnDt>\n", execution_date));
    xml.push_str(&format!("      <Dbtr><Nm>{}</Nm></Dbtr>\n", escape_xml(&debtor.name)));
    xml.push_str(&format!(
        "      <DbtrAcct><Id><IBAN>{}</IBAN></Id></DbtrAcct>\n",
        escape_xml(&debtor.iban)
    ));
    xml.push_str(&format!(
        "      <DbtrAgt><FinInstnId><BIC>{}</BIC></FinInstnId></DbtrAgt>\n",
        escape_xml(&debtor.bic)
    ));
    xml.push_str("      <ChrgBr>SLEV</ChrgBr>\n");
    for transfer in transfers {
        xml.push_str("      <CdtTrfTxInf>\n");
        xml.push_str(&format!(
            "        <PmtId><EndToEndId>{}</EndToEndId></PmtId>\n",
            escape_xml(&transfer.end_to_end_id)
        ));
        xml.push_str(&format!(
            "        <Amt><InstdAmt Ccy=\"EUR\">{}</InstdAmt></Amt>\n",
            sepa_amount(transfer.amount_cents)
        ));
        xml.push_str(&format!(
            "        <CdtrAgt><FinInstnId><BIC>{}</BIC></FinInstnId></CdtrAgt>\n",
            escape_xml(&transfer.bic)
        ));
        xml.push_str(&format!(
            "        <Cdtr><Nm>{}</Nm></Cdtr>\n",
            escape_xml(&transfer.creditor_name)
        ));
        xml.push_str(&format!(
            "        <CdtrAcct><Id><IBAN>{}</IBAN></Id></CdtrAcct>\n",
            escape_xml(&transfer.iban)
        ));
        xml.push_str(&format!(
            "        <RmtInf><Ustrd>{}</Ustrd></RmtInf>\n",
            escape_xml(&transfer.remittance_information)
        ));
        xml.push_str("      </CdtTrfTxInf>\n");
    }
    xml.push_str("    </PmtInf>\n");
    xml.push_str("  </CstmrCdtTrfInitn>\n");
    xml.push_str("</Document>\n");
    xml
}
