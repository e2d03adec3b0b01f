//! Sous-catégories d'offres et règle de remboursement associée.

use serde::Serialize;

/// Barème de remboursement appliqué par défaut à une sous-catégorie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReimbursementRuleKind {
    /// Barème dégressif général
    Standard,
    /// Barème spécifique au livre (prix unique)
    Book,
    /// Offres numériques non remboursées
    NotReimbursed,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Subcategory {
    pub id: &'static str,
    pub category_id: &'static str,
    pub label: &'static str,
    pub is_event: bool,
    pub is_digital: bool,
    pub reimbursement_rule: ReimbursementRuleKind,
}

const fn subcategory(
    id: &'static str,
    category_id: &'static str,
    label: &'static str,
    is_event: bool,
    is_digital: bool,
    reimbursement_rule: ReimbursementRuleKind,
) -> Subcategory {
    Subcategory {
        id,
        category_id,
        label,
        is_event,
        is_digital,
        reimbursement_rule,
    }
}

use ReimbursementRuleKind::{Book, NotReimbursed, Standard};

pub const SEANCE_CINE: &str = "SEANCE_CINE";
pub const LIVRE_PAPIER: &str = "LIVRE_PAPIER";

pub static ALL_SUBCATEGORIES: &[Subcategory] = &[
    subcategory(SEANCE_CINE, "CINEMA", "Séance de cinéma", true, false, Standard),
    subcategory("CINE_PLEIN_AIR", "CINEMA", "Cinéma plein air", true, false, Standard),
    subcategory("CARTE_CINE_ILLIMITE", "CINEMA", "Carte cinéma illimité", false, false, Standard),
    subcategory("SUPPORT_PHYSIQUE_FILM", "FILM", "Support physique (DVD, Blu-ray...)", false, false, Standard),
    subcategory("ABO_PLATEFORME_VIDEO", "FILM", "Abonnement plateforme streaming", false, true, NotReimbursed),
    subcategory("VOD", "FILM", "Vidéo à la demande", false, true, NotReimbursed),
    subcategory(LIVRE_PAPIER, "LIVRE", "Livre papier", false, false, Book),
    subcategory("LIVRE_NUMERIQUE", "LIVRE", "Livre numérique, e-book", false, true, Book),
    subcategory("LIVRE_AUDIO_PHYSIQUE", "LIVRE", "Livre audio sur support physique", false, false, Book),
    subcategory("CONCERT", "MUSIQUE_LIVE", "Concert", true, false, Standard),
    subcategory("FESTIVAL_MUSIQUE", "MUSIQUE_LIVE", "Festival de musique", true, false, Standard),
    subcategory("SUPPORT_PHYSIQUE_MUSIQUE_CD", "MUSIQUE_ENREGISTREE", "CD", false, false, Standard),
    subcategory("SUPPORT_PHYSIQUE_MUSIQUE_VINYLE", "MUSIQUE_ENREGISTREE", "Vinyles et autres supports", false, false, Standard),
    subcategory("ABO_PLATEFORME_MUSIQUE", "MUSIQUE_ENREGISTREE", "Abonnement plateforme musicale", false, true, NotReimbursed),
    subcategory("SPECTACLE_REPRESENTATION", "SPECTACLE", "Spectacle, représentation", true, false, Standard),
    subcategory("VISITE", "MUSEE", "Visite", true, false, Standard),
    subcategory("VISITE_GUIDEE", "MUSEE", "Visite guidée", true, false, Standard),
    subcategory("ATELIER_PRATIQUE_ART", "PRATIQUE_ART", "Atelier, stage de pratique artistique", true, false, Standard),
    subcategory("ACHAT_INSTRUMENT", "INSTRUMENT", "Achat instrument", false, false, Standard),
    subcategory("JEU_EN_LIGNE", "JEU", "Jeux en ligne", false, true, NotReimbursed),
    subcategory("ABO_PRESSE_EN_LIGNE", "MEDIA", "Abonnement presse en ligne", false, true, Standard),
];

/// Recherche une sous-catégorie par identifiant
pub fn find(subcategory_id: &str) -> Option<&'static Subcategory> {
    ALL_SUBCATEGORIES.iter().find(|s| s.id == subcategory_id)
}

/// Vrai si l'identifiant correspond à une sous-catégorie connue
pub fn exists(subcategory_id: &str) -> bool {
    find(subcategory_id).is_some()
}
