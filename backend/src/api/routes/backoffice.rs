//! # Backoffice
//!
//! Outils des agents pass Culture, exposés en JSON. Hormis `/login`, chaque
//! route exige un jeton de session d'agent (`BackofficeUser`).

use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{get, patch, post, web, HttpResponse};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::api::routes::middleware::BackofficeUser;
use crate::api::AppState;
use crate::core::fraud_service::ReviewRequest;
use crate::core::user_service::GenerateUserRequest;
use crate::domain::finance::NewCustomRule;
use crate::domain::fraud::{FraudCheckType, IdentityContent};
use crate::infrastructure::database::RuleFilter;
use crate::infrastructure::error::AppResult;

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Format d'email invalide"))]
    pub email: String,
    #[validate(length(min = 1, message = "Le mot de passe est requis"))]
    pub password: String,
}

#[derive(Deserialize)]
pub struct EditRuleRequest {
    pub end_date: NaiveDate,
}

#[derive(Deserialize)]
pub struct CreateOffererRequest {
    pub siren: String,
}

#[derive(Deserialize)]
pub struct IdentityCheckRequest {
    pub check_type: FraudCheckType,
    #[serde(flatten)]
    pub content: IdentityContent,
}

#[post("/login")]
pub async fn login(
    credentials: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    credentials.validate()?;
    let token = state
        .users
        .login(&credentials.email, &credentials.password)
        .await?;
    Ok(HttpResponse::Ok().json(token))
}

/// Tarifs dérogatoires, filtrables par structure, lieu ou offre
#[get("/reimbursement-rules")]
pub async fn list_rules(
    _agent: BackofficeUser,
    filter: web::Query<RuleFilter>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let rules = state.reimbursements.list_rules(&filter).await?;
    Ok(HttpResponse::Ok().json(rules))
}

#[post("/reimbursement-rules")]
pub async fn create_rule(
    agent: BackofficeUser,
    request: web::Json<NewCustomRule>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let rule = state.reimbursements.create_rule(&request).await?;
    info!(rule_id = rule.id, agent = %agent.email, "🧾 Tarif dérogatoire créé depuis le backoffice");
    Ok(HttpResponse::Created().json(rule))
}

#[patch("/reimbursement-rules/{rule_id}")]
pub async fn edit_rule(
    _agent: BackofficeUser,
    rule_id: web::Path<i64>,
    request: web::Json<EditRuleRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let rule = state
        .reimbursements
        .edit_end_date(rule_id.into_inner(), request.end_date)
        .await?;
    Ok(HttpResponse::Ok().json(rule))
}

/// Création d'une structure à partir des données SIRENE
#[post("/offerers")]
pub async fn create_offerer(
    _agent: BackofficeUser,
    request: web::Json<CreateOffererRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let (offerer, venue) = state
        .offerers
        .create_offerer_from_siren(request.siren.trim())
        .await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "offerer": offerer,
        "venue": venue,
    })))
}

#[post("/offerers/{offerer_id}/api-keys")]
pub async fn create_api_key(
    agent: BackofficeUser,
    offerer_id: web::Path<i64>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let key = state
        .offerers
        .generate_api_key(offerer_id.into_inner(), &state.api_key_prefix)
        .await?;
    info!(offerer_id = key.offerer_id, agent = %agent.email, "🔑 Clé d'API générée");
    Ok(HttpResponse::Created().json(key))
}

#[get("/fraud/users/{user_id}")]
pub async fn user_fraud_details(
    _agent: BackofficeUser,
    user_id: web::Path<i64>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let details = state.fraud.user_fraud_details(user_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(details))
}

/// Saisie d'une vérification d'identité reçue hors ligne
#[post("/fraud/users/{user_id}/identity-check")]
pub async fn run_identity_check(
    _agent: BackofficeUser,
    user_id: web::Path<i64>,
    request: web::Json<IdentityCheckRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let check = state
        .fraud
        .run_identity_check(user_id.into_inner(), request.check_type, &request.content)
        .await?;
    Ok(HttpResponse::Created().json(check))
}

#[post("/fraud/users/{user_id}/review")]
pub async fn review_user(
    agent: BackofficeUser,
    user_id: web::Path<i64>,
    request: web::Json<ReviewRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let outcome = state
        .fraud
        .review(user_id.into_inner(), agent.user_id, &request)
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// Utilisateur de test pour la recette
#[post("/users/generate")]
pub async fn generate_user(
    _agent: BackofficeUser,
    request: web::Json<GenerateUserRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let user = state.users.generate_test_user(&request).await?;
    Ok(HttpResponse::Created().json(user))
}

#[post("/users/{user_id}/gdpr-extract")]
pub async fn request_gdpr_extract(
    agent: BackofficeUser,
    user_id: web::Path<i64>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let extract = state
        .gdpr
        .request_extract(user_id.into_inner(), agent.user_id)
        .await?;
    Ok(HttpResponse::Created().json(extract))
}

#[get("/gdpr-extracts")]
pub async fn list_gdpr_extracts(
    _agent: BackofficeUser,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let extracts = state.gdpr.list_extracts().await?;
    Ok(HttpResponse::Ok().json(extracts))
}

#[get("/gdpr-extracts/{extract_id}/download")]
pub async fn download_gdpr_extract(
    agent: BackofficeUser,
    extract_id: web::Path<i64>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let extract_id = extract_id.into_inner();
    let (filename, content) = state.gdpr.download_extract(extract_id).await?;
    info!(extract_id, agent = %agent.email, "📥 Téléchargement d'un export RGPD");
    Ok(HttpResponse::Ok()
        .content_type("application/zip")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename)],
        })
        .body(content))
}
