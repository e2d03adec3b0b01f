//! Contremarques de l'API publique v2
//!
//! Les codes de retour suivent ceux attendus par les logiciels de
//! billetterie des partenaires : 204 en cas de succès, 403 pour une
//! réservation d'une autre structure, 404 pour une contremarque inconnue,
//! 410 pour une réservation déjà validée, annulée ou remboursée.

use actix_web::{get, patch, web, HttpResponse};

use crate::api::routes::middleware::AuthenticatedOfferer;
use crate::api::AppState;
use crate::infrastructure::error::AppResult;

#[get("/bookings/token/{token}")]
pub async fn get_booking_by_token(
    auth: AuthenticatedOfferer,
    token: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let details = state
        .bookings
        .get_booking_by_token(auth.offerer_id, &token)
        .await?;
    Ok(HttpResponse::Ok().json(details))
}

#[patch("/bookings/use/token/{token}")]
pub async fn use_booking(
    auth: AuthenticatedOfferer,
    token: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    state.bookings.use_booking(auth.offerer_id, &token).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[patch("/bookings/keep/token/{token}")]
pub async fn keep_booking(
    auth: AuthenticatedOfferer,
    token: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    state.bookings.keep_booking(auth.offerer_id, &token).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[patch("/bookings/cancel/token/{token}")]
pub async fn cancel_booking(
    auth: AuthenticatedOfferer,
    token: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    state.bookings.cancel_booking(auth.offerer_id, &token).await?;
    Ok(HttpResponse::NoContent().finish())
}
