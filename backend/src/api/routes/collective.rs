use actix_web::{get, patch, web, HttpResponse};

use crate::api::routes::middleware::AuthenticatedOfferer;
use crate::api::AppState;
use crate::infrastructure::error::AppResult;

/// Offres collectives des lieux de la structure
#[get("/collective/offers")]
pub async fn list_collective_offers(
    auth: AuthenticatedOfferer,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let offers = state.bookings.list_collective_offers(auth.offerer_id).await?;
    Ok(HttpResponse::Ok().json(offers))
}

#[patch("/collective/bookings/{booking_id}/cancel")]
pub async fn cancel_collective_booking(
    auth: AuthenticatedOfferer,
    booking_id: web::Path<i64>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    state
        .bookings
        .cancel_collective_booking(auth.offerer_id, booking_id.into_inner())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
