use actix_web::{get, post, web, HttpResponse};

use crate::api::routes::middleware::AuthenticatedOfferer;
use crate::api::AppState;
use crate::domain::offerer::NewVenue;
use crate::domain::provider::NewVenueProvider;
use crate::infrastructure::error::AppResult;

/// Nombre d'offres actives, de réservations et chiffre d'affaires
#[get("/offerers/statistics")]
pub async fn statistics(
    auth: AuthenticatedOfferer,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let statistics = state.offerers.statistics(auth.offerer_id).await?;
    Ok(HttpResponse::Ok().json(statistics))
}

#[post("/venues")]
pub async fn create_venue(
    auth: AuthenticatedOfferer,
    request: web::Json<NewVenue>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let venue = state.offerers.create_venue(auth.offerer_id, &request).await?;
    Ok(HttpResponse::Created().json(venue))
}

#[post("/venues/{venue_id}/providers")]
pub async fn link_venue_provider(
    auth: AuthenticatedOfferer,
    venue_id: web::Path<i64>,
    request: web::Json<NewVenueProvider>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let venue_provider = state
        .offerers
        .link_venue_provider(auth.offerer_id, venue_id.into_inner(), &request)
        .await?;
    Ok(HttpResponse::Created().json(venue_provider))
}

#[cfg(test)]
mod tests {
    use crate::api::config;
    use crate::api::tests::test_state;
    use crate::domain::booking::tests::booking;
    use crate::domain::booking::BookingStatus;
    use crate::domain::offerer::tests::offerer;
    use crate::domain::provider::{Provider, ProviderKind};
    use crate::infrastructure::memory::InMemoryStore;
    use actix_web::{http::StatusCode, test, App};
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    #[actix_web::test]
    async fn venues_are_created_and_linked_to_providers() {
        let store = InMemoryStore::new();
        {
            let mut state = store.state();
            state.offerers.push(offerer(7, "732829320"));
            state.providers.push(Provider {
                id: 40,
                name: "Cinéma EMS".to_string(),
                local_class: ProviderKind::Ems,
                api_url: None,
                is_active: true,
                enabled_for_pro: true,
            });
        }
        let state = test_state(&store);
        let key = state.offerers.generate_api_key(7, "test").await.unwrap();
        let auth = format!("Bearer {}", key.value);
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/v2/venues")
            .insert_header(("Authorization", auth.clone()))
            .set_json(json!({
                "name": "Cinéma du port",
                "siret": "73282932000074",
                "address": "2 quai des Indes",
                "postal_code": "56100",
                "city": "Lorient"
            }))
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let venue: serde_json::Value = test::read_body_json(response).await;
        let venue_id = venue["id"].as_i64().unwrap();

        let virtual_venue = || {
            test::TestRequest::post()
                .uri("/v2/venues")
                .insert_header(("Authorization", auth.clone()))
                .set_json(json!({"name": "Offre numérique", "is_virtual": true}))
                .to_request()
        };
        assert_eq!(test::call_service(&app, virtual_venue()).await.status(), StatusCode::CREATED);
        assert_eq!(
            test::call_service(&app, virtual_venue()).await.status(),
            StatusCode::BAD_REQUEST
        );

        let req = test::TestRequest::post()
            .uri(&format!("/v2/venues/{}/providers", venue_id))
            .insert_header(("Authorization", auth))
            .set_json(json!({"provider_id": 40, "venue_id_at_offer_provider": "0063"}))
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let link: serde_json::Value = test::read_body_json(response).await;
        assert_eq!(link["venue_id_at_offer_provider"], "0063");
        assert_eq!(store.state().venue_providers.len(), 1);
    }

    #[actix_web::test]
    async fn statistics_count_bookings_of_the_key_offerer() {
        let store = InMemoryStore::new();
        {
            let mut state = store.state();
            state.offerers.push(offerer(7, "732829320"));
            for (id, status) in [
                (10, BookingStatus::Used),
                (11, BookingStatus::Confirmed),
                (12, BookingStatus::Cancelled),
            ] {
                let mut b = booking(status);
                b.id = id;
                b.offerer_id = 7;
                state.bookings.push(b);
            }
        }
        let state = test_state(&store);
        let key = state.offerers.generate_api_key(7, "test").await.unwrap();
        let app = test::init_service(App::new().app_data(state.clone()).configure(config)).await;

        let req = test::TestRequest::get()
            .uri("/v2/offerers/statistics")
            .insert_header(("Authorization", format!("Bearer {}", key.value)))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_json_eq!(
            json!({
                "active_offers_count": body["active_offers_count"],
                "bookings_count": body["bookings_count"],
                "used_bookings_count": body["used_bookings_count"],
            }),
            json!({"active_offers_count": 0, "bookings_count": 2, "used_bookings_count": 1})
        );
    }
}
