use actix_web::web;

pub mod backoffice;
pub mod bookings;
pub mod collective;
pub mod middleware;
pub mod offerers;

pub(crate) fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v2")
            // Contremarques
            .service(bookings::get_booking_by_token)
            .service(bookings::use_booking)
            .service(bookings::keep_booking)
            .service(bookings::cancel_booking)
            // Offres et réservations collectives
            .service(collective::list_collective_offers)
            .service(collective::cancel_collective_booking)
            // Structures et lieux
            .service(offerers::statistics)
            .service(offerers::create_venue)
            .service(offerers::link_venue_provider),
    );

    cfg.service(
        web::scope("/backoffice")
            .service(backoffice::login)
            .service(backoffice::list_rules)
            .service(backoffice::create_rule)
            .service(backoffice::edit_rule)
            .service(backoffice::create_offerer)
            .service(backoffice::create_api_key)
            .service(backoffice::user_fraud_details)
            .service(backoffice::run_identity_check)
            .service(backoffice::review_user)
            .service(backoffice::generate_user)
            .service(backoffice::request_gdpr_extract)
            .service(backoffice::list_gdpr_extracts)
            .service(backoffice::download_gdpr_extract),
    );
}
