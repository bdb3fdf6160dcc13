use actix_web::web;

use crate::metrics::metrics_handler;

pub mod error;
pub mod extractors;
pub mod handlers;

pub use error::ApiError;
pub use extractors::{AuthenticatedActor, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};

// ============================================================================
// HTTP Transport
// ============================================================================
//
// Thin actix-web layer over `OrderService`. Expects `web::Data<OrderService>`
// and `web::Data<Arc<Metrics>>` to be registered on the App.
//
// ============================================================================

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default().error_handler(|err, _req| ApiError::bad_request(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default().error_handler(|err, _req| ApiError::bad_request(err.to_string()).into()),
    )
    .route("/health", web::get().to(handlers::health))
    .route("/metrics", web::get().to(metrics_handler))
    .service(
        web::scope("/orders")
            .route("", web::post().to(handlers::create_order))
            .route("", web::get().to(handlers::list_orders))
            .route("/{order_id}", web::get().to(handlers::get_order))
            .route("/{order_id}/status", web::put().to(handlers::update_status))
            .route("/{order_id}/transporter", web::put().to(handlers::assign_transporter))
            .route("/{order_id}/pay", web::post().to(handlers::pay))
            .route("/{order_id}/cancel", web::post().to(handlers::cancel))
            .route("/{order_id}/tracking", web::get().to(handlers::tracking_history)),
    );
}
