use axum::{routing::get, Router};

pub mod admin;
pub mod registrations;
pub mod system;

/// Operator endpoints and stock reads; authorisation is the gateway's job.
pub fn router() -> Router {
    Router::new()
        .route("/units/:id", get(admin::get_stock_level))
        .merge(registrations::operator_router())
        .nest("/admin", admin::router())
}
