//! HTTP application wiring (Axum router + engine wiring).
//!
//! - `services.rs`: store selection and engine dispatch
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{build_services, AppServices};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<AppServices>) -> Router {
    // Participant routes: require the gateway's user header.
    let participant = routes::registrations::router()
        .route_layer(axum::middleware::from_fn(middleware::user_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(participant)
        .merge(routes::router())
        .layer(Extension(services))
}
