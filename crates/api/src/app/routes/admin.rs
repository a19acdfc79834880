//! Operator routes: inventory units, catalog seeding and on-demand sweeps.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use signup_core::{EventId, UnitId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/expiry-sweep", post(run_expiry_sweep))
        .route("/units", post(create_unit))
        .route("/units/:id/restock", post(restock_unit))
        .route("/events", post(create_event))
        .route("/events/:id/status", post(set_event_status))
        .route("/events/:id/teams", post(create_team))
        .route("/options", post(create_option))
}

pub async fn run_expiry_sweep(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.sweep_now().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::registration_error_to_response(e),
    }
}

pub async fn create_unit(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateUnitRequest>,
) -> axum::response::Response {
    match services
        .create_unit(body.label, body.total_stock, body.price)
        .await
    {
        Ok(unit) => (StatusCode::CREATED, Json(unit)).into_response(),
        Err(e) => errors::registration_error_to_response(e),
    }
}

pub async fn restock_unit(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::RestockRequest>,
) -> axum::response::Response {
    let unit_id: UnitId = match errors::parse_id(&id, "unit") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.restock(unit_id, body.delta).await {
        Ok(level) => (StatusCode::OK, Json(level)).into_response(),
        Err(e) => errors::registration_error_to_response(e),
    }
}

pub async fn get_stock_level(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let unit_id: UnitId = match errors::parse_id(&id, "unit") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.stock_level(unit_id).await {
        Ok(level) => (StatusCode::OK, Json(level)).into_response(),
        Err(e) => errors::registration_error_to_response(e),
    }
}

pub async fn create_event(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateEventRequest>,
) -> axum::response::Response {
    match services.create_event(body.name, body.base_fee).await {
        Ok(event) => (StatusCode::CREATED, Json(event)).into_response(),
        Err(e) => errors::registration_error_to_response(e),
    }
}

pub async fn set_event_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetEventStatusRequest>,
) -> axum::response::Response {
    let event_id: EventId = match errors::parse_id(&id, "event") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.set_event_status(event_id, body.status).await {
        Ok(event) => (StatusCode::OK, Json(event)).into_response(),
        Err(e) => errors::registration_error_to_response(e),
    }
}

pub async fn create_team(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::CreateTeamRequest>,
) -> axum::response::Response {
    let event_id: EventId = match errors::parse_id(&id, "event") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.create_team(event_id, body.name, body.slot_limit).await {
        Ok(team) => (StatusCode::CREATED, Json(team)).into_response(),
        Err(e) => errors::registration_error_to_response(e),
    }
}

pub async fn create_option(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateOptionRequest>,
) -> axum::response::Response {
    match services.create_apparel_option(body.label, body.price).await {
        Ok(option) => (StatusCode::CREATED, Json(option)).into_response(),
        Err(e) => errors::registration_error_to_response(e),
    }
}
