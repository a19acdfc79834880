use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use signup_core::{PaymentId, RegistrationId};
use signup_infra::{NewRegistration, RegistrationRecord};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::UserContext;

/// Participant routes; every handler needs a [`UserContext`].
pub fn router() -> Router {
    Router::new()
        .route("/registrations", post(create_registration))
        .route("/registrations/:id", get(get_registration))
        .route("/registrations/:id/cancel", post(cancel_registration))
        .route("/registrations/:id/payments", post(resubmit_payment))
}

/// Payment verification is an operator action, not the participant's.
pub fn operator_router() -> Router {
    Router::new()
        .route(
            "/registrations/:id/payments/:payment_id/confirm",
            post(confirm_payment),
        )
        .route(
            "/registrations/:id/payments/:payment_id/reject",
            post(reject_payment),
        )
}

pub async fn create_registration(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Json(body): Json<dto::CreateRegistrationRequest>,
) -> axum::response::Response {
    let request = NewRegistration {
        event_id: body.event_id,
        team_id: body.team_id,
        user_id: user.user_id(),
        items: body.items,
    };

    match services.create_registration(request).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => errors::registration_error_to_response(e),
    }
}

pub async fn get_registration(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RegistrationId = match errors::parse_id(&id, "registration") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match owned_registration(&services, id, &user).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn cancel_registration(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RegistrationId = match errors::parse_id(&id, "registration") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if let Err(resp) = owned_registration(&services, id, &user).await {
        return resp;
    }

    match services.cancel_registration(id).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => errors::registration_error_to_response(e),
    }
}

pub async fn resubmit_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: RegistrationId = match errors::parse_id(&id, "registration") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(resp) = owned_registration(&services, id, &user).await {
        return resp;
    }

    match services.resubmit_payment(id).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => errors::registration_error_to_response(e),
    }
}

pub async fn confirm_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, payment_id)): Path<(String, String)>,
) -> axum::response::Response {
    let (id, payment_id) = match parse_pair(&id, &payment_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.confirm_payment(id, payment_id).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => errors::registration_error_to_response(e),
    }
}

pub async fn reject_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, payment_id)): Path<(String, String)>,
    body: Option<Json<dto::RejectPaymentRequest>>,
) -> axum::response::Response {
    let (id, payment_id) = match parse_pair(&id, &payment_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let note = body.and_then(|Json(body)| body.note);

    match services.reject_payment(id, payment_id, note).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => errors::registration_error_to_response(e),
    }
}

/// Load the registration and insist it belongs to the calling user.
async fn owned_registration(
    services: &AppServices,
    id: RegistrationId,
    user: &UserContext,
) -> Result<RegistrationRecord, axum::response::Response> {
    let record = services
        .registration(id)
        .await
        .map_err(errors::registration_error_to_response)?;
    if record.registration.user_id() != user.user_id() {
        return Err(errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "registration belongs to another user",
        ));
    }
    Ok(record)
}

fn parse_pair(id: &str, payment_id: &str) -> Result<(RegistrationId, PaymentId), axum::response::Response> {
    Ok((
        errors::parse_id(id, "registration")?,
        errors::parse_id(payment_id, "payment")?,
    ))
}
