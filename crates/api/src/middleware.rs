use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use signup_core::UserId;

use crate::app::errors::json_error;
use crate::context::UserContext;

/// Header the auth gateway sets to the authenticated participant's id.
pub const USER_ID_HEADER: &str = "x-user-id";

pub async fn user_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let user_id = match extract_user_id(req.headers()) {
        Ok(id) => id,
        Err(response) => return response,
    };

    req.extensions_mut().insert(UserContext::new(user_id));

    next.run(req).await
}

fn extract_user_id(headers: &HeaderMap) -> Result<UserId, Response> {
    let header = headers.get(USER_ID_HEADER).ok_or_else(|| {
        json_error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "missing x-user-id header",
        )
    })?;

    let raw = header.to_str().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            "x-user-id is not valid ascii",
        )
    })?;

    raw.trim()
        .parse()
        .map_err(|e: signup_core::DomainError| {
            json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string())
        })
}
