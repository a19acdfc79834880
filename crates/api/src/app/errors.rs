use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use signup_infra::{ErrorKind, RegistrationError};

pub fn registration_error_to_response(err: RegistrationError) -> axum::response::Response {
    let status = match (&err, err.kind()) {
        (RegistrationError::NotFound { .. }, _) => StatusCode::NOT_FOUND,
        (_, ErrorKind::Validation) => StatusCode::BAD_REQUEST,
        (_, ErrorKind::Capacity) | (_, ErrorKind::Conflict) => StatusCode::CONFLICT,
        (_, ErrorKind::Consistency) => StatusCode::INTERNAL_SERVER_ERROR,
        (_, ErrorKind::Infrastructure) => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, axum::Json(err.body())).into_response()
}

pub fn json_error(
    status: StatusCode,
    reason: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "reason": reason,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path segment into a typed id, or answer 400 `invalid_id`.
pub fn parse_id<T>(raw: &str, what: &str) -> Result<T, axum::response::Response>
where
    T: std::str::FromStr,
{
    raw.parse()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {what} id")))
}

#[cfg(test)]
mod tests {
    use super::*;

    use signup_core::UnitId;
    use signup_inventory::Shortfall;

    #[test]
    fn kinds_map_to_statuses() {
        let cases = [
            (RegistrationError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (RegistrationError::not_found("team", "x"), StatusCode::NOT_FOUND),
            (
                RegistrationError::InsufficientStock(Shortfall {
                    unit_id: UnitId::new(),
                    available: 0,
                    requested: 1,
                }),
                StatusCode::CONFLICT,
            ),
            (RegistrationError::AlreadyConfirmed("payment p".into()), StatusCode::CONFLICT),
            (RegistrationError::Consistency("hold missing".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                RegistrationError::Store(signup_infra::StoreError::PoolClosed("begin")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(registration_error_to_response(err).status(), expected);
        }
    }
}
