use serde::Deserialize;

use signup_core::{EventId, TeamId};
use signup_registration::{EventStatus, ItemRequest};

// -------------------------
// Request DTOs
// -------------------------

/// The user id comes from the request context, never the body.
#[derive(Debug, Deserialize)]
pub struct CreateRegistrationRequest {
    pub event_id: EventId,
    pub team_id: TeamId,
    #[serde(default)]
    pub items: Vec<ItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct RejectPaymentRequest {
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUnitRequest {
    pub label: String,
    pub total_stock: i64,
    pub price: i64,
}

#[derive(Debug, Deserialize)]
pub struct RestockRequest {
    pub delta: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub name: String,
    #[serde(default)]
    pub base_fee: i64,
}

#[derive(Debug, Deserialize)]
pub struct SetEventStatusRequest {
    pub status: EventStatus,
}

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub slot_limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOptionRequest {
    pub label: String,
    pub price: i64,
}
