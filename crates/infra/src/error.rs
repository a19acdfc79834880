//! Error taxonomy of the reservation and fulfillment engines.
//!
//! Callers need to tell "not enough stock" apart from "someone already
//! processed this" apart from "the counters disagree with the registration", so
//! every failure carries an [`ErrorKind`] and a stable `reason` code.

use serde::Serialize;
use thiserror::Error;

use signup_core::{DomainError, EventId, RegistrationId, TeamId, UnitId, UserId};
use signup_inventory::Shortfall;
use signup_registration::RegistrationStatus;

use crate::store::StoreError;

/// Coarse classification used for logging severity and transport mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input or unknown ids; rejected before any counter changes.
    Validation,
    /// Not enough stock or team slots; the transaction rolled back.
    Capacity,
    /// The registration or payment was already processed.
    Conflict,
    /// Counters disagree with registration state. Needs an operator.
    Consistency,
    /// Storage unavailable or misbehaving.
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error(
        "insufficient stock for unit {}: {} available, {} requested",
        .0.unit_id, .0.available, .0.requested
    )]
    InsufficientStock(Shortfall),

    #[error("team {team_id} is full ({slot_limit} slots)")]
    TeamFull { team_id: TeamId, slot_limit: i64 },

    #[error("event {0} is not open for registration")]
    EventNotOpen(EventId),

    #[error("user {user_id} is already registered for event {event_id}")]
    AlreadyRegistered { event_id: EventId, user_id: UserId },

    /// Subject (`"registration <id>"` / `"payment <id>"`) was already confirmed.
    #[error("{0} is already confirmed")]
    AlreadyConfirmed(String),

    #[error("registration {id} is already {status}")]
    AlreadyTerminal {
        id: RegistrationId,
        status: RegistrationStatus,
    },

    #[error("state conflict: {0}")]
    Conflict(String),

    #[error("consistency failure: {0}")]
    Consistency(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RegistrationError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistrationError::Validation(_) | RegistrationError::NotFound { .. } => ErrorKind::Validation,
            RegistrationError::InsufficientStock(_) | RegistrationError::TeamFull { .. } => {
                ErrorKind::Capacity
            }
            RegistrationError::EventNotOpen(_)
            | RegistrationError::AlreadyRegistered { .. }
            | RegistrationError::AlreadyConfirmed(_)
            | RegistrationError::AlreadyTerminal { .. }
            | RegistrationError::Conflict(_) => ErrorKind::Conflict,
            RegistrationError::Consistency(_) => ErrorKind::Consistency,
            RegistrationError::Store(_) => ErrorKind::Infrastructure,
        }
    }

    /// Stable machine-readable code.
    pub fn reason(&self) -> &'static str {
        match self {
            RegistrationError::Validation(_) => "validation_error",
            RegistrationError::NotFound { .. } => "not_found",
            RegistrationError::InsufficientStock(_) => "insufficient_stock",
            RegistrationError::TeamFull { .. } => "team_full",
            RegistrationError::EventNotOpen(_) => "event_not_open",
            RegistrationError::AlreadyRegistered { .. } => "already_registered",
            RegistrationError::AlreadyConfirmed(_) => "already_confirmed",
            RegistrationError::AlreadyTerminal { .. } => "already_terminal",
            RegistrationError::Conflict(_) => "state_conflict",
            RegistrationError::Consistency(_) => "consistency_error",
            RegistrationError::Store(_) => "store_error",
        }
    }

    /// Structured payload for callers: `{reason, message, unit_id, available, requested}`.
    pub fn body(&self) -> ErrorBody {
        let shortfall = match self {
            RegistrationError::InsufficientStock(s) => Some(*s),
            _ => None,
        };
        ErrorBody {
            reason: self.reason(),
            message: self.to_string(),
            unit_id: shortfall.map(|s| s.unit_id),
            available: shortfall.map(|s| s.available),
            requested: shortfall.map(|s| s.requested),
        }
    }
}

impl From<DomainError> for RegistrationError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            // An operation that would break an invariant is refused, not a corruption.
            DomainError::InvariantViolation(msg) | DomainError::Conflict(msg) => Self::Conflict(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub reason: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<UnitId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested: Option<i64>,
}
