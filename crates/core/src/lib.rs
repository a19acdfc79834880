//! Identifiers and the domain error type shared by every signup crate.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{
    EventId, OptionId, PaymentId, RegistrationId, RegistrationItemId, TeamId, UnitId, UserId,
};
