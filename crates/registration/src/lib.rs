//! Registration domain module.
//!
//! A registration is one participant's claim on a team slot, optionally with
//! stock-bound add-ons, plus the payment that settles it. Everything here is
//! deterministic domain logic: status rules and pricing, no IO.

pub mod catalog;
pub mod item;
pub mod payment;
pub mod registration;

pub use catalog::{ApparelOption, Event, EventStatus, Team};
pub use item::{ItemKind, ItemRequest, ItemTarget, RegistrationItem, stock_claims};
pub use payment::{Payment, PaymentStatus, registration_amount};
pub use registration::{Registration, RegistrationStatus, ReleaseOutcome};
