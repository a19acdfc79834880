//! Transactional storage seam for the signup engines.
//!
//! Every multi-step operation runs inside one [`SignupTx`]: either all of its
//! writes become visible together or none do. Dropping a transaction without
//! calling [`SignupTx::commit`] discards it.
//!
//! The counter operations (`increment_reserved`, `finalize_reserved`,
//! `release_reserved`) are guarded conditional updates. They return `false`
//! when the guard does not hold and leave the row unchanged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use signup_core::{EventId, OptionId, RegistrationId, TeamId, UnitId, UserId};
use signup_inventory::InventoryUnit;
use signup_registration::{
    ApparelOption, Event, EventStatus, Payment, PaymentStatus, Registration, RegistrationItem, Team,
};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemorySignupStore;
pub use postgres::PostgresSignupStore;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    #[error("unique constraint {constraint} violated in {operation}")]
    UniqueViolation {
        operation: &'static str,
        constraint: String,
    },

    #[error("failed to decode {entity} row: {message}")]
    Decode {
        entity: &'static str,
        message: String,
    },

    #[error("connection pool closed in {0}")]
    PoolClosed(&'static str),
}

/// A registration together with its lines and payment history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationRecord {
    pub registration: Registration,
    pub items: Vec<RegistrationItem>,
    pub payments: Vec<Payment>,
}

impl RegistrationRecord {
    /// The payment that can still settle this registration, if any.
    pub fn live_payment(&self) -> Option<&Payment> {
        self.payments.iter().find(|p| p.status().is_live())
    }
}

#[async_trait]
pub trait SignupStore: Send + Sync + 'static {
    type Tx: SignupTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Ids of registrations still pending that were created before `cutoff`,
    /// oldest first.
    async fn stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<RegistrationId>, StoreError>;

    /// Unlocked read of a unit's counters.
    async fn unit(&self, id: UnitId) -> Result<Option<InventoryUnit>, StoreError>;

    async fn registration(&self, id: RegistrationId) -> Result<Option<RegistrationRecord>, StoreError>;
}

#[async_trait]
pub trait SignupTx: Send {
    /// Read a unit's counters and hold its row lock until the transaction ends.
    async fn lock_unit(&mut self, id: UnitId) -> Result<Option<InventoryUnit>, StoreError>;

    /// `reserved += qty` only while `total - reserved >= qty`.
    async fn increment_reserved(&mut self, id: UnitId, qty: i64) -> Result<bool, StoreError>;

    /// `total -= qty, reserved -= qty` only while both are `>= qty`.
    async fn finalize_reserved(&mut self, id: UnitId, qty: i64) -> Result<bool, StoreError>;

    /// `reserved -= qty` only while `reserved >= qty`.
    async fn release_reserved(&mut self, id: UnitId, qty: i64) -> Result<bool, StoreError>;

    async fn insert_unit(&mut self, unit: &InventoryUnit) -> Result<(), StoreError>;

    /// Overwrite `total_stock`, refusing to drop below the current holds.
    async fn set_total_stock(&mut self, id: UnitId, total: i64) -> Result<bool, StoreError>;

    async fn event(&mut self, id: EventId) -> Result<Option<Event>, StoreError>;

    async fn insert_event(&mut self, event: &Event) -> Result<(), StoreError>;

    async fn set_event_status(&mut self, id: EventId, status: EventStatus) -> Result<bool, StoreError>;

    /// Read a team and hold its row lock; serialises slot checks per team.
    async fn lock_team(&mut self, id: TeamId) -> Result<Option<Team>, StoreError>;

    async fn insert_team(&mut self, team: &Team) -> Result<(), StoreError>;

    async fn apparel_option(&mut self, id: OptionId) -> Result<Option<ApparelOption>, StoreError>;

    async fn insert_apparel_option(&mut self, option: &ApparelOption) -> Result<(), StoreError>;

    async fn registration_exists(&mut self, event_id: EventId, user_id: UserId) -> Result<bool, StoreError>;

    async fn confirmed_count(&mut self, team_id: TeamId) -> Result<i64, StoreError>;

    /// Insert a new registration and its lines. Fails with
    /// [`StoreError::UniqueViolation`] if the user already holds one for the event.
    async fn insert_registration(
        &mut self,
        registration: &Registration,
        items: &[RegistrationItem],
    ) -> Result<(), StoreError>;

    /// Read a registration and hold its row lock until the transaction ends.
    async fn lock_registration(&mut self, id: RegistrationId) -> Result<Option<Registration>, StoreError>;

    async fn items(&mut self, registration_id: RegistrationId) -> Result<Vec<RegistrationItem>, StoreError>;

    /// Payments of a registration, oldest first, locked for update.
    async fn payments(&mut self, registration_id: RegistrationId) -> Result<Vec<Payment>, StoreError>;

    /// Fails with [`StoreError::UniqueViolation`] if a live payment already exists.
    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError>;

    /// Persist a registration's move out of `pending`. Returns `false` when
    /// the stored row is no longer pending.
    async fn transition_registration(&mut self, registration: &Registration) -> Result<bool, StoreError>;

    /// Persist a payment's new status and note if the stored status still
    /// equals `expected`.
    async fn update_payment(&mut self, payment: &Payment, expected: PaymentStatus) -> Result<bool, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Roll back after a failed operation. The operation's own error is what the
/// caller sees, so a rollback failure is only logged.
pub(crate) async fn abandon<T: SignupTx>(tx: T, operation: &'static str) {
    if let Err(err) = tx.rollback().await {
        warn!(operation, error = %err, "rollback failed");
    }
}
