//! Engine wiring for the HTTP layer.
//!
//! Handlers talk to [`AppServices`], which hides whether the engines run on
//! Postgres or on the in-memory store.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use signup_core::{EventId, PaymentId, RegistrationId, UnitId};
use signup_infra::{
    ExpiryConfig, ExpiryRunner, ExpiryRunnerHandle, InMemorySignupStore, NewRegistration,
    PostgresSignupStore, RegistrationError, RegistrationRecord, Signup, SignupConfig, StoreError,
    SweepReport,
};
use signup_inventory::{InventoryUnit, StockLevel};
use signup_registration::{ApparelOption, Event, EventStatus, Team};

#[derive(Debug)]
pub enum AppServices {
    InMemory(Signup<InMemorySignupStore>),
    Postgres(Signup<PostgresSignupStore>),
}

/// Run `$body` against whichever engine set is wired in.
macro_rules! with_signup {
    ($services:expr, $signup:ident => $body:expr) => {
        match $services {
            AppServices::InMemory($signup) => $body,
            AppServices::Postgres($signup) => $body,
        }
    };
}

/// Connect, migrate and wire the engines described by `config`.
pub async fn build_services(config: &SignupConfig) -> Result<AppServices, StoreError> {
    match &config.database {
        Some(database) => {
            let store = PostgresSignupStore::connect(database).await?;
            store.migrate().await?;
            info!("using postgres store");
            Ok(AppServices::Postgres(Signup::new(Arc::new(store), config.expiry)))
        }
        None => {
            info!("DATABASE_URL not set; using in-memory store");
            Ok(AppServices::in_memory(config.expiry))
        }
    }
}

impl AppServices {
    pub fn in_memory(expiry: ExpiryConfig) -> Self {
        AppServices::InMemory(Signup::new(Arc::new(InMemorySignupStore::new()), expiry))
    }

    pub fn spawn_expiry_runner(&self) -> ExpiryRunnerHandle {
        with_signup!(self, signup => {
            let runner = ExpiryRunner::new(signup.sweeper.config().sweep_interval);
            runner.spawn(Arc::clone(&signup.sweeper))
        })
    }

    pub async fn create_registration(
        &self,
        request: NewRegistration,
    ) -> Result<RegistrationRecord, RegistrationError> {
        with_signup!(self, signup => signup.reservations.create_registration(request).await)
    }

    pub async fn registration(&self, id: RegistrationId) -> Result<RegistrationRecord, RegistrationError> {
        with_signup!(self, signup => signup.registration(id).await)
    }

    pub async fn cancel_registration(
        &self,
        id: RegistrationId,
    ) -> Result<RegistrationRecord, RegistrationError> {
        with_signup!(self, signup => signup.fulfillment.cancel_registration(id).await)
    }

    pub async fn confirm_payment(
        &self,
        id: RegistrationId,
        payment_id: PaymentId,
    ) -> Result<RegistrationRecord, RegistrationError> {
        with_signup!(self, signup => signup.fulfillment.confirm_payment(id, payment_id).await)
    }

    pub async fn reject_payment(
        &self,
        id: RegistrationId,
        payment_id: PaymentId,
        note: Option<String>,
    ) -> Result<RegistrationRecord, RegistrationError> {
        with_signup!(self, signup => signup.fulfillment.reject_payment(id, payment_id, note).await)
    }

    pub async fn resubmit_payment(
        &self,
        id: RegistrationId,
    ) -> Result<RegistrationRecord, RegistrationError> {
        with_signup!(self, signup => signup.fulfillment.resubmit_payment(id).await)
    }

    pub async fn sweep_now(&self) -> Result<SweepReport, RegistrationError> {
        with_signup!(self, signup => signup.sweeper.sweep(Utc::now()).await)
    }

    pub async fn create_unit(
        &self,
        label: String,
        total_stock: i64,
        price: i64,
    ) -> Result<InventoryUnit, RegistrationError> {
        with_signup!(self, signup => signup.inventory.create_unit(label, total_stock, price).await)
    }

    pub async fn restock(&self, unit_id: UnitId, delta: i64) -> Result<StockLevel, RegistrationError> {
        with_signup!(self, signup => signup.inventory.restock(unit_id, delta).await)
    }

    pub async fn stock_level(&self, unit_id: UnitId) -> Result<StockLevel, RegistrationError> {
        with_signup!(self, signup => signup.inventory.stock_level(unit_id).await)
    }

    pub async fn create_event(&self, name: String, base_fee: i64) -> Result<Event, RegistrationError> {
        with_signup!(self, signup => signup.catalog.create_event(name, base_fee).await)
    }

    pub async fn set_event_status(
        &self,
        event_id: EventId,
        status: EventStatus,
    ) -> Result<Event, RegistrationError> {
        with_signup!(self, signup => signup.catalog.set_event_status(event_id, status).await)
    }

    pub async fn create_team(
        &self,
        event_id: EventId,
        name: String,
        slot_limit: i64,
    ) -> Result<Team, RegistrationError> {
        with_signup!(self, signup => signup.catalog.create_team(event_id, name, slot_limit).await)
    }

    pub async fn create_apparel_option(
        &self,
        label: String,
        price: i64,
    ) -> Result<ApparelOption, RegistrationError> {
        with_signup!(self, signup => signup.catalog.create_apparel_option(label, price).await)
    }
}
