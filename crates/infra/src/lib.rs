//! Infrastructure layer: storage, the reservation and fulfillment engines,
//! expiry sweeping and configuration.

pub mod admin;
pub mod config;
pub mod error;
pub mod expiry;
pub mod fulfillment;
pub mod reservation;
pub mod store;

#[cfg(test)]
mod integration_tests;

use std::sync::Arc;

use signup_core::RegistrationId;

pub use admin::{CatalogAdmin, InventoryAdmin};
pub use config::{ConfigError, ExpiryConfig, SignupConfig};
pub use error::{ErrorBody, ErrorKind, RegistrationError};
pub use expiry::{ExpiryRunner, ExpiryRunnerHandle, ExpirySweeper, SweepFailure, SweepReport};
pub use fulfillment::FulfillmentEngine;
pub use reservation::{NewRegistration, ReservationEngine};
pub use store::postgres::DatabaseConfig;
pub use store::{
    InMemorySignupStore, PostgresSignupStore, RegistrationRecord, SignupStore, SignupTx, StoreError,
};

/// Every engine wired to one store.
#[derive(Debug)]
pub struct Signup<S> {
    store: Arc<S>,
    pub reservations: ReservationEngine<S>,
    pub fulfillment: FulfillmentEngine<S>,
    pub sweeper: Arc<ExpirySweeper<S>>,
    pub inventory: InventoryAdmin<S>,
    pub catalog: CatalogAdmin<S>,
}

impl<S: SignupStore> Signup<S> {
    pub fn new(store: Arc<S>, expiry: ExpiryConfig) -> Self {
        Self {
            reservations: ReservationEngine::new(Arc::clone(&store)),
            fulfillment: FulfillmentEngine::new(Arc::clone(&store)),
            sweeper: Arc::new(ExpirySweeper::new(Arc::clone(&store), expiry)),
            inventory: InventoryAdmin::new(Arc::clone(&store)),
            catalog: CatalogAdmin::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn registration(&self, id: RegistrationId) -> Result<RegistrationRecord, RegistrationError> {
        self.store
            .registration(id)
            .await?
            .ok_or_else(|| RegistrationError::not_found("registration", id))
    }
}
