//! Administrative operations: inventory units, catalog seeding and reads.

use std::sync::Arc;

use tracing::{info, instrument};

use signup_core::{DomainError, EventId, UnitId};
use signup_inventory::{InventoryUnit, StockLevel};
use signup_registration::{ApparelOption, Event, EventStatus, Team};

use crate::error::RegistrationError;
use crate::store::{SignupStore, SignupTx, abandon};

#[derive(Debug)]
pub struct InventoryAdmin<S> {
    store: Arc<S>,
}

impl<S> Clone for InventoryAdmin<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: SignupStore> InventoryAdmin<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), err)]
    pub async fn create_unit(
        &self,
        label: String,
        total_stock: i64,
        price: i64,
    ) -> Result<InventoryUnit, RegistrationError> {
        let unit = InventoryUnit::new(UnitId::new(), label, price, total_stock)?;
        let mut tx = self.store.begin().await?;
        if let Err(err) = tx.insert_unit(&unit).await {
            abandon(tx, "create_unit").await;
            return Err(err.into());
        }
        tx.commit().await?;
        info!(unit_id = %unit.id(), "inventory unit created");
        Ok(unit)
    }

    /// Adjust `total_stock` by `delta`. Existing holds are untouched and the
    /// total may not drop below them.
    #[instrument(skip(self), fields(unit_id = %unit_id), err)]
    pub async fn restock(&self, unit_id: UnitId, delta: i64) -> Result<StockLevel, RegistrationError> {
        let mut tx = self.store.begin().await?;
        match restock(&mut tx, unit_id, delta).await {
            Ok(level) => {
                tx.commit().await?;
                info!(total_stock = level.total_stock, "inventory unit restocked");
                Ok(level)
            }
            Err(err) => {
                abandon(tx, "restock").await;
                Err(err)
            }
        }
    }

    pub async fn stock_level(&self, unit_id: UnitId) -> Result<StockLevel, RegistrationError> {
        self.store
            .unit(unit_id)
            .await?
            .map(|unit| unit.stock_level())
            .ok_or_else(|| RegistrationError::not_found("inventory unit", unit_id))
    }
}

async fn restock<T: SignupTx>(
    tx: &mut T,
    unit_id: UnitId,
    delta: i64,
) -> Result<StockLevel, RegistrationError> {
    let mut unit = tx
        .lock_unit(unit_id)
        .await?
        .ok_or_else(|| RegistrationError::not_found("inventory unit", unit_id))?;
    unit.restock(delta)?;
    if !tx.set_total_stock(unit_id, unit.total_stock()).await? {
        return Err(DomainError::invariant(format!(
            "total_stock {} would fall below current holds on unit {unit_id}",
            unit.total_stock()
        ))
        .into());
    }
    Ok(unit.stock_level())
}

/// Seeds the catalog records registration reads: events, teams and apparel
/// options.
#[derive(Debug)]
pub struct CatalogAdmin<S> {
    store: Arc<S>,
}

impl<S> Clone for CatalogAdmin<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: SignupStore> CatalogAdmin<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), err)]
    pub async fn create_event(&self, name: String, base_fee: i64) -> Result<Event, RegistrationError> {
        let event = Event::new(name, base_fee)?;
        let mut tx = self.store.begin().await?;
        if let Err(err) = tx.insert_event(&event).await {
            abandon(tx, "create_event").await;
            return Err(err.into());
        }
        tx.commit().await?;
        info!(event_id = %event.id, "event created");
        Ok(event)
    }

    #[instrument(skip(self), fields(event_id = %event_id, status = status.as_str()), err)]
    pub async fn set_event_status(
        &self,
        event_id: EventId,
        status: EventStatus,
    ) -> Result<Event, RegistrationError> {
        let mut tx = self.store.begin().await?;
        if !tx.set_event_status(event_id, status).await? {
            abandon(tx, "set_event_status").await;
            return Err(RegistrationError::not_found("event", event_id));
        }
        let event = tx.event(event_id).await?;
        tx.commit().await?;
        event.ok_or_else(|| RegistrationError::not_found("event", event_id))
    }

    #[instrument(skip(self), fields(event_id = %event_id), err)]
    pub async fn create_team(
        &self,
        event_id: EventId,
        name: String,
        slot_limit: i64,
    ) -> Result<Team, RegistrationError> {
        let team = Team::new(event_id, name, slot_limit)?;
        let mut tx = self.store.begin().await?;
        if tx.event(event_id).await?.is_none() {
            abandon(tx, "create_team").await;
            return Err(RegistrationError::not_found("event", event_id));
        }
        if let Err(err) = tx.insert_team(&team).await {
            abandon(tx, "create_team").await;
            return Err(err.into());
        }
        tx.commit().await?;
        info!(team_id = %team.id, "team created");
        Ok(team)
    }

    #[instrument(skip(self), err)]
    pub async fn create_apparel_option(
        &self,
        label: String,
        price: i64,
    ) -> Result<ApparelOption, RegistrationError> {
        let option = ApparelOption::new(label, price)?;
        let mut tx = self.store.begin().await?;
        if let Err(err) = tx.insert_apparel_option(&option).await {
            abandon(tx, "create_apparel_option").await;
            return Err(err.into());
        }
        tx.commit().await?;
        info!(option_id = %option.id, "apparel option created");
        Ok(option)
    }
}
