//! In-memory signup store for tests and local runs without a database.
//!
//! A transaction takes the store-wide lock and works on a copy of the state;
//! commit writes the copy back. Transactions are therefore fully serialised,
//! which is stricter than row locking but observably equivalent.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use signup_core::{EventId, OptionId, RegistrationId, TeamId, UnitId, UserId};
use signup_inventory::InventoryUnit;
use signup_registration::{
    ApparelOption, Event, EventStatus, Payment, PaymentStatus, Registration, RegistrationItem,
    RegistrationStatus, Team,
};

use super::{RegistrationRecord, SignupStore, SignupTx, StoreError};

#[derive(Debug, Default, Clone)]
struct State {
    units: HashMap<UnitId, InventoryUnit>,
    events: HashMap<EventId, Event>,
    teams: HashMap<TeamId, Team>,
    options: HashMap<OptionId, ApparelOption>,
    registrations: HashMap<RegistrationId, Registration>,
    items: HashMap<RegistrationId, Vec<RegistrationItem>>,
    payments: HashMap<RegistrationId, Vec<Payment>>,
}

impl State {
    fn record(&self, id: RegistrationId) -> Option<RegistrationRecord> {
        let registration = self.registrations.get(&id)?.clone();
        Some(RegistrationRecord {
            registration,
            items: self.items.get(&id).cloned().unwrap_or_default(),
            payments: self.payments.get(&id).cloned().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySignupStore {
    state: Arc<Mutex<State>>,
}

impl InMemorySignupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct InMemoryTx {
    guard: OwnedMutexGuard<State>,
    working: State,
}

fn unique_violation(operation: &'static str, constraint: &str) -> StoreError {
    StoreError::UniqueViolation {
        operation,
        constraint: constraint.to_string(),
    }
}

#[async_trait]
impl SignupStore for InMemorySignupStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(InMemoryTx { guard, working })
    }

    async fn stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<RegistrationId>, StoreError> {
        let state = self.state.lock().await;
        let mut stale: Vec<&Registration> = state
            .registrations
            .values()
            .filter(|r| r.is_stale(cutoff))
            .collect();
        stale.sort_by_key(|r| (r.created_at(), r.id()));
        Ok(stale
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|r| r.id())
            .collect())
    }

    async fn unit(&self, id: UnitId) -> Result<Option<InventoryUnit>, StoreError> {
        Ok(self.state.lock().await.units.get(&id).cloned())
    }

    async fn registration(&self, id: RegistrationId) -> Result<Option<RegistrationRecord>, StoreError> {
        Ok(self.state.lock().await.record(id))
    }
}

#[async_trait]
impl SignupTx for InMemoryTx {
    async fn lock_unit(&mut self, id: UnitId) -> Result<Option<InventoryUnit>, StoreError> {
        Ok(self.working.units.get(&id).cloned())
    }

    async fn increment_reserved(&mut self, id: UnitId, qty: i64) -> Result<bool, StoreError> {
        Ok(self
            .working
            .units
            .get_mut(&id)
            .is_some_and(|unit| unit.try_reserve(qty)))
    }

    async fn finalize_reserved(&mut self, id: UnitId, qty: i64) -> Result<bool, StoreError> {
        Ok(self
            .working
            .units
            .get_mut(&id)
            .is_some_and(|unit| unit.try_finalize(qty)))
    }

    async fn release_reserved(&mut self, id: UnitId, qty: i64) -> Result<bool, StoreError> {
        Ok(self
            .working
            .units
            .get_mut(&id)
            .is_some_and(|unit| unit.try_release(qty)))
    }

    async fn insert_unit(&mut self, unit: &InventoryUnit) -> Result<(), StoreError> {
        if self.working.units.contains_key(&unit.id()) {
            return Err(unique_violation("insert_unit", "inventory_units_pkey"));
        }
        self.working.units.insert(unit.id(), unit.clone());
        Ok(())
    }

    async fn set_total_stock(&mut self, id: UnitId, total: i64) -> Result<bool, StoreError> {
        let Some(unit) = self.working.units.get(&id) else {
            return Ok(false);
        };
        if total < unit.reserved_stock() {
            return Ok(false);
        }
        let updated = InventoryUnit::from_parts(
            unit.id(),
            unit.label().to_string(),
            unit.price(),
            total,
            unit.reserved_stock(),
        )
        .map_err(|e| StoreError::Decode {
            entity: "inventory_unit",
            message: e.to_string(),
        })?;
        self.working.units.insert(id, updated);
        Ok(true)
    }

    async fn event(&mut self, id: EventId) -> Result<Option<Event>, StoreError> {
        Ok(self.working.events.get(&id).cloned())
    }

    async fn insert_event(&mut self, event: &Event) -> Result<(), StoreError> {
        if self.working.events.contains_key(&event.id) {
            return Err(unique_violation("insert_event", "events_pkey"));
        }
        self.working.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn set_event_status(&mut self, id: EventId, status: EventStatus) -> Result<bool, StoreError> {
        match self.working.events.get_mut(&id) {
            Some(event) => {
                event.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn lock_team(&mut self, id: TeamId) -> Result<Option<Team>, StoreError> {
        Ok(self.working.teams.get(&id).cloned())
    }

    async fn insert_team(&mut self, team: &Team) -> Result<(), StoreError> {
        if self.working.teams.contains_key(&team.id) {
            return Err(unique_violation("insert_team", "teams_pkey"));
        }
        self.working.teams.insert(team.id, team.clone());
        Ok(())
    }

    async fn apparel_option(&mut self, id: OptionId) -> Result<Option<ApparelOption>, StoreError> {
        Ok(self.working.options.get(&id).cloned())
    }

    async fn insert_apparel_option(&mut self, option: &ApparelOption) -> Result<(), StoreError> {
        if self.working.options.contains_key(&option.id) {
            return Err(unique_violation("insert_apparel_option", "apparel_options_pkey"));
        }
        self.working.options.insert(option.id, option.clone());
        Ok(())
    }

    async fn registration_exists(&mut self, event_id: EventId, user_id: UserId) -> Result<bool, StoreError> {
        Ok(self
            .working
            .registrations
            .values()
            .any(|r| r.event_id() == event_id && r.user_id() == user_id))
    }

    async fn confirmed_count(&mut self, team_id: TeamId) -> Result<i64, StoreError> {
        let count = self
            .working
            .registrations
            .values()
            .filter(|r| r.team_id() == team_id && r.status() == RegistrationStatus::Confirmed)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn insert_registration(
        &mut self,
        registration: &Registration,
        items: &[RegistrationItem],
    ) -> Result<(), StoreError> {
        if self.registration_exists(registration.event_id(), registration.user_id()).await? {
            return Err(unique_violation(
                "insert_registration",
                "registrations_event_id_user_id_key",
            ));
        }
        self.working
            .registrations
            .insert(registration.id(), registration.clone());
        self.working.items.insert(registration.id(), items.to_vec());
        Ok(())
    }

    async fn lock_registration(&mut self, id: RegistrationId) -> Result<Option<Registration>, StoreError> {
        Ok(self.working.registrations.get(&id).cloned())
    }

    async fn items(&mut self, registration_id: RegistrationId) -> Result<Vec<RegistrationItem>, StoreError> {
        Ok(self.working.items.get(&registration_id).cloned().unwrap_or_default())
    }

    async fn payments(&mut self, registration_id: RegistrationId) -> Result<Vec<Payment>, StoreError> {
        Ok(self
            .working
            .payments
            .get(&registration_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        let payments = self
            .working
            .payments
            .entry(payment.registration_id())
            .or_default();
        if payment.status().is_live() && payments.iter().any(|p| p.status().is_live()) {
            return Err(unique_violation("insert_payment", "payments_one_live_per_registration"));
        }
        payments.push(payment.clone());
        Ok(())
    }

    async fn transition_registration(&mut self, registration: &Registration) -> Result<bool, StoreError> {
        match self.working.registrations.get_mut(&registration.id()) {
            Some(stored) if stored.is_pending() => {
                *stored = registration.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_payment(&mut self, payment: &Payment, expected: PaymentStatus) -> Result<bool, StoreError> {
        let stored = self
            .working
            .payments
            .get_mut(&payment.registration_id())
            .and_then(|payments| payments.iter_mut().find(|p| p.id() == payment.id()));
        match stored {
            Some(stored) if stored.status() == expected => {
                *stored = payment.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit(self) -> Result<(), StoreError> {
        let InMemoryTx { mut guard, working } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(total: i64) -> InventoryUnit {
        InventoryUnit::new(UnitId::new(), "Shoe 42", 4500, total).unwrap()
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let store = InMemorySignupStore::new();
        let u = unit(3);

        let mut tx = store.begin().await.unwrap();
        tx.insert_unit(&u).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.increment_reserved(u.id(), 2).await.unwrap());
        drop(tx);

        let stored = store.unit(u.id()).await.unwrap().unwrap();
        assert_eq!(stored.reserved_stock(), 0);
    }

    #[tokio::test]
    async fn counter_guards_refuse_without_changing_the_row() {
        let store = InMemorySignupStore::new();
        let u = unit(2);
        let mut tx = store.begin().await.unwrap();
        tx.insert_unit(&u).await.unwrap();

        assert!(!tx.increment_reserved(u.id(), 3).await.unwrap());
        assert!(tx.increment_reserved(u.id(), 2).await.unwrap());
        assert!(!tx.release_reserved(u.id(), 3).await.unwrap());
        assert!(tx.finalize_reserved(u.id(), 1).await.unwrap());
        assert!(!tx.set_total_stock(u.id(), 0).await.unwrap());
        assert!(!tx.increment_reserved(UnitId::new(), 1).await.unwrap());
        tx.commit().await.unwrap();

        let stored = store.unit(u.id()).await.unwrap().unwrap();
        assert_eq!((stored.total_stock(), stored.reserved_stock()), (1, 1));
    }

    #[tokio::test]
    async fn one_live_payment_per_registration() {
        let store = InMemorySignupStore::new();
        let reg = Registration::new(EventId::new(), TeamId::new(), UserId::new(), Utc::now());
        let mut tx = store.begin().await.unwrap();
        tx.insert_registration(&reg, &[]).await.unwrap();
        tx.insert_payment(&Payment::waiting(reg.id(), 100, Utc::now()).unwrap())
            .await
            .unwrap();

        let second = Payment::waiting(reg.id(), 100, Utc::now()).unwrap();
        assert!(matches!(
            tx.insert_payment(&second).await,
            Err(StoreError::UniqueViolation { .. })
        ));
    }

    #[tokio::test]
    async fn stale_pending_is_oldest_first_and_limited() {
        let store = InMemorySignupStore::new();
        let base = Utc::now() - chrono::Duration::hours(48);
        let mut tx = store.begin().await.unwrap();
        let mut ids = Vec::new();
        for offset in [3, 1, 2] {
            let reg = Registration::new(
                EventId::new(),
                TeamId::new(),
                UserId::new(),
                base + chrono::Duration::minutes(offset),
            );
            ids.push((offset, reg.id()));
            tx.insert_registration(&reg, &[]).await.unwrap();
        }
        tx.commit().await.unwrap();

        let stale = store.stale_pending(Utc::now(), 2).await.unwrap();
        ids.sort();
        assert_eq!(stale, vec![ids[0].1, ids[1].1]);
    }
}
