//! Reservation engine: creates a pending registration and places stock holds
//! for its inventory-bound lines in one transaction.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use signup_core::{EventId, OptionId, TeamId, UnitId, UserId};
use signup_inventory::{InventoryUnit, Shortfall};
use signup_registration::{
    ItemRequest, ItemTarget, Payment, Registration, RegistrationItem, registration_amount, stock_claims,
};

use crate::error::RegistrationError;
use crate::store::{RegistrationRecord, SignupStore, SignupTx, StoreError, abandon};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewRegistration {
    pub event_id: EventId,
    pub team_id: TeamId,
    pub user_id: UserId,
    #[serde(default)]
    pub items: Vec<ItemRequest>,
}

#[derive(Debug)]
pub struct ReservationEngine<S> {
    store: Arc<S>,
}

impl<S> Clone for ReservationEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: SignupStore> ReservationEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create a pending registration with its lines and a waiting payment.
    ///
    /// Holds are placed for every inventory-bound line before anything is
    /// inserted. On any failure the transaction is rolled back and no counter
    /// or row changes.
    #[instrument(
        skip(self, request),
        fields(
            event_id = %request.event_id,
            team_id = %request.team_id,
            user_id = %request.user_id,
            lines = request.items.len()
        ),
        err
    )]
    pub async fn create_registration(
        &self,
        request: NewRegistration,
    ) -> Result<RegistrationRecord, RegistrationError> {
        for line in &request.items {
            line.validate()?;
        }
        let claims = stock_claims(request.items.iter().map(|line| (line.unit_id(), line.quantity)))?;

        let mut tx = self.store.begin().await?;
        match reserve(&mut tx, &request, &claims).await {
            Ok(record) => {
                tx.commit().await?;
                info!(
                    registration_id = %record.registration.id(),
                    amount = record.payments.first().map(|p| p.amount()),
                    "registration reserved"
                );
                Ok(record)
            }
            Err(err) => {
                abandon(tx, "create_registration").await;
                Err(err)
            }
        }
    }
}

async fn reserve<T: SignupTx>(
    tx: &mut T,
    request: &NewRegistration,
    claims: &BTreeMap<UnitId, i64>,
) -> Result<RegistrationRecord, RegistrationError> {
    if tx.registration_exists(request.event_id, request.user_id).await? {
        return Err(RegistrationError::AlreadyRegistered {
            event_id: request.event_id,
            user_id: request.user_id,
        });
    }

    let event = tx
        .event(request.event_id)
        .await?
        .ok_or_else(|| RegistrationError::not_found("event", request.event_id))?;
    if !event.is_open() {
        return Err(RegistrationError::EventNotOpen(event.id));
    }

    let team = tx
        .lock_team(request.team_id)
        .await?
        .ok_or_else(|| RegistrationError::not_found("team", request.team_id))?;
    if team.event_id != event.id {
        return Err(RegistrationError::Validation(format!(
            "team {} does not belong to event {}",
            team.id, event.id
        )));
    }
    if team.is_full(tx.confirmed_count(team.id).await?) {
        return Err(RegistrationError::TeamFull {
            team_id: team.id,
            slot_limit: team.slot_limit,
        });
    }

    let mut option_prices: HashMap<OptionId, i64> = HashMap::new();
    for line in &request.items {
        if let ItemTarget::Option(option_id) = line.target {
            let option = tx
                .apparel_option(option_id)
                .await?
                .ok_or_else(|| RegistrationError::not_found("apparel option", option_id))?;
            option_prices.insert(option_id, option.price);
        }
    }

    // Lock and check every unit before touching any counter.
    let mut units: BTreeMap<UnitId, InventoryUnit> = BTreeMap::new();
    for (&unit_id, &qty) in claims {
        let unit = tx
            .lock_unit(unit_id)
            .await?
            .ok_or_else(|| RegistrationError::not_found("inventory unit", unit_id))?;
        unit.check_available(qty)
            .map_err(RegistrationError::InsufficientStock)?;
        units.insert(unit_id, unit);
    }

    for (&unit_id, &qty) in claims {
        if !tx.increment_reserved(unit_id, qty).await? {
            let available = units.get(&unit_id).map_or(0, InventoryUnit::available);
            return Err(RegistrationError::InsufficientStock(Shortfall {
                unit_id,
                available,
                requested: qty,
            }));
        }
        debug!(%unit_id, qty, "stock held");
    }

    let registration = Registration::new(event.id, team.id, request.user_id, Utc::now());
    let mut items = Vec::with_capacity(request.items.len());
    for line in &request.items {
        let item = match line.target {
            ItemTarget::Unit(unit_id) => {
                let price = units.get(&unit_id).map_or(0, InventoryUnit::price);
                RegistrationItem::inventory_bound(registration.id(), unit_id, line.quantity, price)?
            }
            ItemTarget::Option(option_id) => {
                let price = option_prices.get(&option_id).copied().unwrap_or(0);
                RegistrationItem::non_inventory(registration.id(), option_id, line.quantity, price)?
            }
        };
        items.push(item);
    }

    let amount = registration_amount(event.base_fee, &items)?;
    let payment = Payment::waiting(registration.id(), amount, registration.created_at())?;

    tx.insert_registration(&registration, &items)
        .await
        .map_err(|err| match err {
            StoreError::UniqueViolation { .. } => RegistrationError::AlreadyRegistered {
                event_id: request.event_id,
                user_id: request.user_id,
            },
            other => other.into(),
        })?;
    tx.insert_payment(&payment).await?;

    Ok(RegistrationRecord {
        registration,
        items,
        payments: vec![payment],
    })
}
