//! Fulfillment engine: settles a pending registration.
//!
//! Confirmation turns holds into consumed stock. Cancellation and expiry share
//! [`FulfillmentEngine::release`], which gives holds back. Every operation
//! locks the registration row first, so concurrent confirm and release on the
//! same registration are serialised and exactly one of them wins.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use signup_core::{PaymentId, RegistrationId, UnitId};
use signup_registration::{
    Payment, PaymentStatus, Registration, RegistrationItem, RegistrationStatus, ReleaseOutcome,
    stock_claims,
};

use crate::error::{ErrorKind, RegistrationError};
use crate::store::{RegistrationRecord, SignupStore, SignupTx, StoreError, abandon};

#[derive(Debug)]
pub struct FulfillmentEngine<S> {
    store: Arc<S>,
}

impl<S> Clone for FulfillmentEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: SignupStore> FulfillmentEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Confirm a verified payment and consume the registration's holds.
    ///
    /// A hold that cannot be finalized means counters and registration state
    /// disagree; the whole confirmation is rolled back and reported as
    /// [`ErrorKind::Consistency`].
    #[instrument(skip(self), fields(registration_id = %registration_id, payment_id = %payment_id), err)]
    pub async fn confirm_payment(
        &self,
        registration_id: RegistrationId,
        payment_id: PaymentId,
    ) -> Result<RegistrationRecord, RegistrationError> {
        let mut tx = self.store.begin().await?;
        match confirm(&mut tx, registration_id, payment_id).await {
            Ok(record) => {
                tx.commit().await?;
                info!("registration confirmed");
                Ok(record)
            }
            Err(err) => {
                if err.kind() == ErrorKind::Consistency {
                    error!(error = %err, "confirmation aborted: holds do not match registration");
                }
                abandon(tx, "confirm_payment").await;
                Err(err)
            }
        }
    }

    /// Participant-initiated cancellation of a pending registration.
    pub async fn cancel_registration(
        &self,
        registration_id: RegistrationId,
    ) -> Result<RegistrationRecord, RegistrationError> {
        self.release(registration_id, ReleaseOutcome::Cancelled).await
    }

    /// Give back a pending registration's holds and close it as `outcome`.
    ///
    /// A hold that is already gone is logged at warn level and does not fail
    /// the release.
    #[instrument(skip(self), fields(registration_id = %registration_id, outcome = ?outcome), err)]
    pub async fn release(
        &self,
        registration_id: RegistrationId,
        outcome: ReleaseOutcome,
    ) -> Result<RegistrationRecord, RegistrationError> {
        let mut tx = self.store.begin().await?;
        match release(&mut tx, registration_id, outcome).await {
            Ok(record) => {
                tx.commit().await?;
                info!("registration released");
                Ok(record)
            }
            Err(err) => {
                abandon(tx, "release").await;
                Err(err)
            }
        }
    }

    /// Reject a submitted payment. The registration stays pending with its
    /// holds intact so the participant can pay again.
    #[instrument(skip(self, note), fields(registration_id = %registration_id, payment_id = %payment_id), err)]
    pub async fn reject_payment(
        &self,
        registration_id: RegistrationId,
        payment_id: PaymentId,
        note: Option<String>,
    ) -> Result<RegistrationRecord, RegistrationError> {
        let mut tx = self.store.begin().await?;
        match reject(&mut tx, registration_id, payment_id, note).await {
            Ok(record) => {
                tx.commit().await?;
                info!("payment rejected");
                Ok(record)
            }
            Err(err) => {
                abandon(tx, "reject_payment").await;
                Err(err)
            }
        }
    }

    /// Open a fresh waiting payment for a pending registration whose previous
    /// payment was rejected.
    #[instrument(skip(self), fields(registration_id = %registration_id), err)]
    pub async fn resubmit_payment(
        &self,
        registration_id: RegistrationId,
    ) -> Result<RegistrationRecord, RegistrationError> {
        let mut tx = self.store.begin().await?;
        match resubmit(&mut tx, registration_id).await {
            Ok(record) => {
                tx.commit().await?;
                info!("payment resubmitted");
                Ok(record)
            }
            Err(err) => {
                abandon(tx, "resubmit_payment").await;
                Err(err)
            }
        }
    }
}

/// Lock the registration and insist it is still pending.
async fn lock_pending<T: SignupTx>(
    tx: &mut T,
    registration_id: RegistrationId,
) -> Result<Registration, RegistrationError> {
    let registration = tx
        .lock_registration(registration_id)
        .await?
        .ok_or_else(|| RegistrationError::not_found("registration", registration_id))?;
    match registration.status() {
        RegistrationStatus::Pending => Ok(registration),
        RegistrationStatus::Confirmed => Err(RegistrationError::AlreadyConfirmed(format!(
            "registration {registration_id}"
        ))),
        status => Err(RegistrationError::AlreadyTerminal {
            id: registration_id,
            status,
        }),
    }
}

fn find_payment(
    payments: &[Payment],
    registration_id: RegistrationId,
    payment_id: PaymentId,
) -> Result<usize, RegistrationError> {
    payments
        .iter()
        .position(|p| p.id() == payment_id)
        .ok_or_else(|| {
            RegistrationError::not_found(
                "payment",
                format!("{payment_id} on registration {registration_id}"),
            )
        })
}

async fn write_payment<T: SignupTx>(
    tx: &mut T,
    payment: &Payment,
    expected: PaymentStatus,
) -> Result<(), RegistrationError> {
    if tx.update_payment(payment, expected).await? {
        Ok(())
    } else {
        Err(RegistrationError::Conflict(format!(
            "payment {} is no longer {expected}",
            payment.id()
        )))
    }
}

async fn write_transition<T: SignupTx>(
    tx: &mut T,
    registration: &Registration,
) -> Result<(), RegistrationError> {
    if tx.transition_registration(registration).await? {
        Ok(())
    } else {
        Err(RegistrationError::Conflict(format!(
            "registration {} is no longer pending",
            registration.id()
        )))
    }
}

/// Stored lines were summed once at reservation, so an overflow here means
/// the rows were altered behind the engine.
fn claims_of(items: &[RegistrationItem]) -> Result<BTreeMap<UnitId, i64>, RegistrationError> {
    stock_claims(items.iter().map(|item| (item.unit_id(), item.quantity())))
        .map_err(|err| RegistrationError::Consistency(err.to_string()))
}

async fn confirm<T: SignupTx>(
    tx: &mut T,
    registration_id: RegistrationId,
    payment_id: PaymentId,
) -> Result<RegistrationRecord, RegistrationError> {
    let registration = tx
        .lock_registration(registration_id)
        .await?
        .ok_or_else(|| RegistrationError::not_found("registration", registration_id))?;
    let mut payments = tx.payments(registration_id).await?;
    let index = find_payment(&payments, registration_id, payment_id)?;

    if payments[index].status() == PaymentStatus::Confirmed {
        return Err(RegistrationError::AlreadyConfirmed(format!("payment {payment_id}")));
    }
    // Status as seen under the row lock.
    let mut registration = match registration.status() {
        RegistrationStatus::Pending => registration,
        RegistrationStatus::Confirmed => {
            return Err(RegistrationError::AlreadyConfirmed(format!(
                "registration {registration_id}"
            )));
        }
        status => {
            return Err(RegistrationError::AlreadyTerminal {
                id: registration_id,
                status,
            });
        }
    };

    let now = Utc::now();
    let expected = payments[index].status();
    payments[index].confirm(now)?;
    write_payment(tx, &payments[index], expected).await?;

    let team = tx.lock_team(registration.team_id()).await?.ok_or_else(|| {
        RegistrationError::Consistency(format!(
            "team {} of registration {registration_id} is missing",
            registration.team_id()
        ))
    })?;
    if team.is_full(tx.confirmed_count(team.id).await?) {
        return Err(RegistrationError::TeamFull {
            team_id: team.id,
            slot_limit: team.slot_limit,
        });
    }

    let items = tx.items(registration_id).await?;
    for (unit_id, qty) in claims_of(&items)? {
        if !tx.finalize_reserved(unit_id, qty).await? {
            return Err(RegistrationError::Consistency(format!(
                "hold of {qty} on unit {unit_id} for registration {registration_id} is missing"
            )));
        }
    }

    registration.confirm(now)?;
    write_transition(tx, &registration).await?;

    Ok(RegistrationRecord {
        registration,
        items,
        payments,
    })
}

async fn release<T: SignupTx>(
    tx: &mut T,
    registration_id: RegistrationId,
    outcome: ReleaseOutcome,
) -> Result<RegistrationRecord, RegistrationError> {
    let mut registration = lock_pending(tx, registration_id).await?;

    let items = tx.items(registration_id).await?;
    for (unit_id, qty) in claims_of(&items)? {
        if !tx.release_reserved(unit_id, qty).await? {
            warn!(
                %registration_id,
                %unit_id,
                qty,
                "hold already released; continuing"
            );
        }
    }

    let now = Utc::now();
    registration.release(outcome, now)?;
    write_transition(tx, &registration).await?;

    let mut payments = tx.payments(registration_id).await?;
    for payment in payments.iter_mut().filter(|p| p.status().is_live()) {
        let expected = payment.status();
        payment.void(outcome, now)?;
        write_payment(tx, payment, expected).await?;
    }

    Ok(RegistrationRecord {
        registration,
        items,
        payments,
    })
}

async fn reject<T: SignupTx>(
    tx: &mut T,
    registration_id: RegistrationId,
    payment_id: PaymentId,
    note: Option<String>,
) -> Result<RegistrationRecord, RegistrationError> {
    let registration = lock_pending(tx, registration_id).await?;
    let mut payments = tx.payments(registration_id).await?;
    let index = find_payment(&payments, registration_id, payment_id)?;

    let expected = payments[index].status();
    if expected == PaymentStatus::Confirmed {
        return Err(RegistrationError::AlreadyConfirmed(format!("payment {payment_id}")));
    }
    payments[index].reject(note, Utc::now())?;
    write_payment(tx, &payments[index], expected).await?;

    let items = tx.items(registration_id).await?;
    Ok(RegistrationRecord {
        registration,
        items,
        payments,
    })
}

async fn resubmit<T: SignupTx>(
    tx: &mut T,
    registration_id: RegistrationId,
) -> Result<RegistrationRecord, RegistrationError> {
    let registration = lock_pending(tx, registration_id).await?;
    let mut payments = tx.payments(registration_id).await?;

    if let Some(live) = payments.iter().find(|p| p.status().is_live()) {
        return Err(RegistrationError::Conflict(format!(
            "registration {registration_id} already has live payment {}",
            live.id()
        )));
    }
    let amount = payments.first().map(Payment::amount).ok_or_else(|| {
        RegistrationError::Consistency(format!("registration {registration_id} has no payment"))
    })?;

    let payment = Payment::waiting(registration_id, amount, Utc::now())?;
    tx.insert_payment(&payment).await.map_err(|err| match err {
        StoreError::UniqueViolation { .. } => RegistrationError::Conflict(format!(
            "registration {registration_id} already has a live payment"
        )),
        other => other.into(),
    })?;
    payments.push(payment);

    let items = tx.items(registration_id).await?;
    Ok(RegistrationRecord {
        registration,
        items,
        payments,
    })
}
