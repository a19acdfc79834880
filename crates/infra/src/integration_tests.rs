//! End-to-end engine tests against the in-memory store.
//!
//! Create → Confirm / Cancel / Expire, checked through the inventory counters:
//! - holds never exceed stock, even under concurrent reservations
//! - a failed reservation leaves no partial holds
//! - each registration is settled exactly once

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use signup_core::{EventId, OptionId, RegistrationId, TeamId, UnitId, UserId};
use signup_inventory::InventoryUnit;
use signup_registration::{
    EventStatus, ItemRequest, PaymentStatus, RegistrationStatus, ReleaseOutcome,
};

use crate::{
    ErrorKind, ExpiryConfig, ExpiryRunner, InMemorySignupStore, NewRegistration, RegistrationError,
    RegistrationRecord, Signup, SignupStore, SignupTx, StoreError,
};

struct Fixture {
    signup: Arc<Signup<InMemorySignupStore>>,
    event_id: EventId,
    team_id: TeamId,
    unit_id: UnitId,
    option_id: OptionId,
}

const BASE_FEE: i64 = 1500;
const SHOE_PRICE: i64 = 4500;
const JERSEY_PRICE: i64 = 2000;

async fn fixture(stock: i64, slot_limit: i64) -> Fixture {
    fixture_with(stock, slot_limit, ExpiryConfig::default()).await
}

async fn fixture_with(stock: i64, slot_limit: i64, expiry: ExpiryConfig) -> Fixture {
    let signup = Arc::new(Signup::new(Arc::new(InMemorySignupStore::new()), expiry));
    let event = signup
        .catalog
        .create_event("Spring League".to_string(), BASE_FEE)
        .await
        .unwrap();
    let team = signup
        .catalog
        .create_team(event.id, "Falcons".to_string(), slot_limit)
        .await
        .unwrap();
    let unit = signup
        .inventory
        .create_unit("Cleats 42".to_string(), stock, SHOE_PRICE)
        .await
        .unwrap();
    let option = signup
        .catalog
        .create_apparel_option("Jersey M".to_string(), JERSEY_PRICE)
        .await
        .unwrap();
    Fixture {
        signup,
        event_id: event.id,
        team_id: team.id,
        unit_id: unit.id(),
        option_id: option.id,
    }
}

impl Fixture {
    fn request(&self, items: Vec<ItemRequest>) -> NewRegistration {
        NewRegistration {
            event_id: self.event_id,
            team_id: self.team_id,
            user_id: UserId::new(),
            items,
        }
    }

    async fn reserve(&self, qty: i64) -> Result<RegistrationRecord, RegistrationError> {
        self.signup
            .reservations
            .create_registration(self.request(vec![ItemRequest::unit(self.unit_id, qty)]))
            .await
    }

    async fn counters(&self, unit_id: UnitId) -> (i64, i64) {
        let level = self.signup.inventory.stock_level(unit_id).await.unwrap();
        (level.total_stock, level.reserved_stock)
    }

    async fn confirm(&self, record: &RegistrationRecord) -> Result<RegistrationRecord, RegistrationError> {
        let payment_id = record.live_payment().unwrap().id();
        self.signup
            .fulfillment
            .confirm_payment(record.registration.id(), payment_id)
            .await
    }

    async fn status(&self, id: RegistrationId) -> RegistrationStatus {
        self.signup.registration(id).await.unwrap().registration.status()
    }

    /// Drop a hold behind the engines' back.
    async fn lose_hold(&self, qty: i64) {
        let mut tx = self.signup.store().begin().await.unwrap();
        assert!(tx.release_reserved(self.unit_id, qty).await.unwrap());
        tx.commit().await.unwrap();
    }
}

#[tokio::test]
async fn reserve_then_confirm_consumes_stock() {
    let f = fixture(5, 10).await;

    let record = f
        .signup
        .reservations
        .create_registration(f.request(vec![
            ItemRequest::unit(f.unit_id, 2),
            ItemRequest::option(f.option_id, 1),
        ]))
        .await
        .unwrap();

    assert_eq!(record.registration.status(), RegistrationStatus::Pending);
    assert_eq!(record.items.len(), 2);
    let payment = record.live_payment().unwrap();
    assert_eq!(payment.status(), PaymentStatus::Waiting);
    assert_eq!(payment.amount(), BASE_FEE + 2 * SHOE_PRICE + JERSEY_PRICE);
    assert_eq!(f.counters(f.unit_id).await, (5, 2));

    let confirmed = f.confirm(&record).await.unwrap();
    assert_eq!(confirmed.registration.status(), RegistrationStatus::Confirmed);
    assert!(confirmed.registration.confirmed_at().is_some());
    assert_eq!(confirmed.payments[0].status(), PaymentStatus::Confirmed);
    assert_eq!(f.counters(f.unit_id).await, (3, 0));
}

#[tokio::test]
async fn insufficient_stock_reports_the_shortfall() {
    let f = fixture(1, 10).await;

    let err = f.reserve(2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Capacity);
    let body = err.body();
    assert_eq!(body.unit_id, Some(f.unit_id));
    assert_eq!(body.available, Some(1));
    assert_eq!(body.requested, Some(2));
    assert_eq!(f.counters(f.unit_id).await, (1, 0));
}

#[tokio::test]
async fn failed_reservation_leaves_no_partial_holds() {
    let f = fixture(5, 10).await;
    let empty = f
        .signup
        .inventory
        .create_unit("Cleats 44".to_string(), 0, SHOE_PRICE)
        .await
        .unwrap();

    let err = f
        .signup
        .reservations
        .create_registration(f.request(vec![
            ItemRequest::unit(f.unit_id, 2),
            ItemRequest::unit(empty.id(), 1),
        ]))
        .await
        .unwrap_err();

    assert!(matches!(err, RegistrationError::InsufficientStock(s) if s.unit_id == empty.id()));
    assert_eq!(f.counters(f.unit_id).await, (5, 0));
    assert_eq!(f.counters(empty.id()).await, (0, 0));
}

#[tokio::test]
async fn duplicate_lines_are_checked_together() {
    let f = fixture(3, 10).await;

    let err = f
        .signup
        .reservations
        .create_registration(f.request(vec![
            ItemRequest::unit(f.unit_id, 2),
            ItemRequest::unit(f.unit_id, 2),
        ]))
        .await
        .unwrap_err();

    assert_eq!(err.body().requested, Some(4));
    assert_eq!(f.counters(f.unit_id).await, (3, 0));
}

#[tokio::test]
async fn overflowing_duplicate_lines_are_rejected() {
    let f = fixture(3, 10).await;

    let err = f
        .signup
        .reservations
        .create_registration(f.request(vec![
            ItemRequest::unit(f.unit_id, i64::MAX),
            ItemRequest::unit(f.unit_id, 1),
        ]))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.reason(), "validation_error");
    assert_eq!(f.counters(f.unit_id).await, (3, 0));
}

#[tokio::test]
async fn invalid_lines_and_unknown_ids_are_validation_errors() {
    let f = fixture(3, 10).await;

    let err = f.reserve(0).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = f
        .signup
        .reservations
        .create_registration(f.request(vec![ItemRequest::unit(UnitId::new(), 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::NotFound { entity: "inventory unit", .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(f.counters(f.unit_id).await, (3, 0));
}

#[tokio::test]
async fn one_registration_per_user_and_event() {
    let f = fixture(5, 10).await;
    let request = f.request(vec![ItemRequest::unit(f.unit_id, 1)]);

    f.signup
        .reservations
        .create_registration(request.clone())
        .await
        .unwrap();
    let err = f
        .signup
        .reservations
        .create_registration(request)
        .await
        .unwrap_err();

    assert!(matches!(err, RegistrationError::AlreadyRegistered { .. }));
    assert_eq!(f.counters(f.unit_id).await, (5, 1));
}

#[tokio::test]
async fn closed_events_refuse_registrations() {
    let f = fixture(5, 10).await;
    f.signup
        .catalog
        .set_event_status(f.event_id, EventStatus::Closed)
        .await
        .unwrap();

    let err = f.reserve(1).await.unwrap_err();
    assert!(matches!(err, RegistrationError::EventNotOpen(id) if id == f.event_id));
    assert_eq!(f.counters(f.unit_id).await, (5, 0));
}

#[tokio::test]
async fn cancel_returns_holds_once() {
    let f = fixture(5, 10).await;
    let record = f.reserve(2).await.unwrap();
    let id = record.registration.id();

    let cancelled = f.signup.fulfillment.cancel_registration(id).await.unwrap();
    assert_eq!(cancelled.registration.status(), RegistrationStatus::Cancelled);
    assert_eq!(cancelled.payments[0].status(), PaymentStatus::Cancelled);
    assert_eq!(f.counters(f.unit_id).await, (5, 0));

    let again = f.signup.fulfillment.cancel_registration(id).await.unwrap_err();
    assert!(matches!(
        again,
        RegistrationError::AlreadyTerminal { status: RegistrationStatus::Cancelled, .. }
    ));
    let confirm = f.confirm(&record).await.unwrap_err();
    assert_eq!(confirm.kind(), ErrorKind::Conflict);
    assert_eq!(f.counters(f.unit_id).await, (5, 0));
}

#[tokio::test]
async fn confirmed_registrations_cannot_be_settled_again() {
    let f = fixture(5, 10).await;
    let record = f.reserve(2).await.unwrap();
    f.confirm(&record).await.unwrap();

    let twice = f.confirm(&record).await.unwrap_err();
    assert!(matches!(twice, RegistrationError::AlreadyConfirmed(_)));

    let cancel = f
        .signup
        .fulfillment
        .cancel_registration(record.registration.id())
        .await
        .unwrap_err();
    assert!(matches!(cancel, RegistrationError::AlreadyConfirmed(_)));
    assert_eq!(f.counters(f.unit_id).await, (3, 0));
}

#[tokio::test]
async fn missing_hold_aborts_confirmation() {
    let f = fixture(5, 10).await;
    let record = f.reserve(2).await.unwrap();
    f.lose_hold(2).await;

    let err = f.confirm(&record).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Consistency);

    let stored = f.signup.registration(record.registration.id()).await.unwrap();
    assert_eq!(stored.registration.status(), RegistrationStatus::Pending);
    assert_eq!(stored.payments[0].status(), PaymentStatus::Waiting);
    assert_eq!(f.counters(f.unit_id).await, (5, 0));
}

#[tokio::test]
async fn missing_hold_does_not_block_release() {
    let f = fixture(5, 10).await;
    let record = f.reserve(2).await.unwrap();
    f.lose_hold(2).await;

    let released = f
        .signup
        .fulfillment
        .release(record.registration.id(), ReleaseOutcome::Cancelled)
        .await
        .unwrap();
    assert_eq!(released.registration.status(), RegistrationStatus::Cancelled);
    assert_eq!(f.counters(f.unit_id).await, (5, 0));
}

#[tokio::test]
async fn team_limit_applies_at_reservation_and_confirmation() {
    let f = fixture(10, 1).await;
    let first = f.reserve(1).await.unwrap();
    let second = f.reserve(1).await.unwrap();

    f.confirm(&first).await.unwrap();
    let err = f.confirm(&second).await.unwrap_err();
    assert!(matches!(err, RegistrationError::TeamFull { slot_limit: 1, .. }));
    assert_eq!(f.status(second.registration.id()).await, RegistrationStatus::Pending);
    assert_eq!(f.counters(f.unit_id).await, (9, 1));

    let third = f.reserve(1).await.unwrap_err();
    assert_eq!(third.kind(), ErrorKind::Capacity);
}

#[tokio::test]
async fn rejected_payment_can_be_resubmitted_and_confirmed() {
    let f = fixture(5, 10).await;
    let record = f.reserve(1).await.unwrap();
    let id = record.registration.id();
    let first_payment = record.live_payment().unwrap().id();

    let busy = f.signup.fulfillment.resubmit_payment(id).await.unwrap_err();
    assert_eq!(busy.kind(), ErrorKind::Conflict);

    let rejected = f
        .signup
        .fulfillment
        .reject_payment(id, first_payment, Some("unreadable receipt".to_string()))
        .await
        .unwrap();
    assert_eq!(rejected.registration.status(), RegistrationStatus::Pending);
    assert!(rejected.live_payment().is_none());
    assert_eq!(f.counters(f.unit_id).await, (5, 1));

    let stale = f
        .signup
        .fulfillment
        .confirm_payment(id, first_payment)
        .await
        .unwrap_err();
    assert_eq!(stale.kind(), ErrorKind::Conflict);

    let resubmitted = f.signup.fulfillment.resubmit_payment(id).await.unwrap();
    assert_eq!(resubmitted.payments.len(), 2);
    let live = resubmitted.live_payment().unwrap();
    assert_eq!(live.amount(), record.payments[0].amount());

    f.confirm(&resubmitted).await.unwrap();
    assert_eq!(f.counters(f.unit_id).await, (4, 0));
}

#[tokio::test]
async fn restock_cannot_drop_below_holds() {
    let f = fixture(3, 10).await;
    f.reserve(2).await.unwrap();

    let err = f.signup.inventory.restock(f.unit_id, -2).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(f.counters(f.unit_id).await, (3, 2));

    let level = f.signup.inventory.restock(f.unit_id, 4).await.unwrap();
    assert_eq!((level.total_stock, level.available), (7, 5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reservations_never_oversell() {
    let f = Arc::new(fixture(5, 100).await);

    let mut tasks = Vec::new();
    for _ in 0..20 {
        let f = Arc::clone(&f);
        tasks.push(tokio::spawn(async move { f.reserve(1).await }));
    }

    let mut reserved = 0;
    let mut refused = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => reserved += 1,
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::Capacity);
                refused += 1;
            }
        }
    }
    assert_eq!((reserved, refused), (5, 15));
    assert_eq!(f.counters(f.unit_id).await, (5, 5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn confirm_and_cancel_race_has_one_winner() {
    let f = Arc::new(fixture(5, 10).await);
    let record = f.reserve(2).await.unwrap();

    let confirm = {
        let f = Arc::clone(&f);
        let record = record.clone();
        tokio::spawn(async move { f.confirm(&record).await })
    };
    let cancel = {
        let f = Arc::clone(&f);
        let id = record.registration.id();
        tokio::spawn(async move { f.signup.fulfillment.cancel_registration(id).await })
    };
    let (confirm, cancel) = (confirm.await.unwrap(), cancel.await.unwrap());

    assert!(confirm.is_ok() != cancel.is_ok());
    let expected = if confirm.is_ok() { (3, 0) } else { (5, 0) };
    assert_eq!(f.counters(f.unit_id).await, expected);
}

#[tokio::test]
async fn sweep_expires_only_stale_pending() {
    let f = fixture(5, 10).await;
    let stale = f.reserve(2).await.unwrap();
    let settled = f.reserve(1).await.unwrap();
    f.confirm(&settled).await.unwrap();

    let early = f.signup.sweeper.sweep(Utc::now()).await.unwrap();
    assert_eq!(early.scanned, 0);

    let later = Utc::now() + chrono::Duration::hours(25);
    let report = f.signup.sweeper.sweep(later).await.unwrap();
    assert_eq!((report.scanned, report.expired, report.skipped), (1, 1, 0));
    assert!(report.failures.is_empty());

    let expired = f.signup.registration(stale.registration.id()).await.unwrap();
    assert_eq!(expired.registration.status(), RegistrationStatus::Expired);
    assert!(expired.registration.expired_at().is_some());
    assert_eq!(expired.payments[0].status(), PaymentStatus::Expired);
    assert_eq!(f.status(settled.registration.id()).await, RegistrationStatus::Confirmed);
    assert_eq!(f.counters(f.unit_id).await, (4, 0));

    let again = f.signup.sweeper.sweep(later).await.unwrap();
    assert_eq!(again.scanned, 0);
}

/// In-memory store whose stale scan also reports ids that were settled or
/// never existed, as a scan racing other writers would.
#[derive(Default)]
struct RacingScanStore {
    inner: InMemorySignupStore,
    extra: Mutex<Vec<RegistrationId>>,
}

#[async_trait]
impl SignupStore for RacingScanStore {
    type Tx = <InMemorySignupStore as SignupStore>::Tx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        self.inner.begin().await
    }

    async fn stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<RegistrationId>, StoreError> {
        let mut ids = self.extra.lock().unwrap().clone();
        ids.extend(self.inner.stale_pending(cutoff, limit).await?);
        Ok(ids)
    }

    async fn unit(&self, id: UnitId) -> Result<Option<InventoryUnit>, StoreError> {
        self.inner.unit(id).await
    }

    async fn registration(&self, id: RegistrationId) -> Result<Option<RegistrationRecord>, StoreError> {
        self.inner.registration(id).await
    }
}

#[tokio::test]
async fn sweep_skips_settled_and_survives_failures() {
    let store = Arc::new(RacingScanStore::default());
    let signup = Signup::new(Arc::clone(&store), ExpiryConfig::default());
    let event = signup
        .catalog
        .create_event("Spring League".to_string(), BASE_FEE)
        .await
        .unwrap();
    let team = signup
        .catalog
        .create_team(event.id, "Falcons".to_string(), 10)
        .await
        .unwrap();
    let unit = signup
        .inventory
        .create_unit("Cleats 42".to_string(), 5, SHOE_PRICE)
        .await
        .unwrap();
    let request = || NewRegistration {
        event_id: event.id,
        team_id: team.id,
        user_id: UserId::new(),
        items: vec![ItemRequest::unit(unit.id(), 1)],
    };

    let settled = signup.reservations.create_registration(request()).await.unwrap();
    let payment_id = settled.live_payment().unwrap().id();
    signup
        .fulfillment
        .confirm_payment(settled.registration.id(), payment_id)
        .await
        .unwrap();
    let stale = signup.reservations.create_registration(request()).await.unwrap();

    let unknown = RegistrationId::new();
    *store.extra.lock().unwrap() = vec![settled.registration.id(), unknown];

    let later = Utc::now() + chrono::Duration::hours(25);
    let report = signup.sweeper.sweep(later).await.unwrap();

    assert_eq!(report.scanned, 3);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.expired, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].registration_id, unknown);
    assert_eq!(report.failures[0].reason, "not_found");

    let expired = signup.registration(stale.registration.id()).await.unwrap();
    assert_eq!(expired.registration.status(), RegistrationStatus::Expired);
    let confirmed = signup.registration(settled.registration.id()).await.unwrap();
    assert_eq!(confirmed.registration.status(), RegistrationStatus::Confirmed);
    let level = signup.inventory.stock_level(unit.id()).await.unwrap();
    assert_eq!((level.total_stock, level.reserved_stock), (4, 0));
}

#[tokio::test]
async fn sweep_respects_batch_size() {
    let expiry = ExpiryConfig {
        batch_size: 2,
        ..ExpiryConfig::default()
    };
    let f = fixture_with(10, 10, expiry).await;
    for _ in 0..3 {
        f.reserve(1).await.unwrap();
    }

    let later = Utc::now() + chrono::Duration::hours(25);
    let first = f.signup.sweeper.sweep(later).await.unwrap();
    assert_eq!(first.expired, 2);
    let second = f.signup.sweeper.sweep(later).await.unwrap();
    assert_eq!(second.expired, 1);
    assert_eq!(f.counters(f.unit_id).await, (10, 0));
}

#[tokio::test]
async fn runner_sweeps_on_start_and_stops_on_shutdown() {
    let expiry = ExpiryConfig {
        pending_timeout: Duration::ZERO,
        sweep_interval: Duration::from_secs(3600),
        batch_size: 100,
    };
    let f = fixture_with(5, 10, expiry).await;
    let record = f.reserve(1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let handle = ExpiryRunner::new(expiry.sweep_interval).spawn(Arc::clone(&f.signup.sweeper));
    handle.trigger();

    let mut status = RegistrationStatus::Pending;
    for _ in 0..100 {
        status = f.status(record.registration.id()).await;
        if status != RegistrationStatus::Pending {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.shutdown().await;

    assert_eq!(status, RegistrationStatus::Expired);
    assert_eq!(f.counters(f.unit_id).await, (5, 0));
}
