//! Postgres-backed signup store.
//!
//! Locking reads use `SELECT ... FOR UPDATE`; counter changes are single
//! conditional `UPDATE`s whose `WHERE` clause carries the guard, so
//! `rows_affected() == 0` means the guard failed.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Code | StoreError |
//! |------------|-----------------|------------|
//! | Database (unique violation) | `23505` | `UniqueViolation` |
//! | Database (other) | any | `Database` |
//! | PoolClosed | N/A | `PoolClosed` |
//! | ColumnDecode / Decode | N/A | `Decode` |
//! | Other | N/A | `Database` |

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};

use signup_core::{
    EventId, OptionId, PaymentId, RegistrationId, RegistrationItemId, TeamId, UnitId, UserId,
};
use signup_inventory::InventoryUnit;
use signup_registration::{
    ApparelOption, Event, EventStatus, ItemKind, Payment, PaymentStatus, Registration,
    RegistrationItem, RegistrationStatus, Team,
};

use super::{RegistrationRecord, SignupStore, SignupTx, StoreError};

/// Connection settings for [`PostgresSignupStore::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct PostgresSignupStore {
    pool: Arc<PgPool>,
}

impl PostgresSignupStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(self.pool.as_ref())
            .await
            .map_err(|e| StoreError::Database {
                operation: "migrate",
                message: e.to_string(),
            })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SignupStore for PostgresSignupStore {
    type Tx = PostgresTx;

    async fn begin(&self) -> Result<PostgresTx, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTx { tx })
    }

    #[instrument(skip(self), fields(cutoff = %cutoff, found = tracing::field::Empty), err)]
    async fn stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<RegistrationId>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM registrations
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(|e| map_sqlx_error("stale_pending", e))?;

        let ids = rows
            .iter()
            .map(|row| {
                row.try_get::<uuid::Uuid, _>("id")
                    .map(RegistrationId::from_uuid)
                    .map_err(|e| decode_error("registration", e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Span::current().record("found", ids.len());
        Ok(ids)
    }

    async fn unit(&self, id: UnitId) -> Result<Option<InventoryUnit>, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        fetch_unit(&mut conn, id, false).await
    }

    async fn registration(&self, id: RegistrationId) -> Result<Option<RegistrationRecord>, StoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        let Some(registration) = fetch_registration(&mut conn, id, false).await? else {
            return Ok(None);
        };
        let items = fetch_items(&mut conn, id).await?;
        let payments = fetch_payments(&mut conn, id, false).await?;
        Ok(Some(RegistrationRecord {
            registration,
            items,
            payments,
        }))
    }
}

#[async_trait]
impl SignupTx for PostgresTx {
    async fn lock_unit(&mut self, id: UnitId) -> Result<Option<InventoryUnit>, StoreError> {
        fetch_unit(&mut self.tx, id, true).await
    }

    async fn increment_reserved(&mut self, id: UnitId, qty: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_units
            SET reserved_stock = reserved_stock + $2, updated_at = NOW()
            WHERE id = $1 AND total_stock - reserved_stock >= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(qty)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("increment_reserved", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn finalize_reserved(&mut self, id: UnitId, qty: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_units
            SET total_stock = total_stock - $2,
                reserved_stock = reserved_stock - $2,
                updated_at = NOW()
            WHERE id = $1 AND reserved_stock >= $2 AND total_stock >= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(qty)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("finalize_reserved", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_reserved(&mut self, id: UnitId, qty: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_units
            SET reserved_stock = reserved_stock - $2, updated_at = NOW()
            WHERE id = $1 AND reserved_stock >= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(qty)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("release_reserved", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_unit(&mut self, unit: &InventoryUnit) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO inventory_units (id, label, price, total_stock, reserved_stock)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(unit.id().as_uuid())
        .bind(unit.label())
        .bind(unit.price())
        .bind(unit.total_stock())
        .bind(unit.reserved_stock())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_unit", e))?;
        Ok(())
    }

    async fn set_total_stock(&mut self, id: UnitId, total: i64) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_units
            SET total_stock = $2, updated_at = NOW()
            WHERE id = $1 AND reserved_stock <= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(total)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("set_total_stock", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn event(&mut self, id: EventId) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query("SELECT id, name, status, base_fee FROM events WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("event", e))?;
        row.map(|row| EventRow::from_row(&row).map_err(|e| decode_error("event", e))?.into_domain())
            .transpose()
    }

    async fn insert_event(&mut self, event: &Event) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO events (id, name, status, base_fee) VALUES ($1, $2, $3, $4)")
            .bind(event.id.as_uuid())
            .bind(&event.name)
            .bind(event.status.as_str())
            .bind(event.base_fee)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_event", e))?;
        Ok(())
    }

    async fn set_event_status(&mut self, id: EventId, status: EventStatus) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE events SET status = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("set_event_status", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn lock_team(&mut self, id: TeamId) -> Result<Option<Team>, StoreError> {
        let row = sqlx::query("SELECT id, event_id, name, slot_limit FROM teams WHERE id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_team", e))?;
        row.map(|row| -> Result<Team, StoreError> {
            Ok(Team {
                id: TeamId::from_uuid(row.try_get("id").map_err(|e| decode_error("team", e))?),
                event_id: EventId::from_uuid(row.try_get("event_id").map_err(|e| decode_error("team", e))?),
                name: row.try_get("name").map_err(|e| decode_error("team", e))?,
                slot_limit: row.try_get("slot_limit").map_err(|e| decode_error("team", e))?,
            })
        })
        .transpose()
    }

    async fn insert_team(&mut self, team: &Team) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO teams (id, event_id, name, slot_limit) VALUES ($1, $2, $3, $4)")
            .bind(team.id.as_uuid())
            .bind(team.event_id.as_uuid())
            .bind(&team.name)
            .bind(team.slot_limit)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_team", e))?;
        Ok(())
    }

    async fn apparel_option(&mut self, id: OptionId) -> Result<Option<ApparelOption>, StoreError> {
        let row = sqlx::query("SELECT id, label, price FROM apparel_options WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("apparel_option", e))?;
        row.map(|row| -> Result<ApparelOption, StoreError> {
            Ok(ApparelOption {
                id: OptionId::from_uuid(row.try_get("id").map_err(|e| decode_error("apparel_option", e))?),
                label: row.try_get("label").map_err(|e| decode_error("apparel_option", e))?,
                price: row.try_get("price").map_err(|e| decode_error("apparel_option", e))?,
            })
        })
        .transpose()
    }

    async fn insert_apparel_option(&mut self, option: &ApparelOption) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO apparel_options (id, label, price) VALUES ($1, $2, $3)")
            .bind(option.id.as_uuid())
            .bind(&option.label)
            .bind(option.price)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_apparel_option", e))?;
        Ok(())
    }

    async fn registration_exists(&mut self, event_id: EventId, user_id: UserId) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM registrations WHERE event_id = $1 AND user_id = $2)",
        )
        .bind(event_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("registration_exists", e))
    }

    async fn confirmed_count(&mut self, team_id: TeamId) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM registrations WHERE team_id = $1 AND status = 'confirmed'",
        )
        .bind(team_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("confirmed_count", e))
    }

    #[instrument(
        skip(self, registration, items),
        fields(registration_id = %registration.id(), item_count = items.len()),
        err
    )]
    async fn insert_registration(
        &mut self,
        registration: &Registration,
        items: &[RegistrationItem],
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO registrations (id, event_id, team_id, user_id, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(registration.id().as_uuid())
        .bind(registration.event_id().as_uuid())
        .bind(registration.team_id().as_uuid())
        .bind(registration.user_id().as_uuid())
        .bind(registration.status().as_str())
        .bind(registration.created_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_registration", e))?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO registration_items
                    (id, registration_id, kind, unit_id, option_id, quantity, price)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(item.id().as_uuid())
            .bind(item.registration_id().as_uuid())
            .bind(item.kind().as_str())
            .bind(item.unit_id().map(|id| *id.as_uuid()))
            .bind(item.option_id().map(|id| *id.as_uuid()))
            .bind(item.quantity())
            .bind(item.price())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_registration_item", e))?;
        }
        Ok(())
    }

    async fn lock_registration(&mut self, id: RegistrationId) -> Result<Option<Registration>, StoreError> {
        fetch_registration(&mut self.tx, id, true).await
    }

    async fn items(&mut self, registration_id: RegistrationId) -> Result<Vec<RegistrationItem>, StoreError> {
        fetch_items(&mut self.tx, registration_id).await
    }

    async fn payments(&mut self, registration_id: RegistrationId) -> Result<Vec<Payment>, StoreError> {
        fetch_payments(&mut self.tx, registration_id, true).await
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, registration_id, amount, status, note, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(payment.id().as_uuid())
        .bind(payment.registration_id().as_uuid())
        .bind(payment.amount())
        .bind(payment.status().as_str())
        .bind(payment.note())
        .bind(payment.created_at())
        .bind(payment.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_payment", e))?;
        Ok(())
    }

    async fn transition_registration(&mut self, registration: &Registration) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE registrations
            SET status = $2, confirmed_at = $3, cancelled_at = $4, expired_at = $5
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(registration.id().as_uuid())
        .bind(registration.status().as_str())
        .bind(registration.confirmed_at())
        .bind(registration.cancelled_at())
        .bind(registration.expired_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("transition_registration", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_payment(&mut self, payment: &Payment, expected: PaymentStatus) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, note = $3, updated_at = $4
            WHERE id = $1 AND status = $5
            "#,
        )
        .bind(payment.id().as_uuid())
        .bind(payment.status().as_str())
        .bind(payment.note())
        .bind(payment.updated_at())
        .bind(expected.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_payment", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

async fn fetch_unit(
    conn: &mut PgConnection,
    id: UnitId,
    for_update: bool,
) -> Result<Option<InventoryUnit>, StoreError> {
    let sql = if for_update {
        "SELECT id, label, price, total_stock, reserved_stock FROM inventory_units WHERE id = $1 FOR UPDATE"
    } else {
        "SELECT id, label, price, total_stock, reserved_stock FROM inventory_units WHERE id = $1"
    };
    let row = sqlx::query(sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_unit", e))?;
    row.map(|row| UnitRow::from_row(&row).map_err(|e| decode_error("inventory_unit", e))?.into_domain())
        .transpose()
}

async fn fetch_registration(
    conn: &mut PgConnection,
    id: RegistrationId,
    for_update: bool,
) -> Result<Option<Registration>, StoreError> {
    let sql = if for_update {
        r#"
        SELECT id, event_id, team_id, user_id, status, created_at,
               confirmed_at, cancelled_at, expired_at
        FROM registrations WHERE id = $1 FOR UPDATE
        "#
    } else {
        r#"
        SELECT id, event_id, team_id, user_id, status, created_at,
               confirmed_at, cancelled_at, expired_at
        FROM registrations WHERE id = $1
        "#
    };
    let row = sqlx::query(sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_registration", e))?;
    row.map(|row| {
        RegistrationRow::from_row(&row)
            .map_err(|e| decode_error("registration", e))?
            .into_domain()
    })
    .transpose()
}

async fn fetch_items(
    conn: &mut PgConnection,
    registration_id: RegistrationId,
) -> Result<Vec<RegistrationItem>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT id, registration_id, kind, unit_id, option_id, quantity, price
        FROM registration_items
        WHERE registration_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(registration_id.as_uuid())
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("fetch_items", e))?;

    rows.iter()
        .map(|row| {
            ItemRow::from_row(row)
                .map_err(|e| decode_error("registration_item", e))?
                .into_domain()
        })
        .collect()
}

async fn fetch_payments(
    conn: &mut PgConnection,
    registration_id: RegistrationId,
    for_update: bool,
) -> Result<Vec<Payment>, StoreError> {
    let sql = if for_update {
        r#"
        SELECT id, registration_id, amount, status, note, created_at, updated_at
        FROM payments WHERE registration_id = $1
        ORDER BY created_at ASC, id ASC
        FOR UPDATE
        "#
    } else {
        r#"
        SELECT id, registration_id, amount, status, note, created_at, updated_at
        FROM payments WHERE registration_id = $1
        ORDER BY created_at ASC, id ASC
        "#
    };
    let rows = sqlx::query(sql)
        .bind(registration_id.as_uuid())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_payments", e))?;

    rows.iter()
        .map(|row| {
            PaymentRow::from_row(row)
                .map_err(|e| decode_error("payment", e))?
                .into_domain()
        })
        .collect()
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                StoreError::UniqueViolation {
                    operation,
                    constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                }
            } else {
                StoreError::Database {
                    operation,
                    message: db_err.message().to_string(),
                }
            }
        }
        sqlx::Error::PoolClosed => StoreError::PoolClosed(operation),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StoreError::Decode {
            entity: operation,
            message: err.to_string(),
        },
        _ => StoreError::Database {
            operation,
            message: err.to_string(),
        },
    }
}

fn decode_error(entity: &'static str, err: impl Display) -> StoreError {
    StoreError::Decode {
        entity,
        message: err.to_string(),
    }
}

struct UnitRow {
    id: uuid::Uuid,
    label: String,
    price: i64,
    total_stock: i64,
    reserved_stock: i64,
}

impl<'r> FromRow<'r, PgRow> for UnitRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UnitRow {
            id: row.try_get("id")?,
            label: row.try_get("label")?,
            price: row.try_get("price")?,
            total_stock: row.try_get("total_stock")?,
            reserved_stock: row.try_get("reserved_stock")?,
        })
    }
}

impl UnitRow {
    fn into_domain(self) -> Result<InventoryUnit, StoreError> {
        InventoryUnit::from_parts(
            UnitId::from_uuid(self.id),
            self.label,
            self.price,
            self.total_stock,
            self.reserved_stock,
        )
        .map_err(|e| decode_error("inventory_unit", e))
    }
}

struct EventRow {
    id: uuid::Uuid,
    name: String,
    status: String,
    base_fee: i64,
}

impl<'r> FromRow<'r, PgRow> for EventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EventRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            status: row.try_get("status")?,
            base_fee: row.try_get("base_fee")?,
        })
    }
}

impl EventRow {
    fn into_domain(self) -> Result<Event, StoreError> {
        Ok(Event {
            id: EventId::from_uuid(self.id),
            name: self.name,
            status: self.status.parse().map_err(|e| decode_error("event", e))?,
            base_fee: self.base_fee,
        })
    }
}

struct RegistrationRow {
    id: uuid::Uuid,
    event_id: uuid::Uuid,
    team_id: uuid::Uuid,
    user_id: uuid::Uuid,
    status: String,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    expired_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for RegistrationRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RegistrationRow {
            id: row.try_get("id")?,
            event_id: row.try_get("event_id")?,
            team_id: row.try_get("team_id")?,
            user_id: row.try_get("user_id")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            confirmed_at: row.try_get("confirmed_at")?,
            cancelled_at: row.try_get("cancelled_at")?,
            expired_at: row.try_get("expired_at")?,
        })
    }
}

impl RegistrationRow {
    fn into_domain(self) -> Result<Registration, StoreError> {
        let status: RegistrationStatus = self
            .status
            .parse()
            .map_err(|e| decode_error("registration", e))?;
        let terminal_at = match status {
            RegistrationStatus::Pending => None,
            RegistrationStatus::Confirmed => self.confirmed_at,
            RegistrationStatus::Cancelled => self.cancelled_at,
            RegistrationStatus::Expired => self.expired_at,
        };
        Registration::from_parts(
            RegistrationId::from_uuid(self.id),
            EventId::from_uuid(self.event_id),
            TeamId::from_uuid(self.team_id),
            UserId::from_uuid(self.user_id),
            status,
            self.created_at,
            terminal_at,
        )
        .map_err(|e| decode_error("registration", e))
    }
}

struct ItemRow {
    id: uuid::Uuid,
    registration_id: uuid::Uuid,
    kind: String,
    unit_id: Option<uuid::Uuid>,
    option_id: Option<uuid::Uuid>,
    quantity: i64,
    price: i64,
}

impl<'r> FromRow<'r, PgRow> for ItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRow {
            id: row.try_get("id")?,
            registration_id: row.try_get("registration_id")?,
            kind: row.try_get("kind")?,
            unit_id: row.try_get("unit_id")?,
            option_id: row.try_get("option_id")?,
            quantity: row.try_get("quantity")?,
            price: row.try_get("price")?,
        })
    }
}

impl ItemRow {
    fn into_domain(self) -> Result<RegistrationItem, StoreError> {
        let kind: ItemKind = self
            .kind
            .parse()
            .map_err(|e| decode_error("registration_item", e))?;
        RegistrationItem::from_parts(
            RegistrationItemId::from_uuid(self.id),
            RegistrationId::from_uuid(self.registration_id),
            kind,
            self.unit_id.map(UnitId::from_uuid),
            self.option_id.map(OptionId::from_uuid),
            self.quantity,
            self.price,
        )
        .map_err(|e| decode_error("registration_item", e))
    }
}

struct PaymentRow {
    id: uuid::Uuid,
    registration_id: uuid::Uuid,
    amount: i64,
    status: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for PaymentRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(PaymentRow {
            id: row.try_get("id")?,
            registration_id: row.try_get("registration_id")?,
            amount: row.try_get("amount")?,
            status: row.try_get("status")?,
            note: row.try_get("note")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl PaymentRow {
    fn into_domain(self) -> Result<Payment, StoreError> {
        let status: PaymentStatus = self.status.parse().map_err(|e| decode_error("payment", e))?;
        Payment::from_parts(
            PaymentId::from_uuid(self.id),
            RegistrationId::from_uuid(self.registration_id),
            self.amount,
            status,
            self.note,
            self.created_at,
            self.updated_at,
        )
        .map_err(|e| decode_error("payment", e))
    }
}
