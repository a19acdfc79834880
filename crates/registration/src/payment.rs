use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use signup_core::{DomainError, DomainResult, PaymentId, RegistrationId};

use crate::item::RegistrationItem;
use crate::registration::ReleaseOutcome;

/// Payment status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    /// Created with the registration, awaiting proof of payment.
    Waiting,
    Confirmed,
    Rejected,
    Failed,
    Refunded,
    Cancelled,
    Expired,
}

impl PaymentStatus {
    /// Live payments can still settle the registration. At most one exists per
    /// registration at a time.
    pub fn is_live(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Waiting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Waiting => "waiting",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Expired => "expired",
        }
    }
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "waiting" => Ok(PaymentStatus::Waiting),
            "confirmed" => Ok(PaymentStatus::Confirmed),
            "rejected" => Ok(PaymentStatus::Rejected),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            "expired" => Ok(PaymentStatus::Expired),
            other => Err(DomainError::validation(format!("unknown payment status: {other}"))),
        }
    }
}

/// Money side of a registration. Settled payments stay around for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    registration_id: RegistrationId,
    /// Minor currency units.
    amount: i64,
    status: PaymentStatus,
    /// Operator note (e.g. rejection reason).
    note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Payment {
    /// A fresh payment awaiting proof, as created alongside a registration.
    pub fn waiting(registration_id: RegistrationId, amount: i64, at: DateTime<Utc>) -> DomainResult<Self> {
        Self::from_parts(
            PaymentId::new(),
            registration_id,
            amount,
            PaymentStatus::Waiting,
            None,
            at,
            at,
        )
    }

    pub fn from_parts(
        id: PaymentId,
        registration_id: RegistrationId,
        amount: i64,
        status: PaymentStatus,
        note: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if amount < 0 {
            return Err(DomainError::validation("payment amount cannot be negative"));
        }
        Ok(Self {
            id,
            registration_id,
            amount,
            status,
            note,
            created_at,
            updated_at,
        })
    }

    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn registration_id(&self) -> RegistrationId {
        self.registration_id
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn ensure_live(&self) -> DomainResult<()> {
        match self.status {
            s if s.is_live() => Ok(()),
            PaymentStatus::Confirmed => Err(DomainError::conflict(format!(
                "payment {} is already confirmed",
                self.id
            ))),
            s => Err(DomainError::conflict(format!("payment {} is {s}", self.id))),
        }
    }

    pub fn confirm(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_live()?;
        self.status = PaymentStatus::Confirmed;
        self.updated_at = at;
        Ok(())
    }

    pub fn reject(&mut self, note: Option<String>, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_live()?;
        self.status = PaymentStatus::Rejected;
        self.note = note;
        self.updated_at = at;
        Ok(())
    }

    /// Close a live payment because its registration was released.
    pub fn void(&mut self, outcome: ReleaseOutcome, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_live()?;
        self.status = outcome.payment_status();
        self.updated_at = at;
        Ok(())
    }
}

/// Amount due for a registration: event base fee plus every line total.
pub fn registration_amount(base_fee: i64, items: &[RegistrationItem]) -> DomainResult<i64> {
    items.iter().try_fold(base_fee, |acc, item| {
        acc.checked_add(item.line_total()?)
            .ok_or_else(|| DomainError::validation("payment amount overflow"))
    })
}
