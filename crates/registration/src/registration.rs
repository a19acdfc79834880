use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use signup_core::{DomainError, DomainResult, EventId, RegistrationId, TeamId, UserId};

use crate::payment::PaymentStatus;

/// Registration status lifecycle.
///
/// `Pending` moves exactly once to one of the terminal states; terminal states
/// never move again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Expired,
}

impl RegistrationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RegistrationStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::Confirmed => "confirmed",
            RegistrationStatus::Cancelled => "cancelled",
            RegistrationStatus::Expired => "expired",
        }
    }
}

impl core::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RegistrationStatus::Pending),
            "confirmed" => Ok(RegistrationStatus::Confirmed),
            "cancelled" => Ok(RegistrationStatus::Cancelled),
            "expired" => Ok(RegistrationStatus::Expired),
            other => Err(DomainError::validation(format!(
                "unknown registration status: {other}"
            ))),
        }
    }
}

/// Why a pending registration is being released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseOutcome {
    Cancelled,
    Expired,
}

impl ReleaseOutcome {
    pub fn registration_status(&self) -> RegistrationStatus {
        match self {
            ReleaseOutcome::Cancelled => RegistrationStatus::Cancelled,
            ReleaseOutcome::Expired => RegistrationStatus::Expired,
        }
    }

    pub fn payment_status(&self) -> PaymentStatus {
        match self {
            ReleaseOutcome::Cancelled => PaymentStatus::Cancelled,
            ReleaseOutcome::Expired => PaymentStatus::Expired,
        }
    }
}

/// One participant's claim on a team slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    id: RegistrationId,
    event_id: EventId,
    team_id: TeamId,
    user_id: UserId,
    status: RegistrationStatus,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    expired_at: Option<DateTime<Utc>>,
}

impl Registration {
    /// Start a new registration in `Pending`.
    pub fn new(event_id: EventId, team_id: TeamId, user_id: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: RegistrationId::new(),
            event_id,
            team_id,
            user_id,
            status: RegistrationStatus::Pending,
            created_at,
            confirmed_at: None,
            cancelled_at: None,
            expired_at: None,
        }
    }

    /// Rehydrate from storage. `terminal_at` is the timestamp of the terminal
    /// transition and must be present exactly when the status is terminal.
    pub fn from_parts(
        id: RegistrationId,
        event_id: EventId,
        team_id: TeamId,
        user_id: UserId,
        status: RegistrationStatus,
        created_at: DateTime<Utc>,
        terminal_at: Option<DateTime<Utc>>,
    ) -> DomainResult<Self> {
        if status.is_terminal() != terminal_at.is_some() {
            return Err(DomainError::invariant(format!(
                "registration {id} in status {status} has inconsistent terminal timestamp"
            )));
        }

        let mut registration = Self {
            id,
            event_id,
            team_id,
            user_id,
            status,
            created_at,
            confirmed_at: None,
            cancelled_at: None,
            expired_at: None,
        };
        match status {
            RegistrationStatus::Pending => {}
            RegistrationStatus::Confirmed => registration.confirmed_at = terminal_at,
            RegistrationStatus::Cancelled => registration.cancelled_at = terminal_at,
            RegistrationStatus::Expired => registration.expired_at = terminal_at,
        }
        Ok(registration)
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn team_id(&self) -> TeamId {
        self.team_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn status(&self) -> RegistrationStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn expired_at(&self) -> Option<DateTime<Utc>> {
        self.expired_at
    }

    pub fn is_pending(&self) -> bool {
        self.status == RegistrationStatus::Pending
    }

    /// Still pending and created strictly before `cutoff`.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.is_pending() && self.created_at < cutoff
    }

    fn ensure_pending(&self) -> DomainResult<()> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "registration {} is already {}",
                self.id, self.status
            )))
        }
    }

    pub fn confirm(&mut self, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_pending()?;
        self.status = RegistrationStatus::Confirmed;
        self.confirmed_at = Some(at);
        Ok(())
    }

    pub fn release(&mut self, outcome: ReleaseOutcome, at: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_pending()?;
        self.status = outcome.registration_status();
        match outcome {
            ReleaseOutcome::Cancelled => self.cancelled_at = Some(at),
            ReleaseOutcome::Expired => self.expired_at = Some(at),
        }
        Ok(())
    }
}
