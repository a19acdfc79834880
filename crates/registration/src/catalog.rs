//! Catalog records the registration flow reads: events, their teams, and
//! apparel options. Managed elsewhere; only seeded here.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use signup_core::{DomainError, DomainResult, EventId, OptionId, TeamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Draft,
    Open,
    Closed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Open => "open",
            EventStatus::Closed => "closed",
        }
    }
}

impl FromStr for EventStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(EventStatus::Draft),
            "open" => Ok(EventStatus::Open),
            "closed" => Ok(EventStatus::Closed),
            other => Err(DomainError::validation(format!("unknown event status: {other}"))),
        }
    }
}

/// An event participants register for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub status: EventStatus,
    /// Slot fee in minor currency units, charged on top of add-ons.
    pub base_fee: i64,
}

impl Event {
    /// New events open for registration immediately.
    pub fn new(name: impl Into<String>, base_fee: i64) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("event name cannot be empty"));
        }
        if base_fee < 0 {
            return Err(DomainError::validation("base_fee cannot be negative"));
        }
        Ok(Self {
            id: EventId::new(),
            name,
            status: EventStatus::Open,
            base_fee,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status == EventStatus::Open
    }
}

/// A team within an event; holds a fixed number of confirmed slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub event_id: EventId,
    pub name: String,
    pub slot_limit: i64,
}

impl Team {
    pub fn new(event_id: EventId, name: impl Into<String>, slot_limit: i64) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("team name cannot be empty"));
        }
        if slot_limit < 1 {
            return Err(DomainError::validation("slot_limit must be at least 1"));
        }
        Ok(Self {
            id: TeamId::new(),
            event_id,
            name,
            slot_limit,
        })
    }

    pub fn is_full(&self, confirmed: i64) -> bool {
        confirmed >= self.slot_limit
    }
}

/// Apparel size add-on. Apparel has no stock ceiling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApparelOption {
    pub id: OptionId,
    pub label: String,
    pub price: i64,
}

impl ApparelOption {
    pub fn new(label: impl Into<String>, price: i64) -> DomainResult<Self> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(DomainError::validation("option label cannot be empty"));
        }
        if price < 0 {
            return Err(DomainError::validation("option price cannot be negative"));
        }
        Ok(Self {
            id: OptionId::new(),
            label,
            price,
        })
    }
}
