use std::collections::BTreeMap;

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use signup_core::{DomainError, DomainResult, OptionId, RegistrationId, RegistrationItemId, UnitId};

/// Whether a line draws from a fixed-stock unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Shoe sizes: backed by an inventory unit with a stock ceiling.
    InventoryBound,
    /// Apparel sizes: no stock ceiling.
    NonInventory,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::InventoryBound => "inventory_bound",
            ItemKind::NonInventory => "non_inventory",
        }
    }
}

impl FromStr for ItemKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inventory_bound" => Ok(ItemKind::InventoryBound),
            "non_inventory" => Ok(ItemKind::NonInventory),
            other => Err(DomainError::validation(format!("unknown item kind: {other}"))),
        }
    }
}

/// What a requested line points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemTarget {
    Unit(UnitId),
    Option(OptionId),
}

/// A requested line, before any stock has been checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequest {
    pub target: ItemTarget,
    pub quantity: i64,
}

impl ItemRequest {
    pub fn unit(unit_id: UnitId, quantity: i64) -> Self {
        Self {
            target: ItemTarget::Unit(unit_id),
            quantity,
        }
    }

    pub fn option(option_id: OptionId, quantity: i64) -> Self {
        Self {
            target: ItemTarget::Option(option_id),
            quantity,
        }
    }

    /// The unit this line draws stock from, if any.
    pub fn unit_id(&self) -> Option<UnitId> {
        match self.target {
            ItemTarget::Unit(unit_id) => Some(unit_id),
            ItemTarget::Option(_) => None,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity < 1 {
            return Err(DomainError::validation(format!(
                "quantity must be at least 1 (got {})",
                self.quantity
            )));
        }
        Ok(())
    }
}

/// Total quantity claimed per unit, in ascending unit order.
///
/// Duplicate lines for the same unit are summed so availability is checked
/// against the combined request; the ordering gives every transaction the same
/// lock order.
pub fn stock_claims<I>(lines: I) -> DomainResult<BTreeMap<UnitId, i64>>
where
    I: IntoIterator<Item = (Option<UnitId>, i64)>,
{
    let mut claims: BTreeMap<UnitId, i64> = BTreeMap::new();
    for (unit_id, quantity) in lines {
        if let Some(unit_id) = unit_id {
            let total = claims.entry(unit_id).or_insert(0);
            *total = total
                .checked_add(quantity)
                .ok_or_else(|| DomainError::validation(format!("quantity overflow on unit {unit_id}")))?;
        }
    }
    Ok(claims)
}

/// A line on a registration. Rows are plain data: creating or deleting them
/// never changes stock by itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationItem {
    id: RegistrationItemId,
    registration_id: RegistrationId,
    kind: ItemKind,
    unit_id: Option<UnitId>,
    option_id: Option<OptionId>,
    quantity: i64,
    /// Unit price in minor currency units.
    price: i64,
}

impl RegistrationItem {
    pub fn inventory_bound(
        registration_id: RegistrationId,
        unit_id: UnitId,
        quantity: i64,
        price: i64,
    ) -> DomainResult<Self> {
        Self::from_parts(
            RegistrationItemId::new(),
            registration_id,
            ItemKind::InventoryBound,
            Some(unit_id),
            None,
            quantity,
            price,
        )
    }

    pub fn non_inventory(
        registration_id: RegistrationId,
        option_id: OptionId,
        quantity: i64,
        price: i64,
    ) -> DomainResult<Self> {
        Self::from_parts(
            RegistrationItemId::new(),
            registration_id,
            ItemKind::NonInventory,
            None,
            Some(option_id),
            quantity,
            price,
        )
    }

    /// Rehydrate from storage, checking that `kind` agrees with the references.
    pub fn from_parts(
        id: RegistrationItemId,
        registration_id: RegistrationId,
        kind: ItemKind,
        unit_id: Option<UnitId>,
        option_id: Option<OptionId>,
        quantity: i64,
        price: i64,
    ) -> DomainResult<Self> {
        if quantity < 1 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        if price < 0 {
            return Err(DomainError::validation("price cannot be negative"));
        }
        let consistent = match kind {
            ItemKind::InventoryBound => unit_id.is_some() && option_id.is_none(),
            ItemKind::NonInventory => unit_id.is_none(),
        };
        if !consistent {
            return Err(DomainError::invariant(format!(
                "item {id} of kind {} has mismatched references",
                kind.as_str()
            )));
        }

        Ok(Self {
            id,
            registration_id,
            kind,
            unit_id,
            option_id,
            quantity,
            price,
        })
    }

    pub fn id(&self) -> RegistrationItemId {
        self.id
    }

    pub fn registration_id(&self) -> RegistrationId {
        self.registration_id
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn unit_id(&self) -> Option<UnitId> {
        self.unit_id
    }

    pub fn option_id(&self) -> Option<OptionId> {
        self.option_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn price(&self) -> i64 {
        self.price
    }

    pub fn line_total(&self) -> DomainResult<i64> {
        self.price
            .checked_mul(self.quantity)
            .ok_or_else(|| DomainError::validation("line total overflow"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_negative_quantities_fail_validation() {
        let unit = UnitId::new();
        assert!(ItemRequest::unit(unit, 0).validate().is_err());
        assert!(ItemRequest::unit(unit, -2).validate().is_err());
        assert!(ItemRequest::unit(unit, 1).validate().is_ok());
    }

    #[test]
    fn claims_sum_duplicate_units_and_skip_apparel() {
        let a = UnitId::new();
        let b = UnitId::new();
        let claims = stock_claims(vec![(Some(a), 1), (None, 4), (Some(b), 2), (Some(a), 2)]).unwrap();
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[&a], 3);
        assert_eq!(claims[&b], 2);
    }

    #[test]
    fn claims_that_overflow_are_rejected() {
        let a = UnitId::new();
        let err = stock_claims(vec![(Some(a), i64::MAX), (Some(a), 1)]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn claims_iterate_in_unit_order() {
        let mut ids: Vec<UnitId> = (0..5).map(|_| UnitId::new()).collect();
        let claims = stock_claims(ids.iter().rev().map(|id| (Some(*id), 1))).unwrap();
        ids.sort();
        assert_eq!(claims.keys().copied().collect::<Vec<_>>(), ids);
    }

    #[test]
    fn kind_must_match_references() {
        let reg = RegistrationId::new();
        let broken = RegistrationItem::from_parts(
            RegistrationItemId::new(),
            reg,
            ItemKind::InventoryBound,
            None,
            Some(OptionId::new()),
            1,
            100,
        );
        assert!(matches!(broken, Err(DomainError::InvariantViolation(_))));

        let apparel = RegistrationItem::non_inventory(reg, OptionId::new(), 2, 2500).unwrap();
        assert_eq!(apparel.kind(), ItemKind::NonInventory);
        assert_eq!(apparel.unit_id(), None);
        assert_eq!(apparel.line_total().unwrap(), 5000);
    }

    #[test]
    fn item_request_json_shape() {
        let unit = UnitId::new();
        let json = serde_json::to_value(ItemRequest::unit(unit, 2)).unwrap();
        assert_eq!(json["target"]["unit"], unit.to_string());
        assert_eq!(json["quantity"], 2);
    }
}
