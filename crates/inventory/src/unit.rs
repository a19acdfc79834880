use serde::{Deserialize, Serialize};

use signup_core::{DomainError, DomainResult, UnitId};

/// A stock-keeping unit with a fixed ceiling and a provisional-hold counter.
///
/// `0 <= reserved_stock <= total_stock` holds for every value of this type:
/// constructors validate it and every mutator is a guarded update that leaves
/// the unit untouched when its predicate fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryUnit {
    id: UnitId,
    label: String,
    /// Price per unit in minor currency units (e.g. cents).
    price: i64,
    total_stock: i64,
    reserved_stock: i64,
}

/// Point-in-time counters of a unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub unit_id: UnitId,
    pub total_stock: i64,
    pub reserved_stock: i64,
    pub available: i64,
}

/// Not enough unheld stock to satisfy a request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub unit_id: UnitId,
    pub available: i64,
    pub requested: i64,
}

impl InventoryUnit {
    /// Create a new unit with no holds.
    pub fn new(id: UnitId, label: impl Into<String>, price: i64, total_stock: i64) -> DomainResult<Self> {
        Self::from_parts(id, label, price, total_stock, 0)
    }

    /// Rehydrate a unit from stored counters, rejecting rows that break the invariant.
    pub fn from_parts(
        id: UnitId,
        label: impl Into<String>,
        price: i64,
        total_stock: i64,
        reserved_stock: i64,
    ) -> DomainResult<Self> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(DomainError::validation("unit label cannot be empty"));
        }
        if price < 0 {
            return Err(DomainError::validation("unit price cannot be negative"));
        }
        if total_stock < 0 {
            return Err(DomainError::validation("total_stock cannot be negative"));
        }
        if reserved_stock < 0 || reserved_stock > total_stock {
            return Err(DomainError::invariant(format!(
                "reserved_stock {reserved_stock} outside 0..={total_stock}"
            )));
        }

        Ok(Self {
            id,
            label,
            price,
            total_stock,
            reserved_stock,
        })
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn price(&self) -> i64 {
        self.price
    }

    pub fn total_stock(&self) -> i64 {
        self.total_stock
    }

    pub fn reserved_stock(&self) -> i64 {
        self.reserved_stock
    }

    /// Units that can still be held: `total_stock - reserved_stock`.
    pub fn available(&self) -> i64 {
        self.total_stock - self.reserved_stock
    }

    pub fn stock_level(&self) -> StockLevel {
        StockLevel {
            unit_id: self.id,
            total_stock: self.total_stock,
            reserved_stock: self.reserved_stock,
            available: self.available(),
        }
    }

    /// Check that `qty` units can be held right now.
    pub fn check_available(&self, qty: i64) -> Result<(), Shortfall> {
        if qty > 0 && self.available() >= qty {
            Ok(())
        } else {
            Err(Shortfall {
                unit_id: self.id,
                available: self.available(),
                requested: qty,
            })
        }
    }

    /// `reserved_stock += qty` guarded by `total_stock - reserved_stock >= qty`.
    pub fn try_reserve(&mut self, qty: i64) -> bool {
        if self.check_available(qty).is_err() {
            return false;
        }
        self.reserved_stock += qty;
        true
    }

    /// `total_stock -= qty; reserved_stock -= qty` guarded by
    /// `reserved_stock >= qty AND total_stock >= qty`.
    pub fn try_finalize(&mut self, qty: i64) -> bool {
        if qty <= 0 || self.reserved_stock < qty || self.total_stock < qty {
            return false;
        }
        self.total_stock -= qty;
        self.reserved_stock -= qty;
        true
    }

    /// `reserved_stock -= qty` guarded by `reserved_stock >= qty`.
    pub fn try_release(&mut self, qty: i64) -> bool {
        if qty <= 0 || self.reserved_stock < qty {
            return false;
        }
        self.reserved_stock -= qty;
        true
    }

    /// Administrative stock adjustment. Holds are never touched.
    pub fn restock(&mut self, delta: i64) -> DomainResult<()> {
        if delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        let new_total = self
            .total_stock
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("total_stock overflow"))?;
        if new_total < self.reserved_stock {
            return Err(DomainError::invariant(format!(
                "total_stock {new_total} would fall below reserved_stock {}",
                self.reserved_stock
            )));
        }

        self.total_stock = new_total;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(total: i64) -> InventoryUnit {
        InventoryUnit::new(UnitId::new(), "US 10", 0, total).unwrap()
    }

    #[test]
    fn new_unit_has_no_holds() {
        let u = unit(5);
        assert_eq!(u.total_stock(), 5);
        assert_eq!(u.reserved_stock(), 0);
        assert_eq!(u.available(), 5);
    }

    #[test]
    fn from_parts_rejects_reserved_above_total() {
        let err = InventoryUnit::from_parts(UnitId::new(), "US 9", 0, 2, 3).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn from_parts_rejects_empty_label_and_negative_price() {
        assert!(matches!(
            InventoryUnit::new(UnitId::new(), "  ", 0, 1),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            InventoryUnit::new(UnitId::new(), "US 8", -1, 1),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn reserve_fails_without_touching_counters_when_short() {
        let mut u = unit(5);
        assert!(u.try_reserve(4));
        assert!(!u.try_reserve(2));
        assert_eq!(u.reserved_stock(), 4);

        let shortfall = u.check_available(2).unwrap_err();
        assert_eq!(shortfall.available, 1);
        assert_eq!(shortfall.requested, 2);
        assert_eq!(shortfall.unit_id, u.id());
    }

    #[test]
    fn finalize_converts_hold_without_changing_available() {
        let mut u = unit(5);
        assert!(u.try_reserve(2));
        let available_before = u.available();

        assert!(u.try_finalize(2));
        assert_eq!(u.total_stock(), 3);
        assert_eq!(u.reserved_stock(), 0);
        assert_eq!(u.available(), available_before);
    }

    #[test]
    fn finalize_without_hold_is_rejected() {
        let mut u = unit(5);
        assert!(!u.try_finalize(1));
        assert_eq!(u.total_stock(), 5);
    }

    #[test]
    fn release_twice_only_applies_once() {
        let mut u = unit(5);
        assert!(u.try_reserve(2));
        assert!(u.try_release(2));
        assert!(!u.try_release(2));
        assert_eq!(u.reserved_stock(), 0);
        assert_eq!(u.total_stock(), 5);
    }

    #[test]
    fn non_positive_quantities_never_apply() {
        let mut u = unit(5);
        assert!(!u.try_reserve(0));
        assert!(!u.try_reserve(-1));
        assert!(!u.try_release(0));
        assert!(!u.try_finalize(-3));
        assert_eq!(u, unit_with(&u, 5, 0));
    }

    fn unit_with(template: &InventoryUnit, total: i64, reserved: i64) -> InventoryUnit {
        InventoryUnit::from_parts(template.id(), template.label(), template.price(), total, reserved).unwrap()
    }

    #[test]
    fn restock_cannot_drop_total_below_holds() {
        let mut u = unit(5);
        assert!(u.try_reserve(4));
        assert!(matches!(u.restock(-2), Err(DomainError::InvariantViolation(_))));
        assert!(u.restock(-1).is_ok());
        assert_eq!(u.total_stock(), 4);
        assert_eq!(u.available(), 0);
        assert!(matches!(u.restock(0), Err(DomainError::Validation(_))));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Reserve(i64),
            Finalize(i64),
            Release(i64),
            Restock(i64),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (-2i64..6).prop_map(Op::Reserve),
                (-2i64..6).prop_map(Op::Finalize),
                (-2i64..6).prop_map(Op::Release),
                (-6i64..6).prop_map(Op::Restock),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            #[test]
            fn counters_stay_within_bounds(total in 0i64..20, ops in prop::collection::vec(op(), 0..64)) {
                let mut u = InventoryUnit::new(UnitId::new(), "US 11", 0, total).unwrap();
                for op in ops {
                    let before = u.clone();
                    let applied = match op {
                        Op::Reserve(q) => u.try_reserve(q),
                        Op::Finalize(q) => u.try_finalize(q),
                        Op::Release(q) => u.try_release(q),
                        Op::Restock(d) => u.restock(d).is_ok(),
                    };
                    if !applied {
                        prop_assert_eq!(&u, &before);
                    }
                    prop_assert!(u.reserved_stock() >= 0);
                    prop_assert!(u.reserved_stock() <= u.total_stock());
                    prop_assert!(u.available() >= 0);
                }
            }

            #[test]
            fn finalize_preserves_available(total in 1i64..20, hold in 1i64..20) {
                let mut u = InventoryUnit::new(UnitId::new(), "US 12", 0, total).unwrap();
                prop_assume!(u.try_reserve(hold));
                let available = u.available();
                prop_assert!(u.try_finalize(hold));
                prop_assert_eq!(u.available(), available);
            }
        }
    }
}
