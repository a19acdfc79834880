//! Inventory domain module.
//!
//! Stock arithmetic for fixed-ceiling units (shoe sizes), implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage). Stores apply these
//! same guards as conditional updates.

pub mod unit;

pub use unit::{InventoryUnit, Shortfall, StockLevel};
