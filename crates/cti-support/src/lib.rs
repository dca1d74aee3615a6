//! Small utilities shared across the CTI crates.
//!
//! This crate carries the parts of the ambient stack that do not belong to
//! any single layer of the CTI core: ergonomic builder re-exports used by
//! the domain types, and the monotonic id allocator described for the
//! optional external id table.

pub use better_default::Default;
pub use bon::bon;

mod ids;

pub use ids::{IdTable, IdTableError};
