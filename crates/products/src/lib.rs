//! Products domain module.
//!
//! This crate contains business rules for trackable products and the commission
//! calculator, implemented purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod commission;
pub mod product;

pub use commission::{CommissionRule, compute_commission};
pub use product::{
    DEFAULT_COOKIE_DURATION_DAYS, NewProduct, Product, ProductPatch, normalize_slug,
};
