//! Conversions domain module.
//!
//! A conversion is one reported order attributed to an affiliate. It is priced once at
//! creation and moves exactly once from `pending` to `approved` or `rejected`.

pub mod conversion;

pub use conversion::{Conversion, ConversionStatus, Decision, OrderId};
