//! `reftrack-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by every referral module
//! (identifiers, error kinds, the tenant boundary). No infrastructure concerns.

pub mod entity;
pub mod error;
pub mod id;
pub mod tenant;
pub mod value_object;

pub use entity::{Entity, same_tenant};
pub use error::{DomainError, DomainResult};
pub use id::{AffiliateId, ClickId, ConversionId, PayoutId, ProductId, TenantId};
pub use tenant::Tenant;
pub use value_object::ValueObject;
