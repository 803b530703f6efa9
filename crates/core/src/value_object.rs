//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**: two instances with the
/// same attributes are the same value. To "modify" one, build a new one.
///
/// - **Value Object**: `CommissionRule::Fixed(150_000)`, `ClickMetadata { ip, user_agent }`
/// - **Entity**: `Affiliate { id: AffiliateId(...), .. }`
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
