//! Entity trait: identity + continuity across state changes.

use crate::id::TenantId;

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Tenant that owns this entity.
    fn tenant_id(&self) -> TenantId;
}

/// Returns `true` when both entities live inside the same tenant boundary.
pub fn same_tenant<A: Entity, B: Entity>(a: &A, b: &B) -> bool {
    a.tenant_id() == b.tenant_id()
}
