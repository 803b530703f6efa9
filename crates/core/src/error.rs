//! Domain error model.

use thiserror::Error;

use crate::id::{AffiliateId, ConversionId, PayoutId, ProductId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, state-machine violations). Infrastructure concerns belong elsewhere.
///
/// Every variant carries enough context (entity key, current state, amounts) for the
/// caller to decide whether to retry, surface to a user, or treat the call as a no-op.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or out-of-range input.
    #[error("invalid input: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Referenced entity is absent.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Entity exists but is disabled for the requested operation.
    #[error("{entity} {key} is inactive")]
    Inactive { entity: &'static str, key: String },

    /// Affiliate exists but is suspended.
    #[error("affiliate {code} is suspended")]
    Suspended { code: String },

    /// Entities from different tenants were combined.
    #[error("affiliate {affiliate_id} does not belong to the tenant of product {product_id}")]
    CrossTenantViolation {
        affiliate_id: AffiliateId,
        product_id: ProductId,
    },

    /// A conversion was already recorded for this (order, product).
    #[error("order {order_id} already recorded for product {product_id}")]
    DuplicateOrder {
        order_id: String,
        product_id: ProductId,
    },

    /// Conversion is no longer `pending`.
    #[error("conversion {conversion_id} already {status}")]
    AlreadyDecided {
        conversion_id: ConversionId,
        status: String,
    },

    /// Payout is no longer `requested`.
    #[error("payout {payout_id} already {status}")]
    AlreadySettled { payout_id: PayoutId, status: String },

    /// Balance does not cover the requested payout.
    #[error("insufficient balance: balance {balance}, requested {requested}")]
    InsufficientBalance { balance: i64, requested: i64 },

    /// Requested payout is under the configured minimum.
    #[error("payout of {requested} is below the minimum of {minimum}")]
    BelowMinimum { minimum: i64, requested: i64 },

    /// A uniqueness constraint was violated (slug, code, secret key).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn inactive(entity: &'static str, key: impl ToString) -> Self {
        Self::Inactive {
            entity,
            key: key.to_string(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "invalid_input",
            DomainError::InvalidId(_) => "invalid_id",
            DomainError::NotFound { .. } => "not_found",
            DomainError::Inactive { .. } => "inactive",
            DomainError::Suspended { .. } => "suspended",
            DomainError::CrossTenantViolation { .. } => "cross_tenant_violation",
            DomainError::DuplicateOrder { .. } => "duplicate_order",
            DomainError::AlreadyDecided { .. } => "already_decided",
            DomainError::AlreadySettled { .. } => "already_settled",
            DomainError::InsufficientBalance { .. } => "insufficient_balance",
            DomainError::BelowMinimum { .. } => "below_minimum",
            DomainError::Conflict(_) => "conflict",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = DomainError::BelowMinimum {
            minimum: 500_000,
            requested: 400_000,
        };
        assert_eq!(
            err.to_string(),
            "payout of 400000 is below the minimum of 500000"
        );
        assert_eq!(err.code(), "below_minimum");

        let err = DomainError::not_found("affiliate", "DEMO001");
        assert_eq!(err.to_string(), "affiliate not found: DEMO001");
    }
}
