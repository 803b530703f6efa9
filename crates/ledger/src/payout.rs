use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reftrack_affiliates::Affiliate;
use reftrack_core::{AffiliateId, DomainError, DomainResult, Entity, PayoutId, TenantId};

/// Smallest payout an affiliate may request, in currency units.
pub const DEFAULT_MINIMUM_PAYOUT: i64 = 500_000;

/// Payout status lifecycle: `requested → paid` (terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Requested,
    Paid,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Requested => "requested",
            PayoutStatus::Paid => "paid",
        }
    }
}

impl core::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayoutStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "requested" => Ok(PayoutStatus::Requested),
            "paid" => Ok(PayoutStatus::Paid),
            other => Err(DomainError::validation(format!(
                "unknown payout status: {other}"
            ))),
        }
    }
}

/// Payout request rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutPolicy {
    pub minimum_payout: i64,
}

impl Default for PayoutPolicy {
    fn default() -> Self {
        Self {
            minimum_payout: DEFAULT_MINIMUM_PAYOUT,
        }
    }
}

impl PayoutPolicy {
    /// Amount checks that do not depend on the balance.
    ///
    /// The minimum is enforced before the balance so an undersized request fails the
    /// same way whether or not the affiliate could cover it.
    pub fn check_amount(&self, amount: i64) -> DomainResult<()> {
        if amount <= 0 {
            return Err(DomainError::validation("payout amount must be positive"));
        }
        if amount < self.minimum_payout {
            return Err(DomainError::BelowMinimum {
                minimum: self.minimum_payout,
                requested: amount,
            });
        }
        Ok(())
    }
}

/// One withdrawal request against an affiliate balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub id: PayoutId,
    pub tenant_id: TenantId,
    pub affiliate_id: AffiliateId,
    pub amount: i64,
    pub status: PayoutStatus,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Payout {
    /// Mark a requested payout as paid. Balance is not touched; it was debited at request time.
    pub fn settle(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != PayoutStatus::Requested {
            return Err(DomainError::AlreadySettled {
                payout_id: self.id,
                status: self.status.to_string(),
            });
        }
        self.status = PayoutStatus::Paid;
        self.processed_at = Some(now);
        Ok(())
    }
}

impl Entity for Payout {
    type Id = PayoutId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Debit `amount` from `affiliate` and build the matching `requested` payout.
///
/// Either both happen or neither: on error the affiliate is unchanged.
pub fn open_payout(
    affiliate: &mut Affiliate,
    amount: i64,
    policy: &PayoutPolicy,
    now: DateTime<Utc>,
) -> DomainResult<Payout> {
    policy.check_amount(amount)?;
    affiliate.debit(amount)?;

    Ok(Payout {
        id: PayoutId::new(),
        tenant_id: affiliate.tenant_id,
        affiliate_id: affiliate.id,
        amount,
        status: PayoutStatus::Requested,
        requested_at: now,
        processed_at: None,
    })
}
