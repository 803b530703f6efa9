use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reftrack_affiliates::Affiliate;
use reftrack_conversions::{Conversion, Decision};
use reftrack_core::{AffiliateId, DomainError, DomainResult};

/// Decide a conversion and credit its affiliate on approval, as one unit.
///
/// Returns the credited amount. On error neither entity is modified.
pub fn apply_decision(
    conversion: &mut Conversion,
    affiliate: &mut Affiliate,
    decision: Decision,
    now: DateTime<Utc>,
) -> DomainResult<Option<i64>> {
    if conversion.affiliate_id != affiliate.id {
        return Err(DomainError::validation(format!(
            "conversion {} is not attributed to affiliate {}",
            conversion.id, affiliate.code
        )));
    }

    let mut next_conversion = conversion.clone();
    let mut next_affiliate = affiliate.clone();
    let credit = next_conversion.decide(decision, now)?;
    if let Some(amount) = credit {
        next_affiliate.credit(amount)?;
    }

    *conversion = next_conversion;
    *affiliate = next_affiliate;
    Ok(credit)
}

/// Balance implied by the affiliate's history.
pub fn expected_balance(approved_commissions: i64, committed_payouts: i64) -> i64 {
    approved_commissions - committed_payouts
}

/// Stored balance compared against the balance derived from history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceAudit {
    pub affiliate_id: AffiliateId,
    pub stored_balance: i64,
    /// Σ commission of approved conversions.
    pub approved_commissions: i64,
    /// Σ amount of requested or paid payouts.
    pub committed_payouts: i64,
    pub derived_balance: i64,
    pub consistent: bool,
}

impl BalanceAudit {
    pub fn new(
        affiliate_id: AffiliateId,
        stored_balance: i64,
        approved_commissions: i64,
        committed_payouts: i64,
    ) -> Self {
        let derived_balance = expected_balance(approved_commissions, committed_payouts);
        Self {
            affiliate_id,
            stored_balance,
            approved_commissions,
            committed_payouts,
            derived_balance,
            consistent: derived_balance == stored_balance,
        }
    }
}
