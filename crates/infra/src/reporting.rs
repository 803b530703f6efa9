//! Reporting aggregator.
//!
//! Stores produce raw snapshots from one consistent read; this module derives the
//! dashboard values (rates, audits) from them without touching storage again.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use reftrack_affiliates::Affiliate;
use reftrack_ledger::BalanceAudit;

/// A count of records and the sum of their amounts. Sums saturate at `i64::MAX`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountAmount {
    pub count: u64,
    pub amount: i64,
}

impl CountAmount {
    pub fn add(&mut self, amount: i64) {
        self.count += 1;
        self.amount = self.amount.saturating_add(amount);
    }
}

/// Everything the affiliate dashboard needs, read at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateSnapshot {
    pub affiliate: Affiliate,
    /// Slug of the tenant's oldest active product, used to build `/go/` links.
    pub referral_product_slug: Option<String>,
    pub clicks: u64,
    pub conversions: u64,
    pub pending: CountAmount,
    pub approved: CountAmount,
    /// Σ payouts in `paid`.
    pub paid_total: i64,
    /// Σ payouts in `requested` or `paid`.
    pub committed_payouts: i64,
}

/// System-wide totals, read at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverviewSnapshot {
    pub active_affiliates: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub pending_payouts: CountAmount,
    pub approved_order_amount: i64,
    pub approved_commission: i64,
}

/// Affiliate dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateStats {
    pub snapshot: AffiliateSnapshot,
    /// conversions / clicks, as a fraction.
    pub conversion_rate: Decimal,
}

impl From<AffiliateSnapshot> for AffiliateStats {
    fn from(snapshot: AffiliateSnapshot) -> Self {
        let conversion_rate = conversion_rate(snapshot.conversions, snapshot.clicks);
        Self {
            snapshot,
            conversion_rate,
        }
    }
}

impl AffiliateStats {
    /// Stored balance checked against the history in the same snapshot.
    pub fn balance_audit(&self) -> BalanceAudit {
        let s = &self.snapshot;
        BalanceAudit::new(
            s.affiliate.id,
            s.affiliate.balance(),
            s.approved.amount,
            s.committed_payouts,
        )
    }
}

/// Admin overview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemOverview {
    pub snapshot: OverviewSnapshot,
    pub conversion_rate: Decimal,
}

impl From<OverviewSnapshot> for SystemOverview {
    fn from(snapshot: OverviewSnapshot) -> Self {
        Self {
            conversion_rate: conversion_rate(snapshot.conversions, snapshot.clicks),
            snapshot,
        }
    }
}

/// `conversions / clicks`, or zero when there are no clicks.
pub fn conversion_rate(conversions: u64, clicks: u64) -> Decimal {
    if clicks == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(conversions) / Decimal::from(clicks)
}

/// Render a fraction as a percentage with two decimals, e.g. `0.125` → `"12.50%"`.
pub fn format_rate(rate: Decimal) -> String {
    let pct = (rate * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{pct:.2}%")
}
