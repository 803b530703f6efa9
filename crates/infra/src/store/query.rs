//! Listing inputs/outputs shared by every store implementation.

use serde::{Deserialize, Serialize};

use reftrack_affiliates::Affiliate;
use reftrack_conversions::{Conversion, ConversionStatus};
use reftrack_core::{AffiliateId, TenantId};
use reftrack_ledger::{Payout, PayoutStatus};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Page {
    /// Out-of-range values are clamped: `page ≥ 1`, `1 ≤ limit ≤ 100`.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    /// Slice an already ordered, fully materialized listing.
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let start = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        items
            .iter()
            .skip(start)
            .take(self.limit as usize)
            .cloned()
            .collect()
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, total: u64, page: Page) -> Self {
        Self {
            items,
            total,
            page: page.page,
            limit: page.limit,
        }
    }

    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.limit.max(1)))
    }

    /// Same page, items converted.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paged<U> {
        Paged {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
        }
    }
}

/// Conversion listing filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionFilter {
    pub affiliate_id: Option<AffiliateId>,
    pub status: Option<ConversionStatus>,
}

/// Payout listing filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayoutFilter {
    pub affiliate_id: Option<AffiliateId>,
    pub status: Option<PayoutStatus>,
}

/// Affiliate listing filter; `search` matches code or email, case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AffiliateFilter {
    pub tenant_id: Option<TenantId>,
    pub search: Option<String>,
}

impl AffiliateFilter {
    pub(crate) fn matches(&self, affiliate: &Affiliate) -> bool {
        if self.tenant_id.is_some_and(|t| t != affiliate.tenant_id) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                affiliate.code.to_lowercase().contains(&needle)
                    || affiliate.email.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }
}

/// Conversion joined with the names an admin needs to review it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionView {
    pub conversion: Conversion,
    pub affiliate_code: String,
    pub affiliate_email: String,
    pub product_name: String,
    pub product_slug: String,
}

/// Payout joined with its affiliate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutView {
    pub payout: Payout,
    pub affiliate_code: String,
    pub affiliate_email: String,
}

/// Affiliate with per-row activity totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffiliateSummary {
    pub affiliate: Affiliate,
    pub clicks: u64,
    pub conversions: u64,
    pub total_commission: i64,
    pub approved_commission: i64,
}
