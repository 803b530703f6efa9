use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use reftrack_affiliates::{Affiliate, AffiliateStatus};
use reftrack_attribution::Click;
use reftrack_conversions::{Conversion, Decision, OrderId};
use reftrack_core::{AffiliateId, ConversionId, DomainError, PayoutId, ProductId, Tenant, TenantId};
use reftrack_ledger::{Payout, PayoutPolicy};
use reftrack_products::Product;

use super::query::{
    AffiliateFilter, AffiliateSummary, ConversionFilter, ConversionView, Page, Paged,
    PayoutFilter, PayoutView,
};
use crate::reporting::{AffiliateSnapshot, OverviewSnapshot};

/// Storage operation error.
///
/// `Domain` carries business failures detected inside an atomic unit of work
/// (duplicate order, already decided, insufficient balance, unique-key conflicts).
/// The other variants are infrastructure failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Backend unreachable or saturated (pool closed, acquire timeout).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Query or transaction failure.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Stored data does not map back onto a valid domain value.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

/// Durable home of every referral entity.
///
/// Each method is one all-or-nothing unit of work. In particular:
///
/// - `insert_conversion` checks `(order_id, product_id)` uniqueness and inserts atomically
///   (`DuplicateOrder` on collision)
/// - `decide_conversion` moves the conversion out of `pending` and credits the affiliate
///   in the same unit (`AlreadyDecided` if it is not pending)
/// - `create_payout` debits the balance and inserts the payout in the same unit
///   (`BelowMinimum` / `InsufficientBalance` per the supplied policy)
/// - `affiliate_snapshot` / `overview_snapshot` read from one consistent snapshot
///
/// Unique-key collisions on tenants, products and affiliates surface as `Conflict`.
#[async_trait::async_trait]
pub trait ReferralStore: Send + Sync {
    /// Apply idempotent schema DDL. No-op for stores without a schema.
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Round-trip to the backend.
    async fn ping(&self) -> Result<(), StoreError>;

    // -- tenants --

    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError>;
    async fn update_tenant(&self, tenant: &Tenant) -> Result<(), StoreError>;
    async fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError>;
    /// Oldest tenant, if any.
    async fn first_tenant(&self) -> Result<Option<Tenant>, StoreError>;
    async fn list_tenants(&self, page: Page) -> Result<Paged<Tenant>, StoreError>;

    // -- products --

    async fn insert_product(&self, product: &Product) -> Result<(), StoreError>;
    async fn update_product(&self, product: &Product) -> Result<(), StoreError>;
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;
    /// Lookup by normalized (lowercase) slug.
    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError>;
    async fn product_by_api_key(&self, api_key: &str) -> Result<Option<Product>, StoreError>;
    async fn list_products(
        &self,
        tenant_id: Option<TenantId>,
        page: Page,
    ) -> Result<Paged<Product>, StoreError>;

    // -- affiliates --

    async fn insert_affiliate(&self, affiliate: &Affiliate) -> Result<(), StoreError>;
    async fn get_affiliate(&self, id: AffiliateId) -> Result<Option<Affiliate>, StoreError>;
    /// Lookup by normalized (uppercase) code.
    async fn affiliate_by_code(&self, code: &str) -> Result<Option<Affiliate>, StoreError>;
    /// `NotFound` if the affiliate does not exist.
    async fn set_affiliate_status(
        &self,
        id: AffiliateId,
        status: AffiliateStatus,
    ) -> Result<Affiliate, StoreError>;
    async fn list_affiliates(
        &self,
        filter: &AffiliateFilter,
        page: Page,
    ) -> Result<Paged<AffiliateSummary>, StoreError>;

    // -- clicks --

    async fn insert_click(&self, click: &Click) -> Result<(), StoreError>;

    // -- conversions --

    async fn insert_conversion(&self, conversion: &Conversion) -> Result<(), StoreError>;
    async fn get_conversion(&self, id: ConversionId) -> Result<Option<Conversion>, StoreError>;
    async fn conversion_by_order(
        &self,
        product_id: ProductId,
        order_id: &OrderId,
    ) -> Result<Option<Conversion>, StoreError>;
    /// `NotFound` / `AlreadyDecided`; credits the affiliate on approval.
    async fn decide_conversion(
        &self,
        id: ConversionId,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<Conversion, StoreError>;
    async fn list_conversions(
        &self,
        filter: &ConversionFilter,
        page: Page,
    ) -> Result<Paged<ConversionView>, StoreError>;

    // -- payouts --

    /// `NotFound` / `Validation` / `BelowMinimum` / `InsufficientBalance`.
    async fn create_payout(
        &self,
        affiliate_id: AffiliateId,
        amount: i64,
        policy: &PayoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Payout, StoreError>;
    /// `NotFound` / `AlreadySettled`.
    async fn settle_payout(&self, id: PayoutId, now: DateTime<Utc>) -> Result<Payout, StoreError>;
    async fn list_payouts(
        &self,
        filter: &PayoutFilter,
        page: Page,
    ) -> Result<Paged<PayoutView>, StoreError>;

    // -- reporting --

    async fn affiliate_snapshot(
        &self,
        id: AffiliateId,
    ) -> Result<Option<AffiliateSnapshot>, StoreError>;
    async fn overview_snapshot(&self) -> Result<OverviewSnapshot, StoreError>;
}

#[async_trait::async_trait]
impl<S> ReferralStore for Arc<S>
where
    S: ReferralStore + ?Sized,
{
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        (**self).ensure_schema().await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        (**self).ping().await
    }

    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        (**self).insert_tenant(tenant).await
    }

    async fn update_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        (**self).update_tenant(tenant).await
    }

    async fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError> {
        (**self).get_tenant(id).await
    }

    async fn first_tenant(&self) -> Result<Option<Tenant>, StoreError> {
        (**self).first_tenant().await
    }

    async fn list_tenants(&self, page: Page) -> Result<Paged<Tenant>, StoreError> {
        (**self).list_tenants(page).await
    }

    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        (**self).insert_product(product).await
    }

    async fn update_product(&self, product: &Product) -> Result<(), StoreError> {
        (**self).update_product(product).await
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).get_product(id).await
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError> {
        (**self).product_by_slug(slug).await
    }

    async fn product_by_api_key(&self, api_key: &str) -> Result<Option<Product>, StoreError> {
        (**self).product_by_api_key(api_key).await
    }

    async fn list_products(
        &self,
        tenant_id: Option<TenantId>,
        page: Page,
    ) -> Result<Paged<Product>, StoreError> {
        (**self).list_products(tenant_id, page).await
    }

    async fn insert_affiliate(&self, affiliate: &Affiliate) -> Result<(), StoreError> {
        (**self).insert_affiliate(affiliate).await
    }

    async fn get_affiliate(&self, id: AffiliateId) -> Result<Option<Affiliate>, StoreError> {
        (**self).get_affiliate(id).await
    }

    async fn affiliate_by_code(&self, code: &str) -> Result<Option<Affiliate>, StoreError> {
        (**self).affiliate_by_code(code).await
    }

    async fn set_affiliate_status(
        &self,
        id: AffiliateId,
        status: AffiliateStatus,
    ) -> Result<Affiliate, StoreError> {
        (**self).set_affiliate_status(id, status).await
    }

    async fn list_affiliates(
        &self,
        filter: &AffiliateFilter,
        page: Page,
    ) -> Result<Paged<AffiliateSummary>, StoreError> {
        (**self).list_affiliates(filter, page).await
    }

    async fn insert_click(&self, click: &Click) -> Result<(), StoreError> {
        (**self).insert_click(click).await
    }

    async fn insert_conversion(&self, conversion: &Conversion) -> Result<(), StoreError> {
        (**self).insert_conversion(conversion).await
    }

    async fn get_conversion(&self, id: ConversionId) -> Result<Option<Conversion>, StoreError> {
        (**self).get_conversion(id).await
    }

    async fn conversion_by_order(
        &self,
        product_id: ProductId,
        order_id: &OrderId,
    ) -> Result<Option<Conversion>, StoreError> {
        (**self).conversion_by_order(product_id, order_id).await
    }

    async fn decide_conversion(
        &self,
        id: ConversionId,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<Conversion, StoreError> {
        (**self).decide_conversion(id, decision, now).await
    }

    async fn list_conversions(
        &self,
        filter: &ConversionFilter,
        page: Page,
    ) -> Result<Paged<ConversionView>, StoreError> {
        (**self).list_conversions(filter, page).await
    }

    async fn create_payout(
        &self,
        affiliate_id: AffiliateId,
        amount: i64,
        policy: &PayoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Payout, StoreError> {
        (**self).create_payout(affiliate_id, amount, policy, now).await
    }

    async fn settle_payout(&self, id: PayoutId, now: DateTime<Utc>) -> Result<Payout, StoreError> {
        (**self).settle_payout(id, now).await
    }

    async fn list_payouts(
        &self,
        filter: &PayoutFilter,
        page: Page,
    ) -> Result<Paged<PayoutView>, StoreError> {
        (**self).list_payouts(filter, page).await
    }

    async fn affiliate_snapshot(
        &self,
        id: AffiliateId,
    ) -> Result<Option<AffiliateSnapshot>, StoreError> {
        (**self).affiliate_snapshot(id).await
    }

    async fn overview_snapshot(&self) -> Result<OverviewSnapshot, StoreError> {
        (**self).overview_snapshot().await
    }
}
