//! Referral engine: the application-level orchestration of every referral operation.
//!
//! The engine owns no state of its own. Each operation resolves its inputs, applies the
//! domain rules and hands exactly one atomic unit of work to the injected
//! [`ReferralStore`]. Business rejections are logged at `warn`, storage failures at
//! `error`, successful state transitions at `info`.

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use reftrack_affiliates::{Affiliate, AffiliateStatus, NewAffiliate};
use reftrack_attribution::{AttributionMarker, Click, ClickMetadata, ensure_attributable};
use reftrack_conversions::{Conversion, Decision, OrderId};
use reftrack_core::{
    AffiliateId, ConversionId, DomainError, PayoutId, ProductId, Tenant, TenantId,
};
use reftrack_ledger::{BalanceAudit, DEFAULT_MINIMUM_PAYOUT, Payout, PayoutPolicy};
use reftrack_products::{NewProduct, Product, ProductPatch};

use crate::reporting::{AffiliateStats, SystemOverview};
use crate::store::{
    AffiliateFilter, AffiliateSummary, ConversionFilter, ConversionView, Page, Paged,
    PayoutFilter, PayoutView, ReferralStore, StoreError,
};

/// Engine settings, passed explicitly at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Smallest payout an affiliate may request.
    pub minimum_payout: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            minimum_payout: DEFAULT_MINIMUM_PAYOUT,
        }
    }
}

impl EngineConfig {
    pub fn payout_policy(&self) -> PayoutPolicy {
        PayoutPolicy {
            minimum_payout: self.minimum_payout,
        }
    }
}

/// Failure of an engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Business rule rejection (deterministic; retrying with the same input fails again).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Storage infrastructure failure.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Domain(err) => EngineError::Domain(err),
            other => EngineError::Store(other),
        }
    }
}

impl EngineError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(err) => Some(err),
            EngineError::Store(_) => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// A recorded click together with the entities it was attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickOutcome {
    pub click: Click,
    pub product: Product,
    pub affiliate: Affiliate,
}

impl ClickOutcome {
    /// Marker the referral redirect hands to the visitor.
    pub fn marker(&self) -> AttributionMarker {
        AttributionMarker {
            affiliate_id: self.affiliate.id,
            product_id: self.product.id,
            ref_code: self.affiliate.code.clone(),
            duration_days: self.product.cookie_duration_days,
        }
    }
}

/// Referral attribution and commission engine.
#[derive(Debug, Clone)]
pub struct ReferralEngine<S> {
    store: S,
    config: EngineConfig,
}

impl<S: ReferralStore> ReferralEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Round-trip to storage.
    pub async fn health(&self) -> EngineResult<()> {
        self.store.ping().await.map_err(EngineError::from)
    }

    // -- tenants --

    #[instrument(skip(self))]
    pub async fn create_tenant(&self, name: &str) -> EngineResult<Tenant> {
        let result = async {
            let tenant = Tenant::create(name, Utc::now())?;
            self.store.insert_tenant(&tenant).await?;
            info!(tenant_id = %tenant.id, "tenant created");
            Ok::<_, EngineError>(tenant)
        }
        .await;
        log_failure("create_tenant", result)
    }

    #[instrument(skip(self))]
    pub async fn rename_tenant(&self, id: TenantId, name: &str) -> EngineResult<Tenant> {
        let result = async {
            let mut tenant = self.require_tenant(id).await?;
            tenant.rename(name)?;
            self.store.update_tenant(&tenant).await?;
            info!(tenant_id = %tenant.id, "tenant renamed");
            Ok::<_, EngineError>(tenant)
        }
        .await;
        log_failure("rename_tenant", result)
    }

    pub async fn list_tenants(&self, page: Page) -> EngineResult<Paged<Tenant>> {
        Ok(self.store.list_tenants(page).await?)
    }

    /// The given tenant, or the oldest one when none is given.
    pub async fn resolve_tenant(&self, id: Option<TenantId>) -> EngineResult<Tenant> {
        match id {
            Some(id) => self.require_tenant(id).await,
            None => self
                .store
                .first_tenant()
                .await?
                .ok_or_else(|| DomainError::validation("no tenant found").into()),
        }
    }

    async fn require_tenant(&self, id: TenantId) -> EngineResult<Tenant> {
        self.store
            .get_tenant(id)
            .await?
            .ok_or_else(|| DomainError::not_found("tenant", id).into())
    }

    // -- products --

    #[instrument(skip(self, new), fields(slug = %new.slug, tenant_id = %new.tenant_id))]
    pub async fn create_product(&self, new: NewProduct) -> EngineResult<Product> {
        let result = async {
            self.require_tenant(new.tenant_id).await?;
            let product = Product::create(new, Utc::now())?;
            self.store.insert_product(&product).await?;
            info!(
                product_id = %product.id,
                slug = %product.slug,
                commission = %product.commission,
                "product created"
            );
            Ok::<_, EngineError>(product)
        }
        .await;
        log_failure("create_product", result)
    }

    /// Apply a partial update. An empty patch is rejected.
    #[instrument(skip(self, patch))]
    pub async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> EngineResult<Product> {
        let result = async {
            if patch.is_empty() {
                return Err(DomainError::validation("No fields to update").into());
            }
            let mut product = self.get_product(id).await?;
            product.apply_patch(patch)?;
            self.store.update_product(&product).await?;
            info!(product_id = %product.id, active = product.active, "product updated");
            Ok::<_, EngineError>(product)
        }
        .await;
        log_failure("update_product", result)
    }

    pub async fn get_product(&self, id: ProductId) -> EngineResult<Product> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(|| DomainError::not_found("product", id).into())
    }

    pub async fn list_products(
        &self,
        tenant_id: Option<TenantId>,
        page: Page,
    ) -> EngineResult<Paged<Product>> {
        Ok(self.store.list_products(tenant_id, page).await?)
    }

    /// Case-insensitive slug lookup. Inactive products are returned as-is.
    pub async fn find_product_by_slug(&self, slug: &str) -> EngineResult<Product> {
        let slug = slug.trim().to_ascii_lowercase();
        self.store
            .product_by_slug(&slug)
            .await?
            .ok_or_else(|| DomainError::not_found("product", slug).into())
    }

    /// Product with its unmasked secret key.
    #[instrument(skip(self), err)]
    pub async fn reveal_api_key(&self, id: ProductId) -> EngineResult<Product> {
        let product = self.get_product(id).await?;
        info!(product_id = %product.id, "product api key revealed");
        Ok(product)
    }

    /// Capability check for conversion reports: the key must name an active product.
    pub async fn authenticate_product(&self, api_key: &str) -> EngineResult<Product> {
        let product = self
            .store
            .product_by_api_key(api_key.trim())
            .await?
            .ok_or_else(|| DomainError::not_found("product", "api key"))?;
        product.ensure_active()?;
        Ok(product)
    }

    // -- affiliates --

    #[instrument(skip(self, new), fields(code = %new.code, tenant_id = %new.tenant_id))]
    pub async fn register_affiliate(&self, new: NewAffiliate) -> EngineResult<Affiliate> {
        let result = async {
            self.require_tenant(new.tenant_id).await?;
            let affiliate = Affiliate::register(new, Utc::now())?;
            self.store.insert_affiliate(&affiliate).await?;
            info!(affiliate_id = %affiliate.id, code = %affiliate.code, "affiliate registered");
            Ok::<_, EngineError>(affiliate)
        }
        .await;
        log_failure("register_affiliate", result)
    }

    #[instrument(skip(self))]
    pub async fn set_affiliate_status(
        &self,
        id: AffiliateId,
        status: AffiliateStatus,
    ) -> EngineResult<Affiliate> {
        let result = async {
            let affiliate = self.store.set_affiliate_status(id, status).await?;
            info!(
                affiliate_id = %affiliate.id,
                status = %affiliate.status,
                "affiliate status changed"
            );
            Ok::<_, EngineError>(affiliate)
        }
        .await;
        log_failure("set_affiliate_status", result)
    }

    pub async fn find_affiliate_by_code(&self, code: &str) -> EngineResult<Affiliate> {
        let code = code.trim().to_ascii_uppercase();
        self.store
            .affiliate_by_code(&code)
            .await?
            .ok_or_else(|| DomainError::not_found("affiliate", code).into())
    }

    pub async fn get_affiliate(&self, id: AffiliateId) -> EngineResult<Affiliate> {
        self.store
            .get_affiliate(id)
            .await?
            .ok_or_else(|| DomainError::not_found("affiliate", id).into())
    }

    pub async fn list_affiliates(
        &self,
        filter: &AffiliateFilter,
        page: Page,
    ) -> EngineResult<Paged<AffiliateSummary>> {
        Ok(self.store.list_affiliates(filter, page).await?)
    }

    // -- attribution --

    /// Record one referral visit. Slug and code lookups are case-insensitive.
    #[instrument(skip(self, metadata))]
    pub async fn record_click(
        &self,
        slug: &str,
        code: &str,
        metadata: ClickMetadata,
    ) -> EngineResult<ClickOutcome> {
        let result = async {
            let product = self.find_product_by_slug(slug).await?;
            let affiliate = self.find_affiliate_by_code(code).await?;

            let click = Click::record(&product, &affiliate, metadata, Utc::now())?;
            self.store.insert_click(&click).await?;
            info!(
                click_id = %click.id,
                product_id = %product.id,
                affiliate_id = %affiliate.id,
                "click recorded"
            );
            Ok::<_, EngineError>(ClickOutcome {
                click,
                product,
                affiliate,
            })
        }
        .await;
        log_failure("record_click", result)
    }

    /// Product and affiliate a conversion report would be attributed to.
    pub async fn resolve_conversion_target(
        &self,
        api_key: &str,
        affiliate_id: AffiliateId,
    ) -> EngineResult<(Product, Affiliate)> {
        let product = self.authenticate_product(api_key).await?;
        let affiliate = self.get_affiliate(affiliate_id).await?;
        ensure_attributable(&product, &affiliate)?;
        Ok((product, affiliate))
    }

    // -- conversions --

    /// Record and price a merchant-reported order.
    ///
    /// A second report of the same `(order_id, product)` fails with `DuplicateOrder`, also
    /// when both reports race.
    #[instrument(skip(self, api_key))]
    pub async fn report_conversion(
        &self,
        api_key: &str,
        affiliate_id: AffiliateId,
        order_id: &str,
        order_amount: i64,
    ) -> EngineResult<Conversion> {
        let result = async {
            let product = self.authenticate_product(api_key).await?;
            let order_id = OrderId::parse(order_id)?;

            if self
                .store
                .conversion_by_order(product.id, &order_id)
                .await?
                .is_some()
            {
                return Err(DomainError::DuplicateOrder {
                    order_id: order_id.to_string(),
                    product_id: product.id,
                }
                .into());
            }

            let affiliate = self.get_affiliate(affiliate_id).await?;
            let conversion =
                Conversion::price(&product, &affiliate, order_id, order_amount, Utc::now())?;
            self.store.insert_conversion(&conversion).await?;
            info!(
                conversion_id = %conversion.id,
                product_id = %product.id,
                affiliate_id = %affiliate.id,
                commission = conversion.commission_amount,
                "conversion reported"
            );
            Ok::<_, EngineError>(conversion)
        }
        .await;
        log_failure("report_conversion", result)
    }

    /// Approve or reject a pending conversion; approval credits the affiliate.
    #[instrument(skip(self))]
    pub async fn decide_conversion(
        &self,
        id: ConversionId,
        decision: Decision,
    ) -> EngineResult<Conversion> {
        let result = async {
            let conversion = self.store.decide_conversion(id, decision, Utc::now()).await?;
            info!(
                conversion_id = %conversion.id,
                status = %conversion.status,
                affiliate_id = %conversion.affiliate_id,
                "conversion decided"
            );
            Ok::<_, EngineError>(conversion)
        }
        .await;
        log_failure("decide_conversion", result)
    }

    pub async fn get_conversion(&self, id: ConversionId) -> EngineResult<Conversion> {
        self.store
            .get_conversion(id)
            .await?
            .ok_or_else(|| DomainError::not_found("conversion", id).into())
    }

    pub async fn list_conversions(
        &self,
        filter: &ConversionFilter,
        page: Page,
    ) -> EngineResult<Paged<ConversionView>> {
        Ok(self.store.list_conversions(filter, page).await?)
    }

    /// Conversions of one affiliate, newest first.
    pub async fn affiliate_conversions(
        &self,
        code: &str,
        page: Page,
    ) -> EngineResult<Paged<ConversionView>> {
        let affiliate = self.find_affiliate_by_code(code).await?;
        let filter = ConversionFilter {
            affiliate_id: Some(affiliate.id),
            status: None,
        };
        self.list_conversions(&filter, page).await
    }

    // -- payouts --

    /// Debit `amount` from the affiliate's balance into a `requested` payout.
    #[instrument(skip(self))]
    pub async fn request_payout(&self, code: &str, amount: i64) -> EngineResult<Payout> {
        let result = async {
            let affiliate = self.find_affiliate_by_code(code).await?;
            let payout = self
                .store
                .create_payout(affiliate.id, amount, &self.config.payout_policy(), Utc::now())
                .await?;
            info!(
                payout_id = %payout.id,
                affiliate_id = %affiliate.id,
                amount = payout.amount,
                "payout requested"
            );
            Ok::<_, EngineError>(payout)
        }
        .await;
        log_failure("request_payout", result)
    }

    #[instrument(skip(self))]
    pub async fn settle_payout(&self, id: PayoutId) -> EngineResult<Payout> {
        let result = async {
            let payout = self.store.settle_payout(id, Utc::now()).await?;
            info!(payout_id = %payout.id, amount = payout.amount, "payout settled");
            Ok::<_, EngineError>(payout)
        }
        .await;
        log_failure("settle_payout", result)
    }

    pub async fn list_payouts(
        &self,
        filter: &PayoutFilter,
        page: Page,
    ) -> EngineResult<Paged<PayoutView>> {
        Ok(self.store.list_payouts(filter, page).await?)
    }

    // -- reporting --

    /// Affiliate dashboard, read from one snapshot.
    pub async fn affiliate_stats(&self, code: &str) -> EngineResult<AffiliateStats> {
        let affiliate = self.find_affiliate_by_code(code).await?;
        self.stats_for(affiliate.id).await
    }

    /// Stored balance checked against the balance derived from history.
    #[instrument(skip(self), err)]
    pub async fn audit_balance(&self, affiliate_id: AffiliateId) -> EngineResult<BalanceAudit> {
        let audit = self.stats_for(affiliate_id).await?.balance_audit();
        if !audit.consistent {
            error!(
                affiliate_id = %affiliate_id,
                stored = audit.stored_balance,
                derived = audit.derived_balance,
                "affiliate balance does not match its history"
            );
        }
        Ok(audit)
    }

    pub async fn overview(&self) -> EngineResult<SystemOverview> {
        Ok(SystemOverview::from(self.store.overview_snapshot().await?))
    }

    async fn stats_for(&self, affiliate_id: AffiliateId) -> EngineResult<AffiliateStats> {
        self.store
            .affiliate_snapshot(affiliate_id)
            .await?
            .map(AffiliateStats::from)
            .ok_or_else(|| DomainError::not_found("affiliate", affiliate_id).into())
    }
}

fn log_failure<T>(operation: &'static str, result: EngineResult<T>) -> EngineResult<T> {
    match &result {
        Err(EngineError::Domain(err)) => {
            warn!(operation, code = err.code(), error = %err, "operation rejected");
        }
        Err(EngineError::Store(err)) => {
            error!(operation, error = %err, "storage failure");
        }
        Ok(_) => {}
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use reftrack_conversions::ConversionStatus;
    use reftrack_ledger::PayoutStatus;
    use reftrack_products::CommissionRule;
    use rust_decimal::Decimal;

    use crate::store::InMemoryReferralStore;

    struct Fixture {
        engine: ReferralEngine<InMemoryReferralStore>,
        tenant: Tenant,
        product: Product,
        affiliate: Affiliate,
    }

    async fn fixture() -> Fixture {
        let engine = ReferralEngine::new(InMemoryReferralStore::new(), EngineConfig::default());
        let tenant = engine.create_tenant("Demo Lender").await.unwrap();
        let product = engine
            .create_product(NewProduct {
                tenant_id: tenant.id,
                name: "Kredit Pintar".to_string(),
                slug: "kredit-pintar".to_string(),
                domain: "kreditpintar.example".to_string(),
                commission: CommissionRule::Percentage(Decimal::new(20, 2)),
                cookie_duration_days: None,
            })
            .await
            .unwrap();
        let affiliate = engine
            .register_affiliate(NewAffiliate {
                tenant_id: tenant.id,
                code: "demo001".to_string(),
                email: "demo@example.com".to_string(),
            })
            .await
            .unwrap();
        Fixture {
            engine,
            tenant,
            product,
            affiliate,
        }
    }

    fn domain(err: EngineError) -> DomainError {
        match err {
            EngineError::Domain(err) => err,
            EngineError::Store(err) => panic!("expected domain error, got {err:?}"),
        }
    }

    #[tokio::test]
    async fn click_lookups_are_case_insensitive() {
        let f = fixture().await;
        let outcome = f
            .engine
            .record_click(" Kredit-PINTAR ", "Demo001", ClickMetadata::default())
            .await
            .unwrap();
        assert_eq!(outcome.product.id, f.product.id);
        assert_eq!(outcome.affiliate.id, f.affiliate.id);
        assert_eq!(outcome.marker().duration_days, 30);
        assert_eq!(outcome.marker().ref_code, "DEMO001");
    }

    #[tokio::test]
    async fn click_failures_name_the_missing_or_disabled_entity() {
        let f = fixture().await;
        let err = f
            .engine
            .record_click("nope", "DEMO001", ClickMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::NotFound { entity: "product", .. }));

        let err = f
            .engine
            .record_click("kredit-pintar", "NOPE01", ClickMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::NotFound { entity: "affiliate", .. }));

        f.engine
            .set_affiliate_status(f.affiliate.id, AffiliateStatus::Suspended)
            .await
            .unwrap();
        let err = f
            .engine
            .record_click("kredit-pintar", "DEMO001", ClickMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::Suspended { .. }));

        f.engine
            .update_product(
                f.product.id,
                &ProductPatch {
                    active: Some(false),
                    ..ProductPatch::default()
                },
            )
            .await
            .unwrap();
        let err = f
            .engine
            .record_click("kredit-pintar", "DEMO001", ClickMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::Inactive { .. }));
    }

    #[tokio::test]
    async fn report_prices_and_rejects_duplicates() {
        let f = fixture().await;
        let conversion = f
            .engine
            .report_conversion(&f.product.api_key, f.affiliate.id, "ORD-1", 500_000)
            .await
            .unwrap();
        assert_eq!(conversion.commission_amount, 100_000);
        assert_eq!(conversion.status, ConversionStatus::Pending);

        let err = f
            .engine
            .report_conversion(&f.product.api_key, f.affiliate.id, "ORD-1", 999)
            .await
            .unwrap_err();
        match domain(err) {
            DomainError::DuplicateOrder {
                order_id,
                product_id,
            } => {
                assert_eq!(order_id, "ORD-1");
                assert_eq!(product_id, f.product.id);
            }
            other => panic!("expected DuplicateOrder, got {other:?}"),
        }

        let page = f
            .engine
            .list_conversions(&ConversionFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn report_with_unknown_key_is_not_found() {
        let f = fixture().await;
        let err = f
            .engine
            .report_conversion("sk_bogus", f.affiliate.id, "ORD-1", 100)
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn approval_credits_once_and_payout_debits() {
        let f = fixture().await;
        let conversion = f
            .engine
            .report_conversion(&f.product.api_key, f.affiliate.id, "ORD-1", 3_000_000)
            .await
            .unwrap();
        let approved = f
            .engine
            .decide_conversion(conversion.id, Decision::Approve)
            .await
            .unwrap();
        assert_eq!(approved.status, ConversionStatus::Approved);

        let err = f
            .engine
            .decide_conversion(conversion.id, Decision::Reject)
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::AlreadyDecided { .. }));

        let stats = f.engine.affiliate_stats("DEMO001").await.unwrap();
        assert_eq!(stats.snapshot.affiliate.balance(), 600_000);
        assert_eq!(stats.snapshot.approved.count, 1);

        let payout = f.engine.request_payout("demo001", 500_000).await.unwrap();
        assert_eq!(payout.status, PayoutStatus::Requested);
        let settled = f.engine.settle_payout(payout.id).await.unwrap();
        assert_eq!(settled.status, PayoutStatus::Paid);
        let err = f.engine.settle_payout(payout.id).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::AlreadySettled { .. }));

        let audit = f.engine.audit_balance(f.affiliate.id).await.unwrap();
        assert!(audit.consistent);
        assert_eq!(audit.stored_balance, 100_000);
    }

    #[tokio::test]
    async fn payout_minimum_is_checked_before_balance() {
        let engine = ReferralEngine::new(
            InMemoryReferralStore::new(),
            EngineConfig {
                minimum_payout: 500_000,
            },
        );
        let tenant = engine.create_tenant("Demo").await.unwrap();
        engine
            .register_affiliate(NewAffiliate {
                tenant_id: tenant.id,
                code: "POOR01".to_string(),
                email: "poor@example.com".to_string(),
            })
            .await
            .unwrap();

        let err = engine.request_payout("POOR01", 400_000).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::BelowMinimum { .. }));
        let err = engine.request_payout("POOR01", 500_000).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::InsufficientBalance { .. }));
        let err = engine.request_payout("POOR01", 0).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn cross_tenant_conversion_is_rejected() {
        let f = fixture().await;
        let other_tenant = f.engine.create_tenant("Other").await.unwrap();
        let outsider = f
            .engine
            .register_affiliate(NewAffiliate {
                tenant_id: other_tenant.id,
                code: "OUTSIDER".to_string(),
                email: "out@example.com".to_string(),
            })
            .await
            .unwrap();

        let err = f
            .engine
            .report_conversion(&f.product.api_key, outsider.id, "ORD-X", 100)
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::CrossTenantViolation { .. }));

        let err = f
            .engine
            .resolve_conversion_target(&f.product.api_key, outsider.id)
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::CrossTenantViolation { .. }));
    }

    #[tokio::test]
    async fn duplicate_codes_and_slugs_conflict() {
        let f = fixture().await;
        let err = f
            .engine
            .register_affiliate(NewAffiliate {
                tenant_id: f.tenant.id,
                code: "DEMO001".to_string(),
                email: "again@example.com".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::Conflict(_)));

        let err = f
            .engine
            .create_product(NewProduct {
                tenant_id: f.tenant.id,
                name: "Copy".to_string(),
                slug: "KREDIT-PINTAR".to_string(),
                domain: "copy.example".to_string(),
                commission: CommissionRule::Fixed(1),
                cookie_duration_days: Some(7),
            })
            .await
            .unwrap_err();
        assert!(matches!(domain(err), DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn empty_product_patch_is_rejected() {
        let f = fixture().await;
        let err = f
            .engine
            .update_product(f.product.id, &ProductPatch::default())
            .await
            .unwrap_err();
        assert_eq!(domain(err), DomainError::validation("No fields to update"));
    }

    #[tokio::test]
    async fn resolve_tenant_defaults_to_oldest() {
        let f = fixture().await;
        f.engine.create_tenant("Later").await.unwrap();
        assert_eq!(f.engine.resolve_tenant(None).await.unwrap().id, f.tenant.id);

        let empty = ReferralEngine::new(InMemoryReferralStore::new(), EngineConfig::default());
        let err = empty.resolve_tenant(None).await.unwrap_err();
        assert!(matches!(domain(err), DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn overview_counts_active_affiliates_and_approved_revenue() {
        let f = fixture().await;
        f.engine
            .record_click("kredit-pintar", "DEMO001", ClickMetadata::default())
            .await
            .unwrap();
        f.engine
            .record_click("kredit-pintar", "DEMO001", ClickMetadata::default())
            .await
            .unwrap();
        let conversion = f
            .engine
            .report_conversion(&f.product.api_key, f.affiliate.id, "ORD-1", 500_000)
            .await
            .unwrap();
        f.engine
            .decide_conversion(conversion.id, Decision::Approve)
            .await
            .unwrap();

        let overview = f.engine.overview().await.unwrap();
        assert_eq!(overview.snapshot.active_affiliates, 1);
        assert_eq!(overview.snapshot.clicks, 2);
        assert_eq!(overview.snapshot.approved_order_amount, 500_000);
        assert_eq!(overview.snapshot.approved_commission, 100_000);
        assert_eq!(overview.conversion_rate, Decimal::new(5, 1));
    }

    #[tokio::test]
    async fn reporting_totals_saturate_instead_of_overflowing() {
        let engine = ReferralEngine::new(InMemoryReferralStore::new(), EngineConfig::default());
        let tenant = engine.create_tenant("Big Spender").await.unwrap();
        let huge = i64::MAX / 2 + 1;
        let fixed_one = engine
            .create_product(NewProduct {
                tenant_id: tenant.id,
                name: "Whale".to_string(),
                slug: "whale".to_string(),
                domain: "whale.example".to_string(),
                commission: CommissionRule::Fixed(1),
                cookie_duration_days: None,
            })
            .await
            .unwrap();
        let fixed_huge = engine
            .create_product(NewProduct {
                tenant_id: tenant.id,
                name: "Jackpot".to_string(),
                slug: "jackpot".to_string(),
                domain: "jackpot.example".to_string(),
                commission: CommissionRule::Fixed(huge),
                cookie_duration_days: None,
            })
            .await
            .unwrap();
        let affiliate = engine
            .register_affiliate(NewAffiliate {
                tenant_id: tenant.id,
                code: "WHALE01".to_string(),
                email: "whale@example.com".to_string(),
            })
            .await
            .unwrap();

        for order in ["BIG-1", "BIG-2"] {
            let conversion = engine
                .report_conversion(&fixed_one.api_key, affiliate.id, order, huge)
                .await
                .unwrap();
            engine
                .decide_conversion(conversion.id, Decision::Approve)
                .await
                .unwrap();
            engine
                .report_conversion(&fixed_huge.api_key, affiliate.id, order, 1)
                .await
                .unwrap();
        }

        let overview = engine.overview().await.unwrap();
        assert_eq!(overview.snapshot.approved_order_amount, i64::MAX);
        assert_eq!(overview.snapshot.approved_commission, 2);

        let stats = engine.affiliate_stats("WHALE01").await.unwrap();
        assert_eq!(stats.snapshot.pending.count, 2);
        assert_eq!(stats.snapshot.pending.amount, i64::MAX);
        assert_eq!(stats.snapshot.approved.amount, 2);
        assert_eq!(stats.snapshot.affiliate.balance(), 2);

        let listed = engine
            .list_affiliates(&AffiliateFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(listed.items[0].total_commission, i64::MAX);
    }
}
