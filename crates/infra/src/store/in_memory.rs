use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use reftrack_affiliates::{Affiliate, AffiliateStatus};
use reftrack_attribution::Click;
use reftrack_conversions::{Conversion, ConversionStatus, Decision, OrderId};
use reftrack_core::{
    AffiliateId, ConversionId, DomainError, PayoutId, ProductId, Tenant, TenantId,
};
use reftrack_ledger::{Payout, PayoutPolicy, PayoutStatus, apply_decision, open_payout};
use reftrack_products::Product;

use super::query::{
    AffiliateFilter, AffiliateSummary, ConversionFilter, ConversionView, Page, Paged,
    PayoutFilter, PayoutView,
};
use super::r#trait::{ReferralStore, StoreError};
use crate::reporting::{AffiliateSnapshot, CountAmount, OverviewSnapshot};

#[derive(Debug, Default)]
struct State {
    tenants: HashMap<TenantId, Tenant>,
    products: HashMap<ProductId, Product>,
    affiliates: HashMap<AffiliateId, Affiliate>,
    clicks: Vec<Click>,
    conversions: HashMap<ConversionId, Conversion>,
    orders: HashMap<(ProductId, OrderId), ConversionId>,
    payouts: HashMap<PayoutId, Payout>,
}

impl State {
    fn affiliate(&self, id: AffiliateId) -> Result<&Affiliate, StoreError> {
        self.affiliates
            .get(&id)
            .ok_or_else(|| StoreError::Corrupt(format!("dangling affiliate reference {id}")))
    }

    fn product(&self, id: ProductId) -> Result<&Product, StoreError> {
        self.products
            .get(&id)
            .ok_or_else(|| StoreError::Corrupt(format!("dangling product reference {id}")))
    }

    fn conversion_view(&self, conversion: &Conversion) -> Result<ConversionView, StoreError> {
        let affiliate = self.affiliate(conversion.affiliate_id)?;
        let product = self.product(conversion.product_id)?;
        Ok(ConversionView {
            conversion: conversion.clone(),
            affiliate_code: affiliate.code.clone(),
            affiliate_email: affiliate.email.clone(),
            product_name: product.name.clone(),
            product_slug: product.slug.clone(),
        })
    }

    fn payout_view(&self, payout: &Payout) -> Result<PayoutView, StoreError> {
        let affiliate = self.affiliate(payout.affiliate_id)?;
        Ok(PayoutView {
            payout: payout.clone(),
            affiliate_code: affiliate.code.clone(),
            affiliate_email: affiliate.email.clone(),
        })
    }

    fn summarize(&self, affiliate: &Affiliate) -> AffiliateSummary {
        let clicks = self
            .clicks
            .iter()
            .filter(|c| c.affiliate_id == affiliate.id)
            .count() as u64;
        let mut conversions = 0;
        let mut total_commission: i64 = 0;
        let mut approved_commission: i64 = 0;
        for c in self.conversions.values().filter(|c| c.affiliate_id == affiliate.id) {
            conversions += 1;
            total_commission = total_commission.saturating_add(c.commission_amount);
            if c.status == ConversionStatus::Approved {
                approved_commission = approved_commission.saturating_add(c.commission_amount);
            }
        }
        AffiliateSummary {
            affiliate: affiliate.clone(),
            clicks,
            conversions,
            total_commission,
            approved_commission,
        }
    }

    fn ensure_product_keys_free(&self, product: &Product) -> Result<(), StoreError> {
        for other in self.products.values().filter(|p| p.id != product.id) {
            if other.slug == product.slug {
                return Err(DomainError::conflict(format!(
                    "product slug '{}' already exists",
                    product.slug
                ))
                .into());
            }
            if other.api_key == product.api_key {
                return Err(DomainError::conflict("product api key already exists").into());
            }
        }
        Ok(())
    }
}

/// Newest first; ids break ties between equal timestamps.
fn newest_first<T, K: Ord>(items: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, K)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

/// In-memory referral store.
///
/// Intended for tests/dev. Every operation runs under a single lock, so each unit of
/// work is trivially atomic and reads see one consistent snapshot.
#[derive(Debug, Default)]
pub struct InMemoryReferralStore {
    state: RwLock<State>,
}

impl InMemoryReferralStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl ReferralStore for InMemoryReferralStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.read().map(|_| ())
    }

    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.tenants.contains_key(&tenant.id) {
            return Err(DomainError::conflict(format!("tenant {} already exists", tenant.id)).into());
        }
        state.tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn update_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        let mut state = self.write()?;
        match state.tenants.get_mut(&tenant.id) {
            Some(existing) => {
                *existing = tenant.clone();
                Ok(())
            }
            None => Err(DomainError::not_found("tenant", tenant.id).into()),
        }
    }

    async fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError> {
        Ok(self.read()?.tenants.get(&id).cloned())
    }

    async fn first_tenant(&self) -> Result<Option<Tenant>, StoreError> {
        Ok(self
            .read()?
            .tenants
            .values()
            .min_by_key(|t| (t.created_at, t.id))
            .cloned())
    }

    async fn list_tenants(&self, page: Page) -> Result<Paged<Tenant>, StoreError> {
        let state = self.read()?;
        let mut all: Vec<Tenant> = state.tenants.values().cloned().collect();
        newest_first(&mut all, |t| (t.created_at, t.id));
        Ok(Paged::new(page.slice(&all), all.len() as u64, page))
    }

    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.tenants.contains_key(&product.tenant_id) {
            return Err(DomainError::not_found("tenant", product.tenant_id).into());
        }
        if state.products.contains_key(&product.id) {
            return Err(DomainError::conflict(format!("product {} already exists", product.id)).into());
        }
        state.ensure_product_keys_free(product)?;
        state.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.products.contains_key(&product.id) {
            return Err(DomainError::not_found("product", product.id).into());
        }
        state.ensure_product_keys_free(product)?;
        state.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError> {
        Ok(self
            .read()?
            .products
            .values()
            .find(|p| p.slug == slug)
            .cloned())
    }

    async fn product_by_api_key(&self, api_key: &str) -> Result<Option<Product>, StoreError> {
        Ok(self
            .read()?
            .products
            .values()
            .find(|p| p.api_key == api_key)
            .cloned())
    }

    async fn list_products(
        &self,
        tenant_id: Option<TenantId>,
        page: Page,
    ) -> Result<Paged<Product>, StoreError> {
        let state = self.read()?;
        let mut all: Vec<Product> = state
            .products
            .values()
            .filter(|p| tenant_id.is_none_or(|t| t == p.tenant_id))
            .cloned()
            .collect();
        newest_first(&mut all, |p| (p.created_at, p.id));
        Ok(Paged::new(page.slice(&all), all.len() as u64, page))
    }

    async fn insert_affiliate(&self, affiliate: &Affiliate) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.tenants.contains_key(&affiliate.tenant_id) {
            return Err(DomainError::not_found("tenant", affiliate.tenant_id).into());
        }
        if state.affiliates.values().any(|a| a.code == affiliate.code) {
            return Err(DomainError::conflict(format!(
                "affiliate code '{}' already exists",
                affiliate.code
            ))
            .into());
        }
        state.affiliates.insert(affiliate.id, affiliate.clone());
        Ok(())
    }

    async fn get_affiliate(&self, id: AffiliateId) -> Result<Option<Affiliate>, StoreError> {
        Ok(self.read()?.affiliates.get(&id).cloned())
    }

    async fn affiliate_by_code(&self, code: &str) -> Result<Option<Affiliate>, StoreError> {
        Ok(self
            .read()?
            .affiliates
            .values()
            .find(|a| a.code == code)
            .cloned())
    }

    async fn set_affiliate_status(
        &self,
        id: AffiliateId,
        status: AffiliateStatus,
    ) -> Result<Affiliate, StoreError> {
        let mut state = self.write()?;
        let affiliate = state
            .affiliates
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("affiliate", id))?;
        affiliate.set_status(status);
        Ok(affiliate.clone())
    }

    async fn list_affiliates(
        &self,
        filter: &AffiliateFilter,
        page: Page,
    ) -> Result<Paged<AffiliateSummary>, StoreError> {
        let state = self.read()?;
        let mut matching: Vec<&Affiliate> =
            state.affiliates.values().filter(|a| filter.matches(a)).collect();
        newest_first(&mut matching, |a| (a.created_at, a.id));
        let total = matching.len() as u64;
        let items = page
            .slice(&matching)
            .into_iter()
            .map(|a| state.summarize(a))
            .collect();
        Ok(Paged::new(items, total, page))
    }

    async fn insert_click(&self, click: &Click) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.product(click.product_id)?;
        state.affiliate(click.affiliate_id)?;
        state.clicks.push(click.clone());
        Ok(())
    }

    async fn insert_conversion(&self, conversion: &Conversion) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let key = (conversion.product_id, conversion.order_id.clone());
        if state.orders.contains_key(&key) {
            return Err(DomainError::DuplicateOrder {
                order_id: conversion.order_id.to_string(),
                product_id: conversion.product_id,
            }
            .into());
        }
        state.product(conversion.product_id)?;
        state.affiliate(conversion.affiliate_id)?;
        state.orders.insert(key, conversion.id);
        state.conversions.insert(conversion.id, conversion.clone());
        Ok(())
    }

    async fn get_conversion(&self, id: ConversionId) -> Result<Option<Conversion>, StoreError> {
        Ok(self.read()?.conversions.get(&id).cloned())
    }

    async fn conversion_by_order(
        &self,
        product_id: ProductId,
        order_id: &OrderId,
    ) -> Result<Option<Conversion>, StoreError> {
        let state = self.read()?;
        Ok(state
            .orders
            .get(&(product_id, order_id.clone()))
            .and_then(|id| state.conversions.get(id))
            .cloned())
    }

    async fn decide_conversion(
        &self,
        id: ConversionId,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<Conversion, StoreError> {
        let mut guard = self.write()?;
        let state = &mut *guard;
        let conversion = state
            .conversions
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("conversion", id))?;
        let affiliate = state.affiliates.get_mut(&conversion.affiliate_id).ok_or_else(|| {
            StoreError::Corrupt(format!("dangling affiliate reference {}", conversion.affiliate_id))
        })?;
        apply_decision(conversion, affiliate, decision, now)?;
        Ok(conversion.clone())
    }

    async fn list_conversions(
        &self,
        filter: &ConversionFilter,
        page: Page,
    ) -> Result<Paged<ConversionView>, StoreError> {
        let state = self.read()?;
        let mut matching: Vec<&Conversion> = state
            .conversions
            .values()
            .filter(|c| filter.affiliate_id.is_none_or(|a| a == c.affiliate_id))
            .filter(|c| filter.status.is_none_or(|s| s == c.status))
            .collect();
        newest_first(&mut matching, |c| (c.created_at, c.id));
        let total = matching.len() as u64;
        let items = page
            .slice(&matching)
            .into_iter()
            .map(|c| state.conversion_view(c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Paged::new(items, total, page))
    }

    async fn create_payout(
        &self,
        affiliate_id: AffiliateId,
        amount: i64,
        policy: &PayoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Payout, StoreError> {
        let mut state = self.write()?;
        let affiliate = state
            .affiliates
            .get_mut(&affiliate_id)
            .ok_or_else(|| DomainError::not_found("affiliate", affiliate_id))?;
        let payout = open_payout(affiliate, amount, policy, now)?;
        state.payouts.insert(payout.id, payout.clone());
        Ok(payout)
    }

    async fn settle_payout(&self, id: PayoutId, now: DateTime<Utc>) -> Result<Payout, StoreError> {
        let mut state = self.write()?;
        let payout = state
            .payouts
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("payout", id))?;
        payout.settle(now)?;
        Ok(payout.clone())
    }

    async fn list_payouts(
        &self,
        filter: &PayoutFilter,
        page: Page,
    ) -> Result<Paged<PayoutView>, StoreError> {
        let state = self.read()?;
        let mut matching: Vec<&Payout> = state
            .payouts
            .values()
            .filter(|p| filter.affiliate_id.is_none_or(|a| a == p.affiliate_id))
            .filter(|p| filter.status.is_none_or(|s| s == p.status))
            .collect();
        newest_first(&mut matching, |p| (p.requested_at, p.id));
        let total = matching.len() as u64;
        let items = page
            .slice(&matching)
            .into_iter()
            .map(|p| state.payout_view(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Paged::new(items, total, page))
    }

    async fn affiliate_snapshot(
        &self,
        id: AffiliateId,
    ) -> Result<Option<AffiliateSnapshot>, StoreError> {
        let state = self.read()?;
        let Some(affiliate) = state.affiliates.get(&id) else {
            return Ok(None);
        };

        let referral_product_slug = state
            .products
            .values()
            .filter(|p| p.tenant_id == affiliate.tenant_id && p.active)
            .min_by_key(|p| (p.created_at, p.id))
            .map(|p| p.slug.clone());

        let clicks = state.clicks.iter().filter(|c| c.affiliate_id == id).count() as u64;

        let mut conversions = 0;
        let mut pending = CountAmount::default();
        let mut approved = CountAmount::default();
        for c in state.conversions.values().filter(|c| c.affiliate_id == id) {
            conversions += 1;
            match c.status {
                ConversionStatus::Pending => pending.add(c.commission_amount),
                ConversionStatus::Approved => approved.add(c.commission_amount),
                ConversionStatus::Rejected => {}
            }
        }

        let mut paid_total: i64 = 0;
        let mut committed_payouts: i64 = 0;
        for p in state.payouts.values().filter(|p| p.affiliate_id == id) {
            committed_payouts = committed_payouts.saturating_add(p.amount);
            if p.status == PayoutStatus::Paid {
                paid_total = paid_total.saturating_add(p.amount);
            }
        }

        Ok(Some(AffiliateSnapshot {
            affiliate: affiliate.clone(),
            referral_product_slug,
            clicks,
            conversions,
            pending,
            approved,
            paid_total,
            committed_payouts,
        }))
    }

    async fn overview_snapshot(&self) -> Result<OverviewSnapshot, StoreError> {
        let state = self.read()?;
        let mut overview = OverviewSnapshot {
            active_affiliates: state.affiliates.values().filter(|a| a.can_earn()).count() as u64,
            clicks: state.clicks.len() as u64,
            conversions: state.conversions.len() as u64,
            ..OverviewSnapshot::default()
        };
        for c in state
            .conversions
            .values()
            .filter(|c| c.status == ConversionStatus::Approved)
        {
            overview.approved_order_amount =
                overview.approved_order_amount.saturating_add(c.order_amount);
            overview.approved_commission =
                overview.approved_commission.saturating_add(c.commission_amount);
        }
        for p in state
            .payouts
            .values()
            .filter(|p| p.status == PayoutStatus::Requested)
        {
            overview.pending_payouts.add(p.amount);
        }
        Ok(overview)
    }
}
