use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reftrack_affiliates::Affiliate;
use reftrack_core::{AffiliateId, ClickId, DomainResult, Entity, ProductId, TenantId, ValueObject};
use reftrack_products::Product;

use crate::target::ensure_attributable;

const UNKNOWN: &str = "unknown";
const MAX_METADATA_LEN: usize = 512;

/// Request origin captured with a click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickMetadata {
    pub ip: String,
    pub user_agent: String,
}

impl ValueObject for ClickMetadata {}

impl ClickMetadata {
    /// Missing or blank values are recorded as `"unknown"`; long values are truncated.
    pub fn new(ip: Option<&str>, user_agent: Option<&str>) -> Self {
        Self {
            ip: clean(ip),
            user_agent: clean(user_agent),
        }
    }
}

impl Default for ClickMetadata {
    fn default() -> Self {
        Self::new(None, None)
    }
}

fn clean(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.chars().take(MAX_METADATA_LEN).collect(),
        _ => UNKNOWN.to_string(),
    }
}

/// Immutable record of one referral visit. Never updated or deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Click {
    pub id: ClickId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub affiliate_id: AffiliateId,
    pub metadata: ClickMetadata,
    pub created_at: DateTime<Utc>,
}

impl Click {
    /// Record a click after checking the pair is attributable.
    pub fn record(
        product: &Product,
        affiliate: &Affiliate,
        metadata: ClickMetadata,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        ensure_attributable(product, affiliate)?;
        Ok(Self {
            id: ClickId::new(),
            tenant_id: product.tenant_id,
            product_id: product.id,
            affiliate_id: affiliate.id,
            metadata,
            created_at: now,
        })
    }
}

impl Entity for Click {
    type Id = ClickId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::fixtures::*;
    use reftrack_core::{DomainError, TenantId};

    #[test]
    fn metadata_defaults_to_unknown() {
        let meta = ClickMetadata::new(None, Some("   "));
        assert_eq!(meta.ip, "unknown");
        assert_eq!(meta.user_agent, "unknown");

        let meta = ClickMetadata::new(Some("10.0.0.1"), Some("curl/8"));
        assert_eq!(meta.ip, "10.0.0.1");
        assert_eq!(meta.user_agent, "curl/8");
    }

    #[test]
    fn record_click_captures_pair_and_tenant() {
        let tenant = TenantId::new();
        let product = product(tenant);
        let affiliate = affiliate(tenant);
        let click = Click::record(&product, &affiliate, ClickMetadata::default(), Utc::now())
            .unwrap();
        assert_eq!(click.tenant_id, tenant);
        assert_eq!(click.product_id, product.id);
        assert_eq!(click.affiliate_id, affiliate.id);
    }

    #[test]
    fn record_click_enforces_attribution_rules() {
        let product = product(TenantId::new());
        let affiliate = affiliate(TenantId::new());
        let err = Click::record(&product, &affiliate, ClickMetadata::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::CrossTenantViolation { .. }));
    }
}
