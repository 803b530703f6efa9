use reftrack_affiliates::Affiliate;
use reftrack_core::{DomainError, DomainResult, same_tenant};
use reftrack_products::Product;

/// Check that `affiliate` may be credited for traffic to `product`.
///
/// Checks, in order: product active (`Inactive`), same tenant (`CrossTenantViolation`),
/// affiliate active (`Suspended`).
pub fn ensure_attributable(product: &Product, affiliate: &Affiliate) -> DomainResult<()> {
    product.ensure_active()?;
    if !same_tenant(product, affiliate) {
        return Err(DomainError::CrossTenantViolation {
            affiliate_id: affiliate.id,
            product_id: product.id,
        });
    }
    affiliate.ensure_active()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;
    use reftrack_affiliates::NewAffiliate;
    use reftrack_core::TenantId;
    use reftrack_products::{CommissionRule, NewProduct};
    use rust_decimal::Decimal;

    use super::*;

    pub fn product(tenant_id: TenantId) -> Product {
        Product::create(
            NewProduct {
                tenant_id,
                name: "Kredit Pintar".to_string(),
                slug: "kredit-pintar".to_string(),
                domain: "kreditpintar.example".to_string(),
                commission: CommissionRule::Percentage(Decimal::new(20, 2)),
                cookie_duration_days: Some(30),
            },
            Utc::now(),
        )
        .unwrap()
    }

    pub fn affiliate(tenant_id: TenantId) -> Affiliate {
        Affiliate::register(
            NewAffiliate {
                tenant_id,
                code: "DEMO001".to_string(),
                email: "demo@example.com".to_string(),
            },
            Utc::now(),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use reftrack_affiliates::AffiliateStatus;
    use reftrack_core::TenantId;

    #[test]
    fn same_tenant_active_pair_is_attributable() {
        let tenant = TenantId::new();
        assert!(ensure_attributable(&product(tenant), &affiliate(tenant)).is_ok());
    }

    #[test]
    fn cross_tenant_pair_is_rejected() {
        let product = product(TenantId::new());
        let affiliate = affiliate(TenantId::new());
        match ensure_attributable(&product, &affiliate).unwrap_err() {
            DomainError::CrossTenantViolation {
                affiliate_id,
                product_id,
            } => {
                assert_eq!(affiliate_id, affiliate.id);
                assert_eq!(product_id, product.id);
            }
            other => panic!("expected CrossTenantViolation, got {other:?}"),
        }
    }

    #[test]
    fn inactive_product_and_suspended_affiliate_are_rejected() {
        let tenant = TenantId::new();
        let mut product = product(tenant);
        let mut affiliate = affiliate(tenant);

        affiliate.set_status(AffiliateStatus::Suspended);
        assert!(matches!(
            ensure_attributable(&product, &affiliate),
            Err(DomainError::Suspended { .. })
        ));

        product.active = false;
        assert!(matches!(
            ensure_attributable(&product, &affiliate),
            Err(DomainError::Inactive { .. })
        ));
    }
}
