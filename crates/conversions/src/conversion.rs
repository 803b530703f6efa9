use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reftrack_affiliates::Affiliate;
use reftrack_attribution::ensure_attributable;
use reftrack_core::{
    AffiliateId, ConversionId, DomainError, DomainResult, Entity, ProductId, TenantId,
};
use reftrack_products::{Product, compute_commission};

const MAX_ORDER_ID_LEN: usize = 128;

/// Merchant-supplied order identifier, unique per product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderId(String);

impl OrderId {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("order id must not be empty"));
        }
        if trimmed.chars().count() > MAX_ORDER_ID_LEN {
            return Err(DomainError::validation(format!(
                "order id must be at most {MAX_ORDER_ID_LEN} characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OrderId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        OrderId::parse(&value)
    }
}

impl From<OrderId> for String {
    fn from(value: OrderId) -> Self {
        value.0
    }
}

/// Conversion status lifecycle: `pending → approved | rejected` (both terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionStatus {
    Pending,
    Approved,
    Rejected,
}

impl ConversionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionStatus::Pending => "pending",
            ConversionStatus::Approved => "approved",
            ConversionStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConversionStatus::Pending)
    }
}

impl core::fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ConversionStatus::Pending),
            "approved" => Ok(ConversionStatus::Approved),
            "rejected" => Ok(ConversionStatus::Rejected),
            other => Err(DomainError::validation(format!(
                "unknown conversion status: {other}"
            ))),
        }
    }
}

/// Admin decision on a pending conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn target_status(&self) -> ConversionStatus {
        match self {
            Decision::Approve => ConversionStatus::Approved,
            Decision::Reject => ConversionStatus::Rejected,
        }
    }
}

impl FromStr for Decision {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Ok(Decision::Approve),
            "reject" => Ok(Decision::Reject),
            other => Err(DomainError::validation(format!(
                "action must be 'approve' or 'reject', got '{other}'"
            ))),
        }
    }
}

/// One reported order, priced at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversion {
    pub id: ConversionId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub affiliate_id: AffiliateId,
    pub order_id: OrderId,
    pub order_amount: i64,
    pub commission_amount: i64,
    pub status: ConversionStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl Conversion {
    /// Build a `pending` conversion, pricing it with the product's commission rule.
    pub fn price(
        product: &Product,
        affiliate: &Affiliate,
        order_id: OrderId,
        order_amount: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        ensure_attributable(product, affiliate)?;
        let commission_amount = compute_commission(&product.commission, order_amount)?;

        Ok(Self {
            id: ConversionId::new(),
            tenant_id: product.tenant_id,
            product_id: product.id,
            affiliate_id: affiliate.id,
            order_id,
            order_amount,
            commission_amount,
            status: ConversionStatus::Pending,
            created_at: now,
            decided_at: None,
        })
    }

    /// Apply an admin decision.
    ///
    /// Returns the amount to credit to the affiliate (`Some` only on approval). Fails
    /// with `AlreadyDecided` unless the conversion is still pending; state is untouched
    /// on failure.
    pub fn decide(&mut self, decision: Decision, now: DateTime<Utc>) -> DomainResult<Option<i64>> {
        if self.status.is_terminal() {
            return Err(DomainError::AlreadyDecided {
                conversion_id: self.id,
                status: self.status.to_string(),
            });
        }

        self.status = decision.target_status();
        self.decided_at = Some(now);

        Ok(match decision {
            Decision::Approve => Some(self.commission_amount),
            Decision::Reject => None,
        })
    }
}

impl Entity for Conversion {
    type Id = ConversionId;

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
    use reftrack_affiliates::NewAffiliate;
    use reftrack_products::{CommissionRule, NewProduct};
    use rust_decimal::Decimal;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_product(tenant_id: TenantId, commission: CommissionRule) -> Product {
        Product::create(
            NewProduct {
                tenant_id,
                name: "Kredit Pintar".to_string(),
                slug: "kredit-pintar".to_string(),
                domain: "kreditpintar.example".to_string(),
                commission,
                cookie_duration_days: None,
            },
            test_time(),
        )
        .unwrap()
    }

    fn test_affiliate(tenant_id: TenantId) -> Affiliate {
        Affiliate::register(
            NewAffiliate {
                tenant_id,
                code: "DEMO001".to_string(),
                email: "demo@example.com".to_string(),
            },
            test_time(),
        )
        .unwrap()
    }

    fn pending_conversion() -> Conversion {
        let tenant = test_tenant_id();
        let product = test_product(tenant, CommissionRule::Percentage(Decimal::new(20, 2)));
        let affiliate = test_affiliate(tenant);
        Conversion::price(
            &product,
            &affiliate,
            OrderId::parse("ORD-1").unwrap(),
            500_000,
            test_time(),
        )
        .unwrap()
    }

    #[test]
    fn order_id_is_trimmed_and_bounded() {
        assert_eq!(OrderId::parse("  ORD-1 ").unwrap().as_str(), "ORD-1");
        assert!(OrderId::parse("   ").is_err());
        assert!(OrderId::parse(&"x".repeat(129)).is_err());
        assert!(OrderId::parse(&"x".repeat(128)).is_ok());
    }

    #[test]
    fn price_creates_pending_with_commission() {
        let conversion = pending_conversion();
        assert_eq!(conversion.status, ConversionStatus::Pending);
        assert_eq!(conversion.commission_amount, 100_000);
        assert!(conversion.decided_at.is_none());
    }

    #[test]
    fn price_fixed_commission() {
        let tenant = test_tenant_id();
        let product = test_product(tenant, CommissionRule::Fixed(150_000));
        let conversion = Conversion::price(
            &product,
            &test_affiliate(tenant),
            OrderId::parse("ORD-2").unwrap(),
            42,
            test_time(),
        )
        .unwrap();
        assert_eq!(conversion.commission_amount, 150_000);
    }

    #[test]
    fn price_rejects_cross_tenant_pair() {
        let product = test_product(test_tenant_id(), CommissionRule::Fixed(1));
        let err = Conversion::price(
            &product,
            &test_affiliate(test_tenant_id()),
            OrderId::parse("ORD-3").unwrap(),
            100,
            test_time(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::CrossTenantViolation { .. }));
    }

    #[test]
    fn approve_returns_credit_and_stamps_time() {
        let mut conversion = pending_conversion();
        let credit = conversion.decide(Decision::Approve, test_time()).unwrap();
        assert_eq!(credit, Some(100_000));
        assert_eq!(conversion.status, ConversionStatus::Approved);
        assert!(conversion.decided_at.is_some());
    }

    #[test]
    fn reject_has_no_credit() {
        let mut conversion = pending_conversion();
        assert_eq!(conversion.decide(Decision::Reject, test_time()).unwrap(), None);
        assert_eq!(conversion.status, ConversionStatus::Rejected);
    }

    #[test]
    fn decided_conversion_is_terminal() {
        let mut conversion = pending_conversion();
        conversion.decide(Decision::Approve, test_time()).unwrap();
        let snapshot = conversion.clone();

        let err = conversion.decide(Decision::Reject, test_time()).unwrap_err();
        match err {
            DomainError::AlreadyDecided { status, .. } => assert_eq!(status, "approved"),
            other => panic!("expected AlreadyDecided, got {other:?}"),
        }
        assert_eq!(conversion, snapshot);
    }

    #[test]
    fn decision_parsing() {
        assert_eq!("APPROVE".parse::<Decision>().unwrap(), Decision::Approve);
        assert_eq!("reject".parse::<Decision>().unwrap(), Decision::Reject);
        assert!("cancel".parse::<Decision>().is_err());
        assert_eq!("rejected".parse::<ConversionStatus>().unwrap(), ConversionStatus::Rejected);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn decision() -> impl Strategy<Value = Decision> {
            prop_oneof![Just(Decision::Approve), Just(Decision::Reject)]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: only the first decision takes effect, and credit happens at most once.
            #[test]
            fn only_first_decision_counts(decisions in prop::collection::vec(decision(), 1..10)) {
                let mut conversion = pending_conversion();
                let first = decisions[0];
                let mut credited = 0i64;

                for (i, d) in decisions.iter().enumerate() {
                    let result = conversion.decide(*d, Utc::now());
                    if i == 0 {
                        credited += result.unwrap().unwrap_or(0);
                    } else {
                        let is_already_decided =
                            matches!(result, Err(DomainError::AlreadyDecided { .. }));
                        prop_assert!(is_already_decided);
                    }
                }

                prop_assert_eq!(conversion.status, first.target_status());
                let expected = if first == Decision::Approve { 100_000 } else { 0 };
                prop_assert_eq!(credited, expected);
            }
        }
    }
}
