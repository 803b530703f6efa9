use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reftrack_core::{AffiliateId, DomainError, DomainResult, Entity, TenantId};

const MIN_CODE_LEN: usize = 3;
const MAX_CODE_LEN: usize = 32;
const MAX_EMAIL_LEN: usize = 254;

/// Affiliate status lifecycle.
///
/// `inactive` is accepted on input as an alias of `suspended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AffiliateStatus {
    Active,
    #[serde(alias = "inactive")]
    Suspended,
}

impl AffiliateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AffiliateStatus::Active => "active",
            AffiliateStatus::Suspended => "suspended",
        }
    }
}

impl core::fmt::Display for AffiliateStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AffiliateStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(AffiliateStatus::Active),
            "suspended" | "inactive" => Ok(AffiliateStatus::Suspended),
            other => Err(DomainError::validation(format!(
                "unknown affiliate status: {other}"
            ))),
        }
    }
}

/// Input for registering an affiliate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAffiliate {
    pub tenant_id: TenantId,
    pub code: String,
    pub email: String,
}

/// A referral partner.
///
/// `balance` is private: it only moves through [`Affiliate::credit`] and
/// [`Affiliate::debit`], which the ledger rules drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affiliate {
    pub id: AffiliateId,
    pub tenant_id: TenantId,
    pub code: String,
    pub email: String,
    pub status: AffiliateStatus,
    balance: i64,
    pub created_at: DateTime<Utc>,
}

impl Affiliate {
    /// Validate `new` and build an active affiliate with a zero balance.
    pub fn register(new: NewAffiliate, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id: AffiliateId::new(),
            tenant_id: new.tenant_id,
            code: normalize_code(&new.code)?,
            email: normalize_email(&new.email)?,
            status: AffiliateStatus::Active,
            balance: 0,
            created_at: now,
        })
    }

    /// Rehydrate a stored affiliate.
    pub fn restore(
        id: AffiliateId,
        tenant_id: TenantId,
        code: String,
        email: String,
        status: AffiliateStatus,
        balance: i64,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if balance < 0 {
            return Err(DomainError::validation(format!(
                "affiliate {code} has a negative balance"
            )));
        }
        Ok(Self {
            id,
            tenant_id,
            code,
            email,
            status,
            balance,
            created_at,
        })
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    /// Check if the affiliate can receive clicks and conversions.
    pub fn can_earn(&self) -> bool {
        self.status == AffiliateStatus::Active
    }

    /// Fail with `Suspended` unless the affiliate is active.
    pub fn ensure_active(&self) -> DomainResult<()> {
        if !self.can_earn() {
            return Err(DomainError::Suspended {
                code: self.code.clone(),
            });
        }
        Ok(())
    }

    pub fn set_status(&mut self, status: AffiliateStatus) {
        self.status = status;
    }

    /// Increase the balance by `amount`.
    pub fn credit(&mut self, amount: i64) -> DomainResult<()> {
        if amount < 0 {
            return Err(DomainError::validation("credit amount must not be negative"));
        }
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| DomainError::validation("balance overflow"))?;
        Ok(())
    }

    /// Decrease the balance by `amount`; never overdraws.
    pub fn debit(&mut self, amount: i64) -> DomainResult<()> {
        if amount <= 0 {
            return Err(DomainError::validation("debit amount must be positive"));
        }
        if self.balance < amount {
            return Err(DomainError::InsufficientBalance {
                balance: self.balance,
                requested: amount,
            });
        }
        self.balance -= amount;
        Ok(())
    }
}

impl Entity for Affiliate {
    type Id = AffiliateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Uppercase and validate an affiliate code (`[A-Z0-9-_]`, 3 to 32 characters).
pub fn normalize_code(raw: &str) -> DomainResult<String> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() < MIN_CODE_LEN || code.len() > MAX_CODE_LEN {
        return Err(DomainError::validation(format!(
            "affiliate code must be {MIN_CODE_LEN}-{MAX_CODE_LEN} characters"
        )));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(DomainError::validation(
            "affiliate code may only contain A-Z, 0-9, '-' and '_'",
        ));
    }
    Ok(code)
}

fn normalize_email(raw: &str) -> DomainResult<String> {
    let email = raw.trim().to_ascii_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(DomainError::validation("email must contain '@'"));
    };
    if local.is_empty() || domain.is_empty() || email.len() > MAX_EMAIL_LEN {
        return Err(DomainError::validation("email is not valid"));
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_tenant_id() -> TenantId {
        TenantId::new()
    }

    fn register(code: &str) -> DomainResult<Affiliate> {
        Affiliate::register(
            NewAffiliate {
                tenant_id: test_tenant_id(),
                code: code.to_string(),
                email: " Partner@Example.com ".to_string(),
            },
            Utc::now(),
        )
    }

    #[test]
    fn register_normalizes_code_and_email() {
        let affiliate = register("demo001").unwrap();
        assert_eq!(affiliate.code, "DEMO001");
        assert_eq!(affiliate.email, "partner@example.com");
        assert_eq!(affiliate.status, AffiliateStatus::Active);
        assert_eq!(affiliate.balance(), 0);
    }

    #[test]
    fn register_rejects_bad_codes() {
        assert!(matches!(register("ab"), Err(DomainError::Validation(_))));
        assert!(register("has space").is_err());
        assert!(register(&"X".repeat(33)).is_err());
        assert!(register("PROMO_2024-A").is_ok());
    }

    #[test]
    fn register_rejects_email_without_at() {
        let err = Affiliate::register(
            NewAffiliate {
                tenant_id: test_tenant_id(),
                code: "DEMO001".to_string(),
                email: "partner.example.com".to_string(),
            },
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn status_parsing_accepts_inactive_alias() {
        assert_eq!("inactive".parse::<AffiliateStatus>().unwrap(), AffiliateStatus::Suspended);
        assert_eq!("ACTIVE".parse::<AffiliateStatus>().unwrap(), AffiliateStatus::Active);
        assert!("banned".parse::<AffiliateStatus>().is_err());

        let status: AffiliateStatus = serde_json::from_str("\"inactive\"").unwrap();
        assert_eq!(status, AffiliateStatus::Suspended);
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"suspended\"");
    }

    #[test]
    fn suspended_affiliate_cannot_earn() {
        let mut affiliate = register("DEMO001").unwrap();
        affiliate.set_status(AffiliateStatus::Suspended);
        assert!(!affiliate.can_earn());
        match affiliate.ensure_active().unwrap_err() {
            DomainError::Suspended { code } => assert_eq!(code, "DEMO001"),
            other => panic!("expected Suspended, got {other:?}"),
        }
    }

    #[test]
    fn debit_never_overdraws() {
        let mut affiliate = register("DEMO001").unwrap();
        affiliate.credit(600_000).unwrap();

        let err = affiliate.debit(600_001).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientBalance {
                balance: 600_000,
                requested: 600_001
            }
        );
        assert_eq!(affiliate.balance(), 600_000);

        affiliate.debit(600_000).unwrap();
        assert_eq!(affiliate.balance(), 0);
        assert!(affiliate.debit(0).is_err());
        assert!(affiliate.credit(-1).is_err());
    }

    #[test]
    fn restore_rejects_negative_balance() {
        let result = Affiliate::restore(
            AffiliateId::new(),
            test_tenant_id(),
            "DEMO001".to_string(),
            "a@b.c".to_string(),
            AffiliateStatus::Active,
            -1,
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: any sequence of credits and debits leaves a non-negative balance.
            #[test]
            fn balance_never_negative(ops in prop::collection::vec((any::<bool>(), 1i64..1_000_000), 0..50)) {
                let mut affiliate = register("DEMO001").unwrap();
                let mut expected = 0i64;
                for (is_credit, amount) in ops {
                    if is_credit {
                        affiliate.credit(amount).unwrap();
                        expected += amount;
                    } else if affiliate.debit(amount).is_ok() {
                        expected -= amount;
                    }
                    prop_assert!(affiliate.balance() >= 0);
                }
                prop_assert_eq!(affiliate.balance(), expected);
            }
        }
    }
}
