//! Commission calculator.
//!
//! The single place where a conversion's commission is derived from its order amount.

use core::fmt;
use core::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use reftrack_core::{DomainError, DomainResult, ValueObject};

/// How a product pays its affiliates.
///
/// Serialized as `{"type": "percentage", "value": 0.2}` / `{"type": "fixed", "value": 150000}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CommissionRule {
    /// Fraction of the order amount, in `[0, 1]`.
    Percentage(Decimal),
    /// Flat amount per conversion, in currency units.
    Fixed(i64),
}

impl ValueObject for CommissionRule {}

impl CommissionRule {
    /// Build a validated rule.
    pub fn validated(self) -> DomainResult<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Build a rule from its storage/wire parts (`"percentage" | "fixed"`, numeric value).
    pub fn from_parts(kind: &str, value: Decimal) -> DomainResult<Self> {
        let rule = match kind.trim().to_ascii_lowercase().as_str() {
            "percentage" => CommissionRule::Percentage(value.normalize()),
            "fixed" => {
                if !value.fract().is_zero() {
                    return Err(DomainError::validation(
                        "fixed commission must be a whole number of currency units",
                    ));
                }
                let amount = value.to_i64().ok_or_else(|| {
                    DomainError::validation("fixed commission is out of range")
                })?;
                CommissionRule::Fixed(amount)
            }
            other => {
                return Err(DomainError::validation(format!(
                    "unknown commission type: {other}"
                )));
            }
        };
        rule.validated()
    }

    pub fn validate(&self) -> DomainResult<()> {
        match *self {
            CommissionRule::Percentage(rate) => {
                if rate < Decimal::ZERO || rate > Decimal::ONE {
                    return Err(DomainError::validation(
                        "percentage commission must be between 0 and 1",
                    ));
                }
            }
            CommissionRule::Fixed(amount) => {
                if amount < 0 {
                    return Err(DomainError::validation(
                        "fixed commission must not be negative",
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CommissionRule::Percentage(_) => "percentage",
            CommissionRule::Fixed(_) => "fixed",
        }
    }

    pub fn value(&self) -> Decimal {
        match *self {
            CommissionRule::Percentage(rate) => rate,
            CommissionRule::Fixed(amount) => Decimal::from(amount),
        }
    }
}

impl fmt::Display for CommissionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            CommissionRule::Percentage(rate) => {
                write!(f, "{}%", (rate * Decimal::ONE_HUNDRED).normalize())
            }
            CommissionRule::Fixed(amount) => write!(f, "{amount} fixed"),
        }
    }
}

impl FromStr for CommissionRule {
    type Err = DomainError;

    /// Parses `percentage:0.2` / `fixed:150000`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| DomainError::validation("expected <type>:<value>"))?;
        let value = Decimal::from_str(value.trim())
            .map_err(|e| DomainError::validation(format!("invalid commission value: {e}")))?;
        CommissionRule::from_parts(kind, value)
    }
}

/// Compute the commission earned on an order of `order_amount` currency units.
///
/// Percentage rules round to the nearest unit, ties away from zero.
pub fn compute_commission(rule: &CommissionRule, order_amount: i64) -> DomainResult<i64> {
    if order_amount < 0 {
        return Err(DomainError::validation("order amount must not be negative"));
    }
    rule.validate()?;

    match *rule {
        CommissionRule::Fixed(amount) => Ok(amount),
        CommissionRule::Percentage(rate) => Decimal::from(order_amount)
            .checked_mul(rate)
            .map(|raw| raw.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|rounded| rounded.to_i64())
            .ok_or_else(|| DomainError::validation("commission amount is out of range")),
    }
}
