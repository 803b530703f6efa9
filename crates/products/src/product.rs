use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use reftrack_core::{DomainError, DomainResult, Entity, ProductId, TenantId};

use crate::commission::CommissionRule;

/// Attribution window used when a product does not specify one.
pub const DEFAULT_COOKIE_DURATION_DAYS: u32 = 30;

const MAX_COOKIE_DURATION_DAYS: u32 = 365;
const MAX_SLUG_LEN: usize = 64;
const MASKED_KEY_PREFIX_LEN: usize = 14;
const API_KEY_HEX_LEN: usize = 40;

/// A trackable merchant application/offer.
///
/// The secret `api_key` authenticates conversion reports; it is generated once at creation
/// and never regenerated by a patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub tenant_id: TenantId,
    pub name: String,
    pub slug: String,
    pub domain: String,
    pub api_key: String,
    pub commission: CommissionRule,
    pub cookie_duration_days: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub tenant_id: TenantId,
    pub name: String,
    pub slug: String,
    pub domain: String,
    pub commission: CommissionRule,
    pub cookie_duration_days: Option<u32>,
}

/// Partial update of a product's editable details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub domain: Option<String>,
    pub commission: Option<CommissionRule>,
    pub cookie_duration_days: Option<u32>,
    pub active: Option<bool>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self == &ProductPatch::default()
    }
}

impl Product {
    /// Validate `new` and build an active product with a freshly generated secret key.
    pub fn create(new: NewProduct, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = normalize_name(&new.name)?;
        let slug = normalize_slug(&new.slug)?;
        let domain = normalize_domain(&new.domain)?;
        let commission = new.commission.validated()?;
        let cookie_duration_days = validate_cookie_duration(
            new.cookie_duration_days
                .unwrap_or(DEFAULT_COOKIE_DURATION_DAYS),
        )?;
        let api_key = generate_api_key(&slug);

        Ok(Self {
            id: ProductId::new(),
            tenant_id: new.tenant_id,
            name,
            slug,
            domain,
            api_key,
            commission,
            cookie_duration_days,
            active: true,
            created_at: now,
        })
    }

    /// Apply a validated patch. Either every field is applied or none is.
    pub fn apply_patch(&mut self, patch: &ProductPatch) -> DomainResult<()> {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            next.name = normalize_name(name)?;
        }
        if let Some(slug) = &patch.slug {
            next.slug = normalize_slug(slug)?;
        }
        if let Some(domain) = &patch.domain {
            next.domain = normalize_domain(domain)?;
        }
        if let Some(commission) = patch.commission {
            next.commission = commission.validated()?;
        }
        if let Some(days) = patch.cookie_duration_days {
            next.cookie_duration_days = validate_cookie_duration(days)?;
        }
        if let Some(active) = patch.active {
            next.active = active;
        }
        *self = next;
        Ok(())
    }

    /// Check if the product accepts clicks and conversions.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Fail with `Inactive` unless the product is active.
    pub fn ensure_active(&self) -> DomainResult<()> {
        if !self.active {
            return Err(DomainError::inactive("product", &self.slug));
        }
        Ok(())
    }

    /// Secret key as shown in listings: a short prefix followed by a fixed mask.
    pub fn masked_api_key(&self) -> String {
        let prefix: String = self.api_key.chars().take(MASKED_KEY_PREFIX_LEN).collect();
        format!("{prefix}••••••••")
    }

    /// Absolute URL visitors are redirected to.
    pub fn destination_url(&self) -> String {
        if self.domain.starts_with("http://") || self.domain.starts_with("https://") {
            self.domain.clone()
        } else {
            format!("https://{}", self.domain)
        }
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Lowercase and validate a product slug (`[a-z0-9-_]`).
pub fn normalize_slug(raw: &str) -> DomainResult<String> {
    let slug = raw.trim().to_ascii_lowercase();
    if slug.is_empty() {
        return Err(DomainError::validation("slug must not be empty"));
    }
    if slug.len() > MAX_SLUG_LEN {
        return Err(DomainError::validation(format!(
            "slug must be at most {MAX_SLUG_LEN} characters"
        )));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(DomainError::validation(
            "slug may only contain a-z, 0-9, '-' and '_'",
        ));
    }
    Ok(slug)
}

fn normalize_name(raw: &str) -> DomainResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    Ok(name.to_string())
}

fn normalize_domain(raw: &str) -> DomainResult<String> {
    let domain = raw.trim().trim_end_matches('/');
    if domain.is_empty() {
        return Err(DomainError::validation("domain cannot be empty"));
    }
    if domain.chars().any(char::is_whitespace) {
        return Err(DomainError::validation("domain must not contain whitespace"));
    }
    Ok(domain.to_string())
}

fn validate_cookie_duration(days: u32) -> DomainResult<u32> {
    if !(1..=MAX_COOKIE_DURATION_DAYS).contains(&days) {
        return Err(DomainError::validation(format!(
            "cookie duration must be between 1 and {MAX_COOKIE_DURATION_DAYS} days"
        )));
    }
    Ok(days)
}

/// `sk_<slug>_<40 hex chars>` from two random v4 UUIDs.
fn generate_api_key(slug: &str) -> String {
    let mut hex = Uuid::new_v4().simple().to_string();
    hex.push_str(&Uuid::new_v4().simple().to_string());
    hex.truncate(API_KEY_HEX_LEN);
    format!("sk_{slug}_{hex}")
}
