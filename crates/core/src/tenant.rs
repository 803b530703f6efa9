//! Tenant: the isolation boundary that owns products and affiliates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::TenantId;

const MAX_NAME_LEN: usize = 200;

/// One business customer of the referral service.
///
/// Immutable after creation except for its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn create(name: &str, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id: TenantId::new(),
            name: normalize_name(name)?,
            created_at: now,
        })
    }

    pub fn rename(&mut self, name: &str) -> DomainResult<()> {
        self.name = normalize_name(name)?;
        Ok(())
    }
}

impl Entity for Tenant {
    type Id = TenantId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.id
    }
}

fn normalize_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("tenant name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::validation(format!(
            "tenant name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}
