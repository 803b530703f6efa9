//! Infrastructure wiring: picks the referral store and builds the engine around it.

use std::sync::Arc;

use anyhow::Context;

use reftrack_infra::store::{
    InMemoryReferralStore, PostgresReferralStore, ReferralStore, connect,
};
use reftrack_infra::ReferralEngine;

use crate::config::{ApiConfig, Persistence};

/// Store behind the engine, chosen at startup.
pub type DynStore = Arc<dyn ReferralStore>;

pub type Engine = ReferralEngine<DynStore>;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppServices {
    pub engine: Arc<Engine>,
    pub admin_api_key: Arc<str>,
    pub fallback_redirect_url: Arc<str>,
    /// `"memory"` or `"postgres"`, reported by the health check.
    pub backend: &'static str,
}

impl AppServices {
    pub fn new(store: DynStore, config: &ApiConfig, backend: &'static str) -> Self {
        Self {
            engine: Arc::new(ReferralEngine::new(store, config.engine_config())),
            admin_api_key: Arc::from(config.admin_api_key.as_str()),
            fallback_redirect_url: Arc::from(config.fallback_redirect_url.as_str()),
            backend,
        }
    }
}

pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    match &config.persistence {
        Persistence::InMemory => Ok(build_in_memory_services(config)),
        Persistence::Postgres {
            database_url,
            max_connections,
            acquire_timeout,
        } => {
            let pool = connect(database_url, *max_connections, *acquire_timeout)
                .await
                .context("failed to connect to Postgres")?;
            let store = PostgresReferralStore::new(pool);
            store
                .ensure_schema()
                .await
                .context("failed to apply referral schema")?;
            tracing::info!(max_connections = *max_connections, "using Postgres referral store");
            Ok(AppServices::new(Arc::new(store), config, "postgres"))
        }
    }
}

/// In-memory wiring (dev/test).
pub fn build_in_memory_services(config: &ApiConfig) -> AppServices {
    tracing::info!("using in-memory referral store");
    AppServices::new(Arc::new(InMemoryReferralStore::new()), config, "memory")
}
