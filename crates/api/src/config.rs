//! Service configuration, read once from the environment at startup.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, bail};

use reftrack_infra::EngineConfig;
use reftrack_ledger::DEFAULT_MINIMUM_PAYOUT;
use reftrack_observability::LogFormat;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4000";
pub const DEFAULT_FALLBACK_REDIRECT_URL: &str = "https://example.com";
pub const DEV_ADMIN_API_KEY: &str = "dev-admin-key";

const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;

/// Where referral data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    InMemory,
    Postgres {
        database_url: String,
        max_connections: u32,
        acquire_timeout: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub admin_api_key: String,
    pub persistence: Persistence,
    pub minimum_payout: i64,
    /// Where `/go/{slug}` sends visitors when the product cannot be resolved.
    pub fallback_redirect_url: String,
    pub log_format: LogFormat,
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_addr: SocketAddr = var("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse()
            .context("BIND_ADDR must be a socket address such as 0.0.0.0:4000")?;

        let use_persistent = match var("USE_PERSISTENT_STORES") {
            Some(raw) => raw.to_ascii_lowercase().parse::<bool>().with_context(|| {
                format!("USE_PERSISTENT_STORES must be true or false, got {raw:?}")
            })?,
            None => false,
        };

        let persistence = if use_persistent {
            let Some(database_url) = var("DATABASE_URL") else {
                bail!("DATABASE_URL must be set when USE_PERSISTENT_STORES=true");
            };
            Persistence::Postgres {
                database_url,
                max_connections: parse_number(
                    &var,
                    "DB_MAX_CONNECTIONS",
                    DEFAULT_DB_MAX_CONNECTIONS,
                )?,
                acquire_timeout: Duration::from_secs(parse_number(
                    &var,
                    "DB_ACQUIRE_TIMEOUT_SECS",
                    DEFAULT_DB_ACQUIRE_TIMEOUT_SECS,
                )?),
            }
        } else {
            Persistence::InMemory
        };

        let admin_api_key = match (var("ADMIN_API_KEY"), &persistence) {
            (Some(key), _) => key,
            (None, Persistence::Postgres { .. }) => {
                bail!("ADMIN_API_KEY must be set when USE_PERSISTENT_STORES=true")
            }
            (None, Persistence::InMemory) => {
                tracing::warn!("ADMIN_API_KEY not set; using insecure dev default");
                DEV_ADMIN_API_KEY.to_string()
            }
        };

        let minimum_payout = parse_number(&var, "MINIMUM_PAYOUT", DEFAULT_MINIMUM_PAYOUT)?;
        if minimum_payout <= 0 {
            bail!("MINIMUM_PAYOUT must be positive, got {minimum_payout}");
        }

        let log_format = match var("LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>().map_err(anyhow::Error::msg)?,
            None => LogFormat::default(),
        };

        Ok(Self {
            bind_addr,
            admin_api_key,
            persistence,
            minimum_payout,
            fallback_redirect_url: var("FALLBACK_REDIRECT_URL")
                .unwrap_or_else(|| DEFAULT_FALLBACK_REDIRECT_URL.to_string()),
            log_format,
        })
    }

    /// In-memory configuration for tests and local runs.
    pub fn in_memory(admin_api_key: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            admin_api_key: admin_api_key.into(),
            persistence: Persistence::InMemory,
            minimum_payout: DEFAULT_MINIMUM_PAYOUT,
            fallback_redirect_url: DEFAULT_FALLBACK_REDIRECT_URL.to_string(),
            log_format: LogFormat::default(),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            minimum_payout: self.minimum_payout,
        }
    }
}

fn parse_number<T>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("{key} must be a number, got {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<ApiConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_to_in_memory_with_dev_key() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(cfg.persistence, Persistence::InMemory);
        assert_eq!(cfg.admin_api_key, DEV_ADMIN_API_KEY);
        assert_eq!(cfg.minimum_payout, DEFAULT_MINIMUM_PAYOUT);
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn persistent_mode_reads_pool_settings() {
        let cfg = config(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/reftrack"),
            ("ADMIN_API_KEY", "secret"),
            ("DB_MAX_CONNECTIONS", "4"),
        ])
        .unwrap();
        assert_eq!(
            cfg.persistence,
            Persistence::Postgres {
                database_url: "postgres://localhost/reftrack".to_string(),
                max_connections: 4,
                acquire_timeout: Duration::from_secs(5),
            }
        );
    }

    #[test]
    fn persistent_mode_requires_url_and_admin_key() {
        assert!(config(&[("USE_PERSISTENT_STORES", "true")]).is_err());
        assert!(
            config(&[
                ("USE_PERSISTENT_STORES", "true"),
                ("DATABASE_URL", "postgres://localhost/reftrack"),
            ])
            .is_err()
        );
    }

    #[test]
    fn invalid_numbers_are_startup_errors() {
        assert!(config(&[("MINIMUM_PAYOUT", "lots")]).is_err());
        assert!(config(&[("MINIMUM_PAYOUT", "0")]).is_err());
        assert!(config(&[("BIND_ADDR", "nowhere")]).is_err());
        assert!(config(&[("LOG_FORMAT", "xml")]).is_err());
    }

    #[test]
    fn persistence_flag_must_be_a_boolean() {
        for raw in ["yes", "1", "on"] {
            let err = config(&[("USE_PERSISTENT_STORES", raw)]).unwrap_err();
            assert!(err.to_string().contains("USE_PERSISTENT_STORES"));
        }
        let cfg = config(&[("USE_PERSISTENT_STORES", "FALSE")]).unwrap();
        assert_eq!(cfg.persistence, Persistence::InMemory);
        // Read as true, so DATABASE_URL becomes mandatory.
        assert!(config(&[("USE_PERSISTENT_STORES", "True")]).is_err());
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = config(&[("ADMIN_API_KEY", "  "), ("LOG_FORMAT", "pretty")]).unwrap();
        assert_eq!(cfg.admin_api_key, DEV_ADMIN_API_KEY);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
    }
}
