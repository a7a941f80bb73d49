//! Layered configuration: built-in defaults, an optional TOML file, then
//! `GOLDREC_`-prefixed environment variables (`__` separates sections).

use crate::domain::error::Result;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "GOLDREC_";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CoreConfig {
    pub database: DatabaseConfig,
    pub sessions: SessionConfig,
    pub stream: StreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Service store file
    pub path: PathBuf,
    /// Kept small: the embedded engine serializes writers anyway
    pub max_connections: u32,
    pub busy_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("goldrec_service.db"),
            max_connections: 4,
            busy_timeout_secs: 5,
            acquire_timeout_secs: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Applied when a caller passes a non-positive timeout
    pub default_timeout_secs: i64,
    pub reaper_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 3600,
            reaper_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamConfig {
    /// Rows fetched per shard catalog page
    pub catalog_page_size: usize,
    /// Default consumer batch size (also the normalized-store page size)
    pub batch_size: usize,
    /// Shard catalogs to read; empty reads every catalog
    pub catalog_names: Vec<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            catalog_page_size: 2000,
            batch_size: 1000,
            catalog_names: Vec::new(),
        }
    }
}

impl CoreConfig {
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(CoreConfig::default()));
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        Ok(Self::figment(config_file).extract()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.sessions.default_timeout_secs, 3600);
        assert_eq!(config.stream.catalog_page_size, 2000);
        assert_eq!(config.stream.batch_size, 1000);
        assert!(config.stream.catalog_names.is_empty());
    }

    #[test]
    fn test_file_then_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "goldrec.toml",
                r#"
                [database]
                path = "/var/lib/goldrec/service.db"

                [stream]
                batch_size = 250
                catalog_names = ["Counterparties"]
                "#,
            )?;
            jail.set_env("GOLDREC_STREAM__BATCH_SIZE", "50");
            jail.set_env("GOLDREC_SESSIONS__REAPER_INTERVAL_SECS", "15");

            let config = CoreConfig::figment(Some(Path::new("goldrec.toml"))).extract::<CoreConfig>()?;
            assert_eq!(config.database.path, PathBuf::from("/var/lib/goldrec/service.db"));
            assert_eq!(config.stream.batch_size, 50);
            assert_eq!(config.stream.catalog_names, vec!["Counterparties".to_string()]);
            assert_eq!(config.sessions.reaper_interval(), Duration::from_secs(15));
            assert_eq!(config.sessions.default_timeout_secs, 3600);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_env_is_config_error() {
        Jail::expect_with(|jail| {
            jail.set_env("GOLDREC_DATABASE__MAX_CONNECTIONS", "many");
            let err = CoreConfig::load(None).unwrap_err();
            assert!(matches!(err, crate::domain::error::AppError::ConfigError(_)));
            Ok(())
        });
    }
}
