use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Reference database configuration (PostgreSQL or SQLite DSN).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub dsn: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("sqlite://.data/blobsweep.db"),
        }
    }
}

impl DatabaseConfig {
    /// Create an in-memory database configuration for tests and dry runs.
    pub fn in_memory() -> Self {
        Self {
            dsn: String::from("sqlite::memory:"),
        }
    }
}

/// Object storage configuration for the content-addressed data bucket.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub dsn: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("file://.data/storage"),
        }
    }
}

/// Inventory export configuration.
///
/// The inventory bucket receives the periodic bulk key listing of the data
/// bucket. `prefix` is the root under which dated export directories live,
/// e.g. `my-data-bucket/weekly-inventory`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InventoryConfig {
    pub dsn: String,
    pub prefix: String,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("file://.data/inventory"),
            prefix: String::from("inventory"),
        }
    }
}

/// Sweep behavior configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Trailing window during which recent uploads or reference changes
    /// suppress full deletion.
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
    /// Identify and audit doomed keys without deleting anything.
    pub dry_run: bool,
    /// Maximum keys per object-store delete request.
    pub delete_batch_size: usize,
    /// Retry budget for object-store list/fetch/delete calls.
    pub store_retry_attempts: u32,
    /// Append-only record of every doomed key, written even in dry-run mode.
    pub audit_log: Option<PathBuf>,
    /// Truncate the audit log at run start instead of appending.
    pub truncate_audit_log: bool,
    /// Interval at which progress counters are reported.
    #[serde(with = "humantime_serde")]
    pub report_interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            // One month: tolerates snapshot staleness and propagation lag.
            grace_period: Duration::from_secs(30 * 24 * 3600),
            // Dry run by default: deletion must be opted into.
            dry_run: true,
            delete_batch_size: 1000,
            store_retry_attempts: 3,
            audit_log: None,
            truncate_audit_log: true,
            report_interval: Duration::from_secs(10),
        }
    }
}

impl SweepConfig {
    /// Validate the sweep configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.grace_period.is_zero() {
            anyhow::bail!("sweep.grace_period must be positive");
        }

        if self.delete_batch_size == 0 || self.delete_batch_size > 1000 {
            anyhow::bail!(
                "sweep.delete_batch_size must be in 1..=1000, got {}",
                self.delete_batch_size
            );
        }

        if self.store_retry_attempts == 0 {
            anyhow::bail!("sweep.store_retry_attempts must be positive");
        }

        if self.report_interval.is_zero() {
            anyhow::bail!("sweep.report_interval must be positive");
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Configuration {
    /// Reference database holding file and library relation rows.
    pub database: DatabaseConfig,
    /// Content-addressed data bucket.
    pub storage: StorageConfig,
    /// Inventory export bucket and root prefix.
    pub inventory: InventoryConfig,
    /// Sweep behavior.
    pub sweep: SweepConfig,
}

impl Configuration {
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file("blobsweep.toml"))
            .merge(Env::prefixed("BLOBSWEEP__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("BLOBSWEEP__").split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_safe() {
        let config = Configuration::default();

        assert_eq!(config.database.dsn, "sqlite://.data/blobsweep.db");
        assert!(config.sweep.dry_run, "deletion must be opt-in");
        assert_eq!(config.sweep.delete_batch_size, 1000);
        assert_eq!(
            config.sweep.grace_period,
            Duration::from_secs(30 * 24 * 3600)
        );
        assert!(config.sweep.audit_log.is_none());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Configuration::default().sweep.validate().is_ok());
    }

    #[test]
    fn test_oversized_delete_batch_is_invalid() {
        let sweep = SweepConfig {
            delete_batch_size: 1001,
            ..Default::default()
        };
        assert!(sweep.validate().is_err());
    }

    #[test]
    fn test_zero_grace_period_is_invalid() {
        let sweep = SweepConfig {
            grace_period: Duration::ZERO,
            ..Default::default()
        };
        assert!(sweep.validate().is_err());
    }

    #[test]
    fn test_env_var_override() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("BLOBSWEEP__DATABASE__DSN", "postgres://localhost/refs");
            jail.set_env("BLOBSWEEP__SWEEP__DRY_RUN", "false");
            jail.set_env("BLOBSWEEP__SWEEP__GRACE_PERIOD", "14d");

            let config = Figment::from(Serialized::defaults(Configuration::default()))
                .merge(Env::prefixed("BLOBSWEEP__").split("__"))
                .extract::<Configuration>()?;

            assert_eq!(config.database.dsn, "postgres://localhost/refs");
            assert!(!config.sweep.dry_run);
            assert_eq!(config.sweep.grace_period, Duration::from_secs(14 * 24 * 3600));
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_override() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "blobsweep.toml",
                r#"
                [inventory]
                dsn = "s3://inventory-bucket"
                prefix = "data-bucket/weekly"

                [sweep]
                audit_log = "/var/log/blobsweep/doomed.log"
                "#,
            )?;

            let config = Figment::from(Serialized::defaults(Configuration::default()))
                .merge(Toml::file("blobsweep.toml"))
                .extract::<Configuration>()?;

            assert_eq!(config.inventory.dsn, "s3://inventory-bucket");
            assert_eq!(config.inventory.prefix, "data-bucket/weekly");
            assert_eq!(
                config.sweep.audit_log.as_deref(),
                Some(Path::new("/var/log/blobsweep/doomed.log"))
            );
            Ok(())
        });
    }
}
