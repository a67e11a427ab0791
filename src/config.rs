//! Configuration
//!
//! One explicit `VaultConfig` is built at startup and handed to each
//! component's constructor. Nothing below the binaries reads the process
//! environment.
//!
//! Sources: a TOML file (`VaultConfig::from_toml_file`) or environment
//! variables (`VaultConfig::from_env`, see the table on that function).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default per-call object store deadline
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Store holding training datasets
    pub datasets: StoreConfig,
    /// Store holding model bundles
    pub artifacts: StoreConfig,
    /// Store holding result ledgers
    pub results: StoreConfig,
    pub registry: RegistryConfig,
    pub ledger: LedgerConfig,
    pub training: TrainingConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl VaultConfig {
    /// Configuration for tests (in-memory stores, short timeouts)
    pub fn test() -> Self {
        VaultConfig {
            datasets: StoreConfig::test(),
            artifacts: StoreConfig::test(),
            results: StoreConfig::test(),
            registry: RegistryConfig::default(),
            ledger: LedgerConfig::test(),
            training: TrainingConfig::default(),
            server: ServerConfig {
                bind_addr: "127.0.0.1:0".to_string(),
            },
            logging: LoggingConfig::default(),
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: VaultConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Build configuration from environment variables
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | VAULT_STORE_TYPE | localfs | memory, localfs, or s3 |
    /// | VAULT_DATA_ROOT | ./vault-data | Root directory for localfs stores |
    /// | DATA_STORE | train-data | Dataset bucket / directory |
    /// | MODEL_ARTIFACTS_STORE | model-artifacts | Artifact bucket / directory |
    /// | RESULTS_STORE | results | Ledger bucket / directory |
    /// | VAULT_STORE_TIMEOUT_MS | 30000 | Per-call store deadline |
    /// | VAULT_DATASET_PREFIX | (empty) | Prefix scanned for datasets |
    /// | VAULT_TARGET_COLUMN | churn | Label column of the dataset |
    /// | VAULT_ARCHIVE_ZSTD_LEVEL | - | Compress bundle archives (`compression` feature) |
    /// | VAULT_BIND_ADDR | 0.0.0.0:8000 | Inference listen address |
    /// | VAULT_LOG_FORMAT | text | text or json |
    /// | VAULT_LOG_FILTER | info | Default tracing filter (RUST_LOG wins) |
    /// | AWS_REGION | us-east-1 | S3 region |
    /// | AWS_ENDPOINT | - | S3-compatible endpoint (MinIO) |
    /// | AWS_ACCESS_KEY_ID / AWS_ACCESS_KEY | - | S3 credentials |
    /// | AWS_SECRET_ACCESS_KEY | - | S3 credentials |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// TOML file named by `VAULT_CONFIG` if set, otherwise `from_env`
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var_os("VAULT_CONFIG") {
            Some(path) => Self::from_toml_file(Path::new(&path)),
            None => Self::from_env(),
        }
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let store_type = match get("VAULT_STORE_TYPE", "localfs").to_lowercase().as_str() {
            "memory" | "inmemory" => ObjectStoreType::InMemory,
            "localfs" | "local" => ObjectStoreType::LocalFs,
            #[cfg(feature = "s3")]
            "s3" => ObjectStoreType::S3,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unsupported VAULT_STORE_TYPE {:?}",
                    other
                )))
            }
        };

        let op_timeout = match lookup("VAULT_STORE_TIMEOUT_MS") {
            Some(ms) => Duration::from_millis(ms.parse().map_err(|_| {
                ConfigError::Invalid(format!("VAULT_STORE_TIMEOUT_MS is not a number: {:?}", ms))
            })?),
            None => DEFAULT_STORE_TIMEOUT,
        };

        let data_root = PathBuf::from(get("VAULT_DATA_ROOT", "./vault-data"));

        let store = |bucket_var: &str, default_bucket: &str| -> StoreConfig {
            let bucket = get(bucket_var, default_bucket);
            StoreConfig {
                store_type,
                local_path: Some(data_root.join(&bucket)),
                #[cfg(feature = "s3")]
                s3: Some(S3Config {
                    bucket,
                    prefix: String::new(),
                    region: get("AWS_REGION", "us-east-1"),
                    endpoint: lookup("AWS_ENDPOINT"),
                    access_key_id: lookup("AWS_ACCESS_KEY_ID").or_else(|| lookup("AWS_ACCESS_KEY")),
                    secret_access_key: lookup("AWS_SECRET_ACCESS_KEY"),
                    conditional_put: true,
                }),
                op_timeout,
            }
        };

        let archive_zstd_level = match lookup("VAULT_ARCHIVE_ZSTD_LEVEL") {
            Some(level) => Some(level.parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "VAULT_ARCHIVE_ZSTD_LEVEL is not a number: {:?}",
                    level
                ))
            })?),
            None => None,
        };

        let log_format = match get("VAULT_LOG_FORMAT", "text").to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "text" => LogFormat::Text,
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unsupported VAULT_LOG_FORMAT {:?}",
                    other
                )))
            }
        };

        let config = VaultConfig {
            datasets: store("DATA_STORE", "train-data"),
            artifacts: store("MODEL_ARTIFACTS_STORE", "model-artifacts"),
            results: store("RESULTS_STORE", "results"),
            registry: RegistryConfig {
                archive_zstd_level,
                ..RegistryConfig::default()
            },
            ledger: LedgerConfig::default(),
            training: TrainingConfig {
                dataset_prefix: get("VAULT_DATASET_PREFIX", ""),
                target_column: get("VAULT_TARGET_COLUMN", "churn"),
                ..TrainingConfig::default()
            },
            server: ServerConfig {
                bind_addr: get("VAULT_BIND_ADDR", "0.0.0.0:8000"),
            },
            logging: LoggingConfig {
                format: log_format,
                filter: get("VAULT_LOG_FILTER", "info"),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, store) in [
            ("datasets", &self.datasets),
            ("artifacts", &self.artifacts),
            ("results", &self.results),
        ] {
            store
                .validate()
                .map_err(|msg| ConfigError::Invalid(format!("{}: {}", name, msg)))?;
        }

        if self.registry.max_claim_attempts == 0 {
            return Err(ConfigError::Invalid(
                "registry.max_claim_attempts must be at least 1".to_string(),
            ));
        }
        if self.registry.prefix.is_empty() {
            return Err(ConfigError::Invalid("registry.prefix must not be empty".to_string()));
        }
        if let Some(level) = self.registry.archive_zstd_level {
            if !cfg!(feature = "compression") {
                return Err(ConfigError::Invalid(
                    "registry.archive_zstd_level needs the `compression` feature".to_string(),
                ));
            }
            if !(1..=22).contains(&level) {
                return Err(ConfigError::Invalid(format!(
                    "registry.archive_zstd_level must be in 1..=22, got {}",
                    level
                )));
            }
        }
        if self.ledger.writer_shards == 0 {
            return Err(ConfigError::Invalid(
                "ledger.writer_shards must be at least 1".to_string(),
            ));
        }
        let fraction = self.training.test_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "training.test_fraction must be in (0, 1), got {}",
                fraction
            )));
        }
        if self.training.target_column.is_empty() {
            return Err(ConfigError::Invalid(
                "training.target_column must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Type of object store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStoreType {
    /// In-memory store (for tests)
    #[serde(alias = "memory")]
    InMemory,
    /// Local filesystem
    LocalFs,
    /// Amazon S3 or compatible
    #[cfg(feature = "s3")]
    S3,
}

/// Settings for one object store (one bucket)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub store_type: ObjectStoreType,
    /// Root directory (for LocalFs store)
    pub local_path: Option<PathBuf>,
    /// S3 configuration (for S3 store)
    #[cfg(feature = "s3")]
    pub s3: Option<S3Config>,
    /// Deadline applied to every store call
    #[serde(with = "duration_millis", rename = "op_timeout_ms")]
    pub op_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            store_type: ObjectStoreType::InMemory,
            local_path: None,
            #[cfg(feature = "s3")]
            s3: None,
            op_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

impl StoreConfig {
    /// Create config for local development
    pub fn local(path: PathBuf) -> Self {
        StoreConfig {
            store_type: ObjectStoreType::LocalFs,
            local_path: Some(path),
            ..Self::default()
        }
    }

    /// Create config for testing (in-memory)
    pub fn test() -> Self {
        StoreConfig {
            op_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.op_timeout.is_zero() {
            return Err("op_timeout_ms must be greater than zero".to_string());
        }
        match self.store_type {
            ObjectStoreType::InMemory => Ok(()),
            ObjectStoreType::LocalFs if self.local_path.is_none() => {
                Err("local_path is required for a localfs store".to_string())
            }
            ObjectStoreType::LocalFs => Ok(()),
            #[cfg(feature = "s3")]
            ObjectStoreType::S3 => match &self.s3 {
                Some(s3) if !s3.bucket.is_empty() => Ok(()),
                _ => Err("s3.bucket is required for an s3 store".to_string()),
            },
        }
    }
}

/// S3 configuration
#[cfg(feature = "s3")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// Key prefix within bucket
    #[serde(default)]
    pub prefix: String,
    /// AWS region
    pub region: String,
    /// Custom endpoint (for S3-compatible services like MinIO)
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Enable create-only puts; required for version claims
    #[serde(default = "default_true")]
    pub conditional_put: bool,
}

#[cfg(feature = "s3")]
fn default_true() -> bool {
    true
}

/// Artifact registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Key prefix for bundle blobs
    pub prefix: String,
    /// How many versions a publisher tries to claim before giving up
    pub max_claim_attempts: u32,
    /// zstd level for the bundle archive; needs the `compression` feature
    pub archive_zstd_level: Option<i32>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            prefix: "models".to_string(),
            max_claim_attempts: 5,
            archive_zstd_level: None,
        }
    }
}

/// Result ledger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Key prefix for ledger files (empty = bucket root)
    pub prefix: String,
    /// Number of single-writer tasks; a version always maps to the same one
    pub writer_shards: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            prefix: String::new(),
            writer_shards: 8,
        }
    }
}

impl LedgerConfig {
    pub fn test() -> Self {
        LedgerConfig {
            prefix: String::new(),
            writer_shards: 2,
        }
    }
}

/// Training pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Prefix scanned for the most recent dataset
    pub dataset_prefix: String,
    /// Label column
    pub target_column: String,
    /// Fraction of rows held out for accuracy
    pub test_fraction: f64,
    /// Shuffle seed for the train/test split
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            dataset_prefix: String::new(),
            target_column: "churn".to_string(),
            test_fraction: 0.2,
            seed: 1,
        }
    }
}

/// Inference HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Filter used when RUST_LOG is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            format: LogFormat::Text,
            filter: "info".to_string(),
        }
    }
}

/// Serde helper for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = VaultConfig::default();
        config.validate().unwrap();
        assert_eq!(config.registry.prefix, "models");
        assert_eq!(config.training.target_column, "churn");
        assert_eq!(config.artifacts.op_timeout, DEFAULT_STORE_TIMEOUT);
    }

    #[test]
    fn test_from_lookup_defaults_to_localfs_buckets() {
        let config = VaultConfig::from_lookup(lookup(&[("VAULT_DATA_ROOT", "/srv/vault")])).unwrap();

        assert_eq!(config.artifacts.store_type, ObjectStoreType::LocalFs);
        assert_eq!(
            config.artifacts.local_path,
            Some(PathBuf::from("/srv/vault/model-artifacts"))
        );
        assert_eq!(config.results.local_path, Some(PathBuf::from("/srv/vault/results")));
        assert_eq!(config.server.bind_addr, "0.0.0.0:8000");
    }

    #[test]
    fn test_from_lookup_reads_bucket_names_and_timeout() {
        let config = VaultConfig::from_lookup(lookup(&[
            ("VAULT_STORE_TYPE", "memory"),
            ("MODEL_ARTIFACTS_STORE", "model-artifacts-prod"),
            ("VAULT_STORE_TIMEOUT_MS", "1500"),
            ("VAULT_LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(config.artifacts.store_type, ObjectStoreType::InMemory);
        assert!(config
            .artifacts
            .local_path
            .as_ref()
            .unwrap()
            .ends_with("model-artifacts-prod"));
        assert_eq!(config.results.op_timeout, Duration::from_millis(1500));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[cfg(not(feature = "compression"))]
    #[test]
    fn test_archive_compression_needs_feature() {
        let err = VaultConfig::from_lookup(lookup(&[("VAULT_ARCHIVE_ZSTD_LEVEL", "3")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("compression")));
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_archive_compression_level_from_lookup() {
        let config = VaultConfig::from_lookup(lookup(&[("VAULT_ARCHIVE_ZSTD_LEVEL", "9")])).unwrap();
        assert_eq!(config.registry.archive_zstd_level, Some(9));

        let err = VaultConfig::from_lookup(lookup(&[("VAULT_ARCHIVE_ZSTD_LEVEL", "40")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_from_lookup_rejects_non_numeric_compression_level() {
        let err =
            VaultConfig::from_lookup(lookup(&[("VAULT_ARCHIVE_ZSTD_LEVEL", "fast")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("not a number")));
    }

    #[test]
    fn test_from_lookup_rejects_unknown_store_type() {
        let err = VaultConfig::from_lookup(lookup(&[("VAULT_STORE_TYPE", "ftp")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_from_toml_partial_document() {
        let config = VaultConfig::from_toml_str(
            r#"
            [artifacts]
            store_type = "localfs"
            local_path = "/tmp/artifacts"
            op_timeout_ms = 2000

            [registry]
            max_claim_attempts = 3

            [training]
            target_column = "label"
            "#,
        )
        .unwrap();

        assert_eq!(config.artifacts.store_type, ObjectStoreType::LocalFs);
        assert_eq!(config.artifacts.op_timeout, Duration::from_secs(2));
        assert_eq!(config.registry.max_claim_attempts, 3);
        assert_eq!(config.registry.prefix, "models");
        assert_eq!(config.training.target_column, "label");
        assert_eq!(config.datasets.store_type, ObjectStoreType::InMemory);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = VaultConfig::test();
        config.training.test_fraction = 1.0;
        assert!(config.validate().is_err());

        let mut config = VaultConfig::test();
        config.ledger.writer_shards = 0;
        assert!(config.validate().is_err());

        let mut config = VaultConfig::test();
        config.results.store_type = ObjectStoreType::LocalFs;
        config.results.local_path = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = VaultConfig::test();
        let text = toml::to_string(&config).unwrap();
        let parsed = VaultConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.results.op_timeout, config.results.op_timeout);
        assert_eq!(parsed.ledger.writer_shards, config.ledger.writer_shards);
    }
}
