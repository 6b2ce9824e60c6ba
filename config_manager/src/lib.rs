pub mod settings;

pub use settings::{DbSettings, ModifiableSettings, SETTINGS_VERSION};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration loading error: {0}")]
    ConfigLoad(#[from] ConfigError),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
    #[error("Unknown setting: {0}")]
    UnknownSetting(String),
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;

/// Venues the subgraph section may name
const SUPPORTED_VENUES: &[&str] = &["uniswap", "uniswap-v2", "sushiswap", "sushi"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// General system settings
    pub system: SystemSettings,

    /// GraphQL subgraph the swaps and pool positions are read from
    pub subgraph: SubgraphConfig,

    /// Redis configuration
    pub redis: RedisConfig,

    /// Sync range bookkeeping
    pub sync: SyncConfig,

    /// Tokens the asset database knows about
    pub assets: Vec<KnownTokenConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSettings {
    /// Enable debug mode
    pub debug_mode: bool,

    /// Key under which the flat settings record is stored
    pub settings_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubgraphConfig {
    /// GraphQL endpoint URL
    pub url: String,

    /// Exchange served by the endpoint ("uniswap" or "sushiswap")
    pub venue: String,

    /// Records requested per page; 1000 is the largest `first` the subgraph accepts
    pub page_size: u32,

    /// Request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Disable to run without the subgraph (degraded mode)
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// When disabled, swaps, ranges and settings live in memory only
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Prefix of the per-address sync range keys; unset means `{venue}_trades`
    #[serde(default)]
    pub range_prefix: Option<String>,
}

/// A token of the asset database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownTokenConfig {
    /// Contract address (checksummed or lower-case)
    pub address: String,

    pub symbol: String,

    pub name: String,

    pub decimals: u8,

    /// USD price served by the primary oracle; unset means "no primary price"
    pub usd_price: Option<String>,
}

impl KnownTokenConfig {
    fn new(address: &str, symbol: &str, name: &str, decimals: u8, usd_price: Option<&str>) -> Self {
        Self {
            address: address.to_string(),
            symbol: symbol.to_string(),
            name: name.to_string(),
            decimals,
            usd_price: usd_price.map(|p| p.to_string()),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            system: SystemSettings {
                debug_mode: false,
                settings_key: "amm_ledger:settings".to_string(),
            },
            subgraph: SubgraphConfig {
                url: "https://api.thegraph.com/subgraphs/name/uniswap/uniswap-v2".to_string(),
                venue: "uniswap".to_string(),
                page_size: 1000,
                request_timeout_seconds: 30,
                enabled: true,
            },
            redis: RedisConfig {
                url: "redis://127.0.0.1:6379".to_string(),
                enabled: true,
            },
            sync: SyncConfig { range_prefix: None },
            assets: vec![
                KnownTokenConfig::new(
                    "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2",
                    "WETH",
                    "Wrapped Ether",
                    18,
                    None,
                ),
                KnownTokenConfig::new(
                    "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48",
                    "USDC",
                    "USD Coin",
                    6,
                    Some("1"),
                ),
                KnownTokenConfig::new(
                    "0x6B175474E89094C44Da98b954EedeAC495271d0F",
                    "DAI",
                    "Dai Stablecoin",
                    18,
                    Some("1"),
                ),
                KnownTokenConfig::new(
                    "0xdAC17F958D2ee523a2206206994597C13D831ec7",
                    "USDT",
                    "Tether USD",
                    6,
                    Some("1"),
                ),
            ],
        }
    }
}

impl SubgraphConfig {
    /// Validate subgraph configuration
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.url.trim().is_empty() {
            return Err(ConfigurationError::InvalidValue(
                "Subgraph URL is required when the subgraph is enabled".to_string(),
            ));
        }

        if !SUPPORTED_VENUES.contains(&self.venue.trim().to_lowercase().as_str()) {
            return Err(ConfigurationError::InvalidValue(format!(
                "Unsupported subgraph venue: '{}'",
                self.venue
            )));
        }

        if self.page_size == 0 || self.page_size > 1000 {
            return Err(ConfigurationError::InvalidValue(
                "Subgraph page size must be between 1 and 1000".to_string(),
            ));
        }

        if self.request_timeout_seconds == 0 {
            return Err(ConfigurationError::InvalidValue(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl SystemConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config_builder = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&SystemConfig::default())?);

        if config_path.as_ref().exists() {
            info!(
                "Loading configuration from: {}",
                config_path.as_ref().display()
            );
            config_builder = config_builder.add_source(File::from(config_path.as_ref()));
        } else {
            debug!("Config file not found, using defaults and environment variables");
        }

        // e.g. AMM__SUBGRAPH__URL, AMM__REDIS__ENABLED
        config_builder = config_builder.add_source(
            Environment::with_prefix("AMM")
                .try_parsing(true)
                .separator("__")
                .list_separator(","),
        );

        let system_config: SystemConfig = config_builder.build()?.try_deserialize()?;
        system_config.validate()?;

        Ok(system_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.subgraph.validate()?;

        if self.redis.enabled && self.redis.url.trim().is_empty() {
            return Err(ConfigurationError::InvalidValue(
                "Redis URL is required when Redis is enabled".to_string(),
            ));
        }

        if matches!(&self.sync.range_prefix, Some(prefix) if prefix.trim().is_empty()) {
            return Err(ConfigurationError::InvalidValue(
                "Sync range prefix cannot be empty".to_string(),
            ));
        }

        for token in &self.assets {
            if token.symbol.trim().is_empty() {
                return Err(ConfigurationError::InvalidValue(format!(
                    "Asset {} has an empty symbol",
                    token.address
                )));
            }
        }

        Ok(())
    }

    /// Get configuration as a JSON value
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = SystemConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.subgraph.page_size, 1000);
        assert!(config.sync.range_prefix.is_none());
        assert!(config.assets.iter().any(|a| a.symbol == "WETH" && a.usd_price.is_none()));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = SystemConfig::default();
        config.subgraph.venue = "curve".to_string();
        assert!(matches!(config.validate(), Err(ConfigurationError::InvalidValue(_))));

        let mut config = SystemConfig::default();
        config.subgraph.page_size = 5000;
        assert!(config.validate().is_err());

        let mut config = SystemConfig::default();
        config.subgraph.enabled = false;
        config.subgraph.url = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("amm_ledger_config_{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[subgraph]
venue = "sushiswap"
page_size = 250

[sync]
range_prefix = "sushi_ranges"
"#
        )
        .unwrap();

        let config = SystemConfig::load_from_path(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.subgraph.venue, "sushiswap");
        assert_eq!(config.subgraph.page_size, 250);
        assert_eq!(config.sync.range_prefix.as_deref(), Some("sushi_ranges"));
        // Untouched sections keep their defaults
        assert_eq!(config.redis.url, "redis://127.0.0.1:6379");
    }

    #[test]
    fn test_blank_range_prefix_is_rejected() {
        let mut config = SystemConfig::default();
        config.sync.range_prefix = Some(" ".to_string());
        assert!(matches!(config.validate(), Err(ConfigurationError::InvalidValue(_))));
    }
}
