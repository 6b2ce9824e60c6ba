use crate::balances::PriceOracle;
use crate::{LedgerError, Result};
use async_trait::async_trait;
use config_manager::KnownTokenConfig;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Validate an EVM address and return its lower-cased form.
///
/// All sets, price maps and store keys use this form so that addresses coming
/// from the subgraph (lower-case) and from user input (checksummed) compare equal.
pub fn normalize_address(address: &str) -> Result<String> {
    static ADDRESS_RE: OnceLock<Regex> = OnceLock::new();
    let re = ADDRESS_RE.get_or_init(|| {
        Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("address regex is valid")
    });

    let trimmed = address.trim();
    if !re.is_match(trimmed) {
        return Err(LedgerError::InvalidAddress(address.to_string()));
    }
    Ok(trimmed.to_lowercase())
}

/// Token the asset database knows about and the primary oracle can price
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KnownAsset {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

/// Token only seen on the venue; priced from the venue's daily feed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnknownAsset {
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

impl KnownAsset {
    /// Demote to an unknown asset, keeping its identity fields
    pub fn to_unknown(&self) -> UnknownAsset {
        UnknownAsset {
            address: self.address.clone(),
            symbol: self.symbol.clone(),
            name: self.name.clone(),
            decimals: self.decimals,
        }
    }
}

/// Resolved token identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Asset {
    Known(KnownAsset),
    Unknown(UnknownAsset),
}

impl Asset {
    pub fn address(&self) -> &str {
        match self {
            Asset::Known(asset) => &asset.address,
            Asset::Unknown(asset) => &asset.address,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Asset::Known(asset) => &asset.symbol,
            Asset::Unknown(asset) => &asset.symbol,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Asset::Known(asset) => &asset.name,
            Asset::Unknown(asset) => &asset.name,
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            Asset::Known(asset) => asset.decimals,
            Asset::Unknown(asset) => asset.decimals,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Asset::Known(_))
    }
}

/// Maps raw token metadata to an asset identity
pub trait AssetResolver: Send + Sync {
    fn resolve(&self, symbol: &str, address: &str, name: &str, decimals: u8) -> Asset;
}

/// Asset database built from the configured token list.
///
/// Doubles as the primary price oracle: tokens configured with a USD price are
/// priced, everything else returns zero ("no primary price source").
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    tokens: HashMap<String, KnownAsset>,
    prices: HashMap<String, Decimal>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from the `assets` configuration section
    pub fn from_config(tokens: &[KnownTokenConfig]) -> Result<Self> {
        let mut registry = Self::new();

        for token in tokens {
            let usd_price = match &token.usd_price {
                Some(raw) => Some(Decimal::from_str(raw).map_err(|e| {
                    LedgerError::Configuration(format!(
                        "Invalid usd_price '{}' for token {}: {}",
                        raw, token.symbol, e
                    ))
                })?),
                None => None,
            };

            registry.insert(
                KnownAsset {
                    address: normalize_address(&token.address)?,
                    symbol: token.symbol.clone(),
                    name: token.name.clone(),
                    decimals: token.decimals,
                },
                usd_price,
            );
        }

        debug!("Asset registry loaded with {} known tokens", registry.len());
        Ok(registry)
    }

    pub fn insert(&mut self, asset: KnownAsset, usd_price: Option<Decimal>) {
        if let Some(price) = usd_price {
            self.prices.insert(asset.address.clone(), price);
        }
        self.tokens.insert(asset.address.clone(), asset);
    }

    pub fn get(&self, address: &str) -> Option<&KnownAsset> {
        self.tokens.get(&address.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl AssetResolver for AssetRegistry {
    fn resolve(&self, symbol: &str, address: &str, name: &str, decimals: u8) -> Asset {
        let address = address.to_lowercase();
        match self.tokens.get(&address) {
            Some(known) => Asset::Known(known.clone()),
            None => Asset::Unknown(UnknownAsset {
                address,
                symbol: symbol.to_string(),
                name: name.to_string(),
                decimals,
            }),
        }
    }
}

#[async_trait]
impl PriceOracle for AssetRegistry {
    async fn usd_price(&self, asset: &KnownAsset) -> Result<Decimal> {
        match self.prices.get(&asset.address) {
            Some(price) => Ok(*price),
            None => {
                warn!("No primary USD price configured for {} ({})", asset.symbol, asset.address);
                Ok(Decimal::ZERO)
            }
        }
    }
}
