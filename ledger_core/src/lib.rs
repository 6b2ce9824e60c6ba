pub mod assets;
pub mod balances;
pub mod swaps;
pub mod sync_range;
pub mod timeframe;
pub mod trades;

// Re-export the data model and the collaborator traits
pub use assets::{normalize_address, Asset, AssetRegistry, AssetResolver, KnownAsset, UnknownAsset};
pub use balances::{
    price_known_assets, reconcile_balances, AddressBalances, AssetPrices, Balance,
    ChainBalanceReader, LiquidityPool, LiquidityPoolAsset, PriceOracle, ProtocolBalance,
};
pub use swaps::{group_swaps_by_transaction, Swap, SwapIdentity, SwapStore};
pub use sync_range::{RangePartition, RangeStore, SyncRange, SyncRangeTracker};
pub use trades::{swaps_to_trades, tx_swaps_to_trades, Trade, TradeType};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Price fetching error: {0}")]
    PriceFetch(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Timeframe parsing error: {0}")]
    TimeframeParse(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Unix timestamp in seconds
pub type Timestamp = u64;

/// Exchange whose subgraph the swaps were read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Uniswap,
    Sushiswap,
}

impl Default for Venue {
    fn default() -> Self {
        Venue::Uniswap
    }
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Uniswap => "uniswap",
            Venue::Sushiswap => "sushiswap",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "uniswap" | "uniswap-v2" => Ok(Venue::Uniswap),
            "sushiswap" | "sushi" => Ok(Venue::Sushiswap),
            other => Err(LedgerError::Configuration(format!("Unsupported venue: '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_parsing() {
        assert_eq!("Uniswap".parse::<Venue>().unwrap(), Venue::Uniswap);
        assert_eq!("sushi".parse::<Venue>().unwrap(), Venue::Sushiswap);
        assert!("curve".parse::<Venue>().is_err());
        assert_eq!(Venue::default().to_string(), "uniswap");
    }
}
