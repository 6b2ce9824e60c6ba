use crate::assets::{Asset, KnownAsset, UnknownAsset};
use crate::{LedgerError, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// USD price per asset address
pub type AssetPrices = HashMap<String, Decimal>;

/// Pools held per account address
pub type AddressBalances = HashMap<String, Vec<LiquidityPool>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub amount: Decimal,
    pub usd_value: Decimal,
}

impl Balance {
    pub fn new(amount: Decimal) -> Self {
        Self {
            amount,
            usd_value: Decimal::ZERO,
        }
    }
}

/// One underlying token of a pool position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPoolAsset {
    pub asset: Asset,

    /// Pool reserve of this token
    pub total_amount: Decimal,

    /// The account's share of the reserve
    pub user_balance: Balance,

    pub usd_price: Decimal,
}

impl LiquidityPoolAsset {
    pub fn new(asset: Asset, total_amount: Decimal, user_amount: Decimal) -> Self {
        Self {
            asset,
            total_amount,
            user_balance: Balance::new(user_amount),
            usd_price: Decimal::ZERO,
        }
    }
}

/// An account's position in one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPool {
    pub address: String,
    pub assets: Vec<LiquidityPoolAsset>,
    pub total_supply: Decimal,

    /// Pool tokens held; `usd_value` is the sum of the assets' USD values
    pub user_balance: Balance,
}

/// Pool positions of a set of accounts plus their assets split by price source
#[derive(Debug, Clone, Default)]
pub struct ProtocolBalance {
    pub address_balances: AddressBalances,
    pub known_assets: HashSet<KnownAsset>,
    pub unknown_assets: HashSet<UnknownAsset>,
}

impl ProtocolBalance {
    /// Build from pools, classifying every pool asset by its resolved variant
    pub fn from_pools(address_balances: AddressBalances) -> Self {
        let mut known_assets = HashSet::new();
        let mut unknown_assets = HashSet::new();

        for pool in address_balances.values().flatten() {
            for pool_asset in &pool.assets {
                match &pool_asset.asset {
                    Asset::Known(asset) => {
                        known_assets.insert(asset.clone());
                    }
                    Asset::Unknown(asset) => {
                        unknown_assets.insert(asset.clone());
                    }
                }
            }
        }

        Self {
            address_balances,
            known_assets,
            unknown_assets,
        }
    }

    /// Addresses of the assets the venue price feed has to be asked for
    pub fn unknown_asset_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> =
            self.unknown_assets.iter().map(|a| a.address.clone()).collect();
        addresses.sort();
        addresses
    }
}

/// Primary USD price source; zero means "no price for this asset"
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn usd_price(&self, asset: &KnownAsset) -> Result<Decimal>;
}

/// On-chain reader of pool token balances, used when the subgraph is unavailable
#[async_trait]
pub trait ChainBalanceReader: Send + Sync {
    async fn pool_balances(&self, address: &str) -> Result<Vec<LiquidityPool>>;
}

/// Query the primary oracle for every known asset.
///
/// Assets the oracle prices at exactly zero move to the unknown set so the
/// venue feed is asked for them instead. Each asset ends up in one set only.
pub async fn price_known_assets(
    balance: ProtocolBalance,
    oracle: &dyn PriceOracle,
) -> Result<(AssetPrices, ProtocolBalance)> {
    let ProtocolBalance {
        address_balances,
        known_assets,
        mut unknown_assets,
    } = balance;

    let mut prices = AssetPrices::new();
    let mut still_known = HashSet::with_capacity(known_assets.len());

    for asset in known_assets {
        let usd_price = oracle.usd_price(&asset).await?;

        if usd_price != Decimal::ZERO {
            prices.insert(asset.address.clone(), usd_price);
            still_known.insert(asset);
        } else {
            debug!("Primary oracle has no price for {}, using venue feed", asset.symbol);
            unknown_assets.insert(asset.to_unknown());
        }
    }

    info!(
        "Priced {} known assets, {} assets left for the venue feed",
        prices.len(),
        unknown_assets.len()
    );

    Ok((
        prices,
        ProtocolBalance {
            address_balances,
            known_assets: still_known,
            unknown_assets,
        },
    ))
}

/// Produce a priced copy of the pool snapshot.
///
/// Each asset takes its primary price, else its venue price, else keeps zero.
/// The pool's USD value is the sum of its assets' USD values. A value that
/// does not fit in a `Decimal` is a `DataIntegrity` error.
pub fn reconcile_balances(
    address_balances: &AddressBalances,
    known_prices: &AssetPrices,
    unknown_prices: &AssetPrices,
) -> Result<AddressBalances> {
    address_balances
        .iter()
        .map(|(address, pools)| {
            let priced = pools
                .iter()
                .map(|pool| price_pool(pool, known_prices, unknown_prices))
                .collect::<Result<Vec<_>>>()?;
            Ok((address.clone(), priced))
        })
        .collect()
}

fn price_pool(
    pool: &LiquidityPool,
    known_prices: &AssetPrices,
    unknown_prices: &AssetPrices,
) -> Result<LiquidityPool> {
    let mut total_usd_value = Decimal::ZERO;
    let mut assets = Vec::with_capacity(pool.assets.len());

    for pool_asset in &pool.assets {
        let address = pool_asset.asset.address();
        let usd_price = known_prices
            .get(address)
            .or_else(|| unknown_prices.get(address))
            .copied()
            .unwrap_or(Decimal::ZERO);

        let mut priced = pool_asset.clone();
        if usd_price != Decimal::ZERO {
            priced.usd_price = usd_price;
            priced.user_balance.usd_value = priced
                .user_balance
                .amount
                .checked_mul(usd_price)
                .ok_or_else(|| {
                    LedgerError::DataIntegrity(format!(
                        "USD value of {} {} at {} overflows in pool {}",
                        priced.user_balance.amount, address, usd_price, pool.address
                    ))
                })?;
        }
        total_usd_value = total_usd_value
            .checked_add(priced.user_balance.usd_value)
            .ok_or_else(|| {
                LedgerError::DataIntegrity(format!("USD value of pool {} overflows", pool.address))
            })?;
        assets.push(priced);
    }

    Ok(LiquidityPool {
        address: pool.address.clone(),
        assets,
        total_supply: pool.total_supply,
        user_balance: Balance {
            amount: pool.user_balance.amount,
            usd_value: total_usd_value,
        },
    })
}
