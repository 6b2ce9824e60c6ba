use crate::error::SubgraphError;
use ledger_core::{
    normalize_address, AssetResolver, Asset, Balance, LedgerError, LiquidityPool,
    LiquidityPoolAsset, Result, Swap, Timestamp, Venue,
};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

fn field<'a>(record: &'a Value, path: &str) -> Result<&'a Value> {
    record
        .pointer(path)
        .ok_or_else(|| SubgraphError::parse(format!("Missing field {}", path)).into())
}

fn str_field<'a>(record: &'a Value, path: &str) -> Result<&'a str> {
    field(record, path)?
        .as_str()
        .ok_or_else(|| SubgraphError::parse(format!("Field {} is not a string", path)).into())
}

/// Subgraph integers arrive as strings (BigInt) or plain numbers
fn u64_field(record: &Value, path: &str) -> Result<u64> {
    let parsed = match field(record, path)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| SubgraphError::parse(format!("Field {} is not an unsigned integer", path)).into())
}

/// Subgraph decimals arrive as strings (BigDecimal) or plain numbers
fn decimal_field(record: &Value, path: &str) -> Result<Decimal> {
    let parsed = match field(record, path)? {
        Value::String(s) => Decimal::from_str(s.trim())
            .or_else(|_| Decimal::from_scientific(s.trim()))
            .ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        _ => None,
    };

    parsed.ok_or_else(|| SubgraphError::parse(format!("Field {} is not a decimal", path)).into())
}

fn address_field(record: &Value, path: &str) -> Result<String> {
    normalize_address(str_field(record, path)?)
}

fn token_field(record: &Value, path: &str, resolver: &dyn AssetResolver) -> Result<Asset> {
    let token = field(record, path)?;
    let decimals = u64_field(token, "/decimals")?;
    let decimals = u8::try_from(decimals)
        .map_err(|_| SubgraphError::parse(format!("Token decimals out of range: {}", decimals)))?;

    Ok(resolver.resolve(
        str_field(token, "/symbol")?,
        &address_field(token, "/id")?,
        str_field(token, "/name")?,
        decimals,
    ))
}

/// Parse every swap of the transaction a `swaps` record belongs to.
///
/// `address` is the account the swaps were fetched for.
pub fn parse_transaction_swaps(
    record: &Value,
    address: &str,
    venue: Venue,
    resolver: &dyn AssetResolver,
) -> Result<Vec<Swap>> {
    let swaps = field(record, "/transaction/swaps")?
        .as_array()
        .ok_or_else(|| SubgraphError::parse("Field transaction.swaps is not a list"))?;

    swaps
        .iter()
        .map(|swap| parse_swap(swap, address, venue, resolver))
        .collect()
}

/// Parse one swap entity; its id has the form `{tx_hash}-{index}`
pub fn parse_swap(
    swap: &Value,
    address: &str,
    venue: Venue,
    resolver: &dyn AssetResolver,
) -> Result<Swap> {
    let id = str_field(swap, "/id")?;
    let tx_hash = id
        .split('-')
        .next()
        .filter(|hash| !hash.is_empty())
        .ok_or_else(|| SubgraphError::parse(format!("Malformed swap id: {}", id)))?
        .to_lowercase();

    let log_index = u64_field(swap, "/logIndex")?;
    let log_index = u32::try_from(log_index)
        .map_err(|_| SubgraphError::parse(format!("Log index out of range: {}", log_index)))?;

    let timestamp: Timestamp = u64_field(swap, "/timestamp")?;

    Ok(Swap {
        tx_hash,
        log_index,
        address: address.to_string(),
        pool_address: address_field(swap, "/pair/id")?,
        from_address: str_field(swap, "/sender")?.to_lowercase(),
        to_address: str_field(swap, "/to")?.to_lowercase(),
        timestamp,
        venue,
        token0: token_field(swap, "/pair/token0", resolver)?,
        token1: token_field(swap, "/pair/token1", resolver)?,
        amount0_in: decimal_field(swap, "/amount0In")?,
        amount1_in: decimal_field(swap, "/amount1In")?,
        amount0_out: decimal_field(swap, "/amount0Out")?,
        amount1_out: decimal_field(swap, "/amount1Out")?,
    })
}

/// Parse a `liquidityPositions` record into the holder's address and pool.
///
/// The holder's share of each reserve is `balance / total_supply * reserve`.
pub fn parse_liquidity_position(
    record: &Value,
    resolver: &dyn AssetResolver,
) -> Result<(String, LiquidityPool)> {
    let user_address = address_field(record, "/user/id")?;
    let user_lp_balance = decimal_field(record, "/liquidityTokenBalance")?;
    let pool_address = address_field(record, "/pair/id")?;
    let total_supply = decimal_field(record, "/pair/totalSupply")?;

    let share = if total_supply.is_zero() {
        if !user_lp_balance.is_zero() {
            return Err(LedgerError::DataIntegrity(format!(
                "Pool {} has zero total supply but {} holds {}",
                pool_address, user_address, user_lp_balance
            )));
        }
        Decimal::ZERO
    } else {
        user_lp_balance.checked_div(total_supply).ok_or_else(|| {
            LedgerError::DataIntegrity(format!(
                "Cannot compute pool share in {}: {} / {}",
                pool_address, user_lp_balance, total_supply
            ))
        })?
    };

    let mut assets = Vec::with_capacity(2);
    for (token_path, reserve_path) in [("/pair/token0", "/pair/reserve0"), ("/pair/token1", "/pair/reserve1")] {
        let asset = token_field(record, token_path, resolver)?;
        let reserve = decimal_field(record, reserve_path)?;
        let user_amount = share.checked_mul(reserve).ok_or_else(|| {
            LedgerError::DataIntegrity(format!(
                "Pool share overflow in {} for {}",
                pool_address,
                asset.symbol()
            ))
        })?;
        assets.push(LiquidityPoolAsset::new(asset, reserve, user_amount));
    }

    Ok((
        user_address,
        LiquidityPool {
            address: pool_address,
            assets,
            total_supply,
            user_balance: Balance::new(user_lp_balance),
        },
    ))
}

/// Parse a `tokenDayDatas` record into the token address and its USD price
pub fn parse_token_day_price(record: &Value) -> Result<(String, Decimal)> {
    Ok((
        address_field(record, "/token/id")?,
        decimal_field(record, "/priceUSD")?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::AssetRegistry;
    use rust_decimal_macros::dec;
    use serde_json::json;

    const USER: &str = "0xdddddddddddddddddddddddddddddddddddddddd";
    const PAIR: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

    fn token(id: &str, symbol: &str, decimals: Value) -> Value {
        json!({ "id": id, "symbol": symbol, "name": symbol, "decimals": decimals })
    }

    fn position(balance: &str, total_supply: &str) -> Value {
        json!({
            "id": format!("{}-{}", PAIR, USER),
            "liquidityTokenBalance": balance,
            "pair": {
                "id": PAIR,
                "reserve0": "1000",
                "reserve1": "50",
                "totalSupply": total_supply,
                "token0": token("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "AAA", json!("18")),
                "token1": token("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb", "BBB", json!(6)),
            },
            "user": { "id": USER },
        })
    }

    #[test]
    fn test_parse_swap_record() {
        let record = json!({
            "transaction": {
                "swaps": [{
                    "id": "0xABC123-0",
                    "logIndex": "17",
                    "sender": "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D",
                    "to": USER,
                    "timestamp": "1600000000",
                    "pair": {
                        "id": PAIR,
                        "token0": token("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "AAA", json!("18")),
                        "token1": token("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb", "BBB", json!("6")),
                    },
                    "amount0In": "1.5",
                    "amount1In": "0",
                    "amount0Out": "0",
                    "amount1Out": "2999.123456",
                }]
            }
        });

        let swaps = parse_transaction_swaps(&record, USER, Venue::Uniswap, &AssetRegistry::new()).unwrap();

        assert_eq!(swaps.len(), 1);
        let swap = &swaps[0];
        assert_eq!(swap.tx_hash, "0xabc123");
        assert_eq!(swap.log_index, 17);
        assert_eq!(swap.timestamp, 1_600_000_000);
        assert_eq!(swap.pool_address, PAIR);
        assert_eq!(swap.from_address, "0x7a250d5630b4cf539739df2c5dacb4c659f2488d");
        assert_eq!(swap.token1.decimals(), 6);
        assert!(!swap.token0.is_known());
        assert_eq!(swap.amount0_in, dec!(1.5));
        assert_eq!(swap.amount1_out, dec!(2999.123456));
    }

    #[test]
    fn test_parse_swap_rejects_missing_amount() {
        let record = json!({ "transaction": { "swaps": [{ "id": "0x01-0" }] } });
        let result = parse_transaction_swaps(&record, USER, Venue::Uniswap, &AssetRegistry::new());
        assert!(matches!(result, Err(LedgerError::Transport(_))));
    }

    #[test]
    fn test_parse_liquidity_position_share() {
        let (user, pool) = parse_liquidity_position(&position("10", "100"), &AssetRegistry::new()).unwrap();

        assert_eq!(user, USER);
        assert_eq!(pool.address, PAIR);
        assert_eq!(pool.user_balance.amount, dec!(10));
        assert_eq!(pool.assets[0].total_amount, dec!(1000));
        assert_eq!(pool.assets[0].user_balance.amount, dec!(100));
        assert_eq!(pool.assets[1].user_balance.amount, dec!(5));
        assert_eq!(pool.assets[1].usd_price, Decimal::ZERO);
    }

    #[test]
    fn test_zero_total_supply() {
        let result = parse_liquidity_position(&position("1", "0"), &AssetRegistry::new());
        assert!(matches!(result, Err(LedgerError::DataIntegrity(_))));

        let (_, pool) = parse_liquidity_position(&position("0", "0"), &AssetRegistry::new()).unwrap();
        assert!(pool.assets.iter().all(|a| a.user_balance.amount.is_zero()));
    }

    #[test]
    fn test_parse_token_day_price() {
        let record = json!({
            "date": 1600000000,
            "token": { "id": "0xBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB" },
            "priceUSD": "0.0421",
        });

        let (address, price) = parse_token_day_price(&record).unwrap();
        assert_eq!(address, "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
        assert_eq!(price, dec!(0.0421));
    }
}
