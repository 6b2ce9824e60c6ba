use crate::client::{ParamTypes, ParamValues, QuerySource};
use crate::pagination::{paginate, PagedQuery, GRAPH_QUERY_LIMIT};
use crate::parser::{parse_liquidity_position, parse_token_day_price, parse_transaction_swaps};
use ledger_core::{
    AddressBalances, AssetPrices, AssetResolver, ProtocolBalance, Result, Swap, Timestamp, Venue,
};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub const LIQUIDITY_POSITIONS_QUERY: &str = r#"
liquidityPositions(
    first: $limit,
    skip: $offset,
    where: {
        user_in: $addresses,
        liquidityTokenBalance_gt: $balance,
    }
) {
    id
    liquidityTokenBalance
    pair {
        id
        reserve0
        reserve1
        token0 {
            id
            decimals
            name
            symbol
        }
        token1 {
            id
            decimals
            name
            symbol
        }
        totalSupply
    }
    user {
        id
    }
}
"#;

pub const TOKEN_DAY_DATAS_QUERY: &str = r#"
tokenDayDatas(
    first: $limit,
    skip: $offset,
    where: {
        token_in: $token_ids,
        date: $datetime,
    }
) {
    date
    token {
        id
    }
    priceUSD
}
"#;

pub const SWAPS_QUERY: &str = r#"
swaps(
    first: $limit,
    skip: $offset,
    where: {
        to: $address,
        timestamp_gte: $start_ts,
        timestamp_lte: $end_ts,
    }
) {
    transaction {
        swaps {
            id
            logIndex
            sender
            to
            timestamp
            pair {
                id
                token0 {
                    id
                    decimals
                    name
                    symbol
                }
                token1 {
                    id
                    decimals
                    name
                    symbol
                }
            }
            amount0In
            amount0Out
            amount1In
            amount1Out
        }
    }
}
"#;

fn param_types(pairs: &[(&str, &str)]) -> ParamTypes {
    pairs
        .iter()
        .map(|(name, kind)| (name.to_string(), kind.to_string()))
        .collect()
}

/// The three paginated queries of one venue's subgraph
#[derive(Clone)]
pub struct VenueSubgraph {
    source: Arc<dyn QuerySource>,
    venue: Venue,
    page_size: u32,
}

impl VenueSubgraph {
    /// `page_size` is clamped to what the subgraph accepts
    pub fn new(source: Arc<dyn QuerySource>, venue: Venue, page_size: u32) -> Self {
        Self {
            source,
            venue,
            page_size: page_size.clamp(1, GRAPH_QUERY_LIMIT),
        }
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    /// Pool positions with a positive balance held by `addresses`
    pub async fn liquidity_positions(
        &self,
        addresses: &[String],
        resolver: &dyn AssetResolver,
    ) -> Result<ProtocolBalance> {
        let mut param_values = ParamValues::new();
        param_values.insert("addresses".to_string(), Value::from(addresses.to_vec()));
        param_values.insert("balance".to_string(), Value::from("0"));

        let query = PagedQuery {
            querystr: LIQUIDITY_POSITIONS_QUERY,
            result_key: "liquidityPositions",
            param_types: param_types(&[("$addresses", "[String!]"), ("$balance", "BigDecimal!")]),
            param_values,
        };

        let records = paginate(self.source.as_ref(), &query, self.page_size).await?;

        let mut address_balances = AddressBalances::new();
        for record in &records {
            let (user, pool) = parse_liquidity_position(record, resolver)?;
            address_balances.entry(user).or_default().push(pool);
        }

        Ok(ProtocolBalance::from_pools(address_balances))
    }

    /// Every swap of every transaction that sent an output to `address`
    /// within `[start_ts, end_ts]`, without duplicates
    pub async fn swaps(
        &self,
        address: &str,
        start_ts: Timestamp,
        end_ts: Timestamp,
        resolver: &dyn AssetResolver,
    ) -> Result<Vec<Swap>> {
        let mut param_values = ParamValues::new();
        param_values.insert("address".to_string(), Value::from(address));
        param_values.insert("start_ts".to_string(), Value::from(start_ts.to_string()));
        param_values.insert("end_ts".to_string(), Value::from(end_ts.to_string()));

        let query = PagedQuery {
            querystr: SWAPS_QUERY,
            result_key: "swaps",
            param_types: param_types(&[
                ("$address", "Bytes!"),
                ("$start_ts", "BigInt!"),
                ("$end_ts", "BigInt!"),
            ]),
            param_values,
        };

        let records = paginate(self.source.as_ref(), &query, self.page_size).await?;

        let mut seen = HashSet::new();
        let mut swaps = Vec::new();
        for record in &records {
            for swap in parse_transaction_swaps(record, address, self.venue, resolver)? {
                if seen.insert(swap.identity()) {
                    swaps.push(swap);
                }
            }
        }

        debug!(
            "{} swaps for {} in [{}, {}] on {}",
            swaps.len(),
            address,
            start_ts,
            end_ts,
            self.venue
        );
        Ok(swaps)
    }

    /// USD prices of `token_addresses` as of `day_ts` (midnight UTC)
    pub async fn token_day_prices(
        &self,
        token_addresses: &[String],
        day_ts: Timestamp,
    ) -> Result<AssetPrices> {
        if token_addresses.is_empty() {
            return Ok(AssetPrices::new());
        }

        let mut param_values = ParamValues::new();
        param_values.insert("token_ids".to_string(), Value::from(token_addresses.to_vec()));
        param_values.insert("datetime".to_string(), Value::from(day_ts));

        let query = PagedQuery {
            querystr: TOKEN_DAY_DATAS_QUERY,
            result_key: "tokenDayDatas",
            param_types: param_types(&[("$token_ids", "[String!]"), ("$datetime", "Int!")]),
            param_values,
        };

        let records = paginate(self.source.as_ref(), &query, self.page_size).await?;

        records.iter().map(parse_token_day_price).collect()
    }
}
