use crate::assets::Asset;
use crate::swaps::{group_swaps_by_transaction, Swap};
use crate::{LedgerError, Result, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeType {
    Buy,
    Sell,
}

/// A single-base/single-quote trade derived from one transaction's swaps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_type: TradeType,

    /// Asset acquired
    pub base_asset: Asset,

    /// Asset given up
    pub quote_asset: Asset,

    /// Amount of base asset acquired
    pub amount: Decimal,

    /// Units of base acquired per unit of quote given up (bought / sold)
    pub rate: Decimal,

    /// Every swap of the originating transaction, in processing order
    pub swaps: Vec<Swap>,

    /// Position among the trades derived from the same transaction
    pub trade_index: u32,
}

impl Trade {
    pub fn tx_hash(&self) -> &str {
        self.swaps.first().map(|s| s.tx_hash.as_str()).unwrap_or_default()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.swaps.first().map(|s| s.timestamp).unwrap_or_default()
    }

    /// Unique per transaction and index
    pub fn identifier(&self) -> String {
        format!("{}-{}", self.tx_hash(), self.trade_index)
    }

    /// Amount of quote asset given up for this trade
    pub fn sold_amount(&self) -> Option<Decimal> {
        self.amount.checked_div(self.rate)
    }
}

/// One side of a trade: an asset and the amount that moved
#[derive(Debug, Clone)]
struct Leg {
    asset: Asset,
    amount: Decimal,
}

fn halve(amount: Decimal) -> Decimal {
    amount / Decimal::TWO
}

/// Turn one transaction's swaps into trades.
///
/// Only the first and last swaps matter: the first tells what was given up,
/// the last what was acquired. When both tokens go in (or both come out) the
/// amounts are split in half across synthesized trades so every trade keeps a
/// single base and a single quote asset. With more than two swaps between the
/// boundaries the split does not conserve value exactly.
pub fn tx_swaps_to_trades(swaps: &[Swap]) -> Result<Vec<Trade>> {
    let (first, last) = match (swaps.first(), swaps.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => {
            return Err(LedgerError::DataIntegrity(
                "Cannot derive trades from an empty swap group".to_string(),
            ))
        }
    };

    let both_in = first.amount0_in > Decimal::ZERO && first.amount1_in > Decimal::ZERO;
    let both_out = last.amount0_out > Decimal::ZERO && last.amount1_out > Decimal::ZERO;

    let quote_legs = if both_in {
        let split = |amount: Decimal| if both_out { halve(amount) } else { amount };
        vec![
            Leg { asset: first.token0.clone(), amount: split(first.amount0_in) },
            Leg { asset: first.token1.clone(), amount: split(first.amount1_in) },
        ]
    } else if first.amount0_in > Decimal::ZERO {
        vec![Leg { asset: first.token0.clone(), amount: first.amount0_in }]
    } else {
        vec![Leg { asset: first.token1.clone(), amount: first.amount1_in }]
    };

    if let Some(leg) = quote_legs.iter().find(|leg| leg.amount <= Decimal::ZERO) {
        return Err(LedgerError::DataIntegrity(format!(
            "Transaction {} has a zero inbound amount for quote asset {}",
            first.tx_hash,
            leg.asset.symbol()
        )));
    }

    let mut base_legs = Vec::with_capacity(2);
    if last.amount0_out > Decimal::ZERO {
        base_legs.push(Leg { asset: last.token0.clone(), amount: last.amount0_out });
    }
    if last.amount1_out > Decimal::ZERO {
        base_legs.push(Leg { asset: last.token1.clone(), amount: last.amount1_out });
    }

    let mut trades = Vec::with_capacity(base_legs.len() * quote_legs.len());
    let mut trade_index = 0u32;

    for base in &base_legs {
        let bought_amount = if both_in { halve(base.amount) } else { base.amount };

        for quote in &quote_legs {
            let rate = bought_amount.checked_div(quote.amount).ok_or_else(|| {
                LedgerError::DataIntegrity(format!(
                    "Cannot compute rate in transaction {}: {} / {}",
                    first.tx_hash, bought_amount, quote.amount
                ))
            })?;

            trades.push(Trade {
                trade_type: TradeType::Buy,
                base_asset: base.asset.clone(),
                quote_asset: quote.asset.clone(),
                amount: bought_amount,
                rate,
                swaps: swaps.to_vec(),
                trade_index,
            });
            trade_index += 1;
        }
    }

    if trades.is_empty() {
        debug!("Transaction {} has no outbound amount on its last swap", first.tx_hash);
    }

    Ok(trades)
}

/// Group swaps per transaction and derive the trades of every group
pub fn swaps_to_trades(swaps: Vec<Swap>) -> Result<Vec<Trade>> {
    let mut trades = Vec::new();

    for group in group_swaps_by_transaction(swaps) {
        trades.extend(tx_swaps_to_trades(&group)?);
    }

    Ok(trades)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swaps::test_support::{swap, token, TOKEN_A, TOKEN_B};

    const TOKEN_C: &str = "0xffffffffffffffffffffffffffffffffffffffff";
    use rust_decimal_macros::dec;

    fn trade_summary(trades: &[Trade]) -> Vec<(String, String, Decimal, Decimal, u32)> {
        trades
            .iter()
            .map(|t| {
                (
                    t.base_asset.address().to_string(),
                    t.quote_asset.address().to_string(),
                    t.amount,
                    t.rate,
                    t.trade_index,
                )
            })
            .collect()
    }

    #[test]
    fn test_single_sided_swap_yields_one_trade() {
        let mut s = swap("0x01", 100, 0);
        s.amount0_in = dec!(100);
        s.amount1_out = dec!(40);

        let trades = tx_swaps_to_trades(&[s]).unwrap();

        assert_eq!(trades.len(), 1);
        let trade = &trades[0];
        assert_eq!(trade.trade_type, TradeType::Buy);
        assert_eq!(trade.base_asset.address(), TOKEN_B);
        assert_eq!(trade.quote_asset.address(), TOKEN_A);
        assert_eq!(trade.amount, dec!(40));
        assert_eq!(trade.rate, dec!(0.4));
        assert_eq!(trade.sold_amount(), Some(dec!(100)));
        assert_eq!(trade.trade_index, 0);
        assert_eq!(trade.identifier(), "0x01-0");
    }

    #[test]
    fn test_both_in_both_out_split() {
        let mut s = swap("0x02", 100, 3);
        s.amount0_in = dec!(10);
        s.amount1_in = dec!(20);
        s.amount0_out = dec!(6);
        s.amount1_out = dec!(3);

        let trades = tx_swaps_to_trades(&[s]).unwrap();

        assert_eq!(
            trade_summary(&trades),
            vec![
                (TOKEN_A.to_string(), TOKEN_A.to_string(), dec!(3), dec!(0.6), 0),
                (TOKEN_A.to_string(), TOKEN_B.to_string(), dec!(3), dec!(0.3), 1),
                (TOKEN_B.to_string(), TOKEN_A.to_string(), dec!(1.5), dec!(0.3), 2),
                (TOKEN_B.to_string(), TOKEN_B.to_string(), dec!(1.5), dec!(0.15), 3),
            ]
        );
    }

    #[test]
    fn test_both_in_single_out_keeps_full_quote_amounts() {
        let mut s = swap("0x03", 100, 0);
        s.amount0_in = dec!(10);
        s.amount1_in = dec!(20);
        s.amount1_out = dec!(8);

        let trades = tx_swaps_to_trades(&[s]).unwrap();

        assert_eq!(trades.len(), 2);
        assert!(trades.iter().all(|t| t.amount == dec!(4)));
        assert_eq!(trades[0].rate, dec!(0.4));
        assert_eq!(trades[1].rate, dec!(0.2));
    }

    #[test]
    fn test_multi_hop_route_trades_first_input_for_last_output() {
        // A -> B on one pair at log 1, then B -> C on another at log 2
        let mut hop_one = swap("0x04", 100, 1);
        hop_one.amount0_in = dec!(100);
        hop_one.amount1_out = dec!(50);

        let mut hop_two = swap("0x04", 100, 2);
        hop_two.pool_address = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee".to_string();
        hop_two.token0 = hop_one.token1.clone();
        hop_two.token1 = token(TOKEN_C, "CCC");
        hop_two.amount0_in = dec!(50);
        hop_two.amount1_out = dec!(25);

        let trades = swaps_to_trades(vec![hop_two, hop_one]).unwrap();

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quote_asset.address(), TOKEN_A);
        assert_eq!(trades[0].base_asset.address(), TOKEN_C);
        assert_eq!(trades[0].amount, dec!(25));
        assert_eq!(trades[0].rate, dec!(0.25));
        assert_eq!(trades[0].swaps.len(), 2);
        assert_eq!(trades[0].swaps[0].log_index, 1);
        assert_eq!(trades[0].swaps[1].log_index, 2);
    }

    #[test]
    fn test_round_trip_route_keeps_the_same_asset() {
        // A -> B -> A through one pair
        let mut leg_one = swap("0x07", 100, 2);
        leg_one.amount0_in = dec!(50);
        leg_one.amount1_out = dec!(25);

        let mut leg_two = swap("0x07", 100, 5);
        leg_two.amount1_in = dec!(25);
        leg_two.amount0_out = dec!(49);

        let trades = swaps_to_trades(vec![leg_two, leg_one]).unwrap();

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quote_asset.address(), TOKEN_A);
        assert_eq!(trades[0].base_asset.address(), TOKEN_A);
        assert_eq!(trades[0].amount, dec!(49));
        assert_eq!(trades[0].rate, dec!(0.98));
    }

    #[test]
    fn test_zero_quote_leg_is_a_data_integrity_error() {
        let mut s = swap("0x05", 100, 0);
        s.amount1_out = dec!(1);

        let result = tx_swaps_to_trades(&[s]);
        assert!(matches!(result, Err(LedgerError::DataIntegrity(_))));
    }

    #[test]
    fn test_empty_group_is_rejected() {
        assert!(matches!(tx_swaps_to_trades(&[]), Err(LedgerError::DataIntegrity(_))));
    }

    #[test]
    fn test_no_outbound_amount_yields_no_trades() {
        let mut s = swap("0x06", 100, 0);
        s.amount0_in = dec!(1);

        assert!(tx_swaps_to_trades(&[s]).unwrap().is_empty());
    }

    #[test]
    fn test_swaps_to_trades_orders_transactions_most_recent_first() {
        let mut older = swap("0xold", 10, 0);
        older.amount0_in = dec!(1);
        older.amount1_out = dec!(2);

        let mut newer = swap("0xnew", 20, 0);
        newer.amount1_in = dec!(3);
        newer.amount0_out = dec!(6);

        let trades = swaps_to_trades(vec![older, newer]).unwrap();

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].tx_hash(), "0xnew");
        assert_eq!(trades[0].rate, dec!(2));
        assert_eq!(trades[1].tx_hash(), "0xold");
        assert_eq!(trades[1].timestamp(), 10);
        // Indices restart per transaction
        assert!(trades.iter().all(|t| t.trade_index == 0));
    }
}
