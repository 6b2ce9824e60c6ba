use crate::assets::Asset;
use crate::{Result, Timestamp, Venue};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// One swap event of an AMM pair, as emitted on-chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Swap {
    /// Transaction hash
    pub tx_hash: String,

    /// Log index of the swap event within its block
    pub log_index: u32,

    /// Account the swap was fetched for
    pub address: String,

    /// Pair contract that emitted the event
    pub pool_address: String,

    /// `sender` of the swap event (usually a router)
    pub from_address: String,

    /// `to` of the swap event (the recipient of the outbound amounts)
    pub to_address: String,

    pub timestamp: Timestamp,

    pub venue: Venue,

    pub token0: Asset,
    pub token1: Asset,

    pub amount0_in: Decimal,
    pub amount1_in: Decimal,
    pub amount0_out: Decimal,
    pub amount1_out: Decimal,
}

/// Deduplication key of a swap
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SwapIdentity {
    pub tx_hash: String,
    pub log_index: u32,
    pub pool_address: String,
}

impl Swap {
    pub fn identity(&self) -> SwapIdentity {
        SwapIdentity {
            tx_hash: self.tx_hash.clone(),
            log_index: self.log_index,
            pool_address: self.pool_address.clone(),
        }
    }
}

impl SwapIdentity {
    /// Stable string form, used as a storage key
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.tx_hash, self.log_index, self.pool_address)
    }
}

/// Persistent swap storage
#[async_trait]
pub trait SwapStore: Send + Sync {
    /// Insert swaps; a swap whose identity is already stored overwrites it
    async fn add_swaps(&self, swaps: &[Swap]) -> Result<()>;

    /// Swaps of `address` on `venue` with `from_ts <= timestamp <= to_ts`
    async fn get_swaps(
        &self,
        from_ts: Timestamp,
        to_ts: Timestamp,
        venue: Venue,
        address: &str,
    ) -> Result<Vec<Swap>>;

    /// Drop every stored swap of `venue`
    async fn delete_swaps(&self, venue: Venue) -> Result<()>;
}

/// Most recent first; inside a timestamp, one transaction stays contiguous and
/// its swaps keep their emission order, so the first swap is the first leg.
fn swap_order(a: &Swap, b: &Swap) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| a.tx_hash.cmp(&b.tx_hash))
        .then_with(|| a.log_index.cmp(&b.log_index))
}

/// Split swaps into per-transaction groups in processing order
pub fn group_swaps_by_transaction(mut swaps: Vec<Swap>) -> Vec<Vec<Swap>> {
    swaps.sort_by(swap_order);

    let mut groups: Vec<Vec<Swap>> = Vec::new();
    let mut current: Vec<Swap> = Vec::new();

    for swap in swaps {
        let starts_new_group = current
            .last()
            .map(|last| last.tx_hash != swap.tx_hash)
            .unwrap_or(false);

        if starts_new_group {
            groups.push(std::mem::take(&mut current));
        }
        current.push(swap);
    }

    if !current.is_empty() {
        groups.push(current);
    }

    debug!("Grouped swaps into {} transactions", groups.len());
    groups
}


#[cfg(test)]
mod tests {
    use super::test_support::swap;
    use super::*;

    fn order_of(groups: &[Vec<Swap>]) -> Vec<Vec<(String, u32)>> {
        groups
            .iter()
            .map(|g| g.iter().map(|s| (s.tx_hash.clone(), s.log_index)).collect())
            .collect()
    }

    #[test]
    fn test_grouping_order() {
        let swaps = vec![swap("A", 10, 2), swap("A", 10, 1), swap("B", 5, 0)];

        let groups = group_swaps_by_transaction(swaps);

        assert_eq!(
            order_of(&groups),
            vec![
                vec![("A".to_string(), 1), ("A".to_string(), 2)],
                vec![("B".to_string(), 0)],
            ]
        );
    }

    #[test]
    fn test_grouping_is_independent_of_input_order() {
        let swaps = vec![swap("B", 5, 0), swap("A", 10, 1), swap("A", 10, 2)];
        let groups = group_swaps_by_transaction(swaps);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0][0].tx_hash, "A");
        assert_eq!(groups[0][0].log_index, 1);
        assert_eq!(groups[1][0].tx_hash, "B");
    }

    #[test]
    fn test_same_timestamp_transactions_stay_contiguous() {
        // Two transactions mined in the same block with interleaved log indices
        let swaps = vec![
            swap("0x02", 100, 4),
            swap("0x01", 100, 3),
            swap("0x02", 100, 2),
            swap("0x01", 100, 1),
        ];

        let groups = group_swaps_by_transaction(swaps);

        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.len() == 2));
        assert!(groups[0].iter().all(|s| s.tx_hash == groups[0][0].tx_hash));
        assert_eq!(groups[0][0].log_index, 1);
        assert_eq!(groups[0][1].log_index, 3);
    }

    #[test]
    fn test_empty_input() {
        assert!(group_swaps_by_transaction(Vec::new()).is_empty());
    }

    #[test]
    fn test_identity_ignores_amounts() {
        let a = swap("0xabc", 1, 7);
        let mut b = a.clone();
        b.amount0_in = Decimal::ONE;
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a.identity().key(), format!("0xabc:7:{}", a.pool_address));
    }
}
