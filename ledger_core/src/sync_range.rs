use crate::{LedgerError, Result, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Inclusive window of already-fetched data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRange {
    pub start_ts: Timestamp,
    pub end_ts: Timestamp,
}

impl SyncRange {
    pub fn new(start_ts: Timestamp, end_ts: Timestamp) -> Result<Self> {
        if start_ts > end_ts {
            return Err(LedgerError::DataIntegrity(format!(
                "Sync range start {} is after its end {}",
                start_ts, end_ts
            )));
        }
        Ok(Self { start_ts, end_ts })
    }

    /// Smallest range covering both
    pub fn union(&self, other: &SyncRange) -> SyncRange {
        SyncRange {
            start_ts: self.start_ts.min(other.start_ts),
            end_ts: self.end_ts.max(other.end_ts),
        }
    }
}

/// Persistent per-key sync range storage
#[async_trait]
pub trait RangeStore: Send + Sync {
    async fn get_range(&self, key: &str) -> Result<Option<SyncRange>>;

    async fn set_range(&self, key: &str, range: SyncRange) -> Result<()>;

    /// Remove every range keyed `{prefix}_*`, leaving longer prefixes alone
    async fn delete_ranges(&self, prefix: &str) -> Result<()>;
}

/// Addresses split by whether they were synced before
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangePartition {
    /// Never synced: need a full backfill from timestamp 0
    pub new_addresses: Vec<String>,

    /// Synced before: only need the window after `min_end_ts`
    pub existing_addresses: Vec<String>,

    /// Earliest recorded end among existing addresses, capped at the requested end
    pub min_end_ts: Timestamp,
}

impl RangePartition {
    /// Window to fetch for the existing addresses, if any
    pub fn existing_window(&self, to_ts: Timestamp) -> Option<(Timestamp, Timestamp)> {
        if self.existing_addresses.is_empty() || self.min_end_ts > to_ts {
            return None;
        }
        Some((self.min_end_ts, to_ts))
    }
}

/// Tracks which windows were already fetched for each address of one feed
#[derive(Clone)]
pub struct SyncRangeTracker {
    store: Arc<dyn RangeStore>,
    prefix: String,
}

impl SyncRangeTracker {
    pub fn new(store: Arc<dyn RangeStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Storage key of an address's range for this feed
    pub fn range_key(&self, address: &str) -> String {
        format!("{}_{}", self.prefix, address)
    }

    pub async fn range(&self, address: &str) -> Result<Option<SyncRange>> {
        self.store.get_range(&self.range_key(address)).await
    }

    pub async fn partition(&self, addresses: &[String], to_ts: Timestamp) -> Result<RangePartition> {
        let mut partition = RangePartition {
            min_end_ts: to_ts,
            ..RangePartition::default()
        };

        for address in addresses {
            match self.range(address).await? {
                None => partition.new_addresses.push(address.clone()),
                Some(range) => {
                    partition.existing_addresses.push(address.clone());
                    partition.min_end_ts = partition.min_end_ts.min(range.end_ts);
                }
            }
        }

        debug!(
            "Range partition: {} new, {} existing, min end {}",
            partition.new_addresses.len(),
            partition.existing_addresses.len(),
            partition.min_end_ts
        );
        Ok(partition)
    }

    /// Record `[start_ts, end_ts]` as covered, merged with any earlier coverage
    pub async fn commit(&self, addresses: &[String], start_ts: Timestamp, end_ts: Timestamp) -> Result<()> {
        let committed = SyncRange::new(start_ts, end_ts)?;

        for address in addresses {
            let key = self.range_key(address);
            let merged = match self.store.get_range(&key).await? {
                Some(existing) => existing.union(&committed),
                None => committed,
            };
            self.store.set_range(&key, merged).await?;
        }

        debug!(
            "Committed range [{}, {}] for {} addresses",
            start_ts,
            end_ts,
            addresses.len()
        );
        Ok(())
    }

    /// Forget every range of this feed
    pub async fn reset(&self) -> Result<()> {
        self.store.delete_ranges(&self.prefix).await?;
        info!("Cleared sync ranges with prefix {}", self.prefix);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MapRangeStore {
        ranges: Mutex<HashMap<String, SyncRange>>,
    }

    #[async_trait]
    impl RangeStore for MapRangeStore {
        async fn get_range(&self, key: &str) -> Result<Option<SyncRange>> {
            Ok(self.ranges.lock().await.get(key).copied())
        }

        async fn set_range(&self, key: &str, range: SyncRange) -> Result<()> {
            self.ranges.lock().await.insert(key.to_string(), range);
            Ok(())
        }

        async fn delete_ranges(&self, prefix: &str) -> Result<()> {
            let scoped = format!("{}_", prefix);
            self.ranges.lock().await.retain(|k, _| !k.starts_with(&scoped));
            Ok(())
        }
    }

    fn tracker() -> SyncRangeTracker {
        SyncRangeTracker::new(Arc::new(MapRangeStore::default()), "uniswap_trades")
    }

    fn addrs(list: &[&str]) -> Vec<String> {
        list.iter().map(|a| a.to_string()).collect()
    }

    #[tokio::test]
    async fn test_partition_new_and_existing() {
        let tracker = tracker();
        tracker.commit(&addrs(&["0xa"]), 0, 500).await.unwrap();
        tracker.commit(&addrs(&["0xb"]), 0, 300).await.unwrap();

        let partition = tracker
            .partition(&addrs(&["0xa", "0xb", "0xc"]), 1000)
            .await
            .unwrap();

        assert_eq!(partition.new_addresses, addrs(&["0xc"]));
        assert_eq!(partition.existing_addresses, addrs(&["0xa", "0xb"]));
        assert_eq!(partition.min_end_ts, 300);
        assert_eq!(partition.existing_window(1000), Some((300, 1000)));
    }

    #[tokio::test]
    async fn test_min_end_is_capped_by_requested_end() {
        let tracker = tracker();
        tracker.commit(&addrs(&["0xa"]), 0, 900).await.unwrap();

        let partition = tracker.partition(&addrs(&["0xa"]), 400).await.unwrap();

        assert_eq!(partition.min_end_ts, 400);
        assert_eq!(partition.existing_window(400), Some((400, 400)));
    }

    #[test]
    fn test_no_window_without_existing_addresses() {
        let partition = RangePartition {
            new_addresses: addrs(&["0xa"]),
            existing_addresses: Vec::new(),
            min_end_ts: 10,
        };
        assert_eq!(partition.existing_window(10), None);

        let inverted = RangePartition {
            new_addresses: Vec::new(),
            existing_addresses: addrs(&["0xa"]),
            min_end_ts: 20,
        };
        assert_eq!(inverted.existing_window(10), None);
    }

    #[tokio::test]
    async fn test_commit_merges_with_existing_range() {
        let tracker = tracker();
        tracker.commit(&addrs(&["0xa"]), 0, 500).await.unwrap();
        tracker.commit(&addrs(&["0xa"]), 300, 800).await.unwrap();

        assert_eq!(tracker.range("0xa").await.unwrap(), Some(SyncRange { start_ts: 0, end_ts: 800 }));

        // An older window never moves the end backwards
        tracker.commit(&addrs(&["0xa"]), 100, 200).await.unwrap();
        assert_eq!(tracker.range("0xa").await.unwrap().unwrap().end_ts, 800);
    }

    #[tokio::test]
    async fn test_range_end_is_monotonic_over_sequential_syncs() {
        let tracker = tracker();
        let addresses = addrs(&["0xa"]);
        let mut last_end = 0;

        for to_ts in [100u64, 100, 250, 900] {
            let partition = tracker.partition(&addresses, to_ts).await.unwrap();
            if !partition.new_addresses.is_empty() {
                tracker.commit(&partition.new_addresses, 0, to_ts).await.unwrap();
            }
            if let Some((start, end)) = partition.existing_window(to_ts) {
                tracker.commit(&partition.existing_addresses, start, end).await.unwrap();
            }

            let range = tracker.range("0xa").await.unwrap().unwrap();
            assert!(range.end_ts >= last_end);
            assert!(range.end_ts <= to_ts);
            last_end = range.end_ts;
        }
        assert_eq!(last_end, 900);
    }

    #[tokio::test]
    async fn test_invalid_commit_is_rejected() {
        let tracker = tracker();
        let result = tracker.commit(&addrs(&["0xa"]), 10, 5).await;
        assert!(matches!(result, Err(LedgerError::DataIntegrity(_))));
        assert_eq!(tracker.range("0xa").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reset_clears_only_this_feed() {
        let store = Arc::new(MapRangeStore::default());
        let uniswap = SyncRangeTracker::new(store.clone(), "uniswap_trades");
        let sushi = SyncRangeTracker::new(store.clone(), "sushiswap_trades");

        uniswap.commit(&addrs(&["0xa"]), 0, 10).await.unwrap();
        sushi.commit(&addrs(&["0xa"]), 0, 10).await.unwrap();

        uniswap.reset().await.unwrap();

        assert_eq!(uniswap.range("0xa").await.unwrap(), None);
        assert!(sushi.range("0xa").await.unwrap().is_some());
        assert_eq!(uniswap.range_key("0xa"), "uniswap_trades_0xa");
    }
}
