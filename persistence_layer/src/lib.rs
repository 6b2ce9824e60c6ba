pub mod memory_store;

pub use memory_store::MemoryStore;

use async_trait::async_trait;
use ledger_core::{
    LedgerError, RangeStore, Swap, SwapIdentity, SwapStore, SyncRange, Timestamp, Venue,
};
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Redis health status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisHealthStatus {
    pub connected: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Redis connection error: {0}")]
    Connection(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupted record: {0}")]
    Corrupted(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

impl From<PersistenceError> for LedgerError {
    fn from(err: PersistenceError) -> Self {
        LedgerError::Storage(err.to_string())
    }
}

/// Flat string-record storage of the user settings
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_settings(&self, key: &str) -> ledger_core::Result<HashMap<String, String>>;

    async fn save_settings(
        &self,
        key: &str,
        records: &BTreeMap<String, String>,
    ) -> ledger_core::Result<()>;
}

fn range_key(key: &str) -> String {
    format!("amm_range:{}", key)
}

fn swap_key(venue: Venue, identity: &SwapIdentity) -> String {
    format!("amm_swap:{}:{}", venue, identity.key())
}

/// Sorted set of the swap identities fetched for one address, scored by timestamp
fn swap_index_key(venue: Venue, address: &str) -> String {
    format!("amm_swaps:{}:{}", venue, address)
}

#[derive(Debug, Clone)]
pub struct RedisClient {
    client: Client,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        // Test the connection
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(Self { client })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(PersistenceError::from)
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.get_connection().await?;
        let keys: Vec<String> = redis::cmd("KEYS").arg(pattern).query_async(&mut conn).await?;
        Ok(keys)
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64> {
        let keys = self.keys_matching(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_connection().await?;
        let count: u64 = conn.del(&keys).await?;
        Ok(count)
    }

    // =====================================
    // Sync Ranges
    // =====================================

    pub async fn read_range(&self, key: &str) -> Result<Option<SyncRange>> {
        let mut conn = self.get_connection().await?;
        let fields: HashMap<String, u64> = conn.hgetall(range_key(key)).await?;

        if fields.is_empty() {
            return Ok(None);
        }

        match (fields.get("start_ts"), fields.get("end_ts")) {
            (Some(start_ts), Some(end_ts)) => Ok(Some(SyncRange {
                start_ts: *start_ts,
                end_ts: *end_ts,
            })),
            _ => Err(PersistenceError::Corrupted(format!(
                "Sync range {} is missing its bounds",
                key
            ))),
        }
    }

    pub async fn write_range(&self, key: &str, range: SyncRange) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: () = conn
            .hset_multiple(
                range_key(key),
                &[("start_ts", range.start_ts), ("end_ts", range.end_ts)],
            )
            .await?;
        debug!("Stored sync range {} = [{}, {}]", key, range.start_ts, range.end_ts);
        Ok(())
    }

    pub async fn remove_ranges(&self, prefix: &str) -> Result<u64> {
        let count = self.delete_matching(&format!("{}_*", range_key(prefix))).await?;
        info!("Deleted {} sync ranges with prefix {}", count, prefix);
        Ok(count)
    }

    // =====================================
    // Swaps
    // =====================================

    pub async fn store_swaps(&self, swaps: &[Swap]) -> Result<()> {
        if swaps.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for swap in swaps {
            let identity = swap.identity();
            let data_key = swap_key(swap.venue, &identity);
            pipe.set(&data_key, serde_json::to_string(swap)?).ignore();
            pipe.zadd(
                swap_index_key(swap.venue, &swap.address),
                identity.key(),
                swap.timestamp,
            )
            .ignore();
        }

        let mut conn = self.get_connection().await?;
        let _: () = pipe.query_async(&mut conn).await?;

        debug!("Stored {} swaps", swaps.len());
        Ok(())
    }

    pub async fn load_swaps(
        &self,
        from_ts: Timestamp,
        to_ts: Timestamp,
        venue: Venue,
        address: &str,
    ) -> Result<Vec<Swap>> {
        let mut conn = self.get_connection().await?;
        let members: Vec<String> = conn
            .zrangebyscore(swap_index_key(venue, address), from_ts, to_ts)
            .await?;

        if members.is_empty() {
            return Ok(Vec::new());
        }

        let data_keys: Vec<String> = members
            .iter()
            .map(|member| format!("amm_swap:{}:{}", venue, member))
            .collect();
        let payloads: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&data_keys)
            .query_async(&mut conn)
            .await?;

        let mut swaps = Vec::with_capacity(payloads.len());
        for (member, payload) in members.iter().zip(payloads) {
            match payload {
                Some(json) => {
                    let mut swap: Swap = serde_json::from_str(&json)?;
                    swap.address = address.to_string();
                    swaps.push(swap);
                }
                None => warn!("Swap {} indexed for {} has no stored data", member, address),
            }
        }

        swaps.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.log_index.cmp(&b.log_index))
        });
        Ok(swaps)
    }

    pub async fn remove_swaps(&self, venue: Venue) -> Result<u64> {
        let data = self.delete_matching(&format!("amm_swap:{}:*", venue)).await?;
        let indexes = self.delete_matching(&format!("amm_swaps:{}:*", venue)).await?;
        info!("Deleted {} swaps and {} address indexes for {}", data, indexes, venue);
        Ok(data)
    }

    // =====================================
    // Settings
    // =====================================

    pub async fn read_settings(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.get_connection().await?;
        let records: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(records)
    }

    pub async fn write_settings(&self, key: &str, records: &BTreeMap<String, String>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let pairs: Vec<(&String, &String)> = records.iter().collect();
        let mut conn = self.get_connection().await?;
        let _: () = conn.hset_multiple(key, pairs.as_slice()).await?;
        debug!("Stored {} settings under {}", records.len(), key);
        Ok(())
    }

    // =====================================
    // Health Checks and Connectivity
    // =====================================

    /// Test Redis connectivity and health
    pub async fn health_check(&self) -> RedisHealthStatus {
        let start_time = std::time::Instant::now();

        let result: std::result::Result<String, String> = match self.get_connection().await {
            Ok(mut conn) => redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| format!("PING failed: {}", e)),
            Err(e) => Err(format!("Connection failed: {}", e)),
        };

        RedisHealthStatus {
            connected: result.is_ok(),
            latency_ms: start_time.elapsed().as_millis() as u64,
            error: result.err(),
        }
    }

}

#[async_trait]
impl RangeStore for RedisClient {
    async fn get_range(&self, key: &str) -> ledger_core::Result<Option<SyncRange>> {
        Ok(self.read_range(key).await?)
    }

    async fn set_range(&self, key: &str, range: SyncRange) -> ledger_core::Result<()> {
        Ok(self.write_range(key, range).await?)
    }

    async fn delete_ranges(&self, prefix: &str) -> ledger_core::Result<()> {
        self.remove_ranges(prefix).await?;
        Ok(())
    }
}

#[async_trait]
impl SwapStore for RedisClient {
    async fn add_swaps(&self, swaps: &[Swap]) -> ledger_core::Result<()> {
        Ok(self.store_swaps(swaps).await?)
    }

    async fn get_swaps(
        &self,
        from_ts: Timestamp,
        to_ts: Timestamp,
        venue: Venue,
        address: &str,
    ) -> ledger_core::Result<Vec<Swap>> {
        Ok(self.load_swaps(from_ts, to_ts, venue, address).await?)
    }

    async fn delete_swaps(&self, venue: Venue) -> ledger_core::Result<()> {
        self.remove_swaps(venue).await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for RedisClient {
    async fn load_settings(&self, key: &str) -> ledger_core::Result<HashMap<String, String>> {
        Ok(self.read_settings(key).await?)
    }

    async fn save_settings(
        &self,
        key: &str,
        records: &BTreeMap<String, String>,
    ) -> ledger_core::Result<()> {
        Ok(self.write_settings(key, records).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let identity = SwapIdentity {
            tx_hash: "0xabc".to_string(),
            log_index: 3,
            pool_address: "0xpool".to_string(),
        };
        assert_eq!(swap_key(Venue::Uniswap, &identity), "amm_swap:uniswap:0xabc:3:0xpool");
        assert_eq!(swap_index_key(Venue::Sushiswap, "0xuser"), "amm_swaps:sushiswap:0xuser");
        assert_eq!(range_key("uniswap_trades_0xuser"), "amm_range:uniswap_trades_0xuser");
    }

    #[test]
    fn test_storage_errors_map_to_ledger_storage() {
        let err: LedgerError = PersistenceError::Corrupted("bad".to_string()).into();
        assert!(matches!(err, LedgerError::Storage(_)));
    }

    #[tokio::test]
    async fn test_redis_connection() {
        // This test requires a running Redis instance
        // Skip if REDIS_URL is not set
        let redis_url = match std::env::var("REDIS_URL") {
            Ok(url) => url,
            Err(_) => return,
        };

        let client = RedisClient::new(&redis_url).await.unwrap();
        assert_eq!(client.ping().await.unwrap(), "PONG");
        assert!(client.health_check().await.connected);
    }
}
