use crate::SettingsStore;
use async_trait::async_trait;
use ledger_core::{RangeStore, Result, Swap, SwapIdentity, SwapStore, SyncRange, Timestamp, Venue};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct MemoryState {
    ranges: HashMap<String, SyncRange>,
    swaps: HashMap<(Venue, SwapIdentity), Swap>,

    /// Swap identities fetched per (venue, address)
    address_index: HashMap<(Venue, String), HashSet<SwapIdentity>>,

    settings: HashMap<String, HashMap<String, String>>,
}

/// Process-local store used when Redis is disabled and in tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct swaps stored for `venue`
    pub async fn swap_count(&self, venue: Venue) -> usize {
        let state = self.state.lock().await;
        state.swaps.keys().filter(|(v, _)| *v == venue).count()
    }
}

#[async_trait]
impl RangeStore for MemoryStore {
    async fn get_range(&self, key: &str) -> Result<Option<SyncRange>> {
        Ok(self.state.lock().await.ranges.get(key).copied())
    }

    async fn set_range(&self, key: &str, range: SyncRange) -> Result<()> {
        self.state.lock().await.ranges.insert(key.to_string(), range);
        Ok(())
    }

    async fn delete_ranges(&self, prefix: &str) -> Result<()> {
        let scoped = format!("{}_", prefix);
        self.state
            .lock()
            .await
            .ranges
            .retain(|key, _| !key.starts_with(&scoped));
        Ok(())
    }
}

#[async_trait]
impl SwapStore for MemoryStore {
    async fn add_swaps(&self, swaps: &[Swap]) -> Result<()> {
        let mut state = self.state.lock().await;

        for swap in swaps {
            let identity = swap.identity();
            state
                .address_index
                .entry((swap.venue, swap.address.clone()))
                .or_default()
                .insert(identity.clone());
            state.swaps.insert((swap.venue, identity), swap.clone());
        }

        debug!("Stored {} swaps in memory", swaps.len());
        Ok(())
    }

    async fn get_swaps(
        &self,
        from_ts: Timestamp,
        to_ts: Timestamp,
        venue: Venue,
        address: &str,
    ) -> Result<Vec<Swap>> {
        let state = self.state.lock().await;

        let identities = match state.address_index.get(&(venue, address.to_string())) {
            Some(identities) => identities,
            None => return Ok(Vec::new()),
        };

        let mut swaps: Vec<Swap> = identities
            .iter()
            .filter_map(|identity| state.swaps.get(&(venue, identity.clone())))
            .filter(|swap| swap.timestamp >= from_ts && swap.timestamp <= to_ts)
            .map(|swap| Swap {
                address: address.to_string(),
                ..swap.clone()
            })
            .collect();

        swaps.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.log_index.cmp(&b.log_index))
        });
        Ok(swaps)
    }

    async fn delete_swaps(&self, venue: Venue) -> Result<()> {
        let mut state = self.state.lock().await;
        state.swaps.retain(|(v, _), _| *v != venue);
        state.address_index.retain(|(v, _), _| *v != venue);
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load_settings(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self
            .state
            .lock()
            .await
            .settings
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_settings(&self, key: &str, records: &BTreeMap<String, String>) -> Result<()> {
        let mut state = self.state.lock().await;
        let stored = state.settings.entry(key.to_string()).or_default();
        for (name, value) in records {
            stored.insert(name.clone(), value.clone());
        }
        Ok(())
    }
}
