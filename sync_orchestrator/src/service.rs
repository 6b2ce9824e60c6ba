use crate::{AddressTrades, Result, SyncError};
use config_manager::{DbSettings, SystemConfig};
use ledger_core::timeframe::{now_timestamp, start_of_utc_day};
use ledger_core::{
    normalize_address, price_known_assets, reconcile_balances, swaps_to_trades, AddressBalances,
    AssetPrices, AssetResolver, ChainBalanceReader, PriceOracle, ProtocolBalance, RangeStore,
    SwapStore, SyncRangeTracker, Timestamp, Trade, Venue,
};
use std::sync::Arc;
use subgraph_client::{GraphClient, QuerySource, VenueSubgraph};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Storage and pricing dependencies of the sync service
#[derive(Clone)]
pub struct SyncCollaborators {
    pub range_store: Arc<dyn RangeStore>,
    pub swap_store: Arc<dyn SwapStore>,
    pub resolver: Arc<dyn AssetResolver>,
    pub oracle: Arc<dyn PriceOracle>,
    pub chain_reader: Option<Arc<dyn ChainBalanceReader>>,
}

/// Keeps the swap history of a set of accounts in sync with one venue's
/// subgraph and derives trades and priced pool balances from it.
///
/// Without a subgraph the service runs degraded: trade history queries
/// return nothing and balances come from the chain reader.
pub struct AmmSyncService {
    venue: Venue,
    graph: Option<VenueSubgraph>,
    range_tracker: SyncRangeTracker,
    swap_store: Arc<dyn SwapStore>,
    resolver: Arc<dyn AssetResolver>,
    oracle: Arc<dyn PriceOracle>,
    chain_reader: Option<Arc<dyn ChainBalanceReader>>,
    premium: bool,

    /// Serializes every fetch/persist/commit sequence
    trades_lock: Mutex<()>,
}

impl AmmSyncService {
    pub fn new(
        venue: Venue,
        source: Option<Arc<dyn QuerySource>>,
        page_size: u32,
        range_prefix: Option<&str>,
        premium: bool,
        collaborators: SyncCollaborators,
    ) -> Self {
        let range_prefix = match range_prefix {
            Some(prefix) => prefix.to_string(),
            None => default_range_prefix(venue),
        };
        Self {
            venue,
            graph: source.map(|source| VenueSubgraph::new(source, venue, page_size)),
            range_tracker: SyncRangeTracker::new(collaborators.range_store, &range_prefix),
            swap_store: collaborators.swap_store,
            resolver: collaborators.resolver,
            oracle: collaborators.oracle,
            chain_reader: collaborators.chain_reader,
            premium,
            trades_lock: Mutex::new(()),
        }
    }

    /// Build the service from configuration, connecting to the subgraph.
    ///
    /// A subgraph that cannot be reached is reported once and the service
    /// starts degraded instead of failing.
    pub async fn connect(
        config: &SystemConfig,
        settings: &DbSettings,
        collaborators: SyncCollaborators,
    ) -> Result<Self> {
        config.validate()?;
        let venue: Venue = config.subgraph.venue.parse()?;

        let source: Option<Arc<dyn QuerySource>> = if !config.subgraph.enabled {
            info!("{} subgraph disabled by configuration", venue);
            None
        } else {
            match GraphClient::connect(&config.subgraph.url, config.subgraph.request_timeout_seconds).await {
                Ok(client) => Some(Arc::new(client) as Arc<dyn QuerySource>),
                Err(e) => {
                    warn!(
                        "Could not initialize the {} subgraph at {}: {}. \
                         Trade history is unavailable and balances fall back to on-chain queries",
                        venue, config.subgraph.url, e
                    );
                    None
                }
            }
        };

        Ok(Self::new(
            venue,
            source,
            config.subgraph.page_size,
            config.sync.range_prefix.as_deref(),
            settings.have_premium,
            collaborators,
        ))
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    pub fn has_graph(&self) -> bool {
        self.graph.is_some()
    }

    /// Balances are read from the subgraph only for premium users
    pub fn uses_graph_balances(&self) -> bool {
        self.graph.is_some() && self.premium
    }

    pub fn range_tracker(&self) -> &SyncRangeTracker {
        &self.range_tracker
    }

    /// Trades of `addresses` within `[from_ts, to_ts]`, syncing missing windows first
    pub async fn get_trades_history(
        &self,
        addresses: &[String],
        reset_db_data: bool,
        from_ts: Timestamp,
        to_ts: Timestamp,
    ) -> Result<AddressTrades> {
        let graph = match &self.graph {
            Some(graph) => graph,
            None => {
                debug!("No {} subgraph, returning empty trade history", self.venue);
                return Ok(AddressTrades::new());
            }
        };
        let addresses = normalize_addresses(addresses)?;
        check_time_range(from_ts, to_ts)?;

        let _guard = self.trades_lock.lock().await;

        if reset_db_data {
            info!("Resetting stored {} swaps and sync ranges", self.venue);
            self.swap_store.delete_swaps(self.venue).await?;
            self.range_tracker.reset().await?;
        }

        self.sync_trades(graph, &addresses, from_ts, to_ts).await
    }

    /// Flat list of the trades of `addresses`, in address order
    pub async fn get_trades(
        &self,
        addresses: &[String],
        from_ts: Timestamp,
        to_ts: Timestamp,
    ) -> Result<Vec<Trade>> {
        let graph = match &self.graph {
            Some(graph) => graph,
            None => return Ok(Vec::new()),
        };
        let addresses = normalize_addresses(addresses)?;
        check_time_range(from_ts, to_ts)?;

        let mut history = {
            let _guard = self.trades_lock.lock().await;
            self.sync_trades(graph, &addresses, from_ts, to_ts).await?
        };

        let mut trades = Vec::new();
        for address in &addresses {
            if let Some(address_trades) = history.remove(address) {
                trades.extend(address_trades);
            }
        }
        Ok(trades)
    }

    /// Fetch the missing windows, persist them, then derive trades from storage.
    /// Callers hold `trades_lock`.
    async fn sync_trades(
        &self,
        graph: &VenueSubgraph,
        addresses: &[String],
        from_ts: Timestamp,
        to_ts: Timestamp,
    ) -> Result<AddressTrades> {
        let partition = self.range_tracker.partition(addresses, to_ts).await?;

        if !partition.new_addresses.is_empty() {
            self.fetch_and_store(graph, &partition.new_addresses, 0, to_ts).await?;
            self.range_tracker
                .commit(&partition.new_addresses, 0, to_ts)
                .await?;
        }

        if let Some((start_ts, end_ts)) = partition.existing_window(to_ts) {
            self.fetch_and_store(graph, &partition.existing_addresses, start_ts, end_ts)
                .await?;
            self.range_tracker
                .commit(&partition.existing_addresses, start_ts, end_ts)
                .await?;
        }

        let mut history = AddressTrades::new();
        for address in addresses {
            let swaps = self
                .swap_store
                .get_swaps(from_ts, to_ts, self.venue, address)
                .await?;
            let trades = swaps_to_trades(swaps)?;
            if !trades.is_empty() {
                history.insert(address.clone(), trades);
            }
        }

        debug!(
            "{} of {} addresses have {} trades in [{}, {}]",
            history.len(),
            addresses.len(),
            self.venue,
            from_ts,
            to_ts
        );
        Ok(history)
    }

    /// All swaps are fetched before anything is written, so a failed query
    /// leaves storage untouched
    async fn fetch_and_store(
        &self,
        graph: &VenueSubgraph,
        addresses: &[String],
        start_ts: Timestamp,
        end_ts: Timestamp,
    ) -> Result<usize> {
        let mut swaps = Vec::new();
        for address in addresses {
            let fetched = graph
                .swaps(address, start_ts, end_ts, self.resolver.as_ref())
                .await?;
            swaps.extend(fetched);
        }

        self.swap_store.add_swaps(&swaps).await?;
        info!(
            "Fetched {} {} swaps for {} addresses in [{}, {}]",
            swaps.len(),
            self.venue,
            addresses.len(),
            start_ts,
            end_ts
        );
        Ok(swaps.len())
    }

    /// Pool positions of `addresses` with every asset priced in USD
    pub async fn get_balances(&self, addresses: &[String]) -> Result<AddressBalances> {
        let addresses = normalize_addresses(addresses)?;

        let graph = if self.premium { self.graph.as_ref() } else { None };

        let protocol_balance = match graph {
            Some(graph) => {
                graph
                    .liquidity_positions(&addresses, self.resolver.as_ref())
                    .await?
            }
            None => self.chain_balances(&addresses).await?,
        };

        let (known_prices, protocol_balance) =
            price_known_assets(protocol_balance, self.oracle.as_ref()).await?;

        let unknown_prices = match graph {
            Some(graph) => {
                let day_ts = start_of_utc_day(now_timestamp());
                graph
                    .token_day_prices(&protocol_balance.unknown_asset_addresses(), day_ts)
                    .await?
            }
            None => AssetPrices::new(),
        };

        Ok(reconcile_balances(
            &protocol_balance.address_balances,
            &known_prices,
            &unknown_prices,
        )?)
    }

    async fn chain_balances(&self, addresses: &[String]) -> Result<ProtocolBalance> {
        let reader = match &self.chain_reader {
            Some(reader) => reader,
            None => {
                warn!("No on-chain balance reader configured, {} balances are empty", self.venue);
                return Ok(ProtocolBalance::default());
            }
        };

        let mut address_balances = AddressBalances::new();
        for address in addresses {
            let pools = reader.pool_balances(address).await?;
            if !pools.is_empty() {
                address_balances.insert(address.clone(), pools);
            }
        }
        Ok(ProtocolBalance::from_pools(address_balances))
    }
}

/// Range keys of each venue live under their own prefix, e.g. `sushiswap_trades`
pub fn default_range_prefix(venue: Venue) -> String {
    format!("{}_trades", venue.as_str())
}

/// Lower-case every address, dropping repeats while keeping order
fn normalize_addresses(addresses: &[String]) -> Result<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(addresses.len());
    for address in addresses {
        let address = normalize_address(address)?;
        if !normalized.contains(&address) {
            normalized.push(address);
        }
    }
    Ok(normalized)
}

fn check_time_range(from_ts: Timestamp, to_ts: Timestamp) -> Result<()> {
    if from_ts > to_ts {
        return Err(SyncError::InvalidTimeRange(format!(
            "from {} is after to {}",
            from_ts, to_ts
        )));
    }
    Ok(())
}
