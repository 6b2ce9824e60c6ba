use anyhow::Result;
use config_manager::{DbSettings, SystemConfig};
use ledger_core::timeframe::{now_timestamp, parse_timeframe};
use ledger_core::{AssetRegistry, RangeStore, SwapStore, Venue};
use persistence_layer::{MemoryStore, RedisClient, SettingsStore};
use std::fs::File;
use std::sync::Arc;
use sync_orchestrator::{AmmSyncService, SyncCollaborators};
use tracing::{debug, info, warn};

mod cli;
mod export;

use clap::Parser;
use cli::CliArgs;

/// Storage backends shared by the service and the settings loader
struct Stores {
    ranges: Arc<dyn RangeStore>,
    swaps: Arc<dyn SwapStore>,
    settings: Arc<dyn SettingsStore>,
}

async fn open_stores(config: &SystemConfig) -> Stores {
    if config.redis.enabled {
        match RedisClient::new(&config.redis.url).await {
            Ok(client) => {
                let health = client.health_check().await;
                if health.connected {
                    info!(
                        "Connected to Redis at {} ({} ms)",
                        config.redis.url, health.latency_ms
                    );
                    let client = Arc::new(client);
                    return Stores {
                        ranges: client.clone(),
                        swaps: client.clone(),
                        settings: client,
                    };
                }
                warn!(
                    "Redis at {} failed its health check ({}), keeping swaps and ranges in memory",
                    config.redis.url,
                    health.error.unwrap_or_default()
                );
            }
            Err(e) => warn!(
                "Redis at {} is unavailable ({}), keeping swaps and ranges in memory",
                config.redis.url, e
            ),
        }
    }

    let memory = Arc::new(MemoryStore::new());
    Stores {
        ranges: memory.clone(),
        swaps: memory.clone(),
        settings: memory,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = CliArgs::parse();

    let config = match &args.config_path {
        Some(path) => SystemConfig::load_from_path(path)?,
        None => SystemConfig::load()?,
    };
    debug!("Configuration: {}", config.to_json_value());
    let stores = open_stores(&config).await;

    let records = stores
        .settings
        .load_settings(&config.system.settings_key)
        .await?;
    let (settings, warnings) = DbSettings::from_records(&records);
    for warning in &warnings {
        warn!("{}", warning);
    }
    if records.is_empty() {
        info!("No stored settings, saving defaults under {}", config.system.settings_key);
        stores
            .settings
            .save_settings(&config.system.settings_key, &settings.to_records())
            .await?;
    }

    let venue: Venue = config.subgraph.venue.parse()?;
    if !settings.is_module_active(venue.as_str()) {
        warn!("The {} module is not active, nothing to do", venue);
        return Ok(());
    }

    let registry = Arc::new(AssetRegistry::from_config(&config.assets)?);
    let service = AmmSyncService::connect(
        &config,
        &settings,
        SyncCollaborators {
            range_store: stores.ranges.clone(),
            swap_store: stores.swaps.clone(),
            resolver: registry.clone(),
            oracle: registry,
            chain_reader: None,
        },
    )
    .await?;

    let now = now_timestamp();
    let from_ts = parse_timeframe(&args.from, now)?;
    let to_ts = match &args.to {
        Some(to) => parse_timeframe(to, now)?,
        None => now,
    };

    info!(
        "Syncing {} trades of {} addresses in [{}, {}]",
        venue,
        args.addresses.len(),
        from_ts,
        to_ts
    );
    let history = service
        .get_trades_history(&args.addresses, args.reset, from_ts, to_ts)
        .await?;
    println!("{}", serde_json::to_string_pretty(&history)?);

    if let Some(path) = &args.csv_path {
        let trades: Vec<_> = history.values().flatten().cloned().collect();
        let written = export::write_trades_csv(File::create(path)?, &trades)?;
        info!("Exported {} trades to {}", written, path.display());
    }

    if args.balances {
        let balances = service.get_balances(&args.addresses).await?;
        println!("{}", serde_json::to_string_pretty(&balances)?);
    }

    Ok(())
}
