use ledger_core::{LedgerError, Trade};
use persistence_layer::PersistenceError;
use std::collections::HashMap;
use subgraph_client::SubgraphError;
use thiserror::Error;

pub mod service;
pub use service::{default_range_prefix, AmmSyncService, SyncCollaborators};

#[derive(Error, Debug, Clone)]
pub enum SyncError {
    #[error("Subgraph transport error: {0}")]
    Transport(String),
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Price fetching error: {0}")]
    PriceFetch(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),
}

impl From<LedgerError> for SyncError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Transport(msg) => SyncError::Transport(msg),
            LedgerError::DataIntegrity(msg) => SyncError::DataIntegrity(msg),
            LedgerError::Storage(msg) => SyncError::Persistence(msg),
            LedgerError::PriceFetch(msg) => SyncError::PriceFetch(msg),
            LedgerError::InvalidAddress(msg) => SyncError::InvalidAddress(msg),
            LedgerError::Configuration(msg) => SyncError::Config(msg),
            LedgerError::TimeframeParse(msg) => SyncError::InvalidTimeRange(msg),
        }
    }
}

impl From<SubgraphError> for SyncError {
    fn from(err: SubgraphError) -> Self {
        SyncError::Transport(err.to_string())
    }
}

impl From<PersistenceError> for SyncError {
    fn from(err: PersistenceError) -> Self {
        SyncError::Persistence(err.to_string())
    }
}

impl From<config_manager::ConfigurationError> for SyncError {
    fn from(err: config_manager::ConfigurationError) -> Self {
        SyncError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Trades per account address; accounts without trades are absent
pub type AddressTrades = HashMap<String, Vec<Trade>>;
