use ledger_core::LedgerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubgraphError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("API error: {message}")]
    ApiError { message: String },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Invalid subgraph URL: {url}")]
    InvalidUrl { url: String },
}

impl SubgraphError {
    pub fn parse(message: impl Into<String>) -> Self {
        SubgraphError::ParseError {
            message: message.into(),
        }
    }
}

/// Every subgraph failure is a transport failure for the sync in progress
impl From<SubgraphError> for LedgerError {
    fn from(err: SubgraphError) -> Self {
        LedgerError::Transport(err.to_string())
    }
}
