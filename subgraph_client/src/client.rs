use crate::error::SubgraphError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info};

/// Declared GraphQL variable types, e.g. `"$limit" -> "Int!"`
pub type ParamTypes = BTreeMap<String, String>;

/// Bound GraphQL variables, keyed without the `$`
pub type ParamValues = Map<String, Value>;

/// Source of GraphQL query results.
///
/// Returns the `data` object of the response, whose top-level keys name the
/// queried entities.
#[async_trait]
pub trait QuerySource: Send + Sync {
    async fn query(
        &self,
        querystr: &str,
        param_types: &ParamTypes,
        param_values: &ParamValues,
    ) -> Result<Value, SubgraphError>;
}

/// Wrap a query body into an operation declaring its variables
pub fn build_query(querystr: &str, param_types: &ParamTypes) -> String {
    if param_types.is_empty() {
        return format!("query {{\n{}\n}}", querystr.trim());
    }

    let declarations: Vec<String> = param_types
        .iter()
        .map(|(name, kind)| {
            let name = if name.starts_with('$') {
                name.clone()
            } else {
                format!("${}", name)
            };
            format!("{}: {}", name, kind)
        })
        .collect();

    format!(
        "query ({}) {{\n{}\n}}",
        declarations.join(", "),
        querystr.trim()
    )
}

/// HTTP client of a GraphQL subgraph
#[derive(Debug, Clone)]
pub struct GraphClient {
    client: Client,
    url: String,
}

impl GraphClient {
    pub fn new(url: &str, timeout_seconds: u64) -> Result<Self, SubgraphError> {
        let parsed = url::Url::parse(url).map_err(|_| SubgraphError::InvalidUrl {
            url: url.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SubgraphError::InvalidUrl {
                url: url.to_string(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .connect_timeout(Duration::from_secs(timeout_seconds.min(30)))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Build the client and check the subgraph answers
    pub async fn connect(url: &str, timeout_seconds: u64) -> Result<Self, SubgraphError> {
        let client = Self::new(url, timeout_seconds)?;
        let block = client.indexed_block().await?;
        info!("Connected to subgraph {} (indexed up to block {})", url, block);
        Ok(client)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Latest block the subgraph has indexed
    pub async fn indexed_block(&self) -> Result<u64, SubgraphError> {
        let data = self
            .query("_meta { block { number } }", &ParamTypes::new(), &ParamValues::new())
            .await?;

        data.pointer("/_meta/block/number")
            .and_then(Value::as_u64)
            .ok_or_else(|| SubgraphError::parse("Subgraph _meta response has no block number"))
    }
}

#[async_trait]
impl QuerySource for GraphClient {
    async fn query(
        &self,
        querystr: &str,
        param_types: &ParamTypes,
        param_values: &ParamValues,
    ) -> Result<Value, SubgraphError> {
        let body = json!({
            "query": build_query(querystr, param_types),
            "variables": param_values,
        });

        debug!("Subgraph request to {} with variables {}", self.url, serde_json::Value::Object(param_values.clone()));

        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Subgraph error - Status: {}, Body: {}", status, text);
            return Err(SubgraphError::ApiError {
                message: format!("HTTP {}: {}", status, text),
            });
        }

        let mut payload: Value = serde_json::from_str(&response.text().await?)?;

        if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let messages: Vec<String> = errors
                    .iter()
                    .map(|e| {
                        e.get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown error")
                            .to_string()
                    })
                    .collect();
                error!("Subgraph returned errors: {}", messages.join("; "));
                return Err(SubgraphError::ApiError {
                    message: messages.join("; "),
                });
            }
        }

        match payload.get_mut("data").map(Value::take) {
            Some(data @ Value::Object(_)) => Ok(data),
            _ => Err(SubgraphError::parse("Subgraph response has no data object")),
        }
    }
}
