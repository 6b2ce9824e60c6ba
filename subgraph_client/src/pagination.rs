use crate::client::{ParamTypes, ParamValues, QuerySource};
use crate::error::SubgraphError;
use serde_json::Value;
use tracing::{debug, info};

/// Largest `first` the subgraph accepts
pub const GRAPH_QUERY_LIMIT: u32 = 1000;

/// A query whose records are read page by page with `$limit`/`$offset`
#[derive(Debug, Clone)]
pub struct PagedQuery<'a> {
    pub querystr: &'a str,

    /// Top-level key of the `data` object holding the records
    pub result_key: &'a str,

    pub param_types: ParamTypes,

    /// Bindings other than `limit` and `offset`
    pub param_values: ParamValues,
}

/// Run `query` until a short page comes back and return every record.
///
/// The offset grows by `page_size` after each page. A page with fewer than
/// `page_size` records is the last one. Any source failure aborts the loop.
pub async fn paginate(
    source: &dyn QuerySource,
    query: &PagedQuery<'_>,
    page_size: u32,
) -> Result<Vec<Value>, SubgraphError> {
    if page_size == 0 {
        return Err(SubgraphError::parse("Page size must be greater than 0"));
    }

    let mut param_types = query.param_types.clone();
    param_types.insert("$limit".to_string(), "Int!".to_string());
    param_types.insert("$offset".to_string(), "Int!".to_string());

    let mut param_values = query.param_values.clone();
    param_values.insert("limit".to_string(), Value::from(page_size));

    let mut records = Vec::new();
    let mut offset: u64 = 0;
    let mut pages = 0usize;

    loop {
        param_values.insert("offset".to_string(), Value::from(offset));

        let mut data = source.query(query.querystr, &param_types, &param_values).await?;
        let page = match data.get_mut(query.result_key).map(Value::take) {
            Some(Value::Array(page)) => page,
            _ => {
                return Err(SubgraphError::parse(format!(
                    "Response has no '{}' list",
                    query.result_key
                )))
            }
        };

        pages += 1;
        let page_len = page.len();
        debug!(
            "Fetched page {} of {} (offset {}, {} records)",
            pages, query.result_key, offset, page_len
        );
        records.extend(page);

        if page_len < page_size as usize {
            break;
        }
        offset += u64::from(page_size);
    }

    info!(
        "Fetched {} {} records in {} pages",
        records.len(),
        query.result_key,
        pages
    );
    Ok(records)
}
