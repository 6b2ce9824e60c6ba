pub mod client;
pub mod error;
pub mod pagination;
pub mod parser;
pub mod queries;

pub use client::{build_query, GraphClient, ParamTypes, ParamValues, QuerySource};
pub use error::SubgraphError;
pub use pagination::{paginate, PagedQuery, GRAPH_QUERY_LIMIT};
pub use queries::VenueSubgraph;
