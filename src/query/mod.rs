//! Query descriptors - filters, projections, aggregations, indexes and plan stats

pub mod aggregate;
pub mod explain;
pub mod find;
pub mod index;

pub use aggregate::{Aggregation, GroupAverage, GroupCount, decade_label};
pub use explain::ExplainStats;
pub use find::{Filter, FindSpec, FindSpecBuilder, Projection, SortDirection, SortKey};
pub use index::IndexSpec;

use anyhow::{Context, Result};
use mongodb::bson::{self, Document};
use serde::de::DeserializeOwned;

/// Decode raw documents into typed rows
pub fn decode_all<T: DeserializeOwned>(docs: Vec<Document>) -> Result<Vec<T>> {
    docs.into_iter()
        .map(|doc| bson::from_document(doc).context("Failed to decode document"))
        .collect()
}
