use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::Document;

use crate::query::{Aggregation, Filter, FindSpec, IndexSpec};

/// Outcome of a single-document update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub matched: u64,
    pub modified: u64,
}

/// Outcome of a single-document delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub deleted: u64,
}

/// Operations the report runner needs from a document collection
///
/// Every method is a single request; implementations do not retry.
#[async_trait]
pub trait BookStore: Send + Sync {
    /// `database.collection`, for logs
    fn namespace(&self) -> String;

    /// Documents matching the descriptor, after sort, skip, limit and projection
    async fn find(&self, spec: &FindSpec) -> Result<Vec<Document>>;

    /// First document matching `filter` in storage order
    async fn find_one(&self, filter: &Filter) -> Result<Option<Document>>;

    /// Set `fields` on the first document matching `filter`
    async fn update_one(&self, filter: &Filter, fields: Document) -> Result<UpdateSummary>;

    /// Delete the first document matching `filter`
    async fn delete_one(&self, filter: &Filter) -> Result<DeleteSummary>;

    /// Run a grouping aggregation, returning `{ _id, ... }` rows
    async fn aggregate(&self, aggregation: &Aggregation) -> Result<Vec<Document>>;

    /// Create an index, returning its name. Creating an existing index is a no-op.
    async fn create_index(&self, index: &IndexSpec) -> Result<String>;

    /// Names of every index on the collection
    async fn index_names(&self) -> Result<Vec<String>>;

    /// Raw `executionStats` explain response for a find with `filter`
    async fn explain(&self, filter: &Filter) -> Result<Document>;

    /// Insert documents, returning how many were inserted
    async fn insert_many(&self, docs: Vec<Document>) -> Result<u64>;

    /// Drop the collection and its indexes
    async fn drop_collection(&self) -> Result<()>;
}
