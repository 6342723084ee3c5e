//! MongoDB-backed store built on the official driver.
use anyhow::{Context, Result};
use async_trait::async_trait;
use derive_builder::Builder;
use futures::TryStreamExt;
use mongodb::bson::{Document, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use std::time::Duration;
use tracing::{debug, info};

use super::store::{BookStore, DeleteSummary, UpdateSummary};
use crate::config::{APP_NAME, CONNECT_TIMEOUT, SERVER_SELECTION_TIMEOUT};
use crate::query::{Aggregation, Filter, FindSpec, IndexSpec};

#[derive(Builder)]
pub struct ConnectArgs {
    #[builder(setter(into))]
    uri: String,
    #[builder(setter(into))]
    database: String,
    #[builder(setter(into))]
    collection: String,
    #[builder(default = "CONNECT_TIMEOUT")]
    connect_timeout: Duration,
    #[builder(default = "SERVER_SELECTION_TIMEOUT")]
    server_selection_timeout: Duration,
}

/// A connected collection handle. Owns the client; call [`MongoStore::close`]
/// to release it.
#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    database: Database,
    collection: Collection<Document>,
}

impl MongoStore {
    /// Connect and verify the deployment answers a ping
    pub async fn connect(args: ConnectArgs) -> Result<Self> {
        let ConnectArgs {
            uri,
            database,
            collection,
            connect_timeout,
            server_selection_timeout,
        } = args;

        let mut options = ClientOptions::parse(&uri)
            .await
            .context("Failed to parse MongoDB connection string")?;
        options.app_name = Some(APP_NAME.to_string());
        options.connect_timeout = Some(connect_timeout);
        options.server_selection_timeout = Some(server_selection_timeout);

        let client = Client::with_options(options).context("Failed to create MongoDB client")?;
        let database = client.database(&database);

        if let Err(e) = database.run_command(doc! { "ping": 1 }).await {
            client.shutdown().await;
            return Err(e).context("Failed to reach MongoDB server");
        }

        info!("Connected to MongoDB database '{}'", database.name());
        let collection = database.collection::<Document>(&collection);

        Ok(Self {
            client,
            database,
            collection,
        })
    }

    /// Release the connection pool
    pub async fn close(self) {
        self.client.shutdown().await;
        info!("Connection closed");
    }
}

#[async_trait]
impl BookStore for MongoStore {
    fn namespace(&self) -> String {
        self.collection.namespace().to_string()
    }

    async fn find(&self, spec: &FindSpec) -> Result<Vec<Document>> {
        let mut find = self.collection.find(spec.filter.as_document().clone());
        if let Some(projection) = &spec.projection {
            find = find.projection(projection.as_document().clone());
        }
        if let Some(sort) = &spec.sort {
            find = find.sort(sort.to_document());
        }
        if let Some(skip) = spec.skip {
            find = find.skip(skip);
        }
        if let Some(limit) = spec.limit {
            find = find.limit(limit);
        }

        let cursor = find.await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        debug!("find on {} returned {} documents", self.namespace(), docs.len());
        Ok(docs)
    }

    async fn find_one(&self, filter: &Filter) -> Result<Option<Document>> {
        Ok(self
            .collection
            .find_one(filter.as_document().clone())
            .await?)
    }

    async fn update_one(&self, filter: &Filter, fields: Document) -> Result<UpdateSummary> {
        let result = self
            .collection
            .update_one(filter.as_document().clone(), doc! { "$set": fields })
            .await?;
        Ok(UpdateSummary {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_one(&self, filter: &Filter) -> Result<DeleteSummary> {
        let result = self
            .collection
            .delete_one(filter.as_document().clone())
            .await?;
        Ok(DeleteSummary {
            deleted: result.deleted_count,
        })
    }

    async fn aggregate(&self, aggregation: &Aggregation) -> Result<Vec<Document>> {
        let cursor = self.collection.aggregate(aggregation.pipeline()).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn create_index(&self, index: &IndexSpec) -> Result<String> {
        let model = IndexModel::builder().keys(index.key_document()).build();
        let result = self.collection.create_index(model).await?;
        Ok(result.index_name)
    }

    async fn index_names(&self) -> Result<Vec<String>> {
        Ok(self.collection.list_index_names().await?)
    }

    async fn explain(&self, filter: &Filter) -> Result<Document> {
        let command = doc! {
            "explain": {
                "find": self.collection.name(),
                "filter": filter.as_document().clone(),
            },
            "verbosity": "executionStats",
        };
        Ok(self.database.run_command(command).await?)
    }

    async fn insert_many(&self, docs: Vec<Document>) -> Result<u64> {
        if docs.is_empty() {
            return Ok(0);
        }
        let result = self.collection.insert_many(docs).await?;
        Ok(result.inserted_ids.len() as u64)
    }

    async fn drop_collection(&self) -> Result<()> {
        self.collection.drop().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_args_defaults() {
        let args = ConnectArgsBuilder::default()
            .uri("mongodb://localhost:27017")
            .database("plp_bookstore")
            .collection("books")
            .build()
            .unwrap();

        assert_eq!(args.connect_timeout, CONNECT_TIMEOUT);
        assert_eq!(args.server_selection_timeout, SERVER_SELECTION_TIMEOUT);
    }

    #[test]
    fn test_connect_args_require_collection() {
        let result = ConnectArgsBuilder::default()
            .uri("mongodb://localhost:27017")
            .database("plp_bookstore")
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_uri() {
        let args = ConnectArgsBuilder::default()
            .uri("not-a-mongodb-uri")
            .database("plp_bookstore")
            .collection("books")
            .build()
            .unwrap();

        let err = MongoStore::connect(args).await.unwrap_err();
        assert!(
            format!("{:#}", err).contains("Failed to parse MongoDB connection string"),
            "unexpected error: {:#}",
            err
        );
    }
}
