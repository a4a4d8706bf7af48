//! Read operations
//!
//! This module contains all read operations including:
//! - find, findOne
//! - countDocuments, estimatedDocumentCount
//! - distinct
//!
//! Multi-document reads always come back fully materialized; no cursor ever
//! escapes the connection that produced it.

use mongodb::bson::{Bson, Document};

use crate::connection::Connector;
use crate::error::Result;

use super::{Operation, OperationRequest, ScopedExecutor};

impl<C: Connector> ScopedExecutor<C> {
    /// First document matching `filter`, or `None`
    pub async fn find_one(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
        options: Option<Document>,
    ) -> Result<Option<Document>> {
        let request = OperationRequest::collection(
            database,
            collection,
            Operation::FindOne { filter, options },
        );
        self.execute(request).await?.data.into_maybe_document()
    }

    /// All documents matching `filter`
    pub async fn find_many(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
        options: Option<Document>,
    ) -> Result<Vec<Document>> {
        let request =
            OperationRequest::collection(database, collection, Operation::Find { filter, options });
        self.execute(request).await?.data.into_documents()
    }

    /// Count from collection metadata
    pub async fn estimated_document_count(
        &self,
        database: Option<&str>,
        collection: &str,
        options: Option<Document>,
    ) -> Result<u64> {
        let request = OperationRequest::collection(
            database,
            collection,
            Operation::EstimatedDocumentCount { options },
        );
        self.execute(request).await?.data.into_count()
    }

    /// Exact count of documents matching `filter`
    pub async fn count_documents(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
        options: Option<Document>,
    ) -> Result<u64> {
        let request = OperationRequest::collection(
            database,
            collection,
            Operation::CountDocuments { filter, options },
        );
        self.execute(request).await?.data.into_count()
    }

    /// Distinct values of `field` among documents matching `filter`
    pub async fn distinct(
        &self,
        database: Option<&str>,
        collection: &str,
        field: &str,
        filter: Document,
        options: Option<Document>,
    ) -> Result<Vec<Bson>> {
        let request = OperationRequest::collection(
            database,
            collection,
            Operation::Distinct {
                field: field.to_string(),
                filter,
                options,
            },
        );
        self.execute(request).await?.data.into_values()
    }
}
