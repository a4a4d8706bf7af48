//! Write operations
//!
//! This module contains all write operations including:
//! - insertOne, insertMany
//! - updateOne, updateMany, replaceOne
//! - deleteOne, deleteMany
//! - bulkWrite

use mongodb::bson::Document;

use crate::connection::Connector;
use crate::error::Result;

use super::{
    BulkWriteAck, DeleteAck, InsertManyAck, InsertOneAck, Operation, OperationRequest,
    ScopedExecutor, UpdateAck, WriteCommand,
};

impl<C: Connector> ScopedExecutor<C> {
    pub async fn insert_one(
        &self,
        database: Option<&str>,
        collection: &str,
        document: Document,
        options: Option<Document>,
    ) -> Result<InsertOneAck> {
        let request = OperationRequest::collection(
            database,
            collection,
            Operation::InsertOne { document, options },
        );
        self.execute(request).await?.data.into_insert_one()
    }

    pub async fn insert_many(
        &self,
        database: Option<&str>,
        collection: &str,
        documents: Vec<Document>,
        options: Option<Document>,
    ) -> Result<InsertManyAck> {
        let request = OperationRequest::collection(
            database,
            collection,
            Operation::InsertMany { documents, options },
        );
        self.execute(request).await?.data.into_insert_many()
    }

    pub async fn update_one(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
        update: Document,
        options: Option<Document>,
    ) -> Result<UpdateAck> {
        let request = OperationRequest::collection(
            database,
            collection,
            Operation::UpdateOne {
                filter,
                update,
                options,
            },
        );
        self.execute(request).await?.data.into_update()
    }

    pub async fn update_many(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
        update: Document,
        options: Option<Document>,
    ) -> Result<UpdateAck> {
        let request = OperationRequest::collection(
            database,
            collection,
            Operation::UpdateMany {
                filter,
                update,
                options,
            },
        );
        self.execute(request).await?.data.into_update()
    }

    pub async fn replace_one(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
        replacement: Document,
        options: Option<Document>,
    ) -> Result<UpdateAck> {
        let request = OperationRequest::collection(
            database,
            collection,
            Operation::ReplaceOne {
                filter,
                replacement,
                options,
            },
        );
        self.execute(request).await?.data.into_update()
    }

    pub async fn delete_one(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
        options: Option<Document>,
    ) -> Result<DeleteAck> {
        let request = OperationRequest::collection(
            database,
            collection,
            Operation::DeleteOne { filter, options },
        );
        self.execute(request).await?.data.into_delete()
    }

    pub async fn delete_many(
        &self,
        database: Option<&str>,
        collection: &str,
        filter: Document,
        options: Option<Document>,
    ) -> Result<DeleteAck> {
        let request = OperationRequest::collection(
            database,
            collection,
            Operation::DeleteMany { filter, options },
        );
        self.execute(request).await?.data.into_delete()
    }

    /// Ordered batch of writes against `collection`
    ///
    /// `commands` use the engine's document shape (`{insertOne: {document}}`,
    /// `{deleteMany: {filter}}`, ...) and are checked before connecting.
    pub async fn bulk_write(
        &self,
        database: Option<&str>,
        collection: &str,
        commands: &[Document],
    ) -> Result<BulkWriteAck> {
        let commands = WriteCommand::parse_all(commands)?;
        let request =
            OperationRequest::collection(database, collection, Operation::BulkWrite { commands });
        self.execute(request).await?.data.into_bulk_write()
    }
}
