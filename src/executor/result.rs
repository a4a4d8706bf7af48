//! Execution result types
//!
//! This module defines the data structures for representing command execution results:
//! - ExecutionResult: Overall result of one scoped operation
//! - ResultData: The engine's response, as the driver reported it
//! - ExecutionStats: Statistics about the execution

use std::collections::HashMap;

use mongodb::bson::{Bson, Document};
use mongodb::results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};

use crate::error::{OperationError, Result};

/// Result of one scoped operation
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// Engine response
    pub data: ResultData,

    /// Execution statistics
    pub stats: ExecutionStats,
}

/// Engine response for one operation kind
///
/// Values are carried exactly as the driver returned them; write
/// acknowledgements keep every field the driver exposes.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultData {
    /// Raw response document (listDatabases, runCommand)
    Document(Document),

    /// Materialized cursor (find, listCollections)
    Documents(Vec<Document>),

    /// findOne: the first match, if any
    MaybeDocument(Option<Document>),

    /// insertOne acknowledgement
    InsertOne(InsertOneAck),

    /// insertMany acknowledgement
    InsertMany(InsertManyAck),

    /// updateOne / updateMany / replaceOne acknowledgement
    Update(UpdateAck),

    /// deleteOne / deleteMany acknowledgement
    Delete(DeleteAck),

    /// Document count
    Count(u64),

    /// distinct values
    Values(Vec<Bson>),

    /// bulkWrite summary
    BulkWrite(BulkWriteAck),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneAck {
    pub inserted_id: Bson,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertManyAck {
    /// Inserted ids keyed by position in the input sequence
    pub inserted_ids: HashMap<usize, Bson>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateAck {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_id: Option<Bson>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteAck {
    pub deleted_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteAck {
    pub inserted_count: i64,
    pub matched_count: i64,
    pub modified_count: i64,
    pub upserted_count: i64,
    pub deleted_count: i64,
}

/// Execution statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionStats {
    /// Wall time from connect to release, in milliseconds
    pub execution_time_ms: u64,

    /// Database the operation ran against
    pub database: String,

    /// Collection, for collection-scoped kinds
    pub collection: Option<String>,
}

impl From<InsertOneResult> for InsertOneAck {
    fn from(result: InsertOneResult) -> Self {
        Self {
            inserted_id: result.inserted_id,
        }
    }
}

impl From<InsertManyResult> for InsertManyAck {
    fn from(result: InsertManyResult) -> Self {
        Self {
            inserted_ids: result.inserted_ids,
        }
    }
}

impl From<UpdateResult> for UpdateAck {
    fn from(result: UpdateResult) -> Self {
        Self {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        }
    }
}

impl From<DeleteResult> for DeleteAck {
    fn from(result: DeleteResult) -> Self {
        Self {
            deleted_count: result.deleted_count,
        }
    }
}

impl ResultData {
    /// Short variant name, used in mismatch errors and logs
    pub fn variant_name(&self) -> &'static str {
        match self {
            ResultData::Document(_) => "document",
            ResultData::Documents(_) => "documents",
            ResultData::MaybeDocument(_) => "optional document",
            ResultData::InsertOne(_) => "insertOne acknowledgement",
            ResultData::InsertMany(_) => "insertMany acknowledgement",
            ResultData::Update(_) => "update acknowledgement",
            ResultData::Delete(_) => "delete acknowledgement",
            ResultData::Count(_) => "count",
            ResultData::Values(_) => "values",
            ResultData::BulkWrite(_) => "bulkWrite summary",
        }
    }

    /// Number of documents or values carried, where that is meaningful
    pub fn returned_len(&self) -> usize {
        match self {
            ResultData::Documents(docs) => docs.len(),
            ResultData::Values(values) => values.len(),
            ResultData::Document(_) | ResultData::MaybeDocument(Some(_)) => 1,
            _ => 0,
        }
    }

    pub fn into_document(self) -> Result<Document> {
        match self {
            ResultData::Document(doc) => Ok(doc),
            other => Err(mismatch("document", &other)),
        }
    }

    pub fn into_documents(self) -> Result<Vec<Document>> {
        match self {
            ResultData::Documents(docs) => Ok(docs),
            other => Err(mismatch("documents", &other)),
        }
    }

    pub fn into_maybe_document(self) -> Result<Option<Document>> {
        match self {
            ResultData::MaybeDocument(doc) => Ok(doc),
            other => Err(mismatch("optional document", &other)),
        }
    }

    pub fn into_insert_one(self) -> Result<InsertOneAck> {
        match self {
            ResultData::InsertOne(ack) => Ok(ack),
            other => Err(mismatch("insertOne acknowledgement", &other)),
        }
    }

    pub fn into_insert_many(self) -> Result<InsertManyAck> {
        match self {
            ResultData::InsertMany(ack) => Ok(ack),
            other => Err(mismatch("insertMany acknowledgement", &other)),
        }
    }

    pub fn into_update(self) -> Result<UpdateAck> {
        match self {
            ResultData::Update(ack) => Ok(ack),
            other => Err(mismatch("update acknowledgement", &other)),
        }
    }

    pub fn into_delete(self) -> Result<DeleteAck> {
        match self {
            ResultData::Delete(ack) => Ok(ack),
            other => Err(mismatch("delete acknowledgement", &other)),
        }
    }

    pub fn into_count(self) -> Result<u64> {
        match self {
            ResultData::Count(count) => Ok(count),
            other => Err(mismatch("count", &other)),
        }
    }

    pub fn into_values(self) -> Result<Vec<Bson>> {
        match self {
            ResultData::Values(values) => Ok(values),
            other => Err(mismatch("values", &other)),
        }
    }

    pub fn into_bulk_write(self) -> Result<BulkWriteAck> {
        match self {
            ResultData::BulkWrite(ack) => Ok(ack),
            other => Err(mismatch("bulkWrite summary", &other)),
        }
    }
}

fn mismatch(expected: &str, found: &ResultData) -> crate::error::MongoConnectError {
    OperationError::UnexpectedResult {
        expected: expected.to_string(),
        found: found.variant_name().to_string(),
    }
    .into()
}
