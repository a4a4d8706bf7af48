//! Connector backed by the official MongoDB driver
//!
//! Each [`MongoConnection`] wraps its own `Client` whose pool is capped at one
//! connection, so closing it tears down the only socket it opened.
//!
//! Bulk writes use the client-level `bulkWrite` command on servers that have
//! it (8.0+). Older servers get the same ordered writes applied one at a time
//! through the collection, on the same connection.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::TryStreamExt;
use mongodb::bson::{self, Bson, Document, doc};
use mongodb::options::{
    ClientOptions, CountOptions, DeleteManyModel, DeleteOneModel, DeleteOptions, DistinctOptions,
    EstimatedDocumentCountOptions, FindOneOptions, FindOptions, InsertManyOptions, InsertOneOptions,
    InsertOneModel, ReplaceOneModel, ReplaceOptions, UpdateManyModel, UpdateModifications,
    UpdateOneModel, UpdateOptions, WriteModel,
};
use mongodb::results::UpdateResult;
use mongodb::{Client, Collection, Namespace};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{Connection, Connector};
use crate::config::{ConnectionConfig, redact_uri};
use crate::error::{ConnectionError, OperationError, Result};
use crate::error::mongo::extract_error_info;
use crate::executor::{
    BulkWriteAck, Operation, OperationKind, ResultData, WriteCommand,
};

/// First wire version with the client-level `bulkWrite` command (MongoDB 8.0)
pub const CLIENT_BULK_WRITE_WIRE_VERSION: i32 = 25;

/// Opens driver-backed connections
#[derive(Debug, Clone)]
pub struct MongoConnector {
    /// Bounds both socket connect and server selection
    connect_timeout: Duration,

    /// Application name reported in the handshake
    app_name: String,
}

/// A connected driver client, used for exactly one operation
pub struct MongoConnection {
    /// `None` once closed
    client: Option<Client>,

    /// `maxWireVersion` reported by the server's `hello`
    max_wire_version: i32,
}

impl MongoConnector {
    pub fn new(config: &ConnectionConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            app_name: config.app_name.clone(),
        }
    }

    /// Parse the endpoint and apply single-use client settings
    async fn client_options(&self, endpoint: &str) -> Result<ClientOptions> {
        let mut options = ClientOptions::parse(endpoint)
            .await
            .map_err(|e| ConnectionError::InvalidUri(format!("{}: {}", redact_uri(endpoint), e)))?;

        options.app_name = Some(self.app_name.clone());
        options.connect_timeout = Some(self.connect_timeout);
        options.server_selection_timeout = Some(self.connect_timeout);
        options.max_pool_size = Some(1);
        options.min_pool_size = Some(0);
        Ok(options)
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Connection>> {
        debug!("Connecting to {}", redact_uri(endpoint));

        let options = self.client_options(endpoint).await?;
        let client = Client::with_options(options)
            .map_err(|e| ConnectionError::ConnectionFailed(connect_failure_message(&e)))?;

        // The driver connects lazily; say hello so unreachable hosts and bad
        // credentials surface here rather than inside the delegated call.
        let hello = match client.database("admin").run_command(doc! { "hello": 1 }).await {
            Ok(reply) => reply,
            Err(e) => {
                client.shutdown().await;
                return Err(ConnectionError::ConnectionFailed(connect_failure_message(&e)).into());
            }
        };

        let max_wire_version = max_wire_version(&hello);
        debug!("Connected, maxWireVersion {}", max_wire_version);

        Ok(Box::new(MongoConnection {
            client: Some(client),
            max_wire_version,
        }))
    }
}

#[async_trait]
impl Connection for MongoConnection {
    async fn execute(
        &self,
        database: &str,
        collection: Option<&str>,
        operation: Operation,
    ) -> Result<ResultData> {
        let client = self.client.as_ref().ok_or(ConnectionError::NotConnected)?;
        let db = client.database(database);
        let kind = operation.kind();
        let coll = || -> Result<Collection<Document>> {
            collection.map(|name| db.collection(name)).ok_or_else(|| {
                OperationError::InvalidParameters(format!("{kind} requires a collection name"))
                    .into()
            })
        };

        debug!(
            "Executing {} on '{}{}'",
            kind,
            database,
            collection.map(|c| format!(".{c}")).unwrap_or_default()
        );

        let data = match operation {
            Operation::ListDatabases => {
                let response = client
                    .database("admin")
                    .run_command(doc! { "listDatabases": 1 })
                    .await?;
                ResultData::Document(response)
            }

            Operation::ListCollections { filter } => {
                let mut command = doc! { "listCollections": 1 };
                if let Some(filter) = filter {
                    command.insert("filter", filter);
                }
                let cursor = db.run_cursor_command(command).await?;
                ResultData::Documents(cursor.try_collect().await?)
            }

            Operation::FindOne { filter, options } => {
                let options: Option<FindOneOptions> = decode_options(kind, options)?;
                let found = coll()?.find_one(filter).with_options(options).await?;
                ResultData::MaybeDocument(found)
            }

            Operation::Find { filter, options } => {
                let options: Option<FindOptions> = decode_options(kind, options)?;
                let cursor = coll()?.find(filter).with_options(options).await?;
                ResultData::Documents(cursor.try_collect().await?)
            }

            Operation::InsertOne { document, options } => {
                let options: Option<InsertOneOptions> = decode_options(kind, options)?;
                let result = coll()?.insert_one(document).with_options(options).await?;
                ResultData::InsertOne(result.into())
            }

            Operation::InsertMany { documents, options } => {
                let options: Option<InsertManyOptions> = decode_options(kind, options)?;
                let result = coll()?.insert_many(documents).with_options(options).await?;
                ResultData::InsertMany(result.into())
            }

            Operation::UpdateOne {
                filter,
                update,
                options,
            } => {
                let options: Option<UpdateOptions> = decode_options(kind, options)?;
                let result = coll()?
                    .update_one(filter, update)
                    .with_options(options)
                    .await?;
                ResultData::Update(result.into())
            }

            Operation::UpdateMany {
                filter,
                update,
                options,
            } => {
                let options: Option<UpdateOptions> = decode_options(kind, options)?;
                let result = coll()?
                    .update_many(filter, update)
                    .with_options(options)
                    .await?;
                ResultData::Update(result.into())
            }

            Operation::ReplaceOne {
                filter,
                replacement,
                options,
            } => {
                let options: Option<ReplaceOptions> = decode_options(kind, options)?;
                let result = coll()?
                    .replace_one(filter, replacement)
                    .with_options(options)
                    .await?;
                ResultData::Update(result.into())
            }

            Operation::DeleteOne { filter, options } => {
                let options: Option<DeleteOptions> = decode_options(kind, options)?;
                let result = coll()?.delete_one(filter).with_options(options).await?;
                ResultData::Delete(result.into())
            }

            Operation::DeleteMany { filter, options } => {
                let options: Option<DeleteOptions> = decode_options(kind, options)?;
                let result = coll()?.delete_many(filter).with_options(options).await?;
                ResultData::Delete(result.into())
            }

            Operation::EstimatedDocumentCount { options } => {
                let options: Option<EstimatedDocumentCountOptions> =
                    decode_options(kind, options)?;
                let count = coll()?
                    .estimated_document_count()
                    .with_options(options)
                    .await?;
                ResultData::Count(count)
            }

            Operation::CountDocuments { filter, options } => {
                let options: Option<CountOptions> = decode_options(kind, options)?;
                let count = coll()?.count_documents(filter).with_options(options).await?;
                ResultData::Count(count)
            }

            Operation::Distinct {
                field,
                filter,
                options,
            } => {
                let options: Option<DistinctOptions> = decode_options(kind, options)?;
                let values = coll()?
                    .distinct(field, filter)
                    .with_options(options)
                    .await?;
                ResultData::Values(values)
            }

            Operation::RunCommand { command } => ResultData::Document(db.run_command(command).await?),

            Operation::BulkWrite { commands } => {
                let coll = coll()?;
                let ack = if supports_client_bulk_write(self.max_wire_version) {
                    client_bulk_write(client, &coll, commands).await?
                } else {
                    debug!(
                        "maxWireVersion {} has no client bulkWrite, applying {} write(s) in order",
                        self.max_wire_version,
                        commands.len()
                    );
                    ordered_writes(&coll, commands).await?
                };
                ResultData::BulkWrite(ack)
            }
        };

        Ok(data)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.shutdown().await;
        }
        Ok(())
    }
}

fn max_wire_version(hello: &Document) -> i32 {
    match hello.get("maxWireVersion") {
        Some(Bson::Int32(version)) => *version,
        Some(Bson::Int64(version)) => i32::try_from(*version).unwrap_or(i32::MAX),
        _ => 0,
    }
}

fn supports_client_bulk_write(max_wire_version: i32) -> bool {
    max_wire_version >= CLIENT_BULK_WRITE_WIRE_VERSION
}

async fn client_bulk_write(
    client: &Client,
    coll: &Collection<Document>,
    commands: Vec<WriteCommand>,
) -> Result<BulkWriteAck> {
    let namespace = coll.namespace();
    let models: Vec<WriteModel> = commands
        .into_iter()
        .map(|command| write_model(&namespace, command))
        .collect();
    let summary = client.bulk_write(models).await?;
    Ok(BulkWriteAck {
        inserted_count: summary.inserted_count,
        matched_count: summary.matched_count,
        modified_count: summary.modified_count,
        upserted_count: summary.upserted_count,
        deleted_count: summary.deleted_count,
    })
}

/// Apply write commands in order, stopping at the first failure
async fn ordered_writes(
    coll: &Collection<Document>,
    commands: Vec<WriteCommand>,
) -> Result<BulkWriteAck> {
    let mut ack = BulkWriteAck::default();

    for command in commands {
        match command {
            WriteCommand::InsertOne { document } => {
                coll.insert_one(document).await?;
                ack.inserted_count += 1;
            }
            WriteCommand::UpdateOne {
                filter,
                update,
                upsert,
            } => {
                let result = coll
                    .update_one(filter, update)
                    .with_options(update_options(upsert))
                    .await?;
                add_update(&mut ack, &result);
            }
            WriteCommand::UpdateMany {
                filter,
                update,
                upsert,
            } => {
                let result = coll
                    .update_many(filter, update)
                    .with_options(update_options(upsert))
                    .await?;
                add_update(&mut ack, &result);
            }
            WriteCommand::ReplaceOne {
                filter,
                replacement,
                upsert,
            } => {
                let options =
                    upsert.map(|upsert| ReplaceOptions::builder().upsert(upsert).build());
                let result = coll
                    .replace_one(filter, replacement)
                    .with_options(options)
                    .await?;
                add_update(&mut ack, &result);
            }
            WriteCommand::DeleteOne { filter } => {
                ack.deleted_count += coll.delete_one(filter).await?.deleted_count as i64;
            }
            WriteCommand::DeleteMany { filter } => {
                ack.deleted_count += coll.delete_many(filter).await?.deleted_count as i64;
            }
        }
    }

    Ok(ack)
}

fn update_options(upsert: Option<bool>) -> Option<UpdateOptions> {
    upsert.map(|upsert| UpdateOptions::builder().upsert(upsert).build())
}

fn add_update(ack: &mut BulkWriteAck, result: &UpdateResult) {
    tally_update(
        ack,
        result.matched_count,
        result.modified_count,
        result.upserted_id.is_some(),
    );
}

fn tally_update(ack: &mut BulkWriteAck, matched: u64, modified: u64, upserted: bool) {
    ack.matched_count += matched as i64;
    ack.modified_count += modified as i64;
    if upserted {
        ack.upserted_count += 1;
    }
}

/// Decode a caller-supplied options document into the driver's option type
///
/// Keys follow the engine's camelCase naming (`limit`, `sort`, `upsert`, ...).
fn decode_options<T: DeserializeOwned>(
    kind: OperationKind,
    options: Option<Document>,
) -> Result<Option<T>> {
    options
        .map(|doc| {
            bson::from_document(doc).map_err(|e| {
                OperationError::InvalidOptions {
                    operation: kind.to_string(),
                    reason: e.to_string(),
                }
                .into()
            })
        })
        .transpose()
}

fn write_model(namespace: &Namespace, command: WriteCommand) -> WriteModel {
    match command {
        WriteCommand::InsertOne { document } => WriteModel::InsertOne(
            InsertOneModel::builder()
                .namespace(namespace.clone())
                .document(document)
                .build(),
        ),
        WriteCommand::UpdateOne {
            filter,
            update,
            upsert,
        } => WriteModel::UpdateOne(
            UpdateOneModel::builder()
                .namespace(namespace.clone())
                .filter(filter)
                .update(UpdateModifications::Document(update))
                .upsert(upsert)
                .build(),
        ),
        WriteCommand::UpdateMany {
            filter,
            update,
            upsert,
        } => WriteModel::UpdateMany(
            UpdateManyModel::builder()
                .namespace(namespace.clone())
                .filter(filter)
                .update(UpdateModifications::Document(update))
                .upsert(upsert)
                .build(),
        ),
        WriteCommand::ReplaceOne {
            filter,
            replacement,
            upsert,
        } => WriteModel::ReplaceOne(
            ReplaceOneModel::builder()
                .namespace(namespace.clone())
                .filter(filter)
                .replacement(replacement)
                .upsert(upsert)
                .build(),
        ),
        WriteCommand::DeleteOne { filter } => WriteModel::DeleteOne(
            DeleteOneModel::builder()
                .namespace(namespace.clone())
                .filter(filter)
                .build(),
        ),
        WriteCommand::DeleteMany { filter } => WriteModel::DeleteMany(
            DeleteManyModel::builder()
                .namespace(namespace.clone())
                .filter(filter)
                .build(),
        ),
    }
}

/// Connect-time failures carry the driver's own message, without the
/// JSON wrapping used for operation errors.
fn connect_failure_message(error: &mongodb::error::Error) -> String {
    extract_error_info(error)
        .message
        .unwrap_or_else(|| error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn test_decode_find_options() {
        let options: Option<FindOptions> = decode_options(
            OperationKind::Find,
            Some(doc! { "limit": 5_i64, "sort": { "name": 1 } }),
        )
        .unwrap();
        let options = options.unwrap();
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.sort, Some(doc! { "name": 1 }));
    }

    #[test]
    fn test_decode_insert_one_options() {
        let options: Option<InsertOneOptions> = decode_options(
            OperationKind::InsertOne,
            Some(doc! { "bypassDocumentValidation": true }),
        )
        .unwrap();
        assert_eq!(options.unwrap().bypass_document_validation, Some(true));

        let result: Result<Option<InsertOneOptions>> = decode_options(
            OperationKind::InsertOne,
            Some(doc! { "bypassDocumentValidation": "yes" }),
        );
        assert!(result.unwrap_err().to_string().contains("Invalid options for insertOne"));
    }

    #[test]
    fn test_max_wire_version_from_hello() {
        assert_eq!(max_wire_version(&doc! { "isWritablePrimary": true, "maxWireVersion": 21 }), 21);
        assert_eq!(max_wire_version(&doc! { "maxWireVersion": 25_i64 }), 25);
        assert_eq!(max_wire_version(&doc! { "ok": 1.0 }), 0);
    }

    #[test]
    fn test_client_bulk_write_needs_8_0() {
        // 4.4 = 9, 6.0 = 17, 7.0 = 21, 8.0 = 25
        assert!(!supports_client_bulk_write(9));
        assert!(!supports_client_bulk_write(17));
        assert!(!supports_client_bulk_write(21));
        assert!(supports_client_bulk_write(25));
        assert!(supports_client_bulk_write(27));
    }

    #[test]
    fn test_ordered_write_tally() {
        let mut ack = BulkWriteAck::default();
        tally_update(&mut ack, 1, 1, false);
        tally_update(&mut ack, 0, 0, true);
        tally_update(&mut ack, 3, 2, false);

        assert_eq!(ack.matched_count, 4);
        assert_eq!(ack.modified_count, 3);
        assert_eq!(ack.upserted_count, 1);
        assert_eq!(update_options(None).map(|o| o.upsert), None);
        assert_eq!(update_options(Some(true)).and_then(|o| o.upsert), Some(true));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_driver_failure() {
        let mut config = ConnectionConfig::with_endpoint("mongodb://127.0.0.1:1/main");
        config.connect_timeout = 1;
        let executor = crate::executor::ScopedExecutor::new(config);

        let err = executor
            .insert_one(None, "users", doc! { "name": "ada" }, None)
            .await
            .unwrap_err();

        assert!(
            matches!(
                err,
                crate::error::MongoConnectError::Connection(ConnectionError::ConnectionFailed(_))
            ),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_decode_absent_options() {
        let options: Option<UpdateOptions> = decode_options(OperationKind::UpdateOne, None).unwrap();
        assert!(options.is_none());
    }

    #[test]
    fn test_decode_invalid_options() {
        let result: Result<Option<FindOptions>> =
            decode_options(OperationKind::Find, Some(doc! { "limit": "ten" }));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("Invalid options for find"));
    }

    #[test]
    fn test_connector_settings() {
        let config = ConnectionConfig::default();
        let connector = MongoConnector::new(&config);
        assert_eq!(connector.connect_timeout, Duration::from_secs(10));
        assert!(connector.app_name.starts_with("mongoconnect/"));
    }

    #[tokio::test]
    async fn test_invalid_uri_is_connection_error() {
        let connector = MongoConnector::new(&ConnectionConfig::default());
        let err = match connector.connect("not-a-uri").await {
            Ok(_) => panic!("expected an invalid URI error"),
            Err(e) => e,
        };
        assert!(err.is_connection_failure());
    }

    #[tokio::test]
    async fn test_closed_connection_rejects_operations() {
        let mut connection = MongoConnection {
            client: None,
            max_wire_version: 0,
        };
        connection.close().await.unwrap();
        let err = connection
            .execute("main", None, Operation::ListDatabases)
            .await
            .unwrap_err();
        assert!(err.is_connection_failure());
    }
}
