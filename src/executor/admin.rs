//! Administrative operations
//!
//! Database-scoped kinds that take no collection:
//! - listDatabases, listCollections
//! - runCommand
//! - watch (change streams, not available)

use mongodb::bson::Document;

use crate::connection::Connector;
use crate::error::{MongoConnectError, Result};

use super::{Operation, OperationRequest, ScopedExecutor};

impl<C: Connector> ScopedExecutor<C> {
    /// Raw `listDatabases` response (`databases`, `totalSize`, `ok`)
    pub async fn list_databases(&self) -> Result<Document> {
        let request = OperationRequest::database(None, Operation::ListDatabases);
        self.execute(request).await?.data.into_document()
    }

    /// Collection descriptors of `database`, or of the default database
    pub async fn list_collections(&self, database: Option<&str>) -> Result<Vec<Document>> {
        let request =
            OperationRequest::database(database, Operation::ListCollections { filter: None });
        self.execute(request).await?.data.into_documents()
    }

    /// Run a raw command against `database` and return the response document
    pub async fn run_command(&self, database: Option<&str>, command: Document) -> Result<Document> {
        let request = OperationRequest::database(database, Operation::RunCommand { command });
        self.execute(request).await?.data.into_document()
    }

    /// Change streams are not supported; no connection is opened
    pub async fn watch(&self) -> Result<()> {
        Err(MongoConnectError::NotImplemented(
            "change streams (watch) are not available".to_string(),
        ))
    }
}
