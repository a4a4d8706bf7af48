//! Operation requests
//!
//! An [`OperationRequest`] names a target (database and, for collection-scoped
//! kinds, a collection) and carries one [`Operation`] whose payload and options
//! are forwarded to the engine untouched.

use std::fmt;

use mongodb::bson::{Bson, Document};

use crate::error::{OperationError, Result};

/// One delegated call and its payload
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// `listDatabases` admin command
    ListDatabases,

    /// `listCollections` on the target database
    ListCollections { filter: Option<Document> },

    FindOne {
        filter: Document,
        options: Option<Document>,
    },

    Find {
        filter: Document,
        options: Option<Document>,
    },

    InsertOne {
        document: Document,
        options: Option<Document>,
    },

    InsertMany {
        documents: Vec<Document>,
        options: Option<Document>,
    },

    UpdateOne {
        filter: Document,
        update: Document,
        options: Option<Document>,
    },

    UpdateMany {
        filter: Document,
        update: Document,
        options: Option<Document>,
    },

    ReplaceOne {
        filter: Document,
        replacement: Document,
        options: Option<Document>,
    },

    DeleteOne {
        filter: Document,
        options: Option<Document>,
    },

    DeleteMany {
        filter: Document,
        options: Option<Document>,
    },

    EstimatedDocumentCount {
        options: Option<Document>,
    },

    CountDocuments {
        filter: Document,
        options: Option<Document>,
    },

    Distinct {
        field: String,
        filter: Document,
        options: Option<Document>,
    },

    /// Raw command against the target database
    RunCommand { command: Document },

    /// Ordered batch of write commands against one collection
    BulkWrite { commands: Vec<WriteCommand> },
}

/// Operation discriminant, used for logging and result checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    ListDatabases,
    ListCollections,
    FindOne,
    Find,
    InsertOne,
    InsertMany,
    UpdateOne,
    UpdateMany,
    ReplaceOne,
    DeleteOne,
    DeleteMany,
    EstimatedDocumentCount,
    CountDocuments,
    Distinct,
    RunCommand,
    BulkWrite,
}

/// Whether an operation addresses a database or a collection inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationScope {
    Database,
    Collection,
}

/// A single write inside a bulk write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteCommand {
    InsertOne {
        document: Document,
    },
    UpdateOne {
        filter: Document,
        update: Document,
        upsert: Option<bool>,
    },
    UpdateMany {
        filter: Document,
        update: Document,
        upsert: Option<bool>,
    },
    ReplaceOne {
        filter: Document,
        replacement: Document,
        upsert: Option<bool>,
    },
    DeleteOne {
        filter: Document,
    },
    DeleteMany {
        filter: Document,
    },
}

/// Target plus operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    /// Database override; the executor's default applies when absent
    pub database: Option<String>,

    /// Collection, required for collection-scoped kinds
    pub collection: Option<String>,

    /// The delegated call
    pub operation: Operation,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::ListDatabases => OperationKind::ListDatabases,
            Operation::ListCollections { .. } => OperationKind::ListCollections,
            Operation::FindOne { .. } => OperationKind::FindOne,
            Operation::Find { .. } => OperationKind::Find,
            Operation::InsertOne { .. } => OperationKind::InsertOne,
            Operation::InsertMany { .. } => OperationKind::InsertMany,
            Operation::UpdateOne { .. } => OperationKind::UpdateOne,
            Operation::UpdateMany { .. } => OperationKind::UpdateMany,
            Operation::ReplaceOne { .. } => OperationKind::ReplaceOne,
            Operation::DeleteOne { .. } => OperationKind::DeleteOne,
            Operation::DeleteMany { .. } => OperationKind::DeleteMany,
            Operation::EstimatedDocumentCount { .. } => OperationKind::EstimatedDocumentCount,
            Operation::CountDocuments { .. } => OperationKind::CountDocuments,
            Operation::Distinct { .. } => OperationKind::Distinct,
            Operation::RunCommand { .. } => OperationKind::RunCommand,
            Operation::BulkWrite { .. } => OperationKind::BulkWrite,
        }
    }
}

impl OperationKind {
    /// Name of the engine method this kind delegates to
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::ListDatabases => "listDatabases",
            OperationKind::ListCollections => "listCollections",
            OperationKind::FindOne => "findOne",
            OperationKind::Find => "find",
            OperationKind::InsertOne => "insertOne",
            OperationKind::InsertMany => "insertMany",
            OperationKind::UpdateOne => "updateOne",
            OperationKind::UpdateMany => "updateMany",
            OperationKind::ReplaceOne => "replaceOne",
            OperationKind::DeleteOne => "deleteOne",
            OperationKind::DeleteMany => "deleteMany",
            OperationKind::EstimatedDocumentCount => "estimatedDocumentCount",
            OperationKind::CountDocuments => "countDocuments",
            OperationKind::Distinct => "distinct",
            OperationKind::RunCommand => "runCommand",
            OperationKind::BulkWrite => "bulkWrite",
        }
    }

    pub fn scope(&self) -> OperationScope {
        match self {
            OperationKind::ListDatabases
            | OperationKind::ListCollections
            | OperationKind::RunCommand => OperationScope::Database,
            _ => OperationScope::Collection,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OperationRequest {
    /// Request against a database (admin-style kinds)
    pub fn database(database: Option<&str>, operation: Operation) -> Self {
        Self {
            database: database.map(str::to_string),
            collection: None,
            operation,
        }
    }

    /// Request against a collection
    pub fn collection(database: Option<&str>, collection: &str, operation: Operation) -> Self {
        Self {
            database: database.map(str::to_string),
            collection: Some(collection.to_string()),
            operation,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    /// Check the request before any connection is opened
    ///
    /// Returns the collection name for collection-scoped kinds.
    pub fn validate(&self) -> Result<Option<&str>> {
        let kind = self.kind();

        if let Some(database) = &self.database
            && database.is_empty()
        {
            return Err(OperationError::InvalidParameters(format!(
                "{kind}: database name must not be empty"
            ))
            .into());
        }

        match kind.scope() {
            OperationScope::Database => Ok(None),
            OperationScope::Collection => match self.collection.as_deref() {
                Some(name) if !name.is_empty() => Ok(Some(name)),
                _ => Err(OperationError::InvalidParameters(format!(
                    "{kind} requires a collection name"
                ))
                .into()),
            },
        }
    }
}

impl WriteCommand {
    /// Parse a write command from the engine's document shape
    ///
    /// Accepts `{insertOne: {document}}`, `{updateOne: {filter, update, upsert}}`,
    /// `{updateMany: {...}}`, `{replaceOne: {filter, replacement, upsert}}`,
    /// `{deleteOne: {filter}}` and `{deleteMany: {filter}}`.
    pub fn from_document(doc: &Document) -> Result<Self> {
        let mut entries = doc.iter();
        let (name, body) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(invalid_write(
                    "each bulk write entry must have exactly one operation key",
                ));
            }
        };

        let body = match body {
            Bson::Document(body) => body,
            _ => return Err(invalid_write(&format!("'{name}' must be a document"))),
        };

        let command = match name.as_str() {
            "insertOne" => WriteCommand::InsertOne {
                document: required_doc(name, body, "document")?,
            },
            "updateOne" => WriteCommand::UpdateOne {
                filter: required_doc(name, body, "filter")?,
                update: required_doc(name, body, "update")?,
                upsert: optional_bool(name, body, "upsert")?,
            },
            "updateMany" => WriteCommand::UpdateMany {
                filter: required_doc(name, body, "filter")?,
                update: required_doc(name, body, "update")?,
                upsert: optional_bool(name, body, "upsert")?,
            },
            "replaceOne" => WriteCommand::ReplaceOne {
                filter: required_doc(name, body, "filter")?,
                replacement: required_doc(name, body, "replacement")?,
                upsert: optional_bool(name, body, "upsert")?,
            },
            "deleteOne" => WriteCommand::DeleteOne {
                filter: required_doc(name, body, "filter")?,
            },
            "deleteMany" => WriteCommand::DeleteMany {
                filter: required_doc(name, body, "filter")?,
            },
            other => {
                return Err(invalid_write(&format!(
                    "unsupported bulk write operation '{other}'"
                )));
            }
        };

        Ok(command)
    }

    /// Parse an ordered list of write commands
    pub fn parse_all(docs: &[Document]) -> Result<Vec<Self>> {
        if docs.is_empty() {
            return Err(invalid_write("bulk write needs at least one operation"));
        }
        docs.iter().map(Self::from_document).collect()
    }
}

fn invalid_write(msg: &str) -> crate::error::MongoConnectError {
    OperationError::InvalidParameters(format!("bulkWrite: {msg}")).into()
}

fn required_doc(op: &str, body: &Document, field: &str) -> Result<Document> {
    match body.get(field) {
        Some(Bson::Document(doc)) => Ok(doc.clone()),
        Some(_) => Err(invalid_write(&format!("'{op}.{field}' must be a document"))),
        None => Err(invalid_write(&format!("'{op}' is missing '{field}'"))),
    }
}

fn optional_bool(op: &str, body: &Document, field: &str) -> Result<Option<bool>> {
    match body.get(field) {
        None | Some(Bson::Null) => Ok(None),
        Some(Bson::Boolean(value)) => Ok(Some(*value)),
        Some(_) => Err(invalid_write(&format!("'{op}.{field}' must be a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn test_scopes() {
        assert_eq!(OperationKind::ListDatabases.scope(), OperationScope::Database);
        assert_eq!(OperationKind::RunCommand.scope(), OperationScope::Database);
        assert_eq!(OperationKind::Find.scope(), OperationScope::Collection);
        assert_eq!(OperationKind::BulkWrite.scope(), OperationScope::Collection);
        assert_eq!(OperationKind::EstimatedDocumentCount.to_string(), "estimatedDocumentCount");
    }

    #[test]
    fn test_validate_requires_collection() {
        let request = OperationRequest {
            database: None,
            collection: None,
            operation: Operation::Find {
                filter: doc! {},
                options: None,
            },
        };
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("find requires a collection name"));

        let request = OperationRequest::collection(
            Some("main"),
            "users",
            Operation::CountDocuments {
                filter: doc! {},
                options: None,
            },
        );
        assert_eq!(request.validate().unwrap(), Some("users"));
    }

    #[test]
    fn test_validate_admin_kind_ignores_collection() {
        let request = OperationRequest::database(None, Operation::ListDatabases);
        assert_eq!(request.validate().unwrap(), None);

        let request = OperationRequest::database(Some(""), Operation::ListDatabases);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_parse_write_commands() {
        let commands = WriteCommand::parse_all(&[
            doc! { "insertOne": { "document": { "name": "ada" } } },
            doc! { "updateOne": { "filter": { "name": "ada" }, "update": { "$set": { "age": 36 } }, "upsert": true } },
            doc! { "deleteMany": { "filter": { "stale": true } } },
        ])
        .unwrap();

        assert_eq!(
            commands[0],
            WriteCommand::InsertOne {
                document: doc! { "name": "ada" }
            }
        );
        assert_eq!(
            commands[1],
            WriteCommand::UpdateOne {
                filter: doc! { "name": "ada" },
                update: doc! { "$set": { "age": 36 } },
                upsert: Some(true),
            }
        );
        assert_eq!(
            commands[2],
            WriteCommand::DeleteMany {
                filter: doc! { "stale": true }
            }
        );
    }

    #[test]
    fn test_parse_write_command_errors() {
        assert!(WriteCommand::parse_all(&[]).is_err());
        assert!(WriteCommand::from_document(&doc! { "insertOne": {} }).is_err());
        assert!(WriteCommand::from_document(&doc! { "upsertOne": { "filter": {} } }).is_err());
        assert!(
            WriteCommand::from_document(&doc! {
                "deleteOne": { "filter": {} },
                "deleteMany": { "filter": {} },
            })
            .is_err()
        );
        assert!(
            WriteCommand::from_document(&doc! {
                "replaceOne": { "filter": {}, "replacement": {}, "upsert": "yes" }
            })
            .is_err()
        );
    }
}
