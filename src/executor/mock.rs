//! In-memory connector for executor tests
//!
//! Records every connect, close and delegated call so tests can check the
//! lifecycle, and serves a small subset of the engine's semantics (equality
//! filters, `$set` updates) from a shared in-memory store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{Bson, Document, doc};

use crate::connection::{Connection, Connector};
use crate::error::{ConnectionError, OperationError, Result};

use super::{
    BulkWriteAck, DeleteAck, InsertManyAck, InsertOneAck, Operation, OperationKind, ResultData,
    UpdateAck, WriteCommand,
};

type Store = BTreeMap<String, BTreeMap<String, Vec<Document>>>;

/// How the mock engine behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Normal,
    /// connect fails as if the host were unreachable
    Unreachable,
    /// connect never completes
    HangConnect,
    /// every delegated call fails
    FailOperations,
    /// every delegated call never completes
    HangOperations,
}

/// One recorded delegated call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub database: String,
    pub collection: Option<String>,
    pub kind: OperationKind,
}

#[derive(Debug, Default)]
pub struct Stats {
    connects: AtomicUsize,
    close_calls: AtomicUsize,
    calls: Mutex<Vec<Call>>,
}

impl Stats {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

pub struct MockConnector {
    behavior: Behavior,
    stats: Arc<Stats>,
    store: Arc<Mutex<Store>>,
}

struct MockConnection {
    behavior: Behavior,
    stats: Arc<Stats>,
    store: Arc<Mutex<Store>>,
    closed: bool,
}

impl MockConnector {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            stats: Arc::new(Stats::default()),
            store: Arc::new(Mutex::new(Store::new())),
        }
    }

    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }

    /// Seed `database.collection` with `documents`
    pub fn seed(self, database: &str, collection: &str, documents: Vec<Document>) -> Self {
        self.store
            .lock()
            .unwrap()
            .entry(database.to_string())
            .or_default()
            .insert(collection.to_string(), documents);
        self
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _endpoint: &str) -> Result<Box<dyn Connection>> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);

        match self.behavior {
            Behavior::Unreachable => Err(ConnectionError::ConnectionFailed(
                "server selection timeout: no reachable servers".to_string(),
            )
            .into()),
            Behavior::HangConnect => std::future::pending().await,
            _ => Ok(Box::new(MockConnection {
                behavior: self.behavior,
                stats: Arc::clone(&self.stats),
                store: Arc::clone(&self.store),
                closed: false,
            })),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(
        &self,
        database: &str,
        collection: Option<&str>,
        operation: Operation,
    ) -> Result<ResultData> {
        if self.closed {
            return Err(ConnectionError::NotConnected.into());
        }

        self.stats.calls.lock().unwrap().push(Call {
            database: database.to_string(),
            collection: collection.map(str::to_string),
            kind: operation.kind(),
        });

        match self.behavior {
            Behavior::FailOperations => {
                return Err(OperationError::InvalidParameters("simulated engine failure".into()).into());
            }
            Behavior::HangOperations => std::future::pending::<()>().await,
            _ => {}
        }

        let mut store = self.store.lock().unwrap();
        Ok(apply(&mut store, database, collection.unwrap_or_default(), operation))
    }

    async fn close(&mut self) -> Result<()> {
        self.stats.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed = true;
        Ok(())
    }
}

fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, value)| doc.get(key) == Some(value))
}

fn apply_update(doc: &mut Document, update: &Document) {
    if let Ok(set) = update.get_document("$set") {
        for (key, value) in set {
            doc.insert(key.clone(), value.clone());
        }
    }
}

fn with_id(mut doc: Document) -> (Bson, Document) {
    let id = match doc.get("_id") {
        Some(id) => id.clone(),
        None => {
            let id = Bson::ObjectId(ObjectId::new());
            doc.insert("_id", id.clone());
            id
        }
    };
    (id, doc)
}

fn apply(store: &mut Store, database: &str, collection: &str, operation: Operation) -> ResultData {
    match operation {
        Operation::ListDatabases => {
            let databases: Vec<Bson> = store
                .iter()
                .map(|(name, colls)| {
                    Bson::Document(doc! { "name": name.as_str(), "sizeOnDisk": 0_i64, "empty": colls.is_empty() })
                })
                .collect();
            ResultData::Document(doc! { "databases": databases, "totalSize": 0_i64, "ok": 1.0 })
        }
        Operation::ListCollections { .. } => ResultData::Documents(
            store
                .get(database)
                .map(|colls| {
                    colls
                        .keys()
                        .map(|name| doc! { "name": name.as_str(), "type": "collection" })
                        .collect()
                })
                .unwrap_or_default(),
        ),
        Operation::RunCommand { command } => {
            if command.contains_key("ping") {
                ResultData::Document(doc! { "ok": 1.0 })
            } else {
                ResultData::Document(doc! { "ok": 1.0, "echo": command })
            }
        }
        operation => {
            let docs = store
                .entry(database.to_string())
                .or_default()
                .entry(collection.to_string())
                .or_default();
            apply_to_collection(docs, operation)
        }
    }
}

fn apply_to_collection(docs: &mut Vec<Document>, operation: Operation) -> ResultData {
    match operation {
        Operation::FindOne { filter, .. } => {
            ResultData::MaybeDocument(docs.iter().find(|d| matches(d, &filter)).cloned())
        }
        Operation::Find { filter, options } => {
            let limit = options
                .as_ref()
                .and_then(|o| o.get_i64("limit").ok())
                .filter(|limit| *limit > 0)
                .map(|limit| limit as usize)
                .unwrap_or(usize::MAX);
            ResultData::Documents(
                docs.iter()
                    .filter(|d| matches(d, &filter))
                    .take(limit)
                    .cloned()
                    .collect(),
            )
        }
        Operation::InsertOne { document, .. } => {
            let (inserted_id, document) = with_id(document);
            docs.push(document);
            ResultData::InsertOne(InsertOneAck { inserted_id })
        }
        Operation::InsertMany { documents, .. } => {
            let mut inserted_ids = std::collections::HashMap::new();
            for (index, document) in documents.into_iter().enumerate() {
                let (id, document) = with_id(document);
                docs.push(document);
                inserted_ids.insert(index, id);
            }
            ResultData::InsertMany(InsertManyAck { inserted_ids })
        }
        Operation::UpdateOne { filter, update, .. } => {
            ResultData::Update(update_docs(docs, &filter, &update, false))
        }
        Operation::UpdateMany { filter, update, .. } => {
            ResultData::Update(update_docs(docs, &filter, &update, true))
        }
        Operation::ReplaceOne {
            filter,
            replacement,
            ..
        } => {
            let mut ack = UpdateAck {
                matched_count: 0,
                modified_count: 0,
                upserted_id: None,
            };
            if let Some(doc) = docs.iter_mut().find(|d| matches(d, &filter)) {
                let id = doc.get("_id").cloned();
                *doc = replacement;
                if let Some(id) = id {
                    doc.insert("_id", id);
                }
                ack.matched_count = 1;
                ack.modified_count = 1;
            }
            ResultData::Update(ack)
        }
        Operation::DeleteOne { filter, .. } => {
            let deleted_count = match docs.iter().position(|d| matches(d, &filter)) {
                Some(index) => {
                    docs.remove(index);
                    1
                }
                None => 0,
            };
            ResultData::Delete(DeleteAck { deleted_count })
        }
        Operation::DeleteMany { filter, .. } => ResultData::Delete(DeleteAck {
            deleted_count: delete_matching(docs, &filter),
        }),
        Operation::EstimatedDocumentCount { .. } => ResultData::Count(docs.len() as u64),
        Operation::CountDocuments { filter, .. } => {
            ResultData::Count(docs.iter().filter(|d| matches(d, &filter)).count() as u64)
        }
        Operation::Distinct { field, filter, .. } => {
            let mut values: Vec<Bson> = Vec::new();
            for value in docs
                .iter()
                .filter(|d| matches(d, &filter))
                .filter_map(|d| d.get(&field))
            {
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
            ResultData::Values(values)
        }
        Operation::BulkWrite { commands } => {
            let mut ack = BulkWriteAck::default();
            for command in commands {
                match command {
                    WriteCommand::InsertOne { document } => {
                        docs.push(with_id(document).1);
                        ack.inserted_count += 1;
                    }
                    WriteCommand::UpdateOne { filter, update, .. } => {
                        let result = update_docs(docs, &filter, &update, false);
                        ack.matched_count += result.matched_count as i64;
                        ack.modified_count += result.modified_count as i64;
                    }
                    WriteCommand::UpdateMany { filter, update, .. } => {
                        let result = update_docs(docs, &filter, &update, true);
                        ack.matched_count += result.matched_count as i64;
                        ack.modified_count += result.modified_count as i64;
                    }
                    WriteCommand::ReplaceOne {
                        filter,
                        replacement,
                        ..
                    } => {
                        if let Some(doc) = docs.iter_mut().find(|d| matches(d, &filter)) {
                            *doc = replacement;
                            ack.matched_count += 1;
                            ack.modified_count += 1;
                        }
                    }
                    WriteCommand::DeleteOne { filter } => {
                        if let Some(index) = docs.iter().position(|d| matches(d, &filter)) {
                            docs.remove(index);
                            ack.deleted_count += 1;
                        }
                    }
                    WriteCommand::DeleteMany { filter } => {
                        ack.deleted_count += delete_matching(docs, &filter) as i64;
                    }
                }
            }
            ResultData::BulkWrite(ack)
        }
        Operation::ListDatabases
        | Operation::ListCollections { .. }
        | Operation::RunCommand { .. } => unreachable!("database-scoped operations handled by apply"),
    }
}

fn update_docs(docs: &mut [Document], filter: &Document, update: &Document, many: bool) -> UpdateAck {
    let mut ack = UpdateAck {
        matched_count: 0,
        modified_count: 0,
        upserted_id: None,
    };
    for doc in docs.iter_mut().filter(|d| matches(d, filter)) {
        let before = doc.clone();
        apply_update(doc, update);
        ack.matched_count += 1;
        if *doc != before {
            ack.modified_count += 1;
        }
        if !many {
            break;
        }
    }
    ack
}

fn delete_matching(docs: &mut Vec<Document>, filter: &Document) -> u64 {
    let before = docs.len();
    docs.retain(|d| !matches(d, filter));
    (before - docs.len()) as u64
}
