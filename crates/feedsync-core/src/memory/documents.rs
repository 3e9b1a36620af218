//! In-memory document store

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{FeedError, FeedResult};
use crate::sync::{
    is_server_timestamp, Direction, DocumentStore, Fields, RemoteDocument, RemoteSnapshotStream,
    TIMESTAMP_FIELD,
};
use crate::types::DocId;

type Watcher = mpsc::UnboundedSender<FeedResult<Vec<RemoteDocument>>>;

/// When appended documents get their server timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitMode {
    /// Deliver the pending local echo, then commit straight away
    #[default]
    Immediate,
    /// Leave documents pending until [`MemoryDocumentStore::commit_pending`]
    Deferred,
}

/// An append received through the `DocumentStore` interface
#[derive(Debug, Clone, PartialEq)]
pub struct AppendRecord {
    pub collection_path: String,
    pub fields: Fields,
}

#[derive(Default)]
struct Collection {
    docs: Vec<RemoteDocument>,
    watchers: Vec<Watcher>,
}

impl Collection {
    fn notify(&mut self) {
        let docs = self.docs.clone();
        self.watchers
            .retain(|watcher| watcher.send(Ok(docs.clone())).is_ok());
    }
}

#[derive(Default)]
struct StoreState {
    collections: HashMap<String, Collection>,
    mode: CommitMode,
    last_millis: i64,
    fail_next_append: Option<String>,
    appends: Vec<AppendRecord>,
}

impl StoreState {
    /// Strictly increasing server clock
    fn next_timestamp(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        self.last_millis = now.max(self.last_millis + 1);
        self.last_millis
    }

    fn insert(&mut self, collection_path: &str, mut fields: Fields) -> DocId {
        let id = DocId::generate();
        let server_assigned = fields
            .get(TIMESTAMP_FIELD)
            .map(is_server_timestamp)
            .unwrap_or(false);
        if server_assigned {
            fields.insert(TIMESTAMP_FIELD.to_string(), Value::Null);
        }

        let commit_now = server_assigned && self.mode == CommitMode::Immediate;
        let millis = if commit_now { Some(self.next_timestamp()) } else { None };

        let collection = self.collections.entry(collection_path.to_string()).or_default();
        collection.docs.push(RemoteDocument {
            id: id.clone(),
            fields,
        });
        // Local echo first, as the write is seen before the server answers
        collection.notify();

        if let Some(millis) = millis {
            if let Some(doc) = collection.docs.last_mut() {
                doc.fields
                    .insert(TIMESTAMP_FIELD.to_string(), Value::from(millis));
            }
            collection.notify();
        }
        id
    }
}

/// Document store held in memory.
///
/// Snapshots list documents in insertion order; ordering is left to the
/// sync engine. Server-timestamp sentinels read back as `null` until the
/// document is committed.
#[derive(Default)]
pub struct MemoryDocumentStore {
    state: Mutex<StoreState>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_commit_mode(mode: CommitMode) -> Self {
        let store = Self::default();
        store.state.lock().mode = mode;
        store
    }

    pub fn set_commit_mode(&self, mode: CommitMode) {
        self.state.lock().mode = mode;
    }

    /// Assign server timestamps to every pending document, in insertion
    /// order. Returns how many documents were committed.
    pub fn commit_pending(&self) -> usize {
        let mut state = self.state.lock();
        let mut paths: Vec<String> = state.collections.keys().cloned().collect();
        paths.sort();

        let mut committed = 0;
        for path in paths {
            let pending: Vec<usize> = state.collections[&path]
                .docs
                .iter()
                .enumerate()
                .filter(|(_, doc)| matches!(doc.fields.get(TIMESTAMP_FIELD), Some(Value::Null)))
                .map(|(index, _)| index)
                .collect();
            if pending.is_empty() {
                continue;
            }
            for index in pending {
                let millis = state.next_timestamp();
                if let Some(collection) = state.collections.get_mut(&path) {
                    collection.docs[index]
                        .fields
                        .insert(TIMESTAMP_FIELD.to_string(), Value::from(millis));
                }
                committed += 1;
            }
            if let Some(collection) = state.collections.get_mut(&path) {
                collection.notify();
            }
        }
        debug!(committed, "Committed pending documents");
        committed
    }

    /// Reject the next append with `message`
    pub fn fail_next_append(&self, message: &str) {
        self.state.lock().fail_next_append = Some(message.to_string());
    }

    /// Fault every live query on `collection_path`. The queries end after
    /// the error.
    pub fn inject_error(&self, collection_path: &str, message: &str) {
        let mut state = self.state.lock();
        if let Some(collection) = state.collections.get_mut(collection_path) {
            for watcher in collection.watchers.drain(..) {
                let _ = watcher.send(Err(FeedError::Subscription(message.to_string())));
            }
        }
        info!(collection = collection_path, %message, "Injected live query fault");
    }

    /// Write a document as another client would. Not counted as an append.
    pub fn insert_remote(&self, collection_path: &str, fields: Fields) -> DocId {
        self.state.lock().insert(collection_path, fields)
    }

    /// Delete a document as another client would
    pub fn remove_remote(&self, collection_path: &str, id: &DocId) -> bool {
        let mut state = self.state.lock();
        let Some(collection) = state.collections.get_mut(collection_path) else {
            return false;
        };
        let before = collection.docs.len();
        collection.docs.retain(|doc| &doc.id != id);
        if collection.docs.len() == before {
            return false;
        }
        collection.notify();
        true
    }

    /// Documents currently stored under `collection_path`
    pub fn documents(&self, collection_path: &str) -> Vec<RemoteDocument> {
        self.state
            .lock()
            .collections
            .get(collection_path)
            .map(|collection| collection.docs.clone())
            .unwrap_or_default()
    }

    /// Appends received through the `DocumentStore` interface
    pub fn appends(&self) -> Vec<AppendRecord> {
        self.state.lock().appends.clone()
    }

    pub fn append_count(&self) -> usize {
        self.state.lock().appends.len()
    }

    /// Live queries on `collection_path` whose consumer is still attached
    pub fn watcher_count(&self, collection_path: &str) -> usize {
        let mut state = self.state.lock();
        match state.collections.get_mut(collection_path) {
            Some(collection) => {
                collection.watchers.retain(|watcher| !watcher.is_closed());
                collection.watchers.len()
            }
            None => 0,
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn append(&self, collection_path: &str, fields: Fields) -> FeedResult<DocId> {
        let mut state = self.state.lock();
        if let Some(message) = state.fail_next_append.take() {
            return Err(FeedError::Write(message));
        }
        state.appends.push(AppendRecord {
            collection_path: collection_path.to_string(),
            fields: fields.clone(),
        });
        Ok(state.insert(collection_path, fields))
    }

    async fn subscribe(
        &self,
        collection_path: &str,
        _order_field: &str,
        _direction: Direction,
    ) -> FeedResult<RemoteSnapshotStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.state.lock();
            let collection = state.collections.entry(collection_path.to_string()).or_default();
            let _ = tx.send(Ok(collection.docs.clone()));
            collection.watchers.push(tx);
        }
        debug!(collection = collection_path, "Opened memory live query");

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }
}
