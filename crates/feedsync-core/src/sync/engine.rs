//! Live subscriptions and the write path
//!
//! `DocumentSync` opens live queries against the document store and issues
//! appends. Each open query is a [`Subscription`] owning one background pump
//! task; the pump turns every remote change into a freshly ordered
//! [`Snapshot`] and delivers it through the handle's delivery gate.
//!
//! ## Lifecycle
//!
//! - At most one live handle per collection. Subscribing again before the
//!   previous handle is released fails with `FeedError::AlreadySubscribed`.
//! - `Subscription::release` is idempotent. Once it returns, no listener of
//!   the handle runs again, including a delivery the pump already dispatched.
//! - A handle dropped without `release` is released on drop, with a warning.
//!
//! ## Failures
//!
//! A listener fault reported by the store is logged, broadcast as
//! `SyncEvent::SubscriptionFailed` and recorded in the handle's status. No
//! retry is attempted; the handle stays registered until its owner releases it.
//!
//! Writes are optimistic: callers clear their input as soon as the append is
//! issued. A rejected write is logged and broadcast as `SyncEvent::WriteFailed`
//! but never retried or rolled back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::events::{SubscriptionId, SubscriptionStatus, SyncEvent};
use super::gate::{DeliveryGate, ListenerId};
use super::snapshot::{Document, NewDocument, Snapshot, SnapshotBuilder};
use super::store::{Direction, DocumentStore, Fields, RemoteSnapshotStream, TIMESTAMP_FIELD};
use crate::error::{FeedError, FeedResult};
use crate::types::{CollectionRef, DocId};

/// Default capacity for the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Collection -> id of its live handle
type LiveHandles = Arc<Mutex<HashMap<CollectionRef, SubscriptionId>>>;

/// State shared between a handle and its pump task
struct HandleShared<D> {
    id: SubscriptionId,
    collection: CollectionRef,
    gate: DeliveryGate<Snapshot<D>>,
    status: Mutex<SubscriptionStatus>,
}

impl<D: Document> HandleShared<D> {
    /// Hand a snapshot to the listeners. `false` once the handle is released.
    fn deliver(
        &self,
        generation: u64,
        snapshot: Snapshot<D>,
        event_tx: &broadcast::Sender<SyncEvent>,
    ) -> bool {
        let sequence = snapshot.sequence();
        let documents = snapshot.len();
        if !self.gate.deliver(generation, snapshot) {
            return false;
        }

        {
            let mut status = self.status.lock();
            if *status != SubscriptionStatus::Released {
                *status = SubscriptionStatus::Live { documents };
            }
        }
        debug!(collection = %self.collection, id = self.id, sequence, documents, "Delivered snapshot");
        let _ = event_tx.send(SyncEvent::SnapshotDelivered {
            id: self.id,
            collection: self.collection.clone(),
            sequence,
            documents,
        });
        true
    }

    /// Record a listener fault. Receivers are disconnected so they stop
    /// waiting; the handle itself stays registered until released.
    fn fail(&self, message: String, event_tx: &broadcast::Sender<SyncEvent>) {
        if !self.gate.is_open() {
            return;
        }
        warn!(collection = %self.collection, id = self.id, %message, "Live query failed");
        *self.status.lock() = SubscriptionStatus::Failed(message.clone());
        self.gate.disconnect_listeners();
        let _ = event_tx.send(SyncEvent::SubscriptionFailed {
            id: self.id,
            collection: self.collection.clone(),
            message,
        });
    }
}

/// Entry point for live queries and writes against the document store
///
/// # Example
///
/// ```ignore
/// let sync = DocumentSync::new(store, EVENT_CHANNEL_CAPACITY);
///
/// let thread = sync.subscribe::<Comment>(CollectionRef::comments(post_id)).await?;
/// thread.listen(|snapshot| println!("{} comments", snapshot.len()));
///
/// let pending = sync.append_detached(&CollectionRef::comments(post_id), &comment);
///
/// thread.release();
/// assert_eq!(sync.open_handles(), 0);
/// ```
pub struct DocumentSync {
    store: Arc<dyn DocumentStore>,
    live: LiveHandles,
    next_id: AtomicU64,
    event_tx: broadcast::Sender<SyncEvent>,
}

impl DocumentSync {
    /// Create a sync engine over `store`
    pub fn new(store: Arc<dyn DocumentStore>, event_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));
        Self {
            store,
            live: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            event_tx,
        }
    }

    /// Subscribe to sync events
    ///
    /// Multiple subscribers can exist; events are broadcast to all.
    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Number of live subscription handles
    pub fn open_handles(&self) -> usize {
        self.live.lock().len()
    }

    /// Check whether a collection has a live handle
    pub fn is_subscribed(&self, collection: &CollectionRef) -> bool {
        self.live.lock().contains_key(collection)
    }

    /// Collections that currently have a live handle
    pub fn live_collections(&self) -> Vec<CollectionRef> {
        self.live.lock().keys().cloned().collect()
    }

    /// Open a live query over `collection`, ordered by creation time
    /// descending.
    ///
    /// # Errors
    ///
    /// `FeedError::AlreadySubscribed` if the collection already has a live
    /// handle; any error the store reports while opening the query.
    pub async fn subscribe<D: Document>(
        &self,
        collection: CollectionRef,
    ) -> FeedResult<Subscription<D>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;

        // Reserve the collection before awaiting the store
        {
            let mut live = self.live.lock();
            if live.contains_key(&collection) {
                warn!(%collection, "Collection already has a live subscription");
                return Err(FeedError::AlreadySubscribed(collection.path()));
            }
            live.insert(collection.clone(), id);
        }

        let stream = match self
            .store
            .subscribe(&collection.path(), TIMESTAMP_FIELD, Direction::Descending)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                self.live.lock().remove(&collection);
                warn!(%collection, error = %e, "Failed to open live query");
                return Err(e);
            }
        };

        let shared = Arc::new(HandleShared {
            id,
            collection: collection.clone(),
            gate: DeliveryGate::new(),
            status: Mutex::new(SubscriptionStatus::Connecting),
        });

        info!(%collection, id, "Opened subscription");
        let _ = self.event_tx.send(SyncEvent::SubscriptionOpened {
            id,
            collection,
        });

        let generation = shared.gate.generation();
        let task = tokio::spawn(pump(
            stream,
            shared.clone(),
            generation,
            self.event_tx.clone(),
        ));

        Ok(Subscription {
            shared,
            live: self.live.clone(),
            task: Mutex::new(Some(task)),
            event_tx: self.event_tx.clone(),
        })
    }

    /// Append a document and wait for the store's acknowledgement
    pub async fn append<N: NewDocument>(
        &self,
        collection: &CollectionRef,
        doc: &N,
    ) -> FeedResult<DocId> {
        append_fields(
            self.store.clone(),
            collection.clone(),
            doc.to_fields(),
            self.event_tx.clone(),
        )
        .await
    }

    /// Issue an append without waiting for it.
    ///
    /// The document's fields are captured now; the write runs on a spawned
    /// task. The returned [`PendingWrite`] may be awaited or dropped.
    pub fn append_detached<N: NewDocument>(
        &self,
        collection: &CollectionRef,
        doc: &N,
    ) -> PendingWrite {
        let fields = doc.to_fields();
        debug!(%collection, "Issuing detached append");
        let task = tokio::spawn(append_fields(
            self.store.clone(),
            collection.clone(),
            fields,
            self.event_tx.clone(),
        ));
        PendingWrite {
            collection: collection.clone(),
            task,
        }
    }
}

async fn append_fields(
    store: Arc<dyn DocumentStore>,
    collection: CollectionRef,
    fields: Fields,
    event_tx: broadcast::Sender<SyncEvent>,
) -> FeedResult<DocId> {
    match store.append(&collection.path(), fields).await {
        Ok(doc_id) => {
            debug!(%collection, %doc_id, "Write acknowledged");
            let _ = event_tx.send(SyncEvent::WriteAcknowledged {
                collection,
                doc_id: doc_id.clone(),
            });
            Ok(doc_id)
        }
        Err(e) => {
            let message = match e {
                FeedError::Write(message) => message,
                other => other.to_string(),
            };
            // The author's input is already gone; nothing is retried or restored
            error!(%collection, %message, "Write rejected by store");
            let _ = event_tx.send(SyncEvent::WriteFailed {
                collection,
                message: message.clone(),
            });
            Err(FeedError::Write(message))
        }
    }
}

/// Background task feeding one subscription handle
async fn pump<D: Document>(
    mut stream: RemoteSnapshotStream,
    shared: Arc<HandleShared<D>>,
    generation: u64,
    event_tx: broadcast::Sender<SyncEvent>,
) {
    debug!(collection = %shared.collection, id = shared.id, "Pump started");
    let mut builder = SnapshotBuilder::new();

    while let Some(next) = stream.next().await {
        match next {
            Ok(docs) => {
                let snapshot: Snapshot<D> = builder.build(&shared.collection, docs);
                if !shared.deliver(generation, snapshot, &event_tx) {
                    debug!(collection = %shared.collection, id = shared.id, "Handle released, pump stopping");
                    return;
                }
            }
            Err(e) => {
                shared.fail(e.to_string(), &event_tx);
                return;
            }
        }
    }

    shared.fail("live query closed by the store".to_string(), &event_tx);
}

/// A live, cancellable query over one collection
pub struct Subscription<D: Document> {
    shared: Arc<HandleShared<D>>,
    live: LiveHandles,
    task: Mutex<Option<JoinHandle<()>>>,
    event_tx: broadcast::Sender<SyncEvent>,
}

impl<D: Document> Subscription<D> {
    pub fn id(&self) -> SubscriptionId {
        self.shared.id
    }

    pub fn collection(&self) -> &CollectionRef {
        &self.shared.collection
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.shared.status.lock().clone()
    }

    pub fn is_released(&self) -> bool {
        !self.shared.gate.is_open()
    }

    /// The most recently delivered snapshot
    pub fn latest(&self) -> Option<Snapshot<D>> {
        self.shared.gate.last()
    }

    /// Register a listener for every future snapshot. The latest snapshot,
    /// if any, is replayed to it first.
    ///
    /// The listener runs with the handle's delivery lock held. It may release
    /// this handle, which stops the delivery once the listener returns, but
    /// must not listen or unlisten on it synchronously.
    ///
    /// Returns `None` if the handle was already released.
    pub fn listen<F>(&self, listener: F) -> Option<ListenerId>
    where
        F: Fn(&Snapshot<D>) + Send + Sync + 'static,
    {
        self.shared.gate.add_listener(listener)
    }

    pub fn unlisten(&self, listener: ListenerId) -> bool {
        self.shared.gate.remove_listener(listener)
    }

    /// Number of listeners currently registered
    pub fn listener_count(&self) -> usize {
        self.shared.gate.listener_count()
    }

    /// Receive snapshots as an async stream.
    ///
    /// `recv` yields `None` once the handle is released (snapshots still
    /// buffered at that point are discarded) or after a listener fault.
    pub fn snapshots(&self) -> SnapshotReceiver<D> {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = self.shared.gate.add_listener(move |snapshot: &Snapshot<D>| {
            let _ = tx.send(snapshot.clone());
        });
        SnapshotReceiver {
            rx,
            shared: self.shared.clone(),
            listener,
        }
    }

    /// Release the handle.
    ///
    /// Idempotent: returns `true` for the call that released it and `false`
    /// afterwards. No listener runs after this returns.
    pub fn release(&self) -> bool {
        if !self.shared.gate.close() {
            return false;
        }
        *self.shared.status.lock() = SubscriptionStatus::Released;

        if let Some(task) = self.task.lock().take() {
            task.abort();
        }

        {
            let mut live = self.live.lock();
            if live.get(&self.shared.collection) == Some(&self.shared.id) {
                live.remove(&self.shared.collection);
            }
        }

        info!(collection = %self.shared.collection, id = self.shared.id, "Released subscription");
        let _ = self.event_tx.send(SyncEvent::SubscriptionReleased {
            id: self.shared.id,
            collection: self.shared.collection.clone(),
        });
        true
    }
}

impl<D: Document> Drop for Subscription<D> {
    fn drop(&mut self) {
        if self.shared.gate.is_open() {
            warn!(collection = %self.shared.collection, id = self.shared.id, "Subscription dropped without release");
            self.release();
        }
    }
}

impl<D: Document> std::fmt::Debug for Subscription<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.shared.id)
            .field("collection", &self.shared.collection)
            .field("status", &self.status())
            .finish()
    }
}

/// Async receiver of a handle's snapshots
pub struct SnapshotReceiver<D: Document> {
    rx: mpsc::UnboundedReceiver<Snapshot<D>>,
    shared: Arc<HandleShared<D>>,
    listener: Option<ListenerId>,
}

impl<D: Document> SnapshotReceiver<D> {
    /// Wait for the next snapshot
    pub async fn recv(&mut self) -> Option<Snapshot<D>> {
        let snapshot = self.rx.recv().await?;
        if !self.shared.gate.is_open() {
            return None;
        }
        Some(snapshot)
    }

    /// Take a buffered snapshot without waiting
    pub fn try_recv(&mut self) -> Option<Snapshot<D>> {
        let snapshot = self.rx.try_recv().ok()?;
        if !self.shared.gate.is_open() {
            return None;
        }
        Some(snapshot)
    }
}

impl<D: Document> Drop for SnapshotReceiver<D> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.shared.gate.remove_listener(listener);
        }
    }
}

/// An append that was issued but not necessarily acknowledged
#[derive(Debug)]
pub struct PendingWrite {
    collection: CollectionRef,
    task: JoinHandle<FeedResult<DocId>>,
}

impl PendingWrite {
    pub fn collection(&self) -> &CollectionRef {
        &self.collection
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the store's answer
    pub async fn acknowledged(self) -> FeedResult<DocId> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(FeedError::Write(format!("write task ended: {}", e))),
        }
    }
}
