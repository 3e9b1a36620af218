//! Live document synchronization layer
//!
//! Keeps local state consistent with a remote, multi-writer document store.
//!
//! ## Overview
//!
//! Every live query is a [`Subscription`]: a pump task reads the store's
//! snapshot stream, re-orders each snapshot newest-first and hands the full
//! list to the handle's listeners. Writes go through [`DocumentSync::append`]
//! or its detached variant.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  DocumentSync                                                   │
//! │  ├── store: Arc<dyn DocumentStore>   (external, black box)      │
//! │  ├── live: HashMap<CollectionRef, SubscriptionId>               │
//! │  │   └── at most one live handle per collection                 │
//! │  └── event_tx: broadcast::Sender<SyncEvent>                     │
//! │                                                                 │
//! │  Subscription<D> (one per open query)                           │
//! │  ├── pump task: store stream -> SnapshotBuilder -> gate         │
//! │  └── DeliveryGate: listeners + generation, held per delivery    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let sync = DocumentSync::new(store, 256);
//!
//! let feed = sync.subscribe::<Post>(CollectionRef::Posts).await?;
//! let mut snapshots = feed.snapshots();
//!
//! sync.append(&CollectionRef::Posts, &new_post).await?;
//!
//! while let Some(snapshot) = snapshots.recv().await {
//!     for post in snapshot.iter() {
//!         println!("{}: {}", post.author_name, post.text);
//!     }
//! }
//!
//! feed.release();
//! ```

pub mod engine;
pub mod events;
pub(crate) mod gate;
pub mod snapshot;
pub mod store;

pub use engine::{DocumentSync, PendingWrite, SnapshotReceiver, Subscription};
pub use events::{SubscriptionId, SubscriptionStatus, SyncEvent};
pub use gate::ListenerId;
pub use snapshot::{Document, NewDocument, Snapshot, SnapshotBuilder};
pub use store::{
    is_server_timestamp, server_timestamp, Direction, DocumentStore, Fields, RemoteDocument,
    RemoteSnapshotStream, TIMESTAMP_FIELD,
};
