//! Subscription status and sync events
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SubscriptionStatus: per-handle state                           │
//! │  ├── Connecting: store query opened, no snapshot yet            │
//! │  ├── Live: snapshots are flowing                                │
//! │  ├── Failed: the store reported a listener fault                │
//! │  └── Released: handle closed by its owner                       │
//! │                                                                 │
//! │  SyncEvent: notifications about sync activity                   │
//! │  ├── SubscriptionOpened / SubscriptionReleased                  │
//! │  ├── SnapshotDelivered                                          │
//! │  ├── SubscriptionFailed                                         │
//! │  └── WriteAcknowledged / WriteFailed                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use crate::types::{CollectionRef, DocId};

/// Identifier of one subscription handle, unique per `DocumentSync`
pub type SubscriptionId = u64;

/// State of a subscription handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// Waiting for the first snapshot
    Connecting,
    /// Snapshots are being delivered
    Live {
        /// Documents in the latest snapshot
        documents: usize,
    },
    /// The store's listener faulted; no retry is attempted
    Failed(String),
    /// The owner released the handle
    Released,
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        SubscriptionStatus::Connecting
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionStatus::Connecting => write!(f, "Connecting"),
            SubscriptionStatus::Live { documents } => write!(f, "Live ({} documents)", documents),
            SubscriptionStatus::Failed(msg) => write!(f, "Failed: {}", msg),
            SubscriptionStatus::Released => write!(f, "Released"),
        }
    }
}

/// Events emitted by the sync engine
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A live query was opened
    SubscriptionOpened {
        id: SubscriptionId,
        collection: CollectionRef,
    },
    /// A snapshot reached the handle's listeners
    SnapshotDelivered {
        id: SubscriptionId,
        collection: CollectionRef,
        /// Per-handle delivery sequence number
        sequence: u64,
        documents: usize,
    },
    /// The store's listener faulted
    SubscriptionFailed {
        id: SubscriptionId,
        collection: CollectionRef,
        message: String,
    },
    /// A handle was released
    SubscriptionReleased {
        id: SubscriptionId,
        collection: CollectionRef,
    },
    /// The store acknowledged a write
    WriteAcknowledged {
        collection: CollectionRef,
        doc_id: DocId,
    },
    /// The store rejected a write. The caller's input was already cleared.
    WriteFailed {
        collection: CollectionRef,
        message: String,
    },
}

impl SyncEvent {
    /// Get the collection associated with this event
    pub fn collection(&self) -> &CollectionRef {
        match self {
            SyncEvent::SubscriptionOpened { collection, .. } => collection,
            SyncEvent::SnapshotDelivered { collection, .. } => collection,
            SyncEvent::SubscriptionFailed { collection, .. } => collection,
            SyncEvent::SubscriptionReleased { collection, .. } => collection,
            SyncEvent::WriteAcknowledged { collection, .. } => collection,
            SyncEvent::WriteFailed { collection, .. } => collection,
        }
    }

    /// Whether this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SyncEvent::SubscriptionFailed { .. } | SyncEvent::WriteFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_default_is_connecting() {
        let status: SubscriptionStatus = Default::default();
        assert_eq!(status, SubscriptionStatus::Connecting);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(format!("{}", SubscriptionStatus::Connecting), "Connecting");
        assert_eq!(
            format!("{}", SubscriptionStatus::Live { documents: 3 }),
            "Live (3 documents)"
        );
        assert_eq!(
            format!("{}", SubscriptionStatus::Failed("Connection lost".to_string())),
            "Failed: Connection lost"
        );
        assert_eq!(format!("{}", SubscriptionStatus::Released), "Released");
    }

    #[test]
    fn test_event_collection() {
        let collection = CollectionRef::comments(DocId::new("p1"));
        let event = SyncEvent::WriteFailed {
            collection: collection.clone(),
            message: "permission denied".to_string(),
        };
        assert_eq!(event.collection(), &collection);
        assert!(event.is_failure());

        let event = SyncEvent::SubscriptionOpened {
            id: 1,
            collection: CollectionRef::Posts,
        };
        assert!(!event.is_failure());
    }
}
