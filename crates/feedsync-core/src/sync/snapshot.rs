//! Snapshot reconciliation: remote documents to a newest-first list
//!
//! Every remote change produces a complete list, never a diff. The list is
//! re-sorted on each delivery by `created_at` descending. Pending writes sort
//! as the most recent; equal keys keep arrival order, the document observed
//! first by this handle coming first.

use std::collections::HashMap;

use tracing::warn;

use super::store::{Fields, RemoteDocument};
use crate::error::FeedResult;
use crate::types::{CollectionRef, CreatedAt, DocId};

/// A document type readable from a live subscription
pub trait Document: Clone + Send + Sync + 'static {
    /// Decode a remote document read from `collection`
    fn from_remote(collection: &CollectionRef, doc: &RemoteDocument) -> FeedResult<Self>;

    fn id(&self) -> &DocId;

    fn created_at(&self) -> CreatedAt;
}

/// A document type that can be appended to a collection
pub trait NewDocument: Send + Sync {
    /// Fields to write, including the server-timestamp sentinel
    fn to_fields(&self) -> Fields;
}

/// A complete, ordered view of a collection at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<D> {
    sequence: u64,
    items: Vec<D>,
}

impl<D> Snapshot<D> {
    /// Position of this snapshot in its handle's delivery order, from 1
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn items(&self) -> &[D] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, D> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<D> {
        self.items
    }
}

impl<D: Document> Snapshot<D> {
    /// Document ids in delivery order
    pub fn ids(&self) -> Vec<DocId> {
        self.items.iter().map(|d| d.id().clone()).collect()
    }

    pub fn get(&self, id: &DocId) -> Option<&D> {
        self.items.iter().find(|d| d.id() == id)
    }
}

/// Per-handle snapshot assembly.
///
/// Remembers when each document was first observed so ties keep a stable
/// arrival order across snapshots.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    first_seen: HashMap<DocId, u64>,
    next_arrival: u64,
    next_sequence: u64,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshots built so far
    pub fn built(&self) -> u64 {
        self.next_sequence
    }

    /// Decode and order one remote snapshot.
    ///
    /// Documents that fail to decode are skipped and logged; they do not
    /// break the rest of the snapshot.
    pub fn build<D: Document>(
        &mut self,
        collection: &CollectionRef,
        docs: Vec<RemoteDocument>,
    ) -> Snapshot<D> {
        let mut ranked = Vec::with_capacity(docs.len());
        for doc in &docs {
            let arrival = match self.first_seen.get(&doc.id) {
                Some(arrival) => *arrival,
                None => {
                    let arrival = self.next_arrival;
                    self.next_arrival += 1;
                    self.first_seen.insert(doc.id.clone(), arrival);
                    arrival
                }
            };
            match D::from_remote(collection, doc) {
                Ok(item) => ranked.push((arrival, item)),
                Err(e) => warn!(%collection, doc_id = %doc.id, error = %e, "Skipping malformed document"),
            }
        }

        // Forget documents that left the collection
        if self.first_seen.len() > docs.len() {
            let present: std::collections::HashSet<&DocId> = docs.iter().map(|d| &d.id).collect();
            self.first_seen.retain(|id, _| present.contains(id));
        }

        ranked.sort_by(|(arrival_a, a), (arrival_b, b)| {
            b.created_at()
                .cmp(&a.created_at())
                .then(arrival_a.cmp(arrival_b))
        });

        self.next_sequence += 1;
        Snapshot {
            sequence: self.next_sequence,
            items: ranked.into_iter().map(|(_, item)| item).collect(),
        }
    }
}
