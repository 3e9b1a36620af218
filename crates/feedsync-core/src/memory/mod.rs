//! In-memory backends
//!
//! Implementations of the three external services that keep everything in
//! process. Used by tests, the CLI simulator and [`FeedClient::in_memory`].
//! Each exposes hooks to inject failures and remote activity.
//!
//! [`FeedClient::in_memory`]: crate::client::FeedClient::in_memory

mod documents;
mod identity;
mod objects;

use std::sync::Arc;

pub use documents::{AppendRecord, CommitMode, MemoryDocumentStore};
pub use identity::MemoryIdentityService;
pub use objects::{MemoryObjectStore, MEMORY_BASE_URL};

/// Handles on the memory services behind an in-memory client
#[derive(Clone, Default)]
pub struct MemoryBackends {
    pub identity: Arc<MemoryIdentityService>,
    pub objects: Arc<MemoryObjectStore>,
    pub documents: Arc<MemoryDocumentStore>,
}

impl MemoryBackends {
    pub fn new() -> Self {
        Self::default()
    }
}
