//! In-memory object store

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{FeedError, FeedResult};
use crate::media::{ObjectStore, TransferEvent, TransferHandle};

/// Default public URL base of the memory store
pub const MEMORY_BASE_URL: &str = "memory://objects";

/// Bytes reported per progress event
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Default)]
struct ObjectState {
    objects: HashMap<String, Bytes>,
    fail_next: Option<String>,
    puts: Vec<String>,
}

/// Object store held in memory.
///
/// Every `put` reports progress in fixed-size chunks and then completes.
/// An object becomes retrievable only once its transfer completed.
pub struct MemoryObjectStore {
    base_url: String,
    state: Mutex<ObjectState>,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::with_base_url(MEMORY_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            state: Mutex::new(ObjectState::default()),
        }
    }

    /// Abort the next transfer after its first chunk
    pub fn fail_next_transfer(&self, message: &str) {
        self.state.lock().fail_next = Some(message.to_string());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state.lock().objects.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.state.lock().objects.get(path).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().objects.len()
    }

    /// Paths of every transfer started, in order
    pub fn puts(&self) -> Vec<String> {
        self.state.lock().puts.clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, path: &str, bytes: Bytes) -> FeedResult<TransferHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let total = bytes.len() as u64;
        let mut state = self.state.lock();
        state.puts.push(path.to_string());

        if let Some(message) = state.fail_next.take() {
            let transferred = bytes.len().min(CHUNK_SIZE) as u64;
            let _ = tx.send(TransferEvent::Progress { transferred, total });
            let _ = tx.send(TransferEvent::Failed(message));
            debug!(%path, "Memory transfer failed");
            return Ok(TransferHandle::from_channel(rx));
        }

        let mut transferred = 0usize;
        while transferred < bytes.len() {
            transferred = (transferred + CHUNK_SIZE).min(bytes.len());
            let _ = tx.send(TransferEvent::Progress {
                transferred: transferred as u64,
                total,
            });
        }
        state.objects.insert(path.to_string(), bytes);
        let _ = tx.send(TransferEvent::Completed);
        debug!(%path, total, "Memory transfer completed");
        Ok(TransferHandle::from_channel(rx))
    }

    async fn public_url(&self, path: &str) -> FeedResult<String> {
        if !self.contains(path) {
            return Err(FeedError::Upload(format!("object not found: {}", path)));
        }
        Ok(format!("{}/{}", self.base_url, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_reports_progress_then_completes() {
        let store = MemoryObjectStore::new();
        let payload = Bytes::from(vec![7u8; CHUNK_SIZE * 2 + 1]);
        let mut transfer = store.put("images/a", payload).await.unwrap();

        let mut progress = Vec::new();
        loop {
            match transfer.next_event().await.unwrap() {
                TransferEvent::Progress { transferred, .. } => progress.push(transferred),
                TransferEvent::Completed => break,
                TransferEvent::Failed(m) => panic!("unexpected failure {}", m),
            }
        }
        assert_eq!(progress.len(), 3);
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(
            store.public_url("images/a").await.unwrap(),
            "memory://objects/images/a"
        );
    }

    #[tokio::test]
    async fn test_unknown_object_has_no_url() {
        let store = MemoryObjectStore::new();
        assert!(store.public_url("images/missing").await.is_err());
    }
}
