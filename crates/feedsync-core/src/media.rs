//! Media upload pipeline
//!
//! Uploads user media to the object store under collision-resistant names and
//! resolves a public URL once the transfer has completed.
//!
//! # Naming
//!
//! A stored name is a 16-symbol random prefix, an underscore and the original
//! file name: `images/Xb3kQ9...Lm_cat.png`. Each symbol is drawn uniformly
//! from `a-z A-Z 0-9` with the thread-local CSPRNG, so two concurrent uploads
//! of `cat.png` end up under different paths.
//!
//! # Example
//!
//! ```ignore
//! let pipeline = UploadPipeline::new(object_store, &FeedConfig::default());
//! let media = pipeline.upload_file(&file, MediaNamespace::Images).await?;
//! println!("{} -> {}", media.path, media.url);
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::error::{FeedError, FeedResult};
use crate::types::{MediaFile, MediaNamespace};

/// Length of the random stored-name prefix
pub const NAME_PREFIX_LEN: usize = 16;

/// Symbols the random prefix is drawn from
pub const NAME_ALPHABET: &[u8; 62] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Progress report of an object-store transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    Progress { transferred: u64, total: u64 },
    Failed(String),
    Completed,
}

/// Event stream of one running transfer
pub struct TransferHandle {
    events: BoxStream<'static, TransferEvent>,
}

impl TransferHandle {
    pub fn from_stream(events: BoxStream<'static, TransferEvent>) -> Self {
        Self { events }
    }

    pub fn from_channel(rx: mpsc::UnboundedReceiver<TransferEvent>) -> Self {
        let events = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Self::from_stream(events.boxed())
    }

    /// Next event, or `None` once the store stops reporting
    pub async fn next_event(&mut self) -> Option<TransferEvent> {
        self.events.next().await
    }
}

/// Binary object storage with public retrieval URLs
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Start uploading `bytes` to `path`
    async fn put(&self, path: &str, bytes: Bytes) -> FeedResult<TransferHandle>;

    /// Public URL of a stored object
    async fn public_url(&self, path: &str) -> FeedResult<String>;
}

/// Result of a completed upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    /// Object path, e.g. `images/<stored name>`
    pub path: String,
    /// Public retrieval URL
    pub url: String,
}

/// Random prefix for a stored name
pub fn random_prefix() -> String {
    let mut rng = rand::rng();
    (0..NAME_PREFIX_LEN)
        .map(|_| NAME_ALPHABET[rng.random_range(0..NAME_ALPHABET.len())] as char)
        .collect()
}

/// Collision-resistant stored name for `original_name`
pub fn stored_name(original_name: &str) -> String {
    format!("{}_{}", random_prefix(), original_name)
}

/// Object path of a stored name inside a namespace
pub fn object_path(namespace: MediaNamespace, stored_name: &str) -> String {
    format!("{}/{}", namespace.prefix(), stored_name)
}

/// Uploads media and resolves retrieval URLs. No retries.
pub struct UploadPipeline {
    store: Arc<dyn ObjectStore>,
    max_image_bytes: usize,
    max_avatar_bytes: usize,
}

impl UploadPipeline {
    pub fn new(store: Arc<dyn ObjectStore>, config: &FeedConfig) -> Self {
        Self {
            store,
            max_image_bytes: config.max_image_bytes,
            max_avatar_bytes: config.max_avatar_bytes,
        }
    }

    fn limit(&self, namespace: MediaNamespace) -> usize {
        match namespace {
            MediaNamespace::Images => self.max_image_bytes,
            MediaNamespace::Avatars => self.max_avatar_bytes,
        }
    }

    /// Upload a picked file
    pub async fn upload_file(
        &self,
        file: &MediaFile,
        namespace: MediaNamespace,
    ) -> FeedResult<UploadedMedia> {
        self.upload(file.bytes.clone(), &file.name, namespace).await
    }

    /// Upload `bytes` and return its public URL.
    ///
    /// The URL is resolved only after the store reports completion. A failed
    /// transfer, or one whose event stream ends early, is reported once as
    /// `FeedError::Upload`.
    pub async fn upload(
        &self,
        bytes: Bytes,
        original_name: &str,
        namespace: MediaNamespace,
    ) -> FeedResult<UploadedMedia> {
        if bytes.is_empty() {
            return Err(FeedError::UploadRejected(format!(
                "{} is empty",
                original_name
            )));
        }
        let limit = self.limit(namespace);
        if bytes.len() > limit {
            return Err(FeedError::UploadRejected(format!(
                "{} too large: {} bytes (max {} bytes / {} KB)",
                original_name,
                bytes.len(),
                limit,
                limit / 1024
            )));
        }

        let path = object_path(namespace, &stored_name(original_name));
        debug!(%path, bytes = bytes.len(), "Starting upload");

        let mut transfer = self.store.put(&path, bytes).await.map_err(as_upload_error)?;
        loop {
            match transfer.next_event().await {
                Some(TransferEvent::Progress { transferred, total }) => {
                    debug!(%path, transferred, total, "Upload progress");
                }
                Some(TransferEvent::Completed) => break,
                Some(TransferEvent::Failed(message)) => {
                    warn!(%path, %message, "Upload failed");
                    return Err(FeedError::Upload(message));
                }
                None => {
                    warn!(%path, "Transfer ended without completing");
                    return Err(FeedError::Upload(format!(
                        "transfer of {} ended before completion",
                        path
                    )));
                }
            }
        }

        let url = self.store.public_url(&path).await.map_err(as_upload_error)?;
        info!(%path, %url, "Upload complete");
        Ok(UploadedMedia { path, url })
    }
}

fn as_upload_error(err: FeedError) -> FeedError {
    match err {
        FeedError::Upload(_) => err,
        other => FeedError::Upload(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryObjectStore;

    fn pipeline(store: &Arc<MemoryObjectStore>) -> UploadPipeline {
        UploadPipeline::new(store.clone(), &FeedConfig::default())
    }

    #[test]
    fn test_prefix_shape() {
        for _ in 0..100 {
            let prefix = random_prefix();
            assert_eq!(prefix.len(), NAME_PREFIX_LEN);
            assert!(prefix.bytes().all(|b| NAME_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_same_name_gets_distinct_stored_names() {
        let a = stored_name("cat.png");
        let b = stored_name("cat.png");
        assert_ne!(a, b);
        assert!(a.ends_with("_cat.png"));
        assert_eq!(a.len(), NAME_PREFIX_LEN + 1 + "cat.png".len());
    }

    #[test]
    fn test_object_path_uses_namespace() {
        assert_eq!(object_path(MediaNamespace::Images, "x_a.png"), "images/x_a.png");
        assert_eq!(object_path(MediaNamespace::Avatars, "x_a.png"), "avatars/x_a.png");
    }

    #[tokio::test]
    async fn test_upload_resolves_url_after_completion() {
        let store = Arc::new(MemoryObjectStore::new());
        let media = pipeline(&store)
            .upload(Bytes::from_static(b"png"), "cat.png", MediaNamespace::Images)
            .await
            .unwrap();
        assert!(media.path.starts_with("images/"));
        assert!(media.path.ends_with("_cat.png"));
        assert!(media.url.ends_with(&media.path));
        assert!(store.contains(&media.path));
    }

    #[tokio::test]
    async fn test_failed_transfer_yields_no_url() {
        let store = Arc::new(MemoryObjectStore::new());
        store.fail_next_transfer("network reset");
        let err = pipeline(&store)
            .upload(Bytes::from(vec![1u8; 200_000]), "big.png", MediaNamespace::Images)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Upload(ref m) if m == "network reset"));
        assert_eq!(store.object_count(), 0);
    }

    #[tokio::test]
    async fn test_oversized_and_empty_payloads_are_rejected() {
        let store = Arc::new(MemoryObjectStore::new());
        let pipeline = pipeline(&store);
        let too_big = Bytes::from(vec![0u8; FeedConfig::default().max_avatar_bytes + 1]);
        let err = pipeline
            .upload(too_big, "me.png", MediaNamespace::Avatars)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::UploadRejected(_)));

        let err = pipeline
            .upload(Bytes::new(), "none.png", MediaNamespace::Images)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::UploadRejected(_)));
        assert!(store.puts().is_empty());
    }

    #[tokio::test]
    async fn test_stream_ending_early_is_a_failure() {
        struct SilentStore;

        #[async_trait]
        impl ObjectStore for SilentStore {
            async fn put(&self, _path: &str, _bytes: Bytes) -> FeedResult<TransferHandle> {
                let (tx, rx) = mpsc::unbounded_channel();
                let _ = tx.send(TransferEvent::Progress { transferred: 1, total: 2 });
                Ok(TransferHandle::from_channel(rx))
            }

            async fn public_url(&self, path: &str) -> FeedResult<String> {
                Ok(format!("https://never/{}", path))
            }
        }

        let pipeline = UploadPipeline::new(Arc::new(SilentStore), &FeedConfig::default());
        let err = pipeline
            .upload(Bytes::from_static(b"x"), "a.png", MediaNamespace::Images)
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Upload(_)));
    }
}
