//! Feed client: wires the identity gateway, upload pipeline, sync engine and
//! composer over one set of external services

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::authoring::Composer;
use crate::config::FeedConfig;
use crate::feed::{CommentThread, FeedView};
use crate::identity::{IdentityGateway, IdentityObserver, IdentityService};
use crate::media::{ObjectStore, UploadPipeline};
use crate::memory::MemoryBackends;
use crate::session::SessionState;
use crate::sync::{DocumentStore, DocumentSync, SyncEvent};
use crate::types::{DocId, Identity};

/// Entry point of the client core
///
/// # Example
///
/// ```ignore
/// let (client, _backends) = FeedClient::in_memory(FeedConfig::default());
/// let _observer = client.observe_identity();
///
/// client.identity().sign_in(&LoginForm::new("ann@example.com", "secret1")).await?;
///
/// let mut feed = client.feed_view();
/// feed.open().await?;
/// ```
pub struct FeedClient {
    config: FeedConfig,
    session: SessionState,
    gateway: IdentityGateway,
    uploader: Arc<UploadPipeline>,
    sync: Arc<DocumentSync>,
    composer: Composer,
}

impl FeedClient {
    pub fn new(
        config: FeedConfig,
        identity: Arc<dyn IdentityService>,
        objects: Arc<dyn ObjectStore>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        let session = SessionState::new();
        let gateway = IdentityGateway::new(identity, session.clone());
        let uploader = Arc::new(UploadPipeline::new(objects, &config));
        let sync = Arc::new(DocumentSync::new(documents, config.event_channel_capacity));
        let composer = Composer::new(sync.clone(), uploader.clone(), session.clone());
        info!(
            max_image_bytes = config.max_image_bytes,
            max_avatar_bytes = config.max_avatar_bytes,
            "Feed client created"
        );
        Self {
            config,
            session,
            gateway,
            uploader,
            sync,
            composer,
        }
    }

    /// Client over fresh in-memory services
    pub fn in_memory(config: FeedConfig) -> (Self, MemoryBackends) {
        let backends = MemoryBackends::new();
        let client = Self::new(
            config,
            backends.identity.clone(),
            backends.objects.clone(),
            backends.documents.clone(),
        );
        (client, backends)
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.session.current()
    }

    pub fn identity(&self) -> &IdentityGateway {
        &self.gateway
    }

    /// Start mirroring the identity service into the session
    pub fn observe_identity(&self) -> IdentityObserver {
        self.gateway.observe()
    }

    pub fn uploader(&self) -> &UploadPipeline {
        &self.uploader
    }

    pub fn sync(&self) -> &Arc<DocumentSync> {
        &self.sync
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.sync.subscribe_events()
    }

    pub fn feed_view(&self) -> FeedView {
        FeedView::new(self.sync.clone())
    }

    pub fn comment_thread(&self, post_id: DocId) -> CommentThread {
        CommentThread::new(self.sync.clone(), post_id)
    }
}
