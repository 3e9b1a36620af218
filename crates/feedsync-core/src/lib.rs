//! Feedsync Core Library
//!
//! Client core of a social feed: live-synchronized posts and comments, an
//! identity session and a media upload pipeline.
//!
//! ## Overview
//!
//! Users sign in, publish text posts with an optional image, and comment on
//! posts. Every client sees the same feed, newest first, updated live from a
//! shared multi-writer document store.
//!
//! ## Core Principles
//!
//! - **Live snapshots**: every remote change yields a complete, freshly
//!   ordered list; pending local writes sort as the newest entries
//! - **Synchronized release**: once a subscription is released none of its
//!   listeners run again
//! - **Upload before append**: a post referencing an image is written only
//!   after the image's URL is known
//!
//! ## Quick Start
//!
//! ```ignore
//! use feedsync_core::{FeedClient, FeedConfig, LoginForm, PostDraft};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (client, _backends) = FeedClient::in_memory(FeedConfig::default());
//!     let _observer = client.observe_identity();
//!
//!     client.identity().sign_in(&LoginForm::new("ann@example.com", "secret1")).await?;
//!
//!     let mut feed = client.feed_view();
//!     feed.open().await?;
//!
//!     let mut draft = PostDraft::new("First light over the harbor this morning");
//!     client.composer().submit_post(&mut draft).await?;
//!
//!     for post in feed.posts() {
//!         println!("{}: {}", post.author_name, post.text);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod authoring;
pub mod client;
pub mod config;
pub mod error;
pub mod feed;
pub mod identity;
pub mod logging;
pub mod media;
pub mod memory;
pub mod session;
pub mod sync;
pub mod types;

// Re-exports
pub use authoring::{
    CommentDraft, Composer, LoginForm, PasswordResetForm, PostDraft, RegistrationForm,
    MIN_PASSWORD_LEN,
};
pub use client::FeedClient;
pub use config::FeedConfig;
pub use error::{FeedError, FeedResult};
pub use feed::{CommentThread, FeedView};
pub use identity::{IdentityGateway, IdentityObserver, IdentityService, ProviderUser};
pub use media::{ObjectStore, TransferEvent, TransferHandle, UploadPipeline, UploadedMedia};
pub use session::SessionState;
pub use sync::{
    DocumentStore, DocumentSync, PendingWrite, Snapshot, SnapshotReceiver, Subscription,
    SubscriptionStatus, SyncEvent,
};
pub use types::*;
