//! Feed and comment-thread views
//!
//! A view owns at most one live subscription. Opening an open view and
//! closing a closed one are both no-ops, and dropping a view closes it.

use std::sync::Arc;

use tracing::debug;

use crate::error::FeedResult;
use crate::sync::{DocumentSync, SnapshotReceiver, Subscription, SubscriptionStatus};
use crate::types::{CollectionRef, Comment, DocId, Post};

/// The global post feed, newest first
pub struct FeedView {
    sync: Arc<DocumentSync>,
    posts: Option<Subscription<Post>>,
}

impl FeedView {
    pub fn new(sync: Arc<DocumentSync>) -> Self {
        Self { sync, posts: None }
    }

    /// Start the live posts query
    pub async fn open(&mut self) -> FeedResult<()> {
        if self.posts.is_none() {
            self.posts = Some(self.sync.subscribe(CollectionRef::Posts).await?);
        }
        Ok(())
    }

    /// Release the live query. Returns `false` if the view was not open.
    pub fn close(&mut self) -> bool {
        match self.posts.take() {
            Some(posts) => posts.release(),
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.posts.is_some()
    }

    pub fn status(&self) -> Option<SubscriptionStatus> {
        self.posts.as_ref().map(Subscription::status)
    }

    /// Posts of the latest snapshot
    pub fn posts(&self) -> Vec<Post> {
        self.posts
            .as_ref()
            .and_then(Subscription::latest)
            .map(|snapshot| snapshot.into_items())
            .unwrap_or_default()
    }

    pub fn snapshots(&self) -> Option<SnapshotReceiver<Post>> {
        self.posts.as_ref().map(Subscription::snapshots)
    }

    pub fn subscription(&self) -> Option<&Subscription<Post>> {
        self.posts.as_ref()
    }
}

impl Drop for FeedView {
    fn drop(&mut self) {
        self.close();
    }
}

/// Comments under one post, shown on demand
pub struct CommentThread {
    post_id: DocId,
    sync: Arc<DocumentSync>,
    comments: Option<Subscription<Comment>>,
}

impl CommentThread {
    pub fn new(sync: Arc<DocumentSync>, post_id: DocId) -> Self {
        Self {
            post_id,
            sync,
            comments: None,
        }
    }

    pub fn post_id(&self) -> &DocId {
        &self.post_id
    }

    pub async fn open(&mut self) -> FeedResult<()> {
        if self.comments.is_none() {
            let collection = CollectionRef::comments(self.post_id.clone());
            self.comments = Some(self.sync.subscribe(collection).await?);
            debug!(post_id = %self.post_id, "Comment thread opened");
        }
        Ok(())
    }

    pub fn close(&mut self) -> bool {
        match self.comments.take() {
            Some(comments) => {
                debug!(post_id = %self.post_id, "Comment thread closed");
                comments.release()
            }
            None => false,
        }
    }

    /// Show or hide the thread. Returns whether it is now open.
    pub async fn toggle(&mut self) -> FeedResult<bool> {
        if self.is_open() {
            self.close();
        } else {
            self.open().await?;
        }
        Ok(self.is_open())
    }

    pub fn is_open(&self) -> bool {
        self.comments.is_some()
    }

    pub fn status(&self) -> Option<SubscriptionStatus> {
        self.comments.as_ref().map(Subscription::status)
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.comments
            .as_ref()
            .and_then(Subscription::latest)
            .map(|snapshot| snapshot.into_items())
            .unwrap_or_default()
    }

    pub fn snapshots(&self) -> Option<SnapshotReceiver<Comment>> {
        self.comments.as_ref().map(Subscription::snapshots)
    }

    pub fn subscription(&self) -> Option<&Subscription<Comment>> {
        self.comments.as_ref()
    }
}

impl Drop for CommentThread {
    fn drop(&mut self) {
        self.close();
    }
}
