//! Authoring: forms, drafts and the composer that turns them into writes
//!
//! ## Submit flow
//!
//! ```text
//! PostDraft ──► upload image (optional) ──► append to posts ──► clear draft
//!                    │                            │
//!                    └─ fails: draft kept,        └─ detached: the draft is
//!                       nothing appended             cleared before the store
//!                                                    answers
//! ```
//!
//! Author fields are copied from the session identity at submit time.

use std::sync::Arc;

use tracing::info;

use crate::error::{FeedError, FeedResult};
use crate::media::UploadPipeline;
use crate::session::SessionState;
use crate::sync::{DocumentSync, PendingWrite};
use crate::types::{CollectionRef, DocId, Identity, MediaFile, MediaNamespace, NewComment, NewPost};

/// Shortest password the identity service accepts
pub const MIN_PASSWORD_LEN: usize = 6;

fn password_ok(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

/// Email/password sign-in form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl LoginForm {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn can_submit(&self) -> bool {
        !self.email.is_empty() && password_ok(&self.password)
    }
}

/// Account creation form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub avatar: Option<MediaFile>,
}

impl RegistrationForm {
    pub fn can_submit(&self) -> bool {
        !self.username.is_empty()
            && !self.email.is_empty()
            && self.avatar.is_some()
            && password_ok(&self.password)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordResetForm {
    pub email: String,
}

impl PasswordResetForm {
    pub fn new(email: impl Into<String>) -> Self {
        Self { email: email.into() }
    }

    pub fn can_submit(&self) -> bool {
        !self.email.is_empty()
    }
}

/// A post being written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostDraft {
    pub text: String,
    pub image: Option<MediaFile>,
}

impl PostDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: MediaFile) -> Self {
        self.image = Some(image);
        self
    }

    /// Text is required; an image alone is not enough
    pub fn can_submit(&self) -> bool {
        !self.text.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.image = None;
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.image.is_none()
    }
}

/// A comment being written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentDraft {
    pub text: String,
}

impl CommentDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn can_submit(&self) -> bool {
        !self.text.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}

/// Turns drafts into appends on behalf of the signed-in identity
#[derive(Clone)]
pub struct Composer {
    sync: Arc<DocumentSync>,
    uploader: Arc<UploadPipeline>,
    session: SessionState,
}

impl Composer {
    pub fn new(sync: Arc<DocumentSync>, uploader: Arc<UploadPipeline>, session: SessionState) -> Self {
        Self {
            sync,
            uploader,
            session,
        }
    }

    fn author(&self) -> FeedResult<Identity> {
        self.session.current().ok_or(FeedError::NotSignedIn)
    }

    /// Publish a post.
    ///
    /// The image, if any, is uploaded first; the append is issued only after
    /// the upload produced a URL. If the upload fails nothing is appended and
    /// the draft is left as it was. Once the append is issued the draft is
    /// cleared without waiting for the store.
    pub async fn submit_post(&self, draft: &mut PostDraft) -> FeedResult<PendingWrite> {
        let author = self.author()?;

        let image_url = match draft.image.as_ref() {
            Some(image) => {
                self.uploader
                    .upload_file(image, MediaNamespace::Images)
                    .await?
                    .url
            }
            None => String::new(),
        };

        let post = NewPost {
            author_avatar_url: author.avatar_url,
            author_name: author.display_name,
            text: draft.text.clone(),
            image_url,
        };
        let pending = self.sync.append_detached(&CollectionRef::Posts, &post);
        draft.clear();
        info!(author = %post.author_name, has_image = !post.image_url.is_empty(), "Post submitted");
        Ok(pending)
    }

    /// Publish a comment under `post_id`. An empty draft is a no-op.
    pub fn submit_comment(
        &self,
        post_id: &DocId,
        draft: &mut CommentDraft,
    ) -> FeedResult<Option<PendingWrite>> {
        if !draft.can_submit() {
            return Ok(None);
        }
        let author = self.author()?;

        let comment = NewComment {
            author_avatar_url: author.avatar_url,
            author_name: author.display_name,
            text: draft.text.clone(),
        };
        let collection = CollectionRef::comments(post_id.clone());
        let pending = self.sync.append_detached(&collection, &comment);
        draft.clear();
        info!(%post_id, author = %comment.author_name, "Comment submitted");
        Ok(Some(pending))
    }
}
