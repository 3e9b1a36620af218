//! Core types for Feedsync

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ulid::Ulid;

use crate::error::{FeedError, FeedResult};
use crate::sync::{server_timestamp, Document, Fields, NewDocument, RemoteDocument, TIMESTAMP_FIELD};

/// Collection name for posts
pub const POSTS_COLLECTION: &str = "posts";

/// Sub-collection name for comments under a post
pub const COMMENTS_COLLECTION: &str = "comments";

/// Opaque document identifier assigned by the document store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocId(pub String);

impl DocId {
    /// Wrap an identifier handed out by a store
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh time-ordered identifier
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Get the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-assigned creation time of a post or comment.
///
/// `Pending` is what a local echo carries until the store assigns the
/// authoritative value. The derived ordering puts `Pending` after every
/// assigned timestamp, so it sorts as the most recent in a descending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CreatedAt {
    /// Timestamp assigned by the store
    Assigned(DateTime<Utc>),
    /// Write not yet acknowledged by the store
    Pending,
}

impl CreatedAt {
    /// Assigned timestamp from Unix milliseconds
    pub fn from_millis(millis: i64) -> Option<Self> {
        DateTime::from_timestamp_millis(millis).map(CreatedAt::Assigned)
    }

    /// Read the `timestamp` field of a remote document.
    ///
    /// Missing or `null` means the write is still pending.
    pub fn from_field(value: Option<&Value>) -> FeedResult<Self> {
        match value {
            None | Some(Value::Null) => Ok(CreatedAt::Pending),
            Some(Value::Number(n)) => n
                .as_i64()
                .and_then(CreatedAt::from_millis)
                .ok_or_else(|| FeedError::Serialization(format!("timestamp out of range: {}", n))),
            Some(other) => Err(FeedError::Serialization(format!(
                "timestamp must be integer milliseconds, got {}",
                other
            ))),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, CreatedAt::Pending)
    }

    /// The assigned timestamp, if any
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            CreatedAt::Assigned(ts) => Some(*ts),
            CreatedAt::Pending => None,
        }
    }
}

impl fmt::Display for CreatedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreatedAt::Assigned(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
            CreatedAt::Pending => write!(f, "pending"),
        }
    }
}

/// A collection query scope: the post feed, or one post's comments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollectionRef {
    /// All posts
    Posts,
    /// Comments under one post
    Comments {
        /// The parent post
        post_id: DocId,
    },
}

impl CollectionRef {
    /// Comments collection of a post
    pub fn comments(post_id: DocId) -> Self {
        CollectionRef::Comments { post_id }
    }

    /// Store path of this collection (`posts` or `posts/<id>/comments`)
    pub fn path(&self) -> String {
        match self {
            CollectionRef::Posts => POSTS_COLLECTION.to_string(),
            CollectionRef::Comments { post_id } => {
                format!("{}/{}/{}", POSTS_COLLECTION, post_id, COMMENTS_COLLECTION)
            }
        }
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Object-store namespace for uploaded media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaNamespace {
    /// Images attached to posts
    Images,
    /// Profile pictures
    Avatars,
}

impl MediaNamespace {
    /// Path prefix inside the object store
    pub fn prefix(&self) -> &'static str {
        match self {
            MediaNamespace::Images => "images",
            MediaNamespace::Avatars => "avatars",
        }
    }
}

impl fmt::Display for MediaNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A file picked by the user for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// Original file name
    pub name: String,
    /// Raw contents
    pub bytes: Bytes,
}

impl MediaFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, keeping its file name as the original name
    pub fn load(path: impl AsRef<Path>) -> FeedResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(Self::new(name, bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// The signed-in user as seen by the rest of the client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque user id from the identity service
    pub id: String,
    pub display_name: String,
    pub avatar_url: String,
}

/// Wire layout of a post document
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct PostRecord {
    avatar: String,
    image: String,
    text: String,
    username: String,
}

/// Wire layout of a comment document
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct CommentRecord {
    avatar: String,
    text: String,
    username: String,
}

fn record_fields<R: Serialize>(record: &R) -> Fields {
    let mut fields = match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        _ => Fields::new(),
    };
    fields.insert(TIMESTAMP_FIELD.to_string(), server_timestamp());
    fields
}

fn decode_record<R: for<'de> Deserialize<'de>>(doc: &RemoteDocument) -> FeedResult<R> {
    serde_json::from_value(Value::Object(doc.fields.clone()))
        .map_err(|e| FeedError::Serialization(format!("document {}: {}", doc.id, e)))
}

/// A post as delivered by a live subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: DocId,
    pub author_avatar_url: String,
    pub author_name: String,
    pub text: String,
    /// Empty when the post has no image
    pub image_url: String,
    pub created_at: CreatedAt,
}

impl Post {
    pub fn has_image(&self) -> bool {
        !self.image_url.is_empty()
    }
}

impl Document for Post {
    fn from_remote(_collection: &CollectionRef, doc: &RemoteDocument) -> FeedResult<Self> {
        let record: PostRecord = decode_record(doc)?;
        Ok(Self {
            id: doc.id.clone(),
            author_avatar_url: record.avatar,
            author_name: record.username,
            text: record.text,
            image_url: record.image,
            created_at: CreatedAt::from_field(doc.fields.get(TIMESTAMP_FIELD))?,
        })
    }

    fn id(&self) -> &DocId {
        &self.id
    }

    fn created_at(&self) -> CreatedAt {
        self.created_at
    }
}

/// A post about to be written. The store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub author_avatar_url: String,
    pub author_name: String,
    pub text: String,
    pub image_url: String,
}

impl NewDocument for NewPost {
    fn to_fields(&self) -> Fields {
        record_fields(&PostRecord {
            avatar: self.author_avatar_url.clone(),
            image: self.image_url.clone(),
            text: self.text.clone(),
            username: self.author_name.clone(),
        })
    }
}

/// A comment as delivered by a live subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: DocId,
    pub parent_post_id: DocId,
    pub author_avatar_url: String,
    pub author_name: String,
    pub text: String,
    pub created_at: CreatedAt,
}

impl Document for Comment {
    fn from_remote(collection: &CollectionRef, doc: &RemoteDocument) -> FeedResult<Self> {
        let parent_post_id = match collection {
            CollectionRef::Comments { post_id } => post_id.clone(),
            CollectionRef::Posts => {
                return Err(FeedError::Serialization(format!(
                    "comment {} read from the posts collection",
                    doc.id
                )))
            }
        };
        let record: CommentRecord = decode_record(doc)?;
        Ok(Self {
            id: doc.id.clone(),
            parent_post_id,
            author_avatar_url: record.avatar,
            author_name: record.username,
            text: record.text,
            created_at: CreatedAt::from_field(doc.fields.get(TIMESTAMP_FIELD))?,
        })
    }

    fn id(&self) -> &DocId {
        &self.id
    }

    fn created_at(&self) -> CreatedAt {
        self.created_at
    }
}

/// A comment about to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub author_avatar_url: String,
    pub author_name: String,
    pub text: String,
}

impl NewDocument for NewComment {
    fn to_fields(&self) -> Fields {
        record_fields(&CommentRecord {
            avatar: self.author_avatar_url.clone(),
            text: self.text.clone(),
            username: self.author_name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn remote(id: &str, fields: Value) -> RemoteDocument {
        RemoteDocument {
            id: DocId::new(id),
            fields: fields.as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_pending_sorts_after_assigned() {
        let early = CreatedAt::from_millis(1_000).unwrap();
        let late = CreatedAt::from_millis(2_000).unwrap();
        assert!(early < late);
        assert!(late < CreatedAt::Pending);
    }

    #[test]
    fn test_created_at_serde() {
        let assigned = CreatedAt::from_millis(1_700_000_000_123).unwrap();
        let encoded = serde_json::to_string(&assigned).unwrap();
        assert_eq!(serde_json::from_str::<CreatedAt>(&encoded).unwrap(), assigned);

        let pending = serde_json::to_string(&CreatedAt::Pending).unwrap();
        assert_eq!(pending, "\"Pending\"");
        assert_eq!(serde_json::from_str::<CreatedAt>(&pending).unwrap(), CreatedAt::Pending);
    }

    #[test]
    fn test_created_at_from_field() {
        assert_eq!(CreatedAt::from_field(None).unwrap(), CreatedAt::Pending);
        assert_eq!(CreatedAt::from_field(Some(&Value::Null)).unwrap(), CreatedAt::Pending);
        assert_eq!(
            CreatedAt::from_field(Some(&json!(1_700_000_000_000i64))).unwrap(),
            CreatedAt::from_millis(1_700_000_000_000).unwrap()
        );
        assert!(CreatedAt::from_field(Some(&json!("yesterday"))).is_err());
    }

    #[test]
    fn test_collection_paths() {
        assert_eq!(CollectionRef::Posts.path(), "posts");
        let comments = CollectionRef::comments(DocId::new("p1"));
        assert_eq!(comments.path(), "posts/p1/comments");
        assert_eq!(format!("{}", comments), "posts/p1/comments");
    }

    #[test]
    fn test_new_post_fields_carry_sentinel() {
        let post = NewPost {
            author_avatar_url: "a.png".into(),
            author_name: "ann".into(),
            text: "hello".into(),
            image_url: String::new(),
        };
        let fields = post.to_fields();
        assert_eq!(fields["text"], json!("hello"));
        assert_eq!(fields["image"], json!(""));
        assert_eq!(fields["username"], json!("ann"));
        assert_eq!(fields["avatar"], json!("a.png"));
        assert_eq!(fields[TIMESTAMP_FIELD], server_timestamp());
    }

    #[test]
    fn test_post_from_remote_tolerates_missing_fields() {
        let doc = remote("p1", json!({ "text": "hi", "timestamp": null }));
        let post = Post::from_remote(&CollectionRef::Posts, &doc).unwrap();
        assert_eq!(post.text, "hi");
        assert_eq!(post.author_name, "");
        assert!(!post.has_image());
        assert!(post.created_at.is_pending());
    }

    #[test]
    fn test_post_from_remote_rejects_wrong_types() {
        let doc = remote("p1", json!({ "text": 42 }));
        assert!(Post::from_remote(&CollectionRef::Posts, &doc).is_err());
    }

    #[test]
    fn test_comment_takes_parent_from_collection() {
        let doc = remote(
            "c1",
            json!({ "text": "nice", "username": "bo", "avatar": "", "timestamp": 5 }),
        );
        let collection = CollectionRef::comments(DocId::new("p9"));
        let comment = Comment::from_remote(&collection, &doc).unwrap();
        assert_eq!(comment.parent_post_id, DocId::new("p9"));
        assert_eq!(comment.author_name, "bo");
        assert!(Comment::from_remote(&CollectionRef::Posts, &doc).is_err());
    }

    #[test]
    fn test_media_file_load_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.png");
        std::fs::write(&path, b"meow").unwrap();
        let file = MediaFile::load(&path).unwrap();
        assert_eq!(file.name, "cat.png");
        assert_eq!(file.len(), 4);
    }
}
