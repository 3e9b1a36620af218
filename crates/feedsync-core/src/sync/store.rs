//! Document store interface
//!
//! The remote store is an external dependency. This module only names the
//! narrow contract the sync engine needs from it.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::error::FeedResult;
use crate::types::DocId;

/// Field that carries the server-assigned creation time
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Key of the server-timestamp sentinel object
const SENTINEL_KEY: &str = ".sv";

/// Document fields as stored remotely
pub type Fields = serde_json::Map<String, Value>;

/// Sentinel value asking the store to assign its own timestamp on write
pub fn server_timestamp() -> Value {
    let mut sentinel = Fields::new();
    sentinel.insert(SENTINEL_KEY.to_string(), Value::from("timestamp"));
    Value::Object(sentinel)
}

/// Whether `value` is the server-timestamp sentinel
pub fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|obj| obj.get(SENTINEL_KEY))
        .and_then(Value::as_str)
        == Some("timestamp")
}

/// Ordering direction requested from the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// One document of a remote snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub id: DocId,
    pub fields: Fields,
}

/// Stream of complete collection snapshots, or a listener fault
pub type RemoteSnapshotStream = BoxStream<'static, FeedResult<Vec<RemoteDocument>>>;

/// Remote, multi-writer document store with live queries
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Append a document; the store assigns its id.
    ///
    /// A [`server_timestamp`] sentinel in `fields` is replaced by the store's
    /// authoritative write time.
    async fn append(&self, collection_path: &str, fields: Fields) -> FeedResult<DocId>;

    /// Open a live query over a collection.
    ///
    /// The stream yields the full current contents every time any document
    /// in the collection is added, modified or removed, starting with the
    /// contents at subscription time.
    async fn subscribe(
        &self,
        collection_path: &str,
        order_field: &str,
        direction: Direction,
    ) -> FeedResult<RemoteSnapshotStream>;
}
