//! Error types for Feedsync

use thiserror::Error;

/// Main error type for Feedsync operations
#[derive(Error, Debug)]
pub enum FeedError {
    /// The identity service rejected the request (bad credentials, cancelled provider)
    #[error("Identity error: {0}")]
    Identity(String),

    /// A media transfer failed before completion
    #[error("Upload failed: {0}")]
    Upload(String),

    /// A media payload was refused before any transfer started
    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    /// The document store rejected a write
    #[error("Write error: {0}")]
    Write(String),

    /// A live subscription faulted
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// A live handle already exists for this collection
    #[error("Collection already has a live subscription: {0}")]
    AlreadySubscribed(String),

    /// An authoring command needs a signed-in identity
    #[error("No identity is signed in")]
    NotSignedIn,

    /// Error during serialization/deserialization of remote documents
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid or unreadable configuration
    #[error("Config error: {0}")]
    Config(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Serialization(err.to_string())
    }
}

/// Result type alias using FeedError
pub type FeedResult<T> = Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FeedError::AlreadySubscribed("posts".to_string());
        assert_eq!(
            format!("{}", err),
            "Collection already has a live subscription: posts"
        );
        assert_eq!(format!("{}", FeedError::NotSignedIn), "No identity is signed in");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let feed_err: FeedError = io_err.into();
        assert!(matches!(feed_err, FeedError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let feed_err: FeedError = json_err.into();
        assert!(matches!(feed_err, FeedError::Serialization(_)));
    }
}
