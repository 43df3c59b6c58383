use thiserror::Error;

/// Failure kinds reported by a chat transport.
///
/// The transport adapter classifies raw API failures before they reach the
/// engine, so callers never inspect error descriptions themselves.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The edit would leave the message exactly as it is.
    #[error("message is not modified")]
    NotModified,
    /// The target message (or chat) no longer exists.
    #[error("message not found")]
    NotFound,
    #[error("transport failure: {0}")]
    Other(String),
}

impl TransportError {
    /// Maps a raw API error description onto a typed kind.
    pub fn classify(description: &str) -> Self {
        let lower = description.to_lowercase();
        if lower.contains("message is not modified") {
            Self::NotModified
        } else if lower.contains("message to delete not found")
            || lower.contains("message to edit not found")
            || lower.contains("message not found")
        {
            Self::NotFound
        } else {
            Self::Other(description.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum DealflowError {
    #[error("Store error: {0}")]
    Store(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Config error: {0}")]
    Config(#[from] serde_yaml::Error),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Handler already registered for event type `{0}`")]
    DuplicateHandler(String),
    #[error("Event type `{0}` is not declared in the catalog")]
    UnknownEventType(String),
    #[error("Invalid event `{kind}`: {reason}")]
    InvalidEvent { kind: String, reason: String },
    #[error("Validation error: {0}")]
    Validation(String),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDB(#[from] rocksdb::Error),
}

pub type Result<T> = std::result::Result<T, DealflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_descriptions() {
        assert_eq!(
            TransportError::classify(
                "Bad Request: message is not modified: specified new message content is exactly the same"
            ),
            TransportError::NotModified
        );
        assert_eq!(
            TransportError::classify("Bad Request: message to delete not found"),
            TransportError::NotFound
        );
        assert_eq!(
            TransportError::classify("Bad Request: message to edit not found"),
            TransportError::NotFound
        );
    }

    #[test]
    fn test_classify_other() {
        let err = TransportError::classify("Too Many Requests: retry after 5");
        assert_eq!(
            err,
            TransportError::Other("Too Many Requests: retry after 5".to_string())
        );
    }
}
