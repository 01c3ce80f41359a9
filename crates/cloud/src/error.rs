/// Errors returned by an [`ObjectStore`](crate::ObjectStore) implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// The object does not exist.
    #[error("Object not found: {key}")]
    NotFound { key: String },

    /// The request to the store failed (network, auth, throttling, ...).
    #[error("Storage request for {key} failed: {message}")]
    Request { key: String, message: String },

    /// The response arrived but its body could not be read.
    #[error("Failed to read body of {key}: {message}")]
    Body { key: String, message: String },
}
