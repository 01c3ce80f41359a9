use async_trait::async_trait;

use crate::error::StorageError;

/// A flat key/value object store scoped to one bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the full body of `key`.
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Store `body` under `key`, replacing any existing object.
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;
}
