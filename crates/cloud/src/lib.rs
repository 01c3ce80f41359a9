//! Content-store access for the modelforge worker.
//!
//! - [`ObjectStore`]: the minimal get/put/delete seam over a bucket.
//! - [`S3ObjectStore`]: S3-compatible implementation (AWS S3, Cloudflare R2).
//! - [`MemoryObjectStore`]: in-process implementation for tests and dry runs.
//! - [`ObjectFetcher`]: retrying downloads, single-shot uploads and deletes.

pub mod error;
pub mod fetcher;
pub mod memory;
pub mod s3;
pub mod storage;

pub use error::StorageError;
pub use fetcher::{FetchError, ObjectFetcher, RetryPolicy};
pub use memory::MemoryObjectStore;
pub use s3::{S3ObjectStore, StorageConfig};
pub use storage::ObjectStore;
