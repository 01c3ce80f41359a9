//! Upload of build output to the content store.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use modelforge_cloud::{FetchError, ObjectFetcher};
use modelforge_core::naming::content_type_for;
use modelforge_core::paths::output_key;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to list {path:?}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Upload(#[from] FetchError),
}

pub struct ArtifactPublisher {
    fetcher: ObjectFetcher,
}

impl ArtifactPublisher {
    pub fn new(fetcher: ObjectFetcher) -> Self {
        Self { fetcher }
    }

    /// Upload every regular file under `root` to `<prefix>/model/<file name>`.
    ///
    /// Files are visited depth-first, each directory's files before its
    /// subdirectories and both sorted by name, so the returned key list is
    /// stable for an unchanged tree. A
    /// missing `root` publishes nothing. The first upload failure aborts.
    ///
    /// Keys are flat, so when two files share a name only the first one
    /// visited is uploaded and each returned key is unique.
    pub async fn publish(&self, root: &Path, prefix: &str) -> Result<Vec<String>, PublishError> {
        let files = collect_files(root).await?;
        let mut keys = Vec::with_capacity(files.len());
        let mut published = HashSet::new();

        for path in files {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let key = output_key(prefix, &name);
            if !published.insert(key.clone()) {
                tracing::warn!(prefix, key = %key, path = %path.display(), "Skipping artifact whose key is already published");
                continue;
            }

            let body = tokio::fs::read(&path)
                .await
                .map_err(|source| PublishError::Read {
                    path: path.clone(),
                    source,
                })?;

            self.fetcher
                .upload(&key, body, Some(content_type_for(&name)))
                .await?;
            keys.push(key);
        }

        tracing::info!(prefix, count = keys.len(), "Artifacts published");
        Ok(keys)
    }
}

/// Regular files under `root` in sorted depth-first order.
async fn collect_files(root: &Path) -> Result<Vec<PathBuf>, PublishError> {
    let mut files = Vec::new();
    let mut stack = match sorted_entries(root).await {
        Ok(entries) => entries,
        Err(PublishError::Walk { source, .. }) if source.kind() == ErrorKind::NotFound => {
            return Ok(files);
        }
        Err(e) => return Err(e),
    };
    stack.reverse();

    while let Some(path) = stack.pop() {
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|source| PublishError::Walk {
                path: path.clone(),
                source,
            })?;

        if meta.is_dir() {
            let mut children = sorted_entries(&path).await?;
            children.reverse();
            stack.extend(children);
        } else if meta.is_file() {
            files.push(path);
        }
    }

    Ok(files)
}

async fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, PublishError> {
    let walk_err = |source| PublishError::Walk {
        path: dir.to_path_buf(),
        source,
    };

    let mut reader = tokio::fs::read_dir(dir).await.map_err(walk_err)?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(walk_err)? {
        let is_dir = entry.file_type().await.map_err(walk_err)?.is_dir();
        entries.push((is_dir, entry.path()));
    }
    // Files first, then subdirectories, each group by name.
    entries.sort();
    Ok(entries.into_iter().map(|(_, path)| path).collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
