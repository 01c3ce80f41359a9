//! Input staging: bring a job's images onto local disk.
//!
//! Storage mode pulls each object from `<id>/images/` and removes the
//! remote copy once it is safely on disk; failures are tolerated per file.
//! Remote mode fetches every URL concurrently and treats any failure as
//! fatal for the whole stage.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures::future::try_join_all;
use tokio::io::AsyncWriteExt;

use modelforge_cloud::ObjectFetcher;
use modelforge_core::job::{Job, StagingMode};
use modelforge_core::naming::{file_name_from_url, is_safe_file_name};
use modelforge_core::paths::input_key;
use modelforge_core::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("Request for {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request for {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Refusing to stage {url}: unsafe file name {name:?}")]
    UnsafeName { url: String, name: String },

    #[error("{first} and {second} would both be staged as {name:?}")]
    DuplicateName {
        name: String,
        first: String,
        second: String,
    },

    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An input that was not staged, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedInput {
    pub name: String,
    pub reason: String,
}

/// Outcome of a staging pass.
#[derive(Debug, Clone, Default)]
pub struct StagingSummary {
    /// File names written into the image directory.
    pub staged: Vec<String>,
    pub skipped: Vec<SkippedInput>,
}

impl StagingSummary {
    fn skip(&mut self, name: &str, reason: impl Into<String>) {
        self.skipped.push(SkippedInput {
            name: name.to_string(),
            reason: reason.into(),
        });
    }
}

pub struct AssetStager {
    fetcher: ObjectFetcher,
    http: reqwest::Client,
}

impl AssetStager {
    pub fn new(fetcher: ObjectFetcher, http: reqwest::Client) -> Self {
        Self { fetcher, http }
    }

    /// Stage `job`'s inputs into `image_dir` using the mode its record selects.
    pub async fn stage(&self, job: &Job, image_dir: &Path) -> Result<StagingSummary, StagingError> {
        match job.staging_mode() {
            StagingMode::Storage => Ok(self.stage_from_storage(job.id, &job.files, image_dir).await),
            StagingMode::Remote => self.stage_from_urls(&job.files, image_dir).await,
        }
    }

    /// Download each named object and delete it from the store once written.
    ///
    /// Never fails as a whole; per-file problems end up in
    /// [`StagingSummary::skipped`].
    pub async fn stage_from_storage(
        &self,
        job_id: DbId,
        files: &[String],
        image_dir: &Path,
    ) -> StagingSummary {
        let mut summary = StagingSummary::default();

        for name in files {
            if !is_safe_file_name(name) {
                tracing::warn!(job_id, file = %name, "Skipping input with unsafe file name");
                summary.skip(name, "unsafe file name");
                continue;
            }

            let key = input_key(job_id, name);
            let body = match self.fetcher.download(&key).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(job_id, key = %key, error = %e, "Skipping input that could not be downloaded");
                    summary.skip(name, e.to_string());
                    continue;
                }
            };

            let path = image_dir.join(name);
            if let Err(e) = tokio::fs::write(&path, &body).await {
                tracing::warn!(job_id, path = %path.display(), error = %e, "Skipping input that could not be written");
                summary.skip(name, e.to_string());
                continue;
            }

            // The local copy is kept even if the remote delete fails; the
            // object is simply staged again on a rerun.
            if let Err(e) = self.fetcher.delete(&key).await {
                tracing::warn!(job_id, key = %key, error = %e, "Failed to delete staged input from store");
            }

            tracing::debug!(job_id, file = %name, size = body.len(), "Input staged");
            summary.staged.push(name.clone());
        }

        summary
    }

    /// Fetch all URLs concurrently, then stream each body to disk.
    ///
    /// The first failure aborts the stage. URLs whose file names collide
    /// are rejected before anything is downloaded.
    pub async fn stage_from_urls(
        &self,
        urls: &[String],
        image_dir: &Path,
    ) -> Result<StagingSummary, StagingError> {
        let targets = urls
            .iter()
            .map(|url| {
                let name = file_name_from_url(url);
                if is_safe_file_name(&name) {
                    Ok((url.as_str(), name))
                } else {
                    Err(StagingError::UnsafeName {
                        url: url.clone(),
                        name,
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Two URLs mapping to one local name would overwrite each other.
        let mut claimed: HashMap<&str, &str> = HashMap::new();
        for (url, name) in &targets {
            if let Some(first) = claimed.insert(name.as_str(), *url) {
                return Err(StagingError::DuplicateName {
                    name: name.clone(),
                    first: first.to_string(),
                    second: url.to_string(),
                });
            }
        }

        let responses = try_join_all(targets.iter().map(|(url, _)| self.get(url))).await?;

        let mut summary = StagingSummary::default();
        for ((url, name), response) in targets.into_iter().zip(responses) {
            let path = image_dir.join(&name);
            let size = write_body(response, url, &path).await?;
            tracing::debug!(file = %name, size, "Remote input staged");
            summary.staged.push(name);
        }

        Ok(summary)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, StagingError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| StagingError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StagingError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

/// Stream a response body into `path`, returning the byte count.
async fn write_body(
    mut response: reqwest::Response,
    url: &str,
    path: &Path,
) -> Result<u64, StagingError> {
    let write_err = |source| StagingError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = tokio::fs::File::create(path).await.map_err(write_err)?;
    let mut written = 0u64;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|source| StagingError::Request {
            url: url.to_string(),
            source,
        })?
    {
        file.write_all(&chunk).await.map_err(write_err)?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(write_err)?;
    Ok(written)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use modelforge_cloud::{MemoryObjectStore, RetryPolicy};

    use super::*;

    fn stager(store: Arc<MemoryObjectStore>) -> AssetStager {
        let retry = RetryPolicy {
            max_attempts: 1,
            initial_delay: Duration::from_millis(1),
            multiplier: 2.0,
        };
        AssetStager::new(ObjectFetcher::with_retry(store, retry), reqwest::Client::new())
    }

    /// Serve `routes` (path → status, body) until the test ends.
    async fn serve(routes: HashMap<&'static str, (u16, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(routes);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let routes = Arc::clone(&routes);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]);
                    let path = request.split_whitespace().nth(1).unwrap_or("/");
                    let (status, body) = routes.get(path).copied().unwrap_or((404, "missing"));
                    let response = format!(
                        "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{addr}")
    }

    #[tokio::test]
    async fn storage_mode_moves_objects_to_disk() {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert("42/images/a.jpg", b"aaa".to_vec());
        store.insert("42/images/b.jpg", b"bbb".to_vec());
        let dir = tempfile::tempdir().unwrap();

        let files = vec!["a.jpg".to_string(), "b.jpg".to_string()];
        let summary = stager(Arc::clone(&store))
            .stage_from_storage(42, &files, dir.path())
            .await;

        assert_eq!(summary.staged, files);
        assert!(summary.skipped.is_empty());
        assert_eq!(std::fs::read(dir.path().join("a.jpg")).unwrap(), b"aaa");
        assert!(!store.contains("42/images/a.jpg"));
        assert!(!store.contains("42/images/b.jpg"));
    }

    #[tokio::test]
    async fn storage_mode_skips_missing_and_unsafe_files() {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert("42/images/a.jpg", b"aaa".to_vec());
        let dir = tempfile::tempdir().unwrap();

        let files = vec![
            "a.jpg".to_string(),
            "gone.jpg".to_string(),
            "../escape.jpg".to_string(),
        ];
        let summary = stager(Arc::clone(&store))
            .stage_from_storage(42, &files, dir.path())
            .await;

        assert_eq!(summary.staged, vec!["a.jpg".to_string()]);
        let skipped: Vec<_> = summary.skipped.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(skipped, vec!["gone.jpg", "../escape.jpg"]);
        assert!(!dir.path().parent().unwrap().join("escape.jpg").exists());
    }

    #[tokio::test]
    async fn storage_mode_keeps_source_when_write_fails() {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert("5/images/a.jpg", b"aaa".to_vec());
        let dir = tempfile::tempdir().unwrap();
        let missing_dir = dir.path().join("not-created");

        let summary = stager(Arc::clone(&store))
            .stage_from_storage(5, &["a.jpg".to_string()], &missing_dir)
            .await;

        assert!(summary.staged.is_empty());
        assert_eq!(summary.skipped.len(), 1);
        assert!(store.contains("5/images/a.jpg"));
    }

    #[tokio::test]
    async fn remote_mode_downloads_every_url() {
        let base = serve(HashMap::from([
            ("/photos/one.jpg", (200, "first")),
            ("/photos/two.jpg", (200, "second")),
        ]))
        .await;
        let dir = tempfile::tempdir().unwrap();

        let urls = vec![
            format!("{base}/photos/one.jpg?sig=abc"),
            format!("{base}/photos/two.jpg"),
        ];
        let summary = stager(Arc::new(MemoryObjectStore::new()))
            .stage_from_urls(&urls, dir.path())
            .await
            .unwrap();

        assert_eq!(summary.staged, vec!["one.jpg".to_string(), "two.jpg".to_string()]);
        assert_eq!(std::fs::read_to_string(dir.path().join("one.jpg")).unwrap(), "first");
        assert_eq!(std::fs::read_to_string(dir.path().join("two.jpg")).unwrap(), "second");
    }

    #[tokio::test]
    async fn remote_mode_fails_on_any_bad_status() {
        let base = serve(HashMap::from([("/ok.jpg", (200, "fine"))])).await;
        let dir = tempfile::tempdir().unwrap();

        let urls = vec![format!("{base}/ok.jpg"), format!("{base}/missing.jpg")];
        let err = stager(Arc::new(MemoryObjectStore::new()))
            .stage_from_urls(&urls, dir.path())
            .await
            .unwrap_err();

        assert_matches!(err, StagingError::HttpStatus { status: 404, ref url } if url.ends_with("/missing.jpg"));
    }

    #[tokio::test]
    async fn remote_mode_rejects_colliding_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let urls = vec![
            "http://127.0.0.1:9/day1/IMG_0001.jpg".to_string(),
            "http://127.0.0.1:9/day2/IMG_0001.jpg?size=full".to_string(),
        ];

        let err = stager(Arc::new(MemoryObjectStore::new()))
            .stage_from_urls(&urls, dir.path())
            .await
            .unwrap_err();

        assert_matches!(
            err,
            StagingError::DuplicateName { ref name, ref first, ref second }
                if name == "IMG_0001.jpg" && first.contains("day1") && second.contains("day2")
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn remote_mode_rejects_urls_without_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let urls = vec!["http://127.0.0.1:9/..".to_string()];
        let err = stager(Arc::new(MemoryObjectStore::new()))
            .stage_from_urls(&urls, dir.path())
            .await
            .unwrap_err();
        assert_matches!(err, StagingError::UnsafeName { .. });
    }
}
