//! Shared fixtures for pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use modelforge_cloud::{MemoryObjectStore, ObjectFetcher, ObjectStore, RetryPolicy, StorageError};
use modelforge_core::job::{Job, JobStatus};
use modelforge_core::types::{DbId, Timestamp};
use modelforge_db::{DbError, ProjectStore};
use modelforge_events::{Notifier, NotifyError};
use modelforge_pipeline::{JobPipeline, PipelineConfig, ToolCommand};

// ---------------------------------------------------------------------------
// Status store
// ---------------------------------------------------------------------------

/// In-memory `project` table that records every status write.
#[derive(Default)]
pub struct FakeProjectStore {
    jobs: Mutex<HashMap<DbId, Job>>,
    chats: Mutex<HashMap<DbId, i64>>,
    history: Mutex<Vec<(DbId, JobStatus)>>,
    fail_done: AtomicBool,
}

impl FakeProjectStore {
    pub fn insert(&self, job: Job) {
        self.jobs.lock().unwrap().insert(job.id, job);
    }

    pub fn job(&self, id: DbId) -> Job {
        self.jobs.lock().unwrap()[&id].clone()
    }

    pub fn set_chat(&self, target: DbId, chat_id: i64) {
        self.chats.lock().unwrap().insert(target, chat_id);
    }

    /// Statuses written for `id`, in order.
    pub fn statuses(&self, id: DbId) -> Vec<JobStatus> {
        self.history
            .lock()
            .unwrap()
            .iter()
            .filter(|(job_id, _)| *job_id == id)
            .map(|(_, status)| *status)
            .collect()
    }

    pub fn fail_mark_done(&self) {
        self.fail_done.store(true, Ordering::SeqCst);
    }

    fn update(&self, id: DbId, apply: impl FnOnce(&mut Job)) -> Result<(), DbError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or(DbError::RowMissing {
            entity: "project",
            id,
        })?;
        apply(job);
        self.history.lock().unwrap().push((id, job.status));
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for FakeProjectStore {
    async fn load_job(&self, id: DbId) -> Result<Option<Job>, DbError> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn mark_processing(&self, id: DbId, started_at: Timestamp) -> Result<(), DbError> {
        self.update(id, |job| {
            job.status = JobStatus::Processing;
            job.process_start = Some(started_at);
            job.process_end = None;
        })
    }

    async fn mark_done(
        &self,
        id: DbId,
        finished_at: Timestamp,
        artifacts: &[String],
    ) -> Result<(), DbError> {
        if self.fail_done.load(Ordering::SeqCst) {
            return Err(DbError::RowMissing {
                entity: "project",
                id,
            });
        }
        self.update(id, |job| {
            job.status = JobStatus::Done;
            job.process_end = Some(finished_at);
            job.artifact_locations = artifacts.to_vec();
        })
    }

    async fn mark_error(&self, id: DbId, finished_at: Timestamp) -> Result<(), DbError> {
        self.update(id, |job| {
            job.status = JobStatus::Error;
            job.process_end = Some(finished_at);
        })
    }

    async fn recipient_chat_id(&self, target: DbId) -> Result<Option<i64>, DbError> {
        Ok(self.chats.lock().unwrap().get(&target).copied())
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Message { chat_id: i64, text: String },
    Document { chat_id: i64, file_name: String, size: usize },
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    reject_documents: AtomicBool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Make every later `send_document` fail the way a bot API rejection does.
    pub fn reject_documents(&self) {
        self.reject_documents.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(Sent::Message {
            chat_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_document(&self, chat_id: i64, path: &Path) -> Result<(), NotifyError> {
        if self.reject_documents.load(Ordering::SeqCst) {
            return Err(NotifyError::Api {
                method: "sendDocument",
                status: 413,
                description: "Request Entity Too Large".to_string(),
            });
        }
        let bytes = std::fs::read(path).map_err(|source| NotifyError::Attachment {
            path: path.to_path_buf(),
            source,
        })?;
        self.sent.lock().unwrap().push(Sent::Document {
            chat_id,
            file_name: path.file_name().unwrap().to_string_lossy().into_owned(),
            size: bytes.len(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

/// Serves reads from an inner store but rejects every write.
pub struct ReadOnlyStore(pub Arc<MemoryObjectStore>);

#[async_trait]
impl ObjectStore for ReadOnlyStore {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.0.get_object(key).await
    }

    async fn put_object(
        &self,
        key: &str,
        _body: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        Err(StorageError::Request {
            key: key.to_string(),
            message: "bucket is read-only".to_string(),
        })
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.0.delete_object(key).await
    }
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// Writes `$2` (the model path) and a `scene.usda` beside it.
pub const RECONSTRUCT_OK: &str = r#"
ls "$1"/* > /dev/null || exit 9
printf 'usdz:%s:%s:%s' "$4" "$6" "$8" > "$2"
"#;

pub const RECONSTRUCT_FAILS: &str = r#"
echo "not enough overlap between images" >&2
exit 2
"#;

pub const RECONSTRUCT_NO_OUTPUT: &str = "exit 0\n";

pub const RECONSTRUCT_HANGS: &str = "exec sleep 30\n";

/// Converts `$1` into `scene.usda` next to it.
pub const CONVERT_OK: &str = r#"
printf 'usda' > "$(dirname "$1")/scene.usda"
"#;

pub const CONVERT_FAILS: &str = "echo 'usdconv: bad file' >&2\nexit 1\n";

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

pub struct TestEnv {
    root: tempfile::TempDir,
    pub store: Arc<FakeProjectStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestEnv {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("lib")).unwrap();
        Self {
            root,
            store: Arc::new(FakeProjectStore::default()),
            objects: Arc::new(MemoryObjectStore::new()),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub fn projects_root(&self) -> PathBuf {
        self.root.path().join("projects")
    }

    pub fn job_root(&self, id: DbId) -> PathBuf {
        self.projects_root().join(id.to_string())
    }

    /// A tool that runs `script` through `/bin/sh`.
    fn tool(&self, name: &str, script: &str) -> ToolCommand {
        let path = self.root.path().join("lib").join(format!("{name}.sh"));
        std::fs::write(&path, script).unwrap();
        ToolCommand::new("/bin/sh").with_args([path.display().to_string()])
    }

    pub fn config(&self, reconstruct: &str, convert: &str) -> PipelineConfig {
        PipelineConfig {
            projects_root: self.projects_root(),
            tools_dir: self.root.path().join("lib"),
            reconstruct: self.tool("reconstruct", reconstruct),
            convert: self.tool("convert", convert),
            build_timeout: Duration::from_secs(30),
            convert_timeout: Duration::from_secs(30),
            viewer_base_url: "https://models.example".to_string(),
            retain_workdir: false,
        }
    }

    pub fn fetcher(&self, store: Arc<dyn ObjectStore>) -> ObjectFetcher {
        ObjectFetcher::with_retry(
            store,
            RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(1),
                multiplier: 2.0,
            },
        )
    }

    pub fn pipeline_with(&self, config: PipelineConfig, store: Arc<dyn ObjectStore>) -> JobPipeline {
        JobPipeline::new(
            self.store.clone(),
            self.fetcher(store),
            reqwest::Client::new(),
            Some(self.notifier.clone() as Arc<dyn Notifier>),
            config,
        )
    }

    pub fn pipeline(&self, reconstruct: &str, convert: &str) -> JobPipeline {
        self.pipeline_with(self.config(reconstruct, convert), self.objects.clone())
    }

    /// Insert a storage-mode job and upload its inputs.
    pub fn storage_job(&self, id: DbId, files: &[&str]) {
        for name in files {
            self.objects
                .insert(format!("{id}/images/{name}"), format!("jpeg:{name}").into_bytes());
        }
        self.store
            .insert(Job::new(id, files.iter().map(|f| f.to_string()).collect()));
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Serve `routes` (path → body, HTTP 200; anything else 404) until the
/// test ends. Returns the base URL.
pub async fn serve_files(routes: HashMap<String, Vec<u8>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = Arc::new(routes);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let routes = Arc::clone(&routes);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).into_owned();
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

                let (status, body) = match routes.get(&path) {
                    Some(body) => ("200 OK", body.clone()),
                    None => ("404 Not Found", b"missing".to_vec()),
                };
                let head = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}")
}
