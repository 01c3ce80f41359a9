//! S3-compatible object store (AWS S3, Cloudflare R2, MinIO).

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use modelforge_core::config;
use modelforge_core::error::ConfigError;

use crate::error::StorageError;
use crate::storage::ObjectStore;

/// R2 ignores regions but the SDK requires one.
const DEFAULT_REGION: &str = "auto";

/// Provider name attached to static credentials in SDK diagnostics.
const CREDENTIALS_PROVIDER: &str = "modelforge-env";

// ---------------------------------------------------------------------------
// StorageConfig
// ---------------------------------------------------------------------------

/// Settings for the S3-compatible content store.
#[derive(Clone)]
pub struct StorageConfig {
    pub bucket: String,
    /// Custom endpoint; `None` uses the AWS default for the region.
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl StorageConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable                    | Required | Default |
    /// |-----------------------------|----------|---------|
    /// | `STORAGE_BUCKET`            | yes      | --      |
    /// | `STORAGE_ENDPOINT`          | no       | derived from `R2_ACCOUNT_ID` |
    /// | `R2_ACCOUNT_ID`             | no       | --      |
    /// | `STORAGE_REGION`            | no       | `auto`  |
    /// | `STORAGE_ACCESS_KEY_ID`     | no       | SDK default chain |
    /// | `STORAGE_SECRET_ACCESS_KEY` | no       | SDK default chain |
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bucket: config::required("STORAGE_BUCKET")?,
            endpoint: resolve_endpoint(
                config::optional("STORAGE_ENDPOINT"),
                config::optional("R2_ACCOUNT_ID"),
            ),
            region: config::or_default("STORAGE_REGION", DEFAULT_REGION),
            access_key_id: config::optional("STORAGE_ACCESS_KEY_ID"),
            secret_access_key: config::optional("STORAGE_SECRET_ACCESS_KEY"),
        })
    }
}

/// An explicit endpoint wins; otherwise an R2 account id implies its endpoint.
fn resolve_endpoint(explicit: Option<String>, r2_account_id: Option<String>) -> Option<String> {
    explicit.or_else(|| r2_account_id.map(|id| r2_endpoint(&id)))
}

/// Cloudflare R2 S3 API endpoint for an account.
pub fn r2_endpoint(account_id: &str) -> String {
    format!("https://{account_id}.r2.cloudflarestorage.com")
}

// ---------------------------------------------------------------------------
// S3ObjectStore
// ---------------------------------------------------------------------------

/// [`ObjectStore`] over one bucket of an S3-compatible service.
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Build an SDK client from `config`.
    ///
    /// Static credentials are used when both keys are configured; otherwise
    /// the SDK's default provider chain applies.
    pub async fn connect(config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key_id.clone(),
                secret.clone(),
                None,
                None,
                CREDENTIALS_PROVIDER,
            ));
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint.is_some())
            .build();

        tracing::info!(
            bucket = %config.bucket,
            endpoint = config.endpoint.as_deref().unwrap_or("aws-default"),
            "S3 object store configured",
        );

        Self::new(S3Client::from_conf(s3_config), config.bucket.clone())
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound {
                        key: key.to_string(),
                    }
                } else {
                    StorageError::Request {
                        key: key.to_string(),
                        message: DisplayErrorContext(&e).to_string(),
                    }
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Body {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        Ok(data.into_bytes().to_vec())
    }

    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await
            .map_err(|e| StorageError::Request {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Request {
                key: key.to_string(),
                message: DisplayErrorContext(&e).to_string(),
            })?;
        Ok(())
    }
}
