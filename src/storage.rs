use async_trait::async_trait;
use log::{error, info, warn};
use std::sync::Arc;
use thiserror::Error;

use crate::config::StorageConfig;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub size: i64,
    pub content_type: Option<String>,
}

/// Binary bodies of uploaded files, keyed by generated storage key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, mime: &str, bytes: Vec<u8>) -> Result<(), StorageError>;
    async fn stat(&self, key: &str) -> Result<ObjectMeta, StorageError>;
    /// Fails with `NotFound` when the key does not exist.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
    fn public_url(&self, key: &str) -> String;
}

/// Public URL layout shared by every backend: `{endpoint}/{bucket}/{key}`.
pub fn object_url(public_endpoint: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", public_endpoint.trim_end_matches('/'), bucket, key)
}

// ---------------- S3 implementation (MinIO compatible) ----------------
pub struct S3ObjectStore {
    bucket: String,
    public_endpoint: String,
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub async fn new(cfg: &StorageConfig) -> anyhow::Result<Self> {
        use aws_credential_types::provider::SharedCredentialsProvider;
        use aws_credential_types::Credentials;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(cfg.region.clone()));
        loader = loader.endpoint_url(cfg.endpoint.clone());
        if !cfg.access_key.is_empty() && !cfg.secret_key.is_empty() {
            let creds = Credentials::new(cfg.access_key.clone(), cfg.secret_key.clone(), None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(creds));
        }
        let conf = loader.load().await;
        // MinIO without wildcard DNS needs path-style addressing
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf)
            .force_path_style(true)
            .build();
        let client = aws_sdk_s3::Client::from_conf(s3_conf);
        info!("Initialized S3/MinIO client for bucket '{}'", cfg.bucket);

        let store = Self {
            bucket: cfg.bucket.clone(),
            public_endpoint: cfg.public_endpoint.clone(),
            client,
        };
        store.ensure_public_bucket().await?;
        Ok(store)
    }

    /// Create the bucket when missing and open it for anonymous reads, so
    /// `public_url` links resolve without signing.
    async fn ensure_public_bucket(&self) -> anyhow::Result<()> {
        let bucket = &self.bucket;
        if self.client.head_bucket().bucket(bucket).send().await.is_ok() {
            return Ok(());
        }
        warn!("head_bucket failed for '{bucket}', creating it");
        let mut attempt = 0u32;
        let max_attempts = 8;
        loop {
            attempt += 1;
            match self.client.create_bucket().bucket(bucket).send().await {
                Ok(_) => {
                    info!("created bucket '{bucket}' (attempt {attempt})");
                    break;
                }
                Err(e) if attempt >= max_attempts => {
                    error!("create_bucket failed for '{bucket}' after {attempt} attempts: {e:?}");
                    return Err(anyhow::anyhow!("failed to ensure bucket '{bucket}': {e}"));
                }
                Err(e) => {
                    let backoff_ms = 200 * attempt.pow(2);
                    warn!("create_bucket attempt {attempt} failed for '{bucket}': {e:?} (retrying in {backoff_ms}ms)");
                    tokio::time::sleep(std::time::Duration::from_millis(backoff_ms as u64)).await;
                }
            }
        }

        let policy = serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": "*",
                "Action": "s3:GetObject",
                "Resource": format!("arn:aws:s3:::{bucket}/*"),
            }]
        });
        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy.to_string())
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("failed to set public policy on '{bucket}': {e}"))?;
        info!("bucket '{bucket}' is publicly readable");
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, mime: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        use aws_sdk_s3::primitives::ByteStream;
        let put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(mime)
            .body(ByteStream::from(bytes));
        if let Err(e) = put.send().await {
            error!("put_object failed key={key} bucket={} err={:?}", self.bucket, e);
            let hint = if e.to_string().contains("NoSuchBucket") {
                " (bucket missing or not yet propagated)"
            } else if e.to_string().contains("AccessDenied") {
                " (check S3_ACCESS_KEY/S3_SECRET_KEY permissions)"
            } else {
                ""
            };
            return Err(StorageError::Other(format!("{e}{hint}")));
        }
        Ok(())
    }

    async fn stat(&self, key: &str) -> Result<ObjectMeta, StorageError> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(head) => Ok(ObjectMeta {
                size: head.content_length().unwrap_or_default(),
                content_type: head.content_type().map(str::to_string),
            }),
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                if not_found {
                    Err(StorageError::NotFound)
                } else {
                    Err(StorageError::Other(e.to_string()))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.stat(key).await?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                error!("delete_object failed key={key} bucket={} err={:?}", self.bucket, e);
                StorageError::Other(e.to_string())
            })?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        object_url(&self.public_endpoint, &self.bucket, key)
    }
}

// Factory used in main; the server cannot run without object storage.
pub async fn build_object_store(cfg: &StorageConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    let store = S3ObjectStore::new(cfg).await?;
    Ok(Arc::new(store))
}
