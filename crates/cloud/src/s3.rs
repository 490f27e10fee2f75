//! Amazon S3 (or S3-compatible) storage backend.
//!
//! Credentials and region come from the standard AWS environment
//! (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_REGION`, profiles).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;

use crate::{local_file_name, StorageError, StorageGateway};

/// Content type attached to uploaded results.
const RESULT_CONTENT_TYPE: &str = "audio/wav";

/// S3 storage gateway bound to a single bucket.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    endpoint_url: Option<String>,
}

impl S3Storage {
    /// Build a client from the ambient AWS configuration.
    pub async fn connect(bucket: String, endpoint_url: Option<String>) -> Self {
        let sdk_config = aws_config::load_from_env().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(url) = &endpoint_url {
            builder = builder.endpoint_url(url).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket,
            endpoint_url,
        }
    }

    /// Public URL of `key` in this bucket.
    pub fn object_url(&self, key: &str) -> String {
        object_url(&self.bucket, self.endpoint_url.as_deref(), key)
    }
}

fn object_url(bucket: &str, endpoint_url: Option<&str>, key: &str) -> String {
    match endpoint_url {
        Some(endpoint) => format!("{}/{bucket}/{key}", endpoint.trim_end_matches('/')),
        None => format!("https://{bucket}.s3.amazonaws.com/{key}"),
    }
}

fn is_no_such_key<R>(err: &SdkError<GetObjectError, R>) -> bool {
    err.as_service_error()
        .is_some_and(GetObjectError::is_no_such_key)
}

#[async_trait]
impl StorageGateway for S3Storage {
    async fn fetch(&self, key: &str, local_dir: &Path) -> Result<PathBuf, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if is_no_such_key(&e) {
                    StorageError::NotFound {
                        location: format!("s3://{}", self.bucket),
                        key: key.to_string(),
                    }
                } else {
                    StorageError::Transfer(format!(
                        "failed to download s3://{}/{key}: {}",
                        self.bucket,
                        DisplayErrorContext(&e)
                    ))
                }
            })?;

        tokio::fs::create_dir_all(local_dir).await?;
        let destination = local_dir.join(local_file_name(key));
        let mut file = tokio::fs::File::create(&destination).await?;

        let mut body = response.body;
        while let Some(chunk) = body.try_next().await.map_err(|e| {
            StorageError::Transfer(format!(
                "download of s3://{}/{key} interrupted: {e}",
                self.bucket
            ))
        })? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        tracing::debug!(bucket = %self.bucket, key, path = %destination.display(), "Object downloaded");
        Ok(destination)
    }

    async fn store(&self, local_path: &Path, key: &str) -> Result<String, StorageError> {
        if !tokio::fs::try_exists(local_path).await? {
            return Err(StorageError::MissingLocalFile(local_path.to_path_buf()));
        }

        let body = ByteStream::from_path(local_path).await.map_err(|e| {
            StorageError::Transfer(format!("failed to read {}: {e}", local_path.display()))
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(RESULT_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                StorageError::Transfer(format!(
                    "failed to upload {} to s3://{}/{key}: {}",
                    local_path.display(),
                    self.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;

        tracing::debug!(bucket = %self.bucket, key, "Object uploaded");
        Ok(self.object_url(key))
    }
}
