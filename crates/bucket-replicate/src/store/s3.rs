//! S3-compatible backend built on the AWS SDK for Rust.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use tracing::debug;

use super::{ListPage, ObjectRecord, ObjectStore, StoreError};
use crate::config::StoreSettings;
use crate::error::{ReplicateError, Result};

/// ObjectStore implementation for S3-compatible services (AWS S3, OSS, MinIO, ...).
pub struct S3Store {
    /// The underlying S3 client.
    client: S3Client,
    /// Bucket every request is addressed to.
    bucket: String,
}

impl S3Store {
    /// Build a client for one side of the replication.
    ///
    /// Fails with [`ReplicateError::Connection`] when the endpoint or bucket
    /// name cannot be used to address a bucket.
    pub async fn connect(settings: &StoreSettings) -> Result<Self> {
        let endpoint = normalize_endpoint(&settings.endpoint)
            .map_err(|message| ReplicateError::connection(&settings.endpoint, message))?;
        validate_bucket_name(&settings.bucket)
            .map_err(|message| ReplicateError::connection(&endpoint, message))?;

        let credentials = Credentials::new(
            &settings.access_key,
            &settings.secret_key,
            None,
            None,
            "bucket-replicate",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .endpoint_url(&endpoint)
            .credentials_provider(credentials)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.path_style)
            .build();

        debug!(
            "S3 client for bucket {} at {} (path style: {})",
            settings.bucket, endpoint, settings.path_style
        );

        Ok(Self::from_client(
            S3Client::from_conf(s3_config),
            settings.bucket.clone(),
        ))
    }

    /// Create a store from an existing S3Client.
    pub fn from_client(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(
        &self,
        prefix: &str,
        cursor: &str,
        page_size: usize,
    ) -> std::result::Result<ListPage, StoreError> {
        let mut request = self
            .client
            .list_objects()
            .bucket(&self.bucket)
            .max_keys(i32::try_from(page_size).unwrap_or(i32::MAX));

        if !prefix.is_empty() {
            request = request.prefix(prefix);
        }
        if !cursor.is_empty() {
            request = request.marker(cursor);
        }

        let response = request.send().await.map_err(|err| StoreError::Network {
            message: DisplayErrorContext(&err).to_string(),
        })?;

        let records: Vec<ObjectRecord> = response
            .contents()
            .iter()
            .map(|obj| ObjectRecord {
                key: obj.key().unwrap_or_default().to_string(),
                size: obj.size().map(|s| s as u64).unwrap_or(0),
                last_modified: obj
                    .last_modified()
                    .and_then(|dt| dt.to_millis().ok())
                    .map(|ms| ms / 1000),
            })
            .collect();

        // Without a delimiter S3 omits NextMarker; the last key is the marker then.
        let next_cursor = if response.is_truncated() == Some(true) {
            response
                .next_marker()
                .map(str::to_string)
                .or_else(|| records.last().map(|r| r.key.clone()))
                .unwrap_or_default()
        } else {
            String::new()
        };

        Ok(ListPage {
            records,
            next_cursor,
        })
    }

    async fn get(&self, key: &str) -> std::result::Result<Bytes, StoreError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    StoreError::NotFound {
                        bucket: self.bucket.clone(),
                        key: key.to_string(),
                    }
                } else {
                    StoreError::Network {
                        message: DisplayErrorContext(&service_err).to_string(),
                    }
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Network {
                message: e.to_string(),
            })?
            .into_bytes();

        Ok(data)
    }

    async fn put(&self, key: &str, data: Bytes) -> std::result::Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|err| StoreError::Network {
                message: DisplayErrorContext(&err).to_string(),
            })?;

        Ok(())
    }
}

/// Turn a configured endpoint into a URL, defaulting to HTTPS.
pub(crate) fn normalize_endpoint(endpoint: &str) -> std::result::Result<String, String> {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.is_empty() {
        return Err("endpoint is empty".into());
    }
    if endpoint.chars().any(char::is_whitespace) {
        return Err(format!("endpoint '{}' contains whitespace", endpoint));
    }

    match endpoint.split_once("://") {
        Some(("http", host)) | Some(("https", host)) if !host.is_empty() => {
            Ok(endpoint.to_string())
        }
        Some((scheme, _)) => Err(format!("unsupported endpoint scheme '{}'", scheme)),
        None => Ok(format!("https://{}", endpoint)),
    }
}

/// Check a bucket name against the S3/OSS naming rules.
pub(crate) fn validate_bucket_name(bucket: &str) -> std::result::Result<(), String> {
    if !(3..=63).contains(&bucket.len()) {
        return Err(format!(
            "bucket name '{}' must be 3-63 characters long",
            bucket
        ));
    }

    let valid_chars = bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    let alnum_edges = bucket
        .chars()
        .next()
        .zip(bucket.chars().last())
        .map(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric())
        .unwrap_or(false);

    if !valid_chars || !alnum_edges {
        return Err(format!(
            "bucket name '{}' may only contain lowercase letters, digits, '-' and '.', \
             and must start and end with a letter or digit",
            bucket
        ));
    }

    Ok(())
}
