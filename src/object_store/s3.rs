/// S3-compatible object storage backend
use super::{Bucket, ObjectStore};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// S3 object storage backend
///
/// Works against AWS S3 and S3-compatible providers (MinIO, Spaces, ...).
/// Each logical bucket maps to its own S3 bucket.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Arc<Client>,
    permanent_bucket: String,
    temporary_bucket: String,
    region: String,
}

fn s3_error(action: &str, e: impl std::fmt::Display) -> AppError {
    error!("S3 {} failed: {}", action, e);
    AppError::ExternalService(format!("S3 {} failed: {}", action, e))
}

/// Missing objects surface as service errors whose debug form names the code
fn is_not_found(debug: &str) -> bool {
    debug.contains("NoSuchKey") || debug.contains("NotFound")
}

impl S3ObjectStore {
    pub async fn new(
        permanent_bucket: String,
        temporary_bucket: String,
        region: String,
        access_key_id: &str,
        secret_access_key: &str,
        endpoint: Option<&str>,
    ) -> AppResult<Self> {
        info!(
            "Initializing S3 object storage (buckets: {}, {}; region: {})",
            permanent_bucket, temporary_bucket, region
        );

        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "find-connections",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);
        if let Some(endpoint) = endpoint {
            debug!("Using custom S3 endpoint: {}", endpoint);
            // MinIO and friends want path-style addressing
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());

        Ok(Self {
            client: Arc::new(client),
            permanent_bucket,
            temporary_bucket,
            region,
        })
    }

    fn bucket_name(&self, bucket: Bucket) -> &str {
        match bucket {
            Bucket::Permanent => &self.permanent_bucket,
            Bucket::Temporary => &self.temporary_bucket,
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        bucket: Bucket,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> AppResult<()> {
        debug!(
            "Uploading object to S3: {}/{} ({} bytes, type: {})",
            bucket,
            key,
            bytes.len(),
            content_type
        );

        self.client
            .put_object()
            .bucket(self.bucket_name(bucket))
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| s3_error("upload", e))?;

        Ok(())
    }

    async fn get_object(&self, bucket: Bucket, key: &str) -> AppResult<Option<(Vec<u8>, String)>> {
        match self
            .client
            .get_object()
            .bucket(self.bucket_name(bucket))
            .key(key)
            .send()
            .await
        {
            Ok(response) => {
                let content_type = response
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = response
                    .body
                    .collect()
                    .await
                    .map_err(|e| s3_error("read body", e))?
                    .into_bytes()
                    .to_vec();
                Ok(Some((data, content_type)))
            }
            Err(e) if is_not_found(&format!("{:?}", e)) => Ok(None),
            Err(e) => Err(s3_error("download", e)),
        }
    }

    async fn delete_object(&self, bucket: Bucket, key: &str) -> AppResult<()> {
        debug!("Deleting object from S3: {}/{}", bucket, key);

        self.client
            .delete_object()
            .bucket(self.bucket_name(bucket))
            .key(key)
            .send()
            .await
            .map_err(|e| s3_error("delete", e))?;

        Ok(())
    }

    async fn list_objects(&self, bucket: Bucket, prefix: &str) -> AppResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(self.bucket_name(bucket))
                .prefix(prefix);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| s3_error("list", e))?;
            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!("Listed {} objects in {}", keys.len(), bucket);
        Ok(keys)
    }

    async fn object_exists(&self, bucket: Bucket, key: &str) -> AppResult<bool> {
        match self
            .client
            .head_object()
            .bucket(self.bucket_name(bucket))
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&format!("{:?}", e)) => Ok(false),
            Err(e) => Err(s3_error("head object", e)),
        }
    }

    async fn presigned_url(&self, bucket: Bucket, key: &str, ttl: Duration) -> AppResult<String> {
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| AppError::Internal(format!("Invalid presign duration: {}", e)))?;

        let request = self
            .client
            .get_object()
            .bucket(self.bucket_name(bucket))
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| s3_error("presign", e))?;

        Ok(request.uri().to_string())
    }

    fn public_url(&self, bucket: Bucket, key: &str) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket_name(bucket),
            self.region,
            urlencoding::encode(key)
        )
    }
}
