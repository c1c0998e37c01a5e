/// Disk-based object storage backend
///
/// Stores objects at `{root}/{bucket}/{key}`. Presigned links point back at
/// this service's `/blob` route and carry a signed, expiring token.
use super::{ensure_plain_key, Bucket, ObjectStore};
use crate::auth::tokens::TokenService;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;

fn content_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next().map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[derive(Clone)]
pub struct DiskObjectStore {
    root: PathBuf,
    public_url: String,
    tokens: Arc<TokenService>,
}

impl DiskObjectStore {
    pub fn new(root: PathBuf, public_url: &str, tokens: Arc<TokenService>) -> Self {
        Self {
            root,
            public_url: public_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn object_path(&self, bucket: Bucket, key: &str) -> AppResult<PathBuf> {
        ensure_plain_key(key)?;
        Ok(self.root.join(bucket.as_str()).join(key))
    }

    fn blob_url(&self, bucket: Bucket, key: &str) -> String {
        format!(
            "{}/blob/{}/{}",
            self.public_url,
            bucket,
            urlencoding::encode(key)
        )
    }
}

#[async_trait]
impl ObjectStore for DiskObjectStore {
    async fn put_object(
        &self,
        bucket: Bucket,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> AppResult<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&path, bytes).await?;
        tracing::debug!(%bucket, key, "Object stored on disk");
        Ok(())
    }

    async fn get_object(&self, bucket: Bucket, key: &str) -> AppResult<Option<(Vec<u8>, String)>> {
        let path = self.object_path(bucket, key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some((data, content_type_for(key).to_string()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn delete_object(&self, bucket: Bucket, key: &str) -> AppResult<()> {
        let path = self.object_path(bucket, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn list_objects(&self, bucket: Bucket, prefix: &str) -> AppResult<Vec<String>> {
        let dir = self.root.join(bucket.as_str());
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(prefix) {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn object_exists(&self, bucket: Bucket, key: &str) -> AppResult<bool> {
        let path = self.object_path(bucket, key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn presigned_url(&self, bucket: Bucket, key: &str, ttl: Duration) -> AppResult<String> {
        ensure_plain_key(key)?;
        let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;
        let token = self
            .tokens
            .issue_blob_token(bucket.as_str(), key, expires_at)?;
        Ok(format!("{}?token={}", self.blob_url(bucket, key), token))
    }

    fn public_url(&self, bucket: Bucket, key: &str) -> String {
        self.blob_url(bucket, key)
    }
}
