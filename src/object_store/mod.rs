/// Object storage for connection images
///
/// Two logical buckets: `Permanent` holds images attached to graph edges,
/// `Temporary` holds user and anonymous uploads awaiting review.
/// Supports a local disk backend and S3.

pub mod disk;
pub mod s3;

pub use disk::DiskObjectStore;
pub use s3::S3ObjectStore;

use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Lifetime of presigned image links
pub const PRESIGN_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Permanent,
    Temporary,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Permanent => "permanent",
            Bucket::Temporary => "temporary",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permanent" => Ok(Bucket::Permanent),
            "temporary" => Ok(Bucket::Temporary),
            _ => Err(AppError::NotFound("Bucket".to_string())),
        }
    }
}

/// Object storage backend trait
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        bucket: Bucket,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> AppResult<()>;

    /// Object bytes and content type, if present
    async fn get_object(&self, bucket: Bucket, key: &str) -> AppResult<Option<(Vec<u8>, String)>>;

    /// Deleting an absent object is not an error
    async fn delete_object(&self, bucket: Bucket, key: &str) -> AppResult<()>;

    /// Every key in `bucket` starting with `prefix`
    async fn list_objects(&self, bucket: Bucket, prefix: &str) -> AppResult<Vec<String>>;

    async fn object_exists(&self, bucket: Bucket, key: &str) -> AppResult<bool>;

    /// Time-limited read link, generated fresh on every call
    async fn presigned_url(&self, bucket: Bucket, key: &str, ttl: Duration) -> AppResult<String>;

    /// Stable URL recorded on graph edges
    fn public_url(&self, bucket: Bucket, key: &str) -> String;
}

/// Object key from an image URL: its last path segment, percent-decoded
pub fn key_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    let segment = without_query.rsplit('/').next().unwrap_or_default();
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

/// Canonical key for the image of a pair: `{first}_{second}.{ext}`
pub fn connection_key(first: &str, second: &str, extension: &str) -> String {
    format!("{}_{}.{}", first, second, extension)
}

/// Reject keys that could escape a bucket
pub(crate) fn ensure_plain_key(key: &str) -> AppResult<()> {
    if key.is_empty()
        || key == "."
        || key == ".."
        || key.contains('/')
        || key.contains('\\')
        || key.contains('\0')
    {
        return Err(AppError::Validation(format!("Invalid object key: {}", key)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_url() {
        assert_eq!(
            key_from_url("https://b.s3.us-east-1.amazonaws.com/Ana%20Smith_Bob%20Lee.jpg"),
            "Ana Smith_Bob Lee.jpg"
        );
        assert_eq!(
            key_from_url("http://localhost:3000/blob/permanent/a.png?token=xyz"),
            "a.png"
        );
        assert_eq!(key_from_url("plain.png"), "plain.png");
    }

    #[test]
    fn test_bucket_names() {
        assert_eq!("permanent".parse::<Bucket>().unwrap(), Bucket::Permanent);
        assert_eq!(Bucket::Temporary.to_string(), "temporary");
        assert!("other".parse::<Bucket>().is_err());
    }

    #[test]
    fn test_plain_keys() {
        assert!(ensure_plain_key("Ana Smith_Bob Lee.jpg").is_ok());
        assert!(ensure_plain_key("../etc/passwd").is_err());
        assert!(ensure_plain_key("..").is_err());
        assert!(ensure_plain_key("").is_err());
    }

    #[test]
    fn test_connection_key() {
        assert_eq!(connection_key("Ana Smith", "Bob Lee", "png"), "Ana Smith_Bob Lee.png");
    }
}
