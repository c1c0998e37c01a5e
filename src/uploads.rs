/// Uploads awaiting review: anonymous and signed-in user submissions
///
/// Both land in the temporary bucket. Anonymous uploads are limited per
/// source address and day, signed-in uploads spend from the account quota.
use crate::{
    account::quota::{IpUploadCounter, UploadQuota, DAILY_UPLOAD_LIMIT},
    connections::CONNECTION_EXISTS_MESSAGE,
    error::{AppError, AppResult},
    metrics,
    object_store::{connection_key, Bucket, ObjectStore},
    validation::{
        upload::{UploadValidator, UploadedFile},
        validate_person_pair,
    },
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const UPLOADED_MESSAGE: &str = "File uploaded successfully!";

/// Reply to an anonymous upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempUploadReceipt {
    pub message: String,
    pub filename: String,
    pub key: String,
    pub uploads_today: i64,
    pub remaining_uploads: i64,
}

/// Quota left after a signed-in upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    pub upload_count: i64,
    pub last_upload_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserUploadReceipt {
    pub message: String,
    pub user: QuotaSnapshot,
}

pub struct UploadService {
    objects: Arc<dyn ObjectStore>,
    validator: Arc<UploadValidator>,
    quota: UploadQuota,
    ip_uploads: IpUploadCounter,
}

impl UploadService {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        validator: Arc<UploadValidator>,
        quota: UploadQuota,
        ip_uploads: IpUploadCounter,
    ) -> Self {
        Self {
            objects,
            validator,
            quota,
            ip_uploads,
        }
    }

    /// Anonymous upload, stored under its own file name
    ///
    /// The address is counted before the file is checked, so rejected files
    /// still spend from the daily allowance.
    pub async fn upload_temp(&self, ip: &str, file: &UploadedFile) -> AppResult<TempUploadReceipt> {
        let count = self.ip_uploads.record_upload(ip).await?;

        if let Err(e) = self.validator.validate(file).await {
            metrics::record_upload("anonymous", "rejected");
            return Err(e);
        }

        let key = file.file_name.clone();
        self.objects
            .put_object(Bucket::Temporary, &key, file.bytes.clone(), file.stored_content_type())
            .await?;

        metrics::record_upload("anonymous", "success");
        tracing::info!(ip, key, uploads_today = count, "Anonymous upload stored");

        Ok(TempUploadReceipt {
            message: UPLOADED_MESSAGE.to_string(),
            filename: file.file_name.clone(),
            key,
            uploads_today: count,
            remaining_uploads: DAILY_UPLOAD_LIMIT - count,
        })
    }

    /// Signed-in upload of a photo of two people, pending review
    pub async fn user_upload(
        &self,
        user_id: &str,
        first: &str,
        second: &str,
        file: &UploadedFile,
    ) -> AppResult<UserUploadReceipt> {
        validate_person_pair(first, second)?;
        if let Err(e) = self.validator.validate(file).await {
            metrics::record_upload("user", "rejected");
            return Err(e);
        }

        let extension = file.extension();
        let key = connection_key(first, second, &extension);
        let reversed = connection_key(second, first, &extension);
        if self.objects.object_exists(Bucket::Temporary, &key).await?
            || self.objects.object_exists(Bucket::Temporary, &reversed).await?
        {
            return Err(AppError::Conflict(CONNECTION_EXISTS_MESSAGE.to_string()));
        }

        let update = self.quota.consume(user_id).await?;

        self.objects
            .put_object(Bucket::Temporary, &key, file.bytes.clone(), file.stored_content_type())
            .await?;

        metrics::record_upload("user", "success");
        tracing::info!(user_id, key, remaining = update.upload_count, "User upload stored");

        Ok(UserUploadReceipt {
            message: UPLOADED_MESSAGE.to_string(),
            user: QuotaSnapshot {
                upload_count: update.upload_count,
                last_upload_date: update.last_upload_date,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::quota::{today_utc, IP_QUOTA_EXHAUSTED, USER_QUOTA_EXHAUSTED};
    use crate::account::repository::{NewUser, UserRepository};
    use crate::db::test_pool;
    use crate::test_support::{disk_store, jpeg_file, permissive_validator};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        objects: Arc<dyn ObjectStore>,
        service: UploadService,
    }

    async fn fixture() -> Fixture {
        let pool = test_pool().await;
        let users = UserRepository::new(pool.clone());
        users
            .create(NewUser {
                name: "Ana".to_string(),
                family_name: "Smith".to_string(),
                email: "ana@example.com".to_string(),
                password_hash: "x".to_string(),
                confirmation_token: None,
                token_expiration: None,
            })
            .await
            .unwrap();

        let (dir, objects) = disk_store();
        let service = UploadService::new(
            objects.clone(),
            permissive_validator(),
            UploadQuota::new(users),
            IpUploadCounter::new(pool),
        );
        Fixture {
            _dir: dir,
            objects,
            service,
        }
    }

    #[tokio::test]
    async fn test_temp_upload_counts_per_address() {
        let f = fixture().await;

        let receipt = f.service.upload_temp("9.9.9.9", &jpeg_file("beach day.jpg")).await.unwrap();
        assert_eq!(receipt.key, "beach day.jpg");
        assert_eq!(receipt.uploads_today, 1);
        assert_eq!(receipt.remaining_uploads, 9);
        assert!(f.objects.object_exists(Bucket::Temporary, "beach day.jpg").await.unwrap());

        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["uploadsToday"], 1);
        assert_eq!(json["remainingUploads"], 9);
    }

    #[tokio::test]
    async fn test_temp_upload_limit() {
        let f = fixture().await;

        for i in 0..10 {
            f.service
                .upload_temp("9.9.9.9", &jpeg_file(&format!("p{}.jpg", i)))
                .await
                .unwrap();
        }

        let eleventh = f.service.upload_temp("9.9.9.9", &jpeg_file("p10.jpg")).await;
        assert!(matches!(eleventh, Err(AppError::RateLimited(m)) if m == IP_QUOTA_EXHAUSTED));
        assert!(!f.objects.object_exists(Bucket::Temporary, "p10.jpg").await.unwrap());

        assert!(f.service.upload_temp("8.8.8.8", &jpeg_file("p10.jpg")).await.is_ok());
    }

    #[tokio::test]
    async fn test_user_upload_spends_quota() {
        let f = fixture().await;

        let receipt = f
            .service
            .user_upload("1", "Ana Smith", "Bob Lee", &jpeg_file("x.jpeg"))
            .await
            .unwrap();
        assert_eq!(receipt.user.upload_count, 9);
        assert_eq!(receipt.user.last_upload_date, today_utc());
        assert!(f.objects.object_exists(Bucket::Temporary, "Ana Smith_Bob Lee.jpeg").await.unwrap());
    }

    #[tokio::test]
    async fn test_user_upload_duplicate_either_order() {
        let f = fixture().await;
        f.service
            .user_upload("1", "Ana Smith", "Bob Lee", &jpeg_file("x.jpg"))
            .await
            .unwrap();

        let reversed = f
            .service
            .user_upload("1", "Bob Lee", "Ana Smith", &jpeg_file("y.jpg"))
            .await;
        assert!(matches!(reversed, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_user_upload_rejections_write_nothing() {
        let f = fixture().await;

        let same = f
            .service
            .user_upload("1", "Ana Smith", "Ana Smith", &jpeg_file("x.jpg"))
            .await;
        assert!(matches!(same, Err(AppError::Validation(_))));

        let bad_name = f
            .service
            .user_upload("1", "ana", "Bob Lee", &jpeg_file("x.jpg"))
            .await;
        assert!(matches!(bad_name, Err(AppError::Validation(_))));

        assert!(f.objects.list_objects(Bucket::Temporary, "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_quota_exhausted() {
        let f = fixture().await;
        let people = ["Ann A", "Ben B", "Cal C", "Dan D", "Eve E", "Fay F", "Gus G", "Hal H", "Ida I", "Jon J", "Kim K"];

        for other in &people[1..10] {
            f.service
                .user_upload("1", people[0], other, &jpeg_file("x.jpg"))
                .await
                .unwrap();
        }
        f.service
            .user_upload("1", "Ben B", "Cal C", &jpeg_file("x.jpg"))
            .await
            .unwrap();

        let over = f
            .service
            .user_upload("1", "Ben B", "Kim K", &jpeg_file("x.jpg"))
            .await;
        assert!(matches!(over, Err(AppError::RateLimited(m)) if m == USER_QUOTA_EXHAUSTED));
        assert!(!f.objects.object_exists(Bucket::Temporary, "Ben B_Kim K.jpg").await.unwrap());
    }
}
