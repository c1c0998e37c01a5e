/// Shared fixtures for unit tests
use crate::{
    auth::tokens::TokenService,
    object_store::{DiskObjectStore, ObjectStore},
    validation::{
        antivirus::UnconfiguredScanner,
        upload::{UploadValidator, UploadedFile},
    },
};
use std::sync::Arc;
use tempfile::TempDir;

pub const TEST_SECRET: &str = "test-secret-key-for-testing-only-0123456789";

/// Disk object store in a fresh temp dir; keep the dir alive with the store
pub fn disk_store() -> (TempDir, Arc<dyn ObjectStore>) {
    let dir = tempfile::tempdir().unwrap();
    let store = DiskObjectStore::new(
        dir.path().to_path_buf(),
        "http://localhost:3000",
        Arc::new(TokenService::new(TEST_SECRET)),
    );
    (dir, Arc::new(store))
}

/// Validator whose malware scan is skipped
pub fn permissive_validator() -> Arc<UploadValidator> {
    Arc::new(UploadValidator::new(Arc::new(UnconfiguredScanner::new(true))))
}

/// A file that passes every format check as a JPEG
pub fn jpeg_file(name: &str) -> UploadedFile {
    UploadedFile {
        file_name: name.to_string(),
        content_type: "image/jpeg".to_string(),
        bytes: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'],
    }
}
