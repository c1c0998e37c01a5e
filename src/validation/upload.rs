/// Upload validation pipeline
///
/// Checks run in a fixed order and stop at the first failure: MIME type,
/// extension, size, filename, file signature, then the malware scan.
use super::antivirus::{MalwareScanner, ScanVerdict};
use crate::error::{AppError, AppResult};
use crate::metrics;
use image::ImageFormat;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED_MIME_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png"];
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_SIGNATURE: &[u8] = &[0x89, 0x50, 0x4E, 0x47];

pub const INVALID_TYPE_MESSAGE: &str = "Invalid file type. Please upload JPEG, JPG, PNG files only.";
pub const INVALID_EXTENSION_MESSAGE: &str =
    "Invalid file extension. Please use .jpg, .jpeg, .png files only.";
pub const TOO_LARGE_MESSAGE: &str = "File too large. Maximum size is 5MB.";
pub const INVALID_FILENAME_MESSAGE: &str = "Filename contains invalid characters. Only letters, numbers, spaces, hyphens, and underscores are allowed.";
pub const BAD_SIGNATURE_MESSAGE: &str =
    "File appears to be corrupted or not a valid file. Please upload a genuine file.";

lazy_static! {
    static ref FILENAME_STEM: Regex = Regex::new(r"^[a-zA-Z0-9_\-\s.]+$").unwrap();
}

/// A file received in a multipart upload
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Lowercased text after the last `.`, or the whole name when there is none
    pub fn extension(&self) -> String {
        self.file_name
            .rsplit('.')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase()
    }

    /// File name without its extension; empty when there is no `.`
    pub fn stem(&self) -> &str {
        match self.file_name.rfind('.') {
            Some(idx) => &self.file_name[..idx],
            None => "",
        }
    }

    /// Content type to store the object under, from the file's own bytes
    pub fn stored_content_type(&self) -> &'static str {
        match image::guess_format(&self.bytes) {
            Ok(ImageFormat::Png) => "image/png",
            Ok(ImageFormat::Jpeg) => "image/jpeg",
            _ if self.extension() == "png" => "image/png",
            _ => "image/jpeg",
        }
    }
}

fn signature_matches(extension: &str, bytes: &[u8]) -> bool {
    match extension {
        "jpg" | "jpeg" => bytes.starts_with(JPEG_SIGNATURE),
        "png" => bytes.starts_with(PNG_SIGNATURE),
        _ => false,
    }
}

/// Runs the validation pipeline for every kind of upload
pub struct UploadValidator {
    scanner: Arc<dyn MalwareScanner>,
    max_bytes: usize,
}

impl UploadValidator {
    pub fn new(scanner: Arc<dyn MalwareScanner>) -> Self {
        Self {
            scanner,
            max_bytes: MAX_UPLOAD_BYTES,
        }
    }

    /// Checks that need only the file's metadata and first bytes
    pub fn check_format(&self, file: &UploadedFile) -> AppResult<()> {
        if !ALLOWED_MIME_TYPES.contains(&file.content_type.as_str()) {
            return Err(AppError::Validation(INVALID_TYPE_MESSAGE.to_string()));
        }

        let extension = file.extension();
        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(AppError::Validation(INVALID_EXTENSION_MESSAGE.to_string()));
        }

        if file.bytes.len() > self.max_bytes {
            return Err(AppError::Validation(TOO_LARGE_MESSAGE.to_string()));
        }

        if !FILENAME_STEM.is_match(file.stem()) {
            return Err(AppError::Validation(INVALID_FILENAME_MESSAGE.to_string()));
        }

        if !signature_matches(&extension, &file.bytes) {
            return Err(AppError::Validation(BAD_SIGNATURE_MESSAGE.to_string()));
        }

        Ok(())
    }

    /// Full pipeline, ending with the malware scan
    pub async fn validate(&self, file: &UploadedFile) -> AppResult<()> {
        self.check_format(file)?;

        match self.scanner.scan(&file.bytes).await {
            Ok(ScanVerdict::Clean) => {
                metrics::record_scan("clean");
                Ok(())
            }
            Ok(ScanVerdict::Skipped) => {
                metrics::record_scan("skipped");
                Ok(())
            }
            Ok(ScanVerdict::Malicious { positives, total }) => {
                metrics::record_scan("malicious");
                tracing::warn!(file = %file.file_name, positives, total, "Upload flagged as malicious");
                Err(AppError::Validation(format!(
                    "Security check failed: Security threat detected: File detected as malicious by {} out of {} antivirus engines",
                    positives, total
                )))
            }
            Err(e) => {
                metrics::record_scan("error");
                tracing::warn!(file = %file.file_name, error = %e, "Malware scan failed");
                Err(AppError::Validation(format!(
                    "Security check failed: Antivirus scan failed: {}",
                    e
                )))
            }
        }
    }
}
