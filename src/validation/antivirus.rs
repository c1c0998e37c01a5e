/// Malware scanning of uploaded files
///
/// Every failure mode is a rejection: a scan that cannot reach a verdict
/// never lets a file through.
use crate::config::AntivirusConfig;
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a completed scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    Malicious { positives: u32, total: u32 },
    /// No scanner configured and unscanned uploads are allowed
    Skipped,
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Antivirus scanning is not configured")]
    NotConfigured,

    #[error("Request timed out")]
    Timeout,

    #[error("{0}")]
    Transport(String),

    #[error("Failed to initialize scan")]
    SubmitRejected,

    #[error("File not found in scanner database")]
    NotFound,

    #[error("Unexpected scanner response code {0}")]
    UnexpectedCode(i64),

    #[error("Scan timeout - unable to verify file security")]
    Exhausted,
}

impl From<reqwest::Error> for ScanError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ScanError::Timeout
        } else {
            ScanError::Transport(e.to_string())
        }
    }
}

#[async_trait]
pub trait MalwareScanner: Send + Sync {
    async fn scan(&self, bytes: &[u8]) -> Result<ScanVerdict, ScanError>;
}

/// Scanner used when no API key is configured
pub struct UnconfiguredScanner {
    allow_unscanned: bool,
}

impl UnconfiguredScanner {
    pub fn new(allow_unscanned: bool) -> Self {
        Self { allow_unscanned }
    }
}

#[async_trait]
impl MalwareScanner for UnconfiguredScanner {
    async fn scan(&self, _bytes: &[u8]) -> Result<ScanVerdict, ScanError> {
        if self.allow_unscanned {
            tracing::warn!("Malware scan skipped: no scanner configured");
            Ok(ScanVerdict::Skipped)
        } else {
            Err(ScanError::NotConfigured)
        }
    }
}

#[derive(Debug, Deserialize)]
struct Report {
    response_code: i64,
    #[serde(default)]
    positives: Option<u32>,
    #[serde(default)]
    total: Option<u32>,
    #[serde(default)]
    resource: Option<String>,
}

impl Report {
    fn verdict(&self) -> ScanVerdict {
        match self.positives.unwrap_or(0) {
            0 => ScanVerdict::Clean,
            positives => ScanVerdict::Malicious {
                positives,
                total: self.total.unwrap_or(0),
            },
        }
    }
}

/// Polling schedule after a file is submitted
#[derive(Debug, Clone)]
pub struct PollSchedule {
    pub initial_wait: Duration,
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            initial_wait: Duration::from_secs(5),
            interval: Duration::from_secs(3),
            max_attempts: 3,
        }
    }
}

/// VirusTotal v2 client
pub struct VirusTotalScanner {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    schedule: PollSchedule,
}

impl VirusTotalScanner {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self::with_schedule(api_key, base_url, PollSchedule::default())
    }

    pub fn with_schedule(api_key: String, base_url: String, schedule: PollSchedule) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            schedule,
        }
    }

    async fn report(&self, resource: &str) -> Result<Report, ScanError> {
        let response = self
            .client
            .get(format!("{}/file/report", self.base_url))
            .query(&[("apikey", self.api_key.as_str()), ("resource", resource)])
            .timeout(LOOKUP_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    async fn submit(&self, bytes: &[u8]) -> Result<String, ScanError> {
        let form = reqwest::multipart::Form::new()
            .text("apikey", self.api_key.clone())
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes.to_vec()).file_name("upload"),
            );

        let report: Report = self
            .client
            .post(format!("{}/file/scan", self.base_url))
            .multipart(form)
            .timeout(SUBMIT_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match (report.response_code, report.resource) {
            (1, Some(resource)) => Ok(resource),
            _ => Err(ScanError::SubmitRejected),
        }
    }
}

#[async_trait]
impl MalwareScanner for VirusTotalScanner {
    async fn scan(&self, bytes: &[u8]) -> Result<ScanVerdict, ScanError> {
        let hash = hex::encode(Sha256::digest(bytes));

        let existing = self.report(&hash).await?;
        if existing.response_code == 1 {
            tracing::debug!(%hash, "Known file, using cached scan report");
            return Ok(existing.verdict());
        }

        let resource = self.submit(bytes).await?;
        tokio::time::sleep(self.schedule.initial_wait).await;

        for attempt in 1..=self.schedule.max_attempts {
            let report = self.report(&resource).await?;
            match report.response_code {
                1 => return Ok(report.verdict()),
                -2 => {
                    tracing::debug!(attempt, "Scan still in progress");
                    if attempt < self.schedule.max_attempts {
                        tokio::time::sleep(self.schedule.interval).await;
                    }
                }
                0 => return Err(ScanError::NotFound),
                code => return Err(ScanError::UnexpectedCode(code)),
            }
        }

        Err(ScanError::Exhausted)
    }
}

/// Pick the scanner for this configuration
pub fn scanner_from_config(config: &AntivirusConfig) -> Arc<dyn MalwareScanner> {
    match &config.virustotal_api_key {
        Some(key) => Arc::new(VirusTotalScanner::new(key.clone(), config.base_url.clone())),
        None => Arc::new(UnconfiguredScanner::new(config.allow_unscanned)),
    }
}
