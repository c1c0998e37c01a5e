/// Configuration management for Find Connections
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub graph: GraphConfig,
    pub email: Option<EmailConfig>,
    pub antivirus: AntivirusConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Externally reachable base URL, used in email links and local blob URLs
    pub public_url: String,
    pub version: String,
    pub upload_limit: usize,
    /// Take the client address from forwarding headers set by a trusted proxy
    pub trust_proxy_headers: bool,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
    pub object_store: ObjectStoreConfig,
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ObjectStoreConfig {
    Disk {
        location: PathBuf,
    },
    S3 {
        bucket: String,
        temp_bucket: String,
        region: String,
        access_key_id: String,
        secret_access_key: String,
        endpoint: Option<String>,
    },
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Mark session cookies `Secure`
    pub secure_cookies: bool,
    /// Admin account provisioned at startup, when both are set
    pub bootstrap_admin: Option<AdminBootstrap>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
}

/// Graph store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GraphConfig {
    /// Graph tables live in the main SQLite database
    Sqlite,
    Neo4j {
        uri: String,
        user: String,
        password: String,
    },
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Malware scanning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntivirusConfig {
    pub virustotal_api_key: Option<String>,
    pub base_url: String,
    /// Accept uploads without a scan when no API key is configured
    pub allow_unscanned: bool,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub burst: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("FC_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port: u16 = env::var("FC_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| AppError::Validation("Invalid port number".to_string()))?;
        let public_url = env::var("FC_PUBLIC_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", hostname, port))
            .trim_end_matches('/')
            .to_string();
        let version =
            env::var("FC_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());
        let upload_limit = env::var("FC_UPLOAD_LIMIT")
            .unwrap_or_else(|_| "5242880".to_string())
            .parse()
            .unwrap_or(5 * 1024 * 1024);

        let data_directory: PathBuf = env::var("FC_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("FC_DATABASE_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("find_connections.sqlite"));

        let object_store = if let Ok(bucket) = env::var("FC_S3_BUCKET") {
            ObjectStoreConfig::S3 {
                temp_bucket: env::var("FC_S3_TEMP_BUCKET")
                    .map_err(|_| AppError::Validation("S3 temp bucket required".to_string()))?,
                bucket,
                region: env::var("FC_S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                access_key_id: env::var("FC_S3_ACCESS_KEY_ID")
                    .map_err(|_| AppError::Validation("S3 access key required".to_string()))?,
                secret_access_key: env::var("FC_S3_SECRET_ACCESS_KEY")
                    .map_err(|_| AppError::Validation("S3 secret key required".to_string()))?,
                endpoint: env::var("FC_S3_ENDPOINT").ok(),
            }
        } else {
            ObjectStoreConfig::Disk {
                location: env::var("FC_OBJECT_STORE_LOCATION")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| data_directory.join("objects")),
            }
        };

        let jwt_secret = env::var("FC_JWT_SECRET")
            .map_err(|_| AppError::Validation("JWT secret required".to_string()))?;
        let bootstrap_admin = match (env::var("FC_ADMIN_EMAIL"), env::var("FC_ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) => Some(AdminBootstrap { email, password }),
            _ => None,
        };

        let graph = if let Ok(uri) = env::var("FC_NEO4J_URI") {
            GraphConfig::Neo4j {
                uri,
                user: env::var("FC_NEO4J_USER")
                    .map_err(|_| AppError::Validation("Neo4j user required".to_string()))?,
                password: env::var("FC_NEO4J_PASSWORD")
                    .map_err(|_| AppError::Validation("Neo4j password required".to_string()))?,
            }
        } else {
            GraphConfig::Sqlite
        };

        let email = if let Ok(smtp_url) = env::var("FC_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("FC_EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        let antivirus = AntivirusConfig {
            virustotal_api_key: env::var("FC_VIRUSTOTAL_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            base_url: env::var("FC_VIRUSTOTAL_URL")
                .unwrap_or_else(|_| "https://www.virustotal.com/vtapi/v2".to_string()),
            allow_unscanned: env_flag("FC_ALLOW_UNSCANNED_UPLOADS", false),
        };

        let rate_limit = RateLimitConfig {
            enabled: env_flag("FC_RATE_LIMITS_ENABLED", true),
            requests_per_second: env::var("FC_RATE_LIMIT_REQUESTS_PER_SECOND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            burst: env::var("FC_RATE_LIMIT_BURST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
        };

        let logging = LoggingConfig {
            level: env::var("RUST_LOG")
                .unwrap_or_else(|_| "find_connections=debug,tower_http=debug".to_string()),
            json: env::var("FC_LOG_FORMAT").map(|f| f == "json").unwrap_or(false),
        };

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                public_url,
                version,
                upload_limit,
                trust_proxy_headers: env_flag("FC_TRUST_PROXY_HEADERS", false),
            },
            storage: StorageConfig {
                data_directory,
                database,
                object_store,
            },
            authentication: AuthConfig {
                jwt_secret,
                secure_cookies: env_flag("FC_SECURE_COOKIES", false),
                bootstrap_admin,
            },
            graph,
            email,
            antivirus,
            rate_limit,
            logging,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.service.hostname.is_empty() {
            return Err(AppError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(AppError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.antivirus.virustotal_api_key.is_none() && !self.antivirus.allow_unscanned {
            tracing::warn!("No VirusTotal API key configured: every upload will be rejected");
        }

        Ok(())
    }

    /// Configuration for tests: in-memory database, disk objects under `root`
    pub fn for_testing(root: PathBuf) -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 3000,
                public_url: "http://localhost:3000".to_string(),
                version: "test".to_string(),
                upload_limit: 5 * 1024 * 1024,
                trust_proxy_headers: false,
            },
            storage: StorageConfig {
                database: PathBuf::from(":memory:"),
                object_store: ObjectStoreConfig::Disk {
                    location: root.join("objects"),
                },
                data_directory: root,
            },
            authentication: AuthConfig {
                jwt_secret: "test-secret-key-for-testing-only-0123456789".to_string(),
                secure_cookies: false,
                bootstrap_admin: None,
            },
            graph: GraphConfig::Sqlite,
            email: None,
            antivirus: AntivirusConfig {
                virustotal_api_key: None,
                base_url: "http://127.0.0.1:9".to_string(),
                allow_unscanned: true,
            },
            rate_limit: RateLimitConfig {
                enabled: false,
                requests_per_second: 1000,
                burst: 1000,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                json: false,
            },
        }
    }
}
