/// Application context and dependency injection
use crate::{
    account::{
        quota::{IpUploadCounter, UploadQuota},
        repository::{AdminRepository, UserRepository},
        AccountManager,
    },
    auth::tokens::TokenService,
    ban::BanTracker,
    config::{GraphConfig, ObjectStoreConfig, ServerConfig},
    connections::ConnectionService,
    db,
    error::AppResult,
    graph::{Neo4jGraph, PersonGraph, SqliteGraph},
    mailer::Mailer,
    object_store::{DiskObjectStore, ObjectStore, S3ObjectStore},
    rate_limit::RateLimiter,
    suggestions::SuggestionIndex,
    uploads::UploadService,
    validation::{
        antivirus::{scanner_from_config, MalwareScanner},
        upload::UploadValidator,
    },
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub tokens: Arc<TokenService>,
    pub accounts: Arc<AccountManager>,
    pub connections: Arc<ConnectionService>,
    pub uploads: Arc<UploadService>,
    pub suggestions: Arc<SuggestionIndex>,
    pub objects: Arc<dyn ObjectStore>,
    pub graph: Arc<dyn PersonGraph>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AppResult<Self> {
        config.validate()?;
        tokio::fs::create_dir_all(&config.storage.data_directory).await?;

        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let tokens = Arc::new(TokenService::new(&config.authentication.jwt_secret));

        let graph: Arc<dyn PersonGraph> = match &config.graph {
            GraphConfig::Sqlite => Arc::new(SqliteGraph::new(db.clone())),
            GraphConfig::Neo4j {
                uri,
                user,
                password,
            } => Arc::new(Neo4jGraph::connect(uri, user, password).await?),
        };

        let objects: Arc<dyn ObjectStore> = match &config.storage.object_store {
            ObjectStoreConfig::Disk { location } => Arc::new(DiskObjectStore::new(
                location.clone(),
                &config.service.public_url,
                tokens.clone(),
            )),
            ObjectStoreConfig::S3 {
                bucket,
                temp_bucket,
                region,
                access_key_id,
                secret_access_key,
                endpoint,
            } => Arc::new(
                S3ObjectStore::new(
                    bucket.clone(),
                    temp_bucket.clone(),
                    region.clone(),
                    access_key_id,
                    secret_access_key,
                    endpoint.as_deref(),
                )
                .await?,
            ),
        };

        let scanner = scanner_from_config(&config.antivirus);
        let ctx = Self::from_parts(config, db, tokens, graph, objects, scanner)?;

        if let Some(admin) = &ctx.config.authentication.bootstrap_admin {
            ctx.accounts
                .bootstrap_admin(&admin.email, &admin.password)
                .await?;
        }

        Ok(ctx)
    }

    /// Wire services around already-built backends
    ///
    /// `tokens` must be the same service handed to any object store that
    /// signs blob URLs, so links and sessions share one key.
    pub fn from_parts(
        config: ServerConfig,
        db: SqlitePool,
        tokens: Arc<TokenService>,
        graph: Arc<dyn PersonGraph>,
        objects: Arc<dyn ObjectStore>,
        scanner: Arc<dyn MalwareScanner>,
    ) -> AppResult<Self> {
        let mailer = Arc::new(Mailer::new(
            config.email.clone(),
            &config.service.public_url,
        )?);

        let users = UserRepository::new(db.clone());
        let accounts = Arc::new(AccountManager::new(
            users.clone(),
            AdminRepository::new(db.clone()),
            BanTracker::new(db.clone()),
            tokens.clone(),
            mailer,
        ));

        let validator = Arc::new(UploadValidator::new(scanner));
        let suggestions = Arc::new(SuggestionIndex::new(objects.clone()));

        let connections = Arc::new(ConnectionService::new(
            graph.clone(),
            objects.clone(),
            suggestions.clone(),
            validator.clone(),
        ));
        let uploads = Arc::new(UploadService::new(
            objects.clone(),
            validator,
            UploadQuota::new(users),
            IpUploadCounter::new(db.clone()),
        ));

        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok(Self {
            config: Arc::new(config),
            db,
            tokens,
            accounts,
            connections,
            uploads,
            suggestions,
            objects,
            graph,
            rate_limiter,
        })
    }
}
