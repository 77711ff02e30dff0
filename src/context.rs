/// Application context and dependency injection
use crate::{
    account::AccountDirectory,
    approval::ApprovalWorkflow,
    auth::{AccessGate, OAuthBroker, SessionStore, TokenAuthority},
    config::ServerConfig,
    db,
    error::{IamError, IamResult},
    providers::Providers,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub directory: AccountDirectory,
    pub tokens: Arc<TokenAuthority>,
    pub sessions: SessionStore,
    pub broker: Arc<OAuthBroker>,
    pub gate: Arc<AccessGate>,
    pub approvals: Arc<ApprovalWorkflow>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> IamResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let providers = Providers::from_config(&config).await?;

        Ok(Self::with_parts(config, db, providers))
    }

    /// Wire services over an existing pool and provider set
    pub fn with_parts(config: ServerConfig, db: SqlitePool, providers: Providers) -> Self {
        let auth = &config.authentication;
        let directory = AccountDirectory::new(db.clone());

        let tokens = Arc::new(TokenAuthority::new(directory.clone(), auth.jwt_secret.clone()));
        let sessions = SessionStore::new(
            directory.clone(),
            auth.session_lifetime_days,
            auth.cookie_secure,
        );
        let broker = Arc::new(OAuthBroker::new(
            directory.clone(),
            sessions.clone(),
            providers.identity.clone(),
            auth.domains.clone(),
            auth.oauth_token_expire_time,
        ));
        let gate = Arc::new(AccessGate::new(
            tokens.clone(),
            sessions.clone(),
            broker.clone(),
            directory.clone(),
            auth.login_disabled,
        ));
        let approvals = Arc::new(ApprovalWorkflow::new(
            directory.clone(),
            providers.provisioner.clone(),
        ));

        Self {
            config: Arc::new(config),
            db,
            directory,
            tokens,
            sessions,
            broker,
            gate,
            approvals,
        }
    }

    async fn ensure_directories(config: &ServerConfig) -> IamResult<()> {
        let dir = &config.storage.data_directory;
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                IamError::Internal(format!("Failed to create directory {:?}: {}", dir, e))
            })?;
        }

        if let Some(parent) = config.storage.database.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        Ok(())
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
