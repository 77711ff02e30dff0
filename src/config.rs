/// Configuration management for the IAM service
use crate::error::{IamError, IamResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub google: GoogleConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 key used to sign bearer tokens
    pub jwt_secret: String,
    /// Development bypass: the access gate lets every request through
    pub login_disabled: bool,
    /// Allow-listed email domains, first entry is the primary domain
    pub domains: Vec<String>,
    pub primary_domain: String,
    /// Maximum age of a provider grant in seconds; 0 disables the check
    pub oauth_token_expire_time: u64,
    pub session_lifetime_days: i64,
    pub cookie_secure: bool,
}

/// Google OAuth client and Admin Directory credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    pub redirect_uri: String,
    /// Service account key used for directory provisioning
    pub admin_directory_key: Option<PathBuf>,
    /// Workspace admin impersonated by the service account, when delegation is used
    pub admin_subject: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> IamResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("IAM_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("IAM_PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| IamError::Validation("Invalid port number".to_string()))?;
        let version = env::var("IAM_VERSION").unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let data_directory: PathBuf = env::var("IAM_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("IAM_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("iam.sqlite"));

        let jwt_secret = env::var("IAM_JWT_SECRET")
            .map_err(|_| IamError::Validation("JWT secret required".to_string()))?;

        let login_disabled = env::var("IAM_LOGIN_DISABLED")
            .or_else(|_| env::var("LOGIN_DISABLED"))
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        let domains = split_list(&env::var("IAM_DOMAINS").unwrap_or_default());
        let primary_domain = env::var("IAM_PRIMARY_DOMAIN")
            .ok()
            .filter(|d| !d.trim().is_empty())
            .or_else(|| domains.first().cloned())
            .unwrap_or_default();

        let oauth_token_expire_time = env::var("IAM_OAUTH_TOKEN_EXPIRE_TIME")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().parse())
            .transpose()
            .map_err(|_| {
                IamError::Validation("IAM_OAUTH_TOKEN_EXPIRE_TIME must be a number of seconds".to_string())
            })?
            .unwrap_or(0);
        let session_lifetime_days = env::var("IAM_SESSION_LIFETIME_DAYS")
            .unwrap_or_else(|_| "31".to_string())
            .parse()
            .unwrap_or(31);
        let cookie_secure = env::var("IAM_COOKIE_SECURE")
            .map(|v| parse_bool(&v))
            .unwrap_or(true);

        let client_id = env::var("IAM_GOOGLE_CLIENT_ID").unwrap_or_default();
        let client_secret = env::var("IAM_GOOGLE_CLIENT_SECRET").unwrap_or_default();
        let redirect_uri = env::var("IAM_GOOGLE_REDIRECT_URI")
            .unwrap_or_else(|_| format!("http://{}:{}/login/google/authorized", hostname, port));
        let admin_directory_key = env::var("IAM_GOOGLE_SERVICE_ACCOUNT_KEY_PATH_ADMIN_DIRECTORY_KEY")
            .or_else(|_| env::var("IAM_GOOGLE_SERVICE_ACCOUNT_KEY_PATH_GENERAL_KEY"))
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let admin_subject = env::var("IAM_GOOGLE_ADMIN_SUBJECT")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let log_level = env::var("RUST_LOG")
            .unwrap_or_else(|_| "orgiam=debug,tower_http=debug".to_string());
        let log_json = env::var("IAM_LOG_JSON")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            authentication: AuthConfig {
                jwt_secret,
                login_disabled,
                domains,
                primary_domain,
                oauth_token_expire_time,
                session_lifetime_days,
                cookie_secure,
            },
            google: GoogleConfig {
                client_id,
                client_secret,
                redirect_uri,
                admin_directory_key,
                admin_subject,
            },
            logging: LoggingConfig {
                level: log_level,
                json: log_json,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> IamResult<()> {
        if self.service.hostname.is_empty() {
            return Err(IamError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(IamError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.authentication.domains.is_empty() {
            return Err(IamError::Validation(
                "IAM_DOMAINS must list at least one domain".to_string(),
            ));
        }

        if self.authentication.session_lifetime_days <= 0 {
            return Err(IamError::Validation(
                "Session lifetime must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Comma-separated list, blanks dropped, domains lowercased
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
