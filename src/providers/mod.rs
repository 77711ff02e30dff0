/// External provider clients
///
/// The identity provider drives browser login, the directory provisioner
/// creates workspace accounts on approval, and a credential source mints
/// the access tokens the provisioner calls with. Each is a trait so the
/// HTTP layer and tests can swap implementations.

mod credentials;
mod directory;
mod google;

pub use credentials::{ServiceAccountCredentials, ServiceAccountKey};
pub use directory::{user_insert_body, GoogleDirectory, UnconfiguredProvisioner};
pub use google::{GoogleEndpoints, GoogleIdentityProvider};

use crate::{config::ServerConfig, db::models::Account, error::IamError, error::IamResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors from provider calls
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The token handed to the provider is expired, revoked or belongs to another client
    #[error("Token invalid or expired: {0}")]
    InvalidToken(String),

    /// Structured error returned by the provider
    #[error("Provider returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body did not have the expected shape
    #[error("Failed to parse provider response: {0}")]
    Parse(String),

    /// Service-account key missing or unusable
    #[error("Provider credentials error: {0}")]
    Credentials(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl From<ProviderError> for IamError {
    fn from(err: ProviderError) -> Self {
        IamError::Upstream(err.to_string())
    }
}

/// Token set returned by the identity provider's code exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Identity fields the login flow needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderUserInfo {
    #[serde(alias = "sub")]
    pub id: String,
    pub email: String,
}

/// Short-lived bearer credential for provider APIs
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// HTTP client bound to a credential
#[derive(Debug, Clone)]
pub struct ScopedClient {
    http: reqwest::Client,
    token: String,
}

impl ScopedClient {
    pub fn new(http: reqwest::Client, token: String) -> Self {
        Self { http, token }
    }

    pub fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.http.post(url).bearer_auth(&self.token)
    }

    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http.get(url).bearer_auth(&self.token)
    }
}

/// Mints provider credentials
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch_credentials(&self) -> Result<AccessToken, ProviderError>;

    async fn scoped_client(&self) -> Result<ScopedClient, ProviderError>;
}

/// OAuth identity provider used for browser login
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Stored as `oauth_grant.provider`
    fn name(&self) -> &str;

    fn authorization_url(&self, state: &str) -> Result<String, ProviderError>;

    async fn exchange_code(&self, code: &str) -> Result<ProviderToken, ProviderError>;

    async fn fetch_user_info(&self, access_token: &str) -> Result<ProviderUserInfo, ProviderError>;

    async fn revoke(&self, access_token: &str) -> Result<(), ProviderError>;
}

/// Creates accounts in the external workspace directory
#[async_trait]
pub trait DirectoryProvisioner: Send + Sync {
    async fn create_account(&self, account: &Account) -> Result<(), ProviderError>;
}

/// Provider set built from configuration
#[derive(Clone)]
pub struct Providers {
    pub identity: Arc<dyn IdentityProvider>,
    pub provisioner: Arc<dyn DirectoryProvisioner>,
}

impl Providers {
    pub async fn from_config(config: &ServerConfig) -> IamResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| IamError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let identity = Arc::new(GoogleIdentityProvider::new(
            http.clone(),
            config.google.clone(),
            config.authentication.primary_domain.clone(),
            GoogleEndpoints::default(),
        ));

        let provisioner: Arc<dyn DirectoryProvisioner> = match &config.google.admin_directory_key {
            Some(path) => {
                let key = ServiceAccountKey::load(path).await?;
                tracing::info!("Directory provisioning as {}", key.client_email);
                let credentials = ServiceAccountCredentials::new(
                    http.clone(),
                    key,
                    vec![directory::ADMIN_DIRECTORY_USER_SCOPE.to_string()],
                    config.google.admin_subject.clone(),
                );
                Arc::new(GoogleDirectory::new(
                    Arc::new(credentials),
                    config.authentication.primary_domain.clone(),
                ))
            }
            None => {
                tracing::warn!("No service account key configured; approvals will not provision accounts");
                Arc::new(UnconfiguredProvisioner)
            }
        };

        Ok(Self {
            identity,
            provisioner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_info_accepts_sub() {
        let info: ProviderUserInfo =
            serde_json::from_value(serde_json::json!({"sub": "123", "email": "a@example.org"}))
                .unwrap();
        assert_eq!(info.id, "123");

        let info: ProviderUserInfo = serde_json::from_value(
            serde_json::json!({"id": "456", "email": "a@example.org", "verified_email": true}),
        )
        .unwrap();
        assert_eq!(info.id, "456");
    }

    #[test]
    fn test_provider_error_maps_to_upstream() {
        let err: IamError = ProviderError::NotConfigured("directory".into()).into();
        assert!(matches!(err, IamError::Upstream(_)));
    }
}
