/// Service-account credentials (JWT bearer grant)
use crate::{
    error::{IamError, IamResult},
    providers::{AccessToken, CredentialSource, ProviderError, ScopedClient},
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Fields of a service-account key file we use
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub async fn load(path: &Path) -> IamResult<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            IamError::Internal(format!("Failed to read service account key {:?}: {}", path, e))
        })?;

        serde_json::from_str(&raw)
            .map_err(|e| IamError::Internal(format!("Invalid service account key {:?}: {}", path, e)))
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Exchanges signed assertions for access tokens, caching until shortly before expiry
pub struct ServiceAccountCredentials {
    http: reqwest::Client,
    key: ServiceAccountKey,
    scopes: Vec<String>,
    subject: Option<String>,
    cached: Mutex<Option<AccessToken>>,
}

impl ServiceAccountCredentials {
    pub fn new(
        http: reqwest::Client,
        key: ServiceAccountKey,
        scopes: Vec<String>,
        subject: Option<String>,
    ) -> Self {
        Self {
            http,
            key,
            scopes,
            subject,
            cached: Mutex::new(None),
        }
    }

    fn signed_assertion(&self) -> Result<String, ProviderError> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: self.scopes.join(" "),
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
            sub: self.subject.as_deref(),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| ProviderError::Credentials(format!("Invalid private key: {}", e)))?;

        encode(&header, &claims, &key)
            .map_err(|e| ProviderError::Credentials(format!("Failed to sign assertion: {}", e)))
    }
}

#[async_trait]
impl CredentialSource for ServiceAccountCredentials {
    #[tracing::instrument(skip(self), fields(client = %self.key.client_email))]
    async fn fetch_credentials(&self) -> Result<AccessToken, ProviderError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() + Duration::seconds(60) {
                return Ok(token.clone());
            }
        }

        let assertion = self.signed_assertion()?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::warn!("Service account token request failed: {} {}", status, message);
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let token = AccessToken {
            token: body.access_token,
            expires_at: Utc::now() + Duration::seconds(body.expires_in.unwrap_or(3600)),
        };
        *cached = Some(token.clone());

        Ok(token)
    }

    async fn scoped_client(&self) -> Result<ScopedClient, ProviderError> {
        let credentials = self.fetch_credentials().await?;
        Ok(ScopedClient::new(self.http.clone(), credentials.token))
    }
}
