/// Google OAuth 2.0 identity provider
use crate::{
    config::GoogleConfig,
    providers::{IdentityProvider, ProviderError, ProviderToken, ProviderUserInfo},
};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

const SCOPES: &str = "openid email profile";

/// Endpoint set, overridable for tests
#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub authorize: String,
    pub token: String,
    pub userinfo: String,
    pub revoke: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            authorize: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token: "https://oauth2.googleapis.com/token".to_string(),
            userinfo: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
            revoke: "https://accounts.google.com/o/oauth2/revoke".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

pub struct GoogleIdentityProvider {
    http: reqwest::Client,
    config: GoogleConfig,
    hosted_domain: String,
    endpoints: GoogleEndpoints,
}

impl GoogleIdentityProvider {
    pub fn new(
        http: reqwest::Client,
        config: GoogleConfig,
        hosted_domain: String,
        endpoints: GoogleEndpoints,
    ) -> Self {
        Self {
            http,
            config,
            hosted_domain,
            endpoints,
        }
    }
}

/// Turn a non-success response into a provider error
///
/// `invalid_token` and `invalid_client` mean the grant is already unusable.
async fn error_from_response(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let body: Option<GoogleErrorBody> = serde_json::from_str(&text).ok();

    let code = body.as_ref().and_then(|b| b.error.clone());
    let message = body
        .and_then(|b| b.error_description)
        .or_else(|| code.clone())
        .unwrap_or(text);

    match code.as_deref() {
        Some("invalid_token") | Some("invalid_client") | Some("invalid_grant") => {
            ProviderError::InvalidToken(message)
        }
        _ if status == 401 => ProviderError::InvalidToken(message),
        _ => ProviderError::Api { status, message },
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    fn name(&self) -> &str {
        "google"
    }

    fn authorization_url(&self, state: &str) -> Result<String, ProviderError> {
        let mut url = Url::parse(&self.endpoints.authorize)
            .map_err(|e| ProviderError::Parse(format!("Invalid authorize URL: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &self.config.redirect_uri)
                .append_pair("response_type", "code")
                .append_pair("scope", SCOPES)
                .append_pair("state", state)
                .append_pair("access_type", "online");
            if !self.hosted_domain.is_empty() {
                query.append_pair("hd", &self.hosted_domain);
            }
        }

        Ok(url.to_string())
    }

    #[tracing::instrument(skip(self, code))]
    async fn exchange_code(&self, code: &str) -> Result<ProviderToken, ProviderError> {
        let response = self
            .http
            .post(&self.endpoints.token)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }

    #[tracing::instrument(skip(self, access_token))]
    async fn fetch_user_info(&self, access_token: &str) -> Result<ProviderUserInfo, ProviderError> {
        let response = self
            .http
            .get(&self.endpoints.userinfo)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }

    #[tracing::instrument(skip(self, access_token))]
    async fn revoke(&self, access_token: &str) -> Result<(), ProviderError> {
        let response = self
            .http
            .post(&self.endpoints.revoke)
            .query(&[("token", access_token)])
            .header("content-type", "application/x-www-form-urlencoded")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        Ok(())
    }
}
