/// Google Admin Directory provisioning
use crate::{
    db::models::Account,
    providers::{CredentialSource, DirectoryProvisioner, ProviderError},
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub const ADMIN_DIRECTORY_USER_SCOPE: &str = "https://www.googleapis.com/auth/admin.directory.user";

const USERS_INSERT_URL: &str = "https://admin.googleapis.com/admin/directory/v1/users";

/// `users.insert` body for an approved account
///
/// The phone number is the initial password; the user must change it on first login.
pub fn user_insert_body(account: &Account, primary_domain: &str) -> Result<Value, ProviderError> {
    let id = account
        .id
        .as_deref()
        .ok_or_else(|| ProviderError::Parse("account has no id to provision".to_string()))?;

    Ok(json!({
        "externalIds": [{"value": id, "type": "organization"}],
        "primaryEmail": format!("{}@{}", id, primary_domain),
        "orgUnitPath": format!("/{}", primary_domain),
        "name": {
            "givenName": account.first_name,
            "familyName": account.last_name,
        },
        "password": account.phone_number,
        "changePasswordAtNextLogin": true,
        "recoveryEmail": account.email,
        "emails": [{"address": account.email, "type": "home"}],
    }))
}

pub struct GoogleDirectory {
    credentials: Arc<dyn CredentialSource>,
    primary_domain: String,
    users_url: String,
}

impl GoogleDirectory {
    pub fn new(credentials: Arc<dyn CredentialSource>, primary_domain: String) -> Self {
        Self::with_users_url(credentials, primary_domain, USERS_INSERT_URL.to_string())
    }

    pub fn with_users_url(
        credentials: Arc<dyn CredentialSource>,
        primary_domain: String,
        users_url: String,
    ) -> Self {
        Self {
            credentials,
            primary_domain,
            users_url,
        }
    }
}

#[async_trait]
impl DirectoryProvisioner for GoogleDirectory {
    #[tracing::instrument(skip(self, account), fields(email = %account.email))]
    async fn create_account(&self, account: &Account) -> Result<(), ProviderError> {
        let body = user_insert_body(account, &self.primary_domain)?;
        let client = self.credentials.scoped_client().await?;

        let response = client.post(&self.users_url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(text);
            tracing::warn!("Directory rejected {}: {} {}", account.email, status, message);
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        tracing::info!("Provisioned directory account for {}", account.email);
        Ok(())
    }
}

/// Stand-in used when no service-account key is configured
pub struct UnconfiguredProvisioner;

#[async_trait]
impl DirectoryProvisioner for UnconfiguredProvisioner {
    async fn create_account(&self, _account: &Account) -> Result<(), ProviderError> {
        Err(ProviderError::NotConfigured(
            "no service account key for the admin directory".to_string(),
        ))
    }
}
