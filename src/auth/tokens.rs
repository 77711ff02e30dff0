/// Long-lived bearer tokens
///
/// Tokens are HS256 JWTs whose subject is the account id. They carry no
/// expiry claim: the `account_token` row is the source of truth, and a token
/// stays valid until its row gets an `expire_time`.
use crate::{
    account::AccountDirectory,
    db::models::Account,
    error::{IamError, IamResult},
};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    sub: String,
    iat: i64,
    jti: String,
}

pub struct TokenAuthority {
    directory: AccountDirectory,
    secret: String,
}

impl TokenAuthority {
    pub fn new(directory: AccountDirectory, secret: String) -> Self {
        Self { directory, secret }
    }

    /// Sign and persist a new active token; the raw string is only returned here
    pub async fn issue(&self, account: &Account) -> IamResult<String> {
        let account_id = account
            .id
            .as_deref()
            .ok_or_else(|| IamError::Validation("Account has not been approved".to_string()))?;

        let claims = TokenClaims {
            sub: account_id.to_string(),
            iat: Utc::now().timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| IamError::Jwt(format!("Failed to generate token: {}", e)))?;

        self.directory.insert_token(account_id, &token).await?;
        tracing::info!("Issued token for {}", account_id);

        Ok(token)
    }

    pub async fn list_active(&self, account: &Account) -> IamResult<Vec<String>> {
        let Some(account_id) = account.id.as_deref() else {
            return Ok(Vec::new());
        };

        let tokens = self.directory.active_tokens(account_id).await?;
        Ok(tokens.into_iter().map(|t| t.token).collect())
    }

    /// Revoke one of the account's active tokens
    ///
    /// Already revoked, another account's, and unknown tokens all yield `NotFound`.
    pub async fn revoke(&self, account: &Account, token: &str) -> IamResult<()> {
        let account_id = account.id.as_deref().unwrap_or_default();

        if !self.directory.expire_token(account_id, token).await? {
            return Err(IamError::NotFound("Token not found".to_string()));
        }

        tracing::info!("Revoked token for {}", account_id);
        Ok(())
    }

    /// Account owning `token`, if the token is active
    pub async fn resolve(&self, token: &str) -> IamResult<Option<Account>> {
        self.directory.account_for_active_token(token).await
    }
}
