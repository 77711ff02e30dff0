/// OAuth login broker
///
/// A login walks `Started -> ProviderCallback -> DomainChecked ->
/// AccountResolved -> GrantPersisted -> SessionEstablished`, and any gate can
/// end it in `Rejected`. Accounts are never created here: the email's local
/// part must already be an approved account id.
use crate::{
    account::AccountDirectory,
    auth::session::SessionStore,
    db::models::{Account, OAuthGrant, Session},
    error::{IamError, IamResult},
    providers::{IdentityProvider, ProviderError, ProviderToken},
};
use chrono::{Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

const STATE_TTL_MINUTES: i64 = 10;

/// Progress of a single login attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    Started,
    ProviderCallback,
    DomainChecked,
    AccountResolved,
    GrantPersisted,
    SessionEstablished,
    Rejected(String),
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginState::Started => write!(f, "started"),
            LoginState::ProviderCallback => write!(f, "provider callback"),
            LoginState::DomainChecked => write!(f, "domain checked"),
            LoginState::AccountResolved => write!(f, "account resolved"),
            LoginState::GrantPersisted => write!(f, "grant persisted"),
            LoginState::SessionEstablished => write!(f, "session established"),
            LoginState::Rejected(reason) => write!(f, "rejected: {}", reason),
        }
    }
}

/// Storage for pending CSRF states
#[derive(Clone, Default)]
pub struct OAuthStateStore {
    states: Arc<RwLock<HashMap<String, chrono::DateTime<Utc>>>>,
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn store(&self, state: String) {
        let mut states = self.states.write().await;
        let cutoff = Utc::now() - Duration::minutes(STATE_TTL_MINUTES);
        states.retain(|_, issued| *issued > cutoff);
        states.insert(state, Utc::now());
    }

    /// Consume a state; true only for a known, unexpired value
    pub async fn take(&self, state: &str) -> bool {
        let mut states = self.states.write().await;
        match states.remove(state) {
            Some(issued) => issued > Utc::now() - Duration::minutes(STATE_TTL_MINUTES),
            None => false,
        }
    }
}

/// Provider callback query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub account: Account,
    pub session: Session,
    pub state: LoginState,
}

pub struct OAuthBroker {
    directory: AccountDirectory,
    sessions: SessionStore,
    provider: Arc<dyn IdentityProvider>,
    states: OAuthStateStore,
    domains: Vec<String>,
    grant_max_age: u64,
}

fn reject(reason: impl Into<String>) -> IamError {
    let state = LoginState::Rejected(reason.into());
    tracing::warn!("Login {}", state);
    IamError::Authentication(state.to_string())
}

impl OAuthBroker {
    pub fn new(
        directory: AccountDirectory,
        sessions: SessionStore,
        provider: Arc<dyn IdentityProvider>,
        domains: Vec<String>,
        grant_max_age: u64,
    ) -> Self {
        Self {
            directory,
            sessions,
            provider,
            states: OAuthStateStore::new(),
            domains,
            grant_max_age,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// `Started`: mint a CSRF state and return the provider authorization URL
    pub async fn begin_login(&self) -> IamResult<String> {
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        let url = self.provider.authorization_url(&state)?;
        self.states.store(state).await;
        tracing::debug!("Login {}", LoginState::Started);

        Ok(url)
    }

    /// Handle the provider redirect: validate state, exchange the code, then establish
    pub async fn complete_login(&self, params: CallbackParams) -> IamResult<LoginOutcome> {
        if let Some(error) = params.error {
            let description = params.error_description.unwrap_or_default();
            return Err(reject(format!("provider error {} {}", error, description)));
        }

        let state = params.state.ok_or_else(|| reject("missing state"))?;
        if !self.states.take(&state).await {
            return Err(reject("unknown or expired state"));
        }

        let code = params.code.ok_or_else(|| reject("missing authorization code"))?;
        let token = self
            .provider
            .exchange_code(&code)
            .await
            .map_err(|e| reject(format!("code exchange failed: {}", e)))?;

        self.establish(Some(token)).await
    }

    /// Run the login gates for a provider token and open a session
    pub async fn establish(&self, token: Option<ProviderToken>) -> IamResult<LoginOutcome> {
        let token = token.ok_or_else(|| reject("no provider token"))?;
        tracing::debug!("Login {}", LoginState::ProviderCallback);

        let user_info = self
            .provider
            .fetch_user_info(&token.access_token)
            .await
            .map_err(|e| reject(format!("failed to fetch user info: {}", e)))?;

        let email = user_info.email.trim().to_ascii_lowercase();
        let (local_part, domain) = email
            .rsplit_once('@')
            .ok_or_else(|| reject("provider email is malformed"))?;
        if !self.domains.iter().any(|d| d == domain) {
            return Err(reject(format!("domain {} is not allowed", domain)));
        }
        tracing::debug!("Login {} for {}", LoginState::DomainChecked, email);

        let account = self
            .directory
            .find_by_id(local_part)
            .await?
            .ok_or_else(|| reject(format!("no account with id {}", local_part)))?;
        tracing::debug!("Login {} for {}", LoginState::AccountResolved, local_part);

        let grant = OAuthGrant {
            account_id: local_part.to_string(),
            provider: self.provider.name().to_string(),
            provider_user_id: user_info.id,
            token: serde_json::to_string(&token)
                .map_err(|e| IamError::Internal(format!("Failed to encode provider token: {}", e)))?,
            created_at: Utc::now(),
        };
        let session = self
            .sessions
            .new_session(local_part, Some(token.access_token.clone()));

        self.directory
            .record_login(&grant, &session)
            .await
            .map_err(|e| match e {
                IamError::Conflict(_) => reject(format!(
                    "provider identity {} is linked to another account",
                    grant.provider_user_id
                )),
                other => other,
            })?;
        tracing::debug!("Login {} for {}", LoginState::GrantPersisted, local_part);
        tracing::info!("Login {} for {}", LoginState::SessionEstablished, local_part);

        Ok(LoginOutcome {
            account,
            session,
            state: LoginState::SessionEstablished,
        })
    }

    /// Re-check a session against the account's grant
    ///
    /// A session without a grant is inconsistent and rejected. A grant older
    /// than the configured window clears the session.
    pub async fn check_staleness(&self, session: &Session) -> IamResult<()> {
        let grant = self
            .directory
            .find_grant(&session.account_id)
            .await?
            .ok_or_else(|| IamError::Authentication("No provider grant for session".to_string()))?;

        if self.grant_max_age > 0 {
            let age = Utc::now() - grant.created_at;
            if age > Duration::seconds(self.grant_max_age as i64) {
                tracing::info!(
                    "Provider grant for {} is {}s old, ending session",
                    session.account_id,
                    age.num_seconds()
                );
                self.sessions.clear(&session.id).await?;
                return Err(IamError::Authentication(
                    "Provider login expired, please log in again".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Revoke the provider token (best effort) and end the session
    ///
    /// An already invalid provider token is ignored. Other provider failures
    /// are reported after the session has been cleared.
    pub async fn logout(&self, session_id: &str) -> IamResult<()> {
        let session = self.directory.find_session(session_id).await?;

        let revoke_result = match session.as_ref().and_then(|s| s.provider_token.as_deref()) {
            Some(token) => self.provider.revoke(token).await,
            None => Ok(()),
        };

        self.sessions.clear(session_id).await?;

        match revoke_result {
            Ok(()) => Ok(()),
            Err(ProviderError::InvalidToken(reason)) => {
                tracing::debug!("Provider token already invalid at logout: {}", reason);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Provider revoke failed at logout: {}", e);
                Err(e.into())
            }
        }
    }
}
