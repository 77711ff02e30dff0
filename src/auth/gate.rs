/// Access gate guarding every protected route
use crate::{
    account::AccountDirectory,
    auth::{extract_token, AuthMethod, OAuthBroker, Principal, SessionStore, TokenAuthority},
    context::AppContext,
    error::{IamError, IamResult},
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

pub struct AccessGate {
    tokens: Arc<TokenAuthority>,
    sessions: SessionStore,
    broker: Arc<OAuthBroker>,
    directory: AccountDirectory,
    login_disabled: bool,
}

impl AccessGate {
    pub fn new(
        tokens: Arc<TokenAuthority>,
        sessions: SessionStore,
        broker: Arc<OAuthBroker>,
        directory: AccountDirectory,
        login_disabled: bool,
    ) -> Self {
        if login_disabled {
            tracing::warn!("Login is disabled: protected routes accept unauthenticated requests");
        }

        Self {
            tokens,
            sessions,
            broker,
            directory,
            login_disabled,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Decide whether a request may reach a protected route
    ///
    /// A presented token takes precedence over the session cookie: an unknown
    /// or revoked token is rejected even when a valid session exists. With
    /// login disabled every request is allowed, and the principal is still
    /// attached when one can be identified.
    pub async fn check(&self, headers: &HeaderMap) -> IamResult<Option<Principal>> {
        if self.login_disabled {
            return match self.identify(headers).await {
                Ok(principal) => Ok(principal),
                Err(e) => {
                    tracing::debug!("Login disabled, ignoring credential error: {}", e);
                    Ok(None)
                }
            };
        }

        self.identify(headers)
            .await?
            .map(Some)
            .ok_or_else(|| IamError::Authentication("Login required".to_string()))
    }

    async fn identify(&self, headers: &HeaderMap) -> IamResult<Option<Principal>> {
        if let Some(token) = extract_token(headers)? {
            let account = self
                .tokens
                .resolve(&token)
                .await?
                .ok_or_else(|| IamError::Authentication("Invalid or revoked token".to_string()))?;

            return Ok(Some(Principal {
                account,
                method: AuthMethod::Token,
            }));
        }

        let Some(session_id) = SessionStore::session_id_from_headers(headers) else {
            return Ok(None);
        };

        let session = self
            .sessions
            .load(&session_id)
            .await?
            .ok_or_else(|| IamError::Authentication("Session expired".to_string()))?;

        let Some(account) = self.directory.find_by_id(&session.account_id).await? else {
            self.sessions.clear(&session.id).await?;
            return Err(IamError::Authentication("Session account no longer exists".to_string()));
        };

        self.broker.check_staleness(&session).await?;

        Ok(Some(Principal {
            account,
            method: AuthMethod::Session {
                session_id: session.id,
            },
        }))
    }
}

/// Middleware attaching the request's [`Principal`], or rejecting it
///
/// A rejected request that carried a session cookie also gets the cookie cleared.
pub async fn access_gate(State(ctx): State<AppContext>, mut req: Request, next: Next) -> Response {
    match ctx.gate.check(req.headers()).await {
        Ok(principal) => {
            if let Some(principal) = principal {
                req.extensions_mut().insert(principal);
            }
            next.run(req).await
        }
        Err(e) => {
            let had_cookie = SessionStore::session_id_from_headers(req.headers()).is_some();
            let mut response = e.into_response();
            if had_cookie {
                if let Ok(value) = HeaderValue::from_str(&ctx.gate.sessions().removal_cookie_header()) {
                    response.headers_mut().append(header::SET_COOKIE, value);
                }
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::NewAccount;
    use crate::auth::oauth::tests::{token, FakeProvider};
    use crate::auth::SESSION_COOKIE;
    use crate::db::create_memory_pool;
    use crate::providers::ProviderUserInfo;
    use chrono::{Duration, Utc};

    struct Fixture {
        directory: AccountDirectory,
        tokens: Arc<TokenAuthority>,
        broker: Arc<OAuthBroker>,
        sessions: SessionStore,
    }

    impl Fixture {
        async fn new(grant_max_age: u64) -> Self {
            let directory = AccountDirectory::new(create_memory_pool().await.unwrap());
            directory
                .register(NewAccount::minimal("jack@gmail.com", "Jack", "Wong", "1"))
                .await
                .unwrap();
            directory
                .approve_registration("jack@gmail.com", None)
                .await
                .unwrap();

            let mut provider = FakeProvider::default();
            provider.users.insert(
                "good".to_string(),
                ProviderUserInfo {
                    id: "g-1".to_string(),
                    email: "jackw@example.org".to_string(),
                },
            );

            let sessions = SessionStore::new(directory.clone(), 31, false);
            let broker = Arc::new(OAuthBroker::new(
                directory.clone(),
                sessions.clone(),
                Arc::new(provider),
                vec!["example.org".to_string()],
                grant_max_age,
            ));
            let tokens = Arc::new(TokenAuthority::new(
                directory.clone(),
                "test-secret-key-for-testing-only".to_string(),
            ));

            Self {
                directory,
                tokens,
                broker,
                sessions,
            }
        }

        fn gate(&self, login_disabled: bool) -> AccessGate {
            AccessGate::new(
                self.tokens.clone(),
                self.sessions.clone(),
                self.broker.clone(),
                self.directory.clone(),
                login_disabled,
            )
        }

        async fn session_cookie(&self) -> String {
            let outcome = self.broker.establish(Some(token("good"))).await.unwrap();
            outcome.session.id
        }
    }

    fn headers(pairs: &[(&str, String)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    #[tokio::test]
    async fn test_no_credentials_rejected() {
        let fixture = Fixture::new(0).await;
        let err = fixture.gate(false).check(&HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, IamError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_login_disabled_allows_anonymous() {
        let fixture = Fixture::new(0).await;
        let gate = fixture.gate(true);

        assert!(gate.check(&HeaderMap::new()).await.unwrap().is_none());

        let bad = headers(&[("token", "garbage".to_string())]);
        assert!(gate.check(&bad).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_disabled_still_identifies() {
        let fixture = Fixture::new(0).await;
        let jack = fixture.directory.find_by_id("jackw").await.unwrap().unwrap();
        let raw = fixture.tokens.issue(&jack).await.unwrap();

        let principal = fixture
            .gate(true)
            .check(&headers(&[("token", raw)]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(principal.account_id(), "jackw");
    }

    #[tokio::test]
    async fn test_token_header_and_bearer() {
        let fixture = Fixture::new(0).await;
        let jack = fixture.directory.find_by_id("jackw").await.unwrap().unwrap();
        let raw = fixture.tokens.issue(&jack).await.unwrap();
        let gate = fixture.gate(false);

        let principal = gate
            .check(&headers(&[("token", raw.clone())]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(principal.method, AuthMethod::Token);

        let principal = gate
            .check(&headers(&[("authorization", format!("Bearer {}", raw))]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(principal.account_id(), "jackw");
    }

    #[tokio::test]
    async fn test_bad_token_beats_valid_session() {
        let fixture = Fixture::new(0).await;
        let session_id = fixture.session_cookie().await;
        let gate = fixture.gate(false);

        let cookie = format!("{}={}", SESSION_COOKIE, session_id);
        let principal = gate
            .check(&headers(&[("cookie", cookie.clone())]))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(principal.method, AuthMethod::Session { .. }));

        let err = gate
            .check(&headers(&[("cookie", cookie), ("token", "revoked".to_string())]))
            .await
            .unwrap_err();
        assert!(matches!(err, IamError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_unreadable_token_header_beats_valid_session() {
        let fixture = Fixture::new(0).await;
        let session_id = fixture.session_cookie().await;
        let gate = fixture.gate(false);
        let cookie = HeaderValue::from_str(&format!("{}={}", SESSION_COOKIE, session_id)).unwrap();

        for token in [HeaderValue::from_bytes(b"\xffbad").unwrap(), HeaderValue::from_static("   ")] {
            let mut headers = HeaderMap::new();
            headers.insert(header::COOKIE, cookie.clone());
            headers.insert("token", token);

            let err = gate.check(&headers).await.unwrap_err();
            assert!(matches!(err, IamError::Authentication(_)));
        }
    }

    #[tokio::test]
    async fn test_stale_grant_rejects_session() {
        let fixture = Fixture::new(60).await;
        let session_id = fixture.session_cookie().await;
        let gate = fixture.gate(false);
        let cookie = headers(&[("cookie", format!("{}={}", SESSION_COOKIE, session_id))]);

        assert!(gate.check(&cookie).await.is_ok());

        sqlx::query("UPDATE oauth_grant SET created_at = ?1")
            .bind(Utc::now() - Duration::seconds(61))
            .execute(fixture.directory.pool())
            .await
            .unwrap();

        assert!(gate.check(&cookie).await.is_err());
        assert!(fixture.sessions.load(&session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_session_rejected() {
        let fixture = Fixture::new(0).await;
        let cookie = headers(&[("cookie", format!("{}=nope", SESSION_COOKIE))]);
        assert!(fixture.gate(false).check(&cookie).await.is_err());
    }
}
