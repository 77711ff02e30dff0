/// Server-side login sessions carried by the `iam_session` cookie
use crate::{account::AccountDirectory, db::models::Session, error::IamResult};
use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};

pub const SESSION_COOKIE: &str = "iam_session";

const SESSION_ID_LENGTH: usize = 43;

#[derive(Clone)]
pub struct SessionStore {
    directory: AccountDirectory,
    lifetime: Duration,
    secure_cookie: bool,
}

impl SessionStore {
    pub fn new(directory: AccountDirectory, lifetime_days: i64, secure_cookie: bool) -> Self {
        Self {
            directory,
            lifetime: Duration::days(lifetime_days),
            secure_cookie,
        }
    }

    /// Unsaved session for `account_id`; persisted by the login flow together with its grant
    pub fn new_session(&self, account_id: &str, provider_token: Option<String>) -> Session {
        let now = Utc::now();
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_ID_LENGTH)
            .map(char::from)
            .collect();

        Session {
            id,
            account_id: account_id.to_string(),
            provider_token,
            created_at: now,
            expires_at: now + self.lifetime,
        }
    }

    /// Live session by id; expired rows are removed and reported as absent
    pub async fn load(&self, session_id: &str) -> IamResult<Option<Session>> {
        let Some(session) = self.directory.find_session(session_id).await? else {
            return Ok(None);
        };

        if session.expires_at <= Utc::now() {
            tracing::debug!("Session for {} expired", session.account_id);
            self.directory.delete_session(session_id).await?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    pub async fn clear(&self, session_id: &str) -> IamResult<()> {
        self.directory.delete_session(session_id).await
    }

    pub fn session_id_from_headers(headers: &HeaderMap) -> Option<String> {
        CookieJar::from_headers(headers)
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    }

    /// `Set-Cookie` value establishing `session`
    pub fn cookie_header(&self, session: &Session) -> String {
        let cookie = Cookie::build((SESSION_COOKIE, session.id.clone()))
            .path("/")
            .http_only(true)
            .secure(self.secure_cookie)
            .same_site(SameSite::Lax)
            .build();

        format!("{}; Max-Age={}", cookie, self.lifetime.num_seconds())
    }

    /// `Set-Cookie` value clearing the session cookie
    pub fn removal_cookie_header(&self) -> String {
        let cookie = Cookie::build((SESSION_COOKIE, ""))
            .path("/")
            .http_only(true)
            .secure(self.secure_cookie)
            .same_site(SameSite::Lax)
            .build();

        format!("{}; Max-Age=0", cookie)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::NewAccount;
    use crate::db::{create_memory_pool, models::OAuthGrant};
    use axum::http::HeaderValue;

    async fn setup() -> (AccountDirectory, SessionStore) {
        let directory = AccountDirectory::new(create_memory_pool().await.unwrap());
        directory
            .register(NewAccount::minimal("jack@example.org", "Jack", "Wong", "1"))
            .await
            .unwrap();
        directory
            .approve_registration("jack@example.org", None)
            .await
            .unwrap();
        let store = SessionStore::new(directory.clone(), 31, true);
        (directory, store)
    }

    fn grant() -> OAuthGrant {
        OAuthGrant {
            account_id: "jackw".to_string(),
            provider: "google".to_string(),
            provider_user_id: "g-1".to_string(),
            token: "{}".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_session_ids_are_random() {
        let (_, store) = setup().await;
        let a = store.new_session("jackw", None);
        let b = store.new_session("jackw", None);

        assert_eq!(a.id.len(), SESSION_ID_LENGTH);
        assert_ne!(a.id, b.id);
        assert_eq!((a.expires_at - a.created_at).num_days(), 31);
    }

    #[tokio::test]
    async fn test_load_and_clear() {
        let (directory, store) = setup().await;
        let session = store.new_session("jackw", Some("ya29".to_string()));
        directory.record_login(&grant(), &session).await.unwrap();

        let loaded = store.load(&session.id).await.unwrap().unwrap();
        assert_eq!(loaded.provider_token.as_deref(), Some("ya29"));

        store.clear(&session.id).await.unwrap();
        assert!(store.load(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_dropped() {
        let (directory, store) = setup().await;
        let mut session = store.new_session("jackw", None);
        session.expires_at = Utc::now() - Duration::seconds(1);
        directory.record_login(&grant(), &session).await.unwrap();

        assert!(store.load(&session.id).await.unwrap().is_none());
        assert!(directory.find_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cookie_round_trip() {
        let (_, store) = setup().await;
        let session = store.new_session("jackw", None);

        let header = store.cookie_header(&session);
        assert!(header.starts_with(&format!("{}={}", SESSION_COOKIE, session.id)));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("Secure"));
        assert!(header.contains(&format!("Max-Age={}", 31 * 24 * 3600)));

        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_str(&format!("other=1; {}={}", SESSION_COOKIE, session.id)).unwrap(),
        );
        assert_eq!(
            SessionStore::session_id_from_headers(&headers).as_deref(),
            Some(session.id.as_str())
        );

        assert!(store.removal_cookie_header().contains("Max-Age=0"));
    }
}
