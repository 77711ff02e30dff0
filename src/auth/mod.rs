/// Authentication: bearer tokens, login sessions, the OAuth broker and the access gate
pub mod gate;
pub mod oauth;
pub mod session;
pub mod tokens;

pub use gate::{access_gate, AccessGate};
pub use oauth::{CallbackParams, LoginState, OAuthBroker, OAuthStateStore};
pub use session::{SessionStore, SESSION_COOKIE};
pub use tokens::TokenAuthority;

use crate::{
    context::AppContext,
    db::models::Account,
    error::{IamError, IamResult},
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};

/// Header carrying a raw bearer token
pub const TOKEN_HEADER: &str = "token";

/// How the current request was authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Token,
    Session { session_id: String },
}

/// Account attached to a request by the access gate
#[derive(Debug, Clone)]
pub struct Principal {
    pub account: Account,
    pub method: AuthMethod,
}

impl Principal {
    /// Approved accounts always carry an id; sessions and tokens are keyed by it
    pub fn account_id(&self) -> &str {
        self.account.id.as_deref().unwrap_or_default()
    }
}

/// Raw token from the `token` header, or from `Authorization: Bearer`
///
/// `Ok(None)` only when neither header carries a token. A `token` header (or
/// a `Bearer` authorization) that is present but unreadable or blank is an
/// error, so it can never fall through to session authentication.
pub fn extract_token(headers: &HeaderMap) -> IamResult<Option<String>> {
    if let Some(value) = headers.get(TOKEN_HEADER) {
        let token = value
            .to_str()
            .map(str::trim)
            .map_err(|_| IamError::Authentication("Malformed token header".to_string()))?;
        if token.is_empty() {
            return Err(IamError::Authentication("Empty token header".to_string()));
        }
        return Ok(Some(token.to_string()));
    }

    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| IamError::Authentication("Malformed authorization header".to_string()))?;
    let bearer = if value.trim() == "Bearer" {
        Some("")
    } else {
        value.strip_prefix("Bearer ")
    };
    match bearer {
        Some(rest) => {
            let token = rest.trim();
            if token.is_empty() {
                return Err(IamError::Authentication("Empty bearer token".to_string()));
            }
            Ok(Some(token.to_string()))
        }
        None => Ok(None),
    }
}

/// Authenticated context - the principal the access gate attached
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal: Principal,
}

impl AuthContext {
    pub fn account(&self) -> &Account {
        &self.principal.account
    }

    pub fn account_id(&self) -> &str {
        self.principal.account_id()
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = IamError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let principal = parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| IamError::Authentication("Login required".to_string()))?;

        Ok(AuthContext { principal })
    }
}

/// Optional authenticated context - does not fail if no principal is attached
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub principal: Option<Principal>,
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = IamError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuthContext {
            principal: parts.extensions.get::<Principal>().cloned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_token_prefers_token_header() {
        let mut headers = HeaderMap::new();
        assert!(extract_token(&headers).unwrap().is_none());

        headers.insert("authorization", HeaderValue::from_static("Bearer from-bearer"));
        assert_eq!(extract_token(&headers).unwrap().as_deref(), Some("from-bearer"));

        headers.insert(TOKEN_HEADER, HeaderValue::from_static("from-header"));
        assert_eq!(extract_token(&headers).unwrap().as_deref(), Some("from-header"));
    }

    #[test]
    fn test_extract_token_rejects_unusable_values() {
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, HeaderValue::from_static("   "));
        assert!(matches!(extract_token(&headers), Err(IamError::Authentication(_))));

        headers.insert(TOKEN_HEADER, HeaderValue::from_bytes(b"\xffbad").unwrap());
        assert!(matches!(extract_token(&headers), Err(IamError::Authentication(_))));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert!(extract_token(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_token(&headers).unwrap().is_none());
    }

    #[test]
    fn test_extract_bearer_forms() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_token(&headers).unwrap().as_deref(), Some("abc.def"));

        headers.insert("authorization", HeaderValue::from_static("Bearerabc"));
        assert!(extract_token(&headers).unwrap().is_none());
    }
}
