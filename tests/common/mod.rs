//! Shared fixtures for router-level tests

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use orgiam::{
    account::NewAccount,
    config::{
        AuthConfig, GoogleConfig, LoggingConfig, ServerConfig, ServiceConfig, StorageConfig,
    },
    context::AppContext,
    db::{create_memory_pool, models::Account},
    providers::{
        DirectoryProvisioner, IdentityProvider, ProviderError, ProviderToken, ProviderUserInfo,
        Providers,
    },
    server::build_router,
};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

/// Identity provider double: an authorization code doubles as the access token
#[derive(Default)]
pub struct FakeIdentity {
    pub users: HashMap<String, ProviderUserInfo>,
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    fn name(&self) -> &str {
        "google"
    }

    fn authorization_url(&self, state: &str) -> Result<String, ProviderError> {
        Ok(format!("https://accounts.test/o/oauth2/auth?state={}", state))
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderToken, ProviderError> {
        Ok(ProviderToken {
            access_token: code.to_string(),
            token_type: Some("Bearer".to_string()),
            expires_in: Some(3599),
            refresh_token: None,
            scope: None,
            id_token: None,
        })
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<ProviderUserInfo, ProviderError> {
        self.users
            .get(access_token)
            .cloned()
            .ok_or_else(|| ProviderError::InvalidToken("unknown access token".to_string()))
    }

    async fn revoke(&self, _access_token: &str) -> Result<(), ProviderError> {
        Err(ProviderError::InvalidToken("already expired".to_string()))
    }
}

#[derive(Default)]
pub struct FakeProvisioner {
    pub created: Mutex<Vec<String>>,
}

#[async_trait]
impl DirectoryProvisioner for FakeProvisioner {
    async fn create_account(&self, account: &Account) -> Result<(), ProviderError> {
        self.created
            .lock()
            .unwrap()
            .push(account.id.clone().unwrap_or_default());
        Ok(())
    }
}

pub fn test_config(login_disabled: bool, grant_max_age: u64) -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "localhost".to_string(),
            port: 5000,
            version: "test".to_string(),
        },
        storage: StorageConfig {
            data_directory: PathBuf::from("./data"),
            database: PathBuf::from(":memory:"),
        },
        authentication: AuthConfig {
            jwt_secret: "test-secret-key-for-testing-only-32".to_string(),
            login_disabled,
            domains: vec!["example.org".to_string(), "example.com".to_string()],
            primary_domain: "example.org".to_string(),
            oauth_token_expire_time: grant_max_age,
            session_lifetime_days: 31,
            cookie_secure: false,
        },
        google: GoogleConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:5000/login/google/authorized".to_string(),
            admin_directory_key: None,
            admin_subject: None,
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            json: false,
        },
    }
}

pub struct TestApp {
    pub ctx: AppContext,
    pub router: Router,
    pub provisioner: Arc<FakeProvisioner>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub async fn new(login_disabled: bool, grant_max_age: u64) -> Self {
        let mut identity = FakeIdentity::default();
        identity.users.insert(
            "code-jack".to_string(),
            ProviderUserInfo {
                id: "google-jack".to_string(),
                email: "jackw@example.org".to_string(),
            },
        );
        let provisioner = Arc::new(FakeProvisioner::default());

        let pool = create_memory_pool().await.unwrap();
        let providers = Providers {
            identity: Arc::new(identity),
            provisioner: provisioner.clone(),
        };
        let ctx = AppContext::with_parts(test_config(login_disabled, grant_max_age), pool, providers);
        let router = build_router(ctx.clone());

        Self {
            ctx,
            router,
            provisioner,
        }
    }

    /// Register and approve an account, returning the approved row
    pub async fn approved_account(&self, email: &str, first: &str, last: &str) -> Account {
        self.ctx
            .directory
            .register(NewAccount::minimal(email, first, last, "+10001112222"))
            .await
            .unwrap();
        self.ctx
            .directory
            .approve_registration(email, None)
            .await
            .unwrap()
    }

    pub async fn token_for(&self, account: &Account) -> String {
        self.ctx.tokens.issue(account).await.unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

pub fn request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder().method(method).uri(uri)
}

pub fn json_body(value: Value) -> Body {
    Body::from(value.to_string())
}
