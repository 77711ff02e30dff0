/// Login, logout and bearer-token endpoints
use crate::{
    api::extract::ValidatedJson,
    auth::{AuthContext, CallbackParams, SessionStore},
    context::AppContext,
    error::{IamError, IamResult},
};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

/// Provider redirect target; must match the registered redirect URI
pub const CALLBACK_PATH: &str = "/login/google/authorized";

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenListResponse {
    pub tokens: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct TokenRequest {
    #[validate(length(min = 1))]
    pub token: String,
}

/// Routes open to anonymous callers, mounted under the API prefix
pub fn public_routes() -> Router<AppContext> {
    Router::new()
        .route("/auth/login", get(login).post(login))
        .route("/auth/logout", axum::routing::post(logout))
}

/// Token management, behind the access gate
pub fn protected_routes() -> Router<AppContext> {
    Router::new().route(
        "/auth/token",
        get(list_tokens).post(create_token).delete(delete_token),
    )
}

/// Provider callback, mounted at the root
pub fn callback_routes() -> Router<AppContext> {
    Router::new().route(CALLBACK_PATH, get(authorized))
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

async fn login(State(ctx): State<AppContext>) -> IamResult<Response> {
    let url = ctx.broker.begin_login().await?;
    Ok(found(&url))
}

async fn authorized(
    State(ctx): State<AppContext>,
    Query(params): Query<CallbackParams>,
) -> IamResult<Response> {
    let outcome = ctx.broker.complete_login(params).await?;

    let mut response = found("/");
    let cookie = ctx.sessions.cookie_header(&outcome.session);
    response.headers_mut().append(
        header::SET_COOKIE,
        cookie
            .parse()
            .map_err(|_| IamError::Internal("Invalid session cookie".to_string()))?,
    );

    Ok(response)
}

async fn logout(State(ctx): State<AppContext>, headers: HeaderMap) -> IamResult<Response> {
    if let Some(session_id) = SessionStore::session_id_from_headers(&headers) {
        ctx.broker.logout(&session_id).await?;
    }

    let mut response = Json(json!({"message": "logged out"})).into_response();
    response.headers_mut().append(
        header::SET_COOKIE,
        ctx.sessions
            .removal_cookie_header()
            .parse()
            .map_err(|_| IamError::Internal("Invalid session cookie".to_string()))?,
    );

    Ok(response)
}

async fn list_tokens(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> IamResult<Json<TokenListResponse>> {
    let tokens = ctx.tokens.list_active(auth.account()).await?;
    Ok(Json(TokenListResponse { tokens }))
}

async fn create_token(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> IamResult<(StatusCode, Json<TokenRequest>)> {
    let token = ctx.tokens.issue(auth.account()).await?;
    Ok((StatusCode::CREATED, Json(TokenRequest { token })))
}

async fn delete_token(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedJson(req): ValidatedJson<TokenRequest>,
) -> IamResult<Json<TokenRequest>> {
    ctx.tokens
        .revoke(auth.account(), &req.token)
        .await
        .map_err(|e| match e {
            IamError::NotFound(_) => {
                IamError::Validation("Token is not an active token of this account".to_string())
            }
            other => other,
        })?;

    Ok(Json(req))
}
