/// API routes and handlers
pub mod account;
pub mod auth;
pub mod extract;
pub mod group;

use crate::{auth::access_gate, context::AppContext};
use axum::{middleware, Router};

pub const API_PREFIX: &str = "/api/v1";

/// Build API routes
///
/// Everything except registration, login and logout passes the access gate.
pub fn routes(ctx: &AppContext) -> Router<AppContext> {
    let protected = Router::new()
        .merge(account::protected_routes())
        .merge(auth::protected_routes())
        .merge(group::routes())
        .route_layer(middleware::from_fn_with_state(ctx.clone(), access_gate));

    let api = Router::new()
        .merge(account::public_routes())
        .merge(auth::public_routes())
        .merge(protected);

    Router::new()
        .nest(API_PREFIX, api)
        .merge(auth::callback_routes())
}
