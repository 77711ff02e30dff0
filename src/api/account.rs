/// /account endpoints: registration, own profile, approval
use crate::{
    account::{AccountInfo, AccountPatch, ApproveRequest, GroupInfo, NewAccount, RegisterRequest},
    api::extract::ValidatedJson,
    approval::ApprovalOutcome,
    auth::{AuthContext, OptionalAuthContext},
    context::AppContext,
    error::{IamError, IamResult},
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

/// Routes open to anonymous callers
pub fn public_routes() -> Router<AppContext> {
    Router::new().route("/account/register", post(register))
}

/// Routes behind the access gate
pub fn protected_routes() -> Router<AppContext> {
    Router::new()
        .route("/account/info", get(get_info).patch(patch_info))
        .route("/account/approve_registers", post(approve_registers))
        .route("/account/groups", get(list_groups))
}

async fn register(
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> IamResult<Json<AccountInfo>> {
    let new = NewAccount::from_request(req)?;
    let account = ctx.directory.register(new).await?;

    Ok(Json(account.into()))
}

async fn get_info(auth: AuthContext) -> IamResult<Json<AccountInfo>> {
    Ok(Json(auth.account().clone().into()))
}

async fn patch_info(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ValidatedJson(patch): ValidatedJson<AccountPatch>,
) -> IamResult<Json<AccountInfo>> {
    let account = ctx
        .directory
        .update_profile(&auth.account().email, &patch)
        .await?;

    Ok(Json(account.into()))
}

/// With login disabled the approver may be unknown; `review_by_id` stays empty then
async fn approve_registers(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    ValidatedJson(req): ValidatedJson<ApproveRequest>,
) -> IamResult<Json<Vec<ApprovalOutcome>>> {
    let approver = auth.principal.as_ref().map(|p| &p.account);
    let outcomes = ctx.approvals.approve(&req.emails, approver).await?;

    Ok(Json(outcomes))
}

async fn list_groups(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> IamResult<Json<Vec<GroupInfo>>> {
    let account_id = auth.account().id.as_deref().ok_or_else(|| {
        IamError::Validation("Account has not been approved".to_string())
    })?;

    let groups = ctx.directory.groups_of(account_id).await?;
    Ok(Json(groups.into_iter().map(GroupInfo::from).collect()))
}
