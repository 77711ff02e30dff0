/// /group endpoints
use crate::{
    account::{AccountInfo, GroupInfo, NewGroup},
    api::extract::ValidatedJson,
    context::AppContext,
    error::IamResult,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AddMemberRequest {
    #[validate(length(min = 1))]
    pub account_id: String,
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/group", post(create_group))
        .route("/group/:id/members", get(list_members).post(add_member))
        .route("/group/:id/members/:account_id", delete(remove_member))
}

async fn create_group(
    State(ctx): State<AppContext>,
    ValidatedJson(req): ValidatedJson<NewGroup>,
) -> IamResult<(StatusCode, Json<GroupInfo>)> {
    let group = ctx.directory.create_group(req).await?;
    Ok((StatusCode::CREATED, Json(group.into())))
}

async fn list_members(
    State(ctx): State<AppContext>,
    Path(group_id): Path<i64>,
) -> IamResult<Json<Vec<AccountInfo>>> {
    ctx.directory.get_group(group_id).await?;
    let members = ctx.directory.group_members(group_id).await?;

    Ok(Json(members.into_iter().map(AccountInfo::from).collect()))
}

async fn add_member(
    State(ctx): State<AppContext>,
    Path(group_id): Path<i64>,
    ValidatedJson(req): ValidatedJson<AddMemberRequest>,
) -> IamResult<(StatusCode, Json<Value>)> {
    ctx.directory.add_member(group_id, &req.account_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({"group_id": group_id, "account_id": req.account_id})),
    ))
}

async fn remove_member(
    State(ctx): State<AppContext>,
    Path((group_id, account_id)): Path<(i64, String)>,
) -> IamResult<StatusCode> {
    ctx.directory.remove_member(group_id, &account_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
