/// Row types for the IAM database
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const REVIEW_APPROVED: &str = "APPROVED";

pub const ACCOUNT_TYPE_PERSON: &str = "person";
pub const ACCOUNT_TYPE_BOT: &str = "bot";

/// Account record
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    pub id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub chinese_name: Option<String>,
    pub nickname: Option<String>,
    pub phone_number: String,
    pub shirt_size: Option<String>,
    pub company: Option<String>,
    pub school: Option<String>,
    pub dietary_restriction: Option<String>,
    pub reimbursement_platform: Option<String>,
    pub reimbursement_method: Option<String>,
    pub reimbursement_phone_number: Option<String>,
    pub reimbursement_email: Option<String>,
    pub wechat_id: Option<String>,
    pub line_id: Option<String>,
    pub register_date: DateTime<Utc>,
    pub join_date: Option<NaiveDate>,
    pub birthday: Option<NaiveDate>,
    /// Free-form JSON object, stored as text
    pub memo: Option<String>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub account_type: String,
    pub review_by_id: Option<String>,
    pub review_status: Option<String>,
    pub has_iam_google_account: bool,
}

impl Account {
    pub fn is_approved(&self) -> bool {
        self.review_status.as_deref() == Some(REVIEW_APPROVED)
    }
}

/// Group record
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub year: Option<i64>,
    pub season: Option<String>,
    pub chinese_name: Option<String>,
    pub english_name: Option<String>,
    pub email: Option<String>,
    pub memo: Option<String>,
}

/// Long-lived bearer token bound to an account
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AccountToken {
    pub token: String,
    pub account_id: String,
    pub created_at: DateTime<Utc>,
    /// Null while the token is active
    pub expire_time: Option<DateTime<Utc>>,
}

/// Latest identity-provider grant for an account
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OAuthGrant {
    pub account_id: String,
    pub provider: String,
    pub provider_user_id: String,
    /// Provider token response, JSON encoded
    pub token: String,
    pub created_at: DateTime<Utc>,
}

/// Browser login session
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub account_id: String,
    pub provider_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
