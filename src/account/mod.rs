/// Account directory
///
/// Registration, profile updates, ID assignment, group membership, and the
/// storage side of bearer tokens, provider grants and login sessions.

mod directory;
mod groups;
pub mod id_gen;
pub mod profile;

pub use directory::AccountDirectory;
pub use groups::NewGroup;
pub use profile::{AccountPatch, NewAccount};

use crate::db::models::{Account, Group};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::{Validate, ValidationError};

/// Registration request body
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    #[validate(custom(function = "validate_email_address"))]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(custom(function = "validate_phone_number"))]
    pub phone_number: String,
    pub chinese_name: Option<String>,
    pub nickname: Option<String>,
    pub shirt_size: Option<String>,
    pub company: Option<String>,
    pub school: Option<String>,
    pub dietary_restriction: Option<String>,
    pub reimbursement_platform: Option<String>,
    pub reimbursement_method: Option<String>,
    pub reimbursement_phone_number: Option<String>,
    #[validate(custom(function = "validate_email_address"))]
    pub reimbursement_email: Option<String>,
    pub wechat_id: Option<String>,
    pub line_id: Option<String>,
    pub join_date: Option<String>,
    pub birthday: Option<String>,
    pub memo: Option<Map<String, Value>>,
    #[serde(rename = "type")]
    #[validate(custom(function = "validate_account_type"))]
    pub account_type: Option<String>,
}

/// Account as returned to its owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
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
    pub join_date: Option<NaiveDate>,
    pub birthday: Option<NaiveDate>,
    pub memo: Option<Value>,
    #[serde(rename = "type")]
    pub account_type: String,
}

impl From<Account> for AccountInfo {
    fn from(account: Account) -> Self {
        let memo = account
            .memo
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());

        Self {
            email: account.email,
            id: account.id,
            first_name: account.first_name,
            last_name: account.last_name,
            chinese_name: account.chinese_name,
            nickname: account.nickname,
            phone_number: account.phone_number,
            shirt_size: account.shirt_size,
            company: account.company,
            school: account.school,
            dietary_restriction: account.dietary_restriction,
            reimbursement_platform: account.reimbursement_platform,
            reimbursement_method: account.reimbursement_method,
            reimbursement_phone_number: account.reimbursement_phone_number,
            reimbursement_email: account.reimbursement_email,
            wechat_id: account.wechat_id,
            line_id: account.line_id,
            join_date: account.join_date,
            birthday: account.birthday,
            memo,
            account_type: account.account_type,
        }
    }
}

/// Approval request body
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ApproveRequest {
    #[validate(length(min = 1))]
    pub emails: Vec<String>,
}

/// Group as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupInfo {
    pub id: i64,
    pub year: Option<i64>,
    pub season: Option<String>,
    pub chinese_name: Option<String>,
    pub english_name: Option<String>,
    pub email: Option<String>,
    pub memo: Option<Value>,
}

impl From<Group> for GroupInfo {
    fn from(group: Group) -> Self {
        let memo = group
            .memo
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());

        Self {
            id: group.id,
            year: group.year,
            season: group.season,
            chinese_name: group.chinese_name,
            english_name: group.english_name,
            email: group.email,
            memo,
        }
    }
}

/// `something@host.tld`, no whitespace in any part
pub fn validate_email_address(value: &str) -> Result<(), ValidationError> {
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !value.chars().any(char::is_whitespace)
                && domain
                    .rsplit_once('.')
                    .map(|(host, tld)| !host.is_empty() && !tld.is_empty())
                    .unwrap_or(false)
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("email"))
    }
}

/// Digits plus `+`, `;` (extension) and `,` (pause)
pub fn validate_phone_number(value: &str) -> Result<(), ValidationError> {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | ';' | ','))
    {
        Ok(())
    } else {
        Err(ValidationError::new("phone_number"))
    }
}

fn validate_account_type(value: &str) -> Result<(), ValidationError> {
    match value {
        crate::db::models::ACCOUNT_TYPE_PERSON | crate::db::models::ACCOUNT_TYPE_BOT => Ok(()),
        _ => Err(ValidationError::new("account_type")),
    }
}

/// Parse an ISO-8601 calendar date (`YYYY-MM-DD`)
pub fn parse_iso_date(field: &str, value: &str) -> crate::error::IamResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| crate::error::IamError::Validation(format!("wrong {} format", field)))
}
