/// Registration input and self-service profile patches
use crate::{
    account::{parse_iso_date, validate_email_address, validate_phone_number, RegisterRequest},
    db::models::{Account, ACCOUNT_TYPE_PERSON},
    error::{IamError, IamResult},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use validator::Validate;

/// Normalized registration data ready for insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
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
    pub reimbursement_email: Option<String>,
    pub wechat_id: Option<String>,
    pub line_id: Option<String>,
    pub join_date: NaiveDate,
    pub birthday: Option<NaiveDate>,
    pub memo: Option<String>,
    pub account_type: String,
}

impl NewAccount {
    /// Required fields only; names are normalized, join date is today
    pub fn minimal(email: &str, first_name: &str, last_name: &str, phone_number: &str) -> Self {
        Self {
            email: normalize_email(email),
            first_name: normalize_name(first_name),
            last_name: normalize_name(last_name),
            phone_number: phone_number.to_string(),
            chinese_name: None,
            nickname: None,
            shirt_size: None,
            company: None,
            school: None,
            dietary_restriction: None,
            reimbursement_platform: None,
            reimbursement_method: None,
            reimbursement_phone_number: None,
            reimbursement_email: None,
            wechat_id: None,
            line_id: None,
            join_date: Utc::now().date_naive(),
            birthday: None,
            memo: None,
            account_type: ACCOUNT_TYPE_PERSON.to_string(),
        }
    }

    /// Validate and normalize a registration request
    pub fn from_request(request: RegisterRequest) -> IamResult<Self> {
        request
            .validate()
            .map_err(|e| IamError::Validation(e.to_string()))?;

        let mut account = Self::minimal(
            &request.email,
            &request.first_name,
            &request.last_name,
            &request.phone_number,
        );

        if let Some(join_date) = request.join_date.as_deref() {
            account.join_date = parse_iso_date("join_date", join_date)?;
        }
        account.birthday = request
            .birthday
            .as_deref()
            .map(|b| parse_iso_date("birthday", b))
            .transpose()?;
        account.memo = request.memo.map(|m| Value::Object(m).to_string());
        if let Some(account_type) = request.account_type {
            account.account_type = account_type;
        }

        account.chinese_name = request.chinese_name;
        account.nickname = request.nickname;
        account.shirt_size = request.shirt_size;
        account.company = request.company;
        account.school = request.school;
        account.dietary_restriction = request.dietary_restriction;
        account.reimbursement_platform = request.reimbursement_platform;
        account.reimbursement_method = request.reimbursement_method;
        account.reimbursement_phone_number = request.reimbursement_phone_number;
        account.reimbursement_email = request.reimbursement_email;
        account.wechat_id = request.wechat_id;
        account.line_id = request.line_id;

        Ok(account)
    }
}

/// "jACK" -> "Jack"
/// Emails are stored and looked up trimmed and lowercased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn normalize_name(name: &str) -> String {
    let name = name.trim();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Partial profile update
///
/// Absent fields are left untouched. `id`, `type` and `join_date` are
/// accepted for compatibility with the account shape but never applied.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AccountPatch {
    #[validate(custom(function = "validate_email_address"))]
    pub email: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,
    #[validate(custom(function = "validate_phone_number"))]
    pub phone_number: Option<String>,
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
    pub birthday: Option<String>,
    pub memo: Option<Map<String, Value>>,
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub join_date: Option<String>,
}

/// Merge `patch` onto `account`, returning the updated record
pub fn apply_patch(account: &Account, patch: &AccountPatch) -> IamResult<Account> {
    patch
        .validate()
        .map_err(|e| IamError::Validation(e.to_string()))?;

    let mut merged = account.clone();

    if let Some(birthday) = patch.birthday.as_deref() {
        merged.birthday = Some(parse_iso_date("birthday", birthday)?);
    }
    if let Some(memo) = &patch.memo {
        merged.memo = Some(Value::Object(memo.clone()).to_string());
    }

    set(&mut merged.email, &patch.email.as_deref().map(normalize_email));
    set(&mut merged.first_name, &patch.first_name);
    set(&mut merged.last_name, &patch.last_name);
    set(&mut merged.phone_number, &patch.phone_number);
    set_opt(&mut merged.chinese_name, &patch.chinese_name);
    set_opt(&mut merged.nickname, &patch.nickname);
    set_opt(&mut merged.shirt_size, &patch.shirt_size);
    set_opt(&mut merged.company, &patch.company);
    set_opt(&mut merged.school, &patch.school);
    set_opt(&mut merged.dietary_restriction, &patch.dietary_restriction);
    set_opt(&mut merged.reimbursement_platform, &patch.reimbursement_platform);
    set_opt(&mut merged.reimbursement_method, &patch.reimbursement_method);
    set_opt(&mut merged.reimbursement_phone_number, &patch.reimbursement_phone_number);
    set_opt(&mut merged.reimbursement_email, &patch.reimbursement_email);
    set_opt(&mut merged.wechat_id, &patch.wechat_id);
    set_opt(&mut merged.line_id, &patch.line_id);

    Ok(merged)
}

fn set(field: &mut String, value: &Option<String>) {
    if let Some(v) = value {
        *field = v.clone();
    }
}

fn set_opt(field: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        *field = value.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored_account() -> Account {
        Account {
            email: "jack@example.org".to_string(),
            id: Some("jackw".to_string()),
            first_name: "Jack".to_string(),
            last_name: "Wong".to_string(),
            chinese_name: None,
            nickname: Some("JJ".to_string()),
            phone_number: "0912345678".to_string(),
            shirt_size: None,
            company: None,
            school: None,
            dietary_restriction: None,
            reimbursement_platform: None,
            reimbursement_method: None,
            reimbursement_phone_number: None,
            reimbursement_email: None,
            wechat_id: None,
            line_id: None,
            register_date: Utc::now(),
            join_date: NaiveDate::from_ymd_opt(2021, 1, 1),
            birthday: None,
            memo: None,
            account_type: "person".to_string(),
            review_by_id: None,
            review_status: Some("APPROVED".to_string()),
            has_iam_google_account: true,
        }
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("jACK"), "Jack");
        assert_eq!(normalize_name(" wong "), "Wong");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn test_emails_are_lowercased() {
        let account = NewAccount::minimal(" Jack.Wong@Gmail.com ", "Jack", "Wong", "1");
        assert_eq!(account.email, "jack.wong@gmail.com");

        let patch = AccountPatch {
            email: Some("Jack.Wong@Example.ORG".to_string()),
            ..Default::default()
        };
        let merged = apply_patch(&stored_account(), &patch).unwrap();
        assert_eq!(merged.email, "jack.wong@example.org");
    }

    #[test]
    fn test_empty_patch_is_identity() {
        let account = stored_account();
        let merged = apply_patch(&account, &AccountPatch::default()).unwrap();
        assert_eq!(merged, account);
    }

    #[test]
    fn test_patch_ignores_protected_fields() {
        let account = stored_account();
        let patch = AccountPatch {
            id: Some("root".to_string()),
            account_type: Some("bot".to_string()),
            join_date: Some("1999-01-01".to_string()),
            nickname: Some("Jacky".to_string()),
            ..Default::default()
        };

        let merged = apply_patch(&account, &patch).unwrap();

        assert_eq!(merged.id.as_deref(), Some("jackw"));
        assert_eq!(merged.account_type, "person");
        assert_eq!(merged.join_date, account.join_date);
        assert_eq!(merged.nickname.as_deref(), Some("Jacky"));
    }

    #[test]
    fn test_patch_bad_birthday() {
        let patch = AccountPatch {
            birthday: Some("31/12/1990".to_string()),
            ..Default::default()
        };
        let err = apply_patch(&stored_account(), &patch).unwrap_err();
        assert!(matches!(err, IamError::Validation(ref m) if m.contains("wrong birthday format")));
    }

    #[test]
    fn test_patch_sets_memo() {
        let patch: AccountPatch =
            serde_json::from_value(serde_json::json!({"memo": {"team": "infra"}})).unwrap();
        let merged = apply_patch(&stored_account(), &patch).unwrap();
        assert_eq!(merged.memo.as_deref(), Some(r#"{"team":"infra"}"#));
    }

    #[test]
    fn test_from_request_normalizes() {
        let request: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "jack@example.org",
            "first_name": "jACK",
            "last_name": "wONG",
            "phone_number": "+10001112222;3,44",
            "birthday": "1990-05-06",
        }))
        .unwrap();

        let account = NewAccount::from_request(request).unwrap();

        assert_eq!(account.first_name, "Jack");
        assert_eq!(account.last_name, "Wong");
        assert_eq!(account.join_date, Utc::now().date_naive());
        assert_eq!(account.birthday, NaiveDate::from_ymd_opt(1990, 5, 6));
        assert_eq!(account.account_type, "person");
    }

    #[test]
    fn test_from_request_rejects_bad_join_date() {
        let request: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "jack@example.org",
            "first_name": "Jack",
            "last_name": "Wong",
            "phone_number": "123",
            "join_date": "yesterday",
        }))
        .unwrap();

        assert!(matches!(
            NewAccount::from_request(request),
            Err(IamError::Validation(_))
        ));
    }
}
