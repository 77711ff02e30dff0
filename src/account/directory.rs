/// Account directory implementation using runtime queries
///
/// The directory is the only writer of accounts, groups, memberships,
/// bearer tokens, provider grants and sessions. Every multi-statement
/// mutation runs in a single transaction.
use crate::{
    account::{
        id_gen,
        profile::{apply_patch, AccountPatch, NewAccount},
    },
    db::{
        map_write_error,
        models::{Account, AccountToken, OAuthGrant, Session, REVIEW_APPROVED},
    },
    error::{IamError, IamResult},
};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};

/// Account directory service
#[derive(Clone)]
pub struct AccountDirectory {
    db: SqlitePool,
}

impl AccountDirectory {
    /// Create a new account directory
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    // ==================== Accounts ====================

    /// Register a pending account (no id, unreviewed)
    pub async fn register(&self, new: NewAccount) -> IamResult<Account> {
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO account (email, first_name, last_name, phone_number, chinese_name, nickname,
                shirt_size, company, school, dietary_restriction, reimbursement_platform,
                reimbursement_method, reimbursement_phone_number, reimbursement_email, wechat_id,
                line_id, register_date, join_date, birthday, memo, type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
        )
        .bind(&new.email)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.phone_number)
        .bind(&new.chinese_name)
        .bind(&new.nickname)
        .bind(&new.shirt_size)
        .bind(&new.company)
        .bind(&new.school)
        .bind(&new.dietary_restriction)
        .bind(&new.reimbursement_platform)
        .bind(&new.reimbursement_method)
        .bind(&new.reimbursement_phone_number)
        .bind(&new.reimbursement_email)
        .bind(&new.wechat_id)
        .bind(&new.line_id)
        .bind(now)
        .bind(new.join_date)
        .bind(new.birthday)
        .bind(&new.memo)
        .bind(&new.account_type)
        .execute(&self.db)
        .await
        .map_err(|e| {
            tracing::warn!("Registration insert failed for {}: {}", new.email, e);
            map_write_error(e, "Account")
        })?;

        tracing::info!("Registered account {}", new.email);

        self.find_by_email(&new.email)
            .await?
            .ok_or_else(|| IamError::Internal("Registered account vanished".to_string()))
    }

    pub async fn find_by_email(&self, email: &str) -> IamResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM account WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;

        Ok(account)
    }

    pub async fn find_by_id(&self, id: &str) -> IamResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM account WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(account)
    }

    /// Apply a self-service patch to the account identified by `email`
    pub async fn update_profile(&self, email: &str, patch: &AccountPatch) -> IamResult<Account> {
        let mut tx = self.db.begin().await?;

        let current = fetch_by_email(&mut tx, email)
            .await?
            .ok_or_else(|| IamError::NotFound(format!("Account {} not found", email)))?;
        let merged = apply_patch(&current, patch)?;

        if merged != current {
            sqlx::query(
                "UPDATE account SET email = ?1, first_name = ?2, last_name = ?3, phone_number = ?4,
                    chinese_name = ?5, nickname = ?6, shirt_size = ?7, company = ?8, school = ?9,
                    dietary_restriction = ?10, reimbursement_platform = ?11, reimbursement_method = ?12,
                    reimbursement_phone_number = ?13, reimbursement_email = ?14, wechat_id = ?15,
                    line_id = ?16, birthday = ?17, memo = ?18
                 WHERE email = ?19",
            )
            .bind(&merged.email)
            .bind(&merged.first_name)
            .bind(&merged.last_name)
            .bind(&merged.phone_number)
            .bind(&merged.chinese_name)
            .bind(&merged.nickname)
            .bind(&merged.shirt_size)
            .bind(&merged.company)
            .bind(&merged.school)
            .bind(&merged.dietary_restriction)
            .bind(&merged.reimbursement_platform)
            .bind(&merged.reimbursement_method)
            .bind(&merged.reimbursement_phone_number)
            .bind(&merged.reimbursement_email)
            .bind(&merged.wechat_id)
            .bind(&merged.line_id)
            .bind(merged.birthday)
            .bind(&merged.memo)
            .bind(email)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_write_error(e, "Email"))?;
        }

        tx.commit().await?;

        if merged.email != email {
            tracing::info!("Account {} changed email to {}", email, merged.email);
        }

        Ok(merged)
    }

    /// Assign an id and mark the account approved by `approver_id`
    ///
    /// Commits before returning so no transaction spans provisioning. The
    /// approver is absent only when login checks are disabled.
    pub async fn approve_registration(
        &self,
        email: &str,
        approver_id: Option<&str>,
    ) -> IamResult<Account> {
        let mut tx = self.db.begin().await?;

        let mut account = fetch_by_email(&mut tx, email)
            .await?
            .ok_or_else(|| IamError::NotFound("account not found in database".to_string()))?;

        id_gen::generate_id(&mut tx, &mut account).await?;

        sqlx::query("UPDATE account SET review_by_id = ?1, review_status = ?2 WHERE email = ?3")
            .bind(approver_id)
            .bind(REVIEW_APPROVED)
            .bind(email)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        account.review_by_id = approver_id.map(str::to_string);
        account.review_status = Some(REVIEW_APPROVED.to_string());

        Ok(account)
    }

    /// Record that the directory provider now holds this account
    pub async fn mark_provisioned(&self, email: &str) -> IamResult<()> {
        sqlx::query("UPDATE account SET has_iam_google_account = 1 WHERE email = ?1")
            .bind(email)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    // ==================== Bearer tokens ====================

    pub async fn insert_token(&self, account_id: &str, token: &str) -> IamResult<AccountToken> {
        let created_at = Utc::now();

        sqlx::query(
            "INSERT INTO account_token (token, account_id, created_at, expire_time)
             VALUES (?1, ?2, ?3, NULL)",
        )
        .bind(token)
        .bind(account_id)
        .bind(created_at)
        .execute(&self.db)
        .await
        .map_err(|e| map_write_error(e, "Token"))?;

        Ok(AccountToken {
            token: token.to_string(),
            account_id: account_id.to_string(),
            created_at,
            expire_time: None,
        })
    }

    pub async fn active_tokens(&self, account_id: &str) -> IamResult<Vec<AccountToken>> {
        let tokens = sqlx::query_as::<_, AccountToken>(
            "SELECT * FROM account_token WHERE account_id = ?1 AND expire_time IS NULL",
        )
        .bind(account_id)
        .fetch_all(&self.db)
        .await?;

        Ok(tokens)
    }

    /// Logically delete an active token; false when no active match exists
    pub async fn expire_token(&self, account_id: &str, token: &str) -> IamResult<bool> {
        let result = sqlx::query(
            "UPDATE account_token SET expire_time = ?1
             WHERE account_id = ?2 AND token = ?3 AND expire_time IS NULL",
        )
        .bind(Utc::now())
        .bind(account_id)
        .bind(token)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn account_for_active_token(&self, token: &str) -> IamResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT a.* FROM account_token t
             JOIN account a ON a.id = t.account_id
             WHERE t.token = ?1 AND t.expire_time IS NULL",
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?;

        Ok(account)
    }

    // ==================== Provider grants and sessions ====================

    /// Replace the account's grant and open a session in one transaction
    pub async fn record_login(&self, grant: &OAuthGrant, session: &Session) -> IamResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO oauth_grant (account_id, provider, provider_user_id, token, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(account_id) DO UPDATE SET
                provider = excluded.provider,
                provider_user_id = excluded.provider_user_id,
                token = excluded.token,
                created_at = excluded.created_at",
        )
        .bind(&grant.account_id)
        .bind(&grant.provider)
        .bind(&grant.provider_user_id)
        .bind(&grant.token)
        .bind(grant.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, "Provider identity"))?;

        sqlx::query(
            "INSERT INTO session (id, account_id, provider_token, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&session.id)
        .bind(&session.account_id)
        .bind(&session.provider_token)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_error(e, "Session"))?;

        tx.commit().await?;

        Ok(())
    }

    pub async fn find_grant(&self, account_id: &str) -> IamResult<Option<OAuthGrant>> {
        let grant = sqlx::query_as::<_, OAuthGrant>("SELECT * FROM oauth_grant WHERE account_id = ?1")
            .bind(account_id)
            .fetch_optional(&self.db)
            .await?;

        Ok(grant)
    }

    pub async fn find_session(&self, session_id: &str) -> IamResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>("SELECT * FROM session WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&self.db)
            .await?;

        Ok(session)
    }

    pub async fn delete_session(&self, session_id: &str) -> IamResult<()> {
        sqlx::query("DELETE FROM session WHERE id = ?1")
            .bind(session_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}

async fn fetch_by_email(conn: &mut SqliteConnection, email: &str) -> IamResult<Option<Account>> {
    let account = sqlx::query_as::<_, Account>("SELECT * FROM account WHERE email = ?1")
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(account)
}
