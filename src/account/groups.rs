/// Group records and account membership
use crate::{
    account::{validate_email_address, AccountDirectory},
    db::{
        map_write_error,
        models::{Account, Group},
    },
    error::{IamError, IamResult},
};
use serde::Deserialize;
use serde_json::{Map, Value};
use validator::Validate;

/// Group creation request
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct NewGroup {
    pub year: Option<i64>,
    pub season: Option<String>,
    pub chinese_name: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub english_name: Option<String>,
    #[validate(custom(function = "validate_email_address"))]
    pub email: Option<String>,
    pub memo: Option<Map<String, Value>>,
}

impl AccountDirectory {
    pub async fn create_group(&self, group: NewGroup) -> IamResult<Group> {
        group
            .validate()
            .map_err(|e| IamError::Validation(e.to_string()))?;

        let memo = group.memo.map(|m| Value::Object(m).to_string());

        let result = sqlx::query(
            "INSERT INTO groups (year, season, chinese_name, english_name, email, memo)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(group.year)
        .bind(&group.season)
        .bind(&group.chinese_name)
        .bind(&group.english_name)
        .bind(&group.email)
        .bind(&memo)
        .execute(self.pool())
        .await
        .map_err(|e| map_write_error(e, "Group email"))?;

        let id = result.last_insert_rowid();
        tracing::info!("Created group {} ({:?})", id, group.english_name);

        self.get_group(id).await
    }

    pub async fn get_group(&self, group_id: i64) -> IamResult<Group> {
        sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = ?1")
            .bind(group_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| IamError::NotFound(format!("Group {} not found", group_id)))
    }

    /// Add an approved account (one with an id) to a group
    pub async fn add_member(&self, group_id: i64, account_id: &str) -> IamResult<()> {
        let mut tx = self.pool().begin().await?;

        let group_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM groups WHERE id = ?1")
            .bind(group_id)
            .fetch_optional(&mut *tx)
            .await?;
        if group_exists.is_none() {
            return Err(IamError::NotFound(format!("Group {} not found", group_id)));
        }

        let account_exists: Option<String> = sqlx::query_scalar("SELECT id FROM account WHERE id = ?1")
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await?;
        if account_exists.is_none() {
            return Err(IamError::NotFound(format!("Account {} not found", account_id)));
        }

        sqlx::query("INSERT INTO account_group (account_id, group_id) VALUES (?1, ?2)")
            .bind(account_id)
            .bind(group_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_write_error(e, "Membership"))?;

        tx.commit().await?;

        Ok(())
    }

    pub async fn remove_member(&self, group_id: i64, account_id: &str) -> IamResult<()> {
        let result = sqlx::query("DELETE FROM account_group WHERE group_id = ?1 AND account_id = ?2")
            .bind(group_id)
            .bind(account_id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(IamError::NotFound(format!(
                "Account {} is not a member of group {}",
                account_id, group_id
            )));
        }

        Ok(())
    }

    pub async fn group_members(&self, group_id: i64) -> IamResult<Vec<Account>> {
        self.get_group(group_id).await?;

        let members = sqlx::query_as::<_, Account>(
            "SELECT a.* FROM account a
             JOIN account_group ag ON ag.account_id = a.id
             WHERE ag.group_id = ?1
             ORDER BY a.id",
        )
        .bind(group_id)
        .fetch_all(self.pool())
        .await?;

        Ok(members)
    }

    pub async fn groups_of(&self, account_id: &str) -> IamResult<Vec<Group>> {
        let groups = sqlx::query_as::<_, Group>(
            "SELECT g.* FROM groups g
             JOIN account_group ag ON ag.group_id = g.id
             WHERE ag.account_id = ?1
             ORDER BY g.id",
        )
        .bind(account_id)
        .fetch_all(self.pool())
        .await?;

        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::NewAccount;
    use crate::db::create_memory_pool;

    async fn setup() -> AccountDirectory {
        let directory = AccountDirectory::new(create_memory_pool().await.unwrap());
        for (email, first, last) in [
            ("jack@example.org", "Jack", "Wong"),
            ("amy@example.org", "Amy", "Lin"),
        ] {
            directory
                .register(NewAccount::minimal(email, first, last, "1"))
                .await
                .unwrap();
            directory.approve_registration(email, None).await.unwrap();
        }
        directory
    }

    fn infra_group() -> NewGroup {
        NewGroup {
            year: Some(2024),
            season: Some("fall".to_string()),
            english_name: Some("Infra".to_string()),
            email: Some("infra@example.org".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_group_duplicate_email() {
        let directory = setup().await;

        let group = directory.create_group(infra_group()).await.unwrap();
        assert_eq!(group.english_name.as_deref(), Some("Infra"));

        match directory.create_group(infra_group()).await.unwrap_err() {
            IamError::Conflict(_) => {}
            other => panic!("Expected Conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_membership() {
        let directory = setup().await;
        let group = directory.create_group(infra_group()).await.unwrap();

        directory.add_member(group.id, "jackw").await.unwrap();
        directory.add_member(group.id, "amyl").await.unwrap();
        assert!(matches!(
            directory.add_member(group.id, "jackw").await,
            Err(IamError::Conflict(_))
        ));

        let members: Vec<String> = directory
            .group_members(group.id)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|a| a.id)
            .collect();
        assert_eq!(members, vec!["amyl".to_string(), "jackw".to_string()]);

        let groups = directory.groups_of("jackw").await.unwrap();
        assert_eq!(groups.len(), 1);

        directory.remove_member(group.id, "jackw").await.unwrap();
        assert!(matches!(
            directory.remove_member(group.id, "jackw").await,
            Err(IamError::NotFound(_))
        ));
        assert!(directory.groups_of("jackw").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_member_unknown_account_or_group() {
        let directory = setup().await;
        let group = directory.create_group(infra_group()).await.unwrap();

        assert!(matches!(
            directory.add_member(group.id, "nobody").await,
            Err(IamError::NotFound(_))
        ));
        assert!(matches!(
            directory.add_member(group.id + 100, "jackw").await,
            Err(IamError::NotFound(_))
        ));
    }
}
