/// Human-readable account identifiers
///
/// An id is the case-folded first name plus the first letter of the last name
/// ("Jack Wong" -> "jackw"). When existing ids already contain that stem, the
/// number of such ids is appended ("jackw1", "jackw2", ...). The suffix is a
/// count, not a sequence, so a deleted id can make the next one collide; the
/// UNIQUE constraint on `account.id` turns that into a `Conflict`.
use crate::{
    db::{map_write_error, models::Account},
    error::{IamError, IamResult},
};
use sqlx::SqliteConnection;

/// Build the stem for a name pair
pub fn candidate_id(first_name: &str, last_name: &str) -> IamResult<String> {
    let first: String = first_name.chars().filter(|c| !c.is_whitespace()).collect();
    let last_initial = last_name.chars().find(|c| !c.is_whitespace());

    match last_initial {
        Some(initial) if !first.is_empty() => {
            let mut candidate = first.to_lowercase();
            candidate.extend(initial.to_lowercase());
            Ok(candidate)
        }
        _ => Err(IamError::Validation(
            "first_name and last_name are required to generate an id".to_string(),
        )),
    }
}

/// Number of existing ids that contain `candidate`
pub async fn count_matching(conn: &mut SqliteConnection, candidate: &str) -> IamResult<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE id IS NOT NULL AND instr(id, ?1) > 0")
            .bind(candidate)
            .fetch_one(&mut *conn)
            .await?;

    Ok(count)
}

/// Assign an id to `account` inside the caller's transaction
///
/// Idempotent: an account that already has an id keeps it.
pub async fn generate_id(conn: &mut SqliteConnection, account: &mut Account) -> IamResult<String> {
    if let Some(id) = &account.id {
        return Ok(id.clone());
    }

    let candidate = candidate_id(&account.first_name, &account.last_name)?;
    let taken = count_matching(conn, &candidate).await?;
    let id = if taken == 0 {
        candidate
    } else {
        format!("{}{}", candidate, taken)
    };

    sqlx::query("UPDATE account SET id = ?1 WHERE email = ?2 AND id IS NULL")
        .bind(&id)
        .bind(&account.email)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_write_error(e, &format!("Account id '{}'", id)))?;

    tracing::debug!("Assigned id {} to {}", id, account.email);
    account.id = Some(id.clone());

    Ok(id)
}
