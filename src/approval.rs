/// Approval of pending registrations
///
/// Each email is handled on its own: the account gets its id and review
/// fields in one committed transaction, then the directory provider is
/// called. A provisioning failure leaves the id in place.
use crate::{
    account::{profile::normalize_email, AccountDirectory},
    db::models::Account,
    error::{IamError, IamResult},
    providers::DirectoryProvisioner,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const SUCCESS_PREFIX: &str = "SUCCESS:";
const ERROR_PREFIX: &str = "ERROR:";

/// Per-email approval result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    pub email: String,
    pub message: String,
}

impl ApprovalOutcome {
    pub fn success(email: &str, id: &str) -> Self {
        Self {
            email: email.to_string(),
            message: format!("{} id: {}", SUCCESS_PREFIX, id),
        }
    }

    pub fn failure(email: &str, reason: &str) -> Self {
        Self {
            email: email.to_string(),
            message: format!("{} {}", ERROR_PREFIX, reason),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.message.starts_with(SUCCESS_PREFIX)
    }
}

pub struct ApprovalWorkflow {
    directory: AccountDirectory,
    provisioner: Arc<dyn DirectoryProvisioner>,
}

impl ApprovalWorkflow {
    pub fn new(directory: AccountDirectory, provisioner: Arc<dyn DirectoryProvisioner>) -> Self {
        Self {
            directory,
            provisioner,
        }
    }

    /// Approve every email in `emails`
    ///
    /// Returns all outcomes on success. If any item failed the outcomes come
    /// back inside [`IamError::ApprovalFailed`], successes included.
    pub async fn approve(
        &self,
        emails: &[String],
        approver: Option<&Account>,
    ) -> IamResult<Vec<ApprovalOutcome>> {
        let approver_id = approver.and_then(|a| a.id.as_deref());
        let mut outcomes = Vec::with_capacity(emails.len());

        for email in emails {
            let email = normalize_email(email);
            let outcome = match self.approve_one(&email, approver_id).await {
                Ok(id) => ApprovalOutcome::success(&email, &id),
                Err(reason) => {
                    tracing::warn!("Approval of {} failed: {}", email, reason);
                    ApprovalOutcome::failure(&email, &reason)
                }
            };
            outcomes.push(outcome);
        }

        let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
        tracing::info!(
            "Approved {} of {} accounts (approver: {})",
            outcomes.len() - failed,
            outcomes.len(),
            approver_id.unwrap_or("none")
        );

        if failed > 0 {
            return Err(IamError::ApprovalFailed(outcomes));
        }

        Ok(outcomes)
    }

    async fn approve_one(&self, email: &str, approver_id: Option<&str>) -> Result<String, String> {
        let account = match self.directory.approve_registration(email, approver_id).await {
            Ok(account) => account,
            Err(IamError::NotFound(_)) => return Err("account not found in database".to_string()),
            Err(IamError::Conflict(_)) => {
                return Err("generated id collided with an existing account, approve again".to_string())
            }
            Err(e) => {
                tracing::error!("Approval of {} hit a storage error: {}", email, e);
                return Err("failed to update account".to_string());
            }
        };

        let id = account.id.clone().unwrap_or_default();

        if let Err(e) = self.provisioner.create_account(&account).await {
            return Err(format!("Google Workspace with error({})", e));
        }

        if let Err(e) = self.directory.mark_provisioned(email).await {
            tracing::error!("Provisioned {} but could not record it: {}", email, e);
        }

        Ok(id)
    }
}
