//! # User Service
//!
//! Staff profiles, plus one privileged operation that exists only
//! remotely: confirming a user's email address.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::info;

use duka_core::validation::validate_uuid;
use duka_core::{CoreError, Filter, NewUserProfile, UserProfile, UserProfilePatch};

use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;
use crate::repository::MirroredRepository;
use crate::services::new_id;

/// Server function that marks a user's email as confirmed.
pub const CONFIRM_EMAIL_FUNCTION: &str = "confirm_user_email";

#[derive(Clone)]
pub struct UserService {
    users: Arc<MirroredRepository<UserProfile>>,
    remote: Arc<dyn RemoteStore>,
}

impl std::fmt::Debug for UserService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserService")
            .field("users", &self.users)
            .finish_non_exhaustive()
    }
}

impl UserService {
    pub fn new(users: Arc<MirroredRepository<UserProfile>>, remote: Arc<dyn RemoteStore>) -> Self {
        UserService { users, remote }
    }

    pub fn repository(&self) -> Arc<MirroredRepository<UserProfile>> {
        self.users.clone()
    }

    pub async fn create(&self, input: NewUserProfile) -> SyncResult<UserProfile> {
        input.validate()?;
        let profile = UserProfile::create(new_id(), input, Utc::now());
        self.users.create(profile).await
    }

    pub async fn get(&self, id: &str) -> SyncResult<Option<UserProfile>> {
        self.users.get(id).await
    }

    pub async fn list(&self, filter: &Filter) -> SyncResult<Vec<UserProfile>> {
        self.users.list(filter).await
    }

    pub async fn update(&self, id: &str, patch: &UserProfilePatch) -> SyncResult<UserProfile> {
        self.users.update(id, patch).await
    }

    pub async fn delete(&self, id: &str) -> SyncResult<bool> {
        self.users.delete(id).await
    }

    /// Confirms a user's email through a server function.
    ///
    /// Online only: nothing is mirrored and nothing is queued.
    ///
    /// ## Errors
    /// * `RemoteUnavailable` - offline, unreachable, or the function is not deployed
    /// * `Unauthenticated` / `RemoteRejected` - the remote refused
    pub async fn confirm_email(&self, user_id: &str) -> SyncResult<()> {
        validate_uuid("user_id", user_id).map_err(CoreError::from)?;

        if !self.users.is_online().await {
            return Err(SyncError::RemoteUnavailable(
                "confirming an email needs a connection".into(),
            ));
        }

        self.remote
            .invoke(CONFIRM_EMAIL_FUNCTION, json!({ "user_id": user_id }))
            .await?;

        info!(user_id, "Email confirmed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use duka_core::{ActiveStatus, UserRole};

    fn cashier() -> NewUserProfile {
        NewUserProfile {
            full_name: "Amina Salim".to_string(),
            email: "amina@duka.example".to_string(),
            phone: None,
            role: UserRole::Cashier,
        }
    }

    #[tokio::test]
    async fn test_create_and_update_online() {
        let h = Harness::online().await;
        let users = h.services().users;

        let profile = users.create(cashier()).await.unwrap();
        assert_eq!(profile.status, ActiveStatus::Active);

        let patch = UserProfilePatch {
            role: Some(UserRole::Manager),
            ..Default::default()
        };
        let updated = users.update(&profile.id, &patch).await.unwrap();
        assert_eq!(updated.role, UserRole::Manager);
        assert_eq!(h.remote.row("user_profiles", &profile.id).await.unwrap()["role"], "manager");
    }

    #[tokio::test]
    async fn test_confirm_email_invokes_function() {
        let h = Harness::online().await;
        h.remote
            .register_function(CONFIRM_EMAIL_FUNCTION, json!(null))
            .await;
        let users = h.services().users;
        let profile = users.create(cashier()).await.unwrap();

        users.confirm_email(&profile.id).await.unwrap();

        let calls = h.remote.invocations().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, CONFIRM_EMAIL_FUNCTION);
        assert_eq!(calls[0].1["user_id"], profile.id.as_str());
    }

    #[tokio::test]
    async fn test_confirm_email_offline_is_unavailable() {
        let h = Harness::offline().await;
        let users = h.services().users;

        let err = users
            .confirm_email("550e8400-e29b-41d4-a716-446655440000")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RemoteUnavailable(_)));
        assert_eq!(h.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_confirm_email_missing_function_is_unavailable() {
        let h = Harness::online().await;
        let users = h.services().users;

        let err = users
            .confirm_email("550e8400-e29b-41d4-a716-446655440000")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RemoteUnavailable(_)));
    }
}
