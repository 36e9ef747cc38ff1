use serde::Deserialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use super::{LoginFlow, RequestContext};
use crate::error::ApiError;
use crate::identity::TokenCredential;
use crate::totp::TotpGate;

/// Body of `POST /password`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PasswordReset {
    #[serde(default)]
    pub password_old: String,
    #[serde(default)]
    pub password_new: String,
    #[serde(default)]
    pub password_confirm: String,
    #[serde(default)]
    pub passcode: Option<String>,
}

impl LoginFlow {
    /// Everything that must hold before the password is changed.
    ///
    /// # Errors
    /// Returns `Forbidden` for federated users, `InputParameter` for a
    /// mismatch, a wrong old password or a wrong passcode, and `Conflict` when
    /// the backend reports the account locked.
    pub async fn verify_password_reset(
        &self,
        ctx: &RequestContext,
        token: &TokenCredential,
        reset: &PasswordReset,
        totp: &TotpGate,
    ) -> Result<(), ApiError> {
        let user = self.identity.get_user(&token.user_id).await.map_err(|err| {
            error!(user_id = %token.user_id, error = %err, "failed to fetch user profile");
            ApiError::GeneralServer(err.message().to_string())
        })?;

        // Federated users keep their password at the provider.
        if user.is_federated() {
            return Err(ApiError::Forbidden(
                "not support reset user password".to_string(),
            ));
        }
        if reset.password_new.is_empty() {
            return Err(ApiError::InputParameter("new password is empty".to_string()));
        }
        if reset.password_new != reset.password_confirm {
            return Err(ApiError::InputParameter("new password mismatch".to_string()));
        }

        let domain = Some(token.domain.as_str()).filter(|d| !d.is_empty());
        if let Err(err) = self
            .identity
            .authenticate_by_password(&user.name, &reset.password_old, domain, &ctx.client_ip)
            .await
        {
            if err.is_conflict() {
                return Err(ApiError::Conflict(err.message().to_string()));
            }
            warn!(user_id = %user.id, error = %err, "old password rejected");
            return Err(ApiError::InputParameter("invalid password".to_string()));
        }

        if self.enable_totp && user.enable_mfa {
            let passcode = reset.passcode.as_deref().unwrap_or_default();
            totp.verify(&user.id, passcode)
                .await
                .map_err(|_| ApiError::InputParameter("invalid passcode".to_string()))?;
        }
        Ok(())
    }

    /// # Errors
    /// Returns the backend failure when the password cannot be stored.
    pub async fn apply_password_reset(
        &self,
        user_id: &str,
        reset: &PasswordReset,
    ) -> Result<(), ApiError> {
        self.identity
            .patch_user_password(user_id, &reset.password_new)
            .await
            .map_err(|err| {
                error!(user_id, error = %err, "failed to store new password");
                ApiError::from(err)
            })?;
        info!(user_id, "password changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityError;
    use crate::policy::StaticPolicyEngine;
    use crate::test_support::{MemoryIdentity, test_crypto, token, user};
    use std::sync::Arc;

    fn reset(old: &str, new: &str, confirm: &str) -> PasswordReset {
        PasswordReset {
            password_old: old.to_string(),
            password_new: new.to_string(),
            password_confirm: confirm.to_string(),
            passcode: None,
        }
    }

    fn setup(identity: MemoryIdentity) -> (Arc<MemoryIdentity>, LoginFlow, TotpGate) {
        let identity = Arc::new(identity);
        let flow = LoginFlow::new(identity.clone(), Arc::new(StaticPolicyEngine::empty()));
        let totp = TotpGate::new(identity.clone(), Arc::new(test_crypto()), "apigate");
        (identity, flow, totp)
    }

    #[tokio::test]
    async fn reset_checks_then_patches() -> anyhow::Result<()> {
        let (identity, flow, totp) = setup(
            MemoryIdentity::new()
                .with_password("alice", "old", token("u1", "alice", "p1"))
                .with_user(user("u1", "alice")),
        );
        let session = token("u1", "alice", "p1");
        let ctx = RequestContext::new("10.0.0.1");

        let err = flow
            .verify_password_reset(&ctx, &session, &reset("old", "new", "other"), &totp)
            .await
            .err();
        assert_eq!(
            err,
            Some(ApiError::InputParameter("new password mismatch".to_string()))
        );

        let err = flow
            .verify_password_reset(&ctx, &session, &reset("wrong", "new", "new"), &totp)
            .await
            .err();
        assert_eq!(err, Some(ApiError::InputParameter("invalid password".to_string())));

        let request = reset("old", "new", "new");
        flow.verify_password_reset(&ctx, &session, &request, &totp)
            .await?;
        flow.apply_password_reset("u1", &request).await?;
        assert_eq!(
            identity.patched_passwords(),
            vec![("u1".to_string(), "new".to_string())]
        );
        Ok(())
    }

    #[tokio::test]
    async fn federated_users_are_refused_regardless_of_input() {
        let mut profile = user("u1", "alice");
        profile.idp_driver = Some("ldap".to_string());
        let (identity, flow, totp) = setup(MemoryIdentity::new().with_user(profile));
        let session = token("u1", "alice", "p1");
        let ctx = RequestContext::default();
        for request in [reset("old", "new", "new"), reset("", "a", "b")] {
            let err = flow
                .verify_password_reset(&ctx, &session, &request, &totp)
                .await
                .err();
            assert!(matches!(err, Some(ApiError::Forbidden(_))));
        }
        assert!(identity.patched_passwords().is_empty());
    }

    #[tokio::test]
    async fn locked_account_passes_through() {
        let (_, flow, totp) = setup(
            MemoryIdentity::new()
                .with_user(user("u1", "alice"))
                .failing_login(IdentityError::with_status(409, "locked")),
        );
        let err = flow
            .verify_password_reset(
                &RequestContext::default(),
                &token("u1", "alice", "p1"),
                &reset("old", "new", "new"),
                &totp,
            )
            .await
            .err();
        assert_eq!(err, Some(ApiError::Conflict("locked".to_string())));
    }

    #[tokio::test]
    async fn mfa_users_need_a_passcode() {
        let mut profile = user("u1", "alice");
        profile.enable_mfa = true;
        let (_, flow, totp) = setup(
            MemoryIdentity::new()
                .with_password("alice", "old", token("u1", "alice", "p1"))
                .with_user(profile),
        );
        let flow = flow.with_totp(true);
        let mut request = reset("old", "new", "new");
        request.passcode = Some("000000".to_string());
        let err = flow
            .verify_password_reset(
                &RequestContext::default(),
                &token("u1", "alice", "p1"),
                &request,
                &totp,
            )
            .await
            .err();
        assert_eq!(err, Some(ApiError::InputParameter("invalid passcode".to_string())));
    }

    #[tokio::test]
    async fn patch_failure_is_reported() {
        let (_, flow, _) = setup(MemoryIdentity::new().failing_patch());
        let err = flow
            .apply_password_reset("u1", &reset("old", "new", "new"))
            .await
            .err();
        assert!(matches!(err, Some(ApiError::GeneralServer(_))));
    }
}
