//! Identity backend seam.
//!
//! The gateway never stores users, tokens or role bindings itself; it asks an
//! [`IdentityBackend`] for them. [`IdentityClient`] talks to the REST identity
//! service used in production.

mod client;
mod types;

pub use client::IdentityClient;
pub use types::{
    AssignmentPolicies, AssignmentScope, Domain, IdentityProvider, IdpFilter, NamedRef,
    OidcCredential, Project, ProjectRef, RecoveryQuestion, RoleAssignment, TokenCredential,
    TokenKind, TotpRecord, UserProfile,
};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Failure reported by the identity backend, with its HTTP status when there was one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("identity backend: {message}")]
pub struct IdentityError {
    status: Option<u16>,
    message: String,
}

impl IdentityError {
    #[must_use]
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.status == Some(409)
    }

    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.status == Some(429)
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

pub type IdentityResult<T> = Result<T, IdentityError>;

#[async_trait]
pub trait IdentityBackend: Send + Sync {
    async fn authenticate_by_password(
        &self,
        username: &str,
        password: &str,
        domain: Option<&str>,
        client_ip: &str,
    ) -> IdentityResult<TokenCredential>;

    /// Exchange an SSO callback payload (`idp_driver`, `idp_id`, provider params).
    async fn authenticate_by_sso(
        &self,
        payload: &Map<String, Value>,
        client_ip: &str,
    ) -> IdentityResult<TokenCredential>;

    async fn authenticate_by_access_key(
        &self,
        access_key: &str,
        secret: &str,
        client_ip: &str,
    ) -> IdentityResult<TokenCredential>;

    /// Re-scope `token` to `project_id`, returning a new credential.
    async fn set_project(
        &self,
        project_id: &str,
        token: &TokenCredential,
    ) -> IdentityResult<TokenCredential>;

    async fn verify_token(&self, token: &str) -> IdentityResult<TokenCredential>;

    async fn get_user(&self, user_id: &str) -> IdentityResult<UserProfile>;

    async fn list_role_assignments(&self, user_id: &str) -> IdentityResult<Vec<RoleAssignment>>;

    async fn get_projects_for_user(&self, user_id: &str) -> IdentityResult<Vec<Project>>;

    async fn get_project(&self, id_or_name: &str) -> IdentityResult<Project>;

    async fn get_oidc_credential(&self, client_id: &str) -> IdentityResult<OidcCredential>;

    async fn patch_user_password(&self, user_id: &str, password: &str) -> IdentityResult<()>;

    async fn get_totp(&self, user_id: &str) -> IdentityResult<Option<TotpRecord>>;

    async fn put_totp(&self, user_id: &str, record: &TotpRecord) -> IdentityResult<()>;

    async fn get_recovery(&self, user_id: &str) -> IdentityResult<Vec<RecoveryQuestion>>;

    async fn put_recovery(&self, user_id: &str, questions: &[RecoveryQuestion])
    -> IdentityResult<()>;

    async fn list_regions(&self) -> IdentityResult<Vec<String>>;

    /// Domains, optionally restricted to a single id.
    async fn list_domains(&self, id: Option<&str>) -> IdentityResult<Vec<Domain>>;

    async fn list_idps(&self, filter: &IdpFilter) -> IdentityResult<Vec<IdentityProvider>>;

    /// Provider login URL that returns to `callback_url` with `state`.
    async fn sso_redirect_uri(
        &self,
        idp_id: &str,
        callback_url: &str,
        state: &str,
    ) -> IdentityResult<String>;
}
