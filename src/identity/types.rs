use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::policy::RbacScope;

/// A resolved identity as issued by the backend.
///
/// Never mutated after issue; re-scoping returns a new credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenCredential {
    pub token: String,
    pub user_id: String,
    pub user: String,
    #[serde(default)]
    pub domain_id: String,
    #[serde(default)]
    pub domain: String,
    /// Empty while the credential is unscoped.
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub project_domain_id: String,
    #[serde(default)]
    pub project_domain: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Unix seconds.
    pub expires_at: i64,
    #[serde(default)]
    pub login_ip: String,
    #[serde(flatten)]
    pub kind: TokenKind,
}

/// Token shapes differ in what they expose about role assignments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "version", rename_all = "lowercase")]
pub enum TokenKind {
    V3 {
        #[serde(default)]
        role_assignments: Vec<RoleAssignment>,
    },
    Legacy,
}

impl TokenCredential {
    #[must_use]
    pub fn is_scoped(&self) -> bool {
        !self.project_id.is_empty()
    }

    /// Seconds until expiry at `now`, never negative.
    #[must_use]
    pub fn max_age(&self, now: i64) -> i64 {
        (self.expires_at - now).max(0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct NamedRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub domain: NamedRef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignmentScope {
    #[serde(default)]
    pub project: ProjectRef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignmentPolicies {
    #[serde(default)]
    pub system: Vec<String>,
    #[serde(default)]
    pub domain: Vec<String>,
    #[serde(default)]
    pub project: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleAssignment {
    pub role: NamedRef,
    #[serde(default)]
    pub scope: AssignmentScope,
    #[serde(default)]
    pub policies: AssignmentPolicies,
}

impl RoleAssignment {
    /// Scope implied by which policy binding is populated.
    #[must_use]
    pub fn rbac_scope(&self) -> RbacScope {
        if !self.policies.system.is_empty() {
            RbacScope::System
        } else if !self.policies.domain.is_empty() {
            RbacScope::Domain
        } else {
            RbacScope::Project
        }
    }

    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.scope.project.id
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub allow_web_console: bool,
    #[serde(default)]
    pub enable_mfa: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_system_account: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_expires_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_auth_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_auth_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idps: Option<serde_json::Value>,
    /// Set for users federated through an external identity provider.
    #[serde(default, skip_serializing)]
    pub idp_driver: Option<String>,
}

impl UserProfile {
    #[must_use]
    pub fn is_federated(&self) -> bool {
        self.idp_driver.as_deref().is_some_and(|d| !d.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub domain_id: String,
    #[serde(default)]
    pub domain: String,
}

/// A registered relying party.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OidcCredential {
    pub client_id: String,
    pub secret: String,
    pub redirect_uri: String,
}

/// Sealed TOTP secret plus whether the first passcode has been verified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TotpRecord {
    pub sealed_secret: String,
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecoveryQuestion {
    pub question: String,
    pub answer_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Domain {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct IdentityProvider {
    pub id: String,
    pub name: String,
    pub driver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_uri: Option<String>,
}

/// Listing filter for enabled, system-scope identity providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpFilter {
    /// `all` when the caller did not name a domain.
    pub sso_domain: String,
    /// `Some(false)` restricts to providers that do not auto-create users.
    pub auto_create_user: Option<bool>,
}
