//! RBAC scopes and the policy-matching seam.

mod file;

pub use file::{PolicyError, PolicyRule, StaticPolicyEngine};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::identity::TokenCredential;

/// Breadth at which a role applies, ordered `Project < Domain < System`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum RbacScope {
    Project,
    Domain,
    System,
}

impl RbacScope {
    /// Narrowest first.
    pub const ALL: [Self; 3] = [Self::Project, Self::Domain, Self::System];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Domain => "domain",
            Self::System => "system",
        }
    }
}

impl fmt::Display for RbacScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown rbac scope: {0}")]
pub struct UnknownScope(pub String);

impl FromStr for RbacScope {
    type Err = UnknownScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(Self::Project),
            "domain" => Ok(Self::Domain),
            "system" => Ok(Self::System),
            other => Err(UnknownScope(other.to_string())),
        }
    }
}

pub trait PolicyEngine: Send + Sync {
    /// Names of the policies at `scope` that apply to `token`.
    fn matched_policy_names(&self, scope: RbacScope, token: &TokenCredential) -> Vec<String>;

    fn is_scope_capable(&self, token: &TokenCredential, scope: RbacScope) -> bool {
        !self.matched_policy_names(scope, token).is_empty()
    }

    /// Every known policy name, grouped by scope.
    fn all_policies(&self) -> BTreeMap<String, Vec<String>>;
}
