use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use super::{PolicyEngine, RbacScope};
use crate::identity::TokenCredential;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid policy document: {0}")]
    Json(#[from] serde_json::Error),
}

/// One entry of the policy file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyRule {
    pub name: String,
    pub scope: RbacScope,
    pub roles: Vec<String>,
    /// Project ids or names the rule is limited to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<String>>,
    /// Project-domain ids or names the rule is limited to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domains: Option<Vec<String>>,
}

impl PolicyRule {
    fn matches(&self, scope: RbacScope, token: &TokenCredential) -> bool {
        if self.scope != scope {
            return false;
        }
        if !self.roles.iter().any(|role| token.roles.contains(role)) {
            return false;
        }
        if let Some(projects) = &self.projects
            && !projects
                .iter()
                .any(|p| *p == token.project_id || *p == token.project)
        {
            return false;
        }
        if let Some(domains) = &self.domains
            && !domains
                .iter()
                .any(|d| *d == token.project_domain_id || *d == token.project_domain)
        {
            return false;
        }
        true
    }
}

/// Policy engine over a fixed rule list loaded at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicyEngine {
    rules: Vec<PolicyRule>,
}

impl StaticPolicyEngine {
    /// An engine with no rules; no token is capable of any scope.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    /// Parse a JSON array of rules.
    ///
    /// # Errors
    /// Returns an error if the document is not a valid rule array.
    pub fn from_json(document: &str) -> Result<Self, PolicyError> {
        let rules: Vec<PolicyRule> = serde_json::from_str(document)?;
        Ok(Self::new(rules))
    }

    /// Load rules from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let document = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&document)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl PolicyEngine for StaticPolicyEngine {
    fn matched_policy_names(&self, scope: RbacScope, token: &TokenCredential) -> Vec<String> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(scope, token))
            .map(|rule| rule.name.clone())
            .collect()
    }

    fn all_policies(&self) -> BTreeMap<String, Vec<String>> {
        let mut all: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for scope in RbacScope::ALL {
            all.entry(scope.to_string()).or_default();
        }
        for rule in &self.rules {
            all.entry(rule.scope.to_string())
                .or_default()
                .push(rule.name.clone());
        }
        all
    }
}
