//! The "who am I" document served to the console and to OIDC relying parties.

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{error, warn};

use crate::error::ApiError;
use crate::identity::{IdentityBackend, NamedRef, RoleAssignment, TokenCredential, TokenKind};
use crate::policy::{PolicyEngine, RbacScope};

/// Roles a user holds in one project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectRoles {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub domain_id: String,
    pub roles: Vec<NamedRef>,
}

/// Group assignments by project, keeping the order projects are first seen.
#[must_use]
pub fn fold_project_roles(assignments: &[RoleAssignment]) -> Vec<ProjectRoles> {
    let mut projects: Vec<ProjectRoles> = Vec::new();
    for assignment in assignments {
        let project = &assignment.scope.project;
        if project.id.is_empty() {
            continue;
        }
        let index = if let Some(index) = projects.iter().position(|p| p.id == project.id) {
            index
        } else {
            projects.push(ProjectRoles {
                id: project.id.clone(),
                name: project.name.clone(),
                domain: project.domain.name.clone(),
                domain_id: project.domain.id.clone(),
                roles: Vec::new(),
            });
            projects.len() - 1
        };
        let entry = &mut projects[index];
        if !entry.roles.iter().any(|r| r.id == assignment.role.id) {
            entry.roles.push(assignment.role.clone());
        }
    }
    projects
}

impl ProjectRoles {
    /// A stand-in credential for asking the policy engine what this project's
    /// roles would allow.
    fn scoped_token(&self, token: &TokenCredential) -> TokenCredential {
        TokenCredential {
            token: "faketoken".to_string(),
            user_id: token.user_id.clone(),
            user: token.user.clone(),
            domain_id: token.domain_id.clone(),
            domain: token.domain.clone(),
            project_id: self.id.clone(),
            project: self.name.clone(),
            project_domain_id: self.domain_id.clone(),
            project_domain: self.domain.clone(),
            roles: self.roles.iter().map(|r| r.name.clone()).collect(),
            expires_at: token.expires_at,
            login_ip: token.login_ip.clone(),
            kind: TokenKind::Legacy,
        }
    }

    fn document(&self, token: &TokenCredential, policy: &dyn PolicyEngine) -> Value {
        let scoped = self.scoped_token(token);
        let mut doc = Map::new();
        doc.insert("id".to_string(), json!(self.id));
        doc.insert("name".to_string(), json!(self.name));
        doc.insert("domain".to_string(), json!(self.domain));
        doc.insert("domain_id".to_string(), json!(self.domain_id));
        doc.insert("roles".to_string(), json!(self.roles));
        for scope in RbacScope::ALL {
            let matched = policy.matched_policy_names(scope, &scoped);
            let capable = !matched.is_empty();
            doc.insert(format!("{scope}_policies"), json!(matched));
            doc.insert(format!("{scope}_capable"), json!(capable));
            if scope == RbacScope::System {
                doc.insert("admin_capable".to_string(), json!(capable));
            }
        }
        Value::Object(doc)
    }
}

/// Assemble the document for the holder of `token`.
///
/// # Errors
/// Returns `NotFound` when the user or their assignments cannot be read.
pub async fn build_user_info(
    identity: &dyn IdentityBackend,
    policy: &dyn PolicyEngine,
    token: &TokenCredential,
    sso_callback_url: &str,
) -> Result<Map<String, Value>, ApiError> {
    let user = identity.get_user(&token.user_id).await.map_err(|err| {
        error!(user_id = %token.user_id, error = %err, "failed to fetch user profile");
        ApiError::NotFound(err.message().to_string())
    })?;
    let assignments = identity
        .list_role_assignments(&token.user_id)
        .await
        .map_err(|err| {
            error!(user_id = %token.user_id, error = %err, "failed to list role assignments");
            ApiError::NotFound(err.message().to_string())
        })?;
    let regions = identity.list_regions().await.unwrap_or_else(|err| {
        warn!(error = %err, "failed to list regions");
        Vec::new()
    });

    let mut doc = match serde_json::to_value(&user) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    doc.insert(
        "domain".to_string(),
        json!({"id": token.domain_id, "name": token.domain}),
    );
    doc.insert("regions".to_string(), json!(regions));
    doc.insert("roles".to_string(), json!(token.roles));
    doc.insert("projectName".to_string(), json!(token.project));
    doc.insert("projectId".to_string(), json!(token.project_id));
    doc.insert("projectDomain".to_string(), json!(token.project_domain));
    doc.insert("projectDomainId".to_string(), json!(token.project_domain_id));

    let projects: Vec<Value> = fold_project_roles(&assignments)
        .iter()
        .map(|p| p.document(token, policy))
        .collect();
    doc.insert("projects".to_string(), Value::Array(projects));

    for scope in RbacScope::ALL {
        let matched = policy.matched_policy_names(scope, token);
        match scope {
            RbacScope::System => {
                doc.insert("admin_policies".to_string(), json!(matched));
            }
            RbacScope::Project => {
                doc.insert("policies".to_string(), json!(matched));
            }
            RbacScope::Domain => {}
        }
        doc.insert(format!("{scope}_policies"), json!(matched));
    }
    doc.insert("all_policies".to_string(), json!(policy.all_policies()));
    doc.insert("sso_callback_url".to_string(), json!(sso_callback_url));
    Ok(doc)
}
