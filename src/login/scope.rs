use crate::identity::{Project, RoleAssignment};
use crate::policy::RbacScope;

/// Project of the assignment with the broadest scope; the first one seen wins
/// ties. Assignments without a project only count until one with a project
/// shows up.
#[must_use]
pub fn select_role_project(assignments: &[RoleAssignment]) -> Option<(&str, RbacScope)> {
    let mut target: Option<(&str, RbacScope)> = None;
    for assignment in assignments {
        let level = assignment.rbac_scope();
        match target {
            Some((id, current)) if !id.is_empty() && level <= current => {}
            _ => target = Some((assignment.project_id(), level)),
        }
    }
    target.filter(|(id, _)| !id.is_empty())
}

/// The project named after the user, else the first membership.
#[must_use]
pub fn select_default_project<'a>(projects: &'a [Project], username: &str) -> Option<&'a Project> {
    projects
        .iter()
        .find(|p| p.name == username)
        .or_else(|| projects.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{AssignmentPolicies, AssignmentScope, NamedRef, ProjectRef};
    use crate::test_support::project;

    fn assignment(project_id: &str, scope: RbacScope) -> RoleAssignment {
        let mut policies = AssignmentPolicies::default();
        let names = vec!["p".to_string()];
        match scope {
            RbacScope::System => policies.system = names,
            RbacScope::Domain => policies.domain = names,
            RbacScope::Project => policies.project = names,
        }
        RoleAssignment {
            role: NamedRef {
                id: format!("r-{project_id}"),
                name: "member".to_string(),
            },
            scope: AssignmentScope {
                project: ProjectRef {
                    id: project_id.to_string(),
                    ..ProjectRef::default()
                },
            },
            policies,
        }
    }

    #[test]
    fn broadest_scope_wins() {
        let assignments = [
            assignment("p1", RbacScope::Project),
            assignment("p2", RbacScope::Domain),
            assignment("p3", RbacScope::System),
            assignment("p4", RbacScope::Domain),
        ];
        assert_eq!(
            select_role_project(&assignments),
            Some(("p3", RbacScope::System))
        );
    }

    #[test]
    fn first_seen_wins_ties() {
        let assignments = [
            assignment("p1", RbacScope::Domain),
            assignment("p2", RbacScope::Domain),
        ];
        assert_eq!(
            select_role_project(&assignments),
            Some(("p1", RbacScope::Domain))
        );
    }

    #[test]
    fn projectless_assignments_are_replaced() {
        let assignments = [
            assignment("", RbacScope::System),
            assignment("p2", RbacScope::Project),
        ];
        assert_eq!(
            select_role_project(&assignments),
            Some(("p2", RbacScope::Project))
        );
        assert_eq!(select_role_project(&[assignment("", RbacScope::System)]), None);
        assert_eq!(select_role_project(&[]), None);
    }

    #[test]
    fn default_project_prefers_own_name() {
        let projects = [project("p1", "shared"), project("p2", "alice")];
        assert_eq!(
            select_default_project(&projects, "alice").map(|p| p.id.as_str()),
            Some("p2")
        );
        assert_eq!(
            select_default_project(&projects, "bob").map(|p| p.id.as_str()),
            Some("p1")
        );
        assert!(select_default_project(&[], "bob").is_none());
    }
}
