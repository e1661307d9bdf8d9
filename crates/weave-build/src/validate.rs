//! Workspace validity rules

use std::collections::{BTreeMap, BTreeSet};

use weave_core::{BuildError, Project};

/// Checks the retrieved project set before any graph is built.
pub trait WorkspaceValidator: Send + Sync {
    fn validate(&self, projects: &[Project]) -> Vec<BuildError>;
}

/// Rejects duplicate project names and implicit dependencies on projects
/// that do not exist.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultValidator;

impl WorkspaceValidator for DefaultValidator {
    fn validate(&self, projects: &[Project]) -> Vec<BuildError> {
        let mut errors = Vec::new();

        let mut roots_by_name: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for project in projects {
            roots_by_name
                .entry(project.name.as_str())
                .or_default()
                .push(project.root.display().to_string());
        }
        for (name, roots) in &roots_by_name {
            if roots.len() > 1 {
                errors.push(BuildError::WorkspaceValidity {
                    message: format!("project `{name}` is declared more than once ({})", roots.join(", ")),
                    projects: vec![name.to_string()],
                });
            }
        }

        let known: BTreeSet<&str> = roots_by_name.keys().copied().collect();
        for project in projects {
            let missing: Vec<&str> = project
                .implicit_dependencies
                .iter()
                .map(|dep| dep.strip_prefix('!').unwrap_or(dep))
                .filter(|dep| !known.contains(dep))
                .collect();
            if !missing.is_empty() {
                errors.push(BuildError::WorkspaceValidity {
                    message: format!(
                        "project `{}` has implicit dependencies on unknown projects: {}",
                        project.name,
                        missing.join(", ")
                    ),
                    projects: vec![project.name.clone()],
                });
            }
        }

        errors
    }
}
