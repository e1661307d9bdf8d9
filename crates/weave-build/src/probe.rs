//! Which plugins cannot cope with a project subtree

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use weave_core::{BuildError, ProjectConfigurationsError};
use weave_plugins::{LoadPluginsError, PluginDescriptor, PluginRegistry};

use crate::files::collect_workspace_files;
use crate::progress::NoopProgress;
use crate::retrieval::retrieve_project_configurations;

/// Plugin name to the files it failed on.
pub type Incompatibilities = BTreeMap<String, BTreeSet<PathBuf>>;

/// Ways retrieval can fail from the probe's point of view.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalFailure {
    #[error(transparent)]
    Plugins(#[from] LoadPluginsError),

    #[error(transparent)]
    Configurations(#[from] ProjectConfigurationsError),
}

/// Attribute structural errors to plugins and files. Only node-creation
/// failures say anything about compatibility; everything else is ignored.
pub fn incompatibilities_from_errors(errors: &[BuildError]) -> Incompatibilities {
    let mut found = Incompatibilities::new();
    for error in errors {
        match error {
            BuildError::AggregateCreateNodes { plugin, errors } if !errors.is_empty() => {
                found
                    .entry(plugin.clone())
                    .or_default()
                    .extend(errors.iter().map(|(file, _)| file.clone()));
            }
            BuildError::MergeNodes { plugin, file, .. } => {
                found.entry(plugin.clone()).or_default().insert(file.clone());
            }
            BuildError::AggregateCreateNodes { .. }
            | BuildError::WorkspaceValidity { .. }
            | BuildError::ProcessDependencies { .. }
            | BuildError::CreateMetadata { .. }
            | BuildError::ProjectsWithNoName { .. } => {}
        }
    }
    found
}

pub fn incompatibilities_from_failure(failure: &RetrievalFailure) -> Incompatibilities {
    match failure {
        RetrievalFailure::Configurations(err) => incompatibilities_from_errors(&err.errors),
        RetrievalFailure::Plugins(err) => {
            tracing::debug!("Probe could not load plugins: {}", err);
            Incompatibilities::new()
        }
    }
}

/// Run project configuration retrieval over `subtree` with only the given
/// plugins and report the files each of them choked on.
pub async fn find_incompatible_plugins(
    registry: &PluginRegistry,
    descriptors: &[PluginDescriptor],
    subtree: &Path,
    workspace_root: &Path,
) -> Incompatibilities {
    match probe(registry, descriptors, subtree, workspace_root).await {
        Ok(()) => Incompatibilities::new(),
        Err(failure) => incompatibilities_from_failure(&failure),
    }
}

async fn probe(
    registry: &PluginRegistry,
    descriptors: &[PluginDescriptor],
    subtree: &Path,
    workspace_root: &Path,
) -> Result<(), RetrievalFailure> {
    let plugins = registry.load(descriptors)?;
    let files = collect_workspace_files(workspace_root, Some(subtree));
    retrieve_project_configurations(&plugins, workspace_root, &files, &NoopProgress).await?;
    Ok(())
}
