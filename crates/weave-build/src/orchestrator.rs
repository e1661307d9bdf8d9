//! Concurrent fan-out of plugin phases
//!
//! Every phase launches all capable plugins at once and waits for all of
//! them to settle before anything is applied to the graph. Results are
//! then applied in plugin-list order, so the outcome never depends on
//! which plugin finished first.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::anyhow;
use futures_util::future::join_all;
use weave_core::{
    BuildError, Dependency, ExternalNode, FileMap, GraphBuilder, MergePolicy, MetadataConflict, Project,
    ProjectGraph, ProjectGraphError, SourceMaps, merge_project_metadata,
};
use weave_plugins::{CreateDependenciesContext, CreateMetadataContext, LoadedPlugin};

use crate::progress::{Phase, ProgressObserver};

/// Drive `tasks` to completion concurrently, reporting the ones still
/// running to `progress` once its grace period has elapsed.
///
/// Output order matches input order.
pub async fn settle_all<T, F>(phase: Phase, tasks: Vec<(String, F)>, progress: &dyn ProgressObserver) -> Vec<T>
where
    F: Future<Output = T>,
{
    let outstanding = Mutex::new(tasks.iter().map(|(name, _)| name.clone()).collect::<Vec<_>>());
    let outstanding = &outstanding;

    let joined = join_all(tasks.into_iter().map(|(name, task)| async move {
        let output = task.await;
        if let Ok(mut names) = outstanding.lock() {
            if let Some(pos) = names.iter().position(|n| *n == name) {
                names.remove(pos);
            }
        }
        output
    }));

    let Some(grace) = progress.grace_period() else {
        return joined.await;
    };
    let grace = grace.max(Duration::from_millis(1));

    tokio::pin!(joined);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + grace, grace);
    let mut reported = false;
    loop {
        tokio::select! {
            results = &mut joined => {
                if reported {
                    progress.finished(phase);
                }
                return results;
            }
            _ = ticker.tick() => {
                let names = outstanding.lock().map(|n| n.clone()).unwrap_or_default();
                if !names.is_empty() {
                    progress.waiting(phase, &names);
                    reported = true;
                }
            }
        }
    }
}

/// Read-only inputs shared by every dependency plugin.
#[derive(Debug, Clone, Copy)]
pub struct DependencyInputs<'a> {
    pub workspace_root: &'a Path,
    pub projects: &'a BTreeMap<String, Project>,
    pub file_map: &'a FileMap,
    pub files_to_process: &'a FileMap,
    pub external_nodes: &'a BTreeMap<String, ExternalNode>,
}

/// Outcome of the dependency phase: always a graph, possibly with errors.
#[derive(Debug)]
pub struct DependencyPhase {
    pub graph: ProjectGraph,
    /// Contributions accepted by the builder, in application order.
    pub applied: Vec<Dependency>,
    pub errors: Vec<BuildError>,
}

impl DependencyPhase {
    pub fn into_result(self) -> Result<ProjectGraph, ProjectGraphError> {
        if self.errors.is_empty() {
            Ok(self.graph)
        } else {
            Err(ProjectGraphError::new(self.errors, self.graph))
        }
    }
}

/// Run every dependency-capable plugin and add their edges to `graph`.
///
/// A plugin that fails, or whose contribution the builder rejects, is
/// reported as [`BuildError::ProcessDependencies`]; its remaining
/// contributions are dropped, everyone else's are kept.
pub async fn create_dependencies(
    plugins: &[LoadedPlugin],
    graph: ProjectGraph,
    inputs: &DependencyInputs<'_>,
    progress: &dyn ProgressObserver,
) -> DependencyPhase {
    let capable: Vec<&LoadedPlugin> = plugins
        .iter()
        .filter(|p| p.capabilities().create_dependencies)
        .collect();

    let tasks = capable
        .iter()
        .map(|plugin| {
            let ctx = CreateDependenciesContext {
                workspace_root: inputs.workspace_root,
                projects: inputs.projects,
                file_map: inputs.file_map,
                files_to_process: inputs.files_to_process,
                external_nodes: inputs.external_nodes,
                options: plugin.options(),
            };
            let task = async move { plugin.plugin().create_dependencies(&ctx).await };
            (plugin.name().to_string(), task)
        })
        .collect();
    let results = settle_all(Phase::CreateDependencies, tasks, progress).await;

    let mut builder = GraphBuilder::from_graph(graph);
    let mut applied = Vec::new();
    let mut errors = Vec::new();

    for (plugin, result) in capable.iter().zip(results) {
        let deps = match result {
            Ok(deps) => deps,
            Err(cause) => {
                tracing::warn!("Plugin {} failed to create dependencies: {:#}", plugin.name(), cause);
                errors.push(BuildError::ProcessDependencies {
                    plugin: plugin.name().to_string(),
                    cause,
                });
                continue;
            }
        };

        tracing::debug!("Plugin {} contributed {} dependencies", plugin.name(), deps.len());
        for dep in deps {
            match builder.add_dependency(&dep.source, &dep.target, dep.kind, dep.source_file.clone()) {
                Ok(_) => applied.push(dep),
                Err(err) => {
                    tracing::warn!("Plugin {} contributed an invalid dependency: {}", plugin.name(), err);
                    errors.push(BuildError::ProcessDependencies {
                        plugin: plugin.name().to_string(),
                        cause: anyhow::Error::new(err),
                    });
                    break;
                }
            }
        }
    }

    DependencyPhase {
        graph: builder.into_graph(),
        applied,
        errors,
    }
}

/// Outcome of the metadata phase.
#[derive(Debug)]
pub struct MetadataPhase {
    pub graph: ProjectGraph,
    pub conflicts: Vec<MetadataConflict>,
    pub errors: Vec<BuildError>,
}

/// Run every metadata-capable plugin against `graph` and merge what they
/// return, strictly in plugin order.
pub async fn create_metadata(
    plugins: &[LoadedPlugin],
    graph: ProjectGraph,
    workspace_root: &Path,
    file_map: &FileMap,
    source_maps: &mut SourceMaps,
    policy: &MergePolicy,
    progress: &dyn ProgressObserver,
) -> MetadataPhase {
    let capable: Vec<&LoadedPlugin> = plugins
        .iter()
        .filter(|p| p.capabilities().create_metadata)
        .collect();

    let results = {
        let graph = &graph;
        let tasks = capable
            .iter()
            .map(|plugin| {
                let ctx = CreateMetadataContext {
                    workspace_root,
                    file_map,
                    options: plugin.options(),
                };
                let task = async move { plugin.plugin().create_metadata(graph, &ctx).await };
                (plugin.name().to_string(), task)
            })
            .collect();
        settle_all(Phase::CreateMetadata, tasks, progress).await
    };

    let mut builder = GraphBuilder::from_graph(graph);
    let mut conflicts = Vec::new();
    let mut errors = Vec::new();

    for (plugin, result) in capable.iter().zip(results) {
        let contributions = match result {
            Ok(contributions) => contributions,
            Err(cause) => {
                tracing::warn!("Plugin {} failed to create metadata: {:#}", plugin.name(), cause);
                errors.push(BuildError::CreateMetadata {
                    plugin: plugin.name().to_string(),
                    cause,
                });
                continue;
            }
        };

        for (project, update) in &contributions {
            let Some(node) = builder.project_node_mut(project) else {
                errors.push(BuildError::CreateMetadata {
                    plugin: plugin.name().to_string(),
                    cause: anyhow!("metadata for unknown project `{project}`"),
                });
                continue;
            };
            let source_map = source_maps.entry(project.clone()).or_default();
            conflicts.extend(merge_project_metadata(node, source_map, update, plugin.name(), policy));
        }
    }

    MetadataPhase {
        graph: builder.into_graph(),
        conflicts,
        errors,
    }
}
