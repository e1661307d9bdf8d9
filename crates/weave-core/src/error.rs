//! Error taxonomy for graph construction

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::graph::ProjectGraph;
use crate::model::ProjectConfigurations;

/// Structural invariant violations raised by the graph builder.
///
/// These indicate a plugin (or caller) handed the builder something that
/// cannot exist in a well-formed graph. They are never recovered from
/// silently: the orchestrator turns them into a failure of the plugin that
/// produced them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A dependency endpoint is not a node of the graph.
    #[error("dependency {from} -> {to} references unknown node `{missing}`")]
    UnknownNode {
        from: String,
        to: String,
        missing: String,
    },

    /// Dependencies must start at a project, never at an external node.
    #[error("dependency source `{0}` is not a project")]
    SourceNotProject(String),

    /// Two projects with the same name.
    #[error("project `{0}` is already part of the graph")]
    DuplicateProject(String),

    /// An external node re-added with different package data.
    #[error("external node `{name}` already exists with different data")]
    ConflictingExternalNode { name: String },
}

/// One failure observed while building the graph.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The declared project set is structurally invalid.
    #[error("invalid workspace: {message}")]
    WorkspaceValidity {
        message: String,
        projects: Vec<String>,
    },

    /// A dependency plugin failed, or contributed an invalid edge.
    #[error("plugin `{plugin}` failed to process dependencies: {cause:#}")]
    ProcessDependencies {
        plugin: String,
        cause: anyhow::Error,
    },

    /// A metadata plugin failed, or contributed metadata for an unknown project.
    #[error("plugin `{plugin}` failed to create metadata: {cause:#}")]
    CreateMetadata {
        plugin: String,
        cause: anyhow::Error,
    },

    /// A node plugin failed on some of the files it was given.
    #[error("plugin `{plugin}` failed to create nodes for {count} file(s)", count = .errors.len())]
    AggregateCreateNodes {
        plugin: String,
        errors: Vec<(PathBuf, anyhow::Error)>,
    },

    /// A node plugin's contribution clashed with what was already merged.
    #[error("plugin `{plugin}` produced conflicting nodes in {}: {cause:#}", .file.display())]
    MergeNodes {
        plugin: String,
        file: PathBuf,
        cause: anyhow::Error,
    },

    /// Project configurations that never received a name.
    #[error("projects without a name at: {}", join_paths(.roots))]
    ProjectsWithNoName { roots: Vec<PathBuf> },
}

impl BuildError {
    /// The plugin this error is attributed to, if any.
    pub fn plugin(&self) -> Option<&str> {
        match self {
            BuildError::ProcessDependencies { plugin, .. }
            | BuildError::CreateMetadata { plugin, .. }
            | BuildError::AggregateCreateNodes { plugin, .. }
            | BuildError::MergeNodes { plugin, .. } => Some(plugin),
            BuildError::WorkspaceValidity { .. } | BuildError::ProjectsWithNoName { .. } => None,
        }
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| display_root(p))
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_root(path: &Path) -> String {
    if path.as_os_str().is_empty() {
        ".".to_string()
    } else {
        path.display().to_string()
    }
}

fn summarize(headline: &str, errors: &[BuildError]) -> String {
    let mut out = format!("{headline} ({} error(s))", errors.len());
    for error in errors {
        let _ = write!(out, "\n  - {error}");
    }
    out
}

/// Project configuration retrieval failed; carries whatever was merged.
#[derive(Debug, thiserror::Error)]
#[error("{}", summarize("failed to retrieve project configurations", .errors))]
pub struct ProjectConfigurationsError {
    pub errors: Vec<BuildError>,
    pub partial: ProjectConfigurations,
}

/// Graph construction failed; carries the best-effort graph.
#[derive(Debug, thiserror::Error)]
#[error("{}", summarize("failed to build the project graph", .errors))]
pub struct ProjectGraphError {
    pub errors: Vec<BuildError>,
    pub partial_graph: ProjectGraph,
}

impl ProjectGraphError {
    pub fn new(errors: Vec<BuildError>, partial_graph: ProjectGraph) -> Self {
        ProjectGraphError {
            errors,
            partial_graph,
        }
    }
}

/// Errors from reading or writing the on-disk cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize cache: {0}")]
    Serialization(#[from] serde_json::Error),
}
