//! Plugin capability contract

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use weave_core::{Dependency, ExternalNode, FileMap, Metadata, MetadataUpdate, Project, ProjectGraph};

/// Which phases a plugin takes part in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PluginCapabilities {
    pub create_nodes: bool,
    pub create_dependencies: bool,
    pub create_metadata: bool,
}

impl PluginCapabilities {
    pub fn nodes() -> Self {
        PluginCapabilities {
            create_nodes: true,
            ..Default::default()
        }
    }

    pub fn dependencies() -> Self {
        PluginCapabilities {
            create_dependencies: true,
            ..Default::default()
        }
    }

    pub fn metadata() -> Self {
        PluginCapabilities {
            create_metadata: true,
            ..Default::default()
        }
    }

    pub fn with_dependencies(mut self) -> Self {
        self.create_dependencies = true;
        self
    }

    pub fn with_metadata(mut self) -> Self {
        self.create_metadata = true;
        self
    }
}

/// A (possibly partial) project configuration contributed by a node plugin.
///
/// Several plugins may describe the same root; their contributions are
/// merged in plugin order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfiguration {
    pub root: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub implicit_dependencies: Vec<String>,
    #[serde(default)]
    pub targets: Map<String, Value>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ProjectConfiguration {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ProjectConfiguration {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Context handed to `create_nodes`.
#[derive(Debug, Clone, Copy)]
pub struct CreateNodesContext<'a> {
    pub workspace_root: &'a Path,
    pub options: &'a Value,
}

/// Context handed to `create_dependencies`.
#[derive(Debug, Clone, Copy)]
pub struct CreateDependenciesContext<'a> {
    pub workspace_root: &'a Path,
    pub projects: &'a BTreeMap<String, Project>,
    /// Every file of the workspace.
    pub file_map: &'a FileMap,
    /// Only the files whose dependencies must be recomputed.
    pub files_to_process: &'a FileMap,
    pub external_nodes: &'a BTreeMap<String, ExternalNode>,
    pub options: &'a Value,
}

/// Context handed to `create_metadata`.
#[derive(Debug, Clone, Copy)]
pub struct CreateMetadataContext<'a> {
    pub workspace_root: &'a Path,
    pub file_map: &'a FileMap,
    pub options: &'a Value,
}

/// Project name to the metadata a plugin contributes to it.
pub type MetadataContributions = BTreeMap<String, MetadataUpdate>;

/// A pluggable contributor of project nodes, dependency edges or metadata.
///
/// Every method may be called concurrently with the same method of other
/// plugins. Methods outside the advertised [`PluginCapabilities`] are never
/// called by the orchestrator.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
    /// Get plugin name
    fn name(&self) -> &str;

    fn capabilities(&self) -> PluginCapabilities;

    /// Glob (workspace-relative) selecting the files `create_nodes` is called for.
    fn create_nodes_pattern(&self) -> Option<&str> {
        None
    }

    /// Describe the projects a single matching file declares.
    async fn create_nodes(&self, file: &Path, _ctx: &CreateNodesContext<'_>) -> Result<Vec<ProjectConfiguration>> {
        anyhow::bail!("plugin `{}` cannot create nodes (asked for {})", self.name(), file.display())
    }

    /// Dependencies found in `ctx.files_to_process`, in a stable order.
    async fn create_dependencies(&self, _ctx: &CreateDependenciesContext<'_>) -> Result<Vec<Dependency>> {
        anyhow::bail!("plugin `{}` cannot create dependencies", self.name())
    }

    /// Metadata for projects of the dependency-phase graph.
    async fn create_metadata(
        &self,
        _graph: &ProjectGraph,
        _ctx: &CreateMetadataContext<'_>,
    ) -> Result<MetadataContributions> {
        anyhow::bail!("plugin `{}` cannot create metadata", self.name())
    }
}
