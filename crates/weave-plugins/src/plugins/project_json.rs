//! Projects declared by `project.json` files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use weave_core::Metadata;

use crate::plugin::{CreateNodesContext, Plugin, PluginCapabilities, ProjectConfiguration};

pub const NAME: &str = "project-json";

const PATTERN: &str = "**/project.json";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectJson {
    name: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    implicit_dependencies: Vec<String>,
    #[serde(default)]
    targets: Map<String, Value>,
    #[serde(default)]
    metadata: Metadata,
}

pub struct ProjectJsonPlugin;

#[async_trait::async_trait]
impl Plugin for ProjectJsonPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::nodes()
    }

    fn create_nodes_pattern(&self) -> Option<&str> {
        Some(PATTERN)
    }

    async fn create_nodes(&self, file: &Path, ctx: &CreateNodesContext<'_>) -> Result<Vec<ProjectConfiguration>> {
        let path = ctx.workspace_root.join(file);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let parsed: ProjectJson = serde_json::from_str(&content)
            .with_context(|| format!("invalid project.json at {}", file.display()))?;

        let root = file.parent().map(Path::to_path_buf).unwrap_or_else(PathBuf::new);
        Ok(vec![ProjectConfiguration {
            root,
            name: parsed.name,
            tags: parsed.tags,
            implicit_dependencies: parsed.implicit_dependencies,
            targets: parsed.targets,
            metadata: parsed.metadata,
        }])
    }
}
