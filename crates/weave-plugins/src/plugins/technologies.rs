//! `technologies` metadata derived from file extensions

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use serde_json::{Value, json};
use weave_core::{Metadata, MetadataUpdate, ProjectGraph};

use crate::plugin::{CreateMetadataContext, MetadataContributions, Plugin, PluginCapabilities};

pub const NAME: &str = "technologies";

/// Metadata key this plugin writes.
pub const KEY: &str = "technologies";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Technology {
    Rust,
    TypeScript,
    JavaScript,
    Python,
    Go,
    Java,
    C,
    Cpp,
    Sql,
    Docker,
    Protobuf,
    GraphQL,
}

impl Technology {
    /// Detect technology from file extension. Data and docs formats have none.
    pub fn from_path(path: &Path) -> Option<Self> {
        let technology = match path.extension().and_then(|e| e.to_str()) {
            Some("rs") => Technology::Rust,
            Some("ts") | Some("tsx") | Some("mts") | Some("cts") => Technology::TypeScript,
            Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => Technology::JavaScript,
            Some("py") | Some("pyi") => Technology::Python,
            Some("go") => Technology::Go,
            Some("java") => Technology::Java,
            Some("c") | Some("h") => Technology::C,
            Some("cpp") | Some("cc") | Some("cxx") | Some("hpp") | Some("hh") => Technology::Cpp,
            Some("sql") => Technology::Sql,
            Some("proto") => Technology::Protobuf,
            Some("graphql") | Some("gql") => Technology::GraphQL,
            _ => {
                let is_dockerfile = path.file_name().is_some_and(|n| {
                    let s = n.to_string_lossy();
                    s == "Dockerfile" || s.starts_with("Dockerfile.")
                });
                if !is_dockerfile {
                    return None;
                }
                Technology::Docker
            }
        };
        Some(technology)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Technology::Rust => "rust",
            Technology::TypeScript => "typescript",
            Technology::JavaScript => "javascript",
            Technology::Python => "python",
            Technology::Go => "go",
            Technology::Java => "java",
            Technology::C => "c",
            Technology::Cpp => "cpp",
            Technology::Sql => "sql",
            Technology::Docker => "docker",
            Technology::Protobuf => "protobuf",
            Technology::GraphQL => "graphql",
        }
    }
}

pub struct TechnologiesPlugin;

#[async_trait::async_trait]
impl Plugin for TechnologiesPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::metadata()
    }

    async fn create_metadata(
        &self,
        graph: &ProjectGraph,
        ctx: &CreateMetadataContext<'_>,
    ) -> Result<MetadataContributions> {
        let mut contributions = MetadataContributions::new();
        for project in graph.projects() {
            let found: BTreeSet<Technology> = ctx
                .file_map
                .project_files(project.name())
                .iter()
                .filter_map(|f| Technology::from_path(&f.file))
                .collect();
            if found.is_empty() {
                continue;
            }

            let names: Vec<Value> = found.iter().map(|t| json!(t.as_str())).collect();
            let mut metadata = Metadata::new();
            metadata.insert(KEY.to_string(), Value::Array(names));
            contributions.insert(project.name().to_string(), MetadataUpdate::new(metadata));
        }
        Ok(contributions)
    }
}
