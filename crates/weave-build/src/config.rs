//! `weave.json` workspace configuration and related manifests

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use weave_core::{CACHE_DIR, CombinedManifest, ExternalNode, PackageManifest, combine_manifests};
use weave_plugins::{PluginDescriptor, PluginSpec};

/// Workspace configuration file name.
pub const WORKSPACE_CONFIG_FILE: &str = "weave.json";

/// Compiler configuration consulted when `compilerConfig` is not set.
pub const DEFAULT_COMPILER_CONFIG: &str = "tsconfig.base.json";

/// Plugins used when the workspace configuration lists none.
pub const DEFAULT_PLUGINS: &[&str] = &["project-json", "imports", "implicit", "technologies"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to serialize workspace configuration: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("workspace scan did not complete: {0}")]
    Scan(#[from] tokio::task::JoinError),
}

/// The `weave.json` document. Unknown keys are preserved on rewrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Vec<PluginDescriptor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler_config: Option<String>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl WorkspaceConfig {
    /// Configured plugins, or the built-in defaults.
    pub fn plugin_descriptors(&self) -> Vec<PluginDescriptor> {
        match &self.plugins {
            Some(plugins) => plugins.clone(),
            None => DEFAULT_PLUGINS.iter().map(|name| PluginDescriptor::from(*name)).collect(),
        }
    }

    /// The document as a JSON value, for cache comparisons.
    pub fn to_value(&self) -> Result<Value, ConfigError> {
        Ok(serde_json::to_value(self)?)
    }
}

pub fn workspace_config_path(root: &Path) -> PathBuf {
    root.join(WORKSPACE_CONFIG_FILE)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Load `weave.json`. A missing file is the default configuration.
pub fn load_workspace_config(root: &Path) -> Result<WorkspaceConfig, ConfigError> {
    Ok(read_json(&workspace_config_path(root))?.unwrap_or_default())
}

/// Load the compiler root configuration, `null` when there is none.
pub fn load_compiler_config(root: &Path, config: &WorkspaceConfig) -> Result<Value, ConfigError> {
    let file = config.compiler_config.as_deref().unwrap_or(DEFAULT_COMPILER_CONFIG);
    Ok(read_json(&root.join(file))?.unwrap_or(Value::Null))
}

/// Combined declared dependencies of the root `package.json` and the
/// installation-local one under the cache directory.
pub fn load_manifests(root: &Path) -> Result<CombinedManifest, ConfigError> {
    let root_manifest: PackageManifest = read_json(&root.join("package.json"))?.unwrap_or_default();
    let installation: Option<PackageManifest> = read_json(&root.join(CACHE_DIR).join("installation").join("package.json"))?;
    Ok(combine_manifests(&root_manifest, installation.as_ref()))
}

/// One external node per declared package.
pub fn external_nodes_from_manifest(manifest: &CombinedManifest) -> Vec<ExternalNode> {
    manifest
        .iter()
        .map(|(package, version)| ExternalNode::npm(package.clone(), version.clone()))
        .collect()
}

/// Files newly excluded from a plugin by [`apply_exclusions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionChange {
    pub plugin: String,
    pub files: Vec<String>,
}

/// Add the incompatible files of each plugin to that plugin's `exclude`
/// list in `weave.json` and rewrite the document.
///
/// Nothing happens when the document is missing, unreadable or has no
/// plugin list, or when there is nothing to exclude.
pub fn apply_exclusions(
    root: &Path,
    incompatibilities: &BTreeMap<String, BTreeSet<PathBuf>>,
) -> Result<Vec<ExclusionChange>, ConfigError> {
    if incompatibilities.is_empty() {
        return Ok(Vec::new());
    }
    let path = workspace_config_path(root);
    let mut config: WorkspaceConfig = match read_json(&path) {
        Ok(Some(config)) => config,
        Ok(None) => return Ok(Vec::new()),
        Err(e) => {
            tracing::debug!("Not applying exclusions: {}", e);
            return Ok(Vec::new());
        }
    };
    let Some(plugins) = config.plugins.as_mut() else {
        return Ok(Vec::new());
    };

    let mut changes = Vec::new();
    for (plugin, files) in incompatibilities {
        let Some(descriptor) = plugins.iter_mut().find(|d| d.name() == plugin) else {
            tracing::debug!("Plugin {} is not configured, nothing to exclude", plugin);
            continue;
        };

        let mut spec: PluginSpec = descriptor.normalize();
        let mut exclude: BTreeSet<String> = spec.exclude.take().unwrap_or_default().into_iter().collect();
        let added: Vec<String> = files
            .iter()
            .map(|f| f.to_string_lossy().replace('\\', "/"))
            .filter(|f| exclude.insert(f.clone()))
            .collect();
        spec.exclude = Some(exclude.into_iter().collect());
        if added.is_empty() {
            continue;
        }

        *descriptor = PluginDescriptor::Spec(spec);
        tracing::warn!(
            "Plugin {} is incompatible with this workspace and will ignore: {}",
            plugin,
            added.join(", ")
        );
        changes.push(ExclusionChange {
            plugin: plugin.clone(),
            files: added,
        });
    }

    if !changes.is_empty() {
        let json_str = serde_json::to_string_pretty(&config)?;
        std::fs::write(&path, json_str + "\n").map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
    }
    Ok(changes)
}
