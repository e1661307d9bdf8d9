//! Resolving plugin descriptors into runnable plugins

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use globset::{Glob, GlobMatcher};
use serde_json::Value;

use crate::descriptor::{FileFilter, PluginDescriptor, PluginSpec};
use crate::plugin::{Plugin, PluginCapabilities};
use crate::plugins::create_plugin;

#[derive(Debug, thiserror::Error)]
pub enum LoadPluginsError {
    #[error("unknown plugin `{0}`")]
    Unknown(String),

    #[error("invalid glob for plugin `{plugin}`: {source}")]
    InvalidGlob {
        plugin: String,
        source: globset::Error,
    },
}

/// A plugin paired with the descriptor it was loaded from.
#[derive(Clone)]
pub struct LoadedPlugin {
    plugin: Arc<dyn Plugin>,
    spec: PluginSpec,
    options: Value,
    filter: FileFilter,
    nodes_matcher: Option<GlobMatcher>,
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("name", &self.name())
            .field("capabilities", &self.capabilities())
            .field("spec", &self.spec)
            .finish()
    }
}

impl LoadedPlugin {
    pub fn new(plugin: Arc<dyn Plugin>, spec: PluginSpec) -> Result<Self, LoadPluginsError> {
        let invalid = |source| LoadPluginsError::InvalidGlob {
            plugin: spec.plugin.clone(),
            source,
        };
        let filter = spec.file_filter().map_err(invalid)?;
        let nodes_matcher = plugin
            .create_nodes_pattern()
            .map(|pattern| Glob::new(pattern).map(|glob| glob.compile_matcher()))
            .transpose()
            .map_err(invalid)?;
        let options = spec.options.clone().unwrap_or(Value::Null);
        Ok(LoadedPlugin {
            plugin,
            spec,
            options,
            filter,
            nodes_matcher,
        })
    }

    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    pub fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }

    pub fn capabilities(&self) -> PluginCapabilities {
        self.plugin.capabilities()
    }

    pub fn spec(&self) -> &PluginSpec {
        &self.spec
    }

    /// Descriptor options, `null` when none were given.
    pub fn options(&self) -> &Value {
        &self.options
    }

    /// Whether `create_nodes` should be called for `path`.
    pub fn wants_file(&self, path: &Path) -> bool {
        self.nodes_matcher
            .as_ref()
            .is_some_and(|matcher| matcher.is_match(path))
            && self.filter.matches(path)
    }
}

/// Known plugins by name: the built-ins plus anything registered.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    extra: BTreeMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `plugin` loadable under its own name, shadowing a built-in.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> &mut Self {
        self.extra.insert(plugin.name().to_string(), plugin);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Plugin>, LoadPluginsError> {
        if let Some(plugin) = self.extra.get(name) {
            return Ok(Arc::clone(plugin));
        }
        create_plugin(name).ok_or_else(|| LoadPluginsError::Unknown(name.to_string()))
    }

    /// Load every descriptor, in order. Fails on the first unknown plugin.
    pub fn load(&self, descriptors: &[PluginDescriptor]) -> Result<Vec<LoadedPlugin>, LoadPluginsError> {
        descriptors
            .iter()
            .map(|descriptor| {
                let spec = descriptor.normalize();
                let plugin = self.resolve(&spec.plugin)?;
                tracing::debug!("Loaded plugin {}", spec.plugin);
                LoadedPlugin::new(plugin, spec)
            })
            .collect()
    }
}

/// Load descriptors against the built-in plugins only.
pub fn load_plugins(descriptors: &[PluginDescriptor]) -> Result<Vec<LoadedPlugin>, LoadPluginsError> {
    PluginRegistry::new().load(descriptors)
}
