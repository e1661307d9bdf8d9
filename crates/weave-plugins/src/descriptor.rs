//! Plugin descriptors as written in workspace configuration

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A plugin entry: either a bare name or a structured record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PluginDescriptor {
    Name(String),
    Spec(PluginSpec),
}

/// The canonical, structured form of a plugin entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    pub plugin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<String>>,
}

impl PluginSpec {
    pub fn new(plugin: impl Into<String>) -> Self {
        PluginSpec {
            plugin: plugin.into(),
            ..Default::default()
        }
    }

    /// Compile `include`/`exclude` into a matcher.
    pub fn file_filter(&self) -> Result<FileFilter, globset::Error> {
        Ok(FileFilter {
            include: self.include.as_deref().map(build_glob_set).transpose()?,
            exclude: self.exclude.as_deref().map(build_glob_set).transpose()?,
        })
    }
}

impl PluginDescriptor {
    pub fn name(&self) -> &str {
        match self {
            PluginDescriptor::Name(name) => name,
            PluginDescriptor::Spec(spec) => &spec.plugin,
        }
    }

    /// Structured copy of this entry. The descriptor itself is left as is.
    pub fn normalize(&self) -> PluginSpec {
        match self {
            PluginDescriptor::Name(name) => PluginSpec::new(name.clone()),
            PluginDescriptor::Spec(spec) => spec.clone(),
        }
    }
}

impl From<&str> for PluginDescriptor {
    fn from(name: &str) -> Self {
        PluginDescriptor::Name(name.to_string())
    }
}

impl From<PluginSpec> for PluginDescriptor {
    fn from(spec: PluginSpec) -> Self {
        PluginDescriptor::Spec(spec)
    }
}

pub fn normalize_descriptors(descriptors: &[PluginDescriptor]) -> Vec<PluginSpec> {
    descriptors.iter().map(PluginDescriptor::normalize).collect()
}

/// Include/exclude globs from a plugin descriptor.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl FileFilter {
    /// A file passes when it matches `include` (if any) and not `exclude`.
    pub fn matches(&self, path: &Path) -> bool {
        if let Some(include) = &self.include {
            if !include.is_match(path) {
                return false;
            }
        }
        match &self.exclude {
            Some(exclude) => !exclude.is_match(path),
            None => true,
        }
    }
}

pub(crate) fn build_glob_set(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}
