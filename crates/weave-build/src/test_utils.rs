//! Test utilities for weave-build

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tempfile::TempDir;
use weave_core::{Dependency, Metadata, MetadataUpdate, ProjectGraph};
use weave_plugins::{
    CreateDependenciesContext, CreateMetadataContext, CreateNodesContext, LoadedPlugin, MetadataContributions, Plugin,
    PluginCapabilities, PluginSpec, ProjectConfiguration,
};

use crate::progress::{Phase, ProgressObserver};

pub fn loaded(plugin: impl Plugin + 'static) -> LoadedPlugin {
    let name = plugin.name().to_string();
    LoadedPlugin::new(Arc::new(plugin), PluginSpec::new(name)).unwrap()
}

/// Returns canned dependencies (or a canned failure) after `delay`.
pub struct DependencyFake {
    pub name: String,
    pub delay: Duration,
    pub result: std::result::Result<Vec<Dependency>, String>,
}

impl DependencyFake {
    pub fn ok(name: &str, deps: Vec<Dependency>) -> Self {
        DependencyFake {
            name: name.to_string(),
            delay: Duration::ZERO,
            result: Ok(deps),
        }
    }

    pub fn failing(name: &str, message: &str) -> Self {
        DependencyFake {
            name: name.to_string(),
            delay: Duration::ZERO,
            result: Err(message.to_string()),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl Plugin for DependencyFake {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::dependencies()
    }

    async fn create_dependencies(&self, _ctx: &CreateDependenciesContext<'_>) -> Result<Vec<Dependency>> {
        tokio::time::sleep(self.delay).await;
        self.result.clone().map_err(anyhow::Error::msg)
    }
}

/// Wraps a dependency plugin and records which files each call was asked
/// to process.
pub struct RecordingDependencies {
    pub inner: Arc<dyn Plugin>,
    pub seen: Arc<Mutex<Vec<Vec<PathBuf>>>>,
}

impl RecordingDependencies {
    pub fn new(inner: Arc<dyn Plugin>) -> Self {
        RecordingDependencies {
            inner,
            seen: Arc::default(),
        }
    }
}

#[async_trait::async_trait]
impl Plugin for RecordingDependencies {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> PluginCapabilities {
        self.inner.capabilities()
    }

    async fn create_dependencies(&self, ctx: &CreateDependenciesContext<'_>) -> Result<Vec<Dependency>> {
        let mut files: Vec<PathBuf> = ctx.files_to_process.files().map(|f| f.file.clone()).collect();
        files.sort();
        self.seen.lock().unwrap().push(files);
        self.inner.create_dependencies(ctx).await
    }
}

/// Contributes fixed metadata per project after `delay`.
pub struct MetadataFake {
    pub name: String,
    pub delay: Duration,
    pub file: Option<PathBuf>,
    pub contributions: BTreeMap<String, Value>,
}

impl MetadataFake {
    pub fn new(name: &str, contributions: &[(&str, Value)]) -> Self {
        MetadataFake {
            name: name.to_string(),
            delay: Duration::ZERO,
            file: None,
            contributions: contributions
                .iter()
                .map(|(project, value)| (project.to_string(), value.clone()))
                .collect(),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn from_file(mut self, file: &str) -> Self {
        self.file = Some(PathBuf::from(file));
        self
    }
}

#[async_trait::async_trait]
impl Plugin for MetadataFake {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::metadata()
    }

    async fn create_metadata(
        &self,
        _graph: &ProjectGraph,
        _ctx: &CreateMetadataContext<'_>,
    ) -> Result<MetadataContributions> {
        tokio::time::sleep(self.delay).await;
        let mut out = MetadataContributions::new();
        for (project, value) in &self.contributions {
            let metadata: Metadata = serde_json::from_value(value.clone())?;
            let mut update = MetadataUpdate::new(metadata);
            update.file = self.file.clone();
            out.insert(project.clone(), update);
        }
        Ok(out)
    }
}

/// Answers `create_nodes` from a table keyed by file.
pub struct NodesFake {
    pub name: String,
    pub pattern: String,
    pub nodes: BTreeMap<PathBuf, std::result::Result<Vec<ProjectConfiguration>, String>>,
}

impl NodesFake {
    pub fn new(name: &str, pattern: &str) -> Self {
        NodesFake {
            name: name.to_string(),
            pattern: pattern.to_string(),
            nodes: BTreeMap::new(),
        }
    }

    pub fn with(mut self, file: &str, configs: Vec<ProjectConfiguration>) -> Self {
        self.nodes.insert(PathBuf::from(file), Ok(configs));
        self
    }

    pub fn failing_on(mut self, file: &str, message: &str) -> Self {
        self.nodes.insert(PathBuf::from(file), Err(message.to_string()));
        self
    }
}

#[async_trait::async_trait]
impl Plugin for NodesFake {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::nodes()
    }

    fn create_nodes_pattern(&self) -> Option<&str> {
        Some(self.pattern.as_str())
    }

    async fn create_nodes(&self, file: &Path, _ctx: &CreateNodesContext<'_>) -> Result<Vec<ProjectConfiguration>> {
        match self.nodes.get(file) {
            Some(Ok(configs)) => Ok(configs.clone()),
            Some(Err(message)) => Err(anyhow::anyhow!("{message}")),
            None => Ok(Vec::new()),
        }
    }
}

/// Records every progress callback.
#[derive(Default)]
pub struct RecordingProgress {
    pub grace: Duration,
    pub messages: Mutex<Vec<String>>,
    pub finished: Mutex<Vec<Phase>>,
}

impl RecordingProgress {
    pub fn new(grace: Duration) -> Self {
        RecordingProgress {
            grace,
            ..Default::default()
        }
    }
}

impl ProgressObserver for RecordingProgress {
    fn grace_period(&self) -> Option<Duration> {
        Some(self.grace)
    }

    fn waiting(&self, _phase: Phase, outstanding: &[String]) {
        self.messages
            .lock()
            .unwrap()
            .push(crate::progress::waiting_message(outstanding));
    }

    fn finished(&self, phase: Phase) {
        self.finished.lock().unwrap().push(phase);
    }
}

pub fn write(root: &Path, file: &str, content: &str) {
    let path = root.join(file);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Create a temporary workspace with three projects wired together by
/// imports, an implicit dependency and one external package
pub fn create_test_workspace() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    write(
        root,
        "weave.json",
        r#"{ "plugins": ["project-json", "imports", "implicit", "technologies"], "namedInputs": { "default": ["{projectRoot}/**/*"] } }"#,
    );
    write(root, "package.json", r#"{ "dependencies": { "react": "18.2.0" } }"#);

    write(
        root,
        "apps/web/project.json",
        r#"{ "name": "web", "implicitDependencies": ["shared"], "targets": { "build": { "command": "vite build" } } }"#,
    );
    write(
        root,
        "apps/web/src/main.tsx",
        r#"
import React from 'react';
import { Button } from 'ui';
"#,
    );

    write(root, "libs/ui/project.json", r#"{ "name": "ui", "tags": ["type:ui"] }"#);
    write(
        root,
        "libs/ui/src/index.ts",
        r#"
import { format } from '../../shared/src/format';
export const Button = () => format('button');
"#,
    );

    write(root, "libs/shared/project.json", r#"{ "name": "shared" }"#);
    write(
        root,
        "libs/shared/src/format.ts",
        "export const format = (s: string) => s.trim();\n",
    );

    temp_dir
}
