//! Integration tests for Weave
//!
//! These tests verify that multiple systems work together correctly.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;
use weave_build::{BuildOptions, WorkspaceSnapshot, create_project_graph, load_workspace_config};
use weave_core::{Dependency, DependencyType, ProjectGraph};
use weave_plugins::{
    CreateDependenciesContext, LoadedPlugin, Plugin, PluginCapabilities, PluginDescriptor, PluginRegistry,
};

fn write(root: &Path, file: &str, content: &str) {
    let path = root.join(file);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn create_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "weave.json", r#"{ "plugins": ["project-json", "imports", "technologies"] }"#);
    write(root, "package.json", r#"{ "devDependencies": { "lodash": "4.17.21" } }"#);
    write(root, "apps/site/project.json", r#"{ "name": "site" }"#);
    write(
        root,
        "apps/site/src/app.js",
        "const _ = require('lodash');\nconst core = require('core');\n",
    );
    write(root, "libs/core/project.json", r#"{ "name": "core", "tags": ["scope:core"] }"#);
    write(root, "libs/core/src/lib.rs", "pub fn core() {}\n");
    dir
}

fn weave(root: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_weave"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env("CI", "1")
        .output()
        .expect("Failed to execute weave")
}

/// Test that the CLI can be invoked
#[test]
fn test_cli_invocation() {
    let output = Command::new(env!("CARGO_BIN_EXE_weave"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Incremental project graph for multi-project workspaces"));
}

/// Test that the graph command builds, prints and caches the graph
#[test]
fn test_graph_command() {
    let dir = create_workspace();
    let output = weave(dir.path(), &["graph", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let graph: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(graph["version"], "1.0");
    assert_eq!(graph["nodes"]["core"]["data"]["tags"][0], "scope:core");
    assert_eq!(graph["nodes"]["core"]["data"]["metadata"]["technologies"][0], "rust");
    assert!(graph["externalNodes"]["npm:lodash"].is_object());

    let targets: Vec<&str> = graph["dependencies"]["site"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["target"].as_str().unwrap())
        .collect();
    assert_eq!(targets, vec!["npm:lodash", "core"]);

    assert!(dir.path().join(".weave/file-map.json").exists());

    // A second run reuses the cache and produces the same graph
    let again = weave(dir.path(), &["graph", "--json"]);
    assert_eq!(serde_json::from_slice::<Value>(&again.stdout).unwrap(), graph);

    let cleared = weave(dir.path(), &["clear"]);
    assert!(cleared.status.success());
    assert!(!dir.path().join(".weave").exists());
}

/// Test that a broken project file surfaces as a failure with a partial graph
#[test]
fn test_graph_command_reports_errors() {
    let dir = create_workspace();
    write(dir.path(), "libs/broken/project.json", "{ nope");

    let output = weave(dir.path(), &["graph", "--json", "--no-cache"]);
    assert!(!output.status.success());
    let graph: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(graph["nodes"]["site"].is_object());
    assert!(!dir.path().join(".weave").exists());
}

/// Test that exclude writes incompatible files back into weave.json
#[test]
fn test_exclude_command() {
    let dir = create_workspace();
    write(dir.path(), "vendor/old/project.json", "not json at all");

    let output = weave(dir.path(), &["exclude", "vendor"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let config: Value = serde_json::from_str(&fs::read_to_string(dir.path().join("weave.json")).unwrap()).unwrap();
    assert_eq!(config["plugins"][0]["plugin"], "project-json");
    assert_eq!(config["plugins"][0]["exclude"][0], "vendor/old/project.json");

    // Once excluded, the workspace builds again
    let output = weave(dir.path(), &["graph", "--no-cache"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
}

struct DocsPlugin;

#[async_trait::async_trait]
impl Plugin for DocsPlugin {
    fn name(&self) -> &str {
        "docs"
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::dependencies()
    }

    async fn create_dependencies(&self, ctx: &CreateDependenciesContext<'_>) -> anyhow::Result<Vec<Dependency>> {
        Ok(ctx
            .projects
            .keys()
            .filter(|name| name.as_str() != "core")
            .map(|name| Dependency::new(name, "core", DependencyType::Implicit))
            .collect())
    }
}

fn build(root: &Path, plugins: &[LoadedPlugin]) -> ProjectGraph {
    let config = load_workspace_config(root).unwrap();
    tokio_test::block_on(async {
        let snapshot = WorkspaceSnapshot::load(root, &config, false).await.unwrap();
        create_project_graph(plugins, &snapshot, &BuildOptions::default())
            .await
            .unwrap()
            .graph
    })
}

/// Test that plugins registered by the embedding application run alongside built-ins
#[test]
fn test_registered_plugin() {
    let dir = create_workspace();
    let mut registry = PluginRegistry::new();
    registry.register(Arc::new(DocsPlugin));

    let descriptors: Vec<PluginDescriptor> = vec!["project-json".into(), "docs".into()];
    let plugins = registry.load(&descriptors).unwrap();
    let graph = build(dir.path(), &plugins);

    let deps = graph.dependencies_of("site");
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].target, "core");
    assert_eq!(deps[0].kind, DependencyType::Implicit);
}
