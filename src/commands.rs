//! CLI command implementations

use std::path::PathBuf;

use weave_build::{
    BuildOptions, WorkspaceSnapshot, apply_exclusions, create_project_graph, find_incompatible_plugins,
    load_workspace_config, progress_for_environment,
};
use weave_core::ProjectGraph;
use weave_plugins::{PluginDescriptor, PluginRegistry, load_plugins};

pub async fn graph(root: PathBuf, json: bool, use_cache: bool, parallel: bool) -> anyhow::Result<()> {
    let config = load_workspace_config(&root)?;
    let plugins = load_plugins(&config.plugin_descriptors())?;
    let snapshot = WorkspaceSnapshot::load(&root, &config, use_cache).await?;
    let options = BuildOptions {
        progress: progress_for_environment(parallel),
        ..Default::default()
    };

    match create_project_graph(&plugins, &snapshot, &options).await {
        Ok(outcome) => {
            if use_cache {
                weave_core::save_file_map_cache(&outcome.file_map_cache, &root)?;
            }
            for conflict in &outcome.conflicts {
                tracing::debug!(
                    "{}: {} from {} replaced by {}",
                    conflict.project,
                    conflict.property,
                    conflict.previous.plugin,
                    conflict.winner.plugin
                );
            }
            print_graph(&outcome.graph, json)
        }
        Err(err) => {
            for error in &err.errors {
                tracing::error!("{}", error);
            }
            print_graph(&err.partial_graph, json)?;
            Err(err.into())
        }
    }
}

fn print_graph(graph: &ProjectGraph, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&graph.to_json())?);
        return Ok(());
    }

    for project in graph.projects() {
        println!("{} ({})", project.name(), project.project.root.display());
        for dep in graph.dependencies_of(project.name()) {
            println!("  -> {} [{:?}]", dep.target, dep.kind);
        }
    }
    tracing::info!(
        "{} project(s), {} external node(s), {} dependency edge(s)",
        graph.project_count(),
        graph.external_nodes().count(),
        graph.edge_count()
    );
    Ok(())
}

pub async fn probe(root: PathBuf, subtree: PathBuf, plugins: Vec<String>) -> anyhow::Result<()> {
    let descriptors = if plugins.is_empty() {
        load_workspace_config(&root)?.plugin_descriptors()
    } else {
        plugins.into_iter().map(PluginDescriptor::Name).collect()
    };

    let found = find_incompatible_plugins(&PluginRegistry::new(), &descriptors, &subtree, &root).await;
    if found.is_empty() {
        println!("All plugins are compatible with {}", subtree.display());
    }
    for (plugin, files) in &found {
        println!("{plugin}:");
        for file in files {
            println!("  {}", file.display());
        }
    }
    Ok(())
}

pub async fn exclude(root: PathBuf, subtree: PathBuf) -> anyhow::Result<()> {
    let descriptors = load_workspace_config(&root)?.plugin_descriptors();
    let found = find_incompatible_plugins(&PluginRegistry::new(), &descriptors, &subtree, &root).await;
    let changes = apply_exclusions(&root, &found)?;
    if changes.is_empty() {
        tracing::info!("Nothing to exclude");
    }
    Ok(())
}

pub fn clear(root: PathBuf) -> anyhow::Result<()> {
    tracing::info!("Clearing cache for: {}", root.display());

    weave_core::clear_cache(&root)?;

    tracing::info!("Cache cleared");
    Ok(())
}
