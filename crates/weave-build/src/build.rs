//! Top-level project graph construction

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use weave_core::{
    BuildError, CachedFileData, CombinedManifest, ExternalNode, FileData, FileDependency, FileMap, FileMapCache,
    GRAPH_VERSION, GraphBuilder, MergePolicy, MetadataConflict, Project, ProjectGraph, ProjectGraphError,
    SourceMaps, extract_cached_file_data, load_file_map_cache, restore_cached_dependencies,
    should_recompute_whole_graph,
};
use weave_plugins::LoadedPlugin;

use crate::config::{
    ConfigError, WorkspaceConfig, external_nodes_from_manifest, load_compiler_config, load_manifests,
};
use crate::files::{collect_workspace_files, fingerprint};
use crate::orchestrator::{DependencyInputs, create_dependencies, create_metadata};
use crate::progress::{NoopProgress, ProgressObserver};
use crate::retrieval::retrieve_project_configurations;
use crate::validate::{DefaultValidator, WorkspaceValidator};

/// Everything a build reads from the outside world.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceSnapshot {
    pub workspace_root: PathBuf,
    pub files: Vec<FileData>,
    pub external_nodes: Vec<ExternalNode>,
    pub manifest: CombinedManifest,
    pub workspace_config: Value,
    pub compiler_config: Value,
    /// The previous build's file map, if it may be reused.
    pub previous_cache: Option<FileMapCache>,
}

impl WorkspaceSnapshot {
    /// Read files, manifests and configuration from disk on the blocking
    /// thread pool.
    pub async fn load(root: &Path, config: &WorkspaceConfig, use_cache: bool) -> Result<Self, ConfigError> {
        let root = root.to_path_buf();
        let config = config.clone();
        tokio::task::spawn_blocking(move || Self::load_blocking(&root, &config, use_cache)).await?
    }

    fn load_blocking(root: &Path, config: &WorkspaceConfig, use_cache: bool) -> Result<Self, ConfigError> {
        let workspace_config = config.to_value()?;
        let manifest = load_manifests(root)?;
        let compiler_config = load_compiler_config(root, config)?;
        let paths = collect_workspace_files(root, None);
        let files = fingerprint(root, &paths);
        let previous_cache = if use_cache { load_file_map_cache(root) } else { None };

        tracing::info!("Found {} file(s) in {}", files.len(), root.display());
        Ok(WorkspaceSnapshot {
            workspace_root: root.to_path_buf(),
            files,
            external_nodes: external_nodes_from_manifest(&manifest),
            manifest,
            workspace_config,
            compiler_config,
            previous_cache,
        })
    }
}

/// Seams a build can be customised through.
#[derive(Clone)]
pub struct BuildOptions {
    pub progress: Arc<dyn ProgressObserver>,
    pub validator: Arc<dyn WorkspaceValidator>,
    pub merge_policy: MergePolicy,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            progress: Arc::new(NoopProgress),
            validator: Arc::new(DefaultValidator),
            merge_policy: MergePolicy::new(),
        }
    }
}

/// What one build produced. Feed `file_map_cache` to the next build.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub graph: ProjectGraph,
    pub file_map: FileMap,
    pub file_map_cache: FileMapCache,
    pub source_maps: SourceMaps,
    pub projects: Vec<Project>,
    /// Whether every file was handed to the dependency plugins.
    pub recomputed: bool,
    pub conflicts: Vec<MetadataConflict>,
}

/// Build the graph for `projects`, returning whatever was built along
/// with every error met on the way.
pub async fn build_project_graph(
    plugins: &[LoadedPlugin],
    snapshot: &WorkspaceSnapshot,
    projects: Vec<Project>,
    mut source_maps: SourceMaps,
    options: &BuildOptions,
) -> (BuildOutcome, Vec<BuildError>) {
    let mut file_map = FileMap::partition(&projects, snapshot.files.clone());

    let mut builder = GraphBuilder::new();
    let mut project_map: BTreeMap<String, Project> = BTreeMap::new();
    for project in &projects {
        if project_map.contains_key(&project.name) {
            tracing::debug!("Skipping duplicate project {} at {}", project.name, project.root.display());
            continue;
        }
        if let Err(e) = builder.add_project_node(project.clone()) {
            tracing::debug!("{}", e);
            continue;
        }
        project_map.insert(project.name.clone(), project.clone());
    }

    let mut external_nodes: BTreeMap<String, ExternalNode> = BTreeMap::new();
    for node in &snapshot.external_nodes {
        match builder.add_external_node(node.clone()) {
            Ok(()) => {
                external_nodes.entry(node.name.clone()).or_insert_with(|| node.clone());
            }
            Err(e) => tracing::warn!("{}", e),
        }
    }
    builder.set_version(GRAPH_VERSION);

    let recomputed = match &snapshot.previous_cache {
        None => true,
        Some(cache) => should_recompute_whole_graph(
            cache,
            &snapshot.manifest,
            &projects,
            &snapshot.workspace_config,
            &snapshot.compiler_config,
        ),
    };
    let (files_to_process, cached) = match (&snapshot.previous_cache, recomputed) {
        (Some(cache), false) => extract_cached_file_data(&file_map, cache),
        _ => (file_map.clone(), CachedFileData::default()),
    };
    tracing::info!(
        "Processing {} file(s), reusing {} from cache",
        files_to_process.len(),
        cached.len()
    );

    let inputs = DependencyInputs {
        workspace_root: &snapshot.workspace_root,
        projects: &project_map,
        file_map: &file_map,
        files_to_process: &files_to_process,
        external_nodes: &external_nodes,
    };
    let dependencies = create_dependencies(plugins, builder.into_graph(), &inputs, options.progress.as_ref()).await;
    let mut errors = dependencies.errors;

    record_file_dependencies(&mut file_map, &files_to_process, &dependencies.applied);
    let replay = restore_cached_dependencies(&mut file_map, &cached);
    let mut builder = GraphBuilder::from_graph(dependencies.graph);
    for dep in replay {
        let graph = builder.graph();
        if !graph.contains(&dep.source) || !graph.contains(&dep.target) {
            tracing::debug!("Dropping cached dependency {} -> {}", dep.source, dep.target);
            continue;
        }
        if let Err(e) = builder.add_dependency(&dep.source, &dep.target, dep.kind, dep.source_file) {
            tracing::debug!("Dropping cached dependency: {}", e);
        }
    }

    let metadata = create_metadata(
        plugins,
        builder.into_graph(),
        &snapshot.workspace_root,
        &file_map,
        &mut source_maps,
        &options.merge_policy,
        options.progress.as_ref(),
    )
    .await;
    errors.extend(metadata.errors);

    let file_map_cache = FileMapCache::new(
        snapshot.manifest.clone(),
        snapshot.workspace_config.clone(),
        snapshot.compiler_config.clone(),
        &projects,
        file_map.clone(),
    );
    tracing::info!(
        "Project graph: {} node(s), {} dependency edge(s)",
        metadata.graph.node_count(),
        metadata.graph.edge_count()
    );

    let outcome = BuildOutcome {
        graph: metadata.graph,
        file_map,
        file_map_cache,
        source_maps,
        projects,
        recomputed,
        conflicts: metadata.conflicts,
    };
    (outcome, errors)
}

/// Store what the dependency phase found against the files it came from.
/// Every processed file ends up with a (possibly empty) dependency list.
fn record_file_dependencies(file_map: &mut FileMap, processed: &FileMap, applied: &[weave_core::Dependency]) {
    let processed: HashSet<&Path> = processed.files().map(|f| f.file.as_path()).collect();
    for file in file_map.files_mut() {
        if processed.contains(file.file.as_path()) && file.deps.is_none() {
            file.deps = Some(Vec::new());
        }
    }

    for dep in applied {
        let Some(source_file) = &dep.source_file else {
            continue;
        };
        let Some(file) = file_map
            .project_file_map
            .get_mut(&dep.source)
            .and_then(|files| files.iter_mut().find(|f| &f.file == source_file))
        else {
            continue;
        };
        let entry = FileDependency {
            target: dep.target.clone(),
            kind: dep.kind,
        };
        let deps = file.deps.get_or_insert_with(Vec::new);
        if !deps.contains(&entry) {
            deps.push(entry);
        }
    }
}

/// Retrieve projects, validate them and build the graph. Errors from every
/// stage are collected into one [`ProjectGraphError`] carrying the partial
/// graph.
pub async fn create_project_graph(
    plugins: &[LoadedPlugin],
    snapshot: &WorkspaceSnapshot,
    options: &BuildOptions,
) -> Result<BuildOutcome, ProjectGraphError> {
    let paths: Vec<PathBuf> = snapshot.files.iter().map(|f| f.file.clone()).collect();
    let mut errors = Vec::new();

    let configurations = match retrieve_project_configurations(
        plugins,
        &snapshot.workspace_root,
        &paths,
        options.progress.as_ref(),
    )
    .await
    {
        Ok(configurations) => configurations,
        Err(e) => {
            errors.extend(e.errors);
            e.partial
        }
    };

    let projects = configurations.project_list();
    errors.extend(options.validator.validate(&projects));

    let source_maps = configurations.source_maps_by_name();
    let (outcome, build_errors) = build_project_graph(plugins, snapshot, projects, source_maps, options).await;
    errors.extend(build_errors);

    if errors.is_empty() {
        Ok(outcome)
    } else {
        tracing::warn!("Project graph built with {} error(s)", errors.len());
        Err(ProjectGraphError::new(errors, outcome.graph))
    }
}
