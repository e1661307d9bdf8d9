//! Unit tests for weave-core module

use crate::*;
use serde_json::{Value, json};
use std::path::PathBuf;

fn metadata(value: Value) -> Metadata {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn two_projects() -> GraphBuilder {
    let mut builder = GraphBuilder::new();
    builder.add_project_node(Project::new("app", "apps/app")).unwrap();
    builder.add_project_node(Project::new("lib", "libs/lib")).unwrap();
    builder
        .add_external_node(ExternalNode::npm("react", "18.2.0"))
        .unwrap();
    builder
}

#[test]
fn test_duplicate_project_rejected() {
    let mut builder = two_projects();
    let err = builder
        .add_project_node(Project::new("app", "elsewhere"))
        .unwrap_err();
    assert_eq!(err, GraphError::DuplicateProject("app".to_string()));
    assert_eq!(builder.graph().project_count(), 2);
}

#[test]
fn test_external_node_conflicts() {
    let mut builder = two_projects();

    // Same data again is fine
    assert!(builder.add_external_node(ExternalNode::npm("react", "18.2.0")).is_ok());

    let err = builder
        .add_external_node(ExternalNode::npm("react", "17.0.0"))
        .unwrap_err();
    assert!(matches!(err, GraphError::ConflictingExternalNode { ref name } if name == "npm:react"));
    assert_eq!(builder.graph().external_nodes().count(), 1);
}

#[test]
fn test_unknown_endpoint_fails() {
    let mut builder = two_projects();
    let err = builder
        .add_dependency("app", "ghost", DependencyType::Static, None)
        .unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"dependency app -> ghost references unknown node `ghost`");

    let err = builder
        .add_dependency("npm:react", "app", DependencyType::Static, None)
        .unwrap_err();
    assert_eq!(err, GraphError::SourceNotProject("npm:react".to_string()));
    assert_eq!(builder.graph().edge_count(), 0);
}

#[test]
fn test_identical_edges_are_deduplicated() {
    let mut builder = two_projects();
    let file = Some(PathBuf::from("apps/app/main.ts"));

    assert!(builder.add_dependency("app", "lib", DependencyType::Static, file.clone()).unwrap());
    assert!(!builder.add_dependency("app", "lib", DependencyType::Static, file.clone()).unwrap());
    // Different type or file is a distinct edge
    assert!(builder.add_dependency("app", "lib", DependencyType::Dynamic, file).unwrap());
    assert!(builder.add_dependency("app", "lib", DependencyType::Static, None).unwrap());
    // Self edges are dropped
    assert!(!builder.add_dependency("app", "app", DependencyType::Implicit, None).unwrap());

    assert_eq!(builder.graph().edge_count(), 3);
}

#[test]
fn test_dependencies_keep_insertion_order() {
    let mut builder = two_projects();
    builder.add_dependency("app", "npm:react", DependencyType::Static, None).unwrap();
    builder.add_dependency("app", "lib", DependencyType::Implicit, None).unwrap();

    let graph = builder.snapshot();
    let targets: Vec<_> = graph
        .dependencies_of("app")
        .into_iter()
        .map(|d| d.target.as_str())
        .collect();
    assert_eq!(targets, vec!["npm:react", "lib"]);
    assert!(graph.dependencies_of("lib").is_empty());
}

#[test]
fn test_staged_builder_leaves_snapshot_untouched() {
    let mut builder = two_projects();
    builder.set_version(GRAPH_VERSION);
    let nodes_only = builder.snapshot();

    let mut next = GraphBuilder::from_graph(nodes_only.clone());
    next.add_dependency("app", "lib", DependencyType::Static, None).unwrap();
    let with_deps = next.into_graph();

    assert_eq!(nodes_only.edge_count(), 0);
    assert_eq!(with_deps.edge_count(), 1);
    assert_eq!(with_deps.version(), Some(GRAPH_VERSION));
    assert!(with_deps.project("lib").is_some());
    assert!(with_deps.project("npm:react").is_none());
    assert!(with_deps.external_node("npm:react").is_some());
}

#[test]
fn test_graph_json_rendering() {
    let mut builder = two_projects();
    builder.add_dependency("app", "lib", DependencyType::Static, None).unwrap();
    let rendered = builder.snapshot().to_json();

    assert_eq!(rendered["nodes"]["app"]["type"], "project");
    assert_eq!(rendered["externalNodes"]["npm:react"]["data"]["version"], "18.2.0");
    assert_eq!(rendered["dependencies"]["app"][0]["type"], "static");
}

#[test]
fn test_file_map_partition_prefers_deepest_root() {
    let projects = vec![Project::new("outer", "libs"), Project::new("inner", "libs/inner")];
    let files = vec![
        FileData::new("libs/inner/index.ts", "1"),
        FileData::new("libs/shared.ts", "2"),
        FileData::new("README.md", "3"),
    ];
    let file_map = FileMap::partition(&projects, files);

    assert_eq!(file_map.project_files("inner")[0].file, PathBuf::from("libs/inner/index.ts"));
    assert_eq!(file_map.project_files("outer")[0].file, PathBuf::from("libs/shared.ts"));
    assert_eq!(file_map.non_project_files.len(), 1);
    assert_eq!(file_map.owner_of(&PathBuf::from("libs/shared.ts")), Some("outer"));
    assert_eq!(file_map.len(), 3);
}

// ── Cache decisions ─────────────────────────────────────────

struct Inputs {
    manifest: CombinedManifest,
    projects: Vec<Project>,
    workspace_config: Value,
    compiler_config: Value,
}

fn baseline() -> Inputs {
    let root = PackageManifest {
        dependencies: [("react".to_string(), "18.2.0".to_string())].into(),
        dev_dependencies: [("jest".to_string(), "29.0.0".to_string())].into(),
    };
    Inputs {
        manifest: combine_manifests(&root, None),
        projects: vec![Project::new("app", "apps/app"), Project::new("lib", "libs/lib")],
        workspace_config: json!({ "plugins": ["imports"] }),
        compiler_config: json!({ "compilerOptions": { "paths": {} } }),
    }
}

fn cache_for(inputs: &Inputs, file_map: FileMap) -> FileMapCache {
    FileMapCache::new(
        inputs.manifest.clone(),
        inputs.workspace_config.clone(),
        inputs.compiler_config.clone(),
        &inputs.projects,
        file_map,
    )
}

fn recompute(cache: &FileMapCache, inputs: &Inputs) -> bool {
    should_recompute_whole_graph(
        cache,
        &inputs.manifest,
        &inputs.projects,
        &inputs.workspace_config,
        &inputs.compiler_config,
    )
}

#[test]
fn test_unchanged_inputs_allow_reuse() {
    let inputs = baseline();
    let cache = cache_for(&inputs, FileMap::new());
    assert!(!recompute(&cache, &inputs));
}

#[test]
fn test_manifest_change_forces_recompute() {
    let cache = cache_for(&baseline(), FileMap::new());

    let mut inputs = baseline();
    let installation = PackageManifest {
        dependencies: [("lodash".to_string(), "4.17.21".to_string())].into(),
        ..Default::default()
    };
    let root = PackageManifest {
        dependencies: [("react".to_string(), "18.2.0".to_string())].into(),
        dev_dependencies: [("jest".to_string(), "29.0.0".to_string())].into(),
    };
    inputs.manifest = combine_manifests(&root, Some(&installation));
    assert!(recompute(&cache, &inputs));

    let mut inputs = baseline();
    inputs.manifest.insert("jest".to_string(), "30.0.0".to_string());
    assert!(recompute(&cache, &inputs));
}

#[test]
fn test_workspace_config_change_forces_recompute() {
    let cache = cache_for(&baseline(), FileMap::new());
    let mut inputs = baseline();
    inputs.workspace_config = json!({ "plugins": ["imports", "implicit"] });
    assert!(recompute(&cache, &inputs));
}

#[test]
fn test_compiler_config_change_forces_recompute() {
    let cache = cache_for(&baseline(), FileMap::new());
    let mut inputs = baseline();
    inputs.compiler_config = json!({ "compilerOptions": { "paths": { "@lib": ["libs/lib"] } } });
    assert!(recompute(&cache, &inputs));
}

#[test]
fn test_project_set_change_forces_recompute() {
    let cache = cache_for(&baseline(), FileMap::new());

    let mut inputs = baseline();
    inputs.projects.push(Project::new("extra", "libs/extra"));
    assert!(recompute(&cache, &inputs));

    // Moving a project does not change the name set
    let mut inputs = baseline();
    inputs.projects[1].root = PathBuf::from("packages/lib");
    assert!(!recompute(&cache, &inputs));
}

#[test]
fn test_stale_cache_version_forces_recompute() {
    let inputs = baseline();
    let mut cache = cache_for(&inputs, FileMap::new());
    cache.version = "0".to_string();
    assert!(recompute(&cache, &inputs));
}

fn resolved(file: &str, hash: &str, targets: &[&str]) -> FileData {
    let mut data = FileData::new(file, hash);
    data.deps = Some(
        targets
            .iter()
            .map(|t| FileDependency {
                target: t.to_string(),
                kind: DependencyType::Static,
            })
            .collect(),
    );
    data
}

#[test]
fn test_extract_partitions_by_fingerprint() {
    let inputs = baseline();
    let previous = FileMap::partition(
        &inputs.projects,
        vec![
            resolved("apps/app/main.ts", "a1", &["lib"]),
            resolved("apps/app/util.ts", "u1", &[]),
            resolved("README.md", "r1", &[]),
        ],
    );
    let cache = cache_for(&inputs, previous);

    let current = FileMap::partition(
        &inputs.projects,
        vec![
            FileData::new("apps/app/main.ts", "a1"),
            FileData::new("apps/app/util.ts", "u2"),
            FileData::new("apps/app/new.ts", "n1"),
            FileData::new("README.md", "r1"),
        ],
    );
    let (to_process, cached) = extract_cached_file_data(&current, &cache);

    let processed: Vec<_> = to_process.files().map(|f| f.file.clone()).collect();
    assert_eq!(
        processed,
        vec![PathBuf::from("apps/app/new.ts"), PathBuf::from("apps/app/util.ts")]
    );
    assert_eq!(cached.len(), 2);
    assert!(cached.get(Some("app"), &PathBuf::from("apps/app/main.ts")).is_some());
    assert!(cached.get(None, &PathBuf::from("README.md")).is_some());

    for file in to_process.files() {
        let owner = current.owner_of(&file.file);
        assert!(cached.get(owner, &file.file).is_none(), "{} is in both sets", file.file.display());
    }
}

#[test]
fn test_file_moved_between_projects_is_reprocessed() {
    let inputs = baseline();
    let cache = cache_for(
        &inputs,
        FileMap::partition(&inputs.projects, vec![resolved("apps/app/shared.ts", "s1", &[])]),
    );

    let mut current = FileMap::partition(&inputs.projects, vec![]);
    current
        .project_file_map
        .get_mut("lib")
        .unwrap()
        .push(FileData::new("apps/app/shared.ts", "s1"));

    let (to_process, cached) = extract_cached_file_data(&current, &cache);
    assert_eq!(to_process.project_files("lib").len(), 1);
    assert!(cached.is_empty());
}

#[test]
fn test_restore_copies_deps_and_returns_replay() {
    let inputs = baseline();
    let cache = cache_for(
        &inputs,
        FileMap::partition(&inputs.projects, vec![resolved("apps/app/main.ts", "a1", &["lib", "npm:react"])]),
    );
    let mut current = FileMap::partition(&inputs.projects, vec![FileData::new("apps/app/main.ts", "a1")]);
    let (_, cached) = extract_cached_file_data(&current, &cache);

    let replay = restore_cached_dependencies(&mut current, &cached);

    assert_eq!(current.project_files("app")[0].deps.as_ref().map(Vec::len), Some(2));
    assert_eq!(
        replay[0],
        Dependency::new("app", "lib", DependencyType::Static).with_source_file("apps/app/main.ts")
    );
    assert_eq!(replay[1].target, "npm:react");
}

#[test]
fn test_cache_save_and_load() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let inputs = baseline();
    let cache = cache_for(
        &inputs,
        FileMap::partition(&inputs.projects, vec![resolved("apps/app/main.ts", "a1", &["lib"])]),
    );

    assert!(load_file_map_cache(temp_dir.path()).is_none());
    save_file_map_cache(&cache, temp_dir.path()).unwrap();
    assert_eq!(load_file_map_cache(temp_dir.path()), Some(cache));

    std::fs::write(file_map_cache_path(temp_dir.path()), "{ not json").unwrap();
    assert!(load_file_map_cache(temp_dir.path()).is_none());

    clear_cache(temp_dir.path()).unwrap();
    assert!(!cache_dir(temp_dir.path()).exists());
}

// ── Metadata merging ────────────────────────────────────────

#[test]
fn test_later_plugin_wins_scalar() {
    let mut node = ProjectNode::new(Project::new("x", "libs/x"));
    let mut source_map = SourceMap::new();
    let policy = MergePolicy::default();

    let first = MetadataUpdate::new(metadata(json!({ "owner": "team-a" }))).from_file("libs/x/project.json");
    let second = MetadataUpdate::new(metadata(json!({ "owner": "team-b" })));

    assert!(merge_project_metadata(&mut node, &mut source_map, &first, "p1", &policy).is_empty());
    let conflicts = merge_project_metadata(&mut node, &mut source_map, &second, "p2", &policy);

    assert_eq!(node.metadata()["owner"], "team-b");
    assert_eq!(source_map["metadata.owner"], SourceInfo::new(None, "p2"));
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].property, "metadata.owner");
    assert_eq!(
        conflicts[0].previous,
        SourceInfo::new(Some(PathBuf::from("libs/x/project.json")), "p1")
    );
}

#[test]
fn test_arrays_concatenate_and_move_ownership() {
    let mut node = ProjectNode::new(Project::new("x", "libs/x"));
    let mut source_map = SourceMap::new();
    let policy = MergePolicy::default();

    let first = MetadataUpdate::new(metadata(json!({ "technologies": ["typescript"] })));
    let second = MetadataUpdate::new(metadata(json!({ "technologies": ["typescript", "rust"] })));
    merge_project_metadata(&mut node, &mut source_map, &first, "p1", &policy);
    let conflicts = merge_project_metadata(&mut node, &mut source_map, &second, "p2", &policy);

    assert_eq!(node.metadata()["technologies"], json!(["typescript", "rust"]));
    assert_eq!(source_map["metadata.technologies"].plugin, "p2");
    assert_eq!(source_map["metadata.technologies.0"].plugin, "p1");
    assert_eq!(source_map["metadata.technologies.1"].plugin, "p2");

    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].property, "metadata.technologies");
    assert_eq!(conflicts[0].previous.plugin, "p1");
    assert_eq!(conflicts[0].winner.plugin, "p2");
}

#[test]
fn test_objects_merge_one_level() {
    let mut node = ProjectNode::new(Project::new("x", "libs/x"));
    let mut source_map = SourceMap::new();
    let policy = MergePolicy::default();

    let first = MetadataUpdate::new(metadata(json!({ "groups": { "build": ["tsc"], "lint": "eslint" } })));
    let second = MetadataUpdate::new(metadata(
        json!({ "groups": { "build": ["vite"], "lint": "biome", "test": "jest" } }),
    ));
    merge_project_metadata(&mut node, &mut source_map, &first, "p1", &policy);
    let conflicts = merge_project_metadata(&mut node, &mut source_map, &second, "p2", &policy);

    assert_eq!(
        node.metadata()["groups"],
        json!({ "build": ["tsc", "vite"], "lint": "biome", "test": "jest" })
    );
    assert_eq!(source_map["metadata.groups"].plugin, "p2");
    assert_eq!(source_map["metadata.groups.test"].plugin, "p2");
    assert_eq!(source_map["metadata.groups.build"].plugin, "p2");
    assert_eq!(source_map["metadata.groups.build.1"].plugin, "p2");

    // `test` is new, everything else p1 owned through the whole object
    let mut properties: Vec<&str> = conflicts.iter().map(|c| c.property.as_str()).collect();
    properties.sort();
    assert_eq!(
        properties,
        vec!["metadata.groups", "metadata.groups.build", "metadata.groups.lint"]
    );
    assert!(conflicts.iter().all(|c| c.previous.plugin == "p1"));
}

#[test]
fn test_merged_properties_attributed_to_last_writer() {
    let mut node = ProjectNode::new(Project::new("x", "libs/x"));
    let mut source_map = SourceMap::new();
    let policy = MergePolicy::default();

    let first = MetadataUpdate::new(metadata(json!({ "technologies": ["ts"], "groups": { "a": 1 } })));
    let second = MetadataUpdate::new(metadata(json!({ "technologies": ["rust"], "groups": { "b": 2 } })))
        .from_file("libs/x/Cargo.toml");
    merge_project_metadata(&mut node, &mut source_map, &first, "p1", &policy);
    let conflicts = merge_project_metadata(&mut node, &mut source_map, &second, "p2", &policy);

    assert_eq!(node.metadata()["technologies"], json!(["ts", "rust"]));
    assert_eq!(node.metadata()["groups"], json!({ "a": 1, "b": 2 }));

    let winner = SourceInfo::new(Some(PathBuf::from("libs/x/Cargo.toml")), "p2");
    assert_eq!(source_map["metadata.technologies"], winner);
    assert_eq!(source_map["metadata.groups"], winner);
    assert_eq!(source_map["metadata.groups.b"], winner);

    let mut properties: Vec<&str> = conflicts.iter().map(|c| c.property.as_str()).collect();
    properties.sort();
    assert_eq!(properties, vec!["metadata.groups", "metadata.technologies"]);
}

#[test]
fn test_replacing_policy_overrides_concatenation() {
    let mut node = ProjectNode::new(Project::new("x", "libs/x"));
    let mut source_map = SourceMap::new();
    let policy = MergePolicy::new().replacing("technologies");

    let first = MetadataUpdate::new(metadata(json!({ "technologies": ["a", "b"] })));
    let second = MetadataUpdate::new(metadata(json!({ "technologies": ["c"] })));
    merge_project_metadata(&mut node, &mut source_map, &first, "p1", &policy);
    let conflicts = merge_project_metadata(&mut node, &mut source_map, &second, "p2", &policy);

    assert_eq!(node.metadata()["technologies"], json!(["c"]));
    assert_eq!(conflicts.len(), 1);
    assert!(!source_map.contains_key("metadata.technologies.1"));
    assert_eq!(source_map["metadata.technologies.0"].plugin, "p2");
}

// ── Error rendering ─────────────────────────────────────────

#[test]
fn test_build_error_messages() {
    let err = BuildError::ProcessDependencies {
        plugin: "imports".to_string(),
        cause: anyhow::anyhow!("boom"),
    };
    insta::assert_snapshot!(err.to_string(), @"plugin `imports` failed to process dependencies: boom");
    assert_eq!(err.plugin(), Some("imports"));

    let err = BuildError::ProjectsWithNoName {
        roots: vec![PathBuf::new(), PathBuf::from("libs/a")],
    };
    insta::assert_snapshot!(err.to_string(), @"projects without a name at: ., libs/a");
    assert_eq!(err.plugin(), None);

    let err = BuildError::AggregateCreateNodes {
        plugin: "project-json".to_string(),
        errors: vec![(PathBuf::from("a/project.json"), anyhow::anyhow!("bad json"))],
    };
    assert_eq!(err.to_string(), "plugin `project-json` failed to create nodes for 1 file(s)");
}

#[test]
fn test_aggregate_error_lists_every_failure() {
    let err = ProjectGraphError::new(
        vec![
            BuildError::CreateMetadata {
                plugin: "technologies".to_string(),
                cause: anyhow::anyhow!("no files"),
            },
            BuildError::WorkspaceValidity {
                message: "duplicate project name `a`".to_string(),
                projects: vec!["a".to_string()],
            },
        ],
        ProjectGraph::new(),
    );
    let message = err.to_string();
    assert!(message.starts_with("failed to build the project graph (2 error(s))"));
    assert!(message.contains("plugin `technologies` failed to create metadata: no files"));
    assert!(message.contains("invalid workspace: duplicate project name `a`"));
}
