//! Weave build
//!
//! Drives plugins through the node, dependency and metadata phases and
//! assembles the project graph, reusing the previous build's file-level
//! results where nothing relevant changed.

pub mod progress;
pub mod orchestrator;
pub mod retrieval;
pub mod validate;
pub mod build;
pub mod probe;
pub mod config;
pub mod files;

#[cfg(test)]
pub mod test_utils;


pub use progress::{
    DEFAULT_GRACE_PERIOD, NoopProgress, Phase, ProgressObserver, TerminalProgress, progress_for_environment,
    waiting_message,
};
pub use orchestrator::{DependencyInputs, DependencyPhase, MetadataPhase, create_dependencies, create_metadata, settle_all};
pub use retrieval::retrieve_project_configurations;
pub use validate::{DefaultValidator, WorkspaceValidator};
pub use build::{BuildOptions, BuildOutcome, WorkspaceSnapshot, build_project_graph, create_project_graph};
pub use probe::{
    Incompatibilities, RetrievalFailure, find_incompatible_plugins, incompatibilities_from_errors,
    incompatibilities_from_failure,
};
pub use config::{
    ConfigError, DEFAULT_COMPILER_CONFIG, DEFAULT_PLUGINS, ExclusionChange, WORKSPACE_CONFIG_FILE, WorkspaceConfig,
    apply_exclusions, external_nodes_from_manifest, load_compiler_config, load_manifests, load_workspace_config,
    workspace_config_path,
};
pub use files::{collect_workspace_files, content_hash, fingerprint};
