//! Weave Core: project graph data model, builder, cache decisions and metadata merging

pub mod model;
pub mod graph;
pub mod cache;
pub mod metadata;
pub mod error;

#[cfg(test)]
pub mod tests;

pub use model::{
    Project, ProjectNode, ExternalNode, DependencyType, Dependency, FileDependency, FileData, FileMap,
    Metadata, SourceInfo, SourceMap, SourceMaps, ProjectConfigurations,
};
pub use graph::{GraphNode, ProjectGraph, GraphBuilder};
pub use cache::{
    CACHE_DIR, FILE_MAP_CACHE, CACHE_VERSION, CombinedManifest, PackageManifest, FileMapCache, CachedFileData,
    combine_manifests, should_recompute_whole_graph, extract_cached_file_data, restore_cached_dependencies,
    cache_dir, file_map_cache_path, ensure_cache_dir, save_file_map_cache, load_file_map_cache, clear_cache,
};
pub use metadata::{MergeRule, MergePolicy, MetadataUpdate, MetadataConflict, merge_metadata, merge_project_metadata};
pub use error::{GraphError, BuildError, ProjectConfigurationsError, ProjectGraphError, CacheError};

/// Schema version stamped on every graph this workspace produces.
pub const GRAPH_VERSION: &str = "1.0";
