//! File-map cache: invalidation decisions and on-disk persistence

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CacheError;
use crate::model::{Dependency, FileData, FileMap, Project};

/// Cache directory: .weave/
pub const CACHE_DIR: &str = ".weave";

/// File-map cache file
pub const FILE_MAP_CACHE: &str = "file-map.json";

/// Bumped whenever the cache layout changes.
pub const CACHE_VERSION: &str = "1";

/// Package name to version requirement, across every manifest consulted.
pub type CombinedManifest = BTreeMap<String, String>;

/// The dependency sections of a package manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
}

/// Merge production and development dependencies of the root manifest and
/// the installation-local one. Later sections override earlier ones.
pub fn combine_manifests(root: &PackageManifest, installation: Option<&PackageManifest>) -> CombinedManifest {
    let mut combined = CombinedManifest::new();
    for manifest in std::iter::once(root).chain(installation) {
        combined.extend(manifest.dependencies.clone());
        combined.extend(manifest.dev_dependencies.clone());
    }
    combined
}

/// Snapshot of the previous build, with the inputs it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMapCache {
    pub version: String,
    pub cached_at: String,
    pub dependency_manifest: CombinedManifest,
    pub workspace_config: Value,
    pub compiler_config: Value,
    pub project_names: BTreeSet<String>,
    pub file_map: FileMap,
}

impl FileMapCache {
    pub fn new(
        dependency_manifest: CombinedManifest,
        workspace_config: Value,
        compiler_config: Value,
        projects: &[Project],
        file_map: FileMap,
    ) -> Self {
        FileMapCache {
            version: CACHE_VERSION.to_string(),
            cached_at: chrono::Utc::now().to_rfc3339(),
            dependency_manifest,
            workspace_config,
            compiler_config,
            project_names: project_names(projects),
            file_map,
        }
    }
}

fn project_names(projects: &[Project]) -> BTreeSet<String> {
    projects.iter().map(|p| p.name.clone()).collect()
}

/// Whether anything changed that can alter how any file's dependencies
/// are interpreted, in which case nothing from the cache may be reused.
pub fn should_recompute_whole_graph(
    cache: &FileMapCache,
    dependency_manifest: &CombinedManifest,
    projects: &[Project],
    workspace_config: &Value,
    compiler_config: &Value,
) -> bool {
    if cache.version != CACHE_VERSION {
        tracing::debug!("Cache version {} is stale", cache.version);
        return true;
    }
    if cache.dependency_manifest != *dependency_manifest {
        tracing::debug!("Declared package dependencies changed");
        return true;
    }
    if cache.workspace_config != *workspace_config {
        tracing::debug!("Workspace configuration changed");
        return true;
    }
    if cache.compiler_config != *compiler_config {
        tracing::debug!("Compiler configuration changed");
        return true;
    }
    if cache.project_names != project_names(projects) {
        tracing::debug!("Project set changed");
        return true;
    }
    false
}

/// Cached entries still valid for this build, looked up by owner and path.
#[derive(Debug, Clone, Default)]
pub struct CachedFileData {
    pub project_files: HashMap<String, HashMap<PathBuf, FileData>>,
    pub non_project_files: HashMap<PathBuf, FileData>,
}

impl CachedFileData {
    /// `project` is `None` for files outside every project.
    pub fn get(&self, project: Option<&str>, file: &Path) -> Option<&FileData> {
        match project {
            Some(name) => self.project_files.get(name)?.get(file),
            None => self.non_project_files.get(file),
        }
    }

    pub fn len(&self) -> usize {
        self.project_files.values().map(HashMap::len).sum::<usize>() + self.non_project_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split the current file map into files that must be fed to plugins and
/// cached entries that can be copied over unchanged.
///
/// A file is reusable only if the previous build saw it under the same
/// owner with the same fingerprint.
pub fn extract_cached_file_data(file_map: &FileMap, cache: &FileMapCache) -> (FileMap, CachedFileData) {
    let mut files_to_process = FileMap::new();
    let mut cached = CachedFileData::default();

    for (project, files) in &file_map.project_file_map {
        let previous: HashMap<&Path, &FileData> = cache
            .file_map
            .project_files(project)
            .iter()
            .map(|f| (f.file.as_path(), f))
            .collect();
        let to_process = files_to_process
            .project_file_map
            .entry(project.clone())
            .or_default();

        for file in files {
            match reusable(previous.get(file.file.as_path()).copied(), file) {
                Some(hit) => {
                    cached
                        .project_files
                        .entry(project.clone())
                        .or_default()
                        .insert(file.file.clone(), hit.clone());
                }
                None => to_process.push(file.clone()),
            }
        }
    }

    let previous: HashMap<&Path, &FileData> = cache
        .file_map
        .non_project_files
        .iter()
        .map(|f| (f.file.as_path(), f))
        .collect();
    for file in &file_map.non_project_files {
        match reusable(previous.get(file.file.as_path()).copied(), file) {
            Some(hit) => {
                cached.non_project_files.insert(file.file.clone(), hit.clone());
            }
            None => files_to_process.non_project_files.push(file.clone()),
        }
    }

    tracing::debug!(
        "Reusing {} cached file(s), reprocessing {}",
        cached.len(),
        files_to_process.len()
    );
    (files_to_process, cached)
}

fn reusable<'a>(previous: Option<&'a FileData>, current: &FileData) -> Option<&'a FileData> {
    previous.filter(|p| p.hash == current.hash)
}

/// Copy cached dependency lists onto unchanged files, returning the
/// project-level dependencies they imply so they can be replayed into the
/// graph.
pub fn restore_cached_dependencies(file_map: &mut FileMap, cached: &CachedFileData) -> Vec<Dependency> {
    let mut replay = Vec::new();
    for (project, files) in file_map.project_file_map.iter_mut() {
        for file in files.iter_mut() {
            let Some(hit) = cached.get(Some(project.as_str()), &file.file) else {
                continue;
            };
            file.deps = hit.deps.clone();
            for dep in hit.deps.iter().flatten() {
                replay.push(
                    Dependency::new(project.clone(), dep.target.clone(), dep.kind)
                        .with_source_file(file.file.clone()),
                );
            }
        }
    }
    for file in file_map.non_project_files.iter_mut() {
        if let Some(hit) = cached.get(None, &file.file) {
            file.deps = hit.deps.clone();
        }
    }
    replay
}

/// Get cache directory path
pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

/// Get file-map cache file path
pub fn file_map_cache_path(root: &Path) -> PathBuf {
    cache_dir(root).join(FILE_MAP_CACHE)
}

/// Ensure cache directory exists
pub fn ensure_cache_dir(root: &Path) -> Result<(), CacheError> {
    let cache = cache_dir(root);
    if !cache.exists() {
        std::fs::create_dir_all(&cache).map_err(|source| CacheError::Io {
            path: cache.clone(),
            source,
        })?;
    }
    Ok(())
}

/// Write the file-map cache as JSON.
pub fn save_file_map_cache(cache: &FileMapCache, root: &Path) -> Result<(), CacheError> {
    ensure_cache_dir(root)?;
    let path = file_map_cache_path(root);
    let json_str = serde_json::to_string_pretty(cache)?;
    std::fs::write(&path, json_str).map_err(|source| CacheError::Io {
        path: path.clone(),
        source,
    })?;

    tracing::debug!("File-map cache saved: {}", path.display());
    Ok(())
}

/// Load the file-map cache.
///
/// Fail-safe: a missing, unreadable or outdated cache is treated as absent,
/// which means the next build recomputes everything.
pub fn load_file_map_cache(root: &Path) -> Option<FileMapCache> {
    let path = file_map_cache_path(root);
    let json_str = std::fs::read_to_string(&path).ok()?;
    let cache: FileMapCache = match serde_json::from_str(&json_str) {
        Ok(cache) => cache,
        Err(e) => {
            tracing::warn!("Ignoring unreadable cache {}: {}", path.display(), e);
            return None;
        }
    };
    if cache.version != CACHE_VERSION {
        tracing::debug!("Ignoring cache with version {}", cache.version);
        return None;
    }

    tracing::debug!("File-map cache loaded from: {}", path.display());
    Some(cache)
}

/// Clear cache directory
pub fn clear_cache(root: &Path) -> std::io::Result<()> {
    let cache = cache_dir(root);
    if cache.exists() {
        std::fs::remove_dir_all(&cache)?;
    }
    Ok(())
}
