//! Core data structures for the project graph

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form metadata bag attached to projects.
pub type Metadata = Map<String, Value>;

/// A named unit of the workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    /// Path relative to the workspace root. Empty for a root-level project.
    pub root: PathBuf,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub implicit_dependencies: Vec<String>,
    /// Opaque build configuration, keyed by target name.
    #[serde(default)]
    pub targets: Map<String, Value>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Project {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Project {
            name: name.into(),
            root: root.into(),
            tags: Vec::new(),
            implicit_dependencies: Vec::new(),
            targets: Map::new(),
            metadata: Metadata::new(),
        }
    }

    /// Whether `path` (workspace-relative) lives under this project's root.
    pub fn contains(&self, path: &Path) -> bool {
        if self.root.as_os_str().is_empty() || self.root == Path::new(".") {
            return true;
        }
        path.starts_with(&self.root)
    }

    fn depth(&self) -> usize {
        self.root.components().count()
    }
}

/// A project as it lives in the graph, with metadata populated by plugins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectNode {
    #[serde(flatten)]
    pub project: Project,
}

impl ProjectNode {
    pub fn new(project: Project) -> Self {
        ProjectNode { project }
    }

    pub fn name(&self) -> &str {
        &self.project.name
    }

    pub fn metadata(&self) -> &Metadata {
        &self.project.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.project.metadata
    }
}

/// A package living outside the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalNode {
    /// Graph identity, e.g. `npm:react`.
    pub name: String,
    pub package_name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
}

impl ExternalNode {
    pub fn npm(package_name: impl Into<String>, version: impl Into<String>) -> Self {
        let package_name = package_name.into();
        ExternalNode {
            name: format!("npm:{package_name}"),
            package_name,
            version: version.into(),
            sub_path: None,
        }
    }
}

/// How a dependency was expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    /// Found by reading source (imports, requires).
    Static,
    /// Loaded lazily at runtime, e.g. `import()`.
    Dynamic,
    /// Declared in configuration, not visible in source.
    Implicit,
}

/// A directed dependency between a project and another project or external node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub kind: DependencyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<PathBuf>,
}

impl Dependency {
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: DependencyType) -> Self {
        Dependency {
            source: source.into(),
            target: target.into(),
            kind,
            source_file: None,
        }
    }

    pub fn with_source_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.source_file = Some(file.into());
        self
    }
}

/// A dependency target recorded against the file it was found in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDependency {
    pub target: String,
    #[serde(rename = "type")]
    pub kind: DependencyType,
}

/// One workspace file and what it depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    /// Workspace-relative path.
    pub file: PathBuf,
    /// Content fingerprint.
    pub hash: String,
    /// Filled in once the dependency phase has looked at this file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deps: Option<Vec<FileDependency>>,
}

impl FileData {
    pub fn new(file: impl Into<PathBuf>, hash: impl Into<String>) -> Self {
        FileData {
            file: file.into(),
            hash: hash.into(),
            deps: None,
        }
    }
}

/// The current build's files, split by owning project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMap {
    pub project_file_map: BTreeMap<String, Vec<FileData>>,
    pub non_project_files: Vec<FileData>,
}

impl FileMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign every file to the project with the deepest root containing it.
    pub fn partition<'a>(projects: impl IntoIterator<Item = &'a Project>, files: Vec<FileData>) -> Self {
        let mut projects: Vec<&Project> = projects.into_iter().collect();
        projects.sort_by(|a, b| b.depth().cmp(&a.depth()).then_with(|| a.name.cmp(&b.name)));

        let mut file_map = FileMap::new();
        for project in &projects {
            file_map.project_file_map.entry(project.name.clone()).or_default();
        }

        for file in files {
            match projects.iter().find(|p| p.contains(&file.file)) {
                Some(project) => file_map
                    .project_file_map
                    .entry(project.name.clone())
                    .or_default()
                    .push(file),
                None => file_map.non_project_files.push(file),
            }
        }

        for files in file_map.project_file_map.values_mut() {
            files.sort_by(|a, b| a.file.cmp(&b.file));
        }
        file_map.non_project_files.sort_by(|a, b| a.file.cmp(&b.file));
        file_map
    }

    pub fn project_files(&self, project: &str) -> &[FileData] {
        self.project_file_map
            .get(project)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The name of the project owning `path`, if any.
    pub fn owner_of(&self, path: &Path) -> Option<&str> {
        self.project_file_map
            .iter()
            .find(|(_, files)| files.iter().any(|f| f.file == path))
            .map(|(name, _)| name.as_str())
    }

    /// Iterate over every file, project files first.
    pub fn files(&self) -> impl Iterator<Item = &FileData> {
        self.project_file_map
            .values()
            .flat_map(|files| files.iter())
            .chain(self.non_project_files.iter())
    }

    pub fn files_mut(&mut self) -> impl Iterator<Item = &mut FileData> {
        self.project_file_map
            .values_mut()
            .flat_map(|files| files.iter_mut())
            .chain(self.non_project_files.iter_mut())
    }

    pub fn len(&self) -> usize {
        self.files().count()
    }

    pub fn is_empty(&self) -> bool {
        self.files().next().is_none()
    }
}

/// Who set a property, and from which file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    pub plugin: String,
}

impl SourceInfo {
    pub fn new(file: Option<PathBuf>, plugin: impl Into<String>) -> Self {
        SourceInfo {
            file,
            plugin: plugin.into(),
        }
    }
}

/// Property path (`metadata.technologies`, `targets.build`, ...) to its provenance.
pub type SourceMap = BTreeMap<String, SourceInfo>;

/// Source maps for every project, keyed by project name.
pub type SourceMaps = BTreeMap<String, SourceMap>;

/// Result of project configuration retrieval, keyed by project root.
#[derive(Debug, Clone, Default)]
pub struct ProjectConfigurations {
    pub projects: BTreeMap<PathBuf, Project>,
    pub source_maps: BTreeMap<PathBuf, SourceMap>,
    /// Files that at least one node plugin looked at.
    pub matched_files: Vec<PathBuf>,
}

impl ProjectConfigurations {
    pub fn project_list(&self) -> Vec<Project> {
        self.projects.values().cloned().collect()
    }

    /// Re-key source maps by project name. The first root wins on a name clash.
    pub fn source_maps_by_name(&self) -> SourceMaps {
        let mut by_name = SourceMaps::new();
        for (root, project) in &self.projects {
            if let Some(map) = self.source_maps.get(root) {
                by_name
                    .entry(project.name.clone())
                    .or_insert_with(|| map.clone());
            }
        }
        by_name
    }
}
