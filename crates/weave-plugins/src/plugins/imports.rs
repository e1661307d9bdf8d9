//! Static and dynamic edges from JavaScript/TypeScript imports

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use weave_core::{Dependency, DependencyType, ExternalNode, Project};

use crate::plugin::{CreateDependenciesContext, Plugin, PluginCapabilities};

pub const NAME: &str = "imports";

const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

pub struct ImportsPlugin;

impl ImportsPlugin {
    pub fn new() -> Self {
        ImportsPlugin
    }
}

impl Default for ImportsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

/// Specifiers found in one source file, in order of appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpecifier {
    pub specifier: String,
    pub kind: DependencyType,
}

struct ImportScanner {
    from_re: Regex,
    bare_re: Regex,
    require_re: Regex,
    dynamic_re: Regex,
}

impl ImportScanner {
    fn new() -> Result<Self> {
        Ok(ImportScanner {
            from_re: Regex::new(r#"(?:import|export)\s[^'";]*?\bfrom\s*['"]([^'"]+)['"]"#)?,
            bare_re: Regex::new(r#"(?m)^\s*import\s*['"]([^'"]+)['"]"#)?,
            require_re: Regex::new(r#"\brequire\(\s*['"]([^'"]+)['"]\s*\)"#)?,
            dynamic_re: Regex::new(r#"\bimport\(\s*['"]([^'"]+)['"]\s*\)"#)?,
        })
    }

    fn scan(&self, source: &str) -> Vec<ImportSpecifier> {
        let mut found: Vec<(usize, ImportSpecifier)> = Vec::new();
        let statics = [&self.from_re, &self.bare_re, &self.require_re];
        for re in statics {
            for caps in re.captures_iter(source) {
                if let Some(m) = caps.get(1) {
                    found.push((m.start(), spec(m.as_str(), DependencyType::Static)));
                }
            }
        }
        for caps in self.dynamic_re.captures_iter(source) {
            if let Some(m) = caps.get(1) {
                found.push((m.start(), spec(m.as_str(), DependencyType::Dynamic)));
            }
        }
        found.sort_by_key(|(offset, _)| *offset);
        found.into_iter().map(|(_, s)| s).collect()
    }
}

fn spec(specifier: &str, kind: DependencyType) -> ImportSpecifier {
    ImportSpecifier {
        specifier: specifier.to_string(),
        kind,
    }
}

/// Extract import specifiers from JavaScript/TypeScript source.
pub fn scan_imports(source: &str) -> Result<Vec<ImportSpecifier>> {
    Ok(ImportScanner::new()?.scan(source))
}

/// Resolves specifiers to graph node names.
struct Resolver<'a> {
    projects: Vec<&'a Project>,
    external_nodes: &'a BTreeMap<String, ExternalNode>,
}

impl<'a> Resolver<'a> {
    fn new(projects: &'a BTreeMap<String, Project>, external_nodes: &'a BTreeMap<String, ExternalNode>) -> Self {
        let mut projects: Vec<&Project> = projects.values().collect();
        // Deepest root first for path lookups, longest name first for prefixes.
        projects.sort_by(|a, b| {
            b.root
                .components()
                .count()
                .cmp(&a.root.components().count())
                .then_with(|| b.name.len().cmp(&a.name.len()))
        });
        Resolver {
            projects,
            external_nodes,
        }
    }

    fn resolve(&self, file: &Path, specifier: &str) -> Option<String> {
        if specifier.starts_with('.') {
            let base = file.parent().unwrap_or(Path::new(""));
            let target = normalize(&base.join(specifier))?;
            return self
                .projects
                .iter()
                .find(|p| p.contains(&target))
                .map(|p| p.name.clone());
        }

        if let Some(project) = self
            .projects
            .iter()
            .filter(|p| {
                specifier == p.name
                    || specifier
                        .strip_prefix(p.name.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .max_by_key(|p| p.name.len())
        {
            return Some(project.name.clone());
        }

        let node_name = format!("npm:{}", package_name(specifier));
        self.external_nodes.contains_key(&node_name).then_some(node_name)
    }
}

/// `@scope/pkg/sub` → `@scope/pkg`, `pkg/sub` → `pkg`.
pub fn package_name(specifier: &str) -> &str {
    let segments = if specifier.starts_with('@') { 2 } else { 1 };
    match specifier.match_indices('/').nth(segments - 1) {
        Some((idx, _)) => &specifier[..idx],
        None => specifier,
    }
}

/// Lexically resolve `.` and `..`. `None` if the path escapes the workspace.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

#[async_trait::async_trait]
impl Plugin for ImportsPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::dependencies()
    }

    async fn create_dependencies(&self, ctx: &CreateDependenciesContext<'_>) -> Result<Vec<Dependency>> {
        let scanner = ImportScanner::new()?;
        let resolver = Resolver::new(ctx.projects, ctx.external_nodes);
        let mut deps = Vec::new();

        for (project, files) in &ctx.files_to_process.project_file_map {
            for file_data in files.iter().filter(|f| is_source_file(&f.file)) {
                let path = ctx.workspace_root.join(&file_data.file);
                let source = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;

                let mut seen = BTreeSet::new();
                for import in scanner.scan(&source) {
                    let Some(target) = resolver.resolve(&file_data.file, &import.specifier) else {
                        continue;
                    };
                    if &target == project || !seen.insert((target.clone(), import.kind)) {
                        continue;
                    }
                    deps.push(Dependency::new(project, target, import.kind).with_source_file(&file_data.file));
                }
            }
        }

        tracing::debug!("{} import edges", deps.len());
        Ok(deps)
    }
}
