//! Project configuration retrieval: node plugins → merged projects

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use futures_util::future::join_all;
use weave_core::{
    BuildError, MergePolicy, Project, ProjectConfigurations, ProjectConfigurationsError, SourceInfo, SourceMap,
    merge_metadata,
};
use weave_plugins::{CreateNodesContext, LoadedPlugin, ProjectConfiguration};

use crate::orchestrator::settle_all;
use crate::progress::{Phase, ProgressObserver};

/// A project as contributions for its root are merged.
#[derive(Debug)]
struct PendingProject {
    name: Option<String>,
    project: Project,
    source_map: SourceMap,
}

impl PendingProject {
    fn new(root: &Path) -> Self {
        PendingProject {
            name: None,
            project: Project::new(String::new(), root),
            source_map: SourceMap::new(),
        }
    }

    fn merge(&mut self, config: ProjectConfiguration, source: &SourceInfo) -> anyhow::Result<()> {
        if let Some(name) = config.name {
            if let Some(existing) = &self.name {
                if *existing != name {
                    return Err(anyhow!(
                        "project at `{}` is already named `{existing}`, cannot rename it to `{name}`",
                        self.project.root.display()
                    ));
                }
            }
            self.name = Some(name);
            self.attribute("name", source);
        }

        if !config.tags.is_empty() {
            append_unique(&mut self.project.tags, config.tags);
            self.attribute("tags", source);
        }
        if !config.implicit_dependencies.is_empty() {
            append_unique(&mut self.project.implicit_dependencies, config.implicit_dependencies);
            self.attribute("implicitDependencies", source);
        }
        for (target, value) in config.targets {
            self.attribute(&format!("targets.{target}"), source);
            self.project.targets.insert(target, value);
        }
        if !config.metadata.is_empty() {
            let label = self.project.root.display().to_string();
            merge_metadata(
                &label,
                &mut self.project.metadata,
                &mut self.source_map,
                &config.metadata,
                source,
                &MergePolicy::new(),
            );
        }
        Ok(())
    }

    fn attribute(&mut self, property: &str, source: &SourceInfo) {
        self.source_map.insert(property.to_string(), source.clone());
    }
}

fn append_unique(existing: &mut Vec<String>, incoming: Vec<String>) {
    for item in incoming {
        if !existing.contains(&item) {
            existing.push(item);
        }
    }
}

type FileResults = Vec<(PathBuf, anyhow::Result<Vec<ProjectConfiguration>>)>;

/// Ask every node plugin about the files it matches and merge the
/// resulting configurations by project root, in plugin order.
pub async fn retrieve_project_configurations(
    plugins: &[LoadedPlugin],
    workspace_root: &Path,
    files: &[PathBuf],
    progress: &dyn ProgressObserver,
) -> Result<ProjectConfigurations, ProjectConfigurationsError> {
    let capable: Vec<&LoadedPlugin> = plugins.iter().filter(|p| p.capabilities().create_nodes).collect();

    let mut matched_files = BTreeSet::new();
    let mut tasks = Vec::with_capacity(capable.len());
    for plugin in &capable {
        let mut selected: Vec<&PathBuf> = files.iter().filter(|f| plugin.wants_file(f)).collect();
        selected.sort();
        matched_files.extend(selected.iter().map(|f| (*f).clone()));
        tracing::debug!("Plugin {} matched {} file(s)", plugin.name(), selected.len());

        let ctx = CreateNodesContext {
            workspace_root,
            options: plugin.options(),
        };
        let task = async move {
            join_all(selected.into_iter().map(|file| async move {
                let result = plugin.plugin().create_nodes(file, &ctx).await;
                (file.clone(), result)
            }))
            .await
        };
        tasks.push((plugin.name().to_string(), task));
    }
    let results: Vec<FileResults> = settle_all(Phase::CreateNodes, tasks, progress).await;

    let mut pending: BTreeMap<PathBuf, PendingProject> = BTreeMap::new();
    let mut errors = Vec::new();

    for (plugin, file_results) in capable.iter().zip(results) {
        let mut failures = Vec::new();
        for (file, result) in file_results {
            let configs = match result {
                Ok(configs) => configs,
                Err(cause) => {
                    tracing::debug!("Plugin {} failed on {}: {:#}", plugin.name(), file.display(), cause);
                    failures.push((file, cause));
                    continue;
                }
            };

            let source = SourceInfo::new(Some(file.clone()), plugin.name());
            for config in configs {
                let root = config.root.clone();
                let entry = pending.entry(root.clone()).or_insert_with(|| PendingProject::new(&root));
                if let Err(cause) = entry.merge(config, &source) {
                    errors.push(BuildError::MergeNodes {
                        plugin: plugin.name().to_string(),
                        file: file.clone(),
                        cause,
                    });
                }
            }
        }
        if !failures.is_empty() {
            errors.push(BuildError::AggregateCreateNodes {
                plugin: plugin.name().to_string(),
                errors: failures,
            });
        }
    }

    let mut configurations = ProjectConfigurations {
        matched_files: matched_files.into_iter().collect(),
        ..Default::default()
    };
    let mut unnamed = Vec::new();
    for (root, entry) in pending {
        let PendingProject {
            name,
            mut project,
            source_map,
        } = entry;
        let Some(name) = name else {
            unnamed.push(root);
            continue;
        };
        project.name = name;
        configurations.projects.insert(root.clone(), project);
        configurations.source_maps.insert(root, source_map);
    }
    if !unnamed.is_empty() {
        errors.push(BuildError::ProjectsWithNoName { roots: unnamed });
    }

    tracing::info!("Retrieved {} project configuration(s)", configurations.projects.len());
    if errors.is_empty() {
        Ok(configurations)
    } else {
        Err(ProjectConfigurationsError {
            errors,
            partial: configurations,
        })
    }
}
