//! Edges for dependencies declared in project configuration

use anyhow::Result;
use weave_core::{Dependency, DependencyType};

use crate::plugin::{CreateDependenciesContext, Plugin, PluginCapabilities};

pub const NAME: &str = "implicit";

pub struct ImplicitPlugin;

#[async_trait::async_trait]
impl Plugin for ImplicitPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities::dependencies()
    }

    async fn create_dependencies(&self, ctx: &CreateDependenciesContext<'_>) -> Result<Vec<Dependency>> {
        let mut deps = Vec::new();
        for project in ctx.projects.values() {
            for target in &project.implicit_dependencies {
                // `!name` negates an inherited dependency; nothing to add.
                if target.starts_with('!') || target == &project.name {
                    continue;
                }
                if !ctx.projects.contains_key(target) {
                    tracing::debug!("{}: implicit dependency on unknown project {}", project.name, target);
                    continue;
                }
                deps.push(Dependency::new(&project.name, target, DependencyType::Implicit));
            }
        }
        Ok(deps)
    }
}
