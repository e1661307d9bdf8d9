//! Built-in plugin implementations

pub mod project_json;
pub mod imports;
pub mod implicit;
pub mod technologies;

use std::sync::Arc;

use crate::plugin::Plugin;

/// Names accepted by [`create_plugin`].
pub const BUILTIN_PLUGINS: &[&str] = &[
    project_json::NAME,
    imports::NAME,
    implicit::NAME,
    technologies::NAME,
];

/// Factory function to create built-in plugins by name
pub fn create_plugin(name: &str) -> Option<Arc<dyn Plugin>> {
    match name {
        project_json::NAME => Some(Arc::new(project_json::ProjectJsonPlugin)),
        imports::NAME => Some(Arc::new(imports::ImportsPlugin::new())),
        implicit::NAME => Some(Arc::new(implicit::ImplicitPlugin)),
        technologies::NAME => Some(Arc::new(technologies::TechnologiesPlugin)),
        _ => None,
    }
}
