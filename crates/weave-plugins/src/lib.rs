//! Weave plugins
//!
//! This crate defines the capability contract plugins implement, the
//! descriptors that select and configure them in `weave.json`, and the
//! built-in plugins shipped with weave.

pub mod plugin;
pub mod descriptor;
pub mod loader;
pub mod plugins;


pub use plugin::*;
pub use descriptor::{PluginDescriptor, PluginSpec, FileFilter, normalize_descriptors};
pub use loader::{LoadPluginsError, LoadedPlugin, PluginRegistry, load_plugins};
pub use plugins::{BUILTIN_PLUGINS, create_plugin};
