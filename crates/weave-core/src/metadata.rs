//! Deterministic metadata merging with provenance tracking
//!
//! Every property a plugin writes into a project's metadata is attributed
//! to that plugin (and the file it came from) in the project's source map.
//! Merging follows [`MergePolicy`]:
//!
//! | existing value | incoming value | rule |
//! |---|---|---|
//! | array | array | [`MergeRule::Concatenate`]: incoming items appended, exact duplicates skipped |
//! | object | object | [`MergeRule::MergeObject`]: one level deep, arrays inside concatenated, everything else replaced |
//! | anything else | anything | [`MergeRule::Replace`]: the later plugin wins |
//!
//! Keys registered with [`MergePolicy::replacing`] always use
//! [`MergeRule::Replace`]. Whatever the rule, a property that already had an
//! owner in the source map is reported as a [`MetadataConflict`] and is then
//! attributed to the plugin that wrote it last.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde_json::Value;

use crate::model::{Metadata, ProjectNode, SourceInfo, SourceMap};

const METADATA_PREFIX: &str = "metadata";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    Replace,
    Concatenate,
    MergeObject,
}

#[derive(Debug, Clone, Default)]
pub struct MergePolicy {
    replace_keys: BTreeSet<String>,
}

impl MergePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force whole-value replacement for a top-level metadata key.
    pub fn replacing(mut self, key: impl Into<String>) -> Self {
        self.replace_keys.insert(key.into());
        self
    }

    pub fn rule_for(&self, key: &str, existing: Option<&Value>, incoming: &Value) -> MergeRule {
        if self.replace_keys.contains(key) {
            return MergeRule::Replace;
        }
        match (existing, incoming) {
            (Some(Value::Array(_)), Value::Array(_)) => MergeRule::Concatenate,
            (Some(Value::Object(_)), Value::Object(_)) => MergeRule::MergeObject,
            _ => MergeRule::Replace,
        }
    }
}

/// Metadata one plugin contributes to one project.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataUpdate {
    /// The file the values were derived from, when there is one.
    pub file: Option<PathBuf>,
    pub metadata: Metadata,
}

impl MetadataUpdate {
    pub fn new(metadata: Metadata) -> Self {
        MetadataUpdate {
            file: None,
            metadata,
        }
    }

    pub fn from_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// A property one source set and a later source overwrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataConflict {
    pub project: String,
    pub property: String,
    pub previous: SourceInfo,
    pub winner: SourceInfo,
}

/// Apply a plugin's update to a graph node.
pub fn merge_project_metadata(
    node: &mut ProjectNode,
    source_map: &mut SourceMap,
    update: &MetadataUpdate,
    plugin: &str,
    policy: &MergePolicy,
) -> Vec<MetadataConflict> {
    let source = SourceInfo::new(update.file.clone(), plugin);
    let project = node.name().to_string();
    merge_metadata(&project, node.metadata_mut(), source_map, &update.metadata, &source, policy)
}

/// Merge `incoming` into `target`, updating `source_map` so each
/// property is attributed to whoever most recently won it.
pub fn merge_metadata(
    project: &str,
    target: &mut Metadata,
    source_map: &mut SourceMap,
    incoming: &Metadata,
    source: &SourceInfo,
    policy: &MergePolicy,
) -> Vec<MetadataConflict> {
    let mut merger = Merger {
        project,
        source_map,
        source,
        conflicts: Vec::new(),
    };

    for (key, value) in incoming {
        let path = format!("{METADATA_PREFIX}.{key}");
        match policy.rule_for(key, target.get(key), value) {
            MergeRule::Concatenate => {
                if let (Some(Value::Array(items)), Value::Array(new_items)) = (target.get_mut(key), value) {
                    merger.concatenate(&path, None, items, new_items);
                }
            }
            MergeRule::MergeObject => {
                if let (Some(Value::Object(existing)), Value::Object(new_entries)) = (target.get_mut(key), value) {
                    let owner = merger.claim(&path, None);
                    for (sub_key, sub_value) in new_entries {
                        let sub_path = format!("{path}.{sub_key}");
                        let inherited = if existing.contains_key(sub_key) { owner.clone() } else { None };
                        match (existing.get_mut(sub_key), sub_value) {
                            (Some(Value::Array(items)), Value::Array(new_items)) => {
                                merger.concatenate(&sub_path, inherited, items, new_items);
                            }
                            _ => {
                                merger.replace(&sub_path, inherited, sub_value);
                                existing.insert(sub_key.clone(), sub_value.clone());
                            }
                        }
                    }
                }
            }
            MergeRule::Replace => {
                merger.replace(&path, None, value);
                target.insert(key.clone(), value.clone());
            }
        }
    }

    for conflict in &merger.conflicts {
        tracing::debug!(
            "{}: `{}` set by {} overridden by {}",
            conflict.project,
            conflict.property,
            conflict.previous.plugin,
            conflict.winner.plugin
        );
    }
    merger.conflicts
}

struct Merger<'a> {
    project: &'a str,
    source_map: &'a mut SourceMap,
    source: &'a SourceInfo,
    conflicts: Vec<MetadataConflict>,
}

impl Merger<'_> {
    /// Attribute `path` to the current source, recording a conflict when
    /// someone already owned it. `inherited` stands in for the owner when
    /// `path` itself was never recorded. Returns the previous owner.
    fn claim(&mut self, path: &str, inherited: Option<SourceInfo>) -> Option<SourceInfo> {
        let previous = self.source_map.get(path).cloned().or(inherited);
        if let Some(previous) = &previous {
            self.conflicts.push(MetadataConflict {
                project: self.project.to_string(),
                property: path.to_string(),
                previous: previous.clone(),
                winner: self.source.clone(),
            });
        }
        self.source_map.insert(path.to_string(), self.source.clone());
        previous
    }

    fn concatenate(&mut self, path: &str, inherited: Option<SourceInfo>, items: &mut Vec<Value>, new_items: &[Value]) {
        self.claim(path, inherited);
        for item in new_items {
            if items.contains(item) {
                continue;
            }
            items.push(item.clone());
            self.source_map
                .insert(format!("{path}.{}", items.len() - 1), self.source.clone());
        }
    }

    fn replace(&mut self, path: &str, inherited: Option<SourceInfo>, value: &Value) {
        self.claim(path, inherited);

        let child_prefix = format!("{path}.");
        self.source_map.retain(|key, _| !key.starts_with(&child_prefix));
        if let Value::Array(items) = value {
            for index in 0..items.len() {
                self.source_map
                    .insert(format!("{path}.{index}"), self.source.clone());
            }
        }
    }
}
