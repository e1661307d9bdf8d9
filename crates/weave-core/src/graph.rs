//! Project graph wrapper using petgraph::StableDiGraph, and the staged builder that fills it

use std::collections::HashMap;
use std::path::PathBuf;

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use serde_json::{Map, Value, json};

use crate::error::GraphError;
use crate::model::*;

/// A node of the project graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphNode {
    Project(ProjectNode),
    External(ExternalNode),
}

impl GraphNode {
    pub fn name(&self) -> &str {
        match self {
            GraphNode::Project(node) => node.name(),
            GraphNode::External(node) => &node.name,
        }
    }
}

/// Immutable view of the workspace's projects, external packages and the
/// dependencies between them.
#[derive(Clone)]
pub struct ProjectGraph {
    inner: StableDiGraph<GraphNode, Dependency>,
    index: HashMap<String, NodeIndex>,
    version: Option<String>,
}

impl std::fmt::Debug for ProjectGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectGraph")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .field("version", &self.version)
            .finish()
    }
}

impl ProjectGraph {
    pub fn new() -> Self {
        ProjectGraph {
            inner: StableDiGraph::new(),
            index: HashMap::new(),
            version: None,
        }
    }

    /// Get a node by name.
    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.index
            .get(name)
            .and_then(|&idx| self.inner.node_weight(idx))
    }

    /// Get a project node by name.
    pub fn project(&self, name: &str) -> Option<&ProjectNode> {
        match self.node(name)? {
            GraphNode::Project(node) => Some(node),
            GraphNode::External(_) => None,
        }
    }

    /// Get an external node by name.
    pub fn external_node(&self, name: &str) -> Option<&ExternalNode> {
        match self.node(name)? {
            GraphNode::External(node) => Some(node),
            GraphNode::Project(_) => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Project nodes in insertion order.
    pub fn projects(&self) -> impl Iterator<Item = &ProjectNode> {
        self.inner
            .node_indices()
            .filter_map(move |idx| match self.inner.node_weight(idx) {
                Some(GraphNode::Project(node)) => Some(node),
                _ => None,
            })
    }

    /// External nodes in insertion order.
    pub fn external_nodes(&self) -> impl Iterator<Item = &ExternalNode> {
        self.inner
            .node_indices()
            .filter_map(move |idx| match self.inner.node_weight(idx) {
                Some(GraphNode::External(node)) => Some(node),
                _ => None,
            })
    }

    /// All dependencies in the order they were added.
    pub fn dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.inner
            .edge_indices()
            .filter_map(move |idx| self.inner.edge_weight(idx))
    }

    /// Outgoing dependencies of a node, in the order they were added.
    pub fn dependencies_of(&self, name: &str) -> Vec<&Dependency> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut ids: Vec<_> = self
            .inner
            .edges_directed(idx, Direction::Outgoing)
            .map(|edge_ref| edge_ref.id())
            .collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| self.inner.edge_weight(id))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn project_count(&self) -> usize {
        self.projects().count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// JSON rendering used by the CLI.
    pub fn to_json(&self) -> Value {
        let mut nodes = Map::new();
        for project in self.projects() {
            nodes.insert(
                project.name().to_string(),
                json!({ "type": "project", "data": project }),
            );
        }
        let mut external = Map::new();
        for node in self.external_nodes() {
            external.insert(node.name.clone(), json!({ "type": "npm", "data": node }));
        }
        let mut dependencies = Map::new();
        for node in self.inner.node_weights() {
            if let GraphNode::Project(project) = node {
                dependencies.insert(
                    project.name().to_string(),
                    json!(self.dependencies_of(project.name())),
                );
            }
        }
        json!({
            "version": self.version,
            "nodes": nodes,
            "externalNodes": external,
            "dependencies": dependencies,
        })
    }
}

impl Default for ProjectGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulates nodes and dependencies while enforcing the graph invariants.
///
/// Each build phase works on a fresh builder seeded from the previous
/// phase's snapshot, so no phase ever observes another one half-applied.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: ProjectGraph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue accumulating on top of a frozen graph.
    pub fn from_graph(graph: ProjectGraph) -> Self {
        GraphBuilder { graph }
    }

    pub fn add_project_node(&mut self, project: Project) -> Result<(), GraphError> {
        if self.graph.contains(&project.name) {
            return Err(GraphError::DuplicateProject(project.name));
        }
        let name = project.name.clone();
        let idx = self
            .graph
            .inner
            .add_node(GraphNode::Project(ProjectNode::new(project)));
        self.graph.index.insert(name, idx);
        Ok(())
    }

    /// Insert an external node. Re-adding identical data is a no-op.
    pub fn add_external_node(&mut self, node: ExternalNode) -> Result<(), GraphError> {
        match self.graph.node(&node.name) {
            Some(GraphNode::External(existing)) if *existing == node => return Ok(()),
            Some(_) => return Err(GraphError::ConflictingExternalNode { name: node.name }),
            None => {}
        }
        let name = node.name.clone();
        let idx = self.graph.inner.add_node(GraphNode::External(node));
        self.graph.index.insert(name, idx);
        Ok(())
    }

    /// Add a dependency between two existing nodes.
    ///
    /// Returns `Ok(false)` when the edge was already present or points back
    /// at its own source.
    pub fn add_dependency(
        &mut self,
        source: &str,
        target: &str,
        kind: DependencyType,
        source_file: Option<PathBuf>,
    ) -> Result<bool, GraphError> {
        let unknown = |missing: &str| GraphError::UnknownNode {
            from: source.to_string(),
            to: target.to_string(),
            missing: missing.to_string(),
        };
        let &from = self.graph.index.get(source).ok_or_else(|| unknown(source))?;
        let &to = self.graph.index.get(target).ok_or_else(|| unknown(target))?;

        if !matches!(self.graph.inner.node_weight(from), Some(GraphNode::Project(_))) {
            return Err(GraphError::SourceNotProject(source.to_string()));
        }
        if from == to {
            return Ok(false);
        }

        let duplicate = self
            .graph
            .inner
            .edges_directed(from, Direction::Outgoing)
            .any(|edge| {
                edge.target() == to
                    && edge.weight().kind == kind
                    && edge.weight().source_file == source_file
            });
        if duplicate {
            return Ok(false);
        }

        let dependency = Dependency {
            source: source.to_string(),
            target: target.to_string(),
            kind,
            source_file,
        };
        self.graph.inner.add_edge(from, to, dependency);
        Ok(true)
    }

    /// Record the schema version handed to downstream consumers.
    pub fn set_version(&mut self, version: impl Into<String>) {
        self.graph.version = Some(version.into());
    }

    pub fn project_node_mut(&mut self, name: &str) -> Option<&mut ProjectNode> {
        let idx = *self.graph.index.get(name)?;
        match self.graph.inner.node_weight_mut(idx)? {
            GraphNode::Project(node) => Some(node),
            GraphNode::External(_) => None,
        }
    }

    pub fn graph(&self) -> &ProjectGraph {
        &self.graph
    }

    /// Freeze the current state. The builder can keep accumulating.
    pub fn snapshot(&self) -> ProjectGraph {
        self.graph.clone()
    }

    pub fn into_graph(self) -> ProjectGraph {
        self.graph
    }
}
