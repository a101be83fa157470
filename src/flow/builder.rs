//! Two-phase graph declaration: a mutable [`FlowBuilder`] collects nodes and
//! edges, `build()` validates the shape once and produces an immutable
//! [`Flow`] that holds no per-run state and is shareable across concurrent
//! runs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::GraphError;
use crate::node::NodeAction;

pub(crate) struct FlowNode {
    pub(crate) action: Arc<dyn NodeAction>,
    pub(crate) dependencies: Vec<String>,
}

/// A compiled, validated dependency graph.
///
/// Invariants established at build time: acyclic, exactly one entry node
/// (every other node has at least one predecessor), every dependency
/// declared. Acyclicity plus the single entry imply every node is reachable
/// from the entry, so reachability needs no separate check.
pub struct Flow {
    name: String,
    nodes: HashMap<String, FlowNode>,
    entry: String,
    terminals: Vec<String>,
}

impl Flow {
    pub fn builder(name: impl Into<String>) -> FlowBuilder {
        FlowBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The unique node with no predecessors.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Nodes with no dependents; their contributions are the run's result.
    pub fn terminals(&self) -> &[String] {
        &self.terminals
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Nodes whose predecessors have all completed and that have not been
    /// launched yet.
    pub(crate) fn ready_nodes(
        &self,
        completed: &HashSet<String>,
        launched: &HashSet<String>,
    ) -> Vec<(String, Arc<dyn NodeAction>)> {
        self.nodes
            .iter()
            .filter(|(name, node)| {
                !launched.contains(*name)
                    && node.dependencies.iter().all(|dep| completed.contains(dep))
            })
            .map(|(name, node)| (name.clone(), node.action.clone()))
            .collect()
    }
}

/// Collects a flow declaration before compilation.
pub struct FlowBuilder {
    name: String,
    order: Vec<String>,
    actions: HashMap<String, Arc<dyn NodeAction>>,
    duplicates: Vec<String>,
    dependencies: HashMap<String, Vec<String>>,
}

impl FlowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: Vec::new(),
            actions: HashMap::new(),
            duplicates: Vec::new(),
            dependencies: HashMap::new(),
        }
    }

    /// Register a node under the name its action declares.
    pub fn node(mut self, action: Arc<dyn NodeAction>) -> Self {
        let name = action.name().to_string();
        if self.actions.insert(name.clone(), action).is_some() {
            self.duplicates.push(name);
        } else {
            self.order.push(name);
        }
        self
    }

    /// Declare that `node` must not start before `dependency` has completed.
    pub fn depends_on(mut self, node: impl Into<String>, dependency: impl Into<String>) -> Self {
        let node = node.into();
        let dependency = dependency.into();
        let deps = self.dependencies.entry(node).or_default();
        if !deps.contains(&dependency) {
            deps.push(dependency);
        }
        self
    }

    pub fn depends_on_all<S1, S2, I>(mut self, node: S1, dependencies: I) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        I: IntoIterator<Item = S2>,
    {
        let node = node.into();
        for dependency in dependencies {
            self = self.depends_on(node.clone(), dependency);
        }
        self
    }

    /// Validate the declaration and freeze it into a [`Flow`].
    pub fn build(self) -> Result<Flow, GraphError> {
        if let Some(name) = self.duplicates.into_iter().next() {
            return Err(GraphError::DuplicateNode(name));
        }

        for (node, deps) in &self.dependencies {
            if !self.actions.contains_key(node) {
                return Err(GraphError::UndeclaredDependency {
                    node: node.clone(),
                    dependency: deps.first().cloned().unwrap_or_default(),
                });
            }
            for dep in deps {
                if !self.actions.contains_key(dep) {
                    return Err(GraphError::UndeclaredDependency {
                        node: node.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        if self.actions.is_empty() {
            return Err(GraphError::Empty(self.name));
        }

        let mut entries: Vec<String> = self
            .order
            .iter()
            .filter(|name| {
                self.dependencies
                    .get(*name)
                    .map(Vec::is_empty)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        match entries.len() {
            0 => return Err(GraphError::NoEntry(self.name)),
            1 => {}
            _ => {
                return Err(GraphError::MultipleEntries {
                    flow: self.name,
                    nodes: entries,
                })
            }
        }
        let entry = entries.remove(0);

        let mut graph = DiGraph::<&str, ()>::new();
        let mut indices: HashMap<&str, NodeIndex> = HashMap::new();
        for name in &self.order {
            indices.insert(name.as_str(), graph.add_node(name.as_str()));
        }
        for (node, deps) in &self.dependencies {
            for dep in deps {
                graph.add_edge(indices[dep.as_str()], indices[node.as_str()], ());
            }
        }

        if is_cyclic_directed(&graph) {
            return Err(GraphError::Cycle(self.name));
        }

        let mut has_dependents: HashSet<&str> = HashSet::new();
        for deps in self.dependencies.values() {
            for dep in deps {
                has_dependents.insert(dep.as_str());
            }
        }
        let terminals: Vec<String> = self
            .order
            .iter()
            .filter(|name| !has_dependents.contains(name.as_str()))
            .cloned()
            .collect();

        let mut dependencies = self.dependencies;
        let nodes = self
            .actions
            .into_iter()
            .map(|(name, action)| {
                let deps = dependencies.remove(&name).unwrap_or_default();
                (
                    name,
                    FlowNode {
                        action,
                        dependencies: deps,
                    },
                )
            })
            .collect();

        Ok(Flow {
            name: self.name,
            nodes,
            entry,
            terminals,
        })
    }
}
