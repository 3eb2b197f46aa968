//! Operation plans: the DAG of nodes an operation executes.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::Arc;

use indexmap::IndexMap;
use indexmap::IndexSet;
use serde::Deserialize;
use serde::Serialize;

mod branch;
mod fetch;
mod node;
mod subscribe;

pub use branch::TypeBranchNode;
pub use fetch::Field;
pub use fetch::FetchNode;
pub use fetch::InlineFragment;
pub use fetch::Selection;
pub use node::ExecutionNode;
pub use node::ExecutionNodeResult;
pub use node::ExecutionStatus;
pub use node::NodeContext;
pub use node::SubscriptionNode;
pub use node::VariableValueSet;
pub use subscribe::SubscribeNode;

use crate::error::PlanError;
use crate::spec::VariableDefinition;

/// Identifies a node within its plan.
pub type NodeId = usize;

/// GraphQL operation type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl OperationKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }
}

/// The client operation a plan was computed for.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub variables: IndexMap<String, VariableDefinition>,
}

impl Operation {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, definition: VariableDefinition) -> Self {
        self.variables.insert(name.into(), definition);
        self
    }
}

#[derive(Debug)]
struct PlanEntry {
    node: Arc<dyn ExecutionNode>,
    dependencies: Vec<NodeId>,
    dependents: Vec<NodeId>,
}

/// An immutable DAG of execution nodes.
///
/// Plans are shared read-only between all the requests executing them.
#[derive(Debug)]
pub struct OperationPlan {
    operation: Operation,
    nodes: IndexMap<NodeId, PlanEntry>,
    roots: Vec<NodeId>,
}

impl OperationPlan {
    pub fn builder() -> PlanBuilder {
        PlanBuilder::default()
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind
    }

    /// Nodes without dependencies, in document order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> Option<&Arc<dyn ExecutionNode>> {
        self.nodes.get(&id).map(|entry| &entry.node)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn dependencies(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|entry| entry.dependencies.as_slice())
            .unwrap_or_default()
    }

    pub fn dependents(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|entry| entry.dependents.as_slice())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains_mutations(&self) -> bool {
        self.operation.kind == OperationKind::Mutation
    }

    /// Number of nodes fetching from a subgraph.
    pub fn subgraph_fetches(&self) -> usize {
        self.nodes
            .values()
            .filter(|entry| entry.node.subgraph().is_some())
            .count()
    }
}

/// Builds an [`OperationPlan`], checking that it forms a DAG.
#[derive(Default)]
pub struct PlanBuilder {
    nodes: IndexMap<NodeId, (Arc<dyn ExecutionNode>, Vec<NodeId>)>,
    duplicates: Vec<NodeId>,
}

impl PlanBuilder {
    /// Adds a node and the nodes it depends on.
    pub fn node(
        self,
        node: impl ExecutionNode + 'static,
        dependencies: impl IntoIterator<Item = NodeId>,
    ) -> Self {
        self.shared_node(Arc::new(node), dependencies)
    }

    pub fn shared_node(
        mut self,
        node: Arc<dyn ExecutionNode>,
        dependencies: impl IntoIterator<Item = NodeId>,
    ) -> Self {
        let id = node.id();
        if self.nodes.contains_key(&id) {
            self.duplicates.push(id);
        } else {
            let dependencies: IndexSet<NodeId> = dependencies.into_iter().collect();
            self.nodes
                .insert(id, (node, dependencies.into_iter().collect()));
        }
        self
    }

    pub fn build(self, operation: Operation) -> Result<OperationPlan, PlanError> {
        if let Some(id) = self.duplicates.first() {
            return Err(PlanError::DuplicateNode(*id));
        }

        let mut nodes: IndexMap<NodeId, PlanEntry> = IndexMap::with_capacity(self.nodes.len());
        for (id, (node, dependencies)) in self.nodes {
            nodes.insert(
                id,
                PlanEntry {
                    node,
                    dependencies,
                    dependents: Vec::new(),
                },
            );
        }

        let mut edges = Vec::new();
        for (id, entry) in nodes.iter() {
            for dependency in &entry.dependencies {
                if !nodes.contains_key(dependency) {
                    return Err(PlanError::UnknownDependency {
                        node: *id,
                        dependency: *dependency,
                    });
                }
                edges.push((*dependency, *id));
            }
        }
        for (dependency, dependent) in edges {
            if let Some(entry) = nodes.get_mut(&dependency) {
                entry.dependents.push(dependent);
            }
        }

        let roots: Vec<NodeId> = nodes
            .iter()
            .filter(|(_, entry)| entry.dependencies.is_empty())
            .map(|(id, _)| *id)
            .collect();
        if roots.is_empty() {
            return Err(PlanError::NoRoots);
        }

        // Kahn's algorithm: whatever cannot be ordered is part of a cycle
        let mut in_degree: IndexMap<NodeId, usize> = nodes
            .iter()
            .map(|(id, entry)| (*id, entry.dependencies.len()))
            .collect();
        let mut queue: VecDeque<NodeId> = roots.iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            let dependents = nodes
                .get(&id)
                .map(|entry| entry.dependents.as_slice())
                .unwrap_or_default();
            for dependent in dependents {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }
        let cycle: Vec<NodeId> = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(id, _)| id)
            .collect();
        if !cycle.is_empty() {
            return Err(PlanError::Cycle(cycle));
        }

        Ok(OperationPlan {
            operation,
            nodes,
            roots,
        })
    }
}
