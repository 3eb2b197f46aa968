use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::ExecutionNode;
use super::ExecutionNodeResult;
use super::NodeContext;
use super::NodeId;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;

/// Picks the dependents to run from the concrete types found at a path.
///
/// Used below fields of abstract types: each dependent only applies to some of the possible
/// types, the ones that matched no object are skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeBranchNode {
    id: NodeId,
    path: Path,
    branches: Vec<(String, NodeId)>,
}

impl TypeBranchNode {
    pub fn new(id: NodeId, path: impl Into<Path>) -> Self {
        Self {
            id,
            path: path.into(),
            branches: Vec::new(),
        }
    }

    /// Runs `dependent` if an object matching `type_condition` is found.
    pub fn with_branch(mut self, type_condition: impl Into<String>, dependent: NodeId) -> Self {
        self.branches.push((type_condition.into(), dependent));
        self
    }
}

#[async_trait]
impl ExecutionNode for TypeBranchNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn execute(
        &self,
        context: &NodeContext,
        _cancellation: &CancellationToken,
    ) -> ExecutionNodeResult {
        let objects: Vec<Value> = if self.path.is_concrete() {
            context.store().get(&self.path).into_iter().collect()
        } else {
            context
                .store()
                .expand(&self.path)
                .into_iter()
                .map(|(_, value)| value)
                .collect()
        };

        // null and empty lists select nothing
        let typenames = objects
            .iter()
            .flat_map(|value| match value {
                Value::Array(items) => items
                    .iter()
                    .filter_map(ValueExt::typename)
                    .collect::<Vec<_>>(),
                object => object.typename().into_iter().collect::<Vec<_>>(),
            })
            .collect::<Vec<_>>();

        let schema = context.schema();
        let dependents = self
            .branches
            .iter()
            .filter(|(condition, _)| {
                typenames
                    .iter()
                    .any(|typename| schema.is_subtype(condition, typename))
            })
            .map(|(_, dependent)| *dependent)
            .collect::<Vec<_>>();
        tracing::trace!(
            "types {:?} at '{}' select dependents {:?}",
            typenames,
            self.path,
            dependents
        );

        ExecutionNodeResult::success(self.id, Vec::new()).with_dependents_to_execute(dependents)
    }
}
