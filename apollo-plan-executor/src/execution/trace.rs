use std::time::Duration;

use serde::Serialize;

use crate::json_ext::Value;
use crate::plan::ExecutionStatus;
use crate::plan::NodeId;
use crate::plan::VariableValueSet;

/// The record of one node, completed or skipped.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTrace {
    pub node: NodeId,
    pub status: ExecutionStatus,
    #[serde(rename = "durationNs", serialize_with = "serialize_nanos")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableValueSet>,
}

fn serialize_nanos<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
}

/// Node records of one operation, in the order the scheduler settled them.
#[derive(Clone, Debug, Default)]
pub struct ExecutionTrace {
    enabled: bool,
    nodes: Vec<NodeTrace>,
}

impl ExecutionTrace {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            nodes: Vec::new(),
        }
    }

    pub(crate) fn record(
        &mut self,
        node: NodeId,
        status: ExecutionStatus,
        duration: Duration,
        variables: Vec<VariableValueSet>,
    ) {
        if self.enabled {
            self.nodes.push(NodeTrace {
                node,
                status,
                duration,
                variables,
            });
        }
    }

    pub(crate) fn record_skip(&mut self, node: NodeId) {
        self.record(node, ExecutionStatus::Skipped, Duration::ZERO, Vec::new());
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn nodes(&self) -> &[NodeTrace] {
        &self.nodes
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
    }

    /// The value exposed in the `executionTrace` response extension.
    pub(crate) fn to_value(&self) -> Value {
        serde_json_bytes::to_value(&self.nodes).unwrap_or_default()
    }
}
