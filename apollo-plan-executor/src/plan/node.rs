use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::NodeId;
use crate::error::FetchError;
use crate::graphql::Error;
use crate::graphql::Response;
use crate::graphql::ResponseStream;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::result::FetchResult;
use crate::result::FetchResultStore;
use crate::services::SubgraphClient;
use crate::services::SubgraphRegistry;
use crate::spec::CoercedVariables;
use crate::spec::TypeSystem;

/// Outcome of one node execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    PartialSuccess,
    Skipped,
    Failed,
}

/// The variables a node sent to its subgraph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VariableValueSet {
    pub subgraph: String,
    pub variables: Object,
}

/// What a node execution reports back to the scheduler.
///
/// Fetched data travels with the result: the scheduler saves it into the result store before any
/// dependent node is started.
#[derive(Debug)]
pub struct ExecutionNodeResult {
    pub id: NodeId,
    pub status: ExecutionStatus,
    pub duration: Duration,
    pub error: Option<FetchError>,
    /// The dependents that should run, when only some of them should.
    pub dependents_to_execute: Option<Vec<NodeId>>,
    pub variable_values: Vec<VariableValueSet>,
    pub fetch_results: Vec<FetchResult>,
    /// Subgraph errors that came without any data to attach them to.
    pub errors: Vec<Error>,
}

impl ExecutionNodeResult {
    fn new(id: NodeId, status: ExecutionStatus) -> Self {
        Self {
            id,
            status,
            duration: Duration::ZERO,
            error: None,
            dependents_to_execute: None,
            variable_values: Vec::new(),
            fetch_results: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn success(id: NodeId, fetch_results: Vec<FetchResult>) -> Self {
        let status = if fetch_results.iter().any(|result| !result.errors.is_empty()) {
            ExecutionStatus::PartialSuccess
        } else {
            ExecutionStatus::Success
        };
        Self {
            fetch_results,
            ..Self::new(id, status)
        }
    }

    pub fn skipped(id: NodeId) -> Self {
        Self::new(id, ExecutionStatus::Skipped)
    }

    pub fn failed(id: NodeId, error: FetchError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(id, ExecutionStatus::Failed)
        }
    }

    /// The subgraph answered with errors only.
    pub fn failed_with_errors(id: NodeId, errors: Vec<Error>) -> Self {
        Self {
            errors,
            ..Self::new(id, ExecutionStatus::Failed)
        }
    }

    /// Only the given dependents will be started, the others are skipped.
    pub fn with_dependents_to_execute(mut self, dependents: Vec<NodeId>) -> Self {
        self.dependents_to_execute = Some(dependents);
        self
    }

    pub fn with_variable_values(mut self, variable_values: Vec<VariableValueSet>) -> Self {
        self.variable_values = variable_values;
        self
    }
}

/// Everything a node needs while it executes.
///
/// Cheap to clone, a copy is handed to every node execution.
#[derive(Clone)]
pub struct NodeContext {
    store: Arc<FetchResultStore>,
    variables: Arc<CoercedVariables>,
    subgraphs: Arc<SubgraphRegistry>,
    schema: Arc<dyn TypeSystem>,
}

impl NodeContext {
    pub fn new(
        store: Arc<FetchResultStore>,
        variables: Arc<CoercedVariables>,
        subgraphs: Arc<SubgraphRegistry>,
        schema: Arc<dyn TypeSystem>,
    ) -> Self {
        Self {
            store,
            variables,
            subgraphs,
            schema,
        }
    }

    /// The results fetched so far.
    pub fn store(&self) -> &FetchResultStore {
        &self.store
    }

    pub fn variables(&self) -> &CoercedVariables {
        &self.variables
    }

    pub fn schema(&self) -> &dyn TypeSystem {
        self.schema.as_ref()
    }

    pub fn subgraph(&self, name: &str) -> Result<Arc<dyn SubgraphClient>, FetchError> {
        self.subgraphs.get(name)
    }

    /// The same context over an empty result store.
    pub(crate) fn with_new_store(&self) -> Self {
        Self {
            store: Arc::new(FetchResultStore::new()),
            ..self.clone()
        }
    }
}

impl fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeContext")
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

/// A unit of work of an operation plan.
///
/// Ordinary subgraph failures are reported as [`ExecutionStatus::Failed`] results, never as
/// panics. Implementations must return promptly once `cancellation` is triggered.
#[async_trait]
pub trait ExecutionNode: Send + Sync + fmt::Debug {
    fn id(&self) -> NodeId;

    /// Where the data of this node lands in the response.
    fn path(&self) -> &Path;

    fn subgraph(&self) -> Option<&str> {
        None
    }

    /// Only implemented by the root of subscription plans.
    fn as_subscription(&self) -> Option<&dyn SubscriptionNode> {
        None
    }

    async fn execute(
        &self,
        context: &NodeContext,
        cancellation: &CancellationToken,
    ) -> ExecutionNodeResult;
}

/// The root of a subscription plan: a standing source of events.
#[async_trait]
pub trait SubscriptionNode: ExecutionNode {
    /// Opens the event stream.
    async fn subscribe(&self, context: &NodeContext) -> Result<ResponseStream, FetchError>;

    /// Turns one event into the result of this node, as if it had just executed.
    fn event_result(&self, event: Response) -> ExecutionNodeResult;
}
