//! Execution of operation plans.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::sync::Arc;
use std::time::Duration;

use futures::future::ready;
use futures::stream;
use futures::StreamExt;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

mod state;
mod trace;

pub use trace::ExecutionTrace;
pub use trace::NodeTrace;

use self::state::ExecutionState;
use self::state::Until;
use crate::configuration::Configuration;
use crate::error::ExecutionError;
use crate::graphql::Response;
use crate::graphql::ResponseStream;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::plan::ExecutionNode;
use crate::plan::NodeContext;
use crate::plan::OperationKind;
use crate::plan::OperationPlan;
use crate::result::FetchResultStore;
use crate::services::SubgraphRegistry;
use crate::spec::coerce_variable_values;
use crate::spec::TypeSystem;

pub(crate) const QUERY_SPAN_NAME: &str = "query";
pub(crate) const MUTATION_SPAN_NAME: &str = "mutation";
pub(crate) const SUBSCRIPTION_EVENT_SPAN_NAME: &str = "subscription_event";

const SHUTDOWN_REASON: &str = "the executor is shutting down";

/// One operation to execute.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub plan: Arc<OperationPlan>,
    /// The variables supplied by the client, not coerced yet.
    pub variables: Object,
    /// Cancelled by the caller when it is not interested in the response anymore.
    pub cancellation: CancellationToken,
}

#[buildstructor::buildstructor]
impl ExecutionRequest {
    #[builder(visibility = "pub")]
    fn new(
        plan: Arc<OperationPlan>,
        // Skip the `Object` type alias in order to use buildstructor’s map special-casing
        variables: JsonMap<ByteString, Value>,
        cancellation: Option<CancellationToken>,
    ) -> Self {
        Self {
            plan,
            variables,
            cancellation: cancellation.unwrap_or_default(),
        }
    }
}

/// How a bounded run of the scheduler ended.
enum Outcome {
    Done(Result<(), ExecutionError>),
    Cancelled,
    Shutdown,
    TimedOut,
}

/// Executes operation plans against subgraphs.
///
/// The executor is shared by all the requests: every execution derives its own cancellation
/// from the executor's, so [`OperationPlanExecutor::shutdown`] stops them all.
#[derive(Clone)]
pub struct OperationPlanExecutor {
    configuration: Arc<Configuration>,
    subgraphs: Arc<SubgraphRegistry>,
    schema: Arc<dyn TypeSystem>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for OperationPlanExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationPlanExecutor")
            .field("configuration", &self.configuration)
            .field("subgraphs", &self.subgraphs)
            .finish_non_exhaustive()
    }
}

impl OperationPlanExecutor {
    pub fn new(
        configuration: Configuration,
        subgraphs: SubgraphRegistry,
        schema: Arc<dyn TypeSystem>,
    ) -> Self {
        Self {
            configuration: Arc::new(configuration),
            subgraphs: Arc::new(subgraphs),
            schema,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Stops every execution in flight.
    ///
    /// Queries and mutations return what was fetched so far, with errors for the nodes that did
    /// not run. Subscription streams end.
    pub fn shutdown(&self) {
        tracing::info!("shutting down the plan executor");
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Executes any kind of operation.
    ///
    /// Queries and mutations yield a single response.
    pub async fn execute(
        &self,
        request: ExecutionRequest,
    ) -> Result<ResponseStream, ExecutionError> {
        match request.plan.kind() {
            OperationKind::Query => Ok(stream::once(ready(self.query(request).await?)).boxed()),
            OperationKind::Mutation => {
                Ok(stream::once(ready(self.mutation(request).await?)).boxed())
            }
            OperationKind::Subscription => self.subscribe(request).await,
        }
    }

    /// Executes a query: every node starts as soon as its dependencies completed.
    pub async fn query(&self, request: ExecutionRequest) -> Result<Response, ExecutionError> {
        self.execute_operation(request, OperationKind::Query).await
    }

    /// Executes a mutation: roots run one at a time in order, each with its whole subtree.
    pub async fn mutation(&self, request: ExecutionRequest) -> Result<Response, ExecutionError> {
        self.execute_operation(request, OperationKind::Mutation).await
    }

    async fn execute_operation(
        &self,
        request: ExecutionRequest,
        kind: OperationKind,
    ) -> Result<Response, ExecutionError> {
        let ExecutionRequest {
            plan,
            variables,
            cancellation,
        } = request;
        if plan.kind() != kind {
            return Err(ExecutionError::UnsupportedOperation { kind: plan.kind() });
        }

        let span = match kind {
            OperationKind::Mutation => tracing::info_span!(
                MUTATION_SPAN_NAME,
                "otel.kind" = "INTERNAL",
                "graphql.operation.name" = plan.operation().name.as_deref().unwrap_or_default(),
            ),
            _ => tracing::info_span!(
                QUERY_SPAN_NAME,
                "otel.kind" = "INTERNAL",
                "graphql.operation.name" = plan.operation().name.as_deref().unwrap_or_default(),
            ),
        };

        self.run_operation(plan, variables, cancellation, kind)
            .instrument(span)
            .await
    }

    async fn run_operation(
        &self,
        plan: Arc<OperationPlan>,
        variables: Object,
        cancellation: CancellationToken,
        kind: OperationKind,
    ) -> Result<Response, ExecutionError> {
        let context = match self.context(&plan, &variables) {
            Ok(context) => context,
            Err(response) => return Ok(response),
        };

        let node_cancellation = self.shutdown.child_token();
        // Nodes stop as well if this future is dropped
        let nodes_guard = node_cancellation.clone().drop_guard();
        let mut state = ExecutionState::new(
            plan,
            context,
            node_cancellation,
            self.configuration.telemetry.expose_trace,
        );
        let outcome = {
            let run = async {
                match kind {
                    OperationKind::Mutation => state.run_mutation().await,
                    _ => state.run_query().await,
                }
            };
            self.bounded(&cancellation, run).await
        };
        drop(nodes_guard);

        match outcome {
            Outcome::Done(result) => {
                result?;
                Ok(state.complete())
            }
            Outcome::Cancelled => {
                tracing::debug!("{kind} cancelled by the caller");
                Err(ExecutionError::Cancelled)
            }
            Outcome::TimedOut => Ok(self.timeout_response()),
            Outcome::Shutdown => {
                state.abandon(SHUTDOWN_REASON)?;
                Ok(state.complete())
            }
        }
    }

    /// Executes a subscription.
    ///
    /// The stream yields one response per event received by the root node. It ends when the
    /// subgraph stream ends, when the caller cancels or when the executor shuts down.
    pub async fn subscribe(
        &self,
        request: ExecutionRequest,
    ) -> Result<ResponseStream, ExecutionError> {
        let ExecutionRequest {
            plan,
            variables,
            cancellation,
        } = request;
        if plan.kind() != OperationKind::Subscription {
            return Err(ExecutionError::UnsupportedOperation { kind: plan.kind() });
        }
        let root = match plan.roots() {
            [root] => *root,
            roots => {
                return Err(ExecutionError::InvalidSubscriptionPlan {
                    reason: format!("expected exactly one root, found {}", roots.len()),
                })
            }
        };
        let node = plan
            .node(root)
            .cloned()
            .ok_or_else(|| ExecutionError::InvalidSubscriptionPlan {
                reason: format!("root node {root} is missing"),
            })?;

        let context = match self.context(&plan, &variables) {
            Ok(context) => context,
            Err(response) => return Ok(stream::once(ready(response)).boxed()),
        };

        let events = match node.as_subscription() {
            Some(subscription) => subscription.subscribe(&context).await?,
            None => {
                return Err(ExecutionError::InvalidSubscriptionPlan {
                    reason: format!("root node {root} is not a subscription"),
                })
            }
        };
        tracing::debug!("subscription opened on node {root}");

        let state = ExecutionState::new(
            plan,
            context.clone(),
            self.shutdown.child_token(),
            self.configuration.telemetry.expose_trace,
        );
        let subscription = SubscriptionExecution {
            executor: self.clone(),
            node,
            context,
            state,
            events,
            cancellation,
            received: 0,
            finished: false,
        };
        Ok(stream::unfold(subscription, |mut subscription| async move {
            let response = subscription.next_response().await?;
            Some((response, subscription))
        })
        .boxed())
    }

    /// Coerces the request variables into a fresh node context, or returns the response to send
    /// back if they are invalid.
    fn context(&self, plan: &OperationPlan, variables: &Object) -> Result<NodeContext, Response> {
        let coerced =
            coerce_variable_values(&plan.operation().variables, variables, self.schema.as_ref())
                .map_err(|errors| {
                    tracing::debug!("{} invalid variables", errors.len());
                    Response::builder()
                        .errors(errors.iter().map(|error| error.to_graphql_error()).collect())
                        .build()
                })?;
        Ok(NodeContext::new(
            Arc::new(FetchResultStore::new()),
            Arc::new(coerced),
            self.subgraphs.clone(),
            self.schema.clone(),
        ))
    }

    /// Runs `run` until it completes, the caller cancels, the executor shuts down or the
    /// configured timeout elapses.
    async fn bounded<F>(&self, cancellation: &CancellationToken, run: F) -> Outcome
    where
        F: std::future::Future<Output = Result<(), ExecutionError>>,
    {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => Outcome::Cancelled,
            _ = self.shutdown.cancelled() => Outcome::Shutdown,
            _ = tokio::time::sleep(self.configuration.timeout) => Outcome::TimedOut,
            result = run => Outcome::Done(result),
        }
    }

    fn timeout_response(&self) -> Response {
        tracing::debug!(
            "operation did not complete within {:?}",
            self.configuration.timeout
        );
        ExecutionError::Timeout {
            timeout: self.configuration.timeout,
        }
        .to_response()
    }

    fn timeout(&self) -> Duration {
        self.configuration.timeout
    }
}

/// A subscription in progress, consumed one event at a time.
struct SubscriptionExecution {
    executor: OperationPlanExecutor,
    node: Arc<dyn ExecutionNode>,
    context: NodeContext,
    state: ExecutionState,
    events: ResponseStream,
    cancellation: CancellationToken,
    received: usize,
    finished: bool,
}

impl SubscriptionExecution {
    async fn next_response(&mut self) -> Option<Response> {
        if self.finished {
            return None;
        }
        if let Some(max_events) = self.executor.configuration.subscription.max_events {
            if self.received >= max_events {
                tracing::debug!("subscription reached {max_events} events");
                return None;
            }
        }

        let event = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => None,
            _ = self.executor.shutdown.cancelled() => None,
            event = self.events.next() => event,
        };
        let Some(event) = event else {
            tracing::debug!("subscription ended");
            return None;
        };
        self.received += 1;
        let result = self.node.as_subscription()?.event_result(event);

        let node_cancellation = self.executor.shutdown.child_token();
        let nodes_guard = node_cancellation.clone().drop_guard();
        self.state
            .reset(self.context.with_new_store(), node_cancellation);
        self.state.fill_backlog();
        self.state.push(result);

        let span = tracing::info_span!(
            SUBSCRIPTION_EVENT_SPAN_NAME,
            "otel.kind" = "INTERNAL",
            "subscription.event" = self.received,
        );
        let outcome = {
            let state = &mut self.state;
            let run = state.run(Until::Exhausted);
            tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => Outcome::Cancelled,
                _ = self.executor.shutdown.cancelled() => Outcome::Shutdown,
                _ = tokio::time::sleep(self.executor.timeout()) => Outcome::TimedOut,
                result = run.instrument(span) => Outcome::Done(result),
            }
        };
        drop(nodes_guard);

        match outcome {
            Outcome::Done(Ok(())) => Some(self.state.complete()),
            Outcome::Done(Err(error)) => {
                tracing::error!("subscription event could not be executed: {error}");
                self.finished = true;
                Some(error.to_response())
            }
            Outcome::TimedOut => Some(self.executor.timeout_response()),
            Outcome::Cancelled => None,
            Outcome::Shutdown => {
                self.finished = true;
                match self.state.abandon(SHUTDOWN_REASON) {
                    Ok(()) => Some(self.state.complete()),
                    Err(error) => Some(error.to_response()),
                }
            }
        }
    }
}
