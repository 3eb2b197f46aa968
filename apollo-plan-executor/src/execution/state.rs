use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use futures::FutureExt;
use indexmap::IndexSet;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::trace::ExecutionTrace;
use crate::error::ExecutionError;
use crate::error::FetchError;
use crate::graphql::Response;
use crate::json_ext::Path;
use crate::plan::ExecutionNodeResult;
use crate::plan::ExecutionStatus;
use crate::plan::NodeContext;
use crate::plan::NodeId;
use crate::plan::OperationKind;
use crate::plan::OperationPlan;

pub(crate) const EXECUTION_NODE_SPAN_NAME: &str = "execution_node";
pub(crate) const EXECUTION_TRACE_EXTENSION: &str = "executionTrace";

/// When [`ExecutionState::run`] returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Until {
    /// Nothing is left to start or to wait for.
    Exhausted,
    /// Every started node settled, the backlog may still hold nodes of later roots.
    Settled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SkipReason {
    /// A dependency failed: the node is reported in the response errors.
    DependencyFailed,
    /// A dependency was skipped or did not select this branch.
    NotRequired,
}

/// The scheduler of one operation.
///
/// Only the task driving [`ExecutionState::run`] touches the backlog and the node sets. Node
/// executions run as separate tasks and report back through the completion channel, waking the
/// scheduler through `signal`.
pub(crate) struct ExecutionState {
    plan: Arc<OperationPlan>,
    context: NodeContext,
    cancellation: CancellationToken,
    backlog: IndexSet<NodeId>,
    active: HashSet<NodeId>,
    completed: HashSet<NodeId>,
    settled: HashSet<NodeId>,
    sender: Sender<ExecutionNodeResult>,
    receiver: Receiver<ExecutionNodeResult>,
    signal: Arc<Notify>,
    trace: ExecutionTrace,
}

impl ExecutionState {
    pub(crate) fn new(
        plan: Arc<OperationPlan>,
        context: NodeContext,
        cancellation: CancellationToken,
        expose_trace: bool,
    ) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            backlog: IndexSet::with_capacity(plan.len()),
            plan,
            context,
            cancellation,
            active: HashSet::new(),
            completed: HashSet::new(),
            settled: HashSet::new(),
            sender,
            receiver,
            signal: Arc::new(Notify::new()),
            trace: ExecutionTrace::new(expose_trace),
        }
    }

    #[cfg(test)]
    pub(crate) fn trace(&self) -> &ExecutionTrace {
        &self.trace
    }

    /// Forgets everything about the previous pass.
    ///
    /// Nodes still running from that pass report to a channel nobody listens to anymore.
    pub(crate) fn reset(&mut self, context: NodeContext, cancellation: CancellationToken) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.context = context;
        self.cancellation = cancellation;
        self.backlog.clear();
        self.active.clear();
        self.completed.clear();
        self.settled.clear();
        self.sender = sender;
        self.receiver = receiver;
        self.signal = Arc::new(Notify::new());
        self.trace.clear();
    }

    pub(crate) fn fill_backlog(&mut self) {
        let roots = self.plan.roots();
        match self.plan.kind() {
            OperationKind::Query => {
                self.backlog.extend(self.plan.node_ids());
            }
            OperationKind::Mutation => {
                self.backlog
                    .extend(self.plan.node_ids().filter(|id| !roots.contains(id)));
            }
            OperationKind::Subscription => {
                self.backlog
                    .extend(self.plan.node_ids().filter(|id| !roots.contains(id)));
                // the root is the subscription itself, every event completes it
                self.active.extend(roots.iter().copied());
            }
        }
    }

    /// Hands the scheduler a result produced outside of a node execution.
    pub(crate) fn push(&self, result: ExecutionNodeResult) {
        if self.sender.send(result).is_ok() {
            self.signal.notify_one();
        }
    }

    /// Starts a node without waiting for it.
    pub(crate) fn start_node(&mut self, id: NodeId) {
        let Some(node) = self.plan.node(id).cloned() else {
            tracing::error!("node {id} is not part of the plan");
            return;
        };
        self.backlog.shift_remove(&id);
        self.active.insert(id);
        tracing::trace!("starting node {id}");

        let span = tracing::info_span!(
            EXECUTION_NODE_SPAN_NAME,
            "otel.kind" = "INTERNAL",
            "node.id" = id,
            "apollo.subgraph.name" = node.subgraph().unwrap_or_default(),
        );
        let context = self.context.clone();
        let cancellation = self.cancellation.clone();
        let sender = self.sender.clone();
        let signal = self.signal.clone();
        tokio::spawn(
            async move {
                let start = Instant::now();
                let mut result = match AssertUnwindSafe(node.execute(&context, &cancellation))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(panic) => {
                        let reason = panic_reason(panic.as_ref());
                        failfast_error!("node {} panicked: {}", id, reason);
                        ExecutionNodeResult::failed(id, FetchError::NodePanicked { node: id, reason })
                    }
                };
                result.duration = start.elapsed();
                // Ignore the error if the operation ended already
                if sender.send(result).is_ok() {
                    signal.notify_one();
                }
            }
            .instrument(span),
        );
    }

    /// Starts every backlog node whose dependencies all completed.
    fn start_ready_nodes(&mut self) -> usize {
        let ready = self
            .backlog
            .iter()
            .copied()
            .filter(|id| {
                self.plan
                    .dependencies(*id)
                    .iter()
                    .all(|dependency| self.completed.contains(dependency))
            })
            .collect::<Vec<_>>();
        for id in &ready {
            self.start_node(*id);
        }
        ready.len()
    }

    /// Completes every result waiting in the channel.
    fn drain(&mut self) -> Result<usize, ExecutionError> {
        let mut drained = 0;
        while let Ok(result) = self.receiver.try_recv() {
            drained += 1;
            self.complete_node(result)?;
        }
        Ok(drained)
    }

    fn complete_node(&mut self, result: ExecutionNodeResult) -> Result<(), ExecutionError> {
        let ExecutionNodeResult {
            id,
            status,
            duration,
            error,
            dependents_to_execute,
            variable_values,
            fetch_results,
            errors,
        } = result;
        if !self.active.remove(&id) {
            tracing::warn!("ignoring result of node {id}, which was not running");
            return Ok(());
        }
        tracing::trace!("node {id} completed with status {status:?} in {duration:?}");

        let store = self.context.store();
        for fetch_result in fetch_results {
            store.save(fetch_result)?;
        }
        for error in errors {
            store.add_error(error);
        }
        self.trace.record(id, status, duration, variable_values);

        let path = self.node_path(id);
        if let Some(error) = error {
            store.add_error(error.to_graphql_error(error_path(&path)));
        }

        match status {
            ExecutionStatus::Success | ExecutionStatus::PartialSuccess => {
                self.completed.insert(id);
                if let Some(selected) = dependents_to_execute {
                    let dependents = self.plan.dependents(id).to_vec();
                    for dependent in dependents {
                        if !selected.contains(&dependent) {
                            self.skip(dependent, SkipReason::NotRequired);
                        }
                    }
                }
            }
            ExecutionStatus::Skipped => {
                self.settled.insert(id);
                self.skip_dependents(id, SkipReason::NotRequired);
            }
            ExecutionStatus::Failed => {
                self.settled.insert(id);
                store.mark_unresolved(path);
                self.skip_dependents(id, SkipReason::DependencyFailed);
            }
        }
        Ok(())
    }

    fn skip_dependents(&mut self, id: NodeId, reason: SkipReason) {
        let dependents = self.plan.dependents(id).to_vec();
        for dependent in dependents {
            self.skip(dependent, reason);
        }
    }

    /// Removes a node and everything depending on it from the backlog.
    ///
    /// Nodes that are not in the backlog anymore were already started or settled and are left
    /// alone.
    fn skip(&mut self, id: NodeId, reason: SkipReason) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            if !self.backlog.shift_remove(&id) {
                continue;
            }
            tracing::trace!("skipping node {id}: {reason:?}");
            self.settled.insert(id);
            self.trace.record_skip(id);
            if reason == SkipReason::DependencyFailed {
                let path = self.node_path(id);
                let store = self.context.store();
                store.add_error(FetchError::NodeSkipped { node: id }.to_graphql_error(error_path(&path)));
                store.mark_unresolved(path);
            }
            pending.extend(self.plan.dependents(id).iter().rev().copied());
        }
    }

    /// Drives the operation until `until` holds.
    pub(crate) async fn run(&mut self, until: Until) -> Result<(), ExecutionError> {
        loop {
            let drained = self.drain()?;
            let started = self.start_ready_nodes();

            let pending = match until {
                Until::Exhausted => !self.backlog.is_empty() || !self.active.is_empty(),
                Until::Settled => !self.active.is_empty(),
            };
            if !pending {
                return Ok(());
            }

            if drained == 0 && started == 0 {
                if self.active.is_empty() {
                    return Err(ExecutionError::InconsistentPlan {
                        reason: format!(
                            "nodes {:?} can never start",
                            self.backlog.iter().collect::<Vec<_>>()
                        ),
                    });
                }
                self.signal.notified().await;
            }
        }
    }

    pub(crate) async fn run_query(&mut self) -> Result<(), ExecutionError> {
        self.fill_backlog();
        self.run(Until::Exhausted).await
    }

    /// Runs the roots one after the other, each one with its whole subtree.
    pub(crate) async fn run_mutation(&mut self) -> Result<(), ExecutionError> {
        self.fill_backlog();
        let roots = self.plan.roots().to_vec();
        for root in roots {
            if self.cancellation.is_cancelled() {
                return Ok(());
            }
            self.start_node(root);
            self.run(Until::Settled).await?;
        }

        if self.backlog.is_empty() {
            Ok(())
        } else {
            Err(ExecutionError::InconsistentPlan {
                reason: format!(
                    "nodes {:?} depend on no mutation root",
                    self.backlog.iter().collect::<Vec<_>>()
                ),
            })
        }
    }

    /// Gives up on every node that did not settle yet.
    ///
    /// Results already waiting in the channel are kept, the other nodes get an error at their
    /// path.
    pub(crate) fn abandon(&mut self, reason: &str) -> Result<(), ExecutionError> {
        self.drain()?;
        let abandoned = self
            .plan
            .node_ids()
            .filter(|id| !self.completed.contains(id) && !self.settled.contains(id))
            .collect::<Vec<_>>();
        if !abandoned.is_empty() {
            tracing::debug!("abandoning nodes {abandoned:?}: {reason}");
        }

        let store = self.context.store();
        for id in abandoned {
            let path = self.node_path(id);
            store.add_error(
                FetchError::NodeNotExecuted {
                    node: id,
                    reason: reason.to_string(),
                }
                .to_graphql_error(error_path(&path)),
            );
            store.mark_unresolved(path);
            self.trace.record_skip(id);
            self.settled.insert(id);
        }
        self.backlog.clear();
        self.active.clear();
        Ok(())
    }

    /// Assembles the response from everything fetched so far.
    pub(crate) fn complete(&self) -> Response {
        let mut response = self.context.store().complete();
        if self.trace.is_enabled() {
            response
                .extensions
                .insert(EXECUTION_TRACE_EXTENSION, self.trace.to_value());
        }
        response
    }

    fn node_path(&self, id: NodeId) -> Path {
        self.plan
            .node(id)
            .map(|node| node.path().clone())
            .unwrap_or_default()
    }
}

/// Errors about the root of the response carry no path.
fn error_path(path: &Path) -> Option<Path> {
    (!path.is_empty()).then(|| path.clone())
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(reason) = panic.downcast_ref::<&str>() {
        reason.to_string()
    } else if let Some(reason) = panic.downcast_ref::<String>() {
        reason.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
