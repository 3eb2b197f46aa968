use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::ExecutionNode;
use super::ExecutionNodeResult;
use super::NodeContext;
use super::NodeId;
use super::SubscriptionNode;
use crate::error::FetchError;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::graphql::ResponseStream;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::result::FetchResult;

/// The root of a subscription plan: a subscription opened on one subgraph.
///
/// Every event it receives is written at the root of the response, then the rest of the plan
/// runs against it.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeNode {
    id: NodeId,
    service_name: String,
    operation: String,
    operation_name: Option<String>,
    variable_usages: Vec<String>,
    path: Path,
}

impl SubscribeNode {
    pub fn new(id: NodeId, service_name: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            id,
            service_name: service_name.into(),
            operation: operation.into(),
            operation_name: None,
            variable_usages: Vec::new(),
            path: Path::empty(),
        }
    }

    pub fn with_operation_name(mut self, operation_name: impl Into<String>) -> Self {
        self.operation_name = Some(operation_name.into());
        self
    }

    /// The request variables forwarded to the subgraph.
    pub fn with_variable_usages<I, S>(mut self, variable_usages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variable_usages = variable_usages.into_iter().map(Into::into).collect();
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

#[async_trait]
impl ExecutionNode for SubscribeNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn subgraph(&self) -> Option<&str> {
        Some(&self.service_name)
    }

    fn as_subscription(&self) -> Option<&dyn SubscriptionNode> {
        Some(self)
    }

    async fn execute(
        &self,
        _context: &NodeContext,
        _cancellation: &CancellationToken,
    ) -> ExecutionNodeResult {
        ExecutionNodeResult::failed(
            self.id,
            FetchError::SubscriptionError {
                service: self.service_name.clone(),
                reason: "subscription roots only run through the subscription protocol"
                    .to_string(),
            },
        )
    }
}

#[async_trait]
impl SubscriptionNode for SubscribeNode {
    async fn subscribe(&self, context: &NodeContext) -> Result<ResponseStream, FetchError> {
        let client = context.subgraph(&self.service_name)?;
        let variables = context
            .variables()
            .to_object(self.variable_usages.iter().map(String::as_str));
        tracing::debug!(
            "opening subscription on '{}' with {} variables",
            self.service_name,
            variables.len()
        );
        let request = Request::builder()
            .query(self.operation.clone())
            .and_operation_name(self.operation_name.clone())
            .variables(variables)
            .build();
        client.subscribe(request).await
    }

    fn event_result(&self, event: Response) -> ExecutionNodeResult {
        if !event.has_data() {
            if event.errors.is_empty() {
                return ExecutionNodeResult::failed(
                    self.id,
                    FetchError::SubscriptionError {
                        service: self.service_name.clone(),
                        reason: "received an event without data".to_string(),
                    },
                );
            }
            return ExecutionNodeResult::failed_with_errors(self.id, event.errors);
        }

        let result = FetchResult::new(self.path.clone(), event.data.unwrap_or(Value::Null))
            .with_errors(event.errors)
            .with_extensions(event.extensions);
        ExecutionNodeResult::success(self.id, vec![result])
    }
}
