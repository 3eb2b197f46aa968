//! Executor errors.
use std::time::Duration;

use displaydoc::Display;
use serde::Serialize;
use thiserror::Error;

pub use crate::configuration::ConfigurationError;
pub use crate::graphql::Error;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::plan::NodeId;
pub use crate::spec::CoercionError;

/// Trait used to get extension type from an error
pub trait ErrorExtension
where
    Self: Sized,
{
    /// The stable, machine readable code of the error.
    fn extension_code(&self) -> String;

    /// Details added next to the code in the GraphQL error extensions.
    fn custom_extension_details(&self) -> Option<Object> {
        None
    }
}

/// Error types for node execution.
///
/// Note that these are not actually returned to the client, but are instead converted to JSON for
/// [`struct@Error`].
#[derive(Error, Display, Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(untagged)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum FetchError {
    /// HTTP fetch failed from '{service}': {reason}
    ///
    /// note that this relates to a transport error and not a GraphQL error
    SubrequestHttpError {
        /// The HTTP status code, if the subgraph answered at all.
        status_code: Option<u16>,

        /// The service failed.
        service: String,

        /// The reason the fetch failed.
        reason: String,
    },

    /// service '{service}' response was malformed: {reason}
    SubrequestMalformedResponse {
        /// The service that responded with the malformed response.
        service: String,

        /// The reason the serialization failed.
        reason: String,
    },

    /// no client is registered for subgraph '{service}'
    UnknownSubgraph {
        /// The subgraph named by the plan.
        service: String,
    },

    /// node {node} was skipped because one of its dependencies did not succeed
    NodeSkipped {
        /// The skipped node.
        node: NodeId,
    },

    /// node {node} was not executed: {reason}
    NodeNotExecuted {
        /// The node that never ran to completion.
        node: NodeId,

        /// Why the node was abandoned.
        reason: String,
    },

    /// node {node} panicked: {reason}
    NodePanicked {
        /// The node that panicked.
        node: NodeId,

        /// The panic payload, when it was a string.
        reason: String,
    },

    /// subscription to '{service}' failed: {reason}
    SubscriptionError {
        /// The service the subscription was opened on.
        service: String,

        /// The reason the subscription failed.
        reason: String,
    },
}

impl FetchError {
    /// Convert the fetch error to a GraphQL error.
    pub fn to_graphql_error(&self, path: Option<Path>) -> Error {
        let mut extensions = match serde_json_bytes::to_value(self) {
            Ok(Value::Object(extensions)) => extensions,
            _ => Object::new(),
        };
        extensions
            .entry("code")
            .or_insert_with(|| self.extension_code().into());
        match self {
            FetchError::SubrequestHttpError {
                service,
                status_code,
                ..
            } => {
                extensions
                    .entry("service")
                    .or_insert_with(|| service.clone().into());
                extensions.remove("status_code");
                if let Some(status_code) = status_code {
                    extensions.insert("http", serde_json_bytes::json!({ "status": status_code }));
                }
            }
            FetchError::SubrequestMalformedResponse { service, .. }
            | FetchError::UnknownSubgraph { service }
            | FetchError::SubscriptionError { service, .. } => {
                extensions
                    .entry("service")
                    .or_insert_with(|| service.clone().into());
            }
            _ => (),
        }

        Error {
            message: self.to_string(),
            locations: Default::default(),
            path,
            extensions,
        }
    }

    /// Convert the error to an appropriate response.
    pub fn to_response(&self) -> Response {
        Response {
            errors: vec![self.to_graphql_error(None)],
            ..Response::default()
        }
    }
}

impl ErrorExtension for FetchError {
    fn extension_code(&self) -> String {
        match self {
            FetchError::SubrequestHttpError { .. } => "SUBREQUEST_HTTP_ERROR",
            FetchError::SubrequestMalformedResponse { .. } => "SUBREQUEST_MALFORMED_RESPONSE",
            FetchError::UnknownSubgraph { .. } => "UNKNOWN_SUBGRAPH",
            FetchError::NodeSkipped { .. } => "NODE_SKIPPED",
            FetchError::NodeNotExecuted { .. } => "NODE_NOT_EXECUTED",
            FetchError::NodePanicked { .. } => "NODE_PANICKED",
            FetchError::SubscriptionError { .. } => "SUBSCRIPTION_ERROR",
        }
        .to_string()
    }
}

/// Errors that abort a whole operation.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExecutionError {
    /// the operation was cancelled by the caller
    Cancelled,

    /// the operation did not complete within {timeout:?}
    Timeout {
        /// The configured bound.
        timeout: Duration,
    },

    /// inconsistent operation plan: {reason}
    InconsistentPlan {
        /// What the scheduler or the result store could not reconcile.
        reason: String,
    },

    /// cannot run a {kind} operation with this protocol
    UnsupportedOperation {
        /// The kind of the operation that was passed in.
        kind: crate::plan::OperationKind,
    },

    /// invalid subscription plan: {reason}
    InvalidSubscriptionPlan {
        /// What is wrong with the plan.
        reason: String,
    },

    /// could not open the subscription: {0}
    Subscribe(#[from] FetchError),
}

impl ExecutionError {
    /// Convert the execution error to a GraphQL error.
    pub fn to_graphql_error(&self) -> Error {
        let mut extensions = self.custom_extension_details().unwrap_or_default();
        extensions.insert("code", self.extension_code().into());
        Error {
            message: self.to_string(),
            locations: Default::default(),
            path: None,
            extensions,
        }
    }

    /// Convert the error to an appropriate response, without data.
    pub fn to_response(&self) -> Response {
        Response {
            errors: vec![self.to_graphql_error()],
            ..Response::default()
        }
    }
}

impl ErrorExtension for ExecutionError {
    fn extension_code(&self) -> String {
        match self {
            ExecutionError::Cancelled => "EXECUTION_CANCELLED",
            ExecutionError::Timeout { .. } => "EXECUTION_TIMEOUT",
            ExecutionError::InconsistentPlan { .. } => "INCONSISTENT_PLAN",
            ExecutionError::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            ExecutionError::InvalidSubscriptionPlan { .. } => "INVALID_SUBSCRIPTION_PLAN",
            ExecutionError::Subscribe(_) => "SUBSCRIPTION_ERROR",
        }
        .to_string()
    }

    fn custom_extension_details(&self) -> Option<Object> {
        match self {
            ExecutionError::Timeout { timeout } => {
                let mut details = Object::new();
                details.insert(
                    "timeoutMs",
                    serde_json_bytes::json!(timeout.as_millis() as u64),
                );
                Some(details)
            }
            ExecutionError::Subscribe(error) => {
                let mut details = error.to_graphql_error(None).extensions;
                details.remove("code");
                Some(details)
            }
            _ => None,
        }
    }
}

/// Errors found while building an operation plan.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PlanError {
    /// node {0} was added twice
    DuplicateNode(NodeId),

    /// node {node} depends on unknown node {dependency}
    UnknownDependency {
        /// The node declaring the dependency.
        node: NodeId,
        /// The missing dependency.
        dependency: NodeId,
    },

    /// the plan contains a dependency cycle through nodes {0:?}
    Cycle(Vec<NodeId>),

    /// the plan has no root node
    NoRoots,
}
