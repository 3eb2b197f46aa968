//! Executes federated operation plans.
//!
//! An [`OperationPlan`] is a DAG of execution nodes, each fetching part of the response from a
//! subgraph. The [`OperationPlanExecutor`] runs every node as soon as the nodes it depends on
//! completed, contains failures to the subtree of the failed node, and assembles the fetched
//! fragments into a single GraphQL response.

#![cfg_attr(feature = "failfast", allow(unreachable_code))]
#![warn(unreachable_pub)]

macro_rules! failfast_debug {
    ($($tokens:tt)+) => {{
        tracing::debug!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

macro_rules! failfast_error {
    ($($tokens:tt)+) => {{
        tracing::error!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

pub mod configuration;
pub mod error;
pub mod execution;
pub mod graphql;
pub mod json_ext;
pub mod plan;
pub mod result;
pub mod services;
pub mod spec;

pub use configuration::Configuration;
pub use execution::ExecutionRequest;
pub use execution::OperationPlanExecutor;
pub use plan::OperationPlan;
pub use services::SubgraphClient;
pub use services::SubgraphRegistry;
