//! Subgraph clients used by execution nodes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::graphql::ResponseStream;

/// Sends GraphQL requests to one subgraph.
///
/// Transport, retries and connection pooling are up to the implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubgraphClient: Send + Sync {
    /// Sends one request and waits for its response.
    async fn fetch(&self, request: Request) -> Result<Response, FetchError>;

    /// Opens a subscription: every item of the stream is one event.
    async fn subscribe(&self, request: Request) -> Result<ResponseStream, FetchError>;
}

/// The subgraph clients, by subgraph name.
#[derive(Clone, Default)]
pub struct SubgraphRegistry {
    clients: HashMap<String, Arc<dyn SubgraphClient>>,
}

impl SubgraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subgraph(
        mut self,
        name: impl Into<String>,
        client: impl SubgraphClient + 'static,
    ) -> Self {
        self.insert(name, Arc::new(client));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, client: Arc<dyn SubgraphClient>) {
        self.clients.insert(name.into(), client);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn SubgraphClient>, FetchError> {
        self.clients
            .get(name)
            .cloned()
            .ok_or_else(|| FetchError::UnknownSubgraph {
                service: name.to_string(),
            })
    }
}

impl fmt::Debug for SubgraphRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.clients.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("SubgraphRegistry")
            .field("subgraphs", &names)
            .finish()
    }
}
