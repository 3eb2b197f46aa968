#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use apollo_plan_executor::error::FetchError;
use apollo_plan_executor::graphql::Request;
use apollo_plan_executor::graphql::Response;
use apollo_plan_executor::graphql::ResponseStream;
use apollo_plan_executor::json_ext::Value;
use apollo_plan_executor::plan::Field;
use apollo_plan_executor::plan::InlineFragment;
use apollo_plan_executor::plan::Selection;
use apollo_plan_executor::SubgraphClient;
use async_trait::async_trait;
use futures::StreamExt;

/// Every call received by the test subgraphs, in order.
#[derive(Clone, Default)]
pub struct Calls(Arc<Mutex<Vec<String>>>);

impl Calls {
    pub fn log(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Number of fetches per subgraph.
    pub fn totals(&self) -> HashMap<String, usize> {
        let mut totals = HashMap::new();
        for entry in self.0.lock().unwrap().iter() {
            if let Some(subgraph) = entry.strip_prefix("start ") {
                *totals.entry(subgraph.to_string()).or_insert(0) += 1;
            }
        }
        totals
    }

    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }
}

/// A subgraph answering canned responses by query.
pub struct MockSubgraph {
    name: String,
    responses: HashMap<String, Result<Response, FetchError>>,
    events: Vec<Response>,
    delay: Duration,
    calls: Calls,
}

impl MockSubgraph {
    pub fn new(name: &str, calls: &Calls) -> Self {
        Self {
            name: name.to_string(),
            responses: HashMap::new(),
            events: Vec::new(),
            delay: Duration::ZERO,
            calls: calls.clone(),
        }
    }

    pub fn with_data(mut self, query: &str, data: Value) -> Self {
        self.responses
            .insert(query.to_string(), Ok(Response::builder().data(data).build()));
        self
    }

    pub fn with_error(mut self, query: &str, error: FetchError) -> Self {
        self.responses.insert(query.to_string(), Err(error));
        self
    }

    pub fn with_events(mut self, events: Vec<Value>) -> Self {
        self.events = events
            .into_iter()
            .map(|data| Response::builder().data(data).build())
            .collect();
        self
    }

    /// Every fetch waits this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl SubgraphClient for MockSubgraph {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        self.calls.push(format!("start {}", self.name));
        tokio::time::sleep(self.delay).await;
        self.calls.push(format!("end {}", self.name));
        self.responses
            .get(&request.query)
            .cloned()
            .unwrap_or_else(|| {
                Err(FetchError::SubrequestHttpError {
                    status_code: Some(400),
                    service: self.name.clone(),
                    reason: format!("unexpected query {}", request.query),
                })
            })
    }

    async fn subscribe(&self, _request: Request) -> Result<ResponseStream, FetchError> {
        self.calls.push(format!("subscribe {}", self.name));
        Ok(tokio_stream::iter(self.events.clone()).boxed())
    }
}

pub fn field(name: &str) -> Selection {
    Selection::Field(Field::new(name))
}

/// The representation of an entity: its typename and key fields.
pub fn requires(type_condition: &str, keys: &[&str]) -> Vec<Selection> {
    let mut selections = vec![field("__typename")];
    selections.extend(keys.iter().map(|key| field(key)));
    vec![Selection::InlineFragment(InlineFragment {
        type_condition: Some(type_condition.to_string()),
        selections,
    })]
}
