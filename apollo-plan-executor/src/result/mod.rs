//! Data fetched from subgraphs and its assembly into a response.

mod store;

pub use store::FetchResultStore;

use crate::graphql::Error;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;

/// One fragment of data fetched from a subgraph.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchResult {
    /// The response path of the node that fetched this, possibly crossing lists.
    pub path: Path,
    /// The concrete response path the data is written to.
    pub target: Path,
    /// Where the data starts within `data`.
    pub source: Path,
    pub data: Value,
    pub errors: Vec<Error>,
    pub extensions: Object,
}

impl FetchResult {
    /// A fragment written where it was read from, as for root fetches.
    pub fn new(path: Path, data: Value) -> Self {
        Self {
            target: path.clone(),
            path,
            data,
            ..Default::default()
        }
    }

    pub fn with_target(mut self, target: Path) -> Self {
        self.target = target;
        self
    }

    pub fn with_source(mut self, source: Path) -> Self {
        self.source = source;
        self
    }

    pub fn with_errors(mut self, errors: Vec<Error>) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_extensions(mut self, extensions: Object) -> Self {
        self.extensions = extensions;
        self
    }

    /// The part of the payload that lands at [`FetchResult::target`].
    pub fn source_data(&self) -> Option<&Value> {
        self.data.get_path(&self.source)
    }
}
