use parking_lot::RwLock;

use super::FetchResult;
use crate::error::ExecutionError;
use crate::graphql::Error;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;

/// The fragments saved at one response path, and the deeper paths below it.
#[derive(Debug, Default)]
struct ResultNode {
    path: Path,
    results: Vec<FetchResult>,
    children: Vec<ResultNode>,
}

impl ResultNode {
    fn leaf(result: FetchResult) -> Self {
        Self {
            path: result.target.clone(),
            results: vec![result],
            children: Vec::new(),
        }
    }

    /// Inserts `result` below the deepest node whose data resolves its target.
    ///
    /// Hands the result back if neither this node nor any of its descendants can hold it.
    fn insert(&mut self, result: FetchResult) -> Result<(), FetchResult> {
        if self.path == result.target {
            self.results.push(result);
            return Ok(());
        }

        let target = result.target.clone();
        let result = match self
            .children
            .iter_mut()
            .filter(|child| target.starts_with(&child.path))
            .max_by_key(|child| child.path.len())
        {
            Some(child) => match child.insert(result) {
                Ok(()) => return Ok(()),
                Err(result) => result,
            },
            None => result,
        };

        match target.strip_prefix(&self.path) {
            Some(remaining) if self.resolves(&remaining) => {
                self.children.push(ResultNode::leaf(result));
                Ok(())
            }
            _ => Err(result),
        }
    }

    /// The container holding the last element of `remaining` exists in one of our fragments.
    fn resolves(&self, remaining: &Path) -> bool {
        let container = remaining.parent().unwrap_or_default();
        self.results
            .iter()
            .filter_map(FetchResult::source_data)
            .filter_map(|data| data.get_path(&container))
            .any(|value| value.is_object() || value.is_array())
    }

    /// Merges the fragments of this node only.
    fn own_data(&self) -> Value {
        let mut data = Value::Null;
        for fragment in self.results.iter().filter_map(FetchResult::source_data) {
            data.deep_merge(fragment.clone());
        }
        data
    }

    /// Merges the fragments of this node then the ones of its children, at their paths.
    fn merge_into(&self, data: &mut Value) {
        for fragment in self.results.iter().filter_map(FetchResult::source_data) {
            if !fragment.is_null() && !data.insert_at(&self.path, fragment.clone()) {
                tracing::warn!("could not write fetched data at '{}'", self.path);
            }
        }
        for child in &self.children {
            child.merge_into(data);
        }
    }

    /// Finds the node closest to `path` whose own fragments contain it.
    fn locate(&self, path: &Path) -> Option<Value> {
        if self.path == *path {
            return Some(self.own_data());
        }
        let child = self
            .children
            .iter()
            .filter(|child| path.starts_with(&child.path))
            .max_by_key(|child| child.path.len());
        if let Some(value) = child.and_then(|child| child.locate(path)) {
            return Some(value);
        }
        let remaining = path.strip_prefix(&self.path)?;
        self.own_data().get_path(&remaining).cloned()
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    root: ResultNode,
    errors: Vec<Error>,
    extensions: Value,
    unresolved: Vec<Path>,
}

/// Fetched fragments, indexed by the response path they were written to.
///
/// The store is append-only for the duration of a request. During execution only the scheduler
/// writes to it, but every operation takes the internal lock so it can be read from any node and
/// shared between threads.
#[derive(Debug, Default)]
pub struct FetchResultStore {
    inner: RwLock<StoreInner>,
}

impl FetchResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a fragment at its target path.
    ///
    /// Fails if no fragment saved so far holds the path: the plan ran a node before the data it
    /// depends on was fetched.
    pub fn save(&self, result: FetchResult) -> Result<(), ExecutionError> {
        if !result.target.is_concrete() {
            return Err(ExecutionError::InconsistentPlan {
                reason: format!("cannot save data at '{}': not a concrete path", result.target),
            });
        }

        let mut inner = self.inner.write();
        inner.errors.extend(result.errors.iter().cloned());
        if !result.extensions.is_empty() {
            inner
                .extensions
                .deep_merge(Value::Object(result.extensions.clone()));
        }

        if result.target.is_empty() {
            inner.root.results.push(result);
            return Ok(());
        }
        inner.root.insert(result).map_err(|result| {
            ExecutionError::InconsistentPlan {
                reason: format!("no fetched data resolves path '{}'", result.target),
            }
        })
    }

    /// Records an error that did not come with any fragment.
    pub fn add_error(&self, error: Error) {
        self.inner.write().errors.push(error);
    }

    /// Records a path that will never get data: it is set to `null` in the final response if
    /// its parent object exists.
    pub fn mark_unresolved(&self, path: Path) {
        self.inner.write().unresolved.push(path);
    }

    /// Returns `true` if nothing was saved yet.
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read();
        inner.root.results.is_empty() && inner.root.children.is_empty()
    }

    /// The value at `path`, read from the fragments saved closest to it.
    ///
    /// A fragment saved exactly at `path` is returned as saved, without the data its ancestors
    /// may hold at the same location.
    pub fn get(&self, path: &Path) -> Option<Value> {
        self.inner.read().root.locate(path)
    }

    /// All the fragments, merged into one response tree.
    pub fn data(&self) -> Value {
        let mut data = Value::Null;
        self.inner.read().root.merge_into(&mut data);
        data
    }

    /// Unrolls `path` over the merged data.
    ///
    /// Every list crossed by a flatten element yields one entry per item, and type conditions
    /// only keep the objects of that type. Returns the concrete path and the value of every
    /// non-null element reached.
    pub fn expand(&self, path: &Path) -> Vec<(Path, Value)> {
        let data = self.data();
        let mut elements = Vec::new();
        expand_value(&data, &path.0, Path::empty(), &mut elements);
        elements
    }

    /// Builds the response: merged data, every error recorded, merged extensions.
    pub fn complete(&self) -> Response {
        let inner = self.inner.read();
        let mut data = Value::Null;
        inner.root.merge_into(&mut data);
        for path in &inner.unresolved {
            set_null_if_missing(&mut data, path);
        }

        let extensions = match &inner.extensions {
            Value::Object(extensions) => extensions.clone(),
            _ => Object::new(),
        };
        Response {
            data: Some(data),
            errors: inner.errors.clone(),
            extensions,
        }
    }
}

fn expand_value(
    value: &Value,
    path: &[PathElement],
    current: Path,
    elements: &mut Vec<(Path, Value)>,
) {
    let Some((element, rest)) = path.split_first() else {
        if !value.is_null() {
            elements.push((current, value.clone()));
        }
        return;
    };

    match (element, value) {
        (PathElement::Flatten, Value::Array(items)) => {
            for (index, item) in items.iter().enumerate() {
                let mut item_path = current.clone();
                item_path.push(PathElement::Index(index));
                expand_value(item, rest, item_path, elements);
            }
        }
        (PathElement::Index(index), Value::Array(items)) => {
            if let Some(item) = items.get(*index) {
                let mut item_path = current;
                item_path.push(PathElement::Index(*index));
                expand_value(item, rest, item_path, elements);
            }
        }
        (PathElement::Key(key), Value::Object(object)) => {
            if let Some(field) = object.get(key.as_str()) {
                let mut field_path = current;
                field_path.push(PathElement::Key(key.clone()));
                expand_value(field, rest, field_path, elements);
            }
        }
        (PathElement::Fragment(condition), value) => {
            if value.typename() == Some(condition.as_str()) {
                expand_value(value, rest, current, elements);
            }
        }
        _ => {}
    }
}

fn set_null_if_missing(data: &mut Value, path: &Path) {
    let (Some(PathElement::Key(key)), Some(parent)) = (path.last(), path.parent()) else {
        return;
    };
    let mut parents = Vec::new();
    expand_value(data, &parent.0, Path::empty(), &mut parents);
    for (parent_path, _) in parents {
        if let Some(Value::Object(object)) = data.get_path_mut(&parent_path) {
            if !object.contains_key(key.as_str()) {
                object.insert(key.as_str(), Value::Null);
            }
        }
    }
}
