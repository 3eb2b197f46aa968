use async_trait::async_trait;
use indexmap::IndexSet;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::Entry;
use tokio_util::sync::CancellationToken;

use super::ExecutionNode;
use super::ExecutionNodeResult;
use super::NodeContext;
use super::NodeId;
use super::VariableValueSet;
use crate::error::FetchError;
use crate::graphql::Error;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::json_ext::TYPENAME;
use crate::result::FetchResult;
use crate::spec::TypeSystem;

const ENTITIES: &str = "_entities";
const REPRESENTATIONS: &str = "representations";

/// A selection that is part of a fetch.
/// Selections are used to propagate data to subgraph fetches.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", tag = "kind")]
pub enum Selection {
    /// A field selection.
    Field(Field),

    /// An inline fragment selection.
    InlineFragment(InlineFragment),
}

/// The field that is used
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// An optional alias for the field.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alias: Option<String>,

    /// The name of the field.
    pub name: String,

    /// The selections for the field.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub selections: Option<Vec<Selection>>,
}

impl Field {
    /// A leaf field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            selections: None,
        }
    }
}

/// An inline fragment.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineFragment {
    /// The required fragment type.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub type_condition: Option<String>,

    /// The selections from the fragment.
    pub selections: Vec<Selection>,
}

/// Projects `input_content` through `selections`.
///
/// Returns `null` if a selected field is missing: such an object cannot be represented.
pub(crate) fn execute_selection_set(
    input_content: &Value,
    selections: &[Selection],
    schema: &dyn TypeSystem,
) -> Value {
    let content = match input_content.as_object() {
        Some(o) => o,
        None => return Value::Null,
    };

    let mut output = Object::with_capacity(selections.len());
    for selection in selections {
        match selection {
            Selection::Field(Field {
                alias,
                name,
                selections,
            }) => {
                let name = alias.as_deref().unwrap_or(name.as_str());

                match content.get_key_value(name) {
                    None => return Value::Null,
                    Some((key, value)) => {
                        if let Some(elements) = value.as_array() {
                            let selected = elements
                                .iter()
                                .map(|element| match selections {
                                    Some(sels) => execute_selection_set(element, sels, schema),
                                    None => element.clone(),
                                })
                                .collect::<Vec<_>>();
                            output.insert(key.clone(), Value::Array(selected));
                        } else if let Some(sels) = selections {
                            output.insert(key.clone(), execute_selection_set(value, sels, schema));
                        } else {
                            output.insert(key.clone(), value.clone());
                        }
                    }
                }
            }
            Selection::InlineFragment(InlineFragment {
                type_condition,
                selections,
            }) => {
                let matches = match type_condition {
                    None => true,
                    Some(condition) => is_object_of_type(content, condition, schema),
                };
                if !matches {
                    continue;
                }
                if let Value::Object(selected) =
                    execute_selection_set(input_content, selections, schema)
                {
                    for (key, value) in selected.into_iter() {
                        match output.entry(key) {
                            Entry::Vacant(e) => {
                                e.insert(value);
                            }
                            Entry::Occupied(e) => {
                                e.into_mut().deep_merge(value);
                            }
                        }
                    }
                }
            }
        }
    }

    Value::Object(output)
}

fn is_object_of_type(obj: &Object, condition: &str, schema: &dyn TypeSystem) -> bool {
    match obj.get(TYPENAME).and_then(|v| v.as_str()) {
        None => false,
        Some(typename) => schema.is_subtype(condition, typename),
    }
}

/// The variables of one fetch.
struct Variables {
    variables: Object,
    /// For each representation, the concrete paths it was built from.
    inverted_paths: Vec<Vec<Path>>,
}

/// A fetch of one operation against one subgraph.
///
/// Without `requires` the operation runs from the subgraph root and its data lands at `path`.
/// With `requires`, every object found at `path` is projected into an entity representation,
/// and the `_entities` the subgraph returns are written back where they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchNode {
    id: NodeId,
    service_name: String,
    path: Path,
    operation: String,
    operation_name: Option<String>,
    variable_usages: Vec<String>,
    requires: Vec<Selection>,
    source: Path,
}

impl FetchNode {
    pub fn new(id: NodeId, service_name: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            id,
            service_name: service_name.into(),
            path: Path::empty(),
            operation: operation.into(),
            operation_name: None,
            variable_usages: Vec::new(),
            requires: Vec::new(),
            source: Path::empty(),
        }
    }

    /// The response path, which may cross lists for entity fetches.
    pub fn with_path(mut self, path: impl Into<Path>) -> Self {
        self.path = path.into();
        self
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

    /// The selection each entity representation is built from.
    pub fn with_requires(mut self, requires: Vec<Selection>) -> Self {
        self.requires = requires;
        self
    }

    /// Where the data of a root fetch starts in the subgraph response.
    pub fn with_source(mut self, source: impl Into<Path>) -> Self {
        self.source = source.into();
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    fn is_entity_fetch(&self) -> bool {
        !self.requires.is_empty()
    }

    /// Computes what to send, or `None` if there is nothing to fetch.
    fn variables(&self, context: &NodeContext) -> Option<Variables> {
        let mut variables = context
            .variables()
            .to_object(self.variable_usages.iter().map(String::as_str));

        if self.is_entity_fetch() {
            let mut inverted_paths: Vec<Vec<Path>> = Vec::new();
            let mut values: IndexSet<Value> = IndexSet::new();

            for (path, value) in context.store().expand(&self.path) {
                let value = execute_selection_set(&value, &self.requires, context.schema());
                if value.as_object().map(|o| !o.is_empty()).unwrap_or(false) {
                    match values.get_index_of(&value) {
                        Some(index) => {
                            inverted_paths[index].push(path);
                        }
                        None => {
                            inverted_paths.push(vec![path]);
                            values.insert(value);
                            debug_assert!(inverted_paths.len() == values.len());
                        }
                    }
                }
            }

            if values.is_empty() {
                return None;
            }

            variables.insert(REPRESENTATIONS, Value::Array(Vec::from_iter(values)));
            Some(Variables {
                variables,
                inverted_paths,
            })
        } else {
            // a root fetch nested under a field that resolved to null has nothing to extend
            if !self.path.is_empty()
                && context
                    .store()
                    .get(&self.path)
                    .map(|value| value.is_null())
                    .unwrap_or(true)
            {
                return None;
            }

            Some(Variables {
                variables,
                inverted_paths: Vec::new(),
            })
        }
    }

    fn root_fetch_result(&self, response: Response) -> ExecutionNodeResult {
        let errors = response
            .errors
            .into_iter()
            .map(|error| rewrite_error_path(error, &self.source, &self.path))
            .collect::<Vec<_>>();

        match response.data {
            None | Some(Value::Null) if !errors.is_empty() => {
                ExecutionNodeResult::failed_with_errors(self.id, errors)
            }
            data => {
                let result = FetchResult::new(self.path.clone(), data.unwrap_or_default())
                    .with_source(self.source.clone())
                    .with_errors(errors)
                    .with_extensions(response.extensions);
                ExecutionNodeResult::success(self.id, vec![result])
            }
        }
    }

    fn entity_fetch_result(
        &self,
        response: Response,
        inverted_paths: &[Vec<Path>],
    ) -> ExecutionNodeResult {
        let entities_count = response
            .data
            .as_ref()
            .and_then(|data| data.get(ENTITIES))
            .and_then(Value::as_array)
            .map(Vec::len);

        let Some(entities_count) = entities_count else {
            let errors = response
                .errors
                .into_iter()
                .flat_map(|error| rewrite_entity_error(error, inverted_paths))
                .collect::<Vec<_>>();
            if errors.is_empty() {
                return ExecutionNodeResult::failed(
                    self.id,
                    FetchError::SubrequestMalformedResponse {
                        service: self.service_name.clone(),
                        reason: format!("expected an array for key: {ENTITIES}"),
                    },
                );
            }
            return ExecutionNodeResult::failed_with_errors(self.id, errors);
        };

        if entities_count != inverted_paths.len() {
            tracing::warn!(
                "subgraph '{}' returned {} entities for {} representations",
                self.service_name,
                entities_count,
                inverted_paths.len()
            );
        }

        let data = response.data.unwrap_or_default();
        let mut results = Vec::new();
        for (index, paths) in inverted_paths.iter().enumerate().take(entities_count) {
            let source = Path(vec![
                PathElement::Key(ENTITIES.to_string()),
                PathElement::Index(index),
            ]);
            for target in paths {
                results.push(
                    FetchResult::new(self.path.clone(), data.clone())
                        .with_target(target.clone())
                        .with_source(source.clone()),
                );
            }
        }

        // errors land on the result of the entity they point to
        let mut unattached = Vec::new();
        for error in response.errors {
            for error in rewrite_entity_error(error, inverted_paths) {
                let holder = error.path.as_ref().and_then(|path| {
                    results
                        .iter_mut()
                        .find(|result| path.starts_with(&result.target))
                });
                match holder {
                    Some(result) => result.errors.push(error),
                    None => unattached.push(error),
                }
            }
        }
        match results.first_mut() {
            Some(first) => {
                first.errors.extend(unattached);
                first.extensions = response.extensions;
            }
            None if !unattached.is_empty() => {
                return ExecutionNodeResult::failed_with_errors(self.id, unattached);
            }
            None => {}
        }

        ExecutionNodeResult::success(self.id, results)
    }
}

/// Moves the path of a root fetch error from the subgraph response onto the client response.
fn rewrite_error_path(mut error: Error, source: &Path, target: &Path) -> Error {
    if let Some(path) = error.path.take() {
        let relative = path.strip_prefix(source).unwrap_or(path);
        error.path = Some(target.join(relative));
    }
    error
}

/// An error pointing into `_entities/i` is duplicated at every path entity `i` came from.
fn rewrite_entity_error(error: Error, inverted_paths: &[Vec<Path>]) -> Vec<Error> {
    let entity = match error.path.as_ref().map(|path| path.0.as_slice()) {
        Some([PathElement::Key(key), PathElement::Index(index), rest @ ..]) if key == ENTITIES => {
            inverted_paths.get(*index).map(|paths| (paths, rest.to_vec()))
        }
        _ => None,
    };
    match entity {
        Some((paths, rest)) => paths
            .iter()
            .map(|path| {
                let mut error = error.clone();
                error.path = Some(path.join(Path(rest.clone())));
                error
            })
            .collect(),
        None => vec![Error { path: None, ..error }],
    }
}

#[async_trait]
impl ExecutionNode for FetchNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn subgraph(&self) -> Option<&str> {
        Some(&self.service_name)
    }

    async fn execute(
        &self,
        context: &NodeContext,
        cancellation: &CancellationToken,
    ) -> ExecutionNodeResult {
        let Some(Variables {
            variables,
            inverted_paths,
        }) = self.variables(context)
        else {
            tracing::debug!(
                "nothing to fetch from '{}' at '{}'",
                self.service_name,
                self.path
            );
            return ExecutionNodeResult::skipped(self.id);
        };

        let client = match context.subgraph(&self.service_name) {
            Ok(client) => client,
            Err(error) => return ExecutionNodeResult::failed(self.id, error),
        };

        let variable_values = vec![VariableValueSet {
            subgraph: self.service_name.clone(),
            variables: variables.clone(),
        }];
        let request = Request::builder()
            .query(self.operation.clone())
            .and_operation_name(self.operation_name.clone())
            .variables(variables)
            .build();

        let response = tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                return ExecutionNodeResult::failed(
                    self.id,
                    FetchError::NodeNotExecuted {
                        node: self.id,
                        reason: "the operation was cancelled".to_string(),
                    },
                )
                .with_variable_values(variable_values);
            }
            response = client.fetch(request) => response,
        };

        let result = match response {
            Err(error) => {
                failfast_debug!(
                    "fetch from '{}' at '{}' failed: {}",
                    self.service_name,
                    self.path,
                    error
                );
                ExecutionNodeResult::failed(self.id, error)
            }
            Ok(response) if self.is_entity_fetch() => {
                self.entity_fetch_result(response, &inverted_paths)
            }
            Ok(response) => self.root_fetch_result(response),
        };
        result.with_variable_values(variable_values)
    }
}
