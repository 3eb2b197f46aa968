//! Types related to GraphQL requests, responses, etc.

use std::fmt;
use std::pin::Pin;

use futures::Stream;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use serde_json_bytes::Value;

use crate::error::FetchError;
use crate::json_ext::Object;
use crate::json_ext::Path;

/// An asynchronous [`Stream`] of GraphQL [`Response`]s.
///
/// Subscriptions produce one response per event received from the subgraph. Queries and
/// mutations are represented as a single [`Response`].
pub type ResponseStream = Pin<Box<dyn Stream<Item = Response> + Send>>;

/// A location in the GraphQL document of the originating request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
pub struct Location {
    /// The line number.
    pub line: u32,
    /// The column number.
    pub column: u32,
}

/// A [GraphQL error](https://spec.graphql.org/October2021/#sec-Errors)
/// as may be found in the `errors` field of a GraphQL [`Response`].
///
/// Converted to (or from) JSON with serde.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Error {
    /// The error message.
    pub message: String,

    /// The locations of the error in the GraphQL document of the originating request.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub locations: Vec<Location>,

    /// If this is a field error, the JSON path to that field in [`Response::data`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Path>,

    /// The optional GraphQL extensions for this error.
    #[serde(default, skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Error {
    /// Returns a builder that builds a GraphQL [`Error`] from its components.
    ///
    /// Builder methods:
    ///
    /// * `.message(impl Into<`[`String`]`>)`
    ///   Required.
    ///   Sets [`Error::message`].
    ///
    /// * `.locations(impl Into<`[`Vec`]`<`[`Location`]`>>)`
    ///   Optional.
    ///   Sets the entire `Vec` of [`Error::locations`], which defaults to the empty.
    ///
    /// * `.path(impl Into<`[`Path`]`>)`
    ///   Optional.
    ///   Sets [`Error::path`].
    ///
    /// * `.extension_code(impl Into<`[`String`]`>)`
    ///   Required.
    ///   Sets the "code" in the extension map. Will be ignored if extension already has this key
    ///   set.
    ///
    /// * `.extensions(impl Into<`[`serde_json_bytes::Map`]`<`[`ByteString`], [`Value`]`>>)`
    ///   Optional.
    ///   Sets the entire [`Error::extensions`] map, which defaults to empty.
    ///
    /// * `.build()`
    ///   Finishes the builder and returns a GraphQL [`Error`].
    #[builder(visibility = "pub")]
    fn new(
        message: String,
        locations: Vec<Location>,
        path: Option<Path>,
        extension_code: String,
        // Skip the `Object` type alias in order to use buildstructor’s map special-casing
        mut extensions: JsonMap<ByteString, Value>,
    ) -> Self {
        extensions
            .entry("code")
            .or_insert_with(|| extension_code.into());
        Self {
            message,
            locations,
            path,
            extensions,
        }
    }

    /// Parses one entry of the `errors` array of a subgraph response.
    pub(crate) fn from_value(service_name: &str, value: Value) -> Result<Error, FetchError> {
        serde_json_bytes::from_value(value).map_err(|error| {
            FetchError::SubrequestMalformedResponse {
                service: service_name.to_string(),
                reason: error.to_string(),
            }
        })
    }

    /// Returns the `code` found in the extensions, if any.
    pub fn extension_code(&self) -> Option<&str> {
        self.extensions.get("code").and_then(|code| code.as_str())
    }
}

/// Displays (only) the error message.
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message.fmt(f)
    }
}

/// A GraphQL request, as sent to a subgraph.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// The GraphQL operation (e.g., query, mutation) string.
    pub query: String,

    /// The (optional) GraphQL operation name.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub operation_name: Option<String>,

    /// The (optional) GraphQL variables in the form of a JSON object.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub variables: Object,

    /// The (optional) GraphQL `extensions` of a GraphQL request.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Request {
    #[builder(visibility = "pub")]
    fn new(
        query: String,
        operation_name: Option<String>,
        // Skip the `Object` type alias in order to use buildstructor’s map special-casing
        variables: JsonMap<ByteString, Value>,
        extensions: JsonMap<ByteString, Value>,
    ) -> Self {
        Self {
            query,
            operation_name,
            variables,
            extensions,
        }
    }
}

/// A graphql primary response.
/// Used for federated and subgraph queries.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Response {
    /// The response data.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,

    /// The optional graphql errors encountered.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<Error>,

    /// The optional graphql extensions.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Response {
    /// Constructor
    #[builder(visibility = "pub")]
    fn new(data: Option<Value>, errors: Vec<Error>, extensions: JsonMap<ByteString, Value>) -> Self {
        Self {
            data,
            errors,
            extensions,
        }
    }

    /// Create a [`Response`] from a JSON value as returned by a subgraph.
    ///
    /// This will return an error (identifying the faulty service) if the input is invalid.
    pub fn from_value(service_name: &str, value: Value) -> Result<Response, FetchError> {
        let mut object = match value {
            Value::Object(object) => object,
            _ => {
                return Err(FetchError::SubrequestMalformedResponse {
                    service: service_name.to_string(),
                    reason: "expected a JSON object".to_string(),
                })
            }
        };

        let data = object.remove("data");
        let errors = match object.remove("errors") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(errors)) => errors
                .into_iter()
                .map(|error| Error::from_value(service_name, error))
                .collect::<Result<Vec<Error>, FetchError>>()?,
            Some(_) => {
                return Err(FetchError::SubrequestMalformedResponse {
                    service: service_name.to_string(),
                    reason: "invalid type for key: errors".to_string(),
                })
            }
        };
        let extensions = match object.remove("extensions") {
            None | Some(Value::Null) => Object::new(),
            Some(Value::Object(extensions)) => extensions,
            Some(_) => {
                return Err(FetchError::SubrequestMalformedResponse {
                    service: service_name.to_string(),
                    reason: "invalid type for key: extensions".to_string(),
                })
            }
        };

        Ok(Response {
            data,
            errors,
            extensions,
        })
    }

    /// Returns `true` if the response carries data that is not `null`.
    pub fn has_data(&self) -> bool {
        self.data.as_ref().map(|data| !data.is_null()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn test_response_from_value() {
        let response = Response::from_value(
            "reviews",
            json!({
                "data": {"me": {"id": "1"}},
                "errors": [{
                    "message": "could not fetch name",
                    "path": ["me", "name"],
                    "extensions": {"code": "NOT_FOUND"}
                }],
                "extensions": {"cost": 3}
            }),
        )
        .unwrap();

        assert_eq!(response.data, Some(json!({"me": {"id": "1"}})));
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].path, Some(Path::parse("/me/name")));
        assert_eq!(response.errors[0].extension_code(), Some("NOT_FOUND"));
        assert_eq!(response.extensions.get("cost"), Some(&json!(3)));
    }

    #[test]
    fn test_response_from_malformed_value() {
        let error = Response::from_value("reviews", json!({"errors": {"message": "no"}}))
            .unwrap_err();
        assert_eq!(
            error,
            FetchError::SubrequestMalformedResponse {
                service: "reviews".to_string(),
                reason: "invalid type for key: errors".to_string(),
            }
        );
    }

    #[test]
    fn test_error_builder_sets_code() {
        let error = Error::builder()
            .message("boom")
            .path(Path::parse("/me"))
            .extension_code("TEST_CODE")
            .build();

        assert_eq!(
            serde_json_bytes::to_value(&error).unwrap(),
            json!({
                "message": "boom",
                "path": ["me"],
                "extensions": {"code": "TEST_CODE"}
            })
        );
    }
}
