//! Type system lookups and variable coercion.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

mod field_type;
mod schema;
pub mod variables;

use displaydoc::Display;
pub use field_type::FieldType;
pub use schema::InputFieldDefinition;
pub use schema::SchemaTypes;
pub use schema::TypeDefinition;
pub use schema::TypeSystem;
use thiserror::Error;
pub use variables::coerce_variable_values;
pub use variables::CoercedVariables;
pub use variables::InputValue;
pub use variables::VariableDefinition;
pub use variables::VariableValue;

use crate::error::ErrorExtension;
use crate::graphql::Error;
use crate::json_ext::Object;

/// Type reference parsing errors.
#[derive(Error, Debug, Display, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SpecError {
    /// invalid type reference '{0}'
    InvalidTypeReference(String),
}

/// Variable coercion errors.
///
/// Raised before any node runs; they abort the whole operation.
#[derive(Error, Debug, Display, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CoercionError {
    /// variable '${name}' of non-null type '{field_type}' must not be null
    NonNullViolation {
        /// Name of the variable.
        name: String,
        /// The declared type.
        field_type: String,
    },

    /// invalid value for variable '${name}': {reason}
    InvalidValue {
        /// Name of the variable.
        name: String,
        /// What is wrong with the value.
        reason: String,
    },

    /// type '{type_name}' of variable '${name}' is not an input type
    NotAnInputType {
        /// Name of the variable.
        name: String,
        /// The declared type that could not be used as an input.
        type_name: String,
    },
}

impl CoercionError {
    /// The variable this error is about.
    pub fn variable(&self) -> &str {
        match self {
            CoercionError::NonNullViolation { name, .. }
            | CoercionError::InvalidValue { name, .. }
            | CoercionError::NotAnInputType { name, .. } => name,
        }
    }

    /// Convert the coercion error to a GraphQL error.
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
}

impl ErrorExtension for CoercionError {
    fn extension_code(&self) -> String {
        match self {
            CoercionError::NonNullViolation { .. } => "NON_NULL_VIOLATION",
            CoercionError::InvalidValue { .. } => "VALIDATION_INVALID_TYPE_VARIABLE",
            CoercionError::NotAnInputType { .. } => "MUST_BE_INPUT_TYPE",
        }
        .to_string()
    }

    fn custom_extension_details(&self) -> Option<Object> {
        let mut details = Object::new();
        details.insert("variable", self.variable().into());
        match self {
            CoercionError::NonNullViolation { field_type, .. } => {
                details.insert("type", field_type.as_str().into());
            }
            CoercionError::NotAnInputType { type_name, .. } => {
                details.insert("type", type_name.as_str().into());
            }
            CoercionError::InvalidValue { .. } => {}
        }
        Some(details)
    }
}
