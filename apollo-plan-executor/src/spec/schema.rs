use std::collections::HashMap;

use indexmap::IndexMap;
use indexmap::IndexSet;

use super::FieldType;
use crate::json_ext::Value;

/// Resolves named types of the supergraph schema.
///
/// Built-in scalars are represented by [`FieldType`] variants and are never looked up.
pub trait TypeSystem: Send + Sync {
    /// Returns the definition of the named type.
    fn type_definition(&self, name: &str) -> Option<&TypeDefinition>;

    /// Returns `true` if an object of type `typename` matches the type condition `condition`.
    fn is_subtype(&self, condition: &str, typename: &str) -> bool {
        if condition == typename {
            return true;
        }
        match self.type_definition(condition) {
            Some(TypeDefinition::Interface(possible_types))
            | Some(TypeDefinition::Union(possible_types)) => possible_types.contains(typename),
            _ => false,
        }
    }
}

/// The kind and shape of a named type, as far as execution is concerned.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDefinition {
    /// A custom scalar, any input value is accepted.
    Scalar,
    /// An enum and its values.
    Enum(IndexSet<String>),
    /// An input object and its fields.
    InputObject(IndexMap<String, InputFieldDefinition>),
    /// An output object type.
    Object,
    /// An interface and the object types implementing it.
    Interface(IndexSet<String>),
    /// A union and its members.
    Union(IndexSet<String>),
}

impl TypeDefinition {
    pub(crate) fn is_input_type(&self) -> bool {
        matches!(
            self,
            TypeDefinition::Scalar | TypeDefinition::Enum(_) | TypeDefinition::InputObject(_)
        )
    }
}

/// A field of an input object type.
#[derive(Debug, Clone, PartialEq)]
pub struct InputFieldDefinition {
    pub field_type: FieldType,
    pub default_value: Option<Value>,
}

impl InputFieldDefinition {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            default_value: None,
        }
    }

    pub fn with_default(mut self, default_value: Value) -> Self {
        self.default_value = Some(default_value);
        self
    }
}

/// An in-memory [`TypeSystem`].
#[derive(Debug, Clone, Default)]
pub struct SchemaTypes {
    types: HashMap<String, TypeDefinition>,
}

impl SchemaTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scalar(mut self, name: impl Into<String>) -> Self {
        self.types.insert(name.into(), TypeDefinition::Scalar);
        self
    }

    pub fn enum_type<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types.insert(
            name.into(),
            TypeDefinition::Enum(values.into_iter().map(Into::into).collect()),
        );
        self
    }

    pub fn input_object<I, S>(mut self, name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, InputFieldDefinition)>,
        S: Into<String>,
    {
        self.types.insert(
            name.into(),
            TypeDefinition::InputObject(
                fields
                    .into_iter()
                    .map(|(name, field)| (name.into(), field))
                    .collect(),
            ),
        );
        self
    }

    pub fn object(mut self, name: impl Into<String>) -> Self {
        self.types.insert(name.into(), TypeDefinition::Object);
        self
    }

    pub fn interface<I, S>(mut self, name: impl Into<String>, implementers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types.insert(
            name.into(),
            TypeDefinition::Interface(implementers.into_iter().map(Into::into).collect()),
        );
        self
    }

    pub fn union<I, S>(mut self, name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types.insert(
            name.into(),
            TypeDefinition::Union(members.into_iter().map(Into::into).collect()),
        );
        self
    }
}

impl TypeSystem for SchemaTypes {
    fn type_definition(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }
}
