//! Variable coercion.
//!
//! Spec: https://spec.graphql.org/draft/#sec-Coercing-Variable-Values
//!
//! Values are only rebuilt where coercion changes them: a value that is already valid for its
//! declared type comes back as [`Cow::Borrowed`], and a container is only rebuilt when one of its
//! members was rewritten.

use std::borrow::Cow;
use std::fmt;

use indexmap::IndexMap;
use serde_json_bytes::ByteString;

use super::CoercionError;
use super::FieldType;
use super::InputFieldDefinition;
use super::TypeDefinition;
use super::TypeSystem;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// An input value, as found in variables once they are read from the request.
///
/// Unlike JSON, enum values are distinct from strings.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    Enum(String),
    List(Vec<InputValue>),
    Object(IndexMap<String, InputValue>),
}

impl From<&Value> for InputValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => InputValue::Null,
            Value::Bool(b) => InputValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => InputValue::Int(i),
                None => n.as_f64().map(InputValue::Float).unwrap_or(InputValue::Null),
            },
            Value::String(s) => InputValue::String(s.as_str().to_string()),
            Value::Array(items) => InputValue::List(items.iter().map(InputValue::from).collect()),
            Value::Object(object) => InputValue::Object(
                object
                    .iter()
                    .map(|(key, value)| (key.as_str().to_string(), InputValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&InputValue> for Value {
    fn from(value: &InputValue) -> Self {
        match value {
            InputValue::Null => Value::Null,
            InputValue::Boolean(b) => Value::Bool(*b),
            InputValue::Int(i) => Value::Number((*i).into()),
            InputValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            InputValue::String(s) | InputValue::Enum(s) => Value::String(s.as_str().into()),
            InputValue::List(items) => Value::Array(items.iter().map(Value::from).collect()),
            InputValue::Object(object) => Value::Object(
                object
                    .iter()
                    .map(|(key, value)| (ByteString::from(key.as_str()), Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Enum(value) => f.write_str(value),
            other => {
                let json = serde_json::to_string(&Value::from(other)).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

/// A variable declared by the operation.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub field_type: FieldType,
    pub default_value: Option<Value>,
}

impl VariableDefinition {
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

/// A coerced variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableValue {
    pub name: String,
    pub field_type: FieldType,
    pub value: InputValue,
}

/// The coerced variables of a request, by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoercedVariables {
    values: IndexMap<String, VariableValue>,
}

impl CoercedVariables {
    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableValue> {
        self.values.values()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The JSON object of the given variables, as sent to a subgraph.
    ///
    /// Variables that were not provided and have no default are left out.
    pub fn to_object<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Object {
        names
            .into_iter()
            .filter_map(|name| {
                self.values
                    .get(name)
                    .map(|variable| (ByteString::from(name), Value::from(&variable.value)))
            })
            .collect()
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum InvalidInput {
    NotAnInputType(String),
    Invalid(String),
}

/// Coerces the variables supplied with a request against the variables the operation declares.
///
/// Every variable is checked; all the errors found are returned together.
pub fn coerce_variable_values(
    definitions: &IndexMap<String, VariableDefinition>,
    supplied: &Object,
    schema: &dyn TypeSystem,
) -> Result<CoercedVariables, Vec<CoercionError>> {
    let unknown_variables = supplied
        .keys()
        .filter(|name| !definitions.contains_key(name.as_str()))
        .map(|name| name.as_str())
        .collect::<Vec<_>>();
    if !unknown_variables.is_empty() {
        failfast_debug!(
            "Received variable unknown to the query: {:?}",
            unknown_variables,
        );
    }

    let mut values = IndexMap::with_capacity(definitions.len());
    let mut errors = Vec::new();

    for (name, definition) in definitions {
        if let Some(type_name) = undefined_input_type(&definition.field_type, schema) {
            errors.push(CoercionError::NotAnInputType {
                name: name.clone(),
                type_name,
            });
            continue;
        }

        let value = match (supplied.get(name.as_str()), &definition.default_value) {
            (Some(value), _) => InputValue::from(value),
            (None, Some(default_value)) => InputValue::from(default_value),
            (None, None) if definition.field_type.is_non_null() => {
                errors.push(CoercionError::NonNullViolation {
                    name: name.clone(),
                    field_type: definition.field_type.to_string(),
                });
                continue;
            }
            (None, None) => continue,
        };

        if value == InputValue::Null && definition.field_type.is_non_null() {
            errors.push(CoercionError::NonNullViolation {
                name: name.clone(),
                field_type: definition.field_type.to_string(),
            });
            continue;
        }

        let rewritten = match coerce_input_value(&value, &definition.field_type, schema) {
            Ok(Cow::Borrowed(_)) => None,
            Ok(Cow::Owned(rewritten)) => Some(rewritten),
            Err(InvalidInput::NotAnInputType(type_name)) => {
                errors.push(CoercionError::NotAnInputType {
                    name: name.clone(),
                    type_name,
                });
                continue;
            }
            Err(InvalidInput::Invalid(reason)) => {
                errors.push(CoercionError::InvalidValue {
                    name: name.clone(),
                    reason,
                });
                continue;
            }
        };

        values.insert(
            name.clone(),
            VariableValue {
                name: name.clone(),
                field_type: definition.field_type.clone(),
                value: rewritten.unwrap_or(value),
            },
        );
    }

    if errors.is_empty() {
        Ok(CoercedVariables { values })
    } else {
        Err(errors)
    }
}

fn undefined_input_type(field_type: &FieldType, schema: &dyn TypeSystem) -> Option<String> {
    let name = field_type.inner_type_name()?;
    match schema.type_definition(name) {
        Some(definition) if definition.is_input_type() => None,
        _ => Some(name.to_string()),
    }
}

/// Coerces `value` to `field_type`, borrowing it back when nothing had to change.
pub(crate) fn coerce_input_value<'a>(
    value: &'a InputValue,
    field_type: &FieldType,
    schema: &dyn TypeSystem,
) -> Result<Cow<'a, InputValue>, InvalidInput> {
    match (field_type, value) {
        (FieldType::NonNull(_), InputValue::Null) => Err(InvalidInput::Invalid(format!(
            "expected a non-null value of type '{field_type}'"
        ))),
        (FieldType::NonNull(inner), value) => coerce_input_value(value, inner, schema),
        // NOTE: graphql's types are all optional by default
        (_, InputValue::Null) => Ok(Cow::Borrowed(value)),
        (FieldType::List(inner), InputValue::List(items)) => {
            let mut rewritten: Option<Vec<InputValue>> = None;
            for (index, item) in items.iter().enumerate() {
                match coerce_input_value(item, inner, schema)? {
                    Cow::Borrowed(_) => {
                        if let Some(rewritten) = rewritten.as_mut() {
                            rewritten.push(item.clone());
                        }
                    }
                    Cow::Owned(item) => rewritten
                        .get_or_insert_with(|| items[..index].to_vec())
                        .push(item),
                }
            }
            Ok(match rewritten {
                Some(items) => Cow::Owned(InputValue::List(items)),
                None => Cow::Borrowed(value),
            })
        }
        // For coercion from single value to list
        (FieldType::List(inner), value) => {
            let item = coerce_input_value(value, inner, schema)?.into_owned();
            Ok(Cow::Owned(InputValue::List(vec![item])))
        }
        (FieldType::String, InputValue::String(_)) => Ok(Cow::Borrowed(value)),
        // Spec: https://spec.graphql.org/June2018/#sec-Int
        (FieldType::Int, InputValue::Int(i)) if i32::try_from(*i).is_ok() => {
            Ok(Cow::Borrowed(value))
        }
        // Spec: https://spec.graphql.org/draft/#sec-Float.Input-Coercion
        (FieldType::Float, InputValue::Float(f)) if f.is_finite() => Ok(Cow::Borrowed(value)),
        (FieldType::Float, InputValue::Int(i)) => Ok(Cow::Owned(InputValue::Float(*i as f64))),
        // The ID type is serialized in the same way as a String, but in practice Int works too
        (FieldType::Id, InputValue::String(_) | InputValue::Int(_)) => Ok(Cow::Borrowed(value)),
        (FieldType::Boolean, InputValue::Boolean(_)) => Ok(Cow::Borrowed(value)),
        (FieldType::Named(name), value) => match schema.type_definition(name) {
            Some(TypeDefinition::Scalar) => Ok(Cow::Borrowed(value)),
            Some(TypeDefinition::Enum(values)) => match value {
                InputValue::Enum(v) if values.contains(v) => Ok(Cow::Borrowed(value)),
                InputValue::String(v) if values.contains(v) => {
                    Ok(Cow::Owned(InputValue::Enum(v.clone())))
                }
                _ => Err(InvalidInput::Invalid(format!(
                    "expected a value of enum '{name}', got {value}"
                ))),
            },
            Some(TypeDefinition::InputObject(fields)) => {
                coerce_input_object(value, name, fields, schema)
            }
            _ => Err(InvalidInput::NotAnInputType(name.clone())),
        },
        (field_type, value) => Err(InvalidInput::Invalid(format!(
            "expected a value of type '{field_type}', got {value}"
        ))),
    }
}

fn coerce_input_object<'a>(
    value: &'a InputValue,
    type_name: &str,
    fields: &IndexMap<String, InputFieldDefinition>,
    schema: &dyn TypeSystem,
) -> Result<Cow<'a, InputValue>, InvalidInput> {
    let InputValue::Object(object) = value else {
        return Err(InvalidInput::Invalid(format!(
            "expected an object of input type '{type_name}', got {value}"
        )));
    };
    if let Some(unknown) = object.keys().find(|key| !fields.contains_key(key.as_str())) {
        return Err(InvalidInput::Invalid(format!(
            "field '{unknown}' is not defined by input type '{type_name}'"
        )));
    }

    let mut rewritten: Option<IndexMap<String, InputValue>> = None;
    for (index, (key, field_value)) in object.iter().enumerate() {
        let Some(definition) = fields.get(key.as_str()) else {
            continue;
        };
        match coerce_input_value(field_value, &definition.field_type, schema)? {
            Cow::Borrowed(_) => {
                if let Some(rewritten) = rewritten.as_mut() {
                    rewritten.insert(key.clone(), field_value.clone());
                }
            }
            Cow::Owned(field_value) => {
                rewritten
                    .get_or_insert_with(|| {
                        object
                            .iter()
                            .take(index)
                            .map(|(key, value)| (key.clone(), value.clone()))
                            .collect()
                    })
                    .insert(key.clone(), field_value);
            }
        }
    }

    for (name, definition) in fields {
        if object.contains_key(name.as_str()) {
            continue;
        }
        match &definition.default_value {
            Some(default_value) => {
                let default_value = InputValue::from(default_value);
                let coerced =
                    match coerce_input_value(&default_value, &definition.field_type, schema)? {
                        Cow::Borrowed(_) => None,
                        Cow::Owned(coerced) => Some(coerced),
                    };
                rewritten
                    .get_or_insert_with(|| object.clone())
                    .insert(name.clone(), coerced.unwrap_or(default_value));
            }
            None if definition.field_type.is_non_null() => {
                return Err(InvalidInput::Invalid(format!(
                    "missing field '{name}' of non-null type '{}' on input type '{type_name}'",
                    definition.field_type
                )));
            }
            None => {}
        }
    }

    Ok(match rewritten {
        Some(object) => Cow::Owned(InputValue::Object(object)),
        None => Cow::Borrowed(value),
    })
}
