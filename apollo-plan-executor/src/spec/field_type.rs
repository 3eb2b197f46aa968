use std::fmt;
use std::str::FromStr;

use super::SpecError;

// Primitives are taken from scalars: https://spec.graphql.org/draft/#sec-Scalars
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Named type {0}
    Named(String),
    /// List type {0}
    List(Box<FieldType>),
    /// Non null type {0}
    NonNull(Box<FieldType>),
    /// String
    String,
    /// Int
    Int,
    /// Float
    Float,
    /// Id
    Id,
    /// Boolean
    Boolean,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Named(ty) => write!(f, "{ty}"),
            FieldType::List(ty) => write!(f, "[{ty}]"),
            FieldType::NonNull(ty) => write!(f, "{ty}!"),
            FieldType::String => write!(f, "String"),
            FieldType::Int => write!(f, "Int"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Id => write!(f, "ID"),
            FieldType::Boolean => write!(f, "Boolean"),
        }
    }
}

impl FieldType {
    /// Creates the type for a name, mapping the built-in scalars to their own variants.
    pub fn named(name: &str) -> Self {
        match name {
            "String" => Self::String,
            "Int" => Self::Int,
            "Float" => Self::Float,
            "ID" => Self::Id,
            "Boolean" => Self::Boolean,
            _ => Self::Named(name.to_string()),
        }
    }

    /// return the name of the innermost named type
    ///
    /// Example if we get the field `list: [User!]!`, it will return "User"
    pub fn inner_type_name(&self) -> Option<&str> {
        match self {
            FieldType::Named(name) => Some(name.as_str()),
            FieldType::List(inner) | FieldType::NonNull(inner) => inner.inner_type_name(),
            FieldType::String
            | FieldType::Int
            | FieldType::Float
            | FieldType::Id
            | FieldType::Boolean => None,
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, FieldType::NonNull(_))
    }
}

// Spec: https://spec.graphql.org/draft/#sec-Type-References
impl FromStr for FieldType {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_type_reference(s.trim()).ok_or_else(|| SpecError::InvalidTypeReference(s.to_string()))
    }
}

fn parse_type_reference(s: &str) -> Option<FieldType> {
    if let Some(inner) = s.strip_suffix('!') {
        return match parse_type_reference(inner)? {
            FieldType::NonNull(_) => None,
            inner => Some(FieldType::NonNull(Box::new(inner))),
        };
    }
    if let Some(inner) = s.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
        return Some(FieldType::List(Box::new(parse_type_reference(inner.trim())?)));
    }

    let mut chars = s.chars();
    let valid_name = chars
        .next()
        .map(|first| first == '_' || first.is_ascii_alphabetic())
        .unwrap_or_default()
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric());
    valid_name.then(|| FieldType::named(s))
}
