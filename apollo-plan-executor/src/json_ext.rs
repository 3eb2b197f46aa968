//! Performance oriented JSON manipulation.

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde_json_bytes::ByteString;
use serde_json_bytes::Entry;
use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

pub(crate) const TYPENAME: &str = "__typename";
const FLATTEN_CHARACTER: &str = "@";
const FRAGMENT_PREFIX: &str = "... on ";

/// Extension trait for [`serde_json_bytes::Value`].
pub trait ValueExt {
    /// Deep merge the JSON objects, array and override the values in `&mut self` if they already
    /// exists.
    #[track_caller]
    fn deep_merge(&mut self, other: Self);

    /// Returns the value found at `path`, when `path` only contains keys and indexes.
    #[track_caller]
    fn get_path(&self, path: &Path) -> Option<&Value>;

    /// Mutable version of [`ValueExt::get_path`].
    #[track_caller]
    fn get_path_mut(&mut self, path: &Path) -> Option<&mut Value>;

    /// Inserts `value` at `path`, creating intermediate objects when they are missing.
    ///
    /// Returns `false` (leaving `self` untouched) if the path crosses a scalar, goes out of the
    /// bounds of an array or contains a flatten element.
    #[track_caller]
    fn insert_at(&mut self, path: &Path, value: Value) -> bool;

    /// Returns the `__typename` of this value if it is an object carrying one.
    fn typename(&self) -> Option<&str>;
}

impl ValueExt for Value {
    fn deep_merge(&mut self, other: Self) {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => {
                for (key, value) in b.into_iter() {
                    match a.entry(key) {
                        Entry::Vacant(e) => {
                            e.insert(value);
                        }
                        Entry::Occupied(e) => {
                            e.into_mut().deep_merge(value);
                        }
                    }
                }
            }
            (Value::Array(a), Value::Array(mut b)) => {
                let len = std::cmp::min(a.len(), b.len());
                for (b_value, a_value) in b.drain(..len).zip(a.iter_mut()) {
                    a_value.deep_merge(b_value);
                }

                a.extend(b);
            }
            // a null never overwrites data that was already resolved
            (_, Value::Null) => {}
            (a, b) => {
                *a = b;
            }
        }
    }

    fn get_path(&self, path: &Path) -> Option<&Value> {
        let mut current = self;
        for element in path.iter() {
            current = match (element, current) {
                (PathElement::Key(key), Value::Object(object)) => object.get(key.as_str())?,
                (PathElement::Index(index), Value::Array(array)) => array.get(*index)?,
                (PathElement::Fragment(condition), value) => {
                    if value.typename() != Some(condition.as_str()) {
                        return None;
                    }
                    value
                }
                _ => return None,
            };
        }
        Some(current)
    }

    fn get_path_mut(&mut self, path: &Path) -> Option<&mut Value> {
        let mut current = self;
        for element in path.iter() {
            current = match (element, current) {
                (PathElement::Key(key), Value::Object(object)) => object.get_mut(key.as_str())?,
                (PathElement::Index(index), Value::Array(array)) => array.get_mut(*index)?,
                (PathElement::Fragment(condition), value) => {
                    if value.typename() != Some(condition.as_str()) {
                        return None;
                    }
                    value
                }
                _ => return None,
            };
        }
        Some(current)
    }

    fn insert_at(&mut self, path: &Path, value: Value) -> bool {
        if path.iter().any(|element| matches!(element, PathElement::Flatten)) {
            return false;
        }

        let mut current = self;
        for element in path.iter() {
            if current.is_null() {
                if let PathElement::Key(_) = element {
                    *current = Value::Object(Object::new());
                }
            }
            current = match (element, current) {
                (PathElement::Key(key), Value::Object(object)) => {
                    object.entry(key.as_str()).or_insert(Value::Null)
                }
                (PathElement::Index(index), Value::Array(array)) => match array.get_mut(*index) {
                    Some(item) => item,
                    None => return false,
                },
                (PathElement::Fragment(_), value) => value,
                _ => return false,
            };
        }
        current.deep_merge(value);
        true
    }

    fn typename(&self) -> Option<&str> {
        self.as_object()
            .and_then(|object| object.get(TYPENAME))
            .and_then(|typename| typename.as_str())
    }
}

/// A GraphQL path element that is composes of strings or numbers.
/// e.g `/book/3/name`
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum PathElement {
    /// A path element that given an array will flatmap the content.
    Flatten,

    /// An index path element.
    Index(usize),

    /// A type condition that only matches objects whose `__typename` is the given type.
    Fragment(String),

    /// A key path element.
    Key(String),
}

impl PathElement {
    pub(crate) fn is_concrete(&self) -> bool {
        !matches!(self, PathElement::Flatten)
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Flatten => f.write_str(FLATTEN_CHARACTER),
            PathElement::Index(index) => write!(f, "{index}"),
            PathElement::Fragment(condition) => write!(f, "{FRAGMENT_PREFIX}{condition}"),
            PathElement::Key(key) => f.write_str(key),
        }
    }
}

impl From<&str> for PathElement {
    fn from(s: &str) -> Self {
        if s == FLATTEN_CHARACTER {
            PathElement::Flatten
        } else if let Some(condition) = s.strip_prefix(FRAGMENT_PREFIX) {
            PathElement::Fragment(condition.to_string())
        } else if let Ok(index) = s.parse::<usize>() {
            PathElement::Index(index)
        } else {
            PathElement::Key(s.to_string())
        }
    }
}

impl Serialize for PathElement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            PathElement::Index(index) => serializer.serialize_u64(*index as u64),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for PathElement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Index(usize),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Index(index) => PathElement::Index(index),
            // a numeric string is still a key when it comes as a string
            Raw::Text(text) if text.parse::<usize>().is_ok() => PathElement::Key(text),
            Raw::Text(text) => PathElement::from(text.as_str()),
        })
    }
}

/// A path into the result document.
///
/// This can be composed of strings and numbers
#[derive(Clone, Debug, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn empty() -> Path {
        Path(Default::default())
    }

    /// Parses a path of the form `/a/@/b/0/... on User`.
    pub fn parse(s: &str) -> Path {
        Path(
            s.split('/')
                .filter(|segment| !segment.is_empty())
                .map(PathElement::from)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&PathElement> {
        self.0.last()
    }

    pub fn push(&mut self, element: PathElement) {
        self.0.push(element)
    }

    pub fn join(&self, other: impl AsRef<Self>) -> Self {
        let other = other.as_ref();
        let mut new = Vec::with_capacity(self.len() + other.len());
        new.extend(self.iter().cloned());
        new.extend(other.iter().cloned());
        Path(new)
    }

    pub fn parent(&self) -> Option<Path> {
        if self.is_empty() {
            None
        } else {
            Some(Path(self.0[..self.len() - 1].to_vec()))
        }
    }

    pub fn starts_with(&self, other: &Path) -> bool {
        self.0.starts_with(&other.0)
    }

    /// Returns what is left of `self` after removing the `prefix`.
    pub fn strip_prefix(&self, prefix: &Path) -> Option<Path> {
        self.0
            .strip_prefix(prefix.0.as_slice())
            .map(|rest| Path(rest.to_vec()))
    }

    /// A concrete path only addresses a single location: it contains no flatten element.
    pub fn is_concrete(&self) -> bool {
        self.iter().all(PathElement::is_concrete)
    }
}

impl AsRef<Path> for Path {
    fn as_ref(&self) -> &Path {
        self
    }
}

impl<T> From<T> for Path
where
    T: AsRef<str>,
{
    fn from(s: T) -> Self {
        Path::parse(s.as_ref())
    }
}

impl FromIterator<PathElement> for Path {
    fn from_iter<T: IntoIterator<Item = PathElement>>(iter: T) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in self.iter() {
            write!(f, "/{element}")?;
        }
        Ok(())
    }
}
