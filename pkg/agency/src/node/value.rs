use std::collections::HashMap;

use reflection::{PrimitiveValue, SerializeTo, ValueSerializer};

use super::path::Path;

/// A node in the hierarchical store. Every leaf carries a scalar or an
/// array/object blob; every internal node is an `Object` with named children.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Object(HashMap<String, Value>),
    Array(Vec<Value>),
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Null,
}

impl Value {
    pub fn empty_object() -> Self {
        Value::Object(HashMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn get_field(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Object(v) => v.get(name),
            _ => None,
        }
    }

    pub fn get_field_mut(&mut self, name: &str) -> Option<&mut Value> {
        match self {
            Self::Object(v) => v.get_mut(name),
            _ => None,
        }
    }

    pub fn set_field<V: Into<Value>>(&mut self, name: &str, value: V) {
        match self {
            Self::Object(v) => {
                v.insert(name.to_string(), value.into());
            }
            _ => panic!("set_field called on a non-object node"),
        }
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        match self {
            Self::Object(v) => v.remove(name),
            _ => None,
        }
    }

    pub fn object_fields(&self) -> Option<impl Iterator<Item = (&str, &Value)>> {
        match self {
            Self::Object(v) => Some(v.iter().map(|(k, v)| (k.as_str(), v))),
            _ => None,
        }
    }

    pub fn get_elements(&self) -> Option<&[Value]> {
        match self {
            Self::Array(v) => Some(&v[..]),
            _ => None,
        }
    }

    pub fn get_elements_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Self::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_string(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn contains(&self, needle: &Value) -> bool {
        match self {
            Self::Array(v) => v.iter().any(|e| e == needle),
            _ => false,
        }
    }

    /// Resolves a path relative to this node, returning `None` as soon as the
    /// path runs into a non-object node or a missing child.
    pub fn get_path(&self, path: &Path) -> Option<&Value> {
        let mut node = self;
        for component in path.components() {
            node = node.get_field(component)?;
        }
        Some(node)
    }

    /// Like `get_path`, but returns the number of path components that were
    /// actually matched (0 = root doesn't even match, full length = exists).
    pub fn exists(&self, path: &Path) -> usize {
        let mut node = self;
        for (i, component) in path.components().iter().enumerate() {
            match node.get_field(component) {
                Some(child) => node = child,
                None => return i,
            }
        }
        path.components().len()
    }

    /// Walks to `path`, creating missing ancestors as empty objects along the
    /// way (mirrors the "implicit ancestor creation" invariant).
    pub fn get_or_create_path_mut(&mut self, path: &Path) -> &mut Value {
        let mut node = self;
        for component in path.components() {
            if node.get_field(component).is_none() {
                node.set_field(component, Value::empty_object());
            }
            node = node.get_field_mut(component).unwrap();
        }
        node
    }

    /// Recursive object merge: fields present in `patch` overwrite or merge
    /// into the corresponding field of `self`; `self` must be (or become) an
    /// object.
    pub fn merge(&mut self, patch: Value) {
        match (self, patch) {
            (this @ Value::Null, patch) => {
                *this = patch;
            }
            (Value::Object(existing), Value::Object(patch_fields)) => {
                for (key, value) in patch_fields {
                    existing
                        .entry(key)
                        .and_modify(|slot| slot.merge(value.clone()))
                        .or_insert(value);
                }
            }
            (this, patch) => {
                *this = patch;
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}

impl std::ops::Index<&str> for Value {
    type Output = Value;

    fn index(&self, index: &str) -> &Self::Output {
        self.get_field(index).unwrap()
    }
}

impl std::ops::IndexMut<&str> for Value {
    fn index_mut(&mut self, index: &str) -> &mut Self::Output {
        self.get_field_mut(index).unwrap()
    }
}

impl SerializeTo for Value {
    fn serialize_to<Output: ValueSerializer>(&self, out: Output) -> common::errors::Result<()> {
        match self {
            Value::Object(v) => {
                let mut obj = out.serialize_object();
                for (key, value) in v.iter() {
                    obj.serialize_field(key.as_str(), value)?;
                }
                Ok(())
            }
            Value::Array(v) => {
                let mut arr = out.serialize_list();
                for v in v {
                    arr.serialize_element(v)?;
                }
                Ok(())
            }
            Value::String(v) => out.serialize_primitive(PrimitiveValue::Str(v.as_str())),
            // The reflection crate's primitive set only distinguishes a single
            // numeric kind; integers serialize through the same f64 lane as
            // doubles (mirrors how `format::json::Value` has no separate
            // integer variant either).
            Value::Int(v) => out.serialize_primitive(PrimitiveValue::F64(*v as f64)),
            Value::Double(v) => out.serialize_primitive(PrimitiveValue::F64(*v)),
            Value::Bool(v) => out.serialize_primitive(PrimitiveValue::Bool(*v)),
            Value::Null => out.serialize_primitive(PrimitiveValue::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_path_mut_creates_ancestors() {
        let mut root = Value::empty_object();
        {
            let leaf = root.get_or_create_path_mut(&Path::parse("/a/b/c"));
            *leaf = Value::from("hello");
        }

        assert_eq!(
            root.get_path(&Path::parse("/a/b/c")),
            Some(&Value::from("hello"))
        );
        assert!(!root.get_path(&Path::parse("/a/b")).unwrap().is_array());
    }

    #[test]
    fn exists_reports_matched_prefix_length() {
        let mut root = Value::empty_object();
        root.get_or_create_path_mut(&Path::parse("/a/b"));

        assert_eq!(root.exists(&Path::parse("/a/b")), 2);
        assert_eq!(root.exists(&Path::parse("/a/b/c")), 2);
        assert_eq!(root.exists(&Path::parse("/x")), 0);
    }

    #[test]
    fn merge_is_recursive_on_objects() {
        let mut root = Value::empty_object();
        root.set_field("a", Value::from("one"));
        root.set_field(
            "nested",
            Value::Object(
                vec![("x".to_string(), Value::from(1i64))]
                    .into_iter()
                    .collect(),
            ),
        );

        let patch = Value::Object(
            vec![
                ("b".to_string(), Value::from("two")),
                (
                    "nested".to_string(),
                    Value::Object(
                        vec![("y".to_string(), Value::from(2i64))]
                            .into_iter()
                            .collect(),
                    ),
                ),
            ]
            .into_iter()
            .collect(),
        );

        root.merge(patch);

        assert_eq!(root.get_field("a"), Some(&Value::from("one")));
        assert_eq!(root.get_field("b"), Some(&Value::from("two")));
        assert_eq!(
            root.get_field("nested").unwrap().get_field("x"),
            Some(&Value::from(1i64))
        );
        assert_eq!(
            root.get_field("nested").unwrap().get_field("y"),
            Some(&Value::from(2i64))
        );
    }
}
