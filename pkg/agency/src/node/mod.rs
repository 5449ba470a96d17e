//! The hierarchical, JSON-like store (component A): a rooted tree addressed
//! by slash-delimited paths, mutated only through `apply_write`.

pub mod path;
pub mod value;

pub use path::Path;
pub use value::Value;

use common::errors::*;

/// A single write operation targeted at a path. This is the tagged-variant
/// replacement for the source's object-builder DSL (redesign note in §9):
/// every write is one of these, never a free-form blob.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOperation {
    /// Overwrite (or create) the scalar/blob at the path.
    Set(Value),
    /// Append to the end of an array, creating it if absent.
    Push(Value),
    /// Remove and discard the last element of an array.
    Pop,
    /// Remove and discard the first element of an array.
    Shift,
    /// Insert at the front of an array, creating it if absent.
    Unshift(Value),
    /// Remove the node entirely (and its subtree).
    Delete,
    /// Recursively merge an object into the existing node.
    Merge(Value),
}

/// Applies a single write operation to the tree rooted at `root`.
///
/// Creating `/a/b/c` implicitly creates missing ancestors as empty objects,
/// per the Node tree invariant.
pub fn apply_write(root: &mut Value, path: &Path, op: WriteOperation) -> Result<()> {
    if path.is_root() {
        return apply_write_to_node(root, op);
    }

    let parent_path = path.parent().unwrap();
    let name = path.last().unwrap().to_string();

    if let WriteOperation::Delete = op {
        let parent = root.get_or_create_path_mut(&parent_path);
        parent.remove_field(&name);
        return Ok(());
    }

    let parent = root.get_or_create_path_mut(&parent_path);
    if parent.get_field(&name).is_none() {
        parent.set_field(name.as_str(), Value::Null);
    }
    let node = parent.get_field_mut(&name).unwrap();
    apply_write_to_node(node, op)
}

fn apply_write_to_node(node: &mut Value, op: WriteOperation) -> Result<()> {
    match op {
        WriteOperation::Set(value) => {
            *node = value;
        }
        WriteOperation::Merge(patch) => {
            node.merge(patch);
        }
        WriteOperation::Delete => {
            *node = Value::Null;
        }
        WriteOperation::Push(value) => {
            let array = coerce_array(node);
            array.push(value);
        }
        WriteOperation::Unshift(value) => {
            let array = coerce_array(node);
            array.insert(0, value);
        }
        WriteOperation::Pop => {
            let array = coerce_array(node);
            array.pop();
        }
        WriteOperation::Shift => {
            let array = coerce_array(node);
            if !array.is_empty() {
                array.remove(0);
            }
        }
    }

    Ok(())
}

/// Coerces `node` into an array in place (absent/Null nodes become empty
/// arrays); returns a mutable reference to the backing `Vec`.
fn coerce_array(node: &mut Value) -> &mut Vec<Value> {
    if !node.is_array() {
        *node = Value::Array(vec![]);
    }
    node.get_elements_mut().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_creates_missing_ancestors() {
        let mut root = Value::empty_object();
        apply_write(
            &mut root,
            &Path::parse("/a/b/c"),
            WriteOperation::Set(Value::from("hi")),
        )
        .unwrap();

        assert_eq!(root.get_path(&Path::parse("/a/b/c")), Some(&Value::from("hi")));
    }

    #[test]
    fn push_and_shift_preserve_order() {
        let mut root = Value::empty_object();
        let path = Path::parse("/queue");

        apply_write(&mut root, &path, WriteOperation::Push(Value::from(1i64))).unwrap();
        apply_write(&mut root, &path, WriteOperation::Push(Value::from(2i64))).unwrap();
        apply_write(&mut root, &path, WriteOperation::Push(Value::from(3i64))).unwrap();

        assert_eq!(
            root.get_path(&path).unwrap().get_elements().unwrap(),
            &[Value::from(1i64), Value::from(2i64), Value::from(3i64)]
        );

        apply_write(&mut root, &path, WriteOperation::Shift).unwrap();
        assert_eq!(
            root.get_path(&path).unwrap().get_elements().unwrap(),
            &[Value::from(2i64), Value::from(3i64)]
        );
    }

    #[test]
    fn delete_removes_the_node() {
        let mut root = Value::empty_object();
        apply_write(
            &mut root,
            &Path::parse("/a/b"),
            WriteOperation::Set(Value::from(true)),
        )
        .unwrap();
        apply_write(&mut root, &Path::parse("/a/b"), WriteOperation::Delete).unwrap();

        assert_eq!(root.exists(&Path::parse("/a/b")), 1);
        assert!(root.get_path(&Path::parse("/a/b")).is_none());
    }

    #[test]
    fn merge_is_recursive() {
        let mut root = Value::empty_object();
        apply_write(
            &mut root,
            &Path::parse("/job"),
            WriteOperation::Set(Value::Object(
                vec![("type".to_string(), Value::from("addFollower"))]
                    .into_iter()
                    .collect(),
            )),
        )
        .unwrap();

        apply_write(
            &mut root,
            &Path::parse("/job"),
            WriteOperation::Merge(Value::Object(
                vec![("timeStarted".to_string(), Value::from("2026-07-30"))]
                    .into_iter()
                    .collect(),
            )),
        )
        .unwrap();

        let job = root.get_path(&Path::parse("/job")).unwrap();
        assert_eq!(job.get_field("type"), Some(&Value::from("addFollower")));
        assert_eq!(
            job.get_field("timeStarted"),
            Some(&Value::from("2026-07-30"))
        );
    }
}
