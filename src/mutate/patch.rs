//! Typed JSON patch operations (RFC 6902 subset).

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;

/// One patch operation.
///
/// Whether a list is created or appended to is part of the type: a
/// container's env list is either established with [`SetList`] or grown with
/// [`Append`], never both in one patch.
///
/// [`SetList`]: PatchOperation::SetList
/// [`Append`]: PatchOperation::Append
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOperation {
    /// `add` at the list path, setting the whole list.
    SetList {
        /// Pointer to the list.
        path: String,
        /// Items of the new list.
        items: Vec<Value>,
    },
    /// `add` at `<path>/-`, appending one item.
    Append {
        /// Pointer to the list.
        path: String,
        /// Item to append.
        item: Value,
    },
    /// `replace` at the path.
    Replace {
        /// Pointer to the replaced value.
        path: String,
        /// New value.
        value: Value,
    },
}

/// Errors from applying a patch to a document.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PatchError {
    /// Pointer is not a valid non-root JSON pointer.
    #[error("invalid JSON pointer: {0}")]
    InvalidPointer(String),
    /// Parent of the target does not exist or cannot hold members.
    #[error("parent of {0} does not exist")]
    MissingParent(String),
    /// Target of an append is not an array.
    #[error("{0} is not a list")]
    NotAList(String),
    /// Target of a replace or append does not exist.
    #[error("{0} does not exist")]
    MissingTarget(String),
}

impl PatchOperation {
    /// Wire name of the operation.
    pub fn op(&self) -> &'static str {
        match self {
            Self::SetList { .. } | Self::Append { .. } => "add",
            Self::Replace { .. } => "replace",
        }
    }

    /// Wire pointer of the operation.
    pub fn pointer(&self) -> String {
        match self {
            Self::SetList { path, .. } | Self::Replace { path, .. } => path.clone(),
            Self::Append { path, .. } => format!("{path}/-"),
        }
    }

    /// Apply this operation to `document` in place.
    ///
    /// # Errors
    ///
    /// Returns a [`PatchError`] when the document shape does not allow the
    /// operation. The document is left unchanged in that case.
    pub fn apply(&self, document: &mut Value) -> Result<(), PatchError> {
        match self {
            Self::SetList { path, items } => {
                add_member(document, path, Value::Array(items.clone()))
            }
            Self::Append { path, item } => match document.pointer_mut(path) {
                Some(Value::Array(list)) => {
                    list.push(item.clone());
                    Ok(())
                }
                Some(_) => Err(PatchError::NotAList(path.clone())),
                None => Err(PatchError::MissingTarget(path.clone())),
            },
            Self::Replace { path, value } => {
                if !path.starts_with('/') {
                    return Err(PatchError::InvalidPointer(path.clone()));
                }
                let target = document
                    .pointer_mut(path)
                    .ok_or_else(|| PatchError::MissingTarget(path.clone()))?;
                *target = value.clone();
                Ok(())
            }
        }
    }
}

impl Serialize for PatchOperation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PatchOperation", 3)?;
        state.serialize_field("op", self.op())?;
        state.serialize_field("path", &self.pointer())?;
        match self {
            Self::SetList { items, .. } => state.serialize_field("value", items)?,
            Self::Append { item, .. } => state.serialize_field("value", item)?,
            Self::Replace { value, .. } => state.serialize_field("value", value)?,
        }
        state.end()
    }
}

/// Apply `operations` to `document` in order, stopping at the first failure.
///
/// # Errors
///
/// Returns the first [`PatchError`]. Operations before it stay applied.
pub fn apply_patch(document: &mut Value, operations: &[PatchOperation]) -> Result<(), PatchError> {
    operations.iter().try_for_each(|op| op.apply(document))
}

/// RFC 6902 `add`: set an object member or insert into an array.
fn add_member(document: &mut Value, path: &str, value: Value) -> Result<(), PatchError> {
    let (parent, token) = path
        .rsplit_once('/')
        .filter(|_| path.starts_with('/'))
        .ok_or_else(|| PatchError::InvalidPointer(path.to_owned()))?;
    let key = token.replace("~1", "/").replace("~0", "~");

    match document.pointer_mut(parent) {
        Some(Value::Object(map)) => {
            map.insert(key, value);
            Ok(())
        }
        Some(Value::Array(list)) => {
            if key == "-" {
                list.push(value);
                return Ok(());
            }
            match key.parse::<usize>() {
                Ok(index) if index <= list.len() => {
                    list.insert(index, value);
                    Ok(())
                }
                _ => Err(PatchError::InvalidPointer(path.to_owned())),
            }
        }
        _ => Err(PatchError::MissingParent(path.to_owned())),
    }
}
