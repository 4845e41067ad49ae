//! JSON-patch operations for PATCH bodies.
//!
//! Only the operations a diff of two documents needs are supported:
//! `add`, `remove` and `replace`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::query::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
}

impl PatchOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Replace => "replace",
        }
    }
}

/// One `{op, path, value?}` entry of a PATCH body. `path` is a JSON pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.into(),
            value: None,
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: Some(value),
        }
    }

    /// Checks the pointer syntax and that `value` is present exactly when
    /// the operation needs one.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::ValidationError` describing the first problem.
    pub fn validate(&self) -> Result<(), QueryError> {
        let invalid = |reason: &str| {
            Err(QueryError::ValidationError(format!(
                "{} {:?}: {reason}",
                self.op.as_str(),
                self.path
            )))
        };

        if !self.path.starts_with('/') {
            return invalid("path must start with '/'");
        }
        let mut chars = self.path.chars();
        while let Some(c) = chars.next() {
            if c == '~' && !matches!(chars.next(), Some('0' | '1')) {
                return invalid("'~' must be escaped as '~0'");
            }
        }
        match (self.op, &self.value) {
            (PatchOp::Add | PatchOp::Replace, None) => invalid("value is required"),
            (PatchOp::Remove, Some(_)) => invalid("remove takes no value"),
            _ => Ok(()),
        }
    }

    pub(crate) fn into_value(self) -> Value {
        let mut fields = Map::new();
        fields.insert("op".to_string(), Value::from(self.op.as_str()));
        fields.insert("path".to_string(), Value::String(self.path));
        if let Some(value) = self.value {
            fields.insert("value".to_string(), value);
        }
        Value::Object(fields)
    }
}

/// Validates every operation.
///
/// # Errors
///
/// Returns the first operation's `ValidationError`.
pub fn validate(operations: &[PatchOperation]) -> Result<(), QueryError> {
    operations.iter().try_for_each(PatchOperation::validate)
}

/// Operations that turn `original` into `updated`.
///
/// Objects are compared key by key and arrays index by index; anything
/// else that differs is replaced whole. Two documents that are not both
/// objects or both arrays cannot be diffed below the root and yield a
/// root `replace` that [`validate`] rejects.
///
/// ```
/// use querent::http::patch::{diff, PatchOperation};
/// use serde_json::json;
///
/// let before = json!({"id": 1, "name": "Ann", "phone": "555"});
/// let after = json!({"id": 1, "name": "Anne", "address": "Main St"});
///
/// assert_eq!(
///     diff(&before, &after),
///     vec![
///         PatchOperation::replace("/name", json!("Anne")),
///         PatchOperation::remove("/phone"),
///         PatchOperation::add("/address", json!("Main St")),
///     ],
/// );
/// ```
pub fn diff(original: &Value, updated: &Value) -> Vec<PatchOperation> {
    let mut operations = Vec::new();
    diff_into("", original, updated, &mut operations);
    operations
}

fn diff_into(path: &str, original: &Value, updated: &Value, out: &mut Vec<PatchOperation>) {
    match (original, updated) {
        (Value::Object(before), Value::Object(after)) => {
            for (key, old) in before {
                let child = format!("{path}/{}", escape(key));
                match after.get(key) {
                    Some(new) => diff_into(&child, old, new, out),
                    None => out.push(PatchOperation::remove(child)),
                }
            }
            for (key, new) in after {
                if !before.contains_key(key) {
                    out.push(PatchOperation::add(
                        format!("{path}/{}", escape(key)),
                        new.clone(),
                    ));
                }
            }
        }
        (Value::Array(before), Value::Array(after)) => {
            let common = before.len().min(after.len());
            for (i, (old, new)) in before.iter().zip(after).enumerate() {
                diff_into(&format!("{path}/{i}"), old, new, out);
            }
            for i in (common..before.len()).rev() {
                out.push(PatchOperation::remove(format!("{path}/{i}")));
            }
            for (i, new) in after.iter().enumerate().skip(common) {
                out.push(PatchOperation::add(format!("{path}/{i}"), new.clone()));
            }
        }
        _ if original == updated => {}
        _ => out.push(PatchOperation::replace(path, updated.clone())),
    }
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}
