//! Structural JSON diff producing a patch list.
//!
//! Paths are JSON Pointers (`/Tags/0/Key`). Objects are compared key by key;
//! arrays element by element, with trailing additions or removals reported
//! individually. An empty patch means the two values are equal.

use serde::Serialize;
use serde_json::Value;

/// One difference between two JSON values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Present only in the new value
    Add {
        /// JSON Pointer
        path: String,
        /// New value
        value: Value,
    },
    /// Present only in the old value
    Remove {
        /// JSON Pointer
        path: String,
    },
    /// Present in both with different values
    Replace {
        /// JSON Pointer
        path: String,
        /// New value
        value: Value,
    },
}

impl PatchOp {
    /// The JSON Pointer this operation applies to.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. } | Self::Remove { path } | Self::Replace { path, .. } => path,
        }
    }
}

/// Compute the patch turning `old` into `new`.
#[must_use]
pub fn diff(old: &Value, new: &Value) -> Vec<PatchOp> {
    let mut patch = Vec::new();
    diff_at(String::new(), old, new, &mut patch);
    patch
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn diff_at(path: String, old: &Value, new: &Value, patch: &mut Vec<PatchOp>) {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            for (key, old_value) in old_map {
                let child = format!("{path}/{}", escape(key));
                match new_map.get(key) {
                    Some(new_value) => diff_at(child, old_value, new_value, patch),
                    None => patch.push(PatchOp::Remove { path: child }),
                }
            }
            for (key, new_value) in new_map {
                if !old_map.contains_key(key) {
                    patch.push(PatchOp::Add {
                        path: format!("{path}/{}", escape(key)),
                        value: new_value.clone(),
                    });
                }
            }
        }
        (Value::Array(old_items), Value::Array(new_items)) => {
            for (index, (old_item, new_item)) in old_items.iter().zip(new_items).enumerate() {
                diff_at(format!("{path}/{index}"), old_item, new_item, patch);
            }
            // Removals from the end first so that indexes stay valid when applied in order.
            for index in (new_items.len()..old_items.len()).rev() {
                patch.push(PatchOp::Remove {
                    path: format!("{path}/{index}"),
                });
            }
            for (index, new_item) in new_items.iter().enumerate().skip(old_items.len()) {
                patch.push(PatchOp::Add {
                    path: format!("{path}/{index}"),
                    value: new_item.clone(),
                });
            }
        }
        _ if old == new => {}
        _ => patch.push(PatchOp::Replace {
            path,
            value: new.clone(),
        }),
    }
}
