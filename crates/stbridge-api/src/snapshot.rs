// Capability snapshot
//
// A status read returns an attribute tree whose shape depends on the
// device's capabilities. Rather than modelling every capability, the tree
// is kept as a `serde_json::Value` and queried by key path.

use serde_json::Value;

use crate::error::Error;

/// One point-in-time read of a device's full attribute tree.
///
/// Paths are slices of object keys, so keys containing dots
/// (`"x.com.samsung.da.description"`) need no escaping.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    root: Value,
}

impl Snapshot {
    /// Wrap a decoded status body. The top level must be a JSON object.
    pub fn from_value(root: Value) -> Result<Self, Error> {
        if root.is_object() {
            Ok(Self { root })
        } else {
            Err(Error::Deserialization {
                message: format!("status body is not a JSON object (got {})", kind(&root)),
                body: root.to_string(),
            })
        }
    }

    /// Decode a raw status body.
    pub fn parse(body: &str) -> Result<Self, Error> {
        let root: Value = serde_json::from_str(body).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", crate::client::preview(body)),
            body: body.to_owned(),
        })?;
        Self::from_value(root)
    }

    /// Walk `path` through nested objects. `None` if any segment is missing
    /// or a non-object is reached early.
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        path.iter()
            .try_fold(&self.root, |node, key| node.as_object()?.get(*key))
            .filter(|v| !v.is_null())
    }

    pub fn str(&self, path: &[&str]) -> Option<&str> {
        self.get(path)?.as_str()
    }

    /// Numeric value at `path`. Numeric strings are accepted too; some
    /// capabilities report readings as text.
    pub fn f64(&self, path: &[&str]) -> Option<f64> {
        match self.get(path)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Shorthand for the common `{capability}.{attribute}.value` shape.
    pub fn attribute(&self, capability: &str, attribute: &str) -> Option<&Value> {
        self.get(&[capability, attribute, "value"])
    }

    pub fn attribute_str(&self, capability: &str, attribute: &str) -> Option<&str> {
        self.str(&[capability, attribute, "value"])
    }

    pub fn attribute_f64(&self, capability: &str, attribute: &str) -> Option<f64> {
        self.f64(&[capability, attribute, "value"])
    }

    /// The `unit` reported next to an attribute value, e.g. `"C"`.
    pub fn attribute_unit(&self, capability: &str, attribute: &str) -> Option<&str> {
        self.str(&[capability, attribute, "unit"])
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
