//! Tagged variable values.

use crate::dataset::Dataset;
use crate::figure::Figure;
use crate::shm::ArrayView;
use crate::Result;
use serde_json::json;

/// Runtime kind of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Dataset,
    Array,
    Figure,
    Object,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Dataset => "dataset",
            ValueKind::Array => "array",
            ValueKind::Figure => "figure",
            ValueKind::Object => "object",
        }
    }
}

/// A value stored in the [`Environment`](super::Environment).
#[derive(Debug, Clone)]
pub enum Value {
    /// A tabular dataset.
    Dataset(Dataset),
    /// A typed view over shared or owned memory.
    Array(ArrayView),
    /// A renderable figure.
    Figure(Figure),
    /// Any JSON-representable value, typically produced by a script.
    Object(serde_json::Value),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Dataset(_) => ValueKind::Dataset,
            Value::Array(_) => ValueKind::Array,
            Value::Figure(_) => ValueKind::Figure,
            Value::Object(_) => ValueKind::Object,
        }
    }

    /// Type name reported by `get_variable_list`.
    ///
    /// These are the names hosts already display, so they follow the
    /// dataframe/ndarray vocabulary rather than the Rust type names.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::Dataset(_) => "DataFrame",
            Value::Array(_) => "ndarray",
            Value::Figure(_) => "Figure",
            Value::Object(value) => match value {
                serde_json::Value::Null => "NoneType",
                serde_json::Value::Bool(_) => "bool",
                serde_json::Value::Number(n) if n.is_f64() => "float",
                serde_json::Value::Number(_) => "int",
                serde_json::Value::String(_) => "str",
                serde_json::Value::Array(_) => "list",
                serde_json::Value::Object(_) => "dict",
            },
        }
    }

    /// Textual representation used by the `string` encoding.
    pub fn to_display_string(&self) -> Result<String> {
        match self {
            Value::Dataset(dataset) => dataset.to_pretty_string(),
            Value::Array(array) => Ok(array.to_string()),
            Value::Figure(figure) => Ok(figure.to_string()),
            Value::Object(serde_json::Value::String(s)) => Ok(s.clone()),
            Value::Object(value) => Ok(value.to_string()),
        }
    }

    /// Structural summary exposed to scripts.
    pub fn describe(&self, name: &str) -> serde_json::Value {
        match self {
            Value::Dataset(dataset) => json!({
                "name": name,
                "kind": self.kind().as_str(),
                "rows": dataset.num_rows(),
                "columns": dataset.column_names(),
            }),
            Value::Array(array) => json!({
                "name": name,
                "kind": self.kind().as_str(),
                "dtype": array.dtype().as_str(),
                "shape": array.shape(),
            }),
            Value::Figure(figure) => json!({
                "name": name,
                "kind": self.kind().as_str(),
                "width": figure.width(),
                "height": figure.height(),
            }),
            Value::Object(_) => json!({
                "name": name,
                "kind": self.kind().as_str(),
                "type": self.type_tag(),
            }),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Object(value)
    }
}

impl From<Dataset> for Value {
    fn from(dataset: Dataset) -> Self {
        Value::Dataset(dataset)
    }
}

impl From<Figure> for Value {
    fn from(figure: Figure) -> Self {
        Value::Figure(figure)
    }
}

impl From<ArrayView> for Value {
    fn from(array: ArrayView) -> Self {
        Value::Array(array)
    }
}
