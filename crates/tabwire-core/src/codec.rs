//! Variable value encodings for `get_variable_value` and `set_variable_value`.
//!
//! `pickled` is a MessagePack envelope over the tagged value, base64-wrapped
//! for JSON transport. It round-trips every value kind. `json` embeds the
//! value directly and only works for JSON objects. `string` is the value's
//! textual representation.

use crate::dataset::{read_ipc_stream, write_ipc_stream};
use crate::env::Value;
use crate::figure::Figure;
use crate::shm::{ArrayView, DType};
use crate::{Result, WorkerError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Encodings a variable value can travel in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableEncoding {
    Pickled,
    Json,
    String,
}

impl VariableEncoding {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "pickled" => Some(Self::Pickled),
            "json" => Some(Self::Json),
            "string" => Some(Self::String),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pickled => "pickled",
            Self::Json => "json",
            Self::String => "string",
        }
    }
}

#[derive(Serialize, Deserialize)]
enum Pickled {
    Object(serde_json::Value),
    /// Arrow IPC stream bytes.
    Dataset(Vec<u8>),
    Array {
        dtype: DType,
        shape: Vec<usize>,
        data: Vec<u8>,
    },
    Figure {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
}

/// Serialize a value to envelope bytes. Arrays are copied out of shared
/// memory, so the result never refers to a mapping.
pub fn encode_value(value: &Value) -> Result<Vec<u8>> {
    let envelope = match value {
        Value::Object(object) => Pickled::Object(object.clone()),
        Value::Dataset(dataset) => Pickled::Dataset(write_ipc_stream(dataset)?),
        Value::Array(array) => Pickled::Array {
            dtype: array.dtype(),
            shape: array.shape().to_vec(),
            data: array.as_bytes().to_vec(),
        },
        Value::Figure(figure) => Pickled::Figure {
            width: figure.width(),
            height: figure.height(),
            pixels: figure.pixels().to_vec(),
        },
    };
    rmp_serde::to_vec_named(&envelope).map_err(|e| WorkerError::encoding(e.to_string()))
}

pub fn decode_value(bytes: &[u8]) -> Result<Value> {
    let envelope: Pickled = rmp_serde::from_slice(bytes)
        .map_err(|e| WorkerError::encoding(format!("invalid pickled value: {}", e)))?;
    Ok(match envelope {
        Pickled::Object(object) => Value::Object(object),
        Pickled::Dataset(ipc) => Value::Dataset(read_ipc_stream(&ipc)?),
        Pickled::Array { dtype, shape, data } => {
            Value::Array(ArrayView::owned(dtype, shape, data)?)
        }
        Pickled::Figure {
            width,
            height,
            pixels,
        } => Value::Figure(Figure::from_rgba(width, height, pixels)?),
    })
}

/// Encode as base64 text.
pub fn pickle(value: &Value) -> Result<String> {
    Ok(STANDARD.encode(encode_value(value)?))
}

/// Decode base64 text produced by [`pickle`].
pub fn unpickle(text: &str) -> Result<Value> {
    let bytes = STANDARD.decode(text.trim())?;
    decode_value(&bytes)
}

/// The value as an embeddable JSON value.
pub fn to_json(name: &str, value: &Value) -> Result<serde_json::Value> {
    match value {
        Value::Object(object) => Ok(object.clone()),
        _ => Err(WorkerError::WrongType {
            name: name.to_string(),
            expected: "JSON-serializable",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{read_csv, CsvReadOptions};
    use serde_json::json;

    #[test]
    fn test_pickle_preserves_each_kind() {
        let dataset = read_csv("1,'a'\n2,'b'\n", &CsvReadOptions::default()).unwrap();
        let array = ArrayView::owned(DType::Int16, vec![2], vec![1, 0, 2, 0]).unwrap();
        let figure = Figure::solid(2, 2, [9, 8, 7]);

        let restored = unpickle(&pickle(&Value::from(dataset.clone())).unwrap()).unwrap();
        assert!(matches!(restored, Value::Dataset(ref d) if *d == dataset));

        let restored = unpickle(&pickle(&Value::from(array)).unwrap()).unwrap();
        match restored {
            Value::Array(view) => {
                assert_eq!(view.dtype(), DType::Int16);
                assert_eq!(view.shape(), &[2]);
                assert_eq!(view.as_bytes(), &[1, 0, 2, 0]);
                assert!(!view.is_shared());
            }
            other => panic!("expected array, got {:?}", other),
        }

        let restored = unpickle(&pickle(&Value::from(figure.clone())).unwrap()).unwrap();
        assert!(matches!(restored, Value::Figure(ref f) if *f == figure));

        let object = json!({"k": [1, 2.5, "s", null, true]});
        let restored = unpickle(&pickle(&Value::from(object.clone())).unwrap()).unwrap();
        assert!(matches!(restored, Value::Object(ref o) if *o == object));
    }

    #[test]
    fn test_bad_input_is_recoverable() {
        let err = unpickle("***not base64***").unwrap_err();
        assert!(matches!(err, WorkerError::Encoding { .. }));
        assert!(!err.is_fatal());

        let err = unpickle(&STANDARD.encode(b"\xc1junk")).unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_json_only_for_objects() {
        assert_eq!(to_json("x", &Value::from(json!(3))).unwrap(), json!(3));
        let err = to_json("fig", &Value::from(Figure::solid(1, 1, [0, 0, 0]))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Variable fig is not a JSON-serializable object"
        );
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!(VariableEncoding::parse("pickled"), Some(VariableEncoding::Pickled));
        assert_eq!(VariableEncoding::parse("json").unwrap().as_str(), "json");
        assert_eq!(VariableEncoding::parse("yaml"), None);
    }
}
