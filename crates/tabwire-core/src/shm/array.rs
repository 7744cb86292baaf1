//! Typed array views over shared or owned memory.

use super::SharedRegion;
use crate::{Result, WorkerError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Element type of an array, named the way numpy names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
}

impl DType {
    const ALL: [DType; 11] = [
        DType::Bool,
        DType::Int8,
        DType::Int16,
        DType::Int32,
        DType::Int64,
        DType::Uint8,
        DType::Uint16,
        DType::Uint32,
        DType::Uint64,
        DType::Float32,
        DType::Float64,
    ];

    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == name.trim())
            .ok_or_else(|| WorkerError::InvalidField {
                field: "data_type",
                message: format!("Unsupported data type {}", name),
            })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Uint8 => "uint8",
            DType::Uint16 => "uint16",
            DType::Uint32 => "uint32",
            DType::Uint64 => "uint64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }

    /// Size of one element in bytes.
    pub fn item_size(&self) -> usize {
        match self {
            DType::Bool | DType::Int8 | DType::Uint8 => 1,
            DType::Int16 | DType::Uint16 => 2,
            DType::Int32 | DType::Uint32 | DType::Float32 => 4,
            DType::Int64 | DType::Uint64 | DType::Float64 => 8,
        }
    }
}

fn bad_shape(text: &str) -> WorkerError {
    WorkerError::InvalidField {
        field: "data_shape",
        message: format!("Unable to parse data shape {}", text),
    }
}

/// Parse a tuple literal such as `(100, 4)`, `(100,)`, `()` or a bare `100`.
///
/// The text is treated as data only; nothing is evaluated.
pub fn parse_shape(text: &str) -> Result<Vec<usize>> {
    let trimmed = text.trim();
    let inner = match trimmed.strip_prefix('(') {
        Some(rest) => rest.strip_suffix(')').ok_or_else(|| bad_shape(text))?,
        None => trimmed,
    };
    if inner.trim().is_empty() {
        return if trimmed.starts_with('(') {
            Ok(Vec::new())
        } else {
            Err(bad_shape(text))
        };
    }

    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
    let mut shape = Vec::with_capacity(parts.len());
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            // Only a single trailing comma is allowed, as in `(100,)`.
            if i == parts.len() - 1 && i > 0 {
                continue;
            }
            return Err(bad_shape(text));
        }
        shape.push(part.parse::<usize>().map_err(|_| bad_shape(text))?);
    }
    Ok(shape)
}

/// Byte length of an array of `shape` elements of `dtype`.
pub fn byte_len(dtype: DType, shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(dtype.item_size(), |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| WorkerError::InvalidField {
            field: "data_shape",
            message: "Data shape is too large".to_string(),
        })
}

#[derive(Clone)]
enum ArrayData {
    Mapped(Arc<dyn SharedRegion>),
    Owned(Arc<[u8]>),
}

/// A typed, read-only view over a block of memory.
///
/// A mapped view holds a reference to its region, so the mapping outlives
/// the handle slot for as long as the view is stored somewhere.
#[derive(Clone)]
pub struct ArrayView {
    dtype: DType,
    shape: Vec<usize>,
    data: ArrayData,
}

impl ArrayView {
    /// View the start of a shared region.
    pub fn mapped(dtype: DType, shape: Vec<usize>, region: Arc<dyn SharedRegion>) -> Result<Self> {
        let needed = byte_len(dtype, &shape)?;
        if region.as_bytes().len() < needed {
            return Err(WorkerError::SharedMemory {
                message: format!(
                    "region {} holds {} bytes but the array needs {}",
                    region.name(),
                    region.as_bytes().len(),
                    needed
                ),
            });
        }
        Ok(Self {
            dtype,
            shape,
            data: ArrayData::Mapped(region),
        })
    }

    /// An array that owns a copy of its bytes.
    pub fn owned(dtype: DType, shape: Vec<usize>, bytes: Vec<u8>) -> Result<Self> {
        let needed = byte_len(dtype, &shape)?;
        if bytes.len() != needed {
            return Err(WorkerError::encoding(format!(
                "array of shape {:?} and dtype {} needs {} bytes, got {}",
                shape,
                dtype.as_str(),
                needed,
                bytes.len()
            )));
        }
        Ok(Self {
            dtype,
            shape,
            data: ArrayData::Owned(bytes.into()),
        })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.data, ArrayData::Mapped(_))
    }

    pub fn as_bytes(&self) -> &[u8] {
        let len = self.len() * self.dtype.item_size();
        match &self.data {
            ArrayData::Mapped(region) => &region.as_bytes()[..len],
            ArrayData::Owned(bytes) => &bytes[..len],
        }
    }
}

fn format_shape(shape: &[usize]) -> String {
    match shape {
        [] => "()".to_string(),
        [single] => format!("({},)", single),
        dims => {
            let parts: Vec<String> = dims.iter().map(|d| d.to_string()).collect();
            format!("({})", parts.join(", "))
        }
    }
}

impl fmt::Display for ArrayView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "array(shape={}, dtype={})",
            format_shape(&self.shape),
            self.dtype.as_str()
        )
    }
}

impl fmt::Debug for ArrayView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayView")
            .field("dtype", &self.dtype)
            .field("shape", &self.shape)
            .field("shared", &self.is_shared())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shape_forms() {
        assert_eq!(parse_shape("(100, 4)").unwrap(), vec![100, 4]);
        assert_eq!(parse_shape("(100,)").unwrap(), vec![100]);
        assert_eq!(parse_shape("()").unwrap(), Vec::<usize>::new());
        assert_eq!(parse_shape(" 100 ").unwrap(), vec![100]);
        assert_eq!(parse_shape("(2,3,4)").unwrap(), vec![2, 3, 4]);
    }

    #[test]
    fn test_parse_shape_rejects_code_and_junk() {
        for text in ["", "(", "(1,,2)", "(,)", "(-1,)", "__import__('os')", "(1, 2"] {
            let err = parse_shape(text).unwrap_err();
            assert!(!err.is_fatal(), "{}", text);
        }
    }

    #[test]
    fn test_dtype_names() {
        assert_eq!(DType::parse("float32").unwrap(), DType::Float32);
        assert_eq!(DType::parse("uint16").unwrap().item_size(), 2);
        assert!(DType::parse("complex128").is_err());
    }

    #[test]
    fn test_owned_view_length_check() {
        assert!(ArrayView::owned(DType::Int32, vec![2, 2], vec![0; 16]).is_ok());
        assert!(ArrayView::owned(DType::Int32, vec![2, 2], vec![0; 15]).is_err());
    }

    #[test]
    fn test_display_like_numpy() {
        let view = ArrayView::owned(DType::Float64, vec![3], vec![0; 24]).unwrap();
        assert_eq!(view.to_string(), "array(shape=(3,), dtype=float64)");
        let view = ArrayView::owned(DType::Uint8, vec![2, 1], vec![7, 9]).unwrap();
        assert_eq!(view.to_string(), "array(shape=(2, 1), dtype=uint8)");
        assert_eq!(view.as_bytes(), &[7, 9]);
    }
}
