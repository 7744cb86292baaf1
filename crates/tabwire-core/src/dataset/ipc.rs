//! Arrow IPC stream helpers.

use super::Dataset;
use crate::{Result, WorkerError};
use arrow::error::ArrowError;
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use std::io::Cursor;

/// Decode an Arrow IPC stream into a dataset. All batches are concatenated.
pub fn read_ipc_stream(data: &[u8]) -> Result<Dataset> {
    if data.is_empty() {
        return Err(WorkerError::dataset("empty Arrow IPC stream"));
    }
    let reader = StreamReader::try_new(Cursor::new(data), None)
        .map_err(|e| WorkerError::dataset(format!("Failed to read Arrow IPC: {}", e)))?;
    let schema = reader.schema();
    let batches = reader.collect::<std::result::Result<Vec<_>, ArrowError>>()?;
    Dataset::from_batches(schema, &batches)
}

/// Encode a dataset as Arrow IPC stream bytes.
pub fn write_ipc_stream(dataset: &Dataset) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let batch = dataset.batch();
        let mut writer = StreamWriter::try_new(&mut buffer, batch.schema().as_ref())?;
        writer.write(batch)?;
        writer.finish()?;
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    #[test]
    fn test_stream_preserves_schema_and_rows() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("w", DataType::Float64, true),
            Field::new("class", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(vec![Some(0.5), None, Some(2.0)])),
                Arc::new(StringArray::from(vec!["a", "b", "a"])),
            ],
        )
        .unwrap();
        let original = Dataset::new(batch);

        let bytes = write_ipc_stream(&original).unwrap();
        let decoded = read_ipc_stream(&bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_garbage_is_dataset_error() {
        let err = read_ipc_stream(b"definitely not arrow").unwrap_err();
        assert!(matches!(err, WorkerError::Dataset { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_empty_stream_is_error() {
        assert!(read_ipc_stream(&[]).is_err());
    }
}
