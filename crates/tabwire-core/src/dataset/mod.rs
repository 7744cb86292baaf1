//! Dataset marshaling.
//!
//! Converts between wire representations and in-memory tables, and derives
//! the attribute header the host uses to rebuild its own schema.
//!
//! - **CSV**: `put_instances` / `get_instances` bodies ([`csv`])
//! - **Dates**: format inference for date attributes ([`dates`])
//! - **Header**: per-column type inference ([`header`])
//! - **IPC**: Arrow IPC streams for `ipc_instances` and pickled datasets ([`ipc`])

pub mod csv;
pub mod dates;
pub mod header;
pub mod ipc;

pub use self::csv::{read_csv, write_csv, CsvReadOptions};
pub use header::{infer_header, AttributeHeader, AttributeType, InstancesHeader};
pub use ipc::{read_ipc_stream, write_ipc_stream};

use crate::Result;
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;

/// An in-memory table backed by a single Arrow record batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    batch: RecordBatch,
}

impl Dataset {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    /// Concatenate any number of batches sharing `schema`.
    pub fn from_batches(schema: SchemaRef, batches: &[RecordBatch]) -> Result<Self> {
        let batch = concat_batches(&schema, batches)?;
        Ok(Self { batch })
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Render as an ASCII table.
    pub fn to_pretty_string(&self) -> Result<String> {
        let table = pretty_format_batches(std::slice::from_ref(&self.batch))?;
        Ok(table.to_string())
    }

    /// One line per column with its type, then the row count.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for field in self.batch.schema().fields() {
            out.push_str(&format!("{}: {}\n", field.name(), field.data_type()));
        }
        out.push_str(&format!("rows: {}\n", self.num_rows()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn sample() -> Dataset {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("label", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec!["x", "y"])),
            ],
        )
        .unwrap();
        Dataset::new(batch)
    }

    #[test]
    fn test_from_batches_concatenates() {
        let ds = sample();
        let merged = Dataset::from_batches(ds.schema(), &[ds.batch().clone(), ds.batch().clone()])
            .unwrap();
        assert_eq!(merged.num_rows(), 4);
        assert_eq!(merged.column_names(), vec!["id", "label"]);
    }

    #[test]
    fn test_pretty_string_contains_values() {
        let text = sample().to_pretty_string().unwrap();
        assert!(text.contains("label"));
        assert!(text.contains("| y "));
    }

    #[test]
    fn test_summary() {
        let summary = sample().summary();
        assert!(summary.contains("id: Int64"));
        assert!(summary.ends_with("rows: 2\n"));
    }
}
