//! CSV bodies for `put_instances` and `get_instances`.
//!
//! Dialect on both directions: no header row, `'` as quote, `\` as escape,
//! a bare `?` as the missing-value token.

use super::dates::parse_date_column;
use super::Dataset;
use crate::config::DatasetConfig;
use crate::{Result, WorkerError};
use arrow::array::{ArrayRef, StringArray};
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use regex::Regex;
use std::io::Cursor;
use std::sync::Arc;

/// How to interpret an incoming CSV body.
#[derive(Debug, Clone, Default)]
pub struct CsvReadOptions {
    /// Column names in order. Positional names are used when absent.
    pub column_names: Option<Vec<String>>,
    /// Columns to parse as timestamps.
    pub date_columns: Vec<String>,
}

fn null_regex() -> Result<Regex> {
    Regex::new(DatasetConfig::NA_REGEX).map_err(|e| WorkerError::dataset(e.to_string()))
}

fn is_date_like(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64
    )
}

/// Apply caller-supplied names and date columns to an inferred schema.
///
/// Requested date columns are read as text and converted afterwards by
/// [`convert_date_columns`]. Anything else inferred as a date stays text.
/// Columns with no values at all become floats.
fn resolve_schema(inferred: &Schema, options: &CsvReadOptions) -> Result<Schema> {
    let names: Vec<String> = match &options.column_names {
        Some(names) => {
            if names.len() != inferred.fields().len() {
                return Err(WorkerError::dataset(format!(
                    "header names {} attributes but the data has {} columns",
                    names.len(),
                    inferred.fields().len()
                )));
            }
            names.clone()
        }
        None => inferred.fields().iter().map(|f| f.name().clone()).collect(),
    };

    for date_column in &options.date_columns {
        if !names.contains(date_column) {
            return Err(WorkerError::dataset(format!(
                "date attribute {} is not a column",
                date_column
            )));
        }
    }

    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .zip(names)
        .map(|(field, name)| {
            let requested = options.date_columns.contains(&name);
            let data_type = if requested || is_date_like(field.data_type()) {
                DataType::Utf8
            } else if field.data_type() == &DataType::Null {
                DataType::Float64
            } else {
                field.data_type().clone()
            };
            Field::new(name, data_type, true)
        })
        .collect();

    Ok(Schema::new(fields))
}

/// Parse a CSV body into a dataset, inferring column types.
pub fn read_csv(text: &str, options: &CsvReadOptions) -> Result<Dataset> {
    let format = Format::default()
        .with_header(false)
        .with_quote(DatasetConfig::QUOTE)
        .with_escape(DatasetConfig::ESCAPE)
        .with_null_regex(null_regex()?);
    let (inferred, _) = format.infer_schema(Cursor::new(text.as_bytes()), None)?;
    let schema = Arc::new(resolve_schema(&inferred, options)?);

    let reader = ReaderBuilder::new(schema.clone())
        .with_header(false)
        .with_quote(DatasetConfig::QUOTE)
        .with_escape(DatasetConfig::ESCAPE)
        .with_null_regex(null_regex()?)
        .with_batch_size(DatasetConfig::READ_BATCH_SIZE)
        .build(Cursor::new(text.as_bytes()))?;
    let batches = reader.collect::<std::result::Result<Vec<_>, ArrowError>>()?;

    let dataset = Dataset::from_batches(schema, &batches)?;
    convert_date_columns(dataset, &options.date_columns)
}

/// Replace each text column named in `date_columns` with timestamps.
fn convert_date_columns(dataset: Dataset, date_columns: &[String]) -> Result<Dataset> {
    if date_columns.is_empty() {
        return Ok(dataset);
    }

    let batch = dataset.batch();
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        if !date_columns.contains(field.name()) {
            fields.push(field.as_ref().clone());
            columns.push(Arc::clone(column));
            continue;
        }
        let text = column
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| {
                WorkerError::dataset(format!(
                    "date attribute {} was not read as text",
                    field.name()
                ))
            })?;
        columns.push(Arc::new(parse_date_column(field.name(), text)?));
        fields.push(Field::new(
            field.name(),
            DataType::Timestamp(TimeUnit::Millisecond, None),
            true,
        ));
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
    Ok(Dataset::new(batch))
}

/// Serialize a dataset as a CSV body without a header row.
///
/// Timestamps are rendered as `"yyyy-MM-dd HH:mm:ss"`, double quotes
/// included.
pub fn write_csv(dataset: &Dataset) -> Result<String> {
    let mut buf = Vec::new();
    {
        let mut writer = WriterBuilder::new()
            .with_header(false)
            .with_quote(DatasetConfig::QUOTE)
            .with_escape(DatasetConfig::ESCAPE)
            .with_double_quote(false)
            .with_null(DatasetConfig::NA_TOKEN.to_string())
            .with_timestamp_format(DatasetConfig::CSV_TIMESTAMP_FORMAT.to_string())
            .with_datetime_format(DatasetConfig::CSV_TIMESTAMP_FORMAT.to_string())
            .with_date_format(DatasetConfig::CSV_DATE_FORMAT.to_string())
            .build(&mut buf);
        writer.write(dataset.batch())?;
    }
    String::from_utf8(buf).map_err(|e| WorkerError::dataset(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_quoted_text_and_numbers() {
        let ds = read_csv("1,'x'\n2,'y'\n", &CsvReadOptions::default()).unwrap();
        assert_eq!(ds.num_rows(), 2);
        assert_eq!(ds.num_columns(), 2);
        let schema = ds.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_roundtrip_body() {
        let ds = read_csv("1,'x'\n2,'y'\n", &CsvReadOptions::default()).unwrap();
        assert_eq!(write_csv(&ds).unwrap(), "1,x\n2,y\n");
    }

    #[test]
    fn test_question_mark_is_missing() {
        let ds = read_csv("1.5,'a'\n?,?\n", &CsvReadOptions::default()).unwrap();
        assert_eq!(ds.batch().column(0).null_count(), 1);
        assert_eq!(ds.batch().column(1).null_count(), 1);
        assert_eq!(write_csv(&ds).unwrap(), "1.5,a\n?,?\n");
    }

    #[test]
    fn test_column_names_from_header() {
        let options = CsvReadOptions {
            column_names: Some(vec!["petal".into(), "class".into()]),
            date_columns: vec![],
        };
        let ds = read_csv("1,'a'\n", &options).unwrap();
        assert_eq!(ds.column_names(), vec!["petal", "class"]);
    }

    #[test]
    fn test_column_name_count_mismatch() {
        let options = CsvReadOptions {
            column_names: Some(vec!["only".into()]),
            date_columns: vec![],
        };
        assert!(read_csv("1,'a'\n", &options).is_err());
    }

    #[test]
    fn test_date_columns_parse_and_render() {
        let options = CsvReadOptions {
            column_names: Some(vec!["when".into(), "v".into()]),
            date_columns: vec!["when".into()],
        };
        let ds = read_csv("'2021-03-04 05:06:07',1\n", &options).unwrap();
        assert!(matches!(
            ds.schema().field(0).data_type(),
            DataType::Timestamp(TimeUnit::Millisecond, None)
        ));
        assert_eq!(write_csv(&ds).unwrap(), "\"2021-03-04 05:06:07\",1\n");
    }

    #[test]
    fn test_date_columns_infer_layout() {
        let options = CsvReadOptions {
            column_names: Some(vec!["when".into(), "v".into()]),
            date_columns: vec!["when".into()],
        };
        let ds = read_csv("'03/04/2021',a\n?,b\n'12/31/2020',c\n", &options).unwrap();
        assert_eq!(
            write_csv(&ds).unwrap(),
            "\"2021-03-04 00:00:00\",a\n?,b\n\"2020-12-31 00:00:00\",c\n"
        );
    }

    #[test]
    fn test_numeric_looking_dates_are_read_as_text_first() {
        let options = CsvReadOptions {
            column_names: Some(vec!["day".into()]),
            date_columns: vec!["day".into()],
        };
        let ds = read_csv("20210304\n", &options).unwrap();
        assert_eq!(write_csv(&ds).unwrap(), "\"2021-03-04 00:00:00\"\n");
    }

    #[test]
    fn test_unreadable_date_column_is_error() {
        let options = CsvReadOptions {
            column_names: Some(vec!["when".into()]),
            date_columns: vec!["when".into()],
        };
        assert!(read_csv("'soon'\n", &options).is_err());
    }

    #[test]
    fn test_dates_not_requested_stay_text() {
        let ds = read_csv("'2021-03-04 05:06:07'\n", &CsvReadOptions::default()).unwrap();
        assert_eq!(ds.schema().field(0).data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_unknown_date_column_is_error() {
        let options = CsvReadOptions {
            column_names: None,
            date_columns: vec!["missing".into()],
        };
        assert!(read_csv("1\n", &options).is_err());
    }

    #[test]
    fn test_embedded_quote_is_escaped() {
        let ds = read_csv("'it\\'s'\n", &CsvReadOptions::default()).unwrap();
        assert_eq!(write_csv(&ds).unwrap(), "'it\\'s'\n");
    }
}
