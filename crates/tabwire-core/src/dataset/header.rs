//! Attribute header inference.
//!
//! The header is a heuristic derived from the data on every call, never a
//! stored schema:
//!
//! - text and boolean columns are `STRING`, or `NOMINAL` when the number of
//!   distinct values is strictly below half the row count
//! - timestamp and date columns are `DATE`
//! - everything else is `NUMERIC`

use super::Dataset;
use crate::config::DatasetConfig;
use crate::{Result, WorkerError};
use arrow::array::{Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeType {
    String,
    Nominal,
    Date,
    Numeric,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeHeader {
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstancesHeader {
    pub relation_name: String,
    pub attributes: Vec<AttributeHeader>,
}

fn is_textual(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Boolean
    )
}

fn is_datetime(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64
    )
}

/// Distinct non-null values in first-seen order, plus whether a null was seen.
fn distinct_values(column: &dyn Array) -> Result<(Vec<String>, bool)> {
    let as_text = cast(column, &DataType::Utf8)?;
    let strings = as_text
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| WorkerError::dataset("text column did not cast to Utf8"))?;

    let mut seen = HashSet::new();
    let mut values = Vec::new();
    let mut saw_null = false;
    for value in strings.iter() {
        match value {
            Some(s) => {
                if seen.insert(s) {
                    values.push(s.to_string());
                }
            }
            None => saw_null = true,
        }
    }
    Ok((values, saw_null))
}

fn infer_attribute(name: &str, column: &dyn Array, num_rows: usize) -> Result<AttributeHeader> {
    let data_type = column.data_type();
    let mut attribute = AttributeHeader {
        name: name.to_string(),
        attribute_type: AttributeType::Numeric,
        values: None,
        format: None,
    };

    if is_textual(data_type) {
        attribute.attribute_type = AttributeType::String;
        let (values, saw_null) = distinct_values(column)?;
        // A missing value counts toward the distinct total but is never listed.
        let distinct = values.len() + usize::from(saw_null);
        if (distinct as f64) < (num_rows as f64) / 2.0 {
            attribute.attribute_type = AttributeType::Nominal;
            attribute.values = Some(values);
        }
    } else if is_datetime(data_type) {
        attribute.attribute_type = AttributeType::Date;
        attribute.format = Some(DatasetConfig::HEADER_DATE_FORMAT);
    }

    Ok(attribute)
}

/// Derive the attribute header for `dataset`, in column order.
pub fn infer_header(relation_name: &str, dataset: &Dataset) -> Result<InstancesHeader> {
    let num_rows = dataset.num_rows();
    let batch = dataset.batch();
    let attributes = batch
        .schema()
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, column)| infer_attribute(field.name(), column.as_ref(), num_rows))
        .collect::<Result<Vec<_>>>()?;

    Ok(InstancesHeader {
        relation_name: relation_name.to_string(),
        attributes,
    })
}
