//! Dataset transfer handlers: `put_instances`, `get_instances`, `ipc_instances`.

use super::{
    get_count_param, get_str_param, require_count_param, require_object_param, require_str_param,
};
use crate::dataset::{
    infer_header, read_csv, read_ipc_stream, write_csv, CsvReadOptions, Dataset,
};
use crate::dispatch::WorkerState;
use crate::env::Value;
use crate::protocol::{ControlMessage, Response};
use crate::transport::Connection;
use crate::{Result, WorkerError};
use serde_json::Map;
use tracing::debug;

/// Column names and date columns from a `put_instances` header.
fn csv_options(header: &Map<String, serde_json::Value>) -> CsvReadOptions {
    let column_names = header
        .get("attributes")
        .and_then(serde_json::Value::as_array)
        .map(|attributes| {
            attributes
                .iter()
                .enumerate()
                .map(|(i, attribute)| {
                    attribute
                        .get("name")
                        .and_then(serde_json::Value::as_str)
                        .map(String::from)
                        .unwrap_or_else(|| format!("column_{}", i + 1))
                })
                .collect()
        });
    let date_columns = header
        .get("date_atts")
        .and_then(serde_json::Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(serde_json::Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    CsvReadOptions {
        column_names,
        date_columns,
    }
}

fn store_dataset(state: &mut WorkerState, message: &ControlMessage, name: &str, dataset: Dataset) {
    debug!(
        "Stored dataset {} ({} rows, {} columns)",
        name,
        dataset.num_rows(),
        dataset.num_columns()
    );
    state.trace(message.debug(), &format!("{}\n", dataset.summary()));
    state.env.set(name, dataset);
}

pub(crate) async fn put_instances(
    conn: &mut Connection,
    state: &mut WorkerState,
    message: &ControlMessage,
) -> Result<()> {
    let params = message.fields();

    // The CSV body follows whenever a positive count is declared.
    let body = match get_count_param(params, "num_instances") {
        Some(n) if n > 0 => Some(conn.receive_text().await?),
        _ => None,
    };

    let header = require_object_param(params, "put instances", "header")?;
    let frame_name = require_str_param(header, "put instances header", "frame_name")?;
    require_count_param(params, "put instances", "num_instances")?;

    if let Some(text) = body {
        let dataset = read_csv(&text, &csv_options(header))?;
        store_dataset(state, message, frame_name, dataset);
    }

    conn.send_json(&Response::ok()).await
}

pub(crate) async fn ipc_instances(
    conn: &mut Connection,
    state: &mut WorkerState,
    message: &ControlMessage,
) -> Result<()> {
    let params = message.fields();

    let body = match get_count_param(params, "num_instances") {
        Some(n) if n > 0 => Some(conn.receive_bytes().await?),
        _ => None,
    };

    let header = require_object_param(params, "ipc instances", "header")?;
    let frame_name = require_str_param(header, "ipc instances header", "frame_name")?;
    require_count_param(params, "ipc instances", "num_instances")?;

    if let Some(bytes) = body {
        let dataset = read_ipc_stream(&bytes)?;
        store_dataset(state, message, frame_name, dataset);
    }

    conn.send_json(&Response::ok()).await
}

/// Sends `ok`, the `instances_header` response, then the CSV body.
///
/// All three frames are prepared before the first is sent.
pub(crate) async fn get_instances(
    conn: &mut Connection,
    state: &mut WorkerState,
    message: &ControlMessage,
) -> Result<()> {
    let params = message.fields();
    let frame_name = get_str_param(params, "frame_name")
        .or_else(|| {
            params
                .get("header")
                .and_then(serde_json::Value::as_object)
                .and_then(|header| get_str_param(header, "frame_name"))
        })
        .ok_or(WorkerError::MissingField {
            context: "get instances",
            field: "frame_name",
        })?;

    let dataset = match state.env.get(frame_name) {
        Some(Value::Dataset(dataset)) => dataset,
        Some(_) => {
            return Err(WorkerError::WrongType {
                name: frame_name.to_string(),
                expected: "DataFrame",
            })
        }
        None => {
            return Err(WorkerError::VariableNotFound {
                name: frame_name.to_string(),
            })
        }
    };

    let header = infer_header(frame_name, dataset)?;
    let header = serde_json::to_value(&header).map_err(|e| WorkerError::Other(e.to_string()))?;
    let header_response = Response::instances_header(dataset.num_rows(), header);
    let body = write_csv(dataset)?;

    if message.debug() {
        let text = serde_json::to_string(&header_response).unwrap_or_default();
        state.trace(true, &format!("{}\n", text));
    }

    conn.send_json(&Response::ok()).await?;
    conn.send_json(&header_response).await?;
    conn.send_frame(body.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_csv_options_from_header() {
        let header = json!({
            "frame_name": "t",
            "attributes": [{"name": "petal", "type": "NUMERIC"}, {"type": "STRING"}],
            "date_atts": ["when"]
        });
        let options = csv_options(header.as_object().unwrap());
        assert_eq!(
            options.column_names,
            Some(vec!["petal".to_string(), "column_2".to_string()])
        );
        assert_eq!(options.date_columns, vec!["when".to_string()]);
    }

    #[test]
    fn test_csv_options_default_to_positional() {
        let header = json!({"frame_name": "t"});
        let options = csv_options(header.as_object().unwrap());
        assert!(options.column_names.is_none());
        assert!(options.date_columns.is_empty());
    }
}
