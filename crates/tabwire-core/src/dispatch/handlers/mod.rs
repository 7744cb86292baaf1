//! Command handlers, split by domain.
//!
//! A handler either sends its complete reply and returns `Ok`, or sends
//! nothing and returns the error for the loop to report. Frames a command
//! declares are read before any validation that could fail, so an error
//! never leaves unread data on the wire.

mod debug;
mod instances;
mod memory;
mod script;
mod variables;

use super::{Flow, WorkerState};
use crate::protocol::{Command, ControlMessage};
use crate::transport::Connection;
use crate::{Result, WorkerError};
use serde_json::{Map, Value};

pub(crate) async fn dispatch(
    command: Command,
    conn: &mut Connection,
    state: &mut WorkerState,
    message: &ControlMessage,
) -> Result<Flow> {
    match command {
        // Datasets
        Command::PutInstances => instances::put_instances(conn, state, message).await?,
        Command::GetInstances => instances::get_instances(conn, state, message).await?,
        Command::IpcInstances => instances::ipc_instances(conn, state, message).await?,

        // Shared memory
        Command::ShareInstances => memory::share_instances(conn, state, message).await?,
        Command::CloseSharedInstances => memory::close_shared_instances(conn, state).await?,

        // Scripts
        Command::ExecuteScript => script::execute_script(conn, state, message).await?,

        // Variables
        Command::GetVariableList => variables::get_variable_list(conn, state).await?,
        Command::GetVariableType => variables::get_variable_type(conn, state, message).await?,
        Command::GetVariableValue => variables::get_variable_value(conn, state, message).await?,
        Command::GetImage => variables::get_image(conn, state, message).await?,
        Command::VariableIsSet => variables::variable_is_set(conn, state, message).await?,
        Command::SetVariableValue => variables::set_variable_value(conn, state, message).await?,

        // Diagnostics
        Command::GetDebugBuffer => debug::get_debug_buffer(conn, state).await?,
        Command::Shutdown => {
            state.trace(state.startup_debug, "Received shutdown command...\n");
            return Ok(Flow::Shutdown);
        }
    }
    Ok(Flow::Continue)
}

// ============================================================================
// Parameter extraction helpers
// ============================================================================

/// Extract an optional string parameter.
pub(crate) fn get_str_param<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

/// Extract a required string parameter or return an error naming it.
pub(crate) fn require_str_param<'a>(
    params: &'a Map<String, Value>,
    context: &'static str,
    key: &'static str,
) -> Result<&'a str> {
    match params.get(key) {
        None | Some(Value::Null) => Err(WorkerError::MissingField {
            context,
            field: key,
        }),
        Some(value) => value.as_str().ok_or_else(|| WorkerError::InvalidField {
            field: key,
            message: format!("{} json message has a non-string {} entry!", context, key),
        }),
    }
}

/// Extract a required JSON object parameter.
pub(crate) fn require_object_param<'a>(
    params: &'a Map<String, Value>,
    context: &'static str,
    key: &'static str,
) -> Result<&'a Map<String, Value>> {
    match params.get(key) {
        None | Some(Value::Null) => Err(WorkerError::MissingField {
            context,
            field: key,
        }),
        Some(value) => value.as_object().ok_or_else(|| WorkerError::InvalidField {
            field: key,
            message: format!("{} json message has a non-object {} entry!", context, key),
        }),
    }
}

/// Extract an optional non-negative count. Negative counts read as zero.
pub(crate) fn get_count_param(params: &Map<String, Value>, key: &str) -> Option<u64> {
    let value = params.get(key)?;
    value
        .as_u64()
        .or_else(|| value.as_i64().map(|n| n.max(0) as u64))
        .or_else(|| value.as_f64().map(|n| n.max(0.0) as u64))
}

/// Extract a required non-negative count.
pub(crate) fn require_count_param(
    params: &Map<String, Value>,
    context: &'static str,
    key: &'static str,
) -> Result<u64> {
    get_count_param(params, key).ok_or(WorkerError::MissingField {
        context,
        field: key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_require_str_param() {
        let p = params(json!({"script": "x = 1", "n": 3}));
        assert_eq!(require_str_param(&p, "execute script", "script").unwrap(), "x = 1");

        let err = require_str_param(&p, "execute script", "missing").unwrap_err();
        assert!(err.to_string().contains("missing"));

        let err = require_str_param(&p, "execute script", "n").unwrap_err();
        assert!(matches!(err, WorkerError::InvalidField { field: "n", .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_null_counts_as_missing() {
        let p = params(json!({"header": null}));
        let err = require_object_param(&p, "put instances", "header").unwrap_err();
        assert_eq!(
            err.to_string(),
            "put instances json message does not contain a header entry!"
        );
    }

    #[test]
    fn test_count_param() {
        let p = params(json!({"a": 2, "b": -1, "c": 3.0, "d": "4"}));
        assert_eq!(get_count_param(&p, "a"), Some(2));
        assert_eq!(get_count_param(&p, "b"), Some(0));
        assert_eq!(get_count_param(&p, "c"), Some(3));
        assert_eq!(get_count_param(&p, "d"), None);
        assert!(require_count_param(&p, "put instances", "e").is_err());
        assert_eq!(get_str_param(&p, "d"), Some("4"));
    }
}
