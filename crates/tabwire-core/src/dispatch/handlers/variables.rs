//! Variable inspection and transfer handlers.

use super::require_str_param;
use crate::codec::{self, VariableEncoding};
use crate::config::SharedMemoryConfig;
use crate::dispatch::WorkerState;
use crate::env::Value;
use crate::protocol::{ControlMessage, Response};
use crate::transport::Connection;
use crate::{Result, WorkerError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use tracing::warn;

/// Type tag reported for the open memory handle.
const HANDLE_TYPE_TAG: &str = "MemoryHandle";

/// Look up a value for `get_variable_value` and `get_image`.
fn lookup<'a>(state: &'a WorkerState, name: &str) -> Result<&'a Value> {
    state
        .env
        .get(name)
        .ok_or_else(|| WorkerError::VariableMissing {
            name: name.to_string(),
        })
}

/// Whether `name` is the reserved handle slot and the slot is occupied.
fn is_open_handle(state: &WorkerState, name: &str) -> bool {
    name == SharedMemoryConfig::HANDLE_SLOT_NAME && state.handle.is_open()
}

pub(crate) async fn get_variable_list(
    conn: &mut Connection,
    state: &mut WorkerState,
) -> Result<()> {
    let mut variables = state.env.list();
    let handle_name = SharedMemoryConfig::HANDLE_SLOT_NAME;
    if state.handle.is_open() && !state.env.is_set(handle_name) {
        variables.push(crate::env::VariableInfo {
            name: handle_name.to_string(),
            type_tag: HANDLE_TYPE_TAG.to_string(),
        });
        variables.sort_by(|a, b| a.name.cmp(&b.name));
    }

    let list: Vec<serde_json::Value> = variables
        .iter()
        .map(|v| json!({"name": v.name, "type": v.type_tag}))
        .collect();
    conn.send_json(&Response::ok().with("variable_list", list)).await
}

pub(crate) async fn variable_is_set(
    conn: &mut Connection,
    state: &mut WorkerState,
    message: &ControlMessage,
) -> Result<()> {
    let name = require_str_param(message.fields(), "object exists", "variable_name")?;
    let exists = state.env.is_set(name) || is_open_handle(state, name);
    let response = Response::ok()
        .with("variable_name", name)
        .with("variable_exists", exists);
    conn.send_json(&response).await
}

pub(crate) async fn get_variable_type(
    conn: &mut Connection,
    state: &mut WorkerState,
    message: &ControlMessage,
) -> Result<()> {
    let name = require_str_param(message.fields(), "send variable type", "variable_name")?;
    let type_name = if is_open_handle(state, name) && !state.env.is_set(name) {
        "unknown"
    } else {
        let value = state
            .env
            .get(name)
            .ok_or_else(|| WorkerError::VariableNotSet {
                name: name.to_string(),
            })?;
        match value {
            Value::Dataset(_) => "dataframe",
            Value::Figure(_) => "image",
            _ => "unknown",
        }
    };
    let response = Response::ok()
        .with("variable_name", name)
        .with("type", type_name);
    conn.send_json(&response).await
}

pub(crate) async fn get_variable_value(
    conn: &mut Connection,
    state: &mut WorkerState,
    message: &ControlMessage,
) -> Result<()> {
    let params = message.fields();
    let encoding_name = require_str_param(params, "get variable value", "variable_encoding")?;
    let encoding = VariableEncoding::parse(encoding_name).ok_or_else(|| {
        WorkerError::Other("Unknown encoding type for send variable value message".to_string())
    })?;
    let name = require_str_param(params, "get variable value", "variable_name")?;
    let value = lookup(state, name)?;

    let encoded = match encoding {
        VariableEncoding::Pickled => serde_json::Value::String(codec::pickle(value)?),
        VariableEncoding::Json => codec::to_json(name, value)?,
        VariableEncoding::String => serde_json::Value::String(value.to_display_string()?),
    };

    state.trace(
        message.debug(),
        &format!("Sending {} value for var {}\n", encoding.as_str(), name),
    );
    let response = Response::ok()
        .with("variable_name", name)
        .with("variable_encoding", encoding.as_str())
        .with("variable_value", encoded);
    conn.send_json(&response).await
}

pub(crate) async fn get_image(
    conn: &mut Connection,
    state: &mut WorkerState,
    message: &ControlMessage,
) -> Result<()> {
    let name = require_str_param(message.fields(), "get image", "variable_name")?;
    let Value::Figure(figure) = lookup(state, name)? else {
        return Err(WorkerError::WrongType {
            name: name.to_string(),
            expected: "Figure",
        });
    };
    let image_data = STANDARD.encode(figure.render_png()?);

    state.trace(
        message.debug(),
        &format!("Sending {} base64 encoded as png bytes\n", name),
    );
    let response = Response::ok()
        .with("variable_name", name)
        .with("encoding", "base64")
        .with("image_data", image_data);
    conn.send_json(&response).await
}

/// Only `pickled` values can be set. Any other encoding is ignored without
/// a response.
pub(crate) async fn set_variable_value(
    conn: &mut Connection,
    state: &mut WorkerState,
    message: &ControlMessage,
) -> Result<()> {
    let params = message.fields();
    let encoding = require_str_param(params, "set variable value", "variable_encoding")?;
    if VariableEncoding::parse(encoding) != Some(VariableEncoding::Pickled) {
        warn!(
            "set_variable_value with encoding {} is not supported; no response sent",
            encoding
        );
        return Ok(());
    }

    let name = require_str_param(params, "set variable value", "variable_name")?;
    let encoded = require_str_param(params, "set variable value", "variable_value")?;
    let value = codec::unpickle(encoded)?;
    state.env.set(name, value);

    conn.send_json(&Response::ok()).await
}
