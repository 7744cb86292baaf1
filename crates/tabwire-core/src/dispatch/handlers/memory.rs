//! Shared-memory handlers: `share_instances`, `close_shared_instances`.

use super::{require_object_param, require_str_param};
use crate::dispatch::WorkerState;
use crate::protocol::{ControlMessage, Response};
use crate::shm::{byte_len, parse_shape, ArrayView, DType};
use crate::transport::Connection;
use crate::{Result, WorkerError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use tracing::warn;

/// `data_shape` is normally a tuple literal, but a JSON array of integers
/// is accepted too.
fn shape_param(message: &ControlMessage) -> Result<Vec<usize>> {
    match message.get("data_shape") {
        Some(Value::Array(dims)) => dims
            .iter()
            .map(|d| d.as_u64().map(|n| n as usize))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| WorkerError::InvalidField {
                field: "data_shape",
                message: format!("Unable to parse data shape {}", Value::Array(dims.clone())),
            }),
        _ => parse_shape(require_str_param(
            message.fields(),
            "share instances",
            "data_shape",
        )?),
    }
}

pub(crate) async fn share_instances(
    conn: &mut Connection,
    state: &mut WorkerState,
    message: &ControlMessage,
) -> Result<()> {
    let params = message.fields();
    let header = require_object_param(params, "share instances", "header")?;
    let frame_name = require_str_param(header, "share instances header", "frame_name")?;
    let encoded_handle = require_str_param(params, "share instances", "data_handle")?;
    let data_type = require_str_param(params, "share instances", "data_type")?;

    if state.handle.is_open() {
        return Err(WorkerError::HandleAlreadyOpen);
    }

    let shape = shape_param(message)?;
    let dtype = DType::parse(data_type)?;
    let token = STANDARD.decode(encoded_handle.trim())?;
    let len = byte_len(dtype, &shape)?;

    let region = state.handle.open(state.broker.as_ref(), &token, len)?;
    let view = match ArrayView::mapped(dtype, shape, region) {
        Ok(view) => view,
        Err(e) => {
            // Never keep a handle with nothing stored against it.
            if let Err(close_err) = state.handle.close() {
                warn!("Failed to release handle: {}", close_err);
            }
            return Err(e);
        }
    };
    state.env.set(frame_name, view);

    conn.send_json(&Response::ok()).await
}

pub(crate) async fn close_shared_instances(
    conn: &mut Connection,
    state: &mut WorkerState,
) -> Result<()> {
    state.handle.close()?;
    conn.send_json(&Response::ok()).await
}
