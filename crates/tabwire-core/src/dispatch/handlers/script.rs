//! `execute_script`.

use super::require_str_param;
use crate::dispatch::WorkerState;
use crate::protocol::{ControlMessage, Response};
use crate::transport::Connection;
use crate::Result;
use tracing::debug;

pub(crate) async fn execute_script(
    conn: &mut Connection,
    state: &mut WorkerState,
    message: &ControlMessage,
) -> Result<()> {
    let script = require_str_param(message.fields(), "execute script", "script")?;
    state.trace(
        message.debug(),
        &format!("Executing script...\n\n{}\n", script),
    );

    let output = state.engine.run(script, &mut state.env);
    debug!(
        "Script finished ({} bytes out, {} bytes err)",
        output.stdout.len(),
        output.stderr.len()
    );

    let response = Response::ok()
        .with("script_out", output.stdout)
        .with("script_error", output.stderr);
    conn.send_json(&response).await
}
