//! `get_debug_buffer`.

use crate::dispatch::WorkerState;
use crate::protocol::Response;
use crate::transport::Connection;
use crate::Result;

/// Send and clear everything captured outside of script runs.
pub(crate) async fn get_debug_buffer(conn: &mut Connection, state: &mut WorkerState) -> Result<()> {
    let (std_out, std_err) = state.debug.drain();
    let response = Response::ok()
        .with("std_out", std_out)
        .with("std_err", std_err);
    conn.send_json(&response).await
}
