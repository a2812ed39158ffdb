//! Inbound frame dispatch: parse a command frame, apply it, build the ack.

use parley_realtime::protocol::CommandFrame;
use parley_realtime::{Ack, Command, ConnectionHandle, EventDistributor};
use tracing::{debug, warn};

/// Handle one inbound text frame and return the ack to send back.
pub async fn handle_frame(
    distributor: &EventDistributor,
    handle: &ConnectionHandle,
    text: &str,
) -> Ack {
    let frame: CommandFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(conn_id = %handle.id(), "invalid JSON received");
            return Ack::err(None, format!("invalid JSON: {e}"));
        }
    };
    let command = match Command::parse(&frame.method, frame.params.as_ref()) {
        Ok(c) => c,
        Err(e) => {
            debug!(method = %frame.method, error = %e, "rejected command");
            return Ack::err(frame.id, e);
        }
    };
    distributor
        .handle_command(handle, command)
        .await
        .with_id(frame.id)
}
