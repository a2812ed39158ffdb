//! WebSocket session loop, heartbeat and command dispatch.

pub mod handler;
pub mod heartbeat;
pub mod session;
