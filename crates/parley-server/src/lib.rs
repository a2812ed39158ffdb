//! # parley-server
//!
//! Axum transport for the Parley realtime engine.
//!
//! - `GET /ws`: bearer-authenticated WebSocket carrying subscription
//!   commands in and message events out
//! - `POST|GET /v1/sessions/{id}/messages`, `POST|GET /v1/panels/{id}/messages`:
//!   post a message and read history
//! - `GET /health`, `GET /metrics`
//!
//! Each socket gets a bounded outbound queue drained by a writer task, a
//! reader loop dispatching commands, and a heartbeat that closes silent peers.

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::{ApiError, ServerError};
pub use server::{AppState, ParleyServer, ServerHandle};
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
