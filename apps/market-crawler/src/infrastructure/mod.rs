//! Infrastructure layer: configuration, telemetry, WebSocket transport,
//! and per-venue protocol adapters.

pub mod config;
pub mod connection;
pub mod telemetry;
pub mod venues;
