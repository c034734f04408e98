//! WebSocket Connection Layer
//!
//! Venue-agnostic connection machinery: exponential-backoff
//! reconnection, heartbeat liveness tracking, frame decompression,
//! and the connection manager that ties them to a `VenueAdapter`.

mod heartbeat;
mod manager;
mod reconnect;
mod transport;

pub use heartbeat::HeartbeatClock;
pub use manager::{ConnectionError, ConnectionManager};
pub use reconnect::Backoff;
pub use transport::{FrameCodec, TransportError};
