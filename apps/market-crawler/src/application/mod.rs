//! Application layer: ports (trait boundaries) and orchestration services.

pub mod ports;
pub mod services;
