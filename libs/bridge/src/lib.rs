//! Loopback transport between the process under test and the test process.
//!
//! Every call is one length-prefixed JSON frame answered by one [`Ack`]
//! frame. The server side lives in the test process and hands decoded
//! requests to a [`BridgeHandler`]; the client side lives next to the
//! interceptors inside the application.
//!
//! [`Ack`]: observer_api::Ack

mod client;
mod error;
mod framing;
mod server;

pub use client::{BridgeClient, DEFAULT_CALL_TIMEOUT};
pub use error::BridgeError;
pub use framing::{DEFAULT_MAX_FRAME_BYTES, LengthPrefixed};
pub use server::{BridgeHandler, BridgeServer};

/// Environment variable carrying the bridge port to the process under test.
pub const BRIDGE_PORT_ENV: &str = "KAFKA_OBSERVER_BRIDGE_PORT";

/// Port assumed when [`BRIDGE_PORT_ENV`] is unset or unparsable.
pub const DEFAULT_BRIDGE_PORT: u16 = 50051;

/// Bridge port from the environment, falling back to [`DEFAULT_BRIDGE_PORT`].
pub fn bridge_port_from_env() -> u16 {
    match std::env::var(BRIDGE_PORT_ENV) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(
                var = BRIDGE_PORT_ENV,
                value = %raw,
                default = DEFAULT_BRIDGE_PORT,
                "invalid bridge port, using default"
            );
            DEFAULT_BRIDGE_PORT
        }),
        Err(_) => DEFAULT_BRIDGE_PORT,
    }
}
