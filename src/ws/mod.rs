//! WebSocket connection lifecycle.
//!
//! - [`ConnectionState`]: where the supervisor currently is in its dial/read/retry cycle
//! - [`config::Config`]: timeouts, ping cadence, reconnect delay and heartbeat filtering
//! - [`WsError`]: transport-level failure detail carried inside [`crate::error::Error`]
//!
//! The supervisor itself is internal; it is started by [`crate::EventStream`].

pub mod config;
pub(crate) mod connection;
pub mod error;

pub use connection::ConnectionState;
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
