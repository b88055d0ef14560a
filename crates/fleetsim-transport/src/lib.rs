//! fleetsim Transport - the telemetry transport boundary
//!
//! A [`Transport`] opens one [`Connection`] per device from that device's
//! connection descriptor. Sends are fire-and-forget from the simulator's
//! point of view: success means the transport accepted the envelope.
//!
//! Built-in transports:
//! - [`LogTransport`]: writes every envelope to the log
//! - [`MemoryTransport`]: records every envelope for inspection

pub mod error;
pub mod logging;
pub mod memory;
pub mod transport;

pub use error::{Result, TransportError};
pub use logging::LogTransport;
pub use memory::{MemoryTransport, SentEnvelope};
pub use transport::{Connection, Transport};
