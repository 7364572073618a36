//! edge-ipc - Core Module
//!
//! Shared primitives for the edge-ipc transport toolkit: the length-prefixed
//! message framing convention, the grow-only receive buffer, single-byte
//! signal pipes, and the cooperative shutdown token used to stop blocking
//! listener loops.

pub mod error;
pub mod frame;
pub mod shutdown;
pub mod signal;

pub use error::{Result, TransportError};
pub use frame::{decode_len, encode_len, RecvBuffer, MESSAGE_HEADER_LEN};
pub use shutdown::ShutdownToken;
pub use signal::{SignalPipe, SignalReceiver, SignalSender, TimedSignal};

/// Current version of the edge-ipc crates
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
