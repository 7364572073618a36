//! edge-ipc - Socket Module
//!
//! UNIX-domain stream messaging with length-prefixed framing: a blocking
//! listener that dispatches each received message to a callback, and an
//! outbound connector with fire-and-forget and request/response helpers.
//!
//! Every message on the wire is a native-endian `u32` length followed by
//! exactly that many payload bytes. No message types, no schemas, no
//! checksums; interpretation of the payload is the caller's business. A
//! connection carries one message (plus an optional reply) and is closed.

pub mod client;
pub mod connection;
pub mod listener;

pub use client::{connect, send, send_receive};
pub use connection::{recv_framed, send_framed};
pub use listener::{Listener, ListenerConfig};

use std::time::Duration;

/// Backlog passed to `listen(2)`
pub const LISTEN_BACKLOG: libc::c_int = 30;

/// Symmetric send/receive timeout applied to every socket.
///
/// On the listening socket this bounds how long an accept can block, which
/// is what makes the serve loop interruptible.
pub const SOCKET_TIMEOUT: Duration = Duration::from_secs(1);
