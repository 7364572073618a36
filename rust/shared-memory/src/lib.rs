//! edge-ipc - Shared Memory Module
//!
//! System-V shared-memory segment manager for bulk payload exchange between
//! processes on one host, e.g. tensors too large to copy through a socket
//! repeatedly. Each segment is self-describing: a 4-byte length header
//! followed by the payload, so a reader only needs the segment key to
//! recover the exact payload that was written.
//!
//! The manager hands out mechanism only. There is no locking, no access
//! control, and no ordering guarantee between a writer and a reader;
//! visibility across processes depends entirely on external synchronization
//! such as a pipe signal or socket message sent after the write completes.
//! Concurrent unsynchronized writers to one segment are undefined behavior
//! by design.

pub mod error;
pub mod segment;

pub use error::{Result, SegmentError};
pub use segment::{Attachment, Segment, SegmentKey};

/// Length of the self-describing segment header in bytes.
///
/// Matches the socket message framing header: a `u32` payload length in
/// native byte order. Host-local only; segments are never shared across
/// byte-order boundaries.
pub const SEGMENT_HEADER_LEN: usize = 4;

/// Retry cap for random key allocation before giving up
pub const MAX_KEY_ATTEMPTS: usize = 1024;
