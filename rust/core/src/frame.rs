//! Message framing convention and the reusable receive buffer
//!
//! Every message carried by this toolkit, whether over a UNIX-domain socket
//! or mirrored in a shared-memory segment header, is framed the same way:
//! a `u32` length in native byte order followed by exactly that many payload
//! bytes. All participants run on the same machine, so the header is never
//! byte-swapped.

use bytes::BytesMut;

/// Length of the message framing header in bytes
pub const MESSAGE_HEADER_LEN: usize = 4;

/// Encode a payload length into its 4-byte wire form
#[inline]
pub fn encode_len(len: u32) -> [u8; MESSAGE_HEADER_LEN] {
    len.to_ne_bytes()
}

/// Decode a 4-byte wire header back into a payload length
#[inline]
pub fn decode_len(header: &[u8; MESSAGE_HEADER_LEN]) -> u32 {
    u32::from_ne_bytes(*header)
}

/// Grow-only buffer reused across receives.
///
/// The buffer grows to fit the largest message seen and never shrinks,
/// amortizing allocation across repeated receives on a long-lived listener.
#[derive(Debug, Default)]
pub struct RecvBuffer {
    buf: BytesMut,
}

impl RecvBuffer {
    /// Create an empty buffer with no capacity
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Create a buffer with an initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let mut buf = BytesMut::with_capacity(capacity);
        buf.resize(capacity, 0);
        Self { buf }
    }

    /// Ensure at least `len` bytes of initialized storage, growing if needed.
    ///
    /// Never shrinks: a request smaller than the current size leaves the
    /// buffer untouched.
    pub fn grow_to(&mut self, len: usize) {
        if len > self.buf.len() {
            self.buf.resize(len, 0);
        }
    }

    /// Current initialized size in bytes
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Mutable view of the full initialized storage
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf[..]
    }

    /// View of the first `len` bytes, i.e. the most recently received message
    pub fn filled(&self, len: usize) -> &[u8] {
        &self.buf[..len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        for len in [0u32, 1, 5, 1024, u32::MAX] {
            assert_eq!(decode_len(&encode_len(len)), len);
        }
    }

    #[test]
    fn test_buffer_growth_is_monotonic() {
        let mut buf = RecvBuffer::new();
        assert_eq!(buf.capacity(), 0);

        buf.grow_to(128);
        assert_eq!(buf.capacity(), 128);

        // Smaller request must not shrink
        buf.grow_to(16);
        assert_eq!(buf.capacity(), 128);

        buf.grow_to(4096);
        assert_eq!(buf.capacity(), 4096);
    }

    #[test]
    fn test_buffer_retains_filled_bytes() {
        let mut buf = RecvBuffer::new();
        buf.grow_to(5);
        buf.as_mut_slice()[..5].copy_from_slice(b"hello");
        assert_eq!(buf.filled(5), b"hello");

        // Growth preserves previously written content
        buf.grow_to(64);
        assert_eq!(buf.filled(5), b"hello");
    }
}
