//! Single-byte signal pipes
//!
//! An anonymous OS pipe wrapped for one-byte signaling between cooperating
//! processes or threads. A signal carries no structured meaning beyond
//! "something happened"; callers that need more than one bit of information
//! should use the socket transport instead.

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use tracing::warn;

use crate::error::{Result, TransportError};

/// Outcome of a timed signal read.
///
/// A dedicated variant for expiry keeps a legitimate zero-valued signal byte
/// distinguishable from "nothing arrived within the window".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedSignal {
    /// A signal byte arrived
    Byte(u8),
    /// The timeout elapsed with no data
    TimedOut,
}

/// Factory for connected signal pipe halves
pub struct SignalPipe;

impl SignalPipe {
    /// Create an anonymous pipe and return its two halves.
    ///
    /// The write half is typically handed to the signaling side, the read
    /// half to the waiting side. Each half closes its descriptor on drop.
    pub fn pair() -> Result<(SignalSender, SignalReceiver)> {
        let mut fds = [0 as libc::c_int; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc == -1 {
            return Err(TransportError::Io(io::Error::last_os_error()));
        }
        Ok((SignalSender { fd: fds[1] }, SignalReceiver { fd: fds[0] }))
    }
}

/// Write half of a signal pipe
#[derive(Debug)]
pub struct SignalSender {
    fd: RawFd,
}

impl SignalSender {
    /// Write exactly one signal byte.
    ///
    /// A single byte cannot partially write on a pipe, so there is no retry
    /// loop here.
    pub fn send(&self, signal: u8) -> Result<()> {
        let written =
            unsafe { libc::write(self.fd, &signal as *const u8 as *const libc::c_void, 1) };
        match written {
            1 => Ok(()),
            -1 => Err(TransportError::Io(io::Error::last_os_error())),
            _ => Err(TransportError::Io(io::Error::from(
                io::ErrorKind::WriteZero,
            ))),
        }
    }
}

impl Drop for SignalSender {
    fn drop(&mut self) {
        close_fd(self.fd, "signal pipe write half");
    }
}

/// Read half of a signal pipe
#[derive(Debug)]
pub struct SignalReceiver {
    fd: RawFd,
}

impl SignalReceiver {
    /// Block until one signal byte arrives
    pub fn recv(&self) -> Result<u8> {
        let mut byte = 0u8;
        let read = unsafe { libc::read(self.fd, &mut byte as *mut u8 as *mut libc::c_void, 1) };
        match read {
            1 => Ok(byte),
            -1 => Err(TransportError::Io(io::Error::last_os_error())),
            // 0 means the write half was closed
            _ => Err(TransportError::Io(io::Error::from(
                io::ErrorKind::UnexpectedEof,
            ))),
        }
    }

    /// Wait up to `timeout` for one signal byte.
    ///
    /// Uses a readiness wait, so an idle pipe costs nothing until the
    /// deadline. Returns [`TimedSignal::TimedOut`] on expiry rather than
    /// overloading a byte value.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<TimedSignal> {
        let mut pollfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        let ready = unsafe { libc::poll(&mut pollfd, 1, millis) };
        match ready {
            -1 => Err(TransportError::Io(io::Error::last_os_error())),
            0 => Ok(TimedSignal::TimedOut),
            _ => self.recv().map(TimedSignal::Byte),
        }
    }
}

impl Drop for SignalReceiver {
    fn drop(&mut self) {
        close_fd(self.fd, "signal pipe read half");
    }
}

/// Best-effort close; a failure here is reported, never propagated.
fn close_fd(fd: RawFd, what: &str) {
    let rc = unsafe { libc::close(fd) };
    if rc == -1 {
        warn!(
            "could not close {}: {}",
            what,
            io::Error::last_os_error()
        );
    }
}
