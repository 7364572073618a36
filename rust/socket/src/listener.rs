//! Blocking listener loop for framed UNIX-domain messages
//!
//! Lifecycle: bind the socket path once, then serve connections strictly
//! sequentially until the shutdown token is triggered. Each accepted
//! connection carries one framed message, which is handed to the callback
//! together with the connected stream so the callback can send a framed
//! reply on the same connection. The connection is closed afterwards either
//! way; there are no persistent sessions at this layer.

use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::{FromRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use edge_ipc_core::{RecvBuffer, Result, ShutdownToken, TransportError};

use crate::connection::recv_framed;
use crate::{LISTEN_BACKLOG, SOCKET_TIMEOUT};

/// Listener tuning knobs
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Upper bound on a blocking accept and on per-connection receives and
    /// reply sends.
    ///
    /// This is not a fault signal: an expired accept simply loops back to
    /// re-check the shutdown token, so the value bounds shutdown latency.
    pub accept_timeout: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            accept_timeout: SOCKET_TIMEOUT,
        }
    }
}

/// A bound and listening UNIX-domain socket.
///
/// Unlinks its socket path when dropped so a future bind can reuse it.
#[derive(Debug)]
pub struct Listener {
    inner: UnixListener,
    path: PathBuf,
    config: ListenerConfig,
}

impl Listener {
    /// Bind a listening socket at `path`.
    ///
    /// A stale file at the path is removed first; only a removal failure
    /// other than "did not exist" is fatal. After binding, the path is made
    /// world-read/write so unprivileged peers can connect, and the listen
    /// backlog is [`LISTEN_BACKLOG`].
    pub fn bind(path: impl AsRef<Path>, config: ListenerConfig) -> Result<Listener> {
        let path = path.as_ref().to_path_buf();
        let path_bytes = path.as_os_str().as_bytes();

        let max_len = sun_path_capacity();
        if path_bytes.len() > max_len {
            return Err(TransportError::PathTooLong {
                len: path_bytes.len(),
                max: max_len,
            });
        }

        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(TransportError::Setup(format!(
                    "could not remove stale socket file {}: {}",
                    path.display(),
                    err
                )))
            }
        }

        let fd = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM, 0) };
        if fd == -1 {
            return Err(TransportError::Setup(format!(
                "socket creation failed: {}",
                io::Error::last_os_error()
            )));
        }
        // From here on the fd is owned by the UnixListener and closed with it
        let inner = unsafe { UnixListener::from_raw_fd(fd) };

        let addr = socket_address(path_bytes);
        let rc = unsafe {
            libc::bind(
                fd,
                &addr as *const libc::sockaddr_un as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_un>() as libc::socklen_t,
            )
        };
        if rc == -1 {
            return Err(TransportError::Setup(format!(
                "bind to {} failed: {}",
                path.display(),
                io::Error::last_os_error()
            )));
        }

        if let Err(err) = fs::set_permissions(&path, fs::Permissions::from_mode(0o666)) {
            warn!(
                "could not open permissions on socket path {}: {}",
                path.display(),
                err
            );
        }

        let rc = unsafe { libc::listen(fd, LISTEN_BACKLOG) };
        if rc == -1 {
            return Err(TransportError::Setup(format!(
                "listen on {} failed: {}",
                path.display(),
                io::Error::last_os_error()
            )));
        }

        set_recv_timeout(fd, config.accept_timeout)?;

        debug!("listening on {}", path.display());
        Ok(Listener {
            inner,
            path,
            config,
        })
    }

    /// The filesystem path this listener is bound to
    pub fn local_path(&self) -> &Path {
        &self.path
    }

    /// Accept and serve connections until the token is triggered.
    ///
    /// Connections are served strictly sequentially; one message is fully
    /// handled before the next accept, so messages never interleave at this
    /// layer. An expired accept timeout and a genuine accept error are
    /// handled identically: re-check the token and try again. Framing
    /// errors abandon only the current connection.
    ///
    /// The callback receives the message payload and the connected stream;
    /// writing a framed reply to the stream is optional. If the token was
    /// triggered while a message was in flight, that message is dropped
    /// without invoking the callback.
    ///
    /// Consumes the listener; the socket path is unlinked on return.
    pub fn serve<F>(self, token: &ShutdownToken, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8], &mut UnixStream),
    {
        let mut buf = RecvBuffer::new();

        while !token.is_triggered() {
            let mut stream = match self.inner.accept() {
                Ok((stream, _)) => stream,
                Err(err) => {
                    // Timeout and hard accept failures take the same path:
                    // re-check the token and try again
                    if !matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) {
                        debug!("accept failed: {}", err);
                    }
                    continue;
                }
            };

            let timeout = Some(self.config.accept_timeout);
            if let Err(err) = stream
                .set_read_timeout(timeout)
                .and_then(|()| stream.set_write_timeout(timeout))
            {
                warn!("could not set timeouts on connection: {}", err);
            }

            let len = match recv_framed(&stream, &mut buf) {
                Ok(len) => len,
                Err(err) => {
                    warn!("abandoning connection: {}", err);
                    continue;
                }
            };

            if !token.is_triggered() {
                callback(buf.filled(len), &mut stream);
            }
            // Connection closes when the stream drops, reply sent or not
        }

        debug!("listener on {} shutting down", self.path.display());
        Ok(())
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        // Unlink so a future bind can reuse the path
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(
                    "could not unlink socket path {}: {}",
                    self.path.display(),
                    err
                );
            }
        }
    }
}

/// Bytes available for a path in `sockaddr_un.sun_path`, minus the NUL
fn sun_path_capacity() -> usize {
    let addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_path.len() - 1
}

fn socket_address(path_bytes: &[u8]) -> libc::sockaddr_un {
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (dst, src) in addr.sun_path.iter_mut().zip(path_bytes) {
        *dst = *src as libc::c_char;
    }
    addr
}

fn set_recv_timeout(fd: RawFd, timeout: Duration) -> Result<()> {
    let tv = libc::timeval {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_usec: timeout.subsec_micros() as libc::suseconds_t,
    };
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVTIMEO,
            &tv as *const libc::timeval as *const libc::c_void,
            std::mem::size_of::<libc::timeval>() as libc::socklen_t,
        )
    };
    if rc == -1 {
        return Err(TransportError::Setup(format!(
            "could not set socket timeout: {}",
            io::Error::last_os_error()
        )));
    }
    Ok(())
}
