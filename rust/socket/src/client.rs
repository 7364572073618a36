//! Outbound connections: connect, fire-and-forget send, and the
//! synchronous request/response round trip

use std::os::unix::net::UnixStream;
use std::path::Path;

use tracing::{debug, warn};

use edge_ipc_core::{RecvBuffer, Result, TransportError};

use crate::connection::{recv_framed, send_framed};
use crate::SOCKET_TIMEOUT;

/// Connect to a listening socket at `path` with symmetric send/receive
/// timeouts.
///
/// The path is checked for existence before connecting, which turns the
/// common "listener is not up yet" case into a clearer diagnostic than the
/// raw connect error.
pub fn connect(path: impl AsRef<Path>) -> Result<UnixStream> {
    let path = path.as_ref();

    if !path.exists() {
        warn!("no socket at {}", path.display());
        return Err(TransportError::SocketNotFound(path.to_path_buf()));
    }

    let stream = UnixStream::connect(path).map_err(|err| {
        warn!("connect to socket {} failed: {}", path.display(), err);
        TransportError::Io(err)
    })?;
    stream.set_write_timeout(Some(SOCKET_TIMEOUT))?;
    stream.set_read_timeout(Some(SOCKET_TIMEOUT))?;

    Ok(stream)
}

/// Connect, send one framed message, and close.
///
/// Fire-and-forget: no reply is awaited. The attempt's failure still comes
/// back as an error for callers that care; callers that don't can drop it.
pub fn send(path: impl AsRef<Path>, payload: &[u8]) -> Result<()> {
    let stream = connect(path)?;
    send_framed(&stream, payload)
}

/// Connect, send a framed request, and await a framed response on the same
/// connection.
///
/// If the send fails, no receive is attempted. The response lands in the
/// caller's reusable buffer, growing it if needed; the return value is the
/// response length, with the bytes in `buf.filled(len)`.
pub fn send_receive(
    path: impl AsRef<Path>,
    payload: &[u8],
    buf: &mut RecvBuffer,
) -> Result<usize> {
    let stream = connect(path)?;
    send_framed(&stream, payload)?;

    let len = recv_framed(&stream, buf)?;
    debug!("received {} byte response", len);
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_to_missing_path() {
        let err = connect("/tmp/edge-ipc-no-such-socket.sock").unwrap_err();
        assert!(matches!(err, TransportError::SocketNotFound(_)));
    }

    #[test]
    fn test_send_to_missing_path_surfaces_error() {
        assert!(send("/tmp/edge-ipc-no-such-socket.sock", b"ping").is_err());
    }
}
