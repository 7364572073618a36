//! Framed send/receive over a connected stream socket
//!
//! Works on the raw descriptor so the same routines serve accepted
//! connections on the listener side and outbound connections on the client
//! side. Sends carry `MSG_NOSIGNAL`: a peer that disappears mid-message
//! surfaces as an ordinary error return instead of killing the process with
//! SIGPIPE.

use std::io;
use std::os::unix::io::AsRawFd;

use tracing::warn;

use edge_ipc_core::{decode_len, encode_len, RecvBuffer, Result, TransportError, MESSAGE_HEADER_LEN};

/// Send one framed message: 4-byte length header, then the payload.
///
/// Both parts loop on partial sends until fully confirmed or a hard error
/// occurs. Returns an error if anything less than the whole message went
/// out.
pub fn send_framed<C: AsRawFd>(conn: &C, payload: &[u8]) -> Result<()> {
    let fd = conn.as_raw_fd();
    let header = encode_len(payload.len() as u32);
    send_all(fd, &header)?;
    send_all(fd, payload)
}

/// Receive one framed message into the reusable buffer, growing it if the
/// message is larger than anything seen before.
///
/// The header is read with a single receive call; anything short of 4 bytes
/// (including an orderly close or an expired timeout) abandons the
/// connection as malformed framing, with no retry. The payload is then
/// accumulated across as many receives as the kernel needs. Returns the
/// message length; the bytes are in `buf.filled(len)`.
pub fn recv_framed<C: AsRawFd>(conn: &C, buf: &mut RecvBuffer) -> Result<usize> {
    let fd = conn.as_raw_fd();

    let mut header = [0u8; MESSAGE_HEADER_LEN];
    let num_read = unsafe {
        libc::recv(
            fd,
            header.as_mut_ptr() as *mut libc::c_void,
            MESSAGE_HEADER_LEN,
            libc::MSG_NOSIGNAL,
        )
    };
    if num_read == -1 {
        return Err(classify_recv_error(io::Error::last_os_error()));
    }
    if num_read as usize != MESSAGE_HEADER_LEN {
        return Err(TransportError::Framing(format!(
            "short header read: {} of {} bytes",
            num_read, MESSAGE_HEADER_LEN
        )));
    }

    let message_length = decode_len(&header) as usize;
    buf.grow_to(message_length);

    let mut num_read_cumulative = 0usize;
    while num_read_cumulative < message_length {
        let num_read = unsafe {
            libc::recv(
                fd,
                buf.as_mut_slice()[num_read_cumulative..].as_mut_ptr() as *mut libc::c_void,
                message_length - num_read_cumulative,
                libc::MSG_NOSIGNAL,
            )
        };
        if num_read == -1 {
            warn!("error when receiving socket message");
            return Err(classify_recv_error(io::Error::last_os_error()));
        }
        if num_read == 0 {
            return Err(TransportError::Framing(format!(
                "connection closed after {} of {} payload bytes",
                num_read_cumulative, message_length
            )));
        }
        num_read_cumulative += num_read as usize;
    }

    Ok(message_length)
}

/// An expired `SO_RCVTIMEO` arrives as EAGAIN; report it as a timeout rather
/// than a generic IO failure
fn classify_recv_error(err: io::Error) -> TransportError {
    if matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    ) {
        TransportError::Timeout
    } else {
        TransportError::Io(err)
    }
}

/// Send an entire buffer, looping on partial sends
fn send_all(fd: i32, data: &[u8]) -> Result<()> {
    let mut sent_total = 0usize;
    while sent_total < data.len() {
        let sent_now = unsafe {
            libc::send(
                fd,
                data[sent_total..].as_ptr() as *const libc::c_void,
                data.len() - sent_total,
                libc::MSG_NOSIGNAL,
            )
        };
        if sent_now == -1 {
            warn!("send to socket failed");
            return Err(TransportError::Io(io::Error::last_os_error()));
        }
        if sent_now == 0 {
            return Err(TransportError::Io(io::Error::from(
                io::ErrorKind::WriteZero,
            )));
        }
        sent_total += sent_now as usize;
    }
    Ok(())
}
