//! Client half of the echo example: sends its arguments to
//! /tmp/edge-ipc-echo.sock and prints the framed reply.

use edge_ipc_core::RecvBuffer;
use edge_ipc_socket::send_receive;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let message = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let message = if message.is_empty() {
        "hello".to_string()
    } else {
        message
    };

    let mut buf = RecvBuffer::new();
    let len = send_receive("/tmp/edge-ipc-echo.sock", message.as_bytes(), &mut buf)?;
    println!(
        "reply ({len} bytes): {}",
        String::from_utf8_lossy(buf.filled(len))
    );
    Ok(())
}
