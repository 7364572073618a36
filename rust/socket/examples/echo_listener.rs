//! Minimal echo service: serves framed messages at /tmp/edge-ipc-echo.sock
//! and replies with the same payload. Stop with ctrl-c.
//!
//! Try it from a second shell with the `echo_client` half of this example
//! pair, or any client speaking the 4-byte length-header framing.

use std::os::unix::net::UnixStream;

use edge_ipc_core::ShutdownToken;
use edge_ipc_socket::{send_framed, Listener, ListenerConfig};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let path = "/tmp/edge-ipc-echo.sock";
    let listener = Listener::bind(path, ListenerConfig::default())?;
    println!("echo listener on {path}");

    let token = ShutdownToken::new();
    listener.serve(&token, |payload: &[u8], conn: &mut UnixStream| {
        println!("echoing {} bytes", payload.len());
        if let Err(err) = send_framed(conn, payload) {
            eprintln!("reply failed: {err}");
        }
    })?;

    Ok(())
}
