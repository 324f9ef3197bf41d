//! Lifecycle of one client connection.
//!
//! A connection is served by two threads:
//! - the reader (the caller of [`serve_connection`]) parses newline-delimited
//!   JSON commands and updates the connection's subscription. Lines that are
//!   not UTF-8 are answered like any other malformed message; a line longer
//!   than `MAX_LINE_BYTES` closes the connection;
//! - the writer drains the connection's outbox onto the socket with a bounded
//!   write timeout.
//!
//! Teardown works from either side. When the reader sees EOF or an error it
//! detaches the connection, which closes the outbox and ends the writer. When
//! the writer fails, or the broadcaster detaches a slow connection, the socket
//! is shut down without flushing queued lines, which ends the reader.

use std::io::{BufReader, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use price_common::config::MAX_LINE_BYTES;
use price_common::framing::{Frame, read_frame};
use price_common::protocol::{self, ClientMessage, ErrorReply, Inbound};
use price_common::Result;

use crate::broadcaster::{Broadcaster, Outbox};
use crate::registry::{ConnectionId, SubscriptionRegistry};

/// Serve `stream` until it closes. Blocks the calling thread.
pub fn serve_connection(
    stream: TcpStream,
    id: ConnectionId,
    broadcaster: Arc<Broadcaster>,
    registry: Arc<SubscriptionRegistry>,
    write_timeout: Duration,
) -> Result<()> {
    let peer = stream.peer_addr()?;
    let writer_stream = stream.try_clone()?;
    writer_stream.set_write_timeout(Some(write_timeout))?;

    let outbox = broadcaster.attach(id)?;
    info!("Connection {} opened from {}", id, peer);

    let writer = thread::Builder::new()
        .name(format!("conn-{}-writer", id))
        .spawn(move || run_writer(writer_stream, outbox, id));
    if let Err(e) = writer {
        broadcaster.detach(id)?;
        return Err(e.into());
    }

    let mut reader = BufReader::new(stream);
    loop {
        let handled = match read_frame(&mut reader, MAX_LINE_BYTES) {
            Ok(Some(Frame::Line(line))) => handle_line(id, &line, &broadcaster, &registry),
            Ok(Some(Frame::Invalid(reason))) => reply_malformed(id, &reason, &broadcaster),
            Ok(Some(Frame::Oversized(len))) => {
                warn!("Connection {} sent {} bytes without a newline", id, len);
                break;
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Connection {} read error: {}", id, e);
                break;
            }
        };
        if let Err(e) = handled {
            warn!("Connection {} closing: {}", id, e);
            break;
        }
    }

    broadcaster.detach(id)?;
    info!("Connection {} from {} closed", id, peer);
    Ok(())
}

/// Apply one inbound line to the connection's state.
///
/// Malformed input is answered with an error reply on this connection only.
/// An `Err` means the connection can no longer be served.
pub fn handle_line(
    id: ConnectionId,
    line: &str,
    broadcaster: &Broadcaster,
    registry: &SubscriptionRegistry,
) -> Result<()> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(());
    }

    match protocol::decode_client(line) {
        Ok(Inbound::Message(ClientMessage::Subscribe { stocks })) => {
            info!("Connection {} subscribed to: {}", id, stocks.join(", "));
            registry.set_subscription(id, stocks)?;
        }
        Ok(Inbound::Unrecognized(tag)) => {
            warn!("Connection {} sent unknown message type: {}", id, tag);
        }
        Ok(Inbound::Error(message)) => {
            warn!("Connection {} sent an error message: {}", id, message);
        }
        Err(e) => reply_malformed(id, &e.to_string(), broadcaster)?,
    }
    Ok(())
}

fn reply_malformed(id: ConnectionId, reason: &str, broadcaster: &Broadcaster) -> Result<()> {
    warn!("Connection {} sent a malformed message: {}", id, reason);
    let reply = protocol::encode(&ErrorReply::new(format!(
        "Failed to parse message: {}",
        reason
    )))?;
    broadcaster.send_to(id, reply)
}

fn run_writer(mut stream: TcpStream, outbox: Outbox, id: ConnectionId) {
    while let Some(mut line) = outbox.recv() {
        line.push('\n');
        if let Err(e) = stream.write_all(line.as_bytes()) {
            warn!("Connection {} write failed: {}", id, e);
            break;
        }
    }
    debug!("Connection {} writer finished", id);
    let _ = stream.shutdown(Shutdown::Both);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<SubscriptionRegistry>, Broadcaster, Outbox) {
        let registry = Arc::new(SubscriptionRegistry::new());
        let broadcaster = Broadcaster::new(Arc::clone(&registry), 8);
        let rx = broadcaster.attach(1).unwrap();
        (registry, broadcaster, rx)
    }

    #[test]
    fn subscribe_line_replaces_subscription() {
        let (registry, broadcaster, _rx) = setup();
        handle_line(1, r#"{"type":"subscribe","stocks":["AAPL","MSFT"]}"#, &broadcaster, &registry)
            .unwrap();
        handle_line(1, r#"{"type":"subscribe","stocks":["TSLA"]}"#, &broadcaster, &registry)
            .unwrap();

        let current = registry.get(1).unwrap();
        assert_eq!(current.len(), 1);
        assert!(current.contains("TSLA"));
    }

    #[test]
    fn malformed_line_gets_error_reply() {
        let (registry, broadcaster, rx) = setup();
        handle_line(1, "{not json", &broadcaster, &registry).unwrap();

        let reply: ErrorReply = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert!(reply.error.starts_with("Failed to parse message"));
        assert!(registry.get(1).unwrap().is_empty());
    }

    #[test]
    fn unknown_type_and_blank_lines_are_ignored() {
        let (registry, broadcaster, rx) = setup();
        handle_line(1, r#"{"type":"ping"}"#, &broadcaster, &registry).unwrap();
        handle_line(1, "   ", &broadcaster, &registry).unwrap();
        assert!(rx.try_recv().is_none());
    }
}
