//! Transport seam of the client session.
//!
//! A [`Connector`] opens one transport session and returns a [`Link`] used to
//! write to it. Everything the peer sends, and the moment the session ends, is
//! reported through [`LinkEvents`], tagged with the generation the session was
//! opened under so that the worker can discard events from superseded sessions.
use std::io::{BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use log::{debug, warn};
use price_common::config::MAX_LINE_BYTES;
use price_common::framing::{Frame, read_frame};
use price_common::{Result, StreamError};

use crate::session::SessionEvent;

/// Sequence number of a transport session.
pub type Generation = u64;

/// Sink for everything one transport session produces.
#[derive(Debug, Clone)]
pub struct LinkEvents {
    generation: Generation,
    tx: Sender<SessionEvent>,
}

impl LinkEvents {
    pub(crate) fn new(generation: Generation, tx: Sender<SessionEvent>) -> Self {
        Self { generation, tx }
    }

    /// Generation this sink tags its events with.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Forward one received line. Returns `false` once the session worker is gone.
    pub fn line(&self, line: String) -> bool {
        self.tx
            .send(SessionEvent::Inbound {
                generation: self.generation,
                line,
            })
            .is_ok()
    }

    /// Forward a line that could not even be read as text.
    /// Returns `false` once the session worker is gone.
    pub fn undecodable(&self, reason: impl Into<String>) -> bool {
        self.tx
            .send(SessionEvent::Undecodable {
                generation: self.generation,
                reason: reason.into(),
            })
            .is_ok()
    }

    /// Report that the transport session ended.
    pub fn closed(&self, reason: impl Into<String>) {
        let _ = self.tx.send(SessionEvent::Closed {
            generation: self.generation,
            reason: reason.into(),
        });
    }
}

/// Write half of an open transport session.
pub trait Link: Send {
    /// Send one protocol line (without trailing newline).
    fn send(&mut self, line: &str) -> Result<()>;
    /// Close the session. Further events from it are ignored by the worker.
    fn close(&mut self);
}

/// Opens transport sessions for the client worker.
pub trait Connector: Send + 'static {
    /// Open a new session that reports into `events`.
    fn connect(&mut self, events: LinkEvents) -> Result<Box<dyn Link>>;
}

/// Newline-delimited JSON over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    timeout: Duration,
}

impl TcpConnector {
    /// `addr` is resolved on every attempt so a restarted server on a new IP is picked up.
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    fn open_stream(&self) -> Result<TcpStream> {
        let mut last_error = None;
        for addr in self.addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }
        Err(match last_error {
            Some(e) => StreamError::Io(e),
            None => StreamError::Protocol(format!("{} did not resolve to any address", self.addr)),
        })
    }
}

impl Connector for TcpConnector {
    fn connect(&mut self, events: LinkEvents) -> Result<Box<dyn Link>> {
        let stream = self.open_stream()?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(self.timeout))?;
        let peer = stream.peer_addr()?;
        let reader = stream.try_clone()?;

        thread::Builder::new()
            .name(format!("link-{}-reader", events.generation()))
            .spawn(move || read_lines(reader, peer, events))?;

        Ok(Box::new(TcpLink { stream }))
    }
}

fn read_lines(stream: TcpStream, peer: SocketAddr, events: LinkEvents) {
    let mut reader = BufReader::new(stream);
    loop {
        let delivered = match read_frame(&mut reader, MAX_LINE_BYTES) {
            Ok(Some(Frame::Line(line))) if line.trim().is_empty() => true,
            Ok(Some(Frame::Line(line))) => events.line(line),
            Ok(Some(Frame::Invalid(reason))) => events.undecodable(reason),
            Ok(Some(Frame::Oversized(len))) => {
                warn!("{} sent {} bytes without a newline", peer, len);
                events.closed(format!("{} sent an oversized line", peer));
                return;
            }
            Ok(None) => {
                events.closed(format!("{} closed the connection", peer));
                return;
            }
            Err(e) => {
                warn!("Read from {} failed: {}", peer, e);
                events.closed(e.to_string());
                return;
            }
        };
        if !delivered {
            return;
        }
    }
}

struct TcpLink {
    stream: TcpStream,
}

impl Link for TcpLink {
    fn send(&mut self, line: &str) -> Result<()> {
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\n")?;
        self.stream.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

impl Drop for TcpLink {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::io::BufRead;
    use std::net::TcpListener;

    #[test]
    fn lines_and_invalid_text_are_forwarded_then_close_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut received = String::new();
            BufReader::new(socket.try_clone().unwrap())
                .read_line(&mut received)
                .unwrap();
            socket.write_all(b"first\n\n\xff\xfe\nsecond\n").unwrap();
            received
        });

        let (tx, rx) = unbounded();
        let mut connector = TcpConnector::new(addr, Duration::from_secs(1));
        let mut link = connector.connect(LinkEvents::new(7, tx)).unwrap();
        link.send("hello").unwrap();
        assert_eq!(server.join().unwrap(), "hello\n");

        let timeout = Duration::from_secs(2);
        let mut lines = Vec::new();
        let mut undecodable = 0;
        loop {
            match rx.recv_timeout(timeout).unwrap() {
                SessionEvent::Inbound { generation, line } => {
                    assert_eq!(generation, 7);
                    lines.push(line);
                }
                SessionEvent::Undecodable { generation, .. } => {
                    assert_eq!(generation, 7);
                    assert_eq!(lines, ["first"]);
                    undecodable += 1;
                }
                SessionEvent::Closed { generation, .. } => {
                    assert_eq!(generation, 7);
                    break;
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(lines, ["first", "second"]);
        assert_eq!(undecodable, 1);
    }

    #[test]
    fn refused_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let (tx, _rx) = unbounded();
        let mut connector = TcpConnector::new(addr, Duration::from_millis(500));
        assert!(connector.connect(LinkEvents::new(1, tx)).is_err());
    }
}
