//! Client session: one outbound connection kept alive across failures.
//!
//! All session state lives on a single worker thread that waits on three
//! sources at once: the event channel (owner commands and transport events),
//! the flush timer of the coalescing buffer and the reconnect timer. A timer is
//! an `after` receiver that is simply dropped to cancel it, so nothing fires
//! once the session is stopped.
use std::collections::HashSet;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, after, never, select, unbounded};
use log::{debug, error, info, warn};
use price_common::config::{COALESCE_WINDOW_MS, RECONNECT_BASE_MS, RECONNECT_CAP_MS};
use price_common::protocol::{ClientMessage, Inbound, ServerMessage, decode_server, encode};
use price_common::{PriceMap, Result, StreamError, Symbol};

use crate::backoff::Backoff;
use crate::coalesce::CoalescingBuffer;
use crate::state::{ConnectionState, LinkEvent};
use crate::transport::{Connector, Generation, Link, LinkEvents};

/// Reported to the consumer for anything from the server that does not decode.
pub const MALFORMED_FROM_SERVER: &str = "Received malformed data from server.";

/// Reported to the consumer every time the connection comes up or goes down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    /// Whether a transport session is currently open.
    pub connected: bool,
    /// Human readable detail, e.g. when the next attempt happens.
    pub message: Option<String>,
    /// Whether the session is going to try again on its own.
    pub will_retry: bool,
}

/// Receives everything the session delivers. Called on the worker thread.
pub trait PriceConsumer: Send + 'static {
    /// Coalesced prices, at most once per window, never empty.
    fn on_update(&mut self, prices: PriceMap);

    /// The connection came up or went down.
    fn on_connection_status(&mut self, status: ConnectionStatus);

    /// The server reported an error or sent something undecodable.
    fn on_error(&mut self, message: &str) {
        warn!("Server error: {}", message);
    }
}

/// Timing knobs of a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Window over which updates are merged before delivery.
    pub coalesce_window: Duration,
    /// Base of the exponential reconnect backoff.
    pub reconnect_base: Duration,
    /// Upper bound of a single reconnect delay.
    pub reconnect_cap: Duration,
    /// Give up after this many consecutive failed attempts; `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            coalesce_window: Duration::from_millis(COALESCE_WINDOW_MS),
            reconnect_base: Duration::from_millis(RECONNECT_BASE_MS),
            reconnect_cap: Duration::from_millis(RECONNECT_CAP_MS),
            max_reconnect_attempts: None,
        }
    }
}

/// Everything the worker reacts to apart from its timers.
#[derive(Debug)]
pub enum SessionEvent {
    /// Replace the subscription with these symbols.
    Subscribe(Vec<Symbol>),
    /// A line received on the transport session `generation`.
    Inbound {
        /// Session the line arrived on.
        generation: Generation,
        /// Raw line without the terminator.
        line: String,
    },
    /// A line on session `generation` that was not even valid text.
    Undecodable {
        /// Session the line arrived on.
        generation: Generation,
        /// Why it could not be read.
        reason: String,
    },
    /// Transport session `generation` ended.
    Closed {
        /// Session that ended.
        generation: Generation,
        /// Why it ended.
        reason: String,
    },
    /// Tear the session down.
    Stop,
}

/// Entry point for starting a session.
pub struct StreamSession;

impl StreamSession {
    /// Spawn the worker and start connecting right away.
    pub fn start<C, P>(connector: C, consumer: P, config: SessionConfig) -> Result<SessionHandle>
    where
        C: Connector,
        P: PriceConsumer,
    {
        let (events_tx, events_rx) = unbounded();
        let worker = Worker {
            backoff: Backoff::new(
                config.reconnect_base,
                config.reconnect_cap,
                config.max_reconnect_attempts,
            ),
            connector,
            consumer,
            coalesce_window: config.coalesce_window,
            state: ConnectionState::Idle,
            buffer: CoalescingBuffer::new(),
            subscription: HashSet::new(),
            link: None,
            active: None,
            last_generation: 0,
            flush_timer: None,
            retry_timer: None,
            events_tx: events_tx.clone(),
        };
        let worker = thread::Builder::new()
            .name("price-session".to_string())
            .spawn(move || worker.run(events_rx))?;

        Ok(SessionHandle {
            events_tx,
            worker: Some(worker),
        })
    }
}

/// Owner side of a running session. Dropping it stops the session.
pub struct SessionHandle {
    events_tx: Sender<SessionEvent>,
    worker: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Replace the subscription. Sent right away when connected and again
    /// after every reconnect.
    pub fn subscribe<I>(&self, symbols: I) -> Result<()>
    where
        I: IntoIterator<Item = Symbol>,
    {
        self.events_tx
            .send(SessionEvent::Subscribe(symbols.into_iter().collect()))
            .map_err(|e| StreamError::ChannelSend(e.to_string()))
    }

    /// Close the transport, cancel timers and wait for the worker to finish.
    /// No consumer callback happens after this returns.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.events_tx.send(SessionEvent::Stop);
        if worker.join().is_err() {
            error!("Session worker panicked");
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker<C, P> {
    connector: C,
    consumer: P,
    coalesce_window: Duration,
    state: ConnectionState,
    backoff: Backoff,
    buffer: CoalescingBuffer,
    subscription: HashSet<Symbol>,
    link: Option<Box<dyn Link>>,
    active: Option<Generation>,
    last_generation: Generation,
    flush_timer: Option<Receiver<Instant>>,
    retry_timer: Option<Receiver<Instant>>,
    events_tx: Sender<SessionEvent>,
}

impl<C: Connector, P: PriceConsumer> Worker<C, P> {
    fn run(mut self, events: Receiver<SessionEvent>) {
        if self.transition(LinkEvent::Start) {
            self.connect();
        }

        loop {
            let flush = self.flush_timer.clone().unwrap_or_else(never);
            let retry = self.retry_timer.clone().unwrap_or_else(never);
            select! {
                recv(events) -> event => match event {
                    Ok(SessionEvent::Stop) | Err(_) => break,
                    Ok(SessionEvent::Subscribe(symbols)) => self.subscribe(symbols),
                    Ok(SessionEvent::Inbound { generation, line }) => self.inbound(generation, &line),
                    Ok(SessionEvent::Undecodable { generation, reason }) => {
                        self.undecodable(generation, &reason)
                    }
                    Ok(SessionEvent::Closed { generation, reason }) => {
                        if self.is_current(generation) {
                            self.dropped(&reason);
                        } else {
                            debug!("Ignoring close of superseded session {}", generation);
                        }
                    }
                },
                recv(flush) -> _ => self.flush(),
                recv(retry) -> _ => self.retry_due(),
            }
        }

        self.stop();
    }

    fn transition(&mut self, event: LinkEvent) -> bool {
        match self.state.on(event) {
            Some(next) => {
                debug!("{} --{}--> {}", self.state, event, next);
                self.state = next;
                true
            }
            None => {
                debug!("Ignoring {} while {}", event, self.state);
                false
            }
        }
    }

    fn is_current(&self, generation: Generation) -> bool {
        self.active == Some(generation)
    }

    fn connect(&mut self) {
        self.last_generation += 1;
        let generation = self.last_generation;
        let events = LinkEvents::new(generation, self.events_tx.clone());

        match self.connector.connect(events) {
            Ok(link) => {
                self.link = Some(link);
                self.active = Some(generation);
                self.opened();
            }
            Err(e) => {
                warn!("Connection attempt {} failed: {}", generation, e);
                self.dropped(&e.to_string());
            }
        }
    }

    fn opened(&mut self) {
        if !self.transition(LinkEvent::Opened) {
            return;
        }
        self.backoff.reset();
        info!("Connected (session {})", self.last_generation);

        if !self.subscription.is_empty() {
            if let Err(e) = self.send_subscription() {
                self.dropped(&e.to_string());
                return;
            }
        }
        self.consumer.on_connection_status(ConnectionStatus {
            connected: true,
            message: None,
            will_retry: false,
        });
    }

    fn dropped(&mut self, reason: &str) {
        if !self.transition(LinkEvent::Dropped) {
            return;
        }
        self.close_link();
        warn!("Connection lost: {}", reason);

        match self.backoff.next_delay() {
            Some(delay) => {
                info!(
                    "Reconnect attempt {} in {} ms",
                    self.backoff.attempt(),
                    delay.as_millis()
                );
                self.retry_timer = Some(after(delay));
                self.consumer.on_connection_status(ConnectionStatus {
                    connected: false,
                    message: Some(format!(
                        "Connection lost. Attempting to reconnect in {}s...",
                        delay.as_secs()
                    )),
                    will_retry: true,
                });
            }
            None => {
                self.transition(LinkEvent::Exhausted);
                error!("Giving up after {} reconnect attempts", self.backoff.attempt());
                self.consumer.on_connection_status(ConnectionStatus {
                    connected: false,
                    message: Some(format!(
                        "Connection lost. Gave up after {} reconnect attempts.",
                        self.backoff.attempt()
                    )),
                    will_retry: false,
                });
            }
        }
    }

    fn retry_due(&mut self) {
        self.retry_timer = None;
        if self.transition(LinkEvent::RetryDue) {
            self.connect();
        }
    }

    fn inbound(&mut self, generation: Generation, line: &str) {
        if !self.is_current(generation) {
            debug!("Ignoring line from superseded session {}", generation);
            return;
        }
        match decode_server(line) {
            Ok(Inbound::Message(ServerMessage::Update { data })) => {
                if self.buffer.offer(data, &self.subscription) {
                    self.flush_timer = Some(after(self.coalesce_window));
                }
            }
            Ok(Inbound::Error(message)) => self.consumer.on_error(&message),
            Ok(Inbound::Unrecognized(tag)) => {
                warn!("Ignoring message with unknown type '{}'", tag)
            }
            Err(e) => {
                warn!("Undecodable line from server: {} ({})", line, e);
                self.consumer.on_error(MALFORMED_FROM_SERVER);
            }
        }
    }

    fn undecodable(&mut self, generation: Generation, reason: &str) {
        if !self.is_current(generation) {
            debug!("Ignoring line from superseded session {}", generation);
            return;
        }
        warn!("Unreadable line from server: {}", reason);
        self.consumer.on_error(MALFORMED_FROM_SERVER);
    }

    fn subscribe(&mut self, symbols: Vec<Symbol>) {
        self.subscription = symbols.into_iter().collect();
        self.buffer.retain(&self.subscription);
        debug!("Subscription is now {} symbols", self.subscription.len());

        if self.state.is_terminal() {
            warn!("Subscription changed while {}; it will not be sent", self.state);
        } else if self.state == ConnectionState::Connected {
            if let Err(e) = self.send_subscription() {
                self.dropped(&e.to_string());
            }
        }
    }

    fn send_subscription(&mut self) -> Result<()> {
        let mut stocks: Vec<Symbol> = self.subscription.iter().cloned().collect();
        stocks.sort();
        let line = encode(&ClientMessage::Subscribe { stocks })?;
        match self.link.as_mut() {
            Some(link) => link.send(&line),
            None => Err(StreamError::Protocol("no open transport".to_string())),
        }
    }

    fn flush(&mut self) {
        self.flush_timer = None;
        if let Some(prices) = self.buffer.take() {
            self.consumer.on_update(prices);
        }
    }

    fn close_link(&mut self) {
        self.active = None;
        if let Some(mut link) = self.link.take() {
            link.close();
        }
    }

    fn stop(&mut self) {
        self.transition(LinkEvent::Stop);
        self.close_link();
        self.flush_timer = None;
        self.retry_timer = None;
        if self.buffer.pending_len() > 0 {
            debug!("Discarding {} pending prices", self.buffer.pending_len());
        }
        self.buffer.clear();
        info!("Session stopped");
    }
}
