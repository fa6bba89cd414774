// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! TCP transport: RTCP framing, logical-port multiplexing over one physical
//! connection, lazy connection establishment, and a keepalive protocol that
//! closes silent peers.
//!
//! One io thread runs a `mio` poll loop servicing the listener and every
//! connection. Callers never block on sockets: `send` enqueues a command to
//! the io thread and wakes it.

/// Connection state machine.
pub mod connection;
/// RTCP frame codec.
pub mod frame;

pub use connection::{ConnectionState, TcpConnection};
pub use frame::{compute_crc, encode_frame, FrameDecoder, RTCP_HEADER_SIZE};

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver, Sender};
use dashmap::DashMap;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use parking_lot::Mutex;

use crate::config::MAX_MESSAGE_SIZE;
use crate::error::{Error, Result};
use crate::protocol::types::{Locator, LOCATOR_KIND_TCPV4};
use crate::transport::{PacketReceiver, Transport};

use connection::ConnectionEvent;

const TOKEN_LISTENER: Token = Token(0);
const TOKEN_WAKER: Token = Token(1);
const TOKEN_BASE: usize = 2;

/// TCP transport descriptor knobs.
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Physical port to listen on; 0 disables the listener (client-only).
    pub listen_port: u16,
    /// Stamp a CRC on outbound frames.
    pub calculate_crc: bool,
    /// Verify the CRC on inbound frames.
    pub check_crc: bool,
    /// Keepalive ping period.
    pub keepalive_period: Duration,
    /// Silence interval after which a peer is closed.
    pub keepalive_timeout: Duration,
    /// Largest accepted frame.
    pub max_message_size: usize,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            listen_port: 0,
            calculate_crc: true,
            check_crc: true,
            keepalive_period: Duration::from_secs(5),
            keepalive_timeout: Duration::from_secs(15),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

enum Command {
    Send {
        remote: SocketAddr,
        logical_port: u16,
        payload: Vec<u8>,
    },
    Shutdown,
}

/// TCPv4 transport.
pub struct TcpTransport {
    config: TcpTransportConfig,
    receivers: Arc<DashMap<u16, Arc<dyn PacketReceiver>>>,
    cmd_tx: Sender<Command>,
    waker: Arc<Waker>,
    io_thread: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
}

impl TcpTransport {
    /// Start the transport (binds the listener when configured) and spawn
    /// the io thread.
    pub fn new(config: TcpTransportConfig) -> Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), TOKEN_WAKER)?);
        let (cmd_tx, cmd_rx) = unbounded();
        let receivers: Arc<DashMap<u16, Arc<dyn PacketReceiver>>> = Arc::new(DashMap::new());
        let running = Arc::new(AtomicBool::new(true));

        let listener = if config.listen_port != 0 {
            let addr: SocketAddr = format!("0.0.0.0:{}", config.listen_port)
                .parse()
                .map_err(|_| Error::InvalidArgument("unparseable listen address".into()))?;
            let mut listener = TcpListener::bind(addr)?;
            poll.registry()
                .register(&mut listener, TOKEN_LISTENER, Interest::READABLE)?;
            log::debug!("[TCP] listening on {}", addr);
            Some(listener)
        } else {
            None
        };

        let thread = {
            let config = config.clone();
            let receivers = receivers.clone();
            let running = running.clone();
            std::thread::Builder::new()
                .name("sdds.tcp.io".into())
                .spawn(move || {
                    io_loop(poll, listener, cmd_rx, receivers, config, running);
                })
                .map_err(Error::Io)?
        };

        Ok(Self {
            config,
            receivers,
            cmd_tx,
            waker,
            io_thread: Mutex::new(Some(thread)),
            running,
        })
    }
}

impl Transport for TcpTransport {
    fn kind(&self) -> i32 {
        LOCATOR_KIND_TCPV4
    }

    fn open_input_channel(
        &self,
        locator: &Locator,
        receiver: Arc<dyn PacketReceiver>,
    ) -> Result<()> {
        if !self.supports(locator) {
            return Err(Error::Unsupported("locator kind mismatch"));
        }
        let logical = u16::try_from(locator.port)
            .map_err(|_| Error::InvalidArgument("logical port exceeds u16".into()))?;
        // Idempotent on the logical port.
        self.receivers.entry(logical).or_insert(receiver);
        Ok(())
    }

    fn close_input_channel(&self, locator: &Locator) -> Result<()> {
        let logical = u16::try_from(locator.port)
            .map_err(|_| Error::InvalidArgument("logical port exceeds u16".into()))?;
        // The io thread dispatches through its own Arc clone, so the
        // receiver object outlives any in-flight callback.
        self.receivers
            .remove(&logical)
            .map(|_| ())
            .ok_or_else(|| Error::PreconditionNotMet(format!("no input channel on {}", locator)))
    }

    fn open_output_channel(&self, _locator: &Locator) -> Result<()> {
        // Connections are established lazily by the first send.
        Ok(())
    }

    fn send(&self, buf: &[u8], destinations: &[Locator], _deadline: Option<Instant>) -> bool {
        let mut any = false;
        for dest in destinations {
            let Some(remote) = dest.to_socket_addr() else {
                continue;
            };
            let logical = dest.port as u16;
            if self
                .cmd_tx
                .send(Command::Send {
                    remote,
                    logical_port: logical,
                    payload: buf.to_vec(),
                })
                .is_ok()
            {
                any = true;
            }
        }
        if any {
            let _ = self.waker.wake();
        }
        any
    }

    fn transform_remote_locator(&self, _remote: &Locator) -> Option<Locator> {
        None
    }

    fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            let _ = self.cmd_tx.send(Command::Shutdown);
            let _ = self.waker.wake();
            if let Some(thread) = self.io_thread.lock().take() {
                let _ = thread.join();
            }
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// IO thread
// ============================================================================

struct IoState {
    connections: HashMap<Token, TcpConnection>,
    by_remote: HashMap<SocketAddr, Token>,
    next_token: usize,
}

fn io_loop(
    mut poll: Poll,
    listener: Option<TcpListener>,
    cmd_rx: Receiver<Command>,
    receivers: Arc<DashMap<u16, Arc<dyn PacketReceiver>>>,
    config: TcpTransportConfig,
    running: Arc<AtomicBool>,
) {
    let mut events = Events::with_capacity(128);
    let mut state = IoState {
        connections: HashMap::new(),
        by_remote: HashMap::new(),
        next_token: TOKEN_BASE,
    };
    let mut conn_events: Vec<ConnectionEvent> = Vec::new();

    while running.load(Ordering::Acquire) {
        if let Err(e) = poll.poll(&mut events, Some(Duration::from_millis(200))) {
            if e.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            log::warn!("[TCP] poll failed: {}", e);
            break;
        }

        for event in events.iter() {
            match event.token() {
                TOKEN_LISTENER => {
                    if let Some(listener) = &listener {
                        accept_all(listener, &mut poll, &mut state, &config);
                    }
                }
                TOKEN_WAKER => {}
                token => {
                    let mut dead = false;
                    if let Some(conn) = state.connections.get_mut(&token) {
                        if event.is_writable() {
                            if let Err(e) = conn.on_writable(&mut conn_events) {
                                log::warn!("[TCP] {} write error: {}", conn.remote(), e);
                                conn.close(&mut conn_events);
                                dead = true;
                            }
                        }
                        if !dead && event.is_readable() {
                            if let Err(e) = conn.on_readable(&mut conn_events) {
                                // Reset/EOF marks the channel dead; transient
                                // errors were already absorbed below.
                                log::warn!("[TCP] {} read error: {}", conn.remote(), e);
                                conn.close(&mut conn_events);
                                dead = true;
                            }
                        }
                    }
                    dispatch_events(&mut conn_events, &receivers, &state, token);
                    if dead {
                        remove_connection(&mut poll, &mut state, token);
                    }
                }
            }
        }

        // Commands: lazy connects and sends.
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                Command::Send {
                    remote,
                    logical_port,
                    payload,
                } => {
                    let token = match state.by_remote.get(&remote) {
                        Some(token) => *token,
                        None => match connect(&mut poll, &mut state, remote, &config) {
                            Some(token) => token,
                            None => continue,
                        },
                    };
                    let mut failed = false;
                    if let Some(conn) = state.connections.get_mut(&token) {
                        conn.queue_message(logical_port, &payload);
                        if let Err(e) = conn.flush() {
                            log::warn!("[TCP] {} flush error: {}", remote, e);
                            conn.close(&mut conn_events);
                            failed = true;
                        }
                    }
                    if failed {
                        dispatch_events(&mut conn_events, &receivers, &state, token);
                        remove_connection(&mut poll, &mut state, token);
                    }
                }
                Command::Shutdown => return,
            }
        }

        // Keepalive pass.
        let mut timed_out: Vec<Token> = Vec::new();
        for (token, conn) in &mut state.connections {
            match conn.keepalive_tick(config.keepalive_period, config.keepalive_timeout) {
                Ok(true) => {}
                Ok(false) | Err(_) => timed_out.push(*token),
            }
        }
        for token in timed_out {
            if let Some(conn) = state.connections.get_mut(&token) {
                conn.close(&mut conn_events);
            }
            dispatch_events(&mut conn_events, &receivers, &state, token);
            remove_connection(&mut poll, &mut state, token);
        }
    }
}

fn accept_all(listener: &TcpListener, poll: &mut Poll, state: &mut IoState, config: &TcpTransportConfig) {
    loop {
        match listener.accept() {
            Ok((mut stream, remote)) => {
                let token = Token(state.next_token);
                state.next_token += 1;
                if let Err(e) = poll.registry().register(
                    &mut stream,
                    token,
                    Interest::READABLE | Interest::WRITABLE,
                ) {
                    log::warn!("[TCP] register accepted {} failed: {}", remote, e);
                    continue;
                }
                log::debug!("[TCP] accepted {}", remote);
                let conn = TcpConnection::acceptor(
                    stream,
                    remote,
                    config.max_message_size,
                    config.calculate_crc,
                    config.check_crc,
                );
                state.by_remote.insert(remote, token);
                state.connections.insert(token, conn);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
            Err(e) => {
                log::warn!("[TCP] accept failed: {}", e);
                return;
            }
        }
    }
}

fn connect(
    poll: &mut Poll,
    state: &mut IoState,
    remote: SocketAddr,
    config: &TcpTransportConfig,
) -> Option<Token> {
    match TcpStream::connect(remote) {
        Ok(mut stream) => {
            let token = Token(state.next_token);
            state.next_token += 1;
            if let Err(e) =
                poll.registry()
                    .register(&mut stream, token, Interest::READABLE | Interest::WRITABLE)
            {
                log::warn!("[TCP] register connect {} failed: {}", remote, e);
                return None;
            }
            log::debug!("[TCP] connecting to {}", remote);
            let conn = TcpConnection::initiator(
                stream,
                remote,
                config.max_message_size,
                config.calculate_crc,
                config.check_crc,
            );
            state.by_remote.insert(remote, token);
            state.connections.insert(token, conn);
            Some(token)
        }
        Err(e) => {
            log::warn!("[TCP] connect {} failed: {}", remote, e);
            None
        }
    }
}

fn dispatch_events(
    conn_events: &mut Vec<ConnectionEvent>,
    receivers: &DashMap<u16, Arc<dyn PacketReceiver>>,
    state: &IoState,
    token: Token,
) {
    for event in conn_events.drain(..) {
        match event {
            ConnectionEvent::Frame {
                logical_port,
                payload,
            } => {
                let Some(receiver) = receivers.get(&logical_port).map(|r| r.clone()) else {
                    log::trace!("[TCP] no receiver on logical port {}", logical_port);
                    continue;
                };
                let source = state
                    .connections
                    .get(&token)
                    .map(|c| {
                        let mut loc = Locator::from_socket_addr(c.remote());
                        loc.kind = LOCATOR_KIND_TCPV4;
                        loc
                    })
                    .unwrap_or(crate::protocol::types::LOCATOR_INVALID);
                let destination = Locator {
                    kind: LOCATOR_KIND_TCPV4,
                    port: u32::from(logical_port),
                    address: [0; 16],
                };
                receiver.on_packet(&payload, &source, &destination);
            }
            ConnectionEvent::Established => {}
            ConnectionEvent::Closed => {}
        }
    }
}

fn remove_connection(poll: &mut Poll, state: &mut IoState, token: Token) {
    if let Some(mut conn) = state.connections.remove(&token) {
        state.by_remote.remove(&conn.remote());
        let _ = poll.registry().deregister(&mut conn.stream);
        log::debug!("[TCP] removed connection to {}", conn.remote());
    }
}
