// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! TCP connection state machine and per-connection bookkeeping.
//!
//! ```text
//!   +-------------+  connect()   +------------+  socket writable  +----------------+
//!   | Disconnected|------------->| Connecting |------------------>| WaitingForBind |
//!   +-------------+              +------------+                   +-------+--------+
//!          ^                            |                                 | BIND_ACK
//!          |        error/EOF           v                                 v
//!          +<---------------------------+---------------------------+-----------+
//!          |                                                        | Connected |
//!          +<-------------------------------------------------------+-----------+
//! ```
//!
//! After the TCP handshake the initiator announces the logical ports it
//! wants to reach (BIND); the acceptor answers with BIND_ACK. Data frames
//! flow only in `Connected`. A keepalive ping rides the control logical
//! port; a peer silent past the keepalive timeout is closed.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use mio::net::TcpStream;

use super::frame::{encode_frame, FrameDecoder, CONTROL_LOGICAL_PORT};

/// Control frame opcodes carried on the control logical port.
pub const CTRL_BIND: u8 = 0x01;
pub const CTRL_BIND_ACK: u8 = 0x02;
pub const CTRL_PING: u8 = 0x03;
pub const CTRL_PONG: u8 = 0x04;

/// Reconnection/connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Non-blocking connect in progress.
    Connecting,
    /// TCP established, logical-port bind exchange pending.
    WaitingForBind,
    /// Fully operational.
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::WaitingForBind => "WaitingForBind",
            ConnectionState::Connected => "Connected",
        };
        write!(f, "{}", s)
    }
}

/// Events surfaced to the transport from connection processing.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A data frame arrived for a logical port.
    Frame { logical_port: u16, payload: Vec<u8> },
    /// The connection reached `Connected`.
    Established,
    /// The connection died (reset, EOF, keepalive timeout).
    Closed,
}

/// One TCP connection to a peer, initiator or acceptor side.
pub struct TcpConnection {
    pub stream: TcpStream,
    remote: SocketAddr,
    state: ConnectionState,
    is_initiator: bool,
    decoder: FrameDecoder,
    /// Frames queued while not yet connected or while the socket is full.
    send_queue: VecDeque<Vec<u8>>,
    /// Partial write in progress: (frame, offset).
    pending: Option<(Vec<u8>, usize)>,
    last_activity: Instant,
    last_ping: Instant,
    calculate_crc: bool,
}

impl TcpConnection {
    /// Initiator side: non-blocking connect already issued.
    #[must_use]
    pub fn initiator(stream: TcpStream, remote: SocketAddr, max_size: usize, calculate_crc: bool, check_crc: bool) -> Self {
        Self {
            stream,
            remote,
            state: ConnectionState::Connecting,
            is_initiator: true,
            decoder: FrameDecoder::new(max_size, check_crc),
            send_queue: VecDeque::new(),
            pending: None,
            last_activity: Instant::now(),
            last_ping: Instant::now(),
            calculate_crc,
        }
    }

    /// Acceptor side: TCP established, waiting for the peer's BIND.
    #[must_use]
    pub fn acceptor(stream: TcpStream, remote: SocketAddr, max_size: usize, calculate_crc: bool, check_crc: bool) -> Self {
        Self {
            stream,
            remote,
            state: ConnectionState::WaitingForBind,
            is_initiator: false,
            decoder: FrameDecoder::new(max_size, check_crc),
            send_queue: VecDeque::new(),
            pending: None,
            last_activity: Instant::now(),
            last_ping: Instant::now(),
            calculate_crc,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Queue an RTPS message for a logical port. Data waits in the queue
    /// until the bind handshake completes.
    pub fn queue_message(&mut self, logical_port: u16, payload: &[u8]) {
        let frame = encode_frame(logical_port, payload, self.calculate_crc);
        self.send_queue.push_back(frame);
    }

    /// The socket became writable.
    pub fn on_writable(&mut self, events: &mut Vec<ConnectionEvent>) -> io::Result<()> {
        if self.state == ConnectionState::Connecting {
            // A writable event on a connecting socket means the handshake
            // finished (or failed; take_error distinguishes).
            if let Some(err) = self.stream.take_error()? {
                return Err(err);
            }
            self.state = ConnectionState::WaitingForBind;
            log::debug!("[TCP] {} connecting -> waiting-for-bind", self.remote);
            if self.is_initiator {
                let frame = encode_frame(CONTROL_LOGICAL_PORT, &[CTRL_BIND], self.calculate_crc);
                self.send_queue.push_front(frame);
            }
            let _ = events;
        }
        self.flush()
    }

    /// The socket became readable; drain complete frames.
    pub fn on_readable(&mut self, events: &mut Vec<ConnectionEvent>) -> io::Result<()> {
        loop {
            match self.decoder.decode(&mut self.stream) {
                Ok(Some((logical_port, payload))) => {
                    self.last_activity = Instant::now();
                    if logical_port == CONTROL_LOGICAL_PORT {
                        self.on_control_frame(&payload, events)?;
                    } else if self.state == ConnectionState::Connected {
                        events.push(ConnectionEvent::Frame {
                            logical_port,
                            payload,
                        });
                    } else {
                        log::warn!(
                            "[TCP] {} data frame before bind completed (state={}); dropped",
                            self.remote,
                            self.state
                        );
                    }
                }
                Ok(None) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    fn on_control_frame(&mut self, payload: &[u8], events: &mut Vec<ConnectionEvent>) -> io::Result<()> {
        match payload.first().copied() {
            Some(CTRL_BIND) => {
                let ack = encode_frame(CONTROL_LOGICAL_PORT, &[CTRL_BIND_ACK], self.calculate_crc);
                self.send_queue.push_front(ack);
                if self.state == ConnectionState::WaitingForBind {
                    self.state = ConnectionState::Connected;
                    events.push(ConnectionEvent::Established);
                    log::debug!("[TCP] {} bound (acceptor)", self.remote);
                }
                self.flush()
            }
            Some(CTRL_BIND_ACK) => {
                if self.state == ConnectionState::WaitingForBind {
                    self.state = ConnectionState::Connected;
                    events.push(ConnectionEvent::Established);
                    log::debug!("[TCP] {} bound (initiator)", self.remote);
                }
                self.flush()
            }
            Some(CTRL_PING) => {
                let pong = encode_frame(CONTROL_LOGICAL_PORT, &[CTRL_PONG], self.calculate_crc);
                self.send_queue.push_back(pong);
                self.flush()
            }
            Some(CTRL_PONG) => Ok(()),
            other => {
                log::warn!("[TCP] {} unknown control opcode {:?}", self.remote, other);
                Ok(())
            }
        }
    }

    /// Push queued frames into the socket until it would block.
    pub fn flush(&mut self) -> io::Result<()> {
        // Only control frames may flow before the bind handshake finishes.
        loop {
            if self.pending.is_none() {
                let gated = self.state != ConnectionState::Connected;
                let next = if gated {
                    // Peek: skip data frames while gated.
                    match self.send_queue.front() {
                        Some(front) if is_control_frame(front) => self.send_queue.pop_front(),
                        _ => None,
                    }
                } else {
                    self.send_queue.pop_front()
                };
                match next {
                    Some(frame) => self.pending = Some((frame, 0)),
                    None => return Ok(()),
                }
            }

            let Some((frame, offset)) = self.pending.as_mut() else {
                return Ok(());
            };
            match self.stream.write(&frame[*offset..]) {
                Ok(n) => {
                    *offset += n;
                    if *offset >= frame.len() {
                        self.pending = None;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Keepalive bookkeeping: emit a ping when the period elapsed, report
    /// a dead peer when the timeout elapsed without traffic.
    pub fn keepalive_tick(&mut self, period: Duration, timeout: Duration) -> io::Result<bool> {
        if self.state != ConnectionState::Connected {
            return Ok(true);
        }
        let now = Instant::now();
        if now.duration_since(self.last_activity) > timeout {
            log::warn!("[TCP] {} keepalive timeout, closing", self.remote);
            return Ok(false);
        }
        if now.duration_since(self.last_ping) >= period {
            self.last_ping = now;
            let ping = encode_frame(CONTROL_LOGICAL_PORT, &[CTRL_PING], self.calculate_crc);
            self.send_queue.push_back(ping);
            self.flush()?;
        }
        Ok(true)
    }

    /// Mark the connection dead and surface the event.
    pub fn close(&mut self, events: &mut Vec<ConnectionEvent>) {
        if self.state != ConnectionState::Disconnected {
            self.state = ConnectionState::Disconnected;
            self.decoder.reset();
            events.push(ConnectionEvent::Closed);
        }
    }
}

fn is_control_frame(frame: &[u8]) -> bool {
    // Logical port field sits at offset 8..10, little-endian.
    frame.len() >= 10 && frame[8] == 0 && frame[9] == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "Disconnected");
        assert_eq!(ConnectionState::WaitingForBind.to_string(), "WaitingForBind");
    }

    #[test]
    fn test_control_frame_detection() {
        let ctrl = encode_frame(CONTROL_LOGICAL_PORT, &[CTRL_PING], false);
        assert!(is_control_frame(&ctrl));
        let data = encode_frame(7411, b"RTPS", false);
        assert!(!is_control_frame(&data));
    }
}
