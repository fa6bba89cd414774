// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! UDP transport (v4 and v6): connectionless datagrams, one multicast group
//! for default metatraffic, message-level reliability left to the endpoint
//! layer.
//!
//! Each open input channel owns a blocking receive thread. A close request
//! flips the channel's shutdown flag and then waits until the thread has
//! finished any in-flight receiver callback before returning, so receiver
//! objects can be dropped safely.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};

use crate::config::{MULTICAST_IP, RECEIVE_BUFFER_SIZE};
use crate::error::{Error, Result};
use crate::protocol::types::{Locator, LOCATOR_KIND_UDPV4, LOCATOR_KIND_UDPV6};
use crate::transport::multicast::{is_local_address, join_multicast_group};
use crate::transport::{PacketReceiver, Transport};

struct InputChannel {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// UDP transport descriptor knobs.
#[derive(Debug, Clone)]
pub struct UdpTransportConfig {
    /// Serve IPv6 locators instead of IPv4.
    pub ipv6: bool,
    /// Interface allowlist; empty means every interface. A non-empty list
    /// also gates the loopback rewrite in `transform_remote_locator`.
    pub interface_allowlist: Vec<Ipv4Addr>,
    /// Socket receive timeout used to observe shutdown requests.
    pub poll_interval: Duration,
}

impl Default for UdpTransportConfig {
    fn default() -> Self {
        Self {
            ipv6: false,
            interface_allowlist: Vec::new(),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// UDP transport over one IP family.
pub struct UdpTransport {
    config: UdpTransportConfig,
    /// Open input channels keyed by port (idempotent open).
    inputs: Mutex<HashMap<u32, InputChannel>>,
    /// Shared unbound send socket, created on first output channel.
    send_socket: Mutex<Option<Arc<UdpSocket>>>,
}

impl UdpTransport {
    #[must_use]
    pub fn new(config: UdpTransportConfig) -> Self {
        Self {
            config,
            inputs: Mutex::new(HashMap::new()),
            send_socket: Mutex::new(None),
        }
    }

    /// Default IPv4 transport.
    #[must_use]
    pub fn v4() -> Self {
        Self::new(UdpTransportConfig::default())
    }

    /// Default IPv6 transport.
    #[must_use]
    pub fn v6() -> Self {
        Self::new(UdpTransportConfig {
            ipv6: true,
            ..UdpTransportConfig::default()
        })
    }

    fn bind_input_socket(&self, locator: &Locator) -> Result<UdpSocket> {
        let domain = if self.config.ipv6 {
            Domain::IPV6
        } else {
            Domain::IPV4
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;

        let port = u16::try_from(locator.port)
            .map_err(|_| Error::InvalidArgument(format!("port {} exceeds u16", locator.port)))?;
        let bind_addr: SocketAddr = if self.config.ipv6 {
            format!("[::]:{}", port)
        } else {
            format!("0.0.0.0:{}", port)
        }
        .parse()
        .map_err(|_| Error::InvalidArgument("unparseable bind address".into()))?;
        socket.bind(&bind_addr.into())?;

        let socket: UdpSocket = socket.into();
        if locator.is_multicast() && !self.config.ipv6 {
            join_multicast_group(&socket)?;
        }
        socket.set_read_timeout(Some(self.config.poll_interval))?;
        Ok(socket)
    }

    fn send_socket(&self) -> Result<Arc<UdpSocket>> {
        let mut guard = self.send_socket.lock();
        if let Some(socket) = guard.as_ref() {
            return Ok(socket.clone());
        }
        let bind = if self.config.ipv6 { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind)?;
        socket.set_multicast_loop_v4(true).ok();
        if let Ok(ttl) = socket.ttl() {
            log::trace!("[UDP] send socket ttl={}", ttl);
        }
        let socket = Arc::new(socket);
        *guard = Some(socket.clone());
        Ok(socket)
    }
}

impl Transport for UdpTransport {
    fn kind(&self) -> i32 {
        if self.config.ipv6 {
            LOCATOR_KIND_UDPV6
        } else {
            LOCATOR_KIND_UDPV4
        }
    }

    fn open_input_channel(
        &self,
        locator: &Locator,
        receiver: Arc<dyn PacketReceiver>,
    ) -> Result<()> {
        if !self.supports(locator) {
            return Err(Error::Unsupported("locator kind mismatch"));
        }
        let mut inputs = self.inputs.lock();
        if inputs.contains_key(&locator.port) {
            // Same port already open: idempotent success.
            return Ok(());
        }

        let socket = self.bind_input_socket(locator)?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();
        let destination = *locator;
        let kind = self.kind();

        let thread = std::thread::Builder::new()
            .name(format!("sdds.udp.rx.{}", locator.port))
            .spawn(move || {
                let mut buf = vec![0u8; RECEIVE_BUFFER_SIZE];
                while !thread_shutdown.load(Ordering::Acquire) {
                    match socket.recv_from(&mut buf) {
                        Ok((len, from)) => {
                            let mut source = Locator::from_socket_addr(from);
                            source.kind = kind;
                            receiver.on_packet(&buf[..len], &source, &destination);
                        }
                        Err(e)
                            if e.kind() == std::io::ErrorKind::WouldBlock
                                || e.kind() == std::io::ErrorKind::TimedOut => {}
                        Err(e) => {
                            log::warn!("[UDP] recv error on port {}: {}", destination.port, e);
                        }
                    }
                }
            })
            .map_err(Error::Io)?;

        inputs.insert(
            locator.port,
            InputChannel {
                shutdown,
                thread: Some(thread),
            },
        );
        log::debug!("[UDP] input channel open on {}", locator);
        Ok(())
    }

    fn close_input_channel(&self, locator: &Locator) -> Result<()> {
        let channel = self.inputs.lock().remove(&locator.port);
        match channel {
            Some(mut channel) => {
                channel.shutdown.store(true, Ordering::Release);
                // Joining guarantees any in-flight receiver callback has
                // returned before the caller releases the receiver.
                if let Some(thread) = channel.thread.take() {
                    let _ = thread.join();
                }
                log::debug!("[UDP] input channel closed on {}", locator);
                Ok(())
            }
            None => Err(Error::PreconditionNotMet(format!(
                "no input channel on port {}",
                locator.port
            ))),
        }
    }

    fn open_output_channel(&self, _locator: &Locator) -> Result<()> {
        // UDP is connectionless; one shared send socket serves every
        // destination.
        self.send_socket().map(|_| ())
    }

    fn send(&self, buf: &[u8], destinations: &[Locator], deadline: Option<Instant>) -> bool {
        let Ok(socket) = self.send_socket() else {
            return false;
        };
        let mut any = false;
        for dest in destinations {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    log::warn!("[UDP] send deadline expired with {} destinations left",
                        destinations.len());
                    break;
                }
            }
            let Some(addr) = dest.to_socket_addr() else {
                continue;
            };
            match socket.send_to(buf, addr) {
                Ok(_) => any = true,
                Err(e) => {
                    // Transient failure; the channel stays up.
                    log::warn!("[UDP] send to {} failed: {}", addr, e);
                }
            }
        }
        any
    }

    fn transform_remote_locator(&self, remote: &Locator) -> Option<Locator> {
        if remote.kind != self.kind() || self.config.ipv6 {
            return None;
        }
        // Same-host remotes become loopback when the allowlist permits,
        // keeping traffic off the wire.
        let addr = remote.ipv4();
        if is_local_address(addr)
            && (self.config.interface_allowlist.is_empty()
                || self.config.interface_allowlist.contains(&addr))
        {
            let mut rewritten = *remote;
            rewritten.address[12..16].copy_from_slice(&Ipv4Addr::LOCALHOST.octets());
            return Some(rewritten);
        }
        None
    }

    fn shutdown(&self) {
        let ports: Vec<u32> = self.inputs.lock().keys().copied().collect();
        for port in ports {
            let locator = Locator::udpv4(MULTICAST_IP, port);
            let _ = self.close_input_channel(&locator);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingReceiver {
        packets: AtomicUsize,
    }

    impl PacketReceiver for CountingReceiver {
        fn on_packet(&self, _data: &[u8], _source: &Locator, _destination: &Locator) {
            self.packets.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_open_input_channel_idempotent_on_port() {
        let transport = UdpTransport::v4();
        let receiver = Arc::new(CountingReceiver {
            packets: AtomicUsize::new(0),
        });
        // Unicast locator on an ephemeral-range port unlikely to be taken.
        let locator = Locator::udpv4([127, 0, 0, 1], 39_471);
        transport
            .open_input_channel(&locator, receiver.clone())
            .expect("first open");
        transport
            .open_input_channel(&locator, receiver.clone())
            .expect("second open on the same port must succeed");
        transport.close_input_channel(&locator).expect("close");
    }

    #[test]
    fn test_close_unopened_channel_fails() {
        let transport = UdpTransport::v4();
        let locator = Locator::udpv4([127, 0, 0, 1], 39_472);
        assert!(transport.close_input_channel(&locator).is_err());
    }

    #[test]
    fn test_loopback_round_trip() {
        let transport = UdpTransport::v4();
        let receiver = Arc::new(CountingReceiver {
            packets: AtomicUsize::new(0),
        });
        let locator = Locator::udpv4([127, 0, 0, 1], 39_473);
        transport
            .open_input_channel(&locator, receiver.clone())
            .expect("open");
        transport.open_output_channel(&locator).expect("output");

        assert!(transport.send(b"RTPStest", &[locator], None));
        // The receive thread polls with a 100 ms timeout.
        let deadline = Instant::now() + Duration::from_secs(2);
        while receiver.packets.load(Ordering::Relaxed) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(receiver.packets.load(Ordering::Relaxed) >= 1);
        transport.close_input_channel(&locator).expect("close");
    }

    #[test]
    fn test_transform_remote_locator_loopback() {
        let transport = UdpTransport::v4();
        let local = Locator::udpv4([127, 0, 0, 1], 7411);
        // Loopback is always local.
        let rewritten = transport.transform_remote_locator(&local).expect("rewrite");
        assert_eq!(rewritten.ipv4(), Ipv4Addr::LOCALHOST);

        // A clearly remote address stays untouched.
        let remote = Locator::udpv4([203, 0, 113, 7], 7411);
        assert!(transport.transform_remote_locator(&remote).is_none());
    }
}
