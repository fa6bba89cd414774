// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Transport abstraction: a uniform send/receive surface over heterogeneous
//! transports behind locator-based addressing.
//!
//! Each transport kind (UDPv4/v6, TCPv4/v6, SHM) implements [`Transport`].
//! A participant registers the transports named by its attributes in a
//! [`TransportRegistry`] and never touches sockets directly.
//!
//! Failure semantics: a per-send failure does not mark a channel dead unless
//! the underlying socket reports connection reset/EOF (TCP) or the segment
//! is gone (SHM). Transient send errors are logged at warning level.

/// Network interface enumeration and multicast group management.
pub mod multicast;
/// RTPS v2.5 port mapping formula.
pub mod ports;
/// Shared-memory transport (Linux).
pub mod shm;
/// TCP transport with RTCP framing.
pub mod tcp;
/// Deterministic in-memory transport for tests.
pub mod test_support;
/// UDP transport (v4/v6).
pub mod udp;

pub use ports::PortMapping;

use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::protocol::types::Locator;

/// Callback sink for received datagrams. One receiver is installed per
/// input channel; the transport guarantees `close_input_channel` does not
/// return while a callback is in flight.
pub trait PacketReceiver: Send + Sync {
    fn on_packet(&self, data: &[u8], source: &Locator, destination: &Locator);
}

/// A sendable/receivable endpoint over one locator kind.
pub trait Transport: Send + Sync {
    /// Locator kind served by this transport.
    fn kind(&self) -> i32;

    /// Bind a listening endpoint and start delivering packets to
    /// `receiver`. Idempotent on the port: opening an already-open
    /// `(logical_port, physical_port)` pair succeeds.
    fn open_input_channel(
        &self,
        locator: &Locator,
        receiver: Arc<dyn PacketReceiver>,
    ) -> Result<()>;

    /// Tear down a listening endpoint. Blocks until any in-flight receiver
    /// callback has returned.
    fn close_input_channel(&self, locator: &Locator) -> Result<()>;

    /// Create or reuse a send resource targeting `locator`.
    /// Connection-oriented transports may connect lazily; the first `send`
    /// then triggers establishment.
    fn open_output_channel(&self, locator: &Locator) -> Result<()>;

    /// Transmit one RTPS message to every destination this transport
    /// serves. Returns `true` when at least one destination accepted the
    /// bytes. The slice window is the caller's destination iterator; the
    /// buffer is never copied per destination.
    fn send(&self, buf: &[u8], destinations: &[Locator], deadline: Option<Instant>) -> bool;

    /// Rewrite a remote-advertised locator for local reachability (e.g.
    /// substituting loopback when the remote is on this host and the
    /// interface allowlist permits). `None` keeps the locator as-is.
    fn transform_remote_locator(&self, remote: &Locator) -> Option<Locator>;

    /// Whether this transport can carry traffic for the locator.
    fn supports(&self, locator: &Locator) -> bool {
        locator.kind == self.kind()
    }

    /// Release sockets/segments. Called once at participant teardown.
    fn shutdown(&self) {}
}

/// Ordered set of transports owned by one participant.
#[derive(Default)]
pub struct TransportRegistry {
    transports: Vec<Arc<dyn Transport>>,
}

impl TransportRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, transport: Arc<dyn Transport>) {
        self.transports.push(transport);
    }

    #[must_use]
    pub fn transports(&self) -> &[Arc<dyn Transport>] {
        &self.transports
    }

    /// First registered transport serving the locator kind.
    #[must_use]
    pub fn for_locator(&self, locator: &Locator) -> Option<&Arc<dyn Transport>> {
        self.transports.iter().find(|t| t.supports(locator))
    }

    /// Open an input channel on whichever transport serves the locator.
    pub fn open_input_channel(
        &self,
        locator: &Locator,
        receiver: Arc<dyn PacketReceiver>,
    ) -> Result<()> {
        match self.for_locator(locator) {
            Some(t) => t.open_input_channel(locator, receiver),
            None => Err(crate::error::Error::Unsupported("no transport for locator kind")),
        }
    }

    /// Close an input channel on whichever transport serves the locator.
    pub fn close_input_channel(&self, locator: &Locator) -> Result<()> {
        match self.for_locator(locator) {
            Some(t) => t.close_input_channel(locator),
            None => Err(crate::error::Error::Unsupported("no transport for locator kind")),
        }
    }

    /// Fan one message out to a mixed locator set, grouping destinations by
    /// transport. Returns `true` when at least one destination accepted.
    pub fn send(&self, buf: &[u8], destinations: &[Locator], deadline: Option<Instant>) -> bool {
        let mut any = false;
        for transport in &self.transports {
            let served: Vec<Locator> = destinations
                .iter()
                .filter(|l| l.is_valid() && transport.supports(l))
                .copied()
                .collect();
            if !served.is_empty() && transport.send(buf, &served, deadline) {
                any = true;
            }
        }
        any
    }

    /// Apply every transport's locator rewrite to a remote-advertised list.
    #[must_use]
    pub fn transform_remote_locators(&self, remotes: &[Locator]) -> Vec<Locator> {
        remotes
            .iter()
            .map(|remote| {
                self.for_locator(remote)
                    .and_then(|t| t.transform_remote_locator(remote))
                    .unwrap_or(*remote)
            })
            .collect()
    }

    /// Shut down every transport.
    pub fn shutdown(&self) {
        for transport in &self.transports {
            transport.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MemTransport;
    use super::*;
    use crate::protocol::types::LOCATOR_KIND_UDPV4;

    #[test]
    fn test_registry_routes_by_kind() {
        let mut registry = TransportRegistry::new();
        let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));
        registry.register(mem.clone());

        let loc = Locator::udpv4([127, 0, 0, 1], 7400);
        assert!(registry.for_locator(&loc).is_some());

        let shm = Locator::shm(1, 1);
        assert!(registry.for_locator(&shm).is_none());
    }

    #[test]
    fn test_send_skips_invalid_locators() {
        let mut registry = TransportRegistry::new();
        let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));
        registry.register(mem.clone());

        let invalid = Locator::udpv4([127, 0, 0, 1], 0);
        assert!(!registry.send(b"RTPS", &[invalid], None));
        assert_eq!(mem.sent_plans().len(), 0);
    }
}
