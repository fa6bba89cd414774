// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Deterministic in-memory transport used by the integration scenarios.
//!
//! Delivery is synchronous on the sender's thread, so protocol exchanges
//! can be driven step by step without sockets or sleeps. Loss is injected
//! with a drop filter; every send records its destination plan for
//! assertions on per-reader flow isolation.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::protocol::types::Locator;
use crate::transport::{PacketReceiver, Transport};

/// Decide whether a packet to `destination` is dropped.
pub type DropFilter = Box<dyn FnMut(&[u8], &Locator) -> bool + Send>;

/// One recorded send: the full destination plan of a single `send` call,
/// plus the message bytes for wire-level assertions.
#[derive(Debug, Clone)]
pub struct SendRecord {
    pub destinations: Vec<Locator>,
    pub bytes: usize,
    pub data: Vec<u8>,
}

/// In-memory transport: a process-local "wire" keyed by locator.
///
/// A locator may have several receivers (two participants joined to one
/// multicast group), so every channel holds a receiver list.
pub struct MemTransport {
    kind: i32,
    channels: DashMap<Locator, Vec<Arc<dyn PacketReceiver>>>,
    drop_filter: Mutex<Option<DropFilter>>,
    sent: Mutex<Vec<SendRecord>>,
    /// Locator presented as the packet source on delivery.
    source: Mutex<Locator>,
}

impl MemTransport {
    #[must_use]
    pub fn new(kind: i32) -> Self {
        Self {
            kind,
            channels: DashMap::new(),
            drop_filter: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            source: Mutex::new(Locator {
                kind,
                port: 1,
                address: [0; 16],
            }),
        }
    }

    /// Install a loss-injection filter; `true` drops the packet.
    pub fn set_drop_filter(&self, filter: DropFilter) {
        *self.drop_filter.lock() = Some(filter);
    }

    /// Locator reported as the source of delivered packets.
    pub fn set_source(&self, source: Locator) {
        *self.source.lock() = source;
    }

    /// Destination plans of every send so far.
    #[must_use]
    pub fn sent_plans(&self) -> Vec<SendRecord> {
        self.sent.lock().clone()
    }

    /// Forget recorded sends.
    pub fn clear_sent_plans(&self) {
        self.sent.lock().clear();
    }
}

impl Transport for MemTransport {
    fn kind(&self) -> i32 {
        self.kind
    }

    fn open_input_channel(
        &self,
        locator: &Locator,
        receiver: Arc<dyn PacketReceiver>,
    ) -> Result<()> {
        self.channels.entry(*locator).or_default().push(receiver);
        Ok(())
    }

    fn close_input_channel(&self, locator: &Locator) -> Result<()> {
        // Synchronous delivery means no callback can be in flight here.
        // Shared locators (multicast) hold several receivers; close drops
        // the most recently opened one (LIFO matches teardown order).
        let Some(mut entry) = self.channels.get_mut(locator) else {
            return Err(Error::PreconditionNotMet(format!("no channel at {}", locator)));
        };
        entry.pop();
        let empty = entry.is_empty();
        drop(entry);
        if empty {
            self.channels.remove(locator);
        }
        Ok(())
    }

    fn open_output_channel(&self, _locator: &Locator) -> Result<()> {
        Ok(())
    }

    fn send(&self, buf: &[u8], destinations: &[Locator], _deadline: Option<Instant>) -> bool {
        self.sent.lock().push(SendRecord {
            destinations: destinations.to_vec(),
            bytes: buf.len(),
            data: buf.to_vec(),
        });

        let source = *self.source.lock();
        let mut delivered = false;
        for dest in destinations {
            let dropped = {
                let mut filter = self.drop_filter.lock();
                match filter.as_mut() {
                    Some(f) => f(buf, dest),
                    None => false,
                }
            };
            if dropped {
                log::debug!("[MEM] dropping packet to {}", dest);
                continue;
            }
            let receivers: Vec<Arc<dyn PacketReceiver>> = self
                .channels
                .get(dest)
                .map(|r| r.clone())
                .unwrap_or_default();
            for receiver in receivers {
                receiver.on_packet(buf, &source, dest);
                delivered = true;
            }
        }
        delivered
    }

    fn transform_remote_locator(&self, _remote: &Locator) -> Option<Locator> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Sink(AtomicUsize);

    impl PacketReceiver for Sink {
        fn on_packet(&self, _data: &[u8], _source: &Locator, _destination: &Locator) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_synchronous_delivery() {
        let transport = MemTransport::new(1);
        let sink = Arc::new(Sink(AtomicUsize::new(0)));
        let loc = Locator::udpv4([127, 0, 0, 1], 7400);
        transport.open_input_channel(&loc, sink.clone()).expect("open");

        assert!(transport.send(b"x", &[loc], None));
        assert_eq!(sink.0.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_drop_filter() {
        let transport = MemTransport::new(1);
        let sink = Arc::new(Sink(AtomicUsize::new(0)));
        let loc = Locator::udpv4([127, 0, 0, 1], 7400);
        transport.open_input_channel(&loc, sink.clone()).expect("open");

        let mut first = true;
        transport.set_drop_filter(Box::new(move |_, _| {
            let drop = first;
            first = false;
            drop
        }));

        assert!(!transport.send(b"x", &[loc], None));
        assert!(transport.send(b"x", &[loc], None));
        assert_eq!(sink.0.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_send_plans_recorded() {
        let transport = MemTransport::new(1);
        let a = Locator::udpv4([127, 0, 0, 1], 1);
        let b = Locator::udpv4([127, 0, 0, 1], 2);
        transport.send(b"xyz", &[a, b], None);
        let plans = transport.sent_plans();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].destinations, vec![a, b]);
        assert_eq!(plans[0].bytes, 3);
    }
}
