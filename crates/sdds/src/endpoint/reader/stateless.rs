// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Best-effort stateless reader (RTPS v2.5 Sec.8.4.11).
//!
//! Accepts DATA from any writer without proxy state beyond a per-writer
//! high-water mark used to drop duplicates and late arrivals. Emits no
//! ACKNACK traffic.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::endpoint::{EndpointAttributes, MessageSender};
use crate::error::Result;
use crate::history::{CacheChange, ChangeKind, ReaderHistory, WriteParams};
use crate::protocol::message::Data;
use crate::protocol::types::{Guid, GuidPrefix, SequenceNumber, Time};

struct Inner {
    history: ReaderHistory,
    highest_seen: HashMap<Guid, SequenceNumber>,
}

/// Best-effort reader without writer proxies.
pub struct StatelessReader {
    attrs: EndpointAttributes,
    #[allow(dead_code)] // kept for parity with the stateful reader surface
    sender: Arc<MessageSender>,
    inner: Mutex<Inner>,
    on_data_available: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl StatelessReader {
    pub fn new(attrs: EndpointAttributes, sender: Arc<MessageSender>) -> Result<Self> {
        attrs.qos.validate()?;
        let history = ReaderHistory::new(
            attrs.qos.history,
            attrs.qos.resource_limits.max_samples,
            attrs.qos.destination_order.kind,
        );
        Ok(Self {
            attrs,
            sender,
            inner: Mutex::new(Inner {
                history,
                highest_seen: HashMap::new(),
            }),
            on_data_available: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.attrs.guid
    }

    #[must_use]
    pub fn attributes(&self) -> &EndpointAttributes {
        &self.attrs
    }

    pub fn set_data_available_hook<F: Fn() + Send + Sync + 'static>(&self, hook: F) {
        *self.on_data_available.lock() = Some(Box::new(hook));
    }

    /// Handle a DATA submessage: samples at or below the writer's
    /// high-water mark are dropped, everything else is delivered.
    pub fn process_data(
        &self,
        source_prefix: GuidPrefix,
        data: &Data,
        source_timestamp: Option<Time>,
    ) {
        let writer_guid = Guid::new(source_prefix, data.writer_id);
        let delivered = {
            let mut inner = self.inner.lock();
            let highest = inner.highest_seen.entry(writer_guid).or_insert(0);
            if data.writer_sn <= *highest {
                false
            } else {
                *highest = data.writer_sn;
                let change = CacheChange {
                    kind: ChangeKind::Alive,
                    writer_guid,
                    instance_handle: [0u8; 16],
                    sequence_number: data.writer_sn,
                    source_timestamp: source_timestamp.unwrap_or_else(Time::now),
                    serialized_payload: data.payload.clone().unwrap_or_default(),
                    write_params: WriteParams::default(),
                };
                inner.history.received_change(change)
            }
        };
        if delivered {
            if let Some(hook) = self.on_data_available.lock().as_ref() {
                hook();
            }
        }
    }

    /// Take every available sample in delivery order.
    pub fn take(&self) -> Vec<CacheChange> {
        self.inner.lock().history.take_all()
    }

    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.lock().history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::encapsulate_payload;
    use crate::protocol::types::{EntityId, Locator};
    use crate::qos::QosPolicies;
    use crate::transport::TransportRegistry;

    fn reader() -> StatelessReader {
        let attrs = EndpointAttributes {
            guid: Guid::from_bytes([9; 16]),
            topic_name: "T".into(),
            type_name: "S".into(),
            qos: QosPolicies::best_effort(10),
            unicast_locators: vec![Locator::udpv4([127, 0, 0, 1], 7411)],
            multicast_locators: Vec::new(),
        };
        let sender = Arc::new(MessageSender::new(
            Arc::new(TransportRegistry::new()),
            [9; 12],
        ));
        StatelessReader::new(attrs, sender).expect("reader")
    }

    fn data(seq: SequenceNumber) -> Data {
        Data {
            reader_id: EntityId::UNKNOWN,
            writer_id: EntityId([0, 0, 1, 0x03]),
            writer_sn: seq,
            inline_qos: None,
            payload: Some(encapsulate_payload(&[seq as u8])),
            key_flag: false,
        }
    }

    #[test]
    fn test_delivers_in_arrival_order() {
        let r = reader();
        r.process_data([1; 12], &data(1), None);
        r.process_data([1; 12], &data(2), None);
        let taken = r.take();
        assert_eq!(
            taken.iter().map(|c| c.sequence_number).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_drops_duplicates_and_late() {
        let r = reader();
        r.process_data([1; 12], &data(2), None);
        r.process_data([1; 12], &data(2), None);
        r.process_data([1; 12], &data(1), None);
        assert_eq!(r.available(), 1);
    }
}
