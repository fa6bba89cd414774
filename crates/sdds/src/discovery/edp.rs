// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Endpoint Discovery Protocol (EDP): announce local readers/writers with
//! their QoS, learn remote ones, and hand candidate pairs to the matching
//! engine.
//!
//! Triggered by PDP: when a discovered participant's builtin-endpoint mask
//! advertises the EDP endpoints, local announcements are (re)played to its
//! metatraffic locators.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;

use crate::discovery::data::{ReaderProxyData, WriterProxyData};
use crate::endpoint::{MessageSender, SendPlan};
use crate::error::{Error, Result};
use crate::protocol::constants::{
    ENTITYID_SEDP_PUBLICATIONS_WRITER, ENTITYID_SEDP_SUBSCRIPTIONS_WRITER, PID_ENDPOINT_GUID,
    PID_STATUS_INFO, PL_CDR_BE, PL_CDR_LE, STATUS_INFO_DISPOSED, STATUS_INFO_UNREGISTERED,
};
use crate::protocol::message::{Data, SubmessageReader, Submessage};
use crate::protocol::parameter::{Parameter, ParameterList};
use crate::protocol::types::{EntityId, Guid, GuidPrefix, Locator, SequenceNumber};

/// Outcome of processing one EDP DATA.
#[derive(Debug)]
pub enum EdpEvent {
    DiscoveredWriter(WriterProxyData),
    DiscoveredReader(ReaderProxyData),
    RemovedWriter(Guid),
    RemovedReader(Guid),
    Ignored,
}

/// EDP engine: local announcement registry + remote endpoint database.
pub struct Edp {
    sender: Arc<MessageSender>,
    local_writers: DashMap<Guid, WriterProxyData>,
    local_readers: DashMap<Guid, ReaderProxyData>,
    remote_writers: DashMap<Guid, WriterProxyData>,
    remote_readers: DashMap<Guid, ReaderProxyData>,
    publications_seq: AtomicI64,
    subscriptions_seq: AtomicI64,
    seen: Mutex<LruCache<(Guid, SequenceNumber), ()>>,
}

impl Edp {
    #[must_use]
    pub fn new(sender: Arc<MessageSender>) -> Self {
        Self {
            sender,
            local_writers: DashMap::new(),
            local_readers: DashMap::new(),
            remote_writers: DashMap::new(),
            remote_readers: DashMap::new(),
            publications_seq: AtomicI64::new(0),
            subscriptions_seq: AtomicI64::new(0),
            seen: Mutex::new(LruCache::new(
                NonZeroUsize::new(4096).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    // ========================================================================
    // Local announcements
    // ========================================================================

    fn encode_payload(list: &ParameterList) -> Vec<u8> {
        let mut payload = Vec::with_capacity(256);
        payload.extend_from_slice(&PL_CDR_LE.to_be_bytes());
        payload.extend_from_slice(&[0x00, 0x00]);
        list.encode(&mut payload, true);
        payload
    }

    /// Register and announce a local writer.
    pub fn announce_writer(&self, data: WriterProxyData, destinations: &[Locator]) {
        let payload = Self::encode_payload(&data.to_parameter_list());
        self.local_writers.insert(data.guid, data);
        let seq = self.publications_seq.fetch_add(1, Ordering::AcqRel) + 1;
        self.send_edp_data(
            ENTITYID_SEDP_PUBLICATIONS_WRITER,
            seq,
            payload,
            None,
            false,
            destinations,
        );
    }

    /// Register and announce a local reader.
    pub fn announce_reader(&self, data: ReaderProxyData, destinations: &[Locator]) {
        let payload = Self::encode_payload(&data.to_parameter_list());
        self.local_readers.insert(data.guid, data);
        let seq = self.subscriptions_seq.fetch_add(1, Ordering::AcqRel) + 1;
        self.send_edp_data(
            ENTITYID_SEDP_SUBSCRIPTIONS_WRITER,
            seq,
            payload,
            None,
            false,
            destinations,
        );
    }

    /// Announce removal of a local endpoint (dispose with key payload).
    pub fn announce_endpoint_removal(&self, guid: Guid, is_writer: bool, destinations: &[Locator]) {
        if is_writer {
            self.local_writers.remove(&guid);
        } else {
            self.local_readers.remove(&guid);
        }
        let mut list = ParameterList::new();
        list.push(Parameter::new(PID_ENDPOINT_GUID, guid.as_bytes().to_vec()));
        let payload = Self::encode_payload(&list);

        let mut inline_qos = ParameterList::new();
        inline_qos.push(Parameter::new(
            PID_STATUS_INFO,
            (STATUS_INFO_DISPOSED | STATUS_INFO_UNREGISTERED)
                .to_be_bytes()
                .to_vec(),
        ));

        let (writer_id, seq) = if is_writer {
            (
                ENTITYID_SEDP_PUBLICATIONS_WRITER,
                self.publications_seq.fetch_add(1, Ordering::AcqRel) + 1,
            )
        } else {
            (
                ENTITYID_SEDP_SUBSCRIPTIONS_WRITER,
                self.subscriptions_seq.fetch_add(1, Ordering::AcqRel) + 1,
            )
        };
        self.send_edp_data(writer_id, seq, payload, Some(inline_qos), true, destinations);
    }

    /// Replay every local announcement to a newly discovered participant
    /// (the builtin writers behave transient-local).
    pub fn announce_all_to(&self, destinations: &[Locator]) {
        for entry in self.local_writers.iter() {
            let payload = Self::encode_payload(&entry.to_parameter_list());
            let seq = self.publications_seq.fetch_add(1, Ordering::AcqRel) + 1;
            self.send_edp_data(
                ENTITYID_SEDP_PUBLICATIONS_WRITER,
                seq,
                payload,
                None,
                false,
                destinations,
            );
        }
        for entry in self.local_readers.iter() {
            let payload = Self::encode_payload(&entry.to_parameter_list());
            let seq = self.subscriptions_seq.fetch_add(1, Ordering::AcqRel) + 1;
            self.send_edp_data(
                ENTITYID_SEDP_SUBSCRIPTIONS_WRITER,
                seq,
                payload,
                None,
                false,
                destinations,
            );
        }
    }

    fn send_edp_data(
        &self,
        writer_id: EntityId,
        seq: SequenceNumber,
        payload: Vec<u8>,
        inline_qos: Option<ParameterList>,
        key_flag: bool,
        destinations: &[Locator],
    ) {
        if destinations.is_empty() {
            return;
        }
        let data = Data {
            reader_id: EntityId::UNKNOWN,
            writer_id,
            writer_sn: seq,
            inline_qos,
            payload: Some(payload),
            key_flag,
        };
        let plan = SendPlan {
            submessages: vec![Submessage::Data(data)],
            destinations: destinations.to_vec(),
        };
        SendPlan::send_all(vec![plan], &self.sender);
    }

    // ========================================================================
    // Reception
    // ========================================================================

    /// Process a publications (writer) discovery DATA.
    pub fn process_publications_data(
        &self,
        source_prefix: GuidPrefix,
        data: &Data,
    ) -> Result<EdpEvent> {
        let (list, disposed) = match self.preprocess(source_prefix, data)? {
            Some(parsed) => parsed,
            None => return Ok(EdpEvent::Ignored),
        };
        if disposed {
            let guid = Self::endpoint_guid(&list)?;
            self.remote_writers.remove(&guid);
            log::debug!("[EDP] remote writer {} removed", guid);
            return Ok(EdpEvent::RemovedWriter(guid));
        }
        let proxy = WriterProxyData::from_parameter_list(&list)?;
        log::debug!(
            "[EDP] discovered writer {} topic '{}' type '{}'",
            proxy.guid,
            proxy.topic_name,
            proxy.type_name
        );
        self.remote_writers.insert(proxy.guid, proxy.clone());
        Ok(EdpEvent::DiscoveredWriter(proxy))
    }

    /// Process a subscriptions (reader) discovery DATA.
    pub fn process_subscriptions_data(
        &self,
        source_prefix: GuidPrefix,
        data: &Data,
    ) -> Result<EdpEvent> {
        let (list, disposed) = match self.preprocess(source_prefix, data)? {
            Some(parsed) => parsed,
            None => return Ok(EdpEvent::Ignored),
        };
        if disposed {
            let guid = Self::endpoint_guid(&list)?;
            self.remote_readers.remove(&guid);
            log::debug!("[EDP] remote reader {} removed", guid);
            return Ok(EdpEvent::RemovedReader(guid));
        }
        let proxy = ReaderProxyData::from_parameter_list(&list)?;
        log::debug!(
            "[EDP] discovered reader {} topic '{}' type '{}'",
            proxy.guid,
            proxy.topic_name,
            proxy.type_name
        );
        self.remote_readers.insert(proxy.guid, proxy.clone());
        Ok(EdpEvent::DiscoveredReader(proxy))
    }

    fn preprocess(
        &self,
        source_prefix: GuidPrefix,
        data: &Data,
    ) -> Result<Option<(ParameterList, bool)>> {
        let writer_guid = Guid::new(source_prefix, data.writer_id);
        {
            let mut seen = self.seen.lock();
            if seen.put((writer_guid, data.writer_sn), ()).is_some() {
                return Ok(None);
            }
        }
        let disposed = data
            .inline_qos
            .as_ref()
            .and_then(|qos| qos.get(PID_STATUS_INFO))
            .and_then(|p| p.as_u32(false))
            .map(|flags| flags & (STATUS_INFO_DISPOSED | STATUS_INFO_UNREGISTERED) != 0)
            .unwrap_or(false)
            || data.key_flag;

        let payload = data
            .payload
            .as_ref()
            .ok_or_else(|| Error::WireFormat("EDP DATA without payload".into()))?;
        if payload.len() < 4 {
            return Err(Error::WireFormat("EDP payload shorter than encapsulation".into()));
        }
        let encapsulation = u16::from_be_bytes([payload[0], payload[1]]);
        let le = match encapsulation {
            PL_CDR_LE => true,
            PL_CDR_BE => false,
            other => {
                return Err(Error::WireFormat(format!(
                    "unsupported EDP encapsulation {:#06x}",
                    other
                )));
            }
        };
        let mut reader = SubmessageReader::new(&payload[4..], le);
        let list = ParameterList::decode(&mut reader)?;
        Ok(Some((list, disposed)))
    }

    fn endpoint_guid(list: &ParameterList) -> Result<Guid> {
        let bytes: [u8; 16] = list
            .get(PID_ENDPOINT_GUID)
            .and_then(|p| p.value.get(0..16))
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| Error::WireFormat("EDP dispose without endpoint GUID".into()))?;
        Ok(Guid::from_bytes(bytes))
    }

    // ========================================================================
    // Database
    // ========================================================================

    /// Drop every remote endpoint of one participant; returns the removed
    /// GUIDs so the endpoint layer can unmatch them. Dedup entries of the
    /// participant's builtin writers are purged so a same-prefix rebirth
    /// is re-learned.
    pub fn remove_participant_endpoints(&self, prefix: &GuidPrefix) -> (Vec<Guid>, Vec<Guid>) {
        {
            let mut seen = self.seen.lock();
            let stale: Vec<(Guid, SequenceNumber)> = seen
                .iter()
                .map(|(key, _)| *key)
                .filter(|(guid, _)| guid.prefix == *prefix)
                .collect();
            for key in stale {
                seen.pop(&key);
            }
        }
        let writers: Vec<Guid> = self
            .remote_writers
            .iter()
            .filter(|e| e.key().prefix == *prefix)
            .map(|e| *e.key())
            .collect();
        for guid in &writers {
            self.remote_writers.remove(guid);
        }
        let readers: Vec<Guid> = self
            .remote_readers
            .iter()
            .filter(|e| e.key().prefix == *prefix)
            .map(|e| *e.key())
            .collect();
        for guid in &readers {
            self.remote_readers.remove(guid);
        }
        (writers, readers)
    }

    #[must_use]
    pub fn remote_writers(&self) -> Vec<WriterProxyData> {
        self.remote_writers.iter().map(|e| e.value().clone()).collect()
    }

    #[must_use]
    pub fn remote_readers(&self) -> Vec<ReaderProxyData> {
        self.remote_readers.iter().map(|e| e.value().clone()).collect()
    }

    #[must_use]
    pub fn local_writer(&self, guid: &Guid) -> Option<WriterProxyData> {
        self.local_writers.get(guid).map(|e| e.value().clone())
    }

    #[must_use]
    pub fn local_reader(&self, guid: &Guid) -> Option<ReaderProxyData> {
        self.local_readers.get(guid).map(|e| e.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::LOCATOR_KIND_UDPV4;
    use crate::qos::QosPolicies;
    use crate::transport::test_support::MemTransport;
    use crate::transport::TransportRegistry;

    fn edp_fixture(prefix: [u8; 12]) -> (Edp, Arc<MemTransport>) {
        let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));
        let mut registry = TransportRegistry::new();
        registry.register(mem.clone());
        let sender = Arc::new(MessageSender::new(Arc::new(registry), prefix));
        (Edp::new(sender), mem)
    }

    fn writer_data(prefix: [u8; 12]) -> WriterProxyData {
        WriterProxyData {
            guid: Guid::new(prefix, EntityId([0, 0, 1, 0x03])),
            topic_name: "T".into(),
            type_name: "S".into(),
            qos: QosPolicies::reliable(10),
            unicast_locators: vec![Locator::udpv4([127, 0, 0, 1], 7411)],
            multicast_locators: Vec::new(),
        }
    }

    #[test]
    fn test_publications_round_trip() {
        let (a, _) = edp_fixture([1; 12]);
        let (b, _) = edp_fixture([2; 12]);

        let payload = Edp::encode_payload(&writer_data([1; 12]).to_parameter_list());
        let data = Data {
            reader_id: EntityId::UNKNOWN,
            writer_id: ENTITYID_SEDP_PUBLICATIONS_WRITER,
            writer_sn: 1,
            inline_qos: None,
            payload: Some(payload),
            key_flag: false,
        };
        let event = b.process_publications_data([1; 12], &data).expect("process");
        match event {
            EdpEvent::DiscoveredWriter(w) => {
                assert_eq!(w.topic_name, "T");
                assert_eq!(w.guid.prefix, [1; 12]);
            }
            other => unreachable!("expected DiscoveredWriter, got {:?}", other),
        }
        assert_eq!(b.remote_writers().len(), 1);
        let _ = a;
    }

    #[test]
    fn test_endpoint_dispose() {
        let (b, _) = edp_fixture([2; 12]);
        let wdata = writer_data([1; 12]);

        let payload = Edp::encode_payload(&wdata.to_parameter_list());
        let data = Data {
            reader_id: EntityId::UNKNOWN,
            writer_id: ENTITYID_SEDP_PUBLICATIONS_WRITER,
            writer_sn: 1,
            inline_qos: None,
            payload: Some(payload),
            key_flag: false,
        };
        b.process_publications_data([1; 12], &data).expect("discover");
        assert_eq!(b.remote_writers().len(), 1);

        let mut list = ParameterList::new();
        list.push(Parameter::new(
            PID_ENDPOINT_GUID,
            wdata.guid.as_bytes().to_vec(),
        ));
        let dispose = Data {
            reader_id: EntityId::UNKNOWN,
            writer_id: ENTITYID_SEDP_PUBLICATIONS_WRITER,
            writer_sn: 2,
            inline_qos: None,
            payload: Some(Edp::encode_payload(&list)),
            key_flag: true,
        };
        let event = b.process_publications_data([1; 12], &dispose).expect("dispose");
        assert!(matches!(event, EdpEvent::RemovedWriter(g) if g == wdata.guid));
        assert!(b.remote_writers().is_empty());
    }

    #[test]
    fn test_remove_participant_endpoints_cascade() {
        let (b, _) = edp_fixture([2; 12]);
        for (i, prefix) in [[1u8; 12], [3u8; 12]].iter().enumerate() {
            let payload = Edp::encode_payload(&writer_data(*prefix).to_parameter_list());
            let data = Data {
                reader_id: EntityId::UNKNOWN,
                writer_id: ENTITYID_SEDP_PUBLICATIONS_WRITER,
                writer_sn: (i + 1) as i64,
                inline_qos: None,
                payload: Some(payload),
                key_flag: false,
            };
            b.process_publications_data(*prefix, &data).expect("discover");
        }
        assert_eq!(b.remote_writers().len(), 2);

        let (writers, readers) = b.remove_participant_endpoints(&[1; 12]);
        assert_eq!(writers.len(), 1);
        assert!(readers.is_empty());
        assert_eq!(b.remote_writers().len(), 1);
    }

    #[test]
    fn test_announce_records_send_plan() {
        let (a, mem) = edp_fixture([1; 12]);
        let dest = Locator::udpv4([127, 0, 0, 1], 7410);
        a.announce_writer(writer_data([1; 12]), &[dest]);
        let plans = mem.sent_plans();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].destinations, vec![dest]);
    }
}
