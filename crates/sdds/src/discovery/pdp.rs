// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Participant Discovery Protocol (PDP): announce the local participant,
//! learn remote ones, manage leases, and handle graceful disposes.
//!
//! Simple mode announces over metatraffic multicast; client mode addresses
//! the configured discovery servers directly; a server re-announces its
//! aggregated database to every known client (`discovery::server`).

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;

use crate::discovery::data::ParticipantProxyData;
use crate::endpoint::{MessageSender, SendPlan};
use crate::error::{Error, Result};
use crate::protocol::constants::{
    ENTITYID_SPDP_WRITER, PID_PARTICIPANT_GUID, PID_STATUS_INFO, PL_CDR_BE, PL_CDR_LE,
    STATUS_INFO_DISPOSED, STATUS_INFO_UNREGISTERED,
};
use crate::protocol::message::{Data, SubmessageReader, Submessage};
use crate::protocol::parameter::{Parameter, ParameterList};
use crate::protocol::types::{EntityId, Guid, GuidPrefix, Locator, SequenceNumber};

/// How participants find each other.
#[derive(Debug, Clone, Default)]
pub enum DiscoveryMode {
    /// Peer-to-peer over metatraffic multicast.
    #[default]
    Simple,
    /// Announcements go straight to the configured discovery servers.
    Client { servers: Vec<Locator> },
    /// This participant relays aggregated discovery data to its clients.
    Server,
}

/// Outcome of processing one SPDP DATA.
#[derive(Debug)]
pub enum PdpEvent {
    /// First announcement from this participant.
    Discovered(ParticipantProxyData),
    /// Re-announcement; the lease was refreshed.
    Refreshed(GuidPrefix),
    /// Graceful dispose; the participant must be removed immediately.
    Disposed(GuidPrefix),
    /// Duplicate or stale announcement; nothing to do.
    Ignored,
}

/// PDP engine for one participant.
pub struct Pdp {
    local: Mutex<ParticipantProxyData>,
    proxies: DashMap<GuidPrefix, ParticipantProxyData>,
    /// Dedup of retransmitted discovery samples by (writer, sequence).
    seen: Mutex<LruCache<(Guid, SequenceNumber), ()>>,
    announce_seq: AtomicI64,
    sender: Arc<MessageSender>,
    mode: DiscoveryMode,
    /// Where periodic announcements go (multicast group and/or servers).
    announce_destinations: Mutex<Vec<Locator>>,
}

impl Pdp {
    #[must_use]
    pub fn new(local: ParticipantProxyData, mode: DiscoveryMode, sender: Arc<MessageSender>) -> Self {
        let announce_destinations = match &mode {
            DiscoveryMode::Client { servers } => servers.clone(),
            _ => local.metatraffic_multicast_locators.clone(),
        };
        Self {
            local: Mutex::new(local),
            proxies: DashMap::new(),
            seen: Mutex::new(LruCache::new(
                NonZeroUsize::new(1024).unwrap_or(NonZeroUsize::MIN),
            )),
            announce_seq: AtomicI64::new(0),
            sender,
            mode,
            announce_destinations: Mutex::new(announce_destinations),
        }
    }

    #[must_use]
    pub fn mode(&self) -> &DiscoveryMode {
        &self.mode
    }

    /// Snapshot of the local announcement data.
    #[must_use]
    pub fn local_data(&self) -> ParticipantProxyData {
        self.local.lock().clone()
    }

    /// Replace the advertised locator lists (transport startup).
    pub fn set_local_locators(
        &self,
        metatraffic_unicast: Vec<Locator>,
        metatraffic_multicast: Vec<Locator>,
        default_unicast: Vec<Locator>,
        default_multicast: Vec<Locator>,
    ) {
        let mut local = self.local.lock();
        local.metatraffic_unicast_locators = metatraffic_unicast;
        local.metatraffic_multicast_locators = metatraffic_multicast.clone();
        local.default_unicast_locators = default_unicast;
        local.default_multicast_locators = default_multicast;
        if matches!(self.mode, DiscoveryMode::Simple | DiscoveryMode::Server) {
            *self.announce_destinations.lock() = metatraffic_multicast;
        }
    }

    /// Add an announcement destination (known peer, server client).
    pub fn add_announce_destination(&self, locator: Locator) {
        let mut destinations = self.announce_destinations.lock();
        if !destinations.contains(&locator) {
            destinations.push(locator);
        }
    }

    // ========================================================================
    // Announcement
    // ========================================================================

    fn next_sequence(&self) -> SequenceNumber {
        self.announce_seq.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Serialize the local proxy data as a PL_CDR_LE payload.
    fn announcement_payload(&self) -> Vec<u8> {
        let list = self.local.lock().to_parameter_list();
        let mut payload = Vec::with_capacity(256);
        payload.extend_from_slice(&PL_CDR_LE.to_be_bytes());
        payload.extend_from_slice(&[0x00, 0x00]);
        list.encode(&mut payload, true);
        payload
    }

    /// Build one SPDP DATA submessage.
    fn spdp_data(&self, payload: Vec<u8>, inline_qos: Option<ParameterList>) -> Data {
        Data {
            reader_id: EntityId::UNKNOWN,
            writer_id: ENTITYID_SPDP_WRITER,
            writer_sn: self.next_sequence(),
            inline_qos,
            payload: Some(payload),
            key_flag: false,
        }
    }

    /// Periodic announcement of the local participant.
    pub fn announce(&self) {
        let destinations = self.announce_destinations.lock().clone();
        if destinations.is_empty() {
            log::trace!("[PDP] no announce destinations yet");
            return;
        }
        let data = self.spdp_data(self.announcement_payload(), None);
        let plan = SendPlan {
            submessages: vec![Submessage::Data(data)],
            destinations,
        };
        SendPlan::send_all(vec![plan], &self.sender);
    }

    /// Graceful leave: a DATA(p[UD]) with the dispose+unregister flags.
    /// Peers remove this participant immediately, without waiting for the
    /// lease to expire.
    pub fn announce_dispose(&self) {
        let destinations = self.announce_destinations.lock().clone();
        if destinations.is_empty() {
            return;
        }
        let guid = self.local.lock().guid;
        let mut inline_qos = ParameterList::new();
        inline_qos.push(Parameter::new(
            PID_STATUS_INFO,
            (STATUS_INFO_DISPOSED | STATUS_INFO_UNREGISTERED)
                .to_be_bytes()
                .to_vec(),
        ));
        // Dispose carries the key (the participant GUID), not full data.
        let mut list = ParameterList::new();
        list.push(Parameter::new(
            PID_PARTICIPANT_GUID,
            guid.as_bytes().to_vec(),
        ));
        let mut payload = Vec::with_capacity(64);
        payload.extend_from_slice(&PL_CDR_LE.to_be_bytes());
        payload.extend_from_slice(&[0x00, 0x00]);
        list.encode(&mut payload, true);

        let mut data = self.spdp_data(payload, Some(inline_qos));
        data.key_flag = true;
        let plan = SendPlan {
            submessages: vec![Submessage::Data(data)],
            destinations,
        };
        SendPlan::send_all(vec![plan], &self.sender);
        log::debug!("[PDP] {} announced dispose", guid);
    }

    // ========================================================================
    // Reception
    // ========================================================================

    /// Process one SPDP DATA submessage.
    pub fn process_spdp_data(&self, source_prefix: GuidPrefix, data: &Data) -> Result<PdpEvent> {
        let writer_guid = Guid::new(source_prefix, data.writer_id);
        {
            let mut seen = self.seen.lock();
            if seen.put((writer_guid, data.writer_sn), ()).is_some() {
                return Ok(PdpEvent::Ignored);
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

        let list = Self::parse_payload(data)?;
        let proxy = ParticipantProxyData::from_parameter_list(&list)?;
        let prefix = proxy.guid.prefix;

        let local_guid = self.local.lock().guid;
        if prefix == local_guid.prefix {
            return Ok(PdpEvent::Ignored); // our own announcement looped back
        }

        if disposed {
            self.proxies.remove(&prefix);
            log::debug!("[PDP] participant {} disposed", proxy.guid);
            return Ok(PdpEvent::Disposed(prefix));
        }

        // Domain isolation: ignore participants of other domains.
        let local_domain = self.local.lock().domain_id;
        if proxy.domain_id != local_domain {
            log::trace!(
                "[PDP] ignoring participant {} from domain {}",
                proxy.guid,
                proxy.domain_id
            );
            return Ok(PdpEvent::Ignored);
        }

        match self.proxies.entry(prefix) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                let mut updated = proxy;
                updated.refresh_lease();
                entry.insert(updated);
                Ok(PdpEvent::Refreshed(prefix))
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                log::info!("[PDP] discovered participant {}", proxy.guid);
                let mut fresh = proxy.clone();
                fresh.refresh_lease();
                entry.insert(fresh);
                Ok(PdpEvent::Discovered(proxy))
            }
        }
    }

    fn parse_payload(data: &Data) -> Result<ParameterList> {
        let payload = data
            .payload
            .as_ref()
            .ok_or_else(|| Error::WireFormat("SPDP DATA without payload".into()))?;
        if payload.len() < 4 {
            return Err(Error::WireFormat("SPDP payload shorter than encapsulation".into()));
        }
        let encapsulation = u16::from_be_bytes([payload[0], payload[1]]);
        let le = match encapsulation {
            PL_CDR_LE => true,
            PL_CDR_BE => false,
            other => {
                return Err(Error::WireFormat(format!(
                    "unsupported SPDP encapsulation {:#06x}",
                    other
                )));
            }
        };
        let mut reader = SubmessageReader::new(&payload[4..], le);
        ParameterList::decode(&mut reader)
    }

    // ========================================================================
    // Lease management
    // ========================================================================

    /// Remove participants whose lease expired; returns their prefixes so
    /// the caller can cascade endpoint-proxy removal.
    pub fn check_leases(&self) -> Vec<GuidPrefix> {
        let now = std::time::Instant::now();
        let expired: Vec<GuidPrefix> = self
            .proxies
            .iter()
            .filter(|entry| entry.lease_deadline <= now)
            .map(|entry| *entry.key())
            .collect();
        for prefix in &expired {
            if let Some((_, proxy)) = self.proxies.remove(prefix) {
                log::warn!("[PDP] lease expired for participant {}", proxy.guid);
            }
        }
        expired
    }

    /// Forget a remote participant (dispose or lease path both end here).
    ///
    /// The dedup cache entries of its builtin writers are purged too, so a
    /// recreated participant with the same GUID prefix (and restarted
    /// sequence numbers) is rediscovered instead of suppressed.
    pub fn remove_participant(&self, prefix: &GuidPrefix) -> Option<ParticipantProxyData> {
        let mut seen = self.seen.lock();
        let stale: Vec<(Guid, SequenceNumber)> = seen
            .iter()
            .map(|(key, _)| *key)
            .filter(|(guid, _)| guid.prefix == *prefix)
            .collect();
        for key in stale {
            seen.pop(&key);
        }
        drop(seen);
        self.proxies.remove(prefix).map(|(_, proxy)| proxy)
    }

    #[must_use]
    pub fn lookup(&self, prefix: &GuidPrefix) -> Option<ParticipantProxyData> {
        self.proxies.get(prefix).map(|p| p.value().clone())
    }

    /// Reset a participant's lease deadline (liveliness traffic also
    /// proves the participant is alive).
    pub fn refresh_participant_lease(&self, prefix: &GuidPrefix) -> bool {
        match self.proxies.get_mut(prefix) {
            Some(mut proxy) => {
                proxy.refresh_lease();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.proxies.len()
    }

    /// Snapshot of every known remote participant (server relay path).
    #[must_use]
    pub fn all_participants(&self) -> Vec<ParticipantProxyData> {
        self.proxies.iter().map(|p| p.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qos::DdsDuration;
    use crate::transport::test_support::MemTransport;
    use crate::transport::TransportRegistry;
    use crate::protocol::types::LOCATOR_KIND_UDPV4;

    fn pdp_fixture(prefix: [u8; 12]) -> (Arc<Pdp>, Arc<MemTransport>) {
        let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));
        let mut registry = TransportRegistry::new();
        registry.register(mem.clone());
        let sender = Arc::new(MessageSender::new(Arc::new(registry), prefix));
        let guid = Guid::new(prefix, crate::protocol::constants::ENTITYID_PARTICIPANT);
        let mut local = ParticipantProxyData::local(guid, 0, DdsDuration::from_secs(30));
        local.metatraffic_multicast_locators = vec![Locator::udpv4([239, 255, 0, 1], 7400)];
        let pdp = Pdp::new(local, DiscoveryMode::Simple, sender);
        pdp.add_announce_destination(Locator::udpv4([239, 255, 0, 1], 7400));
        (Arc::new(pdp), mem)
    }

    fn announcement_data(pdp: &Pdp) -> Data {
        pdp.spdp_data(pdp.announcement_payload(), None)
    }

    #[test]
    fn test_discovery_and_refresh() {
        let (a, _mem_a) = pdp_fixture([1; 12]);
        let (b, _mem_b) = pdp_fixture([2; 12]);

        // B processes A's announcement.
        let data = announcement_data(&a);
        let event = b.process_spdp_data([1; 12], &data).expect("process");
        assert!(matches!(event, PdpEvent::Discovered(_)));
        assert_eq!(b.participant_count(), 1);

        // A second announcement refreshes.
        let data = announcement_data(&a);
        let event = b.process_spdp_data([1; 12], &data).expect("process");
        assert!(matches!(event, PdpEvent::Refreshed(_)));
    }

    #[test]
    fn test_duplicate_announcement_ignored() {
        let (a, _) = pdp_fixture([1; 12]);
        let (b, _) = pdp_fixture([2; 12]);

        let data = announcement_data(&a);
        assert!(matches!(
            b.process_spdp_data([1; 12], &data).expect("first"),
            PdpEvent::Discovered(_)
        ));
        // Same (writer, sequence): retransmission dedup.
        assert!(matches!(
            b.process_spdp_data([1; 12], &data).expect("dup"),
            PdpEvent::Ignored
        ));
    }

    #[test]
    fn test_own_announcement_ignored() {
        let (a, _) = pdp_fixture([1; 12]);
        let data = announcement_data(&a);
        assert!(matches!(
            a.process_spdp_data([1; 12], &data).expect("self"),
            PdpEvent::Ignored
        ));
        assert_eq!(a.participant_count(), 0);
    }

    #[test]
    fn test_domain_isolation() {
        let (b, _) = pdp_fixture([2; 12]);
        let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));
        let mut registry = TransportRegistry::new();
        registry.register(mem);
        let sender = Arc::new(MessageSender::new(Arc::new(registry), [3; 12]));
        let guid = Guid::new([3; 12], crate::protocol::constants::ENTITYID_PARTICIPANT);
        let other_domain = Pdp::new(
            ParticipantProxyData::local(guid, 9, DdsDuration::from_secs(30)),
            DiscoveryMode::Simple,
            sender,
        );

        let data = announcement_data(&other_domain);
        assert!(matches!(
            b.process_spdp_data([3; 12], &data).expect("cross-domain"),
            PdpEvent::Ignored
        ));
        assert_eq!(b.participant_count(), 0);
    }

    #[test]
    fn test_dispose_removes_immediately() {
        let (a, _) = pdp_fixture([1; 12]);
        let (b, _) = pdp_fixture([2; 12]);

        let data = announcement_data(&a);
        b.process_spdp_data([1; 12], &data).expect("discover");
        assert_eq!(b.participant_count(), 1);

        // Craft the dispose DATA the way announce_dispose does.
        let guid = a.local_data().guid;
        let mut inline_qos = ParameterList::new();
        inline_qos.push(Parameter::new(
            PID_STATUS_INFO,
            STATUS_INFO_DISPOSED.to_be_bytes().to_vec(),
        ));
        let mut list = ParameterList::new();
        list.push(Parameter::new(PID_PARTICIPANT_GUID, guid.as_bytes().to_vec()));
        let mut payload = Vec::new();
        payload.extend_from_slice(&PL_CDR_LE.to_be_bytes());
        payload.extend_from_slice(&[0x00, 0x00]);
        list.encode(&mut payload, true);
        let dispose = Data {
            inline_qos: Some(inline_qos),
            key_flag: true,
            ..a.spdp_data(payload, None)
        };

        let event = b.process_spdp_data([1; 12], &dispose).expect("dispose");
        assert!(matches!(event, PdpEvent::Disposed(prefix) if prefix == [1; 12]));
        assert_eq!(b.participant_count(), 0);
    }

    #[test]
    fn test_lease_expiry() {
        let (b, _) = pdp_fixture([2; 12]);
        // Hand-inject a proxy with an already-expired lease.
        let guid = Guid::new([9; 12], crate::protocol::constants::ENTITYID_PARTICIPANT);
        let mut proxy = ParticipantProxyData::local(guid, 0, DdsDuration::from_millis(0));
        proxy.lease_deadline = std::time::Instant::now() - std::time::Duration::from_millis(1);
        b.proxies.insert([9; 12], proxy);

        let expired = b.check_leases();
        assert_eq!(expired, vec![[9; 12]]);
        assert_eq!(b.participant_count(), 0);
    }
}
