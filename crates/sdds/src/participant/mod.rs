// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Participant layer: owns transports, built-in discovery endpoints,
//! entity id allocation, listener dispatch, and QoS defaults.
//!
//! Entity lifecycle: created explicitly, enabled once resources are bound,
//! matched asynchronously by discovery, torn down in reverse dependency
//! order (writers/readers before publishers/subscribers before the
//! participant). Built-in endpoints are created with the participant and
//! destroyed last.

/// Construction attributes.
pub mod attributes;
/// Event timer (min-heap + cancellation tokens).
pub mod events;
/// Listener struct + dispatch.
pub mod listener;
/// Inbound message dispatch.
pub mod receiver;

pub use attributes::{
    AllocationAttributes, BuiltinAttributes, ParticipantAttributes, TransportDescriptor,
};
pub use events::{EventTimer, EventToken};
pub use listener::{
    DeadlineMissed, IncompatibleQos, LivelinessChanged, ListenerSet, MatchedStatus, SampleLost,
};
pub use receiver::MessageReceiver;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::{
    LEASE_CHECK_INTERVAL_MS, HEARTBEAT_PERIOD_MS, MULTICAST_IP, NACK_RESPONSE_DELAY_MS,
    RuntimeConfig,
};
use crate::discovery::{
    DiscoveryMode, DiscoveryServer, Edp, EdpEvent, MatchFailure, ParticipantProxyData, Pdp,
    PdpEvent, ReaderProxyData, Wlp, WriterProxyData,
};
use crate::endpoint::reader::{Reader, StatefulReader, StatelessReader, WriterProxy};
use crate::endpoint::writer::{AsyncFlushQueue, ReaderProxy, StatefulWriter, StatelessWriter, Writer};
use crate::endpoint::{EndpointAttributes, MessageSender};
use crate::error::{Error, Result};
use crate::persistence::{InMemoryPersistence, PersistenceService};
use crate::protocol::constants::ENTITYID_PARTICIPANT;
use crate::protocol::message::{AckNack, Data, DataFrag, Gap, Heartbeat, NackFrag};
use crate::protocol::types::{
    EntityId, Guid, GuidPrefix, Locator, Time, ENTITY_KIND_USER_READER, ENTITY_KIND_USER_TOPIC,
    ENTITY_KIND_USER_WRITER,
};
use crate::qos::{DurabilityKind, LivelinessKind, QosPolicies};
use crate::security::{IdentityHandle, SecurityPlugin};
use crate::transport::shm::{MetatrafficEnforcement, ShmTransport};
use crate::transport::tcp::TcpTransport;
use crate::transport::udp::UdpTransport;
use crate::transport::{PortMapping, TransportRegistry};

static PARTICIPANT_COUNTER: AtomicU32 = AtomicU32::new(0);

// ============================================================================
// Entity id allocation
// ============================================================================

/// Allocates entity ids from disjoint pools per entity kind and rejects
/// duplicates.
struct EntityIdAllocator {
    counters: HashMap<u8, u32>,
    used: HashSet<EntityId>,
}

impl EntityIdAllocator {
    fn new() -> Self {
        let mut used = HashSet::new();
        // Built-in ids are reserved by the protocol.
        used.insert(ENTITYID_PARTICIPANT);
        used.insert(crate::protocol::constants::ENTITYID_SPDP_WRITER);
        used.insert(crate::protocol::constants::ENTITYID_SPDP_READER);
        used.insert(crate::protocol::constants::ENTITYID_SEDP_PUBLICATIONS_WRITER);
        used.insert(crate::protocol::constants::ENTITYID_SEDP_PUBLICATIONS_READER);
        used.insert(crate::protocol::constants::ENTITYID_SEDP_SUBSCRIPTIONS_WRITER);
        used.insert(crate::protocol::constants::ENTITYID_SEDP_SUBSCRIPTIONS_READER);
        used.insert(crate::protocol::constants::ENTITYID_WLP_WRITER);
        used.insert(crate::protocol::constants::ENTITYID_WLP_READER);
        Self {
            counters: HashMap::new(),
            used,
        }
    }

    fn allocate(&mut self, kind: u8) -> Result<EntityId> {
        let counter = self.counters.entry(kind).or_insert(0);
        loop {
            *counter += 1;
            if *counter > 0x00FF_FFFF {
                return Err(Error::OutOfResources(format!(
                    "entity id pool exhausted for kind {:#04x}",
                    kind
                )));
            }
            let key = counter.to_be_bytes();
            let id = EntityId::new([key[1], key[2], key[3]], kind);
            if self.used.insert(id) {
                return Ok(id);
            }
        }
    }

    fn release(&mut self, id: EntityId) {
        self.used.remove(&id);
    }
}

// ============================================================================
// Publisher/subscriber grouping
// ============================================================================

#[derive(Default)]
struct EntityGroup {
    members: HashSet<Guid>,
}

// ============================================================================
// ParticipantCore
// ============================================================================

/// Shared participant state reachable from receive threads.
pub struct ParticipantCore {
    attrs: ParticipantAttributes,
    guid: Guid,
    #[allow(dead_code)] // consulted by plugins via property lookups
    config: RuntimeConfig,
    registry: Arc<TransportRegistry>,
    sender: Arc<MessageSender>,
    pdp: Arc<Pdp>,
    edp: Arc<Edp>,
    wlp: Arc<Wlp>,
    security: Arc<dyn SecurityPlugin>,
    persistence: Arc<dyn PersistenceService>,
    server: Option<DiscoveryServer>,
    writers: DashMap<EntityId, Writer>,
    readers: DashMap<EntityId, Reader>,
    /// Flush queues of ASYNCHRONOUS-mode writers.
    async_queues: DashMap<EntityId, AsyncFlushQueue>,
    publishers: DashMap<u32, EntityGroup>,
    subscribers: DashMap<u32, EntityGroup>,
    listeners: ArcSwap<ListenerSet>,
    entity_ids: Mutex<EntityIdAllocator>,
    identity_handles: DashMap<GuidPrefix, IdentityHandle>,
    enabled: AtomicBool,
    /// Locators of this participant, advertised through discovery.
    #[allow(dead_code)] // kept for introspection surfaces
    metatraffic_unicast: Vec<Locator>,
    default_unicast: Vec<Locator>,
}

impl ParticipantCore {
    #[must_use]
    pub fn guid_prefix(&self) -> GuidPrefix {
        self.guid.prefix
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.guid
    }

    fn listeners(&self) -> Arc<ListenerSet> {
        self.listeners.load_full()
    }

    // ------------------------------------------------------------------
    // Inbound dispatch targets (called by MessageReceiver)
    // ------------------------------------------------------------------

    pub(crate) fn on_spdp_data(&self, source_prefix: GuidPrefix, data: &Data) {
        match self.pdp.process_spdp_data(source_prefix, data) {
            Ok(PdpEvent::Discovered(proxy)) => self.on_participant_discovered(proxy),
            Ok(PdpEvent::Refreshed(_)) => {}
            Ok(PdpEvent::Disposed(prefix)) => self.on_participant_removed(prefix),
            Ok(PdpEvent::Ignored) => {}
            Err(e) => log::warn!("[PDP] dropping SPDP data: {}", e),
        }
    }

    pub(crate) fn on_publications_data(&self, source_prefix: GuidPrefix, data: &Data) {
        if source_prefix == self.guid.prefix {
            return; // own announcement looped back
        }
        match self.edp.process_publications_data(source_prefix, data) {
            Ok(EdpEvent::DiscoveredWriter(proxy)) => self.match_discovered_writer(&proxy),
            Ok(EdpEvent::RemovedWriter(guid)) => self.unmatch_remote_writer(guid),
            Ok(EdpEvent::Ignored) => {}
            Ok(other) => log::debug!("[EDP] unexpected publications event {:?}", other),
            Err(e) => log::warn!("[EDP] dropping publications data: {}", e),
        }
    }

    pub(crate) fn on_subscriptions_data(&self, source_prefix: GuidPrefix, data: &Data) {
        if source_prefix == self.guid.prefix {
            return; // own announcement looped back
        }
        match self.edp.process_subscriptions_data(source_prefix, data) {
            Ok(EdpEvent::DiscoveredReader(proxy)) => self.match_discovered_reader(&proxy),
            Ok(EdpEvent::RemovedReader(guid)) => self.unmatch_remote_reader(guid),
            Ok(EdpEvent::Ignored) => {}
            Ok(other) => log::debug!("[EDP] unexpected subscriptions event {:?}", other),
            Err(e) => log::warn!("[EDP] dropping subscriptions data: {}", e),
        }
    }

    pub(crate) fn on_wlp_data(&self, data: &Data) {
        match self.wlp.process_data(data) {
            Ok((prefix, _manual)) => {
                // Any assertion refreshes the participant lease as well.
                self.pdp.refresh_participant_lease(&prefix);
                let listeners = self.listeners();
                for reader in self.readers.iter() {
                    if let Reader::Stateful(r) = reader.value() {
                        for writer_guid in r.matched_writers() {
                            if writer_guid.prefix == prefix {
                                listeners.notify_liveliness_changed(&LivelinessChanged {
                                    writer: writer_guid,
                                    alive: true,
                                });
                            }
                        }
                    }
                }
            }
            Err(e) => log::warn!("[WLP] dropping liveliness data: {}", e),
        }
    }

    pub(crate) fn on_user_data(&self, source_prefix: GuidPrefix, data: &Data, ts: Option<Time>) {
        if data.reader_id != EntityId::UNKNOWN {
            if let Some(reader) = self.readers.get(&data.reader_id) {
                match reader.value() {
                    Reader::Stateful(r) => r.process_data(source_prefix, data, ts),
                    Reader::Stateless(r) => r.process_data(source_prefix, data, ts),
                }
            }
            return;
        }
        // Unaddressed DATA: offer to every reader; unmatched stateful
        // readers discard it themselves.
        for reader in self.readers.iter() {
            match reader.value() {
                Reader::Stateful(r) => r.process_data(source_prefix, data, ts),
                Reader::Stateless(r) => r.process_data(source_prefix, data, ts),
            }
        }
    }

    pub(crate) fn on_user_data_frag(
        &self,
        source_prefix: GuidPrefix,
        frag: &DataFrag,
        ts: Option<Time>,
    ) {
        if frag.reader_id != EntityId::UNKNOWN {
            if let Some(reader) = self.readers.get(&frag.reader_id) {
                if let Reader::Stateful(r) = reader.value() {
                    r.process_data_frag(source_prefix, frag, ts);
                }
            }
            return;
        }
        for reader in self.readers.iter() {
            if let Reader::Stateful(r) = reader.value() {
                r.process_data_frag(source_prefix, frag, ts);
            }
        }
    }

    pub(crate) fn on_heartbeat(&self, source_prefix: GuidPrefix, heartbeat: &Heartbeat) {
        if heartbeat.reader_id != EntityId::UNKNOWN {
            if let Some(reader) = self.readers.get(&heartbeat.reader_id) {
                if let Reader::Stateful(r) = reader.value() {
                    r.process_heartbeat(source_prefix, heartbeat);
                }
            }
            return;
        }
        for reader in self.readers.iter() {
            if let Reader::Stateful(r) = reader.value() {
                r.process_heartbeat(source_prefix, heartbeat);
            }
        }
    }

    pub(crate) fn on_acknack(&self, source_prefix: GuidPrefix, acknack: &AckNack) {
        if let Some(writer) = self.writers.get(&acknack.writer_id) {
            if let Writer::Stateful(w) = writer.value() {
                w.process_acknack(source_prefix, acknack);
            }
        }
    }

    pub(crate) fn on_nack_frag(&self, source_prefix: GuidPrefix, nack: &NackFrag) {
        if let Some(writer) = self.writers.get(&nack.writer_id) {
            if let Writer::Stateful(w) = writer.value() {
                w.process_nack_frag(source_prefix, nack);
            }
        }
    }

    pub(crate) fn on_gap(&self, source_prefix: GuidPrefix, gap: &Gap) {
        if gap.reader_id != EntityId::UNKNOWN {
            if let Some(reader) = self.readers.get(&gap.reader_id) {
                if let Reader::Stateful(r) = reader.value() {
                    r.process_gap(source_prefix, gap);
                }
            }
            return;
        }
        for reader in self.readers.iter() {
            if let Reader::Stateful(r) = reader.value() {
                r.process_gap(source_prefix, gap);
            }
        }
    }

    // ------------------------------------------------------------------
    // Discovery event handling
    // ------------------------------------------------------------------

    fn on_participant_discovered(&self, proxy: ParticipantProxyData) {
        // Security hook: a failed authentication aborts the match, never
        // the participant.
        match self
            .security
            .authenticate_remote(&self.guid, &proxy.guid, &proxy.user_data)
        {
            Ok(handle) => {
                self.identity_handles.insert(proxy.guid.prefix, handle);
            }
            Err(e) => {
                log::warn!(
                    "[SECURITY] remote participant {} rejected: {}",
                    proxy.guid,
                    e
                );
                self.pdp.remove_participant(&proxy.guid.prefix);
                return;
            }
        }

        // Future announcements also go straight to the peer.
        let peer_metatraffic = self
            .registry
            .transform_remote_locators(&proxy.metatraffic_unicast_locators);
        for locator in &peer_metatraffic {
            self.pdp.add_announce_destination(*locator);
        }

        // EDP is triggered when the peer's mask advertises its endpoints.
        if proxy.available_builtin_endpoints
            & crate::protocol::constants::BUILTIN_ENDPOINT_PUBLICATIONS_DETECTOR
            != 0
            || proxy.available_builtin_endpoints
                & crate::protocol::constants::BUILTIN_ENDPOINT_SUBSCRIPTIONS_DETECTOR
                != 0
        {
            self.edp.announce_all_to(&peer_metatraffic);
        }

        if let Some(server) = &self.server {
            server.on_client_discovered(&proxy);
            server.relay_all();
        }

        self.listeners().notify_participant_discovered(&proxy);
    }

    fn on_participant_removed(&self, prefix: GuidPrefix) {
        let proxy = self.pdp.remove_participant(&prefix);
        // Removing a participant atomically removes all of its endpoint
        // proxies from the endpoint layer.
        let (writers, readers) = self.edp.remove_participant_endpoints(&prefix);
        for writer_guid in writers {
            self.unmatch_remote_writer(writer_guid);
        }
        for reader_guid in readers {
            self.unmatch_remote_reader(reader_guid);
        }
        self.identity_handles.remove(&prefix);
        if let Some(server) = &self.server {
            server.on_client_removed(&prefix, proxy.as_ref());
        }
        self.listeners().notify_participant_removed(&prefix);
    }

    fn authorize(&self, remote: &Guid, topic: &str, writing: bool) -> bool {
        let handle = self
            .identity_handles
            .get(&remote.prefix)
            .map(|h| *h)
            .unwrap_or(0);
        match self.security.authorize_match(handle, topic, writing) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[SECURITY] match with {} not authorized: {}", remote, e);
                false
            }
        }
    }

    /// A remote writer appeared: try to match it against every local
    /// reader on the same topic.
    fn match_discovered_writer(&self, proxy: &WriterProxyData) {
        if !self.authorize(&proxy.guid, &proxy.topic_name, true) {
            return;
        }
        let listeners = self.listeners();
        for reader in self.readers.iter() {
            let attrs = reader.attributes().clone();
            match crate::discovery::evaluate_match(
                &proxy.topic_name,
                &proxy.type_name,
                &proxy.qos,
                &attrs.topic_name,
                &attrs.type_name,
                &attrs.qos,
            ) {
                Ok(()) => {
                    if let Reader::Stateful(r) = reader.value() {
                        if r.is_matched_to(proxy.guid) {
                            continue; // re-announcement of a live match
                        }
                        let locators = self
                            .registry
                            .transform_remote_locators(&proxy.unicast_locators);
                        r.matched_writer_add(WriterProxy::new(
                            proxy.guid,
                            locators,
                            proxy.multicast_locators.clone(),
                            proxy.qos.is_reliable() && attrs.qos.is_reliable(),
                        ));
                    }
                    listeners.notify_subscription_matched(&MatchedStatus {
                        local: attrs.guid,
                        remote: proxy.guid,
                        matched: true,
                    });
                }
                Err(MatchFailure::IncompatibleQos(policy)) if attrs.topic_name == proxy.topic_name => {
                    listeners.notify_incompatible_qos(&IncompatibleQos {
                        local: attrs.guid,
                        remote: proxy.guid,
                        policy,
                    });
                }
                Err(_) => {}
            }
        }
    }

    /// A remote reader appeared: try to match it against every local
    /// writer on the same topic.
    fn match_discovered_reader(&self, proxy: &ReaderProxyData) {
        if !self.authorize(&proxy.guid, &proxy.topic_name, false) {
            return;
        }
        let listeners = self.listeners();
        for writer in self.writers.iter() {
            let attrs = writer.attributes().clone();
            match crate::discovery::evaluate_match(
                &attrs.topic_name,
                &attrs.type_name,
                &attrs.qos,
                &proxy.topic_name,
                &proxy.type_name,
                &proxy.qos,
            ) {
                Ok(()) => {
                    let locators = self
                        .registry
                        .transform_remote_locators(&proxy.unicast_locators);
                    match writer.value() {
                        Writer::Stateful(w) => {
                            if w.is_matched_to(proxy.guid) {
                                continue; // re-announcement of a live match
                            }
                            w.matched_reader_add(ReaderProxy::new(
                                proxy.guid,
                                locators,
                                proxy.multicast_locators.clone(),
                                proxy.qos.is_reliable() && attrs.qos.is_reliable(),
                                proxy.qos.durability,
                            ));
                        }
                        Writer::Stateless(w) => {
                            for locator in locators {
                                w.reader_locator_add(locator);
                            }
                        }
                    }
                    listeners.notify_publication_matched(&MatchedStatus {
                        local: attrs.guid,
                        remote: proxy.guid,
                        matched: true,
                    });
                }
                Err(MatchFailure::IncompatibleQos(policy)) if attrs.topic_name == proxy.topic_name => {
                    listeners.notify_incompatible_qos(&IncompatibleQos {
                        local: attrs.guid,
                        remote: proxy.guid,
                        policy,
                    });
                }
                Err(_) => {}
            }
        }
    }

    fn unmatch_remote_writer(&self, writer_guid: Guid) {
        let listeners = self.listeners();
        for reader in self.readers.iter() {
            if let Reader::Stateful(r) = reader.value() {
                if r.matched_writer_remove(writer_guid) {
                    listeners.notify_subscription_matched(&MatchedStatus {
                        local: r.guid(),
                        remote: writer_guid,
                        matched: false,
                    });
                }
            }
        }
    }

    fn unmatch_remote_reader(&self, reader_guid: Guid) {
        let listeners = self.listeners();
        for writer in self.writers.iter() {
            if let Writer::Stateful(w) = writer.value() {
                if w.matched_reader_remove(reader_guid) {
                    listeners.notify_publication_matched(&MatchedStatus {
                        local: w.guid(),
                        remote: reader_guid,
                        matched: false,
                    });
                }
            }
        }
    }

    /// Destinations for announcing a local endpoint to every known peer.
    fn edp_destinations(&self) -> Vec<Locator> {
        let mut destinations = Vec::new();
        for proxy in self.pdp.all_participants() {
            for locator in self
                .registry
                .transform_remote_locators(&proxy.metatraffic_unicast_locators)
            {
                if !destinations.contains(&locator) {
                    destinations.push(locator);
                }
            }
        }
        // Multicast reaches peers we have not heard from yet.
        for locator in &self.pdp.local_data().metatraffic_multicast_locators {
            if !destinations.contains(locator) {
                destinations.push(*locator);
            }
        }
        destinations
    }
}

// ============================================================================
// RtpsParticipant
// ============================================================================

/// The unit of addressable presence in a domain.
pub struct RtpsParticipant {
    core: Arc<ParticipantCore>,
    event_timer: Option<EventTimer>,
    input_locators: Mutex<Vec<Locator>>,
}

impl RtpsParticipant {
    /// Create and enable a participant.
    pub fn new(attrs: ParticipantAttributes) -> Result<Self> {
        Self::with_plugins(
            attrs,
            crate::security::permissive(),
            Arc::new(InMemoryPersistence::new()),
        )
    }

    /// Create with explicit security and persistence plugins.
    pub fn with_plugins(
        attrs: ParticipantAttributes,
        security: Arc<dyn SecurityPlugin>,
        persistence: Arc<dyn PersistenceService>,
    ) -> Result<Self> {
        // Transports: the attribute list, or UDPv4 (+ SHM on Linux).
        let mut registry = TransportRegistry::new();
        let mut shm_enforcement = MetatrafficEnforcement::None;
        if attrs.transports.is_empty() {
            registry.register(Arc::new(UdpTransport::v4()));
            #[cfg(target_os = "linux")]
            registry.register(Arc::new(ShmTransport::new(Default::default())));
        } else {
            for descriptor in &attrs.transports {
                match descriptor {
                    TransportDescriptor::Udpv4(config) => {
                        registry.register(Arc::new(UdpTransport::new(config.clone())));
                    }
                    TransportDescriptor::Udpv6(config) => {
                        let mut config = config.clone();
                        config.ipv6 = true;
                        registry.register(Arc::new(UdpTransport::new(config)));
                    }
                    TransportDescriptor::Tcpv4(config) => {
                        registry.register(Arc::new(TcpTransport::new(config.clone())?));
                    }
                    TransportDescriptor::Shm(config) => {
                        shm_enforcement = config.metatraffic_enforcement;
                        registry.register(Arc::new(ShmTransport::new(config.clone())));
                    }
                }
            }
        }
        Self::with_transport_registry(attrs, registry, shm_enforcement, security, persistence)
    }

    /// Create over a caller-assembled transport registry (tests inject the
    /// deterministic in-memory transport here).
    pub fn with_transport_registry(
        attrs: ParticipantAttributes,
        registry: TransportRegistry,
        mut shm_enforcement: MetatrafficEnforcement,
        security: Arc<dyn SecurityPlugin>,
        persistence: Arc<dyn PersistenceService>,
    ) -> Result<Self> {
        let counter = PARTICIPANT_COUNTER.fetch_add(1, Ordering::Relaxed);
        let guid_prefix = attrs
            .guid_prefix
            .unwrap_or_else(|| attributes::derive_guid_prefix(counter));
        let guid = Guid::new(guid_prefix, ENTITYID_PARTICIPANT);

        let (mapping, _participant_id) = PortMapping::auto_assign(attrs.domain_id)?;
        let config = RuntimeConfig::new(mapping);
        config.merge_properties(
            attrs
                .properties
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );

        if let Some(value) = config.property("shm.metatraffic_enforcement") {
            shm_enforcement = MetatrafficEnforcement::from_property(&value);
        }
        if shm_enforcement != MetatrafficEnforcement::None {
            log::debug!(
                "[PARTICIPANT] SHM metatraffic enforcement: {:?}",
                shm_enforcement
            );
        }

        let registry = Arc::new(registry);
        let sender = Arc::new(MessageSender::new(registry.clone(), guid_prefix));

        // Locators this participant advertises.
        let local_ip = crate::transport::multicast::primary_interface_ip()
            .unwrap_or(std::net::Ipv4Addr::LOCALHOST)
            .octets();
        let metatraffic_multicast = if attrs.builtin.metatraffic_multicast_locators.is_empty() {
            vec![Locator::udpv4(
                MULTICAST_IP,
                u32::from(mapping.metatraffic_multicast),
            )]
        } else {
            attrs.builtin.metatraffic_multicast_locators.clone()
        };
        let metatraffic_unicast = if attrs.builtin.metatraffic_unicast_locators.is_empty() {
            vec![Locator::udpv4(local_ip, u32::from(mapping.metatraffic_unicast))]
        } else {
            attrs.builtin.metatraffic_unicast_locators.clone()
        };
        let default_unicast = vec![Locator::udpv4(local_ip, u32::from(mapping.user_unicast))];

        // Discovery mode from attributes/properties.
        let mode = if !attrs.builtin.discovery_servers.is_empty() {
            DiscoveryMode::Client {
                servers: attrs.builtin.discovery_servers.clone(),
            }
        } else if config.property("discovery.mode").as_deref() == Some("server") {
            DiscoveryMode::Server
        } else {
            DiscoveryMode::Simple
        };
        let is_server = matches!(mode, DiscoveryMode::Server);

        let local_data =
            ParticipantProxyData::local(guid, attrs.domain_id, attrs.builtin.lease_duration);
        let pdp = Arc::new(Pdp::new(local_data, mode, sender.clone()));
        pdp.set_local_locators(
            metatraffic_unicast.clone(),
            metatraffic_multicast.clone(),
            default_unicast.clone(),
            Vec::new(),
        );
        let edp = Arc::new(Edp::new(sender.clone()));
        let wlp = Arc::new(Wlp::new(sender.clone()));
        let server = is_server.then(|| {
            DiscoveryServer::new(pdp.clone(), sender.clone(), persistence.clone())
        });

        let core = Arc::new(ParticipantCore {
            attrs,
            guid,
            config,
            registry: registry.clone(),
            sender,
            pdp,
            edp,
            wlp,
            security,
            persistence,
            server,
            writers: DashMap::new(),
            readers: DashMap::new(),
            async_queues: DashMap::new(),
            publishers: DashMap::new(),
            subscribers: DashMap::new(),
            listeners: ArcSwap::from_pointee(ListenerSet::default()),
            entity_ids: Mutex::new(EntityIdAllocator::new()),
            identity_handles: DashMap::new(),
            enabled: AtomicBool::new(true),
            metatraffic_unicast: metatraffic_unicast.clone(),
            default_unicast: default_unicast.clone(),
        });

        // Bind the input channels: metatraffic multicast + unicast, user
        // unicast. Each gets its own receive thread inside the transport.
        let receiver: Arc<dyn crate::transport::PacketReceiver> =
            Arc::new(MessageReceiver::new(core.clone()));
        let mut input_locators = Vec::new();
        for locator in metatraffic_multicast
            .iter()
            .chain(metatraffic_unicast.iter())
            .chain(default_unicast.iter())
        {
            match registry.open_input_channel(locator, receiver.clone()) {
                Ok(()) => input_locators.push(*locator),
                Err(e) => {
                    // A required transport refusing to bind is fatal for
                    // participant construction.
                    registry.shutdown();
                    return Err(e);
                }
            }
        }

        let participant = Self {
            core,
            event_timer: None,
            input_locators: Mutex::new(input_locators),
        };
        Ok(participant.start_event_thread())
    }

    fn start_event_thread(mut self) -> Self {
        if !self.core.attrs.builtin.use_background_threads {
            return self;
        }
        let timer = EventTimer::start();

        let announce_core = self.core.clone();
        let period = self
            .core
            .attrs
            .builtin
            .discovery_period
            .to_std()
            .unwrap_or(Duration::from_secs(3));
        timer.schedule_periodic(period, move || {
            announce_core.pdp.announce();
            let destinations: Vec<Locator> = announce_core
                .pdp
                .local_data()
                .metatraffic_multicast_locators
                .clone();
            announce_core
                .wlp
                .assert_liveliness(LivelinessKind::Automatic, &destinations);
        });

        let lease_core = self.core.clone();
        timer.schedule_periodic(Duration::from_millis(LEASE_CHECK_INTERVAL_MS), move || {
            for prefix in lease_core.pdp.check_leases() {
                lease_core.on_participant_removed(prefix);
            }
        });

        let protocol_core = self.core.clone();
        timer.schedule_periodic(Duration::from_millis(HEARTBEAT_PERIOD_MS), move || {
            for writer in protocol_core.writers.iter() {
                if let Writer::Stateful(w) = writer.value() {
                    w.periodic_tick();
                }
            }
        });

        let acknack_core = self.core.clone();
        timer.schedule_periodic(Duration::from_millis(NACK_RESPONSE_DELAY_MS), move || {
            let listeners = acknack_core.listeners.load_full();
            for reader in acknack_core.readers.iter() {
                if let Reader::Stateful(r) = reader.value() {
                    r.acknack_tick();
                    r.fragment_cleanup_tick();
                    if r.take_deadline_miss() {
                        listeners.notify_deadline_missed(&DeadlineMissed { endpoint: r.guid() });
                    }
                    if let Some(lease) = r.attributes().qos.liveliness.lease_duration.to_std() {
                        for writer_guid in r.check_writer_liveliness(lease) {
                            listeners.notify_liveliness_changed(&LivelinessChanged {
                                writer: writer_guid,
                                alive: false,
                            });
                        }
                    }
                }
            }
        });

        self.event_timer = Some(timer);
        self
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.core.guid
    }

    #[must_use]
    pub fn guid_prefix(&self) -> GuidPrefix {
        self.core.guid.prefix
    }

    /// Install listeners (replaces the whole set atomically).
    pub fn set_listeners(&self, listeners: ListenerSet) {
        self.core.listeners.store(Arc::new(listeners));
    }

    // ------------------------------------------------------------------
    // Entity factories
    // ------------------------------------------------------------------

    /// Create a publisher grouping entity.
    pub fn create_publisher(&self) -> u32 {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        let id = NEXT.fetch_add(1, Ordering::Relaxed);
        self.core.publishers.insert(id, EntityGroup::default());
        id
    }

    /// Create a subscriber grouping entity.
    pub fn create_subscriber(&self) -> u32 {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        let id = NEXT.fetch_add(1, Ordering::Relaxed);
        self.core.subscribers.insert(id, EntityGroup::default());
        id
    }

    /// Delete a publisher. Fails while it still owns writers.
    pub fn delete_publisher(&self, publisher_id: u32) -> Result<()> {
        let Some(group) = self.core.publishers.get(&publisher_id) else {
            return Err(Error::PreconditionNotMet(format!(
                "no publisher {}",
                publisher_id
            )));
        };
        if !group.members.is_empty() {
            return Err(Error::PreconditionNotMet(format!(
                "publisher {} still owns {} writers",
                publisher_id,
                group.members.len()
            )));
        }
        drop(group);
        self.core.publishers.remove(&publisher_id);
        Ok(())
    }

    /// Delete a subscriber. Fails while it still owns readers.
    pub fn delete_subscriber(&self, subscriber_id: u32) -> Result<()> {
        let Some(group) = self.core.subscribers.get(&subscriber_id) else {
            return Err(Error::PreconditionNotMet(format!(
                "no subscriber {}",
                subscriber_id
            )));
        };
        if !group.members.is_empty() {
            return Err(Error::PreconditionNotMet(format!(
                "subscriber {} still owns {} readers",
                subscriber_id,
                group.members.len()
            )));
        }
        drop(group);
        self.core.subscribers.remove(&subscriber_id);
        Ok(())
    }

    /// Allocate a topic entity id (topics share the participant's entity
    /// id space).
    pub fn register_topic(&self) -> Result<EntityId> {
        self.core.entity_ids.lock().allocate(ENTITY_KIND_USER_TOPIC)
    }

    /// Create a writer under a publisher. Reliable or durable QoS yields
    /// a stateful writer; pure best-effort volatile yields a stateless
    /// one.
    pub fn create_writer(
        &self,
        publisher_id: u32,
        topic_name: &str,
        type_name: &str,
        qos: QosPolicies,
        unique_flow_locators: Vec<Locator>,
    ) -> Result<Writer> {
        if !self.core.enabled.load(Ordering::Acquire) {
            return Err(Error::NotEnabled);
        }
        qos.validate()?;
        if self.core.writers.len() >= self.core.attrs.allocation.max_writers {
            return Err(Error::OutOfResources("writer limit reached".into()));
        }
        let Some(mut group) = self.core.publishers.get_mut(&publisher_id) else {
            return Err(Error::PreconditionNotMet(format!(
                "no publisher {}",
                publisher_id
            )));
        };

        let entity_id = self.core.entity_ids.lock().allocate(ENTITY_KIND_USER_WRITER)?;
        let guid = Guid::new(self.core.guid.prefix, entity_id);
        let attrs = EndpointAttributes {
            guid,
            topic_name: topic_name.to_string(),
            type_name: type_name.to_string(),
            qos: qos.clone(),
            unicast_locators: if unique_flow_locators.is_empty() {
                self.core.default_unicast.clone()
            } else {
                unique_flow_locators
            },
            multicast_locators: Vec::new(),
        };

        let stateful = qos.is_reliable() || qos.is_durable();
        let writer = if stateful {
            let writer = Arc::new(StatefulWriter::new(attrs.clone(), self.core.sender.clone())?);
            if qos.durability >= DurabilityKind::Transient {
                // TRANSIENT and up survive the writer through the store.
                writer.attach_persistence(self.core.persistence.clone());
            }
            Writer::Stateful(writer)
        } else {
            Writer::Stateless(Arc::new(StatelessWriter::new(
                attrs.clone(),
                self.core.sender.clone(),
            )?))
        };

        group.members.insert(guid);
        drop(group);
        // ASYNCHRONOUS publish mode drains through a bounded flush queue.
        if qos.publish_mode.kind == crate::qos::PublishModeKind::Asynchronous {
            if let Writer::Stateful(w) = &writer {
                let queue =
                    AsyncFlushQueue::new(w.clone(), crate::config::ASYNC_WRITER_QUEUE_DEPTH)?;
                self.core.async_queues.insert(entity_id, queue);
            }
        }
        self.core.writers.insert(entity_id, writer.clone());

        // Announce through EDP and match against already-known readers.
        self.core.edp.announce_writer(
            WriterProxyData {
                guid,
                topic_name: attrs.topic_name.clone(),
                type_name: attrs.type_name.clone(),
                qos: qos.clone(),
                unicast_locators: attrs.unicast_locators.clone(),
                multicast_locators: Vec::new(),
            },
            &self.core.edp_destinations(),
        );
        for remote_reader in self.core.edp.remote_readers() {
            self.core.match_discovered_reader(&remote_reader);
        }
        Ok(writer)
    }

    /// Create a reader under a subscriber. `unique_flow_locators` gives
    /// the reader its own unicast locators, isolating its data flow.
    pub fn create_reader(
        &self,
        subscriber_id: u32,
        topic_name: &str,
        type_name: &str,
        qos: QosPolicies,
        unique_flow_locators: Vec<Locator>,
    ) -> Result<Reader> {
        if !self.core.enabled.load(Ordering::Acquire) {
            return Err(Error::NotEnabled);
        }
        qos.validate()?;
        if self.core.readers.len() >= self.core.attrs.allocation.max_readers {
            return Err(Error::OutOfResources("reader limit reached".into()));
        }
        let Some(mut group) = self.core.subscribers.get_mut(&subscriber_id) else {
            return Err(Error::PreconditionNotMet(format!(
                "no subscriber {}",
                subscriber_id
            )));
        };

        let entity_id = self.core.entity_ids.lock().allocate(ENTITY_KIND_USER_READER)?;
        let guid = Guid::new(self.core.guid.prefix, entity_id);

        let unicast_locators = if unique_flow_locators.is_empty() {
            self.core.default_unicast.clone()
        } else {
            // Unique-flow locators need their own input channels.
            let receiver: Arc<dyn crate::transport::PacketReceiver> =
                Arc::new(MessageReceiver::new(self.core.clone()));
            for locator in &unique_flow_locators {
                self.core.registry.open_input_channel(locator, receiver.clone())?;
                self.input_locators.lock().push(*locator);
            }
            unique_flow_locators
        };

        let attrs = EndpointAttributes {
            guid,
            topic_name: topic_name.to_string(),
            type_name: type_name.to_string(),
            qos: qos.clone(),
            unicast_locators: unicast_locators.clone(),
            multicast_locators: Vec::new(),
        };

        let reader = if qos.is_reliable() || qos.is_durable() {
            Reader::Stateful(Arc::new(StatefulReader::new(
                attrs.clone(),
                self.core.sender.clone(),
            )?))
        } else {
            Reader::Stateless(Arc::new(StatelessReader::new(
                attrs.clone(),
                self.core.sender.clone(),
            )?))
        };

        // Listener plumbing for data-available and sample-lost.
        let listeners_core = self.core.clone();
        let reader_guid = guid;
        match &reader {
            Reader::Stateful(r) => {
                r.set_data_available_hook(move || {
                    listeners_core.listeners().notify_data_available(&reader_guid);
                });
                let lost_core = self.core.clone();
                r.set_sample_lost_hook(move |writer_guid, seq| {
                    lost_core.listeners().notify_sample_lost(&SampleLost {
                        reader: reader_guid,
                        writer: writer_guid,
                        sequence_number: seq,
                    });
                });
            }
            Reader::Stateless(r) => r.set_data_available_hook(move || {
                listeners_core.listeners().notify_data_available(&reader_guid);
            }),
        }

        group.members.insert(guid);
        drop(group);
        self.core.readers.insert(entity_id, reader.clone());

        self.core.edp.announce_reader(
            ReaderProxyData {
                guid,
                topic_name: attrs.topic_name.clone(),
                type_name: attrs.type_name.clone(),
                qos: qos.clone(),
                unicast_locators,
                multicast_locators: Vec::new(),
                expects_inline_qos: false,
                content_filter: None,
            },
            &self.core.edp_destinations(),
        );
        for remote_writer in self.core.edp.remote_writers() {
            self.core.match_discovered_writer(&remote_writer);
        }
        Ok(reader)
    }

    /// Queue one sample on an ASYNCHRONOUS-mode writer. Blocks up to the
    /// writer's max blocking time when the queue is full, then times out.
    pub fn write_async(&self, writer_guid: Guid, payload: Vec<u8>) -> Result<()> {
        let Some(queue) = self.core.async_queues.get(&writer_guid.entity_id) else {
            return Err(Error::PreconditionNotMet(format!(
                "writer {} has no asynchronous flush queue",
                writer_guid
            )));
        };
        let max_blocking = self
            .core
            .writers
            .get(&writer_guid.entity_id)
            .map(|w| w.attributes().qos.reliability.max_blocking_time)
            .unwrap_or_default();
        queue.enqueue(payload, crate::history::WriteParams::default(), max_blocking)
    }

    /// Delete a writer: announce removal, unmatch, release its entity id.
    pub fn delete_writer(&self, guid: Guid) -> Result<()> {
        let Some((entity_id, _writer)) = self.core.writers.remove(&guid.entity_id) else {
            return Err(Error::PreconditionNotMet(format!("no writer {}", guid)));
        };
        self.core.async_queues.remove(&guid.entity_id);
        self.core
            .edp
            .announce_endpoint_removal(guid, true, &self.core.edp_destinations());
        for mut group in self.core.publishers.iter_mut() {
            group.members.remove(&guid);
        }
        self.core.entity_ids.lock().release(entity_id);
        Ok(())
    }

    /// Delete a reader: announce removal, unmatch, release its entity id.
    pub fn delete_reader(&self, guid: Guid) -> Result<()> {
        let Some((entity_id, _reader)) = self.core.readers.remove(&guid.entity_id) else {
            return Err(Error::PreconditionNotMet(format!("no reader {}", guid)));
        };
        self.core
            .edp
            .announce_endpoint_removal(guid, false, &self.core.edp_destinations());
        for mut group in self.core.subscribers.iter_mut() {
            group.members.remove(&guid);
        }
        self.core.entity_ids.lock().release(entity_id);
        Ok(())
    }

    /// Destroy every contained entity in reverse dependency order.
    /// Calling it twice yields the same final state as one call.
    pub fn delete_contained_entities(&self) {
        let writer_guids: Vec<Guid> = self
            .core
            .writers
            .iter()
            .map(|w| w.value().guid())
            .collect();
        for guid in writer_guids {
            let _ = self.delete_writer(guid);
        }
        let reader_guids: Vec<Guid> = self
            .core
            .readers
            .iter()
            .map(|r| r.value().guid())
            .collect();
        for guid in reader_guids {
            let _ = self.delete_reader(guid);
        }
        let publisher_ids: Vec<u32> = self.core.publishers.iter().map(|p| *p.key()).collect();
        for id in publisher_ids {
            let _ = self.delete_publisher(id);
        }
        let subscriber_ids: Vec<u32> = self.core.subscribers.iter().map(|s| *s.key()).collect();
        for id in subscriber_ids {
            let _ = self.delete_subscriber(id);
        }
    }

    // ------------------------------------------------------------------
    // Manual driving (tests, single-threaded embeddings)
    // ------------------------------------------------------------------

    /// One discovery pass: announce, check leases, assert liveliness.
    pub fn discovery_tick(&self) {
        self.core.pdp.announce();
        for prefix in self.core.pdp.check_leases() {
            self.core.on_participant_removed(prefix);
        }
        let destinations = self
            .core
            .pdp
            .local_data()
            .metatraffic_multicast_locators
            .clone();
        self.core
            .wlp
            .assert_liveliness(LivelinessKind::Automatic, &destinations);
    }

    /// One protocol pass: writer flush/repair/heartbeat, reader acknacks,
    /// deadline and writer-liveliness checks.
    pub fn protocol_tick(&self) {
        for writer in self.core.writers.iter() {
            if let Writer::Stateful(w) = writer.value() {
                w.periodic_tick();
            }
        }
        let listeners = self.core.listeners.load_full();
        for reader in self.core.readers.iter() {
            if let Reader::Stateful(r) = reader.value() {
                r.acknack_tick();
                r.fragment_cleanup_tick();
                if r.take_deadline_miss() {
                    listeners.notify_deadline_missed(&DeadlineMissed { endpoint: r.guid() });
                }
                if let Some(lease) = r.attributes().qos.liveliness.lease_duration.to_std() {
                    for writer_guid in r.check_writer_liveliness(lease) {
                        listeners.notify_liveliness_changed(&LivelinessChanged {
                            writer: writer_guid,
                            alive: false,
                        });
                    }
                }
            }
        }
    }

    /// Manually assert liveliness of MANUAL-kind writers.
    pub fn assert_liveliness(&self) {
        let destinations = self
            .core
            .pdp
            .local_data()
            .metatraffic_multicast_locators
            .clone();
        self.core
            .wlp
            .assert_liveliness(LivelinessKind::ManualByParticipant, &destinations);
    }

    /// Disable the participant: stop timers, close inputs, announce the
    /// dispose. After return no listener callback will be invoked.
    pub fn disable(&self) {
        if !self.core.enabled.swap(false, Ordering::AcqRel) {
            return;
        }
        self.core.pdp.announce_dispose();
        if let Some(timer) = &self.event_timer {
            timer.shutdown();
        }
        let locators: Vec<Locator> = self.input_locators.lock().drain(..).collect();
        for locator in locators {
            let _ = self.core.registry.close_input_channel(&locator);
        }
        self.core.listeners.store(Arc::new(ListenerSet::default()));
    }
}

impl Drop for RtpsParticipant {
    fn drop(&mut self) {
        self.disable();
        self.delete_contained_entities();
        self.core.registry.shutdown();
    }
}
