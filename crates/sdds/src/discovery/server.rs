// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Discovery server: centralized relay of participant discovery data for
//! networks without multicast.
//!
//! Clients address their SPDP announcements at the server's metatraffic
//! locators (`DiscoveryMode::Client`). The server keeps a discovery
//! database, persists it through the persistence hook, and re-announces
//! aggregated participant data to every known client.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::discovery::data::ParticipantProxyData;
use crate::discovery::pdp::Pdp;
use crate::endpoint::{MessageSender, SendPlan};
use crate::persistence::PersistenceService;
use crate::protocol::constants::{ENTITYID_SPDP_WRITER, PL_CDR_LE};
use crate::protocol::message::{Data, InfoSource, Submessage};
use crate::protocol::types::{EntityId, GuidPrefix, Locator, SequenceNumber};

/// Relay engine layered over a server-mode [`Pdp`].
pub struct DiscoveryServer {
    pdp: Arc<Pdp>,
    sender: Arc<MessageSender>,
    persistence: Arc<dyn PersistenceService>,
    /// Metatraffic unicast locators of every known client.
    clients: Mutex<Vec<Locator>>,
    relay_seq: Mutex<SequenceNumber>,
}

impl DiscoveryServer {
    #[must_use]
    pub fn new(
        pdp: Arc<Pdp>,
        sender: Arc<MessageSender>,
        persistence: Arc<dyn PersistenceService>,
    ) -> Self {
        Self {
            pdp,
            sender,
            persistence,
            clients: Mutex::new(Vec::new()),
            relay_seq: Mutex::new(0),
        }
    }

    /// Register a client from its announced metatraffic locators and
    /// persist the discovery database entry.
    pub fn on_client_discovered(&self, proxy: &ParticipantProxyData) {
        {
            let mut clients = self.clients.lock();
            for locator in &proxy.metatraffic_unicast_locators {
                if !clients.contains(locator) {
                    clients.push(*locator);
                }
            }
        }
        // The discovery database survives server restarts through the
        // persistence hook; the payload is the serialized proxy data.
        let mut payload = Vec::with_capacity(256);
        payload.extend_from_slice(&PL_CDR_LE.to_be_bytes());
        payload.extend_from_slice(&[0x00, 0x00]);
        proxy.to_parameter_list().encode(&mut payload, true);
        let change = crate::history::CacheChange::alive(proxy.guid, 1, payload);
        self.persistence.store_change(proxy.guid, &change);
        log::info!(
            "[DISCOVERY_SERVER] registered client {} ({} known clients)",
            proxy.guid,
            self.clients.lock().len()
        );
    }

    /// Drop a departed client from the relay set and the database.
    pub fn on_client_removed(&self, prefix: &GuidPrefix, proxy: Option<&ParticipantProxyData>) {
        if let Some(proxy) = proxy {
            let mut clients = self.clients.lock();
            clients.retain(|l| !proxy.metatraffic_unicast_locators.contains(l));
            self.persistence.remove_change(proxy.guid, 1);
        }
        log::info!("[DISCOVERY_SERVER] client {:02x?} removed", prefix);
    }

    /// Re-announce the aggregated database to every known client. Each
    /// relayed announcement carries an INFO_SRC naming its original
    /// participant so receivers attribute it correctly.
    pub fn relay_all(&self) {
        let clients = self.clients.lock().clone();
        if clients.is_empty() {
            return;
        }
        let participants = self.pdp.all_participants();
        let mut plans = Vec::with_capacity(participants.len());
        for proxy in participants {
            let mut payload = Vec::with_capacity(256);
            payload.extend_from_slice(&PL_CDR_LE.to_be_bytes());
            payload.extend_from_slice(&[0x00, 0x00]);
            proxy.to_parameter_list().encode(&mut payload, true);

            let seq = {
                let mut seq = self.relay_seq.lock();
                *seq += 1;
                *seq
            };
            // Exclude the participant's own locators: it does not need its
            // own data back.
            let destinations: Vec<Locator> = clients
                .iter()
                .filter(|l| !proxy.metatraffic_unicast_locators.contains(l))
                .copied()
                .collect();
            if destinations.is_empty() {
                continue;
            }
            plans.push(SendPlan {
                submessages: vec![
                    Submessage::InfoSource(InfoSource {
                        version: proxy.protocol_version,
                        vendor_id: proxy.vendor_id,
                        guid_prefix: proxy.guid.prefix,
                    }),
                    Submessage::Data(Data {
                        reader_id: EntityId::UNKNOWN,
                        writer_id: ENTITYID_SPDP_WRITER,
                        writer_sn: seq,
                        inline_qos: None,
                        payload: Some(payload),
                        key_flag: false,
                    }),
                ],
                destinations,
            });
        }
        SendPlan::send_all(plans, &self.sender);
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }
}
