// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Endpoint layer: stateful and stateless writers and readers, the proxies
//! they keep per matched peer, and the reliable protocol state machines.
//!
//! Locking discipline: an entity lock is taken to mutate state and released
//! **before** any transport send, so an incoming-message handler on one
//! entity can never deadlock against an emission pass on another. Handlers
//! (`process_*`) only mutate state; emission passes (`flush`, ticks,
//! `repair`) build their wire plan under the lock and send after dropping
//! it.

/// Reader-side entities.
pub mod reader;
/// Writer-side entities.
pub mod writer;

use std::sync::Arc;
use std::time::Instant;

use crate::protocol::message::{Message, Submessage};
use crate::protocol::types::{Guid, GuidPrefix, Locator};
use crate::qos::QosPolicies;
use crate::transport::TransportRegistry;

/// Static description of a local endpoint.
#[derive(Debug, Clone)]
pub struct EndpointAttributes {
    pub guid: Guid,
    pub topic_name: String,
    pub type_name: String,
    pub qos: QosPolicies,
    /// Locators this endpoint can be reached at (advertised via EDP).
    pub unicast_locators: Vec<Locator>,
    pub multicast_locators: Vec<Locator>,
}

/// Serializes submessages into RTPS messages and fans them out through the
/// participant's transports. Shared by every endpoint of a participant.
pub struct MessageSender {
    registry: Arc<TransportRegistry>,
    guid_prefix: GuidPrefix,
}

impl MessageSender {
    #[must_use]
    pub fn new(registry: Arc<TransportRegistry>, guid_prefix: GuidPrefix) -> Self {
        Self {
            registry,
            guid_prefix,
        }
    }

    #[must_use]
    pub fn guid_prefix(&self) -> GuidPrefix {
        self.guid_prefix
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<TransportRegistry> {
        &self.registry
    }

    /// Wrap submessages in a message and send to the destination set.
    pub fn send(&self, submessages: Vec<Submessage>, destinations: &[Locator]) -> bool {
        if submessages.is_empty() || destinations.is_empty() {
            return false;
        }
        let mut message = Message::new(self.guid_prefix);
        message.submessages = submessages;
        let bytes = message.encode();
        self.registry.send(&bytes, destinations, None)
    }

    /// Send with an explicit deadline (asynchronous flush path).
    pub fn send_with_deadline(
        &self,
        submessages: Vec<Submessage>,
        destinations: &[Locator],
        deadline: Instant,
    ) -> bool {
        if submessages.is_empty() || destinations.is_empty() {
            return false;
        }
        let mut message = Message::new(self.guid_prefix);
        message.submessages = submessages;
        let bytes = message.encode();
        self.registry.send(&bytes, destinations, Some(deadline))
    }
}

/// One planned wire exchange: submessages plus their destination set.
/// Emission passes build a list of these under the entity lock and send
/// them after releasing it.
pub struct SendPlan {
    pub submessages: Vec<Submessage>,
    pub destinations: Vec<Locator>,
}

impl SendPlan {
    /// Execute a batch of plans.
    pub fn send_all(plans: Vec<SendPlan>, sender: &MessageSender) {
        for plan in plans {
            sender.send(plan.submessages, &plan.destinations);
        }
    }
}
