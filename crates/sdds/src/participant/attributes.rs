// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Participant construction attributes.
//!
//! Everything is constructor-time configuration; there is no CLI surface.
//! Unset fields fall back to the RTPS defaults in `config`.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::config::{PARTICIPANT_LEASE_DURATION_MS, SPDP_ANNOUNCEMENT_PERIOD_MS};
use crate::protocol::types::{GuidPrefix, Locator};
use crate::qos::DdsDuration;
use crate::transport::shm::ShmTransportConfig;
use crate::transport::tcp::TcpTransportConfig;
use crate::transport::udp::UdpTransportConfig;

/// One transport to instantiate, in priority order.
#[derive(Debug, Clone)]
pub enum TransportDescriptor {
    Udpv4(UdpTransportConfig),
    Udpv6(UdpTransportConfig),
    Tcpv4(TcpTransportConfig),
    Shm(ShmTransportConfig),
}

/// Built-in discovery knobs.
#[derive(Debug, Clone)]
pub struct BuiltinAttributes {
    /// SPDP announcement period.
    pub discovery_period: DdsDuration,
    /// Discovery servers; non-empty selects client mode.
    pub discovery_servers: Vec<Locator>,
    /// Metatraffic multicast locators; empty applies the standard group.
    pub metatraffic_multicast_locators: Vec<Locator>,
    /// Metatraffic unicast locators; empty derives from the port mapping.
    pub metatraffic_unicast_locators: Vec<Locator>,
    /// Announced participant lease.
    pub lease_duration: DdsDuration,
    /// Whether the type-lookup service is announced (consumed by an
    /// external types layer; the core only carries the flag).
    pub typelookup_enabled: bool,
    /// Run the event thread. Tests drive ticks manually instead.
    pub use_background_threads: bool,
}

impl Default for BuiltinAttributes {
    fn default() -> Self {
        Self {
            discovery_period: DdsDuration::from_millis(SPDP_ANNOUNCEMENT_PERIOD_MS),
            discovery_servers: Vec::new(),
            metatraffic_multicast_locators: Vec::new(),
            metatraffic_unicast_locators: Vec::new(),
            lease_duration: DdsDuration::from_millis(PARTICIPANT_LEASE_DURATION_MS),
            typelookup_enabled: false,
            use_background_threads: true,
        }
    }
}

/// Resource limits applied at entity creation.
#[derive(Debug, Clone, Copy)]
pub struct AllocationAttributes {
    pub max_remote_participants: usize,
    pub max_writers: usize,
    pub max_readers: usize,
    pub max_matched_endpoints_per_entity: usize,
}

impl Default for AllocationAttributes {
    fn default() -> Self {
        Self {
            max_remote_participants: 128,
            max_writers: 256,
            max_readers: 256,
            max_matched_endpoints_per_entity: 128,
        }
    }
}

/// Constructor-time participant configuration.
#[derive(Debug, Clone, Default)]
pub struct ParticipantAttributes {
    pub domain_id: u32,
    /// Explicit GUID prefix; derived from host/process/time when absent.
    pub guid_prefix: Option<GuidPrefix>,
    pub builtin: BuiltinAttributes,
    /// Ordered transport list; empty applies UDPv4 (+ SHM on Linux).
    pub transports: Vec<TransportDescriptor>,
    /// Free-form plugin configuration (security, discovery mode, SHM
    /// enforcement among `none|unicast|all`).
    pub properties: HashMap<String, String>,
    pub allocation: AllocationAttributes,
}

/// Derive a GUID prefix from host, process, and time. Two participants in
/// one process still differ through the counter mixed into the low bytes.
#[must_use]
pub fn derive_guid_prefix(counter: u32) -> GuidPrefix {
    let mut hasher = DefaultHasher::new();
    std::env::var("HOSTNAME").unwrap_or_default().hash(&mut hasher);
    let host = hasher.finish();

    let pid = std::process::id();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let mut prefix = [0u8; 12];
    prefix[0..2].copy_from_slice(&crate::protocol::constants::SDDS_VENDOR_ID);
    prefix[2..6].copy_from_slice(&(host as u32 ^ pid).to_be_bytes());
    prefix[6..10].copy_from_slice(&((now as u32) ^ counter.rotate_left(16)).to_be_bytes());
    prefix[10..12].copy_from_slice(&(counter as u16).to_be_bytes());
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_prefixes_differ_by_counter() {
        let a = derive_guid_prefix(1);
        let b = derive_guid_prefix(2);
        assert_ne!(a, b);
        // Vendor id marks the prefix origin.
        assert_eq!(&a[0..2], &crate::protocol::constants::SDDS_VENDOR_ID);
    }

    #[test]
    fn test_default_attributes() {
        let attrs = ParticipantAttributes::default();
        assert_eq!(attrs.domain_id, 0);
        assert!(attrs.guid_prefix.is_none());
        assert!(attrs.transports.is_empty());
        assert_eq!(
            attrs.builtin.lease_duration,
            DdsDuration::from_millis(PARTICIPANT_LEASE_DURATION_MS)
        );
    }
}
