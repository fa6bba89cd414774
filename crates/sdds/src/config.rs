// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Global configuration: RTPS constants, the runtime configuration store,
//! and the environment-file override mechanism.
//!
//! Static constants live here so nothing else hardcodes ports or timing.
//! Dynamic state uses lock-free containers: the active [`PortMapping`]
//! sits behind an `ArcSwap`, the free-form property store in a `DashMap`.

use std::sync::Arc;
use std::sync::Once;

use arc_swap::ArcSwap;
use dashmap::DashMap;

use crate::transport::PortMapping;

// =======================================================================
// RTPS v2.5 port formula constants (OMG DDS-RTPS Sec.9.6.1.1)
// =======================================================================

/// RTPS base port (IANA registered range 7400-7469).
pub const PORT_BASE: u16 = 7400;

/// Highest valid domain id.
pub const MAX_DOMAIN_ID: u32 = 232;

/// Highest valid participant id within a domain.
pub const MAX_PARTICIPANT_ID: u32 = 119;

/// Port gain per domain id.
pub const DOMAIN_ID_GAIN: u16 = 250;

/// Port gain per participant id.
pub const PARTICIPANT_ID_GAIN: u16 = 2;

/// Offset of the metatraffic unicast port (d1).
pub const METATRAFFIC_UNICAST_OFFSET: u16 = 10;

/// Offset of the user-data unicast port (d3).
pub const USER_UNICAST_OFFSET: u16 = 11;

/// Standard RTPS discovery multicast group.
pub const MULTICAST_GROUP: &str = "239.255.0.1";

/// Octets of [`MULTICAST_GROUP`].
pub const MULTICAST_IP: [u8; 4] = [239, 255, 0, 1];

// =======================================================================
// Timing defaults
// =======================================================================

/// SPDP announcement period (RTPS default: 3 seconds).
pub const SPDP_ANNOUNCEMENT_PERIOD_MS: u64 = 3_000;

/// Participant lease duration (10x the announcement period).
pub const PARTICIPANT_LEASE_DURATION_MS: u64 = 30_000;

/// Lease expiry check interval.
pub const LEASE_CHECK_INTERVAL_MS: u64 = 1_000;

/// Writer heartbeat period for reliable endpoints.
pub const HEARTBEAT_PERIOD_MS: u64 = 100;

/// Delay before answering a non-final heartbeat with an ACKNACK, and the
/// window within which overlapping NACKs are coalesced.
pub const NACK_RESPONSE_DELAY_MS: u64 = 5;

/// Fragment reassembly timeout before a partial sample is evicted.
pub const FRAGMENT_TIMEOUT_MS: u64 = 500;

// =======================================================================
// Buffer sizing
// =======================================================================

/// Maximum UDP datagram we ever emit or accept.
pub const MAX_MESSAGE_SIZE: usize = 65_500;

/// Default fragment size when a payload exceeds the transport maximum.
pub const DEFAULT_FRAGMENT_SIZE: u16 = 60_000;

/// Receive buffer size per input channel.
pub const RECEIVE_BUFFER_SIZE: usize = 65_536;

/// Capacity of the per-writer asynchronous-publish queue.
pub const ASYNC_WRITER_QUEUE_DEPTH: usize = 512;

/// Environment variable naming a `key=value` override file.
pub const ENVIRONMENT_FILE_VAR: &str = "SDDS_ENVIRONMENT_FILE";

// =======================================================================
// Runtime configuration
// =======================================================================

/// Dynamic configuration shared across a participant's threads.
pub struct RuntimeConfig {
    port_mapping: ArcSwap<PortMapping>,
    properties: DashMap<String, String>,
}

impl RuntimeConfig {
    /// Build with the given port mapping and the process environment-file
    /// overrides applied on top.
    #[must_use]
    pub fn new(mapping: PortMapping) -> Self {
        let config = Self {
            port_mapping: ArcSwap::from_pointee(mapping),
            properties: DashMap::new(),
        };
        for (key, value) in load_environment_file() {
            config.properties.insert(key, value);
        }
        config
    }

    /// Snapshot of the active port mapping.
    #[must_use]
    pub fn port_mapping(&self) -> Arc<PortMapping> {
        self.port_mapping.load_full()
    }

    /// Atomically replace the port mapping.
    pub fn set_port_mapping(&self, mapping: PortMapping) {
        self.port_mapping.store(Arc::new(mapping));
    }

    /// Free-form property lookup (plugin configuration, SHM enforcement,
    /// discovery mode, ...).
    #[must_use]
    pub fn property(&self, key: &str) -> Option<String> {
        self.properties.get(key).map(|v| v.value().clone())
    }

    /// Set a property, returning any previous value.
    pub fn set_property(&self, key: &str, value: &str) -> Option<String> {
        self.properties.insert(key.to_string(), value.to_string())
    }

    /// Merge caller-provided properties (participant attributes) without
    /// overriding environment-file entries.
    pub fn merge_properties<'a, I: IntoIterator<Item = (&'a str, &'a str)>>(&self, entries: I) {
        for (key, value) in entries {
            self.properties
                .entry(key.to_string())
                .or_insert_with(|| value.to_string());
        }
    }
}

static ENV_FILE_WARNING: Once = Once::new();

/// Read the environment override file named by `SDDS_ENVIRONMENT_FILE`.
///
/// Absence of the variable is silent; an unreadable path yields exactly one
/// warning log entry per process and is otherwise ignored.
fn load_environment_file() -> Vec<(String, String)> {
    let Ok(path) = std::env::var(ENVIRONMENT_FILE_VAR) else {
        return Vec::new();
    };
    match std::fs::read_to_string(&path) {
        Ok(contents) => parse_environment_file(&contents),
        Err(err) => {
            ENV_FILE_WARNING.call_once(|| {
                log::warn!(
                    "[CONFIG] {}={} is not readable: {}; ignoring",
                    ENVIRONMENT_FILE_VAR,
                    path,
                    err
                );
            });
            Vec::new()
        }
    }
}

fn parse_environment_file(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            line.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_environment_file() {
        let parsed = parse_environment_file(
            "# comment\n\nshm.enforcement = unicast\ndiscovery.mode=client\nbroken-line\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("shm.enforcement".to_string(), "unicast".to_string()),
                ("discovery.mode".to_string(), "client".to_string()),
            ]
        );
    }

    #[test]
    fn test_runtime_config_properties() {
        let mapping = PortMapping::calculate(0, 0).expect("ports");
        let config = RuntimeConfig::new(mapping);
        assert_eq!(config.property("missing"), None);
        config.set_property("a", "1");
        assert_eq!(config.property("a"), Some("1".to_string()));
        // merge_properties does not override existing keys
        config.merge_properties([("a", "2"), ("b", "3")]);
        assert_eq!(config.property("a"), Some("1".to_string()));
        assert_eq!(config.property("b"), Some("3".to_string()));
    }

    #[test]
    fn test_port_mapping_swap() {
        let config = RuntimeConfig::new(PortMapping::calculate(0, 0).expect("ports"));
        assert_eq!(config.port_mapping().metatraffic_multicast, 7400);
        config.set_port_mapping(PortMapping::calculate(1, 0).expect("ports"));
        assert_eq!(config.port_mapping().metatraffic_multicast, 7650);
    }
}
