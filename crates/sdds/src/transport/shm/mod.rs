// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Shared-memory transport: single-host fast path over a ring of
//! fixed-size segments.
//!
//! The locator `address` encodes the destination segment id and `port` the
//! enqueue port within it. Readers create and memory-map their segment;
//! writers map it by name and enqueue a descriptor copy.
//!
//! Metatraffic enforcement (`none` | `unicast` | `all`) decides whether
//! discovery messages are forced onto (or kept off) SHM; the participant
//! consults it when assembling metatraffic locator lists.

#[cfg(target_os = "linux")]
mod ring;
#[cfg(target_os = "linux")]
mod segment;

#[cfg(target_os = "linux")]
pub use ring::{segment_size, ShmRing};
#[cfg(target_os = "linux")]
pub use segment::{segment_name, ShmSegment};

/// Whether metatraffic is forced onto or kept off SHM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetatrafficEnforcement {
    /// SHM participates like any other transport.
    #[default]
    None,
    /// Metatraffic unicast is forced onto SHM.
    Unicast,
    /// All metatraffic (unicast and multicast) is forced onto SHM.
    All,
}

impl MetatrafficEnforcement {
    /// Parse the property value (`none` | `unicast` | `all`). Unknown
    /// values fall back to `None` with a warning.
    #[must_use]
    pub fn from_property(value: &str) -> Self {
        match value {
            "none" => Self::None,
            "unicast" => Self::Unicast,
            "all" => Self::All,
            other => {
                log::warn!(
                    "[SHM] unknown metatraffic enforcement '{}', using 'none'",
                    other
                );
                Self::None
            }
        }
    }
}

#[cfg(target_os = "linux")]
mod transport_impl {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread::JoinHandle;
    use std::time::{Duration, Instant};

    use dashmap::DashMap;
    use parking_lot::Mutex;

    use super::ring::{segment_size, ShmRing};
    use super::segment::ShmSegment;
    use super::MetatrafficEnforcement;
    use crate::error::{Error, Result};
    use crate::protocol::types::{Locator, LOCATOR_KIND_SHM};
    use crate::transport::{PacketReceiver, Transport};

    /// SHM transport descriptor knobs.
    #[derive(Debug, Clone)]
    pub struct ShmTransportConfig {
        /// Slots per ring.
        pub ring_capacity: u32,
        /// Bytes per slot (maximum message size over SHM).
        pub slot_size: u32,
        /// Poll interval of the reader thread.
        pub poll_interval: Duration,
        /// Discovery-traffic enforcement.
        pub metatraffic_enforcement: MetatrafficEnforcement,
    }

    impl Default for ShmTransportConfig {
        fn default() -> Self {
            Self {
                ring_capacity: 128,
                slot_size: 65_536,
                poll_interval: Duration::from_millis(1),
                metatraffic_enforcement: MetatrafficEnforcement::None,
            }
        }
    }

    struct InputChannel {
        shutdown: Arc<AtomicBool>,
        thread: Option<JoinHandle<()>>,
    }

    /// Shared-memory transport.
    pub struct ShmTransport {
        config: ShmTransportConfig,
        inputs: Mutex<std::collections::HashMap<(u32, u32), InputChannel>>,
        /// Cached writer-side mappings keyed by segment id.
        outputs: DashMap<u32, Arc<ShmSegment>>,
    }

    impl ShmTransport {
        #[must_use]
        pub fn new(config: ShmTransportConfig) -> Self {
            Self {
                config,
                inputs: Mutex::new(std::collections::HashMap::new()),
                outputs: DashMap::new(),
            }
        }

        #[must_use]
        pub fn metatraffic_enforcement(&self) -> MetatrafficEnforcement {
            self.config.metatraffic_enforcement
        }

        fn output_segment(&self, segment_id: u32) -> Result<Arc<ShmSegment>> {
            if let Some(seg) = self.outputs.get(&segment_id) {
                return Ok(seg.clone());
            }
            let seg = Arc::new(ShmSegment::open(
                segment_id,
                segment_size(self.config.ring_capacity, self.config.slot_size),
            )?);
            self.outputs.insert(segment_id, seg.clone());
            Ok(seg)
        }
    }

    impl Transport for ShmTransport {
        fn kind(&self) -> i32 {
            LOCATOR_KIND_SHM
        }

        fn open_input_channel(
            &self,
            locator: &Locator,
            receiver: Arc<dyn PacketReceiver>,
        ) -> Result<()> {
            if !self.supports(locator) {
                return Err(Error::Unsupported("locator kind mismatch"));
            }
            let key = (locator.shm_segment_id(), locator.port);
            let mut inputs = self.inputs.lock();
            if inputs.contains_key(&key) {
                return Ok(());
            }

            let segment = ShmSegment::create(
                key.0,
                segment_size(self.config.ring_capacity, self.config.slot_size),
            )?;
            if ShmRing::init(&segment, self.config.ring_capacity, self.config.slot_size).is_none() {
                return Err(Error::OutOfResources("segment too small for ring".into()));
            }

            let shutdown = Arc::new(AtomicBool::new(false));
            let thread_shutdown = shutdown.clone();
            let destination = *locator;
            let slot_size = self.config.slot_size as usize;
            let poll_interval = self.config.poll_interval;

            let thread = std::thread::Builder::new()
                .name(format!("sdds.shm.rx.{:08x}", key.0))
                .spawn(move || {
                    let Some(ring) = ShmRing::attach(&segment) else {
                        log::warn!("[SHM] ring header vanished under reader");
                        return;
                    };
                    let mut buf = vec![0u8; slot_size];
                    let source = destination;
                    while !thread_shutdown.load(Ordering::Acquire) {
                        match ring.pop(&mut buf) {
                            Some(len) => {
                                receiver.on_packet(&buf[..len], &source, &destination);
                            }
                            None => std::thread::sleep(poll_interval),
                        }
                    }
                })
                .map_err(Error::Io)?;

            inputs.insert(
                key,
                InputChannel {
                    shutdown,
                    thread: Some(thread),
                },
            );
            log::debug!("[SHM] input channel open on {}", locator);
            Ok(())
        }

        fn close_input_channel(&self, locator: &Locator) -> Result<()> {
            let key = (locator.shm_segment_id(), locator.port);
            let channel = self.inputs.lock().remove(&key);
            match channel {
                Some(mut channel) => {
                    channel.shutdown.store(true, Ordering::Release);
                    if let Some(thread) = channel.thread.take() {
                        let _ = thread.join();
                    }
                    Ok(())
                }
                None => Err(Error::PreconditionNotMet(format!(
                    "no input channel at {}",
                    locator
                ))),
            }
        }

        fn open_output_channel(&self, locator: &Locator) -> Result<()> {
            // Mapping happens lazily on the first send; a present segment
            // validates the locator early.
            self.output_segment(locator.shm_segment_id()).map(|_| ())
        }

        fn send(&self, buf: &[u8], destinations: &[Locator], _deadline: Option<Instant>) -> bool {
            let mut any = false;
            for dest in destinations {
                let segment_id = dest.shm_segment_id();
                let segment = match self.output_segment(segment_id) {
                    Ok(seg) => seg,
                    Err(e) => {
                        // Segment gone: peer died; drop the cached mapping.
                        log::warn!("[SHM] segment {:08x} unavailable: {}", segment_id, e);
                        self.outputs.remove(&segment_id);
                        continue;
                    }
                };
                match ShmRing::attach(&segment) {
                    Some(ring) => {
                        if ring.push(buf) {
                            any = true;
                        } else {
                            log::warn!("[SHM] ring {:08x} full, message dropped", segment_id);
                        }
                    }
                    None => {
                        self.outputs.remove(&segment_id);
                    }
                }
            }
            any
        }

        fn transform_remote_locator(&self, _remote: &Locator) -> Option<Locator> {
            None
        }

        fn shutdown(&self) {
            let keys: Vec<(u32, u32)> = self.inputs.lock().keys().copied().collect();
            for (segment_id, port) in keys {
                let _ = self.close_input_channel(&Locator::shm(segment_id, port));
            }
            self.outputs.clear();
        }
    }

}

#[cfg(target_os = "linux")]
pub use transport_impl::{ShmTransport, ShmTransportConfig};

// Stub for non-Linux platforms: public types exist, construction fails.
#[cfg(not(target_os = "linux"))]
mod transport_impl {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::MetatrafficEnforcement;
    use crate::error::{Error, Result};
    use crate::protocol::types::{Locator, LOCATOR_KIND_SHM};
    use crate::transport::{PacketReceiver, Transport};

    /// SHM transport descriptor knobs (stub).
    #[derive(Debug, Clone)]
    pub struct ShmTransportConfig {
        pub ring_capacity: u32,
        pub slot_size: u32,
        pub poll_interval: Duration,
        pub metatraffic_enforcement: MetatrafficEnforcement,
    }

    impl Default for ShmTransportConfig {
        fn default() -> Self {
            Self {
                ring_capacity: 128,
                slot_size: 65_536,
                poll_interval: Duration::from_millis(1),
                metatraffic_enforcement: MetatrafficEnforcement::None,
            }
        }
    }

    /// SHM is Linux-only; this stub keeps downstream code compiling.
    pub struct ShmTransport;

    impl ShmTransport {
        #[must_use]
        pub fn new(_config: ShmTransportConfig) -> Self {
            Self
        }

        #[must_use]
        pub fn metatraffic_enforcement(&self) -> MetatrafficEnforcement {
            MetatrafficEnforcement::None
        }
    }

    impl Transport for ShmTransport {
        fn kind(&self) -> i32 {
            LOCATOR_KIND_SHM
        }

        fn open_input_channel(
            &self,
            _locator: &Locator,
            _receiver: Arc<dyn PacketReceiver>,
        ) -> Result<()> {
            Err(Error::Unsupported("SHM transport is Linux-only"))
        }

        fn close_input_channel(&self, _locator: &Locator) -> Result<()> {
            Err(Error::Unsupported("SHM transport is Linux-only"))
        }

        fn open_output_channel(&self, _locator: &Locator) -> Result<()> {
            Err(Error::Unsupported("SHM transport is Linux-only"))
        }

        fn send(&self, _buf: &[u8], _destinations: &[Locator], _deadline: Option<Instant>) -> bool {
            false
        }

        fn transform_remote_locator(&self, _remote: &Locator) -> Option<Locator> {
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub use transport_impl::{ShmTransport, ShmTransportConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enforcement_parse() {
        assert_eq!(
            MetatrafficEnforcement::from_property("none"),
            MetatrafficEnforcement::None
        );
        assert_eq!(
            MetatrafficEnforcement::from_property("unicast"),
            MetatrafficEnforcement::Unicast
        );
        assert_eq!(
            MetatrafficEnforcement::from_property("all"),
            MetatrafficEnforcement::All
        );
        assert_eq!(
            MetatrafficEnforcement::from_property("bogus"),
            MetatrafficEnforcement::None
        );
    }
}
