// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Reliable stateful reader (RTPS v2.5 Sec.8.4.10).
//!
//! Keeps a [`WriterProxy`] per matched writer and drives the reader side
//! of the reliable protocol: in-order commit to the history, HEARTBEAT
//! bookkeeping, GAP handling, fragment reassembly, and rate-limited
//! ACKNACK emission.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::FRAGMENT_TIMEOUT_MS;
use crate::endpoint::{EndpointAttributes, MessageSender, SendPlan};
use crate::error::Result;
use crate::history::{CacheChange, ChangeKind, ReaderHistory, WriteParams};
use crate::protocol::constants::{
    PID_KEY_HASH, PID_STATUS_INFO, STATUS_INFO_DISPOSED, STATUS_INFO_UNREGISTERED,
};
use crate::protocol::message::{
    AckNack, Data, DataFrag, Gap, Heartbeat, InfoDestination, SequenceNumberSet, Submessage,
};
use crate::protocol::types::{Guid, GuidPrefix, InstanceHandle, SequenceNumber, Time};
use crate::qos::ReliabilityKind;

use super::writer_proxy::WriterProxy;

struct Inner {
    history: ReaderHistory,
    proxies: HashMap<Guid, WriterProxy>,
}

/// Reliable reader with per-writer proxy state.
pub struct StatefulReader {
    attrs: EndpointAttributes,
    sender: Arc<MessageSender>,
    inner: Mutex<Inner>,
    /// Invoked after new samples become available (listener dispatch).
    on_data_available: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
    /// Invoked for every sample a GAP declared unobtainable before it was
    /// ever received.
    on_sample_lost: Mutex<Option<Box<dyn Fn(Guid, SequenceNumber) + Send + Sync>>>,
    /// Instant of the last sample handed to the history (deadline QoS).
    last_sample_at: Mutex<std::time::Instant>,
}

impl StatefulReader {
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
                proxies: HashMap::new(),
            }),
            on_data_available: Mutex::new(None),
            on_sample_lost: Mutex::new(None),
            last_sample_at: Mutex::new(std::time::Instant::now()),
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

    #[must_use]
    pub fn is_reliable(&self) -> bool {
        self.attrs.qos.reliability.kind == ReliabilityKind::Reliable
    }

    /// Install the data-available hook (participant listener dispatch).
    pub fn set_data_available_hook<F: Fn() + Send + Sync + 'static>(&self, hook: F) {
        *self.on_data_available.lock() = Some(Box::new(hook));
    }

    /// Install the sample-lost hook (participant listener dispatch).
    pub fn set_sample_lost_hook<F: Fn(Guid, SequenceNumber) + Send + Sync + 'static>(
        &self,
        hook: F,
    ) {
        *self.on_sample_lost.lock() = Some(Box::new(hook));
    }

    fn notify_data_available(&self) {
        *self.last_sample_at.lock() = std::time::Instant::now();
        if let Some(hook) = self.on_data_available.lock().as_ref() {
            hook();
        }
    }

    /// Whether the deadline period elapsed without a sample. Reporting
    /// resets the clock, so each miss is reported once per period.
    pub fn take_deadline_miss(&self) -> bool {
        let Some(period) = self.attrs.qos.deadline.period.to_std() else {
            return false; // infinite deadline never misses
        };
        let mut last = self.last_sample_at.lock();
        if self.inner.lock().proxies.is_empty() {
            return false;
        }
        if last.elapsed() > period {
            *last = std::time::Instant::now();
            true
        } else {
            false
        }
    }

    // ========================================================================
    // Matching
    // ========================================================================

    pub fn matched_writer_add(&self, proxy: WriterProxy) {
        log::debug!(
            "[RTPS_READER] {} matched writer {}",
            self.attrs.guid,
            proxy.guid
        );
        self.inner.lock().proxies.insert(proxy.guid, proxy);
    }

    /// Unmatch a writer; its undelivered history is dropped with it.
    pub fn matched_writer_remove(&self, writer_guid: Guid) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.proxies.remove(&writer_guid).is_some();
        if removed {
            inner.history.remove_writer_changes(writer_guid);
            log::debug!(
                "[RTPS_READER] {} unmatched writer {}",
                self.attrs.guid,
                writer_guid
            );
        }
        removed
    }

    #[must_use]
    pub fn matched_writers(&self) -> Vec<Guid> {
        self.inner.lock().proxies.keys().copied().collect()
    }

    #[must_use]
    pub fn is_matched_to(&self, writer_guid: Guid) -> bool {
        self.inner.lock().proxies.contains_key(&writer_guid)
    }

    // ========================================================================
    // Submessage processing (mutate only; no sends)
    // ========================================================================

    /// Handle a DATA submessage addressed to this reader.
    pub fn process_data(
        &self,
        source_prefix: GuidPrefix,
        data: &Data,
        source_timestamp: Option<Time>,
    ) {
        let writer_guid = Guid::new(source_prefix, data.writer_id);
        let change = match Self::change_from_data(writer_guid, data, source_timestamp) {
            Some(change) => change,
            None => return,
        };

        let mut delivered = false;
        {
            let mut inner = self.inner.lock();
            let Some(proxy) = inner.proxies.get_mut(&writer_guid) else {
                log::trace!(
                    "[RTPS_READER] {} DATA from unmatched writer {}",
                    self.attrs.guid,
                    writer_guid
                );
                return;
            };
            let released = proxy.record_data(change);
            for change in released {
                if inner.history.received_change(change) {
                    delivered = true;
                }
            }
        }
        if delivered {
            self.notify_data_available();
        }
    }

    fn change_from_data(
        writer_guid: Guid,
        data: &Data,
        source_timestamp: Option<Time>,
    ) -> Option<CacheChange> {
        let mut kind = ChangeKind::Alive;
        let mut instance_handle: InstanceHandle = [0u8; 16];
        if let Some(qos) = &data.inline_qos {
            if let Some(status) = qos.get(PID_STATUS_INFO) {
                // STATUS_INFO is big-endian on the wire regardless of the
                // submessage endianness flag.
                let flags = status.as_u32(false).unwrap_or(0);
                if flags & STATUS_INFO_DISPOSED != 0 {
                    kind = ChangeKind::NotAliveDisposed;
                } else if flags & STATUS_INFO_UNREGISTERED != 0 {
                    kind = ChangeKind::NotAliveUnregistered;
                }
            }
            if let Some(key_hash) = qos.get(PID_KEY_HASH) {
                if key_hash.value.len() >= 16 {
                    instance_handle.copy_from_slice(&key_hash.value[..16]);
                }
            }
        }
        Some(CacheChange {
            kind,
            writer_guid,
            instance_handle,
            sequence_number: data.writer_sn,
            source_timestamp: source_timestamp.unwrap_or_else(Time::now),
            serialized_payload: data.payload.clone().unwrap_or_default(),
            write_params: WriteParams::default(),
        })
    }

    /// Handle a DATA_FRAG submessage; a completed reassembly is processed
    /// like a DATA.
    pub fn process_data_frag(
        &self,
        source_prefix: GuidPrefix,
        frag: &DataFrag,
        source_timestamp: Option<Time>,
    ) {
        let writer_guid = Guid::new(source_prefix, frag.writer_id);
        let mut delivered = false;
        {
            let mut inner = self.inner.lock();
            let Some(proxy) = inner.proxies.get_mut(&writer_guid) else {
                return;
            };
            if frag.writer_sn <= proxy.delivered_below() {
                return; // stale sample
            }
            let assembly =
                proxy.fragment_assembly(frag.writer_sn, frag.sample_size, frag.fragment_size);
            let Some(payload) = assembly.insert(frag) else {
                return;
            };
            proxy.clear_fragment_assembly(frag.writer_sn);

            let change = CacheChange {
                kind: ChangeKind::Alive,
                writer_guid,
                instance_handle: [0u8; 16],
                sequence_number: frag.writer_sn,
                source_timestamp: source_timestamp.unwrap_or_else(Time::now),
                serialized_payload: payload,
                write_params: WriteParams::default(),
            };
            let released = proxy.record_data(change);
            for change in released {
                if inner.history.received_change(change) {
                    delivered = true;
                }
            }
        }
        if delivered {
            self.notify_data_available();
        }
    }

    /// Handle a HEARTBEAT: update first/last, mark missing, reset the
    /// writer lease. The response (if due) is emitted by `acknack_tick`.
    pub fn process_heartbeat(&self, source_prefix: GuidPrefix, heartbeat: &Heartbeat) {
        let writer_guid = Guid::new(source_prefix, heartbeat.writer_id);
        let mut delivered = false;
        {
            let mut inner = self.inner.lock();
            let Some(proxy) = inner.proxies.get_mut(&writer_guid) else {
                return;
            };
            let Some(released) =
                proxy.record_heartbeat(heartbeat.first_sn, heartbeat.last_sn, heartbeat.count)
            else {
                return;
            };
            if heartbeat.final_flag && proxy.missing_sequences().is_empty() {
                // A final heartbeat with nothing missing needs no response.
                proxy.mark_acknack_sent();
            }
            for change in released {
                if inner.history.received_change(change) {
                    delivered = true;
                }
            }
        }
        if delivered {
            self.notify_data_available();
        }
    }

    /// Handle a GAP: the range will never be supplied; holes close and
    /// the ack watermark can advance. Every gapped sample that was never
    /// received counts as lost.
    pub fn process_gap(&self, source_prefix: GuidPrefix, gap: &Gap) {
        let writer_guid = Guid::new(source_prefix, gap.writer_id);
        let mut delivered = false;
        let mut lost: Vec<SequenceNumber> = Vec::new();
        {
            let mut inner = self.inner.lock();
            let Some(proxy) = inner.proxies.get_mut(&writer_guid) else {
                return;
            };
            for seq in gap.irrelevant_sequences() {
                if seq > proxy.delivered_below() && !proxy.is_pending(seq) {
                    lost.push(seq);
                }
            }
            let released = proxy.record_gap(gap.irrelevant_sequences());
            for change in released {
                if inner.history.received_change(change) {
                    delivered = true;
                }
            }
        }
        if !lost.is_empty() {
            if let Some(hook) = self.on_sample_lost.lock().as_ref() {
                for seq in &lost {
                    hook(writer_guid, *seq);
                }
            }
        }
        if delivered {
            self.notify_data_available();
        }
    }

    // ========================================================================
    // Emission pass
    // ========================================================================

    /// Send due ACKNACKs: one per writer proxy whose latest heartbeat
    /// count has not been answered yet. Best-effort readers never emit.
    pub fn acknack_tick(&self) {
        if !self.is_reliable() {
            return;
        }
        let plans = {
            let mut inner = self.inner.lock();
            let reader_id = self.attrs.guid.entity_id;
            let mut plans = Vec::new();
            for proxy in inner.proxies.values_mut() {
                let Some(count) = proxy.acknack_due() else {
                    continue;
                };
                let missing = proxy.missing_sequences();
                let mut set = SequenceNumberSet::new(proxy.acknack_base());
                for seq in &missing {
                    set.insert(*seq);
                }
                // Final set exactly when nothing is missing.
                let acknack = AckNack {
                    reader_id,
                    writer_id: proxy.guid.entity_id,
                    reader_sn_state: set,
                    count,
                    final_flag: missing.is_empty(),
                };
                proxy.mark_acknack_sent();
                plans.push(SendPlan {
                    submessages: vec![
                        Submessage::InfoDestination(InfoDestination {
                            guid_prefix: proxy.guid.prefix,
                        }),
                        Submessage::AckNack(acknack),
                    ],
                    destinations: proxy.send_locators(),
                });
            }
            plans
        };
        SendPlan::send_all(plans, &self.sender);
    }

    /// Evict fragment assemblies that outlived the reassembly timeout.
    pub fn fragment_cleanup_tick(&self) {
        let timeout = Duration::from_millis(FRAGMENT_TIMEOUT_MS);
        let mut inner = self.inner.lock();
        for proxy in inner.proxies.values_mut() {
            let evicted = proxy.evict_stale_fragments(timeout);
            if evicted > 0 {
                log::debug!(
                    "[RTPS_READER] {} evicted {} stale fragment assemblies from {}",
                    self.attrs.guid,
                    evicted,
                    proxy.guid
                );
            }
        }
    }

    /// Writers whose lease expired since the last check; their proxies
    /// flip to not-alive.
    pub fn check_writer_liveliness(&self, lease: Duration) -> Vec<Guid> {
        let mut inner = self.inner.lock();
        let mut dead = Vec::new();
        for proxy in inner.proxies.values_mut() {
            if proxy.state() != super::writer_proxy::WriterProxyState::NotAlive
                && proxy.last_activity.elapsed() > lease
            {
                proxy.set_not_alive();
                dead.push(proxy.guid);
            }
        }
        dead
    }

    // ========================================================================
    // Application surface
    // ========================================================================

    /// Take every available sample in delivery order.
    pub fn take(&self) -> Vec<CacheChange> {
        self.inner.lock().history.take_all()
    }

    /// Samples currently available without removing them (count only).
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.lock().history.len()
    }

    /// Ack watermark advertised toward one writer (observability/tests).
    #[must_use]
    pub fn ack_watermark(&self, writer_guid: Guid) -> Option<SequenceNumber> {
        self.inner
            .lock()
            .proxies
            .get(&writer_guid)
            .map(|p| p.delivered_below())
    }
}
