// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Reliable stateful writer (RTPS v2.5 Sec.8.4.9).
//!
//! Keeps a [`ReaderProxy`] per matched reader and drives the reliable
//! protocol: DATA/DATA_FRAG emission, periodic HEARTBEAT, ACKNACK
//! processing, and NACK-driven repair with GAP for changes no longer in
//! history.
//!
//! Emission passes (`flush`, `heartbeat_tick`, `repair`) build their wire
//! plan under the writer lock and send after releasing it; message
//! handlers (`process_acknack`, `process_nack_frag`) only mutate state.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::DEFAULT_FRAGMENT_SIZE;
use crate::endpoint::writer::reader_proxy::ReaderProxy;
use crate::endpoint::{EndpointAttributes, MessageSender, SendPlan};
use crate::error::{Error, Result};
use crate::history::{encapsulate_payload, ChangeKind, PoolStrategy, WriteParams, WriterHistory};
use crate::protocol::message::{
    AckNack, Data, DataFrag, Gap, Heartbeat, InfoDestination, InfoTimestamp, NackFrag, Submessage,
};
use crate::protocol::types::{Count, Guid, GuidPrefix, InstanceHandle, Locator, SequenceNumber};
use crate::qos::{DdsDuration, DurabilityKind, ReliabilityKind};

struct Inner {
    history: WriterHistory,
    proxies: HashMap<Guid, ReaderProxy>,
    heartbeat_count: Count,
    /// Sequence numbers removed from history that matched readers may
    /// still be waiting for; flushed as GAP.
    pending_gaps: Vec<SequenceNumber>,
    /// Backing store for TRANSIENT/PERSISTENT durability.
    persistence: Option<Arc<dyn crate::persistence::PersistenceService>>,
}

/// Reliable writer with per-reader ack state.
pub struct StatefulWriter {
    attrs: EndpointAttributes,
    sender: Arc<MessageSender>,
    inner: Mutex<Inner>,
    ack_cv: Condvar,
    /// Payloads larger than this are fragmented into DATA_FRAG.
    max_inline_payload: usize,
    fragment_size: u16,
}

impl StatefulWriter {
    pub fn new(attrs: EndpointAttributes, sender: Arc<MessageSender>) -> Result<Self> {
        attrs.qos.validate()?;
        let max_samples = attrs.qos.resource_limits.max_samples;
        let history = WriterHistory::new(
            attrs.guid,
            attrs.qos.history,
            max_samples,
            PoolStrategy::PreallocatedWithRealloc,
            1024,
        );
        Ok(Self {
            attrs,
            sender,
            inner: Mutex::new(Inner {
                history,
                proxies: HashMap::new(),
                heartbeat_count: 0,
                pending_gaps: Vec::new(),
                persistence: None,
            }),
            ack_cv: Condvar::new(),
            max_inline_payload: DEFAULT_FRAGMENT_SIZE as usize,
            fragment_size: DEFAULT_FRAGMENT_SIZE,
        })
    }

    /// Override the fragmentation threshold (tests, constrained links).
    pub fn set_fragmentation(&mut self, max_inline_payload: usize, fragment_size: u16) {
        self.max_inline_payload = max_inline_payload;
        self.fragment_size = fragment_size;
    }

    /// Attach a persistence service (TRANSIENT/PERSISTENT durability) and
    /// restore any history it holds for this writer.
    pub fn attach_persistence(&self, service: Arc<dyn crate::persistence::PersistenceService>) {
        let mut inner = self.inner.lock();
        for change in service.load_writer_history(self.attrs.guid) {
            inner.history.restore(change);
        }
        inner.persistence = Some(service);
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

    // ========================================================================
    // Write path
    // ========================================================================

    /// Store a new sample and push it to every matched reader.
    pub fn write(&self, user_payload: &[u8], params: WriteParams) -> Result<SequenceNumber> {
        self.write_with_kind(user_payload, ChangeKind::Alive, [0u8; 16], params)
    }

    /// Store a change with explicit kind and instance handle.
    pub fn write_with_kind(
        &self,
        user_payload: &[u8],
        kind: ChangeKind,
        instance_handle: InstanceHandle,
        params: WriteParams,
    ) -> Result<SequenceNumber> {
        let seq = {
            let mut inner = self.inner.lock();
            let outcome = inner.history.add_change(
                kind,
                instance_handle,
                encapsulate_payload(user_payload),
                params,
            )?;
            if let Some(service) = inner.persistence.clone() {
                if let Some(change) = inner.history.get(outcome.sequence_number) {
                    service.store_change(self.attrs.guid, change);
                }
                if let Some(evicted) = outcome.evicted {
                    service.remove_change(self.attrs.guid, evicted);
                }
            }
            if let Some(evicted) = outcome.evicted {
                // An overflow-evicted change may still be unacked somewhere;
                // readers that miss it get a GAP instead of a retransmit.
                for proxy in inner.proxies.values_mut() {
                    proxy.forget(evicted);
                }
                inner.pending_gaps.push(evicted);
            }
            for proxy in inner.proxies.values_mut() {
                proxy.add_unsent(outcome.sequence_number);
            }
            outcome.sequence_number
        };
        self.flush();
        Ok(seq)
    }

    /// Send every unsent change and pending GAP. A send pass iterates
    /// matched readers, fragments payloads over the threshold, and emits
    /// DATA/DATA_FRAG addressed per reader.
    pub fn flush(&self) {
        let plans = {
            let mut inner = self.inner.lock();
            self.plan_flush(&mut inner)
        };
        SendPlan::send_all(plans, &self.sender);
    }

    fn plan_flush(&self, inner: &mut Inner) -> Vec<SendPlan> {
        let mut plans = Vec::new();
        let gaps = std::mem::take(&mut inner.pending_gaps);
        let proxy_guids: Vec<Guid> = inner.proxies.keys().copied().collect();

        for guid in proxy_guids {
            let Some(proxy) = inner.proxies.get_mut(&guid) else {
                continue;
            };
            let unsent = proxy.take_unsent();
            let destinations = proxy.send_locators();
            let reader_id = proxy.guid.entity_id;
            let reader_prefix = proxy.guid.prefix;
            let needs_gap: Vec<SequenceNumber> = gaps
                .iter()
                .filter(|s| **s > proxy.highest_acked())
                .copied()
                .collect();
            if unsent.is_empty() && needs_gap.is_empty() {
                continue;
            }

            let mut submessages: Vec<Submessage> = vec![Submessage::InfoDestination(
                InfoDestination {
                    guid_prefix: reader_prefix,
                },
            )];
            for seq in unsent {
                let Some(change) = inner.history.get(seq) else {
                    continue;
                };
                submessages.push(Submessage::InfoTimestamp(InfoTimestamp {
                    timestamp: Some(change.source_timestamp),
                }));
                self.push_data_submessages(&mut submessages, reader_id, change.sequence_number, &change.serialized_payload);
            }
            for seq in needs_gap {
                submessages.push(Submessage::Gap(Gap::contiguous(
                    reader_id,
                    self.attrs.guid.entity_id,
                    seq,
                    seq + 1,
                )));
            }
            plans.push(SendPlan {
                submessages,
                destinations,
            });
        }
        plans
    }

    fn push_data_submessages(
        &self,
        out: &mut Vec<Submessage>,
        reader_id: crate::protocol::types::EntityId,
        seq: SequenceNumber,
        payload: &[u8],
    ) {
        if payload.len() <= self.max_inline_payload {
            out.push(Submessage::Data(Data {
                reader_id,
                writer_id: self.attrs.guid.entity_id,
                writer_sn: seq,
                inline_qos: None,
                payload: Some(payload.to_vec()),
                key_flag: false,
            }));
            return;
        }

        let frag_size = self.fragment_size as usize;
        let sample_size = payload.len() as u32;
        let mut start = 0usize;
        let mut frag_num = 1u32;
        while start < payload.len() {
            let end = (start + frag_size).min(payload.len());
            out.push(Submessage::DataFrag(DataFrag {
                reader_id,
                writer_id: self.attrs.guid.entity_id,
                writer_sn: seq,
                fragment_starting_num: frag_num,
                fragments_in_submessage: 1,
                fragment_size: self.fragment_size,
                sample_size,
                inline_qos: None,
                payload: payload[start..end].to_vec(),
                key_flag: false,
            }));
            start = end;
            frag_num += 1;
        }
    }

    // ========================================================================
    // Heartbeat
    // ========================================================================

    /// Periodic heartbeat pass. Best-effort writers emit nothing.
    pub fn heartbeat_tick(&self) {
        self.heartbeat(false);
    }

    /// Emit a heartbeat to every reliable matched reader. `final_flag`
    /// suppresses the solicited ACKNACK.
    pub fn heartbeat(&self, final_flag: bool) {
        if !self.is_reliable() {
            return;
        }
        let plans = {
            let mut inner = self.inner.lock();
            if inner.proxies.values().all(|p| !p.is_reliable) {
                return;
            }
            inner.heartbeat_count = inner.heartbeat_count.wrapping_add(1);
            let count = inner.heartbeat_count;
            let first_sn = inner.history.first_sequence();
            let last_sn = inner.history.last_sequence();
            inner
                .proxies
                .values()
                .filter(|p| p.is_reliable)
                .map(|proxy| SendPlan {
                    submessages: vec![
                        Submessage::InfoDestination(InfoDestination {
                            guid_prefix: proxy.guid.prefix,
                        }),
                        Submessage::Heartbeat(Heartbeat {
                            reader_id: proxy.guid.entity_id,
                            writer_id: self.attrs.guid.entity_id,
                            first_sn,
                            last_sn,
                            count,
                            final_flag,
                            liveliness_flag: false,
                        }),
                    ],
                    destinations: proxy.send_locators(),
                })
                .collect()
        };
        SendPlan::send_all(plans, &self.sender);
    }

    // ========================================================================
    // ACKNACK / NACK_FRAG processing
    // ========================================================================

    /// Handle an ACKNACK addressed to this writer.
    pub fn process_acknack(&self, source_prefix: GuidPrefix, acknack: &AckNack) {
        if !self.is_reliable() {
            // BEST_EFFORT writers ignore ACKNACKs entirely.
            return;
        }
        let base = acknack.reader_sn_state.base();
        if base <= 0 {
            log::error!(
                "[RTPS_WRITER] {} protocol error: ACKNACK base {} is not positive",
                self.attrs.guid,
                base
            );
            return;
        }

        let reader_guid = Guid::new(source_prefix, acknack.reader_id);
        let mut inner = self.inner.lock();
        let last = inner.history.last_sequence();
        if base > last + 1 {
            // The reader claims to have seen samples this writer never
            // published: ignore without touching proxy state.
            log::error!(
                "[RTPS_WRITER] {} Inconsistent acknack received from {} (base {} > last {} + 1)",
                self.attrs.guid,
                reader_guid,
                base,
                last
            );
            return;
        }

        let Some(proxy) = inner.proxies.get_mut(&reader_guid) else {
            log::debug!(
                "[RTPS_WRITER] {} ACKNACK from unmatched reader {}",
                self.attrs.guid,
                reader_guid
            );
            return;
        };

        let applied = proxy.apply_acknack(base, acknack.reader_sn_state.iter(), acknack.count);
        if applied {
            log::trace!(
                "[RTPS_WRITER] {} acknack from {}: acked<{} missing={:?} final={}",
                self.attrs.guid,
                reader_guid,
                base,
                acknack.requested(),
                acknack.final_flag
            );
        }
        drop(inner);
        // Writers blocked in wait_for_acknowledgments re-evaluate.
        self.ack_cv.notify_all();
    }

    /// Handle a NACK_FRAG: treat the whole sample as requested (the repair
    /// pass re-fragments it).
    pub fn process_nack_frag(&self, source_prefix: GuidPrefix, nack: &NackFrag) {
        if !self.is_reliable() {
            return;
        }
        let reader_guid = Guid::new(source_prefix, nack.reader_id);
        let mut inner = self.inner.lock();
        if let Some(proxy) = inner.proxies.get_mut(&reader_guid) {
            proxy.request(nack.writer_sn);
        }
    }

    // ========================================================================
    // Repair
    // ========================================================================

    /// Retransmission pass for NACKed changes. Requests from multiple
    /// readers for the same sequence within the nack-response-delay window
    /// coalesce into a single message addressed to all requesters.
    pub fn repair(&self) {
        let plans = {
            let mut inner = self.inner.lock();
            let mut requested_by: BTreeMap<SequenceNumber, Vec<Guid>> = BTreeMap::new();
            let mut locators: Vec<Locator> = Vec::new();
            let mut gap_plans: Vec<SendPlan> = Vec::new();

            let proxy_guids: Vec<Guid> = inner.proxies.keys().copied().collect();
            for guid in proxy_guids {
                let Some(proxy) = inner.proxies.get_mut(&guid) else {
                    continue;
                };
                for seq in proxy.take_requested() {
                    requested_by.entry(seq).or_default().push(guid);
                }
            }

            let mut repair_submessages: Vec<Submessage> = Vec::new();
            for (seq, requesters) in &requested_by {
                for guid in requesters {
                    if let Some(proxy) = inner.proxies.get(guid) {
                        for loc in proxy.send_locators() {
                            if !locators.contains(&loc) {
                                locators.push(loc);
                            }
                        }
                    }
                }
                match inner.history.get(*seq) {
                    Some(change) => {
                        // One retransmission serves every requester: the
                        // reader id is left unknown and the message is
                        // addressed to the union of requester locators.
                        self.push_data_submessages(
                            &mut repair_submessages,
                            crate::protocol::types::EntityId::UNKNOWN,
                            change.sequence_number,
                            &change.serialized_payload,
                        );
                    }
                    None => {
                        // Removed from history: the requesters get a GAP so
                        // their ack watermark can advance.
                        for guid in requesters {
                            if let Some(proxy) = inner.proxies.get(guid) {
                                gap_plans.push(SendPlan {
                                    submessages: vec![
                                        Submessage::InfoDestination(InfoDestination {
                                            guid_prefix: proxy.guid.prefix,
                                        }),
                                        Submessage::Gap(Gap::contiguous(
                                            proxy.guid.entity_id,
                                            self.attrs.guid.entity_id,
                                            *seq,
                                            *seq + 1,
                                        )),
                                    ],
                                    destinations: proxy.send_locators(),
                                });
                            }
                        }
                    }
                }
            }

            let mut plans = gap_plans;
            if !repair_submessages.is_empty() {
                plans.push(SendPlan {
                    submessages: repair_submessages,
                    destinations: locators,
                });
            }
            plans
        };
        SendPlan::send_all(plans, &self.sender);
    }

    // ========================================================================
    // Matching
    // ========================================================================

    /// Match a remote reader. Durable readers are queued the whole
    /// history; volatile readers only see changes published after the
    /// match and receive a GAP covering everything before it, so their
    /// ack watermark can start at the writer's current position.
    pub fn matched_reader_add(&self, mut proxy: ReaderProxy) {
        let gap_plan = {
            let mut inner = self.inner.lock();
            let mut gap_plan = None;
            if proxy.durability >= DurabilityKind::TransientLocal
                && self.attrs.qos.durability >= DurabilityKind::TransientLocal
            {
                let seqs: Vec<SequenceNumber> =
                    inner.history.iter().map(|c| c.sequence_number).collect();
                for seq in seqs {
                    proxy.add_unsent(seq);
                }
            } else {
                let last = inner.history.last_sequence();
                proxy.start_from(last);
                if last >= 1 && proxy.is_reliable {
                    gap_plan = Some(SendPlan {
                        submessages: vec![
                            Submessage::InfoDestination(InfoDestination {
                                guid_prefix: proxy.guid.prefix,
                            }),
                            Submessage::Gap(Gap::contiguous(
                                proxy.guid.entity_id,
                                self.attrs.guid.entity_id,
                                1,
                                last + 1,
                            )),
                        ],
                        destinations: proxy.send_locators(),
                    });
                }
            }
            log::debug!(
                "[RTPS_WRITER] {} matched reader {}",
                self.attrs.guid,
                proxy.guid
            );
            inner.proxies.insert(proxy.guid, proxy);
            gap_plan
        };
        if let Some(plan) = gap_plan {
            SendPlan::send_all(vec![plan], &self.sender);
        }
        self.flush();
    }

    /// Unmatch a remote reader.
    pub fn matched_reader_remove(&self, reader_guid: Guid) -> bool {
        let removed = self.inner.lock().proxies.remove(&reader_guid).is_some();
        if removed {
            log::debug!(
                "[RTPS_WRITER] {} unmatched reader {}",
                self.attrs.guid,
                reader_guid
            );
            self.ack_cv.notify_all();
        }
        removed
    }

    #[must_use]
    pub fn matched_readers(&self) -> Vec<Guid> {
        self.inner.lock().proxies.keys().copied().collect()
    }

    #[must_use]
    pub fn is_matched_to(&self, reader_guid: Guid) -> bool {
        self.inner.lock().proxies.contains_key(&reader_guid)
    }

    // ========================================================================
    // History management
    // ========================================================================

    /// Remove a change. Reliable writers refuse removal of a change not
    /// yet acknowledged by every matched reader unless `force` is set
    /// (the KEEP_LAST overflow path).
    pub fn remove_change(&self, seq: SequenceNumber, force: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        if !force && self.is_reliable() {
            let unacked = inner
                .proxies
                .values()
                .any(|p| p.is_reliable && p.highest_acked() < seq);
            if unacked {
                return Err(Error::PreconditionNotMet(format!(
                    "change {} not acknowledged by all matched readers",
                    seq
                )));
            }
        }
        if !inner.history.remove_change(seq) {
            return Err(Error::PreconditionNotMet(format!("no change {}", seq)));
        }
        for proxy in inner.proxies.values_mut() {
            proxy.forget(seq);
        }
        inner.pending_gaps.push(seq);
        Ok(())
    }

    /// Block until every matched reliable reader acknowledged every sample
    /// published before this call, or the timeout expires.
    pub fn wait_for_acknowledgments(&self, timeout: DdsDuration) -> Result<()> {
        let deadline = timeout.to_std().map(|d| Instant::now() + d);
        let mut inner = self.inner.lock();
        let observed = inner.history.last_sequence();
        loop {
            let all_acked = inner
                .proxies
                .values()
                .all(|p| !p.has_unacked(observed));
            if all_acked {
                return Ok(());
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::Timeout);
                    }
                    if self
                        .ack_cv
                        .wait_for(&mut inner, deadline - now)
                        .timed_out()
                    {
                        // Loop re-checks; a race between timeout and notify
                        // resolves in favor of the ack state.
                    }
                }
                None => self.ack_cv.wait(&mut inner),
            }
        }
    }

    /// Whether `seq` has been acknowledged by every reliable matched
    /// reader.
    #[must_use]
    pub fn is_acked_by_all(&self, seq: SequenceNumber) -> bool {
        self.inner
            .lock()
            .proxies
            .values()
            .all(|p| !p.is_reliable || p.highest_acked() >= seq)
    }

    #[must_use]
    pub fn last_sequence(&self) -> SequenceNumber {
        self.inner.lock().history.last_sequence()
    }

    #[must_use]
    pub fn history_len(&self) -> usize {
        self.inner.lock().history.len()
    }

    /// Highest-acked watermark of one matched reader (observability).
    #[must_use]
    pub fn reader_ack_watermark(&self, reader_guid: Guid) -> Option<SequenceNumber> {
        self.inner
            .lock()
            .proxies
            .get(&reader_guid)
            .map(|p| p.highest_acked())
    }

    /// Drive a periodic pass: flush unsent data and pending gaps, then
    /// heartbeat.
    pub fn periodic_tick(&self) {
        self.flush();
        self.repair();
        self.heartbeat_tick();
    }
}
