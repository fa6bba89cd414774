// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Per-matched-writer state kept by a stateful reader.
//!
//! The proxy tracks which sequence numbers have been received, which are
//! missing below the highest known, and the heartbeat/acknack handshake
//! state. Samples are released to the history strictly in sequence order:
//! sample `n` is held until every earlier sample was received or GAPped.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use crate::history::CacheChange;
use crate::protocol::message::MAX_BITMAP_BITS;
use crate::protocol::types::{Count, Guid, Locator, SequenceNumber};

use super::fragment::FragmentAssembly;

/// Liveliness/ack state machine of one matched writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterProxyState {
    /// No traffic from the writer yet (or lease expired).
    NotAlive,
    /// Alive, nothing outstanding.
    AliveWaiting,
    /// Alive with missing samples being repaired.
    AliveProcessing,
}

/// Received-sequence bookkeeping for one matched writer.
pub struct WriterProxy {
    pub guid: Guid,
    pub unicast_locators: Vec<Locator>,
    pub multicast_locators: Vec<Locator>,
    /// Reliable pairs hold out-of-order samples until holes close; a
    /// best-effort pair advances the watermark over losses.
    pub is_reliable: bool,
    /// Everything at or below this is received, delivered, or irrelevant.
    delivered_below: SequenceNumber,
    /// Received out of order, waiting for earlier holes to close.
    pending: BTreeMap<SequenceNumber, CacheChange>,
    /// Declared irrelevant by GAP, above `delivered_below`.
    irrelevant: BTreeSet<SequenceNumber>,
    /// Highest first/last announced by HEARTBEAT.
    hb_first: SequenceNumber,
    hb_last: SequenceNumber,
    /// Newest heartbeat count seen (duplicate suppression).
    last_hb_count: Option<Count>,
    /// Heartbeat count already answered with an ACKNACK (rate limiting:
    /// at most one response per heartbeat count).
    responded_hb_count: Option<Count>,
    /// Writer lease bookkeeping; any submessage from the writer resets it.
    pub last_activity: Instant,
    state: WriterProxyState,
    /// In-progress fragment reassembly per sequence number.
    frags: HashMap<SequenceNumber, FragmentAssembly>,
}

impl WriterProxy {
    #[must_use]
    pub fn new(
        guid: Guid,
        unicast_locators: Vec<Locator>,
        multicast_locators: Vec<Locator>,
        is_reliable: bool,
    ) -> Self {
        Self {
            guid,
            unicast_locators,
            multicast_locators,
            is_reliable,
            delivered_below: 0,
            pending: BTreeMap::new(),
            irrelevant: BTreeSet::new(),
            hb_first: 1,
            hb_last: 0,
            last_hb_count: None,
            responded_hb_count: None,
            last_activity: Instant::now(),
            state: WriterProxyState::NotAlive,
            frags: HashMap::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> WriterProxyState {
        self.state
    }

    /// Locators an ACKNACK should target.
    #[must_use]
    pub fn send_locators(&self) -> Vec<Locator> {
        if self.unicast_locators.is_empty() {
            self.multicast_locators.clone()
        } else {
            self.unicast_locators.clone()
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
        if self.state == WriterProxyState::NotAlive {
            self.state = WriterProxyState::AliveWaiting;
        }
    }

    /// Record a received sample. Returns the changes that became
    /// deliverable, in sequence order.
    pub fn record_data(&mut self, change: CacheChange) -> Vec<CacheChange> {
        self.touch();
        let seq = change.sequence_number;
        if seq <= self.delivered_below || self.pending.contains_key(&seq) {
            return Vec::new(); // duplicate or stale
        }
        if self.irrelevant.contains(&seq) {
            // The writer GAPped it and then supplied it anyway; the GAP
            // wins, the sample is stale.
            return Vec::new();
        }

        if seq > self.hb_last {
            self.hb_last = seq;
        }

        if !self.is_reliable {
            // Best-effort pair: losses are accepted, late samples dropped.
            self.delivered_below = seq;
            return vec![change];
        }

        self.pending.insert(seq, change);
        self.drain_contiguous()
    }

    /// Record a GAP: the ranges will never be supplied; holes close and
    /// the watermark may advance.
    pub fn record_gap<I: IntoIterator<Item = SequenceNumber>>(
        &mut self,
        seqs: I,
    ) -> Vec<CacheChange> {
        self.touch();
        for seq in seqs {
            if seq > self.delivered_below {
                self.irrelevant.insert(seq);
            }
        }
        self.drain_contiguous()
    }

    /// Record a HEARTBEAT. `None` when the count is a replay; otherwise
    /// the changes that became deliverable (a heartbeat can close holes
    /// when its `first` moves past lost history).
    pub fn record_heartbeat(
        &mut self,
        first_sn: SequenceNumber,
        last_sn: SequenceNumber,
        count: Count,
    ) -> Option<Vec<CacheChange>> {
        self.touch();
        if let Some(last) = self.last_hb_count {
            // Counts only move forward; replays are ignored.
            if count <= last {
                return None;
            }
        }
        self.last_hb_count = Some(count);
        self.hb_first = first_sn;
        if last_sn > self.hb_last {
            self.hb_last = last_sn;
        }
        // Samples below the writer's first are gone for good; stop
        // waiting for them.
        if first_sn > self.delivered_below + 1 {
            for seq in (self.delivered_below + 1)..first_sn {
                self.irrelevant.insert(seq);
            }
        }
        Some(self.drain_contiguous())
    }

    fn drain_contiguous(&mut self) -> Vec<CacheChange> {
        let mut released = Vec::new();
        loop {
            let next = self.delivered_below + 1;
            if let Some(change) = self.pending.remove(&next) {
                self.delivered_below = next;
                released.push(change);
            } else if self.irrelevant.remove(&next) {
                self.delivered_below = next;
            } else {
                break;
            }
        }
        self.state = if self.missing_sequences().is_empty() {
            WriterProxyState::AliveWaiting
        } else {
            WriterProxyState::AliveProcessing
        };
        released
    }

    /// Missing sequence numbers: holes in `(delivered_below, hb_last]`
    /// that are neither pending nor irrelevant. Bounded by the ACKNACK
    /// bitmap capacity.
    #[must_use]
    pub fn missing_sequences(&self) -> Vec<SequenceNumber> {
        let mut missing = Vec::new();
        let start = self.delivered_below + 1;
        let end = self.hb_last.min(start + i64::from(MAX_BITMAP_BITS) - 1);
        for seq in start..=end {
            if !self.pending.contains_key(&seq) && !self.irrelevant.contains(&seq) {
                missing.push(seq);
            }
        }
        missing
    }

    /// Whether a sequence number was received but is still waiting for
    /// earlier holes to close.
    #[must_use]
    pub fn is_pending(&self, seq: SequenceNumber) -> bool {
        self.pending.contains_key(&seq)
    }

    /// Base of the next ACKNACK: everything strictly below is accounted
    /// for.
    #[must_use]
    pub fn acknack_base(&self) -> SequenceNumber {
        self.delivered_below + 1
    }

    /// Heartbeat count to answer, respecting one-response-per-count.
    #[must_use]
    pub fn acknack_due(&self) -> Option<Count> {
        let count = self.last_hb_count?;
        if self.responded_hb_count == Some(count) {
            None
        } else {
            Some(count)
        }
    }

    /// Mark the current heartbeat count answered.
    pub fn mark_acknack_sent(&mut self) {
        self.responded_hb_count = self.last_hb_count;
    }

    #[must_use]
    pub fn delivered_below(&self) -> SequenceNumber {
        self.delivered_below
    }

    /// Mark the proxy dead (lease expired). Pending samples stay until
    /// the proxy is removed.
    pub fn set_not_alive(&mut self) {
        self.state = WriterProxyState::NotAlive;
    }

    // ------------------------------------------------------------------
    // Fragmentation
    // ------------------------------------------------------------------

    /// Fragment reassembly slot for a sequence number.
    pub fn fragment_assembly(
        &mut self,
        seq: SequenceNumber,
        sample_size: u32,
        fragment_size: u16,
    ) -> &mut FragmentAssembly {
        self.touch();
        self.frags
            .entry(seq)
            .or_insert_with(|| FragmentAssembly::new(sample_size, fragment_size))
    }

    /// Drop the assembly once complete or abandoned.
    pub fn clear_fragment_assembly(&mut self, seq: SequenceNumber) {
        self.frags.remove(&seq);
    }

    /// Evict assemblies older than the reassembly timeout.
    pub fn evict_stale_fragments(&mut self, timeout: std::time::Duration) -> usize {
        let before = self.frags.len();
        self.frags.retain(|_, asm| !asm.expired(timeout));
        before - self.frags.len()
    }
}
