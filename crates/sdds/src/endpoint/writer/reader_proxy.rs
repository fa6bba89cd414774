// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Per-matched-reader state kept by a stateful writer.

use std::collections::BTreeSet;
use std::time::Instant;

use crate::protocol::types::{Count, Guid, Locator, SequenceNumber};
use crate::qos::DurabilityKind;

/// Ack/nack bookkeeping for one matched reader.
#[derive(Debug, Clone)]
pub struct ReaderProxy {
    pub guid: Guid,
    pub unicast_locators: Vec<Locator>,
    pub multicast_locators: Vec<Locator>,
    pub expects_inline_qos: bool,
    pub is_reliable: bool,
    pub durability: DurabilityKind,
    /// Highest sequence number known acknowledged; everything at or below
    /// it needs no further attention.
    highest_acked: SequenceNumber,
    /// Changes the reader has not been sent yet.
    unsent: BTreeSet<SequenceNumber>,
    /// Changes the reader explicitly NACKed.
    requested: BTreeSet<SequenceNumber>,
    /// Count of the last ACKNACK processed (duplicate suppression).
    last_acknack_count: Option<Count>,
    /// When the most recent NACK arrived (repair coalescing window).
    pub last_nack_at: Option<Instant>,
}

impl ReaderProxy {
    #[must_use]
    pub fn new(
        guid: Guid,
        unicast_locators: Vec<Locator>,
        multicast_locators: Vec<Locator>,
        is_reliable: bool,
        durability: DurabilityKind,
    ) -> Self {
        Self {
            guid,
            unicast_locators,
            multicast_locators,
            expects_inline_qos: false,
            is_reliable,
            durability,
            highest_acked: 0,
            unsent: BTreeSet::new(),
            requested: BTreeSet::new(),
            last_acknack_count: None,
            last_nack_at: None,
        }
    }

    /// Locators a repair or data send should target.
    #[must_use]
    pub fn send_locators(&self) -> Vec<Locator> {
        if self.unicast_locators.is_empty() {
            self.multicast_locators.clone()
        } else {
            self.unicast_locators.clone()
        }
    }

    /// Queue a fresh change for this reader.
    pub fn add_unsent(&mut self, seq: SequenceNumber) {
        if seq > self.highest_acked {
            self.unsent.insert(seq);
        }
    }

    /// Take every unsent change (they move to the implicit
    /// sent-but-unacked state).
    pub fn take_unsent(&mut self) -> Vec<SequenceNumber> {
        let drained: Vec<SequenceNumber> = self.unsent.iter().copied().collect();
        self.unsent.clear();
        drained
    }

    /// Take every requested change for a repair pass.
    pub fn take_requested(&mut self) -> Vec<SequenceNumber> {
        let drained: Vec<SequenceNumber> = self.requested.iter().copied().collect();
        self.requested.clear();
        drained
    }

    /// Apply an ACKNACK: advance the watermark to `base - 1` and record
    /// the NACKed set. Returns `false` when the count is a duplicate.
    pub fn apply_acknack<I: IntoIterator<Item = SequenceNumber>>(
        &mut self,
        base: SequenceNumber,
        missing: I,
        count: Count,
    ) -> bool {
        if self.last_acknack_count == Some(count) {
            return false;
        }
        self.last_acknack_count = Some(count);

        let acked = base - 1;
        if acked > self.highest_acked {
            self.highest_acked = acked;
            self.unsent.retain(|s| *s > acked);
            self.requested.retain(|s| *s > acked);
        }
        let mut any_nack = false;
        for seq in missing {
            if seq > self.highest_acked {
                self.requested.insert(seq);
                any_nack = true;
            }
        }
        if any_nack {
            self.last_nack_at = Some(Instant::now());
        }
        true
    }

    /// Record an explicit retransmission request (NACK_FRAG path) without
    /// touching the ack watermark.
    pub fn request(&mut self, seq: SequenceNumber) {
        if seq > self.highest_acked {
            self.requested.insert(seq);
            self.last_nack_at = Some(Instant::now());
        }
    }

    /// Drop state at and below `seq` (change removed from history).
    pub fn forget(&mut self, seq: SequenceNumber) {
        self.unsent.remove(&seq);
        self.requested.remove(&seq);
    }

    #[must_use]
    pub fn highest_acked(&self) -> SequenceNumber {
        self.highest_acked
    }

    /// Treat everything up to `seq` as already acknowledged (volatile
    /// readers never receive history published before the match).
    pub fn start_from(&mut self, seq: SequenceNumber) {
        self.highest_acked = seq;
    }

    /// Whether this reader still owes acks below or at `last_seq`.
    #[must_use]
    pub fn has_unacked(&self, last_seq: SequenceNumber) -> bool {
        self.is_reliable && self.highest_acked < last_seq
    }

    #[must_use]
    pub fn has_requested(&self) -> bool {
        !self.requested.is_empty()
    }

    #[must_use]
    pub fn has_unsent(&self) -> bool {
        !self.unsent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy() -> ReaderProxy {
        ReaderProxy::new(
            Guid::from_bytes([7; 16]),
            vec![Locator::udpv4([127, 0, 0, 1], 7411)],
            Vec::new(),
            true,
            DurabilityKind::Volatile,
        )
    }

    #[test]
    fn test_acknack_advances_watermark() {
        let mut p = proxy();
        p.add_unsent(1);
        p.add_unsent(2);
        p.add_unsent(3);
        assert!(p.apply_acknack(3, std::iter::empty(), 1));
        assert_eq!(p.highest_acked(), 2);
        assert_eq!(p.take_unsent(), vec![3]);
    }

    #[test]
    fn test_duplicate_count_suppressed() {
        let mut p = proxy();
        assert!(p.apply_acknack(2, std::iter::empty(), 5));
        assert!(!p.apply_acknack(2, std::iter::empty(), 5));
        assert!(p.apply_acknack(2, std::iter::empty(), 6));
    }

    #[test]
    fn test_nack_records_requested() {
        let mut p = proxy();
        assert!(p.apply_acknack(2, vec![3, 5], 1));
        assert!(p.has_requested());
        assert_eq!(p.take_requested(), vec![3, 5]);
        assert!(!p.has_requested());
        assert!(p.last_nack_at.is_some());
    }

    #[test]
    fn test_watermark_never_regresses() {
        let mut p = proxy();
        assert!(p.apply_acknack(10, std::iter::empty(), 1));
        assert!(p.apply_acknack(4, std::iter::empty(), 2));
        assert_eq!(p.highest_acked(), 9);
    }

    #[test]
    fn test_start_from_skips_history() {
        let mut p = proxy();
        p.start_from(10);
        p.add_unsent(9);
        assert!(!p.has_unsent());
        p.add_unsent(11);
        assert!(p.has_unsent());
    }
}
