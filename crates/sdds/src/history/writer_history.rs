// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Writer-side history: an ordered store of produced changes indexed by
//! sequence number.
//!
//! Sequence numbers are assigned here, strictly monotonic from 1. The
//! published stream never skips a number; holes only appear when a change is
//! explicitly removed, and the owning writer signals those with GAP.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::error::{Error, Result};
use crate::history::change::{CacheChange, ChangeKind, WriteParams};
use crate::history::pool::{PayloadPool, PoolStrategy};
use crate::protocol::types::{Guid, InstanceHandle, SequenceNumber, Time};
use crate::qos::History;

/// Outcome of an `add_change` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddChangeOutcome {
    pub sequence_number: SequenceNumber,
    /// Sequence number evicted by the KEEP_LAST overflow policy, if any.
    pub evicted: Option<SequenceNumber>,
}

/// Ordered store of a writer's produced changes.
pub struct WriterHistory {
    writer_guid: Guid,
    history_kind: History,
    max_samples: usize,
    next_sequence: SequenceNumber,
    changes: BTreeMap<SequenceNumber, CacheChange>,
    per_instance: HashMap<InstanceHandle, VecDeque<SequenceNumber>>,
    pool: PayloadPool,
}

impl WriterHistory {
    #[must_use]
    pub fn new(
        writer_guid: Guid,
        history_kind: History,
        max_samples: usize,
        pool_strategy: PoolStrategy,
        max_payload_size: usize,
    ) -> Self {
        let initial = match history_kind {
            History::KeepLast(depth) => depth as usize,
            History::KeepAll => max_samples.min(64),
        };
        Self {
            writer_guid,
            history_kind,
            max_samples,
            next_sequence: 1,
            changes: BTreeMap::new(),
            per_instance: HashMap::new(),
            pool: PayloadPool::new(pool_strategy, max_payload_size, initial, max_samples.max(initial)),
        }
    }

    /// Acquire a payload slot from the pool.
    pub fn reserve_change(&self, max_payload_size: usize) -> Result<Vec<u8>> {
        self.pool.reserve(max_payload_size)
    }

    /// Assign the next sequence number, stamp the source timestamp, and
    /// store the change.
    ///
    /// Fails with `OutOfResources` when KEEP_ALL history is at
    /// `max_samples`, or when the sequence-number space is exhausted.
    /// KEEP_LAST overflow evicts the oldest change of the written instance
    /// and reports it so the writer can GAP it.
    pub fn add_change(
        &mut self,
        kind: ChangeKind,
        instance_handle: InstanceHandle,
        payload: Vec<u8>,
        write_params: WriteParams,
    ) -> Result<AddChangeOutcome> {
        if self.next_sequence == SequenceNumber::MAX {
            return Err(Error::OutOfResources(
                "sequence number space exhausted".into(),
            ));
        }

        let mut evicted = None;
        match self.history_kind {
            History::KeepAll => {
                if self.changes.len() >= self.max_samples {
                    return Err(Error::OutOfResources("KEEP_ALL history full".into()));
                }
            }
            History::KeepLast(depth) => {
                let queue = self.per_instance.entry(instance_handle).or_default();
                if queue.len() >= depth as usize {
                    if let Some(old_seq) = queue.pop_front() {
                        if let Some(old) = self.changes.remove(&old_seq) {
                            self.pool.release(old.serialized_payload);
                        }
                        evicted = Some(old_seq);
                    }
                }
            }
        }

        let sequence_number = self.next_sequence;
        self.next_sequence += 1;

        let mut change = CacheChange {
            kind,
            writer_guid: self.writer_guid,
            instance_handle,
            sequence_number,
            source_timestamp: Time::now(),
            serialized_payload: payload,
            write_params,
        };
        change.write_params.sample_identity.writer_guid = self.writer_guid;
        change.write_params.sample_identity.sequence_number = sequence_number;

        self.per_instance
            .entry(instance_handle)
            .or_default()
            .push_back(sequence_number);
        self.changes.insert(sequence_number, change);

        Ok(AddChangeOutcome {
            sequence_number,
            evicted,
        })
    }

    /// Re-insert a change restored from the persistence service, keeping
    /// its original sequence number. The next assigned sequence continues
    /// after the highest restored one.
    pub fn restore(&mut self, change: CacheChange) {
        if change.sequence_number < 1 {
            return;
        }
        if change.sequence_number >= self.next_sequence {
            self.next_sequence = change.sequence_number + 1;
        }
        self.per_instance
            .entry(change.instance_handle)
            .or_default()
            .push_back(change.sequence_number);
        self.changes.insert(change.sequence_number, change);
    }

    /// Remove a specific change and return its slot to the pool.
    ///
    /// The reliable writer gates this on acknowledgment state before
    /// calling; `force` is the KEEP_LAST overflow path.
    pub fn remove_change(&mut self, seq: SequenceNumber) -> bool {
        match self.changes.remove(&seq) {
            Some(change) => {
                if let Some(queue) = self.per_instance.get_mut(&change.instance_handle) {
                    queue.retain(|s| *s != seq);
                }
                self.pool.release(change.serialized_payload);
                true
            }
            None => false,
        }
    }

    /// Remove every change matching the predicate; returns removed count.
    pub fn remove_changes_where<F: FnMut(&CacheChange) -> bool>(&mut self, mut pred: F) -> usize {
        let seqs: Vec<SequenceNumber> = self
            .changes
            .values()
            .filter(|c| pred(c))
            .map(|c| c.sequence_number)
            .collect();
        for seq in &seqs {
            self.remove_change(*seq);
        }
        seqs.len()
    }

    #[must_use]
    pub fn get(&self, seq: SequenceNumber) -> Option<&CacheChange> {
        self.changes.get(&seq)
    }

    /// Oldest sequence number still held; `next_sequence` when empty (so an
    /// empty history reports first = last + 1).
    #[must_use]
    pub fn first_sequence(&self) -> SequenceNumber {
        self.changes
            .keys()
            .next()
            .copied()
            .unwrap_or(self.next_sequence)
    }

    /// Highest sequence number assigned so far (0 before the first write).
    #[must_use]
    pub fn last_sequence(&self) -> SequenceNumber {
        self.next_sequence - 1
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Iterate held changes in sequence order.
    pub fn iter(&self) -> impl Iterator<Item = &CacheChange> {
        self.changes.values()
    }

    #[must_use]
    pub fn writer_guid(&self) -> Guid {
        self.writer_guid
    }

    #[cfg(test)]
    pub(crate) fn force_next_sequence(&mut self, seq: SequenceNumber) {
        self.next_sequence = seq;
    }
}
