// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Persistence hook for durable histories.
//!
//! Writers and readers with TRANSIENT_LOCAL, TRANSIENT, or PERSISTENT
//! durability store their state through this interface. The in-memory
//! implementation satisfies the contracts and is sufficient for
//! TRANSIENT_LOCAL; disk-backed stores plug in behind the same trait.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::history::CacheChange;
use crate::protocol::types::{Guid, SequenceNumber};

/// Storage contract consumed by durable endpoints.
pub trait PersistenceService: Send + Sync {
    /// Load every persisted change of a writer, in sequence order.
    fn load_writer_history(&self, writer_guid: Guid) -> Vec<CacheChange>;

    /// Persist one change of a writer's history.
    fn store_change(&self, writer_guid: Guid, change: &CacheChange);

    /// Remove one persisted change.
    fn remove_change(&self, writer_guid: Guid, seq: SequenceNumber);

    /// Load a reader's last acknowledged sequence per remote writer.
    fn load_reader_last_acks(&self, reader_guid: Guid) -> Vec<(Guid, SequenceNumber)>;

    /// Persist a reader's ack watermark toward one writer.
    fn store_ack_watermark(&self, reader_guid: Guid, writer_guid: Guid, seq: SequenceNumber);
}

/// Volatile implementation backed by in-process maps.
#[derive(Default)]
pub struct InMemoryPersistence {
    histories: Mutex<HashMap<Guid, Vec<CacheChange>>>,
    acks: Mutex<HashMap<Guid, HashMap<Guid, SequenceNumber>>>,
}

impl InMemoryPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceService for InMemoryPersistence {
    fn load_writer_history(&self, writer_guid: Guid) -> Vec<CacheChange> {
        let mut changes = self
            .histories
            .lock()
            .get(&writer_guid)
            .cloned()
            .unwrap_or_default();
        changes.sort_by_key(|c| c.sequence_number);
        changes
    }

    fn store_change(&self, writer_guid: Guid, change: &CacheChange) {
        let mut histories = self.histories.lock();
        let history = histories.entry(writer_guid).or_default();
        // Same identity overwrites (the discovery server refreshes entries).
        history.retain(|c| c.sequence_number != change.sequence_number);
        history.push(change.clone());
    }

    fn remove_change(&self, writer_guid: Guid, seq: SequenceNumber) {
        if let Some(history) = self.histories.lock().get_mut(&writer_guid) {
            history.retain(|c| c.sequence_number != seq);
        }
    }

    fn load_reader_last_acks(&self, reader_guid: Guid) -> Vec<(Guid, SequenceNumber)> {
        self.acks
            .lock()
            .get(&reader_guid)
            .map(|m| m.iter().map(|(g, s)| (*g, *s)).collect())
            .unwrap_or_default()
    }

    fn store_ack_watermark(&self, reader_guid: Guid, writer_guid: Guid, seq: SequenceNumber) {
        self.acks
            .lock()
            .entry(reader_guid)
            .or_default()
            .insert(writer_guid, seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::encapsulate_payload;

    fn guid(n: u8) -> Guid {
        Guid::from_bytes([n; 16])
    }

    fn change(seq: SequenceNumber) -> CacheChange {
        CacheChange::alive(guid(1), seq, encapsulate_payload(&[seq as u8]))
    }

    #[test]
    fn test_history_round_trip_sorted() {
        let store = InMemoryPersistence::new();
        store.store_change(guid(1), &change(3));
        store.store_change(guid(1), &change(1));
        store.store_change(guid(1), &change(2));

        let loaded = store.load_writer_history(guid(1));
        assert_eq!(
            loaded.iter().map(|c| c.sequence_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(store.load_writer_history(guid(2)).is_empty());
    }

    #[test]
    fn test_store_overwrites_same_sequence() {
        let store = InMemoryPersistence::new();
        store.store_change(guid(1), &change(1));
        store.store_change(guid(1), &change(1));
        assert_eq!(store.load_writer_history(guid(1)).len(), 1);
    }

    #[test]
    fn test_remove_change() {
        let store = InMemoryPersistence::new();
        store.store_change(guid(1), &change(1));
        store.store_change(guid(1), &change(2));
        store.remove_change(guid(1), 1);
        let loaded = store.load_writer_history(guid(1));
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].sequence_number, 2);
    }

    #[test]
    fn test_ack_watermarks() {
        let store = InMemoryPersistence::new();
        store.store_ack_watermark(guid(10), guid(1), 5);
        store.store_ack_watermark(guid(10), guid(1), 8);
        store.store_ack_watermark(guid(10), guid(2), 3);

        let mut acks = store.load_reader_last_acks(guid(10));
        acks.sort_by_key(|(g, _)| *g);
        assert_eq!(acks, vec![(guid(1), 8), (guid(2), 3)]);
    }
}
