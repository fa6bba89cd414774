// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Reassembly buffer for fragmented samples (DATA_FRAG).

use std::time::{Duration, Instant};

use crate::protocol::message::DataFrag;

/// Reassembly state for one fragmented sample.
pub struct FragmentAssembly {
    sample_size: usize,
    fragment_size: usize,
    total_fragments: u32,
    received: Vec<bool>,
    buf: Vec<u8>,
    created_at: Instant,
}

impl FragmentAssembly {
    #[must_use]
    pub fn new(sample_size: u32, fragment_size: u16) -> Self {
        let sample_size = sample_size as usize;
        let fragment_size = usize::from(fragment_size).max(1);
        let total_fragments = sample_size.div_ceil(fragment_size) as u32;
        Self {
            sample_size,
            fragment_size,
            total_fragments,
            received: vec![false; total_fragments as usize],
            buf: vec![0u8; sample_size],
            created_at: Instant::now(),
        }
    }

    /// Apply one DATA_FRAG. Returns the complete payload when the last
    /// missing fragment arrives.
    pub fn insert(&mut self, frag: &DataFrag) -> Option<Vec<u8>> {
        let mut offset = 0usize;
        for i in 0..frag.fragments_in_submessage {
            let number = frag.fragment_starting_num + u32::from(i);
            if number == 0 || number > self.total_fragments {
                log::warn!(
                    "[READER] fragment {} outside sample of {} fragments",
                    number,
                    self.total_fragments
                );
                return None;
            }
            let index = (number - 1) as usize;
            let start = index * self.fragment_size;
            let len = self.fragment_size.min(self.sample_size - start);
            let Some(data) = frag.payload.get(offset..offset + len) else {
                log::warn!("[READER] DATA_FRAG payload shorter than declared fragments");
                return None;
            };
            self.buf[start..start + len].copy_from_slice(data);
            self.received[index] = true;
            offset += len;
        }

        if self.received.iter().all(|r| *r) {
            Some(std::mem::take(&mut self.buf))
        } else {
            None
        }
    }

    /// Fragment numbers still missing (for NACK_FRAG), 1-based.
    #[must_use]
    pub fn missing_fragments(&self) -> Vec<u32> {
        self.received
            .iter()
            .enumerate()
            .filter(|(_, r)| !**r)
            .map(|(i, _)| i as u32 + 1)
            .collect()
    }

    /// Whether the assembly outlived the reassembly timeout.
    #[must_use]
    pub fn expired(&self, timeout: Duration) -> bool {
        self.created_at.elapsed() > timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::EntityId;

    fn frag(starting: u32, size: u16, sample: u32, payload: Vec<u8>) -> DataFrag {
        DataFrag {
            reader_id: EntityId::UNKNOWN,
            writer_id: EntityId([0, 0, 1, 0x03]),
            writer_sn: 1,
            fragment_starting_num: starting,
            fragments_in_submessage: 1,
            fragment_size: size,
            sample_size: sample,
            inline_qos: None,
            payload,
            key_flag: false,
        }
    }

    #[test]
    fn test_single_fragment_sample() {
        // Fragment size equal to the payload size: exactly one fragment.
        let mut asm = FragmentAssembly::new(8, 8);
        let complete = asm.insert(&frag(1, 8, 8, vec![7u8; 8]));
        assert_eq!(complete, Some(vec![7u8; 8]));
    }

    #[test]
    fn test_out_of_order_reassembly() {
        let mut asm = FragmentAssembly::new(10, 4);
        assert!(asm.insert(&frag(3, 4, 10, vec![3u8; 2])).is_none());
        assert_eq!(asm.missing_fragments(), vec![1, 2]);
        assert!(asm.insert(&frag(1, 4, 10, vec![1u8; 4])).is_none());
        let complete = asm.insert(&frag(2, 4, 10, vec![2u8; 4]));
        let expected = [vec![1u8; 4], vec![2u8; 4], vec![3u8; 2]].concat();
        assert_eq!(complete, Some(expected));
    }

    #[test]
    fn test_fragment_number_out_of_range() {
        let mut asm = FragmentAssembly::new(8, 4);
        assert!(asm.insert(&frag(5, 4, 8, vec![0u8; 4])).is_none());
        assert_eq!(asm.missing_fragments(), vec![1, 2]);
    }
}
