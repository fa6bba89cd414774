// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Fixed-slot message ring living inside a shared-memory segment.
//!
//! Layout:
//!
//! ```text
//! +----------------------- header (64 B) -----------------------+
//! | magic u32 | capacity u32 | slot_size u32 | head u32 | tail u32 |
//! +--------------------------------------------------------------+
//! | slot 0: len u32 + payload | slot 1 | ... | slot capacity-1   |
//! +--------------------------------------------------------------+
//! ```
//!
//! `head` is advanced by the consumer, `tail` by producers (CAS loop, so
//! multiple writer processes can enqueue). A full ring drops the message;
//! SHM is a best-effort fast path and reliability lives in the endpoint
//! layer.

use std::sync::atomic::{AtomicU32, Ordering};

use super::segment::ShmSegment;

const RING_MAGIC: u32 = 0x5DD5_0001;
const HEADER_SIZE: usize = 64;
const SLOT_HEADER: usize = 4;

/// Required segment size for a ring of `capacity` slots.
#[must_use]
pub fn segment_size(capacity: u32, slot_size: u32) -> usize {
    HEADER_SIZE + capacity as usize * (SLOT_HEADER + slot_size as usize)
}

/// View over a message ring inside a mapped segment.
pub struct ShmRing<'a> {
    segment: &'a ShmSegment,
    capacity: u32,
    slot_size: u32,
}

impl<'a> ShmRing<'a> {
    /// Initialize the header in a freshly created segment.
    pub fn init(segment: &'a ShmSegment, capacity: u32, slot_size: u32) -> Option<Self> {
        if segment.len() < segment_size(capacity, slot_size) {
            return None;
        }
        let ring = Self {
            segment,
            capacity,
            slot_size,
        };
        ring.word(1).store(capacity, Ordering::Relaxed);
        ring.word(2).store(slot_size, Ordering::Relaxed);
        ring.word(3).store(0, Ordering::Relaxed); // head
        ring.word(4).store(0, Ordering::Relaxed); // tail
        ring.word(0).store(RING_MAGIC, Ordering::Release);
        Some(ring)
    }

    /// Attach to a ring initialized by a peer.
    pub fn attach(segment: &'a ShmSegment) -> Option<Self> {
        if segment.len() < HEADER_SIZE {
            return None;
        }
        let probe = Self {
            segment,
            capacity: 0,
            slot_size: 0,
        };
        if probe.word(0).load(Ordering::Acquire) != RING_MAGIC {
            return None;
        }
        let capacity = probe.word(1).load(Ordering::Relaxed);
        let slot_size = probe.word(2).load(Ordering::Relaxed);
        if segment.len() < segment_size(capacity, slot_size) {
            return None;
        }
        Some(Self {
            segment,
            capacity,
            slot_size,
        })
    }

    fn word(&self, index: usize) -> &AtomicU32 {
        // Header words are 4-byte aligned within the page-aligned mapping.
        unsafe { &*self.segment.as_ptr().add(index * 4).cast::<AtomicU32>() }
    }

    fn slot_ptr(&self, slot: u32) -> *mut u8 {
        let offset = HEADER_SIZE + slot as usize * (SLOT_HEADER + self.slot_size as usize);
        unsafe { self.segment.as_ptr().add(offset) }
    }

    /// Enqueue one message. Returns `false` when the ring is full or the
    /// message exceeds the slot size.
    pub fn push(&self, data: &[u8]) -> bool {
        if data.len() > self.slot_size as usize {
            log::warn!(
                "[SHM] message of {} bytes exceeds slot size {}",
                data.len(),
                self.slot_size
            );
            return false;
        }
        let head_word = self.word(3);
        let tail_word = self.word(4);
        loop {
            let tail = tail_word.load(Ordering::Acquire);
            let head = head_word.load(Ordering::Acquire);
            if tail.wrapping_sub(head) >= self.capacity {
                return false; // full
            }
            if tail_word
                .compare_exchange_weak(tail, tail.wrapping_add(1), Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let slot = tail % self.capacity;
                let ptr = self.slot_ptr(slot);
                unsafe {
                    std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(SLOT_HEADER), data.len());
                    // Length write is released by the ring's published tail;
                    // the consumer reads it only after observing the slot.
                    (*ptr.cast::<AtomicU32>()).store(data.len() as u32, Ordering::Release);
                }
                return true;
            }
        }
    }

    /// Dequeue one message into `out`. Returns the message length, or
    /// `None` when the ring is empty.
    pub fn pop(&self, out: &mut [u8]) -> Option<usize> {
        let head_word = self.word(3);
        let tail_word = self.word(4);
        let head = head_word.load(Ordering::Acquire);
        if head == tail_word.load(Ordering::Acquire) {
            return None;
        }
        let slot = head % self.capacity;
        let ptr = self.slot_ptr(slot);
        let len = unsafe { (*ptr.cast::<AtomicU32>()).load(Ordering::Acquire) } as usize;
        if len == 0 {
            // Producer reserved the slot but has not finished the copy.
            return None;
        }
        let len = len.min(out.len());
        unsafe {
            std::ptr::copy_nonoverlapping(ptr.add(SLOT_HEADER), out.as_mut_ptr(), len);
            (*ptr.cast::<AtomicU32>()).store(0, Ordering::Release);
        }
        head_word.store(head.wrapping_add(1), Ordering::Release);
        Some(len)
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[must_use]
    pub fn slot_size(&self) -> u32 {
        self.slot_size
    }
}
