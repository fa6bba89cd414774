// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! GAP submessage (RTPS v2.5 Sec.9.4.5.5).
//!
//! A GAP tells a reader that a range of sequence numbers will never be
//! supplied: `[gap_start, gap_list.base)` is irrelevant, plus every number
//! set in the `gap_list` bitmap.

use super::{finish_submessage, put_sequence_number, FLAG_ENDIANNESS, SequenceNumberSet, SubmessageReader};
use crate::error::{Error, Result};
use crate::protocol::constants::SUBMSG_GAP;
use crate::protocol::types::{EntityId, SequenceNumber};

/// GAP: irrelevant sequence numbers the writer will not supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    /// First irrelevant sequence number.
    pub gap_start: SequenceNumber,
    /// Irrelevant numbers at and above `gap_list.base()`; everything in
    /// `[gap_start, base)` is implicitly irrelevant.
    pub gap_list: SequenceNumberSet,
}

impl Gap {
    /// GAP covering the contiguous range `[start, end)`.
    #[must_use]
    pub fn contiguous(
        reader_id: EntityId,
        writer_id: EntityId,
        start: SequenceNumber,
        end: SequenceNumber,
    ) -> Self {
        Self {
            reader_id,
            writer_id,
            gap_start: start,
            gap_list: SequenceNumberSet::new(end),
        }
    }

    /// Expand to the explicit list of irrelevant sequence numbers.
    #[must_use]
    pub fn irrelevant_sequences(&self) -> Vec<SequenceNumber> {
        let mut seqs: Vec<SequenceNumber> = (self.gap_start..self.gap_list.base()).collect();
        seqs.extend(self.gap_list.iter());
        seqs
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        let header_pos = buf.len();
        buf.extend_from_slice(&[SUBMSG_GAP, FLAG_ENDIANNESS, 0, 0]);
        buf.extend_from_slice(&self.reader_id.0);
        buf.extend_from_slice(&self.writer_id.0);
        put_sequence_number(buf, self.gap_start, true);
        self.gap_list.encode(buf, true);
        finish_submessage(buf, header_pos);
    }

    pub fn decode(payload: &[u8], le: bool) -> Result<Self> {
        let mut r = SubmessageReader::new(payload, le);
        let short = || Error::WireFormat("GAP too short".into());
        let reader_id = r.entity_id().ok_or_else(short)?;
        let writer_id = r.entity_id().ok_or_else(short)?;
        let gap_start = r.sequence_number().ok_or_else(short)?;
        if gap_start < 1 {
            return Err(Error::WireFormat("GAP with non-positive start".into()));
        }
        let gap_list = SequenceNumberSet::decode(&mut r)
            .ok_or_else(|| Error::WireFormat("GAP with invalid sequence set".into()))?;
        if gap_list.base() < gap_start {
            return Err(Error::WireFormat("GAP list base below gap start".into()));
        }
        Ok(Self {
            reader_id,
            writer_id,
            gap_start,
            gap_list,
        })
    }
}
