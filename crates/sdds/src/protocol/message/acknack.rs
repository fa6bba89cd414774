// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! ACKNACK and NACK_FRAG submessages (RTPS v2.5 Sec.9.4.5.2/9.4.5.13).

use super::{finish_submessage, put_u32, FLAG_ENDIANNESS, FragmentNumberSet, SequenceNumberSet, SubmessageReader};
use crate::error::{Error, Result};
use crate::protocol::constants::{SUBMSG_ACKNACK, SUBMSG_NACK_FRAG};
use crate::protocol::message::put_sequence_number;
use crate::protocol::types::{Count, EntityId, SequenceNumber};

/// ACKNACK flag bit 1: final (writer need not respond).
pub const FLAG_ACKNACK_FINAL: u8 = 0x02;

/// ACKNACK: the reader acknowledges everything below `reader_sn_state.base`
/// and requests retransmission of every sequence set in the bitmap.
///
/// A zero-bit set is the "I'm current" positive acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckNack {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub reader_sn_state: SequenceNumberSet,
    pub count: Count,
    pub final_flag: bool,
}

impl AckNack {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let header_pos = buf.len();
        let mut flags = FLAG_ENDIANNESS;
        if self.final_flag {
            flags |= FLAG_ACKNACK_FINAL;
        }
        buf.extend_from_slice(&[SUBMSG_ACKNACK, flags, 0, 0]);
        buf.extend_from_slice(&self.reader_id.0);
        buf.extend_from_slice(&self.writer_id.0);
        self.reader_sn_state.encode(buf, true);
        put_u32(buf, self.count, true);
        finish_submessage(buf, header_pos);
    }

    pub fn decode(payload: &[u8], flags: u8) -> Result<Self> {
        let le = flags & FLAG_ENDIANNESS != 0;
        let mut r = SubmessageReader::new(payload, le);
        let short = || Error::WireFormat("ACKNACK too short".into());
        let reader_id = r.entity_id().ok_or_else(short)?;
        let writer_id = r.entity_id().ok_or_else(short)?;
        let reader_sn_state = SequenceNumberSet::decode(&mut r)
            .ok_or_else(|| Error::WireFormat("ACKNACK with invalid sequence set".into()))?;
        let count = r.u32().ok_or_else(short)?;
        Ok(Self {
            reader_id,
            writer_id,
            reader_sn_state,
            count,
            final_flag: flags & FLAG_ACKNACK_FINAL != 0,
        })
    }

    /// Missing sequences requested by this ACKNACK, ascending.
    #[must_use]
    pub fn requested(&self) -> Vec<SequenceNumber> {
        self.reader_sn_state.iter().collect()
    }
}

/// NACK_FRAG: the reader requests specific fragments of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NackFrag {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub writer_sn: SequenceNumber,
    pub fragment_number_state: FragmentNumberSet,
    pub count: Count,
}

impl NackFrag {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let header_pos = buf.len();
        buf.extend_from_slice(&[SUBMSG_NACK_FRAG, FLAG_ENDIANNESS, 0, 0]);
        buf.extend_from_slice(&self.reader_id.0);
        buf.extend_from_slice(&self.writer_id.0);
        put_sequence_number(buf, self.writer_sn, true);
        self.fragment_number_state.encode(buf, true);
        put_u32(buf, self.count, true);
        finish_submessage(buf, header_pos);
    }

    pub fn decode(payload: &[u8], le: bool) -> Result<Self> {
        let mut r = SubmessageReader::new(payload, le);
        let short = || Error::WireFormat("NACK_FRAG too short".into());
        let reader_id = r.entity_id().ok_or_else(short)?;
        let writer_id = r.entity_id().ok_or_else(short)?;
        let writer_sn = r.sequence_number().ok_or_else(short)?;
        if writer_sn < 1 {
            return Err(Error::WireFormat("NACK_FRAG with invalid sequence".into()));
        }
        let fragment_number_state = FragmentNumberSet::decode(&mut r)
            .ok_or_else(|| Error::WireFormat("NACK_FRAG with invalid fragment set".into()))?;
        let count = r.u32().ok_or_else(short)?;
        Ok(Self {
            reader_id,
            writer_id,
            writer_sn,
            fragment_number_state,
            count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acknack_round_trip_with_missing() {
        let mut set = SequenceNumberSet::new(3);
        set.insert(3);
        set.insert(7);
        let an = AckNack {
            reader_id: EntityId([0, 0, 1, 0x04]),
            writer_id: EntityId([0, 0, 1, 0x03]),
            reader_sn_state: set,
            count: 5,
            final_flag: false,
        };
        let mut buf = Vec::new();
        an.encode(&mut buf);
        let decoded = AckNack::decode(&buf[4..], buf[1]).expect("decode");
        assert_eq!(decoded, an);
        assert_eq!(decoded.requested(), vec![3, 7]);
    }

    #[test]
    fn test_acknack_positive_ack() {
        // Zero-bit set: "everything below 11 received, nothing missing".
        let an = AckNack {
            reader_id: EntityId([0, 0, 1, 0x04]),
            writer_id: EntityId([0, 0, 1, 0x03]),
            reader_sn_state: SequenceNumberSet::new(11),
            count: 1,
            final_flag: true,
        };
        let mut buf = Vec::new();
        an.encode(&mut buf);
        let decoded = AckNack::decode(&buf[4..], buf[1]).expect("decode");
        assert!(decoded.final_flag);
        assert!(decoded.requested().is_empty());
        assert_eq!(decoded.reader_sn_state.base(), 11);
    }

    #[test]
    fn test_nack_frag_round_trip() {
        let mut frags = FragmentNumberSet::new(2);
        frags.insert(2);
        frags.insert(4);
        let nf = NackFrag {
            reader_id: EntityId([0, 0, 1, 0x04]),
            writer_id: EntityId([0, 0, 1, 0x03]),
            writer_sn: 9,
            fragment_number_state: frags,
            count: 1,
        };
        let mut buf = Vec::new();
        nf.encode(&mut buf);
        let decoded = NackFrag::decode(&buf[4..], true).expect("decode");
        assert_eq!(decoded, nf);
    }
}
