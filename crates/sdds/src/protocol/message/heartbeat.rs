// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! HEARTBEAT and HEARTBEAT_FRAG submessages (RTPS v2.5 Sec.9.4.5.7/9.4.5.8).

use super::{finish_submessage, put_sequence_number, put_u32, FLAG_ENDIANNESS, SubmessageReader};
use crate::error::{Error, Result};
use crate::protocol::constants::{SUBMSG_HEARTBEAT, SUBMSG_HEARTBEAT_FRAG};
use crate::protocol::types::{Count, EntityId, SequenceNumber};

/// HEARTBEAT flag bit 1: final (no response solicited).
pub const FLAG_HEARTBEAT_FINAL: u8 = 0x02;
/// HEARTBEAT flag bit 2: liveliness assertion only.
pub const FLAG_HEARTBEAT_LIVELINESS: u8 = 0x04;

/// HEARTBEAT: the writer announces its available sequence range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    /// Oldest sequence number still held in the writer history.
    pub first_sn: SequenceNumber,
    /// Newest sequence number published by the writer.
    pub last_sn: SequenceNumber,
    /// Monotonic counter; readers use it to suppress duplicate responses.
    pub count: Count,
    pub final_flag: bool,
    pub liveliness_flag: bool,
}

impl Heartbeat {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let header_pos = buf.len();
        let mut flags = FLAG_ENDIANNESS;
        if self.final_flag {
            flags |= FLAG_HEARTBEAT_FINAL;
        }
        if self.liveliness_flag {
            flags |= FLAG_HEARTBEAT_LIVELINESS;
        }
        buf.extend_from_slice(&[SUBMSG_HEARTBEAT, flags, 0, 0]);
        buf.extend_from_slice(&self.reader_id.0);
        buf.extend_from_slice(&self.writer_id.0);
        put_sequence_number(buf, self.first_sn, true);
        put_sequence_number(buf, self.last_sn, true);
        put_u32(buf, self.count, true);
        finish_submessage(buf, header_pos);
    }

    pub fn decode(payload: &[u8], flags: u8) -> Result<Self> {
        let le = flags & FLAG_ENDIANNESS != 0;
        let mut r = SubmessageReader::new(payload, le);
        let short = || Error::WireFormat("HEARTBEAT too short".into());
        let reader_id = r.entity_id().ok_or_else(short)?;
        let writer_id = r.entity_id().ok_or_else(short)?;
        let first_sn = r.sequence_number().ok_or_else(short)?;
        let last_sn = r.sequence_number().ok_or_else(short)?;
        let count = r.u32().ok_or_else(short)?;

        // first > last + 1 cannot describe any history; first < 1 is outside
        // the sequence number domain.
        if first_sn < 1 || last_sn < first_sn - 1 {
            return Err(Error::WireFormat(format!(
                "HEARTBEAT with invalid range [{}, {}]",
                first_sn, last_sn
            )));
        }

        Ok(Self {
            reader_id,
            writer_id,
            first_sn,
            last_sn,
            count,
            final_flag: flags & FLAG_HEARTBEAT_FINAL != 0,
            liveliness_flag: flags & FLAG_HEARTBEAT_LIVELINESS != 0,
        })
    }
}

/// HEARTBEAT_FRAG: the writer announces the last available fragment of a
/// partially transmitted sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatFrag {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub writer_sn: SequenceNumber,
    pub last_fragment_num: u32,
    pub count: Count,
}

impl HeartbeatFrag {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let header_pos = buf.len();
        buf.extend_from_slice(&[SUBMSG_HEARTBEAT_FRAG, FLAG_ENDIANNESS, 0, 0]);
        buf.extend_from_slice(&self.reader_id.0);
        buf.extend_from_slice(&self.writer_id.0);
        put_sequence_number(buf, self.writer_sn, true);
        put_u32(buf, self.last_fragment_num, true);
        put_u32(buf, self.count, true);
        finish_submessage(buf, header_pos);
    }

    pub fn decode(payload: &[u8], le: bool) -> Result<Self> {
        let mut r = SubmessageReader::new(payload, le);
        let short = || Error::WireFormat("HEARTBEAT_FRAG too short".into());
        Ok(Self {
            reader_id: r.entity_id().ok_or_else(short)?,
            writer_id: r.entity_id().ok_or_else(short)?,
            writer_sn: r.sequence_number().ok_or_else(short)?,
            last_fragment_num: r.u32().ok_or_else(short)?,
            count: r.u32().ok_or_else(short)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_round_trip() {
        let hb = Heartbeat {
            reader_id: EntityId::UNKNOWN,
            writer_id: EntityId([0, 0, 1, 0x03]),
            first_sn: 1,
            last_sn: 42,
            count: 9,
            final_flag: true,
            liveliness_flag: false,
        };
        let mut buf = Vec::new();
        hb.encode(&mut buf);
        let decoded = Heartbeat::decode(&buf[4..], buf[1]).expect("decode");
        assert_eq!(decoded, hb);
    }

    #[test]
    fn test_heartbeat_empty_history_legal() {
        // first = 1, last = 0 announces "nothing available yet".
        let hb = Heartbeat {
            reader_id: EntityId::UNKNOWN,
            writer_id: EntityId([0, 0, 1, 0x03]),
            first_sn: 1,
            last_sn: 0,
            count: 0,
            final_flag: false,
            liveliness_flag: false,
        };
        let mut buf = Vec::new();
        hb.encode(&mut buf);
        assert!(Heartbeat::decode(&buf[4..], buf[1]).is_ok());
    }

    #[test]
    fn test_heartbeat_invalid_range_rejected() {
        let hb = Heartbeat {
            reader_id: EntityId::UNKNOWN,
            writer_id: EntityId([0, 0, 1, 0x03]),
            first_sn: 10,
            last_sn: 42,
            count: 0,
            final_flag: false,
            liveliness_flag: false,
        };
        let mut buf = Vec::new();
        hb.encode(&mut buf);
        // Corrupt last_sn (offset 4 hdr + 8 ids + 8 first = 20) to 3 < first-1.
        buf[20..28].copy_from_slice(&[0, 0, 0, 0, 3, 0, 0, 0]);
        assert!(Heartbeat::decode(&buf[4..], buf[1]).is_err());
    }

    #[test]
    fn test_heartbeat_frag_round_trip() {
        let hf = HeartbeatFrag {
            reader_id: EntityId::UNKNOWN,
            writer_id: EntityId([0, 0, 2, 0x03]),
            writer_sn: 5,
            last_fragment_num: 17,
            count: 2,
        };
        let mut buf = Vec::new();
        hf.encode(&mut buf);
        let decoded = HeartbeatFrag::decode(&buf[4..], true).expect("decode");
        assert_eq!(decoded, hf);
    }
}
