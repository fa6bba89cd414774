// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! DATA and DATA_FRAG submessages (RTPS v2.5 Sec.9.4.5.3/9.4.5.4).

use super::{finish_submessage, put_sequence_number, put_u16, put_u32, FLAG_ENDIANNESS, SubmessageReader};
use crate::error::{Error, Result};
use crate::protocol::constants::{SUBMSG_DATA, SUBMSG_DATA_FRAG};
use crate::protocol::parameter::ParameterList;
use crate::protocol::types::{EntityId, SequenceNumber};

/// DATA flag bit 1: inline QoS parameter list present.
pub const FLAG_DATA_INLINE_QOS: u8 = 0x02;
/// DATA flag bit 2: serialized payload present.
pub const FLAG_DATA_PAYLOAD: u8 = 0x04;
/// DATA flag bit 3: payload is a serialized key, not data.
pub const FLAG_DATA_KEY: u8 = 0x08;

/// Octets from after `octetsToInlineQos` to the first octet past the writer
/// sequence number: readerId(4) + writerId(4) + writerSN(8).
const OCTETS_TO_INLINE_QOS: u16 = 16;
/// DATA_FRAG adds fragmentStartingNum(4) + fragmentsInSubmessage(2) +
/// fragmentSize(2) + sampleSize(4).
const OCTETS_TO_INLINE_QOS_FRAG: u16 = 28;

/// DATA submessage: one complete serialized sample (or key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub writer_sn: SequenceNumber,
    pub inline_qos: Option<ParameterList>,
    /// Serialized payload including its encapsulation header; `None` for a
    /// heartbeat-only DATA (neither data nor key flag).
    pub payload: Option<Vec<u8>>,
    /// Payload carries a serialized key instead of data.
    pub key_flag: bool,
}

impl Data {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let header_pos = buf.len();
        let mut flags = FLAG_ENDIANNESS;
        if self.inline_qos.is_some() {
            flags |= FLAG_DATA_INLINE_QOS;
        }
        if self.payload.is_some() {
            flags |= if self.key_flag {
                FLAG_DATA_KEY
            } else {
                FLAG_DATA_PAYLOAD
            };
        }
        buf.extend_from_slice(&[SUBMSG_DATA, flags, 0, 0]);

        put_u16(buf, 0, true); // extraFlags
        put_u16(buf, OCTETS_TO_INLINE_QOS, true);
        buf.extend_from_slice(&self.reader_id.0);
        buf.extend_from_slice(&self.writer_id.0);
        put_sequence_number(buf, self.writer_sn, true);
        if let Some(qos) = &self.inline_qos {
            qos.encode(buf, true);
        }
        if let Some(payload) = &self.payload {
            buf.extend_from_slice(payload);
            // Submessages are 4-byte aligned.
            let pad = buf.len().next_multiple_of(4) - buf.len();
            buf.resize(buf.len() + pad, 0);
        }
        finish_submessage(buf, header_pos);
    }

    pub fn decode(payload: &[u8], flags: u8) -> Result<Self> {
        let le = flags & FLAG_ENDIANNESS != 0;
        let mut r = SubmessageReader::new(payload, le);
        let _extra_flags = r
            .u16()
            .ok_or_else(|| Error::WireFormat("DATA too short".into()))?;
        let octets_to_qos = r
            .u16()
            .ok_or_else(|| Error::WireFormat("DATA too short".into()))? as usize;
        let fields_start = r.position();
        let reader_id = r
            .entity_id()
            .ok_or_else(|| Error::WireFormat("DATA missing reader id".into()))?;
        let writer_id = r
            .entity_id()
            .ok_or_else(|| Error::WireFormat("DATA missing writer id".into()))?;
        let writer_sn = r
            .sequence_number()
            .ok_or_else(|| Error::WireFormat("DATA missing sequence number".into()))?;
        if writer_sn < 1 {
            return Err(Error::WireFormat(format!(
                "DATA with non-positive sequence number {}",
                writer_sn
            )));
        }

        // octetsToInlineQos may exceed the default when a vendor inserts
        // extension fields before the QoS list.
        r.seek(fields_start + octets_to_qos)
            .ok_or_else(|| Error::WireFormat("DATA octetsToInlineQos overruns payload".into()))?;

        let inline_qos = if flags & FLAG_DATA_INLINE_QOS != 0 {
            Some(ParameterList::decode(&mut r)?)
        } else {
            None
        };

        let key_flag = flags & FLAG_DATA_KEY != 0;
        let has_payload = flags & (FLAG_DATA_PAYLOAD | FLAG_DATA_KEY) != 0;
        let payload = if has_payload {
            Some(r.remaining().to_vec())
        } else {
            None
        };

        Ok(Self {
            reader_id,
            writer_id,
            writer_sn,
            inline_qos,
            payload,
            key_flag,
        })
    }
}

/// DATA_FRAG submessage: one slice of a fragmented sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrag {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub writer_sn: SequenceNumber,
    /// 1-based index of the first fragment in this submessage.
    pub fragment_starting_num: u32,
    pub fragments_in_submessage: u16,
    /// Fixed fragment size for the sample (except possibly the last one).
    pub fragment_size: u16,
    /// Total serialized sample size.
    pub sample_size: u32,
    pub inline_qos: Option<ParameterList>,
    pub payload: Vec<u8>,
    pub key_flag: bool,
}

impl DataFrag {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let header_pos = buf.len();
        let mut flags = FLAG_ENDIANNESS;
        if self.inline_qos.is_some() {
            flags |= FLAG_DATA_INLINE_QOS;
        }
        if self.key_flag {
            flags |= 0x04; // key flag occupies bit 2 in DATA_FRAG
        }
        buf.extend_from_slice(&[SUBMSG_DATA_FRAG, flags, 0, 0]);

        put_u16(buf, 0, true); // extraFlags
        put_u16(buf, OCTETS_TO_INLINE_QOS_FRAG, true);
        buf.extend_from_slice(&self.reader_id.0);
        buf.extend_from_slice(&self.writer_id.0);
        put_sequence_number(buf, self.writer_sn, true);
        put_u32(buf, self.fragment_starting_num, true);
        put_u16(buf, self.fragments_in_submessage, true);
        put_u16(buf, self.fragment_size, true);
        put_u32(buf, self.sample_size, true);
        if let Some(qos) = &self.inline_qos {
            qos.encode(buf, true);
        }
        buf.extend_from_slice(&self.payload);
        let pad = buf.len().next_multiple_of(4) - buf.len();
        buf.resize(buf.len() + pad, 0);
        finish_submessage(buf, header_pos);
    }

    pub fn decode(payload: &[u8], flags: u8) -> Result<Self> {
        let le = flags & FLAG_ENDIANNESS != 0;
        let mut r = SubmessageReader::new(payload, le);
        let short = || Error::WireFormat("DATA_FRAG too short".into());
        let _extra_flags = r.u16().ok_or_else(short)?;
        let octets_to_qos = r.u16().ok_or_else(short)? as usize;
        let fields_start = r.position();
        let reader_id = r.entity_id().ok_or_else(short)?;
        let writer_id = r.entity_id().ok_or_else(short)?;
        let writer_sn = r.sequence_number().ok_or_else(short)?;
        let fragment_starting_num = r.u32().ok_or_else(short)?;
        let fragments_in_submessage = r.u16().ok_or_else(short)?;
        let fragment_size = r.u16().ok_or_else(short)?;
        let sample_size = r.u32().ok_or_else(short)?;

        if writer_sn < 1 || fragment_starting_num == 0 || fragment_size == 0 {
            return Err(Error::WireFormat("DATA_FRAG with invalid framing fields".into()));
        }

        r.seek(fields_start + octets_to_qos)
            .ok_or_else(|| Error::WireFormat("DATA_FRAG octetsToInlineQos overrun".into()))?;

        let inline_qos = if flags & FLAG_DATA_INLINE_QOS != 0 {
            Some(ParameterList::decode(&mut r)?)
        } else {
            None
        };

        Ok(Self {
            reader_id,
            writer_id,
            writer_sn,
            fragment_starting_num,
            fragments_in_submessage,
            fragment_size,
            sample_size,
            inline_qos,
            payload: r.remaining().to_vec(),
            key_flag: flags & 0x04 != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::{PID_STATUS_INFO, SUBMSG_DATA};
    use crate::protocol::parameter::Parameter;

    fn sample_data() -> Data {
        Data {
            reader_id: EntityId::UNKNOWN,
            writer_id: EntityId([0, 0, 1, 0x03]),
            writer_sn: 7,
            inline_qos: None,
            payload: Some(vec![0x00, 0x01, 0x00, 0x00, b'h', b'i', 0, 0]),
            key_flag: false,
        }
    }

    fn round_trip(data: &Data) -> Data {
        let mut buf = Vec::new();
        data.encode(&mut buf);
        assert_eq!(buf[0], SUBMSG_DATA);
        Data::decode(&buf[4..], buf[1]).expect("decode")
    }

    #[test]
    fn test_data_round_trip() {
        let data = sample_data();
        assert_eq!(round_trip(&data), data);
    }

    #[test]
    fn test_data_with_inline_qos_round_trip() {
        let mut qos = ParameterList::new();
        qos.push(Parameter::from_u32(PID_STATUS_INFO, 0x0001, true));
        let data = Data {
            inline_qos: Some(qos),
            ..sample_data()
        };
        assert_eq!(round_trip(&data), data);
    }

    #[test]
    fn test_data_without_payload() {
        let data = Data {
            payload: None,
            ..sample_data()
        };
        let decoded = round_trip(&data);
        assert_eq!(decoded.payload, None);
    }

    #[test]
    fn test_data_rejects_non_positive_sequence() {
        let data = Data {
            writer_sn: 1,
            ..sample_data()
        };
        let mut buf = Vec::new();
        data.encode(&mut buf);
        // Corrupt the sequence number to zero (high + low words at offset
        // 4 (submsg hdr) + 2 + 2 + 4 + 4 = 16).
        for b in &mut buf[16..24] {
            *b = 0;
        }
        assert!(Data::decode(&buf[4..], buf[1]).is_err());
    }

    #[test]
    fn test_data_frag_round_trip() {
        let frag = DataFrag {
            reader_id: EntityId::UNKNOWN,
            writer_id: EntityId([0, 0, 1, 0x03]),
            writer_sn: 3,
            fragment_starting_num: 1,
            fragments_in_submessage: 1,
            fragment_size: 1024,
            sample_size: 900,
            inline_qos: None,
            payload: vec![0xAB; 900],
            key_flag: false,
        };
        let mut buf = Vec::new();
        frag.encode(&mut buf);
        let decoded = DataFrag::decode(&buf[4..], buf[1]).expect("decode");
        assert_eq!(decoded, frag);
    }

    #[test]
    fn test_data_frag_rejects_zero_fragment_size() {
        let frag = DataFrag {
            reader_id: EntityId::UNKNOWN,
            writer_id: EntityId([0, 0, 1, 0x03]),
            writer_sn: 3,
            fragment_starting_num: 1,
            fragments_in_submessage: 1,
            fragment_size: 8,
            sample_size: 8,
            inline_qos: None,
            payload: vec![0; 8],
            key_flag: false,
        };
        let mut buf = Vec::new();
        frag.encode(&mut buf);
        // fragment_size sits after readerId+writerId+SN+fragStart+fragCount:
        // offset 4 + 4 + 16 + 4 + 2 = 30.
        buf[30] = 0;
        buf[31] = 0;
        assert!(DataFrag::decode(&buf[4..], buf[1]).is_err());
    }
}
