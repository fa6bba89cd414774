// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! RTPS message codec (DDS-RTPS v2.5 Sec.8.3/9.4).
//!
//! A message is a fixed 20-byte header followed by a sequence of
//! submessages. Endianness is selected **per submessage** by flag bit 0;
//! entity ids and GUID prefixes are always big-endian. SDDS encodes
//! little-endian and decodes both.
//!
//! ```text
//! +--------+----------+-----------+--------------+
//! | 'RTPS' | ver(2)   | vendor(2) | guidPrefix(12)|
//! +--------+----------+-----------+--------------+
//! | id(1) | flags(1) | length(2) | payload ...   |  repeated
//! +-------+----------+-----------+---------------+
//! ```
//!
//! Decode policy for unknown submessage ids (Sec.8.3.4.1): ids in the
//! vendor-specific range (>= 0x80) are skipped by length; unknown ids in the
//! standard range drop the whole message.

mod acknack;
mod data;
mod gap;
mod heartbeat;
mod info;
mod seqset;

pub use acknack::{AckNack, NackFrag};
pub use data::{Data, DataFrag};
pub use gap::Gap;
pub use heartbeat::{Heartbeat, HeartbeatFrag};
pub use info::{InfoDestination, InfoSource, InfoTimestamp};
pub use seqset::{FragmentNumberSet, SequenceNumberSet, MAX_BITMAP_BITS};

use crate::error::{Error, Result};
use crate::protocol::constants::{
    RTPS_HEADER_SIZE, RTPS_MAGIC, RTPS_SUBMSG_HEADER_SIZE, RTPS_VERSION_MAJOR, RTPS_VERSION_MINOR,
    SDDS_VENDOR_ID, SUBMSG_ACKNACK, SUBMSG_DATA, SUBMSG_DATA_FRAG, SUBMSG_GAP, SUBMSG_HEARTBEAT,
    SUBMSG_HEARTBEAT_FRAG, SUBMSG_INFO_DST, SUBMSG_INFO_SRC, SUBMSG_INFO_TS, SUBMSG_NACK_FRAG,
    SUBMSG_PAD, SUBMSG_VENDOR_RANGE_START,
};
use crate::protocol::types::{EntityId, GuidPrefix, SequenceNumber, VendorId};

/// Submessage flag bit 0: payload is little-endian.
pub const FLAG_ENDIANNESS: u8 = 0x01;

// ============================================================================
// Primitive put/get helpers
// ============================================================================

pub(crate) fn put_u16(buf: &mut Vec<u8>, v: u16, le: bool) {
    buf.extend_from_slice(&if le { v.to_le_bytes() } else { v.to_be_bytes() });
}

pub(crate) fn put_u32(buf: &mut Vec<u8>, v: u32, le: bool) {
    buf.extend_from_slice(&if le { v.to_le_bytes() } else { v.to_be_bytes() });
}

pub(crate) fn put_i32(buf: &mut Vec<u8>, v: i32, le: bool) {
    buf.extend_from_slice(&if le { v.to_le_bytes() } else { v.to_be_bytes() });
}

/// Sequence numbers travel as high(i32) + low(u32).
pub(crate) fn put_sequence_number(buf: &mut Vec<u8>, seq: SequenceNumber, le: bool) {
    put_i32(buf, (seq >> 32) as i32, le);
    put_u32(buf, seq as u32, le);
}

/// Bounds-checked cursor over a submessage payload.
///
/// Multi-byte integers honor the submessage endianness; entity ids and GUID
/// prefixes are raw octets (always big-endian on the wire).
pub struct SubmessageReader<'a> {
    buf: &'a [u8],
    pos: usize,
    le: bool,
}

impl<'a> SubmessageReader<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8], le: bool) -> Self {
        Self { buf, pos: 0, le }
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Current read offset.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Reposition the cursor (used for octets-to-inline-QoS jumps).
    pub fn seek(&mut self, pos: usize) -> Option<()> {
        if pos > self.buf.len() {
            return None;
        }
        self.pos = pos;
        Some(())
    }

    pub fn u8(&mut self) -> Option<u8> {
        let v = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(v)
    }

    pub fn u16(&mut self) -> Option<u16> {
        let bytes: [u8; 2] = self.take(2)?.try_into().ok()?;
        Some(if self.le {
            u16::from_le_bytes(bytes)
        } else {
            u16::from_be_bytes(bytes)
        })
    }

    pub fn u32(&mut self) -> Option<u32> {
        let bytes: [u8; 4] = self.take(4)?.try_into().ok()?;
        Some(if self.le {
            u32::from_le_bytes(bytes)
        } else {
            u32::from_be_bytes(bytes)
        })
    }

    pub fn i32(&mut self) -> Option<i32> {
        self.u32().map(|v| v as i32)
    }

    pub fn sequence_number(&mut self) -> Option<SequenceNumber> {
        let high = self.i32()?;
        let low = self.u32()?;
        Some((i64::from(high) << 32) | i64::from(low))
    }

    pub fn entity_id(&mut self) -> Option<EntityId> {
        let bytes: [u8; 4] = self.take(4)?.try_into().ok()?;
        Some(EntityId(bytes))
    }

    pub fn guid_prefix(&mut self) -> Option<GuidPrefix> {
        self.take(12)?.try_into().ok()
    }

    pub fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return None;
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }
}

// ============================================================================
// Header
// ============================================================================

/// 20-byte RTPS message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: (u8, u8),
    pub vendor_id: VendorId,
    pub guid_prefix: GuidPrefix,
}

impl Header {
    /// Header announcing this implementation's version and vendor id.
    #[must_use]
    pub fn new(guid_prefix: GuidPrefix) -> Self {
        Self {
            version: (RTPS_VERSION_MAJOR, RTPS_VERSION_MINOR),
            vendor_id: SDDS_VENDOR_ID,
            guid_prefix,
        }
    }

    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(RTPS_MAGIC);
        buf.push(self.version.0);
        buf.push(self.version.1);
        buf.extend_from_slice(&self.vendor_id);
        buf.extend_from_slice(&self.guid_prefix);
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < RTPS_HEADER_SIZE {
            return Err(Error::WireFormat("message shorter than RTPS header".into()));
        }
        if &buf[0..4] != RTPS_MAGIC {
            return Err(Error::WireFormat("bad RTPS magic".into()));
        }
        let version = (buf[4], buf[5]);
        if version.0 != RTPS_VERSION_MAJOR {
            return Err(Error::WireFormat(format!(
                "unsupported protocol version {}.{}",
                version.0, version.1
            )));
        }
        let vendor_id = [buf[6], buf[7]];
        let mut guid_prefix = [0u8; 12];
        guid_prefix.copy_from_slice(&buf[8..20]);
        Ok(Self {
            version,
            vendor_id,
            guid_prefix,
        })
    }
}

// ============================================================================
// Submessage
// ============================================================================

/// One decoded RTPS submessage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submessage {
    Data(Data),
    DataFrag(DataFrag),
    Heartbeat(Heartbeat),
    HeartbeatFrag(HeartbeatFrag),
    AckNack(AckNack),
    NackFrag(NackFrag),
    Gap(Gap),
    InfoTimestamp(InfoTimestamp),
    InfoDestination(InfoDestination),
    InfoSource(InfoSource),
}

impl Submessage {
    /// Append the full submessage (header + payload), little-endian.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Submessage::Data(s) => s.encode(buf),
            Submessage::DataFrag(s) => s.encode(buf),
            Submessage::Heartbeat(s) => s.encode(buf),
            Submessage::HeartbeatFrag(s) => s.encode(buf),
            Submessage::AckNack(s) => s.encode(buf),
            Submessage::NackFrag(s) => s.encode(buf),
            Submessage::Gap(s) => s.encode(buf),
            Submessage::InfoTimestamp(s) => s.encode(buf),
            Submessage::InfoDestination(s) => s.encode(buf),
            Submessage::InfoSource(s) => s.encode(buf),
        }
    }
}

/// Patch the 2-byte length field once a submessage payload is complete.
///
/// `header_pos` is the offset of the submessage id within `buf`.
pub(crate) fn finish_submessage(buf: &mut Vec<u8>, header_pos: usize) {
    let payload_len = buf.len() - header_pos - RTPS_SUBMSG_HEADER_SIZE;
    let len = u16::try_from(payload_len).unwrap_or(u16::MAX);
    let bytes = len.to_le_bytes();
    buf[header_pos + 2] = bytes[0];
    buf[header_pos + 3] = bytes[1];
}

// ============================================================================
// Message
// ============================================================================

/// A complete RTPS message: header + submessages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub submessages: Vec<Submessage>,
}

impl Message {
    #[must_use]
    pub fn new(guid_prefix: GuidPrefix) -> Self {
        Self {
            header: Header::new(guid_prefix),
            submessages: Vec::new(),
        }
    }

    /// Fluent append.
    #[must_use]
    pub fn with(mut self, sub: Submessage) -> Self {
        self.submessages.push(sub);
        self
    }

    /// Serialize the full message, little-endian submessages.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(RTPS_HEADER_SIZE + 64 * self.submessages.len());
        self.header.encode(&mut buf);
        for sub in &self.submessages {
            sub.encode(&mut buf);
        }
        buf
    }

    /// Parse a received datagram.
    ///
    /// Tolerates unknown vendor-range submessage ids (skipped by length);
    /// an unknown id in the standard range fails the whole message.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = Header::decode(bytes)?;
        let mut submessages = Vec::new();
        let mut offset = RTPS_HEADER_SIZE;

        while offset < bytes.len() {
            if bytes.len() - offset < RTPS_SUBMSG_HEADER_SIZE {
                return Err(Error::WireFormat("truncated submessage header".into()));
            }
            let id = bytes[offset];
            let flags = bytes[offset + 1];
            let le = flags & FLAG_ENDIANNESS != 0;
            let wire_len = {
                let raw = [bytes[offset + 2], bytes[offset + 3]];
                if le {
                    u16::from_le_bytes(raw)
                } else {
                    u16::from_be_bytes(raw)
                }
            } as usize;

            let payload_start = offset + RTPS_SUBMSG_HEADER_SIZE;
            // Length zero: "until end of message", only legal for the final
            // submessage.
            let payload_end = if wire_len == 0 {
                bytes.len()
            } else {
                payload_start + wire_len
            };
            if payload_end > bytes.len() {
                return Err(Error::WireFormat(format!(
                    "submessage {:#04x} length {} overruns message",
                    id, wire_len
                )));
            }
            let payload = &bytes[payload_start..payload_end];

            match Self::decode_submessage(id, flags, payload)? {
                DecodedSubmessage::Known(sub) => submessages.push(sub),
                DecodedSubmessage::Skipped => {}
            }

            offset = payload_end;
        }

        Ok(Self {
            header,
            submessages,
        })
    }

    fn decode_submessage(id: u8, flags: u8, payload: &[u8]) -> Result<DecodedSubmessage> {
        let le = flags & FLAG_ENDIANNESS != 0;
        let known = match id {
            SUBMSG_DATA => Submessage::Data(Data::decode(payload, flags)?),
            SUBMSG_DATA_FRAG => Submessage::DataFrag(DataFrag::decode(payload, flags)?),
            SUBMSG_HEARTBEAT => Submessage::Heartbeat(Heartbeat::decode(payload, flags)?),
            SUBMSG_HEARTBEAT_FRAG => {
                Submessage::HeartbeatFrag(HeartbeatFrag::decode(payload, le)?)
            }
            SUBMSG_ACKNACK => Submessage::AckNack(AckNack::decode(payload, flags)?),
            SUBMSG_NACK_FRAG => Submessage::NackFrag(NackFrag::decode(payload, le)?),
            SUBMSG_GAP => Submessage::Gap(Gap::decode(payload, le)?),
            SUBMSG_INFO_TS => Submessage::InfoTimestamp(InfoTimestamp::decode(payload, flags)?),
            SUBMSG_INFO_DST => Submessage::InfoDestination(InfoDestination::decode(payload)?),
            SUBMSG_INFO_SRC => Submessage::InfoSource(InfoSource::decode(payload, le)?),
            SUBMSG_PAD => return Ok(DecodedSubmessage::Skipped),
            id if id >= SUBMSG_VENDOR_RANGE_START => {
                log::trace!("[RTPS] skipping vendor submessage id={:#04x}", id);
                return Ok(DecodedSubmessage::Skipped);
            }
            id => {
                return Err(Error::WireFormat(format!(
                    "unknown standard submessage id {:#04x}",
                    id
                )));
            }
        };
        Ok(DecodedSubmessage::Known(known))
    }
}

enum DecodedSubmessage {
    Known(Submessage),
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::ENTITYID_SPDP_WRITER;

    fn prefix() -> GuidPrefix {
        [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]
    }

    #[test]
    fn test_header_round_trip() {
        let msg = Message::new(prefix());
        let bytes = msg.encode();
        assert_eq!(bytes.len(), RTPS_HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"RTPS");

        let decoded = Message::decode(&bytes).expect("decode");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut bytes = Message::new(prefix()).encode();
        bytes[0] = b'X';
        assert!(matches!(
            Message::decode(&bytes),
            Err(Error::WireFormat(_))
        ));
    }

    #[test]
    fn test_full_message_round_trip() {
        let msg = Message::new(prefix())
            .with(Submessage::InfoTimestamp(InfoTimestamp {
                timestamp: Some(crate::protocol::types::Time {
                    seconds: 100,
                    fraction: 0x8000_0000,
                }),
            }))
            .with(Submessage::Heartbeat(Heartbeat {
                reader_id: EntityId::UNKNOWN,
                writer_id: ENTITYID_SPDP_WRITER,
                first_sn: 1,
                last_sn: 9,
                count: 3,
                final_flag: false,
                liveliness_flag: false,
            }));

        let bytes = msg.encode();
        let decoded = Message::decode(&bytes).expect("decode");
        assert_eq!(decoded, msg);
        // Canonical LE encoding re-encodes byte-identically.
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn test_vendor_submessage_skipped() {
        let mut bytes = Message::new(prefix()).encode();
        // Vendor-range submessage: id 0x90, LE flag, 4-byte payload.
        bytes.extend_from_slice(&[0x90, 0x01, 0x04, 0x00, 0xAA, 0xBB, 0xCC, 0xDD]);
        let decoded = Message::decode(&bytes).expect("vendor id must be skipped");
        assert!(decoded.submessages.is_empty());
    }

    #[test]
    fn test_unknown_standard_submessage_drops_message() {
        let mut bytes = Message::new(prefix()).encode();
        bytes.extend_from_slice(&[0x3F, 0x01, 0x00, 0x00]);
        assert!(matches!(
            Message::decode(&bytes),
            Err(Error::WireFormat(_))
        ));
    }

    #[test]
    fn test_zero_length_final_submessage() {
        let msg = Message::new(prefix()).with(Submessage::InfoDestination(InfoDestination {
            guid_prefix: prefix(),
        }));
        let mut bytes = msg.encode();
        // Rewrite the final submessage length to zero ("until end of message").
        bytes[RTPS_HEADER_SIZE + 2] = 0;
        bytes[RTPS_HEADER_SIZE + 3] = 0;
        let decoded = Message::decode(&bytes).expect("zero length legal for final submessage");
        assert_eq!(decoded.submessages.len(), 1);
    }

    #[test]
    fn test_truncated_submessage_rejected() {
        let mut bytes = Message::new(prefix()).encode();
        // Claims 100-byte payload but supplies none.
        bytes.extend_from_slice(&[SUBMSG_GAP, 0x01, 100, 0x00]);
        assert!(Message::decode(&bytes).is_err());
    }
}
