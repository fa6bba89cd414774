// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! INFO_TS / INFO_DST / INFO_SRC submessages (RTPS v2.5 Sec.9.4.5.9-9.4.5.12).
//!
//! These interpreter submessages modify the receiver state for the
//! submessages that follow them within the same message.

use super::{finish_submessage, put_i32, put_u32, FLAG_ENDIANNESS, SubmessageReader};
use crate::error::{Error, Result};
use crate::protocol::constants::{SUBMSG_INFO_DST, SUBMSG_INFO_SRC, SUBMSG_INFO_TS};
use crate::protocol::types::{GuidPrefix, Time, VendorId};

/// INFO_TS flag bit 1: no timestamp follows (invalidate).
pub const FLAG_INFO_TS_INVALIDATE: u8 = 0x02;

/// INFO_TS: source timestamp for subsequent DATA submessages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoTimestamp {
    /// `None` invalidates any previous timestamp.
    pub timestamp: Option<Time>,
}

impl InfoTimestamp {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let header_pos = buf.len();
        let mut flags = FLAG_ENDIANNESS;
        if self.timestamp.is_none() {
            flags |= FLAG_INFO_TS_INVALIDATE;
        }
        buf.extend_from_slice(&[SUBMSG_INFO_TS, flags, 0, 0]);
        if let Some(ts) = &self.timestamp {
            put_i32(buf, ts.seconds, true);
            put_u32(buf, ts.fraction, true);
        }
        finish_submessage(buf, header_pos);
    }

    pub fn decode(payload: &[u8], flags: u8) -> Result<Self> {
        if flags & FLAG_INFO_TS_INVALIDATE != 0 {
            return Ok(Self { timestamp: None });
        }
        let le = flags & FLAG_ENDIANNESS != 0;
        let mut r = SubmessageReader::new(payload, le);
        let short = || Error::WireFormat("INFO_TS too short".into());
        let seconds = r.i32().ok_or_else(short)?;
        let fraction = r.u32().ok_or_else(short)?;
        Ok(Self {
            timestamp: Some(Time { seconds, fraction }),
        })
    }
}

/// INFO_DST: subsequent submessages are addressed to this participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoDestination {
    /// All zeros addresses every receiving participant.
    pub guid_prefix: GuidPrefix,
}

impl InfoDestination {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let header_pos = buf.len();
        buf.extend_from_slice(&[SUBMSG_INFO_DST, FLAG_ENDIANNESS, 0, 0]);
        buf.extend_from_slice(&self.guid_prefix);
        finish_submessage(buf, header_pos);
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let guid_prefix: GuidPrefix = payload
            .get(0..12)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| Error::WireFormat("INFO_DST too short".into()))?;
        Ok(Self { guid_prefix })
    }
}

/// INFO_SRC: subsequent submessages originate from this participant
/// (used by relays such as discovery servers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoSource {
    pub version: (u8, u8),
    pub vendor_id: VendorId,
    pub guid_prefix: GuidPrefix,
}

impl InfoSource {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        let header_pos = buf.len();
        buf.extend_from_slice(&[SUBMSG_INFO_SRC, FLAG_ENDIANNESS, 0, 0]);
        put_u32(buf, 0, true); // unused (reserved)
        buf.push(self.version.0);
        buf.push(self.version.1);
        buf.extend_from_slice(&self.vendor_id);
        buf.extend_from_slice(&self.guid_prefix);
        finish_submessage(buf, header_pos);
    }

    pub fn decode(payload: &[u8], le: bool) -> Result<Self> {
        let mut r = SubmessageReader::new(payload, le);
        let short = || Error::WireFormat("INFO_SRC too short".into());
        let _reserved = r.u32().ok_or_else(short)?;
        let major = r.u8().ok_or_else(short)?;
        let minor = r.u8().ok_or_else(short)?;
        let vendor: [u8; 2] = r.take(2).ok_or_else(short)?.try_into().unwrap_or([0, 0]);
        let guid_prefix = r.guid_prefix().ok_or_else(short)?;
        Ok(Self {
            version: (major, minor),
            vendor_id: vendor,
            guid_prefix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_ts_round_trip() {
        let ts = InfoTimestamp {
            timestamp: Some(Time {
                seconds: 1_700_000_000,
                fraction: 0x4000_0000,
            }),
        };
        let mut buf = Vec::new();
        ts.encode(&mut buf);
        let decoded = InfoTimestamp::decode(&buf[4..], buf[1]).expect("decode");
        assert_eq!(decoded, ts);
    }

    #[test]
    fn test_info_ts_invalidate() {
        let ts = InfoTimestamp { timestamp: None };
        let mut buf = Vec::new();
        ts.encode(&mut buf);
        // Invalidate flag set, zero-length payload.
        assert_eq!(buf.len(), 4);
        let decoded = InfoTimestamp::decode(&buf[4..], buf[1]).expect("decode");
        assert_eq!(decoded.timestamp, None);
    }

    #[test]
    fn test_info_dst_round_trip() {
        let dst = InfoDestination {
            guid_prefix: [9; 12],
        };
        let mut buf = Vec::new();
        dst.encode(&mut buf);
        let decoded = InfoDestination::decode(&buf[4..]).expect("decode");
        assert_eq!(decoded, dst);
    }

    #[test]
    fn test_info_src_round_trip() {
        let src = InfoSource {
            version: (2, 4),
            vendor_id: [0x01, 0xBB],
            guid_prefix: [3; 12],
        };
        let mut buf = Vec::new();
        src.encode(&mut buf);
        let decoded = InfoSource::decode(&buf[4..], true).expect("decode");
        assert_eq!(decoded, src);
    }
}
