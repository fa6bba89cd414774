// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Parameter-list CDR codec (RTPS v2.5 Sec.9.4.2.11).
//!
//! Used for inline QoS and for every PDP/EDP discovery payload. Each
//! parameter is `pid (u16) + length (u16, multiple of 4) + value`; the list
//! ends with `PID_SENTINEL`.

use super::constants::PID_SENTINEL;
use super::message::{put_u16, SubmessageReader};
use crate::error::{Error, Result};

/// One parameter: id + raw value bytes (value interpretation is the
/// caller's business and depends on the pid).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub pid: u16,
    pub value: Vec<u8>,
}

impl Parameter {
    #[must_use]
    pub fn new(pid: u16, value: Vec<u8>) -> Self {
        Self { pid, value }
    }

    /// u32 parameter in the given endianness.
    #[must_use]
    pub fn from_u32(pid: u16, v: u32, le: bool) -> Self {
        let value = if le {
            v.to_le_bytes().to_vec()
        } else {
            v.to_be_bytes().to_vec()
        };
        Self { pid, value }
    }

    /// CDR string parameter: length-prefixed, NUL-terminated, padded.
    #[must_use]
    pub fn from_string(pid: u16, s: &str, le: bool) -> Self {
        let mut value = Vec::with_capacity(4 + s.len() + 1);
        let len = (s.len() + 1) as u32;
        value.extend_from_slice(&if le { len.to_le_bytes() } else { len.to_be_bytes() });
        value.extend_from_slice(s.as_bytes());
        value.push(0);
        Self { pid, value }
    }

    /// Interpret the value as a u32.
    #[must_use]
    pub fn as_u32(&self, le: bool) -> Option<u32> {
        let bytes: [u8; 4] = self.value.get(0..4)?.try_into().ok()?;
        Some(if le {
            u32::from_le_bytes(bytes)
        } else {
            u32::from_be_bytes(bytes)
        })
    }

    /// Interpret the value as a CDR string.
    #[must_use]
    pub fn as_string(&self, le: bool) -> Option<String> {
        let len = self.as_u32(le)? as usize;
        if len == 0 {
            return Some(String::new());
        }
        let bytes = self.value.get(4..4 + len)?;
        // Strip the trailing NUL.
        let text = &bytes[..len - 1];
        String::from_utf8(text.to_vec()).ok()
    }
}

/// Ordered list of parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParameterList {
    pub parameters: Vec<Parameter>,
}

impl ParameterList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, p: Parameter) {
        self.parameters.push(p);
    }

    /// First parameter with the given pid.
    #[must_use]
    pub fn get(&self, pid: u16) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.pid == pid)
    }

    /// All parameters with the given pid (locator lists repeat the pid).
    pub fn get_all(&self, pid: u16) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().filter(move |p| p.pid == pid)
    }

    /// Append the wire representation including the sentinel. Parameter
    /// values are padded to 4-byte multiples.
    pub fn encode(&self, buf: &mut Vec<u8>, le: bool) {
        for p in &self.parameters {
            let padded = p.value.len().div_ceil(4) * 4;
            put_u16(buf, p.pid, le);
            put_u16(buf, padded as u16, le);
            buf.extend_from_slice(&p.value);
            buf.resize(buf.len() + (padded - p.value.len()), 0);
        }
        put_u16(buf, PID_SENTINEL, le);
        put_u16(buf, 0, le);
    }

    /// Parse a parameter list, consuming up to and including the sentinel.
    /// The reader is left positioned after the sentinel.
    pub fn decode(r: &mut SubmessageReader<'_>) -> Result<Self> {
        let mut parameters = Vec::new();
        loop {
            let pid = r
                .u16()
                .ok_or_else(|| Error::WireFormat("parameter list without sentinel".into()))?;
            let len = r
                .u16()
                .ok_or_else(|| Error::WireFormat("truncated parameter header".into()))?
                as usize;
            if pid == PID_SENTINEL {
                return Ok(Self { parameters });
            }
            let value = r
                .take(len)
                .ok_or_else(|| {
                    Error::WireFormat(format!("parameter {:#06x} overruns payload", pid))
                })?
                .to_vec();
            parameters.push(Parameter { pid, value });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::{PID_DOMAIN_ID, PID_TOPIC_NAME, PID_TYPE_NAME};
    use crate::protocol::message::SubmessageReader;

    #[test]
    fn test_round_trip() {
        let mut list = ParameterList::new();
        list.push(Parameter::from_u32(PID_DOMAIN_ID, 42, true));
        list.push(Parameter::from_string(PID_TOPIC_NAME, "sensors/temp", true));
        list.push(Parameter::from_string(PID_TYPE_NAME, "Temperature", true));

        let mut buf = Vec::new();
        list.encode(&mut buf, true);
        assert_eq!(buf.len() % 4, 0);

        let mut r = SubmessageReader::new(&buf, true);
        let decoded = ParameterList::decode(&mut r).expect("decode");
        assert_eq!(decoded.parameters.len(), 3);
        assert_eq!(decoded.get(PID_DOMAIN_ID).and_then(|p| p.as_u32(true)), Some(42));
        assert_eq!(
            decoded.get(PID_TOPIC_NAME).and_then(|p| p.as_string(true)),
            Some("sensors/temp".to_string())
        );
    }

    #[test]
    fn test_missing_sentinel_rejected() {
        let mut buf = Vec::new();
        put_u16_pair(&mut buf, PID_DOMAIN_ID, 4);
        buf.extend_from_slice(&42u32.to_le_bytes());
        // No sentinel.
        let mut r = SubmessageReader::new(&buf, true);
        assert!(ParameterList::decode(&mut r).is_err());
    }

    #[test]
    fn test_string_padding() {
        // "ab" -> 4-byte length + "ab\0" = 7 bytes, padded to 8 on the wire.
        let p = Parameter::from_string(PID_TOPIC_NAME, "ab", true);
        let mut list = ParameterList::new();
        list.push(p);
        let mut buf = Vec::new();
        list.encode(&mut buf, true);
        // header(4) + padded value(8) + sentinel(4)
        assert_eq!(buf.len(), 16);
    }

    #[test]
    fn test_big_endian_round_trip() {
        let mut list = ParameterList::new();
        list.push(Parameter::from_u32(PID_DOMAIN_ID, 7, false));
        let mut buf = Vec::new();
        list.encode(&mut buf, false);
        let mut r = SubmessageReader::new(&buf, false);
        let decoded = ParameterList::decode(&mut r).expect("decode");
        assert_eq!(decoded.get(PID_DOMAIN_ID).and_then(|p| p.as_u32(false)), Some(7));
    }

    fn put_u16_pair(buf: &mut Vec<u8>, pid: u16, len: u16) {
        buf.extend_from_slice(&pid.to_le_bytes());
        buf.extend_from_slice(&len.to_le_bytes());
    }
}
