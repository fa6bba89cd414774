// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! CacheChange: the unit of data flow through histories and the wire.
//!
//! A change is either owned by a writer history (produced locally) or a
//! reader history (received from the wire). Ownership never moves after
//! construction; data is copied across the boundary.

use crate::error::{Error, Result};
use crate::protocol::constants::PLAIN_CDR_LE;
use crate::protocol::types::{Guid, InstanceHandle, SequenceNumber, Time, INSTANCE_HANDLE_UNKNOWN, SEQUENCE_NUMBER_UNKNOWN};

/// Liveliness of the sample's instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeKind {
    #[default]
    Alive,
    NotAliveDisposed,
    NotAliveUnregistered,
}

/// Globally unique identity of one sample: writer GUID + sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleIdentity {
    pub writer_guid: Guid,
    pub sequence_number: SequenceNumber,
}

impl SampleIdentity {
    pub const UNKNOWN: SampleIdentity = SampleIdentity {
        writer_guid: Guid::UNKNOWN,
        sequence_number: SEQUENCE_NUMBER_UNKNOWN,
    };
}

impl Default for SampleIdentity {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

/// Per-write metadata carried through the pipeline for request/reply
/// correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteParams {
    pub sample_identity: SampleIdentity,
    pub related_sample_identity: SampleIdentity,
}

// ============================================================================
// Serialized payload encapsulation
// ============================================================================

/// Wrap opaque user octets in a PLAIN_CDR_LE encapsulation: identifier (2B,
/// big-endian on the wire) + options (2B, low bits = pad count) + data +
/// padding to a 4-byte multiple.
#[must_use]
pub fn encapsulate_payload(user: &[u8]) -> Vec<u8> {
    let pad = user.len().next_multiple_of(4) - user.len();
    let mut buf = Vec::with_capacity(4 + user.len() + pad);
    buf.extend_from_slice(&PLAIN_CDR_LE.to_be_bytes());
    buf.extend_from_slice(&[0x00, pad as u8]);
    buf.extend_from_slice(user);
    buf.resize(buf.len() + pad, 0);
    buf
}

/// Strip the encapsulation header and padding, returning the user octets.
pub fn extract_payload(wire: &[u8]) -> Result<Vec<u8>> {
    if wire.len() < 4 {
        return Err(Error::WireFormat("payload shorter than encapsulation".into()));
    }
    let pad = (wire[3] & 0x03) as usize;
    let body = &wire[4..];
    if body.len() < pad {
        return Err(Error::WireFormat("payload padding exceeds body".into()));
    }
    Ok(body[..body.len() - pad].to_vec())
}

// ============================================================================
// CacheChange
// ============================================================================

/// One sample and its metadata inside a history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheChange {
    pub kind: ChangeKind,
    pub writer_guid: Guid,
    /// Key hash of the payload's instance, or all zeros for keyless topics.
    pub instance_handle: InstanceHandle,
    pub sequence_number: SequenceNumber,
    pub source_timestamp: Time,
    /// Serialized payload in wire form (encapsulation header included).
    pub serialized_payload: Vec<u8>,
    pub write_params: WriteParams,
}

impl CacheChange {
    /// An ALIVE change carrying `payload` (already encapsulated).
    #[must_use]
    pub fn alive(writer_guid: Guid, sequence_number: SequenceNumber, payload: Vec<u8>) -> Self {
        Self {
            kind: ChangeKind::Alive,
            writer_guid,
            instance_handle: INSTANCE_HANDLE_UNKNOWN,
            sequence_number,
            source_timestamp: Time::now(),
            serialized_payload: payload,
            write_params: WriteParams::default(),
        }
    }

    /// User octets with the encapsulation stripped.
    pub fn user_payload(&self) -> Result<Vec<u8>> {
        extract_payload(&self.serialized_payload)
    }
}
