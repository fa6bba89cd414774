// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Writer Liveliness Protocol (WLP): ParticipantMessage samples asserting
//! writer liveliness (DDS v1.4 Sec.2.2.3.11, RTPS v2.5 Sec.8.4.13).
//!
//! AUTOMATIC kinds are asserted by the participant's event thread at a
//! third of the lease duration; MANUAL kinds require the application to
//! call `assert_liveliness`. A peer whose assertions stop arriving flips
//! its writers to not-alive.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::endpoint::{MessageSender, SendPlan};
use crate::error::{Error, Result};
use crate::protocol::constants::{ENTITYID_WLP_WRITER, PLAIN_CDR_LE};
use crate::protocol::message::{Data, Submessage};
use crate::protocol::types::{EntityId, GuidPrefix, Locator, SequenceNumber};
use crate::qos::LivelinessKind;

/// ParticipantMessage kind: automatic liveliness assertion.
pub const PARTICIPANT_MESSAGE_AUTOMATIC: [u8; 4] = [0x00, 0x00, 0x00, 0x01];
/// ParticipantMessage kind: manual-by-participant assertion.
pub const PARTICIPANT_MESSAGE_MANUAL: [u8; 4] = [0x00, 0x00, 0x00, 0x02];

/// One ParticipantMessage sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantMessage {
    pub guid_prefix: GuidPrefix,
    pub kind: [u8; 4],
    pub data: Vec<u8>,
}

impl ParticipantMessage {
    /// Serialize with a PLAIN_CDR_LE encapsulation.
    #[must_use]
    pub fn to_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(4 + 12 + 4 + 4 + self.data.len());
        payload.extend_from_slice(&PLAIN_CDR_LE.to_be_bytes());
        payload.extend_from_slice(&[0x00, 0x00]);
        payload.extend_from_slice(&self.guid_prefix);
        payload.extend_from_slice(&self.kind);
        payload.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        payload.extend_from_slice(&self.data);
        while payload.len() % 4 != 0 {
            payload.push(0);
        }
        payload
    }

    /// Parse from a received payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        if payload.len() < 4 + 12 + 4 + 4 {
            return Err(Error::WireFormat("ParticipantMessage too short".into()));
        }
        let body = &payload[4..];
        let guid_prefix: GuidPrefix = body[0..12]
            .try_into()
            .map_err(|_| Error::WireFormat("ParticipantMessage prefix".into()))?;
        let kind: [u8; 4] = body[12..16]
            .try_into()
            .map_err(|_| Error::WireFormat("ParticipantMessage kind".into()))?;
        let len = u32::from_le_bytes(
            body[16..20]
                .try_into()
                .map_err(|_| Error::WireFormat("ParticipantMessage length".into()))?,
        ) as usize;
        let data = body
            .get(20..20 + len)
            .ok_or_else(|| Error::WireFormat("ParticipantMessage data overrun".into()))?
            .to_vec();
        Ok(Self {
            guid_prefix,
            kind,
            data,
        })
    }
}

/// WLP engine: emits and receives liveliness assertions.
pub struct Wlp {
    sender: Arc<MessageSender>,
    seq: AtomicI64,
}

impl Wlp {
    #[must_use]
    pub fn new(sender: Arc<MessageSender>) -> Self {
        Self {
            sender,
            seq: AtomicI64::new(0),
        }
    }

    /// Assert liveliness of the local participant's writers of `kind`.
    pub fn assert_liveliness(&self, kind: LivelinessKind, destinations: &[Locator]) {
        if destinations.is_empty() {
            return;
        }
        let message_kind = match kind {
            LivelinessKind::Automatic => PARTICIPANT_MESSAGE_AUTOMATIC,
            LivelinessKind::ManualByParticipant | LivelinessKind::ManualByTopic => {
                PARTICIPANT_MESSAGE_MANUAL
            }
        };
        let message = ParticipantMessage {
            guid_prefix: self.sender.guid_prefix(),
            kind: message_kind,
            data: Vec::new(),
        };
        let data = Data {
            reader_id: EntityId::UNKNOWN,
            writer_id: ENTITYID_WLP_WRITER,
            writer_sn: self.next_sequence(),
            inline_qos: None,
            payload: Some(message.to_payload()),
            key_flag: false,
        };
        SendPlan::send_all(
            vec![SendPlan {
                submessages: vec![Submessage::Data(data)],
                destinations: destinations.to_vec(),
            }],
            &self.sender,
        );
    }

    /// Process a received ParticipantMessage DATA. Returns the asserting
    /// participant and whether the assertion was manual.
    pub fn process_data(&self, data: &Data) -> Result<(GuidPrefix, bool)> {
        let payload = data
            .payload
            .as_ref()
            .ok_or_else(|| Error::WireFormat("WLP DATA without payload".into()))?;
        let message = ParticipantMessage::from_payload(payload)?;
        let manual = message.kind == PARTICIPANT_MESSAGE_MANUAL;
        Ok((message.guid_prefix, manual))
    }

    fn next_sequence(&self) -> SequenceNumber {
        self.seq.fetch_add(1, Ordering::AcqRel) + 1
    }
}
