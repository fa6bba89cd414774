// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Best-effort stateless writer (RTPS v2.5 Sec.8.4.8).
//!
//! Keeps no per-reader state, only a list of reader locators. Fire and
//! forget: no HEARTBEAT emission, ACKNACKs are ignored.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::endpoint::{EndpointAttributes, MessageSender, SendPlan};
use crate::error::Result;
use crate::history::{encapsulate_payload, ChangeKind, PoolStrategy, WriteParams, WriterHistory};
use crate::protocol::message::{Data, InfoTimestamp, Submessage};
use crate::protocol::types::{EntityId, Guid, Locator, SequenceNumber};

struct Inner {
    history: WriterHistory,
    reader_locators: Vec<Locator>,
}

/// Best-effort writer addressing a plain locator list.
pub struct StatelessWriter {
    attrs: EndpointAttributes,
    sender: Arc<MessageSender>,
    inner: Mutex<Inner>,
}

impl StatelessWriter {
    pub fn new(attrs: EndpointAttributes, sender: Arc<MessageSender>) -> Result<Self> {
        attrs.qos.validate()?;
        let history = WriterHistory::new(
            attrs.guid,
            attrs.qos.history,
            attrs.qos.resource_limits.max_samples,
            PoolStrategy::Dynamic,
            1024,
        );
        Ok(Self {
            attrs,
            sender,
            inner: Mutex::new(Inner {
                history,
                reader_locators: Vec::new(),
            }),
        })
    }

    #[must_use]
    pub fn guid(&self) -> Guid {
        self.attrs.guid
    }

    #[must_use]
    pub fn attributes(&self) -> &EndpointAttributes {
        &self.attrs
    }

    /// Add a destination locator (idempotent).
    pub fn reader_locator_add(&self, locator: Locator) {
        let mut inner = self.inner.lock();
        if !inner.reader_locators.contains(&locator) {
            inner.reader_locators.push(locator);
        }
    }

    pub fn reader_locator_remove(&self, locator: &Locator) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.reader_locators.len();
        inner.reader_locators.retain(|l| l != locator);
        inner.reader_locators.len() != before
    }

    #[must_use]
    pub fn reader_locators(&self) -> Vec<Locator> {
        self.inner.lock().reader_locators.clone()
    }

    /// Store and immediately send one sample to every reader locator.
    pub fn write(&self, user_payload: &[u8], params: WriteParams) -> Result<SequenceNumber> {
        let (plan, seq) = {
            let mut inner = self.inner.lock();
            let outcome = inner.history.add_change(
                ChangeKind::Alive,
                [0u8; 16],
                encapsulate_payload(user_payload),
                params,
            )?;
            let submessages = match inner.history.get(outcome.sequence_number) {
                Some(change) => vec![
                    Submessage::InfoTimestamp(InfoTimestamp {
                        timestamp: Some(change.source_timestamp),
                    }),
                    Submessage::Data(Data {
                        reader_id: EntityId::UNKNOWN,
                        writer_id: self.attrs.guid.entity_id,
                        writer_sn: change.sequence_number,
                        inline_qos: None,
                        payload: Some(change.serialized_payload.clone()),
                        key_flag: false,
                    }),
                ],
                None => Vec::new(),
            };
            let plan = SendPlan {
                submessages,
                destinations: inner.reader_locators.clone(),
            };
            (plan, outcome.sequence_number)
        };
        self.sender.send(plan.submessages, &plan.destinations);
        Ok(seq)
    }

    #[must_use]
    pub fn last_sequence(&self) -> SequenceNumber {
        self.inner.lock().history.last_sequence()
    }
}
