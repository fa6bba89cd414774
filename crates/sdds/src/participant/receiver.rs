// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Message receiver: parses inbound RTPS messages and dispatches each
//! submessage to the correct engine or endpoint by entity id.
//!
//! One receiver instance is installed per input channel; the transport's
//! receive thread invokes it synchronously, which preserves FIFO order per
//! source. Interpreter submessages (INFO_TS/INFO_DST/INFO_SRC) mutate the
//! per-message receiver state that applies to the submessages after them.

use std::sync::Arc;

use crate::participant::ParticipantCore;
use crate::protocol::constants::{
    ENTITYID_SEDP_PUBLICATIONS_WRITER, ENTITYID_SEDP_SUBSCRIPTIONS_WRITER, ENTITYID_SPDP_WRITER,
    ENTITYID_WLP_WRITER,
};
use crate::protocol::message::{Message, Submessage};
use crate::protocol::types::{GuidPrefix, Locator, Time, GUIDPREFIX_UNKNOWN};
use crate::transport::PacketReceiver;

/// Per-message interpreter state.
struct ReceiverState {
    source_prefix: GuidPrefix,
    destination_prefix: GuidPrefix,
    timestamp: Option<Time>,
}

/// Dispatches datagrams into a participant.
pub struct MessageReceiver {
    core: Arc<ParticipantCore>,
}

impl MessageReceiver {
    #[must_use]
    pub(crate) fn new(core: Arc<ParticipantCore>) -> Self {
        Self { core }
    }
}

impl PacketReceiver for MessageReceiver {
    fn on_packet(&self, data: &[u8], source: &Locator, destination: &Locator) {
        let message = match Message::decode(data) {
            Ok(message) => message,
            Err(e) => {
                // Wire errors are recovered locally: drop and warn.
                log::warn!(
                    "[RECEIVER] dropping malformed message from {}: {}",
                    source,
                    e
                );
                return;
            }
        };
        let _ = destination;

        let mut state = ReceiverState {
            source_prefix: message.header.guid_prefix,
            destination_prefix: GUIDPREFIX_UNKNOWN,
            timestamp: None,
        };

        for submessage in &message.submessages {
            self.dispatch(submessage, &mut state);
        }
    }
}

impl MessageReceiver {
    fn dispatch(&self, submessage: &Submessage, state: &mut ReceiverState) {
        // INFO_DST gates everything that follows it: a non-zero prefix
        // that is not ours means the rest is addressed to someone else.
        let addressed_to_us = state.destination_prefix == GUIDPREFIX_UNKNOWN
            || state.destination_prefix == self.core.guid_prefix();

        match submessage {
            Submessage::InfoTimestamp(info) => {
                state.timestamp = info.timestamp;
            }
            Submessage::InfoDestination(info) => {
                state.destination_prefix = info.guid_prefix;
            }
            Submessage::InfoSource(info) => {
                // A relay (discovery server) re-attributes the following
                // submessages to their original participant.
                state.source_prefix = info.guid_prefix;
                state.timestamp = None;
            }
            Submessage::Data(data) if addressed_to_us => match data.writer_id {
                id if id == ENTITYID_SPDP_WRITER => {
                    self.core.on_spdp_data(state.source_prefix, data);
                }
                id if id == ENTITYID_SEDP_PUBLICATIONS_WRITER => {
                    self.core.on_publications_data(state.source_prefix, data);
                }
                id if id == ENTITYID_SEDP_SUBSCRIPTIONS_WRITER => {
                    self.core.on_subscriptions_data(state.source_prefix, data);
                }
                id if id == ENTITYID_WLP_WRITER => {
                    self.core.on_wlp_data(data);
                }
                _ => {
                    self.core
                        .on_user_data(state.source_prefix, data, state.timestamp);
                }
            },
            Submessage::DataFrag(frag) if addressed_to_us => {
                self.core
                    .on_user_data_frag(state.source_prefix, frag, state.timestamp);
            }
            Submessage::Heartbeat(heartbeat) if addressed_to_us => {
                self.core.on_heartbeat(state.source_prefix, heartbeat);
            }
            Submessage::HeartbeatFrag(_) if addressed_to_us => {
                // Fragment-level heartbeats only matter for NACK_FRAG
                // generation; the whole-sample ACKNACK path covers
                // recovery, so these are informational.
            }
            Submessage::AckNack(acknack) if addressed_to_us => {
                self.core.on_acknack(state.source_prefix, acknack);
            }
            Submessage::NackFrag(nack) if addressed_to_us => {
                self.core.on_nack_frag(state.source_prefix, nack);
            }
            Submessage::Gap(gap) if addressed_to_us => {
                self.core.on_gap(state.source_prefix, gap);
            }
            _ => {
                log::trace!(
                    "[RECEIVER] submessage for {:02x?} skipped (not addressed to us)",
                    state.destination_prefix
                );
            }
        }
    }
}
