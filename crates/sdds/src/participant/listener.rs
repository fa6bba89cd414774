// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Listener dispatch.
//!
//! Listeners are a struct of optional handlers keyed by event kind rather
//! than a trait with dozens of virtuals; dispatch is explicit and callable
//! from any module. Handlers must be non-blocking; the core never
//! re-enters an entity while its listener is executing.

use crate::discovery::data::ParticipantProxyData;
use crate::protocol::types::{Guid, GuidPrefix, SequenceNumber};
use crate::qos::PolicyId;

type Handler<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Match-status change payload.
#[derive(Debug, Clone, Copy)]
pub struct MatchedStatus {
    /// The local endpoint whose status changed.
    pub local: Guid,
    /// The remote endpoint joining or leaving the match.
    pub remote: Guid,
    /// `true` on match, `false` on unmatch.
    pub matched: bool,
}

/// QoS mismatch payload (observability: the offending policy id).
#[derive(Debug, Clone, Copy)]
pub struct IncompatibleQos {
    pub local: Guid,
    pub remote: Guid,
    pub policy: PolicyId,
}

/// Liveliness change payload.
#[derive(Debug, Clone, Copy)]
pub struct LivelinessChanged {
    pub writer: Guid,
    pub alive: bool,
}

/// Sample-lost payload.
#[derive(Debug, Clone, Copy)]
pub struct SampleLost {
    pub reader: Guid,
    pub writer: Guid,
    pub sequence_number: SequenceNumber,
}

/// Deadline-missed payload.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineMissed {
    pub endpoint: Guid,
}

/// Optional handlers for every observable event.
#[derive(Default)]
pub struct ListenerSet {
    pub on_participant_discovered: Option<Handler<ParticipantProxyData>>,
    pub on_participant_removed: Option<Handler<GuidPrefix>>,
    pub on_publication_matched: Option<Handler<MatchedStatus>>,
    pub on_subscription_matched: Option<Handler<MatchedStatus>>,
    pub on_incompatible_qos: Option<Handler<IncompatibleQos>>,
    pub on_liveliness_changed: Option<Handler<LivelinessChanged>>,
    pub on_sample_lost: Option<Handler<SampleLost>>,
    pub on_deadline_missed: Option<Handler<DeadlineMissed>>,
    pub on_data_available: Option<Handler<Guid>>,
}

impl ListenerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify_participant_discovered(&self, data: &ParticipantProxyData) {
        if let Some(handler) = &self.on_participant_discovered {
            handler(data);
        }
    }

    pub fn notify_participant_removed(&self, prefix: &GuidPrefix) {
        if let Some(handler) = &self.on_participant_removed {
            handler(prefix);
        }
    }

    pub fn notify_publication_matched(&self, status: &MatchedStatus) {
        if let Some(handler) = &self.on_publication_matched {
            handler(status);
        }
    }

    pub fn notify_subscription_matched(&self, status: &MatchedStatus) {
        if let Some(handler) = &self.on_subscription_matched {
            handler(status);
        }
    }

    pub fn notify_incompatible_qos(&self, status: &IncompatibleQos) {
        if let Some(handler) = &self.on_incompatible_qos {
            handler(status);
        }
    }

    pub fn notify_liveliness_changed(&self, status: &LivelinessChanged) {
        if let Some(handler) = &self.on_liveliness_changed {
            handler(status);
        }
    }

    pub fn notify_sample_lost(&self, status: &SampleLost) {
        if let Some(handler) = &self.on_sample_lost {
            handler(status);
        }
    }

    pub fn notify_deadline_missed(&self, status: &DeadlineMissed) {
        if let Some(handler) = &self.on_deadline_missed {
            handler(status);
        }
    }

    pub fn notify_data_available(&self, reader: &Guid) {
        if let Some(handler) = &self.on_data_available {
            handler(reader);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_unset_handlers_are_noops() {
        let listeners = ListenerSet::new();
        listeners.notify_participant_removed(&[0; 12]);
        listeners.notify_data_available(&Guid::UNKNOWN);
    }

    #[test]
    fn test_handler_invocation() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let listeners = ListenerSet {
            on_publication_matched: Some(Box::new(move |status| {
                assert!(status.matched);
                counter.fetch_add(1, Ordering::Relaxed);
            })),
            ..ListenerSet::default()
        };
        listeners.notify_publication_matched(&MatchedStatus {
            local: Guid::UNKNOWN,
            remote: Guid::UNKNOWN,
            matched: true,
        });
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }
}
