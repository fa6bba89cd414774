// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Individual QoS policy definitions (DDS v1.4 Sec.2.2.3).
//!
//! Each policy is a small value type; the aggregate lives in
//! [`QosPolicies`](super::QosPolicies). Kinds that participate in RxO
//! compatibility derive `Ord` so the matching engine can compare them
//! directly (BEST_EFFORT < RELIABLE, VOLATILE < TRANSIENT_LOCAL < ...).

use super::duration::DdsDuration;

/// Numeric policy identifiers reported on QoS mismatch (DDS v1.4 Annex A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PolicyId {
    UserData = 1,
    Durability = 2,
    Presentation = 3,
    Deadline = 4,
    LatencyBudget = 5,
    Ownership = 6,
    Liveliness = 8,
    Partition = 10,
    Reliability = 11,
    DestinationOrder = 12,
    History = 13,
    ResourceLimits = 14,
}

// ============================================================================
// Reliability
// ============================================================================

/// Delivery guarantee kind. Ordering matters for RxO: a reader may request
/// at most what the writer offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ReliabilityKind {
    /// Fire-and-forget. No ACKNACK traffic, no HEARTBEAT emission.
    #[default]
    BestEffort,
    /// NACK-driven retransmission with writer-side history.
    Reliable,
}

/// Reliability policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reliability {
    pub kind: ReliabilityKind,
    /// Maximum time a reliable `write` may block on a full history.
    pub max_blocking_time: DdsDuration,
}

impl Default for Reliability {
    fn default() -> Self {
        Self {
            kind: ReliabilityKind::BestEffort,
            max_blocking_time: DdsDuration::from_millis(100),
        }
    }
}

impl Reliability {
    #[must_use]
    pub fn reliable() -> Self {
        Self {
            kind: ReliabilityKind::Reliable,
            max_blocking_time: DdsDuration::from_millis(100),
        }
    }

    #[must_use]
    pub fn best_effort() -> Self {
        Self::default()
    }
}

// ============================================================================
// Durability
// ============================================================================

/// Sample persistence kind, ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum DurabilityKind {
    #[default]
    Volatile,
    /// Writer replays its in-memory history to late joiners.
    TransientLocal,
    /// History survives the writer through the persistence service.
    Transient,
    /// History survives process restarts through the persistence service.
    Persistent,
}

// ============================================================================
// History / resource limits
// ============================================================================

/// History retention policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum History {
    /// Keep the most recent N samples per instance; overflow evicts the
    /// oldest sample of the written instance.
    KeepLast(u32),
    /// Keep everything within `ResourceLimits`; overflow fails the write.
    KeepAll,
}

impl Default for History {
    fn default() -> Self {
        Self::KeepLast(1)
    }
}

/// Resource limits applied to histories and proxy tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_samples: usize,
    pub max_instances: usize,
    pub max_samples_per_instance: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_samples: 5_000,
            max_instances: 10,
            max_samples_per_instance: 400,
        }
    }
}

// ============================================================================
// Deadline / latency budget / lifespan
// ============================================================================

/// Expected maximum inter-sample period per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline {
    pub period: DdsDuration,
}

impl Deadline {
    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        Self {
            period: DdsDuration::from_millis(millis),
        }
    }
}

/// Transport latency hint; compatible when the reader tolerates at least
/// what the writer announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyBudget {
    pub duration: DdsDuration,
}

impl Default for LatencyBudget {
    fn default() -> Self {
        Self {
            duration: DdsDuration::ZERO,
        }
    }
}

/// Sample expiration relative to the source timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lifespan {
    pub duration: DdsDuration,
}

// ============================================================================
// Liveliness
// ============================================================================

/// How a writer asserts it is alive, ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LivelinessKind {
    /// The participant's event thread asserts on the writer's behalf.
    #[default]
    Automatic,
    /// Any liveliness assertion by the participant covers the writer.
    ManualByParticipant,
    /// The application must assert each writer individually.
    ManualByTopic,
}

/// Liveliness policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liveliness {
    pub kind: LivelinessKind,
    pub lease_duration: DdsDuration,
}

impl Default for Liveliness {
    fn default() -> Self {
        Self {
            kind: LivelinessKind::Automatic,
            lease_duration: DdsDuration::INFINITE,
        }
    }
}

impl Liveliness {
    #[must_use]
    pub fn automatic_secs(secs: u32) -> Self {
        Self {
            kind: LivelinessKind::Automatic,
            lease_duration: DdsDuration::from_secs(secs),
        }
    }
}

// ============================================================================
// Ownership / destination order / presentation
// ============================================================================

/// Instance ownership arbitration. Must match exactly between endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OwnershipKind {
    #[default]
    Shared,
    Exclusive,
}

/// Ownership policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ownership {
    pub kind: OwnershipKind,
    /// Arbitration strength; only meaningful for EXCLUSIVE.
    pub strength: i32,
}

/// Cross-writer delivery ordering, ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum DestinationOrderKind {
    #[default]
    ByReceptionTimestamp,
    BySourceTimestamp,
}

/// Destination order policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DestinationOrder {
    pub kind: DestinationOrderKind,
}

/// Presentation access scope, ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PresentationAccessScope {
    #[default]
    Instance,
    Topic,
    Group,
}

/// Presentation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Presentation {
    pub access_scope: PresentationAccessScope,
    pub coherent_access: bool,
    pub ordered_access: bool,
}

// ============================================================================
// Partition
// ============================================================================

/// Logical data-space separation. Two endpoints match only when their
/// partition sets intersect, with each element treated as a glob pattern.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Partition {
    pub names: Vec<String>,
}

impl Partition {
    #[must_use]
    pub fn single(name: &str) -> Self {
        Self {
            names: vec![name.to_string()],
        }
    }

    /// An empty set means "the default partition".
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.names.is_empty() || (self.names.len() == 1 && self.names[0].is_empty())
    }
}

// ============================================================================
// Publish mode
// ============================================================================

/// Synchronous vs. asynchronous publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishModeKind {
    /// `write` sends inline on the caller's thread.
    #[default]
    Synchronous,
    /// `write` enqueues to a bounded per-writer queue drained by a flush
    /// thread; a full queue blocks up to max_blocking_time, then times out.
    Asynchronous,
}

/// Publish mode policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishMode {
    pub kind: PublishModeKind,
}

/// Opaque application-provided data attached to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserData {
    pub value: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_orderings() {
        assert!(ReliabilityKind::BestEffort < ReliabilityKind::Reliable);
        assert!(DurabilityKind::Volatile < DurabilityKind::TransientLocal);
        assert!(DurabilityKind::TransientLocal < DurabilityKind::Transient);
        assert!(DurabilityKind::Transient < DurabilityKind::Persistent);
        assert!(LivelinessKind::Automatic < LivelinessKind::ManualByTopic);
        assert!(
            DestinationOrderKind::ByReceptionTimestamp < DestinationOrderKind::BySourceTimestamp
        );
        assert!(PresentationAccessScope::Instance < PresentationAccessScope::Group);
    }

    #[test]
    fn test_partition_default() {
        assert!(Partition::default().is_default());
        assert!(Partition { names: vec![String::new()] }.is_default());
        assert!(!Partition::single("sensors").is_default());
    }
}
