// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Endpoint matching: topic/type equality, RxO QoS compatibility, and
//! partition intersection (DDS v1.4 Sec.2.2.3).
//!
//! The requester (reader) may ask for at most what the offerer (writer)
//! provides. An incompatible pair is never matched; the offending policy
//! id is reported so listeners can surface it.

use crate::qos::{PolicyId, QosPolicies};

/// Check every RxO rule. `Ok(())` means the pair is compatible;
/// `Err(policy)` names the first policy that failed.
///
/// | Policy            | Rule                                       |
/// |-------------------|--------------------------------------------|
/// | Reliability       | reader kind <= writer kind                 |
/// | Durability        | reader kind <= writer kind                 |
/// | Ownership         | reader kind == writer kind                 |
/// | Liveliness        | reader kind <= writer kind, reader lease >= writer lease |
/// | Deadline          | reader period >= writer period             |
/// | Latency budget    | reader duration >= writer duration         |
/// | Destination order | reader kind <= writer kind                 |
/// | Presentation      | reader scope <= writer scope               |
pub fn check_qos_compatibility(
    offered: &QosPolicies,
    requested: &QosPolicies,
) -> Result<(), PolicyId> {
    if requested.reliability.kind > offered.reliability.kind {
        return Err(PolicyId::Reliability);
    }
    if requested.durability > offered.durability {
        return Err(PolicyId::Durability);
    }
    if requested.ownership.kind != offered.ownership.kind {
        return Err(PolicyId::Ownership);
    }
    if requested.liveliness.kind > offered.liveliness.kind {
        return Err(PolicyId::Liveliness);
    }
    if requested.liveliness.lease_duration < offered.liveliness.lease_duration {
        return Err(PolicyId::Liveliness);
    }
    if requested.deadline.period < offered.deadline.period {
        return Err(PolicyId::Deadline);
    }
    if requested.latency_budget.duration < offered.latency_budget.duration {
        return Err(PolicyId::LatencyBudget);
    }
    if requested.destination_order.kind > offered.destination_order.kind {
        return Err(PolicyId::DestinationOrder);
    }
    if requested.presentation.access_scope > offered.presentation.access_scope {
        return Err(PolicyId::Presentation);
    }
    Ok(())
}

/// Partition matching: set intersection where any element matches as a
/// glob pattern (`*` any run, `?` one character). Two empty sets match
/// (both in the default partition).
#[must_use]
pub fn partitions_match(a: &[String], b: &[String]) -> bool {
    let a_default = a.is_empty() || (a.len() == 1 && a[0].is_empty());
    let b_default = b.is_empty() || (b.len() == 1 && b[0].is_empty());
    if a_default && b_default {
        return true;
    }
    if a_default || b_default {
        return false;
    }
    a.iter()
        .any(|x| b.iter().any(|y| glob_match(x, y) || glob_match(y, x)))
}

/// Glob pattern match supporting `*` and `?`.
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    glob_match_at(&pattern, &text)
}

fn glob_match_at(pattern: &[char], text: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('*') => {
            // '*' absorbs zero or more characters.
            (0..=text.len()).any(|skip| glob_match_at(&pattern[1..], &text[skip..]))
        }
        Some('?') => !text.is_empty() && glob_match_at(&pattern[1..], &text[1..]),
        Some(c) => text.first() == Some(c) && glob_match_at(&pattern[1..], &text[1..]),
    }
}

/// Full match decision for one (writer, reader) candidate pair.
///
/// Topic and type names must be equal, the QoS table must pass, and the
/// partitions must intersect.
pub fn evaluate_match(
    writer_topic: &str,
    writer_type: &str,
    writer_qos: &QosPolicies,
    reader_topic: &str,
    reader_type: &str,
    reader_qos: &QosPolicies,
) -> Result<(), MatchFailure> {
    if writer_topic != reader_topic {
        return Err(MatchFailure::TopicName);
    }
    if writer_type != reader_type {
        return Err(MatchFailure::TypeName);
    }
    check_qos_compatibility(writer_qos, reader_qos).map_err(MatchFailure::IncompatibleQos)?;
    if !partitions_match(&writer_qos.partition.names, &reader_qos.partition.names) {
        return Err(MatchFailure::IncompatibleQos(PolicyId::Partition));
    }
    Ok(())
}

/// Why a candidate pair did not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchFailure {
    TopicName,
    TypeName,
    IncompatibleQos(PolicyId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qos::{
        DdsDuration, Deadline, DurabilityKind, LatencyBudget, Liveliness, OwnershipKind,
        Reliability,
    };

    #[test]
    fn test_reliability_rule() {
        let reliable = QosPolicies::reliable(10);
        let best_effort = QosPolicies::best_effort(10);

        // BE reader <- reliable writer: ok.
        assert!(check_qos_compatibility(&reliable, &best_effort).is_ok());
        // Reliable reader <- BE writer: reliability mismatch.
        assert_eq!(
            check_qos_compatibility(&best_effort, &reliable),
            Err(PolicyId::Reliability)
        );
    }

    #[test]
    fn test_durability_rule() {
        let volatile = QosPolicies::default();
        let transient = QosPolicies {
            durability: DurabilityKind::TransientLocal,
            ..QosPolicies::default()
        };
        assert!(check_qos_compatibility(&transient, &volatile).is_ok());
        assert_eq!(
            check_qos_compatibility(&volatile, &transient),
            Err(PolicyId::Durability)
        );
    }

    #[test]
    fn test_ownership_must_match() {
        let shared = QosPolicies::default();
        let mut exclusive = QosPolicies::default();
        exclusive.ownership.kind = OwnershipKind::Exclusive;
        assert_eq!(
            check_qos_compatibility(&shared, &exclusive),
            Err(PolicyId::Ownership)
        );
        assert_eq!(
            check_qos_compatibility(&exclusive, &shared),
            Err(PolicyId::Ownership)
        );
        assert!(check_qos_compatibility(&exclusive, &exclusive).is_ok());
    }

    #[test]
    fn test_deadline_rule() {
        let fast_writer = QosPolicies {
            deadline: Deadline::from_millis(100),
            ..QosPolicies::default()
        };
        let slow_reader = QosPolicies {
            deadline: Deadline::from_millis(200),
            ..QosPolicies::default()
        };
        assert!(check_qos_compatibility(&fast_writer, &slow_reader).is_ok());
        assert_eq!(
            check_qos_compatibility(&slow_reader, &fast_writer),
            Err(PolicyId::Deadline)
        );
    }

    #[test]
    fn test_liveliness_lease_rule() {
        let writer = QosPolicies {
            liveliness: Liveliness::automatic_secs(5),
            ..QosPolicies::default()
        };
        let reader = QosPolicies {
            liveliness: Liveliness::automatic_secs(10),
            ..QosPolicies::default()
        };
        // reader lease >= writer lease: ok.
        assert!(check_qos_compatibility(&writer, &reader).is_ok());
        assert_eq!(
            check_qos_compatibility(&reader, &writer),
            Err(PolicyId::Liveliness)
        );
    }

    #[test]
    fn test_latency_budget_rule() {
        let tight = QosPolicies {
            latency_budget: LatencyBudget {
                duration: DdsDuration::from_millis(1),
            },
            ..QosPolicies::default()
        };
        let loose = QosPolicies {
            latency_budget: LatencyBudget {
                duration: DdsDuration::from_millis(50),
            },
            ..QosPolicies::default()
        };
        assert!(check_qos_compatibility(&tight, &loose).is_ok());
        assert_eq!(
            check_qos_compatibility(&loose, &tight),
            Err(PolicyId::LatencyBudget)
        );
    }

    #[test]
    fn test_glob_patterns() {
        assert!(glob_match("floor-*", "floor-3"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("room-?", "room-7"));
        assert!(!glob_match("room-?", "room-10"));
        assert!(glob_match("a*c", "abc"));
        assert!(glob_match("a*c", "ac"));
        assert!(!glob_match("a*c", "ab"));
    }

    #[test]
    fn test_partition_matching() {
        let empty: Vec<String> = Vec::new();
        assert!(partitions_match(&empty, &empty));
        assert!(!partitions_match(&empty, &["a".into()]));
        assert!(partitions_match(&["floor-*".into()], &["floor-2".into()]));
        assert!(!partitions_match(&["floor-1".into()], &["floor-2".into()]));
    }

    #[test]
    fn test_evaluate_match_topic_and_type() {
        let qos = QosPolicies::default();
        assert_eq!(
            evaluate_match("T1", "S", &qos, "T2", "S", &qos),
            Err(MatchFailure::TopicName)
        );
        assert_eq!(
            evaluate_match("T", "S1", &qos, "T", "S2", &qos),
            Err(MatchFailure::TypeName)
        );
        assert!(evaluate_match("T", "S", &qos, "T", "S", &qos).is_ok());
    }

    #[test]
    fn test_evaluate_match_reports_policy() {
        let writer = QosPolicies {
            reliability: Reliability::best_effort(),
            ..QosPolicies::default()
        };
        let reader = QosPolicies::reliable(1);
        assert_eq!(
            evaluate_match("T", "S", &writer, "T", "S", &reader),
            Err(MatchFailure::IncompatibleQos(PolicyId::Reliability))
        );
    }
}
