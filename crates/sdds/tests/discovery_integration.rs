// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Full-participant discovery scenarios over a shared in-memory
//! transport: match, publish/deliver, unmatch on participant destruction,
//! rematch with the same GUID prefix, QoS-mismatch reporting, and
//! teardown idempotence.
//!
//! Background threads are disabled; the tests drive discovery and
//! protocol passes explicitly, so every exchange happens synchronously
//! inside the tick that caused it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use sdds::endpoint::reader::Reader;
use sdds::endpoint::writer::Writer;
use sdds::participant::{
    BuiltinAttributes, ListenerSet, ParticipantAttributes, RtpsParticipant,
};
use sdds::persistence::InMemoryPersistence;
use sdds::protocol::types::{GuidPrefix, LOCATOR_KIND_UDPV4};
use sdds::qos::{PolicyId, QosPolicies};
use sdds::transport::shm::MetatrafficEnforcement;
use sdds::transport::test_support::MemTransport;
use sdds::transport::TransportRegistry;

fn participant(mem: &Arc<MemTransport>, prefix: GuidPrefix) -> RtpsParticipant {
    let mut registry = TransportRegistry::new();
    registry.register(mem.clone());
    let attrs = ParticipantAttributes {
        domain_id: 0,
        guid_prefix: Some(prefix),
        builtin: BuiltinAttributes {
            use_background_threads: false,
            ..BuiltinAttributes::default()
        },
        ..ParticipantAttributes::default()
    };
    RtpsParticipant::with_transport_registry(
        attrs,
        registry,
        MetatrafficEnforcement::None,
        sdds::security::permissive(),
        Arc::new(InMemoryPersistence::new()),
    )
    .expect("participant")
}

fn stateful_writer(writer: &Writer) -> &Arc<sdds::endpoint::writer::StatefulWriter> {
    writer.as_stateful().expect("reliable writer is stateful")
}

fn stateful_reader(reader: &Reader) -> &Arc<sdds::endpoint::reader::StatefulReader> {
    reader.as_stateful().expect("reliable reader is stateful")
}

#[test]
fn discovery_matches_and_delivers() {
    let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));

    let p_reader = participant(&mem, [2; 12]);
    let subscriber = p_reader.create_subscriber();
    let reader = p_reader
        .create_reader(subscriber, "T", "S", QosPolicies::reliable(16), Vec::new())
        .expect("reader");

    let p_writer = participant(&mem, [1; 12]);
    let publisher = p_writer.create_publisher();
    let writer = p_writer
        .create_writer(publisher, "T", "S", QosPolicies::reliable(16), Vec::new())
        .expect("writer");

    // Mutual discovery: each announcement triggers the peer's EDP replay.
    p_writer.discovery_tick();
    p_reader.discovery_tick();

    let writer = stateful_writer(&writer);
    let reader = stateful_reader(&reader);
    assert!(writer.is_matched_to(reader.guid()), "writer sees the reader");
    assert!(reader.is_matched_to(writer.guid()), "reader sees the writer");

    for i in 1..=5 {
        writer
            .write(format!("m{}", i).as_bytes(), Default::default())
            .expect("write");
    }
    let taken = reader.take();
    assert_eq!(taken.len(), 5);
    assert_eq!(taken[0].user_payload().expect("payload"), b"m1");
    assert_eq!(taken[4].user_payload().expect("payload"), b"m5");
}

#[test]
fn rematch_after_participant_restart_with_same_prefix() {
    let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));

    let matched = Arc::new(AtomicUsize::new(0));
    let unmatched = Arc::new(AtomicUsize::new(0));

    let p_reader = participant(&mem, [2; 12]);
    {
        let matched = matched.clone();
        let unmatched = unmatched.clone();
        p_reader.set_listeners(ListenerSet {
            on_subscription_matched: Some(Box::new(move |status| {
                if status.matched {
                    matched.fetch_add(1, Ordering::Relaxed);
                } else {
                    unmatched.fetch_add(1, Ordering::Relaxed);
                }
            })),
            ..ListenerSet::default()
        });
    }
    let subscriber = p_reader.create_subscriber();
    let reader = p_reader
        .create_reader(subscriber, "T", "S", QosPolicies::reliable(16), Vec::new())
        .expect("reader");
    let reader = stateful_reader(&reader).clone();

    // First writer incarnation.
    let p_writer = participant(&mem, [1; 12]);
    let publisher = p_writer.create_publisher();
    let writer = p_writer
        .create_writer(publisher, "T", "S", QosPolicies::reliable(16), Vec::new())
        .expect("writer");
    p_writer.discovery_tick();
    p_reader.discovery_tick();
    assert_eq!(matched.load(Ordering::Relaxed), 1);

    for i in 1..=5 {
        stateful_writer(&writer)
            .write(format!("old_{}", i).as_bytes(), Default::default())
            .expect("write");
    }
    assert_eq!(reader.take().len(), 5);

    // Destroy the writer participant: the dispose announcement unmatches
    // immediately, without waiting for the lease.
    drop(p_writer);
    assert_eq!(unmatched.load(Ordering::Relaxed), 1, "reader saw the unmatch");
    assert!(reader.matched_writers().is_empty());

    // Recreate with the *same* GUID prefix and publish new samples.
    let p_writer = participant(&mem, [1; 12]);
    let publisher = p_writer.create_publisher();
    let writer = p_writer
        .create_writer(publisher, "T", "S", QosPolicies::reliable(16), Vec::new())
        .expect("writer");
    p_writer.discovery_tick();
    p_reader.discovery_tick();
    assert_eq!(matched.load(Ordering::Relaxed), 2, "reader saw the rematch");

    for i in 1..=5 {
        stateful_writer(&writer)
            .write(format!("new_{}", i).as_bytes(), Default::default())
            .expect("write");
    }
    let taken = reader.take();
    assert_eq!(taken.len(), 5, "exactly the five new samples, no duplicates");
    for (change, i) in taken.iter().zip(1..=5) {
        assert_eq!(
            change.user_payload().expect("payload"),
            format!("new_{}", i).as_bytes()
        );
    }
}

#[test]
fn incompatible_qos_reports_policy_id() {
    let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));

    let reported = Arc::new(AtomicUsize::new(0));
    let p_reader = participant(&mem, [2; 12]);
    {
        let reported = reported.clone();
        p_reader.set_listeners(ListenerSet {
            on_incompatible_qos: Some(Box::new(move |status| {
                assert_eq!(status.policy, PolicyId::Reliability);
                reported.fetch_add(1, Ordering::Relaxed);
            })),
            ..ListenerSet::default()
        });
    }
    let subscriber = p_reader.create_subscriber();
    let reader = p_reader
        .create_reader(subscriber, "T", "S", QosPolicies::reliable(8), Vec::new())
        .expect("reader");

    // Best-effort writer cannot serve a reliable reader.
    let p_writer = participant(&mem, [1; 12]);
    let publisher = p_writer.create_publisher();
    let _writer = p_writer
        .create_writer(publisher, "T", "S", QosPolicies::best_effort(8), Vec::new())
        .expect("writer");
    p_writer.discovery_tick();
    p_reader.discovery_tick();

    assert!(reported.load(Ordering::Relaxed) >= 1, "mismatch reported");
    assert!(
        stateful_reader(&reader).matched_writers().is_empty(),
        "incompatible pair must not match"
    );
}

#[test]
fn delete_contained_entities_is_idempotent() {
    let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));
    let p = participant(&mem, [3; 12]);

    let publisher = p.create_publisher();
    let subscriber = p.create_subscriber();
    p.create_writer(publisher, "T", "S", QosPolicies::reliable(4), Vec::new())
        .expect("writer");
    p.create_reader(subscriber, "T", "S", QosPolicies::reliable(4), Vec::new())
        .expect("reader");

    // A publisher still owning writers cannot be deleted.
    assert!(p.delete_publisher(publisher).is_err());

    p.delete_contained_entities();
    // Second call: same final state, no error.
    p.delete_contained_entities();

    // Everything is gone; the groups can be recreated freely.
    let publisher = p.create_publisher();
    assert!(p.delete_publisher(publisher).is_ok());
}

#[test]
fn entity_ids_are_unique_per_kind() {
    let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));
    let p = participant(&mem, [4; 12]);

    let publisher = p.create_publisher();
    let subscriber = p.create_subscriber();
    let w1 = p
        .create_writer(publisher, "A", "S", QosPolicies::reliable(4), Vec::new())
        .expect("w1");
    let w2 = p
        .create_writer(publisher, "B", "S", QosPolicies::reliable(4), Vec::new())
        .expect("w2");
    let r1 = p
        .create_reader(subscriber, "A", "S", QosPolicies::reliable(4), Vec::new())
        .expect("r1");

    assert_ne!(w1.guid().entity_id, w2.guid().entity_id);
    assert_ne!(w1.guid().entity_id, r1.guid().entity_id);
    // Disjoint pools by entity kind.
    assert_eq!(w1.guid().entity_id.kind(), 0x03);
    assert_eq!(r1.guid().entity_id.kind(), 0x04);
    // Topics draw from their own pool.
    let topic = p.register_topic().expect("topic id");
    assert_eq!(topic.kind(), 0x05);
}

#[test]
fn best_effort_pair_generates_no_metatraffic_acknacks() {
    let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));

    let p_reader = participant(&mem, [2; 12]);
    let subscriber = p_reader.create_subscriber();
    let reader = p_reader
        .create_reader(subscriber, "T", "S", QosPolicies::best_effort(16), Vec::new())
        .expect("reader");

    let p_writer = participant(&mem, [1; 12]);
    let publisher = p_writer.create_publisher();
    let writer = p_writer
        .create_writer(publisher, "T", "S", QosPolicies::best_effort(16), Vec::new())
        .expect("writer");

    p_writer.discovery_tick();
    p_reader.discovery_tick();

    mem.clear_sent_plans();
    let Writer::Stateless(writer) = &writer else {
        unreachable!("best-effort volatile writers are stateless");
    };
    for i in 1..=10 {
        writer
            .write(format!("hello_{}", i).as_bytes(), Default::default())
            .expect("write");
    }
    // Run protocol passes: a best-effort pair stays silent.
    p_reader.protocol_tick();
    p_writer.protocol_tick();

    let acknacks = mem
        .sent_plans()
        .iter()
        .filter_map(|record| sdds::protocol::message::Message::decode(&record.data).ok())
        .flat_map(|m| m.submessages)
        .filter(|s| matches!(s, sdds::protocol::message::Submessage::AckNack(_)))
        .count();
    assert_eq!(acknacks, 0, "no ACKNACK traffic for best-effort endpoints");

    let Reader::Stateless(reader) = &reader else {
        unreachable!("best-effort volatile readers are stateless");
    };
    let taken = reader.take();
    assert_eq!(taken.len(), 10);
    for (change, i) in taken.iter().zip(1..=10) {
        assert_eq!(
            change.user_payload().expect("payload"),
            format!("hello_{}", i).as_bytes()
        );
    }
}
