// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! End-to-end protocol scenarios over the deterministic in-memory
//! transport: best-effort delivery, reliable recovery, durable late
//! joiners, inconsistent-ACKNACK handling, and per-reader flow isolation.
//!
//! The exchanges are driven synchronously: every `write`/tick delivers
//! its packets before returning, so assertions never need sleeps.

use std::sync::Arc;

use sdds::endpoint::reader::{StatefulReader, StatelessReader, WriterProxy};
use sdds::endpoint::writer::{ReaderProxy, StatefulWriter, StatelessWriter};
use sdds::endpoint::{EndpointAttributes, MessageSender};
use sdds::protocol::message::{Message, Submessage};
use sdds::protocol::types::{EntityId, Guid, Locator, LOCATOR_KIND_UDPV4};
use sdds::qos::{DurabilityKind, QosPolicies};
use sdds::transport::test_support::MemTransport;
use sdds::transport::{PacketReceiver, Transport, TransportRegistry};

// ============================================================================
// Harness
// ============================================================================

const WRITER_PREFIX: [u8; 12] = [1; 12];
const READER_PREFIX: [u8; 12] = [2; 12];

fn writer_guid() -> Guid {
    Guid::new(WRITER_PREFIX, EntityId([0, 0, 1, 0x03]))
}

fn reader_guid(n: u8) -> Guid {
    Guid::new(READER_PREFIX, EntityId([0, 0, n, 0x04]))
}

fn locator(port: u32) -> Locator {
    Locator::udpv4([127, 0, 0, 1], port)
}

fn sender_over(mem: &Arc<MemTransport>, prefix: [u8; 12]) -> Arc<MessageSender> {
    let mut registry = TransportRegistry::new();
    registry.register(mem.clone());
    Arc::new(MessageSender::new(Arc::new(registry), prefix))
}

fn endpoint_attrs(guid: Guid, qos: QosPolicies, unicast: Vec<Locator>) -> EndpointAttributes {
    EndpointAttributes {
        guid,
        topic_name: "T".into(),
        type_name: "S".into(),
        qos,
        unicast_locators: unicast,
        multicast_locators: Vec::new(),
    }
}

/// Routes packets arriving at a reader's locator into the reader.
struct ReaderPort {
    reader: Arc<StatefulReader>,
}

impl PacketReceiver for ReaderPort {
    fn on_packet(&self, data: &[u8], _source: &Locator, _destination: &Locator) {
        let message = Message::decode(data).expect("well-formed message");
        let prefix = message.header.guid_prefix;
        for submessage in &message.submessages {
            match submessage {
                Submessage::Data(d) => self.reader.process_data(prefix, d, None),
                Submessage::DataFrag(f) => self.reader.process_data_frag(prefix, f, None),
                Submessage::Heartbeat(h) => self.reader.process_heartbeat(prefix, h),
                Submessage::Gap(g) => self.reader.process_gap(prefix, g),
                _ => {}
            }
        }
    }
}

/// Routes packets arriving at the writer's locator into the writer.
struct WriterPort {
    writer: Arc<StatefulWriter>,
}

impl PacketReceiver for WriterPort {
    fn on_packet(&self, data: &[u8], _source: &Locator, _destination: &Locator) {
        let message = Message::decode(data).expect("well-formed message");
        let prefix = message.header.guid_prefix;
        for submessage in &message.submessages {
            match submessage {
                Submessage::AckNack(a) => self.writer.process_acknack(prefix, a),
                Submessage::NackFrag(n) => self.writer.process_nack_frag(prefix, n),
                _ => {}
            }
        }
    }
}

/// Count submessages of one kind across every message sent on the wire.
fn count_submessages(mem: &MemTransport, pred: fn(&Submessage) -> bool) -> usize {
    mem.sent_plans()
        .iter()
        .filter_map(|record| Message::decode(&record.data).ok())
        .flat_map(|message| message.submessages)
        .filter(|submessage| pred(submessage))
        .count()
}

/// Wire a reliable writer/reader pair over `mem` with explicit locators.
fn reliable_pair(
    mem: &Arc<MemTransport>,
    writer_qos: QosPolicies,
    reader_qos: QosPolicies,
) -> (Arc<StatefulWriter>, Arc<StatefulReader>) {
    let writer_locator = locator(7410);
    let reader_locator = locator(7411);

    let writer = Arc::new(
        StatefulWriter::new(
            endpoint_attrs(writer_guid(), writer_qos, vec![writer_locator]),
            sender_over(mem, WRITER_PREFIX),
        )
        .expect("writer"),
    );
    let reader = Arc::new(
        StatefulReader::new(
            endpoint_attrs(reader_guid(1), reader_qos, vec![reader_locator]),
            sender_over(mem, READER_PREFIX),
        )
        .expect("reader"),
    );

    mem.open_input_channel(&reader_locator, Arc::new(ReaderPort { reader: reader.clone() }))
        .expect("reader port");
    mem.open_input_channel(&writer_locator, Arc::new(WriterPort { writer: writer.clone() }))
        .expect("writer port");

    reader.matched_writer_add(WriterProxy::new(
        writer.guid(),
        vec![writer_locator],
        Vec::new(),
        true,
    ));
    writer.matched_reader_add(ReaderProxy::new(
        reader.guid(),
        vec![reader_locator],
        Vec::new(),
        true,
        reader.attributes().qos.durability,
    ));

    (writer, reader)
}

// ============================================================================
// Scenario: best-effort hello world
// ============================================================================

#[test]
fn best_effort_delivery_without_acknacks() {
    let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));
    let reader_locator = locator(7411);

    let writer = StatelessWriter::new(
        endpoint_attrs(writer_guid(), QosPolicies::best_effort(12), Vec::new()),
        sender_over(&mem, WRITER_PREFIX),
    )
    .expect("writer");
    writer.reader_locator_add(reader_locator);

    let reader = Arc::new(
        StatelessReader::new(
            endpoint_attrs(reader_guid(1), QosPolicies::best_effort(12), vec![reader_locator]),
            sender_over(&mem, READER_PREFIX),
        )
        .expect("reader"),
    );

    struct StatelessPort(Arc<StatelessReader>);
    impl PacketReceiver for StatelessPort {
        fn on_packet(&self, data: &[u8], _s: &Locator, _d: &Locator) {
            let message = Message::decode(data).expect("well-formed");
            for submessage in &message.submessages {
                if let Submessage::Data(d) = submessage {
                    self.0.process_data(message.header.guid_prefix, d, None);
                }
            }
        }
    }
    mem.open_input_channel(&reader_locator, Arc::new(StatelessPort(reader.clone())))
        .expect("port");

    let payloads: Vec<String> = (1..=10).map(|i| format!("hello_{}", i)).collect();
    for payload in &payloads {
        writer.write(payload.as_bytes(), Default::default()).expect("write");
    }

    let taken = reader.take();
    assert_eq!(taken.len(), 10, "lossless transport delivers all ten");
    for (change, expected) in taken.iter().zip(&payloads) {
        assert_eq!(
            change.user_payload().expect("payload"),
            expected.as_bytes(),
            "delivered payload equals the published one"
        );
    }
    // In-order delivery.
    let seqs: Vec<i64> = taken.iter().map(|c| c.sequence_number).collect();
    assert_eq!(seqs, (1..=10).collect::<Vec<_>>());

    // Ten DATA submessages on the wire; no ACKNACK and no HEARTBEAT
    // traffic for a best-effort pair.
    assert_eq!(
        count_submessages(&mem, |s| matches!(s, Submessage::Data(_))),
        10
    );
    assert_eq!(
        count_submessages(&mem, |s| matches!(s, Submessage::AckNack(_))),
        0
    );
    assert_eq!(
        count_submessages(&mem, |s| matches!(s, Submessage::Heartbeat(_))),
        0
    );
}

// ============================================================================
// Scenario: reliable recovery after loss
// ============================================================================

#[test]
fn reliable_recovery_of_dropped_samples() {
    let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));

    // Drop the first transmission of samples 3 and 7.
    let mut dropped_3 = false;
    let mut dropped_7 = false;
    mem.set_drop_filter(Box::new(move |bytes, _dest| {
        let Ok(message) = Message::decode(bytes) else {
            return false;
        };
        for submessage in &message.submessages {
            if let Submessage::Data(d) = submessage {
                if d.writer_sn == 3 && !dropped_3 {
                    dropped_3 = true;
                    return true;
                }
                if d.writer_sn == 7 && !dropped_7 {
                    dropped_7 = true;
                    return true;
                }
            }
        }
        false
    }));

    let (writer, reader) = reliable_pair(
        &mem,
        QosPolicies::reliable(20),
        QosPolicies::reliable(20),
    );

    for i in 1..=10 {
        writer
            .write(format!("hello_{}", i).as_bytes(), Default::default())
            .expect("write");
    }

    // Holes at 3 and 7: only 1, 2 are deliverable so far.
    assert_eq!(reader.ack_watermark(writer.guid()), Some(2));

    // One heartbeat/acknack/repair cycle closes the holes.
    writer.heartbeat_tick();
    reader.acknack_tick();
    writer.repair();

    let taken = reader.take();
    assert_eq!(taken.len(), 10, "history eventually contains all ten");
    let seqs: Vec<i64> = taken.iter().map(|c| c.sequence_number).collect();
    assert_eq!(seqs, (1..=10).collect::<Vec<_>>(), "in order");

    // A further heartbeat round lets the reader ack everything.
    writer.heartbeat_tick();
    reader.acknack_tick();
    assert!(writer.is_acked_by_all(10));
    assert_eq!(writer.reader_ack_watermark(reader.guid()), Some(10));
}

// ============================================================================
// Scenario: durable late joiner
// ============================================================================

#[test]
fn transient_local_late_joiner_receives_history() {
    let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));
    let writer_locator = locator(7410);
    let reader_locator = locator(7411);

    let writer = Arc::new(
        StatefulWriter::new(
            endpoint_attrs(
                writer_guid(),
                QosPolicies::transient_local(10),
                vec![writer_locator],
            ),
            sender_over(&mem, WRITER_PREFIX),
        )
        .expect("writer"),
    );

    // Ten samples published before any reader exists.
    for i in 1..=10 {
        writer
            .write(format!("hist_{}", i).as_bytes(), Default::default())
            .expect("write");
    }

    let reader = Arc::new(
        StatefulReader::new(
            endpoint_attrs(
                reader_guid(1),
                QosPolicies::transient_local(10),
                vec![reader_locator],
            ),
            sender_over(&mem, READER_PREFIX),
        )
        .expect("reader"),
    );
    mem.open_input_channel(&reader_locator, Arc::new(ReaderPort { reader: reader.clone() }))
        .expect("port");

    reader.matched_writer_add(WriterProxy::new(
        writer.guid(),
        vec![writer_locator],
        Vec::new(),
        true,
    ));
    // Matching a durable reader replays the writer history.
    writer.matched_reader_add(ReaderProxy::new(
        reader.guid(),
        vec![reader_locator],
        Vec::new(),
        true,
        DurabilityKind::TransientLocal,
    ));

    let taken = reader.take();
    assert_eq!(taken.len(), 10, "all historic samples arrive");
    let seqs: Vec<i64> = taken.iter().map(|c| c.sequence_number).collect();
    assert_eq!(seqs, (1..=10).collect::<Vec<_>>(), "in order");
    assert_eq!(taken[0].user_payload().expect("payload"), b"hist_1");
    assert_eq!(taken[9].user_payload().expect("payload"), b"hist_10");
}

// ============================================================================
// Scenario: volatile reader skips history
// ============================================================================

#[test]
fn volatile_reader_only_sees_new_samples() {
    let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));
    let (writer, reader) = reliable_pair(
        &mem,
        QosPolicies::reliable(10),
        QosPolicies::reliable(10),
    );
    // Unmatch and republish before re-matching volatile.
    writer.matched_reader_remove(reader.guid());
    for i in 1..=5 {
        writer
            .write(format!("old_{}", i).as_bytes(), Default::default())
            .expect("write");
    }
    writer.matched_reader_add(ReaderProxy::new(
        reader.guid(),
        vec![locator(7411)],
        Vec::new(),
        true,
        DurabilityKind::Volatile,
    ));
    // Old samples are not replayed to a volatile reader.
    assert_eq!(reader.available(), 0);

    writer.write(b"new_1", Default::default()).expect("write");
    let taken = reader.take();
    assert_eq!(taken.len(), 1);
    assert_eq!(taken[0].user_payload().expect("payload"), b"new_1");
    // Sequence numbering continued from the unreplayed history.
    assert_eq!(taken[0].sequence_number, 6);
}

// ============================================================================
// Scenario: inconsistent ACKNACK
// ============================================================================

mod log_capture {
    use std::sync::{Mutex, OnceLock};

    pub struct CapturingLogger {
        pub records: Mutex<Vec<String>>,
    }

    impl log::Log for CapturingLogger {
        fn enabled(&self, _metadata: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            if let Ok(mut records) = self.records.lock() {
                records.push(format!("{}", record.args()));
            }
        }

        fn flush(&self) {}
    }

    pub fn install() -> &'static CapturingLogger {
        static LOGGER: OnceLock<&'static CapturingLogger> = OnceLock::new();
        *LOGGER.get_or_init(|| {
            let logger: &'static CapturingLogger = Box::leak(Box::new(CapturingLogger {
                records: Mutex::new(Vec::new()),
            }));
            let _ = log::set_logger(logger);
            log::set_max_level(log::LevelFilter::Debug);
            logger
        })
    }
}

#[test]
fn inconsistent_acknack_is_logged_and_ignored() {
    let logger = log_capture::install();
    let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));
    let (writer, reader) = reliable_pair(
        &mem,
        QosPolicies::reliable(10),
        QosPolicies::reliable(10),
    );

    for i in 1..=5 {
        writer
            .write(format!("s{}", i).as_bytes(), Default::default())
            .expect("write");
    }
    // The reader has everything; ack normally first.
    writer.heartbeat_tick();
    reader.acknack_tick();
    assert_eq!(writer.reader_ack_watermark(reader.guid()), Some(5));

    // Inject an ACKNACK whose base claims samples the writer never sent.
    let bogus = sdds::protocol::message::AckNack {
        reader_id: reader.guid().entity_id,
        writer_id: writer.guid().entity_id,
        reader_sn_state: sdds::protocol::message::SequenceNumberSet::new(5 + 5),
        count: 99,
        final_flag: false,
    };
    writer.process_acknack(READER_PREFIX, &bogus);

    // Logged once with the protocol-mandated wording, state untouched.
    let records = logger.records.lock().expect("records");
    let hits: Vec<&String> = records
        .iter()
        .filter(|r| r.contains("Inconsistent acknack"))
        .collect();
    assert_eq!(hits.len(), 1, "exactly one inconsistent-acknack log entry");
    drop(records);
    assert_eq!(
        writer.reader_ack_watermark(reader.guid()),
        Some(5),
        "proxy state not altered"
    );

    // The writer continues to service peers.
    writer.write(b"s6", Default::default()).expect("write");
    writer.heartbeat_tick();
    reader.acknack_tick();
    assert_eq!(writer.reader_ack_watermark(reader.guid()), Some(6));
}

#[test]
fn non_positive_acknack_base_is_protocol_error() {
    let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));
    let (writer, reader) = reliable_pair(
        &mem,
        QosPolicies::reliable(10),
        QosPolicies::reliable(10),
    );
    writer.write(b"x", Default::default()).expect("write");

    let bogus = sdds::protocol::message::AckNack {
        reader_id: reader.guid().entity_id,
        writer_id: writer.guid().entity_id,
        reader_sn_state: sdds::protocol::message::SequenceNumberSet::new(0),
        count: 1,
        final_flag: false,
    };
    writer.process_acknack(READER_PREFIX, &bogus);
    assert_eq!(
        writer.reader_ack_watermark(reader.guid()),
        Some(0),
        "watermark untouched by protocol error"
    );
}

// ============================================================================
// Scenario: unique flows isolation
// ============================================================================

#[test]
fn unique_flow_readers_get_disjoint_send_plans() {
    let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));
    let r1_locator = locator(40_001);
    let r2_locator = locator(40_002);

    let writer = Arc::new(
        StatefulWriter::new(
            endpoint_attrs(writer_guid(), QosPolicies::reliable(16), vec![locator(7410)]),
            sender_over(&mem, WRITER_PREFIX),
        )
        .expect("writer"),
    );

    let mut readers = Vec::new();
    for (n, reader_locator) in [(1u8, r1_locator), (2u8, r2_locator)] {
        let reader = Arc::new(
            StatefulReader::new(
                endpoint_attrs(reader_guid(n), QosPolicies::reliable(16), vec![reader_locator]),
                sender_over(&mem, READER_PREFIX),
            )
            .expect("reader"),
        );
        mem.open_input_channel(&reader_locator, Arc::new(ReaderPort { reader: reader.clone() }))
            .expect("port");
        reader.matched_writer_add(WriterProxy::new(
            writer.guid(),
            vec![locator(7410)],
            Vec::new(),
            true,
        ));
        writer.matched_reader_add(ReaderProxy::new(
            reader.guid(),
            vec![reader_locator],
            Vec::new(),
            true,
            DurabilityKind::Volatile,
        ));
        readers.push(reader);
    }

    mem.clear_sent_plans();
    for i in 1..=10 {
        writer
            .write(format!("u{}", i).as_bytes(), Default::default())
            .expect("write");
    }

    // Both readers received all ten samples.
    for reader in &readers {
        let taken = reader.take();
        assert_eq!(taken.len(), 10);
        let seqs: Vec<i64> = taken.iter().map(|c| c.sequence_number).collect();
        assert_eq!(seqs, (1..=10).collect::<Vec<_>>());
    }

    // Every send plan targets exactly one reader's unique-flow locator;
    // the destination sets per send are disjoint.
    let plans = mem.sent_plans();
    assert!(!plans.is_empty());
    for plan in &plans {
        assert_eq!(plan.destinations.len(), 1, "one flow per send");
        assert!(
            plan.destinations == vec![r1_locator] || plan.destinations == vec![r2_locator],
            "unexpected destination set {:?}",
            plan.destinations
        );
    }
    assert!(plans.iter().any(|p| p.destinations == vec![r1_locator]));
    assert!(plans.iter().any(|p| p.destinations == vec![r2_locator]));
}

// ============================================================================
// Fragmentation round trip
// ============================================================================

#[test]
fn oversized_payload_is_fragmented_and_reassembled() {
    let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));
    let writer_locator = locator(7410);
    let reader_locator = locator(7411);

    let mut writer = StatefulWriter::new(
        endpoint_attrs(writer_guid(), QosPolicies::reliable(4), vec![writer_locator]),
        sender_over(&mem, WRITER_PREFIX),
    )
    .expect("writer");
    // Force fragmentation at 64 bytes, 32-byte fragments.
    writer.set_fragmentation(64, 32);
    let writer = Arc::new(writer);

    let reader = Arc::new(
        StatefulReader::new(
            endpoint_attrs(reader_guid(1), QosPolicies::reliable(4), vec![reader_locator]),
            sender_over(&mem, READER_PREFIX),
        )
        .expect("reader"),
    );
    mem.open_input_channel(&reader_locator, Arc::new(ReaderPort { reader: reader.clone() }))
        .expect("port");
    reader.matched_writer_add(WriterProxy::new(
        writer.guid(),
        vec![writer_locator],
        Vec::new(),
        true,
    ));
    writer.matched_reader_add(ReaderProxy::new(
        reader.guid(),
        vec![reader_locator],
        Vec::new(),
        true,
        DurabilityKind::Volatile,
    ));

    let big: Vec<u8> = (0..200u16).map(|i| i as u8).collect();
    writer.write(&big, Default::default()).expect("write");

    let taken = reader.take();
    assert_eq!(taken.len(), 1);
    assert_eq!(taken[0].user_payload().expect("payload"), big);

    // The oversized sample went out as DATA_FRAG, never as plain DATA.
    assert!(count_submessages(&mem, |s| matches!(s, Submessage::DataFrag(_))) > 1);
    assert_eq!(
        count_submessages(&mem, |s| matches!(s, Submessage::Data(_))),
        0
    );
}
