// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Asynchronous publish mode: a bounded per-writer queue drained by a
//! flush thread.
//!
//! `enqueue` applies backpressure: a full queue blocks the producer up to
//! the writer's max blocking time, then fails with `Timeout`.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{bounded, Sender, TrySendError};

use crate::endpoint::writer::StatefulWriter;
use crate::error::{Error, Result};
use crate::history::WriteParams;
use crate::qos::DdsDuration;

enum Job {
    Write { payload: Vec<u8>, params: WriteParams },
    Shutdown,
}

/// Bounded flush queue + thread for one ASYNCHRONOUS-mode writer.
pub struct AsyncFlushQueue {
    tx: Sender<Job>,
    thread: Option<JoinHandle<()>>,
}

impl AsyncFlushQueue {
    /// Spawn the flush thread for `writer` with the given queue depth.
    pub fn new(writer: Arc<StatefulWriter>, depth: usize) -> Result<Self> {
        let (tx, rx) = bounded(depth.max(1));
        let thread = std::thread::Builder::new()
            .name(format!("sdds.flush.{}", writer.guid().entity_id))
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    match job {
                        Job::Write { payload, params } => {
                            if let Err(e) = writer.write(&payload, params) {
                                log::warn!(
                                    "[RTPS_WRITER] {} async write failed: {}",
                                    writer.guid(),
                                    e
                                );
                            }
                        }
                        Job::Shutdown => return,
                    }
                }
            })
            .map_err(Error::Io)?;
        Ok(Self {
            tx,
            thread: Some(thread),
        })
    }

    /// Queue one sample. Blocks up to `max_blocking_time` when the queue
    /// is full, then fails with `Timeout`.
    pub fn enqueue(
        &self,
        payload: Vec<u8>,
        params: WriteParams,
        max_blocking_time: DdsDuration,
    ) -> Result<()> {
        let job = Job::Write { payload, params };
        match max_blocking_time.to_std() {
            Some(timeout) => match self.tx.send_timeout(job, timeout) {
                Ok(()) => Ok(()),
                Err(_) => Err(Error::Timeout),
            },
            None => self
                .tx
                .send(job)
                .map_err(|_| Error::PreconditionNotMet("flush thread stopped".into())),
        }
    }

    /// Non-blocking variant; `Timeout` when the queue is full.
    pub fn try_enqueue(&self, payload: Vec<u8>, params: WriteParams) -> Result<()> {
        match self.tx.try_send(Job::Write { payload, params }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::Timeout),
            Err(TrySendError::Disconnected(_)) => {
                Err(Error::PreconditionNotMet("flush thread stopped".into()))
            }
        }
    }

    /// Stop the flush thread after draining already-queued samples.
    pub fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.tx.send(Job::Shutdown);
            let _ = thread.join();
        }
    }
}

impl Drop for AsyncFlushQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointAttributes;
    use crate::protocol::types::{EntityId, Guid, Locator, LOCATOR_KIND_UDPV4};
    use crate::qos::QosPolicies;
    use crate::transport::test_support::MemTransport;
    use crate::transport::TransportRegistry;
    use crate::endpoint::MessageSender;
    use std::time::{Duration, Instant};

    fn writer() -> Arc<StatefulWriter> {
        let mem = Arc::new(MemTransport::new(LOCATOR_KIND_UDPV4));
        let mut registry = TransportRegistry::new();
        registry.register(mem);
        let sender = Arc::new(MessageSender::new(Arc::new(registry), [1; 12]));
        let attrs = EndpointAttributes {
            guid: Guid::new([1; 12], EntityId([0, 0, 1, 0x03])),
            topic_name: "T".into(),
            type_name: "S".into(),
            qos: QosPolicies::reliable(8),
            unicast_locators: vec![Locator::udpv4([127, 0, 0, 1], 7410)],
            multicast_locators: Vec::new(),
        };
        Arc::new(StatefulWriter::new(attrs, sender).expect("writer"))
    }

    #[test]
    fn test_queued_samples_reach_history() {
        let writer = writer();
        let queue = AsyncFlushQueue::new(writer.clone(), 8).expect("queue");
        for i in 0..3u8 {
            queue
                .enqueue(vec![i], WriteParams::default(), DdsDuration::from_millis(100))
                .expect("enqueue");
        }
        let deadline = Instant::now() + Duration::from_secs(2);
        while writer.history_len() < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(writer.history_len(), 3);
        assert_eq!(writer.last_sequence(), 3);
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let writer = writer();
        let mut queue = AsyncFlushQueue::new(writer.clone(), 8).expect("queue");
        queue
            .enqueue(vec![1], WriteParams::default(), DdsDuration::from_millis(100))
            .expect("enqueue");
        queue.shutdown();
        assert_eq!(writer.history_len(), 1, "queued sample written before stop");
    }
}
