// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! History & change layer: `CacheChange` records, payload pools, and the
//! ordered writer/reader stores the endpoint state machines operate on.

/// CacheChange and payload encapsulation.
pub mod change;
/// Payload buffer pools.
pub mod pool;
/// Reader-side ordered store.
pub mod reader_history;
/// Writer-side ordered store.
pub mod writer_history;

pub use change::{
    encapsulate_payload, extract_payload, CacheChange, ChangeKind, SampleIdentity, WriteParams,
};
pub use pool::{PayloadPool, PoolStrategy};
pub use reader_history::ReaderHistory;
pub use writer_history::{AddChangeOutcome, WriterHistory};
