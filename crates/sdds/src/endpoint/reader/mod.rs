// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Reader-side endpoint entities.

/// Fragment reassembly buffers.
pub mod fragment;
/// Reliable stateful reader.
pub mod stateful;
/// Best-effort stateless reader.
pub mod stateless;
/// Per-matched-writer state.
pub mod writer_proxy;

pub use fragment::FragmentAssembly;
pub use stateful::StatefulReader;
pub use stateless::StatelessReader;
pub use writer_proxy::{WriterProxy, WriterProxyState};

use std::sync::Arc;

use crate::endpoint::EndpointAttributes;
use crate::history::CacheChange;
use crate::protocol::types::Guid;

/// A reader entity: stateful or stateless.
#[derive(Clone)]
pub enum Reader {
    Stateful(Arc<StatefulReader>),
    Stateless(Arc<StatelessReader>),
}

impl Reader {
    #[must_use]
    pub fn guid(&self) -> Guid {
        match self {
            Reader::Stateful(r) => r.guid(),
            Reader::Stateless(r) => r.guid(),
        }
    }

    #[must_use]
    pub fn attributes(&self) -> &EndpointAttributes {
        match self {
            Reader::Stateful(r) => r.attributes(),
            Reader::Stateless(r) => r.attributes(),
        }
    }

    /// Take every available sample in delivery order.
    pub fn take(&self) -> Vec<CacheChange> {
        match self {
            Reader::Stateful(r) => r.take(),
            Reader::Stateless(r) => r.take(),
        }
    }

    /// Stateful access for the discovery matching engine.
    #[must_use]
    pub fn as_stateful(&self) -> Option<&Arc<StatefulReader>> {
        match self {
            Reader::Stateful(r) => Some(r),
            Reader::Stateless(_) => None,
        }
    }
}
