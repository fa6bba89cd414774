// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! # SDDS - RTPS discovery and endpoint engine
//!
//! A pure Rust implementation of the OMG DDS-RTPS wire protocol core:
//! brokerless participant/endpoint discovery, QoS-checked matching, and
//! the reliable/best-effort protocol between matched endpoint pairs, over
//! a locator-based transport abstraction (UDPv4/v6, TCP, shared memory).
//!
//! Payloads are opaque octet buffers with an associated type name; IDL
//! codegen and user-type serialization live in external layers.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Participant Layer                           |
//! |  entity factories | entity ids | listener dispatch | event timer   |
//! +--------------------------------------------------------------------+
//! |                         Discovery Layer                            |
//! |  PDP (SPDP, server mode) | EDP (SEDP) | WLP | matching engine      |
//! +--------------------------------------------------------------------+
//! |                         Endpoint Layer                             |
//! |  stateful/stateless writers + readers | proxies | reliability      |
//! +--------------------------------------------------------------------+
//! |                     History & Change Layer                         |
//! |  CacheChange | payload pools | writer/reader histories            |
//! +--------------------------------------------------------------------+
//! |                       RTPS Message Layer                           |
//! |  header + submessage codec | parameter lists | sequence sets       |
//! +--------------------------------------------------------------------+
//! |                        Transport Layer                             |
//! |  locators | UDP | TCP (RTCP framing) | SHM | port mapping          |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use sdds::participant::{ParticipantAttributes, RtpsParticipant};
//! use sdds::qos::QosPolicies;
//!
//! fn main() -> sdds::Result<()> {
//!     let participant = RtpsParticipant::new(ParticipantAttributes::default())?;
//!     let publisher = participant.create_publisher();
//!     let writer = participant.create_writer(
//!         publisher,
//!         "sensors/temperature",
//!         "Temperature",
//!         QosPolicies::reliable(10),
//!         Vec::new(),
//!     )?;
//!     if let sdds::endpoint::writer::Writer::Stateful(w) = &writer {
//!         w.write(b"\x42", Default::default())?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## See also
//!
//! - [DDS Specification](https://www.omg.org/spec/DDS/1.4/)
//! - [RTPS Specification](https://www.omg.org/spec/DDSI-RTPS/2.5/)

/// Global configuration: RTPS constants, runtime config, environment file.
pub mod config;
/// Discovery layer (PDP, EDP, WLP, matching, discovery server).
pub mod discovery;
/// Endpoint layer (stateful/stateless writers and readers).
pub mod endpoint;
/// Error taxonomy.
pub mod error;
/// History & change layer.
pub mod history;
/// Participant layer (attributes, entities, events, dispatch).
pub mod participant;
/// Persistence hook for durable histories.
pub mod persistence;
/// RTPS protocol layer (types, constants, message codec).
pub mod protocol;
/// QoS policies.
pub mod qos;
/// Security plugin hooks.
pub mod security;
/// Transport abstraction and implementations.
pub mod transport;

pub use error::{Error, Result};
pub use history::{CacheChange, ChangeKind, SampleIdentity, WriteParams};
pub use participant::{ListenerSet, ParticipantAttributes, RtpsParticipant};
pub use protocol::types::{EntityId, Guid, GuidPrefix, Locator, SequenceNumber, Time};
pub use qos::QosPolicies;

/// SDDS version string.
pub const VERSION: &str = "0.2.0";
