// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Discovery layer: participant discovery (PDP), endpoint discovery (EDP),
//! writer liveliness (WLP), the matching engine, and the discovery-server
//! relay.
//!
//! PDP learns remote participants and their metatraffic locators; EDP
//! learns individual readers/writers with their QoS; the matching engine
//! applies the RxO compatibility rules and the participant wires matched
//! pairs into the endpoint layer.

/// Discovery data structures and parameter-list codecs.
pub mod data;
/// Endpoint Discovery Protocol.
pub mod edp;
/// Topic/type/QoS/partition matching rules.
pub mod matching;
/// Participant Discovery Protocol.
pub mod pdp;
/// Discovery-server relay.
pub mod server;
/// Writer Liveliness Protocol.
pub mod wlp;

pub use data::{ParticipantProxyData, ReaderProxyData, WriterProxyData};
pub use edp::{Edp, EdpEvent};
pub use matching::{check_qos_compatibility, evaluate_match, partitions_match, MatchFailure};
pub use pdp::{DiscoveryMode, Pdp, PdpEvent};
pub use server::DiscoveryServer;
pub use wlp::{ParticipantMessage, Wlp};
