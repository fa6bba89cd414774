// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Discovery data: participant, writer, and reader proxy data with their
//! parameter-list (PL_CDR_LE) codecs (RTPS v2.5 Sec.8.5.3/9.6.2).
//!
//! These structures are the learned state about remote entities. Unknown
//! pids are skipped on decode (a remote may announce more than we model).

use std::time::Instant;

use crate::error::{Error, Result};
use crate::protocol::constants::{
    BUILTIN_ENDPOINT_SET_DEFAULT, PID_BUILTIN_ENDPOINT_SET, PID_CONTENT_FILTER_PROPERTY,
    PID_DEADLINE, PID_DEFAULT_MULTICAST_LOCATOR, PID_DEFAULT_UNICAST_LOCATOR,
    PID_DESTINATION_ORDER, PID_DOMAIN_ID, PID_DURABILITY, PID_ENDPOINT_GUID,
    PID_EXPECTS_INLINE_QOS, PID_HISTORY, PID_LATENCY_BUDGET, PID_LIVELINESS,
    PID_METATRAFFIC_MULTICAST_LOCATOR, PID_METATRAFFIC_UNICAST_LOCATOR, PID_MULTICAST_LOCATOR,
    PID_OWNERSHIP, PID_OWNERSHIP_STRENGTH, PID_PARTICIPANT_GUID, PID_PARTICIPANT_LEASE_DURATION,
    PID_PARTITION, PID_PRESENTATION, PID_PROTOCOL_VERSION, PID_RELIABILITY, PID_TOPIC_NAME,
    PID_TYPE_NAME, PID_UNICAST_LOCATOR, PID_USER_DATA, PID_VENDOR_ID, RTPS_VERSION_MAJOR,
    RTPS_VERSION_MINOR, SDDS_VENDOR_ID,
};
use crate::protocol::parameter::{Parameter, ParameterList};
use crate::protocol::types::{Guid, Locator, VendorId};
use crate::qos::{
    DdsDuration, DestinationOrderKind, DurabilityKind, History, LivelinessKind, OwnershipKind,
    PresentationAccessScope, QosPolicies, ReliabilityKind,
};

// ============================================================================
// Value codec helpers
// ============================================================================

fn encode_duration(d: DdsDuration) -> Vec<u8> {
    let mut v = Vec::with_capacity(8);
    v.extend_from_slice(&d.sec().to_le_bytes());
    v.extend_from_slice(&d.nanosec().to_le_bytes());
    v
}

fn decode_duration(value: &[u8]) -> Option<DdsDuration> {
    let sec = i32::from_le_bytes(value.get(0..4)?.try_into().ok()?);
    let nanosec = u32::from_le_bytes(value.get(4..8)?.try_into().ok()?);
    Some(DdsDuration::new(sec, nanosec))
}

fn encode_locator(loc: &Locator) -> Vec<u8> {
    let mut v = Vec::with_capacity(24);
    v.extend_from_slice(&loc.kind.to_le_bytes());
    v.extend_from_slice(&loc.port.to_le_bytes());
    v.extend_from_slice(&loc.address);
    v
}

fn decode_locator(value: &[u8]) -> Option<Locator> {
    let kind = i32::from_le_bytes(value.get(0..4)?.try_into().ok()?);
    let port = u32::from_le_bytes(value.get(4..8)?.try_into().ok()?);
    let address: [u8; 16] = value.get(8..24)?.try_into().ok()?;
    Some(Locator {
        kind,
        port,
        address,
    })
}

fn push_locators(list: &mut ParameterList, pid: u16, locators: &[Locator]) {
    for loc in locators {
        list.push(Parameter::new(pid, encode_locator(loc)));
    }
}

fn collect_locators(list: &ParameterList, pid: u16) -> Vec<Locator> {
    list.get_all(pid)
        .filter_map(|p| decode_locator(&p.value))
        .collect()
}

// ============================================================================
// QoS <-> parameter list
// ============================================================================

fn push_qos(list: &mut ParameterList, qos: &QosPolicies) {
    // Reliability: kind + max blocking time.
    let mut value = Vec::with_capacity(12);
    let kind: u32 = match qos.reliability.kind {
        ReliabilityKind::BestEffort => 1,
        ReliabilityKind::Reliable => 2,
    };
    value.extend_from_slice(&kind.to_le_bytes());
    value.extend_from_slice(&encode_duration(qos.reliability.max_blocking_time));
    list.push(Parameter::new(PID_RELIABILITY, value));

    let durability: u32 = match qos.durability {
        DurabilityKind::Volatile => 0,
        DurabilityKind::TransientLocal => 1,
        DurabilityKind::Transient => 2,
        DurabilityKind::Persistent => 3,
    };
    list.push(Parameter::from_u32(PID_DURABILITY, durability, true));

    list.push(Parameter::new(PID_DEADLINE, encode_duration(qos.deadline.period)));
    list.push(Parameter::new(
        PID_LATENCY_BUDGET,
        encode_duration(qos.latency_budget.duration),
    ));

    let mut value = Vec::with_capacity(12);
    let kind: u32 = match qos.liveliness.kind {
        LivelinessKind::Automatic => 0,
        LivelinessKind::ManualByParticipant => 1,
        LivelinessKind::ManualByTopic => 2,
    };
    value.extend_from_slice(&kind.to_le_bytes());
    value.extend_from_slice(&encode_duration(qos.liveliness.lease_duration));
    list.push(Parameter::new(PID_LIVELINESS, value));

    let ownership: u32 = match qos.ownership.kind {
        OwnershipKind::Shared => 0,
        OwnershipKind::Exclusive => 1,
    };
    list.push(Parameter::from_u32(PID_OWNERSHIP, ownership, true));
    list.push(Parameter::new(
        PID_OWNERSHIP_STRENGTH,
        qos.ownership.strength.to_le_bytes().to_vec(),
    ));

    let destination_order: u32 = match qos.destination_order.kind {
        DestinationOrderKind::ByReceptionTimestamp => 0,
        DestinationOrderKind::BySourceTimestamp => 1,
    };
    list.push(Parameter::from_u32(PID_DESTINATION_ORDER, destination_order, true));

    let mut value = Vec::with_capacity(8);
    let scope: u32 = match qos.presentation.access_scope {
        PresentationAccessScope::Instance => 0,
        PresentationAccessScope::Topic => 1,
        PresentationAccessScope::Group => 2,
    };
    value.extend_from_slice(&scope.to_le_bytes());
    value.push(u8::from(qos.presentation.coherent_access));
    value.push(u8::from(qos.presentation.ordered_access));
    value.extend_from_slice(&[0, 0]);
    list.push(Parameter::new(PID_PRESENTATION, value));

    let (history_kind, depth): (u32, i32) = match qos.history {
        History::KeepLast(depth) => (0, depth as i32),
        History::KeepAll => (1, -1),
    };
    let mut value = Vec::with_capacity(8);
    value.extend_from_slice(&history_kind.to_le_bytes());
    value.extend_from_slice(&depth.to_le_bytes());
    list.push(Parameter::new(PID_HISTORY, value));

    if !qos.partition.names.is_empty() {
        let mut value = Vec::new();
        value.extend_from_slice(&(qos.partition.names.len() as u32).to_le_bytes());
        for name in &qos.partition.names {
            let len = (name.len() + 1) as u32;
            value.extend_from_slice(&len.to_le_bytes());
            value.extend_from_slice(name.as_bytes());
            value.push(0);
            while value.len() % 4 != 0 {
                value.push(0);
            }
        }
        list.push(Parameter::new(PID_PARTITION, value));
    }
}

fn parse_qos(list: &ParameterList) -> QosPolicies {
    let mut qos = QosPolicies::default();

    if let Some(p) = list.get(PID_RELIABILITY) {
        if let Some(kind) = p.as_u32(true) {
            qos.reliability.kind = if kind >= 2 {
                ReliabilityKind::Reliable
            } else {
                ReliabilityKind::BestEffort
            };
        }
        if let Some(d) = p.value.get(4..12).and_then(decode_duration) {
            qos.reliability.max_blocking_time = d;
        }
    }
    if let Some(kind) = list.get(PID_DURABILITY).and_then(|p| p.as_u32(true)) {
        qos.durability = match kind {
            0 => DurabilityKind::Volatile,
            1 => DurabilityKind::TransientLocal,
            2 => DurabilityKind::Transient,
            _ => DurabilityKind::Persistent,
        };
    }
    if let Some(d) = list.get(PID_DEADLINE).and_then(|p| decode_duration(&p.value)) {
        qos.deadline.period = d;
    }
    if let Some(d) = list
        .get(PID_LATENCY_BUDGET)
        .and_then(|p| decode_duration(&p.value))
    {
        qos.latency_budget.duration = d;
    }
    if let Some(p) = list.get(PID_LIVELINESS) {
        if let Some(kind) = p.as_u32(true) {
            qos.liveliness.kind = match kind {
                0 => LivelinessKind::Automatic,
                1 => LivelinessKind::ManualByParticipant,
                _ => LivelinessKind::ManualByTopic,
            };
        }
        if let Some(d) = p.value.get(4..12).and_then(decode_duration) {
            qos.liveliness.lease_duration = d;
        }
    }
    if let Some(kind) = list.get(PID_OWNERSHIP).and_then(|p| p.as_u32(true)) {
        qos.ownership.kind = if kind == 1 {
            OwnershipKind::Exclusive
        } else {
            OwnershipKind::Shared
        };
    }
    if let Some(p) = list.get(PID_OWNERSHIP_STRENGTH) {
        if let Some(strength) = p.as_u32(true) {
            qos.ownership.strength = strength as i32;
        }
    }
    if let Some(kind) = list.get(PID_DESTINATION_ORDER).and_then(|p| p.as_u32(true)) {
        qos.destination_order.kind = if kind == 1 {
            DestinationOrderKind::BySourceTimestamp
        } else {
            DestinationOrderKind::ByReceptionTimestamp
        };
    }
    if let Some(p) = list.get(PID_PRESENTATION) {
        if let Some(scope) = p.as_u32(true) {
            qos.presentation.access_scope = match scope {
                0 => PresentationAccessScope::Instance,
                1 => PresentationAccessScope::Topic,
                _ => PresentationAccessScope::Group,
            };
        }
        qos.presentation.coherent_access = p.value.get(4).copied().unwrap_or(0) != 0;
        qos.presentation.ordered_access = p.value.get(5).copied().unwrap_or(0) != 0;
    }
    if let Some(p) = list.get(PID_HISTORY) {
        let kind = p.as_u32(true).unwrap_or(0);
        let depth = p
            .value
            .get(4..8)
            .and_then(|b| b.try_into().ok())
            .map(i32::from_le_bytes)
            .unwrap_or(1);
        qos.history = if kind == 1 {
            History::KeepAll
        } else {
            History::KeepLast(depth.max(1) as u32)
        };
    }
    if let Some(p) = list.get(PID_PARTITION) {
        qos.partition.names = parse_string_sequence(&p.value);
    }
    qos
}

fn parse_string_sequence(value: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let Some(count) = value.get(0..4).and_then(|b| b.try_into().ok()).map(u32::from_le_bytes)
    else {
        return names;
    };
    let mut offset = 4usize;
    for _ in 0..count {
        let Some(len) = value
            .get(offset..offset + 4)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
        else {
            break;
        };
        offset += 4;
        let len = len as usize;
        if len == 0 {
            continue;
        }
        let Some(bytes) = value.get(offset..offset + len - 1) else {
            break;
        };
        if let Ok(name) = String::from_utf8(bytes.to_vec()) {
            names.push(name);
        }
        offset += len;
        offset = offset.next_multiple_of(4);
    }
    names
}

// ============================================================================
// ParticipantProxyData
// ============================================================================

/// Learned state about a remote participant (PDP).
#[derive(Debug, Clone)]
pub struct ParticipantProxyData {
    pub guid: Guid,
    pub protocol_version: (u8, u8),
    pub vendor_id: VendorId,
    pub domain_id: u32,
    pub available_builtin_endpoints: u32,
    pub metatraffic_unicast_locators: Vec<Locator>,
    pub metatraffic_multicast_locators: Vec<Locator>,
    pub default_unicast_locators: Vec<Locator>,
    pub default_multicast_locators: Vec<Locator>,
    pub lease_duration: DdsDuration,
    pub user_data: Vec<u8>,
    /// Reset by every received announcement; expiry removes the
    /// participant and cascades to its endpoints.
    pub lease_deadline: Instant,
}

impl ParticipantProxyData {
    /// Local participant's own announcement data.
    #[must_use]
    pub fn local(guid: Guid, domain_id: u32, lease_duration: DdsDuration) -> Self {
        Self {
            guid,
            protocol_version: (RTPS_VERSION_MAJOR, RTPS_VERSION_MINOR),
            vendor_id: SDDS_VENDOR_ID,
            domain_id,
            available_builtin_endpoints: BUILTIN_ENDPOINT_SET_DEFAULT,
            metatraffic_unicast_locators: Vec::new(),
            metatraffic_multicast_locators: Vec::new(),
            default_unicast_locators: Vec::new(),
            default_multicast_locators: Vec::new(),
            lease_duration,
            user_data: Vec::new(),
            lease_deadline: Instant::now(),
        }
    }

    /// Recompute the lease deadline from now.
    pub fn refresh_lease(&mut self) {
        let lease = self
            .lease_duration
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(3600 * 24));
        self.lease_deadline = Instant::now() + lease;
    }

    /// Serialize as a PL_CDR_LE parameter list (SPDP payload body).
    #[must_use]
    pub fn to_parameter_list(&self) -> ParameterList {
        let mut list = ParameterList::new();
        list.push(Parameter::new(
            PID_PROTOCOL_VERSION,
            vec![self.protocol_version.0, self.protocol_version.1, 0, 0],
        ));
        list.push(Parameter::new(
            PID_VENDOR_ID,
            vec![self.vendor_id[0], self.vendor_id[1], 0, 0],
        ));
        list.push(Parameter::from_u32(PID_DOMAIN_ID, self.domain_id, true));
        list.push(Parameter::new(
            PID_PARTICIPANT_GUID,
            self.guid.as_bytes().to_vec(),
        ));
        list.push(Parameter::from_u32(
            PID_BUILTIN_ENDPOINT_SET,
            self.available_builtin_endpoints,
            true,
        ));
        list.push(Parameter::new(
            PID_PARTICIPANT_LEASE_DURATION,
            encode_duration(self.lease_duration),
        ));
        push_locators(
            &mut list,
            PID_METATRAFFIC_UNICAST_LOCATOR,
            &self.metatraffic_unicast_locators,
        );
        push_locators(
            &mut list,
            PID_METATRAFFIC_MULTICAST_LOCATOR,
            &self.metatraffic_multicast_locators,
        );
        push_locators(
            &mut list,
            PID_DEFAULT_UNICAST_LOCATOR,
            &self.default_unicast_locators,
        );
        push_locators(
            &mut list,
            PID_DEFAULT_MULTICAST_LOCATOR,
            &self.default_multicast_locators,
        );
        if !self.user_data.is_empty() {
            let mut value = Vec::with_capacity(4 + self.user_data.len());
            value.extend_from_slice(&(self.user_data.len() as u32).to_le_bytes());
            value.extend_from_slice(&self.user_data);
            list.push(Parameter::new(PID_USER_DATA, value));
        }
        list
    }

    /// Parse from a received SPDP parameter list.
    pub fn from_parameter_list(list: &ParameterList) -> Result<Self> {
        let guid_param = list
            .get(PID_PARTICIPANT_GUID)
            .ok_or_else(|| Error::WireFormat("SPDP data without participant GUID".into()))?;
        let guid_bytes: [u8; 16] = guid_param
            .value
            .get(0..16)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| Error::WireFormat("short participant GUID".into()))?;
        let guid = Guid::from_bytes(guid_bytes);

        let protocol_version = list
            .get(PID_PROTOCOL_VERSION)
            .and_then(|p| Some((*p.value.first()?, *p.value.get(1)?)))
            .unwrap_or((RTPS_VERSION_MAJOR, RTPS_VERSION_MINOR));
        let vendor_id = list
            .get(PID_VENDOR_ID)
            .and_then(|p| Some([*p.value.first()?, *p.value.get(1)?]))
            .unwrap_or([0, 0]);
        let domain_id = list
            .get(PID_DOMAIN_ID)
            .and_then(|p| p.as_u32(true))
            .unwrap_or(0);
        let available_builtin_endpoints = list
            .get(PID_BUILTIN_ENDPOINT_SET)
            .and_then(|p| p.as_u32(true))
            .unwrap_or(0);
        let lease_duration = list
            .get(PID_PARTICIPANT_LEASE_DURATION)
            .and_then(|p| decode_duration(&p.value))
            .unwrap_or_else(|| DdsDuration::from_millis(crate::config::PARTICIPANT_LEASE_DURATION_MS));
        let user_data = list
            .get(PID_USER_DATA)
            .and_then(|p| {
                let len = p.as_u32(true)? as usize;
                Some(p.value.get(4..4 + len)?.to_vec())
            })
            .unwrap_or_default();

        let mut data = Self {
            guid,
            protocol_version,
            vendor_id,
            domain_id,
            available_builtin_endpoints,
            metatraffic_unicast_locators: collect_locators(list, PID_METATRAFFIC_UNICAST_LOCATOR),
            metatraffic_multicast_locators: collect_locators(
                list,
                PID_METATRAFFIC_MULTICAST_LOCATOR,
            ),
            default_unicast_locators: collect_locators(list, PID_DEFAULT_UNICAST_LOCATOR),
            default_multicast_locators: collect_locators(list, PID_DEFAULT_MULTICAST_LOCATOR),
            lease_duration,
            user_data,
            lease_deadline: Instant::now(),
        };
        data.refresh_lease();
        Ok(data)
    }
}

// ============================================================================
// Writer/Reader proxy data
// ============================================================================

/// Learned state about a remote writer (EDP publications data).
#[derive(Debug, Clone)]
pub struct WriterProxyData {
    pub guid: Guid,
    pub topic_name: String,
    pub type_name: String,
    pub qos: QosPolicies,
    pub unicast_locators: Vec<Locator>,
    pub multicast_locators: Vec<Locator>,
}

impl WriterProxyData {
    #[must_use]
    pub fn to_parameter_list(&self) -> ParameterList {
        let mut list = ParameterList::new();
        list.push(Parameter::new(
            PID_ENDPOINT_GUID,
            self.guid.as_bytes().to_vec(),
        ));
        list.push(Parameter::from_string(PID_TOPIC_NAME, &self.topic_name, true));
        list.push(Parameter::from_string(PID_TYPE_NAME, &self.type_name, true));
        push_qos(&mut list, &self.qos);
        push_locators(&mut list, PID_UNICAST_LOCATOR, &self.unicast_locators);
        push_locators(&mut list, PID_MULTICAST_LOCATOR, &self.multicast_locators);
        list
    }

    pub fn from_parameter_list(list: &ParameterList) -> Result<Self> {
        let (guid, topic_name, type_name) = parse_endpoint_identity(list)?;
        Ok(Self {
            guid,
            topic_name,
            type_name,
            qos: parse_qos(list),
            unicast_locators: collect_locators(list, PID_UNICAST_LOCATOR),
            multicast_locators: collect_locators(list, PID_MULTICAST_LOCATOR),
        })
    }
}

/// Learned state about a remote reader (EDP subscriptions data).
#[derive(Debug, Clone)]
pub struct ReaderProxyData {
    pub guid: Guid,
    pub topic_name: String,
    pub type_name: String,
    pub qos: QosPolicies,
    pub unicast_locators: Vec<Locator>,
    pub multicast_locators: Vec<Locator>,
    pub expects_inline_qos: bool,
    /// Content filter expression, readers only.
    pub content_filter: Option<String>,
}

impl ReaderProxyData {
    #[must_use]
    pub fn to_parameter_list(&self) -> ParameterList {
        let mut list = ParameterList::new();
        list.push(Parameter::new(
            PID_ENDPOINT_GUID,
            self.guid.as_bytes().to_vec(),
        ));
        list.push(Parameter::from_string(PID_TOPIC_NAME, &self.topic_name, true));
        list.push(Parameter::from_string(PID_TYPE_NAME, &self.type_name, true));
        push_qos(&mut list, &self.qos);
        push_locators(&mut list, PID_UNICAST_LOCATOR, &self.unicast_locators);
        push_locators(&mut list, PID_MULTICAST_LOCATOR, &self.multicast_locators);
        list.push(Parameter::new(
            PID_EXPECTS_INLINE_QOS,
            vec![u8::from(self.expects_inline_qos), 0, 0, 0],
        ));
        if let Some(filter) = &self.content_filter {
            list.push(Parameter::from_string(PID_CONTENT_FILTER_PROPERTY, filter, true));
        }
        list
    }

    pub fn from_parameter_list(list: &ParameterList) -> Result<Self> {
        let (guid, topic_name, type_name) = parse_endpoint_identity(list)?;
        Ok(Self {
            guid,
            topic_name,
            type_name,
            qos: parse_qos(list),
            unicast_locators: collect_locators(list, PID_UNICAST_LOCATOR),
            multicast_locators: collect_locators(list, PID_MULTICAST_LOCATOR),
            expects_inline_qos: list
                .get(PID_EXPECTS_INLINE_QOS)
                .and_then(|p| p.value.first().copied())
                .unwrap_or(0)
                != 0,
            content_filter: list
                .get(PID_CONTENT_FILTER_PROPERTY)
                .and_then(|p| p.as_string(true)),
        })
    }
}

fn parse_endpoint_identity(list: &ParameterList) -> Result<(Guid, String, String)> {
    let guid_bytes: [u8; 16] = list
        .get(PID_ENDPOINT_GUID)
        .and_then(|p| p.value.get(0..16))
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::WireFormat("EDP data without endpoint GUID".into()))?;
    let topic_name = list
        .get(PID_TOPIC_NAME)
        .and_then(|p| p.as_string(true))
        .ok_or_else(|| Error::WireFormat("EDP data without topic name".into()))?;
    let type_name = list
        .get(PID_TYPE_NAME)
        .and_then(|p| p.as_string(true))
        .ok_or_else(|| Error::WireFormat("EDP data without type name".into()))?;
    Ok((Guid::from_bytes(guid_bytes), topic_name, type_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::SubmessageReader;
    use crate::protocol::types::EntityId;

    fn guid(n: u8) -> Guid {
        Guid::new([n; 12], EntityId([0, 0, 1, 0xC1]))
    }

    fn round_trip(list: &ParameterList) -> ParameterList {
        let mut buf = Vec::new();
        list.encode(&mut buf, true);
        let mut r = SubmessageReader::new(&buf, true);
        ParameterList::decode(&mut r).expect("decode")
    }

    #[test]
    fn test_participant_proxy_round_trip() {
        let mut data = ParticipantProxyData::local(guid(1), 7, DdsDuration::from_secs(30));
        data.metatraffic_unicast_locators = vec![Locator::udpv4([192, 168, 1, 5], 7410)];
        data.default_unicast_locators = vec![Locator::udpv4([192, 168, 1, 5], 7411)];
        data.user_data = b"role=sensor".to_vec();

        let decoded =
            ParticipantProxyData::from_parameter_list(&round_trip(&data.to_parameter_list()))
                .expect("parse");
        assert_eq!(decoded.guid, data.guid);
        assert_eq!(decoded.domain_id, 7);
        assert_eq!(decoded.vendor_id, SDDS_VENDOR_ID);
        assert_eq!(decoded.lease_duration, DdsDuration::from_secs(30));
        assert_eq!(decoded.metatraffic_unicast_locators, data.metatraffic_unicast_locators);
        assert_eq!(decoded.default_unicast_locators, data.default_unicast_locators);
        assert_eq!(decoded.user_data, b"role=sensor");
    }

    #[test]
    fn test_writer_proxy_round_trip() {
        let data = WriterProxyData {
            guid: guid(2),
            topic_name: "sensors/temp".into(),
            type_name: "Temperature".into(),
            qos: QosPolicies::transient_local(10),
            unicast_locators: vec![Locator::udpv4([10, 0, 0, 1], 7411)],
            multicast_locators: Vec::new(),
        };
        let decoded = WriterProxyData::from_parameter_list(&round_trip(&data.to_parameter_list()))
            .expect("parse");
        assert_eq!(decoded.guid, data.guid);
        assert_eq!(decoded.topic_name, "sensors/temp");
        assert_eq!(decoded.type_name, "Temperature");
        assert_eq!(decoded.qos.reliability.kind, ReliabilityKind::Reliable);
        assert_eq!(decoded.qos.durability, DurabilityKind::TransientLocal);
        assert_eq!(decoded.qos.history, History::KeepLast(10));
        assert_eq!(decoded.unicast_locators, data.unicast_locators);
    }

    #[test]
    fn test_reader_proxy_round_trip_with_partitions_and_filter() {
        let mut qos = QosPolicies::best_effort(5);
        qos.partition.names = vec!["building-a".into(), "floor-*".into()];
        let data = ReaderProxyData {
            guid: guid(3),
            topic_name: "T".into(),
            type_name: "S".into(),
            qos,
            unicast_locators: Vec::new(),
            multicast_locators: vec![Locator::udpv4([239, 255, 0, 1], 7401)],
            expects_inline_qos: true,
            content_filter: Some("value > 10".into()),
        };
        let decoded = ReaderProxyData::from_parameter_list(&round_trip(&data.to_parameter_list()))
            .expect("parse");
        assert_eq!(decoded.qos.partition.names, vec!["building-a", "floor-*"]);
        assert!(decoded.expects_inline_qos);
        assert_eq!(decoded.content_filter.as_deref(), Some("value > 10"));
    }

    #[test]
    fn test_missing_identity_rejected() {
        let list = ParameterList::new();
        assert!(WriterProxyData::from_parameter_list(&list).is_err());
        assert!(ParticipantProxyData::from_parameter_list(&list).is_err());
    }
}
