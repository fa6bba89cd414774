// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Core RTPS value types: GUIDs, entity ids, sequence numbers, locators,
//! timestamps (DDS-RTPS v2.5 Sec.8.2/9.3).

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{SystemTime, UNIX_EPOCH};

/// 12-byte participant identifier (RTPS GuidPrefix_t).
pub type GuidPrefix = [u8; 12];

/// All-zero GUID prefix ("unknown participant").
pub const GUIDPREFIX_UNKNOWN: GuidPrefix = [0; 12];

/// 2-byte DDS vendor identifier.
pub type VendorId = [u8; 2];

/// 16-byte instance key hash (RTPS KeyHash_t).
pub type InstanceHandle = [u8; 16];

/// All-zero instance handle (keyless topics).
pub const INSTANCE_HANDLE_UNKNOWN: InstanceHandle = [0; 16];

/// Signed 64-bit sequence number, strictly monotonic per writer, starting
/// at 1. On the wire it travels as high(i32) + low(u32).
pub type SequenceNumber = i64;

/// Sentinel for "no sequence number".
pub const SEQUENCE_NUMBER_UNKNOWN: SequenceNumber = i64::MIN;

/// Monotonic message counter (HEARTBEAT/ACKNACK count fields).
pub type Count = u32;

// ============================================================================
// EntityId
// ============================================================================

/// 4-byte entity identifier within a participant (RTPS EntityId_t).
///
/// The last byte is the entity kind; the first three are the entity key.
/// Entity ids are always transmitted big-endian regardless of submessage
/// endianness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EntityId(pub [u8; 4]);

/// Entity kind byte: user-defined writer.
pub const ENTITY_KIND_USER_WRITER: u8 = 0x03;
/// Entity kind byte: user-defined reader.
pub const ENTITY_KIND_USER_READER: u8 = 0x04;
/// Entity kind byte: user-defined topic.
pub const ENTITY_KIND_USER_TOPIC: u8 = 0x05;
/// Entity kind byte: built-in writer.
pub const ENTITY_KIND_BUILTIN_WRITER: u8 = 0xC2;
/// Entity kind byte: built-in reader.
pub const ENTITY_KIND_BUILTIN_READER: u8 = 0xC7;

impl EntityId {
    /// The unknown entity id (all zeros).
    pub const UNKNOWN: EntityId = EntityId([0, 0, 0, 0]);

    /// Build from a 3-byte key and a kind byte.
    #[must_use]
    pub fn new(key: [u8; 3], kind: u8) -> Self {
        Self([key[0], key[1], key[2], kind])
    }

    /// Entity kind byte (last octet).
    #[must_use]
    pub fn kind(&self) -> u8 {
        self.0[3]
    }

    /// Built-in entities have the two top bits of the kind set to `11`.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.kind() & 0xC0 == 0xC0
    }

    /// Whether the kind byte names a writer entity.
    #[must_use]
    pub fn is_writer(&self) -> bool {
        matches!(self.kind() & 0x0F, 0x02 | 0x03)
    }

    /// Whether the kind byte names a reader entity.
    #[must_use]
    pub fn is_reader(&self) -> bool {
        matches!(self.kind() & 0x0F, 0x04 | 0x07)
    }

    /// Raw big-endian u32 view (handy for logs and tables).
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.as_u32())
    }
}

// ============================================================================
// Guid
// ============================================================================

/// 16-byte globally unique entity identifier: participant prefix + entity id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid {
    pub prefix: GuidPrefix,
    pub entity_id: EntityId,
}

impl Guid {
    /// The unknown GUID (all zeros).
    pub const UNKNOWN: Guid = Guid {
        prefix: GUIDPREFIX_UNKNOWN,
        entity_id: EntityId::UNKNOWN,
    };

    #[must_use]
    pub fn new(prefix: GuidPrefix, entity_id: EntityId) -> Self {
        Self { prefix, entity_id }
    }

    /// Reassemble from 16 raw bytes (prefix first).
    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        let mut prefix = [0u8; 12];
        let mut entity = [0u8; 4];
        prefix.copy_from_slice(&bytes[0..12]);
        entity.copy_from_slice(&bytes[12..16]);
        Self {
            prefix,
            entity_id: EntityId(entity),
        }
    }

    /// Flatten to 16 bytes (prefix first).
    #[must_use]
    pub fn as_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..12].copy_from_slice(&self.prefix);
        bytes[12..16].copy_from_slice(&self.entity_id.0);
        bytes
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.prefix.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        for byte in &self.entity_id.0 {
            write!(f, ".{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

// ============================================================================
// Locator
// ============================================================================

/// Transport kind: UDP over IPv4.
pub const LOCATOR_KIND_UDPV4: i32 = 1;
/// Transport kind: UDP over IPv6.
pub const LOCATOR_KIND_UDPV6: i32 = 2;
/// Transport kind: TCP over IPv4.
pub const LOCATOR_KIND_TCPV4: i32 = 4;
/// Transport kind: TCP over IPv6.
pub const LOCATOR_KIND_TCPV6: i32 = 8;
/// Transport kind: shared memory (single host).
pub const LOCATOR_KIND_SHM: i32 = 16;
/// Invalid locator kind.
pub const LOCATOR_KIND_INVALID: i32 = -1;

/// Invalid/unspecified port.
pub const LOCATOR_PORT_INVALID: u32 = 0;

/// Transport-independent endpoint address (RTPS Locator_t).
///
/// For IPv4 kinds the address occupies the last four bytes; for SHM the
/// address encodes a segment identifier and `port` an enqueue port.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locator {
    pub kind: i32,
    pub port: u32,
    pub address: [u8; 16],
}

/// The invalid locator (kind -1, port 0, zero address).
pub const LOCATOR_INVALID: Locator = Locator {
    kind: LOCATOR_KIND_INVALID,
    port: LOCATOR_PORT_INVALID,
    address: [0; 16],
};

impl Locator {
    /// UDPv4 locator from address octets + port.
    #[must_use]
    pub fn udpv4(addr: [u8; 4], port: u32) -> Self {
        let mut address = [0u8; 16];
        address[12..16].copy_from_slice(&addr);
        Self {
            kind: LOCATOR_KIND_UDPV4,
            port,
            address,
        }
    }

    /// UDPv6 locator from full address + port.
    #[must_use]
    pub fn udpv6(addr: [u8; 16], port: u32) -> Self {
        Self {
            kind: LOCATOR_KIND_UDPV6,
            port,
            address: addr,
        }
    }

    /// Shared-memory locator from segment id + enqueue port.
    #[must_use]
    pub fn shm(segment_id: u32, port: u32) -> Self {
        let mut address = [0u8; 16];
        address[12..16].copy_from_slice(&segment_id.to_be_bytes());
        Self {
            kind: LOCATOR_KIND_SHM,
            port,
            address,
        }
    }

    /// Build from a socket address, choosing UDPv4/UDPv6 kind.
    #[must_use]
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        match addr.ip() {
            IpAddr::V4(v4) => Self::udpv4(v4.octets(), u32::from(addr.port())),
            IpAddr::V6(v6) => Self::udpv6(v6.octets(), u32::from(addr.port())),
        }
    }

    /// Convert to a socket address for IP-based kinds; `None` otherwise or
    /// when the port does not fit in 16 bits.
    #[must_use]
    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        let port = u16::try_from(self.port).ok()?;
        match self.kind {
            LOCATOR_KIND_UDPV4 | LOCATOR_KIND_TCPV4 => {
                let octets: [u8; 4] = self.address[12..16].try_into().ok()?;
                Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), port))
            }
            LOCATOR_KIND_UDPV6 | LOCATOR_KIND_TCPV6 => {
                Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(self.address)), port))
            }
            _ => None,
        }
    }

    /// IPv4 address view of the last four address bytes.
    #[must_use]
    pub fn ipv4(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.address[12],
            self.address[13],
            self.address[14],
            self.address[15],
        )
    }

    /// SHM segment identifier (last four address bytes, big-endian).
    #[must_use]
    pub fn shm_segment_id(&self) -> u32 {
        u32::from_be_bytes([
            self.address[12],
            self.address[13],
            self.address[14],
            self.address[15],
        ])
    }

    /// Whether the address names a multicast group for its kind.
    #[must_use]
    pub fn is_multicast(&self) -> bool {
        match self.kind {
            LOCATOR_KIND_UDPV4 => self.address[12] >= 224 && self.address[12] <= 239,
            LOCATOR_KIND_UDPV6 => self.address[0] == 0xFF,
            _ => false,
        }
    }

    /// A locator with port zero is unspecified and never a send target.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.kind > 0 && self.port != LOCATOR_PORT_INVALID
    }

    /// Whether the address is a loopback address for its kind.
    #[must_use]
    pub fn is_loopback(&self) -> bool {
        match self.kind {
            LOCATOR_KIND_UDPV4 | LOCATOR_KIND_TCPV4 => self.address[12] == 127,
            LOCATOR_KIND_UDPV6 | LOCATOR_KIND_TCPV6 => {
                Ipv6Addr::from(self.address).is_loopback()
            }
            LOCATOR_KIND_SHM => true,
            _ => false,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LOCATOR_KIND_UDPV4 => write!(f, "udpv4://{}:{}", self.ipv4(), self.port),
            LOCATOR_KIND_UDPV6 => {
                write!(f, "udpv6://[{}]:{}", Ipv6Addr::from(self.address), self.port)
            }
            LOCATOR_KIND_TCPV4 => write!(f, "tcpv4://{}:{}", self.ipv4(), self.port),
            LOCATOR_KIND_TCPV6 => {
                write!(f, "tcpv6://[{}]:{}", Ipv6Addr::from(self.address), self.port)
            }
            LOCATOR_KIND_SHM => write!(f, "shm://{}:{}", self.shm_segment_id(), self.port),
            _ => write!(f, "invalid://"),
        }
    }
}

impl fmt::Debug for Locator {
    // Debug delegates to Display; locators appear constantly in logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// ============================================================================
// Time
// ============================================================================

/// RTPS timestamp: seconds since the UNIX epoch + 2^-32 fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    pub seconds: i32,
    pub fraction: u32,
}

/// The reserved invalid timestamp.
pub const TIME_INVALID: Time = Time {
    seconds: -1,
    fraction: 0xFFFF_FFFF,
};

impl Time {
    /// Current wall-clock time. Falls back to zero before the epoch.
    #[must_use]
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let seconds = i32::try_from(since_epoch.as_secs()).unwrap_or(i32::MAX);
        let fraction = ((u64::from(since_epoch.subsec_nanos()) << 32) / 1_000_000_000) as u32;
        Self { seconds, fraction }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        *self != TIME_INVALID
    }

    /// Total nanoseconds since the epoch (saturating).
    #[must_use]
    pub fn as_nanos(&self) -> u64 {
        let secs = u64::try_from(self.seconds).unwrap_or(0);
        secs.saturating_mul(1_000_000_000)
            .saturating_add((u64::from(self.fraction) * 1_000_000_000) >> 32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_kinds() {
        let writer = EntityId::new([0, 0, 1], ENTITY_KIND_USER_WRITER);
        assert!(writer.is_writer());
        assert!(!writer.is_reader());
        assert!(!writer.is_builtin());

        let builtin_reader = EntityId([0x00, 0x01, 0x00, 0xC7]);
        assert!(builtin_reader.is_reader());
        assert!(builtin_reader.is_builtin());
    }

    #[test]
    fn test_guid_round_trip() {
        let raw = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 0, 0, 1, 0xC1];
        let guid = Guid::from_bytes(raw);
        assert_eq!(guid.as_bytes(), raw);
        assert_eq!(guid.prefix[0], 1);
        assert_eq!(guid.entity_id.kind(), 0xC1);
    }

    #[test]
    fn test_guid_display() {
        let guid = Guid::new([1, 15, 172, 16, 0, 0, 0, 0, 0, 0, 0, 1], EntityId([0, 0, 1, 0xC1]));
        assert_eq!(
            guid.to_string(),
            "01.0f.ac.10.00.00.00.00.00.00.00.01.00.00.01.c1"
        );
    }

    #[test]
    fn test_locator_udpv4() {
        let loc = Locator::udpv4([239, 255, 0, 1], 7400);
        assert!(loc.is_multicast());
        assert!(loc.is_valid());
        assert_eq!(loc.to_socket_addr(), "239.255.0.1:7400".parse().ok());

        let uni = Locator::udpv4([192, 168, 1, 10], 7411);
        assert!(!uni.is_multicast());
        assert_eq!(uni.to_string(), "udpv4://192.168.1.10:7411");
    }

    #[test]
    fn test_locator_socket_addr_round_trip() {
        let addr: SocketAddr = "10.0.0.3:7410".parse().expect("socket addr");
        let loc = Locator::from_socket_addr(addr);
        assert_eq!(loc.kind, LOCATOR_KIND_UDPV4);
        assert_eq!(loc.to_socket_addr(), Some(addr));
    }

    #[test]
    fn test_locator_port_zero_invalid() {
        let loc = Locator::udpv4([192, 168, 1, 1], 0);
        assert!(!loc.is_valid());
    }

    #[test]
    fn test_shm_locator_segment() {
        let loc = Locator::shm(0xDEAD_BEEF, 7);
        assert_eq!(loc.shm_segment_id(), 0xDEAD_BEEF);
        assert!(loc.is_loopback());
        assert_eq!(loc.to_socket_addr(), None);
    }

    #[test]
    fn test_time_now_monotonic_enough() {
        let t = Time::now();
        assert!(t.is_valid());
        assert!(t.seconds > 0);
    }
}
