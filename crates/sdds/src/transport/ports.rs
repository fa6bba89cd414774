// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! RTPS v2.5 port mapping (OMG DDS-RTPS Sec.9.6.1.1).
//!
//! `port = PB + DG * domain_id [+ offset] [+ PG * participant_id]` with
//! PB=7400, DG=250, PG=2 and the standard offsets d0=0 (metatraffic
//! multicast), d1=10 (metatraffic unicast), d3=11 (user unicast).

use crate::config::{DOMAIN_ID_GAIN, MAX_DOMAIN_ID, MAX_PARTICIPANT_ID, PARTICIPANT_ID_GAIN, PORT_BASE, METATRAFFIC_UNICAST_OFFSET, USER_UNICAST_OFFSET};
use crate::error::{Error, Result};

/// Port set for one participant in one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    /// Multicast port for SPDP/SEDP metatraffic.
    pub metatraffic_multicast: u16,
    /// Unicast port for metatraffic (discovery responses, ACKNACK).
    pub metatraffic_unicast: u16,
    /// Unicast port for user data.
    pub user_unicast: u16,
}

impl PortMapping {
    /// Compute the standard ports for `(domain_id, participant_id)`.
    pub fn calculate(domain_id: u32, participant_id: u8) -> Result<Self> {
        if domain_id > MAX_DOMAIN_ID {
            return Err(Error::InvalidArgument(format!(
                "domain_id {} out of range (0-{})",
                domain_id, MAX_DOMAIN_ID
            )));
        }
        if u32::from(participant_id) > MAX_PARTICIPANT_ID {
            return Err(Error::InvalidArgument(format!(
                "participant_id {} out of range (0-{})",
                participant_id, MAX_PARTICIPANT_ID
            )));
        }

        let domain = domain_id as u16;
        let multicast_base = PORT_BASE + DOMAIN_ID_GAIN * domain;
        let unicast_base = PORT_BASE + METATRAFFIC_UNICAST_OFFSET + DOMAIN_ID_GAIN * domain;

        Ok(Self {
            metatraffic_multicast: multicast_base,
            metatraffic_unicast: unicast_base + PARTICIPANT_ID_GAIN * u16::from(participant_id),
            user_unicast: unicast_base + (USER_UNICAST_OFFSET - METATRAFFIC_UNICAST_OFFSET)
                + PARTICIPANT_ID_GAIN * u16::from(participant_id),
        })
    }

    /// Probe free participant ids until a bindable unicast port pair is
    /// found. The multicast port is shared (SO_REUSEADDR) and not probed.
    pub fn auto_assign(domain_id: u32) -> Result<(Self, u8)> {
        for pid in 0..=(MAX_PARTICIPANT_ID as u8) {
            let mapping = Self::calculate(domain_id, pid)?;
            if Self::is_port_available(mapping.metatraffic_unicast)
                && Self::is_port_available(mapping.user_unicast)
            {
                log::debug!(
                    "[PORTS] auto_assign domain={} participant_id={} (meta={}, user={})",
                    domain_id,
                    pid,
                    mapping.metatraffic_unicast,
                    mapping.user_unicast
                );
                return Ok((mapping, pid));
            }
        }
        Err(Error::OutOfResources(format!(
            "no free participant id in domain {}",
            domain_id
        )))
    }

    fn is_port_available(port: u16) -> bool {
        std::net::UdpSocket::bind(("0.0.0.0", port)).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_0_participant_0() {
        let p = PortMapping::calculate(0, 0).expect("valid ids");
        assert_eq!(p.metatraffic_multicast, 7400);
        assert_eq!(p.metatraffic_unicast, 7410);
        assert_eq!(p.user_unicast, 7411);
    }

    #[test]
    fn test_domain_gain() {
        let p = PortMapping::calculate(1, 0).expect("valid ids");
        assert_eq!(p.metatraffic_multicast, 7650);
        assert_eq!(p.metatraffic_unicast, 7660);
        assert_eq!(p.user_unicast, 7661);
    }

    #[test]
    fn test_participant_gain() {
        let p = PortMapping::calculate(0, 2).expect("valid ids");
        assert_eq!(p.metatraffic_unicast, 7414);
        assert_eq!(p.user_unicast, 7415);
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(PortMapping::calculate(233, 0).is_err());
        assert!(PortMapping::calculate(0, 120).is_err());
    }
}
