// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 SDDS contributors

//! Multicast group management and interface discovery.

use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use crate::config::MULTICAST_IP;

/// Join the standard RTPS multicast group on the primary interface, with
/// loopback enabled for intra-host pub/sub. Returns the interface used.
pub fn join_multicast_group(socket: &UdpSocket) -> io::Result<Ipv4Addr> {
    let iface = primary_interface_ip()?;
    let group = Ipv4Addr::from(MULTICAST_IP);
    socket.join_multicast_v4(&group, &iface)?;
    socket.set_multicast_loop_v4(true)?;
    log::debug!("[MCAST] joined {} on iface {}", group, iface);
    Ok(iface)
}

/// Primary outbound IPv4 interface address; loopback when the host has no
/// routable interface.
pub fn primary_interface_ip() -> io::Result<Ipv4Addr> {
    match local_ip_address::local_ip() {
        Ok(IpAddr::V4(v4)) => Ok(v4),
        Ok(IpAddr::V6(_)) | Err(_) => {
            // v6-only hosts and sandboxes still get a working loopback path.
            Ok(Ipv4Addr::LOCALHOST)
        }
    }
}

/// All local IPv4 addresses, including loopback. Used to build unicast
/// locator lists for announcements and to recognize same-host remotes.
#[must_use]
pub fn local_ipv4_addresses() -> Vec<Ipv4Addr> {
    let mut addrs: Vec<Ipv4Addr> = Vec::new();
    if let Ok(ifaces) = local_ip_address::list_afinet_netifas() {
        for (_name, ip) in ifaces {
            if let IpAddr::V4(v4) = ip {
                if !addrs.contains(&v4) {
                    addrs.push(v4);
                }
            }
        }
    }
    if addrs.is_empty() {
        addrs.push(Ipv4Addr::LOCALHOST);
    }
    addrs
}

/// Whether `addr` belongs to this host.
#[must_use]
pub fn is_local_address(addr: Ipv4Addr) -> bool {
    addr.is_loopback() || local_ipv4_addresses().contains(&addr)
}
