//! Port validation and local interface addresses.

use crate::error::{Error, Result};
use if_addrs::IfAddr;
use std::net::{Ipv4Addr, Ipv6Addr};

/// A mapping port must be in `1..=65535`.
pub fn is_valid_port(port: u64) -> bool {
    port > 0 && port <= u64::from(u16::MAX)
}

pub fn parse_port(port: u64) -> Result<u16> {
    if !is_valid_port(port) {
        return Err(Error::InvalidPort(port));
    }
    u16::try_from(port).map_err(|_| Error::InvalidPort(port))
}

/// The first IPv4 address bound to the named interface.
pub fn interface_ipv4(name: &str) -> Result<Ipv4Addr> {
    let addrs = interface_addrs(name)?;
    let v4: Vec<Ipv4Addr> = addrs
        .iter()
        .filter_map(|addr| match addr {
            IfAddr::V4(v4) => Some(v4.ip),
            IfAddr::V6(_) => None,
        })
        .collect();
    v4.first()
        .copied()
        .ok_or_else(|| Error::NoIpv4Address(name.to_string()))
}

/// An IPv6 address of the named interface, preferring a routable one.
pub fn interface_ipv6(name: &str) -> Result<Ipv6Addr> {
    let addrs = interface_addrs(name)?;
    let v6: Vec<Ipv6Addr> = addrs
        .iter()
        .filter_map(|addr| match addr {
            IfAddr::V6(v6) => Some(v6.ip),
            IfAddr::V4(_) => None,
        })
        .collect();
    pick_ipv6(&v6).ok_or_else(|| Error::NoIpv6Address(name.to_string()))
}

fn interface_addrs(name: &str) -> Result<Vec<IfAddr>> {
    let addrs: Vec<IfAddr> = if_addrs::get_if_addrs()?
        .into_iter()
        .filter(|iface| iface.name == name)
        .map(|iface| iface.addr)
        .collect();
    if addrs.is_empty() {
        return Err(Error::InterfaceNotFound(name.to_string()));
    }
    Ok(addrs)
}

/// With several addresses, the first global unicast one that is not link-local
/// wins; otherwise the last address seen.
fn pick_ipv6(addrs: &[Ipv6Addr]) -> Option<Ipv6Addr> {
    if addrs.len() > 1 {
        if let Some(global) = addrs.iter().find(|ip| is_global_unicast(ip)) {
            return Some(*global);
        }
    }
    addrs.last().copied()
}

fn is_link_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

fn is_global_unicast(ip: &Ipv6Addr) -> bool {
    !ip.is_unspecified() && !ip.is_loopback() && !ip.is_multicast() && !is_link_local(ip)
}
