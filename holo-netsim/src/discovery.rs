//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use derive_new::new;
use serde::{Deserialize, Serialize};

/// Type of the simulated link attached to an interface.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LinkType {
    #[default]
    PointToPoint,
    Broadcast,
}

/// Static information about a simulated interface.
#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct InterfaceInfo {
    pub ifindex: u32,
    pub mtu: u16,
    pub link_type: LinkType,
    // Link bandwidth in bits per second.
    pub bandwidth: u64,
}

/// Neighbor reachability events reported by the discovery service.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum DiscoveryEvent {
    NeighborUp { ifindex: u32, addr: Ipv4Addr },
    NeighborDown { ifindex: u32, addr: Ipv4Addr },
}

/// Interface/neighbor discovery service.
pub trait Discovery {
    /// Returns static information about the given interface.
    fn interface_info(&self, ifindex: u32) -> Option<InterfaceInfo>;
}

/// Node identity service.
pub trait Identity {
    /// Returns the node's default address.
    ///
    /// Simulated node addresses are 64 bits wide.
    fn default_address(&self) -> u64;
}

// ===== global functions =====

/// Derives a 32-bit router identifier from a 64-bit node address.
///
/// Only the low-order 32 bits are kept. Two nodes whose addresses differ only
/// above bit 31 therefore end up with the same router identifier.
pub fn router_id_from_addr(addr: u64) -> Ipv4Addr {
    Ipv4Addr::from(addr as u32)
}
