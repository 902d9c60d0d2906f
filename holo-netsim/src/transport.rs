//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use derive_new::new;
use serde::{Deserialize, Serialize};

/// Outgoing interface selection for a forwarded packet.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum OutInterface {
    // Let the forwarding plane resolve the interface from the destination.
    Any,
    // Send out a single interface.
    Index(u32),
    // Send out each of the listed interfaces.
    List(Vec<u32>),
}

/// Forwarding parameters attached to an outgoing packet.
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct ForwardInfo {
    pub src: Ipv4Addr,
    // `None` stands for the link-local wildcard destination.
    pub dst: Option<Ipv4Addr>,
    pub router_alert: bool,
    pub ttl: u8,
    pub tos: u8,
    pub out: OutInterface,
}

/// Packet send/forward primitive.
pub trait PacketTransport<P> {
    fn forward(&mut self, packet: P, info: ForwardInfo);
}

// ===== impl ForwardInfo =====

impl ForwardInfo {
    /// Parameters of a link-local broadcast sent out a single interface.
    pub fn link_local(src: Ipv4Addr, ifindex: u32) -> ForwardInfo {
        ForwardInfo {
            src,
            dst: None,
            router_alert: true,
            ttl: 1,
            tos: 0,
            out: OutInterface::Index(ifindex),
        }
    }

    /// Parameters of a unicast packet to a directly connected neighbor.
    pub fn unicast(src: Ipv4Addr, dst: Ipv4Addr, ifindex: u32) -> ForwardInfo {
        ForwardInfo {
            src,
            dst: Some(dst),
            router_alert: false,
            ttl: 1,
            tos: 0,
            out: OutInterface::Index(ifindex),
        }
    }

    /// Returns whether this is a link-local broadcast.
    pub fn is_broadcast(&self) -> bool {
        self.router_alert && self.dst.is_none()
    }

    /// Returns the list of outgoing interfaces, if explicitly given.
    pub fn ifindexes(&self) -> &[u32] {
        match &self.out {
            OutInterface::Any => &[],
            OutInterface::Index(ifindex) => std::slice::from_ref(ifindex),
            OutInterface::List(ifindexes) => ifindexes,
        }
    }
}
