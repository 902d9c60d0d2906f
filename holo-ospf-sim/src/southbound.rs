//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use holo_netsim::discovery::Discovery;
use holo_netsim::rib::RoutingTable;
use holo_netsim::timer::TimerService;
use holo_netsim::transport::PacketTransport;

use crate::packet::Packet;
use crate::route::RouteMetadata;
use crate::tasks::TimerToken;

// Services an OSPF instance consumes from the node it runs on.
//
// Every engine entry point borrows the node's services for the duration of
// the call only.
pub trait Southbound:
    TimerService<TimerToken>
    + PacketTransport<Packet>
    + RoutingTable<RouteMetadata>
    + Discovery
{
}

impl<T> Southbound for T where
    T: TimerService<TimerToken>
        + PacketTransport<Packet>
        + RoutingTable<RouteMetadata>
        + Discovery
{
}
