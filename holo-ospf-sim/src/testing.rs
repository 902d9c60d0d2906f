//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Discrete-event network of simulated OSPF routers.
//!
//! Every router is made of an OSPF [`Instance`] and the node services it
//! consumes. All timers and in-flight packets of the network share a single
//! event queue, which is processed in deadline order. Events sharing the
//! same deadline are processed in the order they were scheduled, so runs are
//! fully reproducible.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::time::Duration;

use holo_netsim::SimTime;
use holo_netsim::discovery::{
    Discovery, DiscoveryEvent, Identity, InterfaceInfo, LinkType,
    router_id_from_addr,
};
use holo_netsim::rib::{MatchMode, Rib, RoutingTable, RtEntry, RtKey};
use holo_netsim::timer::{TimerHandle, TimerQueue, TimerService};
use holo_netsim::transport::{ForwardInfo, OutInterface, PacketTransport};
use itertools::Itertools;

use crate::config::InstanceCfg;
use crate::instance::Instance;
use crate::packet::{Packet, PacketType};
use crate::route::RouteMetadata;
use crate::southbound::Southbound;
use crate::tasks::TimerToken;

// Default one-way propagation delay of the simulated links.
pub const LINK_DELAY: Duration = Duration::from_millis(1);

// MTU of the simulated links.
pub const LINK_MTU: u16 = 1500;

#[derive(Debug)]
pub struct Network {
    clock: SimTime,
    link_delay: Duration,
    events: TimerQueue<SimEvent>,
    nodes: BTreeMap<u64, Node>,
    packets: Vec<PacketRecord>,
}

#[derive(Debug)]
pub struct Node {
    pub instance: Instance,
    pub sys: NodeSys,
}

// Node state not owned by the OSPF instance.
#[derive(Debug)]
pub struct NodeSys {
    addr: u64,
    ports: BTreeMap<u32, Port>,
    // Node routing table.
    pub rib: Rib<RouteMetadata>,
    // Number of entries added to or removed from the routing table.
    pub rib_changes: usize,
}

#[derive(Clone, Copy, Debug)]
struct Port {
    info: InterfaceInfo,
    peer: u64,
    peer_ifindex: u32,
    up: bool,
}

// Packet sent by one of the routers.
#[derive(Clone, Debug)]
pub struct PacketRecord {
    pub time: SimTime,
    pub from: u64,
    pub to: u64,
    // Outgoing interface of the sender.
    pub ifindex: u32,
    pub info: ForwardInfo,
    pub packet: Packet,
}

#[derive(Debug)]
enum SimEvent {
    Timer {
        node: u64,
        token: TimerToken,
    },
    Deliver {
        node: u64,
        ifindex: u32,
        src: Ipv4Addr,
        packet: Packet,
    },
    Discovery {
        node: u64,
        event: DiscoveryEvent,
    },
}

// Node services lent to an instance for the duration of one entry point.
struct NodeServices<'a> {
    clock: SimTime,
    link_delay: Duration,
    node: u64,
    sys: &'a mut NodeSys,
    events: &'a mut TimerQueue<SimEvent>,
    packets: &'a mut Vec<PacketRecord>,
}

// ===== impl Network =====

impl Network {
    pub fn set_link_delay(&mut self, link_delay: Duration) {
        self.link_delay = link_delay;
    }

    pub fn now(&self) -> SimTime {
        self.clock
    }

    // Adds a router with the given node address.
    //
    // Returns the Router ID the router ends up with.
    pub fn add_router(&mut self, addr: u64, config: InstanceCfg) -> Ipv4Addr {
        let sys = NodeSys::new(addr);
        let name = router_id_from_addr(addr).to_string();
        let instance = Instance::new(name, config, &sys);
        let router_id = instance.router_id();
        self.nodes.insert(addr, Node { instance, sys });
        router_id
    }

    // Connects two routers with a point-to-point link of the given bandwidth
    // (bits per second), and reports the new neighbors on both ends.
    //
    // Returns the interface indexes allocated on each end.
    pub fn add_link(&mut self, a: u64, b: u64, bandwidth: u64) -> (u32, u32) {
        let a_ifindex = self.node(a).sys.next_ifindex();
        let b_ifindex = self.node(b).sys.next_ifindex();

        for (node, ifindex, peer, peer_ifindex) in
            [(a, a_ifindex, b, b_ifindex), (b, b_ifindex, a, a_ifindex)]
        {
            let info = InterfaceInfo::new(
                ifindex,
                LINK_MTU,
                LinkType::PointToPoint,
                bandwidth,
            );
            let port = Port {
                info,
                peer,
                peer_ifindex,
                up: true,
            };
            self.node_mut(node).sys.ports.insert(ifindex, port);
        }
        self.link_event(a, a_ifindex, true);

        (a_ifindex, b_ifindex)
    }

    // Brings down the link attached to the given interface.
    pub fn link_down(&mut self, addr: u64, ifindex: u32) {
        self.link_event(addr, ifindex, false);
    }

    // Brings back up the link attached to the given interface.
    pub fn link_up(&mut self, addr: u64, ifindex: u32) {
        self.link_event(addr, ifindex, true);
    }

    // Schedules the delivery of a packet to the given router, as if it was
    // received on `ifindex` from `src`.
    pub fn inject(
        &mut self,
        addr: u64,
        ifindex: u32,
        src: Ipv4Addr,
        packet: Packet,
    ) {
        let event = SimEvent::Deliver {
            node: addr,
            ifindex,
            src,
            packet,
        };
        self.events.insert(self.clock, event);
    }

    // Processes all events up to and including the given time.
    pub fn run_until(&mut self, until: SimTime) {
        while let Some((at, _, event)) = self.events.pop_expired(until) {
            self.clock = at;
            self.dispatch(event);
        }
        self.clock = std::cmp::max(self.clock, until);
    }

    pub fn run_for(&mut self, duration: Duration) {
        self.run_until(self.clock + duration);
    }

    // Runs the given closure against the instance of a router, lending it
    // the router's node services.
    pub fn with_router<F, R>(&mut self, addr: u64, f: F) -> R
    where
        F: FnOnce(&mut Instance, &mut dyn Southbound) -> R,
    {
        let Some(node) = self.nodes.get_mut(&addr) else {
            panic!("unknown node {addr:#x}");
        };
        node.sys.rib.advance(self.clock);

        let mut sb = NodeServices {
            clock: self.clock,
            link_delay: self.link_delay,
            node: addr,
            sys: &mut node.sys,
            events: &mut self.events,
            packets: &mut self.packets,
        };
        f(&mut node.instance, &mut sb)
    }

    pub fn instance(&self, addr: u64) -> &Instance {
        &self.node(addr).instance
    }

    pub fn rib(&self, addr: u64) -> &Rib<RouteMetadata> {
        &self.node(addr).sys.rib
    }

    pub fn rib_changes(&self, addr: u64) -> usize {
        self.node(addr).sys.rib_changes
    }

    pub fn packets(&self) -> &[PacketRecord] {
        &self.packets
    }

    pub fn packet_counts(&self) -> HashMap<PacketType, usize> {
        self.packets
            .iter()
            .counts_by(|record| record.packet.hdr().pkt_type)
    }

    pub fn packet_count(&self, pkt_type: PacketType) -> usize {
        self.packet_counts().get(&pkt_type).copied().unwrap_or(0)
    }

    pub fn clear_packets(&mut self) {
        self.packets.clear();
    }

    // ===== helper methods =====

    fn node(&self, addr: u64) -> &Node {
        match self.nodes.get(&addr) {
            Some(node) => node,
            None => panic!("unknown node {addr:#x}"),
        }
    }

    fn node_mut(&mut self, addr: u64) -> &mut Node {
        match self.nodes.get_mut(&addr) {
            Some(node) => node,
            None => panic!("unknown node {addr:#x}"),
        }
    }

    // Changes the state of both ends of a link, and reports the neighbor
    // change to the two routers.
    fn link_event(&mut self, addr: u64, ifindex: u32, up: bool) {
        let Some(port) = self.node(addr).sys.ports.get(&ifindex).copied()
        else {
            panic!("unknown interface {ifindex} on node {addr:#x}");
        };

        for (node, ifindex, peer) in [
            (addr, ifindex, port.peer),
            (port.peer, port.peer_ifindex, addr),
        ] {
            if let Some(port) = self.node_mut(node).sys.ports.get_mut(&ifindex)
            {
                port.up = up;
            }

            let nbr_addr = router_id_from_addr(peer);
            let event = if up {
                DiscoveryEvent::NeighborUp {
                    ifindex,
                    addr: nbr_addr,
                }
            } else {
                DiscoveryEvent::NeighborDown {
                    ifindex,
                    addr: nbr_addr,
                }
            };
            self.events
                .insert(self.clock, SimEvent::Discovery { node, event });
        }
    }

    fn dispatch(&mut self, event: SimEvent) {
        match event {
            SimEvent::Timer { node, token } => {
                self.with_router(node, |instance, sb| {
                    instance.process_timeout(sb, token)
                });
            }
            SimEvent::Deliver {
                node,
                ifindex,
                src,
                packet,
            } => {
                // Packets in flight are lost when their link goes down.
                let up = self
                    .nodes
                    .get(&node)
                    .and_then(|node| node.sys.ports.get(&ifindex))
                    .is_some_and(|port| port.up);
                if !up {
                    return;
                }

                self.with_router(node, |instance, sb| {
                    instance.process_packet(sb, ifindex, src, packet)
                });
            }
            SimEvent::Discovery { node, event } => {
                self.with_router(node, |instance, sb| {
                    instance.process_discovery_event(sb, event)
                });
            }
        }
    }
}

impl Default for Network {
    fn default() -> Network {
        Network {
            clock: SimTime::ZERO,
            link_delay: LINK_DELAY,
            events: Default::default(),
            nodes: Default::default(),
            packets: Default::default(),
        }
    }
}

// ===== impl NodeSys =====

impl NodeSys {
    fn new(addr: u64) -> NodeSys {
        NodeSys {
            addr,
            ports: Default::default(),
            rib: Default::default(),
            rib_changes: 0,
        }
    }

    fn next_ifindex(&self) -> u32 {
        self.ports
            .last_key_value()
            .map(|(ifindex, _)| ifindex + 1)
            .unwrap_or(1)
    }
}

impl Identity for NodeSys {
    fn default_address(&self) -> u64 {
        self.addr
    }
}

// ===== impl NodeServices =====

impl TimerService<TimerToken> for NodeServices<'_> {
    fn now(&self) -> SimTime {
        self.clock
    }

    fn schedule_at(&mut self, at: SimTime, token: TimerToken) -> TimerHandle {
        let event = SimEvent::Timer {
            node: self.node,
            token,
        };
        self.events.insert(at, event)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.events.cancel(handle);
    }
}

impl PacketTransport<Packet> for NodeServices<'_> {
    fn forward(&mut self, packet: Packet, info: ForwardInfo) {
        // Resolve the outgoing interfaces.
        let ifindexes = match &info.out {
            OutInterface::Any => info
                .dst
                .and_then(|dst| self.sys.rib.lookup(dst))
                .and_then(|entry| entry.out_ifindexes.first().copied())
                .into_iter()
                .collect::<Vec<_>>(),
            _ => info.ifindexes().to_vec(),
        };

        for ifindex in ifindexes {
            let Some(port) = self.sys.ports.get(&ifindex).filter(|p| p.up)
            else {
                continue;
            };

            self.packets.push(PacketRecord {
                time: self.clock,
                from: self.node,
                to: port.peer,
                ifindex,
                info: info.clone(),
                packet: packet.clone(),
            });

            let event = SimEvent::Deliver {
                node: port.peer,
                ifindex: port.peer_ifindex,
                src: info.src,
                packet: packet.clone(),
            };
            self.events.insert(self.clock + self.link_delay, event);
        }
    }
}

impl RoutingTable<RouteMetadata> for NodeServices<'_> {
    fn route_add(
        &mut self,
        key: RtKey,
        entry: RtEntry<RouteMetadata>,
        timeout: Option<Duration>,
    ) {
        self.sys.rib_changes += 1;
        self.sys.rib.route_add(key, entry, timeout);
    }

    fn route_remove(
        &mut self,
        key: &RtKey,
        mode: MatchMode,
    ) -> Vec<(RtKey, RtEntry<RouteMetadata>)> {
        let removed = self.sys.rib.route_remove(key, mode);
        self.sys.rib_changes += removed.len();
        removed
    }

    fn route_retrieve(
        &self,
        key: &RtKey,
        mode: MatchMode,
    ) -> Vec<(RtKey, RtEntry<RouteMetadata>)> {
        self.sys.rib.route_retrieve(key, mode)
    }
}

impl Discovery for NodeServices<'_> {
    fn interface_info(&self, ifindex: u32) -> Option<InterfaceInfo> {
        self.sys.ports.get(&ifindex).map(|port| port.info)
    }
}
