//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use holo_netsim::discovery::{DiscoveryEvent, Identity, router_id_from_addr};
use tracing::debug_span;

use crate::area::Area;
use crate::collections::{AreaId, Areas, Arena};
use crate::config::{InstanceCfg, InterfaceCfg, TraceOptions};
use crate::debug::Debug;
use crate::error::Error;
use crate::interface::Interface;
use crate::neighbor::Neighbor;
use crate::packet::Packet;
use crate::packet::lsa::LsaKey;
use crate::route::{Nexthops, RouteRtr};
use crate::southbound::Southbound;
use crate::tasks::{
    DeadlineQueue, LsaOriginateEvent, ProtocolInputQueue, SharedTimer,
    TimerToken,
};
use crate::{events, qos, route, spf};

// OSPF instance.
//
// The instance holds no reference to the node it runs on. Every entry point
// borrows the node's services for the duration of the call.
#[derive(Debug)]
pub struct Instance {
    // Instance name.
    pub name: String,
    // Instance configuration data.
    pub config: InstanceCfg,
    // Instance state data.
    pub state: InstanceState,
    // Instance arenas.
    pub arenas: InstanceArenas,
}

#[derive(Debug)]
pub struct InstanceState {
    // Instance Router ID.
    pub router_id: Ipv4Addr,
    // Events pending processing.
    pub input: ProtocolInputQueue,
    // MaxAge deadlines of all stored LSAs.
    pub maxage_queue: DeadlineQueue<(AreaId, LsaKey)>,
    pub maxage_timer: SharedTimer,
    // Postponed router-LSA originations.
    pub flood_queue: DeadlineQueue<AreaId>,
    pub flood_timer: SharedTimer,
    // Whether the routing table needs to be recomputed.
    pub spf_pending: bool,
    // Routing table.
    pub rib: BTreeMap<Ipv4Addr, RouteRtr>,
    // Statistics.
    pub orig_lsa_count: u32,
    pub rx_lsa_count: u32,
}

#[derive(Debug, Default)]
pub struct InstanceArenas {
    pub areas: Areas,
    pub interfaces: Arena<Interface>,
    pub neighbors: Arena<Neighbor>,
}

pub struct InstanceUpView<'a> {
    pub name: &'a str,
    pub config: &'a InstanceCfg,
    pub state: &'a mut InstanceState,
    pub sb: &'a mut dyn Southbound,
}

// ===== impl Instance =====

impl Instance {
    pub fn new(
        name: impl Into<String>,
        config: InstanceCfg,
        identity: &dyn Identity,
    ) -> Instance {
        let name = name.into();
        let router_id = router_id_from_addr(identity.default_address());
        debug_span!("ospf-instance", %name).in_scope(|| {
            Debug::InstanceCreate.log();
        });

        Instance {
            name,
            config,
            state: InstanceState::new(router_id),
            arenas: Default::default(),
        }
    }

    // ===== entry points =====

    pub fn process_discovery_event(
        &mut self,
        sb: &mut dyn Southbound,
        event: DiscoveryEvent,
    ) {
        match event {
            DiscoveryEvent::NeighborUp { ifindex, addr } => {
                self.process_neighbor_up(sb, ifindex, addr)
            }
            DiscoveryEvent::NeighborDown { ifindex, addr } => {
                self.process_neighbor_down(sb, ifindex, addr)
            }
        }
    }

    pub fn process_neighbor_up(
        &mut self,
        sb: &mut dyn Southbound,
        ifindex: u32,
        addr: Ipv4Addr,
    ) {
        self.process(sb, |instance, arenas| {
            events::process_neighbor_up(instance, arenas, ifindex, addr)
        });
    }

    pub fn process_neighbor_down(
        &mut self,
        sb: &mut dyn Southbound,
        ifindex: u32,
        addr: Ipv4Addr,
    ) {
        self.process(sb, |instance, arenas| {
            events::process_neighbor_down(instance, arenas, ifindex, addr)
        });
    }

    pub fn process_packet(
        &mut self,
        sb: &mut dyn Southbound,
        ifindex: u32,
        src: Ipv4Addr,
        packet: Packet,
    ) {
        self.process(sb, |instance, arenas| {
            events::process_packet(instance, arenas, ifindex, src, packet)
        });
    }

    pub fn process_timeout(
        &mut self,
        sb: &mut dyn Southbound,
        token: TimerToken,
    ) {
        self.process(sb, |instance, arenas| {
            events::process_timeout(instance, arenas, token)
        });
    }

    // ===== route queries =====

    // Returns the route to the given router, if any.
    pub fn route_lookup(&self, dest: Ipv4Addr) -> Option<&RouteRtr> {
        route::lookup(&self.state.rib, dest)
    }

    // Computes on demand the nexthops of the shortest path to the given
    // router that only traverses links able to carry `bandwidth` (bits per
    // second).
    pub fn qos_route_query(
        &mut self,
        sb: &mut dyn Southbound,
        dest: Ipv4Addr,
        bandwidth: u64,
    ) -> Option<Nexthops> {
        let span = debug_span!("ospf-instance", name = %self.name);
        let _span_guard = span.enter();

        let (instance, arenas) = self.as_up(sb);
        let nexthops = arenas.areas.iter().find_map(|area| {
            qos::route_query(
                area,
                &instance,
                &arenas.interfaces,
                &arenas.neighbors,
                dest,
                bandwidth,
            )
        });
        Debug::QosRouteQuery(&dest, bandwidth, nexthops.is_some()).log();

        nexthops
    }

    // Looks up the precomputed bandwidth-constrained routes for the
    // minimum-hop path to the given router able to carry `bandwidth`.
    //
    // Returns the path's hop count and nexthops.
    pub fn qos_route_lookup(
        &self,
        dest: Ipv4Addr,
        bandwidth: u64,
    ) -> Option<(usize, &Nexthops)> {
        let route = self
            .arenas
            .areas
            .iter()
            .find_map(|area| area.state.qos_table.lookup(dest, bandwidth))
            .map(|(hops, entry)| (hops, &entry.nexthops));

        let span = debug_span!("ospf-instance", name = %self.name);
        span.in_scope(|| {
            Debug::QosRouteQuery(&dest, bandwidth, route.is_some()).log();
        });

        route
    }

    // ===== configuration =====

    // Sets the area of the interfaces without an area of their own.
    //
    // Only interfaces created afterwards are affected.
    pub fn set_area_id(&mut self, area_id: Ipv4Addr) {
        self.config.area_id = area_id;
    }

    // Sets the configuration of the given interface.
    //
    // Changes to the interface area only take effect when the interface is
    // recreated.
    pub fn set_interface_cfg(
        &mut self,
        sb: &mut dyn Southbound,
        ifindex: u32,
        iface_cfg: InterfaceCfg,
    ) {
        self.config.interfaces.insert(ifindex, iface_cfg.clone());

        self.process(sb, |instance, arenas| {
            let Some((_, area)) = arenas.areas.get_by_ifindex(ifindex) else {
                return Ok(());
            };
            let area_id = area.id;
            let iface_idx = area
                .interfaces
                .get_by_ifindex(&arenas.interfaces, ifindex)
                .map(|(iface_idx, _)| iface_idx);
            if let Some(iface_idx) = iface_idx {
                arenas.interfaces[iface_idx].config = iface_cfg;
            }

            // The interface cost might have changed.
            let event = LsaOriginateEvent::ConfigChange { area_id };
            instance.state.input.lsa_orig_event(event);
            Ok(())
        });
    }

    // Enables or disables the advertisement of link bandwidths and the
    // bandwidth-constrained route computations.
    pub fn set_qos_enabled(&mut self, sb: &mut dyn Southbound, enabled: bool) {
        if self.config.qos_enabled == enabled {
            return;
        }
        self.config.qos_enabled = enabled;

        self.process(sb, |instance, arenas| {
            for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
                let area = &mut arenas.areas[area_idx];
                if !enabled {
                    area.state.qos_table = Default::default();
                }

                // Update the link metrics advertised in the router-LSA.
                let area_id = area.id;
                let event = LsaOriginateEvent::ConfigChange { area_id };
                instance.state.input.lsa_orig_event(event);
            }
            instance.state.spf_pending = true;
            Ok(())
        });
    }

    pub fn set_trace_options(&mut self, trace_opts: TraceOptions) {
        self.config.trace_opts = trace_opts;
    }

    // ===== accessors =====

    pub fn router_id(&self) -> Ipv4Addr {
        self.state.router_id
    }

    pub fn area(&self, area_id: Ipv4Addr) -> Option<&Area> {
        self.arenas
            .areas
            .get_by_area_id(area_id)
            .map(|(_, area)| area)
    }

    pub fn interface(&self, ifindex: u32) -> Option<&Interface> {
        let (_, area) = self.arenas.areas.get_by_ifindex(ifindex)?;
        area.interfaces
            .get_by_ifindex(&self.arenas.interfaces, ifindex)
            .map(|(_, iface)| iface)
    }

    pub fn neighbor(
        &self,
        ifindex: u32,
        router_id: Ipv4Addr,
    ) -> Option<&Neighbor> {
        self.interface(ifindex)?
            .state
            .neighbors
            .get_by_router_id(&self.arenas.neighbors, router_id)
            .map(|(_, nbr)| nbr)
    }

    pub fn routes(&self) -> &BTreeMap<Ipv4Addr, RouteRtr> {
        &self.state.rib
    }

    // ===== helper methods =====

    fn as_up<'a>(
        &'a mut self,
        sb: &'a mut dyn Southbound,
    ) -> (InstanceUpView<'a>, &'a mut InstanceArenas) {
        let instance = InstanceUpView {
            name: &self.name,
            config: &self.config,
            state: &mut self.state,
            sb,
        };
        (instance, &mut self.arenas)
    }

    // Runs the given event handler to completion, followed by all the
    // processing it triggered.
    fn process<F>(&mut self, sb: &mut dyn Southbound, f: F)
    where
        F: FnOnce(
            &mut InstanceUpView<'_>,
            &mut InstanceArenas,
        ) -> Result<(), Error>,
    {
        let span = debug_span!("ospf-instance", name = %self.name);
        let _span_guard = span.enter();

        let (mut instance, arenas) = self.as_up(sb);
        if let Err(error) = f(&mut instance, &mut *arenas) {
            error.log();
        }
        process_pending(&mut instance, arenas);
    }
}

// ===== impl InstanceState =====

impl InstanceState {
    fn new(router_id: Ipv4Addr) -> InstanceState {
        InstanceState {
            router_id,
            input: Default::default(),
            maxage_queue: Default::default(),
            maxage_timer: Default::default(),
            flood_queue: Default::default(),
            flood_timer: Default::default(),
            spf_pending: false,
            rib: Default::default(),
            orig_lsa_count: 0,
            rx_lsa_count: 0,
        }
    }
}

// ===== helper functions =====

fn process_pending(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    // Process internal events.
    while let Some(msg) = instance.state.input.pop() {
        if let Err(error) = events::process_input_msg(instance, arenas, msg) {
            error.log();
        }
    }

    // Recompute the routing table if the LSDB has changed.
    if instance.state.spf_pending {
        instance.state.spf_pending = false;
        spf::run(instance, arenas);
    }

    // Retarget the shared timers to their next deadlines.
    let next = instance.state.maxage_queue.next_deadline();
    instance.state.maxage_timer.retarget(
        instance.sb,
        next,
        TimerToken::LsMaxAgeReached,
    );
    let next = instance.state.flood_queue.next_deadline();
    instance.state.flood_timer.retarget(
        instance.sb,
        next,
        TimerToken::DelayedFlood,
    );
}
