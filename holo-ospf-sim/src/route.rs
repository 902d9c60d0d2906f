//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, btree_map};
use std::net::Ipv4Addr;

use derive_new::new;
use holo_netsim::rib::{MatchMode, RtEntry, RtKey};
use serde::{Deserialize, Serialize};

use crate::collections::Areas;
use crate::debug::Debug;
use crate::instance::InstanceUpView;

// Router routing table entry.
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RouteRtr {
    pub area_id: Ipv4Addr,
    pub distance: u32,
    pub hops: u16,
    pub nexthops: Nexthops,
}

// Route nexthop key: outgoing interface and nexthop address.
pub type NexthopKey = (u32, Ipv4Addr);

// Route nexthop.
#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Nexthop {
    // Nexthop interface.
    pub ifindex: u32,
    // Nexthop address.
    pub addr: Ipv4Addr,
    // Router-ID of the remote neighbor.
    pub nbr_router_id: Ipv4Addr,
}

// Ordered list of nexthops.
pub type Nexthops = BTreeMap<NexthopKey, Nexthop>;

// Information attached to the routes installed in the node's routing table.
//
// It's a copy of the SPF results at the time of installation and carries no
// reference to the shortest-path tree. Routes are only reinstalled when their
// forwarding changes, so `distance` and `hops` can lag behind the current
// SPF results. `Instance::route_lookup` always reflects the latest run.
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RouteMetadata {
    pub area_id: Ipv4Addr,
    pub router_id: Ipv4Addr,
    pub distance: u32,
    pub hops: u16,
}

// ===== impl RouteRtr =====

impl RouteRtr {
    // Returns the nexthop address and the set of outgoing interfaces used to
    // install this route, or `None` if the route isn't installable.
    fn forwarding(&self) -> Option<(Ipv4Addr, BTreeSet<u32>)> {
        let (_, first) = self.nexthops.first_key_value()?;
        let ifindexes = self.nexthops.keys().map(|(ifindex, _)| *ifindex);
        Some((first.addr, ifindexes.collect()))
    }
}

// ===== global functions =====

// Rebuilds the routing table from the shortest-path trees of all areas, and
// propagates the changes to the node's routing table.
pub(crate) fn update_rib(instance: &mut InstanceUpView<'_>, areas: &Areas) {
    let router_id = instance.state.router_id;

    // Compute new routing table.
    let mut rib = BTreeMap::new();
    for area in areas.iter() {
        for vertex in area
            .state
            .spt
            .values()
            .filter(|vertex| vertex.router_id != router_id)
        {
            let route = RouteRtr::new(
                area.area_id,
                vertex.distance,
                vertex.hops,
                vertex.nexthops.clone(),
            );
            route_update(&mut rib, vertex.router_id, route);
        }
    }

    // Update the node's routing table.
    let old_rib = std::mem::replace(&mut instance.state.rib, rib);
    update_global_rib(instance, old_rib);
}

// Returns the route to the given router, if any.
pub(crate) fn lookup(
    rib: &BTreeMap<Ipv4Addr, RouteRtr>,
    dest: Ipv4Addr,
) -> Option<&RouteRtr> {
    rib.get(&dest).filter(|route| !route.nexthops.is_empty())
}

// ===== helper functions =====

fn update_global_rib(
    instance: &mut InstanceUpView<'_>,
    mut old_rib: BTreeMap<Ipv4Addr, RouteRtr>,
) {
    // Install new routes or routes that have changed.
    for (dest, route) in &instance.state.rib {
        let new_fwd = route.forwarding();
        let old_fwd = old_rib
            .remove(dest)
            .and_then(|old_route| old_route.forwarding());

        // Skip reinstalling the route if its forwarding information hasn't
        // changed.
        if new_fwd == old_fwd {
            continue;
        }

        // The list of nexthops might be empty in the case of nexthop
        // computation errors. When that happens, ensure the route is removed
        // from the routing table.
        let key = RtKey::host(*dest);
        match new_fwd {
            Some((next_hop, out_ifindexes)) => {
                Debug::RouteInstall(dest, route).log();
                let metadata = RouteMetadata::new(
                    route.area_id,
                    *dest,
                    route.distance,
                    route.hops,
                );
                let entry =
                    RtEntry::new(Some(next_hop), out_ifindexes, metadata);
                instance.sb.route_add(key, entry, None);
            }
            None => {
                Debug::RouteUninstall(dest).log();
                instance.sb.route_remove(&key, MatchMode::Exact);
            }
        }
    }

    // Uninstall routes that are no longer available.
    for (dest, _) in old_rib
        .into_iter()
        .filter(|(_, route)| route.forwarding().is_some())
    {
        Debug::RouteUninstall(&dest).log();
        instance
            .sb
            .route_remove(&RtKey::host(dest), MatchMode::Exact);
    }
}

fn route_update(
    rib: &mut BTreeMap<Ipv4Addr, RouteRtr>,
    dest: Ipv4Addr,
    route: RouteRtr,
) {
    match rib.entry(dest) {
        btree_map::Entry::Occupied(o) => {
            let curr_route = o.into_mut();

            match route.distance.cmp(&curr_route.distance) {
                Ordering::Less => {
                    // Overwrite the current routing table entry.
                    *curr_route = route;
                }
                Ordering::Equal => {
                    // Merge nexthops.
                    curr_route.nexthops.extend(route.nexthops);
                }
                Ordering::Greater => {
                    // Ignore less preferred route.
                }
            }
        }
        btree_map::Entry::Vacant(v) => {
            v.insert(route);
        }
    }
}
