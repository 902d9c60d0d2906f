//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use derive_new::new;
use holo_netsim::SimTime;

use crate::area::Area;
use crate::collections::Arena;
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::Interface;
use crate::lsdb::{self, Lsdb};
use crate::neighbor::Neighbor;
use crate::packet::lsa::{LsaRouter, LsaRouterLink, LsaRouterLinkType};
use crate::route::{Nexthop, Nexthops};
use crate::{qos, route};

#[derive(Clone, Debug, Eq, new, PartialEq)]
pub struct Vertex {
    pub router_id: Ipv4Addr,
    pub distance: u32,
    pub hops: u16,
    // Vertex this one was first reached from.
    pub parent: Option<Ipv4Addr>,
    #[new(default)]
    pub nexthops: Nexthops,
}

// ===== global functions =====

// Runs the shortest-path computation on all areas and updates the routing
// table accordingly.
pub(crate) fn run(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let now = instance.sb.now();

    for area_idx in arenas.areas.indexes().collect::<Vec<_>>() {
        let area = &mut arenas.areas[area_idx];

        // Synchronize LSA ages so that MaxAge LSAs can be told apart.
        area.state.lsdb.update_all_ages(now);

        run_area(area, instance, &arenas.interfaces, &arenas.neighbors);

        // Precompute the bandwidth-constrained routes.
        if instance.config.qos_enabled {
            let area = &mut arenas.areas[area_idx];
            let qos_table = qos::table_compute(
                area,
                instance,
                &arenas.interfaces,
                &arenas.neighbors,
            );
            area.state.qos_table = qos_table;
        }
    }

    // Update the routing table.
    route::update_rib(instance, &arenas.areas);
}

// Returns the body of the router-LSA originated by the given router, if it's
// present and usable for path computations.
pub(crate) fn router_lsa(
    lsdb: &Lsdb,
    router_id: Ipv4Addr,
    now: SimTime,
) -> Option<&LsaRouter> {
    let lsa_key = lsdb::router_lsa_self_key(router_id);
    lsdb.get(&lsa_key)
        .map(|lse| &lse.data)
        .filter(|lsa| !lsa.is_maxage(now))
        .and_then(|lsa| lsa.body.as_router())
}

// Returns an iterator over the point-to-point links of `lsa` whose remote
// end links back to `router_id`.
pub(crate) fn mutual_links<'a>(
    lsdb: &'a Lsdb,
    lsa: &'a LsaRouter,
    router_id: Ipv4Addr,
    now: SimTime,
) -> impl Iterator<Item = &'a LsaRouterLink> + 'a {
    lsa.links
        .iter()
        .filter(|link| link.link_type == LsaRouterLinkType::PointToPoint)
        .filter(move |link| {
            router_lsa(lsdb, link.link_id, now).is_some_and(|link_lsa| {
                link_lsa.p2p_links_to(router_id).next().is_some()
            })
        })
}

// Computes the nexthops to the vertex at the remote end of `link`.
//
// The nexthops of the root's direct neighbors are pinned down by the
// interface advertised in the link data. The remaining vertices inherit the
// nexthops of their parents.
pub(crate) fn calc_nexthops(
    area: &Area,
    parent: &Vertex,
    link: &LsaRouterLink,
    interfaces: &Arena<Interface>,
    neighbors: &Arena<Neighbor>,
) -> Result<Nexthops, Error> {
    if parent.hops != 0 {
        return Ok(parent.nexthops.clone());
    }

    let ifindex = u32::from(link.link_data);
    let (_, iface) = area
        .interfaces
        .get_by_ifindex(interfaces, ifindex)
        .ok_or(Error::SpfNexthopCalcError(link.link_id))?;
    let (_, nbr) = iface
        .state
        .neighbors
        .get_by_router_id(neighbors, link.link_id)
        .ok_or(Error::SpfNexthopCalcError(link.link_id))?;

    let nexthop = Nexthop::new(ifindex, nbr.src, nbr.router_id);
    Ok([((ifindex, nbr.src), nexthop)].into())
}

// Builds the shortest-path tree rooted at `router_id`, considering only the
// links accepted by `link_filter`. When `dest` is specified the computation
// stops as soon as it's added to the tree.
//
// Returns `None` if the root's router-LSA isn't available.
pub(crate) fn dijkstra<F>(
    area: &Area,
    router_id: Ipv4Addr,
    now: SimTime,
    interfaces: &Arena<Interface>,
    neighbors: &Arena<Neighbor>,
    link_filter: F,
    dest: Option<Ipv4Addr>,
) -> Option<BTreeMap<Ipv4Addr, Vertex>>
where
    F: Fn(&LsaRouterLink) -> bool,
{
    let lsdb = &area.state.lsdb;

    // Get root vertex.
    router_lsa(lsdb, router_id, now)?;
    let root_v = Vertex::new(router_id, 0, 0, None);

    // Initialize SPT and candidate list.
    let mut spt = BTreeMap::new();
    let mut cand_list = BTreeMap::new();
    cand_list.insert((root_v.distance, root_v.router_id), root_v);

    // Main SPF loop.
    while let Some(((_, vertex_id), vertex)) = cand_list.pop_first() {
        // Add vertex to SPT.
        spt.insert(vertex_id, vertex);
        if dest == Some(vertex_id) {
            break;
        }
        let vertex = &spt[&vertex_id];

        let Some(lsa) = router_lsa(lsdb, vertex_id, now) else {
            continue;
        };

        // Iterate over all links described by the vertex's LSA.
        for link in mutual_links(lsdb, lsa, vertex_id, now)
            .filter(|link| link_filter(link))
        {
            // Check if the link's vertex is already on the shortest-path tree.
            if spt.contains_key(&link.link_id) {
                continue;
            }

            // Calculate distance to the link's vertex.
            let distance = vertex.distance.saturating_add(link.metric.into());
            let hops = vertex.hops.saturating_add(1);

            // Check if this vertex is already present on the candidate list.
            if let Some(cand_key) = cand_list
                .keys()
                .find(|(_, cand_id)| *cand_id == link.link_id)
                .copied()
            {
                match distance.cmp(&cand_key.0) {
                    Ordering::Less => {
                        // Remove vertex since its key has changed. It will be
                        // re-added with the correct key below.
                        cand_list.remove(&cand_key);
                    }
                    Ordering::Equal => {}
                    Ordering::Greater => {
                        // Ignore higher cost path.
                        continue;
                    }
                }
            }
            let cand_v = cand_list
                .entry((distance, link.link_id))
                .or_insert_with(|| {
                    Vertex::new(link.link_id, distance, hops, Some(vertex_id))
                });

            // Update vertex's nexthops (ECMP).
            match calc_nexthops(area, vertex, link, interfaces, neighbors) {
                Ok(nexthops) => cand_v.nexthops.extend(nexthops),
                Err(error) => error.log(),
            }
        }
    }

    Some(spt)
}

// ===== helper functions =====

fn run_area(
    area: &mut Area,
    instance: &mut InstanceUpView<'_>,
    interfaces: &Arena<Interface>,
    neighbors: &Arena<Neighbor>,
) {
    let now = instance.sb.now();
    let router_id = instance.state.router_id;
    if instance.config.trace_opts.spf {
        Debug::SpfStart(area.area_id).log();
    }

    let filter = |_: &LsaRouterLink| true;
    let spt =
        dijkstra(area, router_id, now, interfaces, neighbors, filter, None)
            .unwrap_or_else(|| {
                Error::SpfRootNotFound(area.area_id).log();
                BTreeMap::new()
            });

    if instance.config.trace_opts.spf {
        Debug::SpfFinish(area.area_id, spt.len()).log();
    }

    area.state.spt = spt;

    // Update statistics.
    area.state.spf_run_count += 1;
}

