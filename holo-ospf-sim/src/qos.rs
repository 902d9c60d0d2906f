//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::{BTreeMap, btree_map};
use std::net::Ipv4Addr;

use derive_new::new;

use crate::area::Area;
use crate::collections::Arena;
use crate::instance::InstanceUpView;
use crate::interface::Interface;
use crate::neighbor::Neighbor;
use crate::packet::lsa::{LsaRouterLink, bandwidth_quantize};
use crate::route::Nexthops;
use crate::spf::{self, Vertex};

//
// Bandwidth-constrained routing table.
//
// For every destination, keeps the widest path found within each hop count
// limit. Hop counts without an improvement over the previous limit are
// omitted.
//
#[derive(Debug, Default)]
pub struct QosTable {
    entries: BTreeMap<Ipv4Addr, BTreeMap<usize, QosEntry>>,
}

#[derive(Clone, Debug, Eq, new, PartialEq)]
pub struct QosEntry {
    // Bottleneck bandwidth of the path.
    pub bandwidth: u64,
    pub nexthops: Nexthops,
}

// ===== impl QosTable =====

impl QosTable {
    // Returns the entry of the minimum-hop path to `dest` whose bottleneck
    // bandwidth satisfies the requested bandwidth, along with its hop count.
    //
    // The request is rounded down to the metric encoding first, so links
    // slightly narrower than the raw request can still satisfy it.
    pub fn lookup(
        &self,
        dest: Ipv4Addr,
        bandwidth: u64,
    ) -> Option<(usize, &QosEntry)> {
        let floor = bandwidth_quantize(bandwidth);
        self.entries
            .get(&dest)?
            .iter()
            .find(|(_, entry)| entry.bandwidth >= floor)
            .map(|(hops, entry)| (*hops, entry))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ===== global functions =====

// Computes the nexthops of the shortest path to `dest` that only traverses
// links able to carry the requested bandwidth.
//
// Links advertise encoded bandwidths, hence the request is compared in its
// encoded form too. A request matching the advertised bandwidth of a link
// always fits, at the cost of accepting links up to one encoding step
// narrower than requested.
pub(crate) fn route_query(
    area: &Area,
    instance: &InstanceUpView<'_>,
    interfaces: &Arena<Interface>,
    neighbors: &Arena<Neighbor>,
    dest: Ipv4Addr,
    bandwidth: u64,
) -> Option<Nexthops> {
    let now = instance.sb.now();
    let floor = bandwidth_quantize(bandwidth);
    let filter = |link: &LsaRouterLink| {
        link.bandwidth().is_some_and(|link_bw| link_bw >= floor)
    };

    let mut spt = spf::dijkstra(
        area,
        instance.state.router_id,
        now,
        interfaces,
        neighbors,
        filter,
        Some(dest),
    )?;
    spt.remove(&dest)
        .map(|vertex| vertex.nexthops)
        .filter(|nexthops| !nexthops.is_empty())
}

// Computes the bandwidth-constrained routing table of the given area.
//
// Iteration `h` extends the paths found within `h - 1` hops by one link,
// keeping for every destination the path with the widest bottleneck.
// Equally wide paths have their nexthops merged.
pub(crate) fn table_compute(
    area: &Area,
    instance: &InstanceUpView<'_>,
    interfaces: &Arena<Interface>,
    neighbors: &Arena<Neighbor>,
) -> QosTable {
    let now = instance.sb.now();
    let router_id = instance.state.router_id;
    let lsdb = &area.state.lsdb;
    let mut table = QosTable::default();

    if spf::router_lsa(lsdb, router_id, now).is_none() {
        return table;
    }

    // The root reaches itself with unlimited bandwidth.
    let root_v = Vertex::new(router_id, 0, 0, None);
    let mut prev = BTreeMap::new();
    prev.insert(router_id, QosEntry::new(u64::MAX, Default::default()));

    for hops in 1..=instance.config.qos_max_hops {
        let mut curr = prev.clone();

        for (src, src_entry) in &prev {
            let Some(lsa) = spf::router_lsa(lsdb, *src, now) else {
                continue;
            };

            for link in spf::mutual_links(lsdb, lsa, *src, now) {
                if link.link_id == router_id {
                    continue;
                }
                let Some(link_bw) = link.bandwidth() else {
                    continue;
                };
                let bandwidth = std::cmp::min(src_entry.bandwidth, link_bw);

                // Links leaving the root determine the nexthops. Otherwise
                // the nexthops are inherited.
                let nexthops = if *src == router_id {
                    match spf::calc_nexthops(
                        area, &root_v, link, interfaces, neighbors,
                    ) {
                        Ok(nexthops) => nexthops,
                        Err(error) => {
                            error.log();
                            continue;
                        }
                    }
                } else {
                    src_entry.nexthops.clone()
                };

                entry_update(&mut curr, link.link_id, bandwidth, nexthops);
            }
        }

        // Stop as soon as no path improves.
        if curr == prev {
            break;
        }
        for (dest, entry) in &curr {
            if *dest == router_id || prev.get(dest) == Some(entry) {
                continue;
            }
            table
                .entries
                .entry(*dest)
                .or_default()
                .insert(hops, entry.clone());
        }
        prev = curr;
    }

    table
}

// ===== helper functions =====

fn entry_update(
    table: &mut BTreeMap<Ipv4Addr, QosEntry>,
    dest: Ipv4Addr,
    bandwidth: u64,
    nexthops: Nexthops,
) {
    match table.entry(dest) {
        btree_map::Entry::Occupied(o) => {
            let curr_entry = o.into_mut();

            match bandwidth.cmp(&curr_entry.bandwidth) {
                Ordering::Greater => {
                    // Overwrite the current entry.
                    *curr_entry = QosEntry::new(bandwidth, nexthops);
                }
                Ordering::Equal => {
                    // Merge nexthops.
                    curr_entry.nexthops.extend(nexthops);
                }
                Ordering::Less => {
                    // Ignore narrower path.
                }
            }
        }
        btree_map::Entry::Vacant(v) => {
            v.insert(QosEntry::new(bandwidth, nexthops));
        }
    }
}
