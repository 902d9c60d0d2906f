//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::sync::Arc;

use crate::area::Area;
use crate::collections::{Arena, InterfaceIndex, NeighborIndex};
use crate::instance::InstanceUpView;
use crate::interface::Interface;
use crate::lsdb;
use crate::neighbor::{Neighbor, nsm};
use crate::packet::lsa::Lsa;

// Origin of an LSA being flooded.
type FloodSource = Option<(InterfaceIndex, NeighborIndex)>;

// ===== global functions =====

// Floods the given LSA out all interfaces of the area.
//
// `src` identifies the interface and neighbor the LSA was received from, if
// any. Returns whether the LSA was sent back out the receiving interface.
pub(crate) fn flood(
    instance: &mut InstanceUpView<'_>,
    area: &Area,
    interfaces: &mut Arena<Interface>,
    neighbors: &mut Arena<Neighbor>,
    lsa: &Arc<Lsa>,
    src: FloodSource,
) -> bool {
    area.interfaces.indexes().fold(false, |flooded_back, iface_idx| {
        let sent = flood_interface(
            iface_idx, area, instance, interfaces, neighbors, lsa, src,
        );
        let same_iface = src.is_some_and(|(src_idx, _)| src_idx == iface_idx);
        flooded_back || (sent && same_iface)
    })
}

// ===== helper functions =====

// Queues the LSA for transmission on the given interface when at least one
// of its adjacencies needs it.
//
// Returns whether the LSA was queued.
fn flood_interface(
    iface_idx: InterfaceIndex,
    area: &Area,
    instance: &mut InstanceUpView<'_>,
    interfaces: &mut Arena<Interface>,
    neighbors: &mut Arena<Neighbor>,
    lsa: &Arc<Lsa>,
    src: FloodSource,
) -> bool {
    let iface = &mut interfaces[iface_idx];
    let lsa_key = lsa.hdr.key();

    let mut needed = false;
    for nbr_idx in iface.state.neighbors.indexes() {
        let nbr = &mut neighbors[nbr_idx];
        if !nbr_wants_lsa(nbr, iface, area, instance, lsa) {
            continue;
        }

        // The sender already has it.
        if src.is_some_and(|(_, src_nbr_idx)| src_nbr_idx == nbr_idx) {
            continue;
        }

        // Any older instance on the retransmission list gets replaced.
        nbr.lists.ls_rxmt.insert(lsa_key, lsa.clone());
        nbr.rxmt_lsupd_start_check(iface, area, instance.sb);
        needed = true;
    }

    // Group the LSA with others in the same LS Update when possible.
    if needed {
        iface.enqueue_ls_update(area, instance, lsa_key, lsa.clone());
    }

    needed
}

// Checks whether the neighbor might still need the LSA, updating its request
// list along the way.
fn nbr_wants_lsa(
    nbr: &mut Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &mut InstanceUpView<'_>,
    lsa: &Arc<Lsa>,
) -> bool {
    match nbr.state {
        // No database exchange started yet.
        state if state < nsm::State::Exchange => false,
        nsm::State::Full => true,
        // Adjacencies still synchronizing might have requested this LSA.
        _ => {
            let lsa_key = lsa.hdr.key();
            let requested = nbr
                .lists
                .ls_request
                .get(&lsa_key)
                .or_else(|| nbr.lists.ls_request_pending.get(&lsa_key))
                .copied();
            let Some(req_hdr) = requested else {
                return true;
            };

            match lsdb::lsa_compare(&lsa.hdr, &req_hdr) {
                // The neighbor is waiting for a more recent instance.
                Ordering::Less => false,
                cmp => {
                    nbr.lists.ls_request.remove(&lsa_key);
                    nbr.lists.ls_request_pending.remove(&lsa_key);
                    nbr.loading_done_check(iface, area, instance);
                    cmp == Ordering::Greater
                }
            }
        }
    }
}
