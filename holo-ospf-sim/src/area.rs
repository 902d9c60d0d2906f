//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use holo_netsim::SimTime;
use holo_netsim::timer::TimerHandle;

use crate::collections::{AreaId, Interfaces};
use crate::lsdb::Lsdb;
use crate::packet::lsa::Lsa;
use crate::qos::QosTable;
use crate::spf::Vertex;

// OSPF area.
#[derive(Debug)]
pub struct Area {
    // ID.
    pub id: AreaId,
    // Area ID.
    pub area_id: Ipv4Addr,
    // Area state data.
    pub state: AreaState,
    // Area interfaces.
    pub interfaces: Interfaces,
}

// OSPF area state.
#[derive(Debug, Default)]
pub struct AreaState {
    // LSDB of area-scope LSAs.
    pub lsdb: Lsdb,
    // Self-originated router-LSA.
    pub router_lsa_self: Option<Arc<Lsa>>,
    // Last time the self-originated router-LSA was flooded.
    pub last_flood: Option<SimTime>,
    // Whether the origination of the router-LSA is being postponed due to
    // MinLSInterval.
    pub delayed_flood: bool,
    // Router-LSA refresh timer.
    pub refresh_timer: Option<TimerHandle>,
    // Shortest-path tree.
    pub spt: BTreeMap<Ipv4Addr, Vertex>,
    // Bandwidth-constrained routes.
    pub qos_table: QosTable,
    // Statistics.
    pub spf_run_count: u32,
}

// ===== impl Area =====

impl Area {
    // Create new area.
    pub(crate) fn new(id: AreaId, area_id: Ipv4Addr) -> Area {
        Area {
            id,
            area_id,
            state: Default::default(),
            interfaces: Default::default(),
        }
    }
}
