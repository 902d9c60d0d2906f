//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use holo_netsim::rib::RtKey;
use holo_ospf_sim::packet::lsa::LsaType;
use maplit::btreeset;

use crate::topologies::*;

// Test description:
// Routes to non-adjacent routers point to the neighbor on the shortest path.
#[test]
fn route_multi_hop() {
    let mut net = topo2();
    net.run_for(CONVERGENCE_TIME);

    let route = net.instance(RT1).route_lookup(RT3_ID).unwrap();
    assert_eq!(route.distance, 2);
    assert_eq!(route.hops, 2);
    assert_eq!(route.nexthops.keys().collect::<Vec<_>>(), [&(1, RT2_ID)]);

    let entry = net.rib(RT1).get(&RtKey::host(RT3_ID)).unwrap();
    assert_eq!(entry.next_hop, Some(RT2_ID));
    assert_eq!(entry.out_ifindexes, btreeset![1]);
    assert_eq!(entry.extension.distance, 2);
    assert_eq!(entry.extension.hops, 2);

    // The middle router reaches both ends directly.
    for (dest, ifindex, nbr_id) in [(RT1_ID, 1, RT1_ID), (RT3_ID, 2, RT3_ID)] {
        let route = net.instance(RT2).route_lookup(dest).unwrap();
        assert_eq!(route.distance, 1);
        assert_eq!(
            route.nexthops.keys().collect::<Vec<_>>(),
            [&(ifindex, nbr_id)]
        );
    }
}

// Test description:
// Equal-cost paths have their nexthops merged into a single route.
#[test]
fn route_ecmp() {
    let mut net = topo4();
    net.run_for(CONVERGENCE_TIME);

    let route = net.instance(RT1).route_lookup(RT4_ID).unwrap();
    assert_eq!(route.distance, 3);
    assert_eq!(
        route.nexthops.keys().collect::<Vec<_>>(),
        [&(1, RT2_ID), &(2, RT4_ID)]
    );

    let entry = net.rib(RT1).get(&RtKey::host(RT4_ID)).unwrap();
    assert_eq!(entry.next_hop, Some(RT2_ID));
    assert_eq!(entry.out_ifindexes, btreeset![1, 2]);
    assert_eq!(entry.extension.distance, 3);

    // The direct link to rt3 is more expensive than the path through rt2.
    let route = net.instance(RT1).route_lookup(RT3_ID).unwrap();
    assert_eq!(route.distance, 2);
    assert_eq!(route.nexthops.keys().collect::<Vec<_>>(), [&(1, RT2_ID)]);
}

// Test description:
// Every vertex of the shortest-path tree is reached through a link of its
// parent, and following the parents always leads back to the root.
#[test]
fn spf_tree_consistency() {
    let mut net = topo4();
    net.run_for(CONVERGENCE_TIME);

    for addr in [RT1, RT2, RT3, RT4] {
        let instance = net.instance(addr);
        let root_id = instance.router_id();
        let area = instance.area(AREA0).unwrap();
        let spt = &area.state.spt;
        assert_eq!(spt.len(), 4);

        let root_v = &spt[&root_id];
        assert_eq!(root_v.distance, 0);
        assert_eq!(root_v.parent, None);

        for vertex in spt.values().filter(|v| v.router_id != root_id) {
            // The parent advertises a link to the vertex whose metric
            // accounts for the distance difference.
            let parent_id = vertex.parent.unwrap();
            let parent_v = &spt[&parent_id];
            let parent_lsa = area
                .state
                .lsdb
                .lookup(LsaType::Router, parent_id, parent_id)
                .unwrap();
            let lsa_body = parent_lsa.body.as_router().unwrap();
            assert!(lsa_body.p2p_links_to(vertex.router_id).any(|link| {
                parent_v.distance + u32::from(link.metric) == vertex.distance
            }));
            assert!(!vertex.nexthops.is_empty());

            // The walk up the tree ends at the root without revisiting any
            // vertex.
            let mut visited = btreeset![vertex.router_id];
            let mut curr = vertex;
            while let Some(parent_id) = curr.parent {
                assert!(visited.insert(parent_id));
                assert!(visited.len() <= spt.len());
                curr = &spt[&parent_id];
            }
            assert_eq!(curr.router_id, root_id);
        }
    }
}

// Test description:
// A topology change that doesn't affect forwarding triggers new SPF runs but
// leaves the installed routes untouched.
#[test]
fn route_install_unchanged() {
    let mut net = topo2();
    net.run_for(CONVERGENCE_TIME);

    let routers = [RT1, RT2, RT3];
    let spf_run_count = |net: &holo_ospf_sim::testing::Network, addr| {
        net.instance(addr).area(AREA0).unwrap().state.spf_run_count
    };
    let rib_changes = routers.map(|addr| net.rib_changes(addr));
    let spf_runs = routers.map(|addr| spf_run_count(&net, addr));

    // Advertising link bandwidths changes the contents of rt1's router-LSA.
    net.with_router(RT1, |instance, sb| instance.set_qos_enabled(sb, true));
    net.run_for(Duration::from_secs(10));

    for (i, addr) in routers.into_iter().enumerate() {
        assert!(spf_run_count(&net, addr) > spf_runs[i]);
        assert_eq!(net.rib_changes(addr), rib_changes[i]);
    }
}

// Test description:
// Increasing the cost of a link moves the traffic to the next best path.
#[test]
fn route_cost_change() {
    let mut net = topo4();
    net.run_for(CONVERGENCE_TIME);

    let route = net.instance(RT1).route_lookup(RT2_ID).unwrap();
    assert_eq!(route.distance, 1);
    assert_eq!(route.nexthops.keys().collect::<Vec<_>>(), [&(1, RT2_ID)]);

    set_cost(&mut net, RT1, 1, 10);
    net.run_for(Duration::from_secs(10));

    let route = net.instance(RT1).route_lookup(RT2_ID).unwrap();
    assert_eq!(route.distance, 5);
    assert_eq!(route.nexthops.keys().collect::<Vec<_>>(), [&(2, RT4_ID)]);

    let entry = net.rib(RT1).get(&RtKey::host(RT2_ID)).unwrap();
    assert_eq!(entry.next_hop, Some(RT4_ID));
    assert_eq!(entry.out_ifindexes, btreeset![2]);
}

// Test description:
// A cost change that keeps the forwarding intact updates the computed route
// without reinstalling it, so the installed metadata keeps the old distance.
#[test]
fn route_cost_change_same_nexthop() {
    let mut net = topo4();
    net.run_for(CONVERGENCE_TIME);

    set_cost(&mut net, RT2, 2, 2);
    net.run_for(Duration::from_secs(10));

    let route = net.instance(RT1).route_lookup(RT3_ID).unwrap();
    assert_eq!(route.distance, 3);
    assert_eq!(route.nexthops.keys().collect::<Vec<_>>(), [&(1, RT2_ID)]);

    let entry = net.rib(RT1).get(&RtKey::host(RT3_ID)).unwrap();
    assert_eq!(entry.next_hop, Some(RT2_ID));
    assert_eq!(entry.extension.distance, 2);
}
