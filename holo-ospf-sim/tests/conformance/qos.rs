//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::time::Duration;

use holo_ospf_sim::packet::lsa::bandwidth_encode;
use holo_ospf_sim::route::Nexthops;
use holo_ospf_sim::testing::Network;

use crate::topologies::*;

//
// Helper functions.
//

fn qos_query(net: &mut Network, dest: Ipv4Addr, bw: u64) -> Option<Nexthops> {
    net.with_router(RT1, |instance, sb| {
        instance.qos_route_query(sb, dest, bw)
    })
}

fn nexthop_addrs(nexthops: &Nexthops) -> Vec<Ipv4Addr> {
    nexthops.values().map(|nexthop| nexthop.addr).collect()
}

//
// Tests.
//

// Test description:
// On-demand queries only consider links able to carry the requested
// bandwidth.
#[test]
fn qos_route_query() {
    let mut net = topo3();
    net.run_for(CONVERGENCE_TIME);

    // The rt3-rt4 link is too narrow.
    assert!(qos_query(&mut net, RT4_ID, 6 * MBPS).is_none());

    let nexthops = qos_query(&mut net, RT4_ID, MBPS).unwrap();
    assert_eq!(nexthop_addrs(&nexthops), [RT2_ID]);

    let nexthops = qos_query(&mut net, RT3_ID, 5 * MBPS).unwrap();
    assert_eq!(nexthop_addrs(&nexthops), [RT2_ID]);
}

// Test description:
// The precomputed bandwidth-constrained table yields the minimum-hop path
// whose bottleneck satisfies the requested bandwidth.
#[test]
fn qos_route_lookup() {
    let mut net = topo3();
    net.run_for(CONVERGENCE_TIME);
    let instance = net.instance(RT1);

    for (dest, bw, hops) in [
        (RT2_ID, 10 * MBPS, 1),
        (RT3_ID, 5 * MBPS, 2),
        (RT4_ID, MBPS, 3),
    ] {
        let (route_hops, nexthops) =
            instance.qos_route_lookup(dest, bw).unwrap();
        assert_eq!(route_hops, hops);
        assert_eq!(nexthop_addrs(nexthops), [RT2_ID]);
    }

    for (dest, bw) in [
        (RT2_ID, 11 * MBPS),
        (RT3_ID, 6 * MBPS),
        (RT4_ID, 6 * MBPS),
    ] {
        assert!(instance.qos_route_lookup(dest, bw).is_none());
    }
}

// Test description:
// Disabling the bandwidth-constrained computations removes the
// corresponding routes, while the shortest-path routes remain.
#[test]
fn qos_disable() {
    let mut net = topo3();
    net.run_for(CONVERGENCE_TIME);
    assert!(net.instance(RT1).qos_route_lookup(RT4_ID, MBPS).is_some());

    net.with_router(RT1, |instance, sb| instance.set_qos_enabled(sb, false));
    net.run_for(Duration::from_secs(10));

    let instance = net.instance(RT1);
    assert!(instance.qos_route_lookup(RT4_ID, MBPS).is_none());
    assert!(instance.area(AREA0).unwrap().state.qos_table.is_empty());
    assert!(instance.route_lookup(RT4_ID).is_some());
    assert!(qos_query(&mut net, RT4_ID, MBPS).is_none());
}

// Test description:
// Requested bandwidths are rounded down to the metric encoding, hence a link
// whose advertised bandwidth encodes like the request satisfies it.
#[test]
fn qos_bandwidth_rounding() {
    const LINK_BW: u64 = 5_997_000;

    let mut net = network(&[RT1, RT2], &QOS_CFG);
    net.add_link(RT1, RT2, LINK_BW);
    net.run_for(CONVERGENCE_TIME);
    assert_eq!(bandwidth_encode(LINK_BW), bandwidth_encode(6 * MBPS));

    assert!(qos_query(&mut net, RT2_ID, 6 * MBPS).is_some());
    assert!(net.instance(RT1).qos_route_lookup(RT2_ID, 6 * MBPS).is_some());

    // The next encodable value is out of reach.
    assert!(qos_query(&mut net, RT2_ID, 6_100_000).is_none());
    assert!(net.instance(RT1).qos_route_lookup(RT2_ID, 6_100_000).is_none());
}
