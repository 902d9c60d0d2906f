//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::time::Duration;

use const_addrs::ip4;
use holo_netsim::SimTime;
use holo_netsim::discovery::router_id_from_addr;
use holo_netsim::rib::{MatchMode, Rib, RoutingTable, RtEntry, RtKey};
use ipnetwork::Ipv4Network;
use maplit::btreeset;

//
// Helper functions.
//

fn net(addr: Ipv4Addr, prefix: u8) -> Ipv4Network {
    Ipv4Network::new(addr, prefix).unwrap()
}

fn entry(next_hop: Ipv4Addr, ifindex: u32, tag: u32) -> RtEntry<u32> {
    RtEntry::new(Some(next_hop), btreeset![ifindex], tag)
}

fn rib() -> Rib<u32> {
    let mut rib = Rib::default();
    rib.route_add(
        RtKey::destination(net(ip4!("10.0.0.0"), 8)),
        entry(ip4!("1.1.1.1"), 1, 1),
        None,
    );
    rib.route_add(
        RtKey::destination(net(ip4!("10.1.0.0"), 16)),
        entry(ip4!("2.2.2.2"), 2, 2),
        None,
    );
    rib.route_add(
        RtKey::host(ip4!("10.1.2.3")),
        entry(ip4!("3.3.3.3"), 3, 3),
        None,
    );
    rib
}

//
// Tests.
//

#[test]
fn retrieve_exact() {
    let rib = rib();

    let routes = rib.route_retrieve(
        &RtKey::destination(net(ip4!("10.1.0.0"), 16)),
        MatchMode::Exact,
    );
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].1.extension, 2);

    let routes = rib.route_retrieve(
        &RtKey::destination(net(ip4!("10.2.0.0"), 16)),
        MatchMode::Exact,
    );
    assert!(routes.is_empty());
}

#[test]
fn retrieve_longest() {
    let rib = rib();

    assert_eq!(rib.lookup(ip4!("10.1.2.3")).unwrap().extension, 3);
    assert_eq!(rib.lookup(ip4!("10.1.9.9")).unwrap().extension, 2);
    assert_eq!(rib.lookup(ip4!("10.9.9.9")).unwrap().extension, 1);
    assert!(rib.lookup(ip4!("192.168.0.1")).is_none());
}

#[test]
fn remove_wildcard() {
    let mut rib = rib();

    let removed = rib.route_remove(
        &RtKey::destination(net(ip4!("10.1.0.0"), 16)),
        MatchMode::Wildcard,
    );
    let tags = removed.iter().map(|(_, e)| e.extension).collect::<Vec<_>>();
    assert_eq!(tags, vec![2, 3]);
    assert_eq!(rib.len(), 1);

    let removed = rib.route_remove(
        &RtKey::destination(net(ip4!("0.0.0.0"), 0)),
        MatchMode::Wildcard,
    );
    assert_eq!(removed.len(), 1);
    assert!(rib.is_empty());
}

#[test]
fn route_timeout() {
    let mut rib = Rib::default();
    rib.route_add(
        RtKey::host(ip4!("1.1.1.1")),
        entry(ip4!("1.1.1.1"), 1, 1),
        Some(Duration::from_secs(30)),
    );

    rib.advance(SimTime::from_secs(29));
    assert_eq!(rib.len(), 1);
    rib.advance(SimTime::from_secs(30));
    assert!(rib.is_empty());
}

#[test]
fn router_id_truncation() {
    assert_eq!(router_id_from_addr(0x0a00_0001), ip4!("10.0.0.1"));
    // Addresses differing only above bit 31 collide.
    assert_eq!(
        router_id_from_addr(0x1_0a00_0001),
        router_id_from_addr(0x0a00_0001)
    );
    assert_eq!(router_id_from_addr(u64::MAX), ip4!("255.255.255.255"));
}
