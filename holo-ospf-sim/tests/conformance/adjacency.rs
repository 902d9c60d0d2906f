//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::time::Duration;

use const_addrs::ip4;
use holo_netsim::rib::RtKey;
use holo_ospf_sim::config::{InstanceCfg, InterfaceCfg};
use holo_ospf_sim::neighbor::nsm;
use holo_ospf_sim::packet::lsa::{LsaKey, LsaType};
use holo_ospf_sim::packet::{
    DbDesc, DbDescFlags, LsRequest, Packet, PacketHdr, PacketType,
};
use holo_ospf_sim::testing::{Network, PacketRecord};
use maplit::btreeset;

use crate::topologies::*;

//
// Helper functions.
//

// Asserts that no adjacency was formed on the only link of the network.
fn assert_no_adjacency(net: &Network, routers: [(u64, Ipv4Addr); 2]) {
    for (addr, nbr_id) in routers {
        let nbr = net.instance(addr).neighbor(1, nbr_id);
        assert!(nbr.is_none_or(|nbr| nbr.state < nsm::State::TwoWay));
        assert!(net.rib(addr).is_empty());
    }
    assert_eq!(net.packet_count(PacketType::DbDesc), 0);
}

// Returns the last Database Description packet sent to the given neighbor.
fn last_sent_dbdesc(net: &Network, addr: u64, nbr_id: Ipv4Addr) -> DbDesc {
    let nbr = net.instance(addr).neighbor(1, nbr_id).unwrap();
    nbr.last_sent_dbdesc.clone().unwrap()
}

fn dbdescs_sent(net: &Network, addr: u64) -> Vec<&PacketRecord> {
    net.packets()
        .iter()
        .filter(|record| record.from == addr)
        .filter(|record| record.packet.hdr().pkt_type == PacketType::DbDesc)
        .collect()
}

// Asserts that rt1 restarted the database exchange with rt2, and that both
// routers end up fully adjacent again.
fn assert_exchange_restart(net: &mut Network) {
    let nbr = net.instance(RT1).neighbor(1, RT2_ID).unwrap();
    assert_eq!(nbr.state, nsm::State::ExStart);

    let records = dbdescs_sent(net, RT1);
    assert_eq!(records.len(), 1);
    let dbdesc = records[0].packet.as_db_desc().unwrap();
    assert_eq!(
        dbdesc.dd_flags,
        DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS
    );
    assert!(dbdesc.lsa_hdrs.is_empty());

    net.run_for(CONVERGENCE_TIME);
    for (addr, nbr_id) in [(RT1, RT2_ID), (RT2, RT1_ID)] {
        let nbr = net.instance(addr).neighbor(1, nbr_id).unwrap();
        assert_eq!(nbr.state, nsm::State::Full);
    }
}

//
// Tests.
//

// Test description:
// Two directly connected routers synchronize their empty databases with a
// single Hello each, and install a route to each other.
#[test]
fn adjacency_two_routers() {
    let mut net = topo1();
    net.run_for(Duration::from_secs(5));

    assert_eq!(net.packet_count(PacketType::Hello), 2);
    assert_eq!(net.packet_count(PacketType::LsRequest), 0);
    let dbdesc_count = net.packet_count(PacketType::DbDesc);
    assert!((3..=6).contains(&dbdesc_count), "{dbdesc_count} DBDesc");

    for (addr, nbr_id) in [(RT1, RT2_ID), (RT2, RT1_ID)] {
        let nbr = net.instance(addr).neighbor(1, nbr_id).unwrap();
        assert_eq!(nbr.state, nsm::State::Full);
        assert!(nbr.lists.ls_request.is_empty());

        let entry = net.rib(addr).get(&RtKey::host(nbr_id)).unwrap();
        assert_eq!(entry.next_hop, Some(nbr_id));
        assert_eq!(entry.out_ifindexes, btreeset![1]);
        assert_eq!(entry.extension.router_id, nbr_id);
        assert_eq!(entry.extension.distance, 1);
        assert_eq!(entry.extension.hops, 1);
    }
}

// Test description:
// Adjacencies stay up as long as Hellos keep flowing.
#[test]
fn adjacency_keepalive() {
    let mut net = topo1();
    net.run_for(Duration::from_secs(300));

    for (addr, nbr_id) in [(RT1, RT2_ID), (RT2, RT1_ID)] {
        let nbr = net.instance(addr).neighbor(1, nbr_id).unwrap();
        assert_eq!(nbr.state, nsm::State::Full);
        assert!(net.rib(addr).get(&RtKey::host(nbr_id)).is_some());
    }
}

// Test description:
// Bringing the link down tears down the neighbor and its interface, and the
// route through it is uninstalled.
#[test]
fn adjacency_link_down() {
    let mut net = topo1();
    net.run_for(CONVERGENCE_TIME);
    assert!(net.instance(RT1).route_lookup(RT2_ID).is_some());

    net.link_down(RT1, 1);
    net.run_for(Duration::from_secs(1));

    for (addr, nbr_id) in [(RT1, RT2_ID), (RT2, RT1_ID)] {
        let instance = net.instance(addr);
        assert!(instance.interface(1).is_none());
        assert!(instance.neighbor(1, nbr_id).is_none());
        assert!(instance.route_lookup(nbr_id).is_none());
        assert!(net.rib(addr).is_empty());
    }

    // The adjacency comes back along with the link.
    net.link_up(RT1, 1);
    net.run_for(CONVERGENCE_TIME);
    for (addr, nbr_id) in [(RT1, RT2_ID), (RT2, RT1_ID)] {
        let nbr = net.instance(addr).neighbor(1, nbr_id).unwrap();
        assert_eq!(nbr.state, nsm::State::Full);
        assert!(net.rib(addr).get(&RtKey::host(nbr_id)).is_some());
    }
}

// Test description:
// Node addresses differing only above bit 31 yield the same Router ID. The
// two routers reject each other's Hellos and never form an adjacency.
#[test]
fn adjacency_router_id_collision() {
    const RT1_HIGH: u64 = 0x0001_0000_0101_0101;

    let mut net = network(&[RT1, RT1_HIGH], &DFLT_CFG);
    assert_eq!(net.instance(RT1).router_id(), RT1_ID);
    assert_eq!(net.instance(RT1_HIGH).router_id(), RT1_ID);

    net.add_link(RT1, RT1_HIGH, 100 * MBPS);
    net.run_for(CONVERGENCE_TIME);

    assert_no_adjacency(&net, [(RT1, RT1_ID), (RT1_HIGH, RT1_ID)]);
}

// Test description:
// Routers with different HelloInterval values never form an adjacency.
#[test]
fn adjacency_hello_interval_mismatch() {
    let mut net = network(&[RT1], &DFLT_CFG);
    let config = InstanceCfg {
        interface: InterfaceCfg {
            hello_interval: 5,
            ..Default::default()
        },
        ..Default::default()
    };
    net.add_router(RT2, config);

    net.add_link(RT1, RT2, 100 * MBPS);
    net.run_for(CONVERGENCE_TIME);

    assert_no_adjacency(&net, [(RT1, RT2_ID), (RT2, RT1_ID)]);
}

// Test description:
// Routers attaching the link to different areas never form an adjacency.
#[test]
fn adjacency_area_mismatch() {
    let mut net = network(&[RT1], &DFLT_CFG);
    let config = InstanceCfg {
        area_id: ip4!("0.0.0.1"),
        ..Default::default()
    };
    net.add_router(RT2, config);

    net.add_link(RT1, RT2, 100 * MBPS);
    net.run_for(CONVERGENCE_TIME);

    assert_no_adjacency(&net, [(RT1, RT2_ID), (RT2, RT1_ID)]);
    assert!(net.instance(RT2).area(ip4!("0.0.0.1")).is_some());
    assert!(net.instance(RT2).area(AREA0).is_none());
}

// Test description:
// Interfaces created after an area change join the new area.
#[test]
fn adjacency_area_change() {
    let area_id = ip4!("0.0.0.1");
    let mut net = network(&[RT1, RT2], &DFLT_CFG);
    for addr in [RT1, RT2] {
        net.with_router(addr, |instance, _| instance.set_area_id(area_id));
    }

    net.add_link(RT1, RT2, 100 * MBPS);
    net.run_for(CONVERGENCE_TIME);

    for (addr, nbr_id) in [(RT1, RT2_ID), (RT2, RT1_ID)] {
        let instance = net.instance(addr);
        let nbr = instance.neighbor(1, nbr_id).unwrap();
        assert_eq!(nbr.state, nsm::State::Full);
        assert!(instance.area(AREA0).is_none());
        assert_eq!(instance.route_lookup(nbr_id).unwrap().area_id, area_id);
    }
}

// Test description:
// Hellos are sent as link-local broadcasts, while the database exchange is
// unicast to the neighbor.
#[test]
fn adjacency_packet_addressing() {
    let mut net = topo1();
    net.run_for(CONVERGENCE_TIME);

    for record in net.packets() {
        let nbr_id = if record.from == RT1 { RT2_ID } else { RT1_ID };
        assert_eq!(record.ifindex, 1);
        assert_eq!(record.info.ttl, 1);
        match record.packet.hdr().pkt_type {
            PacketType::Hello => assert!(record.info.is_broadcast()),
            PacketType::DbDesc | PacketType::LsRequest => {
                assert_eq!(record.info.dst, Some(nbr_id));
            }
            PacketType::LsUpdate | PacketType::LsAck => {
                let dst = record.info.dst;
                assert!(dst == Some(nbr_id) || record.info.is_broadcast());
            }
        }
    }
}

// Test description:
// Once the exchange is over, the slave answers a duplicate of the master's
// last Database Description packet by repeating its own last one.
#[test]
fn adjacency_dbdesc_duplicate_slave() {
    let mut net = topo1();
    net.run_for(CONVERGENCE_TIME);

    // The router with the highest Router ID is the master.
    let nbr = net.instance(RT1).neighbor(1, RT2_ID).unwrap();
    assert!(!nbr.dd_flags.contains(DbDescFlags::MS));
    let master_dbdesc = last_sent_dbdesc(&net, RT2, RT1_ID);
    let slave_dbdesc = last_sent_dbdesc(&net, RT1, RT2_ID);

    net.clear_packets();
    net.inject(RT1, 1, RT2_ID, Packet::DbDesc(master_dbdesc));
    net.run_for(Duration::from_millis(100));

    let records = dbdescs_sent(&net, RT1);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].info.dst, Some(RT2_ID));
    assert_eq!(records[0].packet, Packet::DbDesc(slave_dbdesc));

    // The master silently discards the repeated packet.
    assert!(dbdescs_sent(&net, RT2).is_empty());
    for (addr, nbr_id) in [(RT1, RT2_ID), (RT2, RT1_ID)] {
        let nbr = net.instance(addr).neighbor(1, nbr_id).unwrap();
        assert_eq!(nbr.state, nsm::State::Full);
    }
}

// Test description:
// The master discards duplicates of the slave's last Database Description
// packet.
#[test]
fn adjacency_dbdesc_duplicate_master() {
    let mut net = topo1();
    net.run_for(CONVERGENCE_TIME);

    let slave_dbdesc = last_sent_dbdesc(&net, RT1, RT2_ID);
    net.clear_packets();
    net.inject(RT2, 1, RT1_ID, Packet::DbDesc(slave_dbdesc));
    net.run_for(Duration::from_millis(100));

    assert_eq!(net.packet_count(PacketType::DbDesc), 0);
    let nbr = net.instance(RT2).neighbor(1, RT1_ID).unwrap();
    assert_eq!(nbr.state, nsm::State::Full);
}

// Test description:
// A Database Description packet that isn't a duplicate, received once the
// adjacency is full, restarts the database exchange.
#[test]
fn adjacency_seqno_mismatch() {
    let mut net = topo1();
    net.run_for(CONVERGENCE_TIME);

    let mut dbdesc = last_sent_dbdesc(&net, RT2, RT1_ID);
    dbdesc.dd_seq_no = dbdesc.dd_seq_no.wrapping_add(1);
    net.clear_packets();
    net.inject(RT1, 1, RT2_ID, Packet::DbDesc(dbdesc));
    net.run_for(Duration::ZERO);

    assert_exchange_restart(&mut net);
}

// Test description:
// Requesting an LSA missing from the database restarts the database
// exchange.
#[test]
fn adjacency_bad_lsreq() {
    let remote_id = ip4!("9.9.9.9");
    let mut net = topo1();
    net.run_for(CONVERGENCE_TIME);

    let ls_req = LsRequest {
        hdr: PacketHdr::new(PacketType::LsRequest, RT2_ID, AREA0),
        entries: vec![LsaKey::new(LsaType::Router, remote_id, remote_id)],
    };
    net.clear_packets();
    net.inject(RT1, 1, RT2_ID, Packet::LsRequest(ls_req));
    net.run_for(Duration::ZERO);

    assert_exchange_restart(&mut net);
}
