//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use const_addrs::ip4;
use holo_ospf_sim::config::TraceOptions;
use holo_ospf_sim::lsdb::{LSA_INIT_SEQ_NO, LSA_MAX_AGE, LSA_MAX_SEQ_NO};
use holo_ospf_sim::packet::lsa::{Lsa, LsaBody, LsaKey, LsaRouter, LsaType};
use holo_ospf_sim::packet::{LsUpdate, Options, Packet, PacketHdr, PacketType};
use holo_ospf_sim::testing::{Network, PacketRecord};
use maplit::btreeset;

use crate::topologies::*;

// Router that isn't part of any topology.
const REMOTE_ID: Ipv4Addr = ip4!("9.9.9.9");

//
// Helper functions.
//

fn router_lsa(net: &Network, addr: u64, adv_rtr: Ipv4Addr) -> Option<Arc<Lsa>> {
    net.instance(addr)
        .area(AREA0)?
        .state
        .lsdb
        .lookup(LsaType::Router, adv_rtr, adv_rtr)
        .cloned()
}

// Returns a copy of the given LSA whose age is frozen at its current value.
fn lsa_copy(net: &Network, lsa: &Lsa) -> Lsa {
    let mut lsa = lsa.clone();
    lsa.set_age(lsa.age(net.now()));
    lsa
}

// Returns a router-LSA without links originated by the remote router.
fn remote_lsa(seq_no: u32) -> Lsa {
    Lsa::new(
        0,
        Options::E,
        LsaType::Router,
        REMOTE_ID,
        REMOTE_ID,
        seq_no,
        LsaBody::Router(LsaRouter::default()),
    )
}

fn lsupd(router_id: Ipv4Addr, lsas: Vec<Lsa>) -> Packet {
    let hdr = PacketHdr::new(PacketType::LsUpdate, router_id, AREA0);
    Packet::LsUpdate(LsUpdate { hdr, lsas })
}

// Returns the LS Update packets sent by the given router.
fn lsupds_sent(net: &Network, addr: u64) -> Vec<&LsUpdate> {
    net.packets()
        .iter()
        .filter(|record| record.from == addr)
        .filter_map(|record| record.packet.as_ls_update())
        .collect()
}

// Returns the packets of the given type sent from `from` to `to`.
fn packets_sent(
    net: &Network,
    from: u64,
    to: u64,
    pkt_type: PacketType,
) -> Vec<&PacketRecord> {
    net.packets()
        .iter()
        .filter(|record| record.from == from && record.to == to)
        .filter(|record| record.packet.hdr().pkt_type == pkt_type)
        .collect()
}

//
// Tests.
//

// Test description:
// After convergence, all routers hold exactly one instance of each
// router-LSA, and their databases are identical.
#[test]
fn lsdb_synchronization() {
    let mut net = topo4();
    net.run_for(CONVERGENCE_TIME);

    let routers = [RT1, RT2, RT3, RT4];
    let databases = routers.map(|addr| {
        let lsdb = &net.instance(addr).area(AREA0).unwrap().state.lsdb;
        lsdb.iter()
            .map(|(lsa_key, lse)| (*lsa_key, lse.data.hdr.seq_no))
            .collect::<BTreeMap<LsaKey, u32>>()
    });

    let adv_rtrs = databases[0]
        .keys()
        .map(|lsa_key| lsa_key.adv_rtr)
        .collect::<BTreeSet<_>>();
    assert_eq!(databases[0].len(), 4);
    assert_eq!(adv_rtrs, btreeset![RT1_ID, RT2_ID, RT3_ID, RT4_ID]);
    for database in &databases[1..] {
        assert_eq!(database, &databases[0]);
    }
}

// Test description:
// Databases also converge over slow links, with all debug traces enabled.
#[test]
fn lsdb_synchronization_slow_links() {
    let mut net = topo2();
    net.set_link_delay(Duration::from_millis(250));
    let trace_opts = TraceOptions {
        packets: true,
        flooding: true,
        spf: true,
    };
    for addr in [RT1, RT2, RT3] {
        net.with_router(addr, |instance, _| {
            instance.set_trace_options(trace_opts.clone())
        });
    }
    net.run_for(CONVERGENCE_TIME);

    for addr in [RT1, RT2, RT3] {
        let lsdb = &net.instance(addr).area(AREA0).unwrap().state.lsdb;
        assert_eq!(lsdb.len(), 3);
    }
    let route = net.instance(RT3).route_lookup(RT1_ID).unwrap();
    assert_eq!(route.distance, 2);
}

// Test description:
// Receiving an instance older than the database copy causes the database
// copy to be sent back to the neighbor, without any flooding.
#[test]
fn lsa_older_instance_sent_back() {
    let mut net = topo2();
    net.run_for(CONVERGENCE_TIME);

    let lsa = router_lsa(&net, RT1, RT3_ID).unwrap();
    let seq_no = lsa.hdr.seq_no;
    let mut old_lsa = lsa_copy(&net, &lsa);
    old_lsa.hdr.seq_no = seq_no - 1;

    net.clear_packets();
    net.inject(RT1, 1, RT2_ID, lsupd(RT2_ID, vec![old_lsa]));
    net.run_for(Duration::from_millis(100));

    // The database is left untouched.
    let lsa = router_lsa(&net, RT1, RT3_ID).unwrap();
    assert_eq!(lsa.hdr.seq_no, seq_no);

    // A single LS Update is sent, directly to the sending neighbor.
    let records = net
        .packets()
        .iter()
        .filter(|record| record.from == RT1)
        .filter(|record| record.packet.hdr().pkt_type == PacketType::LsUpdate)
        .collect::<Vec<_>>();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].to, RT2);
    assert_eq!(records[0].info.dst, Some(RT2_ID));

    let ls_upd = records[0].packet.as_ls_update().unwrap();
    assert_eq!(ls_upd.lsas.len(), 1);
    assert_eq!(ls_upd.lsas[0].hdr.key(), lsa.hdr.key());
    assert_eq!(ls_upd.lsas[0].hdr.seq_no, seq_no);
}

// Test description:
// Receiving the very same instance as the database copy is never treated
// as a database change.
#[test]
fn lsa_duplicate_delivery() {
    let mut net = topo1();
    net.run_for(CONVERGENCE_TIME);

    let lsdb = &net.instance(RT1).area(AREA0).unwrap().state.lsdb;
    let lsa_key = LsaKey::new(LsaType::Router, RT2_ID, RT2_ID);
    let (_, lse) = lsdb.iter().find(|(key, _)| **key == lsa_key).unwrap();
    let installed = lse.installed;
    let lsa = lsa_copy(&net, &lse.data);
    let rx_lsa_count = net.instance(RT1).state.rx_lsa_count;
    let spf_run_count =
        net.instance(RT1).area(AREA0).unwrap().state.spf_run_count;

    net.clear_packets();
    for _ in 0..2 {
        net.inject(RT1, 1, RT2_ID, lsupd(RT2_ID, vec![lsa.clone()]));
    }
    net.run_for(Duration::from_millis(100));

    let instance = net.instance(RT1);
    let area = instance.area(AREA0).unwrap();
    let (_, lse) = area
        .state
        .lsdb
        .iter()
        .find(|(key, _)| **key == lsa_key)
        .unwrap();
    assert_eq!(lse.installed, installed);
    assert_eq!(instance.state.rx_lsa_count, rx_lsa_count);
    assert_eq!(area.state.spf_run_count, spf_run_count);

    // Nothing is flooded, and each copy is acknowledged at most once.
    assert!(lsupds_sent(&net, RT1).is_empty());
    assert!(net.packet_count(PacketType::LsAck) <= 2);
}

// Test description:
// A router-LSA left behind by a router that went away is removed once it
// reaches MaxAge.
#[test]
fn lsa_maxage_removal() {
    let mut net = topo1();
    net.run_for(CONVERGENCE_TIME);

    net.link_down(RT1, 1);
    net.run_for(Duration::from_secs(1));
    assert!(router_lsa(&net, RT1, RT2_ID).is_some());

    net.run_for(Duration::from_secs(LSA_MAX_AGE.into()));
    assert!(router_lsa(&net, RT1, RT2_ID).is_none());

    // The self-originated router-LSA is refreshed instead.
    let lsa = router_lsa(&net, RT1, RT1_ID).unwrap();
    assert!(!lsa.is_maxage(net.now()));
}

// Test description:
// Aging LSAs are removed on time even when route calculations keep running
// at instants that fall between two whole seconds.
#[test]
fn lsa_maxage_removal_spf_runs() {
    let mut net = topo2();
    net.run_for(CONVERGENCE_TIME);

    net.link_down(RT2, 2);
    for cost in [2, 1].into_iter().cycle().take(36) {
        set_cost(&mut net, RT1, 1, cost);
        net.run_for(Duration::from_millis(100_500));
    }
    net.run_for(Duration::from_secs(60));

    for addr in [RT1, RT2] {
        assert!(router_lsa(&net, addr, RT3_ID).is_none());
        assert!(router_lsa(&net, addr, RT1_ID).is_some());
    }
}

// Test description:
// Self-originated router-LSAs are refreshed before reaching MaxAge, and the
// refreshed instance reaches the neighbors.
#[test]
fn lsa_refresh() {
    let mut net = topo1();
    net.run_for(CONVERGENCE_TIME);
    let seq_no = router_lsa(&net, RT1, RT1_ID).unwrap().hdr.seq_no;

    net.run_for(Duration::from_secs(2000));
    for addr in [RT1, RT2] {
        let lsa = router_lsa(&net, addr, RT1_ID).unwrap();
        assert_eq!(lsa.hdr.seq_no, seq_no + 1);
        assert!(lsa.age(net.now()) < 1800);
    }
    assert!(net.instance(RT2).route_lookup(RT1_ID).is_some());
}

// Test description:
// Receiving an instance of the self-originated router-LSA with the highest
// sequence number forces the sequence number to wrap: the current instance
// is flushed and a new one starting from the initial sequence number takes
// its place.
#[test]
fn lsa_seqno_wrap() {
    let mut net = topo1();
    net.run_for(CONVERGENCE_TIME);

    let lsa = router_lsa(&net, RT1, RT1_ID).unwrap();
    let mut lsa = lsa_copy(&net, &lsa);
    lsa.hdr.seq_no = LSA_MAX_SEQ_NO;
    net.inject(RT1, 1, RT2_ID, lsupd(RT2_ID, vec![lsa]));
    net.run_for(CONVERGENCE_TIME);

    for addr in [RT1, RT2] {
        let lsa = router_lsa(&net, addr, RT1_ID).unwrap();
        assert_eq!(lsa.hdr.seq_no, LSA_INIT_SEQ_NO);
        assert!(!lsa.is_maxage(net.now()));
    }
    assert!(net.instance(RT1).route_lookup(RT2_ID).is_some());
    assert!(net.instance(RT2).route_lookup(RT1_ID).is_some());
}

// Test description:
// Receiving from a neighbor the instance that is waiting on its
// retransmission list acknowledges it implicitly. No retransmission nor any
// direct acknowledgment follows.
#[test]
fn lsa_implied_ack() {
    let mut net = topo2();
    net.run_for(CONVERGENCE_TIME);

    let lsa = remote_lsa(LSA_INIT_SEQ_NO);
    net.clear_packets();
    net.inject(RT2, 1, RT1_ID, lsupd(RT1_ID, vec![lsa.clone()]));
    net.inject(RT2, 2, RT3_ID, lsupd(RT3_ID, vec![lsa]));
    net.run_for(Duration::from_secs(10));

    let nbr = net.instance(RT2).neighbor(2, RT3_ID).unwrap();
    assert!(nbr.lists.ls_rxmt.is_empty());
    assert_eq!(packets_sent(&net, RT2, RT3, PacketType::LsUpdate).len(), 1);
    assert!(packets_sent(&net, RT2, RT3, PacketType::LsAck).is_empty());
    assert!(router_lsa(&net, RT3, REMOTE_ID).is_some());
}

// Test description:
// A MaxAge LSA without a database copy is acknowledged directly, and neither
// installed nor flooded.
#[test]
fn lsa_maxage_unknown() {
    let mut net = topo1();
    net.run_for(CONVERGENCE_TIME);

    let mut lsa = remote_lsa(LSA_INIT_SEQ_NO);
    lsa.set_maxage();
    net.clear_packets();
    net.inject(RT1, 1, RT2_ID, lsupd(RT2_ID, vec![lsa.clone()]));
    net.run_for(Duration::from_millis(100));

    assert!(router_lsa(&net, RT1, REMOTE_ID).is_none());
    assert!(lsupds_sent(&net, RT1).is_empty());

    let records = packets_sent(&net, RT1, RT2, PacketType::LsAck);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].info.dst, Some(RT2_ID));
    let ls_ack = records[0].packet.as_ls_ack().unwrap();
    assert_eq!(ls_ack.lsa_hdrs, [lsa.hdr]);
}

// Test description:
// A new instance received within MinLSArrival of the database copy is
// discarded, while later instances are accepted.
#[test]
fn lsa_min_arrival_discard() {
    let mut net = topo1();
    net.run_for(CONVERGENCE_TIME);

    for (seq_no, installed_seq_no, delay) in [
        (LSA_INIT_SEQ_NO, LSA_INIT_SEQ_NO, 500),
        (LSA_INIT_SEQ_NO + 1, LSA_INIT_SEQ_NO, 1000),
        (LSA_INIT_SEQ_NO + 2, LSA_INIT_SEQ_NO + 2, 100),
    ] {
        let lsa = remote_lsa(seq_no);
        net.inject(RT1, 1, RT2_ID, lsupd(RT2_ID, vec![lsa]));
        net.run_for(Duration::from_millis(delay));

        let lsa = router_lsa(&net, RT1, REMOTE_ID).unwrap();
        assert_eq!(lsa.hdr.seq_no, installed_seq_no);
    }
}

// Test description:
// LSAs of types other than router-LSAs are discarded on receipt, without
// disturbing the processing of the other LSAs of the same packet.
#[test]
fn lsa_unsupported_type() {
    let mut net = topo1();
    net.run_for(CONVERGENCE_TIME);

    let network_lsa = Lsa::new(
        0,
        Options::E,
        LsaType::Network,
        REMOTE_ID,
        REMOTE_ID,
        LSA_INIT_SEQ_NO,
        LsaBody::Unsupported,
    );
    let lsas = vec![network_lsa, remote_lsa(LSA_INIT_SEQ_NO)];
    net.inject(RT1, 1, RT2_ID, lsupd(RT2_ID, lsas));
    net.run_for(Duration::from_millis(100));

    let lsdb = &net.instance(RT1).area(AREA0).unwrap().state.lsdb;
    assert!(lsdb.lookup(LsaType::Network, REMOTE_ID, REMOTE_ID).is_none());
    assert!(router_lsa(&net, RT1, REMOTE_ID).is_some());
    assert_eq!(lsdb.len(), 3);
}
