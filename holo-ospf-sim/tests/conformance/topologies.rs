//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::sync::LazyLock as Lazy;
use std::time::Duration;

use const_addrs::ip4;
use holo_ospf_sim::config::{InstanceCfg, InterfaceCfg};
use holo_ospf_sim::testing::Network;
use tracing_subscriber::EnvFilter;

pub const RT1: u64 = 0x0101_0101;
pub const RT2: u64 = 0x0202_0202;
pub const RT3: u64 = 0x0303_0303;
pub const RT4: u64 = 0x0404_0404;

pub const RT1_ID: Ipv4Addr = ip4!("1.1.1.1");
pub const RT2_ID: Ipv4Addr = ip4!("2.2.2.2");
pub const RT3_ID: Ipv4Addr = ip4!("3.3.3.3");
pub const RT4_ID: Ipv4Addr = ip4!("4.4.4.4");

pub const AREA0: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

pub const MBPS: u64 = 1_000_000;

// Long enough for every topology to converge, yet shorter than the
// RouterDeadInterval.
pub const CONVERGENCE_TIME: Duration = Duration::from_secs(30);

pub static DFLT_CFG: Lazy<InstanceCfg> = Lazy::new(InstanceCfg::default);
pub static QOS_CFG: Lazy<InstanceCfg> = Lazy::new(|| InstanceCfg {
    qos_enabled: true,
    ..Default::default()
});

//
// Helper functions.
//

fn init_tracing() {
    // Other tests of the same binary might have installed it already.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_ansi(false)
        .with_test_writer()
        .try_init();
}

pub fn network(routers: &[u64], config: &InstanceCfg) -> Network {
    init_tracing();

    let mut net = Network::default();
    for addr in routers {
        net.add_router(*addr, config.clone());
    }
    net
}

pub fn set_cost(net: &mut Network, addr: u64, ifindex: u32, cost: u16) {
    let iface_cfg = InterfaceCfg {
        cost,
        ..Default::default()
    };
    net.with_router(addr, |instance, sb| {
        instance.set_interface_cfg(sb, ifindex, iface_cfg)
    });
}

//
// Topologies.
//

// rt1 --- rt2
pub fn topo1() -> Network {
    let mut net = network(&[RT1, RT2], &DFLT_CFG);
    net.add_link(RT1, RT2, 100 * MBPS);
    net
}

// rt1 --- rt2 --- rt3
pub fn topo2() -> Network {
    let mut net = network(&[RT1, RT2, RT3], &DFLT_CFG);
    net.add_link(RT1, RT2, 100 * MBPS);
    net.add_link(RT2, RT3, 100 * MBPS);
    net
}

// rt1 -(10M)- rt2 -(5M)- rt3 -(1M)- rt4
pub fn topo3() -> Network {
    let mut net = network(&[RT1, RT2, RT3, RT4], &QOS_CFG);
    net.add_link(RT1, RT2, 10 * MBPS);
    net.add_link(RT2, RT3, 5 * MBPS);
    net.add_link(RT3, RT4, MBPS);
    net
}

//
//  rt1 --(1)-- rt2
//   | \         |
//  (3) (5)     (1)
//   |     \     |
//  rt4 --(1)-- rt3
//
pub fn topo4() -> Network {
    let mut net = network(&[RT1, RT2, RT3, RT4], &DFLT_CFG);
    for (a, b, cost) in [
        (RT1, RT2, 1),
        (RT2, RT3, 1),
        (RT3, RT4, 1),
        (RT4, RT1, 3),
        (RT1, RT3, 5),
    ] {
        let (a_ifindex, b_ifindex) = net.add_link(a, b, 100 * MBPS);
        set_cost(&mut net, a, a_ifindex, cost);
        set_cost(&mut net, b, b_ifindex, cost);
    }
    net
}
