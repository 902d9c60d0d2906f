//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use const_addrs::ip4;
use holo_ospf_sim::config::{InstanceCfg, InterfaceCfg, dflt};

#[test]
fn config_defaults() {
    let config = InstanceCfg::from_json("{}").unwrap();
    assert_eq!(config, InstanceCfg::default());
    assert_eq!(config.area_id, dflt::AREA_ID);
    assert!(!config.qos_enabled);

    let iface_cfg = config.interface(1);
    assert_eq!(iface_cfg.cost, dflt::COST);
    assert_eq!(iface_cfg.hello_interval, dflt::HELLO_INTERVAL);
    assert_eq!(iface_cfg.dead_interval, dflt::DEAD_INTERVAL);
    assert_eq!(iface_cfg.retransmit_interval, dflt::RETRANSMIT_INTERVAL);
}

#[test]
fn config_interface_overrides() {
    let config = InstanceCfg::from_json(
        r#"{
            "qos_enabled": true,
            "interface": { "cost": 10 },
            "interfaces": { "2": { "area_id": "0.0.0.1" } }
        }"#,
    )
    .unwrap();
    assert!(config.qos_enabled);

    // Interfaces without a configuration of their own share the common one.
    assert_eq!(config.interface(1).cost, 10);
    assert_eq!(config.interface(1).hello_interval, dflt::HELLO_INTERVAL);
    assert_eq!(config.interface_area_id(1), dflt::AREA_ID);

    // Per-interface configurations start from the defaults.
    assert_eq!(config.interface(2).cost, dflt::COST);
    assert_eq!(config.interface_area_id(2), ip4!("0.0.0.1"));
}

#[test]
fn config_invalid() {
    assert!(InstanceCfg::from_json(r#"{ "qos_enabled": 1 }"#).is_err());
    assert!(
        InstanceCfg::from_json(r#"{ "interface": { "cost": 70000 } }"#)
            .is_err()
    );
    assert!(
        serde_json::from_str::<InterfaceCfg>(r#"{ "area_id": "x" }"#).is_err()
    );
}
