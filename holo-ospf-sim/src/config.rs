//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

// Default values.
pub mod dflt {
    use std::net::Ipv4Addr;

    pub const AREA_ID: Ipv4Addr = Ipv4Addr::UNSPECIFIED;
    pub const QOS_MAX_HOPS: usize = 16;
    pub const COST: u16 = 1;
    pub const HELLO_INTERVAL: u16 = 10;
    pub const DEAD_INTERVAL: u32 = 40;
    pub const RETRANSMIT_INTERVAL: u16 = 5;
    pub const TRANSMIT_DELAY: u16 = 1;
    pub const PRIORITY: u8 = 1;
}

// ===== configuration structs =====

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(default)]
pub struct InstanceCfg {
    pub area_id: Ipv4Addr,
    pub qos_enabled: bool,
    pub qos_max_hops: usize,
    pub trace_opts: TraceOptions,
    pub interface: InterfaceCfg,
    pub interfaces: BTreeMap<u32, InterfaceCfg>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(default)]
pub struct InterfaceCfg {
    // Overrides the instance's area.
    pub area_id: Option<Ipv4Addr>,
    pub cost: u16,
    pub hello_interval: u16,
    pub dead_interval: u32,
    pub retransmit_interval: u16,
    pub transmit_delay: u16,
    pub priority: u8,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(default)]
pub struct TraceOptions {
    pub packets: bool,
    pub flooding: bool,
    pub spf: bool,
}

// ===== impl InstanceCfg =====

impl InstanceCfg {
    // Loads the configuration from a JSON document. Missing fields take their
    // default values.
    pub fn from_json(data: &str) -> Result<InstanceCfg, serde_json::Error> {
        serde_json::from_str(data)
    }

    // Returns the configuration that applies to the given interface.
    pub fn interface(&self, ifindex: u32) -> &InterfaceCfg {
        self.interfaces.get(&ifindex).unwrap_or(&self.interface)
    }

    // Returns the area the given interface belongs to.
    pub fn interface_area_id(&self, ifindex: u32) -> Ipv4Addr {
        self.interface(ifindex).area_id.unwrap_or(self.area_id)
    }
}

impl Default for InstanceCfg {
    fn default() -> InstanceCfg {
        InstanceCfg {
            area_id: dflt::AREA_ID,
            qos_enabled: false,
            qos_max_hops: dflt::QOS_MAX_HOPS,
            trace_opts: Default::default(),
            interface: Default::default(),
            interfaces: Default::default(),
        }
    }
}

// ===== impl InterfaceCfg =====

impl Default for InterfaceCfg {
    fn default() -> InterfaceCfg {
        InterfaceCfg {
            area_id: None,
            cost: dflt::COST,
            hello_interval: dflt::HELLO_INTERVAL,
            dead_interval: dflt::DEAD_INTERVAL,
            retransmit_interval: dflt::RETRANSMIT_INTERVAL,
            transmit_delay: dflt::TRANSMIT_DELAY,
            priority: dflt::PRIORITY,
        }
    }
}
