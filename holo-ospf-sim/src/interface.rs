//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use holo_netsim::discovery::{InterfaceInfo, LinkType};
use holo_netsim::timer::TimerHandle;
use holo_netsim::transport::ForwardInfo;
use ism::{Event, State};

use crate::area::Area;
use crate::collections::{Arena, InterfaceId, Neighbors};
use crate::config::InterfaceCfg;
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::InstanceUpView;
use crate::neighbor::{Neighbor, nsm};
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey};
use crate::packet::{Hello, Options, Packet, PacketHdr, PacketType};
use crate::southbound::Southbound;
use crate::tasks::{self, LsaOriginateEvent, TimerToken};

#[derive(Debug)]
pub struct Interface {
    pub id: InterfaceId,
    pub ifindex: u32,
    pub system: InterfaceSys,
    pub config: InterfaceCfg,
    pub state: InterfaceState,
}

// Interface information learned from the discovery service.
#[derive(Debug, Default)]
pub struct InterfaceSys {
    pub mtu: u16,
    pub link_type: LinkType,
    pub bandwidth: u64,
}

#[derive(Debug)]
pub struct InterfaceState {
    // ISM state.
    pub ism_state: State,
    // Source address of outgoing packets.
    pub src_addr: Ipv4Addr,
    // List of neighbors attached to this interface.
    pub neighbors: Neighbors,
    // List of LSAs enqueued for transmission.
    pub ls_update_list: BTreeMap<LsaKey, Arc<Lsa>>,
    // List of pending delayed Acks.
    pub ls_ack_list: BTreeMap<LsaKey, LsaHdr>,
    // Statistics.
    pub event_count: u32,
    // Timers.
    pub tasks: InterfaceTasks,
}

#[derive(Debug, Default)]
pub struct InterfaceTasks {
    // Hello Tx interval timer.
    pub hello_interval: Option<TimerHandle>,
    // LS Delayed Ack timer.
    pub ls_delayed_ack: Option<TimerHandle>,
}

// Interface state machine.
pub mod ism {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Down,
        PointToPoint,
        DrOther,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        InterfaceUp,
        InterfaceDown,
    }
}

// ===== impl Interface =====

impl Interface {
    pub(crate) fn new(id: InterfaceId, ifindex: u32) -> Interface {
        Debug::InterfaceCreate(ifindex).log();

        Interface {
            id,
            ifindex,
            system: Default::default(),
            config: Default::default(),
            state: Default::default(),
        }
    }

    pub(crate) fn update_system(&mut self, info: &InterfaceInfo) {
        self.system.mtu = info.mtu;
        self.system.link_type = info.link_type;
        self.system.bandwidth = info.bandwidth;
    }

    pub(crate) fn fsm(
        &mut self,
        area: &Area,
        instance: &mut InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
        event: Event,
    ) {
        Debug::IsmEvent(self.ifindex, &self.state.ism_state, &event).log();

        let new_ism_state = match (self.state.ism_state, &event) {
            (State::Down, Event::InterfaceUp) => {
                // Start interface.
                self.start(area, instance, neighbors)
            }
            (
                State::PointToPoint | State::DrOther,
                Event::InterfaceDown,
            ) => {
                // Stop interface.
                self.stop(area, instance, neighbors);
                State::Down
            }
            _ => {
                Error::IsmUnexpectedEvent(
                    self.ifindex,
                    self.state.ism_state,
                    event,
                )
                .log();
                return;
            }
        };

        // Check for FSM state change.
        if new_ism_state != self.state.ism_state {
            self.fsm_state_change(area, instance, new_ism_state);
        }
    }

    fn fsm_state_change(
        &mut self,
        area: &Area,
        instance: &mut InstanceUpView<'_>,
        new_ism_state: State,
    ) {
        // (Re)originate LSAs that might have been affected.
        instance
            .state
            .input
            .lsa_orig_event(LsaOriginateEvent::InterfaceUpDown {
                area_id: area.id,
            });

        Debug::IsmTransition(
            self.ifindex,
            &self.state.ism_state,
            &new_ism_state,
        )
        .log();
        self.state.ism_state = new_ism_state;

        // Update statistics.
        self.state.event_count += 1;
    }

    fn start(
        &mut self,
        area: &Area,
        instance: &mut InstanceUpView<'_>,
        neighbors: &Arena<Neighbor>,
    ) -> State {
        self.state.src_addr = instance.state.router_id;

        // Send the first Hello right away.
        self.send_hello(area, instance, neighbors);
        self.hello_interval_start(area, instance.sb);

        match self.system.link_type {
            LinkType::PointToPoint => State::PointToPoint,
            LinkType::Broadcast => State::DrOther,
        }
    }

    fn stop(
        &mut self,
        area: &Area,
        instance: &mut InstanceUpView<'_>,
        neighbors: &mut Arena<Neighbor>,
    ) {
        // Kill all neighbors.
        let event = nsm::Event::Kill;
        for nbr_idx in self.state.neighbors.indexes().collect::<Vec<_>>() {
            let nbr = &mut neighbors[nbr_idx];
            nbr.fsm(self, area, instance, event);
            self.state.neighbors.delete(neighbors, nbr_idx);
        }

        // Reset interface state.
        self.state.ls_update_list.clear();
        self.state.ls_ack_list.clear();
        tasks::timer_stop(instance.sb, &mut self.state.tasks.hello_interval);
        tasks::timer_stop(instance.sb, &mut self.state.tasks.ls_delayed_ack);
    }

    pub(crate) fn is_down(&self) -> bool {
        self.state.ism_state == State::Down
    }

    pub(crate) fn need_adjacency(&self) -> bool {
        self.state.ism_state == State::PointToPoint
    }

    pub(crate) fn rxmt_interval(&self) -> Duration {
        Duration::from_secs(self.config.retransmit_interval.into())
    }

    pub(crate) fn hello_interval_start(
        &mut self,
        area: &Area,
        sb: &mut dyn Southbound,
    ) {
        let token = TimerToken::Hello {
            area_id: area.id,
            iface_id: self.id,
        };
        let interval = Duration::from_secs(self.config.hello_interval.into());
        tasks::timer_start(
            sb,
            &mut self.state.tasks.hello_interval,
            interval,
            token,
        );
    }

    pub(crate) fn send_hello(
        &self,
        area: &Area,
        instance: &mut InstanceUpView<'_>,
        neighbors: &Arena<Neighbor>,
    ) {
        let packet = self.generate_hello(area, instance, neighbors);
        self.send_packet(instance, packet, None);
    }

    fn generate_hello(
        &self,
        area: &Area,
        instance: &InstanceUpView<'_>,
        neighbors: &Arena<Neighbor>,
    ) -> Packet {
        let hdr = PacketHdr::new(
            PacketType::Hello,
            instance.state.router_id,
            area.area_id,
        );

        Packet::Hello(Hello {
            hdr,
            network_mask: Ipv4Addr::UNSPECIFIED,
            hello_interval: self.config.hello_interval,
            options: Options::E,
            priority: self.config.priority,
            dead_interval: self.config.dead_interval,
            dr: None,
            bdr: None,
            neighbors: self
                .state
                .neighbors
                .iter(neighbors)
                .filter(|nbr| nbr.state >= nsm::State::Init)
                .map(|nbr| nbr.router_id)
                .collect(),
        })
    }

    pub(crate) fn enqueue_ls_update(
        &mut self,
        area: &Area,
        instance: &mut InstanceUpView<'_>,
        lsa_key: LsaKey,
        lsa: Arc<Lsa>,
    ) {
        // Schedule the transmission of the LS Update list once the current
        // event has been processed.
        if self.state.ls_update_list.is_empty() {
            instance.state.input.send_lsupd(area.id, self.id, None);
        }
        self.state.ls_update_list.insert(lsa_key, lsa);
    }

    pub(crate) fn enqueue_delayed_ack(
        &mut self,
        area: &Area,
        sb: &mut dyn Southbound,
        lsa_hdr: &LsaHdr,
    ) {
        self.state.ls_ack_list.insert(lsa_hdr.key(), *lsa_hdr);

        // Start delayed LS Ack timeout if necessary. It must expire before
        // the neighbor's retransmission interval does.
        if self.state.tasks.ls_delayed_ack.is_none() {
            let token = TimerToken::AckDelayReached {
                area_id: area.id,
                iface_id: self.id,
            };
            let delay = self
                .rxmt_interval()
                .saturating_sub(Duration::from_secs(1))
                .max(Duration::from_millis(500));
            tasks::timer_start(
                sb,
                &mut self.state.tasks.ls_delayed_ack,
                delay,
                token,
            );
        }
    }

    // Sends a packet out this interface, to the given neighbor address or to
    // all neighbors attached to the link.
    pub(crate) fn send_packet(
        &self,
        instance: &mut InstanceUpView<'_>,
        packet: Packet,
        dst: Option<Ipv4Addr>,
    ) {
        if instance.config.trace_opts.packets {
            Debug::PacketTx(self.ifindex, &dst, &packet).log();
        }

        let src = self.state.src_addr;
        let info = match dst {
            Some(dst) => ForwardInfo::unicast(src, dst, self.ifindex),
            None => ForwardInfo::link_local(src, self.ifindex),
        };
        instance.sb.forward(packet, info);
    }
}

impl Drop for Interface {
    fn drop(&mut self) {
        Debug::InterfaceDelete(self.ifindex).log();
    }
}

// ===== impl InterfaceState =====

impl Default for InterfaceState {
    fn default() -> InterfaceState {
        InterfaceState {
            ism_state: Default::default(),
            src_addr: Ipv4Addr::UNSPECIFIED,
            neighbors: Default::default(),
            ls_update_list: Default::default(),
            ls_ack_list: Default::default(),
            event_count: 0,
            tasks: Default::default(),
        }
    }
}
