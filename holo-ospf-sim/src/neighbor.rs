//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use holo_netsim::timer::TimerHandle;
use nsm::{Event, State};
#[cfg(not(feature = "deterministic"))]
use rand::RngCore;

use crate::area::Area;
use crate::collections::NeighborId;
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::InstanceUpView;
use crate::interface::Interface;
use crate::output;
use crate::packet::lsa::{Lsa, LsaHdr, LsaKey};
use crate::packet::{DbDesc, DbDescFlags, Options};
use crate::southbound::Southbound;
use crate::tasks::{self, LsaOriginateEvent, TimerToken};

#[derive(Debug)]
pub struct Neighbor {
    pub id: NeighborId,
    pub router_id: Ipv4Addr,
    pub src: Ipv4Addr,
    pub state: State,

    pub options: Option<Options>,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
    pub last_rcvd_dbdesc: Option<LastDbDesc>,
    pub last_sent_dbdesc: Option<DbDesc>,

    pub event_count: u32,

    pub lists: NeighborLsaLists,
    pub tasks: NeighborTasks,
}

#[derive(Debug)]
pub struct LastDbDesc {
    pub options: Options,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
}

#[derive(Debug, Default)]
pub struct NeighborLsaLists {
    // LSAs enqueued for transmission in LS Update packets.
    pub ls_update: BTreeMap<LsaKey, Arc<Lsa>>,
    // LSAs waiting to be acknowledged.
    pub ls_rxmt: BTreeMap<LsaKey, Arc<Lsa>>,
    // LSA headers enqueued for transmission in Database Description packets.
    pub db_summary: BTreeMap<LsaKey, Arc<Lsa>>,
    // LSAs that need to be received from this neighbor.
    pub ls_request: BTreeMap<LsaKey, LsaHdr>,
    // LSAs that were requested but not received yet.
    pub ls_request_pending: BTreeMap<LsaKey, LsaHdr>,
}

#[derive(Debug, Default)]
pub struct NeighborTasks {
    pub inactivity_timer: Option<TimerHandle>,
    pub dbdesc_free_timer: Option<TimerHandle>,
    pub rxmt_dbdesc: Option<TimerHandle>,
    pub rxmt_lsreq: Option<TimerHandle>,
    pub rxmt_lsupd: Option<TimerHandle>,
}

// Neighbor state machine.
pub mod nsm {
    use serde::{Deserialize, Serialize};

    use crate::debug::SeqNoMismatchReason;

    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Down,
        Attempt,
        Init,
        TwoWay,
        ExStart,
        Exchange,
        Loading,
        Full,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        HelloRcvd,
        TwoWayRcvd,
        NegotiationDone,
        ExchangeDone,
        BadLsReq,
        LoadingDone,
        SeqNoMismatch(SeqNoMismatchReason),
        OneWayRcvd,
        Kill,
        InactivityTimer,
        LinkDown,
    }
}

// ===== impl Neighbor =====

impl Neighbor {
    pub(crate) fn new(
        id: NeighborId,
        router_id: Ipv4Addr,
        src: Ipv4Addr,
    ) -> Neighbor {
        Debug::NeighborCreate(router_id).log();

        // Initialize the DD Sequence Number.
        let dd_seq_no = {
            #[cfg(not(feature = "deterministic"))]
            {
                // Random value.
                rand::rng().next_u32()
            }
            #[cfg(feature = "deterministic")]
            {
                // Fixed value for deterministic test results.
                router_id.into()
            }
        };

        Neighbor {
            id,
            router_id,
            src,
            state: State::Down,
            options: None,
            dd_flags: DbDescFlags::empty(),
            dd_seq_no,
            last_rcvd_dbdesc: None,
            last_sent_dbdesc: None,
            event_count: 0,
            lists: Default::default(),
            tasks: Default::default(),
        }
    }

    pub(crate) fn fsm(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &mut InstanceUpView<'_>,
        event: Event,
    ) {
        Debug::NsmEvent(self.router_id, &self.state, &event).log();

        let new_state = match (self.state, &event) {
            // (state, event) -> new state
            (State::Attempt | State::Down, Event::HelloRcvd) => {
                self.inactivity_timer_reset(iface, area, instance.sb);
                Some(State::Init)
            }
            (
                State::Init
                | State::TwoWay
                | State::ExStart
                | State::Exchange
                | State::Loading
                | State::Full,
                Event::HelloRcvd,
            ) => {
                self.inactivity_timer_reset(iface, area, instance.sb);
                None
            }
            (State::Init, Event::TwoWayRcvd) => {
                if iface.need_adjacency() {
                    self.dd_seq_no = self.dd_seq_no.wrapping_add(1);
                    self.dd_flags.insert(
                        DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS,
                    );
                    output::send_dbdesc(self, iface, area, instance);
                    Some(State::ExStart)
                } else {
                    Some(State::TwoWay)
                }
            }
            (State::ExStart, Event::NegotiationDone) => {
                // List the contents of the entire LSDB in the summary list.
                let now = instance.sb.now();
                for (lsa_key, lse) in area.state.lsdb.iter() {
                    if lse.data.is_maxage(now) {
                        self.lists.ls_rxmt.insert(*lsa_key, lse.data.clone());
                        self.rxmt_lsupd_start_check(iface, area, instance.sb);
                    } else {
                        let lsa = lse.data.clone();
                        self.lists.db_summary.insert(*lsa_key, lsa);
                    }
                }

                self.dd_flags.remove(DbDescFlags::I);
                Some(State::Exchange)
            }
            (State::Exchange, Event::ExchangeDone) => {
                if self.lists.ls_request_pending.is_empty()
                    && self.lists.ls_request.is_empty()
                {
                    Some(State::Full)
                } else {
                    // Wait for outstanding LS Requests to be responded.
                    Some(State::Loading)
                }
            }
            (State::Loading, Event::LoadingDone) => {
                // No action required.
                Some(State::Full)
            }
            (
                State::Exchange | State::Loading | State::Full,
                Event::SeqNoMismatch(_) | Event::BadLsReq,
            ) => {
                self.reset_adjacency(instance.sb);
                self.dd_seq_no = self.dd_seq_no.wrapping_add(1);
                self.dd_flags
                    .insert(DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS);
                output::send_dbdesc(self, iface, area, instance);
                Some(State::ExStart)
            }
            (_, Event::Kill | Event::LinkDown | Event::InactivityTimer) => {
                self.reset_adjacency(instance.sb);
                tasks::timer_stop(
                    instance.sb,
                    &mut self.tasks.inactivity_timer,
                );
                Some(State::Down)
            }
            (
                State::TwoWay
                | State::ExStart
                | State::Exchange
                | State::Loading
                | State::Full,
                Event::OneWayRcvd,
            ) => {
                self.reset_adjacency(instance.sb);
                Some(State::Init)
            }
            (
                State::TwoWay
                | State::ExStart
                | State::Exchange
                | State::Loading
                | State::Full,
                Event::TwoWayRcvd,
            ) => {
                // No action required.
                None
            }
            (State::Init, Event::OneWayRcvd) => {
                // No action required.
                None
            }
            // Catch-all wildcard.
            _ => {
                Error::NsmUnexpectedEvent(self.router_id, self.state, event)
                    .log();
                return;
            }
        };

        // Check for FSM state change.
        if let Some(new_state) = new_state
            && new_state != self.state
        {
            self.fsm_state_change(area, instance, new_state);
        }
    }

    fn fsm_state_change(
        &mut self,
        area: &Area,
        instance: &mut InstanceUpView<'_>,
        new_state: State,
    ) {
        // Check if the neighbor changed to/from the FULL state.
        if new_state == State::Full || self.state == State::Full {
            // (Re)originate LSAs that might have been affected.
            instance.state.input.lsa_orig_event(
                LsaOriginateEvent::NeighborToFromFull { area_id: area.id },
            );
        }

        // Effectively transition to the new FSM state.
        Debug::NsmTransition(self.router_id, &self.state, &new_state).log();
        self.state = new_state;

        // Update statistics.
        self.event_count += 1;
    }

    pub(crate) fn loading_done_check(
        &mut self,
        iface: &Interface,
        area: &Area,
        instance: &mut InstanceUpView<'_>,
    ) {
        // Check if all pending LSA requests were received.
        if self.lists.ls_request_pending.is_empty() {
            // Stop the LS Request rxmt timer.
            self.rxmt_lsreq_stop(instance.sb);

            // Check if there are new LSAs to request.
            if !self.lists.ls_request.is_empty() {
                output::send_lsreq(self, iface, area, instance);
            } else if self.state == nsm::State::Loading {
                // Database loading has completed.
                instance.state.input.nsm_event(
                    area.id,
                    iface.id,
                    self.id,
                    nsm::Event::LoadingDone,
                );
            }
        }
    }

    fn reset_adjacency(&mut self, sb: &mut dyn Southbound) {
        self.options = None;
        self.last_rcvd_dbdesc = None;
        self.last_sent_dbdesc = None;
        self.lists = Default::default();
        tasks::timer_stop(sb, &mut self.tasks.dbdesc_free_timer);
        tasks::timer_stop(sb, &mut self.tasks.rxmt_dbdesc);
        tasks::timer_stop(sb, &mut self.tasks.rxmt_lsreq);
        tasks::timer_stop(sb, &mut self.tasks.rxmt_lsupd);
    }

    pub(crate) fn dbdesc_is_dup(&self, dbdesc: &DbDesc) -> bool {
        if let Some(last_rcvd_dbdesc) = &self.last_rcvd_dbdesc
            && last_rcvd_dbdesc.options == dbdesc.options
            && last_rcvd_dbdesc.dd_flags == dbdesc.dd_flags
            && last_rcvd_dbdesc.dd_seq_no == dbdesc.dd_seq_no
        {
            return true;
        }

        false
    }

    fn inactivity_timer_reset(
        &mut self,
        iface: &Interface,
        area: &Area,
        sb: &mut dyn Southbound,
    ) {
        let token = TimerToken::NeighborInactive {
            area_id: area.id,
            iface_id: iface.id,
            nbr_id: self.id,
        };
        let delay = Duration::from_secs(iface.config.dead_interval.into());
        tasks::timer_start(sb, &mut self.tasks.inactivity_timer, delay, token);
    }

    // Keeps the last Database Description packet sent for RouterDeadInterval
    // seconds, so that duplicates from the master can still be answered.
    pub(crate) fn dbdesc_free_timer_start(
        &mut self,
        iface: &Interface,
        area: &Area,
        sb: &mut dyn Southbound,
    ) {
        let token = TimerToken::DbDescFree {
            area_id: area.id,
            iface_id: iface.id,
            nbr_id: self.id,
        };
        let delay = Duration::from_secs(iface.config.dead_interval.into());
        tasks::timer_start(sb, &mut self.tasks.dbdesc_free_timer, delay, token);
    }

    pub(crate) fn rxmt_dbdesc_start(
        &mut self,
        iface: &Interface,
        area: &Area,
        sb: &mut dyn Southbound,
    ) {
        let token = TimerToken::DbDescRetransmit {
            area_id: area.id,
            iface_id: iface.id,
            nbr_id: self.id,
        };
        let delay = iface.rxmt_interval();
        tasks::timer_start(sb, &mut self.tasks.rxmt_dbdesc, delay, token);
    }

    pub(crate) fn rxmt_dbdesc_stop(&mut self, sb: &mut dyn Southbound) {
        tasks::timer_stop(sb, &mut self.tasks.rxmt_dbdesc);
    }

    pub(crate) fn rxmt_lsreq_start(
        &mut self,
        iface: &Interface,
        area: &Area,
        sb: &mut dyn Southbound,
    ) {
        let token = TimerToken::LsRequestRetransmit {
            area_id: area.id,
            iface_id: iface.id,
            nbr_id: self.id,
        };
        let delay = iface.rxmt_interval();
        tasks::timer_start(sb, &mut self.tasks.rxmt_lsreq, delay, token);
    }

    fn rxmt_lsreq_stop(&mut self, sb: &mut dyn Southbound) {
        tasks::timer_stop(sb, &mut self.tasks.rxmt_lsreq);
    }

    pub(crate) fn rxmt_lsupd_start_check(
        &mut self,
        iface: &Interface,
        area: &Area,
        sb: &mut dyn Southbound,
    ) {
        if !self.lists.ls_rxmt.is_empty() && self.tasks.rxmt_lsupd.is_none() {
            self.rxmt_lsupd_start(iface, area, sb);
        }
    }

    pub(crate) fn rxmt_lsupd_start(
        &mut self,
        iface: &Interface,
        area: &Area,
        sb: &mut dyn Southbound,
    ) {
        let token = TimerToken::LsUpdateRetransmit {
            area_id: area.id,
            iface_id: iface.id,
            nbr_id: self.id,
        };
        let delay = iface.rxmt_interval();
        tasks::timer_start(sb, &mut self.tasks.rxmt_lsupd, delay, token);
    }

    pub(crate) fn rxmt_lsupd_stop_check(&mut self, sb: &mut dyn Southbound) {
        if self.lists.ls_rxmt.is_empty() && self.tasks.rxmt_lsupd.is_some() {
            tasks::timer_stop(sb, &mut self.tasks.rxmt_lsupd);
        }
    }
}

impl Drop for Neighbor {
    fn drop(&mut self) {
        Debug::NeighborDelete(self.router_id).log();
    }
}
