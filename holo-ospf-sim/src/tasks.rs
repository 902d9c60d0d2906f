//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use holo_netsim::SimTime;
use holo_netsim::timer::TimerHandle;
use serde::{Deserialize, Serialize};

use crate::collections::{AreaId, InterfaceId, NeighborId};
use crate::neighbor::nsm;
use crate::southbound::Southbound;

//
// OSPF timers.
//
// Every timer is a plain value handed to the timer service and handed back
// on expiry. Tokens identify their target by object ID, so a token that
// outlives its target fails the lookup and is discarded.
//
// The MaxAge and delayed-flood timers are shared by the whole instance: a
// single timer is kept armed for the soonest pending deadline of each kind.
//
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum TimerToken {
    Hello {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    LsRefresh {
        area_id: AreaId,
    },
    LsMaxAgeReached,
    AckDelayReached {
        area_id: AreaId,
        iface_id: InterfaceId,
    },
    NeighborInactive {
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
    },
    DbDescRetransmit {
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
    },
    DbDescFree {
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
    },
    LsUpdateRetransmit {
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
    },
    LsRequestRetransmit {
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
    },
    DelayedFlood,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum TimerKind {
    Hello,
    LsRefresh,
    LsMaxAgeReached,
    AckDelayReached,
    NeighborInactive,
    DbDescRetransmit,
    DbDescFree,
    LsUpdateRetransmit,
    LsRequestRetransmit,
    DelayedFlood,
}

// Ordered set of deadlines, at most one per key.
#[derive(Debug)]
pub struct DeadlineQueue<K> {
    deadlines: BTreeMap<K, SimTime>,
    queue: BTreeSet<(SimTime, K)>,
}

// One-shot timer retargeted to the soonest deadline of a `DeadlineQueue`.
#[derive(Debug, Default)]
pub struct SharedTimer {
    armed: Option<(SimTime, TimerHandle)>,
}

// Events processed after the current entry point completes.
#[derive(Debug)]
pub enum ProtocolInputMsg {
    NsmEvent {
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
        event: nsm::Event,
    },
    LsaOrigEvent(LsaOriginateEvent),
    SendLsUpdate {
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: Option<NeighborId>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LsaOriginateEvent {
    InterfaceUpDown {
        area_id: AreaId,
    },
    NeighborToFromFull {
        area_id: AreaId,
    },
    ConfigChange {
        area_id: AreaId,
    },
    SelfOriginatedLsaRcvd {
        area_id: AreaId,
        seq_no: u32,
    },
}

#[derive(Debug, Default)]
pub struct ProtocolInputQueue(VecDeque<ProtocolInputMsg>);

// ===== impl TimerToken =====

impl TimerToken {
    pub fn kind(&self) -> TimerKind {
        match self {
            TimerToken::Hello { .. } => TimerKind::Hello,
            TimerToken::LsRefresh { .. } => TimerKind::LsRefresh,
            TimerToken::LsMaxAgeReached => TimerKind::LsMaxAgeReached,
            TimerToken::AckDelayReached { .. } => TimerKind::AckDelayReached,
            TimerToken::NeighborInactive { .. } => TimerKind::NeighborInactive,
            TimerToken::DbDescRetransmit { .. } => TimerKind::DbDescRetransmit,
            TimerToken::DbDescFree { .. } => TimerKind::DbDescFree,
            TimerToken::LsUpdateRetransmit { .. } => {
                TimerKind::LsUpdateRetransmit
            }
            TimerToken::LsRequestRetransmit { .. } => {
                TimerKind::LsRequestRetransmit
            }
            TimerToken::DelayedFlood => TimerKind::DelayedFlood,
        }
    }
}

// ===== impl DeadlineQueue =====

impl<K> DeadlineQueue<K>
where
    K: Copy + Ord,
{
    // Sets the deadline of the given key, replacing any previous one.
    pub(crate) fn insert(&mut self, key: K, at: SimTime) {
        if let Some(old) = self.deadlines.insert(key, at) {
            self.queue.remove(&(old, key));
        }
        self.queue.insert((at, key));
    }

    pub(crate) fn remove(&mut self, key: &K) {
        if let Some(old) = self.deadlines.remove(key) {
            self.queue.remove(&(old, *key));
        }
    }

    pub(crate) fn next_deadline(&self) -> Option<SimTime> {
        self.queue.first().map(|(at, _)| *at)
    }

    // Removes and returns all keys whose deadline is not later than `now`,
    // soonest first.
    pub(crate) fn pop_expired(&mut self, now: SimTime) -> Vec<K> {
        let mut expired = vec![];
        while let Some((at, key)) = self.queue.first().copied() {
            if at > now {
                break;
            }
            self.queue.pop_first();
            self.deadlines.remove(&key);
            expired.push(key);
        }
        expired
    }
}

impl<K> Default for DeadlineQueue<K> {
    fn default() -> DeadlineQueue<K> {
        DeadlineQueue {
            deadlines: Default::default(),
            queue: Default::default(),
        }
    }
}

// ===== impl SharedTimer =====

impl SharedTimer {
    // Makes the timer fire at `next`, or disarms it when nothing is pending.
    pub(crate) fn retarget(
        &mut self,
        sb: &mut dyn Southbound,
        next: Option<SimTime>,
        token: TimerToken,
    ) {
        if self.armed.map(|(at, _)| at) == next {
            return;
        }

        if let Some((_, handle)) = self.armed.take() {
            sb.cancel(handle);
        }
        if let Some(next) = next {
            // Deadlines in the past fire immediately.
            let at = std::cmp::max(next, sb.now());
            let handle = sb.schedule_at(at, token);
            self.armed = Some((next, handle));
        }
    }

    // Marks the timer as consumed.
    pub(crate) fn fired(&mut self) {
        self.armed = None;
    }
}

// ===== impl ProtocolInputQueue =====

impl ProtocolInputQueue {
    pub(crate) fn nsm_event(
        &mut self,
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: NeighborId,
        event: nsm::Event,
    ) {
        self.0.push_back(ProtocolInputMsg::NsmEvent {
            area_id,
            iface_id,
            nbr_id,
            event,
        });
    }

    pub(crate) fn lsa_orig_event(&mut self, event: LsaOriginateEvent) {
        // Coalesce identical pending events.
        let pending = self.0.iter().any(|msg| {
            matches!(msg, ProtocolInputMsg::LsaOrigEvent(ev) if *ev == event)
        });
        if pending {
            return;
        }
        self.0.push_back(ProtocolInputMsg::LsaOrigEvent(event));
    }

    pub(crate) fn send_lsupd(
        &mut self,
        area_id: AreaId,
        iface_id: InterfaceId,
        nbr_id: Option<NeighborId>,
    ) {
        self.0.push_back(ProtocolInputMsg::SendLsUpdate {
            area_id,
            iface_id,
            nbr_id,
        });
    }

    pub(crate) fn pop(&mut self) -> Option<ProtocolInputMsg> {
        self.0.pop_front()
    }
}

// ===== global functions =====

// Arms a one-shot timer, cancelling the one previously stored in `slot`.
pub(crate) fn timer_start(
    sb: &mut dyn Southbound,
    slot: &mut Option<TimerHandle>,
    delay: std::time::Duration,
    token: TimerToken,
) {
    timer_stop(sb, slot);
    *slot = Some(sb.schedule(delay, token));
}

// Cancels the timer stored in `slot`, if any.
pub(crate) fn timer_stop(
    sb: &mut dyn Southbound,
    slot: &mut Option<TimerHandle>,
) {
    if let Some(handle) = slot.take() {
        sb.cancel(handle);
    }
}
