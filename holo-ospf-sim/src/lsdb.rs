//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::{BTreeMap, btree_map};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;
use holo_netsim::SimTime;

use crate::area::Area;
use crate::collections::{AreaIndex, Arena};
use crate::debug::{Debug, LsaFlushReason};
use crate::error::Error;
use crate::flood::flood;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::Interface;
use crate::neighbor::{Neighbor, nsm};
use crate::packet::Options;
use crate::packet::lsa::{
    LSA_TOS_BANDWIDTH, Lsa, LsaBody, LsaHdr, LsaKey, LsaRouter,
    LsaRouterLink, LsaRouterLinkTos, LsaRouterLinkType, LsaType,
    bandwidth_encode,
};
use crate::tasks::{self, LsaOriginateEvent, TimerToken};

// Architectural Constants.
pub const LSA_REFRESH_TIME: u16 = 1800;
pub const LSA_MAX_AGE: u16 = 3600;
pub const LSA_MAX_AGE_DIFF: u16 = 900;
pub const LSA_INIT_SEQ_NO: u32 = 0x80000001;
pub const LSA_MAX_SEQ_NO: u32 = 0x7fffffff;
pub const LSA_MIN_INTERVAL: u64 = 5;
pub const LSA_MIN_ARRIVAL: u64 = 1;

// Interval between two checks of a MaxAge LSA that couldn't be removed yet.
pub const LSA_MAXAGE_CHECK_INTERVAL: u64 = 5;

// Per-area link-state database.
#[derive(Debug, Default)]
pub struct Lsdb {
    tree: BTreeMap<LsaKey, LsaEntry>,
    // LSAs waiting for the flushing of their previous instance to complete
    // before being originated with the initial sequence number.
    pub seqno_wrapping: BTreeMap<LsaKey, Lsa>,
}

#[derive(Debug)]
pub struct LsaEntry {
    // LSA data.
    pub data: Arc<Lsa>,
    // Time the LSA was installed.
    pub installed: SimTime,
    // LSA entry flags.
    pub flags: LsaEntryFlags,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct LsaEntryFlags: u8 {
        const RECEIVED = 0x01;
        const SELF_ORIGINATED = 0x02;
    }
}

// ===== impl Lsdb =====

impl Lsdb {
    pub(crate) fn get(&self, key: &LsaKey) -> Option<&LsaEntry> {
        self.tree.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &LsaKey) -> Option<&mut LsaEntry> {
        self.tree.get_mut(key)
    }

    pub fn lookup(
        &self,
        lsa_type: LsaType,
        lsa_id: Ipv4Addr,
        adv_rtr: Ipv4Addr,
    ) -> Option<&Arc<Lsa>> {
        let key = LsaKey::new(lsa_type, adv_rtr, lsa_id);
        self.tree.get(&key).map(|lse| &lse.data)
    }

    // Inserts `new` in place of the entry stored under `old`. Passing `None`
    // as the new LSA only removes the old entry.
    //
    // Returns the entry that was replaced, if any.
    pub(crate) fn replace(
        &mut self,
        new: Option<LsaEntry>,
        old: Option<&LsaKey>,
    ) -> Option<LsaEntry> {
        let old = old.and_then(|key| self.tree.remove(key));
        if let Some(new) = new {
            let key = new.data.hdr.key();
            if let Some(displaced) = self.tree.insert(key, new) {
                return Some(displaced);
            }
        }
        old
    }

    pub(crate) fn remove(&mut self, key: &LsaKey) -> Option<LsaEntry> {
        self.tree.remove(key)
    }

    // Synchronizes the header age of every stored LSA with the current
    // time.
    //
    // The base time only moves forward by whole seconds, so the MaxAge
    // deadline of each LSA stays put.
    pub(crate) fn update_all_ages(&mut self, now: SimTime) {
        for lse in self.tree.values_mut() {
            let Some(base_time) = lse.data.base_time else {
                continue;
            };
            let age = lse.data.age(now);
            let elapsed = age.saturating_sub(lse.data.hdr.age);
            if elapsed == 0 {
                continue;
            }
            let lsa = Arc::make_mut(&mut lse.data);
            lsa.hdr.age = age;
            lsa.set_base_time(base_time + Duration::from_secs(elapsed.into()));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LsaKey, &LsaEntry)> {
        self.tree.iter()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

// ===== impl LsaEntry =====

impl LsaEntry {
    fn new(data: Arc<Lsa>, installed: SimTime) -> LsaEntry {
        LsaEntry {
            data,
            installed,
            flags: LsaEntryFlags::empty(),
        }
    }
}

// ===== global functions =====

// Compares which LSA is more recent according to the rules specified in Section
// 13.1 of RFC 2328, except that the MaxAge check comes first.
//
// Returns:
// - Ordering::Greater when `a` is more recent
// - Ordering::Less when `b` is more recent
// - Ordering::Equal when the two LSAs are considered to be identical
//
// Both headers must carry their current age.
pub fn lsa_compare(a: &LsaHdr, b: &LsaHdr) -> Ordering {
    if a.is_maxage() && !b.is_maxage() {
        return Ordering::Greater;
    } else if !a.is_maxage() && b.is_maxage() {
        return Ordering::Less;
    }

    let a_seq_no = a.seq_no as i32;
    let b_seq_no = b.seq_no as i32;
    let cmp = a_seq_no.cmp(&b_seq_no);
    if cmp != Ordering::Equal {
        return cmp;
    }

    if a.age.abs_diff(b.age) >= LSA_MAX_AGE_DIFF {
        return b.age.cmp(&a.age);
    }

    Ordering::Equal
}

// Compares two LSAs according to the rules specified in Section 13.2 of RFC
// 2328. Its purpose is to determine if the contents of the LSAs are identical.
pub(crate) fn lsa_same_contents(a: &Lsa, b: &Lsa, now: SimTime) -> bool {
    if a.hdr.options != b.hdr.options {
        return false;
    }

    if a.is_maxage(now) ^ b.is_maxage(now) {
        return false;
    }

    if a.hdr.length != b.hdr.length {
        return false;
    }

    a.body == b.body
}

// Checks if the given LSA was received via flooding less than MinLSArrival
// seconds ago.
pub(crate) fn lsa_min_arrival_check(lse: &LsaEntry, now: SimTime) -> bool {
    if !lse.flags.contains(LsaEntryFlags::RECEIVED) {
        return false;
    }

    now.saturating_duration_since(lse.installed).as_secs() < LSA_MIN_ARRIVAL
}

// Checks if the given area flooded its router-LSA less than MinLSInterval
// seconds ago.
fn lsa_min_orig_interval_check(area: &Area, now: SimTime) -> bool {
    match area.state.last_flood {
        Some(last_flood) => {
            now.saturating_duration_since(last_flood).as_secs()
                < LSA_MIN_INTERVAL
        }
        None => false,
    }
}

pub(crate) fn lsa_is_self_originated(
    hdr: &LsaHdr,
    router_id: Ipv4Addr,
) -> bool {
    hdr.adv_rtr == router_id
}

// Installs the provided LSA to the LSDB of the specified area.
pub(crate) fn install(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_idx: AreaIndex,
    lsa: Arc<Lsa>,
) {
    Debug::LsaInstall(&lsa.hdr).log();

    let now = instance.sb.now();
    let lsa_key = lsa.hdr.key();

    // Remove old instance (if any) from all neighbors' Link state
    // retransmission lists.
    rxmt_lists_remove(instance, arenas, area_idx, &lsa);

    // Replace old instance of the LSA.
    let area = &mut arenas.areas[area_idx];
    let mut lse = LsaEntry::new(lsa.clone(), now);
    if lsa_is_self_originated(&lsa.hdr, instance.state.router_id) {
        lse.flags.insert(LsaEntryFlags::SELF_ORIGINATED);
    }
    let old_lse = area.state.lsdb.replace(Some(lse), Some(&lsa_key));

    // Update the cached self-originated router-LSA.
    if lsa_key == router_lsa_self_key(instance.state.router_id) {
        area.state.router_lsa_self = Some(lsa.clone());
    }

    // Keep track of when the LSA will reach MaxAge.
    let deadline = lsa.maxage_deadline().unwrap_or(now);
    instance
        .state
        .maxage_queue
        .insert((area.id, lsa_key), deadline);

    // RFC 2328 - Section 13.2:
    // "The contents of the new LSA should be compared to the old instance, if
    // present. If there is no difference, there is no need to recalculate the
    // routing table".
    let content_change = match &old_lse {
        Some(old_lse) => !lsa_same_contents(&old_lse.data, &lsa, now),
        None => true,
    };
    if content_change && !lsa.body.is_unsupported() {
        instance.state.spf_pending = true;
    }
}

// Originates the provided LSA.
pub(crate) fn originate(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_idx: AreaIndex,
    mut lsa: Lsa,
) {
    let now = instance.sb.now();
    let lsa_key = lsa.hdr.key();

    // When an attempt is made to increment the sequence number past the
    // maximum value of MaxSequenceNumber, the current instance of the LSA
    // must first be flushed from the routing domain. As soon as this flood
    // has been acknowledged by all adjacent neighbors, a new instance can
    // be originated with sequence number of InitialSequenceNumber.
    if lsa.hdr.seq_no == LSA_MAX_SEQ_NO.wrapping_add(1) {
        Debug::LsaSeqNoWrap(&lsa.hdr).log();

        let area = &mut arenas.areas[area_idx];
        let mut old_lsa = match area.state.lsdb.get(&lsa_key) {
            Some(old_lse) => (*old_lse.data).clone(),
            None => {
                let mut old_lsa = lsa.clone();
                old_lsa.hdr.seq_no = LSA_MAX_SEQ_NO;
                old_lsa
            }
        };
        lsa.hdr.seq_no = LSA_INIT_SEQ_NO;
        area.state.lsdb.seqno_wrapping.insert(lsa_key, lsa);

        old_lsa.hdr.age = old_lsa.age(now);
        let reason = LsaFlushReason::SeqNoWrap;
        flush_lsa(instance, arenas, area_idx, old_lsa, reason);
        return;
    }

    Debug::LsaOriginate(&lsa.hdr).log();

    lsa.set_base_time(now);
    let lsa = Arc::new(lsa);
    install(instance, arenas, area_idx, lsa.clone());

    let area = &arenas.areas[area_idx];
    flood(
        instance,
        area,
        &mut arenas.interfaces,
        &mut arenas.neighbors,
        &lsa,
        None,
    );

    // Update statistics.
    instance.state.orig_lsa_count += 1;

    // Schedule LSA refreshing.
    let area = &mut arenas.areas[area_idx];
    area.state.last_flood = Some(now);
    if lsa_key == router_lsa_self_key(instance.state.router_id) {
        let token = TimerToken::LsRefresh { area_id: area.id };
        tasks::timer_start(
            instance.sb,
            &mut area.state.refresh_timer,
            Duration::from_secs(LSA_REFRESH_TIME.into()),
            token,
        );
    }
}

// Attempts to originate the router-LSA with the provided body, but only if it
// passes a few checks.
//
// `rcvd_seq_no` is the sequence number of a more recent instance of the
// router-LSA received through flooding. It forces the origination of an
// instance that supersedes it.
pub(crate) fn originate_check(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_idx: AreaIndex,
    lsa_body: LsaBody,
    rcvd_seq_no: Option<u32>,
) {
    let now = instance.sb.now();
    let router_id = instance.state.router_id;
    let lsa_key = router_lsa_self_key(router_id);
    let area = &mut arenas.areas[area_idx];
    let old_lse = area.state.lsdb.get(&lsa_key);

    // Get next sequence number.
    let seq_no = next_seq_no(
        old_lse.map(|old_lse| old_lse.data.hdr.seq_no),
        rcvd_seq_no,
    );

    // Make new LSA.
    let lsa = Lsa::new(
        0,
        Options::E,
        LsaType::Router,
        router_id,
        router_id,
        seq_no,
        lsa_body,
    );

    if rcvd_seq_no.is_none() {
        // If an LSA with identical contents already exists in the LSDB, skip
        // originating a new one (as per section 12.4 of RFC 2328).
        //
        // However, if the database copy was received through flooding,
        // proceed to originate a new instance with an updated sequence
        // number.
        if let Some(old_lse) = old_lse
            && lsa_same_contents(&old_lse.data, &lsa, now)
            && !old_lse.flags.contains(LsaEntryFlags::RECEIVED)
        {
            return;
        }

        // Perform the MinLSInterval check.
        if area.state.delayed_flood || lsa_min_orig_interval_check(area, now)
        {
            Debug::LsaOriginateMinInterval(&lsa.hdr).log();

            if !area.state.delayed_flood {
                area.state.delayed_flood = true;
                let last_flood = area.state.last_flood.unwrap_or(now);
                let deadline =
                    last_flood + Duration::from_secs(LSA_MIN_INTERVAL);
                instance.state.flood_queue.insert(area.id, deadline);
            }
            return;
        }
    }

    // Any pending origination is superseded by this one.
    if area.state.delayed_flood {
        area.state.delayed_flood = false;
        instance.state.flood_queue.remove(&area.id);
    }

    // Effectively originate the LSA.
    originate(instance, arenas, area_idx, lsa);
}

// Refreshes the self-originated router-LSA of the given area.
pub(crate) fn refresh(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_idx: AreaIndex,
) -> Result<(), Error> {
    let area = &mut arenas.areas[area_idx];
    area.state.refresh_timer = None;
    let lsa = area
        .state
        .router_lsa_self
        .as_ref()
        .ok_or(Error::RouterLsaSelfNotFound(area.area_id))?;
    Debug::LsaRefresh(&lsa.hdr).log();

    let lsa = Lsa::new(
        0,
        lsa.hdr.options,
        lsa.hdr.lsa_type,
        lsa.hdr.lsa_id,
        lsa.hdr.adv_rtr,
        lsa.hdr.seq_no.wrapping_add(1),
        lsa.body.clone(),
    );
    originate(instance, arenas, area_idx, lsa);

    Ok(())
}

// Flushes LSA from the LSDB.
pub(crate) fn flush(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_idx: AreaIndex,
    lsa_key: &LsaKey,
    reason: LsaFlushReason,
) {
    let now = instance.sb.now();
    let area = &arenas.areas[area_idx];
    let Some(lse) = area.state.lsdb.get(lsa_key) else {
        return;
    };

    // Do not flush the same LSA more than once.
    if lse.data.base_time.is_none() && lse.data.hdr.is_maxage() {
        return;
    }

    let mut lsa = (*lse.data).clone();
    lsa.hdr.age = lsa.age(now);
    flush_lsa(instance, arenas, area_idx, lsa, reason);
}

// Sets the age of the given LSA to MaxAge and refloods it.
pub(crate) fn flush_lsa(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_idx: AreaIndex,
    mut lsa: Lsa,
    reason: LsaFlushReason,
) {
    Debug::LsaFlush(&lsa.hdr, reason).log();

    // Set the LSA age to MaxAge.
    lsa.set_maxage();
    let lsa = Arc::new(lsa);

    // Install updated LSA to clear rxmt lists and rerun route calculations.
    install(instance, arenas, area_idx, lsa.clone());

    // Reflood updated LSA.
    let area = &arenas.areas[area_idx];
    flood(
        instance,
        area,
        &mut arenas.interfaces,
        &mut arenas.neighbors,
        &lsa,
        None,
    );

    // Disarm the refresh timer and any pending origination.
    let area = &mut arenas.areas[area_idx];
    if lsa.hdr.key() == router_lsa_self_key(instance.state.router_id) {
        tasks::timer_stop(instance.sb, &mut area.state.refresh_timer);
        if area.state.delayed_flood {
            area.state.delayed_flood = false;
            instance.state.flood_queue.remove(&area.id);
        }
    }
}

// Processes all LSAs whose MaxAge deadline has been reached.
//
// LSAs reaching MaxAge are flushed. MaxAge LSAs are removed from the LSDB as
// soon as they're no longer contained on any neighbor Link state
// retransmission list, and none of the routers's neighbors are in states
// Exchange or Loading (RFC 2328 - Section 14). Otherwise they're checked again
// later.
pub(crate) fn maxage_sweep(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    let now = instance.sb.now();
    let recheck = now + Duration::from_secs(LSA_MAXAGE_CHECK_INTERVAL);

    for (area_id, lsa_key) in instance.state.maxage_queue.pop_expired(now) {
        let Ok((area_idx, area)) = arenas.areas.get_by_id(area_id) else {
            continue;
        };
        let Some(lse) = area.state.lsdb.get(&lsa_key) else {
            continue;
        };

        // Not there yet. Track the current deadline again.
        if !lse.data.is_maxage(now) {
            let deadline = lse
                .data
                .maxage_deadline()
                .filter(|deadline| *deadline > now)
                .unwrap_or(recheck);
            instance
                .state
                .maxage_queue
                .insert((area_id, lsa_key), deadline);
            continue;
        }

        // The LSA has just reached MaxAge.
        if lse.data.base_time.is_some() {
            let reason = LsaFlushReason::Expiry;
            flush(instance, arenas, area_idx, &lsa_key, reason);
        }

        let area = &arenas.areas[area_idx];
        let removable = maxage_removable(
            area,
            &arenas.interfaces,
            &arenas.neighbors,
            &lsa_key,
        );
        if !removable || synchronizing(arenas) {
            instance.state.maxage_queue.insert((area_id, lsa_key), recheck);
            continue;
        }

        // Remove the LSA from the LSDB.
        instance.state.maxage_queue.remove(&(area_id, lsa_key));
        let area = &mut arenas.areas[area_idx];
        if let Some(lse) = area.state.lsdb.remove(&lsa_key) {
            Debug::LsaRemove(&lse.data.hdr).log();
            instance.state.spf_pending = true;
        }
        if lsa_key == router_lsa_self_key(instance.state.router_id) {
            area.state.router_lsa_self = None;
        }

        // Originate the new instance of an LSA whose sequence number wrapped.
        if let Some(lsa) = area.state.lsdb.seqno_wrapping.remove(&lsa_key) {
            originate(instance, arenas, area_idx, lsa);
        }
    }
}

// Processes an LSA origination event.
pub(crate) fn lsa_orig_event(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    event: LsaOriginateEvent,
) -> Result<(), Error> {
    match event {
        LsaOriginateEvent::InterfaceUpDown { area_id }
        | LsaOriginateEvent::NeighborToFromFull { area_id }
        | LsaOriginateEvent::ConfigChange { area_id } => {
            // (Re)originate Router-LSA.
            let (area_idx, _) = arenas.areas.get_by_id(area_id)?;
            lsa_orig_router(instance, arenas, area_idx, None);
        }
        LsaOriginateEvent::SelfOriginatedLsaRcvd { area_id, seq_no } => {
            // Reoriginate Router-LSA with a sequence number that supersedes
            // the received one.
            let (area_idx, _) = arenas.areas.get_by_id(area_id)?;
            lsa_orig_router(instance, arenas, area_idx, Some(seq_no));
        }
    }

    Ok(())
}

// (Re)originates the Router-LSA of the given area.
pub(crate) fn lsa_orig_router(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_idx: AreaIndex,
    rcvd_seq_no: Option<u32>,
) {
    let area = &arenas.areas[area_idx];

    // Router-LSA's links.
    let mut links = vec![];
    for iface in area.interfaces.iter(&arenas.interfaces) {
        // Add a Type-1 link (p2p) for each fully adjacent neighbor.
        for nbr in iface
            .state
            .neighbors
            .iter(&arenas.neighbors)
            .filter(|nbr| nbr.state == nsm::State::Full)
        {
            let mut link = LsaRouterLink::new(
                LsaRouterLinkType::PointToPoint,
                nbr.router_id,
                Ipv4Addr::from(iface.ifindex),
                iface.config.cost,
            );
            if instance.config.qos_enabled {
                let metric = bandwidth_encode(iface.system.bandwidth);
                let tos = LsaRouterLinkTos::new(LSA_TOS_BANDWIDTH, metric);
                link.tos.push(tos);
            }
            links.push(link);
        }
    }

    // A router without adjacencies has nothing to advertise until it
    // originated a Router-LSA once.
    if links.is_empty()
        && area.state.router_lsa_self.is_none()
        && rcvd_seq_no.is_none()
    {
        return;
    }

    let lsa_body = LsaBody::Router(LsaRouter::new(Default::default(), links));
    originate_check(instance, arenas, area_idx, lsa_body, rcvd_seq_no);
}

// Returns the key of the router-LSA originated by the given router.
pub(crate) fn router_lsa_self_key(router_id: Ipv4Addr) -> LsaKey {
    LsaKey::new(LsaType::Router, router_id, router_id)
}

// ===== helper functions =====

// Returns the sequence number of the next LSA instance.
fn next_seq_no(old: Option<u32>, rcvd: Option<u32>) -> u32 {
    let latest = match (old, rcvd) {
        (Some(old), Some(rcvd)) => {
            if (rcvd as i32) > (old as i32) {
                rcvd
            } else {
                old
            }
        }
        (Some(seq_no), None) | (None, Some(seq_no)) => seq_no,
        (None, None) => return LSA_INIT_SEQ_NO,
    };
    latest.wrapping_add(1)
}

// Returns whether the given LSA isn't contained on any neighbor Link state
// retransmission list.
fn maxage_removable(
    area: &Area,
    interfaces: &Arena<Interface>,
    neighbors: &Arena<Neighbor>,
    lsa_key: &LsaKey,
) -> bool {
    area.interfaces
        .iter(interfaces)
        .flat_map(|iface| iface.state.neighbors.iter(neighbors))
        .all(|nbr| !nbr.lists.ls_rxmt.contains_key(lsa_key))
}

// Returns whether any neighbor is in the process of synchronizing its
// database.
pub(crate) fn synchronizing(arenas: &InstanceArenas) -> bool {
    arenas.neighbors.iter().any(|(_, nbr)| {
        matches!(nbr.state, nsm::State::Exchange | nsm::State::Loading)
    })
}

// Removes old instance of the given LSA from all neighbors' Link state
// retransmission lists.
fn rxmt_lists_remove(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_idx: AreaIndex,
    lsa: &Lsa,
) {
    let now = instance.sb.now();
    let area = &arenas.areas[area_idx];

    for iface_idx in area.interfaces.indexes() {
        let iface = &arenas.interfaces[iface_idx];

        // Iterate over all neighbors from this interface.
        for nbr_idx in iface.state.neighbors.indexes() {
            let nbr = &mut arenas.neighbors[nbr_idx];

            // Remove LSA from rxmt list as long as it's an older version.
            if let btree_map::Entry::Occupied(o) =
                nbr.lists.ls_rxmt.entry(lsa.hdr.key())
            {
                let old_lsa = o.get();
                if lsa_compare(&old_lsa.hdr_at(now), &lsa.hdr_at(now))
                    == Ordering::Less
                {
                    o.remove();
                    nbr.rxmt_lsupd_stop_check(instance.sb);
                }
            }
        }
    }
}
