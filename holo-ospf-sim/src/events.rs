//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::btree_map;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::area::Area;
use crate::collections::{
    AreaId, AreaIndex, InterfaceId, InterfaceIndex, NeighborId, NeighborIndex,
};
use crate::debug::{Debug, LsaFlushReason, SeqNoMismatchReason};
use crate::error::{Error, InterfaceCfgError};
use crate::flood::flood;
use crate::instance::{InstanceArenas, InstanceUpView};
use crate::interface::{Interface, ism};
use crate::lsdb::{self, LsaEntryFlags};
use crate::neighbor::{LastDbDesc, Neighbor, nsm};
use crate::output;
use crate::packet::lsa::{Lsa, LsaType};
use crate::packet::{
    DbDesc, DbDescFlags, Hello, LsAck, LsRequest, LsUpdate, Packet, PacketType,
};
use crate::tasks::{LsaOriginateEvent, ProtocolInputMsg, TimerToken};

// ===== Neighbor discovery =====

pub(crate) fn process_neighbor_up(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    ifindex: u32,
    addr: Ipv4Addr,
) -> Result<(), Error> {
    // Lookup or create interface.
    let (area_idx, iface_idx) = match interface_lookup(arenas, ifindex) {
        Some(indexes) => indexes,
        None => interface_create(instance, arenas, ifindex)?,
    };
    let area = &arenas.areas[area_idx];
    let iface = &mut arenas.interfaces[iface_idx];

    // Lookup or create neighbor. Until its first Hello is heard, the neighbor
    // is identified by its address.
    let nbr_idx = iface
        .state
        .neighbors
        .get_by_addr(&arenas.neighbors, addr)
        .map(|(nbr_idx, _)| nbr_idx);
    let (nbr_idx, new_nbr) = match nbr_idx {
        Some(nbr_idx) => (nbr_idx, false),
        None => {
            let (nbr_idx, _) =
                iface.state.neighbors.insert(&mut arenas.neighbors, addr, addr);
            (nbr_idx, true)
        }
    };
    let nbr = &mut arenas.neighbors[nbr_idx];
    nbr.fsm(iface, area, instance, nsm::Event::HelloRcvd);

    // Start the interface, or greet the new neighbor on an interface that is
    // already operational.
    if iface.is_down() {
        let event = ism::Event::InterfaceUp;
        iface.fsm(area, instance, &mut arenas.neighbors, event);
    } else if new_nbr {
        iface.send_hello(area, instance, &arenas.neighbors);
    }

    Ok(())
}

pub(crate) fn process_neighbor_down(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    ifindex: u32,
    addr: Ipv4Addr,
) -> Result<(), Error> {
    // Lookup interface and neighbor.
    let (area_idx, iface_idx) = interface_lookup(arenas, ifindex)
        .ok_or(Error::UnknownInterface(ifindex))?;
    let area = &mut arenas.areas[area_idx];
    let iface = &mut arenas.interfaces[iface_idx];
    let (nbr_idx, _) = iface
        .state
        .neighbors
        .get_by_addr(&arenas.neighbors, addr)
        .ok_or(Error::UnknownNeighbor(ifindex, addr))?;

    // Bring the neighbor down and delete it.
    let nbr = &mut arenas.neighbors[nbr_idx];
    nbr.fsm(iface, area, instance, nsm::Event::LinkDown);
    iface.state.neighbors.delete(&mut arenas.neighbors, nbr_idx);

    // The interface goes away together with its last neighbor.
    if iface.state.neighbors.is_empty() {
        let event = ism::Event::InterfaceDown;
        iface.fsm(area, instance, &mut arenas.neighbors, event);
        area.interfaces.delete(&mut arenas.interfaces, iface_idx);
    }

    Ok(())
}

// ===== Neighbor FSM event =====

pub(crate) fn process_nsm_event(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: NeighborId,
    event: nsm::Event,
) -> Result<(), Error> {
    // Lookup area, interface and neighbor.
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) = area
        .interfaces
        .get_mut_by_id(&mut arenas.interfaces, iface_id)?;
    let (nbr_idx, nbr) = iface
        .state
        .neighbors
        .get_mut_by_id(&mut arenas.neighbors, nbr_id)?;

    // Invoke FSM event.
    nbr.fsm(iface, area, instance, event);
    if nbr.state == nsm::State::Down {
        iface.state.neighbors.delete(&mut arenas.neighbors, nbr_idx);
    }

    Ok(())
}

// ===== Network packet receipt =====

pub(crate) fn process_packet(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    ifindex: u32,
    src: Ipv4Addr,
    packet: Packet,
) -> Result<(), Error> {
    // Lookup area and interface.
    let (area_idx, iface_idx) = interface_lookup(arenas, ifindex)
        .ok_or(Error::UnknownInterface(ifindex))?;
    let area = &arenas.areas[area_idx];
    let iface = &arenas.interfaces[iface_idx];

    // Ignore packets received on inactive interfaces.
    if iface.is_down() {
        return Ok(());
    }

    if instance.config.trace_opts.packets {
        Debug::PacketRx(ifindex, &src, &packet).log();
    }

    // Check if the packet belongs to the area of the receiving interface.
    let hdr = *packet.hdr();
    if hdr.area_id != area.area_id {
        return Err(Error::InterfaceCfgError(
            ifindex,
            src,
            hdr.pkt_type,
            InterfaceCfgError::AreaIdMismatch(hdr.area_id, area.area_id),
        ));
    }

    // Hello packets are the only ones that can create new neighbors.
    if let Packet::Hello(hello) = packet {
        return process_packet_hello(
            iface_idx, area_idx, instance, arenas, src, hello,
        );
    }

    // Lookup neighbor.
    let (nbr_idx, _) = iface
        .state
        .neighbors
        .get_by_router_id(&arenas.neighbors, hdr.router_id)
        .ok_or(Error::UnknownNeighbor(ifindex, hdr.router_id))?;

    let nbr = &mut arenas.neighbors[nbr_idx];
    let iface = &mut arenas.interfaces[iface_idx];
    let area = &arenas.areas[area_idx];
    match packet {
        Packet::Hello(_) => Ok(()),
        Packet::DbDesc(dbdesc) => {
            process_packet_dbdesc(nbr, iface, area, instance, src, dbdesc)
        }
        Packet::LsRequest(ls_req) => {
            process_packet_lsreq(nbr, iface, area, instance, ls_req)
        }
        Packet::LsUpdate(ls_upd) => process_packet_lsupd(
            nbr_idx, iface_idx, area_idx, instance, arenas, ls_upd,
        ),
        Packet::LsAck(ls_ack) => process_packet_lsack(nbr, instance, ls_ack),
    }
}

fn process_packet_hello(
    iface_idx: InterfaceIndex,
    area_idx: AreaIndex,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    src: Ipv4Addr,
    hello: Hello,
) -> Result<(), Error> {
    let iface = &mut arenas.interfaces[iface_idx];
    let area = &arenas.areas[area_idx];

    // Perform all required sanity checks.
    process_packet_hello_sanity_checks(iface, instance, src, &hello)?;

    // Find or create new neighbor.
    let router_id = hello.hdr.router_id;
    let nbr_idx = iface
        .state
        .neighbors
        .get_by_router_id(&arenas.neighbors, router_id)
        .map(|(nbr_idx, _)| nbr_idx);
    let (nbr_idx, new_nbr) = match nbr_idx {
        Some(nbr_idx) => (nbr_idx, false),
        None => {
            // Replace the record created when the neighbor was discovered
            // under a different Router ID.
            if let Some((old_idx, _)) =
                iface.state.neighbors.get_by_addr(&arenas.neighbors, src)
            {
                let old_nbr = &mut arenas.neighbors[old_idx];
                old_nbr.fsm(iface, area, instance, nsm::Event::Kill);
                iface.state.neighbors.delete(&mut arenas.neighbors, old_idx);
            }

            let (nbr_idx, _) = iface.state.neighbors.insert(
                &mut arenas.neighbors,
                router_id,
                src,
            );
            (nbr_idx, true)
        }
    };

    let nbr = &mut arenas.neighbors[nbr_idx];
    nbr.fsm(iface, area, instance, nsm::Event::HelloRcvd);

    // Reply to new neighbors right away.
    if new_nbr {
        iface.send_hello(area, instance, &arenas.neighbors);
    }

    // Check whether the neighbor sees us.
    let nbr = &mut arenas.neighbors[nbr_idx];
    let event = if hello.neighbors.contains(&instance.state.router_id) {
        nsm::Event::TwoWayRcvd
    } else {
        nsm::Event::OneWayRcvd
    };
    nbr.fsm(iface, area, instance, event);

    Ok(())
}

fn process_packet_hello_sanity_checks(
    iface: &Interface,
    instance: &InstanceUpView<'_>,
    src: Ipv4Addr,
    hello: &Hello,
) -> Result<(), Error> {
    let error = if hello.hdr.router_id == instance.state.router_id {
        InterfaceCfgError::DuplicateRouterId(hello.hdr.router_id)
    } else if hello.hello_interval != iface.config.hello_interval {
        InterfaceCfgError::HelloIntervalMismatch(
            hello.hello_interval,
            iface.config.hello_interval,
        )
    } else if hello.dead_interval != iface.config.dead_interval {
        InterfaceCfgError::DeadIntervalMismatch(
            hello.dead_interval,
            iface.config.dead_interval,
        )
    } else {
        return Ok(());
    };

    Err(Error::InterfaceCfgError(
        iface.ifindex,
        src,
        PacketType::Hello,
        error,
    ))
}

fn process_packet_dbdesc(
    nbr: &mut Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &mut InstanceUpView<'_>,
    src: Ipv4Addr,
    dbdesc: DbDesc,
) -> Result<(), Error> {
    let now = instance.sb.now();

    // MTU mismatch check.
    if dbdesc.mtu > iface.system.mtu {
        return Err(Error::InterfaceCfgError(
            iface.ifindex,
            src,
            PacketType::DbDesc,
            InterfaceCfgError::MtuMismatch(dbdesc.mtu),
        ));
    }

    // Further processing depends on the neighbor's state.
    match nbr.state {
        nsm::State::Down | nsm::State::Attempt | nsm::State::TwoWay => {
            return Err(Error::DbDescReject(nbr.router_id, nbr.state));
        }
        nsm::State::Init | nsm::State::ExStart => {
            if nbr.state == nsm::State::Init {
                nbr.fsm(iface, area, instance, nsm::Event::TwoWayRcvd);
                if nbr.state != nsm::State::ExStart {
                    return Ok(());
                }
                // Fall through to the ExStart case.
            }

            if dbdesc
                .dd_flags
                .contains(DbDescFlags::I | DbDescFlags::M | DbDescFlags::MS)
                && dbdesc.lsa_hdrs.is_empty()
                && dbdesc.hdr.router_id > instance.state.router_id
            {
                // Set the master/slave bit to slave, and set the neighbor data
                // structure's DD sequence number to that specified by the
                // master.
                nbr.dd_flags.remove(DbDescFlags::MS);
                nbr.dd_seq_no = dbdesc.dd_seq_no;
            } else if !dbdesc
                .dd_flags
                .contains(DbDescFlags::I | DbDescFlags::MS)
                && dbdesc.dd_seq_no == nbr.dd_seq_no
                && dbdesc.hdr.router_id < instance.state.router_id
            {
                // In this case the router is Master.
            } else {
                // Ignore the packet.
                return Ok(());
            }

            nbr.options = Some(dbdesc.options);
            nbr.fsm(iface, area, instance, nsm::Event::NegotiationDone);
        }
        nsm::State::Exchange => {
            // Check for duplicate packet.
            if nbr.dbdesc_is_dup(&dbdesc) {
                // The slave needs to retransmit the last Database Description
                // packet that it had sent.
                if !nbr.dd_flags.contains(DbDescFlags::MS) {
                    output::rxmt_dbdesc(nbr, iface, instance);
                }

                return Ok(());
            }

            // Sanity checks.
            let reason = match &nbr.last_rcvd_dbdesc {
                Some(last_rcvd_dbdesc) => {
                    dbdesc_sanity_check(nbr, last_rcvd_dbdesc, &dbdesc)
                }
                None => Some(SeqNoMismatchReason::UnexpectedDbDesc),
            };
            if let Some(reason) = reason {
                let event = nsm::Event::SeqNoMismatch(reason);
                nbr.fsm(iface, area, instance, event);
                return Ok(());
            }
        }
        nsm::State::Loading | nsm::State::Full => {
            // Check for duplicate packet.
            if nbr.dbdesc_is_dup(&dbdesc) {
                // The slave must respond to duplicates by repeating the last
                // Database Description packet that it had sent.
                if !nbr.dd_flags.contains(DbDescFlags::MS) {
                    output::rxmt_dbdesc(nbr, iface, instance);
                }

                return Ok(());
            }

            let reason = SeqNoMismatchReason::UnexpectedDbDesc;
            let event = nsm::Event::SeqNoMismatch(reason);
            nbr.fsm(iface, area, instance, event);
            return Ok(());
        }
    }

    // If we got this far it means the packet was accepted. Stop the
    // retransmission interval in case it's active.
    nbr.rxmt_dbdesc_stop(instance.sb);

    // Now iterate over all LSA headers.
    for lsa_hdr in &dbdesc.lsa_hdrs {
        // Only router-LSAs are exchanged.
        if lsa_hdr.lsa_type != LsaType::Router {
            continue;
        }

        // RFC 5243 says:
        // "If the Database summary list contains an instance of the LSA that is
        // the same as or less recent than the listed LSA, the LSA is removed
        // from the Database summary list".
        let lsa_key = lsa_hdr.key();
        if let btree_map::Entry::Occupied(o) =
            nbr.lists.db_summary.entry(lsa_key)
        {
            let db_summ_hdr = o.get().hdr_at(now);
            if lsdb::lsa_compare(&db_summ_hdr, lsa_hdr) != Ordering::Greater {
                o.remove();
            }
        }

        // Put the LSA on the Link state request list if it's not present on the
        // LSDB, or if the local copy is less recent than the received one.
        if let Some(lse) = area.state.lsdb.get(&lsa_key)
            && lsdb::lsa_compare(&lse.data.hdr_at(now), lsa_hdr)
                != Ordering::Less
        {
            continue;
        }
        nbr.lists.ls_request.insert(lsa_key, *lsa_hdr);
    }

    // Start sending Link State Request packets.
    if !nbr.lists.ls_request.is_empty()
        && nbr.lists.ls_request_pending.is_empty()
    {
        output::send_lsreq(nbr, iface, area, instance);
    }

    // Further processing depends on whether the router is master or slave.
    let mut exchange_done = false;
    if nbr.dd_flags.contains(DbDescFlags::MS) {
        nbr.dd_seq_no = nbr.dd_seq_no.wrapping_add(1);

        if !nbr.dd_flags.contains(DbDescFlags::M)
            && !dbdesc.dd_flags.contains(DbDescFlags::M)
        {
            exchange_done = true;
        } else {
            output::send_dbdesc(nbr, iface, area, instance);
        }
    } else {
        nbr.dd_seq_no = dbdesc.dd_seq_no;

        output::send_dbdesc(nbr, iface, area, instance);

        if !nbr.dd_flags.contains(DbDescFlags::M)
            && !dbdesc.dd_flags.contains(DbDescFlags::M)
        {
            exchange_done = true;
        }
    }
    if exchange_done {
        nbr.fsm(iface, area, instance, nsm::Event::ExchangeDone);

        // The slave must wait RouterDeadInterval seconds before freeing the
        // last Database Description packet. Reception of a Database Description
        // packet from the master after this interval will generate a
        // SeqNumberMismatch neighbor event.
        if !nbr.dd_flags.contains(DbDescFlags::MS) {
            nbr.dbdesc_free_timer_start(iface, area, instance.sb);
        }
    }

    // Save last received Database Description packet.
    nbr.last_rcvd_dbdesc = Some(LastDbDesc {
        options: dbdesc.options,
        dd_flags: dbdesc.dd_flags,
        dd_seq_no: dbdesc.dd_seq_no,
    });

    Ok(())
}

fn dbdesc_sanity_check(
    nbr: &Neighbor,
    last_rcvd_dbdesc: &LastDbDesc,
    dbdesc: &DbDesc,
) -> Option<SeqNoMismatchReason> {
    if dbdesc.dd_flags.contains(DbDescFlags::I)
        || dbdesc.dd_flags.contains(DbDescFlags::MS)
            != last_rcvd_dbdesc.dd_flags.contains(DbDescFlags::MS)
    {
        return Some(SeqNoMismatchReason::InconsistentFlags);
    }
    if dbdesc.options != last_rcvd_dbdesc.options {
        return Some(SeqNoMismatchReason::InconsistentOptions);
    }
    let expected_seq_no = if nbr.dd_flags.contains(DbDescFlags::MS) {
        nbr.dd_seq_no
    } else {
        nbr.dd_seq_no.wrapping_add(1)
    };
    if dbdesc.dd_seq_no != expected_seq_no {
        return Some(SeqNoMismatchReason::InconsistentSeqNo);
    }

    None
}

fn process_packet_lsreq(
    nbr: &mut Neighbor,
    iface: &mut Interface,
    area: &Area,
    instance: &mut InstanceUpView<'_>,
    ls_req: LsRequest,
) -> Result<(), Error> {
    if nbr.state < nsm::State::Exchange {
        Debug::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return Ok(());
    }

    // Iterate over all request entries.
    for lsa_key in &ls_req.entries {
        if let Some(lse) = area.state.lsdb.get(lsa_key) {
            // Copy LSA for transmission to the neighbor.
            let lsa = lse.data.clone();
            nbr.lists.ls_update.insert(*lsa_key, lsa);
        } else {
            // Something has gone wrong with the Database Exchange process.
            nbr.fsm(iface, area, instance, nsm::Event::BadLsReq);
            return Ok(());
        }
    }

    // Schedule transmission of new LS Update.
    if !nbr.lists.ls_update.is_empty() {
        instance
            .state
            .input
            .send_lsupd(area.id, iface.id, Some(nbr.id));
    }

    Ok(())
}

fn process_packet_lsupd(
    nbr_idx: NeighborIndex,
    iface_idx: InterfaceIndex,
    area_idx: AreaIndex,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    ls_upd: LsUpdate,
) -> Result<(), Error> {
    let nbr = &arenas.neighbors[nbr_idx];
    if nbr.state < nsm::State::Exchange {
        Debug::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return Ok(());
    }

    // Process all LSAs contained in the packet.
    for lsa in ls_upd.lsas {
        let stop = process_packet_lsupd_lsa(
            nbr_idx, iface_idx, area_idx, instance, arenas, lsa,
        );
        if stop {
            break;
        }
    }

    Ok(())
}

// Processes a single LSA of a Link State Update packet.
//
// Returns whether the processing of the remaining LSAs must stop.
fn process_packet_lsupd_lsa(
    nbr_idx: NeighborIndex,
    iface_idx: InterfaceIndex,
    area_idx: AreaIndex,
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    mut lsa: Lsa,
) -> bool {
    let now = instance.sb.now();
    let trace_flooding = instance.config.trace_opts.flooding;
    let nbr = &arenas.neighbors[nbr_idx];
    let iface = &arenas.interfaces[iface_idx];
    let area = &arenas.areas[area_idx];

    // (1-3) Discard LSAs of unsupported types.
    if lsa.body.is_unsupported() {
        Error::LsaUnsupportedType(nbr.router_id, lsa.hdr).log();

        // Examine the next LSA.
        return false;
    }

    // (5) Find the instance of this LSA that is currently contained in the
    // router's link state database.
    let lsa_key = lsa.hdr.key();
    let lse = area.state.lsdb.get(&lsa_key);

    // (4) If the LSA's LS age is equal to MaxAge, and there is currently no
    // instance of the LSA in the router's link state database, and none of
    // router's neighbors are in states Exchange or Loading.
    if lsa.hdr.is_maxage() && lse.is_none() && !lsdb::synchronizing(arenas) {
        // Acknowledge the receipt of the LSA.
        output::send_lsack_direct(nbr, iface, area, instance, &lsa.hdr);

        // Examine the next LSA.
        return false;
    }

    // (5 cont.) There is no database copy, or the received LSA is more
    // recent than the database copy.
    let lsa_cmp =
        lse.map(|lse| lsdb::lsa_compare(&lse.data.hdr_at(now), &lsa.hdr));
    if matches!(lsa_cmp, None | Some(Ordering::Less)) {
        // (5.a) MinLSArrival check.
        if let Some(lse) = lse
            && lsdb::lsa_min_arrival_check(lse, now)
        {
            if trace_flooding {
                Debug::LsaMinArrivalDiscard(nbr.router_id, &lsa.hdr).log();
            }

            // Examine the next LSA.
            return false;
        }

        // (5.f) A self-originated LSA more recent than the database copy is
        // never installed. Either a newer instance of it is originated, or the
        // received instance is flushed.
        let router_id = instance.state.router_id;
        if lsdb::lsa_is_self_originated(&lsa.hdr, router_id) {
            if trace_flooding {
                Debug::LsaSelfOriginated(nbr.router_id, &lsa.hdr).log();
            }
            output::send_lsack_direct(nbr, iface, area, instance, &lsa.hdr);

            if lsa_key == lsdb::router_lsa_self_key(router_id) {
                instance.state.input.lsa_orig_event(
                    LsaOriginateEvent::SelfOriginatedLsaRcvd {
                        area_id: area.id,
                        seq_no: lsa.hdr.seq_no,
                    },
                );
            } else {
                let reason = LsaFlushReason::PrematureAging;
                lsdb::flush_lsa(instance, arenas, area_idx, lsa, reason);
            }

            // Examine the next LSA.
            return false;
        }

        // The LSA keeps aging from the received LS age onwards.
        if !lsa.hdr.is_maxage() {
            lsa.set_base_time(now);
        }
        let lsa = Arc::new(lsa);

        // (5.b) Immediately flood the new LSA out some subset of the
        // router's interfaces.
        let src = Some((iface_idx, nbr_idx));
        let flooded_back = flood(
            instance,
            &arenas.areas[area_idx],
            &mut arenas.interfaces,
            &mut arenas.neighbors,
            &lsa,
            src,
        );

        // (5.c) This step can be skipped since the LSA installation process
        // already takes care of removing the old copy from all Link state
        // retransmission lists.

        // (5.d) Install the new LSA in the link state database (replacing
        // the current database copy).
        lsdb::install(instance, arenas, area_idx, lsa.clone());
        let area = &mut arenas.areas[area_idx];
        if let Some(lse) = area.state.lsdb.get_mut(&lsa_key) {
            lse.flags.insert(LsaEntryFlags::RECEIVED);
        }

        // Update statistics.
        instance.state.rx_lsa_count += 1;

        // (5.e) Possibly acknowledge the receipt of the LSA by sending a
        // Link State Acknowledgment packet.
        let nbr = &arenas.neighbors[nbr_idx];
        let iface = &mut arenas.interfaces[iface_idx];
        let area = &arenas.areas[area_idx];
        if flooded_back {
            if trace_flooding {
                Debug::LsaFloodedBack(nbr.router_id, &lsa.hdr).log();
            }
        } else {
            // Enqueue delayed ack.
            iface.enqueue_delayed_ack(area, instance.sb, &lsa.hdr);
        }

        // Examine the next LSA.
        return false;
    }

    // (6 - errata 3974) Check if the received LSA is the same instance as
    // the database copy (i.e., neither one is more recent).
    let Some(lse) = lse else {
        return false;
    };
    let nbr = &mut arenas.neighbors[nbr_idx];
    if lsa_cmp == Some(Ordering::Equal) {
        // Check if this LSA can be handled as an implied acknowledgment.
        if nbr.lists.ls_rxmt.remove(&lsa_key).is_some() {
            nbr.rxmt_lsupd_stop_check(instance.sb);
        } else {
            // Send direct ack.
            output::send_lsack_direct(nbr, iface, area, instance, &lsa.hdr);
        }

        // Examine the next LSA.
        return false;
    }

    // (7 - errata 3974) If there is an instance of the LSA on the sending
    // neighbor's Link state request list, an error has occurred in the
    // Database Exchange process.
    if nbr.lists.ls_request.contains_key(&lsa_key)
        || nbr.lists.ls_request_pending.contains_key(&lsa_key)
    {
        // Restart the Database Exchange process.
        nbr.fsm(iface, area, instance, nsm::Event::BadLsReq);

        // Stop processing the Link State Update packet.
        return true;
    }

    // (8) The database copy is more recent.
    //
    // If the database copy has LS age equal to MaxAge and LS sequence
    // number equal to MaxSequenceNumber, simply discard the received LSA
    // without acknowledging it.
    if lse.data.is_maxage(now) && lse.data.hdr.seq_no == lsdb::LSA_MAX_SEQ_NO
    {
        // Examine the next LSA.
        return false;
    }
    if !lsdb::lsa_min_arrival_check(lse, now) {
        if trace_flooding {
            Debug::LsaSendBack(nbr.router_id, &lsa.hdr).log();
        }

        // Send the database copy back to the sending neighbor, encapsulated
        // within a Link State Update Packet.
        nbr.lists.ls_update.insert(lsa_key, lse.data.clone());
        instance
            .state
            .input
            .send_lsupd(area.id, iface.id, Some(nbr.id));
    } else if trace_flooding {
        Debug::LsaMinArrivalDiscard(nbr.router_id, &lsa.hdr).log();
    }

    // Examine the next LSA.
    false
}

fn process_packet_lsack(
    nbr: &mut Neighbor,
    instance: &mut InstanceUpView<'_>,
    ls_ack: LsAck,
) -> Result<(), Error> {
    if nbr.state < nsm::State::Exchange {
        Debug::PacketRxIgnore(nbr.router_id, &nbr.state).log();
        return Ok(());
    }

    // Iterate over all LSA headers.
    let now = instance.sb.now();
    for lsa_hdr in &ls_ack.lsa_hdrs {
        let lsa_key = lsa_hdr.key();
        if let btree_map::Entry::Occupied(o) = nbr.lists.ls_rxmt.entry(lsa_key)
        {
            let lsa = o.get();
            if lsdb::lsa_compare(&lsa.hdr_at(now), lsa_hdr) == Ordering::Equal {
                o.remove();
                nbr.rxmt_lsupd_stop_check(instance.sb);
            } else if instance.config.trace_opts.flooding {
                Debug::QuestionableAck(nbr.router_id, lsa_hdr).log();
            }
        }
    }

    Ok(())
}

// ===== Timer expiry =====

pub(crate) fn process_timeout(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    token: TimerToken,
) -> Result<(), Error> {
    let result = match token {
        TimerToken::Hello { area_id, iface_id } => {
            process_hello_interval(instance, arenas, area_id, iface_id)
        }
        TimerToken::LsRefresh { area_id } => {
            process_lsa_refresh(instance, arenas, area_id)
        }
        TimerToken::LsMaxAgeReached => {
            instance.state.maxage_timer.fired();
            lsdb::maxage_sweep(instance, arenas);
            Ok(())
        }
        TimerToken::AckDelayReached { area_id, iface_id } => {
            process_delayed_ack_timeout(instance, arenas, area_id, iface_id)
        }
        TimerToken::NeighborInactive {
            area_id,
            iface_id,
            nbr_id,
        } => {
            process_nbr_inactivity(instance, arenas, area_id, iface_id, nbr_id)
        }
        TimerToken::DbDescFree {
            area_id,
            iface_id,
            nbr_id,
        } => process_dbdesc_free(arenas, area_id, iface_id, nbr_id),
        TimerToken::DbDescRetransmit {
            area_id,
            iface_id,
            nbr_id,
        }
        | TimerToken::LsUpdateRetransmit {
            area_id,
            iface_id,
            nbr_id,
        }
        | TimerToken::LsRequestRetransmit {
            area_id,
            iface_id,
            nbr_id,
        } => process_packet_rxmt(
            instance, arenas, area_id, iface_id, nbr_id, token,
        ),
        TimerToken::DelayedFlood => {
            process_lsa_orig_delayed_timer(instance, arenas);
            Ok(())
        }
    };

    // Timers whose target no longer exists are stale.
    result.map_err(|error| match error {
        Error::AreaIdNotFound(_)
        | Error::InterfaceIdNotFound(_)
        | Error::NeighborIdNotFound(_) => Error::StaleTimer(token.kind()),
        error => error,
    })
}

fn process_hello_interval(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
) -> Result<(), Error> {
    // Lookup area and interface.
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) = area
        .interfaces
        .get_mut_by_id(&mut arenas.interfaces, iface_id)?;

    // Send Hello and rearm the interval timer.
    iface.state.tasks.hello_interval = None;
    iface.send_hello(area, instance, &arenas.neighbors);
    iface.hello_interval_start(area, instance.sb);

    Ok(())
}

fn process_nbr_inactivity(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: NeighborId,
) -> Result<(), Error> {
    let (_, nbr) = neighbor_lookup(arenas, area_id, iface_id, nbr_id)?;
    nbr.tasks.inactivity_timer = None;

    let event = nsm::Event::InactivityTimer;
    process_nsm_event(instance, arenas, area_id, iface_id, nbr_id, event)
}

fn process_delayed_ack_timeout(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
) -> Result<(), Error> {
    // Lookup area and interface.
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) = area
        .interfaces
        .get_mut_by_id(&mut arenas.interfaces, iface_id)?;

    // Send delayed LS Ack.
    iface.state.tasks.ls_delayed_ack = None;
    output::send_lsack_delayed(iface, area, instance);

    Ok(())
}

// ===== Router-LSA refresh =====

fn process_lsa_refresh(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
) -> Result<(), Error> {
    let (area_idx, _) = arenas.areas.get_by_id(area_id)?;
    lsdb::refresh(instance, arenas, area_idx)
}

// ===== Free last sent/received Database Description packets =====

fn process_dbdesc_free(
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: NeighborId,
) -> Result<(), Error> {
    let (_, nbr) = neighbor_lookup(arenas, area_id, iface_id, nbr_id)?;

    // Free last sent/received Database Description packets.
    nbr.tasks.dbdesc_free_timer = None;
    nbr.last_rcvd_dbdesc = None;
    nbr.last_sent_dbdesc = None;

    Ok(())
}

// ===== Packet retransmission =====

fn process_packet_rxmt(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: NeighborId,
    token: TimerToken,
) -> Result<(), Error> {
    // Lookup area, interface and neighbor.
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) = area
        .interfaces
        .get_mut_by_id(&mut arenas.interfaces, iface_id)?;
    let (_, nbr) = iface
        .state
        .neighbors
        .get_mut_by_id(&mut arenas.neighbors, nbr_id)?;

    // Retransmit packet and rearm the retransmission timer.
    match token {
        TimerToken::DbDescRetransmit { .. } => {
            nbr.tasks.rxmt_dbdesc = None;
            output::rxmt_dbdesc(nbr, iface, instance);
            nbr.rxmt_dbdesc_start(iface, area, instance.sb);
        }
        TimerToken::LsRequestRetransmit { .. } => {
            nbr.tasks.rxmt_lsreq = None;
            output::rxmt_lsreq(nbr, iface, area, instance);
            nbr.rxmt_lsreq_start(iface, area, instance.sb);
        }
        TimerToken::LsUpdateRetransmit { .. } => {
            nbr.tasks.rxmt_lsupd = None;
            if !nbr.lists.ls_rxmt.is_empty() {
                output::rxmt_lsupd(nbr, iface, area, instance);
                nbr.rxmt_lsupd_start(iface, area, instance.sb);
            }
        }
        _ => (),
    }

    Ok(())
}

// ===== Request to send LS Update =====

fn process_send_lsupd(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: Option<NeighborId>,
) -> Result<(), Error> {
    // Lookup area, interface and optional neighbor.
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) = area
        .interfaces
        .get_mut_by_id(&mut arenas.interfaces, iface_id)?;
    let nbr_idx = match nbr_id {
        Some(nbr_id) => {
            let (nbr_idx, _) = iface
                .state
                .neighbors
                .get_mut_by_id(&mut arenas.neighbors, nbr_id)?;
            Some(nbr_idx)
        }
        None => None,
    };

    // Send LS Update.
    output::send_lsupd(nbr_idx, iface, area, instance, &mut arenas.neighbors);

    Ok(())
}

// ===== Router-LSA origination postponed by MinLSInterval =====

fn process_lsa_orig_delayed_timer(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
) {
    instance.state.flood_timer.fired();

    let now = instance.sb.now();
    for area_id in instance.state.flood_queue.pop_expired(now) {
        let Ok((area_idx, area)) = arenas.areas.get_mut_by_id(area_id) else {
            continue;
        };
        area.state.delayed_flood = false;
        lsdb::lsa_orig_router(instance, arenas, area_idx, None);
    }
}

// ===== Internal input queue =====

pub(crate) fn process_input_msg(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    msg: ProtocolInputMsg,
) -> Result<(), Error> {
    match msg {
        ProtocolInputMsg::NsmEvent {
            area_id,
            iface_id,
            nbr_id,
            event,
        } => process_nsm_event(
            instance, arenas, area_id, iface_id, nbr_id, event,
        ),
        ProtocolInputMsg::LsaOrigEvent(event) => {
            lsdb::lsa_orig_event(instance, arenas, event)
        }
        ProtocolInputMsg::SendLsUpdate {
            area_id,
            iface_id,
            nbr_id,
        } => process_send_lsupd(instance, arenas, area_id, iface_id, nbr_id),
    }
}

// ===== helper functions =====

fn interface_lookup(
    arenas: &InstanceArenas,
    ifindex: u32,
) -> Option<(AreaIndex, InterfaceIndex)> {
    let (area_idx, area) = arenas.areas.get_by_ifindex(ifindex)?;
    let (iface_idx, _) =
        area.interfaces.get_by_ifindex(&arenas.interfaces, ifindex)?;
    Some((area_idx, iface_idx))
}

fn interface_create(
    instance: &mut InstanceUpView<'_>,
    arenas: &mut InstanceArenas,
    ifindex: u32,
) -> Result<(AreaIndex, InterfaceIndex), Error> {
    let info = instance
        .sb
        .interface_info(ifindex)
        .ok_or(Error::UnknownInterface(ifindex))?;

    // Lookup or create area.
    let area_id = instance.config.interface_area_id(ifindex);
    let area_idx = match arenas.areas.get_by_area_id(area_id) {
        Some((area_idx, _)) => area_idx,
        None => arenas.areas.insert(area_id).0,
    };

    // Create interface.
    let area = &mut arenas.areas[area_idx];
    let (iface_idx, iface) =
        area.interfaces.insert(&mut arenas.interfaces, ifindex);
    iface.config = instance.config.interface(ifindex).clone();
    iface.update_system(&info);

    Ok((area_idx, iface_idx))
}

fn neighbor_lookup(
    arenas: &mut InstanceArenas,
    area_id: AreaId,
    iface_id: InterfaceId,
    nbr_id: NeighborId,
) -> Result<(NeighborIndex, &mut Neighbor), Error> {
    let (_, area) = arenas.areas.get_mut_by_id(area_id)?;
    let (_, iface) = area
        .interfaces
        .get_mut_by_id(&mut arenas.interfaces, iface_id)?;
    iface
        .state
        .neighbors
        .get_mut_by_id(&mut arenas.neighbors, nbr_id)
}
