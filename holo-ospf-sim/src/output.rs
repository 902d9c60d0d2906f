//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use holo_netsim::SimTime;

use crate::area::Area;
use crate::collections::{Arena, NeighborIndex};
use crate::instance::InstanceUpView;
use crate::interface::Interface;
use crate::lsdb;
use crate::neighbor::Neighbor;
use crate::packet::lsa::{Lsa, LsaHdr};
use crate::packet::{
    DbDesc, DbDescFlags, LsAck, LsRequest, LsUpdate, Options, Packet,
    PacketHdr, PacketType, max_packet_size,
};

// ===== Database Description Packets =====

pub(crate) fn send_dbdesc(
    nbr: &mut Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &mut InstanceUpView<'_>,
) {
    let now = instance.sb.now();

    // Calculate maximum packet size.
    let max_size = max_packet_size(iface.system.mtu)
        .saturating_sub(PacketHdr::LENGTH)
        .saturating_sub(DbDesc::BASE_LENGTH);

    // Append as many LSA headers as possible while on the Exchange state.
    let mut total = 0;
    let mut lsa_hdrs = vec![];
    while total + LsaHdr::LENGTH <= max_size {
        match nbr.lists.db_summary.pop_first() {
            Some((_, lsa)) => {
                total += LsaHdr::LENGTH;

                // Update LSA age.
                lsa_hdrs.push(lsa.hdr_at(now));
            }
            None => break,
        }
    }

    // Clear the M-bit if there's no more data to send.
    if !nbr.dd_flags.contains(DbDescFlags::I) && nbr.lists.db_summary.is_empty()
    {
        nbr.dd_flags.remove(DbDescFlags::M);
    }

    // Generate Database Description packet.
    let hdr = PacketHdr::new(
        PacketType::DbDesc,
        instance.state.router_id,
        area.area_id,
    );
    let dbdesc = DbDesc {
        hdr,
        mtu: iface.system.mtu,
        options: Options::E,
        dd_flags: nbr.dd_flags,
        dd_seq_no: nbr.dd_seq_no,
        lsa_hdrs,
    };

    // Send packet.
    nbr.last_sent_dbdesc = Some(dbdesc.clone());
    iface.send_packet(instance, Packet::DbDesc(dbdesc), Some(nbr.src));

    // Start retransmission interval in two cases:
    // * The router is master
    // * When sending the initial database description packet
    if nbr.dd_flags.intersects(DbDescFlags::MS | DbDescFlags::I) {
        nbr.rxmt_dbdesc_start(iface, area, instance.sb);
    }
}

pub(crate) fn rxmt_dbdesc(
    nbr: &Neighbor,
    iface: &Interface,
    instance: &mut InstanceUpView<'_>,
) {
    if let Some(dbdesc) = &nbr.last_sent_dbdesc {
        let packet = Packet::DbDesc(dbdesc.clone());
        iface.send_packet(instance, packet, Some(nbr.src));
    }
}

// ===== LS Request Packets =====

pub(crate) fn send_lsreq(
    nbr: &mut Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &mut InstanceUpView<'_>,
) {
    // Calculate maximum packet size.
    let max_size =
        max_packet_size(iface.system.mtu).saturating_sub(PacketHdr::LENGTH);

    // Append as many LS Request Entries as possible in a single packet.
    let mut total = 0;
    while total + LsRequest::ENTRY_LENGTH <= max_size {
        match nbr.lists.ls_request.pop_first() {
            Some((lsa_key, lsa_hdr)) => {
                nbr.lists.ls_request_pending.insert(lsa_key, lsa_hdr);
                total += LsRequest::ENTRY_LENGTH;
            }
            None => break,
        }
    }

    // Send packet.
    let packet = generate_lsreq(nbr, area, instance);
    iface.send_packet(instance, packet, Some(nbr.src));

    // Start retransmission interval.
    nbr.rxmt_lsreq_start(iface, area, instance.sb);
}

pub(crate) fn rxmt_lsreq(
    nbr: &Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &mut InstanceUpView<'_>,
) {
    let packet = generate_lsreq(nbr, area, instance);
    iface.send_packet(instance, packet, Some(nbr.src));
}

// ===== LS Update Packets =====

// Sends the LSAs enqueued for transmission on the given interface, or on the
// given neighbor if one is specified.
pub(crate) fn send_lsupd(
    nbr_idx: Option<NeighborIndex>,
    iface: &mut Interface,
    area: &Area,
    instance: &mut InstanceUpView<'_>,
    neighbors: &mut Arena<Neighbor>,
) {
    let now = instance.sb.now();

    // Calculate maximum packet size.
    let max_size = max_packet_size(iface.system.mtu)
        .saturating_sub(PacketHdr::LENGTH)
        .saturating_sub(LsUpdate::BASE_LENGTH);

    // Get list of LSAs enqueued for transmission.
    let (ls_update_list, dst) = match nbr_idx {
        Some(nbr_idx) => {
            let nbr = &mut neighbors[nbr_idx];
            (&mut nbr.lists.ls_update, Some(nbr.src))
        }
        None => (&mut iface.state.ls_update_list, None),
    };
    let mut ls_update_list = std::mem::take(ls_update_list);

    // Send as many LS Updates as necessary.
    while !ls_update_list.is_empty() {
        // Append as many LSAs as possible in a single packet.
        let mut total = 0;
        let mut lsas = vec![];
        while let Some(o) = ls_update_list.first_entry() {
            let length = o.get().hdr.length;
            // If a single LSA is bigger than the maximum packet size, there's
            // nothing we can do other than relying on IP-level fragmentation.
            if length <= max_size && total + length > max_size {
                break;
            }
            total += length;

            let lsa = o.remove();
            lsas.push(lsa_for_transmission(&lsa, iface, now));
        }

        // Send packet.
        let packet = generate_lsupd(area, instance, lsas);
        iface.send_packet(instance, packet, dst);
    }
}

pub(crate) fn rxmt_lsupd(
    nbr: &Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &mut InstanceUpView<'_>,
) {
    let now = instance.sb.now();

    // Calculate maximum packet size.
    let max_size = max_packet_size(iface.system.mtu)
        .saturating_sub(PacketHdr::LENGTH)
        .saturating_sub(LsUpdate::BASE_LENGTH);

    // Append as many LSAs as possible in a single packet.
    let mut total = 0;
    let mut lsas = vec![];
    for lsa in nbr.lists.ls_rxmt.values() {
        let length = lsa.hdr.length;
        // If a single LSA is bigger than the maximum packet size, there's
        // nothing we can do other than relying on IP-level fragmentation.
        if length <= max_size && total + length > max_size {
            break;
        }
        total += length;

        lsas.push(lsa_for_transmission(lsa, iface, now));
    }

    // Send packet.
    let packet = generate_lsupd(area, instance, lsas);
    iface.send_packet(instance, packet, Some(nbr.src));
}

// ===== LS Ack Packets =====

pub(crate) fn send_lsack_direct(
    nbr: &Neighbor,
    iface: &Interface,
    area: &Area,
    instance: &mut InstanceUpView<'_>,
    lsa_hdr: &LsaHdr,
) {
    let hdr = PacketHdr::new(
        PacketType::LsAck,
        instance.state.router_id,
        area.area_id,
    );
    let packet = Packet::LsAck(LsAck {
        hdr,
        lsa_hdrs: vec![*lsa_hdr],
    });
    iface.send_packet(instance, packet, Some(nbr.src));
}

pub(crate) fn send_lsack_delayed(
    iface: &mut Interface,
    area: &Area,
    instance: &mut InstanceUpView<'_>,
) {
    // Calculate maximum packet size.
    let max_size =
        max_packet_size(iface.system.mtu).saturating_sub(PacketHdr::LENGTH);

    // Send as many LS Acks as necessary.
    while !iface.state.ls_ack_list.is_empty() {
        // Append as many LSA headers as possible in a single packet.
        let mut total = 0;
        let mut lsa_hdrs = vec![];
        while total + LsaHdr::LENGTH <= max_size || lsa_hdrs.is_empty() {
            match iface.state.ls_ack_list.pop_first() {
                Some((_, lsa_hdr)) => {
                    total += LsaHdr::LENGTH;
                    lsa_hdrs.push(lsa_hdr);
                }
                None => break,
            }
        }

        let hdr = PacketHdr::new(
            PacketType::LsAck,
            instance.state.router_id,
            area.area_id,
        );
        let packet = Packet::LsAck(LsAck { hdr, lsa_hdrs });
        iface.send_packet(instance, packet, None);
    }
}

// ===== helper functions =====

fn generate_lsreq(
    nbr: &Neighbor,
    area: &Area,
    instance: &InstanceUpView<'_>,
) -> Packet {
    let hdr = PacketHdr::new(
        PacketType::LsRequest,
        instance.state.router_id,
        area.area_id,
    );
    let entries = nbr.lists.ls_request_pending.keys().copied().collect();
    Packet::LsRequest(LsRequest { hdr, entries })
}

fn generate_lsupd(
    area: &Area,
    instance: &InstanceUpView<'_>,
    lsas: Vec<Lsa>,
) -> Packet {
    let hdr = PacketHdr::new(
        PacketType::LsUpdate,
        instance.state.router_id,
        area.area_id,
    );
    Packet::LsUpdate(LsUpdate { hdr, lsas })
}

// Returns a copy of the LSA whose age accounts for the time needed to
// transmit it over the link.
fn lsa_for_transmission(lsa: &Lsa, iface: &Interface, now: SimTime) -> Lsa {
    let mut lsa = lsa.clone();
    let age = std::cmp::min(
        lsa.age(now).saturating_add(iface.config.transmit_delay),
        lsdb::LSA_MAX_AGE,
    );
    lsa.set_age(age);
    lsa
}
