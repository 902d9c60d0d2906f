//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod lsa;

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use bitflags::bitflags;
use derive_new::new;
use enum_as_inner::EnumAsInner;
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::packet::lsa::{Lsa, LsaHdr, LsaKey};

// Size of the simulated IPv4 header, subtracted from the interface MTU when
// packing packets.
pub const IPV4_HDR_LENGTH: u16 = 20;

// OSPF Options field.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct Options: u8 {
        const E = 0x02;
        const MC = 0x04;
        const NP = 0x08;
        const DC = 0x20;
        const O = 0x40;
    }
}

// Database Description flags.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct DbDescFlags: u8 {
        const MS = 0x01;
        const M = 0x02;
        const I = 0x04;
    }
}

// OSPF Packet Type.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Hash, Ord, PartialEq)]
#[derive(PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum PacketType {
    Hello = 0x01,
    DbDesc = 0x02,
    LsRequest = 0x03,
    LsUpdate = 0x04,
    LsAck = 0x05,
}

// OSPF packet.
//
// Packets are exchanged as structured values. The nominal encoded lengths are
// used only to honor the interface MTU when packing headers and LSAs.
#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Packet {
    Hello(Hello),
    DbDesc(DbDesc),
    LsRequest(LsRequest),
    LsUpdate(LsUpdate),
    LsAck(LsAck),
}

//
// OSPF packet header.
//
// Nominal encoded length: 24 bytes.
//
#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PacketHdr {
    pub pkt_type: PacketType,
    pub router_id: Ipv4Addr,
    pub area_id: Ipv4Addr,
}

//
// OSPF Hello packet.
//
// Nominal encoded length: 20 bytes plus 4 bytes per listed neighbor.
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Hello {
    pub hdr: PacketHdr,
    pub network_mask: Ipv4Addr,
    pub hello_interval: u16,
    pub options: Options,
    pub priority: u8,
    pub dead_interval: u32,
    pub dr: Option<Ipv4Addr>,
    pub bdr: Option<Ipv4Addr>,
    pub neighbors: BTreeSet<Ipv4Addr>,
}

//
// OSPF Database Description packet.
//
// Nominal encoded length: 8 bytes plus 20 bytes per LSA header.
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct DbDesc {
    pub hdr: PacketHdr,
    pub mtu: u16,
    pub options: Options,
    pub dd_flags: DbDescFlags,
    pub dd_seq_no: u32,
    pub lsa_hdrs: Vec<LsaHdr>,
}

//
// OSPF Link State Request packet.
//
// Nominal encoded length: 12 bytes per request entry.
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsRequest {
    pub hdr: PacketHdr,
    pub entries: Vec<LsaKey>,
}

//
// OSPF Link State Update packet.
//
// Nominal encoded length: 4 bytes plus the length of each LSA.
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsUpdate {
    pub hdr: PacketHdr,
    pub lsas: Vec<Lsa>,
}

//
// OSPF Link State Acknowledgment packet.
//
// Nominal encoded length: 20 bytes per LSA header.
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsAck {
    pub hdr: PacketHdr,
    pub lsa_hdrs: Vec<LsaHdr>,
}

// ===== impl PacketType =====

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketType::Hello => write!(f, "Hello"),
            PacketType::DbDesc => write!(f, "Database Description"),
            PacketType::LsRequest => write!(f, "Link State Request"),
            PacketType::LsUpdate => write!(f, "Link State Update"),
            PacketType::LsAck => write!(f, "Link State Ack"),
        }
    }
}

// ===== impl Packet =====

impl Packet {
    // Returns a reference to the packet header.
    pub fn hdr(&self) -> &PacketHdr {
        match self {
            Packet::Hello(pkt) => &pkt.hdr,
            Packet::DbDesc(pkt) => &pkt.hdr,
            Packet::LsRequest(pkt) => &pkt.hdr,
            Packet::LsUpdate(pkt) => &pkt.hdr,
            Packet::LsAck(pkt) => &pkt.hdr,
        }
    }

    // Returns the nominal encoded length of the packet.
    pub fn length(&self) -> u16 {
        let body = match self {
            Packet::Hello(pkt) => {
                Hello::BASE_LENGTH + 4 * pkt.neighbors.len() as u16
            }
            Packet::DbDesc(pkt) => {
                DbDesc::BASE_LENGTH
                    + LsaHdr::LENGTH * pkt.lsa_hdrs.len() as u16
            }
            Packet::LsRequest(pkt) => {
                LsRequest::ENTRY_LENGTH * pkt.entries.len() as u16
            }
            Packet::LsUpdate(pkt) => {
                LsUpdate::BASE_LENGTH
                    + pkt.lsas.iter().map(|lsa| lsa.hdr.length).sum::<u16>()
            }
            Packet::LsAck(pkt) => LsaHdr::LENGTH * pkt.lsa_hdrs.len() as u16,
        };
        PacketHdr::LENGTH + body
    }
}

// ===== impl PacketHdr =====

impl PacketHdr {
    pub const LENGTH: u16 = 24;
}

// ===== impl Hello =====

impl Hello {
    pub const BASE_LENGTH: u16 = 20;
}

// ===== impl DbDesc =====

impl DbDesc {
    pub const BASE_LENGTH: u16 = 8;
}

// ===== impl LsRequest =====

impl LsRequest {
    pub const ENTRY_LENGTH: u16 = 12;
}

// ===== impl LsUpdate =====

impl LsUpdate {
    pub const BASE_LENGTH: u16 = 4;
}

// ===== global functions =====

// Returns the maximum size of an OSPF packet sent out an interface with the
// given MTU.
pub(crate) fn max_packet_size(mtu: u16) -> u16 {
    mtu.saturating_sub(IPV4_HDR_LENGTH)
}
