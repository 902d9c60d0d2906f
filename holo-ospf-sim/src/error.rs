//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use tracing::{error, warn, warn_span};

use crate::collections::{AreaId, InterfaceId, NeighborId};
use crate::interface::ism;
use crate::neighbor::nsm;
use crate::packet::PacketType;
use crate::packet::lsa::LsaHdr;
use crate::tasks::TimerKind;

// OSPF errors.
#[derive(Debug)]
pub enum Error {
    // Object lookup
    AreaIdNotFound(AreaId),
    InterfaceIdNotFound(InterfaceId),
    NeighborIdNotFound(NeighborId),
    StaleTimer(TimerKind),
    // Packet input
    UnknownInterface(u32),
    UnknownNeighbor(u32, Ipv4Addr),
    InterfaceCfgError(u32, Ipv4Addr, PacketType, InterfaceCfgError),
    DbDescReject(Ipv4Addr, nsm::State),
    LsaUnsupportedType(Ipv4Addr, LsaHdr),
    // SPF
    SpfRootNotFound(Ipv4Addr),
    SpfNexthopCalcError(Ipv4Addr),
    // Other
    RouterLsaSelfNotFound(Ipv4Addr),
    IsmUnexpectedEvent(u32, ism::State, ism::Event),
    NsmUnexpectedEvent(Ipv4Addr, nsm::State, nsm::Event),
}

// OSPF interface configuration errors.
#[derive(Debug)]
pub enum InterfaceCfgError {
    AreaIdMismatch(Ipv4Addr, Ipv4Addr),
    HelloIntervalMismatch(u16, u16),
    DeadIntervalMismatch(u32, u32),
    MtuMismatch(u16),
    DuplicateRouterId(Ipv4Addr),
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::AreaIdNotFound(area_id) => {
                warn!(?area_id, "{}", self);
            }
            Error::InterfaceIdNotFound(iface_id) => {
                warn!(?iface_id, "{}", self);
            }
            Error::NeighborIdNotFound(nbr_id) => {
                warn!(?nbr_id, "{}", self);
            }
            Error::StaleTimer(kind) => {
                warn!(?kind, "{}", self);
            }
            Error::UnknownInterface(ifindex) => {
                warn!(%ifindex, "{}", self);
            }
            Error::UnknownNeighbor(ifindex, router_id) => {
                warn!(%ifindex, %router_id, "{}", self);
            }
            Error::InterfaceCfgError(ifindex, source, pkt_type, error) => {
                warn_span!("interface", %ifindex, %source).in_scope(|| {
                    warn_span!("input", %pkt_type).in_scope(|| {
                        error.log();
                    })
                })
            }
            Error::DbDescReject(router_id, state) => {
                warn_span!("neighbor", %router_id).in_scope(|| {
                    warn!(?state, "{}", self);
                })
            }
            Error::LsaUnsupportedType(router_id, lsa_hdr) => {
                warn_span!("neighbor", %router_id).in_scope(|| {
                    let lsa_key = lsa_hdr.key();
                    warn!(%lsa_key, "{}", self);
                })
            }
            Error::SpfRootNotFound(area_id) => {
                error!(%area_id, "{}", self);
            }
            Error::SpfNexthopCalcError(router_id) => {
                error!(%router_id, "{}", self);
            }
            Error::RouterLsaSelfNotFound(area_id) => {
                error!(%area_id, "{}", self);
            }
            Error::IsmUnexpectedEvent(ifindex, state, event) => {
                warn_span!("interface", %ifindex).in_scope(|| {
                    warn_span!("fsm").in_scope(|| {
                        warn!(?state, ?event, "{}", self);
                    })
                })
            }
            Error::NsmUnexpectedEvent(router_id, state, event) => {
                warn_span!("neighbor", %router_id).in_scope(|| {
                    warn_span!("fsm").in_scope(|| {
                        warn!(?state, ?event, "{}", self);
                    })
                })
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::AreaIdNotFound(..) => write!(f, "area ID not found"),
            Error::InterfaceIdNotFound(..) => {
                write!(f, "interface ID not found")
            }
            Error::NeighborIdNotFound(..) => write!(f, "neighbor ID not found"),
            Error::StaleTimer(..) => {
                write!(f, "timer fired for an object that no longer exists")
            }
            Error::UnknownInterface(..) => write!(f, "unknown interface"),
            Error::UnknownNeighbor(..) => write!(f, "unknown neighbor"),
            Error::InterfaceCfgError(_, _, _, error) => error.fmt(f),
            Error::DbDescReject(..) => {
                write!(f, "database description packet rejected")
            }
            Error::LsaUnsupportedType(..) => {
                write!(f, "discarding LSA due to unsupported type")
            }
            Error::SpfRootNotFound(..) => write!(f, "SPF root not found"),
            Error::SpfNexthopCalcError(..) => {
                write!(f, "failed to calculate nexthop address")
            }
            Error::RouterLsaSelfNotFound(..) => {
                write!(f, "self-originated router-LSA not found")
            }
            Error::IsmUnexpectedEvent(..) => write!(f, "unexpected event"),
            Error::NsmUnexpectedEvent(..) => write!(f, "unexpected event"),
        }
    }
}

impl std::error::Error for Error {}

// ===== impl InterfaceCfgError =====

impl InterfaceCfgError {
    pub(crate) fn log(&self) {
        match self {
            InterfaceCfgError::AreaIdMismatch(received, expected) => {
                warn!(%received, %expected, "{}", self);
            }
            InterfaceCfgError::HelloIntervalMismatch(received, expected) => {
                warn!(%received, %expected, "{}", self);
            }
            InterfaceCfgError::DeadIntervalMismatch(received, expected) => {
                warn!(%received, %expected, "{}", self);
            }
            InterfaceCfgError::MtuMismatch(mtu) => {
                warn!(%mtu, "{}", self);
            }
            InterfaceCfgError::DuplicateRouterId(router_id) => {
                warn!(%router_id, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for InterfaceCfgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterfaceCfgError::AreaIdMismatch(..) => {
                write!(f, "area ID mismatch")
            }
            InterfaceCfgError::HelloIntervalMismatch(..) => {
                write!(f, "hello interval mismatch")
            }
            InterfaceCfgError::DeadIntervalMismatch(..) => {
                write!(f, "dead interval mismatch")
            }
            InterfaceCfgError::MtuMismatch(..) => write!(f, "MTU mismatch"),
            InterfaceCfgError::DuplicateRouterId(..) => {
                write!(f, "duplicate router ID")
            }
        }
    }
}

impl std::error::Error for InterfaceCfgError {}
