//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span};

use crate::interface::ism;
use crate::neighbor::nsm;
use crate::packet::Packet;
use crate::packet::lsa::LsaHdr;
use crate::route::RouteRtr;

// OSPF debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    // Instances
    InstanceCreate,
    // Interfaces
    InterfaceCreate(u32),
    InterfaceDelete(u32),
    IsmEvent(u32, &'a ism::State, &'a ism::Event),
    IsmTransition(u32, &'a ism::State, &'a ism::State),
    // Neighbors
    NeighborCreate(Ipv4Addr),
    NeighborDelete(Ipv4Addr),
    NsmEvent(Ipv4Addr, &'a nsm::State, &'a nsm::Event),
    NsmTransition(Ipv4Addr, &'a nsm::State, &'a nsm::State),
    // Network
    PacketRx(u32, &'a Ipv4Addr, &'a Packet),
    PacketTx(u32, &'a Option<Ipv4Addr>, &'a Packet),
    PacketRxIgnore(Ipv4Addr, &'a nsm::State),
    // Flooding
    QuestionableAck(Ipv4Addr, &'a LsaHdr),
    LsaMinArrivalDiscard(Ipv4Addr, &'a LsaHdr),
    LsaSelfOriginated(Ipv4Addr, &'a LsaHdr),
    LsaFloodedBack(Ipv4Addr, &'a LsaHdr),
    LsaSendBack(Ipv4Addr, &'a LsaHdr),
    // LSDB maintenance
    LsaInstall(&'a LsaHdr),
    LsaOriginate(&'a LsaHdr),
    LsaOriginateMinInterval(&'a LsaHdr),
    LsaFlush(&'a LsaHdr, LsaFlushReason),
    LsaRefresh(&'a LsaHdr),
    LsaRemove(&'a LsaHdr),
    LsaSeqNoWrap(&'a LsaHdr),
    // SPF
    SpfStart(Ipv4Addr),
    SpfFinish(Ipv4Addr, usize),
    // Routing
    RouteInstall(&'a Ipv4Addr, &'a RouteRtr),
    RouteUninstall(&'a Ipv4Addr),
    QosRouteQuery(&'a Ipv4Addr, u64, bool),
}

// Reason why a SeqNoMismatch event was generated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum SeqNoMismatchReason {
    InconsistentFlags,
    InconsistentOptions,
    InconsistentSeqNo,
    UnexpectedDbDesc,
}

// Reason why an LSA is being flushed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaFlushReason {
    Expiry,
    PrematureAging,
    SeqNoWrap,
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::InstanceCreate => {
                // Parent span(s): ospf-instance
                debug!("{}", self);
            }
            Debug::InterfaceCreate(ifindex)
            | Debug::InterfaceDelete(ifindex) => {
                // Parent span(s): ospf-instance
                debug_span!("interface", %ifindex).in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::IsmEvent(ifindex, state, event) => {
                // Parent span(s): ospf-instance
                debug_span!("interface", %ifindex).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?state, ?event, "{}", self);
                    })
                })
            }
            Debug::IsmTransition(ifindex, old_state, new_state) => {
                // Parent span(s): ospf-instance
                debug_span!("interface", %ifindex).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?old_state, ?new_state, "{}", self);
                    })
                })
            }
            Debug::NeighborCreate(router_id)
            | Debug::NeighborDelete(router_id) => {
                // Parent span(s): ospf-instance
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::NsmEvent(router_id, state, event) => {
                // Parent span(s): ospf-instance
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?state, ?event, "{}", self);
                    })
                })
            }
            Debug::NsmTransition(router_id, old_state, new_state) => {
                // Parent span(s): ospf-instance
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug_span!("fsm").in_scope(|| {
                        debug!(?old_state, ?new_state, "{}", self);
                    })
                })
            }
            Debug::PacketRx(ifindex, src, packet) => {
                // Parent span(s): ospf-instance
                debug_span!("network").in_scope(|| {
                    debug_span!("input").in_scope(|| {
                        let data =
                            serde_json::to_string(&packet).unwrap_or_default();
                        debug!(%ifindex, %src, %data, "{}", self);
                    })
                })
            }
            Debug::PacketTx(ifindex, dst, packet) => {
                // Parent span(s): ospf-instance
                debug_span!("network").in_scope(|| {
                    debug_span!("output").in_scope(|| {
                        let data =
                            serde_json::to_string(&packet).unwrap_or_default();
                        debug!(%ifindex, ?dst, %data, "{}", self);
                    })
                })
            }
            Debug::PacketRxIgnore(router_id, state) => {
                // Parent span(s): ospf-instance
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!(?state, "{}", self);
                })
            }
            Debug::QuestionableAck(router_id, lsa_hdr)
            | Debug::LsaMinArrivalDiscard(router_id, lsa_hdr)
            | Debug::LsaSelfOriginated(router_id, lsa_hdr)
            | Debug::LsaFloodedBack(router_id, lsa_hdr)
            | Debug::LsaSendBack(router_id, lsa_hdr) => {
                // Parent span(s): ospf-instance
                debug_span!("neighbor", %router_id).in_scope(|| {
                    debug!(?lsa_hdr, "{}", self);
                })
            }
            Debug::LsaInstall(lsa_hdr)
            | Debug::LsaOriginate(lsa_hdr)
            | Debug::LsaOriginateMinInterval(lsa_hdr)
            | Debug::LsaRefresh(lsa_hdr)
            | Debug::LsaRemove(lsa_hdr)
            | Debug::LsaSeqNoWrap(lsa_hdr) => {
                // Parent span(s): ospf-instance
                debug!(?lsa_hdr, "{}", self);
            }
            Debug::LsaFlush(lsa_hdr, reason) => {
                // Parent span(s): ospf-instance
                debug!(?lsa_hdr, %reason, "{}", self);
            }
            Debug::SpfStart(area_id) => {
                // Parent span(s): ospf-instance
                debug_span!("spf", %area_id).in_scope(|| {
                    debug!("{}", self);
                })
            }
            Debug::SpfFinish(area_id, vertices) => {
                // Parent span(s): ospf-instance
                debug_span!("spf", %area_id).in_scope(|| {
                    debug!(%vertices, "{}", self);
                })
            }
            Debug::RouteInstall(destination, route) => {
                // Parent span(s): ospf-instance
                let nexthops = route
                    .nexthops
                    .values()
                    .map(|nexthop| nexthop.addr)
                    .collect::<Vec<_>>();
                let distance = route.distance;
                debug!(%destination, %distance, ?nexthops, "{}", self);
            }
            Debug::RouteUninstall(destination) => {
                // Parent span(s): ospf-instance
                debug!(%destination, "{}", self);
            }
            Debug::QosRouteQuery(destination, bandwidth, found) => {
                // Parent span(s): ospf-instance
                debug!(%destination, %bandwidth, %found, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::InstanceCreate => {
                write!(f, "instance created")
            }
            Debug::InterfaceCreate(..) => {
                write!(f, "interface created")
            }
            Debug::InterfaceDelete(..) => {
                write!(f, "interface deleted")
            }
            Debug::IsmEvent(..) | Debug::NsmEvent(..) => {
                write!(f, "event")
            }
            Debug::IsmTransition(..) | Debug::NsmTransition(..) => {
                write!(f, "state transition")
            }
            Debug::NeighborCreate(..) => {
                write!(f, "neighbor created")
            }
            Debug::NeighborDelete(..) => {
                write!(f, "neighbor deleted")
            }
            Debug::PacketRx(..) | Debug::PacketTx(..) => {
                write!(f, "packet")
            }
            Debug::PacketRxIgnore(..) => {
                write!(
                    f,
                    "ignoring packet received from a non-adjacent neighbor"
                )
            }
            Debug::QuestionableAck(..) => {
                write!(f, "received questionable ack")
            }
            Debug::LsaMinArrivalDiscard(..) => {
                write!(f, "discarding LSA due to the MinLSArrival check")
            }
            Debug::LsaSelfOriginated(..) => {
                write!(f, "received self-originated LSA")
            }
            Debug::LsaFloodedBack(..) => {
                write!(f, "LSA flooded back out the receiving interface")
            }
            Debug::LsaSendBack(..) => {
                write!(f, "sending newer database copy back to the neighbor")
            }
            Debug::LsaInstall(..) => {
                write!(f, "installing LSA")
            }
            Debug::LsaOriginate(..) => {
                write!(f, "originating LSA")
            }
            Debug::LsaOriginateMinInterval(..) => {
                write!(f, "postponing LSA origination due to MinLSInterval")
            }
            Debug::LsaFlush(..) => {
                write!(f, "flushing LSA")
            }
            Debug::LsaRefresh(..) => {
                write!(f, "refreshing LSA")
            }
            Debug::LsaRemove(..) => {
                write!(f, "removing MaxAge LSA from the database")
            }
            Debug::LsaSeqNoWrap(..) => {
                write!(f, "LSA sequence number wrapped")
            }
            Debug::SpfStart(..) => {
                write!(f, "starting SPF calculation")
            }
            Debug::SpfFinish(..) => {
                write!(f, "SPF calculation finished")
            }
            Debug::RouteInstall(..) => {
                write!(f, "installing route")
            }
            Debug::RouteUninstall(..) => {
                write!(f, "uninstalling route")
            }
            Debug::QosRouteQuery(..) => {
                write!(f, "QoS route query")
            }
        }
    }
}

// ===== impl LsaFlushReason =====

impl std::fmt::Display for LsaFlushReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LsaFlushReason::Expiry => {
                write!(f, "expiry")
            }
            LsaFlushReason::PrematureAging => {
                write!(f, "premature aging")
            }
            LsaFlushReason::SeqNoWrap => {
                write!(f, "sequence number wrap")
            }
        }
    }
}
