//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use bitflags::bitflags;
use derive_new::new;
use enum_as_inner::EnumAsInner;
use holo_netsim::SimTime;
use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::lsdb::LSA_MAX_AGE;
use crate::packet::Options;

// Type-of-Service value whose metric carries the encoded link bandwidth.
pub const LSA_TOS_BANDWIDTH: u8 = 0x08;

// Width of the mantissa of an encoded bandwidth.
const BANDWIDTH_MANTISSA_BITS: u16 = 13;
const BANDWIDTH_MANTISSA_MAX: u64 = (1 << BANDWIDTH_MANTISSA_BITS) - 1;
const BANDWIDTH_EXPONENT_MAX: u16 = 7;

// OSPF LSA type.
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Hash, Ord, PartialEq)]
#[derive(PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum LsaType {
    Router = 1,
    Network = 2,
    Summary = 3,
    SummaryAsbr = 4,
    AsExternal = 5,
}

// LSA identity within a database.
#[derive(Clone, Copy, Debug, Eq, Hash, new, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct LsaKey {
    pub lsa_type: LsaType,
    pub adv_rtr: Ipv4Addr,
    pub lsa_id: Ipv4Addr,
}

//
// OSPF LSA header.
//
// Nominal encoded length: 20 bytes.
//
#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaHdr {
    pub age: u16,
    pub options: Options,
    pub lsa_type: LsaType,
    pub lsa_id: Ipv4Addr,
    pub adv_rtr: Ipv4Addr,
    pub seq_no: u32,
    pub length: u16,
}

// OSPF LSA.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Lsa {
    // LSA header.
    pub hdr: LsaHdr,
    // LSA body.
    pub body: LsaBody,
    // Time the LSA age was last synchronized with the header's age field.
    //
    // `None` for LSAs in transit, whose age is frozen in the header.
    #[serde(skip)]
    pub base_time: Option<SimTime>,
}

#[derive(Clone, Debug, EnumAsInner, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum LsaBody {
    Router(LsaRouter),
    // Body of an LSA type this router doesn't process.
    Unsupported,
}

//
// OSPF Router-LSA.
//
// Nominal encoded length: 4 bytes plus 12 bytes per link and 4 bytes per
// additional ToS metric.
//
#[derive(Clone, Debug, Default, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaRouter {
    pub flags: LsaRouterFlags,
    pub links: Vec<LsaRouterLink>,
}

// OSPF Router-LSA flags.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct LsaRouterFlags: u8 {
        const B = 0x01;
        const E = 0x02;
        const V = 0x04;
    }
}

#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Hash, Ord, PartialEq)]
#[derive(PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum LsaRouterLinkType {
    PointToPoint = 1,
    TransitNetwork = 2,
    StubNetwork = 3,
    VirtualLink = 4,
}

#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaRouterLink {
    pub link_type: LsaRouterLinkType,
    pub link_id: Ipv4Addr,
    pub link_data: Ipv4Addr,
    pub metric: u16,
    #[new(default)]
    pub tos: Vec<LsaRouterLinkTos>,
}

#[derive(Clone, Copy, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct LsaRouterLinkTos {
    pub tos: u8,
    pub metric: u16,
}

// ===== impl LsaType =====

impl std::fmt::Display for LsaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LsaType::Router => write!(f, "router"),
            LsaType::Network => write!(f, "network"),
            LsaType::Summary => write!(f, "summary"),
            LsaType::SummaryAsbr => write!(f, "summary-asbr"),
            LsaType::AsExternal => write!(f, "as-external"),
        }
    }
}

// ===== impl LsaKey =====

impl std::fmt::Display for LsaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "type {} adv-rtr {} lsa-id {}",
            self.lsa_type, self.adv_rtr, self.lsa_id
        )
    }
}

// ===== impl LsaHdr =====

impl LsaHdr {
    pub const LENGTH: u16 = 20;

    pub fn key(&self) -> LsaKey {
        LsaKey::new(self.lsa_type, self.adv_rtr, self.lsa_id)
    }

    pub fn is_maxage(&self) -> bool {
        self.age == LSA_MAX_AGE
    }
}

// ===== impl Lsa =====

impl Lsa {
    pub fn new(
        age: u16,
        options: Options,
        lsa_type: LsaType,
        lsa_id: Ipv4Addr,
        adv_rtr: Ipv4Addr,
        seq_no: u32,
        body: LsaBody,
    ) -> Self {
        let length = LsaHdr::LENGTH + body.length();
        let hdr = LsaHdr::new(
            age, options, lsa_type, lsa_id, adv_rtr, seq_no, length,
        );
        Lsa {
            hdr,
            body,
            base_time: None,
        }
    }

    // Returns the LSA's current age.
    pub fn age(&self, now: SimTime) -> u16 {
        match self.base_time {
            Some(base_time) => {
                let elapsed = now.saturating_duration_since(base_time);
                let age = u64::from(self.hdr.age) + elapsed.as_secs();
                std::cmp::min(age, u64::from(LSA_MAX_AGE)) as u16
            }
            None => self.hdr.age,
        }
    }

    // Returns whether the LSA's current age has reached MaxAge.
    pub fn is_maxage(&self, now: SimTime) -> bool {
        self.age(now) == LSA_MAX_AGE
    }

    // Returns a copy of the LSA header with its age field updated.
    pub fn hdr_at(&self, now: SimTime) -> LsaHdr {
        let mut hdr = self.hdr;
        hdr.age = self.age(now);
        hdr
    }

    // Anchors the LSA's age to the given point in time.
    //
    // From now on the age grows by one unit per elapsed second.
    pub fn set_base_time(&mut self, now: SimTime) {
        self.base_time = Some(now);
    }

    // Sets the LSA age, freezing it until a new base time is set.
    pub fn set_age(&mut self, age: u16) {
        self.hdr.age = age;
        self.base_time = None;
    }

    // Premature aging.
    pub fn set_maxage(&mut self) {
        self.set_age(LSA_MAX_AGE);
    }

    // Returns the time at which the LSA will reach MaxAge, or `None` if its
    // age is frozen.
    pub fn maxage_deadline(&self) -> Option<SimTime> {
        let base_time = self.base_time?;
        let remaining = LSA_MAX_AGE.saturating_sub(self.hdr.age);
        Some(base_time + std::time::Duration::from_secs(remaining.into()))
    }
}

// ===== impl LsaBody =====

impl LsaBody {
    pub fn length(&self) -> u16 {
        match self {
            LsaBody::Router(lsa) => lsa.length(),
            LsaBody::Unsupported => 0,
        }
    }
}

// ===== impl LsaRouter =====

impl LsaRouter {
    pub const BASE_LENGTH: u16 = 4;
    pub const LINK_LENGTH: u16 = 12;
    pub const TOS_LENGTH: u16 = 4;

    pub fn length(&self) -> u16 {
        Self::BASE_LENGTH
            + self
                .links
                .iter()
                .map(|link| {
                    Self::LINK_LENGTH + Self::TOS_LENGTH * link.tos.len() as u16
                })
                .sum::<u16>()
    }

    // Returns an iterator over the point-to-point links pointing to the given
    // router.
    pub fn p2p_links_to(
        &self,
        router_id: Ipv4Addr,
    ) -> impl Iterator<Item = &LsaRouterLink> + '_ {
        self.links.iter().filter(move |link| {
            link.link_type == LsaRouterLinkType::PointToPoint
                && link.link_id == router_id
        })
    }
}

// ===== impl LsaRouterLink =====

impl LsaRouterLink {
    // Returns the link bandwidth (bits per second) advertised in the
    // bandwidth ToS metric, if any.
    pub fn bandwidth(&self) -> Option<u64> {
        self.tos
            .iter()
            .find(|tos| tos.tos == LSA_TOS_BANDWIDTH)
            .map(|tos| bandwidth_decode(tos.metric))
    }
}

// ===== global functions =====

// Encodes a bandwidth value into a 16-bit metric.
//
// The encoded value is made of a 3-bit exponent followed by a 13-bit
// mantissa, and stands for `8 * mantissa * 8^exponent`. The smallest exponent
// whose mantissa fits is selected, truncating the remainder. Values too large
// for the encoding saturate.
pub fn bandwidth_encode(value: u64) -> u16 {
    let mut mantissa = value / 8;
    let mut exponent = 0;
    while mantissa > BANDWIDTH_MANTISSA_MAX && exponent < BANDWIDTH_EXPONENT_MAX
    {
        mantissa /= 8;
        exponent += 1;
    }
    let mantissa = std::cmp::min(mantissa, BANDWIDTH_MANTISSA_MAX) as u16;
    (exponent << BANDWIDTH_MANTISSA_BITS) | mantissa
}

// Decodes a 16-bit bandwidth metric.
pub fn bandwidth_decode(metric: u16) -> u64 {
    let exponent = u32::from(metric >> BANDWIDTH_MANTISSA_BITS);
    let mantissa = u64::from(metric) & BANDWIDTH_MANTISSA_MAX;
    8 * mantissa * 8u64.pow(exponent)
}

// Rounds a bandwidth value down to the closest value representable by the
// metric encoding.
pub fn bandwidth_quantize(value: u64) -> u64 {
    bandwidth_decode(bandwidth_encode(value))
}
