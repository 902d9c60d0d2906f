//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::time::Duration;

use derive_new::new;
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::time::SimTime;

/// Routing table key.
///
/// A source or destination of `0.0.0.0/0` and an unset incoming interface
/// act as wildcards.
#[derive(Clone, Copy, Debug, Eq, Hash, new, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct RtKey {
    pub src: Ipv4Network,
    pub dst: Ipv4Network,
    pub tos: u8,
    pub in_ifindex: Option<u32>,
}

/// Routing table entry.
///
/// The extension is an opaque payload owned by the protocol that installed
/// the route.
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RtEntry<E> {
    pub next_hop: Option<Ipv4Addr>,
    pub out_ifindexes: BTreeSet<u32>,
    pub extension: E,
}

/// Key matching mode used by route removal and retrieval.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum MatchMode {
    // Only the entry whose key is identical to the given one.
    Exact,
    // The single most specific entry covering the given destination.
    Longest,
    // Every entry covered by the given key.
    Wildcard,
}

/// Routing table configuration service.
pub trait RoutingTable<E: Clone> {
    fn route_add(
        &mut self,
        key: RtKey,
        entry: RtEntry<E>,
        timeout: Option<Duration>,
    );

    fn route_remove(
        &mut self,
        key: &RtKey,
        mode: MatchMode,
    ) -> Vec<(RtKey, RtEntry<E>)>;

    fn route_retrieve(
        &self,
        key: &RtKey,
        mode: MatchMode,
    ) -> Vec<(RtKey, RtEntry<E>)>;
}

/// In-memory routing table.
#[derive(Debug)]
pub struct Rib<E> {
    clock: SimTime,
    routes: BTreeMap<RtKey, RibRoute<E>>,
}

#[derive(Debug)]
struct RibRoute<E> {
    entry: RtEntry<E>,
    expiry: Option<SimTime>,
}

// ===== impl RtKey =====

impl RtKey {
    /// Returns a key matching any source, ToS and incoming interface.
    pub fn destination(dst: Ipv4Network) -> RtKey {
        RtKey {
            src: Ipv4Network::new(Ipv4Addr::UNSPECIFIED, 0).unwrap(),
            dst,
            tos: 0,
            in_ifindex: None,
        }
    }

    /// Returns a key for a host route.
    pub fn host(addr: Ipv4Addr) -> RtKey {
        let dst = Ipv4Network::from(addr);
        RtKey::destination(dst)
    }

    // Returns whether this key covers `other`, treating unset fields of this
    // key as wildcards.
    fn covers(&self, other: &RtKey) -> bool {
        prefix_covers(&self.dst, &other.dst)
            && prefix_covers(&self.src, &other.src)
            && (self.tos == 0 || self.tos == other.tos)
            && (self.in_ifindex.is_none()
                || self.in_ifindex == other.in_ifindex)
    }

    // Returns whether a route stored under this key can forward packets
    // described by the given lookup key.
    fn applies_to(&self, lookup: &RtKey) -> bool {
        self.dst.contains(lookup.dst.ip())
            && self.src.contains(lookup.src.ip())
            && (self.tos == 0 || self.tos == lookup.tos)
            && (self.in_ifindex.is_none()
                || self.in_ifindex == lookup.in_ifindex)
    }
}

impl std::fmt::Display for RtKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} from {} tos {}", self.dst, self.src, self.tos)?;
        if let Some(ifindex) = self.in_ifindex {
            write!(f, " in {ifindex}")?;
        }
        Ok(())
    }
}

// ===== impl Rib =====

impl<E> Rib<E>
where
    E: Clone,
{
    /// Advances the table's clock, removing all expired routes.
    pub fn advance(&mut self, now: SimTime) {
        self.clock = now;
        self.routes.retain(|key, route| match route.expiry {
            Some(expiry) if expiry <= now => {
                debug!(%key, "route expired");
                false
            }
            _ => true,
        });
    }

    /// Returns a reference to the route stored under the given key.
    pub fn get(&self, key: &RtKey) -> Option<&RtEntry<E>> {
        self.routes.get(key).map(|route| &route.entry)
    }

    /// Returns an iterator over all routes, ordered by key.
    pub fn iter(&self) -> impl Iterator<Item = (&RtKey, &RtEntry<E>)> {
        self.routes.iter().map(|(key, route)| (key, &route.entry))
    }

    /// Returns the most specific route able to forward to `addr`.
    pub fn lookup(&self, addr: Ipv4Addr) -> Option<&RtEntry<E>> {
        self.longest_match(&RtKey::host(addr))
            .map(|(_, route)| &route.entry)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn longest_match(&self, key: &RtKey) -> Option<(&RtKey, &RibRoute<E>)> {
        self.routes
            .iter()
            .filter(|(route_key, _)| route_key.applies_to(key))
            .max_by_key(|(route_key, _)| {
                (route_key.dst.prefix(), route_key.src.prefix())
            })
    }

    fn matching_keys(&self, key: &RtKey, mode: MatchMode) -> Vec<RtKey> {
        match mode {
            MatchMode::Exact => self
                .routes
                .get_key_value(key)
                .map(|(k, _)| *k)
                .into_iter()
                .collect(),
            MatchMode::Longest => self
                .longest_match(key)
                .map(|(k, _)| *k)
                .into_iter()
                .collect(),
            MatchMode::Wildcard => self
                .routes
                .keys()
                .filter(|route_key| key.covers(route_key))
                .copied()
                .collect(),
        }
    }
}

impl<E> Default for Rib<E> {
    fn default() -> Rib<E> {
        Rib {
            clock: SimTime::ZERO,
            routes: Default::default(),
        }
    }
}

impl<E> RoutingTable<E> for Rib<E>
where
    E: Clone,
{
    fn route_add(
        &mut self,
        key: RtKey,
        entry: RtEntry<E>,
        timeout: Option<Duration>,
    ) {
        let expiry = timeout.map(|timeout| self.clock + timeout);
        self.routes.insert(key, RibRoute { entry, expiry });
    }

    fn route_remove(
        &mut self,
        key: &RtKey,
        mode: MatchMode,
    ) -> Vec<(RtKey, RtEntry<E>)> {
        self.matching_keys(key, mode)
            .into_iter()
            .filter_map(|key| {
                self.routes.remove(&key).map(|route| (key, route.entry))
            })
            .collect()
    }

    fn route_retrieve(
        &self,
        key: &RtKey,
        mode: MatchMode,
    ) -> Vec<(RtKey, RtEntry<E>)> {
        self.matching_keys(key, mode)
            .into_iter()
            .filter_map(|key| {
                self.routes.get(&key).map(|route| (key, route.entry.clone()))
            })
            .collect()
    }
}

// ===== helper functions =====

fn prefix_covers(outer: &Ipv4Network, inner: &Ipv4Network) -> bool {
    outer.prefix() <= inner.prefix() && outer.contains(inner.network())
}
