//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use generational_arena::Index;

use crate::area::Area;
use crate::error::Error;
use crate::interface::Interface;
use crate::neighbor::Neighbor;

pub type ObjectId = u32;

pub type AreaId = ObjectId;
pub type AreaIndex = Index;
pub type InterfaceId = ObjectId;
pub type InterfaceIndex = Index;
pub type NeighborId = ObjectId;
pub type NeighborIndex = Index;

#[derive(Debug)]
pub struct Arena<T>(generational_arena::Arena<T>);

// Secondary index mapping a lookup key to the arena slot of an object.
#[derive(Debug)]
struct KeyIndex<K>(BTreeMap<K, Index>);

#[derive(Debug, Default)]
pub struct Areas {
    arena: Arena<Area>,
    id_tree: KeyIndex<AreaId>,
    area_id_tree: KeyIndex<Ipv4Addr>,
    next_id: AreaId,
}

// Interfaces of an area. The objects themselves live in the instance-wide
// interface arena.
#[derive(Debug, Default)]
pub struct Interfaces {
    id_tree: KeyIndex<InterfaceId>,
    ifindex_tree: KeyIndex<u32>,
    next_id: InterfaceId,
}

// Neighbors of an interface. The objects themselves live in the
// instance-wide neighbor arena.
#[derive(Debug, Default)]
pub struct Neighbors {
    id_tree: KeyIndex<NeighborId>,
    router_id_tree: KeyIndex<Ipv4Addr>,
    addr_tree: KeyIndex<Ipv4Addr>,
    next_id: NeighborId,
}

// ===== impl Arena =====

impl<T> Arena<T> {
    pub(crate) fn iter(&self) -> impl Iterator<Item = (Index, &T)> {
        self.0.iter()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Arena<T> {
        Arena(Default::default())
    }
}

impl<T> std::ops::Index<Index> for Arena<T> {
    type Output = T;

    fn index(&self, index: Index) -> &Self::Output {
        &self.0[index]
    }
}

impl<T> std::ops::IndexMut<Index> for Arena<T> {
    fn index_mut(&mut self, index: Index) -> &mut Self::Output {
        &mut self.0[index]
    }
}

// ===== impl KeyIndex =====

impl<K: Ord> KeyIndex<K> {
    fn get<'a, T>(
        &self,
        arena: &'a Arena<T>,
        key: &K,
    ) -> Option<(Index, &'a T)> {
        let idx = *self.0.get(key)?;
        arena.0.get(idx).map(|obj| (idx, obj))
    }

    fn get_mut<'a, T>(
        &self,
        arena: &'a mut Arena<T>,
        key: &K,
    ) -> Option<(Index, &'a mut T)> {
        let idx = *self.0.get(key)?;
        arena.0.get_mut(idx).map(|obj| (idx, obj))
    }

    fn values(&self) -> impl Iterator<Item = Index> + '_ {
        self.0.values().copied()
    }
}

impl<K> Default for KeyIndex<K> {
    fn default() -> KeyIndex<K> {
        KeyIndex(BTreeMap::new())
    }
}

// ===== impl Areas =====

impl Areas {
    pub(crate) fn insert(
        &mut self,
        area_id: Ipv4Addr,
    ) -> (AreaIndex, &mut Area) {
        self.next_id += 1;
        let area_idx = self.arena.0.insert(Area::new(self.next_id, area_id));
        self.id_tree.0.insert(self.next_id, area_idx);
        self.area_id_tree.0.insert(area_id, area_idx);

        (area_idx, &mut self.arena[area_idx])
    }

    pub(crate) fn get_by_id(
        &self,
        id: AreaId,
    ) -> Result<(AreaIndex, &Area), Error> {
        self.id_tree
            .get(&self.arena, &id)
            .ok_or(Error::AreaIdNotFound(id))
    }

    pub(crate) fn get_mut_by_id(
        &mut self,
        id: AreaId,
    ) -> Result<(AreaIndex, &mut Area), Error> {
        self.id_tree
            .get_mut(&mut self.arena, &id)
            .ok_or(Error::AreaIdNotFound(id))
    }

    pub(crate) fn get_by_area_id(
        &self,
        area_id: Ipv4Addr,
    ) -> Option<(AreaIndex, &Area)> {
        self.area_id_tree.get(&self.arena, &area_id)
    }

    // Returns the area hosting the interface with the given ifindex.
    pub(crate) fn get_by_ifindex(
        &self,
        ifindex: u32,
    ) -> Option<(AreaIndex, &Area)> {
        self.area_id_tree
            .values()
            .map(|area_idx| (area_idx, &self.arena[area_idx]))
            .find(|(_, area)| {
                area.interfaces.ifindex_tree.0.contains_key(&ifindex)
            })
    }

    // Areas are visited in ascending order of their area IDs.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Area> {
        self.area_id_tree
            .values()
            .map(|area_idx| &self.arena[area_idx])
    }

    pub(crate) fn indexes(&self) -> impl Iterator<Item = AreaIndex> + '_ {
        self.area_id_tree.values()
    }
}

impl std::ops::Index<AreaIndex> for Areas {
    type Output = Area;

    fn index(&self, index: AreaIndex) -> &Self::Output {
        &self.arena[index]
    }
}

impl std::ops::IndexMut<AreaIndex> for Areas {
    fn index_mut(&mut self, index: AreaIndex) -> &mut Self::Output {
        &mut self.arena[index]
    }
}

// ===== impl Interfaces =====

impl Interfaces {
    pub(crate) fn insert<'a>(
        &mut self,
        arena: &'a mut Arena<Interface>,
        ifindex: u32,
    ) -> (InterfaceIndex, &'a mut Interface) {
        self.next_id += 1;
        let iface_idx = arena.0.insert(Interface::new(self.next_id, ifindex));
        self.id_tree.0.insert(self.next_id, iface_idx);
        self.ifindex_tree.0.insert(ifindex, iface_idx);

        (iface_idx, &mut arena[iface_idx])
    }

    pub(crate) fn delete(
        &mut self,
        arena: &mut Arena<Interface>,
        iface_idx: InterfaceIndex,
    ) {
        if let Some(iface) = arena.0.remove(iface_idx) {
            self.id_tree.0.remove(&iface.id);
            self.ifindex_tree.0.remove(&iface.ifindex);
        }
    }

    pub(crate) fn get_mut_by_id<'a>(
        &self,
        arena: &'a mut Arena<Interface>,
        id: InterfaceId,
    ) -> Result<(InterfaceIndex, &'a mut Interface), Error> {
        self.id_tree
            .get_mut(arena, &id)
            .ok_or(Error::InterfaceIdNotFound(id))
    }

    pub(crate) fn get_by_ifindex<'a>(
        &self,
        arena: &'a Arena<Interface>,
        ifindex: u32,
    ) -> Option<(InterfaceIndex, &'a Interface)> {
        self.ifindex_tree.get(arena, &ifindex)
    }

    // Interfaces are visited in ascending order of their ifindexes.
    pub(crate) fn iter<'a>(
        &'a self,
        arena: &'a Arena<Interface>,
    ) -> impl Iterator<Item = &'a Interface> + 'a {
        self.ifindex_tree.values().map(|iface_idx| &arena[iface_idx])
    }

    pub(crate) fn indexes(&self) -> impl Iterator<Item = InterfaceIndex> + '_ {
        self.ifindex_tree.values()
    }
}

// ===== impl Neighbors =====

impl Neighbors {
    pub(crate) fn insert<'a>(
        &mut self,
        arena: &'a mut Arena<Neighbor>,
        router_id: Ipv4Addr,
        src: Ipv4Addr,
    ) -> (NeighborIndex, &'a mut Neighbor) {
        self.next_id += 1;
        let nbr = Neighbor::new(self.next_id, router_id, src);
        let nbr_idx = arena.0.insert(nbr);
        self.id_tree.0.insert(self.next_id, nbr_idx);
        self.router_id_tree.0.insert(router_id, nbr_idx);
        self.addr_tree.0.insert(src, nbr_idx);

        (nbr_idx, &mut arena[nbr_idx])
    }

    pub(crate) fn delete(
        &mut self,
        arena: &mut Arena<Neighbor>,
        nbr_idx: NeighborIndex,
    ) -> Option<Neighbor> {
        let nbr = arena.0.remove(nbr_idx)?;
        self.id_tree.0.remove(&nbr.id);
        self.router_id_tree.0.remove(&nbr.router_id);
        self.addr_tree.0.remove(&nbr.src);
        Some(nbr)
    }

    pub(crate) fn get_mut_by_id<'a>(
        &self,
        arena: &'a mut Arena<Neighbor>,
        id: NeighborId,
    ) -> Result<(NeighborIndex, &'a mut Neighbor), Error> {
        self.id_tree
            .get_mut(arena, &id)
            .ok_or(Error::NeighborIdNotFound(id))
    }

    pub(crate) fn get_by_router_id<'a>(
        &self,
        arena: &'a Arena<Neighbor>,
        router_id: Ipv4Addr,
    ) -> Option<(NeighborIndex, &'a Neighbor)> {
        self.router_id_tree.get(arena, &router_id)
    }

    pub(crate) fn get_by_addr<'a>(
        &self,
        arena: &'a Arena<Neighbor>,
        addr: Ipv4Addr,
    ) -> Option<(NeighborIndex, &'a Neighbor)> {
        self.addr_tree.get(arena, &addr)
    }

    // Neighbors are visited in ascending order of their Router IDs.
    pub(crate) fn iter<'a>(
        &'a self,
        arena: &'a Arena<Neighbor>,
    ) -> impl Iterator<Item = &'a Neighbor> + 'a {
        self.router_id_tree.values().map(|nbr_idx| &arena[nbr_idx])
    }

    pub(crate) fn indexes(&self) -> impl Iterator<Item = NeighborIndex> + '_ {
        self.router_id_tree.values()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.id_tree.0.is_empty()
    }
}
