//
// Copyright (c) The lacpd Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;

use generational_arena::{Arena, Index};

use crate::types::{AggregatorHandle, LagId, PortHandle, PortType};

pub type LagIndex = Index;

#[derive(Debug)]
pub struct Lag {
    pub id: LagId,
    pub port_type: PortType,
    // Ordered by handle, per §3 "member list of LogicalPorts ordered by
    // handle".
    pub members: Vec<PortHandle>,
    pub ready: bool,
    pub loop_back: bool,
    pub aggregator: AggregatorHandle,
    /// Highest `actor_port_priority` across current members, derived each
    /// time membership changes (§3 Data Model, SuperPort record).
    pub max_port_priority: u16,
}

#[derive(Debug, Default)]
pub struct Lags {
    arena: Arena<Lag>,
    id_tree: HashMap<(PortType, LagId), LagIndex>,
}

// ===== impl Lag =====

impl Lag {
    fn new(id: LagId, port_type: PortType, first_member: PortHandle) -> Lag {
        Lag {
            id,
            port_type,
            members: vec![first_member],
            ready: false,
            loop_back: false,
            aggregator: AggregatorHandle::NONE,
            max_port_priority: 0,
        }
    }

    pub(crate) fn insert_member(&mut self, handle: PortHandle) {
        if let Err(pos) = self.members.binary_search(&handle) {
            self.members.insert(pos, handle);
        }
    }

    pub(crate) fn remove_member(&mut self, handle: PortHandle) {
        if let Ok(pos) = self.members.binary_search(&handle) {
            self.members.remove(pos);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

// ===== impl Lags =====

impl Lags {
    pub fn get(&self, index: LagIndex) -> Option<&Lag> {
        self.arena.get(index)
    }

    pub fn get_mut(&mut self, index: LagIndex) -> Option<&mut Lag> {
        self.arena.get_mut(index)
    }

    /// Finds an existing LAG of the same port type with an identical
    /// `LAG_Id` (§4.4 step 2).
    pub fn find(&self, port_type: PortType, id: &LagId) -> Option<LagIndex> {
        self.id_tree.get(&(port_type, *id)).copied()
    }

    /// Creates a new LAG with `first_member` as its sole member (§4.4 step
    /// 3). Panics if a LAG with the same `(port_type, id)` already exists;
    /// callers must check `find` first.
    pub fn create(
        &mut self,
        port_type: PortType,
        id: LagId,
        first_member: PortHandle,
    ) -> LagIndex {
        let index = self.arena.insert(Lag::new(id, port_type, first_member));
        if self.id_tree.insert((port_type, id), index).is_some() {
            panic!("LAG with id={id:?} port_type={port_type:?} already exists");
        }
        index
    }

    /// Destroys a LAG once its member list has emptied (§3 invariant, §4.4
    /// step 4). Caller must have already removed the last member.
    pub fn destroy(&mut self, index: LagIndex) {
        if let Some(lag) = self.arena.get(index) {
            debug_assert!(lag.is_empty());
            self.id_tree.remove(&(lag.port_type, lag.id));
        }
        self.arena.remove(index);
    }

    pub fn iter(&self) -> impl Iterator<Item = (LagIndex, &Lag)> {
        self.arena.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PortHandle;

    #[test]
    fn create_find_destroy() {
        let mut lags = Lags::default();
        let id = LagId::default();
        let p1 = PortHandle::new(1, 0);
        let index = lags.create(PortType::Speed1G, id, p1);
        assert_eq!(lags.find(PortType::Speed1G, &id), Some(index));

        let lag = lags.get_mut(index).unwrap();
        lag.remove_member(p1);
        assert!(lag.is_empty());
        lags.destroy(index);
        assert_eq!(lags.find(PortType::Speed1G, &id), None);
    }

    #[test]
    fn members_stay_sorted_by_handle() {
        let mut lag = Lag::new(LagId::default(), PortType::Speed1G, PortHandle::new(5, 0));
        lag.insert_member(PortHandle::new(1, 0));
        lag.insert_member(PortHandle::new(3, 0));
        let indices: Vec<u32> = lag.members.iter().map(|h| h.port_index()).collect();
        assert_eq!(indices, vec![1, 3, 5]);
    }
}
