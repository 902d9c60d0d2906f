//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::time::SimTime;

/// Opaque handle identifying a scheduled timer.
///
/// Handles are never reused, so cancelling a timer that has already fired (or
/// was already cancelled) is a harmless no-op.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct TimerHandle(u64);

/// Scheduling service used by protocol engines.
///
/// The engine schedules a value-type token and is handed the very same token
/// back (through its own timeout dispatcher) once the deadline is reached.
pub trait TimerService<T> {
    /// Returns the current simulated time.
    fn now(&self) -> SimTime;

    /// Schedules `token` to fire at the given absolute time.
    fn schedule_at(&mut self, at: SimTime, token: T) -> TimerHandle;

    /// Cancels a previously scheduled timer.
    fn cancel(&mut self, handle: TimerHandle);

    /// Schedules `token` to fire after the given delay.
    fn schedule(&mut self, delay: Duration, token: T) -> TimerHandle {
        let at = self.now() + delay;
        self.schedule_at(at, token)
    }
}

/// Ordered queue of pending deadlines.
///
/// Entries sharing the same deadline fire in insertion order, which keeps
/// simulations deterministic.
#[derive(Debug)]
pub struct TimerQueue<T> {
    entries: BTreeMap<(SimTime, u64), T>,
    deadlines: HashMap<u64, SimTime>,
    next_id: u64,
}

// ===== impl TimerHandle =====

impl TimerHandle {
    pub fn get(&self) -> u64 {
        self.0
    }
}

// ===== impl TimerQueue =====

impl<T> TimerQueue<T> {
    /// Inserts a new entry and returns the handle that can be used to cancel
    /// it.
    pub fn insert(&mut self, at: SimTime, token: T) -> TimerHandle {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.insert((at, id), token);
        self.deadlines.insert(id, at);
        TimerHandle(id)
    }

    /// Removes the entry associated to the given handle, returning its token
    /// if it was still pending.
    pub fn cancel(&mut self, handle: TimerHandle) -> Option<T> {
        let at = self.deadlines.remove(&handle.0)?;
        self.entries.remove(&(at, handle.0))
    }

    /// Returns whether the given timer is still pending.
    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.deadlines.contains_key(&handle.0)
    }

    /// Returns the deadline of the given timer, if it's still pending.
    pub fn deadline(&self, handle: TimerHandle) -> Option<SimTime> {
        self.deadlines.get(&handle.0).copied()
    }

    /// Returns the soonest deadline in the queue.
    pub fn next_deadline(&self) -> Option<SimTime> {
        self.entries.keys().next().map(|(at, _)| *at)
    }

    /// Removes and returns the soonest entry.
    pub fn pop_first(&mut self) -> Option<(SimTime, TimerHandle, T)> {
        let ((at, id), token) = self.entries.pop_first()?;
        self.deadlines.remove(&id);
        Some((at, TimerHandle(id), token))
    }

    /// Removes and returns the soonest entry, provided its deadline is not
    /// later than `now`.
    pub fn pop_expired(
        &mut self,
        now: SimTime,
    ) -> Option<(SimTime, TimerHandle, T)> {
        match self.next_deadline() {
            Some(at) if at <= now => self.pop_first(),
            _ => None,
        }
    }

    /// Returns an iterator over all pending entries in firing order.
    pub fn iter(&self) -> impl Iterator<Item = (SimTime, TimerHandle, &T)> {
        self.entries
            .iter()
            .map(|((at, id), token)| (*at, TimerHandle(*id), token))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> TimerQueue<T> {
        TimerQueue {
            entries: Default::default(),
            deadlines: Default::default(),
            next_id: 0,
        }
    }
}
