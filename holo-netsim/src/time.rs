//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::ops::{Add, AddAssign, Sub};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A point in simulated time, measured from the start of the simulation.
///
/// Unlike [`std::time::Instant`], a `SimTime` is a plain value: it can be
/// created from arbitrary offsets, compared, serialized and used as a map
/// key, which is what deterministic discrete-event simulation requires.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(transparent)]
pub struct SimTime(Duration);

// ===== impl SimTime =====

impl SimTime {
    /// The start of the simulation.
    pub const ZERO: SimTime = SimTime(Duration::ZERO);

    pub const fn from_secs(secs: u64) -> SimTime {
        SimTime(Duration::from_secs(secs))
    }

    pub const fn from_millis(millis: u64) -> SimTime {
        SimTime(Duration::from_millis(millis))
    }

    /// Returns the offset of this point in time from the simulation start.
    pub const fn since_start(&self) -> Duration {
        self.0
    }

    /// Returns the number of whole seconds elapsed since the simulation start.
    pub const fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }

    /// Returns the amount of time elapsed from `earlier` to `self`, or zero if
    /// `earlier` is later than `self`.
    pub fn saturating_duration_since(&self, earlier: SimTime) -> Duration {
        self.0.saturating_sub(earlier.0)
    }

    pub fn checked_sub(&self, duration: Duration) -> Option<SimTime> {
        self.0.checked_sub(duration).map(SimTime)
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> SimTime {
        SimTime(self.0.saturating_add(rhs))
    }
}

impl AddAssign<Duration> for SimTime {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 = self.0.saturating_add(rhs);
    }
}

impl Sub<SimTime> for SimTime {
    type Output = Duration;

    fn sub(self, rhs: SimTime) -> Duration {
        self.saturating_duration_since(rhs)
    }
}

impl std::fmt::Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:03}s", self.0.as_secs(), self.0.subsec_millis())
    }
}
