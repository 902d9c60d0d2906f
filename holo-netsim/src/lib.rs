//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Contracts between simulated protocol engines and the discrete-event
//! substrate they run on.
//!
//! A protocol engine never owns a clock, a socket or a kernel routing table.
//! Instead it consumes the services defined here:
//!
//! * [`timer::TimerService`]: one-shot timers firing a caller-defined token;
//! * [`transport::PacketTransport`]: structured packet forwarding;
//! * [`rib::RoutingTable`]: route add/remove/retrieve keyed by destination;
//! * [`discovery::Discovery`] and [`discovery::Identity`]: interface
//!   information and the node's own address.
//!
//! Each service comes with a small in-memory implementation that simulated
//! networks (and unit tests) can build on.

#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod discovery;
pub mod rib;
pub mod time;
pub mod timer;
pub mod transport;

pub use time::SimTime;
