//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod adjacency;
mod flooding;
mod qos;
mod routing;
mod topologies;
