// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Proposal coordination: the state machine, the local shadow store used
//! during outages, and the resilient client tying them together.

mod client;
mod coordinator;
mod shadow;

pub use client::*;
pub use coordinator::*;
pub use shadow::*;
