// Copyright (c) Circle Ledger Contributors
// SPDX-License-Identifier: Apache-2.0

//! Ledger chain syncer: pulls events from the chain and streams them to
//! the ingester without performing any business logic itself.

mod config;
mod events;
mod syncer;

pub use config::*;
pub use events::*;
pub use syncer::*;
