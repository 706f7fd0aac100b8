// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The VRP database.
//!
//! Holds the table of validated ROA payloads received from the active RPKI
//! cache, classifies announcements against it, and keeps route holders
//! consistent with it as it changes. The table is published as immutable
//! snapshots: readers load the current snapshot and never block on a
//! commit in progress.

pub mod error;
pub mod log;
pub mod policy;
pub mod revalidate;
pub mod rib;
pub mod table;
mod trie;
pub mod validate;

pub use policy::{match_rpki, RpkiMatch};
pub use revalidate::{
    RevalidationConfig, RevalidationScope, Revalidator, RouteSource,
};
pub use rib::{AnnotatedRib, ImportPolicy};
pub use table::{ChangeScope, Delta, Snapshot, TableChange, VrpTable};
pub use validate::{classify, classify_announcement};

#[cfg(test)]
mod proptest;

pub const COMPONENT_VRPDB: &str = "vrpdb";
pub const MOD_TABLE: &str = "table";
pub const MOD_REVALIDATE: &str = "revalidate";
pub const MOD_RIB: &str = "rib";
