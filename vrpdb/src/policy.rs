// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `match rpki <state>` route-map predicate.

use crate::table::VrpTable;
use crate::validate::classify;
use rpki_types::{Announcement, Prefix, RpkiState};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Returns true when `prefix` originated by `origin_as` classifies as
/// `state` against the latest committed table.
pub fn match_rpki(
    table: &VrpTable,
    state: RpkiState,
    prefix: &Prefix,
    origin_as: u32,
) -> bool {
    classify(&table.snapshot(), prefix, origin_as) == state
}

/// A single `match rpki` clause.
#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema,
)]
pub struct RpkiMatch {
    pub state: RpkiState,
}

impl RpkiMatch {
    pub fn new(state: RpkiState) -> Self {
        Self { state }
    }

    pub fn matches(&self, table: &VrpTable, a: &Announcement) -> bool {
        match_rpki(table, self.state, &a.prefix, a.origin_as)
    }

    /// Evaluate against a state already computed for the route.
    pub fn matches_state(&self, state: RpkiState) -> bool {
        self.state == state
    }
}
