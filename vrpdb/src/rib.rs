// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An Adj-RIB-In annotated with RPKI state, filtered by an import policy.
//!
//! Every received announcement is kept along with its current RPKI state.
//! The accepted view is the subset the import policy admits. Since the
//! revalidator updates states as the VRP table moves, routes enter and
//! leave the accepted view without any new BGP update arriving.

use crate::log::vrpdb_log;
use crate::policy::RpkiMatch;
use crate::revalidate::{RevalidationScope, RouteSource};
use crate::table::{Snapshot, VrpTable};
use crate::validate::classify_announcement;
use crate::MOD_RIB;
use rpki_common::{lock, read_lock, write_lock};
use rpki_types::{Announcement, RouteRpkiInfo, RpkiState};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use slog::Logger;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

/// Inbound route-map applied to the annotated table. `MatchRpki` behaves
/// like a route-map of permit clauses each holding one `match rpki`, with
/// the implicit deny at the end.
#[derive(
    Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ImportPolicy {
    #[default]
    NoFiltering,
    MatchRpki(Vec<RpkiMatch>),
}

impl ImportPolicy {
    pub fn admits(&self, state: RpkiState) -> bool {
        match self {
            Self::NoFiltering => true,
            Self::MatchRpki(clauses) => {
                clauses.iter().any(|c| c.matches_state(state))
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RibEntry {
    state: RpkiState,

    /// Table generation `state` was computed against.
    generation: u64,
}

pub struct AnnotatedRib {
    name: String,
    table: Arc<VrpTable>,
    routes: Mutex<BTreeMap<Announcement, RibEntry>>,
    policy: RwLock<ImportPolicy>,
    log: Logger,
}

impl AnnotatedRib {
    pub fn new(name: impl Into<String>, table: Arc<VrpTable>, log: Logger) -> Self {
        Self {
            name: name.into(),
            table,
            routes: Mutex::new(BTreeMap::new()),
            policy: RwLock::new(ImportPolicy::default()),
            log,
        }
    }

    /// Add or refresh a route, classifying it against the current table.
    pub fn announce(&self, a: Announcement) -> RouteRpkiInfo {
        let a = Announcement::new(a.prefix, a.origin_as);
        // The snapshot is loaded under the routes lock. A pass against a
        // newer commit then either runs after the insert and sees an older
        // generation, or finished before the load and was already current.
        let state = {
            let mut routes = lock!(self.routes);
            let snapshot = self.table.snapshot();
            let state = classify_announcement(&snapshot, &a);
            routes.insert(
                a,
                RibEntry {
                    state,
                    generation: snapshot.generation,
                },
            );
            state
        };
        vrpdb_log!(self, MOD_RIB, debug, "announce {a} is {state}";
            "rib" => self.name.clone()
        );
        RouteRpkiInfo {
            announcement: a,
            state,
            accepted: read_lock!(self.policy).admits(state),
        }
    }

    pub fn withdraw(&self, a: &Announcement) -> bool {
        let a = Announcement::new(a.prefix, a.origin_as);
        lock!(self.routes).remove(&a).is_some()
    }

    pub fn state(&self, a: &Announcement) -> Option<RpkiState> {
        lock!(self.routes).get(a).map(|e| e.state)
    }

    /// All held routes, optionally only those in `filter` state.
    pub fn routes(&self, filter: Option<RpkiState>) -> Vec<RouteRpkiInfo> {
        let policy = read_lock!(self.policy).clone();
        lock!(self.routes)
            .iter()
            .filter(|(_, e)| filter.map_or(true, |s| s == e.state))
            .map(|(a, e)| RouteRpkiInfo {
                announcement: *a,
                state: e.state,
                accepted: policy.admits(e.state),
            })
            .collect()
    }

    /// Routes the import policy currently admits.
    pub fn accepted(&self) -> Vec<Announcement> {
        let policy = read_lock!(self.policy).clone();
        lock!(self.routes)
            .iter()
            .filter(|(_, e)| policy.admits(e.state))
            .map(|(a, _)| *a)
            .collect()
    }

    pub fn set_policy(&self, policy: ImportPolicy) {
        vrpdb_log!(self, MOD_RIB, info, "import policy set to {policy:?}";
            "rib" => self.name.clone()
        );
        *write_lock!(self.policy) = policy;
    }

    pub fn policy(&self) -> ImportPolicy {
        read_lock!(self.policy).clone()
    }
}

impl RouteSource for AnnotatedRib {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn revalidate(
        &self,
        snapshot: &Snapshot,
        scope: &RevalidationScope,
    ) -> usize {
        let mut n = 0;
        let mut changed = 0;
        for (a, e) in lock!(self.routes).iter_mut() {
            // A route announced after this snapshot was taken already
            // carries a newer result.
            if e.generation > snapshot.generation || !scope.affects(&a.prefix)
            {
                continue;
            }
            let state = classify_announcement(snapshot, a);
            if state != e.state {
                changed += 1;
            }
            *e = RibEntry {
                state,
                generation: snapshot.generation,
            };
            n += 1;
        }
        if changed > 0 {
            vrpdb_log!(self, MOD_RIB, info,
                "{changed} routes changed rpki state";
                "rib" => self.name.clone(),
                "generation" => snapshot.generation
            );
        }
        n
    }
}
