// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Re-classification of held routes after table changes.
//!
//! The revalidator watches the VRP table. After a change arrives it waits
//! for the table to go quiet for `debounce_ms`, but never longer than
//! `max_delay_ms` after the first change of the batch, then runs one pass
//! over every registered route source against the newest snapshot. The
//! bound on a route's staleness is therefore `max_delay_ms` plus the time
//! of one pass.

use crate::log::vrpdb_log;
use crate::table::{ChangeScope, Snapshot, TableChange, VrpTable};
use crate::MOD_REVALIDATE;
use rpki_common::{lock, read_lock, write_lock};
use rpki_types::Prefix;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use slog::Logger;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::spawn;
use std::time::{Duration, Instant};

/// How often an idle revalidator checks for shutdown.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Anything holding routes whose RPKI state must follow the table.
pub trait RouteSource: Send + Sync {
    fn name(&self) -> String;

    /// Re-classify the routes in `scope` against `snapshot`, returning how
    /// many were looked at.
    fn revalidate(&self, snapshot: &Snapshot, scope: &RevalidationScope)
        -> usize;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevalidationScope {
    All,

    /// Routes covered by any of these VRP prefixes.
    Prefixes(BTreeSet<Prefix>),
}

impl RevalidationScope {
    pub fn affects(&self, prefix: &Prefix) -> bool {
        match self {
            Self::All => true,
            Self::Prefixes(changed) => changed.iter().any(|c| prefix.within(c)),
        }
    }

    fn merge(&mut self, scope: ChangeScope) {
        match scope {
            ChangeScope::Full => *self = Self::All,
            ChangeScope::Prefixes(theirs) => {
                if let Self::Prefixes(mine) = self {
                    mine.extend(theirs)
                }
            }
        }
    }
}

impl From<ChangeScope> for RevalidationScope {
    fn from(scope: ChangeScope) -> Self {
        match scope {
            ChangeScope::Full => Self::All,
            ChangeScope::Prefixes(p) => Self::Prefixes(p),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct RevalidationConfig {
    /// Quiet period after a table change before a pass runs.
    pub debounce_ms: u64,

    /// Upper bound between a table change and the start of the pass that
    /// covers it.
    pub max_delay_ms: u64,
}

impl Default for RevalidationConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            max_delay_ms: 1000,
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema,
)]
pub struct RevalidationStats {
    pub passes: u64,

    /// Table generation the most recent pass ran against.
    pub last_generation: u64,

    pub routes_revalidated: u64,
}

pub struct Revalidator {
    table: Arc<VrpTable>,
    sources: Arc<RwLock<Vec<Arc<dyn RouteSource>>>>,
    stats: Arc<Mutex<RevalidationStats>>,
    shutdown: Arc<AtomicBool>,
}

impl Revalidator {
    pub fn new(
        table: Arc<VrpTable>,
        config: RevalidationConfig,
        log: Logger,
    ) -> Self {
        let (tx, rx) = channel();
        table.watch("revalidator", tx);

        let r = Self {
            table,
            sources: Arc::new(RwLock::new(Vec::new())),
            stats: Arc::new(Mutex::new(RevalidationStats::default())),
            shutdown: Arc::new(AtomicBool::new(false)),
        };

        let runner = Runner {
            table: r.table.clone(),
            sources: r.sources.clone(),
            stats: r.stats.clone(),
            shutdown: r.shutdown.clone(),
            debounce: Duration::from_millis(config.debounce_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            log,
        };
        spawn(move || runner.run(rx));
        r
    }

    pub fn register(&self, source: Arc<dyn RouteSource>) {
        write_lock!(self.sources).push(source);
    }

    pub fn stats(&self) -> RevalidationStats {
        *lock!(self.stats)
    }

    /// True once a pass has run against the table's current generation, or
    /// the table has never changed.
    pub fn caught_up(&self) -> bool {
        let g = self.table.generation();
        g == 0 || self.stats().last_generation >= g
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

struct Runner {
    table: Arc<VrpTable>,
    sources: Arc<RwLock<Vec<Arc<dyn RouteSource>>>>,
    stats: Arc<Mutex<RevalidationStats>>,
    shutdown: Arc<AtomicBool>,
    debounce: Duration,
    max_delay: Duration,
    log: Logger,
}

impl Runner {
    fn run(self, rx: Receiver<TableChange>) {
        vrpdb_log!(self, MOD_REVALIDATE, info, "revalidator started");
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            let first = match rx.recv_timeout(IDLE_POLL) {
                Ok(change) => change,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            let scope = self.batch(first, &rx);
            self.pass(&scope);
        }
        vrpdb_log!(self, MOD_REVALIDATE, info, "revalidator stopped");
    }

    /// Collect changes until the table is quiet or the delay bound is hit.
    fn batch(
        &self,
        first: TableChange,
        rx: &Receiver<TableChange>,
    ) -> RevalidationScope {
        let started = Instant::now();
        let mut scope = RevalidationScope::from(first.scope);
        let mut changes = 1usize;
        loop {
            let elapsed = started.elapsed();
            if elapsed >= self.max_delay {
                break;
            }
            let wait = self.debounce.min(self.max_delay - elapsed);
            match rx.recv_timeout(wait) {
                Ok(change) => {
                    scope.merge(change.scope);
                    changes += 1;
                }
                Err(_) => break,
            }
        }
        vrpdb_log!(self, MOD_REVALIDATE, trace,
            "batched {changes} table changes";
            "full" => scope == RevalidationScope::All
        );
        scope
    }

    fn pass(&self, scope: &RevalidationScope) {
        let snapshot = self.table.snapshot();
        let started = Instant::now();
        let mut total = 0usize;
        for source in read_lock!(self.sources).iter() {
            let n = source.revalidate(&snapshot, scope);
            vrpdb_log!(self, MOD_REVALIDATE, trace,
                "revalidated {n} routes";
                "source" => source.name()
            );
            total += n;
        }
        {
            let mut stats = lock!(self.stats);
            stats.passes += 1;
            stats.last_generation = snapshot.generation;
            stats.routes_revalidated += total as u64;
        }
        vrpdb_log!(self, MOD_REVALIDATE, debug,
            "revalidation pass complete";
            "generation" => snapshot.generation,
            "routes" => total,
            "elapsed_us" => started.elapsed().as_micros() as u64
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use rpki_common::log::test_logger;
    use rpki_common::wait_for_eq;
    use rpki_types::{TableVersion, Vrp};

    #[derive(Default)]
    struct Recorder {
        passes: Mutex<Vec<(u64, RevalidationScope)>>,
    }

    impl RouteSource for Recorder {
        fn name(&self) -> String {
            "recorder".into()
        }

        fn revalidate(
            &self,
            snapshot: &Snapshot,
            scope: &RevalidationScope,
        ) -> usize {
            lock!(self.passes).push((snapshot.generation, scope.clone()));
            1
        }
    }

    fn version(serial: u32) -> TableVersion {
        TableVersion {
            source: "192.0.2.1:323".parse().unwrap(),
            session_id: 1,
            serial,
        }
    }

    #[test]
    fn scope_merging() {
        let a: Prefix = "10.0.0.0/8".parse().unwrap();
        let b: Prefix = "192.0.2.0/24".parse().unwrap();
        let mut s = RevalidationScope::from(ChangeScope::Prefixes(
            BTreeSet::from([a]),
        ));
        assert!(s.affects(&"10.1.0.0/16".parse().unwrap()));
        assert!(!s.affects(&b));
        s.merge(ChangeScope::Prefixes(BTreeSet::from([b])));
        assert!(s.affects(&b));
        s.merge(ChangeScope::Full);
        assert_eq!(s, RevalidationScope::All);
        s.merge(ChangeScope::Prefixes(BTreeSet::new()));
        assert_eq!(s, RevalidationScope::All);
    }

    #[test]
    fn bursts_are_batched() {
        let table = Arc::new(VrpTable::new(test_logger()));
        let r = Revalidator::new(
            table.clone(),
            RevalidationConfig {
                debounce_ms: 200,
                max_delay_ms: 2000,
            },
            test_logger(),
        );
        let rec = Arc::new(Recorder::default());
        r.register(rec.clone());

        let v = Vrp::new("10.0.0.0/8".parse().unwrap(), 24, 1).unwrap();
        table.apply_reset(version(1), []);
        table.apply_reset(version(2), [v]);
        table.apply_reset(version(3), []);

        wait_for_eq!(r.caught_up(), true, 50, 100);
        let passes = lock!(rec.passes).clone();
        assert_eq!(passes, vec![(3, RevalidationScope::All)]);
        assert_eq!(r.stats().passes, 1);
        r.shutdown();
    }

    #[test]
    fn max_delay_bounds_a_busy_table() {
        let table = Arc::new(VrpTable::new(test_logger()));
        let r = Revalidator::new(
            table.clone(),
            RevalidationConfig {
                debounce_ms: 1000,
                max_delay_ms: 300,
            },
            test_logger(),
        );
        let rec = Arc::new(Recorder::default());
        r.register(rec.clone());

        let started = Instant::now();
        table.apply_reset(version(1), []);
        wait_for_eq!(r.stats().passes, 1, 20, 100);
        assert!(started.elapsed() < Duration::from_millis(1000));
        r.shutdown();
    }
}
