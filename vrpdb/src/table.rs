// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The VRP table.
//!
//! The table is a single current [`Snapshot`] behind an atomic pointer.
//! Writers build the next snapshot off to the side while holding the commit
//! lock and publish it with one pointer swap, so a reader holding a snapshot
//! sees one (source, session, serial) version in full and nothing else.
//! Readers never take the commit lock.

use crate::error::Error;
use crate::log::vrpdb_log;
use crate::trie::VrpTrie;
use crate::MOD_TABLE;
use arc_swap::ArcSwap;
use rpki_common::{lock, read_lock, write_lock};
use rpki_types::{AddressFamily, CacheId, Prefix, TableVersion, Vrp};
use slog::Logger;
use std::collections::BTreeSet;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, RwLock};

/// An immutable point-in-time view of the table.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// The version this snapshot was built from. `None` is the explicit
    /// "no data" state.
    pub version: Option<TableVersion>,

    /// Commit counter. Every reset, delta or clear yields a new generation.
    pub generation: u64,

    trie: VrpTrie,
}

impl Snapshot {
    pub fn has_data(&self) -> bool {
        self.version.is_some()
    }

    pub fn len(&self) -> usize {
        self.trie.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trie.len() == 0
    }

    pub fn count(&self, af: AddressFamily) -> usize {
        match af {
            AddressFamily::Ipv4 => self.trie.v4_len(),
            AddressFamily::Ipv6 => self.trie.v6_len(),
        }
    }

    pub fn contains(&self, vrp: &Vrp) -> bool {
        self.trie.contains(vrp)
    }

    /// All VRPs in order.
    pub fn iter(&self) -> impl Iterator<Item = &Vrp> {
        self.trie.iter()
    }

    pub fn by_origin(&self, origin_as: u32) -> impl Iterator<Item = &Vrp> {
        self.trie.iter().filter(move |v| v.origin_as == origin_as)
    }

    /// VRPs whose prefix covers `prefix`, least specific first. Host bits
    /// of `prefix` are ignored.
    pub fn covering(&self, prefix: &Prefix) -> impl Iterator<Item = &Vrp> {
        let mut p = *prefix;
        p.unset_host_bits();
        self.trie.covering(&p)
    }

    pub fn vrps(&self) -> BTreeSet<Vrp> {
        self.iter().copied().collect()
    }
}

/// An incremental update received from a cache in response to a serial
/// query. `announce` and `withdraw` are net changes against the table at
/// `from_serial`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delta {
    pub source: CacheId,
    pub session_id: u16,
    pub from_serial: u32,
    pub to_serial: u32,
    pub announce: Vec<Vrp>,
    pub withdraw: Vec<Vrp>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeScope {
    /// Every entry may have changed.
    Full,

    /// Only VRPs with these prefixes were announced or withdrawn.
    Prefixes(BTreeSet<Prefix>),
}

/// Sent to table watchers after every commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableChange {
    pub generation: u64,
    pub scope: ChangeScope,
}

#[derive(Clone)]
struct Watcher {
    tag: String,
    sender: Sender<TableChange>,
}

pub struct VrpTable {
    current: ArcSwap<Snapshot>,

    /// Serializes commits. Readers load `current` without it.
    commit: Mutex<()>,

    watchers: RwLock<Vec<Watcher>>,

    log: Logger,
}

impl VrpTable {
    pub fn new(log: Logger) -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::default()),
            commit: Mutex::new(()),
            watchers: RwLock::new(Vec::new()),
            log,
        }
    }

    /// Register a table watcher.
    pub fn watch(&self, tag: impl Into<String>, sender: Sender<TableChange>) {
        write_lock!(self.watchers).push(Watcher {
            tag: tag.into(),
            sender,
        });
    }

    fn notify(&self, change: TableChange) {
        write_lock!(self.watchers).retain(|Watcher { tag, sender }| {
            match sender.send(change.clone()) {
                Ok(()) => true,
                Err(e) => {
                    vrpdb_log!(self, MOD_TABLE, warn,
                        "dropping watcher '{tag}': {e}";
                        "watcher" => tag.clone()
                    );
                    false
                }
            }
        });
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    pub fn version(&self) -> Option<TableVersion> {
        self.current.load().version
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    fn publish(&self, next: Snapshot, scope: ChangeScope) -> Arc<Snapshot> {
        let generation = next.generation;
        let next = Arc::new(next);
        self.current.store(next.clone());
        self.notify(TableChange { generation, scope });
        next
    }

    /// Replace the whole table with `vrps` at `version`.
    pub fn apply_reset<I>(&self, version: TableVersion, vrps: I) -> Arc<Snapshot>
    where
        I: IntoIterator<Item = Vrp>,
    {
        let _guard = lock!(self.commit);
        let generation = self.current.load().generation + 1;
        let mut trie = VrpTrie::default();
        for v in vrps {
            trie.insert(v);
        }
        vrpdb_log!(self, MOD_TABLE, info,
            "reset to {version} with {} vrps", trie.len();
            "generation" => generation
        );
        self.publish(
            Snapshot {
                version: Some(version),
                generation,
                trie,
            },
            ChangeScope::Full,
        )
    }

    /// Apply an incremental update. On error the table is unchanged and the
    /// caller is expected to recover with a reset.
    pub fn apply_delta(&self, delta: &Delta) -> Result<Arc<Snapshot>, Error> {
        let _guard = lock!(self.commit);
        let current = self.current.load_full();
        let version = current.version.ok_or(Error::NoVersion)?;
        if version.source != delta.source {
            return Err(Error::SourceMismatch {
                expected: version.source,
                got: delta.source,
            });
        }
        if version.session_id != delta.session_id {
            return Err(Error::SessionMismatch {
                expected: version.session_id,
                got: delta.session_id,
            });
        }
        if version.serial != delta.from_serial {
            return Err(Error::SerialMismatch {
                expected: version.serial,
                got: delta.from_serial,
            });
        }

        let mut trie = current.trie.clone();
        let mut changed = BTreeSet::new();
        for v in &delta.withdraw {
            if !trie.remove(v) {
                return Err(Error::UnknownWithdrawal(*v));
            }
            changed.insert(v.prefix);
        }
        for v in &delta.announce {
            if !trie.insert(*v) {
                return Err(Error::DuplicateAnnouncement(*v));
            }
            changed.insert(v.prefix);
        }

        let generation = current.generation + 1;
        let version = TableVersion {
            serial: delta.to_serial,
            ..version
        };
        vrpdb_log!(self, MOD_TABLE, debug,
            "delta to {version}: +{} -{}",
            delta.announce.len(),
            delta.withdraw.len();
            "generation" => generation
        );
        Ok(self.publish(
            Snapshot {
                version: Some(version),
                generation,
                trie,
            },
            ChangeScope::Prefixes(changed),
        ))
    }

    /// Transition to the explicit "no data" state. Returns false when the
    /// table was already there, in which case nothing is committed.
    pub fn clear(&self) -> bool {
        let _guard = lock!(self.commit);
        let current = self.current.load();
        if !current.has_data() && current.is_empty() {
            return false;
        }
        let generation = current.generation + 1;
        vrpdb_log!(self, MOD_TABLE, info, "table cleared";
            "generation" => generation
        );
        self.publish(
            Snapshot {
                version: None,
                generation,
                trie: VrpTrie::default(),
            },
            ChangeScope::Full,
        );
        true
    }

    pub fn watcher_tags(&self) -> Vec<String> {
        read_lock!(self.watchers)
            .iter()
            .map(|w| w.tag.clone())
            .collect()
    }
}
