// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The set of configured caches.
//!
//! Every configured cache runs its own session. The manager is the only
//! writer of the VRP table. The active source is the most preferred cache
//! that is up and holds a complete data set; ties go to the cache configured
//! first. A more preferred cache that has connected but not yet synchronized
//! does not displace the active source, so the table moves from one source
//! to the next in a single reset and never passes through "no data" while
//! some cache still has data. Data from caches that are not the active
//! source is held aside so that failing over to them is a single reset.

use crate::config::CacheConfig;
use crate::connection::RtrConnection;
use crate::error::Error;
use crate::introspect;
use crate::log::manager_log;
use crate::session::{
    start_session, CacheEvent, CacheEventKind, SessionHandle, SourceData,
};
use crate::IO_TIMEOUT;
use rpki_common::lock;
use rpki_types::{
    CacheConnectionReport, CacheId, CacheServerStatus, CacheState,
    TableVersion,
};
use slog::Logger;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::spawn;
use vrpdb::VrpTable;

const UNIT_CACHE_SET: &str = "cache_set";

struct Entry {
    config: CacheConfig,

    /// Position in configuration order, for preference ties.
    order: u64,

    handle: SessionHandle,
    state: CacheState,

    /// Last complete data set from this cache, while it is up.
    data: Option<Arc<SourceData>>,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<CacheId, Entry>,
    next_order: u64,
    active: Option<CacheId>,
}

/// State shared by the configuration interface and the event thread. All
/// table commits happen while holding `inner`.
struct Core {
    table: Arc<VrpTable>,
    inner: Mutex<Inner>,
    log: Logger,
}

pub struct CacheSet<Cnx: RtrConnection> {
    core: Arc<Core>,
    cache_tx: Sender<CacheEvent>,
    next_instance: AtomicU64,
    shutdown: Arc<AtomicBool>,
    log: Logger,
    _cnx: PhantomData<fn() -> Cnx>,
}

impl<Cnx: RtrConnection> CacheSet<Cnx> {
    pub fn new(table: Arc<VrpTable>, log: Logger) -> Self {
        let (cache_tx, cache_rx) = channel();
        let core = Arc::new(Core {
            table,
            inner: Mutex::new(Inner::default()),
            log: log.clone(),
        });
        let shutdown = Arc::new(AtomicBool::new(false));
        {
            let core = core.clone();
            let shutdown = shutdown.clone();
            spawn(move || core.run(cache_rx, shutdown));
        }
        Self {
            core,
            cache_tx,
            next_instance: AtomicU64::new(1),
            shutdown,
            log,
            _cnx: PhantomData,
        }
    }

    pub fn table(&self) -> &Arc<VrpTable> {
        &self.core.table
    }

    /// Add a cache, or change the preference of one already configured.
    pub fn add(&self, config: CacheConfig) -> Result<(), Error> {
        let id = config.id();
        let mut inner = lock!(self.core.inner);
        if let Some(e) = inner.entries.get_mut(&id) {
            if e.config.preference == config.preference {
                return Err(Error::Duplicate(id, config.preference));
            }
            manager_log!(self, info, "cache {id} preference {} -> {}",
                e.config.preference, config.preference
            );
            e.config.preference = config.preference;
            self.core.reconcile(&mut inner);
            return Ok(());
        }

        let instance = self.next_instance.fetch_add(1, Ordering::Relaxed);
        let handle = start_session::<Cnx>(
            config.clone(),
            instance,
            self.cache_tx.clone(),
            self.log.clone(),
        );
        let order = inner.next_order;
        inner.next_order += 1;
        manager_log!(self, info, "cache {id} added";
            "preference" => config.preference,
            "instance" => instance
        );
        inner.entries.insert(
            id,
            Entry {
                config,
                order,
                handle,
                state: CacheState::Down,
                data: None,
            },
        );
        Ok(())
    }

    /// Remove a cache. The preference must match the configured one.
    pub fn remove(&self, id: CacheId, preference: u8) -> Result<(), Error> {
        let mut inner = lock!(self.core.inner);
        match inner.entries.get(&id) {
            Some(e) if e.config.preference == preference => {}
            _ => return Err(Error::NotFound { cache: id, preference }),
        }
        if let Some(e) = inner.entries.remove(&id) {
            e.handle.stop();
        }
        manager_log!(self, info, "cache {id} removed");
        self.core.reconcile(&mut inner);
        Ok(())
    }

    pub fn active_source(&self) -> Option<CacheId> {
        lock!(self.core.inner).active
    }

    /// Per cache detail in preference order.
    pub fn connection_status(&self) -> Vec<CacheServerStatus> {
        let inner = lock!(self.core.inner);
        let mut entries: Vec<&Entry> = inner.entries.values().collect();
        entries.sort_by_key(|e| (e.config.preference, e.order));
        entries
            .into_iter()
            .map(|e| {
                let info = e.handle.info();
                CacheServerStatus {
                    cache: e.config.id(),
                    preference: e.config.preference,
                    state: e.state,
                    active: inner.active == Some(e.config.id()),
                    protocol_version: info.protocol_version,
                    session_id: e.data.as_ref().map(|d| d.session_id),
                    serial: e.data.as_ref().map(|d| d.serial),
                    vrp_count: e.data.as_ref().map_or(0, |d| d.vrps.len()),
                    last_sync: e.data.as_ref().map(|d| d.synced_at),
                }
            })
            .collect()
    }

    pub fn connection_report(&self) -> CacheConnectionReport {
        introspect::connection_report(self.connection_status())
    }

    pub fn caches(&self) -> Vec<CacheConfig> {
        lock!(self.core.inner)
            .entries
            .values()
            .map(|e| e.config.clone())
            .collect()
    }

    /// Stop every session and clear the table.
    pub fn shutdown(&self) {
        let mut inner = lock!(self.core.inner);
        for (_, e) in std::mem::take(&mut inner.entries) {
            e.handle.stop();
        }
        inner.active = None;
        self.core.table.clear();
        self.shutdown.store(true, Ordering::Release);
        manager_log!(self, info, "cache set shut down");
    }
}

impl Core {
    fn run(&self, rx: Receiver<CacheEvent>, shutdown: Arc<AtomicBool>) {
        loop {
            if shutdown.load(Ordering::Acquire) {
                break;
            }
            match rx.recv_timeout(IO_TIMEOUT) {
                Ok(event) => self.handle(event),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        manager_log!(self, debug, "event loop exited");
    }

    fn handle(&self, event: CacheEvent) {
        let mut inner = lock!(self.inner);
        let id = event.id;
        let active = inner.active == Some(id);
        let Some(entry) = inner.entries.get_mut(&id) else {
            manager_log!(self, debug, "event for unconfigured cache {id}");
            return;
        };
        if entry.handle.instance != event.instance {
            manager_log!(self, debug, "stale event for cache {id}";
                "instance" => event.instance
            );
            return;
        }

        match event.kind {
            CacheEventKind::State(state) => {
                manager_log!(self, info, "cache {id} is {state}");
                entry.state = state;
                if !state.is_up() {
                    entry.data = None;
                }
            }
            CacheEventKind::Reset(data) => {
                entry.data = Some(data.clone());
                if active {
                    self.reset_from(id, &data);
                }
            }
            CacheEventKind::Delta { data, delta } => {
                entry.data = Some(data.clone());
                if active {
                    if let Err(e) = self.table.apply_delta(&delta) {
                        manager_log!(self, warn,
                            "delta from {id} rejected, resetting: {e}"
                        );
                        self.reset_from(id, &data);
                    }
                }
            }
            CacheEventKind::Expired => {
                entry.data = None;
            }
        }
        self.reconcile(&mut inner);
    }

    fn reset_from(&self, id: CacheId, data: &SourceData) {
        self.table.apply_reset(
            TableVersion {
                source: id,
                session_id: data.session_id,
                serial: data.serial,
            },
            data.vrps.iter().copied(),
        );
    }

    /// Re-run source selection and move the table to the selected source.
    fn reconcile(&self, inner: &mut Inner) {
        let best = inner
            .entries
            .iter()
            .filter_map(|(id, e)| match &e.data {
                Some(data) if e.state.is_up() => Some((id, e, data)),
                _ => None,
            })
            .min_by_key(|(_, e, _)| (e.config.preference, e.order))
            .map(|(id, _, data)| (*id, data.clone()));
        let selected = best.as_ref().map(|(id, _)| *id);
        if selected == inner.active {
            return;
        }
        manager_log!(self, info, "active source {:?} -> {:?}",
            inner.active, selected
        );
        inner.active = selected;
        match best {
            Some((id, data)) => self.reset_from(id, &data),
            None => {
                self.table.clear();
            }
        }
    }
}
