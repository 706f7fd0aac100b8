// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-VRF RPKI state.

use crate::error::Error;
use rpki_common::lock;
use rtr::connection_tcp::RtrConnectionTcp;
use rtr::manager::CacheSet;
use slog::{o, Logger};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use vrpdb::{AnnotatedRib, RevalidationConfig, Revalidator, VrpTable};

pub const DEFAULT_VRF: &str = "default";

/// Everything one VRF needs for origin validation. Instances share nothing,
/// so caches configured in one VRF never feed another VRF's table.
pub struct RpkiInstance {
    pub vrf: String,
    pub table: Arc<VrpTable>,
    pub caches: CacheSet<RtrConnectionTcp>,
    pub revalidator: Revalidator,
    pub rib: Arc<AnnotatedRib>,
}

impl RpkiInstance {
    pub fn new(vrf: &str, log: &Logger) -> Self {
        let log = log.new(o!("vrf" => vrf.to_string()));
        let table = Arc::new(VrpTable::new(log.clone()));
        let caches = CacheSet::new(table.clone(), log.clone());
        let revalidator = Revalidator::new(
            table.clone(),
            RevalidationConfig::default(),
            log.clone(),
        );
        let rib = Arc::new(AnnotatedRib::new(
            format!("{vrf}-adj-rib-in"),
            table.clone(),
            log,
        ));
        revalidator.register(rib.clone());
        Self {
            vrf: vrf.to_string(),
            table,
            caches,
            revalidator,
            rib,
        }
    }

    pub fn shutdown(&self) {
        self.caches.shutdown();
        self.revalidator.shutdown();
    }
}

/// The VRF instances known to the daemon. The default VRF always exists.
pub struct RpkiContext {
    instances: Mutex<BTreeMap<String, Arc<RpkiInstance>>>,
    log: Logger,
}

impl RpkiContext {
    pub fn new(log: Logger) -> Self {
        let default = Arc::new(RpkiInstance::new(DEFAULT_VRF, &log));
        Self {
            instances: Mutex::new(BTreeMap::from([(
                DEFAULT_VRF.to_string(),
                default,
            )])),
            log,
        }
    }

    /// The instance for `vrf`, created on first use.
    pub fn ensure(&self, vrf: Option<&str>) -> Arc<RpkiInstance> {
        let vrf = vrf.unwrap_or(DEFAULT_VRF);
        lock!(self.instances)
            .entry(vrf.to_string())
            .or_insert_with(|| Arc::new(RpkiInstance::new(vrf, &self.log)))
            .clone()
    }

    pub fn get(&self, vrf: Option<&str>) -> Result<Arc<RpkiInstance>, Error> {
        let vrf = vrf.unwrap_or(DEFAULT_VRF);
        lock!(self.instances)
            .get(vrf)
            .cloned()
            .ok_or(Error::NotFound(format!("vrf {vrf}")))
    }

    pub fn vrfs(&self) -> Vec<String> {
        lock!(self.instances).keys().cloned().collect()
    }

    pub fn shutdown(&self) {
        for (_, i) in std::mem::take(&mut *lock!(self.instances)) {
            i.shutdown();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rpki_common::log::test_logger;

    #[test]
    fn vrfs_are_independent() {
        let ctx = RpkiContext::new(test_logger());
        assert_eq!(ctx.vrfs(), vec![DEFAULT_VRF.to_string()]);
        assert!(ctx.get(Some("blue")).is_err());

        let blue = ctx.ensure(Some("blue"));
        let default = ctx.get(None).unwrap();
        assert!(!Arc::ptr_eq(&blue.table, &default.table));
        assert!(Arc::ptr_eq(&ctx.ensure(Some("blue")), &blue));
        assert_eq!(ctx.vrfs().len(), 2);
        ctx.shutdown();
    }
}
