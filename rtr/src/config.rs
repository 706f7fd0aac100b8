// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::messages::Timing;
use crate::RTR_PORT;
use rpki_types::CacheId;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// A configured cache server, `rpki cache <address> <port> preference <n>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct CacheConfig {
    pub address: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Lower is more preferred.
    pub preference: u8,

    #[serde(default)]
    pub timers: SessionTimers,
}

fn default_port() -> u16 {
    RTR_PORT
}

impl CacheConfig {
    pub fn new(address: IpAddr, port: u16, preference: u8) -> Self {
        Self {
            address,
            port,
            preference,
            timers: SessionTimers::default(),
        }
    }

    pub fn id(&self) -> CacheId {
        CacheId::new(self.address, self.port)
    }
}

/// Timer settings for one transport session. Refresh, retry and expire are
/// the defaults in effect until a version 1 cache supplies its own.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct SessionTimers {
    /// Clock tick.
    pub resolution_ms: u64,

    pub connect_timeout_ms: u64,

    /// First reconnect delay after a failure.
    pub connect_retry_ms: u64,

    /// Ceiling for the reconnect backoff.
    pub max_connect_retry_ms: u64,

    /// Interval between serial queries once synchronized.
    pub refresh_ms: u64,

    /// Interval before re-querying after a failed or empty query.
    pub retry_ms: u64,

    /// Lifetime of data without a successful synchronization.
    pub expire_ms: u64,

    /// How long a query may go unanswered before the connection is
    /// considered dead.
    pub response_timeout_ms: u64,
}

impl Default for SessionTimers {
    fn default() -> Self {
        Self {
            resolution_ms: 100,
            connect_timeout_ms: 2000,
            connect_retry_ms: 1000,
            max_connect_retry_ms: 60_000,
            refresh_ms: 3_600_000,
            retry_ms: 600_000,
            expire_ms: 7_200_000,
            response_timeout_ms: 30_000,
        }
    }
}

impl SessionTimers {
    pub fn resolution(&self) -> Duration {
        Duration::from_millis(self.resolution_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }

    pub fn max_connect_retry(&self) -> Duration {
        Duration::from_millis(self.max_connect_retry_ms)
    }

    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }

    pub fn retry(&self) -> Duration {
        Duration::from_millis(self.retry_ms)
    }

    pub fn expire(&self) -> Duration {
        Duration::from_millis(self.expire_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Take refresh, retry and expire from a cache's End of Data.
    pub fn adopt(&mut self, t: &Timing) {
        self.refresh_ms = u64::from(t.refresh) * 1000;
        self.retry_ms = u64::from(t.retry) * 1000;
        self.expire_ms = u64::from(t.expire) * 1000;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let c: CacheConfig = serde_json::from_str(
            r#"{"address": "192.0.2.1", "preference": 1}"#,
        )
        .unwrap();
        assert_eq!(c.port, RTR_PORT);
        assert_eq!(c.timers, SessionTimers::default());
        assert_eq!(c.id().to_string(), "192.0.2.1:323");
    }

    #[test]
    fn adopt_cache_timing() {
        let mut t = SessionTimers::default();
        t.adopt(&Timing {
            refresh: 60,
            retry: 10,
            expire: 600,
        });
        assert_eq!(t.refresh(), Duration::from_secs(60));
        assert_eq!(t.retry(), Duration::from_secs(10));
        assert_eq!(t.expire(), Duration::from_secs(600));
        assert_eq!(t.connect_retry_ms, 1000);
    }
}
