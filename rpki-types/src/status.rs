// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::{Announcement, Prefix, RpkiState, Vrp};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// Error text reported when no cache server is usable.
pub const NO_CONNECTION: &str = "No connection to RPKI cache server.";

/// Identifies a configured cache server. Two configurations with the same
/// address and port are the same server.
#[derive(
    Debug,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    Hash,
    Eq,
    PartialEq,
    PartialOrd,
    Ord,
    JsonSchema,
)]
pub struct CacheId {
    pub address: IpAddr,
    pub port: u16,
}

impl CacheId {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }

    pub fn sockaddr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl Display for CacheId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sockaddr())
    }
}

impl From<SocketAddr> for CacheId {
    fn from(sa: SocketAddr) -> Self {
        Self::new(sa.ip(), sa.port())
    }
}

impl FromStr for CacheId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddr>()
            .map(Into::into)
            .map_err(|e| format!("malformed cache address {s}: {e}"))
    }
}

/// Connection state of a cache server as driven by its transport session.
#[derive(
    Debug,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    Hash,
    Eq,
    PartialEq,
    PartialOrd,
    Ord,
    JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// Not connected, waiting to retry.
    Down,

    /// A transport connection attempt is in progress.
    Connecting,

    /// Connected, but no complete data set has been received yet.
    Established,

    /// Connected and holding a complete data set from the cache.
    Synchronized,
}

impl CacheState {
    /// True for the states that make a cache eligible as the active source.
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Established | Self::Synchronized)
    }
}

impl Display for CacheState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Down => write!(f, "down"),
            Self::Connecting => write!(f, "connecting"),
            Self::Established => write!(f, "established"),
            Self::Synchronized => write!(f, "synchronized"),
        }
    }
}

/// The (session id, serial) pair a table snapshot was built from, together
/// with the cache that produced it.
#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, Eq, PartialEq, JsonSchema,
)]
pub struct TableVersion {
    pub source: CacheId,
    pub session_id: u16,
    pub serial: u32,
}

impl Display for TableVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} session {} serial {}",
            self.source, self.session_id, self.serial
        )
    }
}

/// Per-server detail exported for `show rpki cache-connection`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, JsonSchema)]
pub struct CacheServerStatus {
    pub cache: CacheId,
    pub preference: u8,
    pub state: CacheState,
    pub active: bool,
    pub protocol_version: Option<u8>,
    pub session_id: Option<u16>,
    pub serial: Option<u32>,
    pub vrp_count: usize,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Aggregate connection report. When no server is established this
/// serializes to exactly `{"error": "No connection to RPKI cache server."}`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, JsonSchema)]
#[serde(untagged)]
pub enum CacheConnectionReport {
    NoConnection {
        error: String,
    },
    Connected {
        /// Preference of the active source's group.
        connected_group: u8,
        connections: Vec<CacheServerStatus>,
    },
}

impl CacheConnectionReport {
    pub fn no_connection() -> Self {
        Self::NoConnection {
            error: NO_CONNECTION.into(),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// One row of `show rpki prefix-table`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrefixTableEntry {
    pub prefix: IpAddr,
    pub prefix_len_min: u8,
    pub prefix_len_max: u8,
    pub asn: u32,
}

impl From<&Vrp> for PrefixTableEntry {
    fn from(v: &Vrp) -> Self {
        Self {
            prefix: v.prefix.addr(),
            prefix_len_min: v.prefix.length(),
            prefix_len_max: v.max_length,
            asn: v.origin_as,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrefixTable {
    pub prefixes: Vec<PrefixTableEntry>,
    pub ipv4_prefix_count: usize,
    pub ipv6_prefix_count: usize,
}

/// Result of looking up the VRPs covering a single prefix.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, JsonSchema)]
pub struct PrefixLookup {
    pub prefix: Prefix,
    pub origin_as: Option<u32>,
    /// Only present when an origin was supplied.
    pub state: Option<RpkiState>,
    pub covering: Vec<Vrp>,
}

/// A route as seen by the annotated route table.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, JsonSchema)]
pub struct RouteRpkiInfo {
    pub announcement: Announcement,
    pub state: RpkiState,
    /// Whether the import policy admits the route.
    pub accepted: bool,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cache_id_parse() {
        let id: CacheId = "192.0.2.1:15432".parse().unwrap();
        assert_eq!(id.port, 15432);
        assert_eq!(id.to_string(), "192.0.2.1:15432");
        let id6: CacheId = "[2001:db8::1]:323".parse().unwrap();
        assert_eq!(id6.to_string(), "[2001:db8::1]:323");
    }

    #[test]
    fn no_connection_shape() {
        let report = CacheConnectionReport::no_connection();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"error": "No connection to RPKI cache server."})
        );
        assert!(!report.is_connected());
    }

    #[test]
    fn prefix_table_entry_shape() {
        let vrp = Vrp::new("198.51.100.0/24".parse().unwrap(), 24, 65530)
            .unwrap();
        let json = serde_json::to_value(PrefixTableEntry::from(&vrp)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "prefix": "198.51.100.0",
                "prefixLenMin": 24,
                "prefixLenMax": 24,
                "asn": 65530
            })
        );
    }

    #[test]
    fn state_eligibility() {
        assert!(!CacheState::Down.is_up());
        assert!(!CacheState::Connecting.is_up());
        assert!(CacheState::Established.is_up());
        assert!(CacheState::Synchronized.is_up());
    }
}
