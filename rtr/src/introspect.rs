// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Read-only views over the table and the cache set.

use rpki_types::{
    AddressFamily, CacheConnectionReport, CacheServerStatus, Prefix,
    PrefixLookup, PrefixTable, PrefixTableEntry,
};
use vrpdb::{classify, Snapshot};

/// The VRPs in `snapshot`, optionally only those for `origin_as`.
pub fn prefix_table(snapshot: &Snapshot, origin_as: Option<u32>) -> PrefixTable {
    let prefixes: Vec<PrefixTableEntry> = match origin_as {
        Some(asn) => snapshot.by_origin(asn).map(Into::into).collect(),
        None => snapshot.iter().map(Into::into).collect(),
    };
    let (ipv4_prefix_count, ipv6_prefix_count) = match origin_as {
        None => (
            snapshot.count(AddressFamily::Ipv4),
            snapshot.count(AddressFamily::Ipv6),
        ),
        Some(_) => {
            let v4 = prefixes.iter().filter(|p| p.prefix.is_ipv4()).count();
            (v4, prefixes.len() - v4)
        }
    };
    PrefixTable {
        prefixes,
        ipv4_prefix_count,
        ipv6_prefix_count,
    }
}

/// The VRPs covering `prefix`, and its state when an origin is given.
pub fn lookup(
    snapshot: &Snapshot,
    prefix: Prefix,
    origin_as: Option<u32>,
) -> PrefixLookup {
    let mut prefix = prefix;
    prefix.unset_host_bits();
    PrefixLookup {
        prefix,
        origin_as,
        state: origin_as.map(|asn| classify(snapshot, &prefix, asn)),
        covering: snapshot.covering(&prefix).copied().collect(),
    }
}

/// Summarize per cache status. Connected only while some cache is
/// established or synchronized.
pub fn connection_report(
    statuses: Vec<CacheServerStatus>,
) -> CacheConnectionReport {
    if !statuses.iter().any(|s| s.state.is_up()) {
        return CacheConnectionReport::no_connection();
    }
    let connected_group = statuses
        .iter()
        .find(|s| s.active)
        .or_else(|| statuses.iter().find(|s| s.state.is_up()))
        .map_or(0, |s| s.preference);
    CacheConnectionReport::Connected {
        connected_group,
        connections: statuses,
    }
}
