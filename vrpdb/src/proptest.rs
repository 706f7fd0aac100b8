// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property-based tests for the VRP table and validator.
//!
//! The validator is checked against a linear scan over the same VRP set,
//! and commits are checked for atomicity from concurrent readers.

use crate::table::{Delta, VrpTable};
use crate::validate::classify;
use proptest::prelude::*;
use rpki_common::log::test_logger;
use rpki_types::{
    Announcement, CacheId, Prefix, Prefix4, Prefix6, RpkiState, TableVersion,
    Vrp,
};
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::spawn;

// Addresses are drawn from a small space so that coverage actually happens.
fn prefix_strategy() -> impl Strategy<Value = Prefix> {
    prop_oneof![
        (0u32..16, 0u8..=12).prop_map(|(hi, len)| {
            Prefix::from(Prefix4::new(
                Ipv4Addr::from(0x0a00_0000 | (hi << 20)),
                len,
            ))
        }),
        (0u128..16, 0u8..=40).prop_map(|(hi, len)| {
            let base = 0x2001_0db8u128 << 96;
            Prefix::from(Prefix6::new(Ipv6Addr::from(base | (hi << 90)), len))
        }),
    ]
}

fn vrp_strategy() -> impl Strategy<Value = Vrp> {
    (prefix_strategy(), 0u8..=16, 0u32..4).prop_map(|(p, extra, asn)| {
        let max = p.length().saturating_add(extra).min(p.host_mask());
        Vrp::new(p, max, asn).expect("valid vrp")
    })
}

fn announcement_strategy() -> impl Strategy<Value = Announcement> {
    (prefix_strategy(), 0u32..4).prop_map(|(p, asn)| Announcement::new(p, asn))
}

fn linear_classify(vrps: &BTreeSet<Vrp>, a: &Announcement) -> RpkiState {
    let covering: Vec<&Vrp> =
        vrps.iter().filter(|v| a.prefix.within(&v.prefix)).collect();
    if covering.is_empty() {
        RpkiState::NotFound
    } else if covering.iter().any(|v| {
        v.origin_as != 0
            && v.origin_as == a.origin_as
            && a.prefix.length() <= v.max_length
    }) {
        RpkiState::Valid
    } else {
        RpkiState::Invalid
    }
}

fn cache() -> CacheId {
    "192.0.2.1:15432".parse().expect("cache id")
}

fn version(serial: u32) -> TableVersion {
    TableVersion {
        source: cache(),
        session_id: 42,
        serial,
    }
}

proptest! {
    /// Property: the trie backed validator agrees with a linear scan
    #[test]
    fn prop_classify_matches_linear_scan(
        vrps in prop::collection::btree_set(vrp_strategy(), 0..40),
        candidates in prop::collection::vec(announcement_strategy(), 1..40),
    ) {
        let t = VrpTable::new(test_logger());
        let snapshot = t.apply_reset(version(1), vrps.iter().copied());
        for a in &candidates {
            let got = classify(&snapshot, &a.prefix, a.origin_as);
            prop_assert_eq!(got, linear_classify(&vrps, a), "{}", a);
            // Repeated classification is stable.
            prop_assert_eq!(got, classify(&snapshot, &a.prefix, a.origin_as));
        }
    }

    /// Property: a route exactly matching a non-AS0 VRP is valid
    #[test]
    fn prop_exact_match_is_valid(
        vrps in prop::collection::btree_set(vrp_strategy(), 1..40),
    ) {
        let t = VrpTable::new(test_logger());
        let snapshot = t.apply_reset(version(1), vrps.iter().copied());
        for v in vrps.iter().filter(|v| v.origin_as != 0) {
            prop_assert_eq!(
                classify(&snapshot, &v.prefix, v.origin_as),
                RpkiState::Valid
            );
        }
    }

    /// Property: snapshot iteration yields exactly the committed set in order
    #[test]
    fn prop_iteration_is_sorted_set(
        vrps in prop::collection::btree_set(vrp_strategy(), 0..60),
    ) {
        let t = VrpTable::new(test_logger());
        let snapshot = t.apply_reset(version(1), vrps.iter().copied());
        let got: Vec<Vrp> = snapshot.iter().copied().collect();
        let want: Vec<Vrp> = vrps.iter().copied().collect();
        prop_assert_eq!(got, want);
    }

    /// Property: applying a delta equals set difference then union
    #[test]
    fn prop_delta_is_set_arithmetic(
        base in prop::collection::btree_set(vrp_strategy(), 0..40),
        extra in prop::collection::btree_set(vrp_strategy(), 0..20),
        keep in any::<prop::sample::Index>(),
    ) {
        let t = VrpTable::new(test_logger());
        t.apply_reset(version(1), base.iter().copied());
        let withdraw: Vec<Vrp> = if base.is_empty() {
            vec![]
        } else {
            let skip = keep.index(base.len());
            base.iter().skip(skip).copied().collect()
        };
        let announce: Vec<Vrp> =
            extra.difference(&base).copied().collect();
        let s = t.apply_delta(&Delta {
            source: cache(),
            session_id: 42,
            from_serial: 1,
            to_serial: 2,
            announce: announce.clone(),
            withdraw: withdraw.clone(),
        }).expect("delta applies");

        let mut want = base.clone();
        for w in &withdraw {
            want.remove(w);
        }
        want.extend(announce);
        prop_assert_eq!(s.vrps(), want);
        prop_assert_eq!(s.version.map(|v| v.serial), Some(2));
    }
}

/// Readers racing a stream of commits only ever see a committed version in
/// full: the VRP set a reader observes is exactly the set committed for the
/// serial the snapshot carries.
#[test]
fn concurrent_readers_see_whole_versions() {
    let table = Arc::new(VrpTable::new(test_logger()));
    let committed: Arc<Mutex<Vec<Option<BTreeSet<Vrp>>>>> =
        Arc::new(Mutex::new(vec![None; 201]));
    let done = Arc::new(AtomicBool::new(false));

    let mut readers = Vec::new();
    for _ in 0..4 {
        let table = table.clone();
        let committed = committed.clone();
        let done = done.clone();
        readers.push(spawn(move || {
            let mut observed = 0usize;
            while !done.load(Ordering::Acquire) {
                let s = table.snapshot();
                let Some(v) = s.version else { continue };
                let got = s.vrps();
                let want = committed.lock().unwrap()[v.serial as usize].clone();
                assert_eq!(Some(got), want, "serial {}", v.serial);
                observed += 1;
            }
            observed
        }));
    }

    let mut current: BTreeSet<Vrp> = BTreeSet::new();
    let v = |i: u32| {
        Vrp::new(
            Prefix4::new(Ipv4Addr::from(0x0a00_0000 | (i << 8)), 24).into(),
            24,
            65000 + i,
        )
        .unwrap()
    };
    for i in 0..50 {
        current.insert(v(i));
    }
    committed.lock().unwrap()[1] = Some(current.clone());
    table.apply_reset(version(1), current.iter().copied());

    for serial in 2..=200u32 {
        let announce: Vec<Vrp> = (0..10).map(|k| v(50 + serial * 10 + k)).collect();
        let withdraw: Vec<Vrp> = current.iter().take(5).copied().collect();
        for w in &withdraw {
            current.remove(w);
        }
        current.extend(announce.iter().copied());
        // Record before publishing so readers can always find it.
        committed.lock().unwrap()[serial as usize] = Some(current.clone());
        table
            .apply_delta(&Delta {
                source: cache(),
                session_id: 42,
                from_serial: serial - 1,
                to_serial: serial,
                announce,
                withdraw,
            })
            .unwrap();
    }
    done.store(true, Ordering::Release);

    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(table.snapshot().vrps(), current);
}
