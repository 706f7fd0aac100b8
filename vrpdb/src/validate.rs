// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Route origin validation as described in RFC 6811.

use crate::table::Snapshot;
use rpki_types::{Announcement, Prefix, RpkiState};

/// Classify `prefix` originated by `origin_as` against `snapshot`.
///
/// A route is valid when any covering VRP authorizes it, invalid when
/// covering VRPs exist but none does, and not found when nothing covers it.
/// An empty or "no data" snapshot classifies everything as not found.
pub fn classify(
    snapshot: &Snapshot,
    prefix: &Prefix,
    origin_as: u32,
) -> RpkiState {
    classify_announcement(snapshot, &Announcement::new(*prefix, origin_as))
}

pub fn classify_announcement(
    snapshot: &Snapshot,
    announcement: &Announcement,
) -> RpkiState {
    let mut covered = false;
    for vrp in snapshot.covering(&announcement.prefix) {
        if vrp.matches(announcement) {
            return RpkiState::Valid;
        }
        covered = true;
    }
    if covered {
        RpkiState::Invalid
    } else {
        RpkiState::NotFound
    }
}
