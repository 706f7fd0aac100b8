// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use rpki_types::{CacheId, Vrp};

/// Reasons a delta is refused by the table. Any of these means the caller
/// must fall back to a full reset.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("table holds no data")]
    NoVersion,

    #[error("delta from {got} but table holds data from {expected}")]
    SourceMismatch { expected: CacheId, got: CacheId },

    #[error("delta for session {got} but table holds session {expected}")]
    SessionMismatch { expected: u16, got: u16 },

    #[error("delta follows serial {got} but table is at serial {expected}")]
    SerialMismatch { expected: u32, got: u32 },

    #[error("duplicate announcement {0}")]
    DuplicateAnnouncement(Vrp),

    #[error("withdrawal of unknown record {0}")]
    UnknownWithdrawal(Vrp),
}
