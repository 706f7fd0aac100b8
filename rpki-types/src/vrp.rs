// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::Prefix;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum VrpError {
    #[error("max length {max_length} shorter than prefix {prefix}")]
    MaxLengthTooShort { prefix: Prefix, max_length: u8 },

    #[error("max length {max_length} too long for prefix {prefix}")]
    MaxLengthTooLong { prefix: Prefix, max_length: u8 },

    #[error("prefix {0} has host bits set")]
    HostBitsSet(Prefix),
}

/// A validated ROA payload: the assertion that `origin_as` may originate
/// `prefix` and any more specific prefix up to `max_length` bits long.
///
/// VRPs are immutable. A table change replaces or withdraws entries, it
/// never edits one in place.
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
pub struct Vrp {
    pub prefix: Prefix,
    pub max_length: u8,
    pub origin_as: u32,
}

impl Vrp {
    pub fn new(
        prefix: Prefix,
        max_length: u8,
        origin_as: u32,
    ) -> Result<Self, VrpError> {
        if !prefix.host_bits_are_unset() {
            return Err(VrpError::HostBitsSet(prefix));
        }
        if max_length < prefix.length() {
            return Err(VrpError::MaxLengthTooShort { prefix, max_length });
        }
        if max_length > prefix.host_mask() {
            return Err(VrpError::MaxLengthTooLong { prefix, max_length });
        }
        Ok(Self {
            prefix,
            max_length,
            origin_as,
        })
    }

    /// Returns true when this VRP's prefix covers `prefix`, regardless of
    /// origin or max length.
    pub fn covers(&self, prefix: &Prefix) -> bool {
        prefix.within(&self.prefix)
    }

    /// Returns true when this VRP authorizes the announcement. AS 0 VRPs
    /// never authorize anything (RFC 6483 §4).
    pub fn matches(&self, a: &Announcement) -> bool {
        self.origin_as != 0
            && self.origin_as == a.origin_as
            && a.prefix.length() <= self.max_length
            && self.covers(&a.prefix)
    }
}

impl Display for Vrp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} AS{}", self.prefix, self.max_length, self.origin_as)
    }
}

/// The outcome of classifying an announcement against the VRP table.
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
pub enum RpkiState {
    /// At least one covering VRP authorizes the origin and length.
    Valid,

    /// Covering VRPs exist but none of them authorizes the announcement.
    Invalid,

    /// No VRP covers the announced prefix.
    NotFound,
}

impl Display for RpkiState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Invalid => write!(f, "invalid"),
            Self::NotFound => write!(f, "notfound"),
        }
    }
}

impl FromStr for RpkiState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "valid" => Ok(Self::Valid),
            "invalid" => Ok(Self::Invalid),
            "notfound" | "not-found" => Ok(Self::NotFound),
            other => Err(format!("unknown rpki state: {other}")),
        }
    }
}

/// A prefix as announced by a BGP route together with the origin AS taken
/// from its AS path.
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
pub struct Announcement {
    pub prefix: Prefix,
    pub origin_as: u32,
}

impl Announcement {
    pub fn new(mut prefix: Prefix, origin_as: u32) -> Self {
        prefix.unset_host_bits();
        Self { prefix, origin_as }
    }
}

impl Display for Announcement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} AS{}", self.prefix, self.origin_as)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn vrp(p: &str, max: u8, asn: u32) -> Vrp {
        Vrp::new(p.parse().unwrap(), max, asn).unwrap()
    }

    #[test]
    fn vrp_bounds() {
        let p: Prefix = "10.0.0.0/8".parse().unwrap();
        assert!(Vrp::new(p, 7, 1).is_err());
        assert!(Vrp::new(p, 33, 1).is_err());
        assert!(Vrp::new(p, 32, 1).is_ok());
    }

    #[test]
    fn vrp_matches() {
        let v = vrp("10.0.0.0/8", 24, 65001);
        let ok = Announcement::new("10.1.0.0/16".parse().unwrap(), 65001);
        let long = Announcement::new("10.1.1.0/25".parse().unwrap(), 65001);
        let other = Announcement::new("10.1.0.0/16".parse().unwrap(), 65002);
        assert!(v.matches(&ok));
        assert!(!v.matches(&long));
        assert!(!v.matches(&other));
        assert!(v.covers(&other.prefix));
    }

    #[test]
    fn as0_never_matches() {
        let v = vrp("10.0.0.0/8", 24, 0);
        let a = Announcement::new("10.0.0.0/8".parse().unwrap(), 0);
        assert!(!v.matches(&a));
    }

    #[test]
    fn state_round_trips_through_text() {
        for s in [RpkiState::Valid, RpkiState::Invalid, RpkiState::NotFound] {
            assert_eq!(s.to_string().parse::<RpkiState>().unwrap(), s);
        }
        assert!("bogus".parse::<RpkiState>().is_err());
    }
}
