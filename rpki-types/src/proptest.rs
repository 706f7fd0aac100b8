// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Properties of prefix parsing and deserialization.

use crate::{Prefix, Prefix4, Prefix6};
use proptest::prelude::*;
use serde_json::json;
use std::net::{Ipv4Addr, Ipv6Addr};

proptest! {
    /// Whatever the source, an accepted prefix has a length that fits its
    /// family and no host bits set.
    #[test]
    fn prop_deserialized_v4_is_normalized(addr in any::<u32>(), len in 0u8..=255) {
        let value = Ipv4Addr::from(addr);
        let got = serde_json::from_value::<Prefix>(
            json!({"V4": {"value": value, "length": len}}),
        );
        if len > Prefix4::HOST_MASK {
            prop_assert!(got.is_err());
        } else {
            let p = got.expect("valid v4 prefix");
            prop_assert!(p.host_bits_are_unset());
            prop_assert_eq!(p, Prefix::from(Prefix4::new(value, len)));
        }
    }

    #[test]
    fn prop_deserialized_v6_is_normalized(addr in any::<u128>(), len in 0u8..=255) {
        let value = Ipv6Addr::from(addr);
        let got = serde_json::from_value::<Prefix>(
            json!({"V6": {"value": value, "length": len}}),
        );
        if len > Prefix6::HOST_MASK {
            prop_assert!(got.is_err());
        } else {
            let p = got.expect("valid v6 prefix");
            prop_assert!(p.host_bits_are_unset());
            prop_assert_eq!(p, Prefix::from(Prefix6::new(value, len)));
        }
    }

    /// The text form and the parser agree, and a prefix is always within
    /// its own shorter truncations.
    #[test]
    fn prop_text_form_parses_back(addr in any::<u128>(), len in 0u8..=128, cut in 0u8..=128) {
        let p = Prefix::from(Prefix6::new(Ipv6Addr::from(addr), len));
        prop_assert_eq!(p.to_string().parse::<Prefix>(), Ok(p));
        let shorter =
            Prefix::from(Prefix6::new(Ipv6Addr::from(addr), len.min(cut)));
        prop_assert!(p.within(&shorter));
    }
}
