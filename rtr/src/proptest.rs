// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property-based tests for the RTR wire format.
//!
//! These check that the decoder accepts everything the encoder produces,
//! rejects anything truncated or inconsistent, and never panics on
//! arbitrary input.

use crate::messages::{
    EndOfData, ErrorCode, ErrorReport, Header, Pdu, PrefixPdu, RouterKey,
    Timing, RTR_V0, RTR_V1,
};
use proptest::prelude::*;
use rpki_types::{Prefix, Prefix4, Prefix6, Vrp};
use std::net::{Ipv4Addr, Ipv6Addr};

fn vrp_strategy() -> impl Strategy<Value = Vrp> {
    let v4 = (any::<u32>(), 0u8..=32, 0u8..=32, any::<u32>()).prop_map(
        |(addr, len, extra, asn)| {
            let p = Prefix::from(Prefix4::new(Ipv4Addr::from(addr), len));
            let max = len.saturating_add(extra).min(32);
            Vrp::new(p, max, asn).expect("valid vrp")
        },
    );
    let v6 = (any::<u128>(), 0u8..=128, 0u8..=128, any::<u32>()).prop_map(
        |(addr, len, extra, asn)| {
            let p = Prefix::from(Prefix6::new(Ipv6Addr::from(addr), len));
            let max = len.saturating_add(extra).min(128);
            Vrp::new(p, max, asn).expect("valid vrp")
        },
    );
    prop_oneof![v4, v6]
}

fn error_code_strategy() -> impl Strategy<Value = ErrorCode> {
    (0u16..=8).prop_map(|c| ErrorCode::try_from(c).expect("known code"))
}

/// PDUs together with a version they can be sent in.
fn pdu_strategy() -> impl Strategy<Value = (u8, Pdu)> {
    let version = prop_oneof![Just(RTR_V0), Just(RTR_V1)];
    let any_version = prop_oneof![
        (any::<u16>(), any::<u32>()).prop_map(|(session_id, serial)| {
            Pdu::SerialNotify { session_id, serial }
        }),
        (any::<u16>(), any::<u32>()).prop_map(|(session_id, serial)| {
            Pdu::SerialQuery { session_id, serial }
        }),
        Just(Pdu::ResetQuery),
        any::<u16>().prop_map(|session_id| Pdu::CacheResponse { session_id }),
        Just(Pdu::CacheReset),
        (any::<bool>(), vrp_strategy())
            .prop_map(|(announce, vrp)| Pdu::from(PrefixPdu { announce, vrp })),
        (
            error_code_strategy(),
            prop::collection::vec(any::<u8>(), 0..64),
            "[ -~]{0,64}",
        )
            .prop_map(|(code, pdu, text)| {
                Pdu::from(ErrorReport::new(code, pdu, text))
            }),
    ];
    let v0 = (any::<u16>(), any::<u32>()).prop_map(|(session_id, serial)| {
        (
            RTR_V0,
            Pdu::from(EndOfData {
                session_id,
                serial,
                timing: None,
            }),
        )
    });
    let v1 = prop_oneof![
        (any::<u16>(), any::<u32>(), any::<(u32, u32, u32)>()).prop_map(
            |(session_id, serial, (refresh, retry, expire))| {
                Pdu::from(EndOfData {
                    session_id,
                    serial,
                    timing: Some(Timing {
                        refresh,
                        retry,
                        expire,
                    }),
                })
            }
        ),
        (
            any::<bool>(),
            any::<[u8; 20]>(),
            any::<u32>(),
            prop::collection::vec(any::<u8>(), 0..128),
        )
            .prop_map(|(announce, ski, asn, spki)| {
                Pdu::RouterKey(RouterKey {
                    announce,
                    ski,
                    asn,
                    spki,
                })
            }),
    ]
    .prop_map(|p| (RTR_V1, p));
    prop_oneof![(version, any_version), v0, v1]
}

proptest! {
    #[test]
    fn prop_decode_accepts_encoded((version, pdu) in pdu_strategy()) {
        let buf = pdu.to_wire(version).expect("encode");
        let header = Header::from_wire(&buf).expect("header");
        prop_assert_eq!(header.length as usize, buf.len());
        let (v, decoded) = Pdu::from_wire(&buf).expect("decode");
        prop_assert_eq!(v, version);
        prop_assert_eq!(decoded, pdu);
    }

    #[test]
    fn prop_truncation_is_rejected(
        (version, pdu) in pdu_strategy(),
        cut in any::<prop::sample::Index>(),
    ) {
        let buf = pdu.to_wire(version).expect("encode");
        let n = cut.index(buf.len());
        prop_assert!(Pdu::from_wire(&buf[..n]).is_err());
    }

    #[test]
    fn prop_trailing_bytes_are_rejected(
        (version, pdu) in pdu_strategy(),
        extra in prop::collection::vec(any::<u8>(), 1..16),
    ) {
        let mut buf = pdu.to_wire(version).expect("encode");
        buf.extend_from_slice(&extra);
        prop_assert!(Pdu::from_wire(&buf).is_err());
    }

    #[test]
    fn prop_arbitrary_bytes_do_not_panic(
        buf in prop::collection::vec(any::<u8>(), 0..128),
    ) {
        let _ = Pdu::from_wire(&buf);
    }

    /// Headers that look plausible exercise the per type decoders rather
    /// than failing on the version or type byte.
    #[test]
    fn prop_plausible_headers_do_not_panic(
        version in 0u8..=1,
        typ in 0u8..=10,
        field in any::<u16>(),
        body in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut buf = vec![version, typ];
        buf.extend_from_slice(&field.to_be_bytes());
        buf.extend_from_slice(&((body.len() + 8) as u32).to_be_bytes());
        buf.extend_from_slice(&body);
        if let Ok((v, pdu)) = Pdu::from_wire(&buf) {
            prop_assert_eq!(v, version);
            // Anything accepted can be sent back.
            prop_assert!(pdu.to_wire(v).is_ok());
        }
    }

    #[test]
    fn prop_bad_max_length_is_rejected(
        addr in any::<u32>(),
        len in 1u8..=32,
        max in 0u8..=255,
    ) {
        prop_assume!(max < len || max > 32);
        let p = Prefix4::new(Ipv4Addr::from(addr), len);
        let mut buf = vec![RTR_V1, 4, 0, 0, 0, 0, 0, 20];
        buf.extend_from_slice(&[1, len, max, 0]);
        buf.extend_from_slice(&p.value.octets());
        buf.extend_from_slice(&65000u32.to_be_bytes());
        prop_assert!(Pdu::from_wire(&buf).is_err());
    }
}
