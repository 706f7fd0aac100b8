// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RTR protocol data units.
//!
//! Ref: RFC 6810 (version 0), RFC 8210 (version 1)

use crate::error::Error;
use nom::{
    bytes::complete::take,
    number::complete::{be_u16, be_u32, be_u8},
};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use rpki_types::{Prefix, Prefix4, Prefix6, Vrp};
use std::fmt::{self, Display, Formatter};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Upper bound on a PDU we are willing to read. Error Reports are the only
/// PDUs of unbounded size.
pub const MAX_PDU_SIZE: usize = 0x10000;

/// RFC 6810
pub const RTR_V0: u8 = 0;

/// RFC 8210
pub const RTR_V1: u8 = 1;

/// The newest protocol version we speak.
pub const RTR_MAX_VERSION: u8 = RTR_V1;

const FLAG_ANNOUNCE: u8 = 0x01;

/// RTR PDU types.
///
/// Ref: RFC 8210 §5
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Copy, Clone)]
#[repr(u8)]
pub enum PduType {
    /// Cache tells the router it has new data.
    SerialNotify = 0,

    /// Router asks for changes since a serial.
    SerialQuery = 1,

    /// Router asks for the full data set.
    ResetQuery = 2,

    /// Start of a reply to a query.
    CacheResponse = 3,

    Ipv4Prefix = 4,

    Ipv6Prefix = 6,

    /// End of a reply to a query.
    EndOfData = 7,

    /// Cache cannot answer a serial query incrementally.
    CacheReset = 8,

    /// BGPsec router key. Version 1 only.
    RouterKey = 9,

    ErrorReport = 10,
}

/// Error Report error codes.
///
/// Ref: RFC 8210 §12
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Copy, Clone)]
#[repr(u16)]
pub enum ErrorCode {
    CorruptData = 0,
    InternalError = 1,
    NoDataAvailable = 2,
    InvalidRequest = 3,
    UnsupportedProtocolVersion = 4,
    UnsupportedPduType = 5,
    WithdrawalOfUnknownRecord = 6,
    DuplicateAnnouncement = 7,
    UnexpectedProtocolVersion = 8,
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CorruptData => "corrupt data",
            Self::InternalError => "internal error",
            Self::NoDataAvailable => "no data available",
            Self::InvalidRequest => "invalid request",
            Self::UnsupportedProtocolVersion => "unsupported protocol version",
            Self::UnsupportedPduType => "unsupported pdu type",
            Self::WithdrawalOfUnknownRecord => "withdrawal of unknown record",
            Self::DuplicateAnnouncement => "duplicate announcement received",
            Self::UnexpectedProtocolVersion => "unexpected protocol version",
        };
        write!(f, "{s}")
    }
}

/// Every PDU starts with the same eight octets.
///
/// ```text
///  0          8          16         24        31
///  .-------------------------------------------.
///  | Protocol |   PDU    |                     |
///  | Version  |   Type   |  Session ID / zero  |
///  +-------------------------------------------+
///  |                                           |
///  |                 Length                    |
///  |                                           |
///  `-------------------------------------------'
/// ```
///
/// The 16 bit field holds the session id, an error code, flags or zero
/// depending on the PDU type.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Header {
    pub version: u8,

    /// Kept raw so an unknown type can be reported back to the cache.
    pub typ: u8,

    pub field: u16,

    /// Total length of the PDU including the header.
    pub length: u32,
}

impl Header {
    pub const WIRE_SIZE: usize = 8;

    pub fn to_wire(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[0] = self.version;
        buf[1] = self.typ;
        buf[2..4].copy_from_slice(&self.field.to_be_bytes());
        buf[4..8].copy_from_slice(&self.length.to_be_bytes());
        buf
    }

    pub fn from_wire(input: &[u8]) -> Result<Header, Error> {
        let (input, version) = be_u8(input)?;
        let (input, typ) = be_u8(input)?;
        let (input, field) = be_u16(input)?;
        let (_, length) = be_u32(input)?;
        if (length as usize) < Self::WIRE_SIZE {
            return Err(Error::TooSmall(format!("pdu length {length}")));
        }
        if (length as usize) > MAX_PDU_SIZE {
            return Err(Error::TooLarge(format!("pdu length {length}")));
        }
        Ok(Header {
            version,
            typ,
            field,
            length,
        })
    }

    pub fn pdu_type(&self) -> Result<PduType, Error> {
        Ok(PduType::try_from(self.typ)?)
    }
}

/// An announcement or withdrawal of a single VRP.
///
/// ```text
///  0          8          16         24        31
///  .-------------------------------------------.
///  | Protocol |   PDU    |                     |
///  | Version  |   Type   |         zero        |
///  |          |  4 or 6  |                     |
///  +-------------------------------------------+
///  |                                           |
///  |               Length=20 / 32              |
///  |                                           |
///  +-------------------------------------------+
///  |          |  Prefix  |   Max    |          |
///  |  Flags   |  Length  |  Length  |   zero   |
///  +-------------------------------------------+
///  |                                           |
///  |           IPv4 / IPv6 Prefix              |
///  |                                           |
///  +-------------------------------------------+
///  |                                           |
///  |         Autonomous System Number          |
///  |                                           |
///  `-------------------------------------------'
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct PrefixPdu {
    pub announce: bool,
    pub vrp: Vrp,
}

impl PrefixPdu {
    pub const V4_WIRE_SIZE: u32 = 20;
    pub const V6_WIRE_SIZE: u32 = 32;

    fn body(&self) -> Vec<u8> {
        let flags = if self.announce { FLAG_ANNOUNCE } else { 0 };
        let mut buf = vec![
            flags,
            self.vrp.prefix.length(),
            self.vrp.max_length,
            0,
        ];
        match self.vrp.prefix {
            Prefix::V4(p) => buf.extend_from_slice(&p.value.octets()),
            Prefix::V6(p) => buf.extend_from_slice(&p.value.octets()),
        }
        buf.extend_from_slice(&self.vrp.origin_as.to_be_bytes());
        buf
    }

    fn from_wire(typ: PduType, input: &[u8]) -> Result<PrefixPdu, Error> {
        let (input, flags) = be_u8(input)?;
        let (input, length) = be_u8(input)?;
        let (input, max_length) = be_u8(input)?;
        let (input, _zero) = be_u8(input)?;
        let (input, prefix) = match typ {
            PduType::Ipv4Prefix => {
                let (input, addr) = be_u32(input)?;
                let addr = Ipv4Addr::from(addr);
                if length > Prefix4::HOST_MASK {
                    return Err(Error::InvalidPrefixLength(length));
                }
                (input, Prefix::V4(Prefix4 { value: addr, length }))
            }
            _ => {
                let (input, addr) = take(16usize)(input)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(addr);
                if length > Prefix6::HOST_MASK {
                    return Err(Error::InvalidPrefixLength(length));
                }
                let value = Ipv6Addr::from(octets);
                (input, Prefix::V6(Prefix6 { value, length }))
            }
        };
        let (_, origin_as) = be_u32(input)?;
        Ok(PrefixPdu {
            announce: flags & FLAG_ANNOUNCE != 0,
            vrp: Vrp::new(prefix, max_length, origin_as)?,
        })
    }
}

/// Timing parameters carried by a version 1 End of Data, in seconds.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Timing {
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
}

impl Timing {
    /// RFC 8210 §6 bounds.
    pub fn is_valid(&self) -> bool {
        (1..=86400).contains(&self.refresh)
            && (1..=7200).contains(&self.retry)
            && (600..=172800).contains(&self.expire)
            && self.expire > self.refresh
            && self.expire > self.retry
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct EndOfData {
    pub session_id: u16,
    pub serial: u32,

    /// Present in version 1 only.
    pub timing: Option<Timing>,
}

impl EndOfData {
    pub const V0_WIRE_SIZE: u32 = 12;
    pub const V1_WIRE_SIZE: u32 = 24;
}

/// BGPsec router key. Decoded only so that it can be skipped.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RouterKey {
    pub announce: bool,
    pub ski: [u8; 20],
    pub asn: u32,
    pub spki: Vec<u8>,
}

impl RouterKey {
    pub const MIN_WIRE_SIZE: u32 = 32;

    fn body(&self) -> Vec<u8> {
        let mut buf = self.ski.to_vec();
        buf.extend_from_slice(&self.asn.to_be_bytes());
        buf.extend_from_slice(&self.spki);
        buf
    }

    fn from_wire(field: u16, input: &[u8]) -> Result<RouterKey, Error> {
        let (input, ski) = take(20usize)(input)?;
        let (input, asn) = be_u32(input)?;
        let mut s = [0u8; 20];
        s.copy_from_slice(ski);
        Ok(RouterKey {
            announce: (field >> 8) as u8 & FLAG_ANNOUNCE != 0,
            ski: s,
            asn,
            spki: input.to_vec(),
        })
    }
}

/// ```text
///  0          8          16         24        31
///  .-------------------------------------------.
///  | Protocol |   PDU    |                     |
///  | Version  |   Type   |     Error Code      |
///  |          |    10    |                     |
///  +-------------------------------------------+
///  |                  Length                   |
///  +-------------------------------------------+
///  |       Length of Encapsulated PDU          |
///  +-------------------------------------------+
///  ~           Erroneous PDU                   ~
///  +-------------------------------------------+
///  |           Length of Error Text            |
///  +-------------------------------------------+
///  ~         Arbitrary Text of Error           ~
///  `-------------------------------------------'
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub pdu: Vec<u8>,
    pub text: String,
}

impl ErrorReport {
    pub fn new(code: ErrorCode, pdu: Vec<u8>, text: impl Into<String>) -> Self {
        Self {
            code,
            pdu,
            text: text.into(),
        }
    }

    fn body(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.pdu.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.pdu);
        buf.extend_from_slice(&(self.text.len() as u32).to_be_bytes());
        buf.extend_from_slice(self.text.as_bytes());
        buf
    }

    fn from_wire(field: u16, input: &[u8]) -> Result<ErrorReport, Error> {
        let code = ErrorCode::try_from(field)?;
        let (input, pdu_len) = be_u32(input)?;
        let (input, pdu) = take(pdu_len as usize)(input)?;
        let (input, text_len) = be_u32(input)?;
        let (input, text) = take(text_len as usize)(input)?;
        if !input.is_empty() {
            return Err(Error::TrailingBytes(input.len()));
        }
        Ok(ErrorReport {
            code,
            pdu: pdu.to_vec(),
            text: String::from_utf8_lossy(text).into_owned(),
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Pdu {
    SerialNotify { session_id: u16, serial: u32 },
    SerialQuery { session_id: u16, serial: u32 },
    ResetQuery,
    CacheResponse { session_id: u16 },
    Prefix(PrefixPdu),
    EndOfData(EndOfData),
    CacheReset,
    RouterKey(RouterKey),
    ErrorReport(ErrorReport),
}

impl From<&Pdu> for PduType {
    fn from(p: &Pdu) -> Self {
        match p {
            Pdu::SerialNotify { .. } => Self::SerialNotify,
            Pdu::SerialQuery { .. } => Self::SerialQuery,
            Pdu::ResetQuery => Self::ResetQuery,
            Pdu::CacheResponse { .. } => Self::CacheResponse,
            Pdu::Prefix(p) if p.vrp.prefix.is_v4() => Self::Ipv4Prefix,
            Pdu::Prefix(_) => Self::Ipv6Prefix,
            Pdu::EndOfData(_) => Self::EndOfData,
            Pdu::CacheReset => Self::CacheReset,
            Pdu::RouterKey(_) => Self::RouterKey,
            Pdu::ErrorReport(_) => Self::ErrorReport,
        }
    }
}

impl From<ErrorReport> for Pdu {
    fn from(e: ErrorReport) -> Self {
        Pdu::ErrorReport(e)
    }
}

impl From<PrefixPdu> for Pdu {
    fn from(p: PrefixPdu) -> Self {
        Pdu::Prefix(p)
    }
}

impl From<EndOfData> for Pdu {
    fn from(e: EndOfData) -> Self {
        Pdu::EndOfData(e)
    }
}

impl Display for Pdu {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::SerialNotify { session_id, serial } => {
                write!(f, "serial notify session {session_id} serial {serial}")
            }
            Self::SerialQuery { session_id, serial } => {
                write!(f, "serial query session {session_id} serial {serial}")
            }
            Self::ResetQuery => write!(f, "reset query"),
            Self::CacheResponse { session_id } => {
                write!(f, "cache response session {session_id}")
            }
            Self::Prefix(p) => {
                let op = if p.announce { "announce" } else { "withdraw" };
                write!(f, "{op} {}", p.vrp)
            }
            Self::EndOfData(e) => write!(
                f,
                "end of data session {} serial {}",
                e.session_id, e.serial
            ),
            Self::CacheReset => write!(f, "cache reset"),
            Self::RouterKey(k) => write!(f, "router key AS{}", k.asn),
            Self::ErrorReport(e) => {
                write!(f, "error report {}: {}", e.code, e.text)
            }
        }
    }
}

impl Pdu {
    pub fn typ(&self) -> PduType {
        self.into()
    }

    /// Serialize this PDU, header included, as protocol `version`.
    pub fn to_wire(&self, version: u8) -> Result<Vec<u8>, Error> {
        let (field, body) = match self {
            Self::SerialNotify { session_id, serial }
            | Self::SerialQuery { session_id, serial } => {
                (*session_id, serial.to_be_bytes().to_vec())
            }
            Self::ResetQuery | Self::CacheReset => (0, Vec::new()),
            Self::CacheResponse { session_id } => (*session_id, Vec::new()),
            Self::Prefix(p) => (0, p.body()),
            Self::EndOfData(e) => {
                let mut body = e.serial.to_be_bytes().to_vec();
                if version >= RTR_V1 {
                    let t = e.timing.ok_or(Error::MissingTiming)?;
                    body.extend_from_slice(&t.refresh.to_be_bytes());
                    body.extend_from_slice(&t.retry.to_be_bytes());
                    body.extend_from_slice(&t.expire.to_be_bytes());
                }
                (e.session_id, body)
            }
            Self::RouterKey(k) => {
                if version < RTR_V1 {
                    return Err(Error::UnsupportedPduType(
                        PduType::RouterKey.into(),
                    ));
                }
                let flags = if k.announce { FLAG_ANNOUNCE } else { 0 };
                (u16::from(flags) << 8, k.body())
            }
            Self::ErrorReport(e) => (e.code.into(), e.body()),
        };
        let length = Header::WIRE_SIZE + body.len();
        if length > MAX_PDU_SIZE {
            return Err(Error::TooLarge(format!("pdu length {length}")));
        }
        let header = Header {
            version,
            typ: self.typ().into(),
            field,
            length: length as u32,
        };
        let mut buf = header.to_wire().to_vec();
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    /// Parse one complete PDU. Returns the protocol version it was sent with
    /// along with the PDU.
    pub fn from_wire(input: &[u8]) -> Result<(u8, Pdu), Error> {
        let header = Header::from_wire(input)?;
        if header.version > RTR_MAX_VERSION {
            return Err(Error::UnsupportedVersion(header.version));
        }
        if input.len() != header.length as usize {
            return Err(Error::BadLength {
                typ: header.typ,
                expected: header.length,
                found: input.len() as u32,
            });
        }
        let typ = header.pdu_type()?;
        let body = &input[Header::WIRE_SIZE..];

        let expect = |expected: u32| -> Result<(), Error> {
            if header.length != expected {
                return Err(Error::BadLength {
                    typ: header.typ,
                    expected,
                    found: header.length,
                });
            }
            Ok(())
        };

        let pdu = match typ {
            PduType::SerialNotify | PduType::SerialQuery => {
                expect(12)?;
                let (_, serial) = be_u32(body)?;
                if typ == PduType::SerialNotify {
                    Pdu::SerialNotify {
                        session_id: header.field,
                        serial,
                    }
                } else {
                    Pdu::SerialQuery {
                        session_id: header.field,
                        serial,
                    }
                }
            }
            PduType::ResetQuery => {
                expect(8)?;
                Pdu::ResetQuery
            }
            PduType::CacheResponse => {
                expect(8)?;
                Pdu::CacheResponse {
                    session_id: header.field,
                }
            }
            PduType::Ipv4Prefix => {
                expect(PrefixPdu::V4_WIRE_SIZE)?;
                Pdu::Prefix(PrefixPdu::from_wire(typ, body)?)
            }
            PduType::Ipv6Prefix => {
                expect(PrefixPdu::V6_WIRE_SIZE)?;
                Pdu::Prefix(PrefixPdu::from_wire(typ, body)?)
            }
            PduType::EndOfData => {
                if header.version == RTR_V0 {
                    expect(EndOfData::V0_WIRE_SIZE)?;
                    let (_, serial) = be_u32(body)?;
                    Pdu::EndOfData(EndOfData {
                        session_id: header.field,
                        serial,
                        timing: None,
                    })
                } else {
                    expect(EndOfData::V1_WIRE_SIZE)?;
                    let (body, serial) = be_u32(body)?;
                    let (body, refresh) = be_u32(body)?;
                    let (body, retry) = be_u32(body)?;
                    let (_, expire) = be_u32(body)?;
                    Pdu::EndOfData(EndOfData {
                        session_id: header.field,
                        serial,
                        timing: Some(Timing {
                            refresh,
                            retry,
                            expire,
                        }),
                    })
                }
            }
            PduType::CacheReset => {
                expect(8)?;
                Pdu::CacheReset
            }
            PduType::RouterKey => {
                if header.version == RTR_V0 {
                    return Err(Error::UnsupportedPduType(header.typ));
                }
                if header.length < RouterKey::MIN_WIRE_SIZE {
                    return Err(Error::TooSmall("router key".into()));
                }
                Pdu::RouterKey(RouterKey::from_wire(header.field, body)?)
            }
            PduType::ErrorReport => {
                Pdu::ErrorReport(ErrorReport::from_wire(header.field, body)?)
            }
        };
        Ok((header.version, pdu))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use pretty_hex::*;

    fn vrp(p: &str, max: u8, asn: u32) -> Vrp {
        Vrp::new(p.parse().unwrap(), max, asn).unwrap()
    }

    #[test]
    fn ipv4_prefix_wire_layout() {
        let pdu = Pdu::Prefix(PrefixPdu {
            announce: true,
            vrp: vrp("198.51.100.0/24", 24, 65530),
        });
        let buf = pdu.to_wire(RTR_V1).unwrap();
        println!("buf: {}", buf.hex_dump());
        assert_eq!(
            buf,
            vec![
                1, 4, 0, 0, // version, type, zero
                0, 0, 0, 20, // length
                1, 24, 24, 0, // flags, len, max, zero
                198, 51, 100, 0, // prefix
                0, 0, 0xff, 0xfa, // asn
            ]
        );
        assert_eq!(Pdu::from_wire(&buf).unwrap(), (RTR_V1, pdu));
    }

    #[test]
    fn ipv6_withdraw_round_trip() {
        let pdu = Pdu::Prefix(PrefixPdu {
            announce: false,
            vrp: vrp("2001:db8::/32", 48, 64512),
        });
        let buf = pdu.to_wire(RTR_V0).unwrap();
        assert_eq!(buf.len(), 32);
        assert_eq!(buf[1], PduType::Ipv6Prefix as u8);
        assert_eq!(Pdu::from_wire(&buf).unwrap(), (RTR_V0, pdu));
    }

    #[test]
    fn end_of_data_by_version() {
        let eod = EndOfData {
            session_id: 7,
            serial: 42,
            timing: Some(Timing {
                refresh: 3600,
                retry: 600,
                expire: 7200,
            }),
        };
        let v1 = Pdu::from(eod).to_wire(RTR_V1).unwrap();
        assert_eq!(v1.len(), 24);
        assert_eq!(Pdu::from_wire(&v1).unwrap(), (RTR_V1, Pdu::from(eod)));

        let v0 = Pdu::from(eod).to_wire(RTR_V0).unwrap();
        assert_eq!(v0.len(), 12);
        assert_eq!(
            Pdu::from_wire(&v0).unwrap(),
            (RTR_V0, Pdu::from(EndOfData { timing: None, ..eod }))
        );

        let bare = EndOfData { timing: None, ..eod };
        assert!(matches!(
            Pdu::from(bare).to_wire(RTR_V1),
            Err(Error::MissingTiming)
        ));
    }

    #[test]
    fn error_report_round_trip() {
        let offending = Pdu::ResetQuery.to_wire(RTR_V1).unwrap();
        let report =
            ErrorReport::new(ErrorCode::CorruptData, offending, "bad things");
        let buf = Pdu::from(report.clone()).to_wire(RTR_V1).unwrap();
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 0);
        assert_eq!(
            Pdu::from_wire(&buf).unwrap(),
            (RTR_V1, Pdu::ErrorReport(report))
        );
    }

    #[test]
    fn router_key_is_decoded() {
        let key = RouterKey {
            announce: true,
            ski: [9u8; 20],
            asn: 65000,
            spki: vec![1, 2, 3, 4],
        };
        let buf = Pdu::RouterKey(key.clone()).to_wire(RTR_V1).unwrap();
        assert_eq!(Pdu::from_wire(&buf).unwrap(), (RTR_V1, Pdu::RouterKey(key)));

        // Not a version 0 PDU.
        let mut v0 = buf.clone();
        v0[0] = RTR_V0;
        assert!(matches!(
            Pdu::from_wire(&v0),
            Err(Error::UnsupportedPduType(9))
        ));
    }

    #[test]
    fn malformed_pdus() {
        // unknown type
        let buf = [1u8, 5, 0, 0, 0, 0, 0, 8];
        let err = Pdu::from_wire(&buf).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::UnsupportedPduType);

        // unknown version
        let buf = [2u8, 2, 0, 0, 0, 0, 0, 8];
        let err = Pdu::from_wire(&buf).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::UnsupportedProtocolVersion);

        // wrong fixed length
        let buf = [1u8, 2, 0, 0, 0, 0, 0, 12, 0, 0, 0, 0];
        let err = Pdu::from_wire(&buf).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::CorruptData);

        // max length shorter than prefix length
        let mut buf = Pdu::Prefix(PrefixPdu {
            announce: true,
            vrp: vrp("10.0.0.0/8", 8, 1),
        })
        .to_wire(RTR_V1)
        .unwrap();
        buf[10] = 7;
        let err = Pdu::from_wire(&buf).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::CorruptData);

        // header claims less than a header
        let buf = [1u8, 2, 0, 0, 0, 0, 0, 4];
        assert!(matches!(Header::from_wire(&buf), Err(Error::TooSmall(_))));
    }

    #[test]
    fn timing_bounds() {
        let ok = Timing {
            refresh: 3600,
            retry: 600,
            expire: 7200,
        };
        assert!(ok.is_valid());
        assert!(!Timing { refresh: 0, ..ok }.is_valid());
        assert!(!Timing { expire: 599, ..ok }.is_valid());
        assert!(!Timing { expire: 3600, ..ok }.is_valid());
        assert!(!Timing { retry: 7201, ..ok }.is_valid());
    }
}
