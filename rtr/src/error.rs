// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::messages::ErrorCode;
use num_enum::TryFromPrimitiveError;
use rpki_types::{CacheId, VrpError};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("too small: {0}")]
    TooSmall(String),

    #[error("too large: {0}")]
    TooLarge(String),

    #[error("bad length for pdu type {typ}: expected {expected} found {found}")]
    BadLength { typ: u8, expected: u32, found: u32 },

    #[error("{0} trailing bytes")]
    TrailingBytes(usize),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("unsupported pdu type {0}")]
    UnsupportedPduType(u8),

    #[error("pdu type error")]
    PduType(#[from] TryFromPrimitiveError<crate::messages::PduType>),

    #[error("error code error")]
    ErrorCode(#[from] TryFromPrimitiveError<crate::messages::ErrorCode>),

    #[error("invalid prefix length {0}")]
    InvalidPrefixLength(u8),

    #[error("invalid vrp: {0}")]
    InvalidVrp(#[from] VrpError),

    #[error("version 1 end of data requires timing parameters")]
    MissingTiming,

    #[error("message parse error")]
    Parse(nom::Err<(Vec<u8>, nom::error::ErrorKind)>),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("timeout")]
    Timeout,

    #[error("disconnected")]
    Disconnected,

    #[error("Attempt to send a message when not connected")]
    NotConnected,

    #[error("Channel connect error")]
    ChannelConnect,

    #[error("channel send: {0}")]
    ChannelSend(String),

    #[error("Internal communication error: {0}")]
    InternalCommunication(String),

    /// A protocol violation detected by the session rather than the codec.
    #[error("{code}: {text}")]
    Protocol { code: ErrorCode, text: String },

    #[error("cache {0} already configured with preference {1}")]
    Duplicate(CacheId, u8),

    #[error("cache {cache} with preference {preference} not configured")]
    NotFound { cache: CacheId, preference: u8 },
}

impl Error {
    pub fn protocol(code: ErrorCode, text: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            text: text.into(),
        }
    }

    /// The RTR error code to report to the cache for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedVersion(_) => ErrorCode::UnsupportedProtocolVersion,
            Self::UnsupportedPduType(_) | Self::PduType(_) => {
                ErrorCode::UnsupportedPduType
            }
            Self::Protocol { code, .. } => *code,
            Self::TooSmall(_)
            | Self::TooLarge(_)
            | Self::BadLength { .. }
            | Self::TrailingBytes(_)
            | Self::ErrorCode(_)
            | Self::InvalidPrefixLength(_)
            | Self::InvalidVrp(_)
            | Self::MissingTiming
            | Self::Parse(_) => ErrorCode::CorruptData,
            _ => ErrorCode::InternalError,
        }
    }
}

impl<'a> From<nom::Err<(&'a [u8], nom::error::ErrorKind)>> for Error {
    fn from(e: nom::Err<(&'a [u8], nom::error::ErrorKind)>) -> Error {
        Error::Parse(e.to_owned())
    }
}

impl From<vrpdb::error::Error> for Error {
    fn from(e: vrpdb::error::Error) -> Error {
        use vrpdb::error::Error as E;
        let code = match e {
            E::DuplicateAnnouncement(_) => ErrorCode::DuplicateAnnouncement,
            E::UnknownWithdrawal(_) => ErrorCode::WithdrawalOfUnknownRecord,
            _ => ErrorCode::CorruptData,
        };
        Error::protocol(code, e.to_string())
    }
}
