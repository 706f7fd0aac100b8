// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use dropshot::HttpError;
use http::StatusCode;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("rtr error: {0}")]
    Rtr(#[from] rtr::error::Error),
}

impl From<Error> for HttpError {
    fn from(value: Error) -> Self {
        match value {
            Error::NotFound(_) => Self::for_not_found(None, value.to_string()),
            Error::BadRequest(ref msg) => {
                Self::for_bad_request(None, msg.clone())
            }
            Error::Rtr(ref err) => match err {
                rtr::error::Error::Duplicate(..) => Self::for_status(
                    Some(value.to_string()),
                    StatusCode::CONFLICT,
                ),
                rtr::error::Error::NotFound { .. } => {
                    Self::for_not_found(None, value.to_string())
                }
                _ => Self::for_internal_error(value.to_string()),
            },
        }
    }
}
