// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The router side of the RPKI to Router protocol (RFC 6810, RFC 8210).

pub mod clock;
pub mod config;
pub mod connection;
pub mod connection_tcp;
pub mod error;
pub mod introspect;
pub mod log;
pub mod manager;
pub mod messages;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

#[cfg(test)]
mod proptest;

#[cfg(test)]
#[macro_use]
extern crate lazy_static;


#[cfg(test)]
pub mod connection_channel;

pub const RTR_PORT: u16 = 323;
pub const COMPONENT_RTR: &str = "rtr";
pub const MOD_SESSION: &str = "session";
pub const MOD_MANAGER: &str = "manager";
pub const MOD_CLOCK: &str = "clock";
pub const MOD_CONNECTION: &str = "connection";

pub const IO_TIMEOUT: std::time::Duration =
    std::time::Duration::from_millis(100);
