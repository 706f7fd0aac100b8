// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::Error;
use crate::messages::Pdu;
use crate::session::FsmEvent;
use slog::Logger;
use std::net::SocketAddr;
use std::sync::mpsc::Sender;
use std::time::Duration;

/// Distinguishes successive connections made by one session, so that events
/// from a connection the session has already abandoned can be told apart.
pub type ConnectionId = u64;

/// A router-side connection to an RTR cache.
///
/// Implementations deliver everything they receive to the session as
/// `FsmEvent`s tagged with their id: decoded PDUs, decode failures and the
/// end of the connection.
pub trait RtrConnection: Clone + Send + Sync + 'static {
    fn new(peer: SocketAddr, id: ConnectionId, log: Logger) -> Self;

    /// Establish the connection and start delivering events. Blocks for at
    /// most `timeout`. On success a `Connected` event has been sent.
    fn connect(
        &self,
        event_tx: Sender<FsmEvent>,
        timeout: Duration,
    ) -> Result<(), Error>;

    /// Send a PDU encoded as protocol `version`.
    fn send(&self, pdu: &Pdu, version: u8) -> Result<(), Error>;

    fn peer(&self) -> SocketAddr;

    fn id(&self) -> ConnectionId;

    /// Tear the connection down. No further events are delivered.
    fn close(&self);
}
