// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// This file contains code for testing purposes only. Note that it's only
/// included in `lib.rs` with a `#[cfg(test)]` guard. It implements
/// `RtrConnection` over a simulated network of channels so the session state
/// machine can be driven PDU by PDU from a test acting as the cache.
use crate::{
    connection::{ConnectionId, RtrConnection},
    error::Error,
    log::connection_log,
    messages::Pdu,
    session::FsmEvent,
    IO_TIMEOUT,
};
use rpki_common::lock;
use slog::Logger;
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel as mpsc_channel, Receiver, RecvTimeoutError, Sender},
        Arc, Mutex,
    },
    thread::spawn,
    time::Duration,
};

/// What travels over the simulated wire: a protocol version and a PDU.
pub type Frame = (u8, Pdu);

lazy_static! {
    static ref NET: Network = Network::new();
}

/// Maps socket addresses to the listeners bound there.
pub struct Network {
    endpoints: Mutex<HashMap<SocketAddr, Sender<Endpoint<Frame>>>>,
}

impl Network {
    fn new() -> Self {
        Self {
            endpoints: Mutex::new(HashMap::new()),
        }
    }

    fn bind(&self, sa: SocketAddr) -> Listener {
        let (tx, rx) = mpsc_channel();
        lock!(self.endpoints).insert(sa, tx);
        Listener { rx }
    }

    fn connect(&self, to: SocketAddr, ep: Endpoint<Frame>) -> Result<(), Error> {
        match lock!(self.endpoints).get(&to) {
            None => Err(Error::ChannelConnect),
            Some(sender) => sender
                .send(ep)
                .map_err(|e| Error::ChannelSend(e.to_string())),
        }
    }
}

/// The cache side of the simulated network.
pub struct Listener {
    rx: Receiver<Endpoint<Frame>>,
}

impl Listener {
    pub fn bind(sa: SocketAddr) -> Self {
        NET.bind(sa)
    }

    pub fn accept(&self, timeout: Duration) -> Result<Endpoint<Frame>, Error> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => Error::Timeout,
            RecvTimeoutError::Disconnected => Error::Disconnected,
        })
    }
}

#[derive(Clone)]
pub struct RtrConnectionChannel {
    peer: SocketAddr,
    id: ConnectionId,
    tx: Arc<Mutex<Option<Sender<Frame>>>>,
    dropped: Arc<AtomicBool>,
    log: Logger,
}

impl RtrConnection for RtrConnectionChannel {
    fn new(peer: SocketAddr, id: ConnectionId, log: Logger) -> Self {
        Self {
            peer,
            id,
            tx: Arc::new(Mutex::new(None)),
            dropped: Arc::new(AtomicBool::new(false)),
            log,
        }
    }

    fn connect(
        &self,
        event_tx: Sender<FsmEvent>,
        _timeout: Duration,
    ) -> Result<(), Error> {
        let (local, remote) = channel();
        NET.connect(self.peer, remote)?;
        lock!(self.tx).replace(local.tx);
        connection_log!(self, debug, "channel connected");
        event_tx
            .send(FsmEvent::Connected(self.id))
            .map_err(|e| Error::ChannelSend(e.to_string()))?;
        Self::spawn_recv_loop(
            self.id,
            local.rx,
            event_tx,
            self.dropped.clone(),
        );
        Ok(())
    }

    fn send(&self, pdu: &Pdu, version: u8) -> Result<(), Error> {
        // Encode anyway so the codec is exercised on the send path.
        pdu.to_wire(version)?;
        match lock!(self.tx).as_ref() {
            Some(tx) => tx
                .send((version, pdu.clone()))
                .map_err(|e| Error::ChannelSend(e.to_string())),
            None => Err(Error::NotConnected),
        }
    }

    fn peer(&self) -> SocketAddr {
        self.peer
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn close(&self) {
        self.dropped.store(true, Ordering::Relaxed);
        lock!(self.tx).take();
    }
}

impl RtrConnectionChannel {
    fn spawn_recv_loop(
        id: ConnectionId,
        rx: Receiver<Frame>,
        event_tx: Sender<FsmEvent>,
        dropped: Arc<AtomicBool>,
    ) {
        spawn(move || loop {
            if dropped.load(Ordering::Relaxed) {
                break;
            }
            match rx.recv_timeout(IO_TIMEOUT) {
                Ok((version, pdu)) => {
                    if event_tx.send(FsmEvent::Pdu(id, version, pdu)).is_err()
                    {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    let _ = event_tx.send(FsmEvent::ConnectionClosed(
                        id,
                        "channel closed".into(),
                    ));
                    break;
                }
            }
        });
    }
}

/// A combined (duplex) mpsc sender/receiver.
pub struct Endpoint<T> {
    pub rx: Receiver<T>,
    pub tx: Sender<T>,
}

pub fn channel<T>() -> (Endpoint<T>, Endpoint<T>) {
    let (tx_a, rx_b) = mpsc_channel();
    let (tx_b, rx_a) = mpsc_channel();
    (
        Endpoint { rx: rx_a, tx: tx_a },
        Endpoint { rx: rx_b, tx: tx_b },
    )
}
