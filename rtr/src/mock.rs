// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! An in-process RTR cache speaking the real wire format over TCP.
//!
//! Serves a VRP set that tests can update while routers are connected.
//! Every update is kept as a delta so serial queries get incremental
//! answers, and connected routers are sent a Serial Notify.

use crate::error::Error;
use crate::messages::{
    EndOfData, ErrorCode, ErrorReport, Header, Pdu, PrefixPdu, Timing,
    RTR_MAX_VERSION,
};
use rpki_common::lock;
use rpki_types::Vrp;
use slog::{debug, info, warn, Logger};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{sleep, spawn};
use std::time::Duration;

const POLL: Duration = Duration::from_millis(50);

/// One update: withdrawals then announcements.
#[derive(Debug, Clone, Default)]
struct Update {
    announce: Vec<Vrp>,
    withdraw: Vec<Vrp>,
}

struct MockState {
    max_version: u8,
    session_id: u16,
    serial: u32,
    vrps: BTreeSet<Vrp>,

    /// The update that produced each serial.
    history: BTreeMap<u32, Update>,

    no_data: bool,
    timing: Timing,
    clients: Vec<Client>,
    connections: usize,
    errors: Vec<ErrorReport>,
}

#[derive(Clone)]
struct Client {
    stream: Arc<Mutex<TcpStream>>,

    /// Version the router is speaking, once known.
    version: Arc<Mutex<Option<u8>>>,
}

pub struct MockCache {
    addr: SocketAddr,
    state: Arc<Mutex<MockState>>,
    shutdown: Arc<AtomicBool>,
    log: Logger,
}

impl MockCache {
    /// Serve `vrps` on an ephemeral loopback port.
    pub fn start<I>(vrps: I, log: Logger) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Vrp>,
    {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(MockState {
            max_version: RTR_MAX_VERSION,
            session_id: 0x1d,
            serial: 1,
            vrps: vrps.into_iter().collect(),
            history: BTreeMap::new(),
            no_data: false,
            timing: Timing {
                refresh: 3600,
                retry: 600,
                expire: 7200,
            },
            clients: Vec::new(),
            connections: 0,
            errors: Vec::new(),
        }));
        let shutdown = Arc::new(AtomicBool::new(false));
        let mock = Self {
            addr,
            state,
            shutdown,
            log,
        };
        mock.accept_loop(listener);
        info!(mock.log, "mock cache listening on {addr}");
        Ok(mock)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn vrps(&self) -> BTreeSet<Vrp> {
        lock!(self.state).vrps.clone()
    }

    pub fn serial(&self) -> u32 {
        lock!(self.state).serial
    }

    /// Number of router connections accepted so far.
    pub fn connections(&self) -> usize {
        lock!(self.state).connections
    }

    /// Error Reports received from routers.
    pub fn errors(&self) -> Vec<ErrorReport> {
        lock!(self.state).errors.clone()
    }

    /// Highest protocol version this cache speaks.
    pub fn set_max_version(&self, v: u8) {
        lock!(self.state).max_version = v;
    }

    /// Answer queries with No Data Available.
    pub fn set_no_data(&self, no_data: bool) {
        lock!(self.state).no_data = no_data;
    }

    pub fn set_timing(&self, timing: Timing) {
        lock!(self.state).timing = timing;
    }

    /// Simulate a cache restart: new session id, history forgotten.
    pub fn new_session(&self, session_id: u16) {
        let mut s = lock!(self.state);
        s.session_id = session_id;
        s.history.clear();
    }

    /// Apply an update, bump the serial and notify routers. The update is
    /// recorded as given, so it can be used to send routers bad deltas.
    pub fn update(&self, announce: Vec<Vrp>, withdraw: Vec<Vrp>) {
        let notify = {
            let mut s = lock!(self.state);
            for w in &withdraw {
                s.vrps.remove(w);
            }
            s.vrps.extend(announce.iter().copied());
            s.serial = s.serial.wrapping_add(1);
            let serial = s.serial;
            s.history.insert(serial, Update { announce, withdraw });
            let notify = Pdu::SerialNotify {
                session_id: s.session_id,
                serial,
            };
            (notify, s.clients.clone())
        };
        let (pdu, clients) = notify;
        for c in clients {
            let Some(v) = *lock!(c.version) else { continue };
            if let Err(e) = Self::write(&c.stream, &pdu, v) {
                debug!(self.log, "notify: {e}");
            }
        }
    }

    /// Drop every router connection.
    pub fn drop_clients(&self) {
        let clients = std::mem::take(&mut lock!(self.state).clients);
        for c in clients {
            let _ = lock!(c.stream).shutdown(Shutdown::Both);
        }
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.drop_clients();
    }

    fn accept_loop(&self, listener: TcpListener) {
        let state = self.state.clone();
        let shutdown = self.shutdown.clone();
        let log = self.log.clone();
        spawn(move || loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            match listener.accept() {
                Ok((stream, peer)) => {
                    debug!(log, "mock cache accepted {peer}");
                    if let Err(e) =
                        Self::serve(stream, &state, &shutdown, &log)
                    {
                        warn!(log, "mock cache client setup: {e}");
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => sleep(POLL),
                Err(e) => {
                    warn!(log, "mock cache accept: {e}");
                    sleep(POLL);
                }
            }
        });
    }

    fn serve(
        stream: TcpStream,
        state: &Arc<Mutex<MockState>>,
        shutdown: &Arc<AtomicBool>,
        log: &Logger,
    ) -> Result<(), Error> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(POLL))?;
        let client = Client {
            stream: Arc::new(Mutex::new(stream.try_clone()?)),
            version: Arc::new(Mutex::new(None)),
        };
        {
            let mut s = lock!(state);
            s.connections += 1;
            s.clients.push(client.clone());
        }
        let state = state.clone();
        let shutdown = shutdown.clone();
        let log = log.clone();
        let mut reader = stream;
        spawn(move || loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            let (version, pdu) = match Self::read_pdu(&mut reader) {
                Ok(Some(p)) => p,
                Ok(None) => continue,
                Err(e) => {
                    debug!(log, "mock cache client gone: {e}");
                    break;
                }
            };
            match Self::respond(&state, &client, version, pdu) {
                Ok(true) => {}
                Ok(false) => {
                    let _ = lock!(client.stream).shutdown(Shutdown::Both);
                    break;
                }
                Err(e) => {
                    debug!(log, "mock cache respond: {e}");
                    break;
                }
            }
        });
        Ok(())
    }

    /// `Ok(None)` when nothing arrived within the poll interval.
    fn read_pdu(stream: &mut TcpStream) -> Result<Option<(u8, Pdu)>, Error> {
        let mut hdr = [0u8; Header::WIRE_SIZE];
        match stream.read(&mut hdr[..1]) {
            Ok(0) => return Err(Error::Disconnected),
            Ok(_) => {}
            Err(e)
                if e.kind() == ErrorKind::WouldBlock
                    || e.kind() == ErrorKind::TimedOut =>
            {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        }
        stream.set_read_timeout(None)?;
        let result = (|| {
            stream.read_exact(&mut hdr[1..])?;
            let header = Header::from_wire(&hdr)?;
            let mut buf = hdr.to_vec();
            buf.resize(header.length as usize, 0);
            stream.read_exact(&mut buf[Header::WIRE_SIZE..])?;
            Pdu::from_wire(&buf)
        })();
        stream.set_read_timeout(Some(POLL))?;
        result.map(Some)
    }

    fn write(
        stream: &Mutex<TcpStream>,
        pdu: &Pdu,
        version: u8,
    ) -> Result<(), Error> {
        let buf = pdu.to_wire(version)?;
        lock!(stream).write_all(&buf)?;
        Ok(())
    }

    /// Answer one PDU. Returns false when the connection should close.
    fn respond(
        state: &Mutex<MockState>,
        client: &Client,
        version: u8,
        pdu: Pdu,
    ) -> Result<bool, Error> {
        let s = lock!(state);
        if let Pdu::ErrorReport(e) = pdu {
            drop(s);
            lock!(state).errors.push(e);
            return Ok(false);
        }

        if version > s.max_version {
            let report = ErrorReport::new(
                ErrorCode::UnsupportedProtocolVersion,
                pdu.to_wire(version)?,
                "unsupported version",
            );
            Self::write(&client.stream, &Pdu::ErrorReport(report), s.max_version)?;
            return Ok(false);
        }
        *lock!(client.version) = Some(version);

        let eod = EndOfData {
            session_id: s.session_id,
            serial: s.serial,
            timing: Some(s.timing),
        };
        let mut out: Vec<Pdu> = Vec::new();
        match pdu {
            Pdu::ResetQuery => {
                if s.no_data {
                    out.push(
                        ErrorReport::new(
                            ErrorCode::NoDataAvailable,
                            Vec::new(),
                            "no data",
                        )
                        .into(),
                    );
                } else {
                    out.push(Pdu::CacheResponse {
                        session_id: s.session_id,
                    });
                    out.extend(s.vrps.iter().map(|v| {
                        Pdu::from(PrefixPdu {
                            announce: true,
                            vrp: *v,
                        })
                    }));
                    out.push(eod.into());
                }
            }
            Pdu::SerialQuery { session_id, serial } => {
                let reachable = serial == s.serial
                    || (s.history.contains_key(&serial.wrapping_add(1))
                        && serial < s.serial);
                if session_id != s.session_id || !reachable {
                    out.push(Pdu::CacheReset);
                } else if s.no_data {
                    out.push(
                        ErrorReport::new(
                            ErrorCode::NoDataAvailable,
                            Vec::new(),
                            "no data",
                        )
                        .into(),
                    );
                } else {
                    out.push(Pdu::CacheResponse {
                        session_id: s.session_id,
                    });
                    for (_, u) in s.history.range(serial.wrapping_add(1)..) {
                        out.extend(u.withdraw.iter().map(|v| {
                            Pdu::from(PrefixPdu {
                                announce: false,
                                vrp: *v,
                            })
                        }));
                        out.extend(u.announce.iter().map(|v| {
                            Pdu::from(PrefixPdu {
                                announce: true,
                                vrp: *v,
                            })
                        }));
                    }
                    out.push(eod.into());
                }
            }
            other => {
                let report = ErrorReport::new(
                    ErrorCode::InvalidRequest,
                    other.to_wire(version)?,
                    "routers only send queries",
                );
                Self::write(&client.stream, &Pdu::from(report), version)?;
                return Ok(false);
            }
        }
        drop(s);

        for p in &out {
            Self::write(&client.stream, p, version)?;
        }
        Ok(true)
    }
}

impl Drop for MockCache {
    fn drop(&mut self) {
        self.stop();
    }
}
