// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The router side of one RTR session.
//!
//! A session owns the connection to a single cache. It synchronizes the
//! cache's data with a Reset Query, keeps it current with Serial Queries, and
//! reports complete data sets and deltas to the cache set manager. Nothing
//! is reported until an End of Data closes a response, so a partially
//! received response never leaves the session.
//!
//! ```text
//!                  connect retry
//!   +------+ --------------------> +---------+
//!   | Idle |                       | Connect |
//!   +------+ <-------------------- +---------+
//!      ^        connect failed          |
//!      |                                | connected, send Reset Query
//!      | error / close / timeout        v
//!      |                          +-------+  Cache Response  +-----------+
//!      +------------------------- | Query | ---------------> | Receiving |
//!      |                          +-------+                  +-----------+
//!      |                              ^                            |
//!      |                              | refresh, retry, notify     | End of Data
//!      |                          +-------+                        |
//!      +------------------------- | Ready | <----------------------+
//!                                 +-------+
//! ```

use crate::clock::Clock;
use crate::config::{CacheConfig, SessionTimers};
use crate::connection::{ConnectionId, RtrConnection};
use crate::error::Error;
use crate::log::session_log;
use crate::messages::{
    EndOfData, ErrorCode, ErrorReport, Pdu, PrefixPdu, RTR_MAX_VERSION, RTR_V0,
};
use crate::IO_TIMEOUT;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use chrono::{DateTime, Utc};
use rpki_common::lock;
use rpki_types::{CacheId, CacheState, Vrp};
use slog::Logger;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::marker::PhantomData;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::spawn;
use vrpdb::Delta;

const UNIT_SESSION_RUNNER: &str = "session_runner";

#[derive(Debug, Clone)]
pub enum FsmEvent {
    /// The transport connection is up.
    Connected(ConnectionId),

    ConnectFailed(ConnectionId, String),

    /// A decoded PDU and the protocol version it carried.
    Pdu(ConnectionId, u8, Pdu),

    /// Bytes arrived that could not be decoded.
    RecvError {
        id: ConnectionId,
        code: ErrorCode,
        text: String,
        raw: Vec<u8>,
    },

    ConnectionClosed(ConnectionId, String),

    ConnectRetryTimerExpires,
    RefreshTimerExpires,
    RetryTimerExpires,
    ExpireTimerExpires,
    ResponseTimerExpires,

    /// The session has been removed from configuration.
    Stop,
}

impl FsmEvent {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::ConnectFailed(..) => "connect failed",
            Self::Pdu(..) => "pdu",
            Self::RecvError { .. } => "receive error",
            Self::ConnectionClosed(..) => "connection closed",
            Self::ConnectRetryTimerExpires => "connect retry timer expires",
            Self::RefreshTimerExpires => "refresh timer expires",
            Self::RetryTimerExpires => "retry timer expires",
            Self::ExpireTimerExpires => "expire timer expires",
            Self::ResponseTimerExpires => "response timer expires",
            Self::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Reset,
    Serial,
}

/// An open connection and what has been negotiated on it.
pub struct Link<Cnx> {
    conn: Cnx,
    version: u8,

    /// Set once the cache has sent anything other than an Error Report.
    /// Version negotiation is only possible before this.
    exchanged: bool,
}

/// A response being received. Holds the net change relative to the data
/// the response applies to; empty data for a reset.
#[derive(Debug)]
pub struct Payload {
    kind: QueryKind,
    session_id: u16,
    announce: BTreeSet<Vrp>,
    withdraw: BTreeSet<Vrp>,
}

impl Payload {
    fn new(kind: QueryKind, session_id: u16) -> Self {
        Self {
            kind,
            session_id,
            announce: BTreeSet::new(),
            withdraw: BTreeSet::new(),
        }
    }

    /// Fold one prefix PDU into the payload. `base` is the data the response
    /// applies to.
    fn apply(
        &mut self,
        p: &PrefixPdu,
        base: Option<&BTreeSet<Vrp>>,
    ) -> Result<(), Error> {
        let present = |v: &Vrp| base.is_some_and(|b| b.contains(v));
        let v = p.vrp;
        if p.announce {
            if self.withdraw.remove(&v) {
                return Ok(());
            }
            if self.announce.contains(&v) || present(&v) {
                return Err(Error::protocol(
                    ErrorCode::DuplicateAnnouncement,
                    format!("duplicate announcement {v}"),
                ));
            }
            self.announce.insert(v);
        } else {
            if self.announce.remove(&v) {
                return Ok(());
            }
            if self.withdraw.contains(&v) || !present(&v) {
                return Err(Error::protocol(
                    ErrorCode::WithdrawalOfUnknownRecord,
                    format!("withdrawal of unknown record {v}"),
                ));
            }
            self.withdraw.insert(v);
        }
        Ok(())
    }
}

pub enum FsmState<Cnx> {
    /// Not connected. Waiting for the connect retry timer.
    Idle,

    /// Transport connection attempt in progress.
    Connect(Cnx),

    /// A query has been sent and the Cache Response is outstanding.
    Query(Link<Cnx>, QueryKind),

    /// Receiving the payload of a response.
    Receiving(Link<Cnx>, Payload),

    /// Connected with no query outstanding.
    Ready(Link<Cnx>),

    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmStateKind {
    Idle,
    Connect,
    Query,
    Receiving,
    Ready,
    Stopped,
}

impl Display for FsmStateKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connect => write!(f, "connect"),
            Self::Query => write!(f, "query"),
            Self::Receiving => write!(f, "receiving"),
            Self::Ready => write!(f, "ready"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

impl<Cnx> From<&FsmState<Cnx>> for FsmStateKind {
    fn from(s: &FsmState<Cnx>) -> Self {
        match s {
            FsmState::Idle => Self::Idle,
            FsmState::Connect(_) => Self::Connect,
            FsmState::Query(..) => Self::Query,
            FsmState::Receiving(..) => Self::Receiving,
            FsmState::Ready(_) => Self::Ready,
            FsmState::Stopped => Self::Stopped,
        }
    }
}

/// A complete data set from one cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceData {
    pub session_id: u16,
    pub serial: u32,
    pub vrps: BTreeSet<Vrp>,
    pub synced_at: DateTime<Utc>,
}

/// What a session reports to the cache set manager.
#[derive(Debug, Clone)]
pub struct CacheEvent {
    pub id: CacheId,

    /// Incarnation of the session that produced the event.
    pub instance: u64,

    pub kind: CacheEventKind,
}

#[derive(Debug, Clone)]
pub enum CacheEventKind {
    State(CacheState),

    /// A reset response completed.
    Reset(Arc<SourceData>),

    /// A serial response completed. `data` is the result of applying
    /// `delta` to the previous data.
    Delta { data: Arc<SourceData>, delta: Delta },

    /// The data expired without a successful refresh.
    Expired,
}

/// Session detail exported for introspection.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub state: CacheState,
    pub fsm_state: FsmStateKind,
    pub protocol_version: Option<u8>,
    pub session_id: Option<u16>,
    pub serial: Option<u32>,
    pub vrp_count: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub connect_attempts: u64,
    pub errors: u64,
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self {
            state: CacheState::Down,
            fsm_state: FsmStateKind::Idle,
            protocol_version: None,
            session_id: None,
            serial: None,
            vrp_count: 0,
            last_sync: None,
            connect_attempts: 0,
            errors: 0,
        }
    }
}

/// Control handle for a running session.
pub struct SessionHandle {
    pub id: CacheId,
    pub instance: u64,
    event_tx: Sender<FsmEvent>,
    info: Arc<Mutex<SessionInfo>>,
}

impl SessionHandle {
    /// Stop the session. Partial data is discarded and no further events
    /// are reported.
    pub fn stop(&self) {
        let _ = self.event_tx.send(FsmEvent::Stop);
    }

    pub fn info(&self) -> SessionInfo {
        lock!(self.info).clone()
    }
}

/// Start a session to the cache in `config`, reporting to `cache_tx`.
pub fn start_session<Cnx: RtrConnection>(
    config: CacheConfig,
    instance: u64,
    cache_tx: Sender<CacheEvent>,
    log: Logger,
) -> SessionHandle {
    let (event_tx, event_rx) = channel();
    let info = Arc::new(Mutex::new(SessionInfo::default()));
    let handle = SessionHandle {
        id: config.id(),
        instance,
        event_tx: event_tx.clone(),
        info: info.clone(),
    };
    let runner = SessionRunner::<Cnx>::new(
        config, instance, event_tx, event_rx, cache_tx, info, log,
    );
    spawn(move || runner.run());
    handle
}

pub struct SessionRunner<Cnx: RtrConnection> {
    config: CacheConfig,
    instance: u64,
    event_tx: Sender<FsmEvent>,
    event_rx: Receiver<FsmEvent>,
    cache_tx: Sender<CacheEvent>,
    clock: Clock,

    /// Timers currently in effect, including any adopted from the cache.
    timers: SessionTimers,

    backoff: ExponentialBackoff,

    /// Version to open connections with. Drops to 0 for good when the
    /// cache does not speak version 1.
    version: u8,

    data: Option<Arc<SourceData>>,
    next_conn_id: ConnectionId,
    info: Arc<Mutex<SessionInfo>>,
    log: Logger,
    _cnx: PhantomData<fn() -> Cnx>,
}

impl<Cnx: RtrConnection> SessionRunner<Cnx> {
    fn new(
        config: CacheConfig,
        instance: u64,
        event_tx: Sender<FsmEvent>,
        event_rx: Receiver<FsmEvent>,
        cache_tx: Sender<CacheEvent>,
        info: Arc<Mutex<SessionInfo>>,
        log: Logger,
    ) -> Self {
        let timers = config.timers;
        let clock = Clock::new(&timers, event_tx.clone(), log.clone());
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(timers.connect_retry())
            .with_max_interval(timers.max_connect_retry())
            .with_multiplier(2.0)
            .with_randomization_factor(0.25)
            .with_max_elapsed_time(None)
            .build();
        Self {
            config,
            instance,
            event_tx,
            event_rx,
            cache_tx,
            clock,
            timers,
            backoff,
            version: RTR_MAX_VERSION,
            data: None,
            next_conn_id: 0,
            info,
            log,
            _cnx: PhantomData,
        }
    }

    pub fn run(mut self) {
        session_log!(self, info, "session started");
        let mut current = self.connect();
        loop {
            let kind = FsmStateKind::from(&current);
            let next = match current {
                FsmState::Idle => self.idle(),
                FsmState::Connect(conn) => self.connecting(conn),
                FsmState::Query(link, q) => self.query(link, q),
                FsmState::Receiving(link, p) => self.receiving(link, p),
                FsmState::Ready(link) => self.ready(link),
                FsmState::Stopped => break,
            };
            let next_kind = FsmStateKind::from(&next);
            if next_kind != kind {
                session_log!(self, debug, "fsm transition {kind} -> {next_kind}");
                lock!(self.info).fsm_state = next_kind;
            }
            current = next;
        }
        self.clock.disable_all();
        self.clock.stop();
        session_log!(self, info, "session stopped");
    }

    fn next_event(&self) -> Option<FsmEvent> {
        match self.event_rx.recv_timeout(IO_TIMEOUT) {
            Ok(e) => {
                session_log!(self, trace, "event {}", e.title());
                Some(e)
            }
            Err(RecvTimeoutError::Timeout) => None,
            // The runner holds a sender, so this cannot happen while it runs.
            Err(RecvTimeoutError::Disconnected) => Some(FsmEvent::Stop),
        }
    }

    fn emit(&self, kind: CacheEventKind) {
        let e = CacheEvent {
            id: self.config.id(),
            instance: self.instance,
            kind,
        };
        if let Err(e) = self.cache_tx.send(e) {
            session_log!(self, warn, "send cache event: {e}");
        }
    }

    fn set_state(&self, s: CacheState) {
        let changed = {
            let mut info = lock!(self.info);
            let changed = info.state != s;
            info.state = s;
            changed
        };
        if changed {
            session_log!(self, info, "cache state {s}");
            self.emit(CacheEventKind::State(s));
        }
    }

    fn idle(&mut self) -> FsmState<Cnx> {
        match self.next_event() {
            Some(FsmEvent::ConnectRetryTimerExpires) => self.connect(),
            Some(FsmEvent::Stop) => FsmState::Stopped,
            Some(FsmEvent::ExpireTimerExpires) => {
                self.expire(false);
                FsmState::Idle
            }
            _ => FsmState::Idle,
        }
    }

    fn connect(&mut self) -> FsmState<Cnx> {
        self.next_conn_id += 1;
        let conn = Cnx::new(
            self.config.id().sockaddr(),
            self.next_conn_id,
            self.log.clone(),
        );
        lock!(self.info).connect_attempts += 1;
        self.set_state(CacheState::Connecting);

        let c = conn.clone();
        let tx = self.event_tx.clone();
        let timeout = self.timers.connect_timeout();
        spawn(move || {
            if let Err(e) = c.connect(tx.clone(), timeout) {
                let _ = tx.send(FsmEvent::ConnectFailed(c.id(), e.to_string()));
            }
        });
        FsmState::Connect(conn)
    }

    fn connecting(&mut self, conn: Cnx) -> FsmState<Cnx> {
        let event = match self.next_event() {
            Some(e) => e,
            None => return FsmState::Connect(conn),
        };
        match event {
            FsmEvent::Connected(id) if id == conn.id() => {
                session_log!(self, info, "connected";
                    "version" => self.version
                );
                lock!(self.info).protocol_version = Some(self.version);
                self.set_state(CacheState::Established);
                let link = Link {
                    conn,
                    version: self.version,
                    exchanged: false,
                };
                self.send_query(link, QueryKind::Reset)
            }
            FsmEvent::ConnectFailed(id, reason)
            | FsmEvent::ConnectionClosed(id, reason)
                if id == conn.id() =>
            {
                session_log!(self, debug, "connect failed: {reason}");
                self.down(&conn)
            }
            FsmEvent::Stop => {
                conn.close();
                FsmState::Stopped
            }
            FsmEvent::ExpireTimerExpires => {
                self.expire(false);
                FsmState::Connect(conn)
            }
            _ => FsmState::Connect(conn),
        }
    }

    fn query(&mut self, mut link: Link<Cnx>, q: QueryKind) -> FsmState<Cnx> {
        let event = match self.next_event() {
            Some(e) => e,
            None => return FsmState::Query(link, q),
        };
        let (version, pdu) = match event {
            FsmEvent::Pdu(id, version, pdu) if id == link.conn.id() => {
                (version, pdu)
            }
            other => {
                return match self.link_event(&link, other) {
                    Some(next) => next,
                    None => FsmState::Query(link, q),
                }
            }
        };

        if let Pdu::ErrorReport(report) = pdu {
            return self.error_report(link, report);
        }
        if let Err(e) = self.check_version(&mut link, version) {
            return self.protocol_error(link, e, Some((version, &pdu)));
        }

        match pdu {
            Pdu::CacheResponse { session_id } => {
                if q == QueryKind::Serial {
                    let expected = self.data.as_ref().map(|d| d.session_id);
                    if expected != Some(session_id) {
                        let e = Error::protocol(
                            ErrorCode::CorruptData,
                            format!(
                                "session id {session_id} does not match \
                                 {expected:?}"
                            ),
                        );
                        return self.protocol_error(
                            link,
                            e,
                            Some((version, &pdu)),
                        );
                    }
                }
                FsmState::Receiving(link, Payload::new(q, session_id))
            }
            Pdu::CacheReset if q == QueryKind::Serial => {
                session_log!(self, info, "cache reset, sending reset query");
                self.send_query(link, QueryKind::Reset)
            }
            Pdu::SerialNotify { .. } => FsmState::Query(link, q),
            other => self.unexpected(link, version, other),
        }
    }

    fn receiving(
        &mut self,
        mut link: Link<Cnx>,
        mut payload: Payload,
    ) -> FsmState<Cnx> {
        let event = match self.next_event() {
            Some(e) => e,
            None => return FsmState::Receiving(link, payload),
        };
        let (version, pdu) = match event {
            FsmEvent::Pdu(id, version, pdu) if id == link.conn.id() => {
                (version, pdu)
            }
            other => {
                return match self.link_event(&link, other) {
                    Some(next) => next,
                    None => FsmState::Receiving(link, payload),
                }
            }
        };

        if let Pdu::ErrorReport(report) = pdu {
            return self.error_report(link, report);
        }
        if let Err(e) = self.check_version(&mut link, version) {
            return self.protocol_error(link, e, Some((version, &pdu)));
        }

        match pdu {
            Pdu::Prefix(ref p) => {
                let base = match payload.kind {
                    QueryKind::Reset => None,
                    QueryKind::Serial => self.data.as_ref().map(|d| &d.vrps),
                };
                if let Err(e) = payload.apply(p, base) {
                    return self.protocol_error(link, e, Some((version, &pdu)));
                }
                FsmState::Receiving(link, payload)
            }
            Pdu::RouterKey(k) => {
                session_log!(self, trace, "ignoring router key for AS{}", k.asn);
                FsmState::Receiving(link, payload)
            }
            Pdu::EndOfData(eod) => {
                if eod.session_id != payload.session_id {
                    let e = Error::protocol(
                        ErrorCode::CorruptData,
                        format!(
                            "end of data session {} in response for session {}",
                            eod.session_id, payload.session_id
                        ),
                    );
                    return self.protocol_error(
                        link,
                        e,
                        Some((version, &Pdu::EndOfData(eod))),
                    );
                }
                self.commit(link, payload, eod)
            }
            Pdu::SerialNotify { .. } => FsmState::Receiving(link, payload),
            other => self.unexpected(link, version, other),
        }
    }

    fn ready(&mut self, mut link: Link<Cnx>) -> FsmState<Cnx> {
        let event = match self.next_event() {
            Some(e) => e,
            None => return FsmState::Ready(link),
        };
        match event {
            FsmEvent::Pdu(id, version, pdu) if id == link.conn.id() => {
                if let Pdu::ErrorReport(report) = pdu {
                    return self.error_report(link, report);
                }
                if let Err(e) = self.check_version(&mut link, version) {
                    return self.protocol_error(link, e, Some((version, &pdu)));
                }
                match pdu {
                    Pdu::SerialNotify { serial, .. } => {
                        session_log!(self, debug, "serial notify {serial}");
                        let q = self.next_query();
                        self.send_query(link, q)
                    }
                    other => self.unexpected(link, version, other),
                }
            }
            FsmEvent::RefreshTimerExpires | FsmEvent::RetryTimerExpires => {
                let q = self.next_query();
                self.send_query(link, q)
            }
            other => match self.link_event(&link, other) {
                Some(next) => next,
                None => FsmState::Ready(link),
            },
        }
    }

    /// Handle the events every connected state treats alike. Returns `None`
    /// when the state should not change.
    fn link_event(
        &mut self,
        link: &Link<Cnx>,
        event: FsmEvent,
    ) -> Option<FsmState<Cnx>> {
        match event {
            FsmEvent::RecvError {
                id,
                code,
                text,
                raw,
            } if id == link.conn.id() => {
                self.send_error(link, code, raw, &text);
                Some(self.down(&link.conn))
            }
            FsmEvent::ConnectionClosed(id, reason) if id == link.conn.id() => {
                session_log!(self, warn, "connection closed: {reason}");
                Some(self.down(&link.conn))
            }
            FsmEvent::ResponseTimerExpires => {
                session_log!(self, warn, "no response from cache");
                Some(self.down(&link.conn))
            }
            FsmEvent::ExpireTimerExpires => {
                self.expire(true);
                None
            }
            FsmEvent::Stop => {
                link.conn.close();
                Some(FsmState::Stopped)
            }
            _ => None,
        }
    }

    fn check_version(
        &mut self,
        link: &mut Link<Cnx>,
        version: u8,
    ) -> Result<(), Error> {
        if version == link.version {
            link.exchanged = true;
            return Ok(());
        }
        // A cache may answer the first query with a lower version it
        // supports.
        if !link.exchanged && version < link.version {
            session_log!(self, info, "cache answered with version {version}");
            link.version = version;
            link.exchanged = true;
            self.version = version;
            lock!(self.info).protocol_version = Some(version);
            return Ok(());
        }
        Err(Error::protocol(
            ErrorCode::UnexpectedProtocolVersion,
            format!("expected version {} got {version}", link.version),
        ))
    }

    fn next_query(&self) -> QueryKind {
        if self.data.is_some() {
            QueryKind::Serial
        } else {
            QueryKind::Reset
        }
    }

    fn send_query(&mut self, link: Link<Cnx>, q: QueryKind) -> FsmState<Cnx> {
        let pdu = match (q, &self.data) {
            (QueryKind::Serial, Some(d)) => Pdu::SerialQuery {
                session_id: d.session_id,
                serial: d.serial,
            },
            _ => Pdu::ResetQuery,
        };
        let q = match pdu {
            Pdu::ResetQuery => QueryKind::Reset,
            _ => QueryKind::Serial,
        };
        session_log!(self, debug, "send {pdu}");
        if let Err(e) = link.conn.send(&pdu, link.version) {
            session_log!(self, warn, "send query: {e}");
            return self.down(&link.conn);
        }
        lock!(self.clock.timers.refresh_timer).disable();
        lock!(self.clock.timers.retry_timer).disable();
        self.clock.timers.response_timer.arm();
        FsmState::Query(link, q)
    }

    fn commit(
        &mut self,
        link: Link<Cnx>,
        payload: Payload,
        eod: EndOfData,
    ) -> FsmState<Cnx> {
        let now = Utc::now();
        match payload.kind {
            QueryKind::Reset => {
                let data = Arc::new(SourceData {
                    session_id: eod.session_id,
                    serial: eod.serial,
                    vrps: payload.announce,
                    synced_at: now,
                });
                session_log!(self, info, "reset complete";
                    "serial" => eod.serial,
                    "vrps" => data.vrps.len()
                );
                self.data = Some(data.clone());
                self.emit(CacheEventKind::Reset(data));
            }
            QueryKind::Serial => {
                let Some(mut data) = self.data.clone() else {
                    // Expired while the response was in flight.
                    return self.send_query(link, QueryKind::Reset);
                };
                let delta = Delta {
                    source: self.config.id(),
                    session_id: eod.session_id,
                    from_serial: data.serial,
                    to_serial: eod.serial,
                    announce: payload.announce.iter().copied().collect(),
                    withdraw: payload.withdraw.iter().copied().collect(),
                };
                {
                    let d = Arc::make_mut(&mut data);
                    for v in &payload.withdraw {
                        d.vrps.remove(v);
                    }
                    d.vrps.extend(payload.announce.iter().copied());
                    d.serial = eod.serial;
                    d.synced_at = now;
                }
                session_log!(self, info, "serial update complete";
                    "serial" => eod.serial,
                    "announced" => delta.announce.len(),
                    "withdrawn" => delta.withdraw.len()
                );
                self.data = Some(data.clone());
                self.emit(CacheEventKind::Delta { data, delta });
            }
        }

        if let Some(t) = eod.timing {
            if t.is_valid() {
                self.timers.adopt(&t);
                lock!(self.clock.timers.refresh_timer).interval =
                    self.timers.refresh();
                lock!(self.clock.timers.retry_timer).interval =
                    self.timers.retry();
                lock!(self.clock.timers.expire_timer).interval =
                    self.timers.expire();
            } else {
                session_log!(self, warn, "ignoring out of range timing {t:?}");
            }
        }

        self.backoff.reset();
        self.clock.timers.response_timer.disable();
        lock!(self.clock.timers.refresh_timer).arm();
        lock!(self.clock.timers.expire_timer).arm();
        {
            let mut info = lock!(self.info);
            if let Some(d) = &self.data {
                info.session_id = Some(d.session_id);
                info.serial = Some(d.serial);
                info.vrp_count = d.vrps.len();
                info.last_sync = Some(d.synced_at);
            }
        }
        self.set_state(CacheState::Synchronized);
        FsmState::Ready(link)
    }

    fn error_report(
        &mut self,
        link: Link<Cnx>,
        report: ErrorReport,
    ) -> FsmState<Cnx> {
        session_log!(self, warn, "error report from cache: {}", report.code;
            "text" => report.text.clone()
        );
        match report.code {
            ErrorCode::NoDataAvailable => {
                self.clock.timers.response_timer.disable();
                lock!(self.clock.timers.retry_timer).arm();
                FsmState::Ready(link)
            }
            ErrorCode::UnsupportedProtocolVersion
                if !link.exchanged && link.version > RTR_V0 =>
            {
                session_log!(self, info, "downgrading to version 0");
                link.conn.close();
                self.clock.timers.response_timer.disable();
                self.version = RTR_V0;
                self.connect()
            }
            _ => {
                lock!(self.info).errors += 1;
                self.down(&link.conn)
            }
        }
    }

    /// A PDU that is well formed but has no place in the current state.
    fn unexpected(
        &mut self,
        link: Link<Cnx>,
        version: u8,
        pdu: Pdu,
    ) -> FsmState<Cnx> {
        let code = match pdu {
            Pdu::SerialQuery { .. } | Pdu::ResetQuery => {
                ErrorCode::UnsupportedPduType
            }
            _ => ErrorCode::CorruptData,
        };
        let e = Error::protocol(code, format!("unexpected {pdu}"));
        self.protocol_error(link, e, Some((version, &pdu)))
    }

    /// Report `e` to the cache and drop the connection.
    fn protocol_error(
        &mut self,
        link: Link<Cnx>,
        e: Error,
        pdu: Option<(u8, &Pdu)>,
    ) -> FsmState<Cnx> {
        session_log!(self, error, "protocol error: {e}");
        let raw = pdu
            .and_then(|(v, p)| p.to_wire(v).ok())
            .unwrap_or_default();
        self.send_error(&link, e.error_code(), raw, &e.to_string());
        self.down(&link.conn)
    }

    fn send_error(
        &self,
        link: &Link<Cnx>,
        code: ErrorCode,
        raw: Vec<u8>,
        text: &str,
    ) {
        lock!(self.info).errors += 1;
        let report = Pdu::ErrorReport(ErrorReport::new(code, raw, text));
        if let Err(e) = link.conn.send(&report, link.version) {
            session_log!(self, debug, "send error report: {e}");
        }
    }

    /// Close the connection, drop the data and schedule a reconnect.
    fn down(&mut self, conn: &Cnx) -> FsmState<Cnx> {
        conn.close();
        self.clock.timers.response_timer.disable();
        lock!(self.clock.timers.refresh_timer).disable();
        lock!(self.clock.timers.retry_timer).disable();
        lock!(self.clock.timers.expire_timer).disable();
        self.data = None;
        {
            let mut info = lock!(self.info);
            info.session_id = None;
            info.serial = None;
            info.vrp_count = 0;
        }
        self.set_state(CacheState::Down);

        let wait = self
            .backoff
            .next_backoff()
            .unwrap_or(self.timers.max_connect_retry());
        session_log!(self, info, "reconnecting in {wait:?}");
        let mut t = lock!(self.clock.timers.connect_retry_timer);
        t.interval = wait;
        t.arm();
        FsmState::Idle
    }

    fn expire(&mut self, connected: bool) {
        if self.data.take().is_none() {
            return;
        }
        session_log!(self, warn, "data expired");
        {
            let mut info = lock!(self.info);
            info.session_id = None;
            info.serial = None;
            info.vrp_count = 0;
        }
        self.emit(CacheEventKind::Expired);
        if connected {
            self.set_state(CacheState::Established);
        } else {
            self.set_state(CacheState::Down);
        }
    }
}
