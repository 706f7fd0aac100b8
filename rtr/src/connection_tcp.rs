// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::connection::{ConnectionId, RtrConnection};
use crate::error::Error;
use crate::log::connection_log;
use crate::messages::{Header, Pdu};
use crate::session::FsmEvent;
use crate::IO_TIMEOUT;
use rpki_common::lock;
use slog::Logger;
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::spawn;
use std::time::Duration;

#[derive(Clone)]
pub struct RtrConnectionTcp {
    peer: SocketAddr,
    id: ConnectionId,
    conn: Arc<Mutex<Option<TcpStream>>>,
    dropped: Arc<AtomicBool>,
    log: Logger,
}

/// Why the receive loop stopped reading.
enum RecvFailure {
    /// Shut down locally.
    Dropped,

    /// The stream ended or failed.
    Closed(String),

    /// Bytes arrived that do not decode. Carries the raw PDU, or as much of
    /// it as was read.
    Decode(Error, Vec<u8>),
}

impl RtrConnection for RtrConnectionTcp {
    fn new(peer: SocketAddr, id: ConnectionId, log: Logger) -> Self {
        Self {
            peer,
            id,
            conn: Arc::new(Mutex::new(None)),
            dropped: Arc::new(AtomicBool::new(false)),
            log,
        }
    }

    fn connect(
        &self,
        event_tx: Sender<FsmEvent>,
        timeout: Duration,
    ) -> Result<(), Error> {
        let stream = match TcpStream::connect_timeout(&self.peer, timeout) {
            Ok(s) => s,
            Err(e) => {
                connection_log!(self, debug, "connect error: {e}");
                return Err(Error::Io(e));
            }
        };
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        {
            let mut guard = lock!(self.conn);
            // Closed while the connect was in flight.
            if self.dropped.load(Ordering::Relaxed) {
                let _ = stream.shutdown(Shutdown::Both);
                return Err(Error::Disconnected);
            }
            guard.replace(stream.try_clone()?);
        }
        // Connected must reach the FSM ahead of anything the receive loop
        // reads, or a cache that speaks first has its PDUs dropped.
        connection_log!(self, info, "connected");
        event_tx.send(FsmEvent::Connected(self.id)).map_err(|e| {
            Error::InternalCommunication(format!("fsm-send: connected: {e}"))
        })?;
        Self::recv(
            self.peer,
            self.id,
            event_tx,
            stream,
            self.dropped.clone(),
            self.log.clone(),
        );
        Ok(())
    }

    fn send(&self, pdu: &Pdu, version: u8) -> Result<(), Error> {
        let buf = pdu.to_wire(version)?;
        connection_log!(self, trace, "send {pdu}"; "version" => version);
        let mut guard = lock!(self.conn);
        match *guard {
            Some(ref mut stream) => {
                stream.write_all(&buf)?;
                Ok(())
            }
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
        if let Some(stream) = lock!(self.conn).take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl RtrConnectionTcp {
    fn recv(
        peer: SocketAddr,
        id: ConnectionId,
        event_tx: Sender<FsmEvent>,
        mut conn: TcpStream,
        dropped: Arc<AtomicBool>,
        log: Logger,
    ) {
        // Only used for logging from the receive loop.
        let ctx = LogCtx { peer, id, log };
        connection_log!(ctx, debug, "spawning recv loop");

        spawn(move || loop {
            match Self::recv_pdu(&mut conn, &dropped) {
                Ok((version, pdu)) => {
                    connection_log!(ctx, trace, "recv {pdu}";
                        "version" => version
                    );
                    if event_tx.send(FsmEvent::Pdu(id, version, pdu)).is_err()
                    {
                        break;
                    }
                }
                Err(RecvFailure::Dropped) => break,
                Err(RecvFailure::Closed(reason)) => {
                    connection_log!(ctx, info, "connection closed: {reason}");
                    let _ = event_tx.send(FsmEvent::ConnectionClosed(id, reason));
                    break;
                }
                Err(RecvFailure::Decode(e, raw)) => {
                    connection_log!(ctx, warn, "pdu decode error: {e}");
                    let _ = event_tx.send(FsmEvent::RecvError {
                        id,
                        code: e.error_code(),
                        text: e.to_string(),
                        raw,
                    });
                    // The stream cannot be resynchronized after a bad PDU.
                    break;
                }
            }
        });
    }

    /// Fill `buf` completely, riding out read timeouts until the connection
    /// is dropped.
    fn read_full(
        stream: &mut TcpStream,
        buf: &mut [u8],
        dropped: &AtomicBool,
    ) -> Result<(), RecvFailure> {
        let mut i = 0;
        while i < buf.len() {
            if dropped.load(Ordering::Relaxed) {
                return Err(RecvFailure::Dropped);
            }
            match stream.read(&mut buf[i..]) {
                Ok(0) => {
                    return Err(RecvFailure::Closed("closed by peer".into()))
                }
                Ok(n) => i += n,
                Err(e)
                    if e.kind() == ErrorKind::WouldBlock
                        || e.kind() == ErrorKind::TimedOut
                        || e.kind() == ErrorKind::Interrupted =>
                {
                    continue
                }
                Err(e) => {
                    if dropped.load(Ordering::Relaxed) {
                        return Err(RecvFailure::Dropped);
                    }
                    return Err(RecvFailure::Closed(e.to_string()));
                }
            }
        }
        Ok(())
    }

    fn recv_pdu(
        stream: &mut TcpStream,
        dropped: &AtomicBool,
    ) -> Result<(u8, Pdu), RecvFailure> {
        let mut hdr = [0u8; Header::WIRE_SIZE];
        Self::read_full(stream, &mut hdr, dropped)?;
        let header = Header::from_wire(&hdr)
            .map_err(|e| RecvFailure::Decode(e, hdr.to_vec()))?;

        let mut buf = hdr.to_vec();
        buf.resize(header.length as usize, 0);
        Self::read_full(stream, &mut buf[Header::WIRE_SIZE..], dropped)?;

        Pdu::from_wire(&buf).map_err(|e| RecvFailure::Decode(e, buf))
    }
}

struct LogCtx {
    peer: SocketAddr,
    id: ConnectionId,
    log: Logger,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::messages::{ErrorCode, RTR_V1};
    use rpki_common::log::test_logger;
    use std::net::TcpListener;
    use std::sync::mpsc::channel;

    #[test]
    fn pdus_and_close_become_events() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = channel();
        let conn = RtrConnectionTcp::new(addr, 7, test_logger());
        conn.connect(tx, Duration::from_secs(1)).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            FsmEvent::Connected(7)
        ));

        conn.send(&Pdu::ResetQuery, RTR_V1).unwrap();
        let mut q = [0u8; 8];
        server.read_exact(&mut q).unwrap();
        assert_eq!(q, [1, 2, 0, 0, 0, 0, 0, 8]);

        // A response split across writes is reassembled.
        let resp = Pdu::CacheResponse { session_id: 9 }.to_wire(RTR_V1).unwrap();
        server.write_all(&resp[..3]).unwrap();
        std::thread::sleep(Duration::from_millis(150));
        server.write_all(&resp[3..]).unwrap();
        match rx.recv_timeout(Duration::from_secs(1)).unwrap() {
            FsmEvent::Pdu(7, 1, Pdu::CacheResponse { session_id: 9 }) => {}
            e => panic!("unexpected event {e:?}"),
        }

        drop(server);
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            FsmEvent::ConnectionClosed(7, _)
        ));
    }

    #[test]
    fn connected_precedes_early_pdus() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Pdu::SerialNotify {
            session_id: 3,
            serial: 4,
        }
        .to_wire(RTR_V1)
        .unwrap();
        let server = std::thread::spawn(move || {
            let (mut s, _) = listener.accept().unwrap();
            s.write_all(&notify).unwrap();
            s
        });

        let (tx, rx) = channel();
        let conn = RtrConnectionTcp::new(addr, 2, test_logger());
        conn.connect(tx, Duration::from_secs(1)).unwrap();
        let _server = server.join().unwrap();

        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            FsmEvent::Connected(2)
        ));
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            FsmEvent::Pdu(2, 1, Pdu::SerialNotify { serial: 4, .. })
        ));
        conn.close();
    }

    #[test]
    fn undecodable_pdu_reports_raw_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = channel();
        let conn = RtrConnectionTcp::new(addr, 1, test_logger());
        conn.connect(tx, Duration::from_secs(1)).unwrap();
        let (mut server, _) = listener.accept().unwrap();
        let _ = rx.recv_timeout(Duration::from_secs(1)).unwrap();

        let bogus = [1u8, 5, 0, 0, 0, 0, 0, 8];
        server.write_all(&bogus).unwrap();
        match rx.recv_timeout(Duration::from_secs(1)).unwrap() {
            FsmEvent::RecvError { id, code, raw, .. } => {
                assert_eq!(id, 1);
                assert_eq!(code, ErrorCode::UnsupportedPduType);
                assert_eq!(raw, bogus.to_vec());
            }
            e => panic!("unexpected event {e:?}"),
        }
        conn.close();
    }
}
