//! FIX 4.2 TCP acceptor (C3): one listener, many concurrent sessions.
//!
//! Each accepted connection runs as its own task: framing/parsing and dispatch
//! happen on the reader side, while writes go through a per-session mpsc
//! channel drained by a dedicated writer task, so two reports to the same
//! client never interleave at the byte level (§5).

use crate::error::BrokerError;
use crate::fix::message::{
    decode_new_order_single, decode_order_cancel_request, encode_logon, encode_order_cancel_reject,
    encode_rejection, try_parse_frame, FixMessage, RawOrdType,
};
use crate::lifecycle::{CancelOrigin, LifecycleEngine, SubmitRequest};
use crate::router::ExecutionRouter;
use crate::types::OrderType;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// A live session's outbound half: its own strictly monotonic sequence
/// number and a channel to its dedicated writer task. Cheap to clone —
/// every field is shared.
#[derive(Clone)]
pub struct SessionHandle {
    id: u64,
    peer_id: String,
    out_seq: Arc<AtomicU32>,
    outbox: mpsc::UnboundedSender<Vec<u8>>,
}

impl SessionHandle {
    /// Consumes and returns this session's next outbound sequence number,
    /// starting at 1 (§4.3).
    pub fn next_outbound_seq(&self) -> u32 {
        self.out_seq.fetch_add(1, Ordering::SeqCst)
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Queues `bytes` for delivery on this session's connection. Dropped
    /// silently if the connection has already gone away.
    pub fn send(&self, bytes: Vec<u8>) {
        let _ = self.outbox.send(bytes);
    }
}

/// Registry of live sessions, keyed by `peer_id` (§4.3, §9 "session registry
/// lookup by peer_id"). One peer may hold multiple live connections; lookups
/// deliver to the first one registered for that peer and document the
/// tie-break rather than hiding it.
#[derive(Clone)]
pub struct SessionRegistry {
    by_peer: Arc<Mutex<HashMap<String, Vec<SessionHandle>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self { by_peer: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn register(&self, handle: SessionHandle) {
        self.by_peer
            .lock()
            .expect("session registry lock")
            .entry(handle.peer_id.clone())
            .or_default()
            .push(handle);
    }

    fn remove(&self, peer_id: &str, session_id: u64) {
        let mut guard = self.by_peer.lock().expect("session registry lock");
        if let Some(handles) = guard.get_mut(peer_id) {
            handles.retain(|h| h.id != session_id);
            if handles.is_empty() {
                guard.remove(peer_id);
            }
        }
    }

    /// Returns the first live session registered for `peer_id`, if any. When
    /// a peer holds more than one connection, this is always the
    /// longest-connected one still live — the tie-break is "first in, first
    /// delivered to", matching the source's first-match lookup (§9).
    pub fn find_live(&self, peer_id: &str) -> Option<SessionHandle> {
        self.by_peer
            .lock()
            .expect("session registry lock")
            .get(peer_id)
            .and_then(|handles| handles.first().cloned())
    }

    /// Registers a session backed by a caller-supplied channel instead of a
    /// real socket, so integration tests can observe routed bytes directly.
    pub fn register_for_test(&self, peer_id: &str, outbox: mpsc::UnboundedSender<Vec<u8>>) -> SessionHandle {
        let handle = SessionHandle {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst),
            peer_id: peer_id.to_string(),
            out_seq: Arc::new(AtomicU32::new(1)),
            outbox,
        };
        self.register(handle.clone());
        handle
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the accept loop on `listener` until the process is asked to shut
/// down. Each connection is handled on its own task; a per-connection error
/// is logged and only tears down that one session (§5 "independent reader").
pub async fn run_fix_acceptor(
    listener: TcpListener,
    lifecycle: Arc<LifecycleEngine>,
    router: Arc<ExecutionRouter>,
    sessions: SessionRegistry,
    broker_id: String,
    heartbeat_interval_secs: u32,
) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("FIX accept error: {e}");
                continue;
            }
        };
        debug!("FIX connection accepted from {addr}");
        let lifecycle = Arc::clone(&lifecycle);
        let router = Arc::clone(&router);
        let sessions = sessions.clone();
        let broker_id = broker_id.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, lifecycle, router, sessions, broker_id, heartbeat_interval_secs).await {
                warn!("FIX session error: {e}");
            }
        });
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    lifecycle: Arc<LifecycleEngine>,
    router: Arc<ExecutionRouter>,
    sessions: SessionRegistry,
    broker_id: String,
    heartbeat_interval_secs: u32,
) -> Result<(), BrokerError> {
    let (mut read_half, write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let writer_task = tokio::spawn(async move {
        let mut write_half = write_half;
        while let Some(bytes) = rx.recv().await {
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut handle: Option<SessionHandle> = None;

    let result = async {
        loop {
            let mut chunk = [0u8; 4096];
            let n = read_half
                .read(&mut chunk)
                .await
                .map_err(|e| BrokerError::WireFraming(format!("socket read: {e}")))?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            loop {
                match try_parse_frame(&buf) {
                    Ok(Some((msg, consumed))) => {
                        buf.drain(..consumed);
                        if handle.is_none() {
                            handle = Some(handshake(&msg, &tx, &sessions, &broker_id, heartbeat_interval_secs)?);
                        } else {
                            dispatch(&msg, handle.as_ref().unwrap(), &lifecycle, &router, &broker_id).await;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }
    .await;

    if let Some(handle) = &handle {
        sessions.remove(&handle.peer_id, handle.id);
    }
    drop(tx);
    let _ = writer_task.await;
    result
}

/// The first inbound message on a session MUST be a Logon (§4.3); anything
/// else, or a Logon missing `SenderCompID`, is a fatal framing-level error
/// for this session.
fn handshake(
    msg: &FixMessage,
    tx: &mpsc::UnboundedSender<Vec<u8>>,
    sessions: &SessionRegistry,
    broker_id: &str,
    heartbeat_interval_secs: u32,
) -> Result<SessionHandle, BrokerError> {
    if msg.get(&35).map(String::as_str) != Some("A") {
        return Err(BrokerError::WireFraming("first message was not a Logon".into()));
    }
    let peer_id = msg
        .get(&49)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BrokerError::WireFraming("Logon missing SenderCompID".into()))?
        .clone();

    let handle = SessionHandle {
        id: NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst),
        peer_id: peer_id.clone(),
        out_seq: Arc::new(AtomicU32::new(1)),
        outbox: tx.clone(),
    };
    sessions.register(handle.clone());

    let seq = handle.next_outbound_seq();
    let bytes = encode_logon(broker_id, &peer_id, seq, heartbeat_interval_secs);
    handle.send(bytes);
    Ok(handle)
}

async fn dispatch(
    msg: &FixMessage,
    handle: &SessionHandle,
    lifecycle: &Arc<LifecycleEngine>,
    router: &Arc<ExecutionRouter>,
    broker_id: &str,
) {
    match msg.get(&35).map(String::as_str) {
        Some("0") => {
            if let Some(test_req_id) = msg.get(&112) {
                let seq = handle.next_outbound_seq();
                let bytes = crate::fix::message::encode_heartbeat(broker_id, handle.peer_id(), seq, Some(test_req_id));
                handle.send(bytes);
            }
        }
        Some("D") => handle_new_order_single(msg, handle, lifecycle, router, broker_id).await,
        Some("F") => handle_order_cancel_request(msg, handle, lifecycle, router, broker_id).await,
        Some(other) => debug!("ignoring FIX MsgType {other} from {}", handle.peer_id()),
        None => warn!("FIX message from {} missing MsgType (35)", handle.peer_id()),
    }
}

async fn handle_new_order_single(
    msg: &FixMessage,
    handle: &SessionHandle,
    lifecycle: &Arc<LifecycleEngine>,
    router: &Arc<ExecutionRouter>,
    broker_id: &str,
) {
    let fields = match decode_new_order_single(msg) {
        Ok(fields) => fields,
        Err(e) => {
            // Schema failure before we even know symbol/side/quantity reliably;
            // best-effort ClOrdID is still present on most malformed messages.
            let cl_ord_id = msg.get(&11).cloned().unwrap_or_default();
            let symbol = msg.get(&55).cloned().unwrap_or_default();
            let side = msg.get(&54).and_then(|s| crate::types::Side::from_fix(s)).unwrap_or(crate::types::Side::Buy);
            let quantity: i64 = msg.get(&38).and_then(|s| s.parse().ok()).unwrap_or(0);
            let seq = handle.next_outbound_seq();
            let bytes = encode_rejection(broker_id, handle.peer_id(), &cl_ord_id, &symbol, side, quantity, &e.wire_text(), seq);
            handle.send(bytes);
            return;
        }
    };

    if !fields.raw_ord_type.is_supported() {
        let seq = handle.next_outbound_seq();
        let bytes = encode_rejection(
            broker_id,
            handle.peer_id(),
            &fields.cl_ord_id,
            &fields.symbol,
            fields.side,
            fields.quantity,
            "unsupported order type",
            seq,
        );
        handle.send(bytes);
        return;
    }
    let order_type = match fields.raw_ord_type {
        RawOrdType::Market => OrderType::Market,
        RawOrdType::Limit => OrderType::Limit,
        RawOrdType::Stop | RawOrdType::StopLimit => unreachable!("filtered by is_supported above"),
    };

    let result = lifecycle
        .submit(SubmitRequest {
            cl_ord_id: fields.cl_ord_id.clone(),
            sender_id: handle.peer_id().to_string(),
            symbol: fields.symbol.clone(),
            side: fields.side,
            order_type,
            quantity: fields.quantity,
            limit_price: fields.limit_price,
            time_in_force: fields.time_in_force,
        })
        .await;

    match result {
        Ok(transition) => router.route(&transition).await,
        Err(e) => {
            let seq = handle.next_outbound_seq();
            let bytes = encode_rejection(
                broker_id,
                handle.peer_id(),
                &fields.cl_ord_id,
                &fields.symbol,
                fields.side,
                fields.quantity,
                &e.wire_text(),
                seq,
            );
            handle.send(bytes);
        }
    }
}

async fn handle_order_cancel_request(
    msg: &FixMessage,
    handle: &SessionHandle,
    lifecycle: &Arc<LifecycleEngine>,
    router: &Arc<ExecutionRouter>,
    broker_id: &str,
) {
    let fields = match decode_order_cancel_request(msg) {
        Ok(fields) => fields,
        Err(e) => {
            warn!("malformed OrderCancelRequest from {}: {e}", handle.peer_id());
            let cl_ord_id = msg.get(&11).cloned().unwrap_or_default();
            let orig_cl_ord_id = msg.get(&41).cloned().unwrap_or_default();
            let seq = handle.next_outbound_seq();
            let bytes = encode_order_cancel_reject(broker_id, handle.peer_id(), &cl_ord_id, &orig_cl_ord_id, "4", seq);
            handle.send(bytes);
            return;
        }
    };

    let order = match lifecycle.find_by_cl_ord_id(&fields.orig_cl_ord_id).await {
        Ok(order) => order,
        Err(e) => {
            warn!("order lookup failed during cancel: {e}");
            return;
        }
    };

    let Some(order) = order else {
        let seq = handle.next_outbound_seq();
        let bytes = encode_order_cancel_reject(broker_id, handle.peer_id(), &fields.cl_ord_id, &fields.orig_cl_ord_id, "1", seq);
        handle.send(bytes);
        return;
    };

    match lifecycle.cancel(order.internal_id, CancelOrigin::Fix).await {
        Ok(transition) => router.route(&transition).await,
        Err(e) => {
            let reason = e.cxl_rej_reason().unwrap_or("4");
            let seq = handle.next_outbound_seq();
            let bytes = encode_order_cancel_reject(broker_id, handle.peer_id(), &fields.cl_ord_id, &fields.orig_cl_ord_id, reason, seq);
            handle.send(bytes);
        }
    }
}
