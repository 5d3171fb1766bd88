//! The server session: a single-task state machine owning one accepted
//! connection.
//!
//! The loop is a biased `tokio::select!` over the session's event channel
//! (handler replies, owner close requests) and transport readability.
//! Backpressure never suspends the task mid-operation: reads are gated by
//! a pause mask, and every operation runs to completion between turns.
//! Replies staged during one turn flush as a single vectored write before
//! the next turn begins.

mod close;
mod counter;
mod dispatch;
pub(crate) mod event;
mod order;
mod state;
pub mod test_support;
mod write;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::SocketAddr;

use bytes::BytesMut;
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

pub use counter::active_session_count;

use counter::ActiveSession;
use event::SessionEvent;
use state::{PauseReason, PauseState, SessionState};

use crate::codec::{ReplyEncoder, encoder_for};
use crate::config::SessionConfig;
use crate::context::ReplySink;
use crate::error::{ParseError, SessionError};
use crate::hooks::{DebugTap, RequestHandler, SessionHooks};
use crate::multi_op::MultiOpParent;
use crate::parser::{ParserEvent, RequestParser};
use crate::protocol::Protocol;
use crate::registry::{SessionHandle, SessionId};
use crate::write_queue::{WriteBuffer, WriteBufferQueue};

/// Identity the transport carries into the session: peer address and, for
/// TLS transports, the verified client common name.
#[derive(Clone, Debug, Default)]
pub struct TransportInfo {
    /// Peer address captured at accept time.
    pub peer_addr: Option<SocketAddr>,
    /// Common name from the peer's verified certificate, if any.
    pub client_common_name: Option<String>,
}

impl TransportInfo {
    /// Info for a plain (non-TLS) transport.
    #[must_use]
    pub fn plain(peer_addr: SocketAddr) -> Self {
        Self {
            peer_addr: Some(peer_addr),
            client_common_name: None,
        }
    }
}

/// Per-connection server session.
///
/// Owns the transport, the parser, and the handler; runs on a single task
/// via [`McServerSession::run`]. See the crate docs for the dataflow.
pub struct McServerSession<T, P, H> {
    id: SessionId,
    transport: Option<T>,
    info: TransportInfo,
    parser: P,
    handler: H,
    hooks: SessionHooks,
    config: SessionConfig,
    encoder: Box<dyn ReplyEncoder>,
    debug_tap: Option<Box<dyn DebugTap>>,

    sink: ReplySink,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,

    read_buf: BytesMut,
    parsed_backlog: VecDeque<ParserEvent>,
    pending_parse_error: Option<ParseError>,

    state: SessionState,
    pause: PauseState,
    transport_good: bool,

    in_flight: usize,
    real_in_flight: usize,

    head_reqid: u64,
    tail_reqid: u64,
    blocked_replies: BTreeMap<u64, WriteBuffer>,

    writes: WriteBufferQueue,
    write_scheduled: bool,

    multi_ops: HashMap<u64, MultiOpParent>,
    current_multiop: Option<u64>,
}

impl<T, P, H> McServerSession<T, P, H>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
    P: RequestParser,
    H: RequestHandler,
{
    /// Create a session over `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::StartupFailed`] when the configuration is
    /// unusable, and [`SessionError::ProtocolMisconfigured`] when the
    /// parser's contract is inconsistent (the text protocol demands
    /// in-order replies).
    pub fn new(
        transport: T,
        info: TransportInfo,
        parser: P,
        handler: H,
        hooks: SessionHooks,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        config.validate().map_err(SessionError::StartupFailed)?;
        if parser.protocol() == Protocol::Ascii && parser.out_of_order() {
            return Err(SessionError::ProtocolMisconfigured(Protocol::Ascii));
        }
        let encoder = encoder_for(parser.protocol());
        let (tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            id: SessionId::next(),
            transport: Some(transport),
            info,
            parser,
            handler,
            hooks,
            config,
            encoder,
            debug_tap: None,
            sink: ReplySink::new(tx),
            events_rx,
            read_buf: BytesMut::new(),
            parsed_backlog: VecDeque::new(),
            pending_parse_error: None,
            state: SessionState::Streaming,
            pause: PauseState::default(),
            transport_good: true,
            in_flight: 0,
            real_in_flight: 0,
            head_reqid: 0,
            tail_reqid: 0,
            blocked_replies: BTreeMap::new(),
            writes: WriteBufferQueue::new(),
            write_scheduled: false,
            multi_ops: HashMap::new(),
            current_multiop: None,
        })
    }

    /// This session's id.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// An owner-side handle, suitable for a
    /// [`SessionRegistry`](crate::registry::SessionRegistry).
    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::from_sink(&self.sink)
    }

    /// Peer address captured at accept time.
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.info.peer_addr
    }

    /// Common name from the peer's verified TLS certificate, if any.
    #[must_use]
    pub fn client_common_name(&self) -> Option<&str> {
        self.info.client_common_name.as_deref()
    }

    /// Attach a byte-level traffic mirror.
    pub fn set_debug_tap(&mut self, tap: Box<dyn DebugTap>) {
        self.debug_tap = Some(tap);
    }

    /// Drive the session until it closes.
    ///
    /// The session consumes itself; after the `on_close_finish` hook runs
    /// no callback of any kind fires again.
    pub async fn run(mut self) {
        let _active = ActiveSession::new();
        debug!(
            "session started: id={:?}, peer={:?}",
            self.id, self.info.peer_addr
        );
        while self.state != SessionState::Closed {
            self.turn().await;
        }
        debug!(
            "session finished: id={:?}, peer={:?}",
            self.id, self.info.peer_addr
        );
    }

    /// One cooperative turn: wait for something runnable, dispatch it,
    /// then flush everything staged during the turn as one write batch.
    async fn turn(&mut self) {
        if self.parsed_backlog.is_empty() {
            let reads_enabled = self.reads_enabled();
            let region = self.read_region();
            tokio::select! {
                biased;

                event = self.events_rx.recv() => {
                    if let Some(event) = event {
                        self.dispatch_event(event);
                    }
                    // Everything already queued belongs to this turn, so a
                    // burst of replies coalesces into one write batch.
                    while let Ok(event) = self.events_rx.try_recv() {
                        self.dispatch_event(event);
                    }
                }
                result = Self::read_some(self.transport.as_mut(), &mut self.read_buf, region),
                    if reads_enabled =>
                {
                    self.on_read(result);
                }
            }
        } else {
            // A parsed backlog means the previous read outran the
            // per-turn request budget. Drain queued replies first so
            // pipelined bursts cannot starve reply processing.
            while let Ok(event) = self.events_rx.try_recv() {
                self.dispatch_event(event);
            }
        }

        self.dispatch_parsed_batch();
        if self.parsed_backlog.is_empty() {
            if let Some(err) = self.pending_parse_error.take() {
                self.apply_parse_error(err);
            }
        }
        self.send_writes().await;
        self.check_closed();
    }

    /// Reads are hooked only while nothing suppresses them.
    fn reads_enabled(&self) -> bool {
        self.pause.is_empty()
            && self.state == SessionState::Streaming
            && self.transport_good
            && self.transport.is_some()
            && self.pending_parse_error.is_none()
    }

    /// Size of the receive region offered to the next read: whatever
    /// headroom remains under `max_buffer_size`, but never less than
    /// `min_buffer_size`.
    fn read_region(&self) -> usize {
        self.config
            .max_buffer_size
            .saturating_sub(self.read_buf.len())
            .max(self.config.min_buffer_size)
    }

    async fn read_some(
        transport: Option<&mut T>,
        buf: &mut BytesMut,
        region: usize,
    ) -> std::io::Result<usize> {
        use bytes::BufMut;
        use tokio::io::AsyncReadExt;

        match transport {
            Some(io) => {
                let mut limited = (&mut *buf).limit(region);
                io.read_buf(&mut limited).await
            }
            None => std::future::pending().await,
        }
    }

    fn on_read(&mut self, result: std::io::Result<usize>) {
        match result {
            Ok(0) => {
                debug!("transport EOF: id={:?}", self.id);
                self.close();
            }
            Ok(n) => {
                if let Some(tap) = self.debug_tap.as_mut() {
                    let start = self.read_buf.len() - n;
                    tap.received(&self.read_buf[start..]);
                }
                if let Err(err) = self
                    .parser
                    .consume(&mut self.read_buf, &mut self.parsed_backlog)
                {
                    // Requests parsed before the rejection still get
                    // serviced; the error reply queues behind them.
                    self.pending_parse_error = Some(err);
                }
            }
            Err(err) => {
                debug!("transport read failed: id={:?}, error={err}", self.id);
                self.transport_good = false;
                self.close();
            }
        }
    }

    /// Allot the next request id.
    fn alloc_reqid(&mut self) -> u64 {
        let reqid = self.tail_reqid;
        self.tail_reqid += 1;
        reqid
    }

    /// Begin a transaction; engages the throttle at the cap.
    fn transaction_started(&mut self, is_sub: bool) {
        self.in_flight += 1;
        if !is_sub {
            self.real_in_flight += 1;
        }
        if self.config.max_in_flight > 0 && self.real_in_flight >= self.config.max_in_flight {
            self.pause.set(PauseReason::Throttled);
        }
    }

    /// Finish a transaction; releases the throttle below the cap.
    fn transaction_completed(&mut self, is_sub: bool) {
        debug_assert!(self.in_flight > 0);
        self.in_flight = self.in_flight.saturating_sub(1);
        if !is_sub {
            debug_assert!(self.real_in_flight > 0);
            self.real_in_flight = self.real_in_flight.saturating_sub(1);
        }
        if self.config.max_in_flight > 0 && self.real_in_flight < self.config.max_in_flight {
            self.pause.clear(PauseReason::Throttled);
        }
        self.check_closed();
    }
}
